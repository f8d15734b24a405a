// Distributed under the MIT License
// (See accompanying LICENSE file or a copy at http://opensource.org/licenses/MIT)

//! CSV result export: one row per timestep, one column per end use, for
//! each energy supply the model tracked.

use std::io::{self, Write};

use crate::energy_supply::EnergySupply;

/// Writes one energy supply's demand-by-end-use table as CSV: a `timestep`
/// column followed by one column per end use (alphabetised for determinism),
/// each cell the energy (kWh) demanded by that end use in that timestep.
pub fn write_demand_csv(supply: &EnergySupply, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    let mut end_uses: Vec<&String> = supply.end_use_names().collect();
    end_uses.sort();

    let mut header = vec!["timestep".to_string()];
    header.extend(end_uses.iter().map(|s| s.to_string()));
    wtr.write_record(&header)?;

    for t in 0..supply.n_timesteps() {
        let mut row = vec![t.to_string()];
        for end_use in &end_uses {
            row.push(format!("{:.6}", supply.demand_for_end_use(end_use, t)));
        }
        wtr.write_record(&row)?;
    }

    wtr.flush()
}

/// Per-timestep summary across every tracked energy supply: total demand,
/// total unmet demand and generation, one row per supply per timestep.
pub fn write_postproc_summary_csv<'a>(
    supplies: impl IntoIterator<Item = (&'a str, &'a EnergySupply)>,
    writer: impl Write,
) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(["energy_supply", "timestep", "demand_kwh", "unmet_demand_kwh", "generation_kwh"])?;

    for (name, supply) in supplies {
        for t in 0..supply.n_timesteps() {
            wtr.write_record(&[
                name.to_string(),
                t.to_string(),
                format!("{:.6}", supply.total_demand(t)),
                format!("{:.6}", supply.total_unmet_demand(t)),
                format!("{:.6}", supply.generation(t)),
            ])?;
        }
    }

    wtr.flush()
}

/// Annual rollup for one energy supply: total net import across the run
/// times a supplied factor, e.g. kg CO2e/kWh for emissions or a dimensionless
/// multiplier for primary energy.
pub fn annual_total_times_factor(
    supply: &EnergySupply,
    factor: f32,
    mut battery: Option<&mut crate::energy_supply::ElectricBattery>,
) -> f32 {
    let total: f32 = (0..supply.n_timesteps())
        .map(|t| supply.net_import(t, battery.as_deref_mut()))
        .sum();
    total * factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy_supply::FuelType;

    #[test]
    fn demand_csv_has_header_plus_one_row_per_timestep() {
        let mut supply = EnergySupply::new(FuelType::Electricity, 3);
        supply.demand_energy("immersion", 0, 1.0).unwrap();
        supply.demand_energy("immersion", 1, 2.0).unwrap();

        let mut buf = Vec::new();
        write_demand_csv(&supply, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4); // header + 3 timesteps
        assert!(lines[0].starts_with("timestep,"));
    }

    #[test]
    fn postproc_summary_covers_every_supply() {
        let mut elec = EnergySupply::new(FuelType::Electricity, 2);
        elec.demand_energy("immersion", 0, 1.0).unwrap();
        let mut gas = EnergySupply::new(FuelType::MainsGas, 2);
        gas.demand_energy("boiler", 0, 2.0).unwrap();

        let mut buf = Vec::new();
        write_postproc_summary_csv([("mains_elec", &elec), ("mains_gas", &gas)], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 1 + 2 + 2);
    }

    #[test]
    fn annual_total_scales_net_import_by_factor() {
        let mut supply = EnergySupply::new(FuelType::MainsGas, 2);
        supply.demand_energy("boiler", 0, 10.0).unwrap();
        supply.demand_energy("boiler", 1, 10.0).unwrap();
        let total = annual_total_times_factor(&supply, 0.2, None);
        assert!((total - 4.0).abs() < 1e-4);
    }
}
