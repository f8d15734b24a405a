// Distributed under the MIT License
// (See accompanying LICENSE file or a copy at http://opensource.org/licenses/MIT)

//! Per-fuel energy ledger: every component that imports or exports energy
//! registers its demand against a named [`EnergySupply`], which tracks supply,
//! demand, unmet demand and (for electricity) on-site generation/storage and
//! diverter dispatch.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::HemError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuelType {
    Electricity,
    MainsGas,
    Lpg,
    Biomass,
    UnmeteredElectricity,
    Custom,
}

/// A battery electrical store attached to an [`EnergySupply`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectricBattery {
    pub capacity_kwh: f32,
    pub charge_efficiency: f32,
    pub discharge_efficiency: f32,
    #[serde(skip)]
    pub state_of_charge_kwh: f32,
}

impl ElectricBattery {
    /// Charges the battery with up to `surplus_kwh` of available energy,
    /// returning the amount actually absorbed (before efficiency losses are
    /// subtracted from what reaches storage).
    pub fn charge(&mut self, surplus_kwh: f32) -> f32 {
        let headroom = (self.capacity_kwh - self.state_of_charge_kwh) / self.charge_efficiency.max(1e-6);
        let taken = surplus_kwh.max(0.0).min(headroom);
        self.state_of_charge_kwh += taken * self.charge_efficiency;
        taken
    }

    /// Discharges up to `demand_kwh` from the battery, returning the amount
    /// delivered at the load (after discharge efficiency losses).
    pub fn discharge(&mut self, demand_kwh: f32) -> f32 {
        let available = self.state_of_charge_kwh * self.discharge_efficiency;
        let delivered = demand_kwh.max(0.0).min(available);
        self.state_of_charge_kwh -= delivered / self.discharge_efficiency.max(1e-6);
        delivered
    }
}

/// Per-timestep, per-end-use energy ledger for one fuel.
///
/// Demand and supply are recorded by end-use name so the totals can be broken
/// down in reporting (e.g. "space heating", "hot water", "pumps and fans").
#[derive(Debug, Clone, Default)]
pub struct EnergySupply {
    pub fuel_type: Option<FuelType>,
    demand_by_end_use: HashMap<String, Vec<f32>>,
    supply_by_end_use: HashMap<String, Vec<f32>>,
    unmet_demand_by_end_use: HashMap<String, Vec<f32>>,
    generation_kwh: Vec<f32>,
    n_timesteps: usize,
}

impl EnergySupply {
    pub fn new(fuel_type: FuelType, n_timesteps: usize) -> Self {
        Self {
            fuel_type: Some(fuel_type),
            demand_by_end_use: HashMap::new(),
            supply_by_end_use: HashMap::new(),
            unmet_demand_by_end_use: HashMap::new(),
            generation_kwh: vec![0.0; n_timesteps],
            n_timesteps,
        }
    }

    fn series_mut(map: &mut HashMap<String, Vec<f32>>, end_use: &str, n: usize) -> &mut Vec<f32> {
        map.entry(end_use.to_string())
            .or_insert_with(|| vec![0.0; n])
    }

    pub fn demand_energy(&mut self, end_use: &str, timestep_index: usize, kwh: f32) -> Result<(), HemError> {
        let n = self.n_timesteps;
        let series = Self::series_mut(&mut self.demand_by_end_use, end_use, n);
        let slot = series.get_mut(timestep_index).ok_or_else(|| {
            HemError::input("energy_supply", format!("timestep {timestep_index} out of range"))
        })?;
        *slot += kwh;
        Ok(())
    }

    pub fn supply_energy(&mut self, end_use: &str, timestep_index: usize, kwh: f32) -> Result<(), HemError> {
        let n = self.n_timesteps;
        let series = Self::series_mut(&mut self.supply_by_end_use, end_use, n);
        let slot = series.get_mut(timestep_index).ok_or_else(|| {
            HemError::input("energy_supply", format!("timestep {timestep_index} out of range"))
        })?;
        *slot += kwh;
        Ok(())
    }

    /// Records hot-water/space-conditioning demand that could not be met this
    /// timestep, surfaced here as ledger data rather than as a hard error.
    pub fn record_unmet_demand(&mut self, end_use: &str, timestep_index: usize, kwh: f32) -> Result<(), HemError> {
        let n = self.n_timesteps;
        let series = Self::series_mut(&mut self.unmet_demand_by_end_use, end_use, n);
        let slot = series.get_mut(timestep_index).ok_or_else(|| {
            HemError::input("energy_supply", format!("timestep {timestep_index} out of range"))
        })?;
        *slot += kwh;
        Ok(())
    }

    pub fn record_generation(&mut self, timestep_index: usize, kwh: f32) -> Result<(), HemError> {
        let slot = self.generation_kwh.get_mut(timestep_index).ok_or_else(|| {
            HemError::input("energy_supply", format!("timestep {timestep_index} out of range"))
        })?;
        *slot += kwh;
        Ok(())
    }

    pub fn total_demand(&self, timestep_index: usize) -> f32 {
        self.demand_by_end_use
            .values()
            .map(|s| s.get(timestep_index).copied().unwrap_or(0.0))
            .sum()
    }

    pub fn total_unmet_demand(&self, timestep_index: usize) -> f32 {
        self.unmet_demand_by_end_use
            .values()
            .map(|s| s.get(timestep_index).copied().unwrap_or(0.0))
            .sum()
    }

    pub fn generation(&self, timestep_index: usize) -> f32 {
        self.generation_kwh.get(timestep_index).copied().unwrap_or(0.0)
    }

    /// Net import from the grid at this timestep: positive demand is reduced by
    /// any on-site generation still available after self-consumption, and a
    /// battery (if present) is used to buffer the remainder before falling back
    /// to import/export.
    pub fn net_import(&self, timestep_index: usize, battery: Option<&mut ElectricBattery>) -> f32 {
        let demand = self.total_demand(timestep_index);
        let generation = self.generation(timestep_index);
        let net = demand - generation;
        match battery {
            Some(b) if net > 0.0 => net - b.discharge(net),
            Some(b) if net < 0.0 => net + b.charge(-net),
            _ => net,
        }
    }

    pub fn end_use_names(&self) -> impl Iterator<Item = &String> {
        self.demand_by_end_use.keys()
    }

    pub fn n_timesteps(&self) -> usize {
        self.n_timesteps
    }

    /// Demand recorded against one end use at one timestep, for reporting
    /// (0 if that end use never registered demand).
    pub fn demand_for_end_use(&self, end_use: &str, timestep_index: usize) -> f32 {
        self.demand_by_end_use
            .get(end_use)
            .and_then(|s| s.get(timestep_index))
            .copied()
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demand_accumulates_across_calls() {
        let mut es = EnergySupply::new(FuelType::Electricity, 2);
        es.demand_energy("immersion", 0, 1.0).unwrap();
        es.demand_energy("immersion", 0, 0.5).unwrap();
        assert!((es.total_demand(0) - 1.5).abs() < 1e-6);
        assert_eq!(es.total_demand(1), 0.0);
    }

    #[test]
    fn out_of_range_timestep_is_an_error() {
        let mut es = EnergySupply::new(FuelType::Electricity, 1);
        assert!(es.demand_energy("x", 5, 1.0).is_err());
    }

    #[test]
    fn battery_buffers_surplus_generation_then_discharges() {
        let mut battery = ElectricBattery {
            capacity_kwh: 5.0,
            charge_efficiency: 0.95,
            discharge_efficiency: 0.95,
            state_of_charge_kwh: 0.0,
        };
        let mut es = EnergySupply::new(FuelType::Electricity, 2);
        es.record_generation(0, 3.0).unwrap();
        let import0 = es.net_import(0, Some(&mut battery));
        assert!(import0 < 0.0); // surplus charges the battery / exports
        assert!(battery.state_of_charge_kwh > 0.0);

        es.demand_energy("heating", 1, 2.0).unwrap();
        let import1 = es.net_import(1, Some(&mut battery));
        assert!(import1 < 2.0); // battery covers part of the demand
    }
}
