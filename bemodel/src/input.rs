// Distributed under the MIT License
// (See accompanying LICENSE file or a copy at http://opensource.org/licenses/MIT)

//! Trusted input configuration: a JSON document already validated
//! against the project's schema is deserialized into [`Input`], which is then
//! checked for the domain invariants the schema can't express (see
//! [`crate::checks`]) and turned into the runtime objects the orchestrator
//! drives.
//!
//! Trait objects ([`crate::heat_source::HeatSourceService`],
//! [`crate::zone::ZoneEnvelope`]) aren't themselves deserializable, so `Input`
//! carries the plain data for the heat sources this crate implements
//! directly (immersion, solar thermal, heat network) and `build_*` methods
//! assemble them. A heat pump or heat battery's test data is likewise plain
//! data (`Vec<HeatPumpTestDatum>`) - building the dispatch-ready service from
//! it belongs to the caller, since it depends on the emitter/service graph
//! the schema describes but this module does not attempt to re-derive.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::checks;
use crate::control::ControlDb;
use crate::energy_supply::FuelType;
use crate::errors::HemError;
use crate::external_conditions::ExternalConditions;
use crate::heat_sources_simple::{ImmersionHeater, SolarThermalCollector};
use crate::schedule::ScheduleDb;
use crate::simtime::SimulationTime;
use crate::storage_tank::{PrimaryPipework, StorageTank, TankHeatSource};
use crate::zone::Zone;

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneInput {
    pub name: String,
    pub area_m2: f32,
    pub volume_m3: f32,
    pub initial_temp_c: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImmersionHeaterInput {
    pub name: String,
    pub heater_layer: usize,
    pub thermostat_layer: usize,
    pub control_name: Option<String>,
    pub setpnt_min_c: f32,
    pub setpnt_max_c: f32,
    pub rated_power_kw: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolarThermalInput {
    pub name: String,
    pub heater_layer: usize,
    pub thermostat_layer: usize,
    pub setpnt_min_c: f32,
    pub setpnt_max_c: f32,
    pub area_m2: f32,
    pub zero_loss_efficiency: f32,
    pub heat_loss_coeff_w_per_m2_k: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrimaryPipeworkInput {
    pub internal: bool,
    pub volume_l: f32,
    pub heat_loss_coeff_w_per_k: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HotWaterTankInput {
    pub name: String,
    pub n_layers: usize,
    pub volume_total_l: f32,
    pub initial_temp_c: f32,
    pub temp_ambient_c: f32,
    pub q_std_ls_ref_kwh: f32,
    #[serde(default)]
    pub immersion_heaters: Vec<ImmersionHeaterInput>,
    #[serde(default)]
    pub solar_thermal: Vec<SolarThermalInput>,
    #[serde(default)]
    pub pipework: HashMap<String, PrimaryPipeworkInput>,
}

/// Whole-model configuration, already schema-valid JSON deserialized
/// directly into domain types.
#[derive(Debug, Clone, Deserialize)]
pub struct Input {
    pub simulation_time: SimulationTime,
    pub external_conditions: ExternalConditions,
    #[serde(default)]
    pub controls: ControlDb,
    #[serde(default)]
    pub schedules: ScheduleDb,
    pub energy_supplies: HashMap<String, FuelType>,
    #[serde(default)]
    pub cold_water_sources: HashMap<String, Vec<f32>>,
    #[serde(default)]
    pub zones: Vec<ZoneInput>,
    pub hot_water_tank: Option<HotWaterTankInput>,
    #[serde(default)]
    pub min_ach: f32,
    #[serde(default)]
    pub max_ach: f32,
}

impl Input {
    pub fn from_reader(reader: impl std::io::Read) -> anyhow::Result<Self> {
        let input: Self = serde_json::from_reader(reader).context("parsing input JSON")?;
        input.validate()?;
        Ok(input)
    }

    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
    }

    /// Domain validation beyond what schema validation already guarantees:
    /// control-graph acyclicity, ACH bounds, unique service names.
    pub fn validate(&self) -> Result<(), HemError> {
        self.controls.validate()?;
        checks::validate_ach_bounds(self.min_ach, self.max_ach)?;
        self.external_conditions.validate(self.simulation_time.total_steps())?;

        let mut names: Vec<String> = Vec::new();
        if let Some(tank) = &self.hot_water_tank {
            for h in &tank.immersion_heaters {
                names.push(h.name.clone());
            }
            for s in &tank.solar_thermal {
                names.push(s.name.clone());
            }
        }
        checks::validate_unique_service_names(&names)?;
        Ok(())
    }

    pub fn build_zones(&self) -> Vec<Zone> {
        self.zones
            .iter()
            .map(|z| Zone::new(z.name.clone(), z.area_m2, z.volume_m3, z.initial_temp_c))
            .collect()
    }

    /// Assembles the primary hot-water tank and its dispatch-ready heat
    /// sources from plain input data.
    pub fn build_hot_water_tank(&self) -> Option<StorageTank> {
        let cfg = self.hot_water_tank.as_ref()?;
        let mut tank = StorageTank::new(
            cfg.name.clone(),
            cfg.n_layers,
            cfg.volume_total_l,
            cfg.initial_temp_c,
            cfg.temp_ambient_c,
            cfg.q_std_ls_ref_kwh,
        );

        for h in &cfg.immersion_heaters {
            let pipework = cfg
                .pipework
                .get(&h.name)
                .map(|p| PrimaryPipework::new(p.internal, p.volume_l, p.heat_loss_coeff_w_per_k));
            tank.heat_sources.push(TankHeatSource {
                name: h.name.clone(),
                heater_layer: h.heater_layer,
                thermostat_layer: h.thermostat_layer,
                control_name: h.control_name.clone(),
                setpnt_min: h.setpnt_min_c,
                setpnt_max: h.setpnt_max_c,
                pipework,
                source: Box::new(ImmersionHeater::new(h.rated_power_kw)),
            });
        }

        for s in &cfg.solar_thermal {
            let pipework = cfg
                .pipework
                .get(&s.name)
                .map(|p| PrimaryPipework::new(p.internal, p.volume_l, p.heat_loss_coeff_w_per_k));
            tank.heat_sources.push(TankHeatSource {
                name: s.name.clone(),
                heater_layer: s.heater_layer,
                thermostat_layer: s.thermostat_layer,
                control_name: None,
                setpnt_min: s.setpnt_min_c,
                setpnt_max: s.setpnt_max_c,
                pipework,
                source: Box::new(SolarThermalCollector::new(
                    s.area_m2,
                    s.zero_loss_efficiency,
                    s.heat_loss_coeff_w_per_m2_k,
                )),
            });
        }

        Some(tank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "simulation_time": {"start_hour": 0.0, "end_hour": 1.0, "step": 1.0},
            "external_conditions": {
                "location": {"latitude": 51.5, "longitude": -0.1, "tz": 0},
                "start_nday": 1,
                "air_temp": [5.0],
                "wind_speed": [3.0],
                "diffuse_horizontal_radiation": [0.0],
                "direct_beam_radiation": [0.0],
                "ground_reflectivity": 0.2
            },
            "energy_supplies": {"mains_elec": "Electricity"},
            "zones": [{"name": "z1", "area_m2": 20.0, "volume_m3": 50.0, "initial_temp_c": 20.0}],
            "hot_water_tank": {
                "name": "dhw",
                "n_layers": 4,
                "volume_total_l": 120.0,
                "initial_temp_c": 55.0,
                "temp_ambient_c": 18.0,
                "q_std_ls_ref_kwh": 1.2,
                "immersion_heaters": [{
                    "name": "immersion",
                    "heater_layer": 0,
                    "thermostat_layer": 0,
                    "control_name": null,
                    "setpnt_min_c": 52.0,
                    "setpnt_max_c": 60.0,
                    "rated_power_kw": 3.0
                }]
            }
        }"#
    }

    #[test]
    fn sample_input_parses_and_validates() {
        let input: Input = serde_json::from_str(sample_json()).unwrap();
        assert!(input.validate().is_ok());
        assert_eq!(input.zones.len(), 1);
        let tank = input.build_hot_water_tank().unwrap();
        assert_eq!(tank.heat_sources.len(), 1);
    }

    #[test]
    fn mismatched_series_length_fails_validation() {
        let mut input: Input = serde_json::from_str(sample_json()).unwrap();
        input.external_conditions.air_temp = vec![5.0; 48];
        assert!(input.validate().is_err());
    }
}
