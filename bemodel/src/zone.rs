// Distributed under the MIT License
// (See accompanying LICENSE file or a copy at http://opensource.org/licenses/MIT)

//! Zone state and the trait boundary to the (out-of-scope) finite-difference
//! envelope solver.
//!
//! The envelope heat balance itself - conduction through walls, thermal
//! bridges, ventilation-driven air exchange - is an external collaborator;
//! the core only needs a [`Zone`] to carry the areas/volumes the
//! orchestrator and emitters work with, and the [`ZoneEnvelope`] trait to ask
//! it for demand and to push the resulting gains/ach back in.

use crate::simtime::SimulationTimeIteration;

#[derive(Debug, Clone, Copy, Default)]
pub struct ZoneHeatCoolDemand {
    pub demand_heating_kwh: f32,
    pub demand_cooling_kwh: f32,
}

/// The contract the orchestrator uses against the external envelope solver
/// for one zone. A test double or the real finite-difference implementation
/// both satisfy this trait; the orchestrator never inspects zone geometry
/// directly.
pub trait ZoneEnvelope {
    fn area_m2(&self) -> f32;
    fn volume_m3(&self) -> f32;
    fn air_temp_c(&self) -> f32;
    fn operative_temp_c(&self) -> f32;

    /// Requests the heating/cooling energy needed to reach `setpnt_heat_c`/
    /// `setpnt_cool_c` this timestep given internal and solar gains already
    /// apportioned convective/radiative, at the chosen `ach`.
    #[allow(clippy::too_many_arguments)]
    fn space_heat_cool_demand(
        &mut self,
        t: &SimulationTimeIteration,
        temp_ext_c: f32,
        gains_internal_kwh: f32,
        gains_solar_kwh: f32,
        frac_convective_h: f32,
        frac_convective_c: f32,
        setpnt_heat_c: Option<f32>,
        setpnt_cool_c: Option<f32>,
        ach: f32,
    ) -> ZoneHeatCoolDemand;

    /// Commits the convective/radiative gains actually delivered by emitters
    /// this timestep and advances the zone's internal air/operative
    /// temperature state.
    fn update_temperatures(
        &mut self,
        t: &SimulationTimeIteration,
        temp_ext_c: f32,
        gains_convective_kwh: f32,
        gains_radiative_kwh: f32,
        ach: f32,
    );
}

/// Minimal owned [`Zone`] record: geometry plus the current
/// temperature state the orchestrator reports and the rest of the core reads
/// (e.g. a heat pump's `ExhaustAirMev` source-temperature lookup reads last
/// timestep's zone-volume-weighted internal air temperature).
#[derive(Debug, Clone)]
pub struct Zone {
    pub name: String,
    pub area_m2: f32,
    pub volume_m3: f32,
    pub air_temp_c: f32,
    pub operative_temp_c: f32,
}

impl Zone {
    pub fn new(name: impl Into<String>, area_m2: f32, volume_m3: f32, initial_temp_c: f32) -> Self {
        Self {
            name: name.into(),
            area_m2,
            volume_m3,
            air_temp_c: initial_temp_c,
            operative_temp_c: initial_temp_c,
        }
    }
}

/// Volume-weighted mean internal air temperature across zones, used as
/// `temp_internal_air_prev` by the next timestep's exhaust-air heat-pump
/// source-temperature lookup.
pub fn volume_weighted_mean_air_temp(zones: &[Zone]) -> f32 {
    let total_volume: f32 = zones.iter().map(|z| z.volume_m3).sum();
    if total_volume <= 1e-9 {
        return zones.first().map(|z| z.air_temp_c).unwrap_or(0.0);
    }
    zones.iter().map(|z| z.air_temp_c * z.volume_m3).sum::<f32>() / total_volume
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_weighted_mean_matches_hand_calc() {
        let zones = vec![
            Zone::new("a", 10.0, 20.0, 20.0),
            Zone::new("b", 10.0, 10.0, 26.0),
        ];
        let mean = volume_weighted_mean_air_temp(&zones);
        assert!((mean - (20.0 * 20.0 + 10.0 * 26.0) / 30.0).abs() < 1e-4);
    }

    #[test]
    fn empty_zone_list_falls_back_to_zero() {
        assert_eq!(volume_weighted_mean_air_temp(&[]), 0.0);
    }
}
