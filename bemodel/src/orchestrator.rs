// Distributed under the MIT License
// (See accompanying LICENSE file or a copy at http://opensource.org/licenses/MIT)

//! Per-timestep orchestrator: ties the hot-water draw-off, ventilation/ACH
//! selection, zone demand and space heating/cooling dispatch into a single
//! sequenced step, and drives end-of-timestep hooks on every stateful
//! component.

use crate::control::ControlDb;
use crate::energy_supply::EnergySupply;
use crate::simtime::SimulationTimeIteration;
use crate::storage_tank::{HotWaterEvent, PvDiverter, StorageTank};
use crate::zone::{volume_weighted_mean_air_temp, Zone, ZoneEnvelope, ZoneHeatCoolDemand};

/// A cold-water feed series (mains or a preheated tank acting as one),
/// looked up by timestep index with wraparound.
pub struct ColdWaterSource {
    pub values: Vec<f32>,
}

impl ColdWaterSource {
    pub fn temp_c(&self, t: &SimulationTimeIteration) -> f32 {
        if self.values.is_empty() {
            return 10.0;
        }
        self.values[t.index % self.values.len()]
    }
}

/// A space heating or cooling emitter dispatched against a zone. Concrete
/// emitters (wet radiators/underfloor, warm-air, heat
/// battery service, direct electric) implement this directly; a heat-pump
/// or heat-battery service already implementing [`crate::heat_source::HeatSourceService`]
/// is adapted to it by its own module.
pub trait SpaceEmitter {
    fn frac_convective(&self) -> f32;
    /// Minimum output this system must deliver once it has started (a
    /// modulating system's floor), used to recompute the demand owed to
    /// lower-priority systems in the same priority chain.
    fn min_output_kwh(&self, timestep_h: f32) -> f32 {
        let _ = timestep_h;
        0.0
    }
    fn demand_energy(&mut self, required_kwh: f32, update_state: bool) -> f32;

    /// End-of-timestep hook: commit accumulated results, reset per-timestep
    /// accumulators, run standing-loss/recovery bookkeeping. A no-op for
    /// emitters with no state to carry between timesteps.
    fn timestep_end(&mut self, t: &SimulationTimeIteration) {
        let _ = t;
    }
}

/// Selects the zone ventilation rate for the timestep: the minimum ACH
/// whenever any zone has heating demand, the maximum ACH
/// whenever any zone has cooling demand (cooling takes priority when both
/// are true, since venting is the opposite of what heating wants), and
/// otherwise a cooling-driven window-opening level only if opening the
/// window would help (outside air cooler than the zone).
pub fn select_ach(
    min_ach: f32,
    max_ach: f32,
    window_opening_ach: f32,
    any_heating_demand: bool,
    any_cooling_benefit: bool,
) -> f32 {
    if any_heating_demand {
        min_ach
    } else if any_cooling_benefit {
        max_ach.max(window_opening_ach)
    } else {
        min_ach
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimestepSummary {
    pub hw_energy_used_kwh: f32,
    pub hw_unmet_kwh: f32,
    pub pipework_gains_kwh: f32,
    pub unmet_space_demand_kwh: f32,
    pub ach_used: f32,
}

/// Dispatches `demand_kwh` through a priority-ordered chain of emitters,
/// returning `(total_convective_kwh, total_radiative_kwh, unmet_kwh)`.
pub fn dispatch_priority_chain(
    emitters: &mut [Box<dyn SpaceEmitter>],
    demand_kwh: f32,
    timestep_h: f32,
) -> (f32, f32, f32) {
    let mut remaining = demand_kwh;
    let mut convective = 0.0;
    let mut radiative = 0.0;

    for emitter in emitters.iter_mut() {
        if remaining <= 1e-9 {
            break;
        }
        let delivered = emitter.demand_energy(remaining, true);
        let frac_conv = emitter.frac_convective();
        convective += delivered * frac_conv;
        radiative += delivered * (1.0 - frac_conv);
        remaining -= delivered;
        // Once a system has absorbed some demand, later systems in the
        // chain only need to cover what it couldn't - but its own minimum
        // output may already exceed what was asked, in which case the
        // recomputed remaining accounts for that next iteration via
        // `delivered` already reflecting the floor.
        let floor = emitter.min_output_kwh(timestep_h);
        if delivered < floor {
            remaining -= (floor - delivered).min(remaining);
        }
    }

    (convective, radiative, remaining.max(0.0))
}

/// Runs one timestep of the core orchestration sequence against a single
/// primary hot-water tank and a set of zones, each with independent
/// heating/cooling emitter chains. This is the minimal
/// faithful sequencing the core is responsible for; schedule construction
/// (occupancy/appliance/DHW-event generation) and the envelope finite
/// difference solve itself remain external collaborators reached only
/// through [`ZoneEnvelope`] and the `events` parameter.
#[allow(clippy::too_many_arguments)]
pub fn run_timestep(
    t: &SimulationTimeIteration,
    temp_ext_c: f32,
    cold_feed: &ColdWaterSource,
    hw_events: &[HotWaterEvent],
    mut primary_tank: Option<&mut StorageTank>,
    controls: &ControlDb,
    tank_flow_temp_c: f32,
    tank_source_temp_c: f32,
    pv_diverter: Option<&mut PvDiverter>,
    pv_surplus_kwh: f32,
    zones: &mut [Zone],
    zone_envelopes: &mut [Box<dyn ZoneEnvelope>],
    heating_chains: &mut [Vec<Box<dyn SpaceEmitter>>],
    cooling_chains: &mut [Vec<Box<dyn SpaceEmitter>>],
    setpoints_heat: &[Option<f32>],
    setpoints_cool: &[Option<f32>],
    gains_internal_kwh: &[f32],
    gains_solar_kwh: &[f32],
    frac_convective_h: f32,
    frac_convective_c: f32,
    min_ach: f32,
    max_ach: f32,
    frac_dhw_energy_internal_gains: f32,
    unmet_supply: &mut EnergySupply,
) -> TimestepSummary {
    let mut summary = TimestepSummary::default();

    // Step 1: previous-timestep volume-weighted internal air temperature is
    // read by callers before this function runs (e.g. to feed an
    // exhaust-air heat pump's source temperature); here we only need the
    // *current* value to report pipework/DHW internal gains against, which
    // for a well-mixed zone model is this timestep's own air temperature.
    let temp_internal_air = volume_weighted_mean_air_temp(zones);

    // Steps 2-5: hot-water demand, heat-source reheat dispatch and
    // pipework/DHW internal gains.
    if let Some(tank) = primary_tank.as_deref_mut() {
        let cold_feed_c = cold_feed.temp_c(t);
        let draw = tank.demand_hot_water(hw_events, cold_feed_c);
        summary.hw_energy_used_kwh = draw.energy_used_kwh;
        summary.hw_unmet_kwh = draw.unmet_kwh;
        if draw.unmet_kwh > 0.0 {
            unmet_supply
                .record_unmet_demand("hot_water", t.index, draw.unmet_kwh)
                .ok();
        }

        tank.dispatch_heat_sources(controls, t, tank_flow_temp_c, tank_source_temp_c);

        summary.pipework_gains_kwh = tank.take_pipework_gains_kwh();
        let dhw_gain_kwh = frac_dhw_energy_internal_gains
            * crate::material::WATER.volume_energy_content_kwh_k(
                draw.total_vol_drawoff_l,
                (draw.temp_average_drawoff_c - temp_internal_air).max(0.0),
            );
        summary.pipework_gains_kwh += dhw_gain_kwh;
    }

    // Step 6-8: ventilation/ach selection and per-zone demand.
    let mut demands: Vec<ZoneHeatCoolDemand> = Vec::with_capacity(zones.len());
    for (i, envelope) in zone_envelopes.iter_mut().enumerate() {
        let demand = envelope.space_heat_cool_demand(
            t,
            temp_ext_c,
            gains_internal_kwh.get(i).copied().unwrap_or(0.0),
            gains_solar_kwh.get(i).copied().unwrap_or(0.0),
            frac_convective_h,
            frac_convective_c,
            setpoints_heat.get(i).copied().flatten(),
            setpoints_cool.get(i).copied().flatten(),
            min_ach,
        );
        demands.push(demand);
    }
    let any_heating = demands.iter().any(|d| d.demand_heating_kwh > 1e-9);
    let any_cooling = demands.iter().any(|d| d.demand_cooling_kwh > 1e-9);
    let ach = select_ach(min_ach, max_ach, max_ach, any_heating, any_cooling);
    summary.ach_used = ach;

    // Step 9-11: dispatch heating/cooling chains, update zone temperatures.
    for (i, envelope) in zone_envelopes.iter_mut().enumerate() {
        let demand = demands[i];
        let (conv_h, rad_h, unmet_h) = heating_chains
            .get_mut(i)
            .map(|chain| dispatch_priority_chain(chain, demand.demand_heating_kwh, t.timestep))
            .unwrap_or((0.0, 0.0, demand.demand_heating_kwh));
        let (conv_c, rad_c, unmet_c) = cooling_chains
            .get_mut(i)
            .map(|chain| dispatch_priority_chain(chain, demand.demand_cooling_kwh, t.timestep))
            .unwrap_or((0.0, 0.0, demand.demand_cooling_kwh));

        summary.unmet_space_demand_kwh += unmet_h + unmet_c;
        if unmet_h + unmet_c > 1e-9 {
            unmet_supply
                .record_unmet_demand("space_conditioning", t.index, unmet_h + unmet_c)
                .ok();
        }

        envelope.update_temperatures(t, temp_ext_c, conv_h - conv_c, rad_h - rad_c, ach);
        if let Some(zone) = zones.get_mut(i) {
            zone.air_temp_c = envelope.air_temp_c();
            zone.operative_temp_c = envelope.operative_temp_c();
        }
    }

    // Step 12: end-of-timestep hooks on every stateful system. The PV
    // diverter gets first refusal on surplus generation (diverting it into
    // the tank's immersion layer rather than exporting it) before every
    // heat source, emitter and the diverter itself commit their
    // accumulated per-timestep state.
    if let (Some(diverter), Some(tank)) = (pv_diverter, primary_tank.as_deref_mut()) {
        diverter.divert(tank, pv_surplus_kwh, t.timestep);
        diverter.timestep_end();
    }
    if let Some(tank) = primary_tank {
        for hs in tank.heat_sources.iter_mut() {
            hs.source.timestep_end(t);
        }
    }
    for chain in heating_chains.iter_mut().chain(cooling_chains.iter_mut()) {
        for emitter in chain.iter_mut() {
            emitter.timestep_end(t);
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmitter {
        frac_convective: f32,
        max_output_kwh: f32,
    }
    impl SpaceEmitter for FixedEmitter {
        fn frac_convective(&self) -> f32 {
            self.frac_convective
        }
        fn demand_energy(&mut self, required_kwh: f32, _update_state: bool) -> f32 {
            required_kwh.min(self.max_output_kwh)
        }
    }

    struct StubZone {
        air_temp_c: f32,
    }
    impl ZoneEnvelope for StubZone {
        fn area_m2(&self) -> f32 {
            20.0
        }
        fn volume_m3(&self) -> f32 {
            50.0
        }
        fn air_temp_c(&self) -> f32 {
            self.air_temp_c
        }
        fn operative_temp_c(&self) -> f32 {
            self.air_temp_c
        }
        fn space_heat_cool_demand(
            &mut self,
            _t: &SimulationTimeIteration,
            _temp_ext_c: f32,
            _gains_internal_kwh: f32,
            _gains_solar_kwh: f32,
            _frac_convective_h: f32,
            _frac_convective_c: f32,
            setpnt_heat_c: Option<f32>,
            _setpnt_cool_c: Option<f32>,
            _ach: f32,
        ) -> ZoneHeatCoolDemand {
            ZoneHeatCoolDemand {
                demand_heating_kwh: if setpnt_heat_c.is_some() { 2.0 } else { 0.0 },
                demand_cooling_kwh: 0.0,
            }
        }
        fn update_temperatures(
            &mut self,
            _t: &SimulationTimeIteration,
            _temp_ext_c: f32,
            _gains_convective_kwh: f32,
            _gains_radiative_kwh: f32,
            _ach: f32,
        ) {
        }
    }

    fn t(index: usize) -> SimulationTimeIteration {
        SimulationTimeIteration {
            index,
            time: index as f32,
            timestep: 1.0,
        }
    }

    #[test]
    fn priority_chain_falls_through_to_second_system_for_remainder() {
        let mut chain: Vec<Box<dyn SpaceEmitter>> = vec![
            Box::new(FixedEmitter {
                frac_convective: 0.4,
                max_output_kwh: 1.0,
            }),
            Box::new(FixedEmitter {
                frac_convective: 1.0,
                max_output_kwh: 5.0,
            }),
        ];
        let (conv, rad, unmet) = dispatch_priority_chain(&mut chain, 2.0, 1.0);
        assert!(unmet < 1e-6);
        assert!(conv > 0.0 && rad > 0.0);
    }

    #[test]
    fn select_ach_uses_min_when_heating_demand_present() {
        assert_eq!(select_ach(0.5, 2.0, 1.0, true, true), 0.5);
        assert_eq!(select_ach(0.5, 2.0, 1.0, false, true), 2.0);
        assert_eq!(select_ach(0.5, 2.0, 1.0, false, false), 0.5);
    }

    #[test]
    fn no_heat_sources_tank_still_reports_unmet_demand_via_orchestrator() {
        let mut tank = StorageTank::new("dhw", 4, 40.0, 30.0, 18.0, 1.0);
        let cold = ColdWaterSource { values: vec![10.0] };
        let events = [HotWaterEvent {
            start_min: 0.0,
            duration_min: 5.0,
            warm_temp_c: 41.0,
            warm_volume_l: 20.0,
            pipework_volume_l: 0.0,
        }];
        let mut zones = vec![Zone::new("z1", 20.0, 50.0, 20.0)];
        let mut envelopes: Vec<Box<dyn ZoneEnvelope>> = vec![Box::new(StubZone { air_temp_c: 20.0 })];
        let mut heating: Vec<Vec<Box<dyn SpaceEmitter>>> = vec![Vec::new()];
        let mut cooling: Vec<Vec<Box<dyn SpaceEmitter>>> = vec![Vec::new()];
        let mut unmet_supply = EnergySupply::new(crate::energy_supply::FuelType::Electricity, 1);
        let controls = ControlDb::default();

        let summary = run_timestep(
            &t(0),
            5.0,
            &cold,
            &events,
            Some(&mut tank),
            &controls,
            55.0,
            7.0,
            None,
            0.0,
            &mut zones,
            &mut envelopes,
            &mut heating,
            &mut cooling,
            &[Some(21.0)],
            &[None],
            &[0.0],
            &[0.0],
            0.4,
            0.1,
            0.5,
            2.0,
            0.25,
            &mut unmet_supply,
        );

        assert!(summary.hw_unmet_kwh > 0.0);
        assert!(unmet_supply.total_unmet_demand(0) > 0.0);
    }
}
