// Distributed under the MIT License
// (See accompanying LICENSE file or a copy at http://opensource.org/licenses/MIT)

//! Capability shared by every device a storage tank or zone can dispatch heat to.
//!
//! A tank holds `Vec<Box<dyn HeatSourceService>>` rather than shared mutable
//! references into sibling immersion/heat-pump/boiler objects - dispatch order
//! is whatever order the tank iterates its own vector in, and there is never
//! a second owner of a heat source's state.

use crate::simtime::SimulationTimeIteration;

/// A source of heat (or cooling) energy that a storage tank, zone emitter or
/// diverter can query and draw from.
///
/// `demand_energy` with `update_state = false` is the "dry run" contract:
/// it must compute and return the energy that *would* be delivered
/// without mutating any state that a subsequent real call would observe
/// differently (service-result buffers, running-time accumulators, tank
/// layers). Implementations satisfy this by snapshotting the handful of
/// fields that would otherwise change and restoring them before returning,
/// rather than deep-copying the whole object.
pub trait HeatSourceService {
    /// Maximum energy (kWh) this source could deliver this timestep at
    /// `flow_temp_c`, ignoring any subsequent curtailment by the caller.
    fn energy_output_max(&mut self, flow_temp_c: f32, return_temp_c: Option<f32>) -> f32;

    /// Draws up to `energy_demand_kwh` from the source, returning the energy
    /// actually delivered. When `update_state` is false, internal state must
    /// be left exactly as it was found.
    fn demand_energy(
        &mut self,
        energy_demand_kwh: f32,
        flow_temp_c: f32,
        return_temp_c: Option<f32>,
        update_state: bool,
    ) -> f32;

    /// Setpoint min/max this source is controlled to this timestep, if any.
    fn setpnt(&self, t: &SimulationTimeIteration) -> (Option<f32>, Option<f32>) {
        let _ = t;
        (None, None)
    }

    /// Pushes this timestep's boundary conditions (the source temperature a
    /// heat pump evaporates against, a heat battery's discharge flow rate,
    /// ...) into the source before it is queried. A source with no boundary
    /// conditions beyond `flow_temp_c`/`return_temp_c` (immersion, boiler,
    /// heat network) leaves this as a no-op.
    fn set_boundary_conditions(&mut self, t: &SimulationTimeIteration, temp_source_c: f32) {
        let _ = (t, temp_source_c);
    }

    /// End-of-timestep hook: commit accumulated service results, reset
    /// per-timestep accumulators, run standing-loss/recovery bookkeeping.
    fn timestep_end(&mut self, t: &SimulationTimeIteration) {
        let _ = t;
    }
}
