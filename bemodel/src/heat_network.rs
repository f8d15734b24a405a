// Distributed under the MIT License
// (See accompanying LICENSE file or a copy at http://opensource.org/licenses/MIT)

//! Heat-network interface unit: a thin heat source with a fixed maximum
//! power and a prorated HIU/distribution standing loss.

use crate::heat_source::HeatSourceService;
use crate::simtime::SimulationTimeIteration;

pub struct HeatNetworkService {
    pub power_max_kw: f32,
    pub hiu_daily_loss_kwh: f32,
    pub building_distribution_loss_w: f32,
    pub n_connected_services: u32,
    drawn_this_timestep_kwh: f32,
}

impl HeatNetworkService {
    pub fn new(power_max_kw: f32, hiu_daily_loss_kwh: f32, building_distribution_loss_w: f32) -> Self {
        Self {
            power_max_kw,
            hiu_daily_loss_kwh,
            building_distribution_loss_w,
            n_connected_services: 1,
            drawn_this_timestep_kwh: 0.0,
        }
    }

    /// HIU standing loss plus this service's share of the building
    /// distribution loss, prorated to one timestep.
    pub fn end_of_timestep_losses_kwh(&self, timestep_h: f32) -> f32 {
        let hiu = self.hiu_daily_loss_kwh * timestep_h / 24.0;
        let distribution = self.building_distribution_loss_w / 1000.0 * timestep_h
            / self.n_connected_services.max(1) as f32;
        hiu + distribution
    }
}

impl HeatSourceService for HeatNetworkService {
    fn energy_output_max(&mut self, _flow_temp_c: f32, _return_temp_c: Option<f32>) -> f32 {
        // time_available is the full timestep minus whatever has already
        // been drawn by an earlier service sharing this interface this step.
        (self.power_max_kw - self.drawn_this_timestep_kwh).max(0.0)
    }

    fn demand_energy(
        &mut self,
        energy_demand_kwh: f32,
        flow_temp_c: f32,
        return_temp_c: Option<f32>,
        update_state: bool,
    ) -> f32 {
        let max = self.energy_output_max(flow_temp_c, return_temp_c);
        let delivered = energy_demand_kwh.min(max);
        if update_state {
            self.drawn_this_timestep_kwh += delivered;
        }
        delivered
    }

    fn timestep_end(&mut self, _t: &SimulationTimeIteration) {
        self.drawn_this_timestep_kwh = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demand_is_capped_at_power_max() {
        let mut hn = HeatNetworkService::new(10.0, 2.0, 100.0);
        let delivered = hn.demand_energy(12.0, 60.0, None, true);
        assert!((delivered - 10.0).abs() < 1e-6);
    }

    #[test]
    fn losses_are_prorated_to_timestep() {
        let hn = HeatNetworkService::new(10.0, 24.0, 0.0);
        let loss = hn.end_of_timestep_losses_kwh(1.0);
        assert!((loss - 1.0).abs() < 1e-6);
    }
}
