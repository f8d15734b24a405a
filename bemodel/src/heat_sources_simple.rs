// Distributed under the MIT License
// (See accompanying LICENSE file or a copy at http://opensource.org/licenses/MIT)

//! The simple, non-modulating [`HeatSourceService`] implementations a
//! storage tank dispatches alongside a heat pump or heat battery service:
//! an immersion heater, a gas/electric boiler and a solar-thermal collector.

use crate::heat_source::HeatSourceService;
use crate::simtime::SimulationTimeIteration;

/// A resistive immersion heater of fixed electrical rating; 100% efficient
/// (all electrical input becomes heat at the heater layer).
pub struct ImmersionHeater {
    pub rated_power_kw: f32,
    energy_this_timestep_kwh: f32,
}

impl ImmersionHeater {
    pub fn new(rated_power_kw: f32) -> Self {
        Self {
            rated_power_kw,
            energy_this_timestep_kwh: 0.0,
        }
    }
}

impl HeatSourceService for ImmersionHeater {
    fn energy_output_max(&mut self, _flow_temp_c: f32, _return_temp_c: Option<f32>) -> f32 {
        self.rated_power_kw
    }

    fn demand_energy(
        &mut self,
        energy_demand_kwh: f32,
        _flow_temp_c: f32,
        _return_temp_c: Option<f32>,
        update_state: bool,
    ) -> f32 {
        let delivered = energy_demand_kwh.min(self.rated_power_kw);
        if update_state {
            self.energy_this_timestep_kwh += delivered;
        }
        delivered
    }

    fn timestep_end(&mut self, _t: &SimulationTimeIteration) {
        self.energy_this_timestep_kwh = 0.0;
    }
}

/// A gas or electric boiler of fixed output rating and constant efficiency.
pub struct Boiler {
    pub rated_power_kw: f32,
    pub efficiency: f32,
}

impl Boiler {
    pub fn new(rated_power_kw: f32, efficiency: f32) -> Self {
        Self {
            rated_power_kw,
            efficiency,
        }
    }

    /// Fuel energy consumed to deliver `delivered_kwh` of heat.
    pub fn fuel_energy_kwh(&self, delivered_kwh: f32) -> f32 {
        delivered_kwh / self.efficiency.max(1e-6)
    }
}

impl HeatSourceService for Boiler {
    fn energy_output_max(&mut self, _flow_temp_c: f32, _return_temp_c: Option<f32>) -> f32 {
        self.rated_power_kw
    }

    fn demand_energy(
        &mut self,
        energy_demand_kwh: f32,
        _flow_temp_c: f32,
        _return_temp_c: Option<f32>,
        _update_state: bool,
    ) -> f32 {
        energy_demand_kwh.min(self.rated_power_kw)
    }
}

/// A flat-plate/evacuated-tube solar-thermal collector: delivers whatever
/// useful heat the current irradiance and collector efficiency curve allow,
/// independent of any control schedule.
pub struct SolarThermalCollector {
    pub area_m2: f32,
    pub zero_loss_efficiency: f32,
    pub heat_loss_coeff_w_per_m2_k: f32,
    current_irradiance_w_per_m2: f32,
    current_ambient_c: f32,
}

impl SolarThermalCollector {
    pub fn new(area_m2: f32, zero_loss_efficiency: f32, heat_loss_coeff_w_per_m2_k: f32) -> Self {
        Self {
            area_m2,
            zero_loss_efficiency,
            heat_loss_coeff_w_per_m2_k,
            current_irradiance_w_per_m2: 0.0,
            current_ambient_c: 0.0,
        }
    }

    /// Updates the boundary conditions the collector uses for this
    /// timestep's output; must be called before `energy_output_max`.
    pub fn set_conditions(&mut self, irradiance_w_per_m2: f32, ambient_c: f32) {
        self.current_irradiance_w_per_m2 = irradiance_w_per_m2;
        self.current_ambient_c = ambient_c;
    }
}

impl HeatSourceService for SolarThermalCollector {
    fn energy_output_max(&mut self, flow_temp_c: f32, _return_temp_c: Option<f32>) -> f32 {
        let gain_w_per_m2 = self.zero_loss_efficiency * self.current_irradiance_w_per_m2
            - self.heat_loss_coeff_w_per_m2_k * (flow_temp_c - self.current_ambient_c).max(0.0);
        (gain_w_per_m2.max(0.0) * self.area_m2 / 1000.0).max(0.0)
    }

    fn demand_energy(
        &mut self,
        energy_demand_kwh: f32,
        flow_temp_c: f32,
        return_temp_c: Option<f32>,
        _update_state: bool,
    ) -> f32 {
        energy_demand_kwh.min(self.energy_output_max(flow_temp_c, return_temp_c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immersion_caps_delivery_at_rated_power() {
        let mut h = ImmersionHeater::new(3.0);
        assert_eq!(h.demand_energy(5.0, 55.0, None, true), 3.0);
    }

    #[test]
    fn boiler_fuel_energy_divides_by_efficiency() {
        let b = Boiler::new(24.0, 0.9);
        assert!((b.fuel_energy_kwh(9.0) - 10.0).abs() < 1e-4);
    }

    #[test]
    fn solar_collector_output_is_zero_with_no_irradiance() {
        let mut c = SolarThermalCollector::new(4.0, 0.7, 4.0);
        c.set_conditions(0.0, 10.0);
        assert_eq!(c.energy_output_max(50.0, None), 0.0);
    }

    #[test]
    fn solar_collector_output_scales_with_irradiance() {
        let mut c = SolarThermalCollector::new(4.0, 0.7, 4.0);
        c.set_conditions(800.0, 20.0);
        let out = c.energy_output_max(40.0, None);
        assert!(out > 0.0);
    }
}
