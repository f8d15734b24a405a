// Distributed under the MIT License
// (See accompanying LICENSE file or a copy at http://opensource.org/licenses/MIT)

//! Phase-change heat battery: a stack of discretised zones charged
//! electrically and discharged by hydraulic flow through a heat exchanger.

use crate::material::WATER;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    /// Flow-driven discharge, optionally with simultaneous electric charging.
    Normal,
    /// No flow; zones are charged top-down with no heat transfer to water.
    OnlyCharging,
    /// Ambient-driven standing loss only.
    Losses,
}

/// Heat capacity of one zone's material above, within and below the
/// phase-transition band, in kJ/K.
#[derive(Debug, Clone, Copy)]
pub struct ZoneHeatCapacity {
    pub above_kj_per_k: f32,
    pub within_kj_per_k: f32,
    pub below_kj_per_k: f32,
}

pub struct HeatBattery {
    pub n_zones: usize,
    pub zone_temps_c: Vec<f32>,
    pub temp_lo_c: f32,
    pub temp_hi_c: f32,
    pub capacity: ZoneHeatCapacity,
    pub hex_surface_area_m2: f32,
    pub capillary_diameter_m: f32,
    pub reference_velocity_m_per_s: f32,
    pub coeff_a: f32,
    pub coeff_b: f32,
    pub rated_charge_power_kw: f32,
    pub max_standing_loss_kw: f32,
    pub hb_time_step_s: f32,
    pub min_service_run_time_s: f32,
    pub temp_ambient_c: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DischargeResult {
    pub energy_delivered_kwh: f32,
    pub outlet_temp_c: f32,
    pub time_run_s: f32,
}

impl HeatBattery {
    pub fn new(
        n_zones: usize,
        initial_temp_c: f32,
        temp_lo_c: f32,
        temp_hi_c: f32,
        capacity: ZoneHeatCapacity,
        hex_surface_area_m2: f32,
        capillary_diameter_m: f32,
        reference_velocity_m_per_s: f32,
        coeff_a: f32,
        coeff_b: f32,
        rated_charge_power_kw: f32,
        max_standing_loss_kw: f32,
        temp_ambient_c: f32,
    ) -> Self {
        Self {
            n_zones,
            zone_temps_c: vec![initial_temp_c; n_zones],
            temp_lo_c,
            temp_hi_c,
            capacity,
            hex_surface_area_m2,
            capillary_diameter_m,
            reference_velocity_m_per_s,
            coeff_a,
            coeff_b,
            rated_charge_power_kw,
            max_standing_loss_kw,
            hb_time_step_s: 20.0,
            min_service_run_time_s: 120.0,
            temp_ambient_c,
        }
    }

    /// Kinematic viscosity of water (m^2/s) as a quadratic function of
    /// temperature in degrees C - an empirical fit good over the 0-100C
    /// operating range of a domestic heat battery.
    fn kinematic_viscosity(temp_c: f32) -> f32 {
        let a = 1.78e-6;
        let b = -4.7e-8;
        let c = 6.5e-10;
        (a + b * temp_c + c * temp_c * temp_c).max(1e-8)
    }

    fn overall_heat_transfer_coeff(&self, avg_circuit_temp_c: f32, flow_l_per_min: f32) -> f32 {
        let nu = Self::kinematic_viscosity(avg_circuit_temp_c);
        let reynolds_at_1l = self.reference_velocity_m_per_s * self.capillary_diameter_m / nu;
        self.hex_surface_area_m2 * (reynolds_at_1l * flow_l_per_min.max(1e-6)).ln() * self.coeff_a + self.coeff_b
    }

    fn zone_capacity_kj_per_k(&self, temp_c: f32) -> f32 {
        if temp_c < self.temp_lo_c {
            self.capacity.below_kj_per_k
        } else if temp_c > self.temp_hi_c {
            self.capacity.above_kj_per_k
        } else {
            self.capacity.within_kj_per_k
        }
    }

    /// Mixes inlet water with one zone per the heat-exchanger energy balance,
    /// returning the outlet temperature and crediting/debiting the zone's
    /// energy content.
    fn step_zone(&mut self, zone: usize, inlet_temp_c: f32, flow_l_per_min: f32, dt_s: f32) -> (f32, f32) {
        let avg_circuit_temp = 0.5 * (inlet_temp_c + self.zone_temps_c[zone]);
        let ua = self.overall_heat_transfer_coeff(avg_circuit_temp, flow_l_per_min);
        let m_dot_kg_per_s = flow_l_per_min * WATER.density / 60.0;
        let c_kj_per_kg_k = WATER.specific_heat_capacity;
        let mc = m_dot_kg_per_s * c_kj_per_kg_k; // kW/K

        let t_zone = self.zone_temps_c[zone];
        let denom = 2.0 * mc + ua;
        let outlet_temp_c = if denom.abs() > 1e-9 {
            (2.0 * ua * t_zone - ua * inlet_temp_c + 2.0 * mc * inlet_temp_c) / denom
        } else {
            t_zone
        };

        let energy_transf_kj = mc * (outlet_temp_c - inlet_temp_c) * dt_s;
        let cap = self.zone_capacity_kj_per_k(t_zone).max(1e-6);
        self.zone_temps_c[zone] -= energy_transf_kj / cap;
        (outlet_temp_c, -energy_transf_kj / 3600.0)
    }

    /// Discharges the battery to meet `target_kwh` at `target_outlet_temp_c`,
    /// running the inner `hb_time_step_s` loop until the energy is delivered
    /// or the outlet temperature falls below target. The loop is explicitly
    /// bounded by `timestep_h / hb_time_step_s` inner steps so it terminates
    /// even if the target is never reached.
    pub fn discharge_service(
        &mut self,
        target_kwh: f32,
        target_outlet_temp_c: f32,
        inlet_temp_c: f32,
        flow_l_per_min: f32,
        timestep_h: f32,
    ) -> DischargeResult {
        let dt_s = self.hb_time_step_s;
        let max_steps = ((timestep_h * 3600.0) / dt_s).ceil() as usize;
        let mut delivered_kwh = 0.0;
        let mut last_outlet = inlet_temp_c;
        let mut time_run_s = 0.0;
        let mut zone = 0usize;

        for _ in 0..max_steps {
            if delivered_kwh >= target_kwh - 1e-9 || zone >= self.n_zones {
                break;
            }
            let (outlet, energy_kwh) = self.step_zone(zone, inlet_temp_c, flow_l_per_min, dt_s);
            if outlet < target_outlet_temp_c && time_run_s >= self.min_service_run_time_s {
                zone += 1;
                if zone >= self.n_zones {
                    break;
                }
                continue;
            }
            delivered_kwh += energy_kwh.max(0.0);
            last_outlet = outlet;
            time_run_s += dt_s;
        }

        DischargeResult {
            energy_delivered_kwh: delivered_kwh,
            outlet_temp_c: last_outlet,
            time_run_s,
        }
    }

    /// Electric charging (Normal mode's simultaneous-charge path, or
    /// OnlyCharging mode): pushes up to `rated_charge_power_kw * dt_h` into
    /// the lowest zone below `target_charge_temp_c`, subject to the per-step
    /// energy budget and the charge-target cap.
    pub fn charge(&mut self, target_charge_temp_c: f32, dt_h: f32) -> f32 {
        let budget_kwh = self.rated_charge_power_kw * dt_h;
        let mut remaining = budget_kwh;
        for zone in 0..self.n_zones {
            if remaining <= 1e-9 {
                break;
            }
            let t = self.zone_temps_c[zone];
            if t >= target_charge_temp_c {
                continue;
            }
            let cap = self.zone_capacity_kj_per_k(t).max(1e-6);
            let headroom_kwh = cap * (target_charge_temp_c - t) / 3600.0;
            let take = remaining.min(headroom_kwh);
            self.zone_temps_c[zone] += take * 3600.0 / cap;
            remaining -= take;
        }
        budget_kwh - remaining
    }

    /// Standing loss applied for `dt_h` hours at the fixed `max_standing_loss_kw`
    /// rate, split evenly across zones, clamped so no zone goes below ambient.
    pub fn apply_standing_loss(&mut self, dt_h: f32) {
        let loss_kwh = self.max_standing_loss_kw * dt_h;
        let per_zone_kwh = loss_kwh / self.n_zones as f32;
        for zone in 0..self.n_zones {
            let t = self.zone_temps_c[zone];
            let cap = self.zone_capacity_kj_per_k(t).max(1e-6);
            let delta = per_zone_kwh * 3600.0 / cap;
            self.zone_temps_c[zone] = (t - delta).max(self.temp_ambient_c);
        }
    }

    /// End-of-timestep hook: applies standing loss for whatever time remains
    /// after a service ran, then continues charging for the remainder in
    /// ONLY_CHARGING mode.
    pub fn timestep_end(&mut self, time_used_h: f32, timestep_h: f32, target_charge_temp_c: f32) -> f32 {
        let remaining_h = (timestep_h - time_used_h).max(0.0);
        self.apply_standing_loss(remaining_h);
        self.charge(target_charge_temp_c, remaining_h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battery() -> HeatBattery {
        HeatBattery::new(
            8,
            20.0,
            50.0,
            60.0,
            ZoneHeatCapacity {
                above_kj_per_k: 2.0,
                within_kj_per_k: 50.0,
                below_kj_per_k: 2.0,
            },
            0.5,
            0.002,
            0.01,
            2.0,
            1.0,
            5.0,
            0.05,
            18.0,
        )
    }

    /// E4: 0 L/min flow (pure charging), 5 kW electric for one hour, all
    /// zones start at 20C, cap at 75C.
    #[test]
    fn charging_bounded_by_capacity_and_temperature_cap() {
        let mut hb = battery();
        let charged = hb.charge(75.0, 1.0);
        assert!(charged <= 5.0 + 1e-6);
        assert!(hb.zone_temps_c.iter().all(|&t| t <= 75.0 + 1e-3));
    }

    #[test]
    fn standing_loss_never_drops_below_ambient() {
        let mut hb = battery();
        hb.zone_temps_c = vec![19.0; 8];
        hb.apply_standing_loss(10.0);
        assert!(hb.zone_temps_c.iter().all(|&t| t >= 18.0 - 1e-3));
    }

    #[test]
    fn discharge_terminates_within_bounded_inner_steps() {
        let mut hb = battery();
        hb.zone_temps_c = vec![65.0; 8];
        let result = hb.discharge_service(2.0, 40.0, 20.0, 3.0, 1.0);
        assert!(result.time_run_s <= 3600.0 + 1e-3);
    }
}
