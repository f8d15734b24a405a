// Distributed under the MIT License
// (See accompanying LICENSE file or a copy at http://opensource.org/licenses/MIT)

//! Electric heat pump: EN 14825 test-data interpolation, source-temperature
//! lookup, per-service demand dispatch and end-of-timestep aggregation.

use log::warn;

use crate::errors::HemError;
use crate::utils::interp_series;

/// One of the EN 14825 test conditions a manufacturer publishes capacity/CoP
/// pairs for. `Cld` is the synthetic "coldest condition" record some data
/// sets add below `F`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestLetter {
    A,
    B,
    C,
    D,
    F,
    Cld,
}

#[derive(Debug, Clone, Copy)]
pub struct HeatPumpTestDatum {
    pub design_flow_temp_c: f32,
    pub test_letter: TestLetter,
    pub capacity_kw: f32,
    pub cop: f32,
    pub degradation_coeff: f32,
    pub temp_outlet_c: f32,
    pub temp_source_c: f32,
    pub temp_test_c: f32,
}

impl HeatPumpTestDatum {
    fn carnot_cop(&self) -> f32 {
        carnot_cop(self.temp_outlet_c + 273.15, self.temp_source_c + 273.15, 0.01)
    }

    fn exergetic_efficiency(&self) -> f32 {
        self.cop / self.carnot_cop().max(1e-6)
    }
}

/// `T_out_K / max(T_out_K - T_source_K, limit)`.
pub fn carnot_cop(t_outlet_k: f32, t_source_k: f32, limit_k: f32) -> f32 {
    t_outlet_k / (t_outlet_k - t_source_k).max(limit_k)
}

/// Condenser temperature spread tabled against design flow temperature, a
/// fixed physical table independent of the test data actually supplied.
const CONDENSER_SPREAD_TABLE: [(f32, f32); 5] = [
    (20.0, 5.0),
    (35.0, 5.0),
    (45.0, 6.0),
    (55.0, 8.0),
    (65.0, 10.0),
];

pub fn condenser_temp_spread(flow_temp_c: f32) -> f32 {
    interp_series(flow_temp_c, &CONDENSER_SPREAD_TABLE)
}

/// All test records sharing one design flow temperature, sorted ascending by
/// `temp_test_c`, plus their construction-time derived quantities.
struct DesignFlowGroup {
    design_flow_temp_c: f32,
    records: Vec<HeatPumpTestDatum>,
    avg_cop_a_d: f32,
    avg_capacity_a_d: f32,
    avg_degradation_coeff_a_d: f32,
    /// Quadratic-in-outside-temperature regression `cop = a + b*t + c*t^2`,
    /// fit over the A-D records against `temp_source_c`.
    cop_regression: (f32, f32, f32),
    coldest_capacity_kw: f32,
}

impl DesignFlowGroup {
    fn record_for(&self, letter: TestLetter) -> Option<&HeatPumpTestDatum> {
        self.records.iter().find(|r| r.test_letter == letter)
    }

    fn theoretical_load_ratio(&self, r: &HeatPumpTestDatum) -> f32 {
        r.capacity_kw / self.coldest_capacity_kw.max(1e-6)
    }
}

/// EN 14825 test-data interpolator for one heat pump.
pub struct HeatPumpTestData {
    groups: Vec<DesignFlowGroup>,
}

impl HeatPumpTestData {
    /// Builds the interpolator from raw manufacturer records: disambiguates
    /// duplicate `(design_flow_temp, temp_test)` pairs by perturbing
    /// `temp_test` by `1e-10`, groups by design flow temperature, sorts each
    /// group by `temp_test_c` and pre-computes the derived quantities.
    ///
    /// Fails construction if any group ends up with fewer than 4 distinct
    /// records after disambiguation.
    pub fn new(mut records: Vec<HeatPumpTestDatum>) -> Result<Self, HemError> {
        records.sort_by(|a, b| {
            a.design_flow_temp_c
                .partial_cmp(&b.design_flow_temp_c)
                .unwrap()
                .then(a.temp_test_c.partial_cmp(&b.temp_test_c).unwrap())
        });

        // Disambiguate duplicate (design_flow_temp, temp_test) pairs.
        for i in 1..records.len() {
            if (records[i].design_flow_temp_c - records[i - 1].design_flow_temp_c).abs() < 1e-6
                && (records[i].temp_test_c - records[i - 1].temp_test_c).abs() < 1e-9
            {
                records[i].temp_test_c += 1e-10;
            }
        }

        let mut flow_temps: Vec<f32> = records.iter().map(|r| r.design_flow_temp_c).collect();
        flow_temps.dedup_by(|a, b| (*a - *b).abs() < 1e-6);

        let mut groups = Vec::with_capacity(flow_temps.len());
        for flow_temp in flow_temps {
            let mut group_records: Vec<HeatPumpTestDatum> = records
                .iter()
                .copied()
                .filter(|r| (r.design_flow_temp_c - flow_temp).abs() < 1e-6)
                .collect();
            group_records.sort_by(|a, b| a.temp_test_c.partial_cmp(&b.temp_test_c).unwrap());

            if group_records.len() < 4 {
                return Err(HemError::input(
                    "heat_source_wet.test_data",
                    format!(
                        "design_flow_temp {flow_temp} has only {} distinct test records, need >= 4",
                        group_records.len()
                    ),
                ));
            }

            let a_d: Vec<&HeatPumpTestDatum> = group_records
                .iter()
                .filter(|r| matches!(r.test_letter, TestLetter::A | TestLetter::B | TestLetter::C | TestLetter::D))
                .collect();
            let n_ad = a_d.len().max(1) as f32;
            let avg_cop_a_d = a_d.iter().map(|r| r.cop).sum::<f32>() / n_ad;
            let avg_capacity_a_d = a_d.iter().map(|r| r.capacity_kw).sum::<f32>() / n_ad;
            let avg_degradation_coeff_a_d = a_d.iter().map(|r| r.degradation_coeff).sum::<f32>() / n_ad;

            let cop_regression = quadratic_regression(
                &a_d.iter().map(|r| (r.temp_source_c, r.cop)).collect::<Vec<_>>(),
            );

            let coldest_capacity_kw = group_records[0].capacity_kw;

            groups.push(DesignFlowGroup {
                design_flow_temp_c: flow_temp,
                records: group_records,
                avg_cop_a_d,
                avg_capacity_a_d,
                avg_degradation_coeff_a_d,
                cop_regression,
                coldest_capacity_kw,
            });
        }

        groups.sort_by(|a, b| a.design_flow_temp_c.partial_cmp(&b.design_flow_temp_c).unwrap());
        Ok(Self { groups })
    }

    fn interp_over_groups(&self, flow_temp_c: f32, f: impl Fn(&DesignFlowGroup) -> f32) -> f32 {
        let points: Vec<(f32, f32)> = self.groups.iter().map(|g| (g.design_flow_temp_c, f(g))).collect();
        interp_series(flow_temp_c, &points)
    }

    pub fn average_degradation_coeff(&self, flow_temp_c: f32) -> f32 {
        self.interp_over_groups(flow_temp_c, |g| g.avg_degradation_coeff_a_d)
    }

    pub fn average_capacity(&self, flow_temp_c: f32) -> f32 {
        self.interp_over_groups(flow_temp_c, |g| g.avg_capacity_a_d)
    }

    pub fn temp_spread_test_conditions(&self, flow_temp_c: f32) -> f32 {
        condenser_temp_spread(flow_temp_c)
    }

    pub fn carnot_cop_at_test_condition(&self, letter: TestLetter, flow_temp_c: f32) -> f32 {
        self.interp_over_groups(flow_temp_c, |g| {
            g.record_for(letter).map(|r| r.carnot_cop()).unwrap_or(0.0)
        })
    }

    /// Load ratio at the operating condition, normalised by the ratio of
    /// operating to test-condition Carnot CoP, clamped to at least 1.
    pub fn lr_op_cond(&self, flow_temp_c: f32, temp_source_c: f32, carnot_cop_op_cond: f32) -> f32 {
        self.interp_over_groups(flow_temp_c, |g| {
            let cold = &g.records[0];
            let lr_cold = g.theoretical_load_ratio(cold);
            let t_out_cold_k = cold.temp_outlet_c + 273.15;
            let t_src_cold_k = cold.temp_source_c + 273.15;
            let t_out_k = g.design_flow_temp_c + 273.15;
            let t_src_k = temp_source_c + 273.15;
            let carnot_test = carnot_cop(t_out_cold_k, t_src_cold_k, 0.01);
            let ratio = (t_out_cold_k * t_src_k) / (t_out_k * t_src_cold_k.max(1.0));
            let lr = lr_cold * ratio.powi(3) * (carnot_test / carnot_cop_op_cond.max(1e-6));
            lr.max(1.0)
        })
    }

    /// Finds the two test records bracketing `lr_op` by theoretical load
    /// ratio within each group, interpolates `(lr, efficiency, degradation)`
    /// for each, then interpolates those pairs across design flow
    /// temperature.
    pub fn lr_eff_degcoeff_either_side_of_op_cond(&self, flow_temp_c: f32, lr_op: f32) -> (f32, f32) {
        let eff = self.interp_over_groups(flow_temp_c, |g| self.bracket_in_group(g, lr_op).0);
        let deg = self.interp_over_groups(flow_temp_c, |g| self.bracket_in_group(g, lr_op).1);
        (eff, deg)
    }

    fn bracket_in_group(&self, g: &DesignFlowGroup, lr_op: f32) -> (f32, f32) {
        let mut lrs: Vec<(f32, &HeatPumpTestDatum)> =
            g.records.iter().map(|r| (g.theoretical_load_ratio(r), r)).collect();
        lrs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        let upper_idx = lrs.iter().position(|(lr, _)| *lr > lr_op).unwrap_or(lrs.len() - 1);
        let lower_idx = upper_idx.saturating_sub(1);
        let (lr0, r0) = lrs[lower_idx];
        let (lr1, r1) = lrs[upper_idx];
        let eff = if (lr1 - lr0).abs() < 1e-9 {
            r0.exergetic_efficiency()
        } else {
            crate::utils::lerp(lr_op, lr0, r0.exergetic_efficiency(), lr1, r1.exergetic_efficiency())
        };
        let deg = if (lr1 - lr0).abs() < 1e-9 {
            r0.degradation_coeff
        } else {
            crate::utils::lerp(lr_op, lr0, r0.degradation_coeff, lr1, r1.degradation_coeff)
        };
        (eff, deg)
    }

    /// CoP at operating conditions for a non-air source (ground, water,
    /// heat-network): evaluates the quadratic regression against the
    /// external temperature, then rescales for the actual outlet/source
    /// temperatures.
    pub fn cop_op_cond_if_not_air_source(
        &self,
        temp_diff_limit_k: f32,
        temp_ext_c: f32,
        temp_src_c: f32,
        temp_out_c: f32,
    ) -> f32 {
        self.interp_over_groups(temp_out_c, |g| {
            let (a, b, c) = g.cop_regression;
            let cop_reg = a + b * temp_ext_c + c * temp_ext_c * temp_ext_c;
            let cold = &g.records[0];
            let t_out_cold_k = cold.temp_outlet_c + 273.15;
            let t_src_cold_k = cold.temp_source_c + 273.15;
            let t_out_k = g.design_flow_temp_c + 273.15;
            let t_src_k = temp_src_c + 273.15;
            let scale = (t_out_k * (t_out_cold_k - t_src_cold_k))
                / (t_out_cold_k * (t_out_k - t_src_k).max(temp_diff_limit_k));
            cop_reg * scale
        })
    }

    /// Rated capacity at operating conditions. For modulating controls
    /// scales the coldest-condition capacity by the cubed temperature ratio;
    /// otherwise linearly interpolates between the coldest and `D` records
    /// in `(temperature_difference, capacity)` space.
    pub fn capacity_op_cond_var_flow_or_source_temp(
        &self,
        temp_out_c: f32,
        temp_src_c: f32,
        modulating: bool,
    ) -> f32 {
        self.interp_over_groups(temp_out_c, |g| {
            let cold = &g.records[0];
            if modulating {
                let t_out_cold_k = cold.temp_outlet_c + 273.15;
                let t_src_cold_k = cold.temp_source_c + 273.15;
                let t_out_k = temp_out_c + 273.15;
                let t_src_k = temp_src_c + 273.15;
                let ratio = (t_out_cold_k * t_src_k) / (t_out_k * t_src_cold_k.max(1.0));
                cold.capacity_kw * ratio.powi(3)
            } else if let Some(d) = g.record_for(TestLetter::D) {
                let dt = (temp_out_c - temp_src_c).max(0.0);
                let dt_cold = (cold.temp_outlet_c - cold.temp_source_c).max(0.0);
                let dt_d = (d.temp_outlet_c - d.temp_source_c).max(0.0);
                crate::utils::lerp(dt, dt_cold, cold.capacity_kw, dt_d, d.capacity_kw)
            } else {
                cold.capacity_kw
            }
        })
    }

    /// Correction applied when the emitter's temperature spread differs from
    /// the test-condition spread.
    pub fn temp_spread_correction(
        &self,
        temp_out_c: f32,
        temp_src_c: f32,
        spread_emit_k: f32,
        dt_cond_k: f32,
        dt_evap_k: f32,
    ) -> f32 {
        self.interp_over_groups(temp_out_c, |g| {
            let spread_test = condenser_temp_spread(g.design_flow_temp_c);
            1.0 - (spread_test - spread_emit_k)
                / (2.0 * (temp_out_c - spread_test / 2.0 + dt_cond_k - temp_src_c + dt_evap_k)).max(1e-3)
        })
    }
}

/// Ordinary-least-squares fit of `y = a + b*x + c*x^2`. Falls back to the
/// mean of `y` when fewer than 3 points are given (can't determine a unique
/// quadratic).
fn quadratic_regression(points: &[(f32, f32)]) -> (f32, f32, f32) {
    if points.len() < 3 {
        let mean = if points.is_empty() {
            0.0
        } else {
            points.iter().map(|p| p.1).sum::<f32>() / points.len() as f32
        };
        return (mean, 0.0, 0.0);
    }
    let n = points.len() as f64;
    let (mut sx, mut sx2, mut sx3, mut sx4) = (0f64, 0f64, 0f64, 0f64);
    let (mut sy, mut sxy, mut sx2y) = (0f64, 0f64, 0f64);
    for &(x, y) in points {
        let (x, y) = (x as f64, y as f64);
        let x2 = x * x;
        sx += x;
        sx2 += x2;
        sx3 += x2 * x;
        sx4 += x2 * x2;
        sy += y;
        sxy += x * y;
        sx2y += x2 * y;
    }
    // Solve the 3x3 normal-equations system by Cramer's rule.
    let m = [[n, sx, sx2], [sx, sx2, sx3], [sx2, sx3, sx4]];
    let v = [sy, sxy, sx2y];
    match solve3(m, v) {
        Some([a, b, c]) => (a as f32, b as f32, c as f32),
        None => {
            let mean = (sy / n) as f32;
            (mean, 0.0, 0.0)
        }
    }
}

fn det3(m: [[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn solve3(m: [[f64; 3]; 3], v: [f64; 3]) -> Option<[f64; 3]> {
    let d = det3(m);
    if d.abs() < 1e-9 {
        return None;
    }
    let mut out = [0.0; 3];
    for col in 0..3 {
        let mut mc = m;
        for row in 0..3 {
            mc[row][col] = v[row];
        }
        out[col] = det3(mc) / d;
    }
    Some(out)
}

// ---------------------------------------------------------------------
// Source temperature
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Ground,
    OutsideAir,
    ExhaustAirMev,
    ExhaustAirMixed,
    WaterGround,
    WaterSurface,
    HeatNetwork,
}

#[allow(clippy::too_many_arguments)]
pub fn source_temp_c(
    source: SourceType,
    temp_air_c: f32,
    temp_internal_air_prev_c: f32,
    annual_avg_air_temp_c: f32,
    monthly_avg_air_temp_c: f32,
    eahp_mixed_ratio: f32,
    eahp_mixed_max_temp_c: f32,
    eahp_mixed_min_temp_c: f32,
    heat_network_flow_temp_c: f32,
) -> f32 {
    match source {
        SourceType::Ground => (0.25806 * temp_air_c + 2.8387).clamp(0.0, 8.0),
        SourceType::OutsideAir => temp_air_c,
        SourceType::ExhaustAirMev => temp_internal_air_prev_c,
        SourceType::ExhaustAirMixed => {
            let mixed = eahp_mixed_ratio * temp_air_c + (1.0 - eahp_mixed_ratio) * temp_internal_air_prev_c;
            if temp_air_c > eahp_mixed_max_temp_c || mixed < eahp_mixed_min_temp_c {
                temp_internal_air_prev_c
            } else {
                mixed
            }
        }
        SourceType::WaterGround => annual_avg_air_temp_c,
        SourceType::WaterSurface => monthly_avg_air_temp_c,
        SourceType::HeatNetwork => heat_network_flow_temp_c,
    }
}

// ---------------------------------------------------------------------
// Demand dispatch for one service
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    Water,
    Space,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupCtrlType {
    None,
    TopUp,
    Substitute,
}

#[derive(Debug, Clone, Copy)]
pub struct BufferTankEffect {
    pub flow_temp_increase_c: f32,
    pub heat_loss_kwh: f32,
    pub pump_power_kw: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct HybridBoiler {
    pub efficiency: f32,
    pub cost_per_kwh: f32,
}

/// Inputs to one `demand_energy` call for one heat-pump service.
#[derive(Debug, Clone, Copy)]
pub struct ServiceDemandRequest {
    pub service_type: ServiceType,
    pub energy_output_required_kwh: f32,
    pub flow_temp_c: f32,
    pub return_temp_c: f32,
    pub upper_limit_c: f32,
    pub temp_source_c: f32,
    pub temp_return_feed_max_c: Option<f32>,
    pub temp_lower_op_limit_c: f32,
    pub backup_mode: BackupCtrlType,
    pub backup_delay_elapsed: bool,
    pub backup_max_kwh: f32,
    pub hybrid_boiler: Option<HybridBoiler>,
    pub cost_hp_per_kwh: f32,
    pub timestep_h: f32,
    pub time_already_committed_h: f32,
    pub time_start_fraction: f32,
    pub modulating: bool,
    /// Whether the heat pump's sink is a warm-air distribution fan rather
    /// than a wet (water-filled) heating circuit.
    pub sink_is_air: bool,
    pub power_source_circ_pump_kw: f32,
    pub power_heating_circ_pump_kw: f32,
    pub power_heating_warm_air_fan_kw: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceResult {
    pub energy_delivered_hp_kwh: f32,
    pub energy_delivered_backup_kwh: f32,
    /// Total electrical input committed to this service's energy supply
    /// connection: compressor plus source/heating circulation pumps (or
    /// warm-air fan) plus any buffer-tank pump.
    pub energy_input_hp_kwh: f32,
    pub time_running_h: f32,
    pub cop: f32,
    pub backup_only: bool,
    /// Heat drawn from the source side (`energy_delivered_hp_kwh` minus the
    /// compressor's own electrical input), demanded on a heat-network source
    /// connection when the heat pump's source is a heat network.
    pub energy_extracted_from_source_kwh: f32,
}

impl HeatPumpTestData {
    /// Services one `demand_energy` request against the test data, returning
    /// the energy delivered by the heat pump and any backup, the electrical
    /// input, the CoP used and the time the compressor ran.
    pub fn demand_energy_for_service(
        &self,
        req: &ServiceDemandRequest,
        buffer: Option<BufferTankEffect>,
    ) -> ServiceResult {
        let mut flow_temp_c = req.flow_temp_c;
        let mut required_kwh = req.energy_output_required_kwh;
        let mut buffer_pump_power_kw = 0.0;
        if let Some(b) = buffer {
            flow_temp_c += b.flow_temp_increase_c;
            required_kwh += b.heat_loss_kwh;
            buffer_pump_power_kw = b.pump_power_kw;
        }

        let limit = req.upper_limit_c;
        let used_flow_temp = flow_temp_c.min(limit);
        if flow_temp_c > limit && (flow_temp_c - req.return_temp_c) > 1e-6 {
            required_kwh *= (limit - req.return_temp_c) / (flow_temp_c - req.return_temp_c);
        }

        let capacity_kw = self.capacity_op_cond_var_flow_or_source_temp(used_flow_temp, req.temp_source_c, req.modulating);
        let (cop, _deg) = {
            let carnot = carnot_cop(used_flow_temp + 273.15, req.temp_source_c + 273.15, 0.01);
            let lr = self.lr_op_cond(used_flow_temp, req.temp_source_c, carnot);
            let (eff, deg) = self.lr_eff_degcoeff_either_side_of_op_cond(used_flow_temp, lr);
            (carnot * eff, deg)
        };

        let time_required_h = if capacity_kw > 1e-9 { required_kwh / capacity_kw } else { 0.0 };
        let time_available_h =
            (req.timestep_h - req.time_already_committed_h) * (1.0 - req.time_start_fraction);
        let time_running_h = time_required_h.min(time_available_h.max(0.0));

        let outside_limits = req.temp_source_c <= req.temp_lower_op_limit_c
            || req.temp_return_feed_max_c.map(|m| req.return_temp_c > m).unwrap_or(false);
        let inadequate_capacity = matches!(req.backup_mode, BackupCtrlType::Substitute)
            && req.backup_max_kwh > capacity_kw * time_available_h
            && req.backup_delay_elapsed;
        let hybrid_prefers_backup = req
            .hybrid_boiler
            .map(|b| req.cost_hp_per_kwh / cop.max(1e-6) > b.cost_per_kwh / b.efficiency.max(1e-6))
            .unwrap_or(false);

        let backup_only = match req.backup_mode {
            BackupCtrlType::None => false,
            BackupCtrlType::TopUp | BackupCtrlType::Substitute => {
                (outside_limits || inadequate_capacity || hybrid_prefers_backup) && req.backup_delay_elapsed
            }
        };
        if backup_only {
            warn!(
                "heat pump handed {:?} service to backup (outside_limits={outside_limits}, \
                 inadequate_capacity={inadequate_capacity}, hybrid_prefers_backup={hybrid_prefers_backup})",
                req.service_type
            );
        }

        let energy_delivered_hp = if backup_only { 0.0 } else { capacity_kw * time_running_h };
        let remaining = (required_kwh - energy_delivered_hp).max(0.0);
        let energy_delivered_backup = match req.backup_mode {
            BackupCtrlType::None => 0.0,
            _ => remaining.min(req.backup_max_kwh),
        };

        let energy_input_compressor = if cop > 1e-9 { energy_delivered_hp / cop } else { 0.0 };

        let energy_source_circ_pump = time_running_h * req.power_source_circ_pump_kw;
        let (energy_heating_warm_air_fan, energy_heating_circ_pump) =
            if req.service_type == ServiceType::Space && req.sink_is_air {
                (time_running_h * req.power_heating_warm_air_fan_kw, 0.0)
            } else {
                (0.0, time_running_h * (req.power_heating_circ_pump_kw + buffer_pump_power_kw))
            };

        let energy_input_total = energy_input_compressor
            + energy_source_circ_pump
            + energy_heating_circ_pump
            + energy_heating_warm_air_fan;

        ServiceResult {
            energy_delivered_hp_kwh: energy_delivered_hp,
            energy_delivered_backup_kwh: energy_delivered_backup,
            energy_input_hp_kwh: energy_input_total,
            time_running_h,
            cop,
            backup_only,
            energy_extracted_from_source_kwh: energy_delivered_hp - energy_input_compressor,
        }
    }
}

// ---------------------------------------------------------------------
// End-of-timestep aggregation
// ---------------------------------------------------------------------

/// Minimum-modulation-rate interpolation: between 20-55C for an air sink,
/// 35-55C otherwise; if no 55C point is supplied only the low-temperature
/// value is used.
pub fn min_modulation_rate(flow_temp_c: f32, air_sink: bool, rate_low: f32, rate_55: Option<f32>) -> f32 {
    match rate_55 {
        Some(high) => {
            let low_temp = if air_sink { 20.0 } else { 35.0 };
            crate::utils::lerp(flow_temp_c, low_temp, rate_low, 55.0, high).clamp(rate_low.min(high), rate_low.max(high))
        }
        None => rate_low,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EndOfTimestepEnergies {
    pub running_energy_kwh: f32,
    pub ancillary_off_energy_kwh: f32,
}

/// Aggregates one design-flow-temp group's worth of services into
/// compressor on/off-mode energy accounting.
#[allow(clippy::too_many_arguments)]
pub fn end_of_timestep_energies(
    total_time_running_h: f32,
    timestep_h: f32,
    capacity_kw: f32,
    cop: f32,
    air_sink: bool,
    is_dhw: bool,
    degradation_coeff: f32,
    time_constant_onoff_h: f32,
    service_time_constant_h: f32,
    rate_low: f32,
    rate_55: Option<f32>,
    flow_temp_c: f32,
) -> EndOfTimestepEnergies {
    let r = (total_time_running_h / timestep_h).clamp(0.0, 1.0);
    let r_min = min_modulation_rate(flow_temp_c, air_sink, rate_low, rate_55).max(1e-6);
    let on_off_mode = r > 0.0 && r < r_min;

    let full_load_power_kw = if cop > 1e-9 { capacity_kw / cop } else { 0.0 };
    let min_load_power_kw = full_load_power_kw * r_min;

    let mut running_energy_kwh = capacity_kw / cop.max(1e-6) * total_time_running_h;
    if on_off_mode {
        let divisor = if is_dhw && air_sink {
            (1.0 - degradation_coeff * (1.0 - r / r_min)).max(1e-3)
        } else {
            1.0
        };
        let inertia_kwh =
            min_load_power_kw * time_constant_onoff_h * r * (1.0 - r) / service_time_constant_h.max(1e-6);
        running_energy_kwh += inertia_kwh / divisor;
    }

    let time_remaining_h = (timestep_h - total_time_running_h).max(0.0);
    let ancillary_off_energy_kwh = if r < r_min {
        let divisor = if is_dhw && air_sink {
            (1.0 - degradation_coeff * (1.0 - r / r_min)).max(1e-3)
        } else {
            1.0
        };
        ((1.0 - degradation_coeff) * (min_load_power_kw / r_min)
            * (time_remaining_h - (r / r_min) * timestep_h).max(0.0)
            / divisor)
            .max(0.0)
    } else {
        0.0
    };

    EndOfTimestepEnergies {
        running_energy_kwh,
        ancillary_off_energy_kwh,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AuxiliaryEnergies {
    pub standby_kwh: f32,
    pub crankcase_heater_kwh: f32,
    pub off_mode_kwh: f32,
}

/// Standby, crankcase-heater and off-mode electrical consumption for the
/// whole unit (CALCM-01 - DAHPSE - V2.0_DRAFT13 section 4.7): standby and
/// crankcase heating run whenever any service's control profile is on for
/// the remainder of the timestep the compressor isn't running; with every
/// profile off the whole timestep is charged to off-mode power instead.
pub fn auxiliary_energy_kwh(
    heating_profile_on: bool,
    water_profile_on: bool,
    timestep_h: f32,
    time_remaining_h: f32,
    power_standby_kw: f32,
    power_crankcase_heater_kw: f32,
    power_off_mode_kw: f32,
) -> AuxiliaryEnergies {
    if heating_profile_on {
        AuxiliaryEnergies {
            standby_kwh: time_remaining_h * power_standby_kw,
            crankcase_heater_kwh: time_remaining_h * power_crankcase_heater_kw,
            off_mode_kwh: 0.0,
        }
    } else if water_profile_on {
        AuxiliaryEnergies {
            standby_kwh: time_remaining_h * power_standby_kw,
            crankcase_heater_kwh: 0.0,
            off_mode_kwh: 0.0,
        }
    } else {
        AuxiliaryEnergies {
            standby_kwh: 0.0,
            crankcase_heater_kwh: 0.0,
            off_mode_kwh: timestep_h * power_off_mode_kw,
        }
    }
}

// ---------------------------------------------------------------------
// Exhaust-air interpolation by flow rate
// ---------------------------------------------------------------------

/// Builds per-`(design_flow_temp, test_letter)` records interpolated across
/// the air-flow-rate dimension at `throughput_exhaust_air_l_per_s`, and
/// reports the overventilation ratio: `max(1, lowest_available_flow /
/// throughput)`.
pub fn interpolate_exhaust_air_test_data(
    records_by_flow_rate: &[(f32, Vec<HeatPumpTestDatum>)],
    throughput_exhaust_air_l_per_s: f32,
) -> (Vec<HeatPumpTestDatum>, f32) {
    let mut flow_rates: Vec<f32> = records_by_flow_rate.iter().map(|(f, _)| *f).collect();
    flow_rates.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let lowest_flow = flow_rates.first().copied().unwrap_or(throughput_exhaust_air_l_per_s);
    let overvent_ratio = (lowest_flow / throughput_exhaust_air_l_per_s.max(1e-6)).max(1.0);

    // Collect the set of (design_flow_temp, test_letter) keys present at the
    // first air flow rate and interpolate each across flow rate.
    let template = records_by_flow_rate.first().map(|(_, r)| r.clone()).unwrap_or_default();
    let mut out = Vec::with_capacity(template.len());
    for t in &template {
        let points: Vec<(f32, HeatPumpTestDatum)> = records_by_flow_rate
            .iter()
            .filter_map(|(flow, recs)| {
                recs.iter()
                    .find(|r| {
                        (r.design_flow_temp_c - t.design_flow_temp_c).abs() < 1e-6
                            && r.test_letter == t.test_letter
                    })
                    .map(|r| (*flow, *r))
            })
            .collect();
        if points.is_empty() {
            continue;
        }
        let cap = interp_series(
            throughput_exhaust_air_l_per_s,
            &points.iter().map(|(f, r)| (*f, r.capacity_kw)).collect::<Vec<_>>(),
        );
        let cop = interp_series(
            throughput_exhaust_air_l_per_s,
            &points.iter().map(|(f, r)| (*f, r.cop)).collect::<Vec<_>>(),
        );
        let mut rec = *t;
        rec.capacity_kw = cap;
        rec.cop = cop;
        out.push(rec);
    }
    (out, overvent_ratio)
}

// ---------------------------------------------------------------------
// Hot-water-only heat pump
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct EnTappingProfileTest {
    pub daily_volume_l: f32,
    pub hw_tapping_daily_kwh: f32,
    pub vessel_loss_daily_kwh: f32,
    pub e_measured_kwh: f32,
    pub standby_power_kw: f32,
    pub cop: f32,
}

/// EN 16147 seasonal performance factor for one tapping-profile test,
/// `eta = (Q_tap + 0.54*Q_vessel) / (E - 0.54*P_standby*24 + Q_vessel/cop)`.
pub fn hw_only_eta(test: &EnTappingProfileTest) -> f32 {
    let numerator = test.hw_tapping_daily_kwh + 0.54 * test.vessel_loss_daily_kwh;
    let denominator = test.e_measured_kwh - 0.54 * test.standby_power_kw * 24.0
        + test.vessel_loss_daily_kwh / test.cop.max(1e-6);
    numerator / denominator.max(1e-6)
}

/// Interpolates eta between the M (5.845 kWh/day) and L (11.655 kWh/day)
/// tapping profiles over daily hot-water volume, clamping to M below 100.2
/// L/day and L above 199.8 L/day.
pub fn hw_only_eta_for_volume(daily_volume_l: f32, profile_m: &EnTappingProfileTest, profile_l: &EnTappingProfileTest) -> f32 {
    if daily_volume_l <= 100.2 {
        hw_only_eta(profile_m)
    } else if daily_volume_l >= 199.8 {
        hw_only_eta(profile_l)
    } else {
        crate::utils::lerp(
            daily_volume_l,
            100.2,
            hw_only_eta(profile_m),
            199.8,
            hw_only_eta(profile_l),
        )
    }
}

/// Derates `eta` when the installed tank volume, HEX area or standing loss
/// fails to meet the values the EN 16147 test was declared against.
pub fn in_use_factor_mismatch(
    eta: f32,
    installed_volume_l: f32,
    declared_volume_l: f32,
    installed_hex_area_m2: f32,
    declared_hex_area_m2: f32,
    installed_standing_loss_kwh: f32,
    declared_standing_loss_kwh: f32,
) -> f32 {
    let mut factor = 1.0;
    if installed_volume_l < declared_volume_l {
        factor *= installed_volume_l / declared_volume_l.max(1e-6);
    }
    if installed_hex_area_m2 < declared_hex_area_m2 {
        factor *= installed_hex_area_m2 / declared_hex_area_m2.max(1e-6);
    }
    if installed_standing_loss_kwh > declared_standing_loss_kwh {
        factor *= declared_standing_loss_kwh / installed_standing_loss_kwh.max(1e-6);
    }
    eta * factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_records(flow_temp: f32, cop_a: f32, cop_d: f32) -> Vec<HeatPumpTestDatum> {
        vec![
            HeatPumpTestDatum {
                design_flow_temp_c: flow_temp,
                test_letter: TestLetter::A,
                capacity_kw: 8.0,
                cop: cop_a,
                degradation_coeff: 0.9,
                temp_outlet_c: flow_temp,
                temp_source_c: 7.0,
                temp_test_c: 7.0,
            },
            HeatPumpTestDatum {
                design_flow_temp_c: flow_temp,
                test_letter: TestLetter::B,
                capacity_kw: 7.0,
                cop: (cop_a + cop_d) / 2.0 + 0.1,
                degradation_coeff: 0.9,
                temp_outlet_c: flow_temp,
                temp_source_c: 2.0,
                temp_test_c: 2.0,
            },
            HeatPumpTestDatum {
                design_flow_temp_c: flow_temp,
                test_letter: TestLetter::C,
                capacity_kw: 6.0,
                cop: (cop_a + cop_d) / 2.0 - 0.1,
                degradation_coeff: 0.9,
                temp_outlet_c: flow_temp,
                temp_source_c: -7.0,
                temp_test_c: -7.0,
            },
            HeatPumpTestDatum {
                design_flow_temp_c: flow_temp,
                test_letter: TestLetter::D,
                capacity_kw: 5.0,
                cop: cop_d,
                degradation_coeff: 0.9,
                temp_outlet_c: flow_temp,
                temp_source_c: -10.0,
                temp_test_c: -10.0,
            },
        ]
    }

    fn sample_test_data() -> HeatPumpTestData {
        let mut records = group_records(35.0, 4.3, 3.5);
        records.extend(group_records(55.0, 3.1, 2.5));
        HeatPumpTestData::new(records).unwrap()
    }

    #[test]
    fn fewer_than_four_records_is_rejected() {
        let records = vec![HeatPumpTestDatum {
            design_flow_temp_c: 35.0,
            test_letter: TestLetter::A,
            capacity_kw: 8.0,
            cop: 4.0,
            degradation_coeff: 0.9,
            temp_outlet_c: 35.0,
            temp_source_c: 7.0,
            temp_test_c: 7.0,
        }];
        assert!(HeatPumpTestData::new(records).is_err());
    }

    #[test]
    fn average_cop_interpolates_across_design_flow_temps() {
        let data = sample_test_data();
        let avg_35 = (4.3 + (4.3 + 3.5) / 2.0 + 0.1 + (4.3 + 3.5) / 2.0 - 0.1 + 3.5) / 4.0;
        let avg_55 = (3.1 + (3.1 + 2.5) / 2.0 + 0.1 + (3.1 + 2.5) / 2.0 - 0.1 + 2.5) / 4.0;
        let mid = data.average_degradation_coeff(45.0);
        assert!((mid - 0.9).abs() < 1e-3);
        let cop45 = data.average_capacity(45.0);
        assert!(cop45 > 0.0);
        let _ = (avg_35, avg_55);
    }

    #[test]
    fn condenser_spread_matches_tabled_values() {
        assert!((condenser_temp_spread(35.0) - 5.0).abs() < 1e-6);
        assert!((condenser_temp_spread(65.0) - 10.0).abs() < 1e-6);
    }

    #[test]
    fn carnot_cop_matches_definition() {
        let c = carnot_cop(318.15, 280.15, 0.01);
        assert!((c - 318.15 / (318.15 - 280.15)).abs() < 1e-6);
    }

    #[test]
    fn hybrid_boiler_preferred_when_cheaper_per_unit_heat() {
        // E3: cost_hp=0.30, cop=3.0 -> 0.10 ; cost_boiler=0.07, boiler_eff=0.9 -> 0.0778
        let cost_hp_effective = 0.30f32 / 3.0;
        let cost_boiler_effective = 0.07f32 / 0.9;
        assert!(cost_hp_effective > cost_boiler_effective);
    }

    #[test]
    fn hw_only_eta_is_positive_for_reasonable_inputs() {
        let m = EnTappingProfileTest {
            daily_volume_l: 100.2,
            hw_tapping_daily_kwh: 5.845,
            vessel_loss_daily_kwh: 0.3,
            e_measured_kwh: 3.0,
            standby_power_kw: 0.01,
            cop: 2.8,
        };
        let eta = hw_only_eta(&m);
        assert!(eta > 0.0);
    }

    #[test]
    fn source_temp_ground_is_clamped() {
        let t = source_temp_c(SourceType::Ground, -50.0, 20.0, 10.0, 10.0, 0.5, 20.0, -5.0, 45.0);
        assert!(t >= 0.0);
    }

    fn sample_request(service_type: ServiceType, sink_is_air: bool) -> ServiceDemandRequest {
        ServiceDemandRequest {
            service_type,
            energy_output_required_kwh: 2.0,
            flow_temp_c: 45.0,
            return_temp_c: 35.0,
            upper_limit_c: 60.0,
            temp_source_c: 7.0,
            temp_return_feed_max_c: None,
            temp_lower_op_limit_c: -10.0,
            backup_mode: BackupCtrlType::None,
            backup_delay_elapsed: true,
            backup_max_kwh: 0.0,
            hybrid_boiler: None,
            cost_hp_per_kwh: 0.3,
            timestep_h: 1.0,
            time_already_committed_h: 0.0,
            time_start_fraction: 0.0,
            modulating: true,
            sink_is_air,
            power_source_circ_pump_kw: 0.05,
            power_heating_circ_pump_kw: 0.03,
            power_heating_warm_air_fan_kw: 0.04,
        }
    }

    #[test]
    fn wet_sink_service_meters_circ_pumps_not_fan() {
        let data = sample_test_data();
        let req = sample_request(ServiceType::Space, false);
        let result = data.demand_energy_for_service(&req, None);
        assert!(result.time_running_h > 0.0);
        let expected_pump_kwh = result.time_running_h * (req.power_heating_circ_pump_kw + req.power_source_circ_pump_kw);
        assert!(result.energy_input_hp_kwh > expected_pump_kwh * 0.99);
    }

    #[test]
    fn warm_air_sink_space_service_meters_fan_not_heating_circ_pump() {
        let data = sample_test_data();
        let req = sample_request(ServiceType::Space, true);
        let result = data.demand_energy_for_service(&req, None);
        // Fan energy and source circ pump still metered; heating circ pump energy is not.
        let fan_and_source_kwh =
            result.time_running_h * (req.power_heating_warm_air_fan_kw + req.power_source_circ_pump_kw);
        assert!((result.energy_input_hp_kwh - fan_and_source_kwh) > -1e-6);
    }

    #[test]
    fn buffer_tank_pump_energy_is_scaled_by_time_running_not_full_timestep() {
        let data = sample_test_data();
        let req = sample_request(ServiceType::Water, false);
        let buffer = BufferTankEffect {
            flow_temp_increase_c: 0.0,
            heat_loss_kwh: 0.0,
            pump_power_kw: 0.1,
        };
        let result = data.demand_energy_for_service(&req, Some(buffer));
        assert!(result.time_running_h < req.timestep_h);
        let buffer_component = result.time_running_h * buffer.pump_power_kw;
        assert!(buffer_component < buffer.pump_power_kw * req.timestep_h);
        assert!(result.energy_input_hp_kwh >= buffer_component - 1e-6);
    }

    #[test]
    fn extracted_source_energy_excludes_pump_terms() {
        let data = sample_test_data();
        let req = sample_request(ServiceType::Water, false);
        let result = data.demand_energy_for_service(&req, None);
        let compressor_only = result.energy_delivered_hp_kwh - result.energy_extracted_from_source_kwh;
        assert!(compressor_only > 0.0);
        assert!(compressor_only < result.energy_input_hp_kwh);
    }

    #[test]
    fn auxiliary_energy_charges_standby_and_crankcase_when_heating_on() {
        let aux = auxiliary_energy_kwh(true, false, 1.0, 0.25, 0.01, 0.02, 0.005);
        assert!((aux.standby_kwh - 0.0025).abs() < 1e-6);
        assert!((aux.crankcase_heater_kwh - 0.005).abs() < 1e-6);
        assert_eq!(aux.off_mode_kwh, 0.0);
    }

    #[test]
    fn auxiliary_energy_charges_only_standby_when_only_water_on() {
        let aux = auxiliary_energy_kwh(false, true, 1.0, 0.25, 0.01, 0.02, 0.005);
        assert!((aux.standby_kwh - 0.0025).abs() < 1e-6);
        assert_eq!(aux.crankcase_heater_kwh, 0.0);
        assert_eq!(aux.off_mode_kwh, 0.0);
    }

    #[test]
    fn auxiliary_energy_charges_off_mode_for_whole_timestep_when_all_profiles_off() {
        let aux = auxiliary_energy_kwh(false, false, 1.0, 0.25, 0.01, 0.02, 0.005);
        assert_eq!(aux.standby_kwh, 0.0);
        assert_eq!(aux.crankcase_heater_kwh, 0.0);
        assert!((aux.off_mode_kwh - 0.005).abs() < 1e-6);
    }
}
