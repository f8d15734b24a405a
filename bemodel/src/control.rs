// Distributed under the MIT License
// (See accompanying LICENSE file or a copy at http://opensource.org/licenses/MIT)

//! Control strategies governing when and at what setpoint a service may run.
//!
//! A [`Control`] answers two questions for a given timestep: is the controlled
//! service permitted to operate at all (`is_on`), and if so at what setpoint or
//! charge target. [`Combination`] controls compose other, named controls with a
//! boolean operator, which means the registry must be checked for cycles before
//! use - a heat source consulting a combination control that (directly or
//! indirectly) consults itself would recurse forever.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::errors::HemError;
use crate::simtime::SimulationTimeIteration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombinationOperator {
    And,
    Or,
    Max,
    Min,
    Mean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Control {
    /// Permitted to run whenever `schedule[t]` is true.
    OnOffTime { schedule: Vec<bool> },

    /// Permitted to run whenever `schedule[t]` is true, at the given setpoint;
    /// `None` entries in `setpoint` mean "no demand", distinct from "off".
    SetpointTime {
        schedule: Vec<bool>,
        setpoint: Vec<Option<f32>>,
        /// Hours the setpoint is brought forward to let slow-responding emitters
        /// reach target before the nominal on-period begins.
        advanced_start: f32,
    },

    /// Drives a storage device's intended state of charge.
    ChargeControl {
        schedule: Vec<bool>,
        target_charge: Vec<f32>,
    },

    /// Permitted to run only in the `fraction_on` cheapest-cost timesteps of each
    /// day, ranked from `schedule_cost`.
    CostMinimising {
        schedule_cost: Vec<f32>,
        fraction_on: f32,
        timesteps_per_day: usize,
    },

    /// Combines named controls already present in the same [`ControlDb`].
    Combination {
        operator: CombinationOperator,
        controls: Vec<String>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlDb {
    #[serde(flatten)]
    pub controls: HashMap<String, Control>,
}

impl ControlDb {
    /// Verifies every `Combination` control's references exist and that the
    /// reference graph is acyclic. Must be called once after construction, before
    /// any timestep evaluation - `is_on`/`setpoint` assume an acyclic graph and
    /// will recurse without bound otherwise.
    pub fn validate(&self) -> Result<(), HemError> {
        for name in self.controls.keys() {
            let mut visiting = HashSet::new();
            self.check_acyclic(name, &mut visiting)?;
        }
        Ok(())
    }

    fn check_acyclic(&self, name: &str, visiting: &mut HashSet<String>) -> Result<(), HemError> {
        if !visiting.insert(name.to_string()) {
            return Err(HemError::input(
                "control",
                format!("cycle detected in control graph at '{name}'"),
            ));
        }
        if let Control::Combination { controls, .. } = self.get(name)? {
            for child in controls {
                self.check_acyclic(child, visiting)?;
            }
        }
        visiting.remove(name);
        Ok(())
    }

    fn get(&self, name: &str) -> Result<&Control, HemError> {
        self.controls
            .get(name)
            .ok_or_else(|| HemError::input("control", format!("unknown control '{name}'")))
    }

    pub fn is_on(&self, name: &str, t: &SimulationTimeIteration) -> Result<bool, HemError> {
        match self.get(name)? {
            Control::OnOffTime { schedule } => Ok(at(schedule, t.index)),
            Control::SetpointTime { schedule, .. } => Ok(at(schedule, t.index)),
            Control::ChargeControl { schedule, .. } => Ok(at(schedule, t.index)),
            Control::CostMinimising {
                schedule_cost,
                fraction_on,
                timesteps_per_day,
            } => Ok(cost_minimising_is_on(
                schedule_cost,
                *fraction_on,
                *timesteps_per_day,
                t.index,
            )),
            Control::Combination { operator, controls } => {
                match operator {
                    CombinationOperator::And => {
                        controls.iter().map(|c| self.is_on(c, t)).try_fold(true, |acc, s| Ok(acc && s?))
                    }
                    CombinationOperator::Or => {
                        controls.iter().map(|c| self.is_on(c, t)).try_fold(false, |acc, s| Ok(acc || s?))
                    }
                    // MAX/MIN/MEAN treat each sub-control's on/off state as 1.0/0.0
                    // and threshold the combined value at 0.5, matching the numeric
                    // reduction the same operators apply to setpoints.
                    CombinationOperator::Max => {
                        controls.iter().map(|c| self.is_on(c, t)).try_fold(false, |acc, s| Ok(acc || s?))
                    }
                    CombinationOperator::Min => {
                        controls.iter().map(|c| self.is_on(c, t)).try_fold(true, |acc, s| Ok(acc && s?))
                    }
                    CombinationOperator::Mean => {
                        let mut on = 0usize;
                        let mut total = 0usize;
                        for c in controls {
                            total += 1;
                            if self.is_on(c, t)? {
                                on += 1;
                            }
                        }
                        Ok(total > 0 && (on as f32 / total as f32) >= 0.5)
                    }
                }
            }
        }
    }

    /// Setpoint requested for the current timestep, if any. Only meaningful for
    /// `SetpointTime` controls; other variants return `Ok(None)`.
    pub fn setpoint(
        &self,
        name: &str,
        t: &SimulationTimeIteration,
    ) -> Result<Option<f32>, HemError> {
        match self.get(name)? {
            Control::SetpointTime {
                schedule,
                setpoint,
                advanced_start,
            } => {
                if at(schedule, t.index) {
                    return Ok(at(setpoint, t.index));
                }
                if *advanced_start > 0.0 {
                    let lead_steps = (*advanced_start / t.timestep).ceil() as usize;
                    let lookahead = t.index + lead_steps;
                    if at(schedule, lookahead) {
                        return Ok(at(setpoint, lookahead));
                    }
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// Target state of charge (0..1) for the current timestep; only meaningful
    /// for `ChargeControl`.
    pub fn target_charge(
        &self,
        name: &str,
        t: &SimulationTimeIteration,
    ) -> Result<Option<f32>, HemError> {
        match self.get(name)? {
            Control::ChargeControl { target_charge, .. } => Ok(Some(at(target_charge, t.index))),
            _ => Ok(None),
        }
    }
}

fn at<T: Copy + Default>(series: &[T], index: usize) -> T {
    series.get(index).copied().unwrap_or_default()
}

/// True for the cheapest `fraction_on` of timesteps within the day containing
/// `index`, ranked by ascending cost; ties broken by earlier timestep first.
fn cost_minimising_is_on(
    schedule_cost: &[f32],
    fraction_on: f32,
    timesteps_per_day: usize,
    index: usize,
) -> bool {
    if timesteps_per_day == 0 {
        return false;
    }
    let day = index / timesteps_per_day;
    let day_start = day * timesteps_per_day;
    let day_end = (day_start + timesteps_per_day).min(schedule_cost.len());
    if day_end <= day_start {
        return false;
    }
    let mut ranked: Vec<usize> = (day_start..day_end).collect();
    ranked.sort_by(|&a, &b| {
        schedule_cost[a]
            .partial_cmp(&schedule_cost[b])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    let n_on = ((timesteps_per_day as f32) * fraction_on).round() as usize;
    ranked.iter().take(n_on).any(|&i| i == index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(index: usize) -> SimulationTimeIteration {
        SimulationTimeIteration {
            index,
            time: index as f32,
            timestep: 1.0,
        }
    }

    #[test]
    fn onoff_follows_schedule() {
        let mut controls = HashMap::new();
        controls.insert(
            "heating".to_string(),
            Control::OnOffTime {
                schedule: vec![true, false, true],
            },
        );
        let db = ControlDb { controls };
        db.validate().unwrap();
        assert!(db.is_on("heating", &t(0)).unwrap());
        assert!(!db.is_on("heating", &t(1)).unwrap());
    }

    #[test]
    fn combination_and_requires_all_on() {
        let mut controls = HashMap::new();
        controls.insert(
            "a".to_string(),
            Control::OnOffTime {
                schedule: vec![true, true],
            },
        );
        controls.insert(
            "b".to_string(),
            Control::OnOffTime {
                schedule: vec![true, false],
            },
        );
        controls.insert(
            "both".to_string(),
            Control::Combination {
                operator: CombinationOperator::And,
                controls: vec!["a".to_string(), "b".to_string()],
            },
        );
        let db = ControlDb { controls };
        db.validate().unwrap();
        assert!(db.is_on("both", &t(0)).unwrap());
        assert!(!db.is_on("both", &t(1)).unwrap());
    }

    #[test]
    fn self_referencing_combination_is_rejected() {
        let mut controls = HashMap::new();
        controls.insert(
            "loop".to_string(),
            Control::Combination {
                operator: CombinationOperator::Or,
                controls: vec!["loop".to_string()],
            },
        );
        let db = ControlDb { controls };
        assert!(db.validate().is_err());
    }

    #[test]
    fn cost_minimising_picks_cheapest_fraction() {
        let cost = vec![5.0, 1.0, 3.0, 2.0];
        assert!(cost_minimising_is_on(&cost, 0.5, 4, 1));
        assert!(cost_minimising_is_on(&cost, 0.5, 4, 3));
        assert!(!cost_minimising_is_on(&cost, 0.5, 4, 0));
        assert!(!cost_minimising_is_on(&cost, 0.5, 4, 2));
    }

    #[test]
    fn setpoint_advanced_start_looks_ahead() {
        let mut controls = HashMap::new();
        controls.insert(
            "heating".to_string(),
            Control::SetpointTime {
                schedule: vec![false, true],
                setpoint: vec![None, Some(21.0)],
                advanced_start: 1.0,
            },
        );
        let db = ControlDb { controls };
        assert_eq!(db.setpoint("heating", &t(0)).unwrap(), Some(21.0));
    }
}
