// Distributed under the MIT License
// (See accompanying LICENSE file or a copy at http://opensource.org/licenses/MIT)

//! Expansion of nested, run-length-encoded schedules into flat per-timestep series.
//!
//! Input schedules are not flat arrays: a top-level schedule names a sequence of
//! named sub-schedules with repeat counts (e.g. a year schedule repeating a
//! "weekday" week-schedule 5 times and a "weekend" one 2 times), recursing down
//! to a day schedule of either 24 hourly values or one value per timestep. This
//! mirrors the run-length pattern of a fixed year/week/day schedule hierarchy,
//! generalised here to arbitrary nesting depth and named fragments.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::HemError;

/// A named, reusable schedule fragment.
///
/// `Leaf` holds literal values for one period (a day, most commonly), either
/// as a flat list or as `{"value": x, "repeat": n}` run-length-encoded
/// entries; `Sequence` repeats named fragments from the registry `repeat`
/// times in sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScheduleNode {
    Leaf(Vec<f32>),
    RunLength(Vec<RunLengthEntry>),
    Sequence(Vec<ScheduleEntry>),
}

/// One `{"value": x, "repeat": n}` run of a compact leaf schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLengthEntry {
    pub value: f32,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Name of a fragment in the schedule registry.
    #[serde(rename = "ref")]
    pub reference: String,
    /// Number of consecutive periods this fragment covers.
    #[serde(default = "default_repeat")]
    pub repeat: u32,
}

fn default_repeat() -> u32 {
    1
}

/// Registry of named schedule fragments, keyed by name (e.g. "weekday", "weekend",
/// "main"). Expansion starts from a chosen root name and recurses through `Sequence`
/// entries until it bottoms out at `Leaf` values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleDb {
    #[serde(flatten)]
    pub fragments: HashMap<String, ScheduleNode>,
}

impl ScheduleDb {
    /// Expands `root` into a flat series of exactly `n_timesteps` values.
    ///
    /// `values_per_leaf` is the number of timesteps each `Leaf` period is expected
    /// to cover (e.g. 24 for an hourly day-schedule on a 1h timestep, 48 on a 30
    /// minute one); a `Leaf` with a different length is itself resampled by
    /// nearest-neighbour repetition so day schedules can be given as 24 hourly
    /// values regardless of simulation timestep.
    pub fn expand(
        &self,
        root: &str,
        values_per_leaf: usize,
        n_timesteps: usize,
    ) -> Result<Vec<f32>, HemError> {
        let mut out = Vec::with_capacity(n_timesteps);
        self.expand_into(root, values_per_leaf, &mut out)?;
        if out.len() != n_timesteps {
            return Err(HemError::input(
                format!("schedule '{}'", root),
                format!(
                    "expanded to {} values, expected {n_timesteps}",
                    out.len()
                ),
            ));
        }
        Ok(out)
    }

    fn expand_into(
        &self,
        name: &str,
        values_per_leaf: usize,
        out: &mut Vec<f32>,
    ) -> Result<(), HemError> {
        let node = self.fragments.get(name).ok_or_else(|| {
            HemError::input("schedule", format!("unknown schedule fragment '{name}'"))
        })?;
        match node {
            ScheduleNode::Leaf(values) => {
                out.extend(resample(values, values_per_leaf));
                Ok(())
            }
            ScheduleNode::RunLength(runs) => {
                let values: Vec<f32> = runs
                    .iter()
                    .flat_map(|r| std::iter::repeat(r.value).take(r.repeat.max(1) as usize))
                    .collect();
                out.extend(resample(&values, values_per_leaf));
                Ok(())
            }
            ScheduleNode::Sequence(entries) => {
                for entry in entries {
                    for _ in 0..entry.repeat {
                        self.expand_into(&entry.reference, values_per_leaf, out)?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// Stretches or repeats `values` to `target_len` entries by nearest-neighbour
/// repetition (each source value repeated `target_len / values.len()` times).
/// If `target_len` is not an exact multiple, the remainder repeats the last value.
fn resample(values: &[f32], target_len: usize) -> Vec<f32> {
    if values.is_empty() || target_len == 0 {
        return Vec::new();
    }
    if values.len() == target_len {
        return values.to_vec();
    }
    let mut out = Vec::with_capacity(target_len);
    let factor = target_len / values.len();
    for &v in values {
        for _ in 0..factor.max(1) {
            out.push(v);
        }
    }
    out.resize(target_len, *values.last().unwrap());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> ScheduleDb {
        let mut fragments = HashMap::new();
        fragments.insert(
            "weekday".to_string(),
            ScheduleNode::Leaf(vec![1.0; 24]),
        );
        fragments.insert(
            "weekend".to_string(),
            ScheduleNode::Leaf(vec![2.0; 24]),
        );
        fragments.insert(
            "week".to_string(),
            ScheduleNode::Sequence(vec![
                ScheduleEntry {
                    reference: "weekday".to_string(),
                    repeat: 5,
                },
                ScheduleEntry {
                    reference: "weekend".to_string(),
                    repeat: 2,
                },
            ]),
        );
        ScheduleDb { fragments }
    }

    #[test]
    fn expands_nested_week_to_168_hourly_values() {
        let db = db();
        let series = db.expand("week", 24, 168).unwrap();
        assert_eq!(series.len(), 168);
        assert_eq!(series[0], 1.0);
        assert_eq!(series[5 * 24], 2.0);
    }

    #[test]
    fn resamples_daily_leaf_to_half_hour_steps() {
        let db = db();
        let series = db.expand("weekday", 48, 48 * 5 + 48 * 2).unwrap();
        assert_eq!(series.len(), 48 * 7);
        assert_eq!(series[0], 1.0);
        assert_eq!(series[1], 1.0);
    }

    #[test]
    fn run_length_encoded_leaf_expands_to_repeated_values() {
        let mut fragments = HashMap::new();
        fragments.insert(
            "day".to_string(),
            ScheduleNode::RunLength(vec![
                RunLengthEntry { value: 0.0, repeat: 20 },
                RunLengthEntry { value: 1.0, repeat: 4 },
            ]),
        );
        let db = ScheduleDb { fragments };
        let series = db.expand("day", 24, 24).unwrap();
        assert_eq!(series.len(), 24);
        assert_eq!(series[0], 0.0);
        assert_eq!(series[23], 1.0);
    }

    #[test]
    fn unknown_fragment_is_an_input_error() {
        let db = ScheduleDb::default();
        assert!(db.expand("missing", 24, 24).is_err());
    }
}
