// Distributed under the MIT License
// (See accompanying LICENSE file or a copy at http://opensource.org/licenses/MIT)

//! Error kinds for the core engine.
//!
//! `InputValidation` and `DomainIncompatibility` must be raised, and checked for,
//! before the simulation loop starts - callers should treat them as fatal
//! construction-time errors. `Numerical` and `OutOfRangeOperation` abort a running
//! simulation. `Insufficiency` is deliberately *not* a variant here: unmet hot-water
//! or space-conditioning demand is folded into the energy ledger (see
//! `energy_supply::EnergySupply::unmet_demand`) rather than raised as an error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HemError {
    /// Schema mismatch, unknown type tag, cyclic control graph, duplicate service
    /// name, missing required field, or an out-of-range input value (e.g. SoC < 0).
    #[error("invalid input at {path}: {msg}")]
    InputValidation { path: String, msg: String },

    /// A requested combination of components is not physically/operationally
    /// meaningful (e.g. an exhaust-air heat pump fed by intermittent MEV, or a
    /// warm-air emitter attached to a non-air-sink heat pump).
    #[error("incompatible configuration: {msg}")]
    DomainIncompatibility { msg: String },

    /// A computation would divide by zero or otherwise produce a non-finite
    /// result with no defined guarded fallback.
    #[error("numerical fault: {msg}")]
    Numerical { msg: String },

    /// An operating point falls outside the range the component's test data
    /// or control strategy was built to support (e.g. exhaust-air heat pump
    /// below its minimum tested flow rate).
    #[error("out-of-range operation: {msg}")]
    OutOfRangeOperation { msg: String },
}

impl HemError {
    pub fn input<P: Into<String>, M: Into<String>>(path: P, msg: M) -> Self {
        HemError::InputValidation {
            path: path.into(),
            msg: msg.into(),
        }
    }

    pub fn incompatible<S: Into<String>>(msg: S) -> Self {
        HemError::DomainIncompatibility { msg: msg.into() }
    }

    pub fn numerical<S: Into<String>>(msg: S) -> Self {
        HemError::Numerical { msg: msg.into() }
    }

    pub fn out_of_range<S: Into<String>>(msg: S) -> Self {
        HemError::OutOfRangeOperation { msg: msg.into() }
    }
}

pub type Result<T> = std::result::Result<T, HemError>;
