// Distributed under the MIT License
// (See accompanying LICENSE file or a copy at http://opensource.org/licenses/MIT)

//! Core physics engine of a whole-dwelling Home Energy Model: external
//! conditions and solar geometry, hot-water storage, heat pumps, heat
//! batteries, heat networks and the per-timestep orchestrator that ties them
//! to a zone's heat balance (BS EN ISO 52016/52010, EN 14825).

pub mod checks;
pub mod control;
pub mod energy_supply;
pub mod errors;
pub mod external_conditions;
pub mod heat_battery;
pub mod heat_network;
pub mod heat_pump;
pub mod heat_source;
pub mod heat_sources_simple;
pub mod input;
pub mod material;
pub mod orchestrator;
pub mod output;
pub mod schedule;
pub mod simtime;
pub mod storage_tank;
pub mod utils;
pub mod zone;

pub use errors::{HemError, Result};

/// Version of the engine.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
