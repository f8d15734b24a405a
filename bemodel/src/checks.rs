// Distributed under the MIT License
// (See accompanying LICENSE file or a copy at http://opensource.org/licenses/MIT)

//! Domain validation: the checks that must run, and abort construction on
//! failure, before the simulation loop starts. Schema validation against
//! `FHS_schema.json` is out of scope - these functions validate the domain
//! invariants the schema can't express on its own (uniqueness, graph
//! acyclicity, cross-component compatibility).

use std::collections::HashSet;

use crate::errors::HemError;

/// Every named service-connection must be unique across the whole model.
pub fn validate_unique_service_names(names: &[String]) -> Result<(), HemError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(HemError::input(
                "service_name",
                format!("duplicate service name '{name}'"),
            ));
        }
    }
    Ok(())
}

/// A smart tank's state of charge must never be negative.
pub fn validate_soc_nonnegative(soc: f32) -> Result<(), HemError> {
    if soc < 0.0 {
        return Err(HemError::input("storage_tank.soc", format!("state of charge {soc} < 0")));
    }
    Ok(())
}

/// The ventilation model's min/max ACH pair must be consistent
/// (`min <= max`, both non-negative).
pub fn validate_ach_bounds(min_ach: f32, max_ach: f32) -> Result<(), HemError> {
    if min_ach < 0.0 || max_ach < 0.0 {
        return Err(HemError::input("infiltration_ventilation", "ACH must be non-negative"));
    }
    if min_ach > max_ach {
        return Err(HemError::input(
            "infiltration_ventilation",
            format!("min_ach ({min_ach}) > max_ach ({max_ach})"),
        ));
    }
    Ok(())
}

/// An exhaust-air heat pump cannot be paired with an intermittent
/// mechanical-extract-ventilation system: the HP needs a continuous exhaust
/// stream as its source.
pub fn validate_exhaust_air_hp_ventilation(
    is_exhaust_air_hp: bool,
    is_intermittent_mev: bool,
) -> Result<(), HemError> {
    if is_exhaust_air_hp && is_intermittent_mev {
        return Err(HemError::incompatible(
            "exhaust-air heat pump requires continuous MEV, not intermittent MEV".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkType {
    Air,
    Water,
    Glycol25,
}

/// A warm-air emitter only makes sense fed from an air-sink heat pump.
pub fn validate_warm_air_service_sink(service_is_warm_air: bool, sink: SinkType) -> Result<(), HemError> {
    if service_is_warm_air && sink != SinkType::Air {
        return Err(HemError::incompatible(
            "warm-air space-heating service requires an air-sink heat pump".to_string(),
        ));
    }
    Ok(())
}

/// A warm-air emitter cannot be fed by a hybrid (heat-pump + boiler)
/// system: the boiler backup has no warm-air path.
pub fn validate_warm_air_not_on_hybrid(service_is_warm_air: bool, heat_pump_is_hybrid: bool) -> Result<(), HemError> {
    if service_is_warm_air && heat_pump_is_hybrid {
        return Err(HemError::incompatible(
            "warm-air space-heating service cannot be served by a hybrid heat pump".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_service_names_are_rejected() {
        let names = vec!["immersion".to_string(), "immersion".to_string()];
        assert!(validate_unique_service_names(&names).is_err());
    }

    #[test]
    fn unique_service_names_pass() {
        let names = vec!["immersion".to_string(), "hp_space".to_string()];
        assert!(validate_unique_service_names(&names).is_ok());
    }

    #[test]
    fn negative_soc_is_rejected() {
        assert!(validate_soc_nonnegative(-0.1).is_err());
        assert!(validate_soc_nonnegative(0.0).is_ok());
    }

    #[test]
    fn inverted_ach_bounds_are_rejected() {
        assert!(validate_ach_bounds(2.0, 0.5).is_err());
        assert!(validate_ach_bounds(0.5, 2.0).is_ok());
    }

    #[test]
    fn exhaust_air_hp_rejects_intermittent_mev() {
        assert!(validate_exhaust_air_hp_ventilation(true, true).is_err());
        assert!(validate_exhaust_air_hp_ventilation(true, false).is_ok());
        assert!(validate_exhaust_air_hp_ventilation(false, true).is_ok());
    }

    #[test]
    fn warm_air_requires_air_sink() {
        assert!(validate_warm_air_service_sink(true, SinkType::Water).is_err());
        assert!(validate_warm_air_service_sink(true, SinkType::Air).is_ok());
        assert!(validate_warm_air_service_sink(false, SinkType::Water).is_ok());
    }

    #[test]
    fn warm_air_rejects_hybrid_heat_pump() {
        assert!(validate_warm_air_not_on_hybrid(true, true).is_err());
        assert!(validate_warm_air_not_on_hybrid(true, false).is_ok());
    }
}
