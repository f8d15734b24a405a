// Distributed under the MIT License
// (See accompanying LICENSE file or a copy at http://opensource.org/licenses/MIT)

//! Weather and solar-geometry boundary conditions driving the simulation,
//! built on top of [`hem_climate`]'s ISO 52010-1 primitives.

pub mod shading;

use std::cell::RefCell;
use std::collections::HashMap;

use hem_climate::{
    altitude_sol_from_data, azimuth_sol_from_data, declination_from_nday, hourangle_from_data,
    radiation_for_surface, t_sol, Location, SolarRadiation, SunPosition,
};
use serde::{Deserialize, Serialize};

use crate::errors::HemError;
use crate::simtime::SimulationTimeIteration;
use crate::utils::OrderedF32;
use shading::{ShadingSegment, WindowShadingObject};

/// Boundary conditions that are constant for the whole simulation plus the
/// hourly (or sub-hourly) weather series that drive it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalConditions {
    pub location: Location,
    /// Day of the year (1-365) that `air_temp[0]` corresponds to.
    pub start_nday: u32,
    pub air_temp: Vec<f32>,
    pub wind_speed: Vec<f32>,
    pub diffuse_horizontal_radiation: Vec<f32>,
    pub direct_beam_radiation: Vec<f32>,
    pub ground_reflectivity: f32,
    #[serde(default)]
    pub shading_segments: Vec<ShadingSegment>,
    /// Per-`(tilt, orientation)` cache of [`Self::radiation_on_surface`],
    /// valid only for `cached_index`; invalidated whenever the simulation
    /// advances to a new timestep.
    #[serde(skip)]
    radiation_cache: RefCell<HashMap<(OrderedF32, OrderedF32), SolarRadiation>>,
    #[serde(skip)]
    cached_index: std::cell::Cell<Option<usize>>,
}

impl ExternalConditions {
    pub fn validate(&self, n_timesteps: usize) -> Result<(), HemError> {
        for (name, series) in [
            ("air_temp", &self.air_temp),
            ("wind_speed", &self.wind_speed),
            ("diffuse_horizontal_radiation", &self.diffuse_horizontal_radiation),
            ("direct_beam_radiation", &self.direct_beam_radiation),
        ] {
            if series.len() != n_timesteps {
                return Err(HemError::input(
                    "external_conditions",
                    format!(
                        "{name} has {} entries, expected {n_timesteps}",
                        series.len()
                    ),
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.ground_reflectivity) {
            return Err(HemError::input(
                "external_conditions.ground_reflectivity",
                "must be in [0, 1]",
            ));
        }
        Ok(())
    }

    pub fn air_temp(&self, t: &SimulationTimeIteration) -> f32 {
        at(&self.air_temp, t.index)
    }

    pub fn wind_speed(&self, t: &SimulationTimeIteration) -> f32 {
        at(&self.wind_speed, t.index)
    }

    fn nday(&self, t: &SimulationTimeIteration) -> u32 {
        let day_offset = (t.time / 24.0).floor() as u32;
        let nday = self.start_nday + day_offset;
        ((nday - 1) % 365) + 1
    }

    fn hour_of_day(&self, t: &SimulationTimeIteration) -> f32 {
        t.time.rem_euclid(24.0)
    }

    /// Solar horizontal irradiance split into direct and diffuse components.
    pub fn solar_radiation_horizontal(&self, t: &SimulationTimeIteration) -> SolarRadiation {
        SolarRadiation {
            dir: at(&self.direct_beam_radiation, t.index),
            dif: at(&self.diffuse_horizontal_radiation, t.index),
        }
    }

    pub fn sun_position(&self, t: &SimulationTimeIteration) -> SunPosition {
        let nday = self.nday(t);
        let hour = self.hour_of_day(t);
        let declination = declination_from_nday(nday);
        let hourangle = hourangle_from_data(hour, nday, self.location);
        let altitude = altitude_sol_from_data(declination, hourangle, self.location.latitude);
        let azimuth = azimuth_sol_from_data(declination, hourangle, altitude, self.location.latitude);
        SunPosition { azimuth, altitude }
    }

    /// Whether the sun is above the horizon for this timestep.
    pub fn sun_above_horizon(&self, t: &SimulationTimeIteration) -> bool {
        self.sun_position(t).altitude > 0.0
    }

    /// Direct and diffuse irradiance on a surface of the given tilt/orientation,
    /// unshaded (i.e. before applying window shading objects).
    ///
    /// Cached by `(tilt, orientation)` for as long as `t.index` stays the
    /// same: repeated calls within one timestep return bit-for-bit identical
    /// values without recomputing, and the cache is cleared the moment the
    /// simulation index advances.
    pub fn radiation_on_surface(
        &self,
        t: &SimulationTimeIteration,
        tilt: f32,
        orientation: f32,
    ) -> SolarRadiation {
        if self.cached_index.get() != Some(t.index) {
            self.radiation_cache.borrow_mut().clear();
            self.cached_index.set(Some(t.index));
        }

        let key = (OrderedF32(tilt), OrderedF32(orientation));
        if let Some(cached) = self.radiation_cache.borrow().get(&key) {
            return *cached;
        }

        let nday = self.nday(t);
        let hour = self.hour_of_day(t);
        let hour_sol = t_sol(hour, nday, self.location);
        let result = radiation_for_surface(
            nday,
            hour_sol,
            self.solar_radiation_horizontal(t),
            self.location.latitude,
            tilt,
            orientation,
            self.ground_reflectivity,
            self.location.direct_beam_conversion_needed,
        );
        self.radiation_cache.borrow_mut().insert(key, result);
        result
    }

    /// Diffuse irradiance on a surface of the given tilt/orientation, split
    /// into its sky, horizon-brightening and ground-reflected components, for
    /// shading calculations that weight each component's own reduction factor.
    fn diffuse_breakdown_on_surface(
        &self,
        t: &SimulationTimeIteration,
        tilt: f32,
        orientation: f32,
    ) -> hem_climate::DiffuseBreakdown {
        let nday = self.nday(t);
        let hour = self.hour_of_day(t);
        let hour_sol = t_sol(hour, nday, self.location);
        hem_climate::diffuse_breakdown(
            nday,
            hour_sol,
            self.solar_radiation_horizontal(t),
            self.location.latitude,
            tilt,
            orientation,
            self.ground_reflectivity,
            self.location.direct_beam_conversion_needed,
        )
    }

    /// Solar irradiance reaching a window of given geometry, after applying
    /// external and near-field shading for the current timestep.
    #[allow(clippy::too_many_arguments)]
    pub fn surface_irradiance(
        &self,
        t: &SimulationTimeIteration,
        base_height: f32,
        projected_height: f32,
        width: f32,
        tilt: f32,
        orientation: f32,
        window_shading: &[WindowShadingObject],
    ) -> Result<f32, HemError> {
        let unshaded = self.radiation_on_surface(t, tilt, orientation);
        if unshaded.dir + unshaded.dif <= 0.0 {
            return Ok(0.0);
        }

        let sun = self.sun_position(t);
        let outside_beam = outside_solar_beam(tilt, orientation, sun.altitude, sun.azimuth);
        let f_dir = if outside_beam {
            1.0
        } else {
            shading::direct_shading_reduction_factor(
                &self.shading_segments,
                base_height,
                projected_height,
                width,
                orientation,
                window_shading,
                sun.altitude,
                sun.azimuth,
            )?
        };

        let diffuse = self.diffuse_breakdown_on_surface(t, tilt, orientation);
        let f_diff = shading::diffuse_shading_reduction_factor(
            &self.shading_segments,
            base_height,
            projected_height,
            width,
            orientation,
            window_shading,
            tilt,
            diffuse,
        )?;

        Ok(unshaded.dif * f_diff + unshaded.dir * f_dir)
    }
}

fn at(series: &[f32], index: usize) -> f32 {
    series.get(index).copied().unwrap_or(0.0)
}

/// True when the sun is behind the plane of the surface, i.e. no direct beam
/// can reach it regardless of shading objects.
fn outside_solar_beam(tilt: f32, orientation: f32, altitude: f32, azimuth: f32) -> bool {
    if altitude <= 0.0 {
        return true;
    }
    if tilt >= 180.0 - 1e-6 {
        return true;
    }
    let delta_azimuth = (azimuth - orientation).abs();
    tilt < 90.0 && delta_azimuth > 90.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(n: usize) -> ExternalConditions {
        ExternalConditions {
            location: Location {
                latitude: 51.5,
                longitude: 0.0,
                tz: 0,
                direct_beam_conversion_needed: true,
            },
            start_nday: 172, // ~ summer solstice
            air_temp: vec![18.0; n],
            wind_speed: vec![3.0; n],
            diffuse_horizontal_radiation: vec![100.0; n],
            direct_beam_radiation: vec![400.0; n],
            ground_reflectivity: 0.2,
            shading_segments: vec![],
            radiation_cache: RefCell::new(HashMap::new()),
            cached_index: std::cell::Cell::new(None),
        }
    }

    fn iter(index: usize) -> SimulationTimeIteration {
        SimulationTimeIteration {
            index,
            time: index as f32,
            timestep: 1.0,
        }
    }

    #[test]
    fn rejects_mismatched_series_lengths() {
        let mut ec = sample(24);
        ec.air_temp.push(10.0);
        assert!(ec.validate(24).is_err());
    }

    #[test]
    fn sun_is_up_at_noon_in_summer() {
        let ec = sample(24);
        assert!(ec.sun_above_horizon(&iter(12)));
    }

    #[test]
    fn sun_is_down_at_midnight() {
        let ec = sample(24);
        assert!(!ec.sun_above_horizon(&iter(0)));
    }

    #[test]
    fn horizontal_surface_gets_positive_irradiance_at_noon() {
        let ec = sample(24);
        let r = ec.radiation_on_surface(&iter(12), 0.0, 0.0);
        assert!(r.dir + r.dif > 0.0);
    }

    /// Invariant 7: repeated calls at the same timestep index return
    /// bit-for-bit identical cached values.
    #[test]
    fn repeated_calls_within_a_timestep_hit_the_cache_bitwise() {
        let ec = sample(24);
        let first = ec.radiation_on_surface(&iter(12), 30.0, 180.0);
        let second = ec.radiation_on_surface(&iter(12), 30.0, 180.0);
        assert_eq!(first.dir.to_bits(), second.dir.to_bits());
        assert_eq!(first.dif.to_bits(), second.dif.to_bits());
        assert_eq!(ec.radiation_cache.borrow().len(), 1);
    }

    /// The cache is invalidated the moment `t.index` advances.
    #[test]
    fn cache_is_invalidated_when_index_advances() {
        let ec = sample(24);
        ec.radiation_on_surface(&iter(12), 30.0, 180.0);
        assert_eq!(ec.radiation_cache.borrow().len(), 1);
        ec.radiation_on_surface(&iter(13), 30.0, 180.0);
        assert_eq!(ec.radiation_cache.borrow().len(), 1);
        assert_eq!(ec.cached_index.get(), Some(13));
    }

    #[test]
    fn surface_irradiance_is_zero_with_no_radiation() {
        let mut ec = sample(24);
        ec.diffuse_horizontal_radiation = vec![0.0; 24];
        ec.direct_beam_radiation = vec![0.0; 24];
        let v = ec
            .surface_irradiance(&iter(12), 0.0, 1.2, 1.0, 90.0, 0.0, &[])
            .unwrap();
        assert_eq!(v, 0.0);
    }
}
