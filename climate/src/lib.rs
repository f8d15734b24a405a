//! Solar position and irradiance primitives implementing BS EN ISO 52010-1.
//!
//! This crate contains the pure, side-effect-free geometry and radiation
//! formulas used by `hem-core`'s external-conditions model. It has no
//! knowledge of buildings, zones or shading objects - those live in
//! `hem-core`, which composes these primitives per timestep.

pub mod solar;

pub use solar::{
    airmass, altitude_sol_from_data, azimuth_sol_from_data, brightness_coefficients, clearness,
    declination_from_nday, diffuse_breakdown, diffuse_params, extra_terrestrial_radiation,
    hourangle_from_data, hourangle_from_tsol, nday_from_md, nday_from_str, nday_from_ymd,
    radiation_for_surface, sky_brightness, sun_position, sunsurface_angles, t_sol,
    zenith_sol_from_altitude_sol, BrightnessCoefs, DiffuseBreakdown, DiffuseParams, Location,
    SolarRadiation, SunPosition, SunSurfaceAngles,
};

pub const MONTH_N: [u32; 12] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
pub const MONTH_DAYS: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Standard set of cardinal orientations used for reporting: (tilt, azimuth, name)
pub const ORIENTATIONS: [(f32, f32, &str); 9] = [
    (0.0, 0.0, "Horiz."),
    (90.0, -135.0, "NE"),
    (90.0, -90.0, "E"),
    (90.0, -45.0, "SE"),
    (90.0, 0.0, "S"),
    (90.0, 45.0, "SW"),
    (90.0, 90.0, "W"),
    (90.0, 135.0, "NW"),
    (90.0, 180.0, "N"),
];

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! assert_almost_eq {
        ($a:expr, $b:expr) => {
            assert_almost_eq!($a, $b, 0.001)
        };
        ($a:expr, $b:expr, $c:expr) => {
            if ($a - $b).abs() > $c {
                panic!(
                    "assertion failed: `abs(left - right) < {}`, (left: `{}`, right: `{}`)",
                    $c, $a, $b
                );
            }
        };
    }

    #[test]
    fn sunpos_test() {
        // Compared against https://gml.noaa.gov/grad/solcalc/
        let nday1 = nday_from_str("2001-6-11");
        let nday2 = nday_from_ymd(2001, 6, 11);
        let nday3 = nday_from_md(6, 11);
        let loc = Location {
            latitude: 40.0,
            longitude: 0.0,
            tz: 2,
            ..Default::default()
        };

        assert_eq!(nday1, 162);
        assert_eq!(nday2, 162);
        assert_eq!(nday3, 162);
        let declination = solar::declination_from_nday(162);
        assert_almost_eq!(declination, 23.053);
        assert_almost_eq!(solar::t_eq(nday1), -0.354);
        assert_almost_eq!(solar::t_shift(loc), 2.0);
        assert_almost_eq!(solar::t_sol(14.0, 162, loc), 12.006);
        assert_almost_eq!(solar::nhour_from_t_sol(12.5, 162, loc), 14.494);
        assert_almost_eq!(solar::hourangle_from_data(14.4941, 162, loc), 0.0);
        assert_almost_eq!(solar::hourangle_from_tsol(12.5), 0.0);
        assert_almost_eq!(solar::hourangle_from_tsol(13.0), -7.5);
        assert_almost_eq!(
            solar::altitude_sol_from_data(23.053, 0.0, loc.latitude),
            73.053
        );
        assert_almost_eq!(
            solar::azimuth_sol_from_data(23.053, 0.0, 73.053, loc.latitude),
            0.0
        );
        let sunpos = sun_position(23.053, 0.0, loc);
        assert_almost_eq!(sunpos.altitude, 73.053);
        assert_almost_eq!(sunpos.azimuth, 0.0);
    }

    #[test]
    fn sun_surface_angles_test() {
        let nday = 162;
        let nhour = 12.5; // solar noon; local clock time is 14.4941h
        let loc = Location {
            latitude: 40.0,
            longitude: 0.0,
            tz: 2,
            ..Default::default()
        };

        let nhour = solar::nhour_from_t_sol(nhour, nday, loc);
        let declination = solar::declination_from_nday(nday);
        let hourangle = solar::hourangle_from_data(nhour, nday, loc);
        let ssang = sunsurface_angles(declination, hourangle, loc, 0.0, 0.0);
        assert_almost_eq!(ssang.angle, 16.947);
        assert_almost_eq!(ssang.azimuth, 0.0);
        assert_almost_eq!(ssang.tilt, -16.947);
        let ssang = sunsurface_angles(declination, hourangle, loc, 90.0, 0.0);
        assert_almost_eq!(ssang.angle, 73.053);
        assert_almost_eq!(ssang.azimuth, 0.0);
        assert_almost_eq!(ssang.tilt, 73.053);
        let ssang = sunsurface_angles(declination, hourangle, loc, 90.0, 45.0);
        assert_almost_eq!(ssang.angle, 78.106);
        assert_almost_eq!(ssang.azimuth, -45.0);
        assert_almost_eq!(ssang.tilt, 73.053);
        let ssang = sunsurface_angles(declination, hourangle, loc, 90.0, 180.0);
        assert_almost_eq!(ssang.angle, 106.947);
        assert_almost_eq!(ssang.azimuth, -180.0);
        assert_almost_eq!(ssang.tilt, 73.053);
    }

    #[test]
    fn airmass_low_altitude_branch_is_finite() {
        // Boundary case B2: altitude clamped to 0 still yields a finite air mass
        let m = airmass(0.0);
        assert!(m.is_finite());
        assert!(m > 0.0);
    }

    #[test]
    fn clearness_is_999_when_diffuse_is_zero() {
        // Boundary case B1
        assert_almost_eq!(clearness(400.0, 0.0, 30.0), 999.0);
    }
}
