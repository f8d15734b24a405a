// Distributed under the MIT License
// (See accompanying LICENSE file or a copy at http://opensource.org/licenses/MIT)

//! ISO 52016-1 Annex F shading: remote shading objects organised by azimuth
//! segment, plus near-field window shading (overhangs, side fins, reveals).

use serde::{Deserialize, Serialize};

use crate::errors::HemError;
use crate::utils::normalize;

/// A shading object attached to a shading segment, in the distant environment
/// (hills, neighbouring buildings) rather than to the building itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SegmentShadingObject {
    Obstacle { height: f32, distance: f32 },
    Overhang { height: f32, distance: f32 },
}

/// Azimuth range (clockwise, 0 at a fixed reference) over which a set of remote
/// shading objects applies. Segments must tile the full circle with no gaps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadingSegment {
    pub start: f32,
    pub end: f32,
    #[serde(default)]
    pub shading: Vec<SegmentShadingObject>,
}

/// Near-field window shading, given relative to the window it is attached to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WindowShadingObject {
    Overhang { depth: f32, distance: f32 },
    SideFinLeft { depth: f32, distance: f32 },
    SideFinRight { depth: f32, distance: f32 },
    /// A nearby obstacle with partial transparency (e.g. a tree), unlike the
    /// fully opaque remote `Obstacle` in [`SegmentShadingObject`].
    Obstacle {
        height: f32,
        distance: f32,
        transparency: f32,
    },
    /// A window reveal, expanded at use-time into an overhang plus both side
    /// fins sharing the same depth and distance.
    Reveal { depth: f32, distance: f32 },
}

/// `window_shading`, with any `Reveal` entries expanded into their constituent
/// overhang + two side fins, per the ISO 52016-1 Annex F rule.
fn expand_reveals(window_shading: &[WindowShadingObject]) -> Vec<WindowShadingObject> {
    let mut expanded = Vec::with_capacity(window_shading.len());
    for obj in window_shading {
        match obj {
            WindowShadingObject::Reveal { depth, distance } => {
                expanded.push(WindowShadingObject::Overhang {
                    depth: *depth,
                    distance: *distance,
                });
                expanded.push(WindowShadingObject::SideFinLeft {
                    depth: *depth,
                    distance: *distance,
                });
                expanded.push(WindowShadingObject::SideFinRight {
                    depth: *depth,
                    distance: *distance,
                });
            }
            other => expanded.push(*other),
        }
    }
    expanded
}

/// Finds the shading segment whose `[start, end)` (measured clockwise,
/// decreasing as in the sign convention used throughout this module) contains
/// `azimuth`. Segments must tile the circle exactly; any gap or the absence of
/// a containing segment is an input error.
pub fn find_segment(segments: &[ShadingSegment], azimuth: f32) -> Result<&ShadingSegment, HemError> {
    let mut previous_end: Option<f32> = None;
    for segment in segments {
        if let Some(prev) = previous_end {
            if (prev - segment.start).abs() > 1e-6 {
                return Err(HemError::input(
                    "shading_segments",
                    "no gaps or overlaps are allowed between segments",
                ));
            }
        }
        if segment.end > segment.start {
            return Err(HemError::input(
                "shading_segments",
                "segment end orientation must not exceed its start orientation",
            ));
        }
        previous_end = Some(segment.end);
        if azimuth < segment.start && azimuth > segment.end {
            return Ok(segment);
        }
    }
    Err(HemError::input(
        "shading_segments",
        format!("no shading segment found for azimuth {azimuth}"),
    ))
}

/// Height of the shadow obstacle `p` casts on shaded surface `k`.
pub fn obstacle_shading_height(base_height: f32, obstacle_height: f32, distance: f32, altitude: f32) -> f32 {
    f32::max(0.0, obstacle_height - base_height - distance * altitude.to_radians().tan())
}

/// Height of the shadow overhang `q` casts on shaded surface `k`.
pub fn overhang_shading_height(
    surface_height: f32,
    base_height: f32,
    overhang_height: f32,
    distance: f32,
    altitude: f32,
) -> f32 {
    f32::max(
        0.0,
        surface_height + base_height - overhang_height + distance * altitude.to_radians().tan(),
    )
}

/// Direct-beam shading reduction factor F_dir for a window, combining remote
/// segment obstacles/overhangs with near-field overhangs, side fins and
/// (partially transparent) nearby obstacles.
#[allow(clippy::too_many_arguments)]
pub fn direct_shading_reduction_factor(
    segments: &[ShadingSegment],
    base_height: f32,
    height: f32,
    width: f32,
    orientation: f32,
    window_shading: &[WindowShadingObject],
    altitude: f32,
    azimuth: f32,
) -> Result<f32, HemError> {
    let window_shading = expand_reveals(window_shading);

    let mut hshade_obst = 0.0f32;
    let mut hshade_ovh = 0.0f32;
    let mut wfin_r = 0.0f32;
    let mut wfin_l = 0.0f32;

    let segment = find_segment(segments, azimuth)?;
    for obj in &segment.shading {
        match obj {
            SegmentShadingObject::Obstacle { height: h, distance } => {
                hshade_obst = hshade_obst.max(obstacle_shading_height(base_height, *h, *distance, altitude));
            }
            SegmentShadingObject::Overhang { height: h, distance } => {
                hshade_ovh = hshade_ovh.max(overhang_shading_height(height, base_height, *h, *distance, altitude));
            }
        }
    }

    for obj in &window_shading {
        match obj {
            WindowShadingObject::Overhang { depth, distance } => {
                let new_height =
                    depth * altitude.to_radians().tan() / (azimuth - orientation).to_radians().cos() - distance;
                hshade_ovh = hshade_ovh.max(new_height);
            }
            WindowShadingObject::SideFinRight { depth, distance } => {
                let check = azimuth - orientation;
                let new_fin = if check > 0.0 {
                    0.0
                } else {
                    depth * (azimuth - orientation).to_radians().tan() - distance
                };
                wfin_r = wfin_r.max(new_fin);
            }
            WindowShadingObject::SideFinLeft { depth, distance } => {
                let check = azimuth - orientation;
                let new_fin = if check < 0.0 {
                    0.0
                } else {
                    depth * (azimuth - orientation).to_radians().tan() - distance
                };
                wfin_l = wfin_l.max(new_fin);
            }
            WindowShadingObject::Obstacle { .. } | WindowShadingObject::Reveal { .. } => {
                // nearby (possibly transparent) obstacles are resolved below, reveals already expanded
            }
        }
    }

    let hk_obst = hshade_obst.min(height);
    let hk_ovh = hshade_ovh.min(height);
    let hk_sun = f32::max(0.0, height - (hk_obst + hk_ovh));
    let wk_fin_r = wfin_r.min(width);
    let wk_fin_l = wfin_l.min(width);
    let wk_sun = f32::max(0.0, width - (wk_fin_r + wk_fin_l));

    let mut fdir = (hk_sun * wk_sun) / (height * width);

    for obj in &window_shading {
        if let WindowShadingObject::Obstacle {
            height: h,
            distance,
            transparency,
        } = obj
        {
            let new_shade_height = obstacle_shading_height(base_height, *h, *distance, altitude);
            let hk_obst = new_shade_height.min(height);
            let hk_sun = f32::max(0.0, height - (hk_obst + hk_ovh)) + hk_obst.min(height - hk_ovh) * transparency;
            fdir = fdir.min((hk_sun * wk_sun) / (height * width));
        }
    }

    Ok(fdir.clamp(0.0, 1.0))
}

/// Sky-view factor of a surface tilted `tilt` degrees from horizontal
/// (0 = flat roof facing up, 90 = vertical wall, 180 = flat roof facing down).
pub fn sky_view_factor(tilt: f32) -> f32 {
    let tilt_rad = tilt.to_radians();
    0.5 * (1.0 + tilt_rad.cos())
}

/// Clockwise 0-360 orientation from the anti-clockwise -180/+180 basis used
/// elsewhere, matching the sign convention `ShadingSegment::start`/`end` use.
fn orientation360(orientation: f32) -> f32 {
    180.0 - orientation
}

/// Overlap, in degrees, between two angle intervals given as `(start, end)`.
fn interval_intersect(a: (f32, f32), b: (f32, f32)) -> f32 {
    (a.1.min(b.1) - a.0.max(b.0)).max(0.0)
}

/// Splits an element's forward shaded arc into at most two sub-arcs either
/// side of the 0/360 boundary, plus the equivalent rearward arc and the total
/// forward arc span in degrees.
fn arc_angle(arc_srt: f32, arc_fsh: f32) -> ([(f32, f32); 2], [(f32, f32); 2], f32) {
    if arc_srt < arc_fsh {
        (
            [(arc_srt, arc_fsh), (0.0, 0.0)],
            [(arc_fsh, 360.0), (0.0, arc_srt)],
            arc_fsh - arc_srt,
        )
    } else {
        (
            [(arc_srt, 360.0), (0.0, arc_fsh)],
            [(arc_fsh, arc_srt), (0.0, 0.0)],
            (360.0 - arc_srt) + arc_fsh,
        )
    }
}

/// Splits a shading segment into at most two sub-intervals either side of the
/// 0/360 boundary, plus its total span in degrees.
fn seg_angle(seg_srt: f32, seg_fsh: f32) -> ([(f32, f32); 2], f32) {
    if seg_srt < seg_fsh {
        ([(seg_srt, seg_fsh), (0.0, 0.0)], seg_fsh - seg_srt)
    } else {
        ([(seg_srt, 360.0), (0.0, seg_fsh)], (360.0 - seg_srt) + seg_fsh)
    }
}

/// Diffuse-sky shading reduction factor F_diff, per ISO 52016-1 Annex F
/// (eqs F.9-F.14): remote shading segments reduce the surface's sky view
/// factor by slicing the horizon into forward/rearward arcs and intersecting
/// them against each segment's angular span, with any obstacle/overhang
/// within a segment further narrowing that segment's contribution. The
/// reduction in sky view is then weighted against the sky, horizon-brightening
/// and ground-reflected diffuse components separately, since a lost view of
/// sky increases the effective view of (reflective) ground.
pub fn diffuse_shading_reduction_factor(
    segments: &[ShadingSegment],
    base_height: f32,
    height: f32,
    width: f32,
    orientation: f32,
    window_shading: &[WindowShadingObject],
    tilt: f32,
    diffuse: hem_climate::DiffuseBreakdown,
) -> Result<f32, HemError> {
    let f_sky = sky_view_factor(tilt);
    let diffuse_irr_total = diffuse.sky + diffuse.horiz + diffuse.ground_refl;
    if diffuse_irr_total <= 0.0 {
        return Ok(1.0);
    }

    let (arc_srt, arc_fsh) = if tilt > 0.0 {
        let orient360 = orientation360(orientation);
        if (90.0..=270.0).contains(&orient360) {
            (orient360 - 90.0, orient360 + 90.0)
        } else if orient360 < 90.0 {
            (orient360 + 270.0, orient360 + 90.0)
        } else {
            (orient360 - 90.0, orient360 - 270.0)
        }
    } else {
        (0.0, 360.0)
    };
    let (arc_ang, rarc_ang, deg_arc) = arc_angle(arc_srt, arc_fsh);

    let mut f_sky_new = 0.0f32;
    for segment in segments {
        let seg_srt = normalize(180.0 - segment.start, 0.0, 360.0);
        let seg_fsh = normalize(180.0 - segment.end, 0.0, 360.0);
        let (seg_ang, deg_seg) = seg_angle(seg_srt, seg_fsh);

        let arc_prop = (interval_intersect(arc_ang[0], seg_ang[0])
            + interval_intersect(arc_ang[1], seg_ang[1])
            + interval_intersect(arc_ang[0], seg_ang[1])
            + interval_intersect(arc_ang[1], seg_ang[0]))
            / deg_arc;
        let rarc_prop = (interval_intersect(rarc_ang[0], seg_ang[0])
            + interval_intersect(rarc_ang[1], seg_ang[1])
            + interval_intersect(rarc_ang[0], seg_ang[1])
            + interval_intersect(rarc_ang[1], seg_ang[0]))
            / deg_arc;

        let f_sky_seg_front = if tilt == 0.0 {
            f_sky * (deg_seg / 360.0)
        } else {
            arc_prop * f_sky.min(0.5)
        };
        let f_sky_seg_rear = if tilt > 0.0 && tilt < 90.0 {
            rarc_prop * (f_sky - 0.5).max(0.0)
        } else {
            0.0
        };

        let mut f_sky_ft = f_sky_seg_front;
        let mut f_sky_rr = f_sky_seg_rear;

        for obj in &segment.shading {
            match obj {
                SegmentShadingObject::Obstacle { height: h, distance } => {
                    let h_shade = (h - base_height).max(0.0);
                    if f_sky >= 1.0 - 1e-6 {
                        let alpha_obst = (h_shade / distance).atan();
                        f_sky_ft = f_sky_ft.min(f_sky_seg_front * alpha_obst.cos());
                    } else if f_sky > 0.0 {
                        if f_sky_seg_front > 0.0 {
                            let h_above = (height - h_shade).max(0.0);
                            let p_above = h_above / height;
                            let alpha_obst = ((h_shade - h_shade.min(height) / 2.0) / distance).atan();
                            f_sky_ft = f_sky_ft.min(
                                (f_sky_seg_front
                                    - 0.5 * arc_prop * (1.0 - alpha_obst.cos()) * (1.0 - p_above))
                                    .max(0.0),
                            );
                        }
                        if f_sky_seg_rear > 0.0 {
                            let h_eff = height + distance * tilt.to_radians().tan();
                            if h_eff < h_shade {
                                let alpha_obst = (h_shade / distance).atan();
                                f_sky_rr = f_sky_rr.min(rarc_prop * 0.5 * alpha_obst.cos());
                            }
                        }
                    }
                }
                SegmentShadingObject::Overhang { height: h, distance } => {
                    let h_shade = (h - base_height).max(0.0);
                    if f_sky >= 1.0 - 1e-6 {
                        let alpha_ovh = (h_shade / distance).atan();
                        f_sky_ft = f_sky_ft.min(f_sky_seg_front * (1.0 - alpha_ovh.cos()));
                    } else if f_sky > 0.0 {
                        if f_sky_seg_front > 0.0 {
                            let h_below = h_shade.min(height);
                            let p_below = h_below / height;
                            let alpha_ovh = ((h_shade - h_shade.min(height) / 2.0) / distance).atan();
                            f_sky_ft = f_sky_ft
                                .min(0.5 * arc_prop * (1.0 - alpha_ovh.cos()) * p_below);
                        }
                        if f_sky_seg_rear > 0.0 {
                            let h_eff = height + distance * tilt.to_radians().tan();
                            if h_eff < h_shade {
                                let alpha_ovh = (h_shade / distance).atan();
                                f_sky_rr = f_sky_rr
                                    .min(rarc_prop * 0.5 * (tilt.to_radians().cos() - alpha_ovh.cos()));
                            } else {
                                f_sky_rr = 0.0;
                            }
                        }
                    }
                }
            }
        }

        f_sky_new += f_sky_ft + f_sky_rr;
    }

    let f_sh_dif_rem = if f_sky > 0.0 {
        1.0 - (f_sky - f_sky_new) / f_sky
    } else {
        1.0
    };

    let fdiff_ro = if (f_sky - 1.0).abs() > 1e-6 {
        let f_sh_ref_rem = (1.0 - f_sky_new) / (1.0 - f_sky);
        (f_sh_dif_rem * (diffuse.sky + diffuse.horiz) + f_sh_ref_rem * diffuse.ground_refl)
            / diffuse_irr_total
    } else {
        let angle_eff = (2.0 * f_sky_new - 1.0).clamp(-1.0, 1.0).acos().to_degrees();
        let ground_refl_new = diffuse.ground_reflected_at_tilt(angle_eff);
        (f_sh_dif_rem * (diffuse.sky + diffuse.horiz) + ground_refl_new) / diffuse_irr_total
    };

    // Near-field overhangs, side fins and partially transparent obstacles
    // (eqs F.9-F.14 applied to the window geometry rather than the remote
    // segments): every combination of one overhang, one left fin, one right
    // fin and one obstacle (each defaulting to "no shading object present")
    // is evaluated and the worst (smallest) reduction factor kept.
    let window_shading = expand_reveals(window_shading);
    let angular_height_of_horizon = 0.0f32;
    let alpha = angular_height_of_horizon.to_radians();
    let beta = tilt.to_radians();

    let mut overhangs: Vec<(f32, f32)> = vec![(0.0, 1.0)];
    let mut fins_right: Vec<(f32, f32)> = vec![(0.0, 1.0)];
    let mut fins_left: Vec<(f32, f32)> = vec![(0.0, 1.0)];
    let mut obstacles: Vec<(f32, f32, f32)> = vec![(0.0, 1.0, 0.0)];
    for obj in &window_shading {
        match obj {
            WindowShadingObject::Overhang { depth, distance } => overhangs.push((*depth, *distance)),
            WindowShadingObject::SideFinRight { depth, distance } => fins_right.push((*depth, *distance)),
            WindowShadingObject::SideFinLeft { depth, distance } => fins_left.push((*depth, *distance)),
            WindowShadingObject::Obstacle {
                height: h,
                distance,
                transparency,
            } => obstacles.push((*h, *distance, *transparency)),
            WindowShadingObject::Reveal { .. } => unreachable!("reveals are expanded above"),
        }
    }
    if overhangs.len() >= 2 {
        overhangs.remove(0);
    }
    if fins_right.len() >= 2 {
        fins_right.remove(0);
    }
    if fins_left.len() >= 2 {
        fins_left.remove(0);
    }
    if obstacles.len() >= 2 {
        obstacles.remove(0);
    }

    let view_factor_sky_no_obstacles = (1.0 + beta.cos()) / 2.0;
    let view_factor_ground_no_obstacles = (1.0 - beta.cos()) / 2.0;

    let mut fdiff_window = f32::INFINITY;
    for &(d_ovh, l_ovh) in &overhangs {
        for &(d_fin_r, l_fin_r) in &fins_right {
            for &(d_fin_l, l_fin_l) in &fins_left {
                for &(h_obs, l_obs, t_obs) in &obstacles {
                    let p1_ovh = d_ovh / height;
                    let p2_ovh = l_ovh / height;
                    let p1_fin_l = d_fin_l / width;
                    let p2_fin_l = l_fin_l / width;
                    let p1_fin_r = d_fin_r / width;
                    let p2_fin_r = l_fin_r / width;

                    let f_w_s = (0.6514 * (1.0 - (p2_fin_l / (p1_fin_l * p1_fin_l + p2_fin_l * p2_fin_l).sqrt()))
                        + 0.6514 * (1.0 - (p2_fin_r / (p1_fin_r * p1_fin_r + p2_fin_r * p2_fin_r).sqrt())))
                        / 2.0;
                    let f_w_o = 0.3282 * (1.0 - (p2_ovh / (p1_ovh * p1_ovh + p2_ovh * p2_ovh).sqrt()));
                    let f_w_sky = (1.0 - (alpha + beta - 90f32.to_radians()).sin()) / 2.0;

                    let f_sh_dif_fins = if view_factor_sky_no_obstacles == 0.0 {
                        1.0
                    } else {
                        (1.0 - f_w_s) * f_w_sky / view_factor_sky_no_obstacles
                    };
                    let f_sh_ref_fins = if view_factor_ground_no_obstacles == 0.0 {
                        1.0
                    } else {
                        (1.0 - f_w_s) * (1.0 - f_w_sky) / view_factor_ground_no_obstacles
                    };

                    let f_sh_dif_overhangs = if view_factor_sky_no_obstacles == 0.0 {
                        1.0
                    } else {
                        (f_w_sky - f_w_o) / view_factor_sky_no_obstacles
                    };
                    let f_sh_ref_overhangs = if view_factor_ground_no_obstacles == 0.0 {
                        1.0
                    } else {
                        (1.0 - f_w_sky) / view_factor_ground_no_obstacles
                    };

                    let net_shade_height = h_obs - base_height;
                    let f_sh_dif_obs = if view_factor_sky_no_obstacles == 0.0 || net_shade_height <= 0.0 {
                        1.0
                    } else {
                        let height_above_obstacle = (height - net_shade_height).max(0.0);
                        let prop_above_obstacle = height_above_obstacle / height;
                        let angle_obst = ((net_shade_height / 2.0) / l_obs).atan();
                        let f_w_ob = view_factor_sky_no_obstacles
                            .min((1.0 - (90f32.to_radians() - angle_obst).sin()) * 0.5)
                            * (1.0 - prop_above_obstacle)
                            * (1.0 - t_obs);
                        (view_factor_sky_no_obstacles - f_w_ob) / view_factor_sky_no_obstacles
                    };
                    let f_sh_ref_obs = 1.0;

                    let f_sh_dif = f_sh_dif_fins.min(f_sh_dif_overhangs).min(f_sh_dif_obs).max(0.0);
                    let f_sh_ref = f_sh_ref_fins.min(f_sh_ref_overhangs).min(f_sh_ref_obs).max(0.0);

                    let fdiff = (f_sh_dif * (diffuse.sky + diffuse.horiz) + f_sh_ref * diffuse.ground_refl)
                        / diffuse_irr_total;
                    fdiff_window = fdiff_window.min(fdiff);
                }
            }
        }
    }
    if !fdiff_window.is_finite() {
        fdiff_window = 1.0;
    }

    Ok(fdiff_window.min(fdiff_ro).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unshaded_window_has_full_direct_factor() {
        let segments = vec![ShadingSegment {
            start: 180.0,
            end: -180.0,
            shading: vec![],
        }];
        let f = direct_shading_reduction_factor(&segments, 1.0, 1.2, 1.0, 0.0, &[], 45.0, 0.0).unwrap();
        assert!((f - 1.0).abs() < 1e-6);
    }

    #[test]
    fn tall_overhang_blocks_all_direct_sun_at_high_altitude() {
        let segments = vec![ShadingSegment {
            start: 180.0,
            end: -180.0,
            shading: vec![],
        }];
        let shading = vec![WindowShadingObject::Overhang {
            depth: 5.0,
            distance: 0.0,
        }];
        let f = direct_shading_reduction_factor(&segments, 0.0, 1.2, 1.0, 0.0, &shading, 80.0, 0.0).unwrap();
        assert!(f < 0.2);
    }

    #[test]
    fn gap_between_segments_is_rejected() {
        let segments = vec![
            ShadingSegment {
                start: 180.0,
                end: 90.0,
                shading: vec![],
            },
            ShadingSegment {
                start: 80.0,
                end: -180.0,
                shading: vec![],
            },
        ];
        assert!(find_segment(&segments, 0.0).is_err());
    }

    #[test]
    fn reveal_expands_to_overhang_and_both_fins() {
        let expanded = expand_reveals(&[WindowShadingObject::Reveal {
            depth: 0.2,
            distance: 0.0,
        }]);
        assert_eq!(expanded.len(), 3);
    }

    #[test]
    fn sky_view_factor_is_one_for_flat_roof_and_half_for_wall() {
        assert!((sky_view_factor(0.0) - 1.0).abs() < 1e-6);
        assert!((sky_view_factor(90.0) - 0.5).abs() < 1e-6);
    }

    fn sample_diffuse(tilt: f32, orientation: f32) -> hem_climate::DiffuseBreakdown {
        hem_climate::diffuse_breakdown(
            172,
            12.0,
            hem_climate::SolarRadiation { dir: 400.0, dif: 100.0 },
            51.5,
            tilt,
            orientation,
            0.2,
            true,
        )
    }

    #[test]
    fn unshaded_vertical_wall_keeps_most_diffuse_irradiance() {
        let segments = vec![ShadingSegment {
            start: 180.0,
            end: -180.0,
            shading: vec![],
        }];
        let diffuse = sample_diffuse(90.0, 0.0);
        let f = diffuse_shading_reduction_factor(&segments, 1.0, 1.2, 1.0, 0.0, &[], 90.0, diffuse).unwrap();
        assert!(f > 0.9, "expected near-unity factor, got {f}");
    }

    #[test]
    fn tall_remote_obstacle_reduces_diffuse_factor() {
        let segments = vec![ShadingSegment {
            start: 180.0,
            end: -180.0,
            shading: vec![SegmentShadingObject::Obstacle {
                height: 40.0,
                distance: 3.0,
            }],
        }];
        let diffuse = sample_diffuse(90.0, 0.0);
        let unshaded = vec![ShadingSegment {
            start: 180.0,
            end: -180.0,
            shading: vec![],
        }];
        let f_shaded =
            diffuse_shading_reduction_factor(&segments, 1.0, 1.2, 1.0, 0.0, &[], 90.0, diffuse).unwrap();
        let f_unshaded =
            diffuse_shading_reduction_factor(&unshaded, 1.0, 1.2, 1.0, 0.0, &[], 90.0, diffuse).unwrap();
        assert!(f_shaded < f_unshaded, "obstacle should reduce diffuse factor ({f_shaded} vs {f_unshaded})");
    }

    #[test]
    fn overhang_reduces_diffuse_factor_on_flat_roof() {
        let segments = vec![ShadingSegment {
            start: 180.0,
            end: -180.0,
            shading: vec![],
        }];
        let diffuse = sample_diffuse(0.0, 0.0);
        let shading = vec![WindowShadingObject::Overhang {
            depth: 3.0,
            distance: 0.1,
        }];
        let f_shaded =
            diffuse_shading_reduction_factor(&segments, 0.0, 1.2, 1.0, 0.0, &shading, 0.0, diffuse).unwrap();
        let f_unshaded =
            diffuse_shading_reduction_factor(&segments, 0.0, 1.2, 1.0, 0.0, &[], 0.0, diffuse).unwrap();
        assert!(f_shaded < f_unshaded, "overhang should reduce diffuse factor ({f_shaded} vs {f_unshaded})");
    }

    #[test]
    fn diffuse_factor_stays_within_unit_bounds() {
        let segments = vec![ShadingSegment {
            start: 180.0,
            end: -180.0,
            shading: vec![SegmentShadingObject::Overhang {
                height: 2.0,
                distance: 1.0,
            }],
        }];
        let diffuse = sample_diffuse(45.0, 30.0);
        let f = diffuse_shading_reduction_factor(&segments, 0.5, 1.0, 1.0, 30.0, &[], 45.0, diffuse).unwrap();
        assert!((0.0..=1.0).contains(&f));
    }
}
