//! Collision-time prediction. Nothing in here mutates state.

use crate::core::geometry::{dot, sub, Domain, Geometry};

/// Time for a body at `pos` moving with `vel` along one axis to touch the wall at
/// `sigma` or `l - sigma`. Infinite when the body is at rest on that axis.
#[inline]
pub fn wall_time(pos: f64, vel: f64, sigma: f64, l: f64) -> f64 {
    if vel > 0.0 {
        (l - sigma - pos) / vel
    } else if vel < 0.0 {
        (sigma - pos) / vel
    } else {
        f64::INFINITY
    }
}

/// First time at which two bodies of radius `sigma` come into contact.
///
/// Returns infinity unless the bodies are approaching (`Δx·Δv < 0`) and their
/// trajectories actually reach a separation of `2 sigma` (`Υ > 0`). The returned
/// value is the earlier root of `|Δx + Δv t| = 2 sigma`.
#[inline]
pub fn pair_time<const D: usize>(
    x1: &[f64; D],
    x2: &[f64; D],
    v1: &[f64; D],
    v2: &[f64; D],
    sigma: f64,
) -> f64 {
    pair_time_from(&sub(x1, x2), &sub(v1, v2), sigma)
}

/// [`pair_time`] on precomputed separations `Δx = x1 - x2`, `Δv = v1 - v2`.
#[inline]
pub fn pair_time_from<const D: usize>(dx: &[f64; D], dv: &[f64; D], sigma: f64) -> f64 {
    let dx_dv = dot(dx, dv);
    if dx_dv >= 0.0 {
        return f64::INFINITY;
    }
    let dv_dv = dot(dv, dv);
    let upsilon = dx_dv * dx_dv - dv_dv * (dot(dx, dx) - 4.0 * sigma * sigma);
    if upsilon > 0.0 {
        -(dx_dv + upsilon.sqrt()) / dv_dv
    } else {
        f64::INFINITY
    }
}

/// Outcome of predicting one pair in a given geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PairPrediction {
    /// The pair touches after this time.
    Contact(f64),
    /// No contact is found before this time; beyond it the prediction must be redone.
    Recheck(f64),
    Never,
}

impl PairPrediction {
    /// Time until the scheduler has to act on this pair.
    #[inline]
    pub fn time(&self) -> f64 {
        match *self {
            PairPrediction::Contact(t) | PairPrediction::Recheck(t) => t,
            PairPrediction::Never => f64::INFINITY,
        }
    }
}

/// Predict the next interaction of a pair in `geometry`.
///
/// On a torus the separation can leave the minimum image while the pair is in
/// flight, so every image in the shell around the minimum one is tried. That search
/// is exact until component `k` of the relative displacement has grown by
/// `1.5 L_k - 2 sigma`; past that horizon a [`PairPrediction::Recheck`] is returned.
pub fn predict_pair<const D: usize>(
    geometry: &Geometry<D>,
    x1: &[f64; D],
    x2: &[f64; D],
    v1: &[f64; D],
    v2: &[f64; D],
) -> PairPrediction {
    let sigma = geometry.sigma();
    let dx = geometry.separation(x1, x2);
    let dv = sub(v1, v2);
    match geometry {
        Geometry::Box(_) => {
            let t = pair_time_from(&dx, &dv, sigma);
            if t.is_finite() {
                PairPrediction::Contact(t)
            } else {
                PairPrediction::Never
            }
        }
        Geometry::Torus(_) => {
            let lengths = geometry.lengths();
            let mut horizon = f64::INFINITY;
            for (&dvk, &l) in dv.iter().zip(lengths) {
                if dvk != 0.0 {
                    horizon = horizon.min((1.5 * l - 2.0 * sigma) / dvk.abs());
                }
            }
            if !horizon.is_finite() {
                // no relative motion
                return PairPrediction::Never;
            }
            if misses_along_single_axis(&dx, &dv, sigma) {
                return PairPrediction::Never;
            }

            let mut best = f64::INFINITY;
            let images = 3usize.pow(D as u32);
            for code in 0..images {
                let mut shifted = dx;
                let mut c = code;
                for (sk, &l) in shifted.iter_mut().zip(lengths) {
                    *sk += ((c % 3) as f64 - 1.0) * l;
                    c /= 3;
                }
                best = best.min(pair_time_from(&shifted, &dv, sigma));
            }

            if best <= horizon {
                PairPrediction::Contact(best)
            } else {
                PairPrediction::Recheck(horizon)
            }
        }
    }
}

/// Relative motion along one axis only keeps the other components of `dx` fixed.
/// Those are already minimum-image, so no image ever comes closer than they are.
fn misses_along_single_axis<const D: usize>(dx: &[f64; D], dv: &[f64; D], sigma: f64) -> bool {
    let mut moving = dv.iter().enumerate().filter(|&(_, &dvk)| dvk != 0.0);
    let (Some((axis, _)), None) = (moving.next(), moving.next()) else {
        return false;
    };
    let perp_sq: f64 = dx
        .iter()
        .enumerate()
        .filter(|&(k, _)| k != axis)
        .map(|(_, &d)| d * d)
        .sum();
    perp_sq >= 4.0 * sigma * sigma
}

/// Earliest wall contact of one body: `(time, axis)`. `None` on a torus or at rest.
pub fn predict_wall<const D: usize>(
    geometry: &Geometry<D>,
    x: &[f64; D],
    v: &[f64; D],
) -> Option<(f64, usize)> {
    if !geometry.has_walls() {
        return None;
    }
    let sigma = geometry.sigma();
    let mut best: Option<(f64, usize)> = None;
    for (axis, ((&xk, &vk), &l)) in x.iter().zip(v).zip(geometry.lengths()).enumerate() {
        let t = wall_time(xk, vk, sigma, l);
        if !t.is_finite() {
            continue;
        }
        let earlier = match best {
            Some((bt, _)) => t < bt,
            None => true,
        };
        if earlier {
            best = Some((t, axis));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn wall_time_matches_linear_motion() {
        assert_relative_eq!(wall_time(0.5, 1.0, 0.1, 1.0), 0.4, epsilon = 1e-15);
        assert_relative_eq!(wall_time(0.5, -2.0, 0.1, 1.0), 0.2, epsilon = 1e-15);
        assert_eq!(wall_time(0.5, 0.0, 0.1, 1.0), f64::INFINITY);
    }

    #[test]
    fn head_on_pair_time() {
        let sigma = 0.1;
        let d = 0.7;
        let t = pair_time(&[0.0, 0.5], &[d, 0.5], &[1.0, 0.0], &[-1.0, 0.0], sigma);
        assert_relative_eq!(t, (d - 2.0 * sigma) / 2.0, epsilon = 1e-9);
    }

    #[test]
    fn receding_or_missing_pairs_never_collide() {
        let sigma = 0.1;
        // moving apart
        let t = pair_time(&[0.0, 0.0], &[0.5, 0.0], &[-1.0, 0.0], &[1.0, 0.0], sigma);
        assert_eq!(t, f64::INFINITY);
        // passing each other with a large impact parameter
        let t = pair_time(&[0.0, 0.0], &[0.5, 0.5], &[1.0, 0.0], &[-1.0, 0.0], sigma);
        assert_eq!(t, f64::INFINITY);
        // identical velocities
        let t = pair_time(&[0.0, 0.0], &[0.5, 0.0], &[1.0, 0.0], &[1.0, 0.0], sigma);
        assert_eq!(t, f64::INFINITY);
    }

    #[test]
    fn torus_finds_collision_across_the_seam() -> Result<()> {
        let g = Geometry::new_torus([1.0, 1.0], 0.1)?;
        // raw separation 0.8, minimum image 0.2: contact after the seam
        let p = predict_pair(&g, &[0.1, 0.5], &[0.9, 0.5], &[-0.5, 0.0], &[0.5, 0.0]);
        match p {
            PairPrediction::Contact(t) => assert_relative_eq!(t, 0.0, epsilon = 1e-12),
            other => panic!("expected contact, got {other:?}"),
        }
        let p = predict_pair(&g, &[0.15, 0.5], &[0.85, 0.5], &[-0.5, 0.0], &[0.5, 0.0]);
        // gap 0.3 - 2 sigma closes at relative speed 1
        assert_relative_eq!(p.time(), 0.1, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn torus_finds_collision_through_the_next_image() -> Result<()> {
        let g = Geometry::new_torus([1.0, 1.0], 0.1)?;
        // minimum image says they recede, but they meet again around the torus
        let p = predict_pair(&g, &[0.35, 0.5], &[0.65, 0.5], &[-0.5, 0.0], &[0.5, 0.0]);
        // gap through the seam is 1 - 0.3 - 2 sigma = 0.5 at closing speed 1
        assert_relative_eq!(p.time(), 0.5, epsilon = 1e-12);
        assert!(matches!(p, PairPrediction::Contact(_)));
        Ok(())
    }

    #[test]
    fn torus_axis_aligned_miss_is_never() -> Result<()> {
        let g = Geometry::new_torus([1.0, 1.0], 0.1)?;
        // moving along y with an x-offset larger than 2 sigma: no image ever touches
        let p = predict_pair(&g, &[0.2, 0.5], &[0.6, 0.5], &[0.0, 1.0], &[0.0, -1.0]);
        assert_eq!(p, PairPrediction::Never);
        // the offset counts through the seam: 0.05 and 0.9 are 0.15 apart
        let p = predict_pair(&g, &[0.05, 0.5], &[0.9, 0.2], &[0.0, 1.0], &[0.0, -1.0]);
        assert!(matches!(p, PairPrediction::Contact(_)));
        Ok(())
    }

    #[test]
    fn torus_oblique_pair_asks_for_recheck() -> Result<()> {
        let g = Geometry::new_torus([10.0, 10.0], 0.1)?;
        // no image within the shell touches before the x horizon (15 - 0.2) / 2
        let p = predict_pair(&g, &[1.0, 1.0], &[1.0, 6.0], &[1.0, 0.1], &[-1.0, -0.1]);
        match p {
            PairPrediction::Recheck(t) => assert_relative_eq!(t, 7.4, epsilon = 1e-12),
            other => panic!("expected recheck, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn box_wall_prediction_picks_earliest_axis() -> Result<()> {
        let g = Geometry::new_box([1.0, 2.0], 0.1)?;
        let (t, axis) = predict_wall(&g, &[0.5, 1.0], &[1.0, -4.0]).expect("walls exist");
        assert_eq!(axis, 1);
        assert_relative_eq!(t, 0.225, epsilon = 1e-15);
        let t = Geometry::new_torus([1.0, 1.0], 0.1)?;
        assert!(predict_wall(&t, &[0.5, 0.5], &[1.0, 1.0]).is_none());
        Ok(())
    }

    proptest! {
        #[test]
        fn predicted_contact_is_at_two_sigma(
            x in -1.0..1.0_f64, y in -1.0..1.0_f64,
            vx in -1.0..1.0_f64, vy in -1.0..1.0_f64,
        ) {
            let sigma = 0.1;
            let x1 = [x, y];
            let x2 = [0.0, 0.0];
            prop_assume!(x * x + y * y > 4.0 * sigma * sigma * 1.01);
            let v1 = [vx, vy];
            let v2 = [0.0, 0.0];
            let t = pair_time(&x1, &x2, &v1, &v2, sigma);
            if t.is_finite() {
                prop_assert!(t >= 0.0);
                let c = [x1[0] + t * vx, x1[1] + t * vy];
                let dist = (c[0] * c[0] + c[1] * c[1]).sqrt();
                prop_assert!((dist - 2.0 * sigma).abs() < 1e-9, "dist {}", dist);
            }
        }
    }
}
