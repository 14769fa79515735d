//! Velocity updates at the instant of contact.

use crate::core::geometry::{dot, norm_sq, sub};
use crate::error::{Error, Result};

/// Contact normals shorter than this are treated as coincident centers.
const EPS_NORMAL: f64 = 1e-12;

/// Specular reflection off a wall perpendicular to `axis`.
#[inline]
pub fn wall_bounce<const D: usize>(v: &mut [f64; D], axis: usize) {
    v[axis] = -v[axis];
}

/// Elastic collision of two equal-mass bodies touching along `dx = x1 - x2`.
///
/// Only the relative-velocity component along the line of centers is exchanged; the
/// tangential part is untouched. The pair energy `|v1|² + |v2|²` is compared before
/// and after, and a relative change above `energy_tolerance` is reported.
pub fn pair_collide<const D: usize>(
    dx: &[f64; D],
    v1: &mut [f64; D],
    v2: &mut [f64; D],
    energy_tolerance: f64,
) -> Result<()> {
    let dist = norm_sq(dx).sqrt();
    if !dist.is_finite() || dist <= EPS_NORMAL {
        return Err(Error::NumericalInconsistency(format!(
            "degenerate contact normal (|dx| = {dist})"
        )));
    }
    let mut e_perp = *dx;
    for ek in &mut e_perp {
        *ek /= dist;
    }

    let before = norm_sq(v1) + norm_sq(v2);
    let scal = dot(&sub(v1, v2), &e_perp);
    let (mut new1, mut new2) = (*v1, *v2);
    for ((a, b), &ek) in new1.iter_mut().zip(new2.iter_mut()).zip(&e_perp) {
        *a -= ek * scal;
        *b += ek * scal;
    }
    let after = norm_sq(&new1) + norm_sq(&new2);

    if before > 0.0 && ((after - before) / before).abs() > energy_tolerance {
        return Err(Error::NumericalInconsistency(format!(
            "pair collision changed |v1|²+|v2|² from {before} to {after}"
        )));
    }
    *v1 = new1;
    *v2 = new2;
    Ok(())
}
