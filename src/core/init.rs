//! Random initial configurations.
//!
//! Tabula rasa: all `n` centers are drawn independently and uniformly over the legal
//! region; if any two overlap, the whole attempt is thrown away and a new one starts.
//! Velocities are drawn only once placement has succeeded.

use crate::core::geometry::{Domain, Geometry};
use crate::core::particle::Particle;
use crate::error::{Error, Result};
use rand::Rng;

/// Positions and velocities of a fresh configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration<const D: usize> {
    pub positions: Vec<[f64; D]>,
    pub velocities: Vec<[f64; D]>,
    /// Attempt that succeeded (1-based).
    pub attempts: usize,
}

impl<const D: usize> Configuration<D> {
    pub fn into_particles(self) -> Result<Vec<Particle<D>>> {
        self.positions
            .into_iter()
            .zip(self.velocities)
            .enumerate()
            .map(|(id, (r, v))| Particle::new(id as u32, r, v))
            .collect()
    }
}

/// Build `n` non-overlapping bodies in `geometry` within `max_attempts` tries.
///
/// Each velocity component is uniform in `[-velocity_scale, velocity_scale]`.
/// Exhausting the budget is [`Error::Configuration`]; callers may retry with a fresh
/// generator or a larger budget.
pub fn tabula_rasa<const D: usize, R: Rng>(
    n: usize,
    geometry: &Geometry<D>,
    velocity_scale: f64,
    max_attempts: usize,
    rng: &mut R,
) -> Result<Configuration<D>> {
    if n == 0 {
        return Err(Error::InvalidParam("particle count must be > 0".into()));
    }
    if max_attempts == 0 {
        return Err(Error::InvalidParam("attempt budget must be > 0".into()));
    }
    check_velocity_scale(velocity_scale)?;

    let min_sep = 2.0 * geometry.sigma();
    let mut positions: Vec<[f64; D]> = Vec::with_capacity(n);
    for attempt in 1..=max_attempts {
        positions.clear();
        let mut clash = false;
        for _ in 0..n {
            let x = sample_position(geometry, rng);
            if positions.iter().any(|p| geometry.distance(p, &x) < min_sep) {
                clash = true;
                break;
            }
            positions.push(x);
        }
        if clash {
            continue;
        }

        let velocities = (0..n)
            .map(|_| sample_velocity::<D, R>(velocity_scale, rng))
            .collect();
        log::info!("built configuration of {n} bodies after {attempt} attempts");
        return Ok(Configuration {
            positions,
            velocities,
            attempts: attempt,
        });
    }

    log::warn!("failed to build configuration of {n} bodies after {max_attempts} attempts");
    Err(Error::Configuration(format!(
        "no overlap-free placement of {n} bodies (density {:.4}) after {max_attempts} attempts",
        geometry.get_density(n)
    )))
}

/// `n` velocities with components uniform in `[-scale, scale]`.
pub(crate) fn random_velocities<const D: usize, R: Rng>(
    n: usize,
    scale: f64,
    rng: &mut R,
) -> Result<Vec<[f64; D]>> {
    check_velocity_scale(scale)?;
    Ok((0..n).map(|_| sample_velocity::<D, R>(scale, rng)).collect())
}

fn check_velocity_scale(scale: f64) -> Result<()> {
    if !scale.is_finite() || scale < 0.0 {
        return Err(Error::InvalidParam(
            "velocity scale must be finite and >= 0".into(),
        ));
    }
    Ok(())
}

fn sample_position<const D: usize, R: Rng>(geometry: &Geometry<D>, rng: &mut R) -> [f64; D] {
    let mut x = [0.0f64; D];
    for (k, xk) in x.iter_mut().enumerate() {
        let (lo, hi) = geometry.placement_range(k);
        *xk = rng.random_range(lo..hi);
    }
    geometry.move_to(x)
}

fn sample_velocity<const D: usize, R: Rng>(scale: f64, rng: &mut R) -> [f64; D] {
    let mut v = [0.0f64; D];
    if scale > 0.0 {
        v.iter_mut()
            .for_each(|x| *x = rng.random_range(-scale..=scale));
    }
    v
}
