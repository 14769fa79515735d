use crate::error::{Error, Result};

/// A hard disk (`D = 2`) or sphere (`D = 3`) of unit mass.
///
/// The radius is common to all bodies and lives on the geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle<const D: usize> {
    /// Index in the simulation's particle vector.
    pub id: u32,
    /// Position.
    pub r: [f64; D],
    /// Velocity.
    pub v: [f64; D],
    /// Bumped by every wall or pair collision; queued predictions compare against it.
    pub collision_count: u64,
}

impl<const D: usize> Particle<D> {
    /// Create a new particle after checking that every component is finite.
    pub fn new(id: u32, r: [f64; D], v: [f64; D]) -> Result<Self> {
        if !r.iter().all(|x| x.is_finite()) {
            return Err(Error::InvalidParam(format!(
                "position of particle {id} must be finite"
            )));
        }
        if !v.iter().all(|x| x.is_finite()) {
            return Err(Error::InvalidParam(format!(
                "velocity of particle {id} must be finite"
            )));
        }
        Ok(Self {
            id,
            r,
            v,
            collision_count: 0,
        })
    }

    /// Record one more collision.
    #[inline]
    pub fn bump_collision_count(&mut self) {
        self.collision_count = self.collision_count.saturating_add(1);
    }

    /// `|v|²`.
    #[inline]
    pub fn speed_sq(&self) -> f64 {
        self.v.iter().map(|&c| c * c).sum()
    }

    /// Kinetic energy `|v|² / 2`.
    #[inline]
    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.speed_sq()
    }

    /// Straight-line motion over `dt`.
    #[inline]
    pub fn drift(&mut self, dt: f64) {
        for (rk, &vk) in self.r.iter_mut().zip(&self.v) {
            *rk += vk * dt;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_sphere_has_no_collisions() -> Result<()> {
        let p = Particle::new(4, [0.1, 0.2, 0.3], [-1.0, 0.0, 1.0])?;
        assert_eq!((p.id, p.collision_count), (4, 0));
        assert_eq!(p.r[2], 0.3);
        Ok(())
    }

    #[test]
    fn non_finite_state_rejected() {
        let err = Particle::new(0, [f64::NAN, 0.0], [0.0, 0.0]).unwrap_err();
        assert!(err.to_string().contains("position"));
        let err = Particle::new(0, [0.0, 0.0], [0.0, f64::INFINITY]).unwrap_err();
        assert!(err.to_string().contains("velocity"));
    }

    #[test]
    fn kinetic_energy_computed() -> Result<()> {
        let p = Particle::new(7, [0.0, 0.0], [3.0, 4.0])?;
        assert!((p.speed_sq() - 25.0).abs() < 1e-12);
        assert!((p.kinetic_energy() - 12.5).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn drift_is_linear() -> Result<()> {
        let mut p = Particle::new(0, [0.25, 0.5], [1.0, -0.5])?;
        p.drift(0.5);
        assert_eq!(p.r, [0.75, 0.25]);
        Ok(())
    }

    #[test]
    fn counter_only_grows() -> Result<()> {
        let mut p = Particle::new(1, [0.0, 0.0], [0.0, 0.0])?;
        p.bump_collision_count();
        p.bump_collision_count();
        assert_eq!(p.collision_count, 2);
        p.collision_count = u64::MAX;
        p.bump_collision_count();
        assert_eq!(p.collision_count, u64::MAX);
        Ok(())
    }
}
