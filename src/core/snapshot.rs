//! Flat, serializable record of a simulation state.
//!
//! Vectors are stored as plain `Vec<f64>` so the record does not depend on the
//! compile-time dimension; conversion back checks every length.

use crate::core::geometry::{Boundary, Geometry};
use crate::core::particle::Particle;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Complete state of a simulation, with one row per particle in id order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Walls or periodic wrap.
    pub boundary: Boundary,
    /// Side length per axis; its length is the dimension.
    pub lengths: Vec<f64>,
    /// Body radius.
    pub sigma: f64,
    /// Centers, `dimension()` values per row.
    pub positions: Vec<Vec<f64>>,
    /// Velocities, `dimension()` values per row.
    pub velocities: Vec<Vec<f64>>,
    /// Simulation clock when the record was taken.
    #[serde(default)]
    pub time: f64,
    /// Seed of the generator that built the initial configuration, if known.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Snapshot {
    /// Number of axes recorded in the side lengths.
    pub fn dimension(&self) -> usize {
        self.lengths.len()
    }

    pub fn num_particles(&self) -> usize {
        self.positions.len()
    }

    pub fn geometry<const D: usize>(&self) -> Result<Geometry<D>> {
        let lengths = to_array::<D>(&self.lengths, "lengths")?;
        Geometry::new(self.boundary, lengths, self.sigma)
    }

    pub fn particles<const D: usize>(&self) -> Result<Vec<Particle<D>>> {
        if self.positions.len() != self.velocities.len() {
            return Err(Error::InvalidParam(format!(
                "{} positions but {} velocities",
                self.positions.len(),
                self.velocities.len()
            )));
        }
        self.positions
            .iter()
            .zip(&self.velocities)
            .enumerate()
            .map(|(id, (r, v))| {
                let r = to_array::<D>(r, "position")?;
                let v = to_array::<D>(v, "velocity")?;
                Particle::new(id as u32, r, v)
            })
            .collect()
    }
}

fn to_array<const D: usize>(values: &[f64], what: &str) -> Result<[f64; D]> {
    values.try_into().map_err(|_| {
        Error::InvalidParam(format!(
            "{what} has {} components, expected {D}",
            values.len()
        ))
    })
}
