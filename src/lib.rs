//! Event-driven molecular dynamics of hard disks (2-d) and hard spheres (3-d).
//!
//! Bodies move ballistically between instantaneous elastic collisions, either inside
//! a box with hard walls or on a periodic torus. The engine jumps from event to event
//! using exact contact times instead of integrating with a fixed time step.
//!
//! ```no_run
//! use hardsim::core::{Budget, Geometry, SimConfig, Simulation};
//!
//! # fn main() -> hardsim::Result<()> {
//! let geometry = Geometry::new_torus([1.0, 1.0], 0.1)?;
//! let mut sim = Simulation::random(geometry, 4, 1.0, 10_000, 42, SimConfig::default())?;
//! sim.run(Budget::Events(10_000))?;
//! println!("E = {}", sim.kinetic_energy());
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod error;

#[cfg(feature = "python")]
mod python;

pub use crate::error::{Error, Result};
