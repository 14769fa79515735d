//! Core data structures and the event-driven engine.
//!
//! Bottom-up: [`geometry`] owns the domain, [`predict`] and [`resolve`] hold the
//! collision kinematics, [`sim`] schedules events over a set of [`Particle`]s.

pub mod config;
pub mod event;
pub mod geometry;
pub mod init;
pub mod particle;
pub mod predict;
pub mod resolve;
pub mod sim;
pub mod snapshot;

pub use config::{Budget, SchedulerKind, SimConfig};
pub use event::{Event, EventKind, Outcome};
pub use geometry::{Boundary, Domain, Geometry};
pub use init::{tabula_rasa, Configuration};
pub use particle::Particle;
pub use sim::{CollisionCounts, RunSummary, Simulation};
pub use snapshot::Snapshot;
