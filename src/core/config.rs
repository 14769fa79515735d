//! Run-time options for the scheduler.
//!
//! `SimConfig` is plain data with serde support so that callers can keep it next to
//! a [`Snapshot`](crate::core::Snapshot) in whatever format they like:
//!
//! ```json
//! { "scheduler": "queued", "time_tolerance": 1e-12, "sample_interval": 0.5 }
//! ```
//!
//! Missing fields take their defaults.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// How the next event is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    /// Recompute every wall and pair time after each event.
    #[default]
    Naive,
    /// Keep predictions in a min-heap and only recompute those of the particles that
    /// just collided.
    Queued,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub scheduler: SchedulerKind,
    /// Event times in `[-time_tolerance, 0)` are contact round-off and run as zero;
    /// anything more negative is a numerical inconsistency.
    pub time_tolerance: f64,
    /// Largest relative change of pair energy a collision may cause.
    pub energy_tolerance: f64,
    /// Spacing of the sample ticks used by `run_sampled`.
    pub sample_interval: f64,
    /// Verify overlap and bounds invariants after every event (O(N²) per event).
    pub check_invariants: bool,
    /// Slack allowed by the invariant check, in units of length.
    pub overlap_tolerance: f64,
    /// An event-budget run gives up, reporting `exhausted`, after this many rechecks
    /// in a row without a collision.
    pub max_idle_rechecks: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerKind::Naive,
            time_tolerance: 1e-12,
            energy_tolerance: 1e-10,
            sample_interval: 1.0,
            check_invariants: false,
            overlap_tolerance: 1e-9,
            max_idle_rechecks: 100_000,
        }
    }
}

impl SimConfig {
    pub fn with_scheduler(mut self, scheduler: SchedulerKind) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("time_tolerance", self.time_tolerance, true),
            ("energy_tolerance", self.energy_tolerance, false),
            ("sample_interval", self.sample_interval, false),
            ("overlap_tolerance", self.overlap_tolerance, true),
        ];
        for (name, value, zero_ok) in positive {
            let ok = value.is_finite() && (value > 0.0 || (zero_ok && value == 0.0));
            if !ok {
                return Err(Error::InvalidParam(format!(
                    "{name} must be finite and {}, got {value}",
                    if zero_ok { ">= 0" } else { "> 0" }
                )));
            }
        }
        if self.max_idle_rechecks == 0 {
            return Err(Error::InvalidParam(
                "max_idle_rechecks must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// When a run stops.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Budget {
    /// Stop after this many collisions (wall or pair).
    Events(u64),
    /// Stop at this absolute simulation time.
    Time(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() -> Result<()> {
        let cfg = SimConfig::default();
        cfg.validate()?;
        assert_eq!(cfg.scheduler, SchedulerKind::Naive);
        assert_eq!(cfg.sample_interval, 1.0);
        Ok(())
    }

    #[test]
    fn bad_interval_rejected() {
        let cfg = SimConfig {
            sample_interval: 0.0,
            ..SimConfig::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = SimConfig {
            time_tolerance: f64::NAN,
            ..SimConfig::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = SimConfig {
            max_idle_rechecks: 0,
            ..SimConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() -> Result<()> {
        let cfg: SimConfig =
            serde_json::from_str(r#"{ "scheduler": "queued", "sample_interval": 0.5 }"#)
                .map_err(|e| Error::InvalidParam(e.to_string()))?;
        assert_eq!(cfg.scheduler, SchedulerKind::Queued);
        assert_eq!(cfg.sample_interval, 0.5);
        assert_eq!(cfg.energy_tolerance, 1e-10);
        Ok(())
    }
}
