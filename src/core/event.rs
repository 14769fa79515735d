use crate::error::{Error, Result};
use ordered_float::NotNan;
use std::cmp::Ordering;

/// Kinds of events the scheduler can pick.
///
/// Tie-breaking for deterministic ordering prefers `Pair` < `Recheck` < `Wall` when
/// times are equal, then lower particle indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Collision between particles `i < j`.
    Pair { i: u32, j: u32 },
    /// Torus only: the pair prediction for `i < j` ran out of trusted images and has to
    /// be redone. No velocity changes.
    Recheck { i: u32, j: u32 },
    /// Particle `i` hits a wall perpendicular to `axis`.
    Wall { i: u32, axis: u32 },
}

impl EventKind {
    #[inline]
    pub(crate) fn order_key(&self) -> (u8, u32, u32) {
        match *self {
            EventKind::Pair { i, j } => (0, i, j),
            EventKind::Recheck { i, j } => (1, i, j),
            EventKind::Wall { i, axis } => (2, i, axis),
        }
    }

    /// Whether the event changes velocities.
    #[inline]
    pub fn is_collision(&self) -> bool {
        !matches!(self, EventKind::Recheck { .. })
    }

    /// Particles whose velocities the event changes.
    pub fn affected(&self) -> Vec<usize> {
        match *self {
            EventKind::Pair { i, j } => vec![i as usize, j as usize],
            EventKind::Wall { i, .. } => vec![i as usize],
            EventKind::Recheck { .. } => Vec::new(),
        }
    }
}

/// Compare two candidates that are `(time, kind)` pairs with non-NaN times.
#[inline]
pub(crate) fn cmp_candidates(a: (f64, EventKind), b: (f64, EventKind)) -> Ordering {
    a.0.total_cmp(&b.0)
        .then_with(|| a.1.order_key().cmp(&b.1.order_key()))
}

/// What a single scheduler step did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub kind: EventKind,
    /// Absolute simulation time of the event.
    pub time: f64,
}

impl Outcome {
    pub fn affected(&self) -> Vec<usize> {
        self.kind.affected()
    }
}

/// Queue entry of the heap scheduler.
///
/// `time` is absolute. The stamps record the collision counters of the participants
/// when the prediction was made; a later collision of either one makes the entry stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub time: NotNan<f64>,
    pub kind: EventKind,
    pub stamp_i: u64,
    /// `None` for wall events.
    pub stamp_j: Option<u64>,
}

impl Event {
    pub fn new(time: f64, kind: EventKind, stamp_i: u64, stamp_j: Option<u64>) -> Result<Self> {
        if time.is_infinite() {
            return Err(Error::NumericalInconsistency(format!(
                "cannot queue {kind:?} at infinite time"
            )));
        }
        let time = NotNan::new(time).map_err(|_| {
            Error::NumericalInconsistency(format!("cannot queue {kind:?} at NaN time"))
        })?;
        Ok(Self {
            time,
            kind,
            stamp_i,
            stamp_j,
        })
    }

    #[inline]
    pub fn at(&self) -> f64 {
        self.time.into_inner()
    }

    /// Whether neither participant has collided since the prediction.
    #[inline]
    pub fn is_current(&self, count_i: u64, count_j: Option<u64>) -> bool {
        self.stamp_i == count_i
            && match self.stamp_j {
                Some(stamp) => count_j == Some(stamp),
                None => true,
            }
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.kind.order_key().cmp(&other.kind.order_key()))
            .then_with(|| self.stamp_i.cmp(&other.stamp_i))
            .then_with(|| self.stamp_j.cmp(&other.stamp_j))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EventKind::{Pair, Recheck, Wall};

    #[test]
    fn queue_entries_need_a_finite_time() {
        let err = Event::new(f64::NAN, Pair { i: 1, j: 2 }, 0, Some(0)).unwrap_err();
        assert!(matches!(err, Error::NumericalInconsistency(_)));
        assert!(Event::new(f64::INFINITY, Wall { i: 0, axis: 0 }, 0, None).is_err());
    }

    #[test]
    fn earlier_entries_sort_first() -> Result<()> {
        let soon = Event::new(0.5, Wall { i: 9, axis: 2 }, 0, None)?;
        let later = Event::new(1.5, Pair { i: 0, j: 1 }, 0, Some(0))?;
        assert!(soon < later);
        assert_eq!(soon.at(), 0.5);
        Ok(())
    }

    #[test]
    fn equal_times_prefer_pair_then_recheck_then_wall() -> Result<()> {
        let t = 5.0;
        let pair = Event::new(t, Pair { i: 3, j: 4 }, 3, Some(4))?;
        let recheck = Event::new(t, Recheck { i: 0, j: 1 }, 3, Some(4))?;
        let wall = Event::new(t, Wall { i: 0, axis: 1 }, 3, None)?;
        assert!(pair < recheck && recheck < wall);
        assert_eq!(
            cmp_candidates((t, Wall { i: 0, axis: 0 }), (t, Pair { i: 2, j: 3 })),
            Ordering::Greater
        );
        assert_eq!(
            cmp_candidates((t, Pair { i: 0, j: 5 }), (t, Pair { i: 1, j: 2 })),
            Ordering::Less
        );
        Ok(())
    }

    #[test]
    fn stale_after_either_participant_collides() -> Result<()> {
        let pair = Event::new(1.0, Pair { i: 1, j: 2 }, 4, Some(6))?;
        assert!(pair.is_current(4, Some(6)));
        assert!(!pair.is_current(5, Some(6)));
        assert!(!pair.is_current(4, Some(7)));

        let wall = Event::new(1.0, Wall { i: 3, axis: 0 }, 2, None)?;
        assert!(wall.is_current(2, None));
        assert!(!wall.is_current(3, None));
        Ok(())
    }

    #[test]
    fn affected_lists_participants() {
        assert_eq!(Pair { i: 2, j: 5 }.affected(), vec![2, 5]);
        assert_eq!(Wall { i: 4, axis: 1 }.affected(), vec![4]);
        assert!(Recheck { i: 0, j: 1 }.affected().is_empty());
        assert!(!Recheck { i: 0, j: 1 }.is_collision());
    }
}
