use crate::core::config::{Budget, SchedulerKind, SimConfig};
use crate::core::event::{cmp_candidates, Event, EventKind, Outcome};
use crate::core::geometry::{Boundary, Domain, Geometry};
use crate::core::init::{random_velocities, tabula_rasa};
use crate::core::particle::Particle;
use crate::core::predict::{predict_pair, predict_wall, wall_time, PairPrediction};
use crate::core::resolve::{pair_collide, wall_bounce};
use crate::core::snapshot::Snapshot;
use crate::error::{Error, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Candidate next event: time until it happens, and what it is.
type Candidate = (f64, EventKind);

/// Construction accepts this much relative round-off, so that states the engine
/// wrote itself (bodies exactly at contact) can be loaded again.
const ROUNDOFF: f64 = 4.0 * f64::EPSILON;

/// Read-only hook called at every sample tick.
type SampleHook<'a, 'h, const D: usize> =
    Option<&'a mut (dyn FnMut(f64, &[Particle<D>]) + 'h)>;

/// Number of events of each kind processed so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionCounts {
    pub wall: u64,
    pub pair: u64,
    pub recheck: u64,
}

impl CollisionCounts {
    /// Wall plus pair collisions.
    pub fn collisions(&self) -> u64 {
        self.wall + self.pair
    }

    fn since(&self, earlier: &CollisionCounts) -> CollisionCounts {
        CollisionCounts {
            wall: self.wall - earlier.wall,
            pair: self.pair - earlier.pair,
            recheck: self.recheck - earlier.recheck,
        }
    }
}

/// Result of [`Simulation::run`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    /// Events processed during this run only.
    pub counts: CollisionCounts,
    pub start_time: f64,
    pub end_time: f64,
    /// The run stopped because no further event can ever happen.
    pub exhausted: bool,
}

/// Event-driven hard-body simulation.
///
/// Owns the particle state and the clock. Between events every particle moves in a
/// straight line; at each event all particles are advanced together to the event
/// time and the event is resolved.
#[derive(Debug)]
pub struct Simulation<const D: usize> {
    time_now: f64,
    geometry: Geometry<D>,
    particles: Vec<Particle<D>>,
    config: SimConfig,
    counts: CollisionCounts,
    seed: Option<u64>,
    /// Index of the next sample tick, always the first one strictly after `time_now`.
    next_sample: u64,
    pq: BinaryHeap<Reverse<Event>>,
}

impl<const D: usize> Simulation<D> {
    /// Start from explicit particles. Ids must equal their index, and the state must
    /// satisfy the geometry's bounds and the no-overlap condition.
    pub fn new(
        geometry: Geometry<D>,
        particles: Vec<Particle<D>>,
        config: SimConfig,
    ) -> Result<Self> {
        Self::assemble(geometry, particles, config, 0.0, None)
    }

    /// Tabula-rasa construction from `StdRng::seed_from_u64(seed)`. The seed is kept
    /// and written to snapshots.
    pub fn random(
        geometry: Geometry<D>,
        num_particles: usize,
        velocity_scale: f64,
        max_attempts: usize,
        seed: u64,
        config: SimConfig,
    ) -> Result<Self> {
        let mut seeded = StdRng::seed_from_u64(seed);
        let mut sim = Self::random_with(
            geometry,
            num_particles,
            velocity_scale,
            max_attempts,
            &mut seeded,
            config,
        )?;
        sim.seed = Some(seed);
        Ok(sim)
    }

    /// Tabula-rasa construction drawing from the caller's generator.
    pub fn random_with<R: Rng>(
        geometry: Geometry<D>,
        num_particles: usize,
        velocity_scale: f64,
        max_attempts: usize,
        rng: &mut R,
        config: SimConfig,
    ) -> Result<Self> {
        let placed = tabula_rasa(num_particles, &geometry, velocity_scale, max_attempts, rng)?;
        Self::assemble(geometry, placed.into_particles()?, config, 0.0, None)
    }

    /// Lattice positions from [`Geometry::create_configuration`], random velocities.
    pub fn lattice<R: Rng>(
        geometry: Geometry<D>,
        num_particles: usize,
        velocity_scale: f64,
        rng: &mut R,
        config: SimConfig,
    ) -> Result<Self> {
        let positions = geometry.create_configuration(num_particles)?;
        let velocities = random_velocities::<D, R>(num_particles, velocity_scale, rng)?;
        let particles = positions
            .into_iter()
            .zip(velocities)
            .enumerate()
            .map(|(id, (r, v))| Particle::new(id as u32, r, v))
            .collect::<Result<Vec<_>>>()?;
        Self::assemble(geometry, particles, config, 0.0, None)
    }

    /// Resume from a saved record.
    pub fn from_snapshot(snapshot: &Snapshot, config: SimConfig) -> Result<Self> {
        if !snapshot.time.is_finite() {
            return Err(Error::InvalidParam("snapshot time must be finite".into()));
        }
        let geometry = snapshot.geometry::<D>()?;
        let particles = snapshot.particles::<D>()?;
        Self::assemble(geometry, particles, config, snapshot.time, snapshot.seed)
    }

    fn assemble(
        geometry: Geometry<D>,
        mut particles: Vec<Particle<D>>,
        config: SimConfig,
        time: f64,
        seed: Option<u64>,
    ) -> Result<Self> {
        config.validate()?;
        if particles.is_empty() {
            return Err(Error::InvalidParam("need at least one particle".into()));
        }
        if particles.len() > u32::MAX as usize {
            return Err(Error::InvalidParam("too many particles".into()));
        }
        for (idx, p) in particles.iter_mut().enumerate() {
            if p.id as usize != idx {
                return Err(Error::InvalidParam(format!(
                    "particle at index {idx} has id {}",
                    p.id
                )));
            }
            p.r = geometry.move_to(p.r);
        }

        let mut sim = Self {
            time_now: time,
            geometry,
            particles,
            config,
            counts: CollisionCounts::default(),
            seed,
            next_sample: 0,
            pq: BinaryHeap::new(),
        };
        let scale = sim.geometry.lengths().iter().fold(0.0_f64, |m, &l| m.max(l));
        if let Some(msg) = sim.violation(ROUNDOFF * scale) {
            return Err(Error::InvalidParam(msg));
        }
        sim.reset_sample_clock();
        if sim.config.scheduler == SchedulerKind::Queued {
            sim.schedule_all()?;
        }
        log::info!(
            "simulation of {} bodies in a {}-d {:?}, density {:.4}, {:?} scheduler",
            sim.particles.len(),
            D,
            sim.geometry.boundary(),
            sim.geometry.get_density(sim.particles.len()),
            sim.config.scheduler
        );
        Ok(sim)
    }

    /// Returns current simulation time.
    pub fn time(&self) -> f64 {
        self.time_now
    }

    /// Number of particles.
    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    /// Particles in id order.
    pub fn particles(&self) -> &[Particle<D>] {
        &self.particles
    }

    /// Domain the particles live in.
    pub fn geometry(&self) -> &Geometry<D> {
        &self.geometry
    }

    /// Scheduler and tolerance settings.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Totals since construction.
    pub fn counts(&self) -> CollisionCounts {
        self.counts
    }

    /// Seed of the initial configuration, when it was drawn by [`Simulation::random`]
    /// or restored from a snapshot that carried one.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Positions as a Vec of fixed-size arrays.
    pub fn positions(&self) -> Vec<[f64; D]> {
        self.particles.iter().map(|p| p.r).collect()
    }

    /// Velocities as a Vec of fixed-size arrays.
    pub fn velocities(&self) -> Vec<[f64; D]> {
        self.particles.iter().map(|p| p.v).collect()
    }

    /// Total kinetic energy `Σ |v|² / 2`.
    pub fn kinetic_energy(&self) -> f64 {
        self.particles.iter().map(|p| p.kinetic_energy()).sum()
    }

    /// Copy the current state into a serializable record.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            boundary: self.geometry.boundary(),
            lengths: self.geometry.lengths().to_vec(),
            sigma: self.geometry.sigma(),
            positions: self.particles.iter().map(|p| p.r.to_vec()).collect(),
            velocities: self.particles.iter().map(|p| p.v.to_vec()).collect(),
            time: self.time_now,
            seed: self.seed,
        }
    }

    /// Find and resolve the next event. `None` when nothing can ever happen again
    /// (every body at rest, or all moving together on a torus).
    pub fn advance_one_event(&mut self) -> Result<Option<Outcome>> {
        match self.next_event()? {
            Some((t_ev, kind)) => self.execute(t_ev, kind, None).map(Some),
            None => Ok(None),
        }
    }

    /// Process events until `budget` is spent or no event is left.
    pub fn run(&mut self, budget: Budget) -> Result<RunSummary> {
        self.run_inner(budget, None)
    }

    /// Like [`run`](Self::run), calling `on_sample(tick, particles)` at every multiple
    /// of the configured sample interval. Ticks that fall inside a free flight are
    /// reported, in increasing order, before the event that ends the flight.
    pub fn run_sampled<F>(&mut self, budget: Budget, mut on_sample: F) -> Result<RunSummary>
    where
        F: FnMut(f64, &[Particle<D>]),
    {
        let hook: &mut dyn FnMut(f64, &[Particle<D>]) = &mut on_sample;
        self.run_inner(budget, Some(hook))
    }

    /// Advance the simulation to `target_time` (must be ≥ current time).
    pub fn advance_to(&mut self, target_time: f64) -> Result<RunSummary> {
        self.run(Budget::Time(target_time))
    }

    /// Rebuild the event queue from the current particle states.
    pub fn rebuild_event_queue(&mut self) -> Result<()> {
        if self.config.scheduler == SchedulerKind::Queued {
            self.schedule_all()?;
        }
        Ok(())
    }

    /// Replace every velocity. Pending predictions are discarded.
    pub fn set_velocities(&mut self, velocities: Vec<[f64; D]>) -> Result<()> {
        if velocities.len() != self.particles.len() {
            return Err(Error::InvalidParam(format!(
                "expected {} velocities, got {}",
                self.particles.len(),
                velocities.len()
            )));
        }
        if velocities.iter().flatten().any(|c| !c.is_finite()) {
            return Err(Error::InvalidParam("velocity values must be finite".into()));
        }
        for (p, v) in self.particles.iter_mut().zip(velocities) {
            p.v = v;
        }
        self.rebuild_event_queue()
    }

    /// Check overlap and bounds invariants now.
    pub fn check_invariants(&self) -> Result<()> {
        match self.invariant_violation() {
            Some(msg) => Err(Error::NumericalInconsistency(msg)),
            None => Ok(()),
        }
    }

    // ============ Internal helpers ============

    fn run_inner(
        &mut self,
        budget: Budget,
        mut on_sample: SampleHook<'_, '_, D>,
    ) -> Result<RunSummary> {
        let start_counts = self.counts;
        let start_time = self.time_now;
        let mut exhausted = false;

        match budget {
            Budget::Events(n) => {
                let mut idle = 0u64;
                while self.counts.since(&start_counts).collisions() < n {
                    let Some((t_ev, kind)) = self.next_event()? else {
                        exhausted = true;
                        break;
                    };
                    self.execute(t_ev, kind, on_sample.as_deref_mut())?;
                    if kind.is_collision() {
                        idle = 0;
                        continue;
                    }
                    idle += 1;
                    if idle >= self.config.max_idle_rechecks {
                        log::warn!(
                            "{idle} rechecks without a collision by t={:.6}, stopping",
                            self.time_now
                        );
                        exhausted = true;
                        break;
                    }
                }
            }
            Budget::Time(target) => {
                if !target.is_finite() {
                    return Err(Error::InvalidParam("target time must be finite".into()));
                }
                if target < self.time_now - self.config.time_tolerance {
                    return Err(Error::InvalidParam(
                        "target time cannot be earlier than current time".into(),
                    ));
                }
                loop {
                    match self.next_event()? {
                        Some((t_ev, kind)) if t_ev <= target => {
                            self.execute(t_ev, kind, on_sample.as_deref_mut())?;
                        }
                        next => {
                            exhausted = next.is_none();
                            if target > self.time_now {
                                self.emit_samples(target, on_sample.as_deref_mut());
                                self.drift_all(target - self.time_now);
                                self.time_now = target;
                            }
                            break;
                        }
                    }
                }
            }
        }

        let summary = RunSummary {
            counts: self.counts.since(&start_counts),
            start_time,
            end_time: self.time_now,
            exhausted,
        };
        log::debug!(
            "run to t={:.6}: {} wall, {} pair collisions, {} rechecks",
            summary.end_time,
            summary.counts.wall,
            summary.counts.pair,
            summary.counts.recheck
        );
        Ok(summary)
    }

    /// Absolute time and kind of the next event.
    fn next_event(&mut self) -> Result<Option<Candidate>> {
        match self.config.scheduler {
            SchedulerKind::Naive => Ok(self
                .scan_naive()?
                .map(|(dt, kind)| (self.time_now + dt, kind))),
            SchedulerKind::Queued => {
                while let Some(Reverse(ev)) = self.pq.peek().copied() {
                    if self.is_current(&ev) {
                        let t_ev = ev.at();
                        if t_ev < self.time_now - self.config.time_tolerance {
                            return Err(Error::NumericalInconsistency(format!(
                                "queued {:?} at t={t_ev} is behind the clock t={}",
                                ev.kind, self.time_now
                            )));
                        }
                        return Ok(Some((t_ev.max(self.time_now), ev.kind)));
                    }
                    self.pq.pop();
                }
                Ok(None)
            }
        }
    }

    fn execute(
        &mut self,
        t_ev: f64,
        kind: EventKind,
        on_sample: SampleHook<'_, '_, D>,
    ) -> Result<Outcome> {
        if self.config.scheduler == SchedulerKind::Queued {
            // the event being executed is the one `next_event` just peeked
            self.pq.pop();
        }
        self.emit_samples(t_ev, on_sample);
        self.drift_all(t_ev - self.time_now);
        self.time_now = t_ev;

        match kind {
            EventKind::Wall { i, axis } => {
                let (ii, axis) = (i as usize, axis as usize);
                self.resolve_wall(ii, axis);
                self.counts.wall += 1;
                if self.config.scheduler == SchedulerKind::Queued {
                    self.reschedule_for_particle(ii, None)?;
                }
            }
            EventKind::Pair { i, j } => {
                let (ii, jj) = (i as usize, j as usize);
                self.resolve_pair(ii, jj)?;
                self.counts.pair += 1;
                if self.config.scheduler == SchedulerKind::Queued {
                    self.reschedule_for_particle(ii, None)?;
                    self.reschedule_for_particle(jj, Some(ii))?;
                }
            }
            EventKind::Recheck { i, j } => {
                self.counts.recheck += 1;
                if self.config.scheduler == SchedulerKind::Queued {
                    self.push_pair(i as usize, j as usize)?;
                }
            }
        }

        if self.config.check_invariants {
            self.check_invariants()?;
        }
        log::trace!("t={t_ev:.12} {kind:?}");
        Ok(Outcome { kind, time: t_ev })
    }

    fn resolve_wall(&mut self, i: usize, axis: usize) {
        let sigma = self.geometry.sigma();
        let l = self.geometry.lengths()[axis];
        let p = &mut self.particles[i];
        // snap onto the contact plane of the wall that was hit
        p.r[axis] = if p.v[axis] > 0.0 { l - sigma } else { sigma };
        wall_bounce(&mut p.v, axis);
        p.bump_collision_count();
    }

    fn resolve_pair(&mut self, i: usize, j: usize) -> Result<()> {
        let dx = self.geometry.separation(&self.particles[i].r, &self.particles[j].r);
        let (lo, hi) = self.particles.split_at_mut(j);
        let (pi, pj) = (&mut lo[i], &mut hi[0]);
        pair_collide(&dx, &mut pi.v, &mut pj.v, self.config.energy_tolerance)?;
        pi.bump_collision_count();
        pj.bump_collision_count();
        Ok(())
    }

    /// Drift every particle by `dt` and map it back into the domain.
    fn drift_all(&mut self, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        for p in &mut self.particles {
            p.drift(dt);
            p.r = self.geometry.move_to(p.r);
        }
    }

    /// Report every sample tick up to and including `t_new`.
    fn emit_samples(&mut self, t_new: f64, on_sample: SampleHook<'_, '_, D>) {
        let interval = self.config.sample_interval;
        match on_sample {
            Some(hook) => {
                while self.next_sample as f64 * interval <= t_new {
                    let tick = self.next_sample as f64 * interval;
                    self.drift_all(tick - self.time_now);
                    self.time_now = tick;
                    hook(tick, &self.particles[..]);
                    self.next_sample += 1;
                }
            }
            None => {
                let mut k = ((t_new / interval).floor().max(0.0) as u64)
                    .saturating_add(1)
                    .max(self.next_sample);
                // the division may round up onto a tick that is not reached yet
                while k > self.next_sample && (k - 1) as f64 * interval > t_new {
                    k -= 1;
                }
                while k as f64 * interval <= t_new {
                    k += 1;
                }
                self.next_sample = k;
            }
        }
    }

    fn reset_sample_clock(&mut self) {
        let interval = self.config.sample_interval;
        let mut k = (self.time_now / interval).floor().max(0.0) as u64;
        while k as f64 * interval <= self.time_now {
            k += 1;
        }
        self.next_sample = k;
    }

    fn invariant_violation(&self) -> Option<String> {
        self.violation(self.config.overlap_tolerance)
    }

    /// First body outside the box or pair closer than `2 sigma`, allowing `tol` of
    /// either.
    fn violation(&self, tol: f64) -> Option<String> {
        let sigma = self.geometry.sigma();
        if self.geometry.boundary() == Boundary::Box {
            for p in &self.particles {
                for (k, (&x, &l)) in p.r.iter().zip(self.geometry.lengths()).enumerate() {
                    if x < sigma - tol || x > l - sigma + tol {
                        return Some(format!(
                            "particle {} at coordinate {x} on axis {k} is outside [{sigma}, {}]",
                            p.id,
                            l - sigma
                        ));
                    }
                }
            }
        }
        let min_sep = 2.0 * sigma - tol;
        for (idx, a) in self.particles.iter().enumerate() {
            for b in &self.particles[idx + 1..] {
                let dist = self.geometry.distance(&a.r, &b.r);
                if dist < min_sep {
                    return Some(format!(
                        "particles {} and {} overlap: distance {dist} < {}",
                        a.id,
                        b.id,
                        2.0 * sigma
                    ));
                }
            }
        }
        None
    }

    // ============ Naive scheduler ============

    /// Smallest time-to-event over every wall and every pair.
    fn scan_naive(&self) -> Result<Option<Candidate>> {
        let tol = self.config.time_tolerance;
        let mut best = None;
        if self.geometry.has_walls() {
            let sigma = self.geometry.sigma();
            for p in &self.particles {
                for (axis, ((&x, &v), &l)) in
                    p.r.iter().zip(&p.v).zip(self.geometry.lengths()).enumerate()
                {
                    let kind = EventKind::Wall {
                        i: p.id,
                        axis: axis as u32,
                    };
                    best = pick(best, admit(wall_time(x, v, sigma, l), kind, tol)?);
                }
            }
        }
        Ok(pick(best, self.scan_pairs()?))
    }

    #[cfg(not(feature = "parallel"))]
    fn scan_pairs(&self) -> Result<Option<Candidate>> {
        scan_pairs_sequential(&self.geometry, &self.particles, self.config.time_tolerance)
    }

    #[cfg(feature = "parallel")]
    fn scan_pairs(&self) -> Result<Option<Candidate>> {
        scan_pairs_parallel(&self.geometry, &self.particles, self.config.time_tolerance)
    }

    // ============ Queued scheduler ============

    fn is_current(&self, ev: &Event) -> bool {
        match ev.kind {
            EventKind::Pair { i, j } | EventKind::Recheck { i, j } => ev.is_current(
                self.particles[i as usize].collision_count,
                Some(self.particles[j as usize].collision_count),
            ),
            EventKind::Wall { i, .. } => {
                ev.is_current(self.particles[i as usize].collision_count, None)
            }
        }
    }

    fn schedule_all(&mut self) -> Result<()> {
        self.pq.clear();
        let n = self.particles.len();
        for i in 0..n {
            self.push_wall(i)?;
        }
        for i in 0..n {
            for j in (i + 1)..n {
                self.push_pair(i, j)?;
            }
        }
        Ok(())
    }

    fn reschedule_for_particle(&mut self, i: usize, skip: Option<usize>) -> Result<()> {
        self.push_wall(i)?;
        for j in 0..self.particles.len() {
            if j == i || Some(j) == skip {
                continue;
            }
            let (a, b) = if i < j { (i, j) } else { (j, i) };
            self.push_pair(a, b)?;
        }
        Ok(())
    }

    fn push_wall(&mut self, i: usize) -> Result<()> {
        let p = &self.particles[i];
        let Some((t, axis)) = predict_wall(&self.geometry, &p.r, &p.v) else {
            return Ok(());
        };
        let kind = EventKind::Wall {
            i: p.id,
            axis: axis as u32,
        };
        if let Some((t, kind)) = admit(t, kind, self.config.time_tolerance)? {
            let ev = Event::new(self.time_now + t, kind, p.collision_count, None)?;
            self.pq.push(Reverse(ev));
        }
        Ok(())
    }

    fn push_pair(&mut self, a: usize, b: usize) -> Result<()> {
        let (pa, pb) = (&self.particles[a], &self.particles[b]);
        let Some(candidate) = pair_candidate(&self.geometry, pa, pb) else {
            return Ok(());
        };
        if let Some((t, kind)) = admit(candidate.0, candidate.1, self.config.time_tolerance)? {
            let ev = Event::new(
                self.time_now + t,
                kind,
                pa.collision_count,
                Some(pb.collision_count),
            )?;
            self.pq.push(Reverse(ev));
        }
        Ok(())
    }
}

// ============ Candidate helpers ============

/// Earlier of two candidates under the deterministic event order.
#[inline]
fn pick(a: Option<Candidate>, b: Option<Candidate>) -> Option<Candidate> {
    match (a, b) {
        (Some(x), Some(y)) => {
            if cmp_candidates(x, y) == Ordering::Greater {
                Some(y)
            } else {
                Some(x)
            }
        }
        (x, None) => x,
        (None, y) => y,
    }
}

/// Screen a predicted time: infinite means no event, NaN or clearly negative is fatal,
/// and round-off just below zero runs as zero.
#[inline]
fn admit(t: f64, kind: EventKind, tolerance: f64) -> Result<Option<Candidate>> {
    if t.is_nan() {
        return Err(Error::NumericalInconsistency(format!(
            "{kind:?} predicted a NaN time"
        )));
    }
    if t == f64::INFINITY {
        return Ok(None);
    }
    if t < -tolerance {
        return Err(Error::NumericalInconsistency(format!(
            "{kind:?} predicted negative time {t}"
        )));
    }
    Ok(Some((t.max(0.0), kind)))
}

fn pair_candidate<const D: usize>(
    geometry: &Geometry<D>,
    a: &Particle<D>,
    b: &Particle<D>,
) -> Option<Candidate> {
    let (i, j) = (a.id, b.id);
    match predict_pair(geometry, &a.r, &b.r, &a.v, &b.v) {
        PairPrediction::Contact(t) => Some((t, EventKind::Pair { i, j })),
        PairPrediction::Recheck(t) => Some((t, EventKind::Recheck { i, j })),
        PairPrediction::Never => None,
    }
}

/// Earliest pair event among `(i, j)` with `j > i`.
fn best_pair_for<const D: usize>(
    geometry: &Geometry<D>,
    particles: &[Particle<D>],
    i: usize,
    tolerance: f64,
) -> Result<Option<Candidate>> {
    let a = &particles[i];
    let mut best = None;
    for b in &particles[i + 1..] {
        if let Some((t, kind)) = pair_candidate(geometry, a, b) {
            best = pick(best, admit(t, kind, tolerance)?);
        }
    }
    Ok(best)
}

#[cfg_attr(feature = "parallel", allow(dead_code))]
pub(crate) fn scan_pairs_sequential<const D: usize>(
    geometry: &Geometry<D>,
    particles: &[Particle<D>],
    tolerance: f64,
) -> Result<Option<Candidate>> {
    let mut best = None;
    for i in 0..particles.len() {
        best = pick(best, best_pair_for(geometry, particles, i, tolerance)?);
    }
    Ok(best)
}

/// Rows of the pair triangle go to rayon workers; the per-row minima are combined
/// with the same total order as the sequential scan, so the result is identical.
#[cfg(feature = "parallel")]
pub(crate) fn scan_pairs_parallel<const D: usize>(
    geometry: &Geometry<D>,
    particles: &[Particle<D>],
    tolerance: f64,
) -> Result<Option<Candidate>> {
    use rayon::prelude::*;
    (0..particles.len())
        .into_par_iter()
        .map(|i| best_pair_for(geometry, particles, i, tolerance))
        .try_reduce(|| None, |a, b| Ok(pick(a, b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_disks(boundary: Boundary, scheduler: SchedulerKind) -> Result<Simulation<2>> {
        let g = Geometry::new(boundary, [1.0, 1.0], 0.1)?;
        let particles = vec![
            Particle::new(0, [0.2, 0.5], [1.0, 0.0])?,
            Particle::new(1, [0.8, 0.5], [-1.0, 0.0])?,
        ];
        Simulation::new(g, particles, SimConfig::default().with_scheduler(scheduler))
    }

    #[test]
    fn make_small_sim_ok() -> Result<()> {
        let g = Geometry::new_box([10.0, 10.0, 10.0], 0.2)?;
        let mut sim = Simulation::random(g, 4, 1.0, 1000, 1234, SimConfig::default())?;
        assert_eq!(sim.num_particles(), 4);
        assert!(sim.kinetic_energy().is_finite());
        sim.advance_to(0.1)?;
        assert!((sim.time() - 0.1).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn head_on_pair_is_the_first_event() -> Result<()> {
        for scheduler in [SchedulerKind::Naive, SchedulerKind::Queued] {
            let mut sim = two_disks(Boundary::Box, scheduler)?;
            let out = sim.advance_one_event()?.expect("pair collision");
            assert_eq!(out.kind, EventKind::Pair { i: 0, j: 1 });
            // gap 0.6 - 0.2 closed at relative speed 2
            assert_relative_eq!(out.time, 0.2, epsilon = 1e-12);
            assert_eq!(out.affected(), vec![0, 1]);
            assert_relative_eq!(sim.particles()[0].v[0], -1.0, epsilon = 1e-12);
            assert_relative_eq!(sim.particles()[1].v[0], 1.0, epsilon = 1e-12);
        }
        Ok(())
    }

    #[test]
    fn wall_bounce_snaps_to_contact_plane() -> Result<()> {
        let g = Geometry::new_box([1.0, 1.0], 0.1)?;
        let particles = vec![Particle::new(0, [0.5, 0.5], [1.0, 0.0])?];
        let mut sim = Simulation::new(g, particles, SimConfig::default())?;
        let out = sim.advance_one_event()?.expect("wall collision");
        assert_eq!(out.kind, EventKind::Wall { i: 0, axis: 0 });
        assert_relative_eq!(out.time, 0.4, epsilon = 1e-15);
        assert_relative_eq!(sim.particles()[0].r[0], 0.9, epsilon = 1e-15);
        assert_eq!(sim.particles()[0].v[0], -1.0);
        assert_eq!(sim.counts().wall, 1);
        Ok(())
    }

    #[test]
    fn resting_bodies_have_no_events() -> Result<()> {
        let g = Geometry::new_box([1.0, 1.0], 0.1)?;
        let particles = vec![Particle::new(0, [0.5, 0.5], [0.0, 0.0])?];
        let mut sim = Simulation::new(g, particles, SimConfig::default())?;
        assert!(sim.advance_one_event()?.is_none());
        let summary = sim.run(Budget::Events(10))?;
        assert!(summary.exhausted);
        let summary = sim.advance_to(3.0)?;
        assert!(summary.exhausted);
        assert_eq!(sim.time(), 3.0);
        Ok(())
    }

    #[test]
    fn torus_pair_meets_across_the_seam() -> Result<()> {
        let g = Geometry::new_torus([1.0, 1.0], 0.1)?;
        let particles = vec![
            Particle::new(0, [0.1, 0.5], [-0.5, 0.0])?,
            Particle::new(1, [0.6, 0.5], [0.5, 0.0])?,
        ];
        let mut sim = Simulation::new(g, particles, SimConfig::default())?;
        let out = sim.advance_one_event()?.expect("collision");
        assert_eq!(out.kind, EventKind::Pair { i: 0, j: 1 });
        // minimum image separation 0.5, gap 0.3 at closing speed 1
        assert_relative_eq!(out.time, 0.3, epsilon = 1e-12);
        assert!(sim.particles()[0].r[0] >= 0.0 && sim.particles()[0].r[0] < 1.0);
        Ok(())
    }

    #[test]
    fn overlapping_input_rejected() -> Result<()> {
        let g = Geometry::new_box([1.0, 1.0], 0.1)?;
        let particles = vec![
            Particle::new(0, [0.3, 0.5], [0.0, 0.0])?,
            Particle::new(1, [0.4, 0.5], [0.0, 0.0])?,
        ];
        let err = Simulation::new(g, particles, SimConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidParam(_)));
        Ok(())
    }

    #[test]
    fn out_of_box_input_rejected() -> Result<()> {
        let g = Geometry::new_box([1.0, 1.0], 0.1)?;
        let particles = vec![Particle::new(0, [0.05, 0.5], [0.0, 0.0])?];
        assert!(Simulation::new(g, particles, SimConfig::default()).is_err());
        Ok(())
    }

    #[test]
    fn input_just_past_the_wall_rejected() -> Result<()> {
        let g = Geometry::new_box([1.0, 1.0], 0.1)?;
        let particles = vec![Particle::new(0, [0.9 + 5e-10, 0.5], [1.0, 0.0])?];
        let err = Simulation::new(g, particles, SimConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidParam(_)));
        Ok(())
    }

    #[test]
    fn input_just_inside_contact_rejected() -> Result<()> {
        let g = Geometry::new_box([1.0, 1.0], 0.1)?;
        let particles = vec![
            Particle::new(0, [0.3, 0.5], [0.0, 0.0])?,
            Particle::new(1, [0.5 - 5e-10, 0.5], [0.0, 0.0])?,
        ];
        let err = Simulation::new(g, particles, SimConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidParam(_)));
        Ok(())
    }

    #[test]
    fn touching_input_on_the_wall_accepted() -> Result<()> {
        let g = Geometry::new_box([1.0, 1.0], 0.1)?;
        let particles = vec![
            Particle::new(0, [0.1, 0.5], [0.0, 0.0])?,
            Particle::new(1, [0.3, 0.5], [0.0, 0.0])?,
            Particle::new(2, [0.9, 0.9], [0.0, 0.0])?,
        ];
        Simulation::new(g, particles, SimConfig::default())?;
        Ok(())
    }

    #[test]
    fn unsampled_run_jumps_over_skipped_ticks() -> Result<()> {
        let interval = 0.5_f64.powi(20);
        let g = Geometry::new_box([1.0, 1.0], 0.1)?;
        let particles = vec![Particle::new(0, [0.5, 0.5], [0.0, 0.0])?];
        let config = SimConfig {
            sample_interval: interval,
            ..SimConfig::default()
        };
        let mut sim = Simulation::new(g, particles, config)?;
        sim.advance_to(1.0)?;
        assert_eq!(sim.next_sample, (1 << 20) + 1);

        let mut ticks = Vec::new();
        sim.run_sampled(Budget::Time(1.0 + 2.5 * interval), |t, _| ticks.push(t))?;
        assert_eq!(ticks, vec![1.0 + interval, 1.0 + 2.0 * interval]);
        Ok(())
    }

    #[test]
    fn event_budget_gives_up_on_endless_rechecks() -> Result<()> {
        // oblique relative motion that winds around the torus without ever touching
        let g = Geometry::new_torus([10.0, 10.0], 0.1)?;
        let particles = vec![
            Particle::new(0, [1.0, 1.0], [1.0, 0.1])?,
            Particle::new(1, [1.0, 6.5], [-1.0, -0.1])?,
        ];
        for scheduler in [SchedulerKind::Naive, SchedulerKind::Queued] {
            let config = SimConfig {
                max_idle_rechecks: 50,
                ..SimConfig::default().with_scheduler(scheduler)
            };
            let mut sim = Simulation::new(g, particles.clone(), config)?;
            let summary = sim.run(Budget::Events(1))?;
            assert!(summary.exhausted);
            assert_eq!(summary.counts.collisions(), 0);
            assert_eq!(summary.counts.recheck, 50);
        }
        Ok(())
    }

    #[test]
    fn mismatched_ids_rejected() -> Result<()> {
        let g = Geometry::new_box([1.0, 1.0], 0.1)?;
        let particles = vec![Particle::new(3, [0.5, 0.5], [0.0, 0.0])?];
        assert!(Simulation::new(g, particles, SimConfig::default()).is_err());
        Ok(())
    }

    #[test]
    fn time_budget_cannot_go_backwards() -> Result<()> {
        let mut sim = two_disks(Boundary::Box, SchedulerKind::Naive)?;
        sim.advance_to(0.5)?;
        assert!(sim.advance_to(0.25).is_err());
        Ok(())
    }

    #[test]
    fn admit_screens_times() {
        let kind = EventKind::Wall { i: 0, axis: 0 };
        assert!(admit(f64::NAN, kind, 1e-12).is_err());
        assert!(admit(-1e-6, kind, 1e-12).is_err());
        assert_eq!(admit(-1e-15, kind, 1e-12).ok().flatten(), Some((0.0, kind)));
        assert_eq!(admit(f64::INFINITY, kind, 1e-12).ok().flatten(), None);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_scan_matches_sequential() -> Result<()> {
        let g = Geometry::new_torus([1.0, 1.0], 0.02)?;
        let sim = Simulation::random(g, 40, 1.0, 10_000, 5, SimConfig::default())?;
        let seq = scan_pairs_sequential(sim.geometry(), sim.particles(), 1e-12)?;
        let par = scan_pairs_parallel(sim.geometry(), sim.particles(), 1e-12)?;
        assert_eq!(seq, par);
        Ok(())
    }
}
