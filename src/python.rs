//! Python bindings (feature `python`).
//!
//! One class, `HardSim`, covers both 2-d and 3-d systems; the dimension is taken from
//! the number of side lengths passed to the constructor.

use numpy::ndarray::{Array1, Array2, Array3, ArrayView2};
use numpy::{IntoPyArray, PyArray1, PyArray2, PyArray3, PyReadonlyArray2};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::core::{Boundary, Budget, Geometry, SchedulerKind, SimConfig, Simulation};
use crate::error::Error;

fn py_err(e: Error) -> PyErr {
    match e {
        Error::NumericalInconsistency(_) => PyRuntimeError::new_err(e.to_string()),
        _ => PyValueError::new_err(e.to_string()),
    }
}

enum Inner {
    D2(Simulation<2>),
    D3(Simulation<3>),
}

/// Run `$body` with `$sim` bound to the simulation of whichever dimension is active.
macro_rules! with_sim {
    ($inner:expr, $sim:ident => $body:expr) => {
        match $inner {
            Inner::D2($sim) => $body,
            Inner::D3($sim) => $body,
        }
    };
}

fn rows_to_array<const D: usize>(rows: &[[f64; D]]) -> Array2<f64> {
    let mut arr = Array2::<f64>::zeros((rows.len(), D));
    for (i, row) in rows.iter().enumerate() {
        for (k, &x) in row.iter().enumerate() {
            arr[[i, k]] = x;
        }
    }
    arr
}

fn array_to_rows<const D: usize>(arr: ArrayView2<'_, f64>) -> Vec<[f64; D]> {
    arr.outer_iter()
        .map(|row| {
            let mut v = [0.0; D];
            for (vk, &x) in v.iter_mut().zip(row.iter()) {
                *vk = x;
            }
            v
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn build<const D: usize>(
    num_particles: usize,
    lengths: &[f64],
    sigma: f64,
    boundary: Boundary,
    seed: Option<u64>,
    velocity_scale: f64,
    max_attempts: usize,
    lattice: bool,
    config: SimConfig,
) -> crate::Result<Simulation<D>> {
    let lengths: [f64; D] = lengths
        .try_into()
        .map_err(|_| Error::InvalidParam(format!("expected {D} side lengths")))?;
    let geometry = Geometry::new(boundary, lengths, sigma)?;
    let seed = seed.unwrap_or_else(|| {
        let s: u64 = rand::rng().random();
        log::info!("setting seed to {s}");
        s
    });
    if lattice {
        let mut rng = StdRng::seed_from_u64(seed);
        Simulation::lattice(geometry, num_particles, velocity_scale, &mut rng, config)
    } else {
        Simulation::random(
            geometry,
            num_particles,
            velocity_scale,
            max_attempts,
            seed,
            config,
        )
    }
}

fn parse_boundary(name: &str) -> PyResult<Boundary> {
    match name {
        "box" => Ok(Boundary::Box),
        "torus" => Ok(Boundary::Torus),
        other => Err(PyValueError::new_err(format!(
            "boundary must be 'box' or 'torus', got '{other}'"
        ))),
    }
}

fn parse_scheduler(name: &str) -> PyResult<SchedulerKind> {
    match name {
        "naive" => Ok(SchedulerKind::Naive),
        "queued" => Ok(SchedulerKind::Queued),
        other => Err(PyValueError::new_err(format!(
            "scheduler must be 'naive' or 'queued', got '{other}'"
        ))),
    }
}

/// Event-driven hard disk / hard sphere simulation.
///
/// API:
/// - __new__(num_particles, lengths, sigma, boundary="box", seed=None, ...)
/// - run_events(n), advance_to(time), sample_positions(time)
/// - get_positions(), get_velocities(), set_velocities(v)
/// - kinetic_energy(), density(), counts()
#[pyclass]
pub struct HardSim {
    inner: Inner,
}

#[pymethods]
impl HardSim {
    /// Build a random (tabula rasa) or lattice configuration.
    ///
    /// `len(lengths)` selects the dimension and must be 2 or 3. Raises ValueError on
    /// invalid parameters or when no configuration could be placed.
    #[new]
    #[pyo3(signature = (
        num_particles,
        lengths,
        sigma,
        boundary="box",
        seed=None,
        velocity_scale=1.0,
        max_attempts=10_000,
        lattice=false,
        scheduler="naive",
        sample_interval=1.0,
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        num_particles: usize,
        lengths: Vec<f64>,
        sigma: f64,
        boundary: &str,
        seed: Option<u64>,
        velocity_scale: f64,
        max_attempts: usize,
        lattice: bool,
        scheduler: &str,
        sample_interval: f64,
    ) -> PyResult<Self> {
        let boundary = parse_boundary(boundary)?;
        let config = SimConfig {
            scheduler: parse_scheduler(scheduler)?,
            sample_interval,
            ..SimConfig::default()
        };
        let inner = match lengths.len() {
            2 => Inner::D2(
                build::<2>(
                    num_particles,
                    &lengths,
                    sigma,
                    boundary,
                    seed,
                    velocity_scale,
                    max_attempts,
                    lattice,
                    config,
                )
                .map_err(py_err)?,
            ),
            3 => Inner::D3(
                build::<3>(
                    num_particles,
                    &lengths,
                    sigma,
                    boundary,
                    seed,
                    velocity_scale,
                    max_attempts,
                    lattice,
                    config,
                )
                .map_err(py_err)?,
            ),
            d => {
                return Err(PyValueError::new_err(format!(
                    "only 2 or 3 dimensions are supported, got {d}"
                )))
            }
        };
        Ok(Self { inner })
    }

    /// Spatial dimension.
    #[getter]
    fn dim(&self) -> usize {
        match self.inner {
            Inner::D2(_) => 2,
            Inner::D3(_) => 3,
        }
    }

    /// Current simulation time.
    #[getter]
    fn time(&self) -> f64 {
        with_sim!(&self.inner, sim => sim.time())
    }

    /// Seed the initial configuration was drawn from, if known.
    #[getter]
    fn seed(&self) -> Option<u64> {
        with_sim!(&self.inner, sim => sim.seed())
    }

    /// Process `n` wall or pair collisions (releases the GIL). Returns the number
    /// actually processed.
    fn run_events(&mut self, py: Python<'_>, n: u64) -> PyResult<u64> {
        let inner = &mut self.inner;
        let summary = py
            .detach(|| with_sim!(inner, sim => sim.run(Budget::Events(n))))
            .map_err(py_err)?;
        Ok(summary.counts.collisions())
    }

    /// Advance the simulation to the specified absolute time (releases the GIL).
    fn advance_to(&mut self, py: Python<'_>, target_time: f64) -> PyResult<()> {
        let inner = &mut self.inner;
        py.detach(|| with_sim!(inner, sim => sim.advance_to(target_time).map(|_| ())))
            .map_err(py_err)
    }

    /// Run to `target_time`, recording positions at every sample tick.
    ///
    /// Returns `(times, positions)` with shapes `(M,)` and `(M, N, dim)`.
    #[allow(clippy::type_complexity)]
    fn sample_positions<'py>(
        &mut self,
        py: Python<'py>,
        target_time: f64,
    ) -> PyResult<(Bound<'py, PyArray1<f64>>, Bound<'py, PyArray3<f64>>)> {
        let inner = &mut self.inner;
        let (times, frames, n, d) = py
            .detach(|| {
                with_sim!(inner, sim => {
                    let mut times = Vec::new();
                    let mut frames: Vec<f64> = Vec::new();
                    sim.run_sampled(Budget::Time(target_time), |t, particles| {
                        times.push(t);
                        frames.extend(particles.iter().flat_map(|p| p.r));
                    })
                    .map(|_| (times, frames, sim.num_particles(), sim.geometry().lengths().len()))
                })
            })
            .map_err(py_err)?;
        let m = times.len();
        let frames = Array3::from_shape_vec((m, n, d), frames)
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        Ok((
            Array1::from_vec(times).into_pyarray(py),
            frames.into_pyarray(py),
        ))
    }

    /// Positions as a NumPy array of shape (N, dim).
    fn get_positions<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<f64>> {
        with_sim!(&self.inner, sim => rows_to_array(&sim.positions())).into_pyarray(py)
    }

    /// Velocities as a NumPy array of shape (N, dim).
    fn get_velocities<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<f64>> {
        with_sim!(&self.inner, sim => rows_to_array(&sim.velocities())).into_pyarray(py)
    }

    /// Replace all velocities from an (N, dim) array of finite values.
    fn set_velocities(&mut self, velocities: PyReadonlyArray2<'_, f64>) -> PyResult<()> {
        let arr = velocities.as_array();
        with_sim!(&mut self.inner, sim => {
            let d = sim.geometry().lengths().len();
            if arr.nrows() != sim.num_particles() || arr.ncols() != d {
                return Err(PyValueError::new_err(format!(
                    "velocities must have shape ({}, {d}), got {:?}",
                    sim.num_particles(),
                    arr.shape()
                )));
            }
            let rows = array_to_rows(arr);
            sim.set_velocities(rows).map_err(py_err)
        })
    }

    /// Total kinetic energy `sum(|v|^2) / 2`.
    fn kinetic_energy(&self) -> f64 {
        with_sim!(&self.inner, sim => sim.kinetic_energy())
    }

    /// Packing fraction `N * V_ball(sigma) / V_domain`.
    fn density(&self) -> f64 {
        with_sim!(&self.inner, sim => sim.geometry().get_density(sim.num_particles()))
    }

    /// Collision counts: {"wall": ..., "pair": ..., "recheck": ...}.
    fn counts<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let c = with_sim!(&self.inner, sim => sim.counts());
        let out = PyDict::new(py);
        out.set_item("wall", c.wall)?;
        out.set_item("pair", c.pair)?;
        out.set_item("recheck", c.recheck)?;
        Ok(out)
    }
}

/// The hardsim Python module entry point.
#[pymodule]
fn hardsim(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<HardSim>()?;
    Ok(())
}
