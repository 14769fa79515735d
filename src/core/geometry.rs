//! Simulation domains: a walled box and a periodic torus.
//!
//! Both carry the same [`Extent`] (side lengths plus the common hard-body radius) and
//! differ in how separations are measured, how positions are wrapped, and which
//! coordinates are legal. [`Geometry`] is the tagged variant the engine stores; it
//! dispatches to the concrete domain with a `match`, so the hot distance code is
//! statically resolved.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Side lengths and hard-body radius shared by every domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent<const D: usize> {
    pub lengths: [f64; D],
    pub sigma: f64,
}

impl<const D: usize> Extent<D> {
    fn validate(&self, min_ratio: f64) -> Result<()> {
        if D == 0 {
            return Err(Error::InvalidParam("dimension must be >= 1".into()));
        }
        if !self.sigma.is_finite() || self.sigma <= 0.0 {
            return Err(Error::InvalidParam("sigma must be finite and > 0".into()));
        }
        if !self.lengths.iter().all(|&l| l.is_finite() && l > 0.0) {
            return Err(Error::InvalidParam(
                "side lengths must be finite and > 0".into(),
            ));
        }
        let l_min = self.min_length();
        if min_ratio * self.sigma >= l_min {
            return Err(Error::InvalidParam(format!(
                "{min_ratio} * sigma = {} must be smaller than the shortest side {l_min}",
                min_ratio * self.sigma
            )));
        }
        Ok(())
    }

    /// Shortest side length.
    pub fn min_length(&self) -> f64 {
        self.lengths.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Product of the side lengths.
    pub fn volume(&self) -> f64 {
        self.lengths.iter().product()
    }
}

/// Operations every domain provides.
pub trait Domain<const D: usize> {
    fn extent(&self) -> &Extent<D>;

    /// Difference vector `x0 - x1` as the domain measures it.
    fn separation(&self, x0: &[f64; D], x1: &[f64; D]) -> [f64; D];

    /// Map a position back into the domain.
    fn move_to(&self, x: [f64; D]) -> [f64; D];

    fn is_within_bounds(&self, x: &[f64; D]) -> bool;

    /// Range that particle centers may occupy on `axis` during placement.
    fn placement_range(&self, axis: usize) -> (f64, f64);

    /// Whether particles can collide with walls.
    fn has_walls(&self) -> bool;

    fn distance(&self, x0: &[f64; D], x1: &[f64; D]) -> f64 {
        norm_sq(&self.separation(x0, x1)).sqrt()
    }
}

/// Box with hard walls at `0` and `L` on every axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxDomain<const D: usize> {
    extent: Extent<D>,
}

impl<const D: usize> Domain<D> for BoxDomain<D> {
    fn extent(&self) -> &Extent<D> {
        &self.extent
    }

    fn separation(&self, x0: &[f64; D], x1: &[f64; D]) -> [f64; D] {
        sub(x0, x1)
    }

    fn move_to(&self, x: [f64; D]) -> [f64; D] {
        x
    }

    fn is_within_bounds(&self, x: &[f64; D]) -> bool {
        let sigma = self.extent.sigma;
        x.iter()
            .zip(&self.extent.lengths)
            .all(|(&xi, &l)| sigma <= xi && xi <= l - sigma)
    }

    fn placement_range(&self, axis: usize) -> (f64, f64) {
        let sigma = self.extent.sigma;
        (sigma, self.extent.lengths[axis] - sigma)
    }

    fn has_walls(&self) -> bool {
        true
    }
}

/// Periodic box: every axis wraps around.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TorusDomain<const D: usize> {
    extent: Extent<D>,
}

impl<const D: usize> Domain<D> for TorusDomain<D> {
    fn extent(&self) -> &Extent<D> {
        &self.extent
    }

    /// Minimum-image difference: every component lands in `[-L/2, L/2]`.
    fn separation(&self, x0: &[f64; D], x1: &[f64; D]) -> [f64; D] {
        let mut d = sub(x0, x1);
        for (dk, &l) in d.iter_mut().zip(&self.extent.lengths) {
            *dk -= l * (*dk / l).round();
        }
        d
    }

    fn move_to(&self, mut x: [f64; D]) -> [f64; D] {
        for (xk, &l) in x.iter_mut().zip(&self.extent.lengths) {
            let wrapped = xk.rem_euclid(l);
            // rem_euclid of a tiny negative value rounds up to exactly `l`
            *xk = if wrapped >= l { 0.0 } else { wrapped };
        }
        x
    }

    fn is_within_bounds(&self, _x: &[f64; D]) -> bool {
        true
    }

    fn placement_range(&self, axis: usize) -> (f64, f64) {
        (0.0, self.extent.lengths[axis])
    }

    fn has_walls(&self) -> bool {
        false
    }
}

/// Boundary condition selector used by configuration records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    Box,
    Torus,
}

/// The domain the engine runs in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Geometry<const D: usize> {
    Box(BoxDomain<D>),
    Torus(TorusDomain<D>),
}

impl<const D: usize> Geometry<D> {
    /// Walled box. Requires `2 * sigma < min(L)`.
    pub fn new_box(lengths: [f64; D], sigma: f64) -> Result<Self> {
        let extent = Extent { lengths, sigma };
        extent.validate(2.0)?;
        Ok(Geometry::Box(BoxDomain { extent }))
    }

    /// Periodic torus. Requires `4 * sigma < min(L)`, so that two touching bodies
    /// always touch through their minimum image.
    pub fn new_torus(lengths: [f64; D], sigma: f64) -> Result<Self> {
        let extent = Extent { lengths, sigma };
        extent.validate(4.0)?;
        Ok(Geometry::Torus(TorusDomain { extent }))
    }

    pub fn new(boundary: Boundary, lengths: [f64; D], sigma: f64) -> Result<Self> {
        match boundary {
            Boundary::Box => Self::new_box(lengths, sigma),
            Boundary::Torus => Self::new_torus(lengths, sigma),
        }
    }

    pub fn boundary(&self) -> Boundary {
        match self {
            Geometry::Box(_) => Boundary::Box,
            Geometry::Torus(_) => Boundary::Torus,
        }
    }

    #[inline]
    pub fn sigma(&self) -> f64 {
        self.extent().sigma
    }

    #[inline]
    pub fn lengths(&self) -> &[f64; D] {
        &self.extent().lengths
    }

    /// Fraction of the domain volume covered by `n` bodies.
    pub fn get_density(&self, n: usize) -> f64 {
        let extent = self.extent();
        n as f64 * ball_volume(D, extent.sigma) / extent.volume()
    }

    /// Change `sigma` so that `n` bodies fill the fraction `eta` of the domain.
    ///
    /// The geometry is left untouched when the new radius violates its invariants.
    pub fn rescale_to_density(&mut self, n: usize, eta: f64) -> Result<f64> {
        if n == 0 {
            return Err(Error::InvalidParam("particle count must be > 0".into()));
        }
        if !eta.is_finite() || eta <= 0.0 {
            return Err(Error::InvalidParam("density must be finite and > 0".into()));
        }
        let limit = close_packing_limit(D);
        if eta > limit {
            return Err(Error::DensityExceeded {
                density: eta,
                limit,
            });
        }
        let unit = ball_volume(D, 1.0);
        let sigma = (eta * self.extent().volume() / (n as f64 * unit)).powf(1.0 / D as f64);
        let rescaled = Self::new(self.boundary(), *self.lengths(), sigma)?;
        *self = rescaled;
        log::debug!("rescaled sigma to {sigma} for density {eta} with {n} bodies");
        Ok(sigma)
    }

    /// Deterministic lattice of `n` non-overlapping centers.
    ///
    /// In 2-D the admissible region is cut into `m = floor(sqrt(n))` columns and
    /// `ceil(n / m)` rows; alternate columns are shifted by a quarter cell. In 3-D a
    /// cubic grid of `ceil(cbrt(n))` cells per axis is used, alternate layers shifted.
    pub fn create_configuration(&self, n: usize) -> Result<Vec<[f64; D]>> {
        if n == 0 {
            return Err(Error::InvalidParam("particle count must be > 0".into()));
        }
        let density = self.get_density(n);
        let limit = close_packing_limit(D);
        if density > limit {
            return Err(Error::DensityExceeded { density, limit });
        }

        let cells: [usize; D] = match D {
            2 => {
                let m = isqrt(n);
                let mut cells = [0usize; D];
                cells[0] = m;
                cells[1] = n.div_ceil(m);
                cells
            }
            3 => [icbrt_ceil(n); D],
            _ => {
                return Err(Error::InvalidParam(format!(
                    "lattice packing supports d = 2 or 3, got {D}"
                )))
            }
        };

        let mut spacing = [0.0f64; D];
        let mut origin = [0.0f64; D];
        for k in 0..D {
            let (lo, hi) = self.placement_range(k);
            spacing[k] = (hi - lo) / cells[k] as f64;
            origin[k] = lo;
        }

        let total: usize = cells.iter().product();
        let mut positions = Vec::with_capacity(n);
        for flat in 0..total.min(n) {
            // axis 0 varies slowest
            let mut index = [0usize; D];
            let mut rem = flat;
            for k in (0..D).rev() {
                index[k] = rem % cells[k];
                rem /= cells[k];
            }
            // column parity in 2-D, layer parity in 3-D
            let parity_axis = if D == 2 { 0 } else { D - 1 };
            let shift = if index[parity_axis] % 2 == 0 {
                -0.25
            } else {
                0.25
            };
            let mut x = [0.0f64; D];
            for k in 0..D {
                let mut c = index[k] as f64 + 0.5;
                if k != parity_axis {
                    c += shift;
                }
                x[k] = origin[k] + c * spacing[k];
            }
            positions.push(self.move_to(x));
        }

        let min_sep = 2.0 * self.sigma();
        for i in 0..positions.len() {
            for j in (i + 1)..positions.len() {
                let dist = self.distance(&positions[i], &positions[j]);
                if dist < min_sep {
                    return Err(Error::Configuration(format!(
                        "lattice spacing too tight: bodies {i} and {j} are {dist} apart, need {min_sep}"
                    )));
                }
            }
        }
        log::info!(
            "placed {n} bodies on a {:?} lattice at density {density:.4}",
            cells
        );
        Ok(positions)
    }
}

impl<const D: usize> Domain<D> for Geometry<D> {
    #[inline]
    fn extent(&self) -> &Extent<D> {
        match self {
            Geometry::Box(g) => g.extent(),
            Geometry::Torus(g) => g.extent(),
        }
    }

    #[inline]
    fn separation(&self, x0: &[f64; D], x1: &[f64; D]) -> [f64; D] {
        match self {
            Geometry::Box(g) => g.separation(x0, x1),
            Geometry::Torus(g) => g.separation(x0, x1),
        }
    }

    #[inline]
    fn move_to(&self, x: [f64; D]) -> [f64; D] {
        match self {
            Geometry::Box(g) => g.move_to(x),
            Geometry::Torus(g) => g.move_to(x),
        }
    }

    #[inline]
    fn is_within_bounds(&self, x: &[f64; D]) -> bool {
        match self {
            Geometry::Box(g) => g.is_within_bounds(x),
            Geometry::Torus(g) => g.is_within_bounds(x),
        }
    }

    fn placement_range(&self, axis: usize) -> (f64, f64) {
        match self {
            Geometry::Box(g) => g.placement_range(axis),
            Geometry::Torus(g) => g.placement_range(axis),
        }
    }

    fn has_walls(&self) -> bool {
        matches!(self, Geometry::Box(_))
    }
}

/// Close-packing fraction: hexagonal in 2-D, FCC in 3-D.
pub fn close_packing_limit(d: usize) -> f64 {
    match d {
        1 => 1.0,
        2 => PI * 3f64.sqrt() / 6.0,
        _ => PI / (3.0 * 2f64.sqrt()),
    }
}

/// Volume of a `d`-ball of radius `r`.
pub fn ball_volume(d: usize, r: f64) -> f64 {
    match d {
        0 => 1.0,
        1 => 2.0 * r,
        _ => ball_volume(d - 2, r) * 2.0 * PI * r * r / d as f64,
    }
}

// ============ Vector helpers ============

#[inline]
pub(crate) fn dot<const D: usize>(a: &[f64; D], b: &[f64; D]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[inline]
pub(crate) fn norm_sq<const D: usize>(a: &[f64; D]) -> f64 {
    dot(a, a)
}

#[inline]
pub(crate) fn sub<const D: usize>(a: &[f64; D], b: &[f64; D]) -> [f64; D] {
    let mut out = [0.0f64; D];
    for ((o, &x), &y) in out.iter_mut().zip(a).zip(b) {
        *o = x - y;
    }
    out
}

fn isqrt(n: usize) -> usize {
    let mut m = (n as f64).sqrt() as usize;
    while m * m > n {
        m -= 1;
    }
    while (m + 1) * (m + 1) <= n {
        m += 1;
    }
    m
}

fn icbrt_ceil(n: usize) -> usize {
    let mut k = 1usize;
    while k * k * k < n {
        k += 1;
    }
    k
}
