// SPDX-License-Identifier: AGPL-3.0-only

//! SU(3) gauge configuration and gauge-invariant observables.
//!
//! A [`GaugeField`] holds one link `U_μ(x)` per site and direction in a
//! [`BlockedLattice`]. Coordinates are `(t, x, y, z)`; direction 0 is
//! time.
//!
//! Closed loops are described as sequences of unit [`Step`]s and evaluated
//! by [`path_product`] over any [`LinkSource`], which lets the Monte Carlo
//! engine evaluate staples against a chunk overlay or a single substituted
//! link without copying the field.
//!
//! # Observables
//!
//! | Observable | Loop |
//! |-----------|------|
//! | plaquette | 1×1 |
//! | rectangle | 2×1, long side μ |
//! | twisted rectangle | two 1×1 loops of opposite orientation sharing a link |
//! | Wilson loop | r×t in a (spatial, time) plane |
//! | Polyakov loop | temporal line closed by periodicity |
//!
//! All loops are normalized as Re Tr / 3 so the cold configuration gives 1.

use std::sync::Arc;

use num_complex::Complex64;
use rand::Rng;

use super::constants::N_DIM;
use super::layout::{shift_coord, BlockedLattice, Layout};
use super::su3::Su3Matrix;
use crate::error::LatticeError;

/// Site coordinates `(t, x, y, z)`.
pub type Coord = [usize; N_DIM];

/// One unit hop along a lattice direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Step {
    /// Lattice direction.
    pub dir: usize,
    /// `true` for +μ, `false` for −μ.
    pub forward: bool,
}

impl Step {
    /// Hop along +μ.
    #[must_use]
    pub const fn fwd(dir: usize) -> Self {
        Self { dir, forward: true }
    }

    /// Hop along −μ.
    #[must_use]
    pub const fn bwd(dir: usize) -> Self {
        Self {
            dir,
            forward: false,
        }
    }

    /// Signed displacement of this step along its direction.
    #[must_use]
    pub const fn sign(self) -> isize {
        if self.forward {
            1
        } else {
            -1
        }
    }
}

/// Plaquette path `+μ +ν −μ −ν`.
#[must_use]
pub const fn plaquette_path(mu: usize, nu: usize) -> [Step; 4] {
    [Step::fwd(mu), Step::fwd(nu), Step::bwd(mu), Step::bwd(nu)]
}

/// 2×1 rectangle path, long side along μ.
#[must_use]
pub const fn rectangle_path(mu: usize, nu: usize) -> [Step; 6] {
    [
        Step::fwd(mu),
        Step::fwd(mu),
        Step::fwd(nu),
        Step::bwd(mu),
        Step::bwd(mu),
        Step::bwd(nu),
    ]
}

/// Twisted rectangle: the plaquette at x followed by the reversed
/// plaquette at x+μ, joined through the shared link `U_ν(x+μ)`.
#[must_use]
pub const fn twisted_rectangle_path(mu: usize, nu: usize) -> [Step; 8] {
    [
        Step::fwd(mu),
        Step::fwd(nu),
        Step::fwd(mu),
        Step::bwd(nu),
        Step::bwd(mu),
        Step::fwd(nu),
        Step::bwd(mu),
        Step::bwd(nu),
    ]
}

/// Move `site` by `n` sites along `mu`, periodically.
#[must_use]
pub fn shift(shape: &Coord, site: &Coord, mu: usize, n: isize) -> Coord {
    let mut x = *site;
    x[mu] = shift_coord(x[mu], n, shape[mu]);
    x
}

/// Read access to link variables.
pub trait LinkSource {
    /// Lattice extents.
    fn shape(&self) -> Coord;

    /// `U_μ(x)` for in-range coordinates.
    fn link(&self, site: &Coord, mu: usize) -> Su3Matrix;
}

/// Ordered product of links along `steps` starting at `start`.
///
/// A forward step multiplies by `U_μ(x)` then moves to `x+μ`; a backward
/// step moves to `x−μ` then multiplies by `U_μ(x−μ)†`.
pub fn path_product<S: LinkSource + ?Sized>(src: &S, start: &Coord, steps: &[Step]) -> Su3Matrix {
    let shape = src.shape();
    let mut x = *start;
    let mut p = Su3Matrix::IDENTITY;
    for step in steps {
        if step.forward {
            p = p * src.link(&x, step.dir);
            x = shift(&shape, &x, step.dir, 1);
        } else {
            x = shift(&shape, &x, step.dir, -1);
            p = p * src.link(&x, step.dir).adjoint();
        }
    }
    p
}

/// Per-site links `[U_0, U_1, U_2, U_3]`.
pub type SiteLinks = [Su3Matrix; N_DIM];

/// SU(3) gauge configuration.
#[derive(Clone, Debug)]
pub struct GaugeField {
    links: BlockedLattice<SiteLinks>,
}

impl LinkSource for GaugeField {
    fn shape(&self) -> Coord {
        self.links.shape()
    }

    fn link(&self, site: &Coord, mu: usize) -> Su3Matrix {
        self.links.get(site)[mu]
    }
}

impl GaugeField {
    /// Ordered start: every link is the identity.
    ///
    /// # Errors
    ///
    /// [`LatticeError::InvalidShape`] for incompatible shapes.
    pub fn cold_start(shape: &[usize], block_shape: &[usize]) -> Result<Self, LatticeError> {
        Ok(Self {
            links: BlockedLattice::filled([Su3Matrix::IDENTITY; N_DIM], shape, block_shape)?,
        })
    }

    /// Disordered start: Haar-random links.
    ///
    /// # Errors
    ///
    /// [`LatticeError::InvalidShape`] for incompatible shapes.
    pub fn hot_start<R: Rng + ?Sized>(
        shape: &[usize],
        block_shape: &[usize],
        rng: &mut R,
    ) -> Result<Self, LatticeError> {
        let layout = Arc::new(Layout::new(shape, block_shape)?);
        let mut field = Self {
            links: BlockedLattice::with_layout([Su3Matrix::IDENTITY; N_DIM], layout),
        };
        for site in 0..field.volume() {
            for mu in 0..N_DIM {
                field.set_link_at(site, mu, Su3Matrix::random_haar(rng));
            }
        }
        Ok(field)
    }

    /// Shared site layout.
    #[must_use]
    pub fn layout(&self) -> &Arc<Layout> {
        self.links.layout()
    }

    /// Lattice extents `(T, L, L, L)`.
    #[must_use]
    pub fn shape(&self) -> Coord {
        self.links.shape()
    }

    /// Number of sites.
    #[must_use]
    pub fn volume(&self) -> usize {
        self.links.volume()
    }

    /// `U_μ(x)` by lexicographic site index.
    pub fn link_at(&self, site: usize, mu: usize) -> Su3Matrix {
        self.links.at(site)[mu]
    }

    /// `U_μ(x)` at periodic coordinates.
    pub fn link_wrapped(&self, site: &[isize; N_DIM], mu: usize) -> Su3Matrix {
        self.links.get_wrapped(site)[mu]
    }

    /// All four links of a site.
    #[must_use]
    pub fn site_links(&self, site: usize) -> &SiteLinks {
        self.links.at(site)
    }

    /// Replace `U_μ(x)`.
    pub fn set_link(&mut self, site: &Coord, mu: usize, u: Su3Matrix) {
        self.links.get_mut(site)[mu] = u;
    }

    /// Replace `U_μ(x)` by lexicographic site index.
    pub fn set_link_at(&mut self, site: usize, mu: usize, u: Su3Matrix) {
        self.links.at_mut(site)[mu] = u;
    }

    /// Re Tr of the μν plaquette at `site`, over 3.
    #[must_use]
    pub fn plaquette(&self, site: &Coord, mu: usize, nu: usize) -> f64 {
        path_product(self, site, &plaquette_path(mu, nu)).re_trace() / 3.0
    }

    /// Re Tr of the 2×1 rectangle (long side μ) at `site`, over 3.
    #[must_use]
    pub fn rectangle(&self, site: &Coord, mu: usize, nu: usize) -> f64 {
        path_product(self, site, &rectangle_path(mu, nu)).re_trace() / 3.0
    }

    /// Re Tr of the twisted rectangle at `site`, over 3.
    #[must_use]
    pub fn twisted_rectangle(&self, site: &Coord, mu: usize, nu: usize) -> f64 {
        path_product(self, site, &twisted_rectangle_path(mu, nu)).re_trace() / 3.0
    }

    /// Average plaquette over all sites and the six planes μ < ν.
    #[must_use]
    pub fn average_plaquette(&self) -> f64 {
        let mut sum = 0.0;
        let mut count = 0_usize;
        for index in 0..self.volume() {
            let site = self.links.layout().site_coords(index);
            for mu in 0..N_DIM {
                for nu in (mu + 1)..N_DIM {
                    sum += self.plaquette(&site, mu, nu);
                    count += 1;
                }
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let n = count as f64;
        sum / n
    }

    /// Average rectangle over all sites and ordered planes μ ≠ ν.
    #[must_use]
    pub fn average_rectangle(&self) -> f64 {
        let mut sum = 0.0;
        let mut count = 0_usize;
        for index in 0..self.volume() {
            let site = self.links.layout().site_coords(index);
            for mu in 0..N_DIM {
                for nu in (0..N_DIM).filter(|&nu| nu != mu) {
                    sum += self.rectangle(&site, mu, nu);
                    count += 1;
                }
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let n = count as f64;
        sum / n
    }

    /// r×t Wilson loop with spatial extent along `dim` and temporal extent
    /// along direction 0, anchored at `corner`.
    #[must_use]
    pub fn wilson_loop(&self, corner: &Coord, r: usize, t: usize, dim: usize) -> f64 {
        let mut steps = Vec::with_capacity(2 * (r + t));
        steps.extend(std::iter::repeat(Step::fwd(dim)).take(r));
        steps.extend(std::iter::repeat(Step::fwd(0)).take(t));
        steps.extend(std::iter::repeat(Step::bwd(dim)).take(r));
        steps.extend(std::iter::repeat(Step::bwd(0)).take(t));
        path_product(self, corner, &steps).re_trace() / 3.0
    }

    /// r×t Wilson loop averaged over all sites and the three spatial
    /// directions.
    #[must_use]
    pub fn average_wilson_loop(&self, r: usize, t: usize) -> f64 {
        let mut sum = 0.0;
        for index in 0..self.volume() {
            let site = self.links.layout().site_coords(index);
            for dim in 1..N_DIM {
                sum += self.wilson_loop(&site, r, t, dim);
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let n = (self.volume() * (N_DIM - 1)) as f64;
        sum / n
    }

    /// Table of average Wilson loops, `table[r - 1][t - 1]` for
    /// `1 ≤ r ≤ r_max`, `1 ≤ t ≤ t_max`.
    #[must_use]
    pub fn wilson_loops(&self, r_max: usize, t_max: usize) -> Vec<Vec<f64>> {
        (1..=r_max)
            .map(|r| (1..=t_max).map(|t| self.average_wilson_loop(r, t)).collect())
            .collect()
    }

    /// Mean of Re Tr U / 3 over every link.
    #[must_use]
    pub fn average_link(&self) -> f64 {
        let sum: f64 = self
            .links
            .storage()
            .iter()
            .flat_map(|links| links.iter().map(|u| u.re_trace()))
            .sum();
        #[allow(clippy::cast_precision_loss)]
        let n = (self.volume() * N_DIM) as f64;
        sum / (3.0 * n)
    }

    /// Polyakov loop Tr(Π_t U_0(t, x)) / 3 at spatial site `x`.
    #[must_use]
    pub fn polyakov_loop(&self, spatial: [usize; 3]) -> Complex64 {
        let nt = self.shape()[0];
        let mut prod = Su3Matrix::IDENTITY;
        for t in 0..nt {
            prod = prod * self.link(&[t, spatial[0], spatial[1], spatial[2]], 0);
        }
        prod.trace() / 3.0
    }

    /// Spatial average of |L(x)|.
    #[must_use]
    pub fn average_polyakov_loop(&self) -> f64 {
        let [_, nx, ny, nz] = self.shape();
        let mut sum = 0.0;
        for ix in 0..nx {
            for iy in 0..ny {
                for iz in 0..nz {
                    sum += self.polyakov_loop([ix, iy, iz]).norm();
                }
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let n = (nx * ny * nz) as f64;
        sum / n
    }

    /// Apply `U_μ(x) → Ω(x) U_μ(x) Ω(x+μ)†` with one Ω per site,
    /// indexed lexicographically.
    ///
    /// # Panics
    ///
    /// If `omega.len() != volume`.
    pub fn gauge_transform(&mut self, omega: &[Su3Matrix]) {
        assert_eq!(omega.len(), self.volume(), "one transformation per site");
        let layout = Arc::clone(self.layout());
        let transformed = BlockedLattice::from_fn(Arc::clone(&layout), |site| {
            let mut links = *self.links.at(site);
            for (mu, u) in links.iter_mut().enumerate() {
                let ahead = layout.shift_index(site, mu, 1);
                *u = omega[site] * *u * omega[ahead].adjoint();
            }
            links
        });
        self.links = transformed;
    }

    /// Apply the same Ω at every site.
    pub fn global_transform(&mut self, omega: Su3Matrix) {
        let omegas = vec![omega; self.volume()];
        self.gauge_transform(&omegas);
    }

    /// Largest SU(3) deviation over all links.
    #[must_use]
    pub fn max_su3_deviation(&self) -> f64 {
        self.links
            .storage()
            .iter()
            .flat_map(|links| links.iter().map(|u| u.su3_deviation()))
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn hot(shape: [usize; 4], seed: u64) -> GaugeField {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        GaugeField::hot_start(&shape, &[2, 2, 2, 2], &mut rng).unwrap()
    }

    #[test]
    fn cold_start_observables_are_one() {
        let field = GaugeField::cold_start(&[4, 4, 4, 4], &[4, 4, 4, 4]).unwrap();
        assert!((field.average_plaquette() - 1.0).abs() < 1e-14);
        assert!((field.average_rectangle() - 1.0).abs() < 1e-14);
        assert!((field.average_link() - 1.0).abs() < 1e-14);
        assert!((field.average_wilson_loop(2, 3) - 1.0).abs() < 1e-14);
        assert!((field.average_polyakov_loop() - 1.0).abs() < 1e-14);
        assert!((field.twisted_rectangle(&[1, 2, 3, 0], 0, 2) - 1.0).abs() < 1e-14);
    }

    #[test]
    fn invalid_shape_rejected() {
        assert!(GaugeField::cold_start(&[4, 4, 4], &[2, 2, 2]).is_err());
        assert!(GaugeField::cold_start(&[4, 4, 4, 5], &[2, 2, 2, 2]).is_err());
    }

    #[test]
    fn paths_close() {
        for path in [
            &plaquette_path(0, 1)[..],
            &rectangle_path(2, 3)[..],
            &twisted_rectangle_path(1, 3)[..],
        ] {
            let mut disp = [0_isize; 4];
            for s in path {
                disp[s.dir] += s.sign();
            }
            assert_eq!(disp, [0; 4]);
        }
    }

    #[test]
    fn hot_start_is_disordered_and_unitary() {
        let field = hot([4, 4, 4, 4], 1);
        assert!(field.max_su3_deviation() < 1e-12);
        assert!(field.average_plaquette().abs() < 0.1);
        assert!(field.average_link().abs() < 0.1);
    }

    #[test]
    fn plaquette_is_invariant_under_global_transform() {
        let mut field = hot([4, 4, 4, 4], 2);
        let before = field.average_plaquette();
        let loop_before = field.average_wilson_loop(2, 2);
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        field.global_transform(Su3Matrix::random_haar(&mut rng));
        assert!((field.average_plaquette() - before).abs() < 1e-12);
        assert!((field.average_wilson_loop(2, 2) - loop_before).abs() < 1e-12);
    }

    #[test]
    fn loops_are_invariant_under_local_transform() {
        let mut field = hot([4, 4, 4, 4], 3);
        let site = [1, 2, 0, 3];
        let plaq = field.plaquette(&site, 0, 2);
        let rect = field.rectangle(&site, 1, 3);
        let twist = field.twisted_rectangle(&site, 2, 0);
        let wloop = field.wilson_loop(&site, 2, 3, 1);
        let poly = field.polyakov_loop([1, 1, 2]);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let omegas: Vec<_> = (0..field.volume())
            .map(|_| Su3Matrix::random_haar(&mut rng))
            .collect();
        field.gauge_transform(&omegas);
        assert!((field.plaquette(&site, 0, 2) - plaq).abs() < 1e-12);
        assert!((field.rectangle(&site, 1, 3) - rect).abs() < 1e-12);
        assert!((field.twisted_rectangle(&site, 2, 0) - twist).abs() < 1e-12);
        assert!((field.wilson_loop(&site, 2, 3, 1) - wloop).abs() < 1e-12);
        assert!((field.polyakov_loop([1, 1, 2]) - poly).norm() < 1e-12);
    }

    #[test]
    fn backward_step_uses_adjoint_link() {
        let field = hot([2, 2, 2, 2], 4);
        let site = [1, 0, 1, 0];
        let there_and_back = path_product(&field, &site, &[Step::fwd(2), Step::bwd(2)]);
        let mut d: f64 = 0.0;
        for i in 0..3 {
            for j in 0..3 {
                let target = if i == j { 1.0 } else { 0.0 };
                d = d.max((there_and_back.m[i][j] - Complex64::new(target, 0.0)).norm());
            }
        }
        assert!(d < 1e-12);
    }

    #[test]
    fn wilson_loop_table_shape() {
        let field = GaugeField::cold_start(&[4, 2, 2, 2], &[2, 2, 2, 2]).unwrap();
        let table = field.wilson_loops(2, 3);
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].len(), 3);
        assert!(table.iter().flatten().all(|&w| (w - 1.0).abs() < 1e-14));
    }
}
