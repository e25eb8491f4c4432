// SPDX-License-Identifier: AGPL-3.0-only

//! Point-to-all quark propagators.
//!
//! One column per (spin, colour) of the source:
//!
//! ```text
//! η_{αa}   = J_src δ(x − x₀) e_{αa}
//! S_{·,αa} = J_snk D⁻¹ η_{αa}
//! ```
//!
//! with optional stout smearing of the spatial links first. The twelve
//! columns are independent solves and run in parallel.
//!
//! Domain-wall solves live in five dimensions. The 4D source enters the
//! walls as `b_0 = P₊ η`, `b_{Ls−1} = P₋ η` and the quark field is read off
//! as `q = P₋ ψ_0 + P₊ ψ_{Ls−1}`.
//!
//! # Correlator
//!
//! [`Propagator::pion_correlator`] sums `|S|²` over each timeslice, the
//! pseudoscalar two-point function by γ5-hermiticity.

use num_complex::Complex64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::constants::{N_COLORS, N_DIM, SPINOR_SITE};
use super::dirac::{DiracOperator, DiracParams, FermionAction, LinearOperator};
use super::gamma::{chiral_projector, spin_apply, SiteSpinor};
use super::gauge::{Coord, GaugeField};
use super::smearing::JacobiSmearing;
use super::solver::{invert, SolveRequest, SolveResult};
use super::spinor::point_source;
use crate::error::LatticeError;

/// One 12×12 block: `[sink][source]`, index `3·spin + colour`.
pub type SiteMatrix = [[Complex64; SPINOR_SITE]; SPINOR_SITE];

/// Everything needed for one point-to-all propagator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagatorRequest {
    /// Fermion discretization.
    pub action: FermionAction,
    /// Operator parameters; `params.precondition` selects the Schur path.
    pub params: DiracParams,
    /// Source position `(t, x, y, z)`.
    pub source_site: Coord,
    /// Stout passes on the spatial links before building the operator.
    pub stout_steps: usize,
    /// Stout weight ρ.
    pub stout_rho: f64,
    /// Jacobi iterations at the source.
    pub source_smearing: usize,
    /// Jacobi hopping weight at the source.
    pub source_kappa: f64,
    /// Jacobi iterations at the sink.
    pub sink_smearing: usize,
    /// Jacobi hopping weight at the sink.
    pub sink_kappa: f64,
    /// Krylov settings shared by all columns.
    pub solver: SolveRequest,
}

impl Default for PropagatorRequest {
    fn default() -> Self {
        Self {
            action: FermionAction::Wilson,
            params: DiracParams::default(),
            source_site: [0; N_DIM],
            stout_steps: 0,
            stout_rho: 0.1,
            source_smearing: 0,
            source_kappa: 0.25,
            sink_smearing: 0,
            sink_kappa: 0.25,
            solver: SolveRequest::default(),
        }
    }
}

/// Diagnostics of one column solve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolveStats {
    /// Iterations performed.
    pub iterations: usize,
    /// Final true relative residual.
    pub residual: f64,
    /// Wall time.
    pub elapsed: Duration,
    /// Whether the tolerance was reached.
    pub converged: bool,
}

impl From<&SolveResult> for SolveStats {
    fn from(r: &SolveResult) -> Self {
        Self {
            iterations: r.iterations,
            residual: r.residual,
            elapsed: r.elapsed,
            converged: r.converged,
        }
    }
}

/// Point-to-all propagator on a 4D lattice.
#[derive(Clone, Debug)]
pub struct Propagator {
    shape: Coord,
    source_site: Coord,
    sites: Vec<SiteMatrix>,
    stats: Vec<SolveStats>,
}

impl Propagator {
    /// Lattice shape.
    #[must_use]
    pub const fn shape(&self) -> Coord {
        self.shape
    }

    /// Source position.
    #[must_use]
    pub const fn source_site(&self) -> Coord {
        self.source_site
    }

    /// Number of sites.
    #[must_use]
    pub fn volume(&self) -> usize {
        self.sites.len()
    }

    /// 12×12 block at lexicographic site `index`.
    ///
    /// # Panics
    ///
    /// If `index` is out of range.
    #[must_use]
    pub fn site(&self, index: usize) -> &SiteMatrix {
        &self.sites[index]
    }

    /// `S(x)_{sink, source}` with spin-colour indices `3·spin + colour`.
    #[must_use]
    pub fn entry(&self, index: usize, sink: usize, source: usize) -> Complex64 {
        self.sites[index][sink][source]
    }

    /// Column `source` as a 4D spinor field.
    #[must_use]
    pub fn column(&self, source: usize) -> Vec<Complex64> {
        self.sites
            .iter()
            .flat_map(|m| m.iter().map(move |row| row[source]))
            .collect()
    }

    /// Per-column solver diagnostics, indexed `3·spin + colour`.
    #[must_use]
    pub fn stats(&self) -> &[SolveStats] {
        &self.stats
    }

    /// Whether every column reached its tolerance.
    #[must_use]
    pub fn converged(&self) -> bool {
        self.stats.iter().all(|s| s.converged)
    }

    /// `C(t) = Σ_{x⃗} Σ_{ab} |S_ab(t, x⃗)|²`, with `t` measured from the
    /// source timeslice.
    #[must_use]
    pub fn pion_correlator(&self) -> Vec<f64> {
        let nt = self.shape[0];
        let slice = self.sites.len() / nt;
        let mut corr = vec![0.0; nt];
        for (index, m) in self.sites.iter().enumerate() {
            let t = (index / slice + nt - self.source_site[0]) % nt;
            corr[t] += m.iter().flatten().map(Complex64::norm_sqr).sum::<f64>();
        }
        corr
    }
}

fn site_spinor(chunk: &[Complex64]) -> SiteSpinor {
    let mut site = [Complex64::new(0.0, 0.0); SPINOR_SITE];
    site.copy_from_slice(chunk);
    site
}

/// `b_0 = P₊ η`, `b_{Ls−1} = P₋ η`, zero elsewhere.
fn lift_to_walls(eta: &[Complex64], ls: usize) -> Vec<Complex64> {
    let v12 = eta.len();
    let plus = chiral_projector(true);
    let minus = chiral_projector(false);
    let mut b = vec![Complex64::new(0.0, 0.0); v12 * ls];
    for (x, site) in eta.chunks_exact(SPINOR_SITE).enumerate() {
        let site = site_spinor(site);
        let lo = SPINOR_SITE * x;
        let hi = (ls - 1) * v12 + lo;
        for (dst, v) in b[lo..lo + SPINOR_SITE].iter_mut().zip(spin_apply(&plus, &site)) {
            *dst += v;
        }
        for (dst, v) in b[hi..hi + SPINOR_SITE].iter_mut().zip(spin_apply(&minus, &site)) {
            *dst += v;
        }
    }
    b
}

/// `q = P₋ ψ_0 + P₊ ψ_{Ls−1}`.
fn project_from_walls(psi: &[Complex64], ls: usize) -> Vec<Complex64> {
    let v12 = psi.len() / ls;
    let plus = chiral_projector(true);
    let minus = chiral_projector(false);
    let first = &psi[..v12];
    let last = &psi[(ls - 1) * v12..];
    first
        .chunks_exact(SPINOR_SITE)
        .zip(last.chunks_exact(SPINOR_SITE))
        .flat_map(|(a, b)| {
            let mut q = spin_apply(&minus, &site_spinor(a));
            for (v, w) in q.iter_mut().zip(spin_apply(&plus, &site_spinor(b))) {
                *v += w;
            }
            q
        })
        .collect()
}

/// Solve for the twelve columns of the propagator from `request.source_site`.
///
/// Non-converged columns are kept and flagged in [`Propagator::stats`].
///
/// # Errors
///
/// [`LatticeError::InvalidParameter`] for a source outside the lattice or
/// invalid operator parameters.
pub fn compute_propagator(
    field: &GaugeField,
    request: &PropagatorRequest,
) -> Result<Propagator, LatticeError> {
    let shape = field.shape();
    if request.source_site.iter().zip(&shape).any(|(&c, &n)| c >= n) {
        return Err(LatticeError::InvalidParameter(format!(
            "source site {:?} outside lattice {shape:?}",
            request.source_site
        )));
    }
    let smeared;
    let field = if request.stout_steps > 0 {
        smeared = field.stout_smeared(request.stout_steps, request.stout_rho, None);
        &smeared
    } else {
        field
    };
    let op = DiracOperator::new(request.action, field, &request.params)?;
    let source_smear = JacobiSmearing::new(
        field,
        request.source_smearing,
        request.source_kappa,
        &request.params.boundary_phases,
    );
    let sink_smear = JacobiSmearing::new(
        field,
        request.sink_smearing,
        request.sink_kappa,
        &request.params.boundary_phases,
    );

    let volume = field.volume();
    let origin = field.layout().site_index(&request.source_site);
    let domain_wall = request.action == FermionAction::DomainWall;
    let ls = request.params.ls;

    let columns: Vec<(Vec<Complex64>, SolveStats)> = (0..SPINOR_SITE)
        .into_par_iter()
        .map(|col| {
            let (spin, colour) = (col / N_COLORS, col % N_COLORS);
            let eta = source_smear.apply(&point_source(volume, origin, Some(spin), Some(colour)));
            let b = if domain_wall { lift_to_walls(&eta, ls) } else { eta };
            let b = if op.is_hermitian() { op.make_hermitian(&b) } else { b };
            let result = invert(&op, &b, &request.solver, request.params.precondition);
            let q = if domain_wall {
                project_from_walls(&result.solution, ls)
            } else {
                result.solution.clone()
            };
            (sink_smear.apply(&q), SolveStats::from(&result))
        })
        .collect();

    let mut sites = vec![[[Complex64::new(0.0, 0.0); SPINOR_SITE]; SPINOR_SITE]; volume];
    let mut stats = Vec::with_capacity(SPINOR_SITE);
    for (col, (q, s)) in columns.into_iter().enumerate() {
        for (x, block) in q.chunks_exact(SPINOR_SITE).enumerate() {
            for (row, v) in block.iter().enumerate() {
                sites[x][row][col] = *v;
            }
        }
        if !s.converged {
            log::warn!(
                "propagator column {col} did not converge: residual {:.3e} after {} iterations",
                s.residual,
                s.iterations
            );
        }
        stats.push(s);
    }
    log::info!(
        "propagator from {:?}: {} total iterations",
        request.source_site,
        stats.iter().map(|s| s.iterations).sum::<usize>()
    );
    Ok(Propagator {
        shape,
        source_site: request.source_site,
        sites,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::solver::{relative_residual, SolverMethod};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn tight() -> SolveRequest {
        SolveRequest {
            tolerance: 1e-10,
            max_iterations: 2000,
            ..SolveRequest::default()
        }
    }

    #[test]
    fn columns_solve_the_dirac_equation() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let field = GaugeField::hot_start(&[4, 4, 4, 4], &[2, 2, 2, 2], &mut rng).unwrap();
        let request = PropagatorRequest {
            params: DiracParams {
                mass: 0.5,
                ..DiracParams::default()
            },
            source_site: [1, 2, 0, 3],
            solver: tight(),
            ..PropagatorRequest::default()
        };
        let prop = compute_propagator(&field, &request).unwrap();
        assert!(prop.converged());
        assert_eq!(prop.stats().len(), 12);
        let op = DiracOperator::new(request.action, &field, &request.params).unwrap();
        let origin = field.layout().site_index(&[1, 2, 0, 3]);
        for col in 0..12 {
            let eta = point_source(field.volume(), origin, Some(col / 3), Some(col % 3));
            assert!(relative_residual(&op, &eta, &prop.column(col)) < 1e-8);
        }
    }

    #[test]
    fn preconditioned_propagator_matches() {
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let field = GaugeField::hot_start(&[4, 4, 4, 4], &[2, 2, 2, 2], &mut rng).unwrap();
        let mut request = PropagatorRequest {
            params: DiracParams {
                mass: 0.5,
                ..DiracParams::default()
            },
            solver: tight(),
            ..PropagatorRequest::default()
        };
        let plain = compute_propagator(&field, &request).unwrap();
        request.params.precondition = true;
        request.params.hermitian = true;
        let eo = compute_propagator(&field, &request).unwrap();
        for x in 0..field.volume() {
            for a in 0..12 {
                for b in 0..12 {
                    assert!((plain.entry(x, a, b) - eo.entry(x, a, b)).norm() < 1e-7);
                }
            }
        }
    }

    #[test]
    fn free_correlator_is_time_symmetric_and_decays() {
        let field = GaugeField::cold_start(&[4, 4, 4, 4], &[2, 2, 2, 2]).unwrap();
        let request = PropagatorRequest {
            params: DiracParams {
                mass: 0.8,
                ..DiracParams::default()
            },
            solver: tight(),
            ..PropagatorRequest::default()
        };
        let corr = compute_propagator(&field, &request).unwrap().pion_correlator();
        assert_eq!(corr.len(), 4);
        assert!(corr[0] > corr[1] && corr[1] > corr[2]);
        assert!((corr[1] - corr[3]).abs() < 1e-8 * corr[1]);
    }

    #[test]
    fn smearing_spreads_the_source() {
        let field = GaugeField::cold_start(&[4, 4, 4, 4], &[2, 2, 2, 2]).unwrap();
        let base = PropagatorRequest {
            params: DiracParams {
                mass: 1.0,
                ..DiracParams::default()
            },
            solver: tight(),
            ..PropagatorRequest::default()
        };
        let smeared = PropagatorRequest {
            source_smearing: 4,
            stout_steps: 1,
            ..base.clone()
        };
        let local = compute_propagator(&field, &base).unwrap();
        let wide = compute_propagator(&field, &smeared).unwrap();
        assert!(wide.converged());
        let at_source = |p: &Propagator| p.entry(0, 0, 0).norm();
        let ratio_local = local.entry(1, 0, 0).norm() / at_source(&local);
        let ratio_wide = wide.entry(1, 0, 0).norm() / at_source(&wide);
        assert!(ratio_wide > ratio_local);
    }

    #[test]
    fn domain_wall_propagator_converges() {
        let field = GaugeField::cold_start(&[4, 4, 4, 4], &[2, 2, 2, 2]).unwrap();
        let request = PropagatorRequest {
            action: FermionAction::DomainWall,
            params: DiracParams {
                mass: 0.3,
                ls: 4,
                ..DiracParams::default()
            },
            solver: SolveRequest {
                tolerance: 1e-8,
                max_iterations: 5000,
                ..SolveRequest::default()
            },
            ..PropagatorRequest::default()
        };
        let prop = compute_propagator(&field, &request).unwrap();
        assert!(prop.converged());
        assert_eq!(prop.volume(), field.volume());
        assert!(prop.pion_correlator().iter().all(|c| *c > 0.0));
    }

    #[test]
    fn rejects_source_outside_lattice() {
        let field = GaugeField::cold_start(&[4, 4, 4, 4], &[2, 2, 2, 2]).unwrap();
        let request = PropagatorRequest {
            source_site: [0, 4, 0, 0],
            ..PropagatorRequest::default()
        };
        assert!(matches!(
            compute_propagator(&field, &request),
            Err(LatticeError::InvalidParameter(_))
        ));
    }

    #[test]
    fn request_parses_from_partial_json() {
        let r: PropagatorRequest =
            serde_json::from_str(r#"{"action":"naik","sink_smearing":2}"#).unwrap();
        assert_eq!(r.action, FermionAction::Naik);
        assert_eq!(r.sink_smearing, 2);
        assert_eq!(r.solver, SolveRequest::default());
    }

    #[test]
    fn unknown_action_and_method_fall_back() {
        let r: PropagatorRequest = serde_json::from_str(
            r#"{"action":"clover","params":{"dwf_kernel":"overlap"},"solver":{"method":"gmres"}}"#,
        )
        .unwrap();
        assert_eq!(r.action, FermionAction::Wilson);
        assert_eq!(r.params.dwf_kernel, FermionAction::Wilson);
        assert_eq!(r.solver.method, SolverMethod::ConjugateGradient);

        let r: PropagatorRequest =
            serde_json::from_str(r#"{"action":3,"solver":{"method":1}}"#).unwrap();
        assert_eq!(r.action, FermionAction::DomainWall);
        assert_eq!(r.solver.method, SolverMethod::BiCgStab);
    }
}
