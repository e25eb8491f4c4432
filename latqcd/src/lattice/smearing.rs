// SPDX-License-Identifier: AGPL-3.0-only

//! Link and quark-field smearing.
//!
//! **Stout** (analytic) smearing of spatial links:
//!
//! ```text
//! C = ρ Σ_{ν spatial, ν≠μ} staples,   Ω = C U†
//! Q = (i/2)(Ω† − Ω) − (i/6) Tr(Ω† − Ω)
//! U' = exp(iQ) U
//! ```
//!
//! Every pass reads only the previous pass, so the result does not depend
//! on visiting order. Smeared links stay in SU(3).
//!
//! **Jacobi** smearing of spinors: `J = Σ_{k=0}^{n} (κH)^k` with `H` the
//! spatial hopping matrix (boundary phases included). `J` is Hermitian for
//! real κ.
//!
//! # References
//!
//! - Morningstar & Peardon, Phys. Rev. D 69, 054501 (2004)
//! - Allton et al. (UKQCD), Phys. Rev. D 47, 5128 (1993)

use num_complex::Complex64;
use rayon::prelude::*;

use super::constants::{N_COLORS, N_DIM, N_SPINS, SPINOR_SITE};
use super::dirac::{check_size, LinearOperator};
use super::gamma::gamma5_in_place;
use super::gauge::{path_product, GaugeField, Step};
use super::su3::Su3Matrix;

impl GaugeField {
    /// Sum of the spatial staples around `U_μ(x)` with `ν ≠ μ`.
    fn spatial_staple_sum(&self, site: &[usize; N_DIM], mu: usize) -> Su3Matrix {
        let mut c = Su3Matrix::ZERO;
        for nu in (1..N_DIM).filter(|&nu| nu != mu) {
            c += path_product(self, site, &[Step::fwd(nu), Step::fwd(mu), Step::bwd(nu)]);
            c += path_product(self, site, &[Step::bwd(nu), Step::fwd(mu), Step::fwd(nu)]);
        }
        c
    }

    /// `n` passes of stout smearing with weight `rho` on the spatial links
    /// of the given timeslices (all when `None`). Temporal links are kept.
    #[must_use]
    pub fn stout_smeared(&self, n: usize, rho: f64, timeslices: Option<&[usize]>) -> Self {
        let mut current = self.clone();
        for _ in 0..n {
            let mut next = current.clone();
            for index in 0..current.volume() {
                let site = current.layout().site_coords(index);
                if timeslices.is_some_and(|ts| !ts.contains(&site[0])) {
                    continue;
                }
                for mu in 1..N_DIM {
                    let u = current.link_at(index, mu);
                    let omega = current.spatial_staple_sum(&site, mu).scale(rho) * u.adjoint();
                    let diff = omega.adjoint() - omega;
                    let trace = diff.trace() / 3.0;
                    let mut q = diff;
                    for k in 0..N_COLORS {
                        q.m[k][k] -= trace;
                    }
                    let q = q.scale_complex(Complex64::new(0.0, 0.5));
                    next.set_link_at(index, mu, (q.exp_i() * u).reunitarize());
                }
            }
            current = next;
        }
        current
    }
}

/// Jacobi smearing operator `Σ_{k=0}^{n} (κH)^k`.
#[derive(Clone, Debug)]
pub struct JacobiSmearing {
    n: usize,
    kappa: f64,
    neighbours: Vec<[usize; 6]>,
    phases: Vec<[Complex64; 6]>,
    links: Vec<[Su3Matrix; 6]>,
}

impl JacobiSmearing {
    /// Tabulate the spatial hopping matrix of `field`. Index `i < 3` hops
    /// backward along `i + 1`, `i + 3` forward.
    #[must_use]
    pub fn new(
        field: &GaugeField,
        n: usize,
        kappa: f64,
        boundary_phases: &[Complex64; N_DIM],
    ) -> Self {
        let layout = field.layout();
        let shape = field.shape();
        let volume = field.volume();
        let mut neighbours = Vec::with_capacity(volume);
        let mut phases = Vec::with_capacity(volume);
        let mut links = Vec::with_capacity(volume);
        for x in 0..volume {
            let site = layout.site_coords(x);
            let mut nb = [0; 6];
            let mut ph = [Complex64::new(1.0, 0.0); 6];
            let mut lk = [Su3Matrix::IDENTITY; 6];
            for i in 0..3 {
                let mu = i + 1;
                nb[i] = layout.shift_index(x, mu, -1);
                nb[i + 3] = layout.shift_index(x, mu, 1);
                if site[mu] == 0 {
                    ph[i] = boundary_phases[mu].conj();
                }
                if site[mu] + 1 == shape[mu] {
                    ph[i + 3] = boundary_phases[mu];
                }
                lk[i] = path_product(field, &site, &[Step::bwd(mu)]);
                lk[i + 3] = field.link_at(x, mu);
            }
            neighbours.push(nb);
            phases.push(ph);
            links.push(lk);
        }
        Self {
            n,
            kappa,
            neighbours,
            phases,
            links,
        }
    }

    /// Number of hopping powers.
    #[must_use]
    pub const fn iterations(&self) -> usize {
        self.n
    }

    /// `κ H ψ`.
    fn hop(&self, psi: &[Complex64]) -> Vec<Complex64> {
        let mut out = vec![Complex64::new(0.0, 0.0); psi.len()];
        out.par_chunks_mut(SPINOR_SITE)
            .enumerate()
            .for_each(|(x, chunk)| {
                for d in 0..6 {
                    let base = SPINOR_SITE * self.neighbours[x][d];
                    let phase = self.phases[x][d] * self.kappa;
                    for s in 0..N_SPINS {
                        let off = base + N_COLORS * s;
                        let v = [psi[off], psi[off + 1], psi[off + 2]];
                        let w = self.links[x][d].mul_vec(&v);
                        for c in 0..N_COLORS {
                            chunk[N_COLORS * s + c] += phase * w[c];
                        }
                    }
                }
            });
        out
    }
}

impl LinearOperator for JacobiSmearing {
    fn size(&self) -> usize {
        SPINOR_SITE * self.neighbours.len()
    }

    fn apply(&self, psi: &[Complex64]) -> Vec<Complex64> {
        if !check_size(psi, self.size(), "jacobi smearing") {
            return vec![Complex64::new(0.0, 0.0); self.size()];
        }
        let mut result = psi.to_vec();
        let mut term = psi.to_vec();
        for _ in 0..self.n {
            term = self.hop(&term);
            for (r, t) in result.iter_mut().zip(&term) {
                *r += t;
            }
        }
        result
    }

    fn apply_dagger(&self, psi: &[Complex64]) -> Vec<Complex64> {
        self.apply(psi)
    }

    fn make_hermitian(&self, psi: &[Complex64]) -> Vec<Complex64> {
        let mut eta = psi.to_vec();
        gamma5_in_place(&mut eta);
        eta
    }
}
