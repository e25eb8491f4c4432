// SPDX-License-Identifier: AGPL-3.0-only

//! Shamir domain-wall operator.
//!
//! ```text
//! (D ψ)_s = K(−M5) ψ_s + ψ_s − P₋ ψ_{s+1} − P₊ ψ_{s−1}
//! ```
//!
//! for `0 < s < Ls−1`. The boundary slices couple through the quark mass:
//! slice 0 takes `+m P₊ ψ_{Ls−1}` in place of `−P₊ ψ_{−1}`, slice `Ls−1`
//! takes `+m P₋ ψ_0` in place of `−P₋ ψ_{Ls}`. `K` is a Wilson or Naik
//! kernel. Γ5 = γ5 ⊗ R5 with `R5` the slice reflection `s → Ls−1−s`, so
//! Γ5·D is Hermitian. The adjoint swaps `P₊ ↔ P₋` and uses `K†`.
//!
//! Fields are slice-major: `12·V·s + 12·site + 3·spin + colour`. The 5D
//! parity of `(s, x)` is `(parity(x) + s) mod 2`; with an even `Ls` every
//! off-diagonal term flips it.
//!
//! # References
//!
//! - Shamir, Nucl. Phys. B 406, 90 (1993)
//! - Furman & Shamir, Nucl. Phys. B 439, 54 (1995)

use num_complex::Complex64;
use rayon::prelude::*;

use super::constants::SPINOR_SITE;
use super::dirac::{
    check_size, scaled, DiracParams, EvenOddOperator, FermionAction, LinearOperator,
    WilsonKernel,
};
use super::gamma::{chiral_projector, gamma5_in_place, spin_apply, SiteSpinor, SpinMatrix};
use super::gauge::GaugeField;
use super::layout::Parity;
use crate::error::LatticeError;

const C0: Complex64 = Complex64::new(0.0, 0.0);

/// Domain-wall operator over a 4D kernel.
#[derive(Clone, Debug)]
pub struct DomainWall<'a> {
    kernel: WilsonKernel<'a>,
    mass: f64,
    ls: usize,
    hermitian: bool,
    plus: SpinMatrix,
    minus: SpinMatrix,
    diagonal: f64,
    even_odd: bool,
    half_sites: [Vec<(usize, usize)>; 2],
}

impl<'a> DomainWall<'a> {
    /// Build from `params.m5`, `params.ls`, `params.mass` and
    /// `params.dwf_kernel`.
    ///
    /// # Errors
    ///
    /// [`LatticeError::InvalidParameter`] for out-of-range parameters or
    /// `ls == 0`.
    pub fn new(field: &'a GaugeField, params: &DiracParams) -> Result<Self, LatticeError> {
        if params.ls == 0 {
            return Err(LatticeError::InvalidParameter("ls must be at least 1".into()));
        }
        let kind = match params.dwf_kernel {
            FermionAction::DomainWall => {
                log::warn!("domain-wall kernel cannot itself be domain-wall, using Wilson");
                FermionAction::Wilson
            }
            other => other,
        };
        let kernel_params = DiracParams {
            hermitian: false,
            ..params.clone()
        };
        let kernel = WilsonKernel::new(kind, field, -params.m5, &kernel_params)?;
        let ls = params.ls;
        let even_odd = kernel.supports_even_odd() && ls % 2 == 0;
        let layout = field.layout();
        let mut half_sites = [Vec::new(), Vec::new()];
        for (p, sites) in half_sites.iter_mut().enumerate() {
            for s in 0..ls {
                let parity4 = Parity::of_sum(p + s);
                sites.extend(layout.parity_sites(parity4).iter().map(|&x| (s, x)));
            }
        }
        Ok(Self {
            diagonal: kernel.diagonal() + 1.0,
            kernel,
            mass: params.mass,
            ls,
            hermitian: params.hermitian,
            plus: chiral_projector(true),
            minus: chiral_projector(false),
            even_odd,
            half_sites,
        })
    }

    /// Fifth-dimension extent.
    #[must_use]
    pub const fn ls(&self) -> usize {
        self.ls
    }

    /// The 4D kernel at mass −M5.
    #[must_use]
    pub const fn kernel(&self) -> &WilsonKernel<'a> {
        &self.kernel
    }

    fn volume(&self) -> usize {
        self.kernel.volume()
    }

    /// One output site `(s, x)` of `D` or `D†`, with the diagonal scaled to
    /// `diagonal`.
    fn site_row(&self, s: usize, x: usize, psi: &[Complex64], dagger: bool, diagonal: f64) -> SiteSpinor {
        let v12 = SPINOR_SITE * self.volume();
        let slice = |t: usize| &psi[t * v12..(t + 1) * v12];
        let site = |t: usize| {
            let mut out = [C0; SPINOR_SITE];
            out.copy_from_slice(&slice(t)[SPINOR_SITE * x..SPINOR_SITE * (x + 1)]);
            out
        };
        let (p_up, p_down) = if dagger {
            (&self.plus, &self.minus)
        } else {
            (&self.minus, &self.plus)
        };
        let (t_up, c_up) = if s + 1 < self.ls {
            (s + 1, -1.0)
        } else {
            (0, self.mass)
        };
        let (t_down, c_down) = if s > 0 {
            (s - 1, -1.0)
        } else {
            (self.ls - 1, self.mass)
        };
        let hop = self.kernel.hop_site(x, slice(s), dagger);
        let own = site(s);
        let up = spin_apply(p_up, &site(t_up));
        let down = spin_apply(p_down, &site(t_down));
        let mut out = [C0; SPINOR_SITE];
        for k in 0..SPINOR_SITE {
            out[k] = own[k] * diagonal + hop[k] + up[k] * c_up + down[k] * c_down;
        }
        out
    }

    fn apply_5d(&self, psi: &[Complex64], dagger: bool) -> Vec<Complex64> {
        let volume = self.volume();
        let mut out = vec![C0; psi.len()];
        out.par_chunks_mut(SPINOR_SITE)
            .enumerate()
            .for_each(|(i, chunk)| {
                let row = self.site_row(i / volume, i % volume, psi, dagger, self.diagonal);
                chunk.copy_from_slice(&row);
            });
        out
    }

    fn gather(&self, parity: Parity, psi: &[Complex64]) -> Vec<Complex64> {
        let v12 = SPINOR_SITE * self.volume();
        let mut out = Vec::with_capacity(self.half_size());
        for &(s, x) in &self.half_sites[parity.index()] {
            let base = s * v12 + SPINOR_SITE * x;
            out.extend_from_slice(&psi[base..base + SPINOR_SITE]);
        }
        out
    }

    fn scatter_into(&self, parity: Parity, half: &[Complex64], full: &mut [Complex64]) {
        let v12 = SPINOR_SITE * self.volume();
        for (k, &(s, x)) in self.half_sites[parity.index()].iter().enumerate() {
            let base = s * v12 + SPINOR_SITE * x;
            full[base..base + SPINOR_SITE]
                .copy_from_slice(&half[SPINOR_SITE * k..SPINOR_SITE * (k + 1)]);
        }
    }

    /// Off-diagonal part from a half field of 5D parity `from` into the
    /// opposite half.
    fn hop_half(&self, psi_half: &[Complex64], from: Parity, dagger: bool, what: &str) -> Vec<Complex64> {
        if !self.even_odd {
            log::warn!("{what}: domain-wall operator has no even-odd block structure");
            return vec![C0; self.half_size()];
        }
        if !check_size(psi_half, self.half_size(), what) {
            return vec![C0; self.half_size()];
        }
        let mut full = vec![C0; self.size()];
        self.scatter_into(from, psi_half, &mut full);
        let targets = &self.half_sites[from.flip().index()];
        let mut out = vec![C0; SPINOR_SITE * targets.len()];
        out.par_chunks_mut(SPINOR_SITE)
            .zip(targets.par_iter())
            .for_each(|(chunk, &(s, x))| {
                chunk.copy_from_slice(&self.site_row(s, x, &full, dagger, 0.0));
            });
        out
    }
}

impl LinearOperator for DomainWall<'_> {
    fn size(&self) -> usize {
        self.ls * SPINOR_SITE * self.volume()
    }

    fn apply(&self, psi: &[Complex64]) -> Vec<Complex64> {
        if !check_size(psi, self.size(), "apply") {
            return vec![C0; self.size()];
        }
        let eta = self.apply_5d(psi, false);
        if self.hermitian {
            self.make_hermitian(&eta)
        } else {
            eta
        }
    }

    fn apply_dagger(&self, psi: &[Complex64]) -> Vec<Complex64> {
        if !check_size(psi, self.size(), "apply_dagger") {
            return vec![C0; self.size()];
        }
        if self.hermitian {
            self.apply_5d(&self.make_hermitian(psi), true)
        } else {
            self.apply_5d(psi, true)
        }
    }

    fn make_hermitian(&self, psi: &[Complex64]) -> Vec<Complex64> {
        if !check_size(psi, self.size(), "make_hermitian") {
            return vec![C0; self.size()];
        }
        let v12 = SPINOR_SITE * self.volume();
        let mut eta = Vec::with_capacity(psi.len());
        for s in (0..self.ls).rev() {
            eta.extend_from_slice(&psi[s * v12..(s + 1) * v12]);
        }
        gamma5_in_place(&mut eta);
        eta
    }

    fn is_hermitian(&self) -> bool {
        self.hermitian
    }
}

impl EvenOddOperator for DomainWall<'_> {
    fn supports_even_odd(&self) -> bool {
        self.even_odd
    }

    fn gamma5_flips_parity(&self) -> bool {
        self.ls % 2 == 0
    }

    fn apply_even_odd(&self, psi_odd: &[Complex64]) -> Vec<Complex64> {
        self.hop_half(psi_odd, Parity::Odd, false, "apply_even_odd")
    }

    fn apply_odd_even(&self, psi_even: &[Complex64]) -> Vec<Complex64> {
        self.hop_half(psi_even, Parity::Even, false, "apply_odd_even")
    }

    fn apply_even_even(&self, psi_even: &[Complex64]) -> Vec<Complex64> {
        scaled(psi_even, self.diagonal, self.half_size(), "apply_even_even")
    }

    fn apply_odd_odd(&self, psi_odd: &[Complex64]) -> Vec<Complex64> {
        scaled(psi_odd, self.diagonal, self.half_size(), "apply_odd_odd")
    }

    fn apply_even_even_inv(&self, psi_even: &[Complex64]) -> Vec<Complex64> {
        scaled(psi_even, 1.0 / self.diagonal, self.half_size(), "apply_even_even_inv")
    }

    fn apply_even_odd_dagger(&self, psi_even: &[Complex64]) -> Vec<Complex64> {
        self.hop_half(psi_even, Parity::Even, true, "apply_even_odd_dagger")
    }

    fn apply_odd_even_dagger(&self, psi_odd: &[Complex64]) -> Vec<Complex64> {
        self.hop_half(psi_odd, Parity::Odd, true, "apply_odd_even_dagger")
    }

    fn apply_even_even_dagger(&self, psi_even: &[Complex64]) -> Vec<Complex64> {
        self.apply_even_even(psi_even)
    }

    fn apply_odd_odd_dagger(&self, psi_odd: &[Complex64]) -> Vec<Complex64> {
        self.apply_odd_odd(psi_odd)
    }

    fn apply_even_even_inv_dagger(&self, psi_even: &[Complex64]) -> Vec<Complex64> {
        self.apply_even_even_inv(psi_even)
    }

    fn make_even_odd(&self, psi: &[Complex64]) -> Vec<Complex64> {
        if !check_size(psi, self.size(), "make_even_odd") {
            return vec![C0; self.size()];
        }
        let mut eo = self.gather(Parity::Even, psi);
        eo.extend(self.gather(Parity::Odd, psi));
        eo
    }

    fn remove_even_odd(&self, psi: &[Complex64]) -> Vec<Complex64> {
        let mut full = vec![C0; self.size()];
        if !check_size(psi, self.size(), "remove_even_odd") {
            return full;
        }
        let split = SPINOR_SITE * self.half_sites[0].len();
        self.scatter_into(Parity::Even, &psi[..split], &mut full);
        self.scatter_into(Parity::Odd, &psi[split..], &mut full);
        full
    }
}
