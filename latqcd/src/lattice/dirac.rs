// SPDX-License-Identifier: AGPL-3.0-only

//! Matrix-free Wilson-family Dirac operators.
//!
//! ```text
//! D ψ(x) = (1 + 3/χ + m) ψ(x)
//!        − ½ Σ_μ Σ_terms [ S⁻ η⁻ L⁻ ψ(x − nμ) + S⁺ η⁺ L⁺ ψ(x + nμ) ] / u_μⁿ
//! ```
//!
//! with `S± = a ± b γ_μ`, `L⁺` the forward link product, `L⁻` the adjoint of
//! the backward product, `η±` the boundary phases and `u_0 = u_t`,
//! `u_i = u_s`.
//!
//! | Kernel | Hop terms `(n, a, b)` |
//! |--------|------------------------|
//! | Wilson | `(1, 1, 1)` |
//! | Hamber-Wu | `(1, 1, 4/3)`, `(2, 0, −1/6)` |
//! | Naik | `(1, 1, 9/8)`, `(3, 0, −1/24)` |
//!
//! Neighbour indices, phases, link products and spin structures are
//! tabulated once at construction. Operators borrow the gauge field, so the
//! field cannot change while an operator is alive.
//!
//! Every hop of Wilson and Naik kernels flips site parity on lattices with
//! even extents, so their even-even block is the constant diagonal and
//! even-odd preconditioning applies. Hamber-Wu's two-hop term keeps parity.
//!
//! # References
//!
//! - Wilson, "Quarks and strings on a lattice" (1975)
//! - Hamber & Wu, Phys. Lett. B 133, 351 (1983)
//! - Naik, Nucl. Phys. B 316, 238 (1989)

use num_complex::Complex64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::constants::{N_COLORS, N_DIM, N_SPINS, SPINOR_SITE};
use super::domain_wall::DomainWall;
use super::gamma::{
    gamma, gamma5_in_place, spin_apply, spin_combine, spin_identity, SiteSpinor, SpinMatrix,
};
use super::gauge::{path_product, GaugeField, Step};
use super::layout::Parity;
use super::selector::deserialize_via_selector;
use super::su3::Su3Matrix;
use crate::error::LatticeError;

const C0: Complex64 = Complex64::new(0.0, 0.0);

/// A linear operator on flat complex vectors.
pub trait LinearOperator: Sync {
    /// Vector length the operator acts on.
    fn size(&self) -> usize;

    /// `A ψ`. Wrong-sized input gives a zero vector.
    fn apply(&self, psi: &[Complex64]) -> Vec<Complex64>;

    /// `A† ψ`.
    fn apply_dagger(&self, psi: &[Complex64]) -> Vec<Complex64>;

    /// Multiply by the operator's Γ5.
    fn make_hermitian(&self, psi: &[Complex64]) -> Vec<Complex64>;

    /// Whether `apply` already returns Γ5·D.
    fn is_hermitian(&self) -> bool {
        false
    }

    /// `Γ5 D ψ`.
    fn apply_hermitian(&self, psi: &[Complex64]) -> Vec<Complex64> {
        if self.is_hermitian() {
            self.apply(psi)
        } else {
            self.make_hermitian(&self.apply(psi))
        }
    }
}

/// Block operations in the `[even | odd]` basis.
///
/// Half vectors hold the sites of one parity in layout storage order. All
/// blocks act on `D` itself, not on Γ5·D.
pub trait EvenOddOperator: LinearOperator {
    /// Whether the even-even block is site-diagonal so the Schur complement
    /// applies.
    fn supports_even_odd(&self) -> bool;

    /// `D_eo`: odd half → even half.
    fn apply_even_odd(&self, psi_odd: &[Complex64]) -> Vec<Complex64>;
    /// `D_oe`: even half → odd half.
    fn apply_odd_even(&self, psi_even: &[Complex64]) -> Vec<Complex64>;
    /// `D_ee`.
    fn apply_even_even(&self, psi_even: &[Complex64]) -> Vec<Complex64>;
    /// `D_oo`.
    fn apply_odd_odd(&self, psi_odd: &[Complex64]) -> Vec<Complex64>;
    /// `D_ee⁻¹`.
    fn apply_even_even_inv(&self, psi_even: &[Complex64]) -> Vec<Complex64>;
    /// `(D_eo)†`: even half → odd half.
    fn apply_even_odd_dagger(&self, psi_even: &[Complex64]) -> Vec<Complex64>;
    /// `(D_oe)†`: odd half → even half.
    fn apply_odd_even_dagger(&self, psi_odd: &[Complex64]) -> Vec<Complex64>;
    /// `(D_ee)†`.
    fn apply_even_even_dagger(&self, psi_even: &[Complex64]) -> Vec<Complex64>;
    /// `(D_oo)†`.
    fn apply_odd_odd_dagger(&self, psi_odd: &[Complex64]) -> Vec<Complex64>;
    /// `(D_ee⁻¹)†`.
    fn apply_even_even_inv_dagger(&self, psi_even: &[Complex64]) -> Vec<Complex64>;

    /// Reorder a lexicographic field to `[even | odd]`.
    fn make_even_odd(&self, psi: &[Complex64]) -> Vec<Complex64>;
    /// Inverse of [`Self::make_even_odd`].
    fn remove_even_odd(&self, psi: &[Complex64]) -> Vec<Complex64>;

    /// Length of one half vector.
    fn half_size(&self) -> usize {
        self.size() / 2
    }

    /// Whether Γ5 maps each parity onto the other. True for domain-wall
    /// fermions, whose Γ5 reflects the fifth dimension.
    fn gamma5_flips_parity(&self) -> bool {
        false
    }

    /// The operator's Γ5 on an odd half vector, returned as the half vector
    /// of the parity it lands on.
    fn make_hermitian_odd(&self, psi_odd: &[Complex64]) -> Vec<Complex64> {
        let h = self.half_size();
        if !check_size(psi_odd, h, "make_hermitian_odd") {
            return vec![C0; h];
        }
        let mut eo = vec![C0; self.size()];
        eo[h..].copy_from_slice(psi_odd);
        let image = self.make_even_odd(&self.make_hermitian(&self.remove_even_odd(&eo)));
        if self.gamma5_flips_parity() {
            image[..h].to_vec()
        } else {
            image[h..].to_vec()
        }
    }

    /// Reduced source `b_o − D_oe D_ee⁻¹ b_e` from an `[even | odd]` source.
    fn make_even_odd_source(&self, eo_source: &[Complex64]) -> Vec<Complex64> {
        let h = self.half_size();
        if !check_size(eo_source, self.size(), "make_even_odd_source") {
            return vec![C0; h];
        }
        let (even, odd) = eo_source.split_at(h);
        let hop = self.apply_odd_even(&self.apply_even_even_inv(even));
        odd.iter().zip(&hop).map(|(b, t)| b - t).collect()
    }

    /// Full `[even | odd]` solution from the odd-half solution:
    /// `x_e = D_ee⁻¹ (b_e − D_eo x_o)`.
    fn make_even_odd_solution(&self, eo_source: &[Complex64], x_odd: &[Complex64]) -> Vec<Complex64> {
        let h = self.half_size();
        if !check_size(eo_source, self.size(), "make_even_odd_solution")
            || !check_size(x_odd, h, "make_even_odd_solution")
        {
            return vec![C0; self.size()];
        }
        let even = &eo_source[..h];
        let hop = self.apply_even_odd(x_odd);
        let rhs: Vec<Complex64> = even.iter().zip(&hop).map(|(b, t)| b - t).collect();
        let mut x = self.apply_even_even_inv(&rhs);
        x.extend_from_slice(x_odd);
        x
    }
}

/// Fermion discretization selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FermionAction {
    /// Nearest-neighbour Wilson fermions.
    #[default]
    Wilson,
    /// Hamber-Wu next-to-nearest-neighbour improvement.
    HamberWu,
    /// Naik three-hop improvement.
    Naik,
    /// Shamir domain-wall fermions over a 4D kernel.
    DomainWall,
}

impl FermionAction {
    /// Decode an integer selector (0-3). Unknown codes fall back to Wilson
    /// with a warning.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Wilson,
            1 => Self::HamberWu,
            2 => Self::Naik,
            3 => Self::DomainWall,
            other => {
                log::warn!("unknown fermion action code {other}, using Wilson");
                Self::Wilson
            }
        }
    }

    /// Decode a selector name. Unknown names fall back to Wilson with a
    /// warning.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "wilson" => Self::Wilson,
            "hamber_wu" | "hamberwu" => Self::HamberWu,
            "naik" => Self::Naik,
            "domain_wall" | "dwf" => Self::DomainWall,
            other => {
                log::warn!("unknown fermion action {other:?}, using Wilson");
                Self::Wilson
            }
        }
    }

    /// `(n, a, b)` hop terms of a 4D kernel.
    #[must_use]
    pub fn hop_terms(self) -> &'static [(usize, f64, f64)] {
        match self {
            Self::Wilson | Self::DomainWall => &[(1, 1.0, 1.0)],
            Self::HamberWu => &[(1, 1.0, 4.0 / 3.0), (2, 0.0, -1.0 / 6.0)],
            Self::Naik => &[(1, 1.0, 9.0 / 8.0), (3, 0.0, -1.0 / 24.0)],
        }
    }
}

deserialize_via_selector!(FermionAction);

/// Operator parameters, fixed for the operator's lifetime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiracParams {
    /// Bare quark mass.
    pub mass: f64,
    /// Phase per boundary crossing, per direction.
    pub boundary_phases: [Complex64; N_DIM],
    /// Bare anisotropy χ.
    pub chi: f64,
    /// Temporal tadpole factor.
    pub ut: f64,
    /// Spatial tadpole factor.
    pub us: f64,
    /// Solve through the even-odd Schur complement.
    pub precondition: bool,
    /// `apply` returns Γ5·D.
    pub hermitian: bool,
    /// Domain-wall height.
    pub m5: f64,
    /// Fifth-dimension extent.
    pub ls: usize,
    /// 4D kernel of the domain-wall operator.
    pub dwf_kernel: FermionAction,
}

impl Default for DiracParams {
    fn default() -> Self {
        Self {
            mass: 0.1,
            boundary_phases: [
                Complex64::new(-1.0, 0.0),
                Complex64::new(1.0, 0.0),
                Complex64::new(1.0, 0.0),
                Complex64::new(1.0, 0.0),
            ],
            chi: 1.0,
            ut: 1.0,
            us: 1.0,
            precondition: false,
            hermitian: false,
            m5: 1.8,
            ls: 4,
            dwf_kernel: FermionAction::Wilson,
        }
    }
}

impl DiracParams {
    /// Periodic boundary phases in every direction.
    #[must_use]
    pub fn periodic(mut self) -> Self {
        self.boundary_phases = [Complex64::new(1.0, 0.0); N_DIM];
        self
    }

    /// Check parameter ranges.
    ///
    /// # Errors
    ///
    /// [`LatticeError::InvalidParameter`] naming the offending field.
    pub fn validate(&self) -> Result<(), LatticeError> {
        if !self.mass.is_finite() || !self.m5.is_finite() {
            return Err(LatticeError::InvalidParameter(
                "masses must be finite".into(),
            ));
        }
        for (name, v) in [("chi", self.chi), ("ut", self.ut), ("us", self.us)] {
            if !v.is_finite() || v <= 0.0 {
                return Err(LatticeError::InvalidParameter(format!(
                    "{name} must be positive, got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Reject wrong-sized input with a warning.
pub(crate) fn check_size(psi: &[Complex64], size: usize, what: &str) -> bool {
    if psi.len() == size {
        true
    } else {
        log::warn!("{what}: input length {} does not match {size}", psi.len());
        false
    }
}

/// One hop term tabulated over the lattice. Index `d < 4` is the backward
/// hop along `d`, `d + 4` the forward hop.
#[derive(Clone, Debug)]
struct HopTable {
    spin: [SpinMatrix; 2 * N_DIM],
    spin_dagger: [SpinMatrix; 2 * N_DIM],
    neighbours: Vec<[usize; 2 * N_DIM]>,
    phases: Vec<[Complex64; 2 * N_DIM]>,
    links: Vec<[Su3Matrix; 2 * N_DIM]>,
}

fn crossing_phase(bc: Complex64, crossings: usize) -> Complex64 {
    let mut phase = Complex64::new(1.0, 0.0);
    for _ in 0..crossings {
        phase *= bc;
    }
    phase
}

impl HopTable {
    fn new(field: &GaugeField, params: &DiracParams, hops: usize, a: f64, b: f64) -> Self {
        let layout = field.layout();
        let shape = field.shape();
        let tadpoles = [params.ut, params.us, params.us, params.us];
        let id = spin_identity();
        let mut spin = [[[C0; N_SPINS]; N_SPINS]; 2 * N_DIM];
        let mut spin_dagger = spin;
        for mu in 0..N_DIM {
            #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
            let weight = -0.5 / tadpoles[mu].powi(hops as i32);
            let minus = spin_combine(a * weight, &id, -b * weight, &gamma(mu));
            let plus = spin_combine(a * weight, &id, b * weight, &gamma(mu));
            spin[mu] = minus;
            spin[mu + N_DIM] = plus;
            spin_dagger[mu] = plus;
            spin_dagger[mu + N_DIM] = minus;
        }

        let volume = field.volume();
        let mut neighbours = Vec::with_capacity(volume);
        let mut phases = Vec::with_capacity(volume);
        let mut links = Vec::with_capacity(volume);
        #[allow(clippy::cast_possible_wrap)]
        let n = hops as isize;
        for x in 0..volume {
            let site = layout.site_coords(x);
            let mut nb = [0; 2 * N_DIM];
            let mut ph = [C0; 2 * N_DIM];
            let mut lk = [Su3Matrix::IDENTITY; 2 * N_DIM];
            for mu in 0..N_DIM {
                let extent = shape[mu];
                nb[mu] = layout.shift_index(x, mu, -n);
                nb[mu + N_DIM] = layout.shift_index(x, mu, n);
                let back_crossings = if site[mu] >= hops {
                    0
                } else {
                    (hops - site[mu]).div_ceil(extent)
                };
                let fwd_crossings = (site[mu] + hops) / extent;
                ph[mu] = crossing_phase(params.boundary_phases[mu].conj(), back_crossings);
                ph[mu + N_DIM] = crossing_phase(params.boundary_phases[mu], fwd_crossings);
                let back: Vec<Step> = vec![Step::bwd(mu); hops];
                let fwd: Vec<Step> = vec![Step::fwd(mu); hops];
                lk[mu] = path_product(field, &site, &back);
                lk[mu + N_DIM] = path_product(field, &site, &fwd);
            }
            neighbours.push(nb);
            phases.push(ph);
            links.push(lk);
        }
        Self {
            spin,
            spin_dagger,
            neighbours,
            phases,
            links,
        }
    }
}

/// Wilson, Hamber-Wu or Naik operator on one gauge field.
#[derive(Clone, Debug)]
pub struct WilsonKernel<'a> {
    field: &'a GaugeField,
    kind: FermionAction,
    mass: f64,
    diagonal: f64,
    hermitian: bool,
    terms: Vec<HopTable>,
    even_odd: bool,
}

impl<'a> WilsonKernel<'a> {
    /// Tabulate the `kind` kernel at bare mass `mass`.
    ///
    /// # Errors
    ///
    /// [`LatticeError::InvalidParameter`] for out-of-range parameters or a
    /// domain-wall `kind`.
    pub fn new(
        kind: FermionAction,
        field: &'a GaugeField,
        mass: f64,
        params: &DiracParams,
    ) -> Result<Self, LatticeError> {
        params.validate()?;
        if kind == FermionAction::DomainWall {
            return Err(LatticeError::InvalidParameter(
                "domain-wall is not a 4D kernel".into(),
            ));
        }
        let terms = kind
            .hop_terms()
            .iter()
            .map(|&(n, a, b)| HopTable::new(field, params, n, a, b))
            .collect();
        let even_extents = field.shape().iter().all(|&n| n % 2 == 0);
        Ok(Self {
            field,
            kind,
            mass,
            diagonal: 1.0 + 3.0 / params.chi + mass,
            hermitian: params.hermitian,
            terms,
            even_odd: even_extents && kind != FermionAction::HamberWu,
        })
    }

    /// Gauge field the operator was built on.
    #[must_use]
    pub const fn field(&self) -> &'a GaugeField {
        self.field
    }

    /// Kernel type.
    #[must_use]
    pub const fn kind(&self) -> FermionAction {
        self.kind
    }

    /// Bare mass.
    #[must_use]
    pub const fn mass(&self) -> f64 {
        self.mass
    }

    /// Site-diagonal coefficient `1 + 3/χ + m`.
    #[must_use]
    pub const fn diagonal(&self) -> f64 {
        self.diagonal
    }

    /// Number of lattice sites.
    #[must_use]
    pub fn volume(&self) -> usize {
        self.field.volume()
    }

    /// Hopping sum at site `x` from a full 4D field.
    pub(crate) fn hop_site(&self, x: usize, psi: &[Complex64], dagger: bool) -> SiteSpinor {
        let mut acc = [C0; SPINOR_SITE];
        for term in &self.terms {
            let spins = if dagger { &term.spin_dagger } else { &term.spin };
            let nb = &term.neighbours[x];
            let ph = &term.phases[x];
            let lk = &term.links[x];
            for d in 0..2 * N_DIM {
                let base = SPINOR_SITE * nb[d];
                let mut transported = [C0; SPINOR_SITE];
                for s in 0..N_SPINS {
                    let off = base + N_COLORS * s;
                    let v = [psi[off], psi[off + 1], psi[off + 2]];
                    let w = lk[d].mul_vec(&v);
                    for c in 0..N_COLORS {
                        transported[N_COLORS * s + c] = ph[d] * w[c];
                    }
                }
                let hopped = spin_apply(&spins[d], &transported);
                for (a, h) in acc.iter_mut().zip(&hopped) {
                    *a += h;
                }
            }
        }
        acc
    }

    /// `D ψ` or `D† ψ` on a full 4D field, with the diagonal scaled to
    /// `diagonal`.
    pub(crate) fn apply_kernel(&self, psi: &[Complex64], diagonal: f64, dagger: bool) -> Vec<Complex64> {
        let mut out = vec![C0; psi.len()];
        out.par_chunks_mut(SPINOR_SITE)
            .enumerate()
            .for_each(|(x, chunk)| {
                let hop = self.hop_site(x, psi, dagger);
                let own = &psi[SPINOR_SITE * x..SPINOR_SITE * (x + 1)];
                for k in 0..SPINOR_SITE {
                    chunk[k] = own[k] * diagonal + hop[k];
                }
            });
        out
    }

    /// Hopping part from a half field of parity `from` into the opposite
    /// parity's half.
    pub(crate) fn hop_half(&self, psi_half: &[Complex64], from: Parity, dagger: bool) -> Vec<Complex64> {
        let layout = self.field.layout();
        let full = scatter_half(layout.parity_sites(from), psi_half, self.volume());
        let targets = layout.parity_sites(from.flip());
        let mut out = vec![C0; SPINOR_SITE * targets.len()];
        out.par_chunks_mut(SPINOR_SITE)
            .zip(targets.par_iter())
            .for_each(|(chunk, &x)| {
                chunk.copy_from_slice(&self.hop_site(x, &full, dagger));
            });
        out
    }

    fn half_check(&self, psi: &[Complex64], what: &str) -> bool {
        if !self.even_odd {
            log::warn!("{what}: {:?} kernel has no even-odd block structure", self.kind);
            return false;
        }
        check_size(psi, self.half_size(), what)
    }
}

/// Gather the sites `sites` of a full field into a half field.
pub(crate) fn gather_half(sites: &[usize], psi: &[Complex64]) -> Vec<Complex64> {
    let mut out = Vec::with_capacity(SPINOR_SITE * sites.len());
    for &x in sites {
        out.extend_from_slice(&psi[SPINOR_SITE * x..SPINOR_SITE * (x + 1)]);
    }
    out
}

/// Spread a half field over the sites `sites` of a zeroed full field.
pub(crate) fn scatter_half(sites: &[usize], half: &[Complex64], volume: usize) -> Vec<Complex64> {
    let mut full = vec![C0; SPINOR_SITE * volume];
    for (k, &x) in sites.iter().enumerate() {
        full[SPINOR_SITE * x..SPINOR_SITE * (x + 1)]
            .copy_from_slice(&half[SPINOR_SITE * k..SPINOR_SITE * (k + 1)]);
    }
    full
}

/// `s ψ` for a vector of length `size`; zeros otherwise.
pub(crate) fn scaled(psi: &[Complex64], s: f64, size: usize, what: &str) -> Vec<Complex64> {
    if !check_size(psi, size, what) {
        return vec![C0; size];
    }
    psi.iter().map(|v| v * s).collect()
}

impl LinearOperator for WilsonKernel<'_> {
    fn size(&self) -> usize {
        SPINOR_SITE * self.volume()
    }

    fn apply(&self, psi: &[Complex64]) -> Vec<Complex64> {
        if !check_size(psi, self.size(), "apply") {
            return vec![C0; self.size()];
        }
        let mut eta = self.apply_kernel(psi, self.diagonal, false);
        if self.hermitian {
            gamma5_in_place(&mut eta);
        }
        eta
    }

    fn apply_dagger(&self, psi: &[Complex64]) -> Vec<Complex64> {
        if !check_size(psi, self.size(), "apply_dagger") {
            return vec![C0; self.size()];
        }
        if self.hermitian {
            let mut g5psi = psi.to_vec();
            gamma5_in_place(&mut g5psi);
            self.apply_kernel(&g5psi, self.diagonal, true)
        } else {
            self.apply_kernel(psi, self.diagonal, true)
        }
    }

    fn make_hermitian(&self, psi: &[Complex64]) -> Vec<Complex64> {
        if !check_size(psi, self.size(), "make_hermitian") {
            return vec![C0; self.size()];
        }
        let mut eta = psi.to_vec();
        gamma5_in_place(&mut eta);
        eta
    }

    fn is_hermitian(&self) -> bool {
        self.hermitian
    }
}

impl EvenOddOperator for WilsonKernel<'_> {
    fn supports_even_odd(&self) -> bool {
        self.even_odd
    }

    fn apply_even_odd(&self, psi_odd: &[Complex64]) -> Vec<Complex64> {
        if !self.half_check(psi_odd, "apply_even_odd") {
            return vec![C0; self.half_size()];
        }
        self.hop_half(psi_odd, Parity::Odd, false)
    }

    fn apply_odd_even(&self, psi_even: &[Complex64]) -> Vec<Complex64> {
        if !self.half_check(psi_even, "apply_odd_even") {
            return vec![C0; self.half_size()];
        }
        self.hop_half(psi_even, Parity::Even, false)
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
        if !self.half_check(psi_even, "apply_even_odd_dagger") {
            return vec![C0; self.half_size()];
        }
        self.hop_half(psi_even, Parity::Even, true)
    }

    fn apply_odd_even_dagger(&self, psi_odd: &[Complex64]) -> Vec<Complex64> {
        if !self.half_check(psi_odd, "apply_odd_even_dagger") {
            return vec![C0; self.half_size()];
        }
        self.hop_half(psi_odd, Parity::Odd, true)
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
        let layout = self.field.layout();
        let mut eo = gather_half(layout.parity_sites(Parity::Even), psi);
        eo.extend(gather_half(layout.parity_sites(Parity::Odd), psi));
        eo
    }

    fn remove_even_odd(&self, psi: &[Complex64]) -> Vec<Complex64> {
        if !check_size(psi, self.size(), "remove_even_odd") {
            return vec![C0; self.size()];
        }
        let layout = self.field.layout();
        let even = layout.parity_sites(Parity::Even);
        let odd = layout.parity_sites(Parity::Odd);
        let split = SPINOR_SITE * even.len();
        let mut full = scatter_half(even, &psi[..split], self.volume());
        for (k, &x) in odd.iter().enumerate() {
            full[SPINOR_SITE * x..SPINOR_SITE * (x + 1)]
                .copy_from_slice(&psi[split + SPINOR_SITE * k..split + SPINOR_SITE * (k + 1)]);
        }
        full
    }
}

/// A Dirac operator of any supported discretization.
#[derive(Clone, Debug)]
pub enum DiracOperator<'a> {
    /// Wilson fermions.
    Wilson(WilsonKernel<'a>),
    /// Hamber-Wu fermions.
    HamberWu(WilsonKernel<'a>),
    /// Naik-improved fermions.
    Naik(WilsonKernel<'a>),
    /// Shamir domain-wall fermions.
    DomainWall(DomainWall<'a>),
}

impl<'a> DiracOperator<'a> {
    /// Build the operator for `action` on `field`.
    ///
    /// # Errors
    ///
    /// [`LatticeError::InvalidParameter`] for out-of-range parameters.
    pub fn new(
        action: FermionAction,
        field: &'a GaugeField,
        params: &DiracParams,
    ) -> Result<Self, LatticeError> {
        Ok(match action {
            FermionAction::Wilson => {
                Self::Wilson(WilsonKernel::new(action, field, params.mass, params)?)
            }
            FermionAction::HamberWu => {
                Self::HamberWu(WilsonKernel::new(action, field, params.mass, params)?)
            }
            FermionAction::Naik => Self::Naik(WilsonKernel::new(action, field, params.mass, params)?),
            FermionAction::DomainWall => Self::DomainWall(DomainWall::new(field, params)?),
        })
    }

    /// Discretization of this operator.
    #[must_use]
    pub const fn action(&self) -> FermionAction {
        match self {
            Self::Wilson(_) => FermionAction::Wilson,
            Self::HamberWu(_) => FermionAction::HamberWu,
            Self::Naik(_) => FermionAction::Naik,
            Self::DomainWall(_) => FermionAction::DomainWall,
        }
    }

    fn inner(&self) -> &dyn EvenOddOperator {
        match self {
            Self::Wilson(k) | Self::HamberWu(k) | Self::Naik(k) => k,
            Self::DomainWall(d) => d,
        }
    }
}

impl LinearOperator for DiracOperator<'_> {
    fn size(&self) -> usize {
        self.inner().size()
    }

    fn apply(&self, psi: &[Complex64]) -> Vec<Complex64> {
        self.inner().apply(psi)
    }

    fn apply_dagger(&self, psi: &[Complex64]) -> Vec<Complex64> {
        self.inner().apply_dagger(psi)
    }

    fn make_hermitian(&self, psi: &[Complex64]) -> Vec<Complex64> {
        self.inner().make_hermitian(psi)
    }

    fn is_hermitian(&self) -> bool {
        self.inner().is_hermitian()
    }

    fn apply_hermitian(&self, psi: &[Complex64]) -> Vec<Complex64> {
        self.inner().apply_hermitian(psi)
    }
}

impl EvenOddOperator for DiracOperator<'_> {
    fn supports_even_odd(&self) -> bool {
        self.inner().supports_even_odd()
    }

    fn apply_even_odd(&self, psi: &[Complex64]) -> Vec<Complex64> {
        self.inner().apply_even_odd(psi)
    }

    fn apply_odd_even(&self, psi: &[Complex64]) -> Vec<Complex64> {
        self.inner().apply_odd_even(psi)
    }

    fn apply_even_even(&self, psi: &[Complex64]) -> Vec<Complex64> {
        self.inner().apply_even_even(psi)
    }

    fn apply_odd_odd(&self, psi: &[Complex64]) -> Vec<Complex64> {
        self.inner().apply_odd_odd(psi)
    }

    fn apply_even_even_inv(&self, psi: &[Complex64]) -> Vec<Complex64> {
        self.inner().apply_even_even_inv(psi)
    }

    fn apply_even_odd_dagger(&self, psi: &[Complex64]) -> Vec<Complex64> {
        self.inner().apply_even_odd_dagger(psi)
    }

    fn apply_odd_even_dagger(&self, psi: &[Complex64]) -> Vec<Complex64> {
        self.inner().apply_odd_even_dagger(psi)
    }

    fn apply_even_even_dagger(&self, psi: &[Complex64]) -> Vec<Complex64> {
        self.inner().apply_even_even_dagger(psi)
    }

    fn apply_odd_odd_dagger(&self, psi: &[Complex64]) -> Vec<Complex64> {
        self.inner().apply_odd_odd_dagger(psi)
    }

    fn apply_even_even_inv_dagger(&self, psi: &[Complex64]) -> Vec<Complex64> {
        self.inner().apply_even_even_inv_dagger(psi)
    }

    fn make_even_odd(&self, psi: &[Complex64]) -> Vec<Complex64> {
        self.inner().make_even_odd(psi)
    }

    fn remove_even_odd(&self, psi: &[Complex64]) -> Vec<Complex64> {
        self.inner().remove_even_odd(psi)
    }

    fn half_size(&self) -> usize {
        self.inner().half_size()
    }

    fn gamma5_flips_parity(&self) -> bool {
        self.inner().gamma5_flips_parity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::spinor::{dot, norm_sq, random_spinor};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn hot_field() -> GaugeField {
        let mut rng = ChaCha8Rng::seed_from_u64(31);
        GaugeField::hot_start(&[4, 4, 4, 4], &[2, 2, 2, 2], &mut rng).unwrap()
    }

    const KERNELS: [FermionAction; 3] = [
        FermionAction::Wilson,
        FermionAction::HamberWu,
        FermionAction::Naik,
    ];

    #[test]
    fn free_field_constant_mode() {
        let field = GaugeField::cold_start(&[4, 4, 4, 4], &[2, 2, 2, 2]).unwrap();
        let params = DiracParams {
            mass: 0.37,
            ..DiracParams::default().periodic()
        };
        for kind in KERNELS {
            let op = WilsonKernel::new(kind, &field, params.mass, &params).unwrap();
            let mut rng = ChaCha8Rng::seed_from_u64(1);
            let site = random_spinor(SPINOR_SITE, &mut rng);
            let psi: Vec<Complex64> = site.iter().copied().cycle().take(op.size()).collect();
            let eta = op.apply(&psi);
            for (e, p) in eta.iter().zip(&psi) {
                assert!((e - p * 0.37).norm() < 1e-12, "{kind:?}");
            }
        }
    }

    #[test]
    fn dagger_is_adjoint() {
        let field = hot_field();
        let params = DiracParams::default();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        for kind in KERNELS {
            let op = DiracOperator::new(kind, &field, &params).unwrap();
            let x = random_spinor(op.size(), &mut rng);
            let y = random_spinor(op.size(), &mut rng);
            let lhs = dot(&y, &op.apply(&x));
            let rhs = dot(&op.apply_dagger(&y), &x);
            assert!((lhs - rhs).norm() < 1e-9 * lhs.norm().max(1.0), "{kind:?}");
        }
    }

    #[test]
    fn gamma5_hermiticity() {
        let field = hot_field();
        let params = DiracParams {
            boundary_phases: [
                Complex64::from_polar(1.0, 0.3),
                Complex64::new(1.0, 0.0),
                Complex64::new(-1.0, 0.0),
                Complex64::new(1.0, 0.0),
            ],
            ..DiracParams::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        for kind in KERNELS {
            let op = DiracOperator::new(kind, &field, &params).unwrap();
            let x = random_spinor(op.size(), &mut rng);
            let y = random_spinor(op.size(), &mut rng);
            let lhs = dot(&y, &op.apply_hermitian(&x));
            let rhs = dot(&op.apply_hermitian(&y), &x);
            assert!((lhs - rhs).norm() < 1e-9 * lhs.norm().max(1.0), "{kind:?}");
            let via_make = op.make_hermitian(&op.apply(&x));
            assert_eq!(via_make, op.apply_hermitian(&x));
        }
    }

    #[test]
    fn hermitian_flag_applies_gamma5() {
        let field = hot_field();
        let plain = DiracParams::default();
        let herm = DiracParams {
            hermitian: true,
            ..DiracParams::default()
        };
        let d = DiracOperator::new(FermionAction::Wilson, &field, &plain).unwrap();
        let h = DiracOperator::new(FermionAction::Wilson, &field, &herm).unwrap();
        assert!(h.is_hermitian());
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let x = random_spinor(d.size(), &mut rng);
        assert_eq!(h.apply(&x), d.apply_hermitian(&x));
        let hx = h.apply(&x);
        let hdx = h.apply_dagger(&x);
        let diff: f64 = hx.iter().zip(&hdx).map(|(a, b)| (a - b).norm_sqr()).sum();
        assert!(diff < 1e-18 * norm_sq(&hx));
    }

    #[test]
    fn wrong_size_gives_zeros() {
        let field = hot_field();
        let zeros = |v: Vec<Complex64>, len: usize| v.len() == len && v.iter().all(|x| *x == C0);
        for kind in [FermionAction::Wilson, FermionAction::Naik, FermionAction::DomainWall] {
            let op = DiracOperator::new(kind, &field, &DiracParams::default()).unwrap();
            let (n, h) = (op.size(), op.half_size());
            let short = [Complex64::new(1.0, 0.0); 5];
            let odd_len = vec![Complex64::new(1.0, 0.0); 7];

            assert!(zeros(op.apply(&short), n), "{kind:?}");
            assert!(zeros(op.apply_dagger(&short), n), "{kind:?}");
            assert!(zeros(op.make_hermitian(&odd_len), n), "{kind:?}");
            assert!(zeros(op.make_even_odd(&short), n), "{kind:?}");
            assert!(zeros(op.remove_even_odd(&short), n), "{kind:?}");
            assert!(zeros(op.apply_even_even(&odd_len), h), "{kind:?}");
            assert!(zeros(op.apply_odd_odd(&odd_len), h), "{kind:?}");
            assert!(zeros(op.apply_even_even_inv(&odd_len), h), "{kind:?}");
            assert!(zeros(op.apply_even_odd(&odd_len), h), "{kind:?}");
            assert!(zeros(op.apply_odd_even_dagger(&odd_len), h), "{kind:?}");
            assert!(zeros(op.make_hermitian_odd(&odd_len), h), "{kind:?}");
            assert!(zeros(op.make_even_odd_source(&short), h), "{kind:?}");
            assert!(zeros(op.make_even_odd_solution(&short, &odd_len), n), "{kind:?}");
        }
    }

    #[test]
    fn even_odd_round_trip_and_blocks() {
        let field = hot_field();
        let params = DiracParams::default();
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        for kind in [FermionAction::Wilson, FermionAction::Naik] {
            let op = DiracOperator::new(kind, &field, &params).unwrap();
            assert!(op.supports_even_odd());
            let psi = random_spinor(op.size(), &mut rng);
            let eo = op.make_even_odd(&psi);
            assert_eq!(op.remove_even_odd(&eo), psi);

            let h = op.half_size();
            let (pe, po) = eo.split_at(h);
            let full = op.make_even_odd(&op.apply(&psi));
            let even_out: Vec<Complex64> = op
                .apply_even_even(pe)
                .iter()
                .zip(&op.apply_even_odd(po))
                .map(|(a, b)| a + b)
                .collect();
            let odd_out: Vec<Complex64> = op
                .apply_odd_even(pe)
                .iter()
                .zip(&op.apply_odd_odd(po))
                .map(|(a, b)| a + b)
                .collect();
            for (a, b) in full[..h].iter().zip(&even_out) {
                assert!((a - b).norm() < 1e-12, "{kind:?}");
            }
            for (a, b) in full[h..].iter().zip(&odd_out) {
                assert!((a - b).norm() < 1e-12, "{kind:?}");
            }

            let back = op.apply_even_even_inv(&op.apply_even_even(pe));
            for (a, b) in back.iter().zip(pe) {
                assert!((a - b).norm() < 1e-13);
            }

            let ye = random_spinor(h, &mut rng);
            let lhs = dot(&ye, &op.apply_even_odd(po));
            let rhs = dot(&op.apply_even_odd_dagger(&ye), po);
            assert!((lhs - rhs).norm() < 1e-9 * lhs.norm().max(1.0));
        }
    }

    #[test]
    fn hamber_wu_has_no_even_odd() {
        let field = hot_field();
        let op =
            DiracOperator::new(FermionAction::HamberWu, &field, &DiracParams::default()).unwrap();
        assert!(!op.supports_even_odd());
    }

    #[test]
    fn selectors_and_validation() {
        assert_eq!(FermionAction::from_code(2), FermionAction::Naik);
        assert_eq!(FermionAction::from_code(9), FermionAction::Wilson);
        assert_eq!(FermionAction::from_name("dwf"), FermionAction::DomainWall);
        let bad = DiracParams {
            us: -1.0,
            ..DiracParams::default()
        };
        let field = hot_field();
        assert!(DiracOperator::new(FermionAction::Wilson, &field, &bad).is_err());

        let no_fifth_dimension = DiracParams {
            ls: 0,
            ..DiracParams::default()
        };
        for kind in KERNELS {
            assert!(DiracOperator::new(kind, &field, &no_fifth_dimension).is_ok(), "{kind:?}");
        }
        assert!(matches!(
            DiracOperator::new(FermionAction::DomainWall, &field, &no_fifth_dimension),
            Err(LatticeError::InvalidParameter(_))
        ));
    }
}
