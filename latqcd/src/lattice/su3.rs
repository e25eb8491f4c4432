// SPDX-License-Identifier: AGPL-3.0-only

//! SU(3) matrix operations for lattice gauge theory.
//!
//! An SU(3) matrix is a 3×3 unitary matrix with determinant 1.
//! Each link variable `U_μ(x)` is an SU(3) matrix representing the
//! parallel transporter along direction μ from site x.
//!
//! Storage: row-major, 9 `Complex64` values (18 f64).
//!
//! # References
//!
//! - Gattringer & Lang, "Quantum Chromodynamics on the Lattice" (2010), Ch. 2, 4
//! - Cabibbo & Marinari, Phys. Lett. B 119, 387 (1982)

use std::ops::{Add, AddAssign, Mul, Sub};

use num_complex::Complex64;
use rand::Rng;

use super::constants::{LATTICE_DIVISION_GUARD, N_COLORS};

const C0: Complex64 = Complex64::new(0.0, 0.0);
const C1: Complex64 = Complex64::new(1.0, 0.0);

/// A colour vector: one spin component of a spinor at one site.
pub type ColorVector = [Complex64; N_COLORS];

/// 3×3 complex matrix: SU(3) link variable, staple sum, or algebra element.
///
/// Row-major storage: `m[row][col]`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[must_use]
pub struct Su3Matrix {
    /// Matrix elements m[row][col].
    pub m: [[Complex64; 3]; 3],
}

impl Mul for Su3Matrix {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        let mut r = Self::ZERO;
        for i in 0..3 {
            for j in 0..3 {
                r.m[i][j] = self.m[i][0] * rhs.m[0][j]
                    + self.m[i][1] * rhs.m[1][j]
                    + self.m[i][2] * rhs.m[2][j];
            }
        }
        r
    }
}

impl Mul<f64> for Su3Matrix {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        self.scale(rhs)
    }
}

impl Mul<Complex64> for Su3Matrix {
    type Output = Self;
    fn mul(self, rhs: Complex64) -> Self {
        self.scale_complex(rhs)
    }
}

impl Add for Su3Matrix {
    type Output = Self;
    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for Su3Matrix {
    fn add_assign(&mut self, rhs: Self) {
        for (row, rrow) in self.m.iter_mut().zip(rhs.m) {
            for (a, b) in row.iter_mut().zip(rrow) {
                *a += b;
            }
        }
    }
}

impl Sub for Su3Matrix {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self + rhs.scale(-1.0)
    }
}

impl Su3Matrix {
    /// 3×3 identity matrix.
    pub const IDENTITY: Self = Self {
        m: [[C1, C0, C0], [C0, C1, C0], [C0, C0, C1]],
    };

    /// Zero matrix.
    pub const ZERO: Self = Self { m: [[C0; 3]; 3] };

    /// Conjugate transpose.
    pub fn adjoint(self) -> Self {
        let mut r = Self::ZERO;
        for i in 0..3 {
            for j in 0..3 {
                r.m[i][j] = self.m[j][i].conj();
            }
        }
        r
    }

    /// Tr(U).
    #[must_use]
    pub fn trace(self) -> Complex64 {
        self.m[0][0] + self.m[1][1] + self.m[2][2]
    }

    /// Re Tr(U).
    #[must_use]
    pub fn re_trace(self) -> f64 {
        self.m[0][0].re + self.m[1][1].re + self.m[2][2].re
    }

    /// Re Tr(self · rhs) without forming the product.
    #[must_use]
    pub fn re_trace_mul(&self, rhs: &Self) -> f64 {
        let mut s = 0.0;
        for i in 0..3 {
            for k in 0..3 {
                let a = self.m[i][k];
                let b = rhs.m[k][i];
                s += a.re * b.re - a.im * b.im;
            }
        }
        s
    }

    /// Determinant.
    #[must_use]
    pub fn det(self) -> Complex64 {
        let m = &self.m;
        let a = m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1]);
        let b = m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0]);
        let c = m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);
        a - b + c
    }

    /// Scale by a real number.
    pub fn scale(self, s: f64) -> Self {
        let mut r = self;
        for row in &mut r.m {
            for v in row {
                *v *= s;
            }
        }
        r
    }

    /// Scale by a complex number.
    pub fn scale_complex(self, s: Complex64) -> Self {
        let mut r = self;
        for row in &mut r.m {
            for v in row {
                *v *= s;
            }
        }
        r
    }

    /// Frobenius norm squared.
    #[must_use]
    pub fn norm_sq(self) -> f64 {
        self.m.iter().flatten().map(Complex64::norm_sqr).sum()
    }

    /// `U · v`.
    #[must_use]
    pub fn mul_vec(&self, v: &ColorVector) -> ColorVector {
        let mut r = [C0; 3];
        for (i, ri) in r.iter_mut().enumerate() {
            *ri = self.m[i][0] * v[0] + self.m[i][1] * v[1] + self.m[i][2] * v[2];
        }
        r
    }

    /// `U† · v`.
    #[must_use]
    pub fn adjoint_mul_vec(&self, v: &ColorVector) -> ColorVector {
        let mut r = [C0; 3];
        for (i, ri) in r.iter_mut().enumerate() {
            *ri = self.m[0][i].conj() * v[0]
                + self.m[1][i].conj() * v[1]
                + self.m[2][i].conj() * v[2];
        }
        r
    }

    /// Largest deviation from SU(3): ‖U U† − 1‖_max + |det U − 1|.
    #[must_use]
    pub fn su3_deviation(self) -> f64 {
        let p = self * self.adjoint();
        let mut dev: f64 = 0.0;
        for i in 0..3 {
            for j in 0..3 {
                let target = if i == j { C1 } else { C0 };
                dev = dev.max((p.m[i][j] - target).norm());
            }
        }
        dev + (self.det() - C1).norm()
    }

    /// Project back onto SU(3) by Gram-Schmidt on the first two rows.
    ///
    /// Row 2 is the conjugated cross product of rows 0 and 1, which fixes
    /// det = 1.
    pub fn reunitarize(self) -> Self {
        let mut u = self;

        let n0 = row_norm(&u, 0);
        if n0 > LATTICE_DIVISION_GUARD {
            for j in 0..3 {
                u.m[0][j] /= n0;
            }
        }

        let dot01 = row_dot(&u, 0, 1);
        for j in 0..3 {
            let v = u.m[0][j] * dot01;
            u.m[1][j] -= v;
        }
        let n1 = row_norm(&u, 1);
        if n1 > LATTICE_DIVISION_GUARD {
            for j in 0..3 {
                u.m[1][j] /= n1;
            }
        }

        u.m[2][0] = (u.m[0][1] * u.m[1][2] - u.m[0][2] * u.m[1][1]).conj();
        u.m[2][1] = (u.m[0][2] * u.m[1][0] - u.m[0][0] * u.m[1][2]).conj();
        u.m[2][2] = (u.m[0][0] * u.m[1][1] - u.m[0][1] * u.m[1][0]).conj();

        u
    }

    /// Random traceless Hermitian matrix with Gaussian components of width
    /// `sigma` along each Gell-Mann generator.
    pub fn random_hermitian<R: Rng + ?Sized>(rng: &mut R, sigma: f64) -> Self {
        let mut h = Self::ZERO;
        let a3 = sigma * gaussian(rng);
        let a8 = sigma * gaussian(rng) / 3.0_f64.sqrt();
        h.m[0][0] = Complex64::new(a3 + a8, 0.0);
        h.m[1][1] = Complex64::new(-a3 + a8, 0.0);
        h.m[2][2] = Complex64::new(-2.0 * a8, 0.0);
        for (i, j) in [(0, 1), (0, 2), (1, 2)] {
            let re = sigma * gaussian(rng);
            let im = sigma * gaussian(rng);
            h.m[i][j] = Complex64::new(re, im);
            h.m[j][i] = Complex64::new(re, -im);
        }
        h
    }

    /// Random SU(3) element `exp(iεH)` close to the identity.
    pub fn random_near_identity<R: Rng + ?Sized>(rng: &mut R, epsilon: f64) -> Self {
        Self::random_hermitian(rng, epsilon).exp_i()
    }

    /// Haar-distributed random SU(3) element.
    ///
    /// Gram-Schmidt on a matrix of independent complex Gaussians gives rows
    /// uniform on the Stiefel manifold; completing with the conjugated cross
    /// product lands uniformly on SU(3).
    pub fn random_haar<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut g = Self::ZERO;
        for row in &mut g.m {
            for v in row {
                *v = Complex64::new(gaussian(rng), gaussian(rng));
            }
        }
        g.reunitarize()
    }

    /// `exp(iQ)` for Hermitian Q, by scaling and squaring a Taylor series.
    ///
    /// The result is reunitarized so round-off never leaves SU(3) when Q is
    /// traceless.
    pub fn exp_i(self) -> Self {
        let norm = self.norm_sq().sqrt();
        let mut squarings = 0;
        let mut scale = 1.0;
        while norm * scale > 0.5 {
            scale *= 0.5;
            squarings += 1;
        }
        let x = self.scale_complex(Complex64::new(0.0, scale));
        let mut sum = Self::IDENTITY;
        let mut term = Self::IDENTITY;
        for k in 1..=EXP_SERIES_TERMS {
            #[allow(clippy::cast_precision_loss)]
            let inv_k = 1.0 / k as f64;
            term = (term * x).scale(inv_k);
            sum += term;
            if term.norm_sq() < EXP_SERIES_CUTOFF {
                break;
            }
        }
        for _ in 0..squarings {
            sum = sum * sum;
        }
        sum.reunitarize()
    }

    /// Embed an SU(2) element `a0 + i a·σ` into the `(p, q)` subgroup.
    pub fn embed_su2(subgroup: (usize, usize), a: [f64; 4]) -> Self {
        let (p, q) = subgroup;
        let mut r = Self::IDENTITY;
        r.m[p][p] = Complex64::new(a[0], a[3]);
        r.m[p][q] = Complex64::new(a[2], a[1]);
        r.m[q][p] = Complex64::new(-a[2], a[1]);
        r.m[q][q] = Complex64::new(a[0], -a[3]);
        r
    }

    /// Quaternion coefficients of the SU(2)-proportional part of the
    /// `(p, q)` sub-block: `w ≈ a0 + i a·σ`.
    #[must_use]
    pub fn su2_projection(&self, subgroup: (usize, usize)) -> [f64; 4] {
        let (p, q) = subgroup;
        let w11 = self.m[p][p];
        let w12 = self.m[p][q];
        let w21 = self.m[q][p];
        let w22 = self.m[q][q];
        [
            0.5 * (w11.re + w22.re),
            0.5 * (w12.im + w21.im),
            0.5 * (w12.re - w21.re),
            0.5 * (w11.im - w22.im),
        ]
    }
}

/// The three SU(2) subgroups used by Cabibbo-Marinari updates.
pub const SU2_SUBGROUPS: [(usize, usize); 3] = [(0, 1), (0, 2), (1, 2)];

const EXP_SERIES_TERMS: usize = 30;
const EXP_SERIES_CUTOFF: f64 = 1e-34;

/// Standard normal deviate (Box-Muller).
pub fn gaussian<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

fn row_norm(u: &Su3Matrix, row: usize) -> f64 {
    u.m[row].iter().map(Complex64::norm_sqr).sum::<f64>().sqrt()
}

fn row_dot(u: &Su3Matrix, r1: usize, r2: usize) -> Complex64 {
    (0..3).map(|j| u.m[r1][j].conj() * u.m[r2][j]).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn max_diff(a: Su3Matrix, b: Su3Matrix) -> f64 {
        let mut d: f64 = 0.0;
        for i in 0..3 {
            for j in 0..3 {
                d = d.max((a.m[i][j] - b.m[i][j]).norm());
            }
        }
        d
    }

    #[test]
    fn identity_properties() {
        let i = Su3Matrix::IDENTITY;
        assert!((i.det() - C1).norm() < 1e-14);
        assert!((i.re_trace() - 3.0).abs() < 1e-14);
        assert!(i.su3_deviation() < 1e-14);
    }

    #[test]
    fn random_elements_are_special_unitary() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..50 {
            let u = Su3Matrix::random_haar(&mut rng);
            assert!(u.su3_deviation() < 1e-12, "haar: {}", u.su3_deviation());
            let v = Su3Matrix::random_near_identity(&mut rng, 0.24);
            assert!(v.su3_deviation() < 1e-12, "near id: {}", v.su3_deviation());
        }
    }

    #[test]
    fn near_identity_is_close_to_identity() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let u = Su3Matrix::random_near_identity(&mut rng, 0.01);
        assert!(u.re_trace() > 2.99);
    }

    #[test]
    fn re_trace_mul_matches_product() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let a = Su3Matrix::random_haar(&mut rng);
        let b = Su3Matrix::random_haar(&mut rng).scale(1.7);
        assert!((a.re_trace_mul(&b) - (a * b).re_trace()).abs() < 1e-13);
    }

    #[test]
    fn matrix_vector_products_agree_with_adjoint() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let u = Su3Matrix::random_haar(&mut rng);
        let v = [
            Complex64::new(0.3, -1.0),
            Complex64::new(2.0, 0.5),
            Complex64::new(-0.7, 0.1),
        ];
        let a = u.adjoint_mul_vec(&v);
        let b = u.adjoint().mul_vec(&v);
        for k in 0..3 {
            assert!((a[k] - b[k]).norm() < 1e-14);
        }
        let back = u.mul_vec(&a);
        for k in 0..3 {
            assert!((back[k] - v[k]).norm() < 1e-13);
        }
    }

    #[test]
    fn exp_of_diagonal_generator() {
        let mut h = Su3Matrix::ZERO;
        h.m[0][0] = Complex64::new(0.4, 0.0);
        h.m[1][1] = Complex64::new(-0.1, 0.0);
        h.m[2][2] = Complex64::new(-0.3, 0.0);
        let e = h.exp_i();
        for (k, phase) in [0.4_f64, -0.1, -0.3].iter().enumerate() {
            assert!((e.m[k][k] - Complex64::from_polar(1.0, *phase)).norm() < 1e-12);
        }
    }

    #[test]
    fn exp_of_large_generator_is_unitary() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let h = Su3Matrix::random_hermitian(&mut rng, 3.0);
        let e = h.exp_i();
        assert!(e.su3_deviation() < 1e-10);
        let inverse = h.scale(-1.0).exp_i();
        assert!(max_diff(e * inverse, Su3Matrix::IDENTITY) < 1e-10);
    }

    #[test]
    fn su2_embedding_round_trip() {
        let a = [0.6, 0.0, 0.8, 0.0];
        for sub in SU2_SUBGROUPS {
            let r = Su3Matrix::embed_su2(sub, a);
            assert!(r.su3_deviation() < 1e-14);
            let back = r.su2_projection(sub);
            for k in 0..4 {
                assert!((back[k] - a[k]).abs() < 1e-14);
            }
        }
    }

    #[test]
    fn su2_projection_of_general_quaternion() {
        let norm = (0.1_f64 * 0.1 + 0.2 * 0.2 + 0.3 * 0.3 + 0.9 * 0.9).sqrt();
        let a = [0.1 / norm, 0.2 / norm, 0.3 / norm, 0.9 / norm];
        let r = Su3Matrix::embed_su2((0, 2), a);
        let back = r.su2_projection((0, 2));
        for k in 0..4 {
            assert!((back[k] - a[k]).abs() < 1e-14);
        }
    }

    #[test]
    fn reunitarize_repairs_drift() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let u = Su3Matrix::random_haar(&mut rng);
        let drifted = u + Su3Matrix::random_hermitian(&mut rng, 1e-4);
        assert!(drifted.su3_deviation() > 1e-6);
        assert!(drifted.reunitarize().su3_deviation() < 1e-12);
    }
}
