// SPDX-License-Identifier: AGPL-3.0-only

//! Euclidean Dirac matrices in the chiral basis.
//!
//! ```text
//! γ_0 = ⎛ 0  1 ⎞    γ_k = ⎛  0    −iσ_k ⎞    γ_5 = γ_1 γ_2 γ_3 γ_0 = diag(1, 1, −1, −1)
//!       ⎝ 1  0 ⎠          ⎝ iσ_k    0   ⎠
//! ```
//!
//! Direction 0 is time, matching the gauge field. All γ_μ are Hermitian,
//! square to one and anticommute with γ_5.

use num_complex::Complex64;

use super::constants::{N_COLORS, N_SPINS, SPINOR_SITE};

/// 4×4 complex matrix acting on spin indices.
pub type SpinMatrix = [[Complex64; N_SPINS]; N_SPINS];

/// One site of a spinor field, index `3·spin + colour`.
pub type SiteSpinor = [Complex64; SPINOR_SITE];

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const ONE: Complex64 = Complex64::new(1.0, 0.0);
const I: Complex64 = Complex64::new(0.0, 1.0);

/// Zero spin matrix.
#[must_use]
pub const fn spin_zero() -> SpinMatrix {
    [[ZERO; N_SPINS]; N_SPINS]
}

/// Identity spin matrix.
#[must_use]
pub const fn spin_identity() -> SpinMatrix {
    let mut m = spin_zero();
    let mut a = 0;
    while a < N_SPINS {
        m[a][a] = ONE;
        a += 1;
    }
    m
}

fn pauli(k: usize) -> [[Complex64; 2]; 2] {
    match k {
        1 => [[ZERO, ONE], [ONE, ZERO]],
        2 => [[ZERO, -I], [I, ZERO]],
        _ => [[ONE, ZERO], [ZERO, -ONE]],
    }
}

/// γ_μ for μ = 0 (time), 1, 2, 3.
#[must_use]
pub fn gamma(mu: usize) -> SpinMatrix {
    let mut g = spin_zero();
    if mu == 0 {
        for a in 0..2 {
            g[a][a + 2] = ONE;
            g[a + 2][a] = ONE;
        }
    } else {
        let s = pauli(mu);
        for a in 0..2 {
            for b in 0..2 {
                g[a][b + 2] = -I * s[a][b];
                g[a + 2][b] = I * s[a][b];
            }
        }
    }
    g
}

/// γ_5 = γ_1 γ_2 γ_3 γ_0.
#[must_use]
pub fn gamma5() -> SpinMatrix {
    spin_mul(&spin_mul(&spin_mul(&gamma(1), &gamma(2)), &gamma(3)), &gamma(0))
}

/// Matrix product.
#[must_use]
pub fn spin_mul(a: &SpinMatrix, b: &SpinMatrix) -> SpinMatrix {
    let mut c = spin_zero();
    for i in 0..N_SPINS {
        for j in 0..N_SPINS {
            for k in 0..N_SPINS {
                c[i][j] += a[i][k] * b[k][j];
            }
        }
    }
    c
}

/// `s·a + t·b`.
#[must_use]
pub fn spin_combine(s: f64, a: &SpinMatrix, t: f64, b: &SpinMatrix) -> SpinMatrix {
    let mut c = spin_zero();
    for i in 0..N_SPINS {
        for j in 0..N_SPINS {
            c[i][j] = a[i][j] * s + b[i][j] * t;
        }
    }
    c
}

/// Chiral projector `P± = (1 ± γ_5)/2`.
#[must_use]
pub fn chiral_projector(plus: bool) -> SpinMatrix {
    let sign = if plus { 0.5 } else { -0.5 };
    spin_combine(0.5, &spin_identity(), sign, &gamma5())
}

/// Apply a spin matrix to one site spinor.
#[must_use]
pub fn spin_apply(m: &SpinMatrix, psi: &SiteSpinor) -> SiteSpinor {
    let mut out = [ZERO; SPINOR_SITE];
    for a in 0..N_SPINS {
        for b in 0..N_SPINS {
            let coeff = m[a][b];
            if coeff == ZERO {
                continue;
            }
            for c in 0..N_COLORS {
                out[N_COLORS * a + c] += coeff * psi[N_COLORS * b + c];
            }
        }
    }
    out
}

/// Multiply every site of a 4D or 5D spinor field by γ_5 in place.
pub fn gamma5_in_place(psi: &mut [Complex64]) {
    let g5 = gamma5();
    for site in psi.chunks_exact_mut(SPINOR_SITE) {
        for a in 0..N_SPINS {
            let sign = g5[a][a];
            for c in 0..N_COLORS {
                site[N_COLORS * a + c] *= sign;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: &SpinMatrix, b: &SpinMatrix) -> bool {
        (0..N_SPINS).all(|i| (0..N_SPINS).all(|j| (a[i][j] - b[i][j]).norm() < 1e-14))
    }

    fn adjoint(a: &SpinMatrix) -> SpinMatrix {
        let mut c = spin_zero();
        for i in 0..N_SPINS {
            for j in 0..N_SPINS {
                c[i][j] = a[j][i].conj();
            }
        }
        c
    }

    #[test]
    fn clifford_algebra() {
        let id = spin_identity();
        for mu in 0..4 {
            for nu in 0..4 {
                let anti = spin_combine(
                    1.0,
                    &spin_mul(&gamma(mu), &gamma(nu)),
                    1.0,
                    &spin_mul(&gamma(nu), &gamma(mu)),
                );
                let expected = if mu == nu {
                    spin_combine(2.0, &id, 0.0, &id)
                } else {
                    spin_zero()
                };
                assert!(close(&anti, &expected), "mu={mu} nu={nu}");
            }
            assert!(close(&gamma(mu), &adjoint(&gamma(mu))));
        }
    }

    #[test]
    fn gamma5_is_diagonal_and_anticommutes() {
        let g5 = gamma5();
        let expected = [1.0, 1.0, -1.0, -1.0];
        for a in 0..4 {
            for b in 0..4 {
                let want = if a == b { expected[a] } else { 0.0 };
                assert!((g5[a][b] - Complex64::new(want, 0.0)).norm() < 1e-14);
            }
        }
        for mu in 0..4 {
            let anti = spin_combine(
                1.0,
                &spin_mul(&g5, &gamma(mu)),
                1.0,
                &spin_mul(&gamma(mu), &g5),
            );
            assert!(close(&anti, &spin_zero()));
        }
    }

    #[test]
    fn projectors_are_complementary() {
        let p = chiral_projector(true);
        let m = chiral_projector(false);
        assert!(close(&spin_mul(&p, &p), &p));
        assert!(close(&spin_mul(&p, &m), &spin_zero()));
        assert!(close(&spin_combine(1.0, &p, 1.0, &m), &spin_identity()));
    }

    #[test]
    fn spin_apply_matches_in_place_gamma5() {
        let mut psi = [ZERO; SPINOR_SITE];
        for (k, v) in psi.iter_mut().enumerate() {
            *v = Complex64::new(k as f64, -(k as f64) / 2.0);
        }
        let via_matrix = spin_apply(&gamma5(), &psi);
        let mut in_place = psi;
        gamma5_in_place(&mut in_place);
        assert_eq!(via_matrix, in_place);
    }
}
