// SPDX-License-Identifier: AGPL-3.0-only

//! Spinor fields as flat complex vectors.
//!
//! Index `12·site + 3·spin + colour` with `site` the lexicographic site
//! index. Reductions run sequentially so a solve is reproducible bit for
//! bit.

use num_complex::Complex64;
use rand::Rng;

use super::constants::{N_COLORS, N_SPINS, SPINOR_SITE};
use super::su3::gaussian;

/// Flat spinor-field index.
#[must_use]
pub const fn spinor_index(site: usize, spin: usize, colour: usize) -> usize {
    SPINOR_SITE * site + N_COLORS * spin + colour
}

/// `⟨a, b⟩ = Σ conj(a_i) b_i`.
#[must_use]
pub fn dot(a: &[Complex64], b: &[Complex64]) -> Complex64 {
    a.iter().zip(b).map(|(x, y)| x.conj() * y).sum()
}

/// `‖a‖²`.
#[must_use]
pub fn norm_sq(a: &[Complex64]) -> f64 {
    a.iter().map(Complex64::norm_sqr).sum()
}

/// `y ← y + α x`.
pub fn axpy(alpha: Complex64, x: &[Complex64], y: &mut [Complex64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

/// `y ← x + β y`.
pub fn xpby(x: &[Complex64], beta: Complex64, y: &mut [Complex64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi = xi + beta * *yi;
    }
}

/// `a − b`.
#[must_use]
pub fn sub(a: &[Complex64], b: &[Complex64]) -> Vec<Complex64> {
    a.iter().zip(b).map(|(x, y)| x - y).collect()
}

/// Point source at `site`.
///
/// With `spin` and `colour` given, a unit vector; with either left as
/// `None`, every component in that index range is set to one.
#[must_use]
pub fn point_source(
    volume: usize,
    site: usize,
    spin: Option<usize>,
    colour: Option<usize>,
) -> Vec<Complex64> {
    let mut psi = vec![Complex64::new(0.0, 0.0); SPINOR_SITE * volume];
    let spins = spin.map_or(0..N_SPINS, |s| s..s + 1);
    for s in spins {
        let colours = colour.map_or(0..N_COLORS, |c| c..c + 1);
        for c in colours {
            psi[spinor_index(site, s, c)] = Complex64::new(1.0, 0.0);
        }
    }
    psi
}

/// Gaussian random spinor of `len` components.
pub fn random_spinor<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Vec<Complex64> {
    (0..len)
        .map(|_| Complex64::new(gaussian(rng), gaussian(rng)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn point_source_components() {
        let psi = point_source(16, 5, Some(2), Some(1));
        assert!((norm_sq(&psi) - 1.0).abs() < 1e-15);
        assert_eq!(psi[spinor_index(5, 2, 1)], Complex64::new(1.0, 0.0));

        let all = point_source(16, 5, None, None);
        assert!((norm_sq(&all) - 12.0).abs() < 1e-15);
        let spin_only = point_source(16, 0, Some(3), None);
        assert!((norm_sq(&spin_only) - 3.0).abs() < 1e-15);
    }

    #[test]
    fn dot_is_conjugate_linear_in_first_argument() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let a = random_spinor(24, &mut rng);
        let b = random_spinor(24, &mut rng);
        let i = Complex64::new(0.0, 1.0);
        let scaled: Vec<Complex64> = a.iter().map(|x| i * x).collect();
        assert!((dot(&scaled, &b) + i * dot(&a, &b)).norm() < 1e-12);
        assert!((dot(&a, &a).re - norm_sq(&a)).abs() < 1e-12);
    }

    #[test]
    fn blas_updates() {
        let x = vec![Complex64::new(1.0, 0.0); 4];
        let mut y = vec![Complex64::new(2.0, 1.0); 4];
        axpy(Complex64::new(0.5, 0.0), &x, &mut y);
        assert_eq!(y[0], Complex64::new(2.5, 1.0));
        xpby(&x, Complex64::new(2.0, 0.0), &mut y);
        assert_eq!(y[3], Complex64::new(6.0, 2.0));
        assert_eq!(sub(&y, &x)[1], Complex64::new(5.0, 2.0));
    }
}
