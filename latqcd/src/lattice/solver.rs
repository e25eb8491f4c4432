// SPDX-License-Identifier: AGPL-3.0-only

//! Krylov solvers for `D x = b`.
//!
//! - **Conjugate gradient** on the normal equations `D†D x = D†b` (CGNR).
//!   Valid for any non-singular operator. The recursion carries the true
//!   residual `b − D x`, which is also the stopping criterion.
//! - **BiCGSTAB** directly on `D`. The shadow residual is a fixed-seed
//!   random vector; on a breakdown the iteration restarts with the current
//!   residual as shadow.
//!
//! Convergence: `‖b − D x‖ / ‖b‖ < tol`. The returned residual is
//! recomputed from the final solution. Non-convergence is reported in
//! [`SolveResult`], never raised.
//!
//! # References
//!
//! - Hestenes & Stiefel (1952), CG
//! - van der Vorst, SIAM J. Sci. Stat. Comput. 13, 631 (1992), BiCGSTAB
//! - Saad, "Iterative Methods for Sparse Linear Systems" (2003), §8.3

use std::time::{Duration, Instant};

use num_complex::Complex64;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::constants::{BICGSTAB_SHADOW_SEED, LATTICE_DIVISION_GUARD};
use super::dirac::{EvenOddOperator, LinearOperator};
use super::even_odd::SchurComplement;
use super::selector::deserialize_via_selector;
use super::spinor::{axpy, dot, norm_sq, random_spinor, sub, xpby};

/// Krylov method selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverMethod {
    /// CG on the normal equations.
    #[default]
    ConjugateGradient,
    /// Stabilized biconjugate gradient.
    BiCgStab,
}

impl SolverMethod {
    /// Decode an integer selector (0, 1). Unknown codes fall back to CG with
    /// a warning.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::ConjugateGradient,
            1 => Self::BiCgStab,
            other => {
                log::warn!("unknown solver code {other}, using conjugate gradient");
                Self::ConjugateGradient
            }
        }
    }

    /// Decode a selector name. Unknown names fall back to CG with a warning.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "cg" | "conjugate_gradient" => Self::ConjugateGradient,
            "bicgstab" | "bi_cg_stab" => Self::BiCgStab,
            other => {
                log::warn!("unknown solver {other:?}, using conjugate gradient");
                Self::ConjugateGradient
            }
        }
    }
}

deserialize_via_selector!(SolverMethod);

/// Solver settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveRequest {
    /// Krylov method.
    pub method: SolverMethod,
    /// Iteration cap.
    pub max_iterations: usize,
    /// Target relative residual.
    pub tolerance: f64,
    /// 0 silent, 1 per-solve summary, 2 per-iteration residuals.
    pub verbosity: u8,
}

impl Default for SolveRequest {
    fn default() -> Self {
        Self {
            method: SolverMethod::ConjugateGradient,
            max_iterations: 1000,
            tolerance: 1e-8,
            verbosity: 0,
        }
    }
}

/// Solution and diagnostics.
#[derive(Clone, Debug)]
pub struct SolveResult {
    /// Approximate solution.
    pub solution: Vec<Complex64>,
    /// Iterations performed.
    pub iterations: usize,
    /// True relative residual `‖b − D x‖ / ‖b‖`.
    pub residual: f64,
    /// Wall time.
    pub elapsed: Duration,
    /// Whether the tolerance was reached.
    pub converged: bool,
}

/// `‖b − A x‖ / ‖b‖`, zero for a zero source.
pub fn relative_residual<O: LinearOperator + ?Sized>(op: &O, b: &[Complex64], x: &[Complex64]) -> f64 {
    let b_norm_sq = norm_sq(b);
    if b_norm_sq < LATTICE_DIVISION_GUARD {
        return 0.0;
    }
    (norm_sq(&sub(b, &op.apply(x))) / b_norm_sq).sqrt()
}

/// Solve `A x = b` from a zero initial guess.
pub fn solve<O: LinearOperator + ?Sized>(op: &O, source: &[Complex64], request: &SolveRequest) -> SolveResult {
    let start = Instant::now();
    let zero = vec![Complex64::new(0.0, 0.0); op.size()];
    if source.len() != op.size() {
        log::warn!(
            "solve: source length {} does not match operator size {}",
            source.len(),
            op.size()
        );
        return SolveResult {
            solution: zero,
            iterations: 0,
            residual: 1.0,
            elapsed: start.elapsed(),
            converged: false,
        };
    }
    if norm_sq(source) < LATTICE_DIVISION_GUARD {
        return SolveResult {
            solution: zero,
            iterations: 0,
            residual: 0.0,
            elapsed: start.elapsed(),
            converged: true,
        };
    }

    let (solution, iterations) = match request.method {
        SolverMethod::ConjugateGradient => cgnr(op, source, request),
        SolverMethod::BiCgStab => bicgstab(op, source, request),
    };
    let residual = relative_residual(op, source, &solution);
    let result = SolveResult {
        solution,
        iterations,
        residual,
        elapsed: start.elapsed(),
        converged: residual < request.tolerance,
    };
    if request.verbosity >= 1 {
        log::info!(
            "{:?}: {} iterations, residual {:.3e}, {:.3} s{}",
            request.method,
            result.iterations,
            result.residual,
            result.elapsed.as_secs_f64(),
            if result.converged { "" } else { " (not converged)" }
        );
    }
    result
}

fn cgnr<O: LinearOperator + ?Sized>(op: &O, b: &[Complex64], request: &SolveRequest) -> (Vec<Complex64>, usize) {
    let mut x = vec![Complex64::new(0.0, 0.0); b.len()];
    let mut r = b.to_vec();
    let mut z = op.apply_dagger(&r);
    let mut p = z.clone();
    let b_norm_sq = norm_sq(b);
    let tol_sq = request.tolerance * request.tolerance * b_norm_sq;
    let mut z_norm_sq = norm_sq(&z);
    let mut iterations = 0;

    for iter in 0..request.max_iterations {
        iterations = iter + 1;
        let w = op.apply(&p);
        let w_norm_sq = norm_sq(&w);
        if w_norm_sq < LATTICE_DIVISION_GUARD {
            break;
        }
        let alpha = z_norm_sq / w_norm_sq;
        axpy(Complex64::new(alpha, 0.0), &p, &mut x);
        axpy(Complex64::new(-alpha, 0.0), &w, &mut r);

        let r_norm_sq = norm_sq(&r);
        if request.verbosity >= 2 {
            log::debug!("cg {iterations}: residual {:.3e}", (r_norm_sq / b_norm_sq).sqrt());
        }
        if r_norm_sq < tol_sq {
            break;
        }

        z = op.apply_dagger(&r);
        let z_norm_sq_new = norm_sq(&z);
        let beta = z_norm_sq_new / z_norm_sq;
        z_norm_sq = z_norm_sq_new;
        xpby(&z, Complex64::new(beta, 0.0), &mut p);
    }
    (x, iterations)
}

fn bicgstab<O: LinearOperator + ?Sized>(
    op: &O,
    b: &[Complex64],
    request: &SolveRequest,
) -> (Vec<Complex64>, usize) {
    let one = Complex64::new(1.0, 0.0);
    let zero = Complex64::new(0.0, 0.0);
    let mut x = vec![zero; b.len()];
    let mut r = b.to_vec();
    let mut r_hat = random_spinor(b.len(), &mut ChaCha8Rng::seed_from_u64(BICGSTAB_SHADOW_SEED));
    let mut p = vec![zero; b.len()];
    let mut v = p.clone();
    let (mut rho, mut alpha, mut omega) = (one, one, one);
    let b_norm_sq = norm_sq(b);
    let tol_sq = request.tolerance * request.tolerance * b_norm_sq;
    let mut iterations = 0;
    // Iteration of the last restart; a second breakdown right after one ends the solve.
    let mut restarted_at = None;

    for iter in 0..request.max_iterations {
        iterations = iter + 1;
        let rho_new = dot(&r_hat, &r);
        let mut breakdown = rho_new.norm() < LATTICE_DIVISION_GUARD;
        if !breakdown {
            let beta = (rho_new / rho) * (alpha / omega);
            rho = rho_new;
            for ((pi, ri), vi) in p.iter_mut().zip(&r).zip(&v) {
                *pi = ri + beta * (*pi - omega * vi);
            }
            v = op.apply(&p);
            let r_hat_v = dot(&r_hat, &v);
            breakdown = r_hat_v.norm() < LATTICE_DIVISION_GUARD;
            if !breakdown {
                alpha = rho / r_hat_v;
                let mut s = r.clone();
                axpy(-alpha, &v, &mut s);
                axpy(alpha, &p, &mut x);
                if norm_sq(&s) < tol_sq {
                    break;
                }
                let t = op.apply(&s);
                let t_norm_sq = norm_sq(&t);
                if t_norm_sq < LATTICE_DIVISION_GUARD {
                    r = s;
                    breakdown = true;
                } else {
                    omega = dot(&t, &s) / t_norm_sq;
                    axpy(omega, &s, &mut x);
                    r = s;
                    axpy(-omega, &t, &mut r);
                    breakdown = omega.norm() < LATTICE_DIVISION_GUARD;
                }
            }
        }

        let r_norm_sq = norm_sq(&r);
        if request.verbosity >= 2 {
            log::debug!("bicgstab {iterations}: residual {:.3e}", (r_norm_sq / b_norm_sq).sqrt());
        }
        if r_norm_sq < tol_sq {
            break;
        }
        if breakdown {
            if restarted_at == Some(iter) {
                log::warn!("bicgstab: repeated breakdown at iteration {iterations}");
                break;
            }
            log::debug!("bicgstab breakdown at iteration {iterations}, restarting");
            r_hat.clone_from(&r);
            p.fill(zero);
            v.fill(zero);
            (rho, alpha, omega) = (one, one, one);
            restarted_at = Some(iter + 1);
        }
    }
    (x, iterations)
}

/// Solve `A x = b`, through the odd-odd Schur complement when
/// `precondition` is set and the operator supports it.
///
/// The solution is always the full vector in lexicographic order and the
/// residual is measured against the full operator.
pub fn invert<O: EvenOddOperator + ?Sized>(
    op: &O,
    source: &[Complex64],
    request: &SolveRequest,
    precondition: bool,
) -> SolveResult {
    if !precondition {
        return solve(op, source, request);
    }
    if !op.supports_even_odd() {
        log::warn!("operator has no even-odd support, solving unpreconditioned");
        return solve(op, source, request);
    }
    if source.len() != op.size() {
        return solve(op, source, request);
    }
    let start = Instant::now();
    let b = if op.is_hermitian() {
        op.make_hermitian(source)
    } else {
        source.to_vec()
    };
    let b_eo = op.make_even_odd(&b);
    let reduced = op.make_even_odd_source(&b_eo);
    let schur = SchurComplement::new(op);
    // The odd rows of the full residual are the reduced residual; the even
    // rows vanish after reconstruction. Target the full relative residual.
    let reduced_norm = norm_sq(&reduced).sqrt();
    let inner_request = if reduced_norm > LATTICE_DIVISION_GUARD {
        SolveRequest {
            tolerance: request.tolerance * (norm_sq(&b).sqrt() / reduced_norm).min(1.0),
            ..request.clone()
        }
    } else {
        request.clone()
    };
    let inner = solve(&schur, &reduced, &inner_request);
    let x_eo = op.make_even_odd_solution(&b_eo, &inner.solution);
    let solution = op.remove_even_odd(&x_eo);
    let residual = relative_residual(op, source, &solution);
    if request.verbosity >= 1 {
        log::info!(
            "even-odd solve: {} iterations, full residual {residual:.3e}{}",
            inner.iterations,
            if residual < request.tolerance { "" } else { " (not converged)" }
        );
    }
    SolveResult {
        solution,
        iterations: inner.iterations,
        residual,
        elapsed: start.elapsed(),
        converged: residual < request.tolerance,
    }
}
