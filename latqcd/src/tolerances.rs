// SPDX-License-Identifier: AGPL-3.0-only

//! Validation tolerances.
//!
//! Every threshold used by the validation binaries and integration tests,
//! with the reasoning behind its value.
//!
//! | Category | Basis | Example |
//! |----------|-------|---------|
//! | Machine precision | IEEE 754 f64 | cold plaquette, γ5-hermiticity |
//! | Iterative | Krylov convergence | solver residuals |
//! | Statistical | Monte Carlo noise on small lattices | plaquette windows |

// ═══════════════════════════════════════════════════════════════════
// Machine precision
// ═══════════════════════════════════════════════════════════════════

/// Denominator below which relative checks fall back to absolute.
pub const NEAR_ZERO_EXPECTED: f64 = 1e-14;

/// Cold plaquette: every loop of unit links has trace exactly 3.
pub const COLD_PLAQUETTE_ABS: f64 = 1e-12;

/// Distance of updated links from SU(3) (`‖U†U − 1‖` and `|det U − 1|`).
///
/// Every update ends with Gram-Schmidt reunitarization; after many sweeps
/// the drift stays at a few ulps per element.
pub const SU3_UNITARITY: f64 = 1e-10;

/// Wilson loops before and after a random gauge transformation.
///
/// The products differ only by summation order.
pub const GAUGE_INVARIANCE_ABS: f64 = 1e-10;

/// `⟨y, A x⟩` against `⟨A† y, x⟩` on random spinors, relative to `|⟨y, A x⟩|`.
pub const ADJOINT_REL: f64 = 1e-10;

/// Free-field operator on a constant spinor against `m ψ`.
pub const FREE_FIELD_ABS: f64 = 1e-12;

// ═══════════════════════════════════════════════════════════════════
// Iterative solvers
// ═══════════════════════════════════════════════════════════════════

/// Requested relative residual for validation solves.
pub const SOLVER_REQUEST: f64 = 1e-10;

/// Accepted true relative residual after a validation solve.
///
/// The recursive CGNR residual drifts from the true one by a few orders
/// above the request on 4⁴ fields.
pub const SOLVER_RESIDUAL: f64 = 1e-8;

/// Preconditioned against unpreconditioned solutions, per component.
///
/// Both stop at [`SOLVER_REQUEST`]; the difference is bounded by the
/// condition number times the residual.
pub const SOLUTION_AGREEMENT: f64 = 1e-6;

// ═══════════════════════════════════════════════════════════════════
// Monte Carlo
// ═══════════════════════════════════════════════════════════════════

/// Strong coupling: `⟨P⟩ = β/18 + O(β²)`.
///
/// At β = 0.5 the next order is about 1e-3; 4⁴ noise over 20
/// configurations is of the same size.
pub const STRONG_COUPLING_PLAQUETTE_ABS: f64 = 0.01;

/// Plaquette window at β = 5.5 on 4⁴ (literature ≈ 0.50).
pub const BETA_5_5_PLAQUETTE_MIN: f64 = 0.45;

/// Upper edge of the β = 5.5 plaquette window.
pub const BETA_5_5_PLAQUETTE_MAX: f64 = 0.56;

/// β = 0 Metropolis: `|⟨Re Tr U⟩| / 3` for Haar-distributed links.
///
/// The standard error of the mean over 4·4⁴·20 links is about 0.005.
pub const HAAR_TRACE_ABS: f64 = 0.03;

/// β = 0 Metropolis: `⟨|Tr U|²⟩` against its Haar value 1.
pub const HAAR_TRACE_SQ_ABS: f64 = 0.1;

/// Minimum Metropolis acceptance with the default proposal spread.
pub const METROPOLIS_ACCEPTANCE_MIN: f64 = 0.05;
