// SPDX-License-Identifier: AGPL-3.0-only

//! latqcd: SU(3) lattice gauge theory on the CPU.
//!
//! Generates pure-gauge configurations by Markov-chain Monte Carlo and
//! computes quark propagators by inverting discretized Dirac operators
//! against them.
//!
//! ## Modules
//!   - `lattice`: storage, gauge fields, update engine, Dirac operators,
//!     solvers and propagators
//!   - `error`: construction-time error type
//!   - `tolerances`: thresholds used by tests and validation binaries
//!   - `validation`: pass/fail harness for the binaries
//!
//! ## Validation binaries
//!   - `validate_pure_gauge`: cold start, gauge invariance, strong
//!     coupling, β = 5.5 plaquette, parallel/serial agreement
//!   - `validate_dirac_inversion`: free field, adjoints, γ5-hermiticity,
//!     Schur-complement solves, propagator residuals
//!
//! The library logs through the `log` facade and installs no logger.

pub mod error;
pub mod lattice;
pub mod tolerances;
pub mod validation;

pub use error::LatticeError;
