// SPDX-License-Identifier: AGPL-3.0-only

//! Typed errors for lattice construction and configuration.
//!
//! Only construction-time failures are errors. Runtime misuse that the
//! library can absorb (unknown selectors, unsupported action/update pairs,
//! size-mismatched operator inputs, solver non-convergence) is logged and
//! answered with a documented default instead.

use std::fmt;

/// Errors raised while building lattices, engines or operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LatticeError {
    /// Lattice or block shape has the wrong dimensionality, a zero extent,
    /// or a block extent that does not divide the lattice extent.
    InvalidShape(String),

    /// A scalar parameter is outside its valid range (e.g. `Ls = 0`).
    InvalidParameter(String),

    /// A configuration document could not be parsed.
    Config(String),
}

impl fmt::Display for LatticeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidShape(msg) => write!(f, "Invalid lattice shape: {msg}"),
            Self::InvalidParameter(msg) => write!(f, "Invalid parameter: {msg}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for LatticeError {}

impl From<serde_json::Error> for LatticeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Config(e.to_string())
    }
}
