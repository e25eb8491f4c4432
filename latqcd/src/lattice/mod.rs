// SPDX-License-Identifier: AGPL-3.0-only

//! Lattice field theory: SU(3) gauge fields and Wilson-type quarks.
//!
//! Data flow: [`monte_carlo::MonteCarloEngine`] produces a
//! [`gauge::GaugeField`]; Dirac operators borrow it, the solvers call the
//! operators, and [`propagator::compute_propagator`] collects twelve
//! solves into a point-to-all propagator.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `layout` | Even/odd blocked site ordering, `BlockedLattice` storage |
//! | `su3` | 3×3 complex matrices, SU(2) subgroups, reunitarization |
//! | `constants` | Counts, guards, Monte Carlo defaults, seed mixing |
//! | `gauge` | Link storage, Wilson loops, Polyakov loops |
//! | `action` | Plaquette and improved gauge actions as loop tables |
//! | `schedule` | Two-colour chunking for parallel sweeps |
//! | `selector` | Name-or-code selectors with warning fallbacks |
//! | `monte_carlo` | Heatbath and Metropolis update engine |
//! | `smearing` | Stout links, Jacobi quark smearing |
//! | `gamma` | Dirac matrices, chiral projectors |
//! | `spinor` | Flat spinor vectors and BLAS-1 helpers |
//! | `dirac` | Wilson, Hamber-Wu and Naik operators |
//! | `domain_wall` | Shamir domain-wall operator |
//! | `even_odd` | Schur complement on odd sites |
//! | `solver` | CGNR and BiCGSTAB |
//! | `propagator` | Twelve-column propagators, pion correlator |
//!
//! # References
//!
//! - Creutz, "Quarks, Gluons and Lattices" (1983)
//! - Gattringer & Lang, "Quantum Chromodynamics on the Lattice" (2010)

/// Plaquette and improved gauge actions compiled into staple and loop tables.
pub mod action;
/// Lattice counts, numerical guards, Monte Carlo defaults and seed mixing.
pub mod constants;
/// Wilson-family Dirac operators and the operator traits.
pub mod dirac;
/// Shamir domain-wall operator over a Wilson or Naik kernel.
pub mod domain_wall;
/// Odd-odd Schur complement of an even-odd operator.
pub mod even_odd;
/// Dirac matrices in the chiral basis.
pub mod gamma;
/// SU(3) gauge configuration and observables.
pub mod gauge;
/// Even/odd cache-blocked site ordering.
pub mod layout;
/// Heatbath and Metropolis updates with chunked parallel sweeps.
pub mod monte_carlo;
/// Point-to-all propagators.
pub mod propagator;
/// Conflict-checked chunk colouring for parallel sweeps.
pub mod schedule;
/// Deserialization of enum selectors from names or integer codes.
pub(crate) mod selector;
/// Krylov solvers.
pub mod solver;
/// Stout and Jacobi smearing.
pub mod smearing;
/// Flat spinor vectors.
pub mod spinor;
/// SU(3) and SU(2) matrix operations.
pub mod su3;
