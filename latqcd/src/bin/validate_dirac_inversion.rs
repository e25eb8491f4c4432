// SPDX-License-Identifier: AGPL-3.0-only

//! Dirac operator and inversion validation.
//!
//! # Validation targets
//!
//! | Property | Expected | Tolerance | Basis |
//! |----------|----------|-----------|-------|
//! | Free field, constant spinor | `D ψ = m ψ` | exact | Zero-momentum mode |
//! | `apply_dagger` | adjoint of `apply` | 1e-10 rel | Definition |
//! | Γ5·D | Hermitian | 1e-10 rel | γ5-hermiticity |
//! | Even-odd split | round trip | exact | Permutation |
//! | Schur vs full solve | same solution | 1e-6 | Exact reduction |
//! | Propagator columns | `D S = η` | 1e-8 | Solver residual |
//!
//! Gauge background: 4⁴ heatbath at β = 5.7 after 30 sweeps.

use latqcd::lattice::dirac::{
    DiracOperator, DiracParams, EvenOddOperator, FermionAction, LinearOperator,
};
use latqcd::lattice::gauge::GaugeField;
use latqcd::lattice::monte_carlo::{GaugeConfig, MonteCarloEngine};
use latqcd::lattice::propagator::{compute_propagator, PropagatorRequest};
use latqcd::lattice::solver::{invert, SolveRequest, SolverMethod};
use latqcd::lattice::spinor::{dot, norm_sq, point_source, random_spinor};
use latqcd::tolerances;
use latqcd::validation::ValidationHarness;
use latqcd::LatticeError;
use num_complex::Complex64;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const ALL_ACTIONS: [FermionAction; 4] = [
    FermionAction::Wilson,
    FermionAction::HamberWu,
    FermionAction::Naik,
    FermionAction::DomainWall,
];

fn relative_gap(a: Complex64, b: Complex64) -> f64 {
    (a - b).norm() / a.norm().max(1.0)
}

fn max_difference(a: &[Complex64], b: &[Complex64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).norm()).fold(0.0, f64::max)
}

fn solver(method: SolverMethod) -> SolveRequest {
    SolveRequest {
        method,
        max_iterations: 5000,
        tolerance: tolerances::SOLVER_REQUEST,
        verbosity: 0,
    }
}

fn run(harness: &mut ValidationHarness) -> Result<(), LatticeError> {
    let mut rng = ChaCha8Rng::seed_from_u64(2024);

    // ═══ Test 1: Free field ═══
    println!("═══ Free Field, constant spinor (periodic 4⁴, m = 0.25) ═══");
    {
        let field = GaugeField::cold_start(&[4, 4, 4, 4], &[2, 2, 2, 2])?;
        let params = DiracParams {
            mass: 0.25,
            ..DiracParams::default().periodic()
        };
        let site = random_spinor(12, &mut rng);
        for action in [FermionAction::Wilson, FermionAction::HamberWu, FermionAction::Naik] {
            let op = DiracOperator::new(action, &field, &params)?;
            let psi: Vec<Complex64> = site.iter().copied().cycle().take(op.size()).collect();
            let expected: Vec<Complex64> = psi.iter().map(|p| p * params.mass).collect();
            let diff = max_difference(&op.apply(&psi), &expected);
            println!("  {action:?}: max |Dψ − mψ| = {diff:.3e}");
            harness.check_abs(
                &format!("free field {action:?}"),
                diff,
                0.0,
                tolerances::FREE_FIELD_ABS,
            );
        }
    }
    println!();

    println!("═══ Thermalizing 4⁴ at β = 5.7 ═══");
    let mut engine = MonteCarloEngine::new(GaugeConfig {
        beta: 5.7,
        seed: Some(2024),
        ..GaugeConfig::default()
    })?;
    engine.thermalize(30);
    let field = engine.into_field();
    println!("  plaquette = {:.6}", field.average_plaquette());
    println!();

    // ═══ Test 2: Adjoint and γ5-hermiticity ═══
    println!("═══ Adjoint and Γ5-hermiticity ═══");
    for action in ALL_ACTIONS {
        let params = DiracParams::default();
        let op = DiracOperator::new(action, &field, &params)?;
        let x = random_spinor(op.size(), &mut rng);
        let y = random_spinor(op.size(), &mut rng);
        let adjoint = relative_gap(dot(&y, &op.apply(&x)), dot(&op.apply_dagger(&y), &x));

        let hermitian = DiracOperator::new(
            action,
            &field,
            &DiracParams {
                hermitian: true,
                ..params
            },
        )?;
        let g5 = relative_gap(dot(&y, &hermitian.apply(&x)), dot(&hermitian.apply(&y), &x));
        println!("  {action:?}: adjoint gap {adjoint:.3e}, Γ5 gap {g5:.3e}");
        harness.check_upper(&format!("{action:?} adjoint"), adjoint, tolerances::ADJOINT_REL);
        harness.check_upper(&format!("{action:?} Γ5-hermitian"), g5, tolerances::ADJOINT_REL);

        if op.supports_even_odd() {
            let back = op.remove_even_odd(&op.make_even_odd(&x));
            harness.check_bool(&format!("{action:?} even-odd round trip"), back == x);
        }
    }
    println!();

    // ═══ Test 3: Schur complement against full solves ═══
    println!("═══ Preconditioned vs unpreconditioned solves (m = 0.2) ═══");
    let cases = [
        (FermionAction::Wilson, SolverMethod::ConjugateGradient),
        (FermionAction::Wilson, SolverMethod::BiCgStab),
        (FermionAction::Naik, SolverMethod::ConjugateGradient),
        (FermionAction::DomainWall, SolverMethod::ConjugateGradient),
    ];
    for (action, method) in cases {
        let params = DiracParams {
            mass: 0.2,
            ..DiracParams::default()
        };
        let op = DiracOperator::new(action, &field, &params)?;
        let b = point_source(op.size() / 12, 0, Some(0), Some(0));
        let request = solver(method);
        let full = invert(&op, &b, &request, false);
        let schur = invert(&op, &b, &request, true);
        let diff = max_difference(&full.solution, &schur.solution);
        println!(
            "  {action:?}/{method:?}: full {} it ({:.2e}), schur {} it ({:.2e}), max diff {diff:.2e}",
            full.iterations, full.residual, schur.iterations, schur.residual
        );
        let tag = format!("{action:?}/{method:?}");
        harness.check_upper(&format!("{tag} full residual"), full.residual, tolerances::SOLVER_RESIDUAL);
        harness.check_upper(&format!("{tag} schur residual"), schur.residual, tolerances::SOLVER_RESIDUAL);
        harness.check_upper(&format!("{tag} agreement"), diff, tolerances::SOLUTION_AGREEMENT);
        harness.check_rel(
            &format!("{tag} solution norm"),
            norm_sq(&schur.solution).sqrt(),
            norm_sq(&full.solution).sqrt(),
            tolerances::SOLUTION_AGREEMENT,
        );
    }
    println!();

    // ═══ Test 4: Propagator ═══
    println!("═══ Smeared Wilson propagator ═══");
    {
        let request = PropagatorRequest {
            params: DiracParams {
                mass: 0.2,
                precondition: true,
                ..DiracParams::default()
            },
            source_site: [0, 1, 2, 3],
            stout_steps: 2,
            source_smearing: 3,
            sink_smearing: 3,
            solver: solver(SolverMethod::ConjugateGradient),
            ..PropagatorRequest::default()
        };
        let prop = compute_propagator(&field, &request)?;
        let worst = prop.stats().iter().map(|s| s.residual).fold(0.0, f64::max);
        let iterations: usize = prop.stats().iter().map(|s| s.iterations).sum();
        let corr = prop.pion_correlator();
        println!("  {iterations} iterations, worst residual {worst:.2e}");
        for (t, c) in corr.iter().enumerate() {
            println!("  C({t}) = {c:.6e}");
        }
        harness.check_bool("propagator converged", prop.converged());
        harness.check_upper("propagator residual", worst, tolerances::SOLVER_RESIDUAL);
        harness.check_bool("pion correlator positive", corr.iter().all(|c| *c > 0.0));
        harness.check_bool("pion correlator decays from source", corr[0] > corr[1]);
    }

    Ok(())
}

fn main() {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  Dirac Operator and Inversion Validation                    ║");
    println!("║  Wilson, Hamber-Wu, Naik, domain wall; CGNR and BiCGSTAB    ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let mut harness = ValidationHarness::new("dirac_inversion");
    if let Err(e) = run(&mut harness) {
        println!("setup failed: {e}");
        harness.check_bool("setup", false);
    }
    harness.finish();
}
