// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: operators, solvers and propagators on generated
//! gauge fields.

use latqcd::lattice::dirac::{
    DiracOperator, DiracParams, EvenOddOperator, FermionAction, LinearOperator,
};
use latqcd::lattice::gauge::GaugeField;
use latqcd::lattice::monte_carlo::{GaugeConfig, MonteCarloEngine};
use latqcd::lattice::propagator::{compute_propagator, PropagatorRequest};
use latqcd::lattice::solver::{invert, relative_residual, SolveRequest, SolverMethod};
use latqcd::lattice::spinor::{dot, point_source, random_spinor};
use latqcd::tolerances;
use num_complex::Complex64;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const ALL_ACTIONS: [FermionAction; 4] = [
    FermionAction::Wilson,
    FermionAction::HamberWu,
    FermionAction::Naik,
    FermionAction::DomainWall,
];

fn thermalized(seed: u64) -> GaugeField {
    let mut engine = MonteCarloEngine::new(GaugeConfig {
        beta: 5.8,
        seed: Some(seed),
        ..GaugeConfig::default()
    })
    .expect("valid config");
    engine.thermalize(15);
    engine.into_field()
}

fn request(method: SolverMethod) -> SolveRequest {
    SolveRequest {
        method,
        max_iterations: 5000,
        tolerance: tolerances::SOLVER_REQUEST,
        verbosity: 0,
    }
}

#[test]
fn free_field_constant_mode_has_eigenvalue_m() {
    let field = GaugeField::cold_start(&[4, 4, 4, 4], &[4, 4, 4, 4]).expect("valid shape");
    for mass in [0.0, 0.1, -0.3] {
        let params = DiracParams {
            mass,
            ..DiracParams::default().periodic()
        };
        for action in [FermionAction::Wilson, FermionAction::HamberWu, FermionAction::Naik] {
            let op = DiracOperator::new(action, &field, &params).expect("valid params");
            let psi = vec![Complex64::new(0.5, -0.25); op.size()];
            for (e, p) in op.apply(&psi).iter().zip(&psi) {
                assert!((e - p * mass).norm() < tolerances::FREE_FIELD_ABS, "{action:?} m={mass}");
            }
        }
    }
}

#[test]
fn every_operator_is_gamma5_hermitian_on_a_thermalized_field() {
    let field = thermalized(3);
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    for action in ALL_ACTIONS {
        let params = DiracParams {
            hermitian: true,
            ..DiracParams::default()
        };
        let op = DiracOperator::new(action, &field, &params).expect("valid params");
        let x = random_spinor(op.size(), &mut rng);
        let y = random_spinor(op.size(), &mut rng);
        let lhs = dot(&y, &op.apply(&x));
        let rhs = dot(&op.apply(&y), &x);
        assert!(
            (lhs - rhs).norm() < tolerances::ADJOINT_REL * lhs.norm().max(1.0),
            "{action:?}"
        );
        let lhs = dot(&y, &op.apply(&x));
        let rhs = dot(&op.apply_dagger(&y), &x);
        assert!(
            (lhs - rhs).norm() < tolerances::ADJOINT_REL * lhs.norm().max(1.0),
            "{action:?} dagger"
        );
    }
}

#[test]
fn even_odd_blocks_reassemble_the_full_operator() {
    let field = thermalized(4);
    let mut rng = ChaCha8Rng::seed_from_u64(4);
    for action in [FermionAction::Wilson, FermionAction::Naik, FermionAction::DomainWall] {
        let op = DiracOperator::new(action, &field, &DiracParams::default()).expect("valid");
        assert!(op.supports_even_odd(), "{action:?}");
        let x = random_spinor(op.size(), &mut rng);
        let h = op.half_size();
        let x_eo = op.make_even_odd(&x);
        let (xe, xo) = x_eo.split_at(h);

        let mut ye = op.apply_even_even(xe);
        for (a, b) in ye.iter_mut().zip(op.apply_even_odd(xo)) {
            *a += b;
        }
        let mut yo = op.apply_odd_odd(xo);
        for (a, b) in yo.iter_mut().zip(op.apply_odd_even(xe)) {
            *a += b;
        }
        ye.extend(yo);
        let full = op.remove_even_odd(&ye);
        for (a, b) in full.iter().zip(op.apply(&x)) {
            assert!((a - b).norm() < 1e-10, "{action:?}");
        }
    }
}

#[test]
fn preconditioned_and_plain_solves_agree() {
    let field = thermalized(5);
    let params = DiracParams {
        mass: 0.2,
        ..DiracParams::default()
    };
    for (action, method) in [
        (FermionAction::Wilson, SolverMethod::ConjugateGradient),
        (FermionAction::Wilson, SolverMethod::BiCgStab),
        (FermionAction::Naik, SolverMethod::ConjugateGradient),
        (FermionAction::DomainWall, SolverMethod::ConjugateGradient),
    ] {
        let op = DiracOperator::new(action, &field, &params).expect("valid params");
        let b = point_source(op.size() / 12, 5, Some(2), Some(1));
        let plain = invert(&op, &b, &request(method), false);
        let schur = invert(&op, &b, &request(method), true);
        assert!(plain.converged && schur.converged, "{action:?}/{method:?}");
        assert!(plain.residual < tolerances::SOLVER_RESIDUAL);
        assert!(relative_residual(&op, &b, &schur.solution) < tolerances::SOLVER_RESIDUAL);
        for (a, c) in plain.solution.iter().zip(&schur.solution) {
            assert!((a - c).norm() < tolerances::SOLUTION_AGREEMENT, "{action:?}/{method:?}");
        }
    }
}

#[test]
fn hamber_wu_precondition_request_falls_back() {
    let field = thermalized(6);
    let params = DiracParams {
        mass: 0.3,
        ..DiracParams::default()
    };
    let op = DiracOperator::new(FermionAction::HamberWu, &field, &params).expect("valid");
    assert!(!op.supports_even_odd());
    let b = point_source(field.volume(), 0, Some(0), Some(0));
    let result = invert(&op, &b, &request(SolverMethod::ConjugateGradient), true);
    assert!(result.converged);
    assert!(result.residual < tolerances::SOLVER_RESIDUAL);
}

#[test]
fn propagator_from_json_request() {
    let field = thermalized(7);
    let request: PropagatorRequest = serde_json::from_str(
        r#"{
            "action": "wilson",
            "params": {"mass": 0.25, "precondition": true},
            "source_site": [1, 0, 2, 3],
            "stout_steps": 1,
            "source_smearing": 2,
            "solver": {"tolerance": 1e-10, "max_iterations": 5000}
        }"#,
    )
    .expect("valid json");
    let prop = compute_propagator(&field, &request).expect("valid request");
    assert!(prop.converged());
    assert_eq!(prop.stats().len(), 12);
    assert!(prop
        .stats()
        .iter()
        .all(|s| s.residual < tolerances::SOLVER_RESIDUAL));
    let corr = prop.pion_correlator();
    assert_eq!(corr.len(), 4);
    assert!(corr.iter().all(|c| *c > 0.0));
}

#[test]
fn bicgstab_solves_unsmeared_point_source_columns() {
    let field = thermalized(8);
    let prop_request = PropagatorRequest {
        params: DiracParams {
            mass: 0.3,
            ..DiracParams::default()
        },
        source_site: [2, 1, 0, 3],
        solver: request(SolverMethod::BiCgStab),
        ..PropagatorRequest::default()
    };
    let prop = compute_propagator(&field, &prop_request).expect("valid request");
    for stats in prop.stats() {
        assert!(stats.converged, "residual {}", stats.residual);
        assert!(stats.iterations > 2);
        assert!(stats.residual < tolerances::SOLVER_RESIDUAL);
    }
}
