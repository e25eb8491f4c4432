// SPDX-License-Identifier: AGPL-3.0-only

//! Pure-gauge SU(3) validation.
//!
//! Runs the Monte Carlo engine on 4⁴ and 8×4³ lattices and checks it
//! against exact identities and known results.
//!
//! # Validation targets
//!
//! | Observable | Expected | Tolerance | Basis |
//! |-----------|----------|-----------|-------|
//! | Cold plaquette, rectangle, Polyakov | 1.0 | exact | Definition |
//! | Loops under local gauge transformation | unchanged | exact | Gauge invariance |
//! | Plaquette at β=0.5 | β/18 | 0.01 abs | Strong-coupling expansion |
//! | Plaquette at β=5.5 | ~0.50 | window | MC literature |
//! | β=0 Metropolis traces | Haar moments | statistical | Haar measure |
//! | Parallel sweep | serial sweep | bit-exact | Chunk independence |
//!
//! # Provenance
//!
//! Strong-coupling expansion: Creutz (1983), Ch. 9.
//! Haar moments `⟨Tr U⟩ = 0`, `⟨|Tr U|²⟩ = 1`: Creutz, J. Math. Phys. 19, 2043 (1978).

use latqcd::lattice::action::GaugeAction;
use latqcd::lattice::gauge::GaugeField;
use latqcd::lattice::monte_carlo::{GaugeConfig, MonteCarloEngine, UpdateMethod};
use latqcd::lattice::su3::Su3Matrix;
use latqcd::tolerances;
use latqcd::validation::ValidationHarness;
use latqcd::LatticeError;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn config(beta: f64, seed: u64) -> GaugeConfig {
    GaugeConfig {
        beta,
        seed: Some(seed),
        ..GaugeConfig::default()
    }
}

/// Mean plaquette over `n` configurations after `therm` sweeps.
fn mean_plaquette(engine: &mut MonteCarloEngine, therm: usize, n: usize) -> f64 {
    engine.thermalize(therm);
    let mut sum = 0.0;
    for _ in 0..n {
        sum += engine.next_config().average_plaquette();
    }
    sum / n as f64
}

fn max_link_difference(a: &GaugeField, b: &GaugeField) -> f64 {
    let mut max = 0.0_f64;
    for site in 0..a.volume() {
        for mu in 0..4 {
            let d = a.link_at(site, mu) - b.link_at(site, mu);
            max = max.max(d.norm_sq().sqrt());
        }
    }
    max
}

fn run(harness: &mut ValidationHarness) -> Result<(), LatticeError> {
    // ═══ Test 1: Cold start identities ═══
    println!("═══ Cold Start ═══");
    {
        let field = GaugeField::cold_start(&[4, 4, 4, 4], &[4, 4, 4, 4])?;
        let plaq = field.average_plaquette();
        let rect = field.average_rectangle();
        let poly = field.average_polyakov_loop();
        println!("  Plaquette:     {plaq:.12}");
        println!("  Rectangle:     {rect:.12}");
        println!("  Polyakov loop: {poly:.12}");
        harness.check_abs("cold plaquette", plaq, 1.0, tolerances::COLD_PLAQUETTE_ABS);
        harness.check_abs("cold rectangle", rect, 1.0, tolerances::COLD_PLAQUETTE_ABS);
        harness.check_abs("cold polyakov", poly, 1.0, tolerances::COLD_PLAQUETTE_ABS);
    }
    println!();

    // ═══ Test 2: Gauge invariance ═══
    println!("═══ Gauge Invariance (hot 4⁴) ═══");
    {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let field = GaugeField::hot_start(&[4, 4, 4, 4], &[2, 2, 2, 2], &mut rng)?;
        let omega: Vec<Su3Matrix> = (0..field.volume())
            .map(|_| Su3Matrix::random_haar(&mut rng))
            .collect();
        let mut transformed = field.clone();
        transformed.gauge_transform(&omega);
        for (label, before, after) in [
            ("plaquette", field.average_plaquette(), transformed.average_plaquette()),
            ("rectangle", field.average_rectangle(), transformed.average_rectangle()),
            (
                "wilson loop 2×2",
                field.average_wilson_loop(2, 2),
                transformed.average_wilson_loop(2, 2),
            ),
            (
                "polyakov loop",
                field.average_polyakov_loop(),
                transformed.average_polyakov_loop(),
            ),
        ] {
            println!("  {label:<16} {before:+.12} → {after:+.12}");
            harness.check_abs_or_rel(
                &format!("gauge invariant {label}"),
                after,
                before,
                tolerances::GAUGE_INVARIANCE_ABS,
            );
        }
        harness.check_upper(
            "transformed links in SU(3)",
            transformed.max_su3_deviation(),
            tolerances::SU3_UNITARITY,
        );
    }
    println!();

    // ═══ Test 3: Strong coupling ═══
    println!("═══ Heatbath at β=0.5 (strong coupling, 4⁴) ═══");
    {
        let beta = 0.5;
        let mut engine = MonteCarloEngine::new(config(beta, 11))?;
        let plaq = mean_plaquette(&mut engine, 20, 20);
        println!("  Mean plaquette: {plaq:.6} (β/18 = {:.6})", beta / 18.0);
        harness.check_abs(
            "strong-coupling plaquette",
            plaq,
            beta / 18.0,
            tolerances::STRONG_COUPLING_PLAQUETTE_ABS,
        );
    }
    println!();

    // ═══ Test 4: β = 5.5 ═══
    println!("═══ Heatbath at β=5.5 (confined, 4⁴) ═══");
    {
        let mut engine = MonteCarloEngine::new(config(5.5, 42))?;
        let plaq = mean_plaquette(&mut engine, 50, 20);
        let poly = engine.field().average_polyakov_loop();
        println!("  Mean plaquette: {plaq:.6}");
        println!("  |L|:            {poly:.6}");
        harness.check_lower(
            "plaquette β=5.5 lower",
            plaq,
            tolerances::BETA_5_5_PLAQUETTE_MIN,
        );
        harness.check_upper(
            "plaquette β=5.5 upper",
            plaq,
            tolerances::BETA_5_5_PLAQUETTE_MAX,
        );
        harness.check_upper(
            "links in SU(3) after 70 sweeps",
            engine.field().max_su3_deviation(),
            tolerances::SU3_UNITARITY,
        );
    }
    println!();

    // ═══ Test 5: Improved actions ═══
    println!("═══ Metropolis, improved actions at β=5.0 (4⁴) ═══");
    for action in [GaugeAction::RectangleImproved, GaugeAction::TwistedRectangleImproved] {
        let mut engine = MonteCarloEngine::new(GaugeConfig {
            action,
            update_method: UpdateMethod::Metropolis,
            ..config(5.0, 5)
        })?;
        let plaq = mean_plaquette(&mut engine, 10, 5);
        let acceptance = engine.acceptance_rate().unwrap_or(0.0);
        println!("  {action:?}: plaquette {plaq:.6}, acceptance {:.1}%", acceptance * 100.0);
        harness.check_lower(
            &format!("{action:?} acceptance"),
            acceptance,
            tolerances::METROPOLIS_ACCEPTANCE_MIN,
        );
        harness.check_bool(
            &format!("{action:?} plaquette in (0, 1)"),
            plaq > 0.0 && plaq < 1.0,
        );
    }
    println!();

    // ═══ Test 6: β = 0 Haar measure ═══
    println!("═══ Metropolis at β=0 (Haar measure, 4⁴) ═══");
    {
        let mut engine = MonteCarloEngine::new(GaugeConfig {
            update_method: UpdateMethod::Metropolis,
            hot_start: true,
            ..config(0.0, 3)
        })?;
        engine.thermalize(5);
        let (mut tr, mut tr_sq, mut n) = (0.0, 0.0, 0.0);
        for _ in 0..20 {
            let field = engine.next_config();
            for site in 0..field.volume() {
                for mu in 0..4 {
                    let t = field.link_at(site, mu).trace();
                    tr += t.re;
                    tr_sq += t.norm_sqr();
                    n += 1.0;
                }
            }
        }
        let (tr, tr_sq) = (tr / (3.0 * n), tr_sq / n);
        println!("  ⟨Re Tr U⟩/3 = {tr:+.5}, ⟨|Tr U|²⟩ = {tr_sq:.5}");
        harness.check_abs("Haar ⟨Re Tr U⟩", tr, 0.0, tolerances::HAAR_TRACE_ABS);
        harness.check_abs("Haar ⟨|Tr U|²⟩", tr_sq, 1.0, tolerances::HAAR_TRACE_SQ_ABS);
    }
    println!();

    // ═══ Test 7: Parallel sweep against serial ═══
    println!("═══ Chunked parallel vs serial (8×4³, chunk 2) ═══");
    {
        let base = GaugeConfig {
            time_extent: 8,
            chunk_size: 2,
            hot_start: true,
            ..config(5.7, 19)
        };
        let mut parallel = MonteCarloEngine::new(GaugeConfig {
            parallel: true,
            ..base.clone()
        })?;
        let mut serial = MonteCarloEngine::new(GaugeConfig {
            parallel: false,
            ..base
        })?;
        parallel.sweep(3);
        serial.sweep(3);
        let diff = max_link_difference(parallel.field(), serial.field());
        println!("  parallel engine: {}", parallel.is_parallel());
        println!("  max |ΔU|:        {diff:.3e}");
        harness.check_bool("schedule accepted as parallel", parallel.is_parallel());
        harness.check_abs("parallel equals serial", diff, 0.0, f64::MIN_POSITIVE);
    }

    Ok(())
}

fn main() {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  Pure Gauge SU(3) Validation                                ║");
    println!("║  Heatbath + Metropolis, plaquette and improved actions      ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let mut harness = ValidationHarness::new("pure_gauge_su3");
    if let Err(e) = run(&mut harness) {
        println!("setup failed: {e}");
        harness.check_bool("setup", false);
    }
    harness.finish();
}
