// SPDX-License-Identifier: AGPL-3.0-only

//! Pass/fail harness for the validation binaries.
//!
//! Each binary records checks against the thresholds in
//! [`crate::tolerances`], prints a summary table and exits 0 when every
//! check passed, 1 otherwise.

use std::fmt::{self, Write as _};
use std::process;

/// How an observed value is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToleranceMode {
    /// `|observed − expected| < tolerance`
    Absolute,
    /// `|observed − expected| / |expected| < tolerance`
    Relative,
    /// Either of the above.
    AbsoluteOrRelative,
    /// `observed < threshold`
    UpperBound,
    /// `observed > threshold`
    LowerBound,
    /// Boolean condition.
    Flag,
}

impl fmt::Display for ToleranceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absolute => "abs",
            Self::Relative => "rel",
            Self::AbsoluteOrRelative => "abs|rel",
            Self::UpperBound => "<",
            Self::LowerBound => ">",
            Self::Flag => "bool",
        };
        f.write_str(s)
    }
}

/// One recorded check.
#[derive(Debug, Clone)]
pub struct Check {
    /// Label printed in the summary.
    pub label: String,
    /// Outcome.
    pub passed: bool,
    /// Measured value.
    pub observed: f64,
    /// Reference value or bound.
    pub expected: f64,
    /// Tolerance (equal to the bound for one-sided checks).
    pub tolerance: f64,
    /// Comparison used.
    pub mode: ToleranceMode,
}

/// Collects checks for one validation binary.
#[derive(Debug, Default)]
#[must_use]
pub struct ValidationHarness {
    /// Binary name.
    pub name: String,
    /// Checks in recording order.
    pub checks: Vec<Check>,
}

impl ValidationHarness {
    /// Empty harness for the binary `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            checks: Vec::new(),
        }
    }

    fn record(
        &mut self,
        label: &str,
        passed: bool,
        observed: f64,
        expected: f64,
        tolerance: f64,
        mode: ToleranceMode,
    ) {
        self.checks.push(Check {
            label: label.to_string(),
            passed,
            observed,
            expected,
            tolerance,
            mode,
        });
    }

    /// `|observed − expected| < tolerance`.
    pub fn check_abs(&mut self, label: &str, observed: f64, expected: f64, tolerance: f64) {
        let passed = (observed - expected).abs() < tolerance;
        self.record(label, passed, observed, expected, tolerance, ToleranceMode::Absolute);
    }

    /// Relative error below `tolerance`; absolute when `expected` is zero.
    pub fn check_rel(&mut self, label: &str, observed: f64, expected: f64, tolerance: f64) {
        let passed = if expected.abs() > f64::EPSILON {
            ((observed - expected) / expected).abs() < tolerance
        } else {
            observed.abs() < tolerance
        };
        self.record(label, passed, observed, expected, tolerance, ToleranceMode::Relative);
    }

    /// Passes when either the absolute or the relative error is below
    /// `tolerance`.
    pub fn check_abs_or_rel(&mut self, label: &str, observed: f64, expected: f64, tolerance: f64) {
        let abs_err = (observed - expected).abs();
        let rel_err = if expected.abs() > crate::tolerances::NEAR_ZERO_EXPECTED {
            abs_err / expected.abs()
        } else {
            abs_err
        };
        let passed = abs_err < tolerance || rel_err < tolerance;
        self.record(
            label,
            passed,
            observed,
            expected,
            tolerance,
            ToleranceMode::AbsoluteOrRelative,
        );
    }

    /// `observed < threshold`.
    pub fn check_upper(&mut self, label: &str, observed: f64, threshold: f64) {
        self.record(
            label,
            observed < threshold,
            observed,
            threshold,
            threshold,
            ToleranceMode::UpperBound,
        );
    }

    /// `observed > threshold`.
    pub fn check_lower(&mut self, label: &str, observed: f64, threshold: f64) {
        self.record(
            label,
            observed > threshold,
            observed,
            threshold,
            threshold,
            ToleranceMode::LowerBound,
        );
    }

    /// Boolean condition.
    pub fn check_bool(&mut self, label: &str, passed: bool) {
        let observed = f64::from(u8::from(passed));
        self.record(label, passed, observed, 1.0, 0.0, ToleranceMode::Flag);
    }

    /// Number of passing checks.
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    /// Number of checks.
    #[must_use]
    pub const fn total_count(&self) -> usize {
        self.checks.len()
    }

    /// Whether every check passed (vacuously true when empty).
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Summary table as printed by [`finish`](Self::finish).
    #[must_use]
    pub fn summary(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(
            s,
            "═══ {} validation: {}/{} checks passed ═══",
            self.name,
            self.passed_count(),
            self.total_count()
        );
        for check in &self.checks {
            let icon = if check.passed { "✓" } else { "✗" };
            let _ = writeln!(
                s,
                "  {icon} {}: observed={:.6e}, expected={:.6e}, tol={:.2e} ({})",
                check.label, check.observed, check.expected, check.tolerance, check.mode
            );
        }
        s
    }

    /// Print the summary and exit: 0 if all checks passed, 1 otherwise.
    pub fn finish(&self) -> ! {
        println!();
        print!("{}", self.summary());
        if self.all_passed() {
            println!("ALL CHECKS PASSED");
            process::exit(0);
        }
        let failed: Vec<&str> = self
            .checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.label.as_str())
            .collect();
        println!("FAILED CHECKS: {}", failed.join(", "));
        process::exit(1);
    }
}
