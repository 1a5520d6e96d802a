// SPDX-License-Identifier: AGPL-3.0-only

//! Validation harness for the `validate_*` binaries.
//!
//! Every validation binary follows the same pattern:
//!   - explicit pass/fail checks against documented tolerances
//!     (`crate::tolerances` — no ad-hoc thresholds at call sites)
//!   - machine-readable summary on stdout
//!   - exit code 0 (all checks pass) or 1 (any check fails)
//!
//! This module provides the shared infrastructure.

/// How a tolerance threshold is applied.
#[derive(Debug, Clone, Copy)]
pub enum ToleranceMode {
    /// `|observed - expected| < tolerance`
    Absolute,
    /// `|observed - expected| / |expected| < tolerance`
    Relative,
    /// `observed < threshold` (upper bound only)
    UpperBound,
}

impl std::fmt::Display for ToleranceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absolute => write!(f, "abs"),
            Self::Relative => write!(f, "rel"),
            Self::UpperBound => write!(f, "<"),
        }
    }
}

/// A single validation check with result tracking.
#[derive(Debug, Clone)]
pub struct Check {
    /// Human-readable label.
    pub label: String,
    /// Whether this check passed.
    pub passed: bool,
    /// Observed value.
    pub observed: f64,
    /// Expected value (or bound).
    pub expected: f64,
    /// Tolerance used.
    pub tolerance: f64,
    /// How the tolerance was applied.
    pub mode: ToleranceMode,
}

/// Accumulates validation checks and produces a summary with exit code.
#[derive(Debug, Default)]
pub struct ValidationHarness {
    name: String,
    checks: Vec<Check>,
}

impl ValidationHarness {
    /// Harness for one named validation binary.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            checks: Vec::new(),
        }
    }

    fn push(&mut self, label: &str, observed: f64, expected: f64, tol: f64, mode: ToleranceMode) {
        let passed = match mode {
            ToleranceMode::Absolute => (observed - expected).abs() < tol,
            ToleranceMode::Relative => {
                let denom = expected.abs().max(f64::MIN_POSITIVE);
                (observed - expected).abs() / denom < tol
            }
            ToleranceMode::UpperBound => observed < expected,
        };
        self.checks.push(Check {
            label: label.to_string(),
            passed,
            observed,
            expected,
            tolerance: tol,
            mode,
        });
    }

    /// Absolute-tolerance check.
    pub fn check_abs(&mut self, label: &str, observed: f64, expected: f64, tol: f64) {
        self.push(label, observed, expected, tol, ToleranceMode::Absolute);
    }

    /// Relative-tolerance check.
    pub fn check_rel(&mut self, label: &str, observed: f64, expected: f64, tol: f64) {
        self.push(label, observed, expected, tol, ToleranceMode::Relative);
    }

    /// Upper-bound check (`observed < bound`).
    pub fn check_upper(&mut self, label: &str, observed: f64, bound: f64) {
        self.push(label, observed, bound, 0.0, ToleranceMode::UpperBound);
    }

    /// Boolean condition check.
    pub fn check_true(&mut self, label: &str, condition: bool) {
        self.push(
            label,
            f64::from(u8::from(condition)),
            1.0,
            0.5,
            ToleranceMode::Absolute,
        );
    }

    /// Whether every check so far passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Recorded checks.
    #[must_use]
    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    /// Print per-check lines and the final summary; return the exit code.
    #[must_use]
    pub fn summarize(&self) -> i32 {
        println!();
        println!("  ── {} ──", self.name);
        for c in &self.checks {
            let mark = if c.passed { "✓" } else { "✗" };
            println!(
                "  {mark} {:<44} observed {:>14.6e}  expected {:>14.6e} ({} {:.1e})",
                c.label, c.observed, c.expected, c.mode, c.tolerance
            );
        }
        let n_pass = self.checks.iter().filter(|c| c.passed).count();
        let verdict = if self.all_passed() { "PASS" } else { "FAIL" };
        println!("  RESULT: {verdict} ({n_pass}/{} checks)", self.checks.len());
        i32::from(!self.all_passed())
    }
}
