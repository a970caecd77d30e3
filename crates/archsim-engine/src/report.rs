//! Per-test-case outcomes and the submission report

use crate::metrics::SimulationResult;
use crate::validator::ValidationVerdict;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// What happened to one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Simulated and checked against its criteria
    Graded {
        /// Metrics
        result: SimulationResult,
        /// Verdict
        verdict: ValidationVerdict,
    },
    /// The architecture cannot be simulated
    ArchitectureInvalid {
        /// One entry per problem
        reasons: Vec<String>,
    },
    /// The test case itself is malformed
    InvalidTestCase {
        /// Why
        reason: String,
    },
    /// Engine failure
    InternalError {
        /// Why
        reason: String,
    },
    /// Cancelled or timed out
    Cancelled,
}

/// Outcome of one named test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseReport {
    /// Test case name
    pub name: String,
    /// Outcome
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl TestCaseReport {
    /// Graded and every criterion met
    #[must_use]
    pub fn passed(&self) -> bool {
        matches!(&self.outcome, Outcome::Graded { verdict, .. } if verdict.passed)
    }
}

/// Counts per outcome class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeSummary {
    /// Test cases
    pub total: usize,
    /// Graded and passed
    pub passed: usize,
    /// Graded and failed
    pub failed: usize,
    /// Not graded
    pub errored: usize,
}

/// Reports for every test case of a submission, in submission order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradeReport {
    /// Per test case
    pub cases: Vec<TestCaseReport>,
}

impl GradeReport {
    /// Every test case graded and passed
    #[must_use]
    pub fn passed(&self) -> bool {
        !self.cases.is_empty() && self.cases.iter().all(TestCaseReport::passed)
    }

    /// Outcome counts
    #[must_use]
    pub fn summary(&self) -> GradeSummary {
        self.cases.iter().fold(
            GradeSummary {
                total: self.cases.len(),
                ..GradeSummary::default()
            },
            |mut summary, case| {
                match &case.outcome {
                    Outcome::Graded { verdict, .. } if verdict.passed => summary.passed += 1,
                    Outcome::Graded { .. } => summary.failed += 1,
                    _ => summary.errored += 1,
                }
                summary
            },
        )
    }

    /// Human-readable report
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let summary = self.summary();
        let _ = writeln!(out, "=== Grading Report ===");
        let _ = writeln!(
            out,
            "Test cases: {} (passed {}, failed {}, not graded {})",
            summary.total, summary.passed, summary.failed, summary.errored
        );

        for case in &self.cases {
            let _ = writeln!(out);
            match &case.outcome {
                Outcome::Graded { result, verdict } => {
                    let status = if verdict.passed { "PASS" } else { "FAIL" };
                    let _ = writeln!(out, "[{status}] {}", case.name);
                    let _ = writeln!(
                        out,
                        "  p50/p95/p99: {} / {} / {}",
                        latency(result.p50_latency_ms),
                        latency(result.p95_latency_ms),
                        latency(result.p99_latency_ms)
                    );
                    let _ = writeln!(
                        out,
                        "  error rate: {:.2}%  availability: {:.2}%  downtime: {:.0}s",
                        result.error_rate * 100.0,
                        result.availability * 100.0,
                        result.downtime_seconds
                    );
                    for failure in &verdict.failures {
                        let _ = writeln!(out, "  x {}: {}", failure.criterion, failure.message);
                    }
                    for note in &verdict.notes {
                        let _ = writeln!(out, "  - {note}");
                    }
                }
                Outcome::ArchitectureInvalid { reasons } => {
                    let _ = writeln!(out, "[INVALID] {}", case.name);
                    for reason in reasons {
                        let _ = writeln!(out, "  x {reason}");
                    }
                }
                Outcome::InvalidTestCase { reason } => {
                    let _ = writeln!(out, "[BAD TEST CASE] {}: {reason}", case.name);
                }
                Outcome::InternalError { reason } => {
                    let _ = writeln!(out, "[ERROR] {}: {reason}", case.name);
                }
                Outcome::Cancelled => {
                    let _ = writeln!(out, "[CANCELLED] {}", case.name);
                }
            }
        }

        let _ = writeln!(out, "\n=== Result: {} ===", if self.passed() { "PASS" } else { "FAIL" });
        out
    }
}

fn latency(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |ms| format!("{ms:.1}ms"))
}
