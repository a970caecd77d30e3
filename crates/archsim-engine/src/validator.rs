//! Pass/fail verdicts against declared criteria
//!
//! Every declared criterion is checked on its own and every violated one is
//! listed. Undeclared criteria are never evaluated. Notes point learners at
//! the components that shed load.

use crate::metrics::SimulationResult;
use archsim_model::PassCriteria;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// A pass criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Criterion {
    /// `maxP99LatencyMs`
    MaxP99LatencyMs,
    /// `maxErrorRate`
    MaxErrorRate,
    /// `minAvailability`
    MinAvailability,
    /// `maxDowntimeSeconds`
    MaxDowntimeSeconds,
}

impl Criterion {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MaxP99LatencyMs => "maxP99LatencyMs",
            Self::MaxErrorRate => "maxErrorRate",
            Self::MinAvailability => "minAvailability",
            Self::MaxDowntimeSeconds => "maxDowntimeSeconds",
        }
    }
}

impl Display for Criterion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One violated criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionFailure {
    /// Which criterion
    pub criterion: Criterion,
    /// Declared threshold
    pub threshold: f64,
    /// Measured value; `None` when nothing could be measured
    pub actual: Option<f64>,
    /// Learner-facing explanation
    pub message: String,
}

/// Outcome of checking a result against its criteria
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    /// No declared criterion violated
    pub passed: bool,
    /// Violated criteria, in declaration order
    pub failures: Vec<CriterionFailure>,
    /// Feedback that does not affect the verdict
    pub notes: Vec<String>,
}

/// Check `result` against `criteria`
#[must_use]
pub fn validate(result: &SimulationResult, criteria: &PassCriteria) -> ValidationVerdict {
    let mut failures = Vec::new();

    if let Some(max) = criteria.max_p99_latency_ms {
        match result.p99_latency_ms {
            Some(p99) if p99 <= max => {}
            Some(p99) => failures.push(CriterionFailure {
                criterion: Criterion::MaxP99LatencyMs,
                threshold: max,
                actual: Some(p99),
                message: format!("p99 latency {p99:.1}ms exceeds the {max:.1}ms limit"),
            }),
            None => failures.push(CriterionFailure {
                criterion: Criterion::MaxP99LatencyMs,
                threshold: max,
                actual: None,
                message: "no request completed, so p99 latency cannot meet its limit".to_string(),
            }),
        }
    }

    if let Some(max) = criteria.max_error_rate {
        if result.error_rate > max {
            failures.push(CriterionFailure {
                criterion: Criterion::MaxErrorRate,
                threshold: max,
                actual: Some(result.error_rate),
                message: format!(
                    "error rate {} exceeds the {} limit",
                    percent(result.error_rate),
                    percent(max)
                ),
            });
        }
    }

    if let Some(min) = criteria.min_availability {
        if result.availability < min {
            failures.push(CriterionFailure {
                criterion: Criterion::MinAvailability,
                threshold: min,
                actual: Some(result.availability),
                message: format!(
                    "availability {} is below the required {}",
                    percent(result.availability),
                    percent(min)
                ),
            });
        }
    }

    if let Some(max) = criteria.max_downtime_seconds {
        if result.downtime_seconds > max {
            failures.push(CriterionFailure {
                criterion: Criterion::MaxDowntimeSeconds,
                threshold: max,
                actual: Some(result.downtime_seconds),
                message: format!(
                    "downtime {:.0}s exceeds the {max:.0}s limit",
                    result.downtime_seconds
                ),
            });
        }
    }

    ValidationVerdict {
        passed: failures.is_empty(),
        failures,
        notes: notes(result),
    }
}

fn notes(result: &SimulationResult) -> Vec<String> {
    let mut notes: Vec<String> = result
        .bottlenecks()
        .into_iter()
        .map(|component| {
            format!(
                "`{}` ({}) is a bottleneck: it dropped {:.0} requests at up to {} utilization",
                component.id,
                component.kind,
                component.dropped_requests,
                percent(component.peak_utilization)
            )
        })
        .collect();
    if result.downtime_seconds > 0.0 {
        notes.push(format!(
            "the system was down for {:.0}s of {}s",
            result.downtime_seconds, result.duration_seconds
        ));
    }
    notes
}

fn percent(ratio: f64) -> String {
    format!("{:.2}%", ratio * 100.0)
}
