//! Declarative test cases: load profile, duration, fault schedule and pass
//! criteria

use crate::component::ComponentId;
use crate::connection::TrafficClass;
use crate::error::TestCaseError;
use serde::{Deserialize, Serialize};

/// Which request classes a test case offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficKind {
    /// Reads only
    Read,
    /// Writes only
    Write,
    /// Reads and writes split by `readRatio`
    #[serde(alias = "read_write", alias = "both")]
    Mixed,
}

/// Offered request rate per class
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OfferedLoad {
    /// Reads per second
    pub reads: f64,
    /// Writes per second
    pub writes: f64,
}

impl OfferedLoad {
    /// Rate for one class
    #[inline]
    #[must_use]
    pub fn for_class(&self, class: TrafficClass) -> f64 {
        match class {
            TrafficClass::Read => self.reads,
            TrafficClass::Write => self.writes,
        }
    }

    /// Total rate
    #[inline]
    #[must_use]
    pub fn total(&self) -> f64 {
        self.reads + self.writes
    }
}

/// Load profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Traffic {
    /// Offered classes
    #[serde(rename = "type")]
    pub kind: TrafficKind,
    /// Requests per second
    pub rps: f64,
    /// Fraction of reads, required for mixed traffic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_ratio: Option<f64>,
    /// Average response payload
    #[serde(
        default,
        rename = "avgResponseSizeMB",
        alias = "avgResponseSizeMb",
        skip_serializing_if = "Option::is_none"
    )]
    pub avg_response_size_mb: Option<f64>,
}

impl Traffic {
    /// Read-only traffic
    #[must_use]
    pub fn reads(rps: f64) -> Self {
        Self {
            kind: TrafficKind::Read,
            rps,
            read_ratio: Some(1.0),
            avg_response_size_mb: None,
        }
    }

    /// Write-only traffic
    #[must_use]
    pub fn writes(rps: f64) -> Self {
        Self {
            kind: TrafficKind::Write,
            rps,
            read_ratio: Some(0.0),
            avg_response_size_mb: None,
        }
    }

    /// Mixed traffic with the given read fraction
    #[must_use]
    pub fn mixed(rps: f64, read_ratio: f64) -> Self {
        Self {
            kind: TrafficKind::Mixed,
            rps,
            read_ratio: Some(read_ratio),
            avg_response_size_mb: None,
        }
    }

    /// Set the average response size
    #[inline]
    #[must_use]
    pub fn with_response_size_mb(mut self, size_mb: f64) -> Self {
        self.avg_response_size_mb = Some(size_mb);
        self
    }

    /// Split the rate into classes
    #[must_use]
    pub fn offered(&self) -> OfferedLoad {
        match self.kind {
            TrafficKind::Read => OfferedLoad {
                reads: self.rps,
                writes: 0.0,
            },
            TrafficKind::Write => OfferedLoad {
                reads: 0.0,
                writes: self.rps,
            },
            TrafficKind::Mixed => {
                let reads = self.rps * self.read_ratio.unwrap_or(1.0);
                OfferedLoad {
                    reads,
                    writes: self.rps - reads,
                }
            }
        }
    }

    /// Classes with a non-zero offered rate
    #[must_use]
    pub fn classes(&self) -> Vec<TrafficClass> {
        let offered = self.offered();
        TrafficClass::ALL
            .into_iter()
            .filter(|class| offered.for_class(*class) > 0.0)
            .collect()
    }
}

/// Declarative thresholds; an absent field is not tested
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassCriteria {
    /// Upper bound on p99 latency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_p99_latency_ms: Option<f64>,
    /// Upper bound on the run's error rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_error_rate: Option<f64>,
    /// Lower bound on availability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_availability: Option<f64>,
    /// Upper bound on downtime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_downtime_seconds: Option<f64>,
}

impl PassCriteria {
    /// Require p99 latency at most `ms`
    #[must_use]
    pub fn with_max_p99_latency_ms(mut self, ms: f64) -> Self {
        self.max_p99_latency_ms = Some(ms);
        self
    }

    /// Require error rate at most `rate`
    #[must_use]
    pub fn with_max_error_rate(mut self, rate: f64) -> Self {
        self.max_error_rate = Some(rate);
        self
    }

    /// Require availability at least `availability`
    #[must_use]
    pub fn with_min_availability(mut self, availability: f64) -> Self {
        self.min_availability = Some(availability);
        self
    }

    /// Require downtime at most `seconds`
    #[must_use]
    pub fn with_max_downtime_seconds(mut self, seconds: f64) -> Self {
        self.max_downtime_seconds = Some(seconds);
        self
    }

    /// Whether nothing is tested
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.max_p99_latency_ms.is_none()
            && self.max_error_rate.is_none()
            && self.min_availability.is_none()
            && self.max_downtime_seconds.is_none()
    }

    fn validate(&self) -> Result<(), TestCaseError> {
        let unit = |v: f64| (0.0..=1.0).contains(&v);
        let non_negative = |v: f64| v.is_finite() && v >= 0.0;
        let checks: [(&'static str, Option<f64>, fn(f64) -> bool); 4] = [
            ("maxP99LatencyMs", self.max_p99_latency_ms, non_negative),
            ("maxErrorRate", self.max_error_rate, unit),
            ("minAvailability", self.min_availability, unit),
            ("maxDowntimeSeconds", self.max_downtime_seconds, non_negative),
        ];
        for (criterion, value, valid) in checks {
            if let Some(value) = value {
                if !valid(value) {
                    return Err(TestCaseError::InvalidCriterion { criterion, value });
                }
            }
        }
        Ok(())
    }
}

/// Scheduled fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Database loses all throughput until recovery
    DbCrash,
    /// Cache loses its contents for the rest of the run
    CacheFlush,
}

/// Fault schedule of a test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureInjection {
    /// Fault type
    #[serde(rename = "type")]
    pub kind: FaultKind,
    /// First affected second
    pub at_second: u32,
    /// First healthy second after the fault
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_second: Option<u32>,
    /// Affected component; defaults are chosen by the simulator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ComponentId>,
}

impl FailureInjection {
    /// Database crash starting at `at_second`
    #[must_use]
    pub fn db_crash(at_second: u32, recovery_second: Option<u32>) -> Self {
        Self {
            kind: FaultKind::DbCrash,
            at_second,
            recovery_second,
            target: None,
        }
    }

    /// Cache flush at `at_second`
    #[must_use]
    pub fn cache_flush(at_second: u32) -> Self {
        Self {
            kind: FaultKind::CacheFlush,
            at_second,
            recovery_second: None,
            target: None,
        }
    }

    /// Aim the fault at a specific component
    #[must_use]
    pub fn with_target(mut self, target: impl Into<ComponentId>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Whether the fault affects second `t`
    ///
    /// A crash lasts until `recovery_second` (forever without one); a flush
    /// is never undone.
    #[must_use]
    pub fn is_active_at(&self, t: u32) -> bool {
        match self.kind {
            FaultKind::DbCrash => {
                t >= self.at_second && self.recovery_second.map_or(true, |recovery| t < recovery)
            }
            FaultKind::CacheFlush => t >= self.at_second,
        }
    }
}

/// One graded scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    /// Display name (for example `NFR-P1`)
    #[serde(default)]
    pub name: String,
    /// Load profile
    pub traffic: Traffic,
    /// Simulated duration
    pub duration_seconds: u32,
    /// Thresholds
    #[serde(default)]
    pub pass_criteria: PassCriteria,
    /// Fault schedule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_injection: Option<FailureInjection>,
}

impl TestCase {
    /// Create a test case without criteria or faults
    #[must_use]
    pub fn new(name: impl Into<String>, traffic: Traffic, duration_seconds: u32) -> Self {
        Self {
            name: name.into(),
            traffic,
            duration_seconds,
            pass_criteria: PassCriteria::default(),
            failure_injection: None,
        }
    }

    /// Set pass criteria
    #[must_use]
    pub fn with_criteria(mut self, criteria: PassCriteria) -> Self {
        self.pass_criteria = criteria;
        self
    }

    /// Set the fault schedule
    #[must_use]
    pub fn with_failure(mut self, failure: FailureInjection) -> Self {
        self.failure_injection = Some(failure);
        self
    }

    /// Check the contract; graph-dependent checks happen in the simulator
    ///
    /// # Errors
    /// Returns the first violated rule.
    pub fn validate(&self, max_duration_seconds: u32) -> Result<(), TestCaseError> {
        let traffic = &self.traffic;
        if !(traffic.rps.is_finite() && traffic.rps >= 0.0) {
            return Err(TestCaseError::InvalidRps(traffic.rps));
        }
        match (traffic.kind, traffic.read_ratio) {
            (TrafficKind::Mixed, None) => return Err(TestCaseError::MissingReadRatio),
            (_, Some(ratio)) if !(0.0..=1.0).contains(&ratio) => {
                return Err(TestCaseError::InvalidReadRatio(ratio));
            }
            _ => {}
        }
        if let Some(size) = traffic.avg_response_size_mb {
            if !(size.is_finite() && size >= 0.0) {
                return Err(TestCaseError::InvalidResponseSize(size));
            }
        }

        if self.duration_seconds == 0 || self.duration_seconds > max_duration_seconds {
            return Err(TestCaseError::InvalidDuration {
                duration: self.duration_seconds,
                max: max_duration_seconds,
            });
        }

        if let Some(failure) = &self.failure_injection {
            if failure.at_second >= self.duration_seconds {
                return Err(TestCaseError::FaultOutsideRun {
                    at_second: failure.at_second,
                    duration: self.duration_seconds,
                });
            }
            if let Some(recovery_second) = failure.recovery_second {
                if recovery_second <= failure.at_second {
                    return Err(TestCaseError::RecoveryBeforeFault {
                        at_second: failure.at_second,
                        recovery_second,
                    });
                }
            }
        }

        self.pass_criteria.validate()
    }
}
