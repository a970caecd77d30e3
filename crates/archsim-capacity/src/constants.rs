//! Tunable capacity constants
//!
//! Every number the capacity model relies on lives here so a deployment can
//! recalibrate without touching the resolver. Defaults are deliberately round.

use crate::error::CapacityError;
use serde::{Deserialize, Serialize};

/// Shape of the latency-vs-utilization curve shared by all components
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveShape {
    /// Utilization where queueing starts to dominate
    pub knee_utilization: f64,
    /// Linear growth below the knee, as a fraction of base latency per unit utilization
    pub linear_slope: f64,
    /// Quadratic penalty applied past the knee
    pub queueing_penalty: f64,
    /// Utilization ceiling; demand beyond it no longer raises latency
    pub max_utilization: f64,
}

impl Default for CurveShape {
    fn default() -> Self {
        Self {
            knee_utilization: 0.8,
            linear_slope: 0.1,
            queueing_penalty: 4.0,
            max_utilization: 4.0,
        }
    }
}

/// Capacity constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConstants {
    /// Requests per second one app server instance can serve
    pub app_server_rps_per_instance: f64,
    /// App server base latency (ms)
    pub app_server_latency_ms: f64,
    /// Requests per second one database node can serve
    pub db_rps_per_instance: f64,
    /// Write ceiling of an unsharded single-leader database
    pub single_leader_write_rps: f64,
    /// Write ceiling multiplier for multi-leader replication
    pub multi_leader_write_multiplier: f64,
    /// Database base latency (ms)
    pub db_latency_ms: f64,
    /// Cache throughput ceiling
    pub cache_max_rps: f64,
    /// Cache base latency (ms)
    pub cache_latency_ms: f64,
    /// Default ceiling of pass-through components without `maxRps`
    pub pass_through_max_rps: f64,
    /// Client latency (ms)
    pub client_latency_ms: f64,
    /// Load balancer latency (ms)
    pub load_balancer_latency_ms: f64,
    /// Message queue latency (ms)
    pub message_queue_latency_ms: f64,
    /// CDN latency (ms)
    pub cdn_latency_ms: f64,
    /// Object store latency (ms)
    pub object_store_latency_ms: f64,
    /// Latency curve shape
    pub curve: CurveShape,
}

impl Default for CapacityConstants {
    fn default() -> Self {
        Self {
            app_server_rps_per_instance: 1000.0,
            app_server_latency_ms: 15.0,
            db_rps_per_instance: 1000.0,
            single_leader_write_rps: 1000.0,
            multi_leader_write_multiplier: 2.0,
            db_latency_ms: 10.0,
            cache_max_rps: 1_000_000.0,
            cache_latency_ms: 2.0,
            pass_through_max_rps: 1_000_000.0,
            client_latency_ms: 0.0,
            load_balancer_latency_ms: 1.0,
            message_queue_latency_ms: 5.0,
            cdn_latency_ms: 5.0,
            object_store_latency_ms: 20.0,
            curve: CurveShape::default(),
        }
    }
}

impl CapacityConstants {
    /// Reject constants that would produce non-physical profiles
    ///
    /// # Errors
    /// Returns the first out-of-range constant
    pub fn validate(&self) -> Result<(), CapacityError> {
        let positive = [
            ("app_server_rps_per_instance", self.app_server_rps_per_instance),
            ("db_rps_per_instance", self.db_rps_per_instance),
            ("single_leader_write_rps", self.single_leader_write_rps),
            ("cache_max_rps", self.cache_max_rps),
            ("pass_through_max_rps", self.pass_through_max_rps),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(name, value, "a finite value > 0"));
            }
        }

        // A sharded database must out-write the unsharded leader.
        if self.single_leader_write_rps > self.db_rps_per_instance {
            return Err(invalid(
                "single_leader_write_rps",
                self.single_leader_write_rps,
                "<= db_rps_per_instance",
            ));
        }

        let latencies = [
            ("app_server_latency_ms", self.app_server_latency_ms),
            ("db_latency_ms", self.db_latency_ms),
            ("cache_latency_ms", self.cache_latency_ms),
            ("client_latency_ms", self.client_latency_ms),
            ("load_balancer_latency_ms", self.load_balancer_latency_ms),
            ("message_queue_latency_ms", self.message_queue_latency_ms),
            ("cdn_latency_ms", self.cdn_latency_ms),
            ("object_store_latency_ms", self.object_store_latency_ms),
            ("curve.linear_slope", self.curve.linear_slope),
            ("curve.queueing_penalty", self.curve.queueing_penalty),
        ];
        for (name, value) in latencies {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(name, value, "a finite value >= 0"));
            }
        }

        if !(self.multi_leader_write_multiplier.is_finite() && self.multi_leader_write_multiplier >= 1.0) {
            return Err(invalid(
                "multi_leader_write_multiplier",
                self.multi_leader_write_multiplier,
                ">= 1",
            ));
        }
        let knee = self.curve.knee_utilization;
        if !(knee > 0.0 && knee < 1.0) {
            return Err(invalid("curve.knee_utilization", knee, "(0, 1)"));
        }
        let ceiling = self.curve.max_utilization;
        if !(ceiling.is_finite() && ceiling >= 1.0) {
            return Err(invalid("curve.max_utilization", ceiling, "a finite value >= 1"));
        }
        Ok(())
    }
}

const fn invalid(name: &'static str, value: f64, expected: &'static str) -> CapacityError {
    CapacityError::InvalidConstant {
        name,
        value,
        expected,
    }
}
