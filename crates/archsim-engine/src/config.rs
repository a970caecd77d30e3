//! Engine configuration
//!
//! Loaded from TOML; every field has a default so a partial file (or none
//! at all) is valid.
//!
//! ```toml
//! max_parallel_runs = 8
//! run_timeout_secs = 30
//!
//! [simulation]
//! failover_detection_seconds = 5
//!
//! [capacity]
//! app_server_rps_per_instance = 800
//! ```

use crate::error::EngineConfigError;
use archsim_capacity::{CapacityConstants, DEFAULT_CACHE_ENTRIES};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Knobs of the time-stepped simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Simulated seconds per tick
    pub tick_seconds: u32,
    /// Delay before a crashed database is replaced by a standby or promoted replica
    pub failover_detection_seconds: u32,
    /// Tick error rate above which the tick counts as downtime
    pub downtime_error_threshold: f64,
    /// Maximum number of per-tick entries kept in a result trace
    pub trace_limit: usize,
    /// Longest accepted test case
    pub max_duration_seconds: u32,
    /// Bound on enumerated paths per traffic class
    pub max_paths: usize,
    /// Transfer time added per MB of average response size
    pub transfer_ms_per_mb: f64,
    /// Time for a flushed cache to regain its hit ratio; `None` keeps it cold
    pub cache_rewarm_seconds: Option<u32>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tick_seconds: 1,
            failover_detection_seconds: 3,
            downtime_error_threshold: 0.5,
            trace_limit: 600,
            max_duration_seconds: 86_400,
            max_paths: 4096,
            transfer_ms_per_mb: 10.0,
            cache_rewarm_seconds: None,
        }
    }
}

impl SimulationSettings {
    /// Reject unusable settings
    ///
    /// # Errors
    /// Returns the first invalid setting
    pub fn validate(&self) -> Result<(), EngineConfigError> {
        if self.tick_seconds == 0 {
            return Err(invalid("simulation.tick_seconds", "must be at least 1"));
        }
        if !(0.0..1.0).contains(&self.downtime_error_threshold) {
            return Err(invalid("simulation.downtime_error_threshold", "must be within [0, 1)"));
        }
        if self.max_duration_seconds == 0 {
            return Err(invalid("simulation.max_duration_seconds", "must be at least 1"));
        }
        if self.max_paths == 0 {
            return Err(invalid("simulation.max_paths", "must be at least 1"));
        }
        if !(self.transfer_ms_per_mb.is_finite() && self.transfer_ms_per_mb >= 0.0) {
            return Err(invalid("simulation.transfer_ms_per_mb", "must be finite and >= 0"));
        }
        if self.cache_rewarm_seconds == Some(0) {
            return Err(invalid("simulation.cache_rewarm_seconds", "must be at least 1 when set"));
        }
        Ok(())
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity model constants
    pub capacity: CapacityConstants,
    /// Simulation knobs
    pub simulation: SimulationSettings,
    /// Concurrent runs per grading request
    pub max_parallel_runs: usize,
    /// Wall-clock limit per run; exceeded runs are cancelled
    pub run_timeout_secs: Option<u64>,
    /// Capacity profile cache size
    pub profile_cache_entries: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacity: CapacityConstants::default(),
            simulation: SimulationSettings::default(),
            max_parallel_runs: std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get),
            run_timeout_secs: None,
            profile_cache_entries: DEFAULT_CACHE_ENTRIES,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document
    ///
    /// # Errors
    /// Returns error if the document is malformed or a setting is invalid
    pub fn from_toml_str(input: &str) -> Result<Self, EngineConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| EngineConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    /// Reject unusable settings
    ///
    /// # Errors
    /// Returns the first invalid setting
    pub fn validate(&self) -> Result<(), EngineConfigError> {
        self.capacity.validate()?;
        self.simulation.validate()?;
        if self.max_parallel_runs == 0 {
            return Err(invalid("max_parallel_runs", "must be at least 1"));
        }
        if self.run_timeout_secs == Some(0) {
            return Err(invalid("run_timeout_secs", "must be at least 1 when set"));
        }
        Ok(())
    }

    /// Set capacity constants
    #[inline]
    #[must_use]
    pub fn with_capacity(mut self, capacity: CapacityConstants) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set simulation settings
    #[inline]
    #[must_use]
    pub fn with_simulation(mut self, simulation: SimulationSettings) -> Self {
        self.simulation = simulation;
        self
    }

    /// Set run concurrency
    #[inline]
    #[must_use]
    pub const fn with_max_parallel_runs(mut self, runs: usize) -> Self {
        self.max_parallel_runs = runs;
        self
    }

    /// Set per-run wall-clock limit
    #[inline]
    #[must_use]
    pub const fn with_run_timeout_secs(mut self, secs: u64) -> Self {
        self.run_timeout_secs = Some(secs);
        self
    }

    /// Per-run wall-clock limit
    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}

const fn invalid(field: &'static str, reason: &'static str) -> EngineConfigError {
    EngineConfigError::Invalid { field, reason }
}
