//! Error types for capacity resolution

use archsim_model::{ComponentId, ConfigError};
use std::sync::Arc;

/// Capacity resolution errors
#[derive(Debug, thiserror::Error)]
pub enum CapacityError {
    /// Component config rejected by its kind schema
    #[error("invalid config for `{id}`: {source}")]
    InvalidConfig {
        /// Component id
        id: ComponentId,
        /// Underlying config error
        #[source]
        source: ConfigError,
    },

    /// Tunable constant that would make the model meaningless
    #[error("capacity constant `{name}` = {value} is out of range (expected {expected})")]
    InvalidConstant {
        /// Constant name
        name: &'static str,
        /// Offending value
        value: f64,
        /// Allowed domain
        expected: &'static str,
    },

    /// Config could not be encoded for hashing
    #[error("config hashing failed: {0}")]
    Hash(#[from] serde_json::Error),

    /// Failure of a resolution shared by every caller waiting on the same profile
    #[error(transparent)]
    Shared(Arc<CapacityError>),
}
