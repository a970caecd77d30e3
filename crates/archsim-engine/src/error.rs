//! Error types for the grading engine
//!
//! Errors are classified by who has to act on them:
//! - structural errors describe the learner's architecture and are reported
//!   as `architecture_invalid` before any tick runs
//! - test case errors describe malformed content
//! - internal errors are broken invariants inside the engine itself
//!
//! Overload and injected faults are never errors; they show up in metrics.

use crate::simulator::RunState;
use archsim_capacity::CapacityError;
use archsim_model::{ComponentId, GraphError, TestCaseError, TopologyViolation, TrafficClass};
use std::path::PathBuf;

/// Routing failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RouteError {
    /// A class with offered load cannot leave the entry component
    #[error("{class} traffic has no route out of the entry component `{entry}`")]
    Disconnected {
        /// Traffic class
        class: TrafficClass,
        /// Entry component
        entry: ComponentId,
    },

    /// Path enumeration exceeded its bound
    #[error("{class} traffic fans out into more than {limit} distinct paths")]
    TooManyPaths {
        /// Traffic class
        class: TrafficClass,
        /// Configured bound
        limit: usize,
    },

    /// Routed paths form a cycle
    #[error("routed traffic loops back through `{component}`")]
    Cycle {
        /// A component on the cycle
        component: ComponentId,
    },
}

/// Problems with the submitted architecture
#[derive(Debug, thiserror::Error)]
pub enum StructuralError {
    /// Graph failed ingestion
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A component config was rejected by the capacity model
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    /// Required topology not met
    #[error("architecture misses {} requirement(s)", .0.len())]
    Topology(Vec<TopologyViolation>),

    /// Traffic cannot be routed
    #[error(transparent)]
    Route(#[from] RouteError),
}

impl StructuralError {
    /// Learner-facing reasons, one per problem
    #[must_use]
    pub fn reasons(&self) -> Vec<String> {
        match self {
            Self::Topology(violations) => violations.iter().map(ToString::to_string).collect(),
            other => vec![other.to_string()],
        }
    }
}

/// Broken engine invariants
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InternalError {
    /// A computed quantity was NaN, infinite or negative
    #[error("{quantity} became {value} at second {time_second}{}", component_suffix(.component.as_ref()))]
    InvalidQuantity {
        /// What was being computed
        quantity: &'static str,
        /// Offending value
        value: f64,
        /// Simulated second
        time_second: u32,
        /// Component, when the value is per component
        component: Option<ComponentId>,
    },

    /// Run state machine misuse
    #[error("illegal run state transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state
        from: RunState,
        /// Requested state
        to: RunState,
    },

    /// Component without a resolved profile
    #[error("no capacity profile for component #{0}")]
    MissingProfile(usize),

    /// Worker task failed
    #[error("run task failed: {0}")]
    Task(String),
}

fn component_suffix(component: Option<&ComponentId>) -> String {
    component.map_or_else(String::new, |id| format!(" on `{id}`"))
}

/// Why a single run did not produce a result
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// Architecture problem
    #[error("architecture invalid: {0}")]
    Structural(#[from] StructuralError),

    /// Malformed test case
    #[error("invalid test case: {0}")]
    InvalidTestCase(#[from] TestCaseError),

    /// Engine bug
    #[error("internal error: {0}")]
    Internal(#[from] InternalError),

    /// Cooperative cancellation
    #[error("run cancelled")]
    Cancelled,
}

impl SimulationError {
    /// Whether the learner's architecture is at fault
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(self, Self::Structural(_))
    }

    /// Whether the engine itself is at fault
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

impl From<RouteError> for SimulationError {
    fn from(value: RouteError) -> Self {
        Self::Structural(StructuralError::Route(value))
    }
}

impl From<CapacityError> for SimulationError {
    fn from(value: CapacityError) -> Self {
        Self::Structural(StructuralError::Capacity(value))
    }
}

/// Engine configuration problems
#[derive(Debug, thiserror::Error)]
pub enum EngineConfigError {
    /// Config file unreadable
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// File path
        path: PathBuf,
        /// I/O error
        #[source]
        source: std::io::Error,
    },

    /// Config file malformed
    #[error("failed to parse engine config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Setting out of range
    #[error("invalid setting `{field}`: {reason}")]
    Invalid {
        /// Setting name
        field: &'static str,
        /// Allowed domain
        reason: &'static str,
    },

    /// Capacity constants out of range
    #[error(transparent)]
    Capacity(#[from] CapacityError),
}
