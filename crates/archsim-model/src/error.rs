//! Error types for the graph model
//!
//! Every error here is structural: it describes a submission or test case that
//! cannot be simulated at all, as opposed to a degradation that shows up in
//! the simulated metrics.

use crate::component::{ComponentId, ComponentKind};
use crate::connection::TrafficClass;

/// Per-kind configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Required field absent for this kind
    #[error("{kind} requires `{field}`")]
    Missing {
        /// Component kind
        kind: ComponentKind,
        /// Wire name of the field
        field: &'static str,
    },

    /// Field value outside its allowed range
    #[error("`{field}` = {value} is out of range (expected {expected})")]
    OutOfRange {
        /// Wire name of the field
        field: &'static str,
        /// Offending value
        value: f64,
        /// Human readable domain
        expected: &'static str,
    },

    /// Field belongs to another kind's schema
    #[error("`{field}` is not a valid setting for {kind}")]
    NotApplicable {
        /// Component kind
        kind: ComponentKind,
        /// Wire name of the field
        field: &'static str,
    },

    /// Fields that are individually valid but contradict each other
    #[error("inconsistent configuration: {0}")]
    Inconsistent(&'static str),

    /// Attempt to change the kind of an existing component
    #[error("component kind is immutable: {expected} cannot become {actual}")]
    KindMismatch {
        /// Kind of the existing component
        expected: ComponentKind,
        /// Kind carried by the new config
        actual: ComponentKind,
    },
}

/// Graph ingestion errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// No components at all
    #[error("graph has no components")]
    Empty,

    /// Two components share an id
    #[error("duplicate component id `{0}`")]
    DuplicateComponent(ComponentId),

    /// Component config rejected by its kind schema
    #[error("component `{id}`: {source}")]
    InvalidComponent {
        /// Component id
        id: ComponentId,
        /// Underlying config error
        #[source]
        source: ConfigError,
    },

    /// Connection references a component that does not exist
    #[error("connection {from} -> {to} references unknown component `{missing}`")]
    UnknownEndpoint {
        /// Source id as written
        from: ComponentId,
        /// Target id as written
        to: ComponentId,
        /// The id that could not be resolved
        missing: ComponentId,
    },

    /// Connection from a component to itself
    #[error("self loop on `{0}`")]
    SelfLoop(ComponentId),

    /// Same `(from, to)` pair declared twice
    #[error("duplicate connection {from} -> {to}")]
    DuplicateConnection {
        /// Source id
        from: ComponentId,
        /// Target id
        to: ComponentId,
    },

    /// No client and no explicit entry
    #[error("graph has no client component to send traffic from")]
    MissingEntry,

    /// Several clients and no explicit entry
    #[error("graph has several clients ({}); declare an explicit entry", join_ids(.0))]
    AmbiguousEntry(Vec<ComponentId>),

    /// Explicit entry does not name a component
    #[error("entry `{0}` is not a component of this graph")]
    UnknownEntry(ComponentId),

    /// Cycle along one traffic class reachable from the entry
    #[error("{class} traffic loops back through `{component}`")]
    CyclicTraffic {
        /// Traffic class whose subgraph is cyclic
        class: TrafficClass,
        /// A component on the cycle
        component: ComponentId,
    },
}

/// Test case contract errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TestCaseError {
    /// Requests per second negative or not finite
    #[error("rps must be a finite, non-negative number (got {0})")]
    InvalidRps(f64),

    /// Read ratio outside `[0, 1]`
    #[error("readRatio must be within [0, 1] (got {0})")]
    InvalidReadRatio(f64),

    /// Mixed traffic without a read ratio
    #[error("mixed traffic requires readRatio")]
    MissingReadRatio,

    /// Response size negative or not finite
    #[error("avgResponseSizeMB must be a finite, non-negative number (got {0})")]
    InvalidResponseSize(f64),

    /// Duration zero or above the engine limit
    #[error("durationSeconds must be within 1..={max} (got {duration})")]
    InvalidDuration {
        /// Requested duration
        duration: u32,
        /// Configured maximum
        max: u32,
    },

    /// Fault starts after the run ends
    #[error("failure at second {at_second} is outside a {duration}s run")]
    FaultOutsideRun {
        /// Fault start
        at_second: u32,
        /// Run duration
        duration: u32,
    },

    /// Recovery not strictly after the fault
    #[error("recoverySecond {recovery_second} must be after atSecond {at_second}")]
    RecoveryBeforeFault {
        /// Fault start
        at_second: u32,
        /// Declared recovery
        recovery_second: u32,
    },

    /// Pass criterion outside its domain
    #[error("pass criterion `{criterion}` has invalid value {value}")]
    InvalidCriterion {
        /// Wire name of the criterion
        criterion: &'static str,
        /// Offending value
        value: f64,
    },

    /// Fault target is not in the graph
    #[error("failure target `{0}` is not a component of the graph")]
    UnknownFaultTarget(ComponentId),

    /// Fault target has the wrong kind for the fault
    #[error("failure target `{target}` is a {actual}, expected a {expected}")]
    FaultTargetKind {
        /// Target id
        target: ComponentId,
        /// Kind the fault applies to
        expected: ComponentKind,
        /// Actual kind of the target
        actual: ComponentKind,
    },
}

fn join_ids(ids: &[ComponentId]) -> String {
    ids.iter()
        .map(ComponentId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
