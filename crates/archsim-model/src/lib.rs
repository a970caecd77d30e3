//! archsim graph model
//!
//! Typed contracts between the content layer and the grading engine.
//!
//! # Core Concepts
//!
//! - [`Component`] / [`ComponentConfig`]: strict per-kind components, built
//!   from the loosely-typed [`ComponentSpec`] at ingestion
//! - [`Connection`]: directed, traffic-class aware edges
//! - [`Graph`]: validated architecture (unique ids, single entry, acyclic
//!   per-class subgraphs)
//! - [`TestCase`]: load profile, duration, fault schedule and pass criteria
//! - [`RequiredTopology`]: problem-level structural requirements
//!
//! # Example
//!
//! ```rust,ignore
//! use archsim_model::{GraphSpec, TestCase};
//!
//! let spec: GraphSpec = serde_json::from_str(json)?;
//! let graph = spec.validate()?;
//! ```

mod component;
mod connection;
mod error;
mod graph;
mod requirements;
mod submission;
mod test_case;

pub use component::{
    AppServerConfig, CacheConfig, CacheStrategy, Component, ComponentConfig, ComponentId,
    ComponentKind, ComponentSpec, DatabaseConfig, PassThroughConfig, RawConfig, RawReplication,
    RawSharding, Replication, ReplicationMode, Sharding,
};
pub use connection::{Connection, TrafficClass, TrafficType};
pub use error::{ConfigError, GraphError, TestCaseError};
pub use graph::{Graph, GraphSpec};
pub use requirements::{KindLink, RequiredTopology, TopologyViolation};
pub use submission::Submission;
pub use test_case::{
    FailureInjection, FaultKind, OfferedLoad, PassCriteria, TestCase, Traffic, TrafficKind,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
