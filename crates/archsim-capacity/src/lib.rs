//! archsim capacity model
//!
//! Derives per-component throughput ceilings, base latencies and latency
//! curves from a component's kind and configuration. All numbers come from
//! [`CapacityConstants`], which deployments can override.
//!
//! # Example
//!
//! ```rust,ignore
//! use archsim_capacity::{CapacityConstants, CapacityResolver};
//!
//! let resolver = CapacityResolver::new(CapacityConstants::default())?;
//! let profiles = resolver.resolve_graph(&graph)?;
//! ```

mod constants;
mod error;
mod hash;
mod profile;
mod resolver;

pub use constants::{CapacityConstants, CurveShape};
pub use error::CapacityError;
pub use hash::ConfigHash;
pub use profile::{Admission, CacheBehavior, CapacityProfile, FailureDomain, LatencyCurve};
pub use resolver::{resolve, CapacityResolver, DEFAULT_CACHE_ENTRIES};
