//! archsim grading engine
//!
//! Grades a learner-designed architecture against traffic and failure
//! scenarios.
//!
//! # Pipeline
//!
//! 1. **Check**: ingest the graph, verify required topology, resolve
//!    capacity profiles ([`Engine::check`])
//! 2. **Route**: enumerate weighted per-class paths once ([`Router`])
//! 3. **Simulate**: step through the test case tick by tick ([`Simulator`])
//! 4. **Aggregate**: percentiles, error rate, availability ([`metrics`])
//! 5. **Validate**: compare against pass criteria ([`validate`])
//!
//! # Example
//!
//! ```rust,ignore
//! use archsim_engine::{Engine, EngineConfig};
//!
//! let engine = Engine::new(EngineConfig::default())?;
//! let report = engine.grade(&submission).await;
//! println!("{}", report.render_text());
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod report;
pub mod router;
pub mod simulator;
pub mod validator;

pub use config::{EngineConfig, SimulationSettings};
pub use engine::Engine;
pub use error::{EngineConfigError, InternalError, RouteError, SimulationError, StructuralError};
pub use metrics::{aggregate, ComponentSummary, MetricsAggregator, SimulationResult, TickSummary};
pub use report::{GradeReport, GradeSummary, Outcome, TestCaseReport};
pub use router::{RouteSet, Router, Routes, WeightedPath};
pub use simulator::{RunState, SimulationTick, Simulator};
pub use validator::{validate, Criterion, CriterionFailure, ValidationVerdict};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
