//! Grading orchestration
//!
//! [`Engine`] checks a submission's architecture once, then grades each test
//! case independently: every run gets its own blocking task, runs are bounded
//! by a semaphore, and a failing run never affects its siblings.

use crate::config::EngineConfig;
use crate::error::{EngineConfigError, InternalError, SimulationError, StructuralError};
use crate::metrics::SimulationResult;
use crate::report::{GradeReport, Outcome, TestCaseReport};
use crate::router::Router;
use crate::simulator::Simulator;
use crate::validator::validate;
use archsim_capacity::CapacityResolver;
use archsim_model::{Graph, Submission, TestCase};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Grading engine; cheap to clone, clones share the profile cache
#[derive(Debug, Clone)]
pub struct Engine {
    config: Arc<EngineConfig>,
    resolver: CapacityResolver,
    permits: Arc<Semaphore>,
}

impl Engine {
    /// Create an engine
    ///
    /// # Errors
    /// Returns error if the configuration is invalid
    pub fn new(config: EngineConfig) -> Result<Self, EngineConfigError> {
        config.validate()?;
        let resolver = CapacityResolver::with_capacity(config.capacity.clone(), config.profile_cache_entries)?;
        let permits = Arc::new(Semaphore::new(config.max_parallel_runs));
        Ok(Self {
            config: Arc::new(config),
            resolver,
            permits,
        })
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared capacity resolver
    #[inline]
    #[must_use]
    pub const fn resolver(&self) -> &CapacityResolver {
        &self.resolver
    }

    /// Ingest the graph, check required topology and resolve every profile
    ///
    /// # Errors
    /// Returns the structural problem that makes the architecture ungradable
    pub fn check(&self, submission: &Submission) -> Result<Graph, StructuralError> {
        let graph = submission.graph.clone().validate()?;
        submission
            .requirements
            .check(&graph)
            .map_err(StructuralError::Topology)?;
        self.resolver.resolve_graph(&graph)?;
        Ok(graph)
    }

    /// Simulate one test case synchronously
    ///
    /// # Errors
    /// Returns error if the test case is malformed, the architecture cannot
    /// be routed, the run is cancelled, or an engine invariant breaks
    pub fn run(
        &self,
        graph: &Graph,
        test_case: &TestCase,
        cancel: &CancellationToken,
    ) -> Result<SimulationResult, SimulationError> {
        let settings = &self.config.simulation;
        test_case.validate(settings.max_duration_seconds)?;

        let profiles: Vec<_> = self.resolver.resolve_graph(graph)?.into_values().collect();
        let routes = Router::new(graph, &profiles, settings.max_paths).route_all(&test_case.traffic.classes())?;
        let mut simulator = Simulator::new(graph, profiles, &routes, test_case, settings)?;
        simulator.run(cancel)
    }

    /// Simulate and judge one test case
    #[must_use]
    pub fn grade_case(&self, graph: &Graph, test_case: &TestCase, cancel: &CancellationToken) -> TestCaseReport {
        let outcome = match self.run(graph, test_case, cancel) {
            Ok(result) => {
                let verdict = validate(&result, &test_case.pass_criteria);
                Outcome::Graded { result, verdict }
            }
            Err(SimulationError::Structural(error)) => Outcome::ArchitectureInvalid {
                reasons: error.reasons(),
            },
            Err(SimulationError::InvalidTestCase(error)) => Outcome::InvalidTestCase {
                reason: error.to_string(),
            },
            Err(SimulationError::Internal(error)) => {
                tracing::error!(test_case = %test_case.name, %error, "internal error");
                Outcome::InternalError {
                    reason: error.to_string(),
                }
            }
            Err(SimulationError::Cancelled) => Outcome::Cancelled,
        };
        TestCaseReport {
            name: test_case.name.clone(),
            outcome,
        }
    }

    /// Grade every test case of a submission
    ///
    /// A structural problem marks every case `architecture_invalid` without
    /// simulating. Reports keep submission order.
    pub async fn grade(&self, submission: &Submission) -> GradeReport {
        tracing::info!(test_cases = submission.test_cases.len(), "grading submission");

        let graph = match self.check(submission) {
            Ok(graph) => Arc::new(graph),
            Err(error) => {
                let reasons = error.reasons();
                tracing::info!(?reasons, "architecture rejected");
                return GradeReport {
                    cases: submission
                        .test_cases
                        .iter()
                        .map(|case| TestCaseReport {
                            name: case.name.clone(),
                            outcome: Outcome::ArchitectureInvalid {
                                reasons: reasons.clone(),
                            },
                        })
                        .collect(),
                };
            }
        };

        let runs = submission
            .test_cases
            .iter()
            .cloned()
            .map(|case| self.grade_isolated(Arc::clone(&graph), case));
        let report = GradeReport {
            cases: futures::future::join_all(runs).await,
        };

        let summary = report.summary();
        tracing::info!(
            passed = summary.passed,
            failed = summary.failed,
            errored = summary.errored,
            "grading finished"
        );
        report
    }

    async fn grade_isolated(&self, graph: Arc<Graph>, case: TestCase) -> TestCaseReport {
        let name = case.name.clone();
        let Ok(_permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return TestCaseReport {
                name,
                outcome: Outcome::InternalError {
                    reason: InternalError::Task("run scheduler closed".to_string()).to_string(),
                },
            };
        };

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let engine = self.clone();
        let mut handle = tokio::task::spawn_blocking(move || engine.grade_case(&graph, &case, &token));

        let joined = match self.config.run_timeout() {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!(test_case = %name, ?limit, "run timed out, cancelling");
                    cancel.cancel();
                    handle.await
                }
            },
            None => handle.await,
        };

        joined.unwrap_or_else(|error| TestCaseReport {
            name,
            outcome: Outcome::InternalError {
                reason: InternalError::Task(error.to_string()).to_string(),
            },
        })
    }
}
