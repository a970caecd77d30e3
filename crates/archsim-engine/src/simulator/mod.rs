//! Time-stepped simulation of one test case
//!
//! A run walks the test case duration tick by tick. Each tick applies the
//! fault schedule, pushes offered load through the routed lanes and hands
//! the resulting [`SimulationTick`] to the metrics aggregator. Routing and
//! fault targets are resolved once, up front.

mod fault;
mod flow;
mod state;

pub use flow::{ComponentTick, LatencySample, SimulationTick};
pub use state::{validate_transition, RunState, RunStateMachine};

use crate::config::SimulationSettings;
use crate::error::{InternalError, SimulationError};
use crate::metrics::{MetricsAggregator, SimulationResult};
use crate::router::Routes;
use archsim_capacity::CapacityProfile;
use archsim_model::{Graph, TestCase};
use fault::{FaultPlan, Recovery};
use flow::{FlowPlan, Lane, TickInput};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Simulator for one (graph, test case) pair
#[derive(Debug)]
pub struct Simulator<'a> {
    graph: &'a Graph,
    test_case: &'a TestCase,
    settings: &'a SimulationSettings,
    profiles: Vec<Arc<CapacityProfile>>,
    lanes: Vec<Lane>,
    normal: FlowPlan,
    failover: Option<FlowPlan>,
    fault: Option<FaultPlan>,
    state: RunStateMachine,
}

impl<'a> Simulator<'a> {
    /// Prepare a run
    ///
    /// `profiles` is indexed by declaration order and `routes` must come
    /// from the same graph.
    ///
    /// # Errors
    /// Returns a test case error for unusable fault targets and a
    /// structural error if the routes cannot be ordered
    pub fn new(
        graph: &'a Graph,
        profiles: Vec<Arc<CapacityProfile>>,
        routes: &Routes,
        test_case: &'a TestCase,
        settings: &'a SimulationSettings,
    ) -> Result<Self, SimulationError> {
        let lanes = flow::lanes(routes);
        let normal = FlowPlan::build(graph, &lanes, None)?;

        let mut fault = FaultPlan::plan(
            graph,
            &profiles,
            routes,
            test_case.failure_injection.as_ref(),
            settings,
        )?;
        let mut failover = None;
        if let Some(plan) = fault.as_mut() {
            let substitute = match (plan.recovery(), plan.targets().first()) {
                (Recovery::Standby(standby), Some(&target)) => Some((target, *standby)),
                _ => None,
            };
            if let Some(substitute) = substitute {
                match FlowPlan::build(graph, &lanes, Some(substitute)) {
                    Ok(flow) => failover = Some(flow),
                    Err(error) => {
                        tracing::warn!(%error, "standby cannot take over routed traffic, failover disabled");
                        plan.without_standby();
                    }
                }
            }
        }

        Ok(Self {
            graph,
            test_case,
            settings,
            profiles,
            lanes,
            normal,
            failover,
            fault,
            state: RunStateMachine::new(),
        })
    }

    /// Current lifecycle state
    #[inline]
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state.state()
    }

    /// Execute every tick and aggregate the metrics
    ///
    /// # Errors
    /// Returns [`SimulationError::Cancelled`] when `cancel` fires between
    /// ticks, or an internal error if a tick produces an invalid quantity
    pub fn run(&mut self, cancel: &CancellationToken) -> Result<SimulationResult, SimulationError> {
        self.state.transition(RunState::Running)?;
        let mut metrics = MetricsAggregator::new(self.graph, self.test_case.duration_seconds, self.settings);

        match self.tick_all(cancel, &mut metrics) {
            Ok(()) => {
                self.state.transition(RunState::Completed)?;
                let result = metrics.finish();
                tracing::debug!(
                    test_case = %self.test_case.name,
                    p99_ms = ?result.p99_latency_ms,
                    error_rate = result.error_rate,
                    availability = result.availability,
                    "run completed"
                );
                Ok(result)
            }
            Err(error) => {
                self.state.transition(RunState::Aborted)?;
                tracing::warn!(test_case = %self.test_case.name, %error, "run aborted");
                Err(error)
            }
        }
    }

    fn tick_all(&self, cancel: &CancellationToken, metrics: &mut MetricsAggregator) -> Result<(), SimulationError> {
        let duration = self.test_case.duration_seconds;
        let step = self.settings.tick_seconds.max(1);
        let mut t = 0;
        while t < duration {
            if cancel.is_cancelled() {
                return Err(SimulationError::Cancelled);
            }
            let mut length = step.min(duration - t);
            if let Some(change) = self.fault.as_ref().and_then(|fault| fault.next_change_after(t)) {
                length = length.min(change - t);
            }
            let tick = self.tick(t, length)?;
            tick.check(self.graph)?;
            tracing::trace!(
                t,
                offered = tick.offered,
                failed = tick.failed,
                "tick"
            );
            metrics.record(&tick);
            t += length;
        }
        Ok(())
    }

    /// Simulate `[t, t + length)`; faults are sampled at `t` and hold for the
    /// whole tick
    fn tick(&self, t: u32, length: u32) -> Result<SimulationTick, InternalError> {
        let fault = self.fault.as_ref();
        let plan = match (&self.failover, fault) {
            (Some(failover), Some(fault)) if fault.rerouted_at(t) => failover,
            _ => &self.normal,
        };
        let traffic = &self.test_case.traffic;
        let input = TickInput {
            time_second: t,
            duration_seconds: length,
            offered: traffic.offered(),
            lanes: &self.lanes,
            transfer_ms: traffic.avg_response_size_mb.unwrap_or(0.0) * self.settings.transfer_ms_per_mb,
        };

        plan.propagate(
            &input,
            |node| {
                let base = self.profiles.get(node)?.as_ref();
                Some(fault.map_or(base, |fault| fault.profile_at(node, t, base)))
            },
            |node| fault.map_or(1.0, |fault| fault.hit_scale(node, t)),
        )
    }
}
