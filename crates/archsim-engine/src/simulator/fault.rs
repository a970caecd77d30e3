//! Fault schedule resolution and per-tick fault effects

use crate::config::SimulationSettings;
use crate::router::Routes;
use archsim_capacity::CapacityProfile;
use archsim_model::{Component, ComponentKind, FailureInjection, FaultKind, Graph, TestCaseError};
use std::sync::Arc;

/// What replaces a crashed database once the outage is detected
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Recovery {
    /// Stays down until the declared recovery
    None,
    /// A replica takes over the leader role
    Promote(CapacityProfile),
    /// Traffic moves to a standby declared through a failover link
    Standby(usize),
}

/// Fault injection bound to concrete components
#[derive(Debug, Clone)]
pub(crate) struct FaultPlan {
    injection: FailureInjection,
    targets: Vec<usize>,
    crashed: Option<CapacityProfile>,
    recovery: Recovery,
    detection_seconds: u32,
    rewarm_seconds: Option<u32>,
}

impl FaultPlan {
    /// Resolve targets and the recovery strategy
    ///
    /// An explicit target must exist and have the kind the fault applies to.
    /// Without one, a crash hits the first routed database and a flush hits
    /// every routed cache. A fault with nothing to hit is dropped.
    pub(crate) fn plan(
        graph: &Graph,
        profiles: &[Arc<CapacityProfile>],
        routes: &Routes,
        injection: Option<&FailureInjection>,
        settings: &SimulationSettings,
    ) -> Result<Option<Self>, TestCaseError> {
        let Some(injection) = injection else {
            return Ok(None);
        };
        let expected = match injection.kind {
            FaultKind::DbCrash => ComponentKind::Database,
            FaultKind::CacheFlush => ComponentKind::Cache,
        };

        let targets = if let Some(target) = &injection.target {
            let index = graph
                .index_of(target.as_str())
                .ok_or_else(|| TestCaseError::UnknownFaultTarget(target.clone()))?;
            let actual = graph.component_at(index).map_or(expected, Component::kind);
            if actual != expected {
                return Err(TestCaseError::FaultTargetKind {
                    target: target.clone(),
                    expected,
                    actual,
                });
            }
            if !routes.is_routed(index) {
                tracing::warn!(%target, "fault target carries no routed traffic");
            }
            vec![index]
        } else {
            let routed = (0..graph.len()).filter(|&index| {
                routes.is_routed(index)
                    && graph.component_at(index).map(Component::kind) == Some(expected)
            });
            match injection.kind {
                FaultKind::DbCrash => routed.take(1).collect(),
                FaultKind::CacheFlush => routed.collect(),
            }
        };

        if targets.is_empty() {
            tracing::warn!(kind = ?injection.kind, "no routed {expected} to inject into, fault ignored");
            return Ok(None);
        }

        let (crashed, recovery) = match injection.kind {
            FaultKind::DbCrash => {
                let target = targets[0];
                let profile = profiles.get(target).map(Arc::as_ref);
                let recovery = match profile.and_then(CapacityProfile::with_replica_promoted) {
                    Some(promoted) => Recovery::Promote(promoted),
                    None => standby(graph, target).map_or(Recovery::None, Recovery::Standby),
                };
                (profile.map(CapacityProfile::crashed), recovery)
            }
            FaultKind::CacheFlush => (None, Recovery::None),
        };

        tracing::debug!(
            kind = ?injection.kind,
            at = injection.at_second,
            recovery_second = ?injection.recovery_second,
            targets = targets.len(),
            recovery = ?recovery_label(&recovery),
            "fault planned"
        );

        Ok(Some(Self {
            injection: injection.clone(),
            targets,
            crashed,
            recovery,
            detection_seconds: settings.failover_detection_seconds,
            rewarm_seconds: settings.cache_rewarm_seconds,
        }))
    }

    /// Components the fault applies to
    pub(crate) fn targets(&self) -> &[usize] {
        &self.targets
    }

    pub(crate) const fn recovery(&self) -> &Recovery {
        &self.recovery
    }

    /// Drop the standby, keeping the target down for the whole outage
    pub(crate) fn without_standby(&mut self) {
        if matches!(self.recovery, Recovery::Standby(_)) {
            self.recovery = Recovery::None;
        }
    }

    /// First second after `t` at which the fault's effect changes
    ///
    /// Ticks are cut at these seconds so that a fault state sampled at the
    /// start of a tick holds for all of it.
    pub(crate) fn next_change_after(&self, t: u32) -> Option<u32> {
        let at = self.injection.at_second;
        let mut marks = vec![at];
        match self.injection.kind {
            FaultKind::DbCrash => {
                marks.extend(self.injection.recovery_second);
                if self.recovery != Recovery::None {
                    marks.push(at.saturating_add(self.detection_seconds));
                }
            }
            FaultKind::CacheFlush => {
                if let Some(rewarm) = self.rewarm_seconds {
                    let warm = at.saturating_add(rewarm);
                    if (at..warm).contains(&t) {
                        return Some(t + 1);
                    }
                    marks.push(warm);
                }
            }
        }
        marks.into_iter().filter(|&mark| mark > t).min()
    }

    fn crash_active(&self, t: u32) -> bool {
        self.injection.kind == FaultKind::DbCrash && self.injection.is_active_at(t)
    }

    fn detected(&self, t: u32) -> bool {
        t >= self.injection.at_second.saturating_add(self.detection_seconds)
    }

    /// Whether traffic of the crashed database goes to its standby at `t`
    pub(crate) fn rerouted_at(&self, t: u32) -> bool {
        self.crash_active(t) && self.detected(t) && matches!(self.recovery, Recovery::Standby(_))
    }

    /// Profile in effect for `node` at `t`
    pub(crate) fn profile_at<'p>(&'p self, node: usize, t: u32, base: &'p CapacityProfile) -> &'p CapacityProfile {
        if !self.crash_active(t) || !self.targets.contains(&node) {
            return base;
        }
        match (&self.recovery, self.detected(t), &self.crashed) {
            (Recovery::Promote(promoted), true, _) => promoted,
            (_, _, Some(crashed)) => crashed,
            (_, _, None) => base,
        }
    }

    /// Multiplier applied to `node`'s hit ratio at `t`
    ///
    /// A flushed cache is cold from the flush on; with a re-warm period the
    /// hit ratio climbs back linearly.
    pub(crate) fn hit_scale(&self, node: usize, t: u32) -> f64 {
        if self.injection.kind != FaultKind::CacheFlush
            || !self.injection.is_active_at(t)
            || !self.targets.contains(&node)
        {
            return 1.0;
        }
        self.rewarm_seconds.map_or(0.0, |rewarm| {
            (f64::from(t - self.injection.at_second) / f64::from(rewarm)).min(1.0)
        })
    }
}

/// First healthy storage component reachable over a failover link
fn standby(graph: &Graph, target: usize) -> Option<usize> {
    let id = graph.component_at(target)?.id().as_str();
    graph
        .failover_targets(id)
        .find_map(|component| graph.index_of(component.id().as_str()))
        .filter(|&index| index != target)
}

const fn recovery_label(recovery: &Recovery) -> &'static str {
    match recovery {
        Recovery::None => "none",
        Recovery::Promote(_) => "promote_replica",
        Recovery::Standby(_) => "standby",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Router;
    use archsim_capacity::{CapacityConstants, CapacityResolver};
    use archsim_model::{
        ComponentConfig, Connection, DatabaseConfig, Replication, ReplicationMode, TrafficClass,
    };

    struct Fixture {
        graph: Graph,
        profiles: Vec<Arc<CapacityProfile>>,
        routes: Routes,
    }

    fn fixture(primary: ComponentConfig, with_standby: bool) -> Fixture {
        let mut components = vec![
            Component::new("client", ComponentConfig::Client).unwrap(),
            Component::new("app", ComponentConfig::app_server(2)).unwrap(),
            Component::new("cache", ComponentConfig::cache(0.8)).unwrap(),
            Component::new("db", primary).unwrap(),
        ];
        let mut connections = vec![
            Connection::read_write("client", "app"),
            Connection::read_write("app", "cache"),
            Connection::read_write("app", "db"),
        ];
        if with_standby {
            components.push(Component::new("standby", ComponentConfig::database()).unwrap());
            connections.push(Connection::read_write("db", "standby"));
        }
        let graph = Graph::new(components, connections).unwrap();
        let profiles: Vec<_> = CapacityResolver::new(CapacityConstants::default())
            .unwrap()
            .resolve_graph(&graph)
            .unwrap()
            .into_values()
            .collect();
        let routes = Router::new(&graph, &profiles, 64)
            .route_all(&[TrafficClass::Read, TrafficClass::Write])
            .unwrap();
        Fixture {
            graph,
            profiles,
            routes,
        }
    }

    fn plan(fixture: &Fixture, injection: &FailureInjection) -> Result<Option<FaultPlan>, TestCaseError> {
        FaultPlan::plan(
            &fixture.graph,
            &fixture.profiles,
            &fixture.routes,
            Some(injection),
            &SimulationSettings::default(),
        )
    }

    #[test]
    fn crash_defaults_to_first_routed_database() {
        let fixture = fixture(ComponentConfig::database(), true);
        let plan = plan(&fixture, &FailureInjection::db_crash(10, Some(20))).unwrap().unwrap();
        assert_eq!(plan.targets(), &[3]);
        assert_eq!(plan.recovery(), &Recovery::Standby(4));

        let base = fixture.profiles[3].as_ref();
        assert!(!plan.profile_at(3, 9, base).is_down());
        assert!(plan.profile_at(3, 10, base).is_down());
        assert!(!plan.rerouted_at(12));
        assert!(plan.rerouted_at(13));
        assert!(!plan.rerouted_at(20));
        assert!(!plan.profile_at(3, 20, base).is_down());
    }

    #[test]
    fn replica_is_promoted_after_detection() {
        let primary = ComponentConfig::Database(DatabaseConfig {
            replication: Replication {
                enabled: true,
                replica_count: 1,
                mode: ReplicationMode::Async,
            },
            ..DatabaseConfig::default()
        });
        let fixture = fixture(primary, false);
        let plan = plan(&fixture, &FailureInjection::db_crash(5, None)).unwrap().unwrap();
        let base = fixture.profiles[3].as_ref();

        assert!(plan.profile_at(3, 7, base).is_down());
        let promoted = plan.profile_at(3, 8, base);
        assert!((promoted.max_throughput_reads - 1000.0).abs() < 1e-9);
        assert!(!plan.rerouted_at(8));
    }

    #[test]
    fn flush_targets_every_routed_cache_and_rewarms() {
        let fixture = fixture(ComponentConfig::database(), false);
        let settings = SimulationSettings {
            cache_rewarm_seconds: Some(10),
            ..SimulationSettings::default()
        };
        let plan = FaultPlan::plan(
            &fixture.graph,
            &fixture.profiles,
            &fixture.routes,
            Some(&FailureInjection::cache_flush(30)),
            &settings,
        )
        .unwrap()
        .unwrap();

        assert_eq!(plan.targets(), &[2]);
        assert_eq!(plan.hit_scale(2, 29), 1.0);
        assert_eq!(plan.hit_scale(2, 30), 0.0);
        assert!((plan.hit_scale(2, 35) - 0.5).abs() < 1e-12);
        assert_eq!(plan.hit_scale(2, 90), 1.0);
        assert_eq!(plan.hit_scale(1, 35), 1.0);
    }

    #[test]
    fn state_changes_cut_ticks() {
        let crash = FailureInjection::db_crash(31, Some(39));
        let with_standby = fixture(ComponentConfig::database(), true);
        let failover = plan(&with_standby, &crash).unwrap().unwrap();
        assert_eq!(failover.next_change_after(0), Some(31));
        assert_eq!(failover.next_change_after(31), Some(34));
        assert_eq!(failover.next_change_after(34), Some(39));
        assert_eq!(failover.next_change_after(39), None);

        let single = fixture(ComponentConfig::database(), false);
        let outage = plan(&single, &crash).unwrap().unwrap();
        assert_eq!(outage.next_change_after(31), Some(39));

        let settings = SimulationSettings {
            cache_rewarm_seconds: Some(4),
            ..SimulationSettings::default()
        };
        let flush = FaultPlan::plan(
            &single.graph,
            &single.profiles,
            &single.routes,
            Some(&FailureInjection::cache_flush(10)),
            &settings,
        )
        .unwrap()
        .unwrap();
        assert_eq!(flush.next_change_after(0), Some(10));
        assert_eq!(flush.next_change_after(12), Some(13));
        assert_eq!(flush.next_change_after(14), None);
    }

    #[test]
    fn explicit_targets_are_checked() {
        let fixture = fixture(ComponentConfig::database(), false);
        assert_eq!(
            plan(&fixture, &FailureInjection::db_crash(1, None).with_target("nope")).unwrap_err(),
            TestCaseError::UnknownFaultTarget("nope".into())
        );
        assert!(matches!(
            plan(&fixture, &FailureInjection::db_crash(1, None).with_target("cache")),
            Err(TestCaseError::FaultTargetKind {
                expected: ComponentKind::Database,
                actual: ComponentKind::Cache,
                ..
            })
        ));
    }

    #[test]
    fn fault_without_target_is_dropped() {
        let graph = Graph::new(
            vec![
                Component::new("client", ComponentConfig::Client).unwrap(),
                Component::new("app", ComponentConfig::app_server(1)).unwrap(),
            ],
            vec![Connection::read_write("client", "app")],
        )
        .unwrap();
        let profiles: Vec<_> = CapacityResolver::new(CapacityConstants::default())
            .unwrap()
            .resolve_graph(&graph)
            .unwrap()
            .into_values()
            .collect();
        let routes = Router::new(&graph, &profiles, 8).route_all(&[TrafficClass::Read]).unwrap();
        let plan = FaultPlan::plan(
            &graph,
            &profiles,
            &routes,
            Some(&FailureInjection::db_crash(1, None)),
            &SimulationSettings::default(),
        )
        .unwrap();
        assert!(plan.is_none());
    }
}
