//! Fault injection scenarios

use archsim_engine::{Engine, EngineConfig, Outcome, SimulationResult, SimulationSettings};
use archsim_model::{ComponentConfig, FailureInjection, TestCase, Traffic};
use archsim_test_utils::{cache_aside, replicated_db, three_tier, three_tier_with_standby, GraphFixture};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

fn run_with(engine: &Engine, graph: GraphFixture, case: &TestCase) -> SimulationResult {
    engine
        .run(&graph.build(), case, &CancellationToken::new())
        .unwrap()
}

fn run(graph: GraphFixture, case: &TestCase) -> SimulationResult {
    run_with(&Engine::new(EngineConfig::default()).unwrap(), graph, case)
}

fn crash_case() -> TestCase {
    TestCase::new("NFR-A1", Traffic::mixed(500.0, 0.8), 120)
        .with_failure(FailureInjection::db_crash(30, Some(90)))
}

#[test]
fn crash_without_redundancy_is_down_until_recovery() {
    let result = run(three_tier(2, ComponentConfig::database()), &crash_case());
    assert_eq!(result.downtime_seconds, 60.0);
    assert!((result.availability - 0.5).abs() < 1e-9);
    assert!(result.error_rate > 0.49 && result.error_rate < 0.51);
}

#[test]
fn standby_takes_over_after_detection() {
    let result = run(three_tier_with_standby(2), &crash_case());
    assert_eq!(result.downtime_seconds, 3.0);
    assert!(result.availability >= 1.0 - 4.0 / 120.0);

    // Traffic after the switch lands on the standby.
    let standby = result
        .components
        .iter()
        .find(|component| component.id.as_str() == "db-standby")
        .unwrap();
    assert!(standby.served_requests > 0.0);
}

#[test]
fn replica_is_promoted_after_detection() {
    let result = run(three_tier(2, replicated_db(1)), &crash_case());
    assert_eq!(result.downtime_seconds, 3.0);
    assert_eq!(result.trace[33].failed, 0.0);
}

#[test]
fn detection_delay_is_configurable() {
    let settings = SimulationSettings {
        failover_detection_seconds: 10,
        ..SimulationSettings::default()
    };
    let engine = Engine::new(EngineConfig::default().with_simulation(settings)).unwrap();
    let result = run_with(&engine, three_tier_with_standby(2), &crash_case());
    assert_eq!(result.downtime_seconds, 10.0);
}

#[test]
fn crash_without_recovery_lasts_to_the_end() {
    let case = TestCase::new("no-recovery", Traffic::reads(200.0), 60)
        .with_failure(FailureInjection::db_crash(20, None));
    let result = run(three_tier(1, ComponentConfig::database()), &case);
    assert_eq!(result.downtime_seconds, 40.0);
    assert!(result.trace[19].failed == 0.0 && result.trace[20].failed > 0.0);
}

#[test]
fn cold_cache_pushes_reads_onto_the_database() {
    let case = TestCase::new("flush", Traffic::reads(2000.0), 60);
    let baseline = run(cache_aside(0.9), &case);
    let flushed = run(
        cache_aside(0.9),
        &case.clone().with_failure(FailureInjection::cache_flush(30)),
    );

    assert_eq!(baseline.error_rate, 0.0);
    assert!((flushed.error_rate - 0.25).abs() < 1e-9);
    assert!(flushed.p99_latency_ms > baseline.p99_latency_ms);
}

#[test]
fn rewarming_cache_recovers_hit_ratio() {
    let case = TestCase::new("flush", Traffic::reads(2000.0), 60)
        .with_failure(FailureInjection::cache_flush(30));
    let cold = run(cache_aside(0.9), &case);

    let settings = SimulationSettings {
        cache_rewarm_seconds: Some(10),
        ..SimulationSettings::default()
    };
    let engine = Engine::new(EngineConfig::default().with_simulation(settings)).unwrap();
    let warm = run_with(&engine, cache_aside(0.9), &case);

    assert!(warm.error_rate > 0.0);
    assert!(warm.error_rate < cold.error_rate);
    assert_eq!(warm.trace[59].failed, 0.0);
}

#[test]
fn fault_targets_are_checked() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let graph = three_tier(1, ComponentConfig::database()).build();
    let cancel = CancellationToken::new();

    let unknown = TestCase::new("unknown", Traffic::reads(10.0), 10)
        .with_failure(FailureInjection::db_crash(2, None).with_target("db-9"));
    let report = engine.grade_case(&graph, &unknown, &cancel);
    assert!(matches!(report.outcome, Outcome::InvalidTestCase { .. }));

    let wrong_kind = TestCase::new("wrong-kind", Traffic::reads(10.0), 10)
        .with_failure(FailureInjection::db_crash(2, None).with_target("app"));
    let report = engine.grade_case(&graph, &wrong_kind, &cancel);
    let Outcome::InvalidTestCase { reason } = report.outcome else {
        panic!("fault on an app server was accepted");
    };
    assert!(reason.contains("app"), "{reason}");
}

#[test]
fn flush_without_a_cache_changes_nothing() {
    let graph = || three_tier(2, ComponentConfig::database());
    let case = TestCase::new("flush", Traffic::reads(800.0), 30);
    let plain = run(graph(), &case);
    let flushed = run(graph(), &case.clone().with_failure(FailureInjection::cache_flush(10)));
    assert_eq!(plain, flushed);
}

fn coarse_engine() -> Engine {
    let settings = SimulationSettings {
        tick_seconds: 10,
        ..SimulationSettings::default()
    };
    Engine::new(EngineConfig::default().with_simulation(settings)).unwrap()
}

#[test]
fn outage_inside_a_coarse_tick_is_counted() {
    let case = TestCase::new("short-outage", Traffic::reads(500.0), 60)
        .with_failure(FailureInjection::db_crash(31, Some(39)));
    let result = run_with(&coarse_engine(), three_tier(2, ComponentConfig::database()), &case);

    assert_eq!(result.downtime_seconds, 8.0);
    assert!((result.availability - (1.0 - 8.0 / 60.0)).abs() < 1e-9);
    assert!((result.error_rate - 8.0 / 60.0).abs() < 1e-9);
}

#[test]
fn coarse_ticks_match_one_second_ticks() {
    let case = TestCase::new("failover", Traffic::mixed(500.0, 0.8), 120)
        .with_failure(FailureInjection::db_crash(33, Some(87)));
    let fine = run(three_tier_with_standby(2), &case);
    let coarse = run_with(&coarse_engine(), three_tier_with_standby(2), &case);

    assert_eq!(coarse.downtime_seconds, 3.0);
    assert_eq!(fine.downtime_seconds, coarse.downtime_seconds);
    assert!((fine.error_rate - coarse.error_rate).abs() < 1e-9);
    assert_eq!(fine.p99_latency_ms, coarse.p99_latency_ms);
}
