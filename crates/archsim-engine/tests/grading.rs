//! End-to-end grading tests

use archsim_engine::{Criterion, Engine, EngineConfig, Outcome, SimulationResult};
use archsim_model::{ComponentConfig, PassCriteria, Submission, TestCase, Traffic};
use archsim_test_utils::{cache_aside, opposing_paths, replicated_db, submission, three_tier, GraphFixture};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

fn engine() -> Engine {
    Engine::new(EngineConfig::default().with_max_parallel_runs(4)).unwrap()
}

fn run(graph: GraphFixture, case: &TestCase) -> SimulationResult {
    let engine = engine();
    let graph = graph.build();
    engine.run(&graph, case, &CancellationToken::new()).unwrap()
}

fn read_burst() -> TestCase {
    TestCase::new("NFR-P1", Traffic::reads(1500.0), 60).with_criteria(
        PassCriteria::default()
            .with_max_p99_latency_ms(200.0)
            .with_max_error_rate(0.01),
    )
}

#[test]
fn single_database_saturates_under_read_burst() {
    let result = run(three_tier(2, ComponentConfig::database()), &read_burst());

    let p99 = result.p99_latency_ms.unwrap();
    assert!(p99 > 510.0 && p99 < 530.0, "p99 was {p99}");
    assert!((result.error_rate - 1.0 / 3.0).abs() < 1e-9);

    let bottlenecks = result.bottlenecks();
    assert_eq!(bottlenecks.len(), 1);
    assert_eq!(bottlenecks[0].id.as_str(), "db");
}

#[test]
fn one_replica_absorbs_the_read_burst() {
    let result = run(three_tier(2, replicated_db(1)), &read_burst());
    let p99 = result.p99_latency_ms.unwrap();
    assert!(p99 > 25.0 && p99 < 31.0, "p99 was {p99}");
    assert_eq!(result.error_rate, 0.0);
    assert_eq!(result.availability, 1.0);
}

#[tokio::test]
async fn adding_a_replica_turns_fail_into_pass() {
    let engine = engine();

    let report = engine
        .grade(&submission(three_tier(2, ComponentConfig::database()), vec![read_burst()]))
        .await;
    assert!(!report.passed());
    match &report.cases[0].outcome {
        Outcome::Graded { verdict, .. } => {
            let violated: Vec<_> = verdict.failures.iter().map(|f| f.criterion).collect();
            assert_eq!(violated, vec![Criterion::MaxP99LatencyMs, Criterion::MaxErrorRate]);
            assert!(verdict.notes.iter().any(|note| note.contains("`db`")));
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let report = engine
        .grade(&submission(three_tier(2, replicated_db(1)), vec![read_burst()]))
        .await;
    assert!(report.passed(), "{}", report.render_text());
}

#[tokio::test]
async fn reads_and_writes_may_cross_in_opposite_directions() {
    let case = TestCase::new("crossing", Traffic::mixed(200.0, 0.5), 60)
        .with_criteria(PassCriteria::default().with_max_error_rate(0.01));

    let result = run(opposing_paths(), &case);
    assert_eq!(result.error_rate, 0.0);
    assert_eq!(result.availability, 1.0);

    let report = engine().grade(&submission(opposing_paths(), vec![case])).await;
    assert!(report.passed(), "{}", report.render_text());

    // Both classes load both apps, so their shared ceiling is reached together.
    let overload = run(opposing_paths(), &TestCase::new("crossing", Traffic::mixed(1600.0, 0.5), 60));
    assert!(overload.error_rate > 0.0);
}

#[test]
fn identical_inputs_give_identical_results() {
    let case = TestCase::new("mixed", Traffic::mixed(1800.0, 0.9), 120);
    let first = run(cache_aside(0.8), &case);
    let second = run(cache_aside(0.8), &case);
    assert_eq!(first, second);
}

#[test]
fn every_violated_criterion_is_reported_and_no_other() {
    let engine = engine();
    let graph = three_tier(2, ComponentConfig::database()).build();
    let case = TestCase::new("strict", Traffic::reads(1500.0), 30).with_criteria(
        PassCriteria::default()
            .with_max_p99_latency_ms(1000.0)
            .with_max_error_rate(0.5)
            .with_min_availability(0.99)
            .with_max_downtime_seconds(0.0),
    );
    let report = engine.grade_case(&graph, &case, &CancellationToken::new());
    let Outcome::Graded { verdict, result } = report.outcome else {
        panic!("run was not graded");
    };
    // A third of requests fail every tick, below the downtime threshold.
    assert_eq!(result.downtime_seconds, 0.0);
    assert!(verdict.passed);
    assert!(verdict.failures.is_empty());

    let case = case.with_criteria(
        PassCriteria::default()
            .with_max_error_rate(0.2)
            .with_min_availability(0.5),
    );
    let report = engine.grade_case(&graph, &case, &CancellationToken::new());
    let Outcome::Graded { verdict, .. } = report.outcome else {
        panic!("run was not graded");
    };
    let violated: Vec<_> = verdict.failures.iter().map(|f| f.criterion).collect();
    assert_eq!(violated, vec![Criterion::MaxErrorRate]);
}

#[test]
fn cancelled_run_reports_cancellation() {
    let engine = engine();
    let graph = three_tier(1, ComponentConfig::database()).build();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = engine.grade_case(&graph, &TestCase::new("c", Traffic::reads(10.0), 10), &cancel);
    assert_eq!(report.outcome, Outcome::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_grading_keeps_order_and_isolates_failures() {
    let engine = engine();
    let cases = vec![
        TestCase::new("light", Traffic::reads(100.0), 30),
        TestCase::new("broken", Traffic::reads(100.0), 0),
        TestCase::new("heavy", Traffic::reads(1500.0), 30),
        TestCase::new("writes", Traffic::writes(400.0), 30),
    ];
    let submission = submission(three_tier(2, ComponentConfig::database()), cases.clone());
    let report = engine.grade(&submission).await;

    let names: Vec<_> = report.cases.iter().map(|case| case.name.as_str()).collect();
    assert_eq!(names, vec!["light", "broken", "heavy", "writes"]);
    assert!(matches!(report.cases[1].outcome, Outcome::InvalidTestCase { .. }));

    let graph = engine.check(&submission).unwrap();
    for (index, case) in cases.iter().enumerate().filter(|(index, _)| *index != 1) {
        let sequential = engine.grade_case(&graph, case, &CancellationToken::new());
        assert_eq!(report.cases[index], sequential);
    }
    let summary = report.summary();
    assert_eq!((summary.total, summary.errored), (4, 1));
}

#[tokio::test]
async fn grades_a_yaml_submission() {
    let submission: Submission = serde_yaml::from_str(
        r"
graph:
  components:
    - { id: client, kind: client }
    - { id: lb, kind: load_balancer }
    - { id: app, kind: app_server, config: { instances: 3 } }
    - { id: cache, kind: cache, config: { hitRatio: 0.9, strategy: cache_aside } }
    - { id: db, kind: database, config: { replication: { enabled: true, replicaCount: 1 } } }
  connections:
    - { from: client, to: lb }
    - { from: lb, to: app }
    - { from: app, to: cache, trafficType: read }
    - { from: app, to: db }
requirements:
  mustHave: [cache]
  mustConnect:
    - { from: app_server, to: cache }
testCases:
  - name: NFR-P2
    traffic: { type: mixed, rps: 2500, readRatio: 0.9 }
    durationSeconds: 60
    passCriteria: { maxP99LatencyMs: 100, maxErrorRate: 0.01 }
",
    )
    .unwrap();

    let report = engine().grade(&submission).await;
    assert!(report.passed(), "{}", report.render_text());
}
