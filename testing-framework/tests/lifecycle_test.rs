//! End-to-end lifecycle tests
//!
//! Registry → provisioner → runner → report, on in-process foundations.

use proptest::prelude::*;
use spectre_testing_framework::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn free_base_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port().min(60_000)
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn harness(config: &RunConfig, launcher: InProcessLauncher) -> LifecycleRunner {
    init_logging();
    let mut options = ProvisionOptions::from(config);
    options.base_port = free_base_port();
    let provisioner = Provisioner::new(Arc::new(launcher), options);
    LifecycleRunner::new(Arc::new(provisioner), config.into())
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn counting_case(name: &str, hits: &Arc<AtomicUsize>) -> TestCase {
    let hits = hits.clone();
    TestCase::new(name, move |_ctx| {
        let hits = hits.clone();
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
}

#[tokio::test]
async fn test_dev_suite_passes_with_exit_code_zero() {
    let mut registry = SuiteRegistry::new();
    registry
        .register(
            SuiteDeclaration::builder("A", "trivially true", FoundationKind::Dev)
                .case("true == true", |_ctx| async move {
                    ensure!(true == true);
                    Ok(())
                })
                .build(),
        )
        .unwrap();

    let runner = harness(&RunConfig::default(), InProcessLauncher::new());
    let report = runner.run_all(&registry, &[]).await.unwrap();

    let a = report.suite("A").unwrap();
    assert_eq!(a.state, SuiteState::Passed);
    assert_eq!(a.cases_executed(), 1);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(runner.provisioner().stats().torn_down, 1);
}

#[tokio::test]
async fn test_before_all_failure_errors_without_running_cases() {
    let hits = counter();
    let case_hits = hits.clone();
    let suite = SuiteDeclaration::builder("B", "setup breaks", FoundationKind::Dev)
        .before_all(|_ctx| async move { bail!("genesis not as expected") })
        .test_cases(move |_ctx| {
            vec![
                counting_case("first", &case_hits),
                counting_case("second", &case_hits),
            ]
        })
        .build();

    let runner = harness(&RunConfig::default(), InProcessLauncher::new());
    let result = runner.run(&suite).await;

    assert_eq!(result.state, SuiteState::Errored);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(result.cases_executed(), 0);
    assert!(result
        .cases
        .iter()
        .all(|c| c.outcome == CaseOutcome::Skipped));
    match &result.error {
        Some(HarnessError::HookFailure { hook, message }) => {
            assert_eq!(hook, "beforeAll");
            assert!(message.contains("genesis not as expected"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(result.history.contains(&SuiteState::TearingDown));
    assert_eq!(runner.provisioner().stats().torn_down, 1);
}

#[tokio::test(start_paused = true)]
async fn test_zombie_provision_timeout_errors_before_hooks() {
    let hooks = counter();
    let hook_hits = hooks.clone();
    let cases = counter();
    let case_hits = cases.clone();
    let suite = SuiteDeclaration::builder("C", "network never comes up", FoundationKind::Zombie)
        .before_all(move |_ctx| {
            let hits = hook_hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .test_cases(move |_ctx| vec![counting_case("unreachable", &case_hits)])
        .build();

    let config = RunConfig {
        timeout_ms: 500,
        ..RunConfig::default()
    };
    let launcher = InProcessLauncher::new().with_startup_delay(Duration::from_secs(3_600));
    let runner = harness(&config, launcher);
    let report = runner.run_all(&single(suite), &[]).await.unwrap();

    let c = report.suite("C").unwrap();
    assert_eq!(c.state, SuiteState::Errored);
    assert!(matches!(
        c.error,
        Some(HarnessError::ProvisionTimeout { timeout_ms: 500, .. })
    ));
    assert_eq!(
        c.history,
        vec![SuiteState::Pending, SuiteState::Provisioning, SuiteState::Errored]
    );
    assert_eq!(hooks.load(Ordering::SeqCst), 0);
    assert_eq!(cases.load(Ordering::SeqCst), 0);
    assert!(c.cases.is_empty());
    assert_eq!(report.exit_code(), 1);

    // The partially started network was still released
    let stats = runner.provisioner().stats();
    assert_eq!(stats.attempts, 1);
    assert_eq!(stats.torn_down, 1);
    assert_eq!(runner.provisioner().ports().active_leases(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_provision_timeout_retains_logs_when_configured() {
    let suite = SuiteDeclaration::builder("C", "network never comes up", FoundationKind::Zombie)
        .case("unreachable", |_ctx| async move { Ok(()) })
        .build();

    let config = RunConfig {
        timeout_ms: 500,
        retain_logs_on_failure: true,
        ..RunConfig::default()
    };
    let launcher = InProcessLauncher::new().with_startup_delay(Duration::from_secs(3_600));
    let runner = harness(&config, launcher);
    let result = runner.run(&suite).await;

    assert_eq!(result.state, SuiteState::Errored);
    assert!(matches!(
        result.error,
        Some(HarnessError::ProvisionTimeout { timeout_ms: 500, .. })
    ));
    let kept = result.retained_logs.clone().unwrap();
    assert!(kept.join("alice").exists());
    std::fs::remove_dir_all(kept).unwrap();
}

fn single(suite: SuiteDeclaration) -> SuiteRegistry {
    let mut registry = SuiteRegistry::new();
    registry.register(suite).unwrap();
    registry
}

#[test]
fn test_duplicate_t1_rejected() {
    let mut registry = SuiteRegistry::new();
    registry
        .register(SuiteDeclaration::builder("T1", "first", FoundationKind::Dev).build())
        .unwrap();
    let err = registry
        .register(SuiteDeclaration::builder("T1", "second", FoundationKind::Zombie).build())
        .unwrap_err();

    assert_eq!(err, HarnessError::DuplicateSuiteId("T1".to_string()));
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.all()[0].title(), "first");
}

#[tokio::test]
async fn test_registration_order_is_execution_order() {
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let mut registry = SuiteRegistry::new();
    for id in ["third", "first", "second"] {
        let order = order.clone();
        registry
            .register(
                SuiteDeclaration::builder(id, id, FoundationKind::Dev)
                    .before_all(move |ctx| {
                        let order = order.clone();
                        async move {
                            order.lock().push(ctx.suite_id().to_string());
                            Ok(())
                        }
                    })
                    .build(),
            )
            .unwrap();
    }

    let runner = harness(&RunConfig::default(), InProcessLauncher::new());
    let report = runner.run_all(&registry, &[]).await.unwrap();

    assert_eq!(*order.lock(), vec!["third", "first", "second"]);
    let ids: Vec<_> = report.suites.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["third", "first", "second"]);
}

#[tokio::test]
async fn test_filter_selects_suites() {
    let mut registry = SuiteRegistry::new();
    for id in ["a", "b", "c"] {
        registry
            .register(SuiteDeclaration::builder(id, id, FoundationKind::Dev).build())
            .unwrap();
    }

    let runner = harness(&RunConfig::default(), InProcessLauncher::new());
    let report = runner.run_all(&registry, &["c".to_string()]).await.unwrap();

    assert_eq!(report.suites.len(), 1);
    assert_eq!(report.suites[0].id, "c");
}

#[tokio::test]
async fn test_unknown_filter_id_is_rejected_before_provisioning() {
    let mut registry = SuiteRegistry::new();
    registry
        .register(SuiteDeclaration::builder("T1", "known", FoundationKind::Dev).build())
        .unwrap();

    let runner = harness(&RunConfig::default(), InProcessLauncher::new());
    let err = runner
        .run_all(&registry, &["T1".to_string(), "t1".to_string()])
        .await
        .unwrap_err();

    match err {
        HarnessError::InvalidSuite(detail) => assert!(detail.contains("'t1'"), "{}", detail),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(runner.provisioner().stats().attempts, 0);
}

#[tokio::test]
async fn test_parallel_suites_get_disjoint_ports() {
    let mut registry = SuiteRegistry::new();
    for id in ["p1", "p2", "p3"] {
        registry
            .register(
                SuiteDeclaration::builder(id, id, FoundationKind::Zombie)
                    .case("yield", |_ctx| async move {
                        tokio::task::yield_now().await;
                        Ok(())
                    })
                    .build(),
            )
            .unwrap();
    }

    let config = RunConfig {
        max_parallel_suites: 3,
        ..RunConfig::default()
    };
    let runner = harness(&config, InProcessLauncher::new());
    let report = runner.run_all(&registry, &[]).await.unwrap();
    assert!(report.all_passed());

    let mut ports: Vec<u16> = report
        .suites
        .iter()
        .flat_map(|s| s.topology.iter().map(|n| n.ports.rpc))
        .collect();
    let total = ports.len();
    ports.sort_unstable();
    ports.dedup();
    assert_eq!(total, 9);
    assert_eq!(ports.len(), total);
}

#[tokio::test]
async fn test_retain_logs_only_for_unsuccessful_suites() {
    let mut registry = SuiteRegistry::new();
    registry
        .register(
            SuiteDeclaration::builder("ok", "passes", FoundationKind::Dev)
                .case("fine", |_ctx| async move { Ok(()) })
                .build(),
        )
        .unwrap();
    registry
        .register(
            SuiteDeclaration::builder("bad", "fails", FoundationKind::Dev)
                .case("broken", |_ctx| async move { bail!("nope") })
                .build(),
        )
        .unwrap();

    let config = RunConfig {
        retain_logs_on_failure: true,
        ..RunConfig::default()
    };
    let runner = harness(&config, InProcessLauncher::new());
    let report = runner.run_all(&registry, &[]).await.unwrap();

    assert!(report.suite("ok").unwrap().retained_logs.is_none());
    let kept = report.suite("bad").unwrap().retained_logs.clone().unwrap();
    assert!(kept.exists());
    std::fs::remove_dir_all(kept).unwrap();
    assert_eq!(report.exit_code(), 1);
}

#[derive(Debug, Clone, Copy)]
enum Behaviour {
    Pass,
    Fail,
    Panic,
}

fn behaviour() -> impl Strategy<Value = Behaviour> {
    prop_oneof![
        Just(Behaviour::Pass),
        Just(Behaviour::Fail),
        Just(Behaviour::Panic)
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_teardown_once_and_state_rules(
        before_all_fails in any::<bool>(),
        cases in prop::collection::vec(behaviour(), 0..6),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let executed = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let produced = cases.clone();
        let log = executed.clone();
        let suite = SuiteDeclaration::builder("prop", "generated", FoundationKind::Dev)
            .before_all(move |_ctx| async move {
                ensure!(!before_all_fails, "before_all told to fail");
                Ok(())
            })
            .test_cases(move |_ctx| {
                produced
                    .iter()
                    .enumerate()
                    .map(|(index, behaviour)| {
                        let behaviour = *behaviour;
                        let log = log.clone();
                        TestCase::new(format!("case {}", index), move |_ctx| {
                            let log = log.clone();
                            async move {
                                log.lock().push(index);
                                match behaviour {
                                    Behaviour::Pass => Ok(()),
                                    Behaviour::Fail => bail!("case {} failed", index),
                                    Behaviour::Panic => panic!("case {} panicked", index),
                                }
                            }
                        })
                    })
                    .collect()
            })
            .build();

        let runner = harness(&RunConfig::default(), InProcessLauncher::new());
        let result = runtime.block_on(runner.run(&suite));
        let stats = runner.provisioner().stats();

        prop_assert_eq!(stats.provisioned, 1);
        prop_assert_eq!(stats.torn_down, 1);

        if before_all_fails {
            prop_assert_eq!(result.state, SuiteState::Errored);
            prop_assert!(executed.lock().is_empty());
        } else {
            // Every case ran, in declared order, regardless of earlier failures
            let expected: Vec<usize> = (0..cases.len()).collect();
            prop_assert_eq!(&*executed.lock(), &expected);

            let any_failed = cases.iter().any(|b| !matches!(b, Behaviour::Pass));
            let expected_state = if any_failed { SuiteState::Failed } else { SuiteState::Passed };
            prop_assert_eq!(result.state, expected_state);
            prop_assert_eq!(result.failed_cases().count(), cases.iter().filter(|b| !matches!(b, Behaviour::Pass)).count());
        }
    }
}
