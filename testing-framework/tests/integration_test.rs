//! Smoke tests over the public surface suite authors import from the prelude.

use spectre_testing_framework::prelude::*;
use std::time::Duration;

#[test]
fn test_prelude_declares_and_registers_suites() {
    let suite = SuiteDeclaration::builder("smoke", "Prelude smoke", FoundationKind::Dev)
        .case("noop", |_ctx| async { Ok(()) })
        .build();

    let mut registry = SuiteRegistry::new();
    registry.register(suite).unwrap();
    assert_eq!(registry.get("smoke").unwrap().foundation(), FoundationKind::Dev);
    assert!(!spectre_testing_framework::VERSION.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_paused_clock_is_usable_as_trait_object() {
    let clock: Arc<dyn Clock> = Arc::new(PausedClock::new());
    let origin = clock.now();

    clock.sleep(Duration::from_secs(90)).await;
    assert!(clock.now().duration_since(origin) >= Duration::from_secs(90));
}

#[test]
fn test_well_known_accounts() {
    let alith: Address = "0xf24FF3a9CF04c71Dbc94D0b566f7A27B94566cac".parse().unwrap();
    assert_eq!(ALITH.address, alith);
    assert_ne!(BALTATHAR.address, CHARLETH.address);
    assert_ne!(generate_account().address, DOROTHY.address);
}

#[test]
fn test_config_from_yaml() {
    let config = RunConfig::from_yaml("timeout_ms: 1500\nretain_logs_on_failure: true\n").unwrap();
    assert_eq!(config.timeout(), Duration::from_millis(1500));
    assert!(config.retain_logs_on_failure);
    assert_eq!(config.topology, Topology::default());
}
