//! Failure injection: breakers, recovery and background health checks.

use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resilient_dispatch::config::{CandidateConfig, CandidateKind};
use resilient_dispatch::lifecycle::{Services, Shutdown};
use resilient_dispatch::resilience::CircuitState;
use resilient_dispatch::settings::{SettingsProvider, TestStatus};

mod common;

fn static_fallback() -> CandidateConfig {
    CandidateConfig {
        name: "static".into(),
        kind: CandidateKind::Static,
        url: String::new(),
        enabled: true,
        bearer_token: None,
        timeout_secs: None,
        response: Some(json!({"text": "fallback"})),
    }
}

#[tokio::test]
async fn test_breaker_opens_and_recovers() {
    let healthy = Arc::new(AtomicBool::new(false));
    let flag = healthy.clone();
    let (addr, requests) = common::start_programmable_backend(move || {
        let flag = flag.clone();
        async move {
            if flag.load(Ordering::SeqCst) {
                (200, r#"{"text":"primary"}"#.into())
            } else {
                (500, "dead".into())
            }
        }
    })
    .await;

    let mut operation = common::operation(
        "summary",
        vec![common::webhook("primary", addr), static_fallback()],
    );
    operation.cacheable = false;
    let mut config = common::test_config(vec![operation]);
    config.circuit_breaker.failure_threshold = 2;
    config.circuit_breaker.reset_timeout_secs = 1;
    let services = Services::build(config);
    let breakers = &services.context().breakers;

    for _ in 0..2 {
        let dispatched = services.router.dispatch("summary", "generate", json!({})).await.unwrap();
        assert_eq!(dispatched.candidate.as_deref(), Some("static"));
    }
    assert_eq!(breakers.state("summary:primary"), Some(CircuitState::Open));
    let attempts = requests.lock().unwrap().len();
    assert_eq!(attempts, 6);

    // Open circuit: the primary is skipped without a request.
    let dispatched = services.router.dispatch("summary", "generate", json!({})).await.unwrap();
    assert_eq!(dispatched.candidate.as_deref(), Some("static"));
    assert_eq!(requests.lock().unwrap().len(), attempts);

    healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1200)).await;

    let dispatched = services.router.dispatch("summary", "generate", json!({})).await.unwrap();
    assert_eq!(dispatched.candidate.as_deref(), Some("primary"));
    assert_eq!(dispatched.data, json!({"text": "primary"}));
    assert_eq!(breakers.state("summary:primary"), Some(CircuitState::Closed));
    assert_eq!(breakers.stats("summary:primary").unwrap().failure_count, 0);
}

#[tokio::test]
async fn test_failed_probe_reopens_circuit() {
    let (addr, requests) = common::start_mock_backend(503, "still down").await;

    let mut operation = common::operation("summary", vec![common::webhook("primary", addr)]);
    operation.cacheable = false;
    let mut config = common::test_config(vec![operation]);
    config.circuit_breaker.failure_threshold = 1;
    config.circuit_breaker.reset_timeout_secs = 1;
    config.retries.max_retries = 1;
    let services = Services::build(config);
    let breakers = &services.context().breakers;

    let _ = services.router.dispatch("summary", "generate", json!({})).await;
    assert_eq!(breakers.state("summary:primary"), Some(CircuitState::Open));

    let result = services.router.dispatch("summary", "generate", json!({})).await;
    assert_eq!(result.unwrap_err().code(), "CIRCUIT_OPEN");
    assert_eq!(requests.lock().unwrap().len(), 1);

    tokio::time::sleep(Duration::from_millis(1200)).await;

    let result = services.router.dispatch("summary", "generate", json!({})).await;
    assert_eq!(result.unwrap_err().code(), "TRANSPORT_ERROR");
    assert_eq!(requests.lock().unwrap().len(), 2);
    assert_eq!(breakers.state("summary:primary"), Some(CircuitState::Open));
}

#[tokio::test]
async fn test_background_health_checks_record_results() {
    let (failing, _) = common::start_mock_backend(500, "dead").await;

    let mut config = common::test_config(vec![common::operation(
        "summary",
        vec![common::webhook("primary", failing), static_fallback()],
    )]);
    config.health_check.enabled = true;
    config.health_check.interval_secs = 1;
    let services = Services::build(config);

    let shutdown = Shutdown::new();
    let tasks = services.spawn_background(&shutdown);

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let results = services.settings.test_results().await;
    assert_eq!(results.len(), 2);
    let primary = results.iter().find(|r| r.candidate == "primary").unwrap();
    assert_eq!(primary.result.last_test_status, TestStatus::Error);
    assert!(primary.result.message.is_some());
    let fallback = results.iter().find(|r| r.candidate == "static").unwrap();
    assert_eq!(fallback.result.last_test_status, TestStatus::Ok);

    // Health checks never populate the cache.
    assert_eq!(services.context().cache.len(), 0);

    shutdown.trigger();
    for task in tasks {
        task.await.unwrap();
    }
}
