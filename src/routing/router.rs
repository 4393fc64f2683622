//! Fallback-chain dispatch.
//!
//! # Responsibilities
//! - Resolve the ordered candidates of an operation
//! - Serve idempotent repeats from the response cache
//! - Run each candidate through breaker and retry until one succeeds
//! - Record every terminal outcome in the execution ledger
//!
//! # Design Decisions
//! - One attempted candidate: its error is returned as is; several: `AggregateFailure`
//! - Ledger writes are awaited before the result is returned
//! - Single-flight followers get the leader's result tagged `cached`

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{CandidateConfig, DispatchConfig, OperationConfig};
use crate::context::DispatchContext;
use crate::error::{CandidateFailure, DispatchError, DispatchResult, ErrorBody};
use crate::ledger::record::now_ms;
use crate::ledger::{ExecutionStatus, RecordEntry};
use crate::observability::metrics;
use crate::resilience::{retry_with_backoff, RetryPolicy};
use crate::routing::key;
use crate::settings::{TestResult, TestStatus};
use crate::transport::{Envelope, Transport};

/// Reserved action that validates candidates without touching the cache.
pub const HEALTH_CHECK_ACTION: &str = "HEALTH_CHECK";

/// Router tuning, taken from the config file.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub caller_id: String,
    pub cache_enabled: bool,
    pub single_flight: bool,
    /// Call timeout for candidates without their own.
    pub call_timeout: Duration,
    pub health_check_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for RouterSettings {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            caller_id: config.router.caller_id.clone(),
            cache_enabled: config.cache.enabled,
            single_flight: config.router.single_flight,
            call_timeout: Duration::from_secs(config.timeouts.call_secs),
            health_check_timeout: Duration::from_secs(config.timeouts.health_check_secs),
            retry: RetryPolicy::from(&config.retries),
        }
    }
}

/// Successful dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dispatched {
    pub data: Value,
    /// Served from the cache or from another caller's in-flight chain.
    pub cached: bool,
    /// Candidate that produced `data`; `None` for cache hits.
    pub candidate: Option<String>,
    pub latency_ms: u64,
}

/// `{success, data, error}` shape returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default)]
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    /// Per-candidate errors of an aggregate failure.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<CandidateFailure>,
}

impl From<DispatchResult<Dispatched>> for DispatchResponse {
    fn from(result: DispatchResult<Dispatched>) -> Self {
        match result {
            Ok(dispatched) => Self {
                success: true,
                data: Some(dispatched.data),
                cached: dispatched.cached,
                candidate: dispatched.candidate,
                latency_ms: Some(dispatched.latency_ms),
                error: None,
                failures: Vec::new(),
            },
            Err(err) => {
                let error = Some(err.body());
                let failures = match err {
                    DispatchError::AggregateFailure(failures) => failures,
                    _ => Vec::new(),
                };
                Self {
                    success: false,
                    data: None,
                    cached: false,
                    candidate: None,
                    latency_ms: None,
                    error,
                    failures,
                }
            }
        }
    }
}

type InFlight = Shared<BoxFuture<'static, DispatchResult<Dispatched>>>;

/// Orchestrates cache, breakers, retries and ledger for every dispatch.
///
/// Cloning shares all state.
#[derive(Clone)]
pub struct FallbackRouter {
    context: DispatchContext,
    transport: Arc<dyn Transport>,
    settings: Arc<RouterSettings>,
    in_flight: Arc<DashMap<String, InFlight>>,
}

impl FallbackRouter {
    pub fn new(
        context: DispatchContext,
        transport: Arc<dyn Transport>,
        settings: RouterSettings,
    ) -> Self {
        Self {
            context,
            transport,
            settings: Arc::new(settings),
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn context(&self) -> &DispatchContext {
        &self.context
    }

    /// Dispatch `action` with `payload` through the fallback chain of `operation_key`.
    pub async fn dispatch(
        &self,
        operation_key: &str,
        action: &str,
        payload: Value,
    ) -> DispatchResult<Dispatched> {
        let started = Instant::now();

        let operation = match self.resolve(operation_key).await {
            Ok(operation) => operation,
            Err(err) => {
                tracing::warn!(operation = %operation_key, error = %err, "Dispatch rejected");
                let latency = started.elapsed();
                self.context
                    .ledger
                    .record(record_entry(operation_key, action, &payload, None, Err(&err), latency, false))
                    .await;
                metrics::record_dispatch(operation_key, "error", false, latency);
                return Err(err);
            }
        };

        if action == HEALTH_CHECK_ACTION {
            return self.check_candidates(&operation, &payload, started).await;
        }

        let cache_slot = (self.settings.cache_enabled && operation.cacheable)
            .then(|| key::cache_key(operation_key, action, &payload));

        if let Some(slot) = cache_slot.as_deref() {
            if let Some(data) = self.context.cache.get(slot) {
                let latency = started.elapsed();
                tracing::debug!(operation = %operation_key, "Cache hit");
                self.context
                    .ledger
                    .record(record_entry(operation_key, action, &payload, None, Ok(&data), latency, true))
                    .await;
                metrics::record_dispatch(operation_key, "success", true, latency);
                return Ok(Dispatched {
                    data,
                    cached: true,
                    candidate: None,
                    latency_ms: latency.as_millis() as u64,
                });
            }
        }

        if self.settings.single_flight {
            let flight_key = cache_slot
                .clone()
                .unwrap_or_else(|| key::cache_key(operation_key, action, &payload));
            return self
                .dispatch_shared(flight_key, operation, action, payload, cache_slot, started)
                .await;
        }

        self.run_chain(&operation, action, &payload, cache_slot.as_deref(), started)
            .await
    }

    /// Run one candidate in isolation with the health-check timeout.
    ///
    /// The cache is never read or written. The outcome is stored in the
    /// settings provider as the candidate's latest test result.
    pub async fn health_check(
        &self,
        operation_key: &str,
        candidate_name: &str,
    ) -> DispatchResult<Dispatched> {
        let started = Instant::now();
        let candidate = self
            .context
            .settings
            .endpoint_config(operation_key)
            .await
            .and_then(|op| op.candidate(candidate_name).cloned())
            .filter(CandidateConfig::is_configured)
            .ok_or_else(|| {
                DispatchError::NoCandidateConfigured(format!("{}:{}", operation_key, candidate_name))
            })?;

        let payload = json!({ "operation": operation_key, "candidate": candidate_name });
        let envelope = Envelope::new(HEALTH_CHECK_ACTION, payload.clone(), &self.settings.caller_id);
        let result = self
            .call_candidate(operation_key, &candidate, &envelope, self.settings.health_check_timeout)
            .await;
        let latency = started.elapsed();

        self.context
            .ledger
            .record(record_entry(
                operation_key,
                HEALTH_CHECK_ACTION,
                &payload,
                Some(candidate_name),
                result.as_ref(),
                latency,
                false,
            ))
            .await;

        let test_result = match &result {
            Ok(_) => TestResult {
                last_tested_at: now_ms(),
                last_test_status: TestStatus::Ok,
                message: None,
            },
            Err(err) => TestResult {
                last_tested_at: now_ms(),
                last_test_status: TestStatus::Error,
                message: Some(err.to_string()),
            },
        };
        self.context
            .settings
            .record_test_result(operation_key, candidate_name, test_result)
            .await;

        match &result {
            Ok(_) => tracing::info!(
                operation = %operation_key,
                candidate = %candidate_name,
                latency_ms = latency.as_millis() as u64,
                "Health check passed"
            ),
            Err(err) => tracing::warn!(
                operation = %operation_key,
                candidate = %candidate_name,
                error = %err,
                "Health check failed"
            ),
        }

        result.map(|data| Dispatched {
            data,
            cached: false,
            candidate: Some(candidate_name.to_string()),
            latency_ms: latency.as_millis() as u64,
        })
    }

    /// `HEALTH_CHECK` dispatch: the candidate named in `payload["candidate"]`, or
    /// every candidate of the operation, each checked on its own.
    ///
    /// There is no fallthrough. Each candidate gets its own test result, and the
    /// dispatch succeeds only if every checked candidate passed.
    async fn check_candidates(
        &self,
        operation: &OperationConfig,
        payload: &Value,
        started: Instant,
    ) -> DispatchResult<Dispatched> {
        if let Some(name) = payload.get("candidate").and_then(Value::as_str) {
            return self.health_check(&operation.key, name).await;
        }

        let mut passed = Vec::with_capacity(operation.candidates.len());
        let mut failures = Vec::new();
        let mut last_error = None;
        for candidate in &operation.candidates {
            match self.health_check(&operation.key, &candidate.name).await {
                Ok(_) => passed.push(candidate.name.clone()),
                Err(err) => {
                    failures.push(err.as_candidate_failure(&candidate.name));
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            None => Ok(Dispatched {
                data: json!({ "passed": passed }),
                cached: false,
                candidate: None,
                latency_ms: started.elapsed().as_millis() as u64,
            }),
            Some(err) if failures.len() == 1 => Err(err),
            Some(_) => Err(DispatchError::AggregateFailure(failures)),
        }
    }

    /// Operation with only enabled, configured candidates left.
    async fn resolve(&self, operation_key: &str) -> DispatchResult<OperationConfig> {
        let mut operation = self
            .context
            .settings
            .endpoint_config(operation_key)
            .await
            .filter(|op| op.enabled)
            .ok_or_else(|| DispatchError::NoCandidateConfigured(operation_key.to_string()))?;

        operation.candidates.retain(|c| c.enabled && c.is_configured());
        if operation.candidates.is_empty() {
            return Err(DispatchError::NoCandidateConfigured(operation_key.to_string()));
        }
        Ok(operation)
    }

    async fn run_chain(
        &self,
        operation: &OperationConfig,
        action: &str,
        payload: &Value,
        cache_slot: Option<&str>,
        started: Instant,
    ) -> DispatchResult<Dispatched> {
        let envelope = Envelope::new(action, payload.clone(), &self.settings.caller_id);
        let mut failures = Vec::with_capacity(operation.candidates.len());
        let mut last_error = None;

        for candidate in &operation.candidates {
            let attempt_started = Instant::now();
            let timeout = candidate
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(self.settings.call_timeout);

            match self
                .call_candidate(&operation.key, candidate, &envelope, timeout)
                .await
            {
                Ok(data) => {
                    if let Some(slot) = cache_slot {
                        self.context.cache.set(slot, data.clone(), operation.cache_ttl());
                    }
                    let latency = started.elapsed();
                    self.context
                        .ledger
                        .record(record_entry(
                            &operation.key,
                            action,
                            payload,
                            Some(&candidate.name),
                            Ok(&data),
                            latency,
                            false,
                        ))
                        .await;
                    metrics::record_dispatch(&operation.key, "success", false, latency);
                    tracing::info!(
                        operation = %operation.key,
                        candidate = %candidate.name,
                        latency_ms = latency.as_millis() as u64,
                        "Dispatch succeeded"
                    );
                    return Ok(Dispatched {
                        data,
                        cached: false,
                        candidate: Some(candidate.name.clone()),
                        latency_ms: latency.as_millis() as u64,
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        operation = %operation.key,
                        candidate = %candidate.name,
                        code = err.code(),
                        error = %err,
                        "Candidate failed, trying next"
                    );
                    self.context
                        .ledger
                        .record(RecordEntry {
                            candidate_attempt: true,
                            ..record_entry(
                                &operation.key,
                                action,
                                payload,
                                Some(&candidate.name),
                                Err(&err),
                                attempt_started.elapsed(),
                                false,
                            )
                        })
                        .await;
                    failures.push(err.as_candidate_failure(&candidate.name));
                    last_error = Some(err);
                }
            }
        }

        let err = match last_error {
            Some(err) if failures.len() == 1 => err,
            _ => DispatchError::AggregateFailure(failures),
        };
        let latency = started.elapsed();
        self.context
            .ledger
            .record(record_entry(&operation.key, action, payload, None, Err(&err), latency, false))
            .await;
        metrics::record_dispatch(&operation.key, "error", false, latency);
        tracing::error!(
            operation = %operation.key,
            code = err.code(),
            error = %err,
            "All candidates exhausted"
        );
        Err(err)
    }

    /// Breaker around retry around one transport call.
    async fn call_candidate(
        &self,
        operation_key: &str,
        candidate: &CandidateConfig,
        envelope: &Envelope,
        timeout: Duration,
    ) -> DispatchResult<Value> {
        let endpoint = candidate.endpoint_key(operation_key);
        let transport = self.transport.as_ref();
        let policy = &self.settings.retry;

        self.context
            .breakers
            .execute(&endpoint, || {
                retry_with_backoff(policy, &endpoint, || {
                    transport.call(candidate, envelope, timeout)
                })
            })
            .await
    }

    /// Join or start the in-flight chain for `flight_key`.
    async fn dispatch_shared(
        &self,
        flight_key: String,
        operation: OperationConfig,
        action: &str,
        payload: Value,
        cache_slot: Option<String>,
        started: Instant,
    ) -> DispatchResult<Dispatched> {
        let operation_key = operation.key.clone();
        let (flight, leader) = match self.in_flight.entry(flight_key.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let router = self.clone();
                let action = action.to_string();
                let input = payload.clone();
                let guard = FlightGuard {
                    in_flight: self.in_flight.clone(),
                    key: flight_key,
                };
                // The chain runs on its own task so it finishes, and frees any
                // half-open breaker slot it holds, even after every waiter is gone.
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    router
                        .run_chain(&operation, &action, &input, cache_slot.as_deref(), started)
                        .await
                });
                let flight = async move {
                    handle.await.unwrap_or_else(|e| {
                        tracing::error!(error = %e, "In-flight dispatch task failed");
                        Err(DispatchError::Request(format!("dispatch task failed: {}", e)))
                    })
                }
                .boxed()
                .shared();
                entry.insert(flight.clone());
                (flight, true)
            }
        };

        let result = flight.await;
        if leader {
            return result;
        }

        let latency = started.elapsed();
        match result {
            Ok(dispatched) => {
                tracing::debug!(operation = %operation_key, "Joined in-flight dispatch");
                self.context
                    .ledger
                    .record(record_entry(
                        &operation_key,
                        action,
                        &payload,
                        dispatched.candidate.as_deref(),
                        Ok(&dispatched.data),
                        latency,
                        true,
                    ))
                    .await;
                metrics::record_dispatch(&operation_key, "success", true, latency);
                Ok(Dispatched {
                    cached: true,
                    latency_ms: latency.as_millis() as u64,
                    ..dispatched
                })
            }
            Err(err) => {
                self.context
                    .ledger
                    .record(record_entry(&operation_key, action, &payload, None, Err(&err), latency, false))
                    .await;
                metrics::record_dispatch(&operation_key, "error", false, latency);
                Err(err)
            }
        }
    }
}

/// Removes a flight from the in-flight map when its task ends, even on panic.
struct FlightGuard {
    in_flight: Arc<DashMap<String, InFlight>>,
    key: String,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}

/// Ledger entry for one outcome.
fn record_entry(
    operation: &str,
    action: &str,
    input: &Value,
    candidate: Option<&str>,
    outcome: Result<&Value, &DispatchError>,
    latency: Duration,
    cached: bool,
) -> RecordEntry {
    let (status, output) = match outcome {
        Ok(value) => (ExecutionStatus::Success, value.clone()),
        Err(err) => (ExecutionStatus::Error, json!({ "error": err.body() })),
    };
    RecordEntry {
        operation_type: operation.to_string(),
        candidate: candidate.map(str::to_string),
        action: action.to_string(),
        status,
        input: input.clone(),
        output,
        latency,
        cached,
        candidate_attempt: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ResponseCache, TtlCache};
    use crate::config::CandidateKind;
    use crate::ledger::ExecutionLedger;
    use crate::resilience::{BreakerRegistry, BreakerSettings, CircuitState};
    use crate::settings::{ConfigSettings, SettingsProvider};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Transport answering from a per-candidate script; the last entry repeats.
    #[derive(Default)]
    struct ScriptedTransport {
        script: HashMap<String, Vec<DispatchResult<Value>>>,
        calls: Mutex<HashMap<String, usize>>,
        delay: Duration,
    }

    impl ScriptedTransport {
        fn with(mut self, candidate: &str, results: Vec<DispatchResult<Value>>) -> Self {
            self.script.insert(candidate.to_string(), results);
            self
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self, candidate: &str) -> usize {
            self.calls.lock().unwrap().get(candidate).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn call(
            &self,
            candidate: &CandidateConfig,
            _envelope: &Envelope,
            _timeout: Duration,
        ) -> DispatchResult<Value> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                let count = calls.entry(candidate.name.clone()).or_insert(0);
                *count += 1;
                *count - 1
            };
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let results = &self.script[&candidate.name];
            results.get(n).or(results.last()).cloned().unwrap()
        }
    }

    /// Cache that counts every read and write.
    #[derive(Default)]
    struct CountingCache {
        inner: TtlCache,
        reads: AtomicUsize,
        writes: AtomicUsize,
    }

    impl ResponseCache for CountingCache {
        fn get(&self, key: &str) -> Option<Value> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value, ttl)
        }

        fn invalidate(&self, prefix: Option<&str>) -> usize {
            self.inner.invalidate(prefix)
        }

        fn len(&self) -> usize {
            self.inner.len()
        }
    }

    fn webhook(name: &str) -> CandidateConfig {
        CandidateConfig {
            name: name.into(),
            kind: CandidateKind::Webhook,
            url: format!("http://127.0.0.1:9/{}", name),
            enabled: true,
            bearer_token: None,
            timeout_secs: None,
            response: None,
        }
    }

    fn operation(candidates: Vec<CandidateConfig>) -> OperationConfig {
        OperationConfig {
            key: "summary".into(),
            enabled: true,
            cacheable: true,
            cache_ttl_secs: None,
            candidates,
        }
    }

    fn instant_retries() -> RouterSettings {
        RouterSettings {
            retry: RetryPolicy {
                max_retries: 3,
                initial_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
                multiplier: 2.0,
                jitter_ratio: 0.0,
            },
            ..RouterSettings::default()
        }
    }

    struct Harness {
        router: FallbackRouter,
        transport: Arc<ScriptedTransport>,
        cache: Arc<CountingCache>,
        settings: Arc<ConfigSettings>,
    }

    fn harness(
        operations: Vec<OperationConfig>,
        transport: ScriptedTransport,
        breakers: BreakerRegistry,
        router_settings: RouterSettings,
    ) -> Harness {
        let transport = Arc::new(transport);
        let cache = Arc::new(CountingCache::default());
        let settings = Arc::new(ConfigSettings::new(operations));
        let context = DispatchContext::new(
            cache.clone(),
            breakers,
            Arc::new(ExecutionLedger::in_memory(100)),
            settings.clone(),
        );
        Harness {
            router: FallbackRouter::new(context, transport.clone(), router_settings),
            transport,
            cache,
            settings,
        }
    }

    fn http_500() -> DispatchResult<Value> {
        Err(DispatchError::Transport {
            status: 500,
            body: "Internal Server Error".into(),
        })
    }

    #[tokio::test]
    async fn test_falls_through_to_next_candidate() {
        let transport = ScriptedTransport::default()
            .with("a", vec![http_500()])
            .with("b", vec![Ok(json!({"from": "b"}))]);
        let h = harness(
            vec![operation(vec![webhook("a"), webhook("b")])],
            transport,
            BreakerRegistry::default(),
            instant_retries(),
        );

        let payload = json!({"invoice": 42});
        let dispatched = h.router.dispatch("summary", "generate", payload.clone()).await.unwrap();
        assert_eq!(dispatched.data, json!({"from": "b"}));
        assert_eq!(dispatched.candidate.as_deref(), Some("b"));
        assert!(!dispatched.cached);
        assert_eq!(h.transport.calls("a"), 3);
        assert_eq!(h.transport.calls("b"), 1);

        // Newest first: success for b, then the failure for a.
        let history = h.router.context().ledger.history(None).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].candidate.as_deref(), Some("b"));
        assert_eq!(history[0].status, ExecutionStatus::Success);
        assert_eq!(history[1].candidate.as_deref(), Some("a"));
        assert_eq!(history[1].status, ExecutionStatus::Error);
        assert_eq!(history[1].output_payload["error"]["code"], "TRANSPORT_ERROR");
        assert!(history[1].candidate_attempt);

        // One dispatch, and it succeeded.
        let stats = h.router.context().ledger.stats().await;
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.total_errors, 0);
        assert_eq!(stats.error_rate, 0.0);

        assert_eq!(h.cache.writes.load(Ordering::SeqCst), 1);
        let key = key::cache_key("summary", "generate", &payload);
        assert_eq!(h.cache.inner.get(&key), Some(json!({"from": "b"})));
    }

    #[tokio::test]
    async fn test_cache_hit_is_tagged_and_recorded() {
        let transport = ScriptedTransport::default().with("a", vec![Ok(json!({"n": 1}))]);
        let h = harness(
            vec![operation(vec![webhook("a")])],
            transport,
            BreakerRegistry::default(),
            instant_retries(),
        );

        h.router.dispatch("summary", "generate", json!({"id": 1})).await.unwrap();
        let second = h.router.dispatch("summary", "generate", json!({"id": 1})).await.unwrap();

        assert!(second.cached);
        assert_eq!(second.candidate, None);
        assert_eq!(second.data, json!({"n": 1}));
        assert_eq!(h.transport.calls("a"), 1);

        let history = h.router.context().ledger.history(None).await;
        assert_eq!(history.len(), 2);
        assert!(history[0].cached);
    }

    #[tokio::test]
    async fn test_health_check_never_touches_cache() {
        let transport = ScriptedTransport::default().with("a", vec![Ok(json!({"ok": true}))]);
        let h = harness(
            vec![operation(vec![webhook("a")])],
            transport,
            BreakerRegistry::default(),
            instant_retries(),
        );

        let dispatched = h
            .router
            .dispatch("summary", HEALTH_CHECK_ACTION, json!({}))
            .await
            .unwrap();
        assert!(!dispatched.cached);

        h.router.health_check("summary", "a").await.unwrap();

        assert_eq!(h.cache.reads.load(Ordering::SeqCst), 0);
        assert_eq!(h.cache.writes.load(Ordering::SeqCst), 0);
        assert_eq!(h.transport.calls("a"), 2);

        let results = h.settings.test_results().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].result.last_test_status, TestStatus::Ok);
    }

    #[tokio::test]
    async fn test_health_check_dispatch_checks_each_candidate() {
        let transport = ScriptedTransport::default()
            .with("a", vec![http_500()])
            .with("b", vec![Ok(json!({"ok": true}))]);
        let h = harness(
            vec![operation(vec![webhook("a"), webhook("b")])],
            transport,
            BreakerRegistry::default(),
            instant_retries(),
        );

        // A healthy b does not hide a failing a.
        let err = h
            .router
            .dispatch("summary", HEALTH_CHECK_ACTION, json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "TRANSPORT_ERROR");
        assert_eq!(h.transport.calls("b"), 1);

        let results = h.settings.test_results().await;
        assert_eq!(results.len(), 2);
        let a = results.iter().find(|r| r.candidate == "a").unwrap();
        assert_eq!(a.result.last_test_status, TestStatus::Error);
        let b = results.iter().find(|r| r.candidate == "b").unwrap();
        assert_eq!(b.result.last_test_status, TestStatus::Ok);

        assert_eq!(h.cache.reads.load(Ordering::SeqCst), 0);
        assert_eq!(h.cache.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_health_check_dispatch_targets_named_candidate() {
        let transport = ScriptedTransport::default()
            .with("a", vec![http_500()])
            .with("b", vec![Ok(json!({"ok": true}))]);
        let h = harness(
            vec![operation(vec![webhook("a"), webhook("b")])],
            transport,
            BreakerRegistry::default(),
            instant_retries(),
        );

        let dispatched = h
            .router
            .dispatch("summary", HEALTH_CHECK_ACTION, json!({"candidate": "b"}))
            .await
            .unwrap();
        assert_eq!(dispatched.candidate.as_deref(), Some("b"));
        assert_eq!(h.transport.calls("a"), 0);
        assert_eq!(h.transport.calls("b"), 1);

        let results = h.settings.test_results().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].candidate, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_http_500_retries_then_fails_once_on_breaker() {
        let transport = ScriptedTransport::default().with("a", vec![http_500()]);
        let h = harness(
            vec![operation(vec![webhook("a")])],
            transport,
            BreakerRegistry::default(),
            RouterSettings::default(),
        );

        let start = Instant::now();
        let result = h.router.dispatch("summary", "generate", json!({})).await;
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(3000));
        assert!(elapsed < Duration::from_millis(3100));
        assert_eq!(h.transport.calls("a"), 3);

        let response = DispatchResponse::from(result);
        assert!(!response.success);
        let error = response.error.unwrap();
        assert_eq!(error.code, "TRANSPORT_ERROR");
        assert!(error.retryable);

        let stats = h.router.context().breakers.stats("summary:a").unwrap();
        assert_eq!(stats.failure_count, 1);
        assert_eq!(stats.state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_no_candidate_configured() {
        let mut disabled = webhook("a");
        disabled.enabled = false;
        let mut no_url = webhook("b");
        no_url.url = String::new();
        let h = harness(
            vec![operation(vec![disabled, no_url])],
            ScriptedTransport::default(),
            BreakerRegistry::default(),
            instant_retries(),
        );

        let err = h.router.dispatch("summary", "generate", json!({})).await.unwrap_err();
        assert_eq!(err.code(), "NO_CANDIDATE_CONFIGURED");
        assert!(!err.is_retryable());

        let err = h.router.dispatch("unknown", "generate", json!({})).await.unwrap_err();
        assert_eq!(err, DispatchError::NoCandidateConfigured("unknown".into()));

        let history = h.router.context().ledger.history(None).await;
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|r| r.is_error()));
    }

    #[tokio::test]
    async fn test_open_circuit_skips_candidate() {
        let transport = ScriptedTransport::default()
            .with("a", vec![http_500()])
            .with("b", vec![Ok(json!({"from": "b"}))]);
        let breakers = BreakerRegistry::new(BreakerSettings {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(60),
        });
        let h = harness(
            vec![operation(vec![webhook("a"), webhook("b")])],
            transport,
            breakers,
            instant_retries(),
        );

        h.router.dispatch("summary", "generate", json!({"n": 1})).await.unwrap();
        assert_eq!(
            h.router.context().breakers.state("summary:a"),
            Some(CircuitState::Open)
        );

        let second = h.router.dispatch("summary", "generate", json!({"n": 2})).await.unwrap();
        assert_eq!(second.candidate.as_deref(), Some("b"));
        assert_eq!(h.transport.calls("a"), 3);

        let history = h.router.context().ledger.history(None).await;
        assert_eq!(history[1].output_payload["error"]["code"], "CIRCUIT_OPEN");
    }

    #[tokio::test]
    async fn test_all_candidates_fail() {
        let transport = ScriptedTransport::default()
            .with("a", vec![http_500()])
            .with("b", vec![Err(DispatchError::Timeout(5))]);
        let h = harness(
            vec![operation(vec![webhook("a"), webhook("b")])],
            transport,
            BreakerRegistry::default(),
            instant_retries(),
        );

        let result = h.router.dispatch("summary", "generate", json!({})).await;
        match &result {
            Err(DispatchError::AggregateFailure(failures)) => {
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].code, "TRANSPORT_ERROR");
                assert_eq!(failures[1].code, "TIMEOUT");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let response = DispatchResponse::from(result);
        assert_eq!(response.failures.len(), 2);
        assert!(response.error.unwrap().retryable);

        // Two candidate records and the final one.
        assert_eq!(h.router.context().ledger.len().await, 3);
        let stats = h.router.context().ledger.stats().await;
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.total_errors, 1);
        assert_eq!(h.cache.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_uncacheable_operation_skips_cache() {
        let transport = ScriptedTransport::default().with("a", vec![Ok(json!({}))]);
        let mut op = operation(vec![webhook("a")]);
        op.cacheable = false;
        let h = harness(vec![op], transport, BreakerRegistry::default(), instant_retries());

        h.router.dispatch("summary", "generate", json!({})).await.unwrap();
        h.router.dispatch("summary", "generate", json!({})).await.unwrap();

        assert_eq!(h.transport.calls("a"), 2);
        assert_eq!(h.cache.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_shares_one_chain() {
        let transport = ScriptedTransport::default()
            .with("a", vec![Ok(json!({"n": 1}))])
            .delayed(Duration::from_millis(50));
        let h = harness(
            vec![operation(vec![webhook("a")])],
            transport,
            BreakerRegistry::default(),
            RouterSettings {
                single_flight: true,
                ..instant_retries()
            },
        );

        let (first, second) = tokio::join!(
            h.router.dispatch("summary", "generate", json!({"id": 9})),
            h.router.dispatch("summary", "generate", json!({"id": 9})),
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(h.transport.calls("a"), 1);
        assert_eq!(first.data, second.data);
        assert!(first.cached != second.cached);
        assert_eq!(h.router.context().ledger.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_single_flight_both_callers_run() {
        let transport = ScriptedTransport::default()
            .with("a", vec![Ok(json!({"n": 1}))])
            .delayed(Duration::from_millis(50));
        let h = harness(
            vec![operation(vec![webhook("a")])],
            transport,
            BreakerRegistry::default(),
            instant_retries(),
        );

        let (first, second) = tokio::join!(
            h.router.dispatch("summary", "generate", json!({"id": 9})),
            h.router.dispatch("summary", "generate", json!({"id": 9})),
        );
        assert!(first.is_ok() && second.is_ok());
        assert_eq!(h.transport.calls("a"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_leader_still_completes_flight() {
        let transport = ScriptedTransport::default()
            .with("a", vec![http_500(), Ok(json!({"n": 2}))])
            .delayed(Duration::from_millis(50));
        let breakers = BreakerRegistry::new(BreakerSettings {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(60),
        });
        let mut settings = instant_retries();
        settings.single_flight = true;
        settings.retry.max_retries = 1;
        let h = harness(
            vec![operation(vec![webhook("a")])],
            transport,
            breakers,
            settings,
        );

        h.router.dispatch("summary", "generate", json!({"n": 1})).await.unwrap_err();
        assert_eq!(h.router.context().breakers.state("summary:a"), Some(CircuitState::Open));

        tokio::time::advance(Duration::from_secs(61)).await;

        // The only caller gives up while its half-open attempt is running.
        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            h.router.dispatch("summary", "generate", json!({"n": 2})),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(h.router.in_flight.is_empty());
        assert_eq!(h.transport.calls("a"), 2);
        assert_eq!(h.router.context().breakers.state("summary:a"), Some(CircuitState::Closed));

        let dispatched = h.router.dispatch("summary", "generate", json!({"n": 3})).await.unwrap();
        assert_eq!(dispatched.candidate.as_deref(), Some("a"));
    }
}
