//! End-to-end runs of the orchestrator against scripted and fixture gateways.

use async_trait::async_trait;
use promptcheck_core::{
    Assertion, Comparison, DispatchError, FailureCause, ModelResponse, Outcome,
    ResponseMetadata, Suite, TestCase,
};
use promptcheck_runtime::providers::FixtureConfig;
use promptcheck_runtime::{
    BackoffConfig, EngineConfig, ExecutionRequest, FixtureGateway, Orchestrator,
    ProviderGateway, ProviderRegistry,
};
use serde_json::json;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Per-case scripts of failures, then `{"status":"ok"}`.
#[derive(Default)]
struct ScriptedGateway {
    scripts: Mutex<BTreeMap<String, VecDeque<DispatchError>>>,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedGateway {
    fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    fn script(self, case_id: &str, errors: Vec<DispatchError>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(case_id.to_string(), errors.into());
        self
    }
}

#[async_trait]
impl ProviderGateway for ScriptedGateway {
    async fn dispatch(&self, request: &ExecutionRequest) -> Result<ModelResponse, DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.case_id)
            .and_then(VecDeque::pop_front);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match next {
            // Hang past the attempt deadline.
            Some(DispatchError::Timeout) => std::future::pending().await,
            Some(error) => Err(error),
            None => Ok(ModelResponse::new(
                format!(r#"{{"status":"ok","case":"{}"}}"#, request.case_id),
                ResponseMetadata::with_latency(self.latency),
            )),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Panics when dispatching `case_id`, answers `{"status":"ok"}` otherwise.
struct PanickingGateway {
    case_id: &'static str,
    calls: AtomicUsize,
}

#[async_trait]
impl ProviderGateway for PanickingGateway {
    async fn dispatch(&self, request: &ExecutionRequest) -> Result<ModelResponse, DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.case_id == self.case_id {
            panic!("gateway bug while handling {}", request.case_id);
        }
        Ok(ModelResponse::new(r#"{"status":"ok"}"#, ResponseMetadata::default()))
    }

    fn name(&self) -> &str {
        "panicking"
    }
}

fn quiet_backoff() -> BackoffConfig {
    BackoffConfig {
        base: Duration::from_millis(10),
        multiplier: 2.0,
        max_delay: Duration::from_millis(100),
        jitter: 0.0,
    }
}

fn status_ok(id: &str) -> TestCase {
    TestCase::new(id, "main", "Reply with status").with_assertion(Assertion::path(
        "status",
        "$.status",
        Comparison::Equals(json!("ok")),
    ))
}

fn engine(gateway: Arc<dyn ProviderGateway>, config: EngineConfig) -> Orchestrator {
    Orchestrator::builder()
        .config(config.with_backoff(quiet_backoff()))
        .gateway("main", gateway)
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_twice_then_success() {
    let gateway = ScriptedGateway::default().script(
        "t1",
        vec![
            DispatchError::rate_limited(Some(Duration::from_secs(1))),
            DispatchError::rate_limited(None),
        ],
    );
    let result = engine(Arc::new(gateway), EngineConfig::default())
        .run(&[status_ok("t1")])
        .await;

    let verdict = &result.verdicts[0];
    assert!(verdict.passed);
    assert_eq!(verdict.attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_stops_after_one_attempt() {
    let gateway = ScriptedGateway::default().script("t1", vec![DispatchError::Unauthorized]);
    let result = engine(Arc::new(gateway), EngineConfig::default().with_max_attempts(5))
        .run(&[status_ok("t1")])
        .await;

    let verdict = &result.verdicts[0];
    assert_eq!(verdict.attempts, 1);
    assert_eq!(verdict.outcome(), Outcome::Errored);
    assert_eq!(
        verdict.failure,
        Some(FailureCause::Dispatch {
            error: DispatchError::Unauthorized
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_exhaust_attempt_cap() {
    let gateway = ScriptedGateway::default().script(
        "t1",
        vec![
            DispatchError::Timeout,
            DispatchError::Timeout,
            DispatchError::Timeout,
        ],
    );
    let config = EngineConfig::default()
        .with_max_attempts(3)
        .with_attempt_timeout(Duration::from_secs(2));
    let result = engine(Arc::new(gateway), config).run(&[status_ok("t1")]).await;

    let verdict = &result.verdicts[0];
    assert_eq!(verdict.attempts, 3);
    assert_eq!(
        verdict.failure,
        Some(FailureCause::Dispatch {
            error: DispatchError::Timeout
        })
    );
    assert!(verdict.elapsed >= Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_case_timeout_overrides_default() {
    let gateway = ScriptedGateway::default().script("t1", vec![DispatchError::Timeout]);
    let case = status_ok("t1").with_timeout(Duration::from_millis(500));
    let config = EngineConfig::default().with_attempt_timeout(Duration::from_secs(60));
    let result = engine(Arc::new(gateway), config).run(&[case]).await;

    let verdict = &result.verdicts[0];
    assert!(verdict.passed);
    assert_eq!(verdict.attempts, 2);
    assert!(verdict.elapsed < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_verdict_order_is_independent_of_concurrency() {
    let cases: Vec<TestCase> = (0..12).map(|i| status_ok(&format!("case-{:02}", i))).collect();
    let scripted = || {
        ScriptedGateway::with_latency(Duration::from_millis(20))
            .script("case-03", vec![DispatchError::transport("reset")])
            .script("case-07", vec![DispatchError::Unauthorized])
    };

    let serial = engine(Arc::new(scripted()), EngineConfig::default().with_concurrency(1))
        .run(&cases)
        .await;
    let parallel = engine(Arc::new(scripted()), EngineConfig::default().with_concurrency(5))
        .run(&cases)
        .await;

    let ids: Vec<&str> = cases.iter().map(|c| c.id.as_str()).collect();
    for result in [&serial, &parallel] {
        let order: Vec<&str> = result.verdicts.iter().map(|v| v.case_id.as_str()).collect();
        assert_eq!(order, ids);
    }

    let summary = |r: &promptcheck_core::SuiteResult| {
        r.verdicts
            .iter()
            .map(|v| (v.case_id.clone(), v.outcome(), v.attempts))
            .collect::<Vec<_>>()
    };
    assert_eq!(summary(&serial), summary(&parallel));
    assert_eq!(parallel.counts.passed, 11);
    assert_eq!(parallel.counts.errored, 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_cap_is_respected() {
    let gateway = Arc::new(ScriptedGateway::with_latency(Duration::from_millis(50)));
    let cases: Vec<TestCase> = (0..20).map(|i| status_ok(&format!("t{}", i))).collect();

    let result = engine(gateway.clone(), EngineConfig::default().with_concurrency(3))
        .run(&cases)
        .await;

    assert_eq!(result.counts.passed, 20);
    let peak = gateway.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak in-flight dispatches was {}", peak);
    assert!(peak >= 2, "workers never overlapped");
}

#[tokio::test(start_paused = true)]
async fn test_suite_deadline_stops_new_cases() {
    let fixture = FixtureGateway::new(FixtureConfig {
        body: Some(json!({"status": "ok"})),
        delay: Some(Duration::from_secs(2)),
        ..Default::default()
    });
    let config = EngineConfig::default()
        .with_concurrency(1)
        .with_suite_deadline(Duration::from_secs(3));
    let cases = [status_ok("t1"), status_ok("t2"), status_ok("t3")];

    let result = engine(Arc::new(fixture), config).run(&cases).await;

    // t2 starts before the deadline and is allowed to finish.
    assert!(result.verdicts[0].passed);
    assert!(result.verdicts[1].passed);
    assert_eq!(result.verdicts[2].failure, Some(FailureCause::SuiteTimeout));
    assert_eq!(result.verdicts[2].attempts, 0);
    assert_eq!(result.counts.errored, 1);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_during_backoff_is_suite_timeout() {
    let gateway = ScriptedGateway::default().script(
        "t1",
        vec![DispatchError::rate_limited(Some(Duration::from_secs(30)))],
    );
    let config = EngineConfig::default().with_suite_deadline(Duration::from_secs(5));
    let result = engine(Arc::new(gateway), config).run(&[status_ok("t1")]).await;

    let verdict = &result.verdicts[0];
    assert_eq!(verdict.attempts, 1);
    assert_eq!(verdict.failure, Some(FailureCause::SuiteTimeout));
}

#[tokio::test(start_paused = true)]
async fn test_unrepresentable_retry_after_is_suite_timeout() {
    let gateway = ScriptedGateway::default().script(
        "t1",
        vec![DispatchError::rate_limited(Some(Duration::from_secs(u64::MAX)))],
    );
    let config = EngineConfig::default()
        .with_concurrency(1)
        .with_suite_deadline(Duration::from_secs(60));
    let result = engine(Arc::new(gateway), config)
        .run(&[status_ok("t1"), status_ok("t2")])
        .await;

    let t1 = &result.verdicts[0];
    assert_eq!(t1.failure, Some(FailureCause::SuiteTimeout));
    assert_eq!(t1.attempts, 1);
    assert!(result.verdicts[1].passed);
}

#[tokio::test]
async fn test_panicking_case_does_not_take_down_its_worker() {
    let gateway = Arc::new(PanickingGateway {
        case_id: "t1",
        calls: AtomicUsize::new(0),
    });
    let cases = [status_ok("t1"), status_ok("t2"), status_ok("t3")];

    let result = engine(gateway.clone(), EngineConfig::default().with_concurrency(1))
        .run(&cases)
        .await;

    let t1 = &result.verdicts[0];
    assert_eq!(t1.attempts, 1);
    assert!(matches!(
        &t1.failure,
        Some(FailureCause::Aborted { detail }) if detail.contains("gateway bug while handling t1")
    ));
    assert!(result.verdicts[1].passed);
    assert!(result.verdicts[2].passed);
    assert_eq!(result.counts.errored, 1);
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_configuration_errors_do_not_dispatch() {
    let gateway = Arc::new(ScriptedGateway::default());
    let cases = [
        TestCase::new("unknown", "elsewhere", "hi"),
        TestCase::new("unresolved", "main", "Hi {{name}}"),
        TestCase::new("resolved", "main", "Hi {{name}}").with_var("name", json!("Ada")),
    ];

    let result = engine(gateway.clone(), EngineConfig::default()).run(&cases).await;

    for verdict in &result.verdicts[..2] {
        assert_eq!(verdict.attempts, 0);
        assert!(matches!(
            verdict.failure,
            Some(FailureCause::Configuration { .. })
        ));
    }
    assert!(result.verdicts[2].passed);
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unstructured_body_fails_structural_assertions() {
    let fixture = FixtureGateway::with_body("Sorry, I can't help with that.");
    let case = status_ok("t1").with_assertion(Assertion::text(
        "apology",
        promptcheck_core::TextMode::ContainsIgnoreCase,
        "sorry",
    ));

    let result = engine(Arc::new(fixture), EngineConfig::default()).run(&[case]).await;

    let verdict = &result.verdicts[0];
    assert_eq!(verdict.outcome(), Outcome::Failed);
    assert_eq!(verdict.results[0].diagnostic, "response not structured");
    assert!(verdict.results[1].passed);
}

#[tokio::test]
async fn test_suite_file_runs_against_fixture_registry() {
    let yaml = r#"
name: smoke
settings:
  concurrency: 2
  max_attempts: 2
  backoff: { base: 1ms, max_delay: 5ms }
providers:
  canned:
    type: fixture
    body: '{"status": "ok", "items": [1, 2, 3]}'
    cases:
      t2: { status: "error" }
cases:
  - id: t1
    prompt: "Check {{thing}}"
    provider: canned
    vars: { thing: status }
    assertions:
      - { kind: path, path: "$.status", equals: ok }
      - { kind: path, path: "$.items[*]", numeric-range: { min: 1, max: 3 } }
  - id: t2
    prompt: "Check status"
    provider: canned
    assertions:
      - { kind: path, path: "$.status", equals: ok }
"#;
    let suite = Suite::from_yaml(yaml).unwrap();
    let orchestrator = Orchestrator::from_suite(&suite, &ProviderRegistry::with_defaults()).unwrap();
    assert_eq!(orchestrator.concurrency(), 2);

    let result = orchestrator.run_suite(&suite).await;

    assert_eq!(result.counts.total, 2);
    assert_eq!(result.counts.passed, 1);
    assert_eq!(result.counts.failed, 1);
    assert!(!result.all_passed());

    let failure = result.failures().next().unwrap();
    assert_eq!(failure.case_id, "t2");
    assert!(failure.results[0].diagnostic.contains("error"));
}

#[tokio::test]
async fn test_tool_calls_and_cost_from_fixture_suite() {
    let yaml = r#"
name: tools
providers:
  agent:
    type: fixture
    body: "Looking up the forecast."
    tool_calls:
      - { name: get_weather, args: { city: Paris, days: 3 } }
      - { name: send_email, args: { to: "ada@example.com" } }
    prompt_tokens: 2000
    completion_tokens: 500
    pricing: { input_per_mtok: 3.0, output_per_mtok: 15.0 }
cases:
  - id: forecast
    prompt: "Weather in Paris?"
    provider: agent
    assertions:
      - { kind: tool-call, name: get_weather, args: { subset: { city: Paris } } }
      - { kind: tool-call, name: get_weather, args: { path: { path: $.days, numeric-range: { max: 7 } } } }
      - { kind: tool-calls, names: [send_email, get_weather], order: any-order }
      - { kind: cost, max_usd: 0.0135 }
  - id: strict
    prompt: "Weather in Paris?"
    provider: agent
    assertions:
      - { kind: tool-calls, names: [send_email, get_weather] }
      - { kind: tool-call, name: get_weather, args: { equals: { city: Paris } } }
      - { kind: cost, max_usd: 0.01 }
"#;
    let suite = Suite::from_yaml(yaml).unwrap();
    let orchestrator = Orchestrator::from_suite(&suite, &ProviderRegistry::with_defaults()).unwrap();
    let result = orchestrator.run_suite(&suite).await;

    let forecast = &result.verdicts[0];
    assert!(forecast.passed, "{:?}", forecast.results);

    let strict = &result.verdicts[1];
    assert_eq!(strict.outcome(), Outcome::Failed);
    assert!(strict.results.iter().all(|r| !r.passed), "{:?}", strict.results);
    assert!(strict.results[2].diagnostic.contains("0.013500"));
}

#[test]
fn test_setting_overrides_apply_before_build() {
    let yaml = r#"
name: s
settings: { concurrency: 2 }
providers:
  main: { type: fixture, echo: true }
cases:
  - { id: t1, prompt: hi, provider: main }
"#;
    let suite = Suite::from_yaml(yaml).unwrap();
    let registry = ProviderRegistry::with_defaults();

    let defaults = Orchestrator::from_suite(&suite, &registry).unwrap();
    assert_eq!(defaults.concurrency(), 2);

    let overridden =
        Orchestrator::from_suite_with(&suite, &registry, |c| c.with_concurrency(7)).unwrap();
    assert_eq!(overridden.concurrency(), 7);

    let invalid = Orchestrator::from_suite_with(&suite, &registry, |c| c.with_concurrency(0));
    assert!(invalid.is_err());
}

#[test]
fn test_unknown_provider_type_is_a_build_error() {
    let yaml = r#"
name: s
providers:
  main: { type: carrier-pigeon }
cases:
  - { id: t1, prompt: hi, provider: main }
"#;
    let suite = Suite::from_yaml(yaml).unwrap();
    let result = Orchestrator::from_suite(&suite, &ProviderRegistry::with_defaults());
    assert!(result.is_err());
}
