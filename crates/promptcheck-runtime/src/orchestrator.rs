//! Execution orchestrator: runs every case of a suite through a bounded
//! worker pool and hands the verdicts to the aggregator.
//!
//! - At most `concurrency` dispatches are in flight at once
//! - Verdicts come back in declared case order, whatever the completion order
//! - Every domain failure becomes a verdict; `run` itself cannot fail
//! - A panicking case is recorded as aborted and its worker moves on
//! - No attempt starts after the suite deadline

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::Instant;

use promptcheck_core::{
    evaluate_all, render, FailureCause, Suite, SuiteAggregator, SuiteResult, TestCase, Verdict,
};

use crate::config::{ConfigError, EngineConfig};
use crate::providers::{
    ExecutionRequest, GatewayMap, ProviderError, ProviderGateway, ProviderRegistry,
};
use crate::resilience::{RetryController, RetryFailure};

/// Errors building an orchestrator. Nothing here happens during a run.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Runs test cases against resolved gateways.
pub struct Orchestrator {
    executor: Arc<CaseExecutor>,
    concurrency: usize,
    suite_deadline: Option<Duration>,
    aggregator: SuiteAggregator,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Build from a loaded suite: `settings` become the engine config and
    /// each `providers` entry is resolved through `registry`.
    pub fn from_suite(suite: &Suite, registry: &ProviderRegistry) -> Result<Self, EngineError> {
        Self::from_suite_with(suite, registry, |config| config)
    }

    /// Like [`Orchestrator::from_suite`], with `overrides` applied to the
    /// suite's settings before validation.
    pub fn from_suite_with(
        suite: &Suite,
        registry: &ProviderRegistry,
        overrides: impl FnOnce(EngineConfig) -> EngineConfig,
    ) -> Result<Self, EngineError> {
        let config = overrides(EngineConfig::from_settings(&suite.settings)?);
        let gateways = registry.resolve_all(&suite.providers)?;
        OrchestratorBuilder::new()
            .config(config)
            .gateways(gateways)
            .build()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `cases` and aggregate their verdicts.
    pub async fn run(&self, cases: &[TestCase]) -> SuiteResult {
        let started = std::time::Instant::now();
        // A deadline past the clock's range never fires.
        let deadline = self.suite_deadline.and_then(|d| Instant::now().checked_add(d));
        let workers = self.concurrency.min(cases.len());

        tracing::info!(
            cases = cases.len(),
            workers,
            deadline = ?self.suite_deadline,
            "Starting suite run"
        );

        let cases: Arc<[TestCase]> = cases.into();
        let slots: Arc<Vec<OnceLock<Verdict>>> =
            Arc::new((0..cases.len()).map(|_| OnceLock::new()).collect());
        let next = Arc::new(AtomicUsize::new(0));

        let mut pool = JoinSet::new();
        for worker in 0..workers {
            let executor = Arc::clone(&self.executor);
            let cases = Arc::clone(&cases);
            let slots = Arc::clone(&slots);
            let next = Arc::clone(&next);

            pool.spawn(async move {
                loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(case) = cases.get(index) else {
                        break;
                    };
                    let verdict = executor.execute_isolated(case, deadline).await;
                    tracing::debug!(
                        worker,
                        case = %case.id,
                        outcome = ?verdict.outcome(),
                        attempts = verdict.attempts,
                        "Case finished"
                    );
                    // Each index is claimed by exactly one worker.
                    let _ = slots[index].set(verdict);
                }
            });
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Worker terminated abnormally");
            }
        }

        let verdicts: Vec<Verdict> = cases
            .iter()
            .zip(slots.iter())
            .map(|(case, slot)| {
                slot.get().cloned().unwrap_or_else(|| {
                    Verdict::no_response(
                        &case.id,
                        FailureCause::Aborted {
                            detail: "worker terminated before recording a verdict".to_string(),
                        },
                        0,
                        Duration::ZERO,
                    )
                })
            })
            .collect();

        let result = self.aggregator.aggregate(verdicts, started);
        tracing::info!(
            total = result.counts.total,
            passed = result.counts.passed,
            failed = result.counts.failed,
            errored = result.counts.errored,
            duration = ?result.duration,
            "Suite run finished"
        );
        result
    }

    /// Run every case of `suite`.
    pub async fn run_suite(&self, suite: &Suite) -> SuiteResult {
        self.run(&suite.cases).await
    }
}

/// Turns one case into one verdict. Shared read-only by every worker.
struct CaseExecutor {
    gateways: GatewayMap,
    retry: RetryController,
    attempt_timeout: Duration,
}

impl CaseExecutor {
    /// [`CaseExecutor::execute`], with a panic anywhere in the case turned
    /// into an `Aborted` verdict so the calling worker keeps going.
    async fn execute_isolated(&self, case: &TestCase, deadline: Option<Instant>) -> Verdict {
        let started = Instant::now();
        let attempts = AtomicU32::new(0);

        match AssertUnwindSafe(self.execute(case, deadline, &attempts))
            .catch_unwind()
            .await
        {
            Ok(verdict) => verdict,
            Err(payload) => {
                let detail = format!("case panicked: {}", panic_message(payload.as_ref()));
                tracing::error!(case = %case.id, detail = %detail, "Case aborted");
                Verdict::no_response(
                    &case.id,
                    FailureCause::Aborted { detail },
                    attempts.load(Ordering::SeqCst),
                    started.elapsed(),
                )
            }
        }
    }

    async fn execute(
        &self,
        case: &TestCase,
        deadline: Option<Instant>,
        attempts: &AtomicU32,
    ) -> Verdict {
        let started = Instant::now();

        if deadline.is_some_and(|d| started >= d) {
            tracing::warn!(case = %case.id, "Suite deadline elapsed before case started");
            return Verdict::no_response(&case.id, FailureCause::SuiteTimeout, 0, Duration::ZERO);
        }

        let Some(gateway) = self.gateways.get(&case.provider) else {
            return configuration_error(
                case,
                format!("unknown provider '{}'", case.provider),
                started,
            );
        };

        let request = match self.prepare(case) {
            Ok(request) => request,
            Err(detail) => return configuration_error(case, detail, started),
        };

        let result = self
            .retry
            .run_tracked(gateway.as_ref(), &request, deadline, attempts)
            .await;
        let made = attempts.load(Ordering::SeqCst);
        let elapsed = started.elapsed();

        match result {
            Ok(response) => Verdict::evaluated(
                &case.id,
                evaluate_all(&case.assertions, &response),
                made,
                elapsed,
            ),
            Err(RetryFailure::Dispatch(error)) => Verdict::no_response(
                &case.id,
                FailureCause::Dispatch { error },
                made,
                elapsed,
            ),
            Err(RetryFailure::DeadlineReached { .. }) => {
                Verdict::no_response(&case.id, FailureCause::SuiteTimeout, made, elapsed)
            }
        }
    }

    /// Resolve templates and build the dispatch request.
    fn prepare(&self, case: &TestCase) -> Result<ExecutionRequest, String> {
        let prompt = render(&case.prompt, &case.vars).map_err(|e| format!("prompt: {}", e))?;
        let system = case
            .system
            .as_deref()
            .map(|s| render(s, &case.vars))
            .transpose()
            .map_err(|e| format!("system prompt: {}", e))?;

        Ok(ExecutionRequest::for_case(
            case,
            prompt,
            system,
            case.timeout.unwrap_or(self.attempt_timeout),
        ))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

fn configuration_error(case: &TestCase, detail: String, started: Instant) -> Verdict {
    tracing::warn!(case = %case.id, detail = %detail, "Case misconfigured");
    Verdict::no_response(
        &case.id,
        FailureCause::Configuration { detail },
        0,
        started.elapsed(),
    )
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    config: EngineConfig,
    gateways: GatewayMap,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            gateways: GatewayMap::new(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a gateway under a provider selector.
    pub fn gateway(mut self, selector: impl Into<String>, gateway: Arc<dyn ProviderGateway>) -> Self {
        self.gateways.insert(selector.into(), gateway);
        self
    }

    /// Add every gateway of an already-resolved map.
    pub fn gateways(mut self, gateways: GatewayMap) -> Self {
        self.gateways.extend(gateways);
        self
    }

    /// Validate the configuration and build the orchestrator.
    pub fn build(self) -> Result<Orchestrator, EngineError> {
        self.config.validate()?;
        tracing::debug!(config = %self.config, providers = self.gateways.len(), "Orchestrator configured");

        Ok(Orchestrator {
            executor: Arc::new(CaseExecutor {
                gateways: self.gateways,
                retry: RetryController::from_config(&self.config),
                attempt_timeout: self.config.attempt_timeout,
            }),
            concurrency: self.config.concurrency,
            suite_deadline: self.config.suite_deadline,
            aggregator: SuiteAggregator::new(),
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
