//! # promptcheck-runtime
//!
//! Async execution engine for promptcheck suites.
//!
//! `promptcheck-core` decides whether a response satisfies its assertions;
//! this crate obtains the responses. It provides:
//!
//! - Provider gateways behind one dispatch contract (fixture, plus
//!   Anthropic, OpenAI and local inference behind cargo features)
//! - A retry controller with per-attempt timeouts and jittered backoff
//! - A bounded-concurrency orchestrator that keeps verdicts in declared order
//!
//! ## Example
//!
//! ```rust,ignore
//! use promptcheck_core::Suite;
//! use promptcheck_runtime::{Orchestrator, ProviderRegistry};
//!
//! let suite = Suite::from_yaml_file("suites/smoke.yaml")?;
//! let registry = ProviderRegistry::with_defaults();
//! let orchestrator = Orchestrator::from_suite(&suite, &registry)?;
//!
//! let result = orchestrator.run_suite(&suite).await;
//! println!("{}/{} passed", result.counts.passed, result.counts.total);
//! ```

pub mod config;
pub mod orchestrator;
pub mod providers;
pub mod resilience;

pub use config::{BackoffConfig, ConfigError, EngineConfig};
pub use orchestrator::{EngineError, Orchestrator, OrchestratorBuilder};
pub use providers::{
    ExecutionRequest, FixtureGateway, GatewayMap, ProviderError, ProviderFactory,
    ProviderGateway, ProviderRegistry,
};
pub use resilience::{RetryController, RetryFailure};
