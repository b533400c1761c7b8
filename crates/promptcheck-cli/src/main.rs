//! `promptcheck` command line.
//!
//! Exit codes: 0 when every case passed, 1 when any case failed or errored,
//! 2 when the suite or its configuration could not be loaded.

mod report;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use promptcheck_core::{durations, Suite};
use promptcheck_runtime::{EngineConfig, Orchestrator, ProviderRegistry};

/// Declarative verification of prompt-based model interactions
#[derive(Parser)]
#[command(name = "promptcheck")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a suite and report verdicts
    Run(RunArgs),

    /// Load and check a suite without dispatching anything
    Validate {
        /// Suite file (.yaml, .yml or .json)
        suite: PathBuf,
    },

    /// List the provider types this build supports
    Providers,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Suite file (.yaml, .yml or .json)
    suite: PathBuf,

    /// Worker pool size
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Attempts per case, including the first
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Per-attempt timeout, e.g. `20s`
    #[arg(long, value_parser = durations::parse)]
    timeout: Option<Duration>,

    /// Overall suite deadline, e.g. `5m`
    #[arg(long, value_parser = durations::parse)]
    deadline: Option<Duration>,

    /// Only run these case ids (repeatable)
    #[arg(long = "case", value_name = "ID")]
    cases: Vec<String>,

    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
    Yaml,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Validate { suite } => validate(&suite),
        Command::Providers => {
            list_providers();
            Ok(true)
        }
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(verbose))
        .init();
}

fn load_suite(path: &Path) -> Result<Suite> {
    Suite::from_file(path).with_context(|| format!("Failed to load suite {}", path.display()))
}

/// Returns whether every case passed.
async fn run(args: RunArgs) -> Result<bool> {
    let mut suite = load_suite(&args.suite)?;

    if !args.cases.is_empty() {
        if let Some(missing) = args.cases.iter().find(|id| suite.case(id).is_none()) {
            bail!("No case '{}' in suite '{}'", missing, suite.name);
        }
        suite.cases.retain(|case| args.cases.contains(&case.id));
    }

    let registry = ProviderRegistry::with_defaults();
    let orchestrator = Orchestrator::from_suite_with(&suite, &registry, |config| {
        apply_overrides(config, &args)
    })
    .context("Invalid engine configuration")?;

    let result = orchestrator.run_suite(&suite).await;
    tracing::info!(
        suite = %suite.name,
        passed = result.counts.passed,
        failed = result.counts.failed,
        errored = result.counts.errored,
        "Run complete"
    );

    match args.format {
        Format::Text => print!("{}", report::render_text(&suite.name, &result)),
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Yaml => print!("{}", serde_yaml::to_string(&result)?),
    }

    Ok(result.all_passed())
}

fn apply_overrides(mut config: EngineConfig, args: &RunArgs) -> EngineConfig {
    if let Some(concurrency) = args.concurrency {
        config = config.with_concurrency(concurrency);
    }
    if let Some(max_attempts) = args.max_attempts {
        config = config.with_max_attempts(max_attempts);
    }
    if let Some(timeout) = args.timeout {
        config = config.with_attempt_timeout(timeout);
    }
    if let Some(deadline) = args.deadline {
        config = config.with_suite_deadline(deadline);
    }
    config
}

/// Everything `run` would reject before dispatching, plus warnings for
/// problems that only surface per case at run time.
fn validate(path: &Path) -> Result<bool> {
    let suite = load_suite(path)?;
    let config = EngineConfig::from_settings(&suite.settings).context("Invalid settings")?;

    let registry = ProviderRegistry::with_defaults();
    let errors = registry.validate_all(&suite.providers);
    for error in &errors {
        tracing::error!(error = %error, "Provider configuration rejected");
    }

    let mut warnings = 0;
    for case in &suite.cases {
        if !suite.providers.contains_key(&case.provider) {
            tracing::warn!(case = %case.id, provider = %case.provider, "Case uses undeclared provider");
            warnings += 1;
        }
    }
    for (case_id, name) in suite.unresolved_placeholders() {
        tracing::warn!(case = %case_id, placeholder = %name, "Template placeholder has no value");
        warnings += 1;
    }

    if !errors.is_empty() {
        bail!("{} provider configuration error(s)", errors.len());
    }

    println!(
        "Suite '{}' is valid: {} case(s), {} provider(s), {}",
        suite.name,
        suite.cases.len(),
        suite.providers.len(),
        config
    );
    if warnings > 0 {
        println!("{} warning(s)", warnings);
    }
    Ok(true)
}

fn list_providers() {
    let registry = ProviderRegistry::with_defaults();
    for (provider_type, description) in registry.describe() {
        println!("{:<12} {}", provider_type, description);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durations_accept_human_forms() {
        let cli = Cli::try_parse_from([
            "promptcheck",
            "run",
            "suite.yaml",
            "--timeout",
            " 1m 30s",
            "--deadline",
            "250ms",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.timeout, Some(Duration::from_secs(90)));
        assert_eq!(args.deadline, Some(Duration::from_millis(250)));

        assert!(Cli::try_parse_from(["promptcheck", "run", "s.yaml", "--timeout", "soon"]).is_err());
    }

    #[test]
    fn test_overrides_reach_engine_config() {
        let cli = Cli::try_parse_from(["promptcheck", "run", "s.yaml", "-c", "3", "--max-attempts", "5"])
            .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let config = apply_overrides(EngineConfig::default(), &args);
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.max_attempts, 5);
    }
}
