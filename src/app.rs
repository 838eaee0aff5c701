use anyhow::{Context, Result};
use colored::*;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::app_deps::{CredentialProvider, EnvCredentialProvider, JsonRowFile, RowSink, RowSource, StdoutSink};
use crate::cli::{Cli, CommonArgs, Commands};
use crate::config::{Config, EngineConfig, Overrides};
use crate::engine::{ApplyOutcome, FetchOptions, Mode, Reconciliation, ReconciliationEngine, ScopeFilter};
use crate::errors::ReconcileError;
use crate::paths;

/// How a run ended, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every row (or listing) succeeded or was skipped.
    Success,
    /// All rows were attempted and at least one failed.
    Partial,
    /// Nothing was attempted.
    Fatal,
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Success => 0,
            RunStatus::Partial => 1,
            RunStatus::Fatal => 2,
        }
    }
}

pub struct App;

impl App {
    pub async fn run(cli: Cli) -> Result<RunStatus> {
        paths::load_env_file();
        let config_path = cli.config.clone().unwrap_or_else(paths::find_config_file);
        let config = Config::load_or_default(&config_path)?;
        let cancel = cancel_on_ctrl_c();

        match cli.command {
            Commands::Fetch(args) => {
                let engine = build_engine(config, &args.common, cancel)?;
                let options = FetchOptions {
                    include_values: args.fetch_values,
                    include_environments: args.environments,
                };
                let sink: Box<dyn RowSink> = match args.output {
                    Some(path) => Box::new(JsonRowFile::new(path)),
                    None => Box::new(StdoutSink),
                };
                Self::fetch_with_deps(&engine, args.common.scope, options, sink.as_ref()).await
            }
            Commands::Update(args) => {
                let engine = build_engine(config, &args.common, cancel)?;
                let source = JsonRowFile::new(args.rows);
                Self::update_with_deps(&engine, args.common.scope, &source).await
            }
        }
    }

    pub async fn update_with_deps(
        engine: &ReconciliationEngine,
        filter: ScopeFilter,
        source: &dyn RowSource,
    ) -> Result<RunStatus> {
        let rows = source.read_rows()?;
        let labels: Vec<String> = rows
            .iter()
            .map(|r| format!("{} {}", r.item_type.trim(), r.name.trim()))
            .collect();

        eprintln!(
            "{} {} row(s) for organization {}",
            "Applying".cyan().bold(),
            rows.len(),
            engine.organization().bold()
        );

        let outcomes = match engine.reconcile(Mode::Apply(rows), filter).await {
            Ok(Reconciliation::Applied(outcomes)) => outcomes,
            Ok(Reconciliation::Fetched(_)) => anyhow::bail!("apply run returned fetched items"),
            Err(e) => return Ok(report_fatal(&e)),
        };

        let mut failed = 0;
        for (label, outcome) in labels.iter().zip(&outcomes) {
            match outcome {
                ApplyOutcome::Created => eprintln!("  {} {}", "created".green(), label),
                ApplyOutcome::Updated => eprintln!("  {} {}", "updated".green(), label),
                ApplyOutcome::Skipped(reason) => {
                    eprintln!("  {} {} ({})", "skipped".yellow(), label, reason)
                }
                ApplyOutcome::Failed(e) => {
                    failed += 1;
                    eprintln!("  {} {}: {}", "failed".red().bold(), label, e)
                }
            }
        }

        if failed > 0 {
            eprintln!("{} {} of {} row(s) failed", "✗".red(), failed, outcomes.len());
            Ok(RunStatus::Partial)
        } else {
            eprintln!("{} {} row(s) reconciled", "✓".green(), outcomes.len());
            Ok(RunStatus::Success)
        }
    }

    pub async fn fetch_with_deps(
        engine: &ReconciliationEngine,
        filter: ScopeFilter,
        options: FetchOptions,
        sink: &dyn RowSink,
    ) -> Result<RunStatus> {
        eprintln!(
            "{} items for organization {}",
            "Fetching".cyan().bold(),
            engine.organization().bold()
        );

        let report = match engine.reconcile(Mode::Fetch(options), filter).await {
            Ok(Reconciliation::Fetched(report)) => report,
            Ok(Reconciliation::Applied(_)) => anyhow::bail!("fetch run returned apply outcomes"),
            Err(e) => return Ok(report_fatal(&e)),
        };

        sink.write_items(&report.items)
            .context("Failed to write fetched items")?;

        for failure in &report.failures {
            eprintln!("  {} {}: {}", "failed".red().bold(), failure.target, failure.error);
        }
        if report.cancelled {
            eprintln!("{}", "Fetch cancelled before every repository was listed".yellow());
        }
        eprintln!("{} {} item(s) fetched", "✓".green(), report.items.len());

        Ok(if report.failures.is_empty() && !report.cancelled {
            RunStatus::Success
        } else {
            RunStatus::Partial
        })
    }
}

fn build_engine(config: Config, common: &CommonArgs, cancel: CancellationToken) -> Result<ReconciliationEngine> {
    let token = EnvCredentialProvider::new(common.token.clone()).token()?;
    let overrides = Overrides {
        organization: common.org.clone(),
        api_url: common.api_url.clone(),
        concurrency: common.concurrency,
    };
    let engine_config: EngineConfig = config.resolve(overrides, token)?;
    let engine = ReconciliationEngine::new(&engine_config).context("Failed to create GitHub client")?;
    Ok(engine.with_cancellation(cancel))
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight requests");
            token.cancel();
        }
    });
    cancel
}

fn report_fatal(error: &ReconcileError) -> RunStatus {
    eprintln!("{} {}", "✗".red(), error.to_string().red());
    RunStatus::Fatal
}
