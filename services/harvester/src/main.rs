//! Procurement listing harvester
//!
//! Batch binary with two commands:
//! 1. `run` (default): crawl recent listings, enrich the ones nobody has bid
//!    on yet, print the result as JSON on stdout
//! 2. `check-session`: classify the stored session and print a JSON health
//!    report
//!
//! Exit codes for `run`: 0 success, 1 failure, 2 manual re-login required.
//! Exit codes for `check-session`: 0 OK, 1 WARN, 2 CRITICAL.

mod commands;
mod config;
mod error;
mod metrics;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tracing::{Instrument, error, info, info_span, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mp_harvest::TracingProgress;

use crate::config::Config;
use crate::error::EXIT_FAILURE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    CheckSession,
}

impl Command {
    fn name(self) -> &'static str {
        match self {
            Command::Run => "run",
            Command::CheckSession => "check-session",
        }
    }
}

/// Parsed command line: `[run|check-session] [--config <path>]`
#[derive(Debug, PartialEq, Eq)]
struct Args {
    command: Command,
    config: Option<String>,
}

fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    let mut command = None;
    let mut config = None;
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                config = Some(iter.next().context("--config needs a path")?.clone());
            }
            "run" if command.is_none() => command = Some(Command::Run),
            "check-session" if command.is_none() => command = Some(Command::CheckSession),
            other => bail!("unexpected argument: {other}"),
        }
    }
    Ok(Args {
        command: command.unwrap_or(Command::Run),
        config,
    })
}

fn print_json<T: Serialize>(value: &T) -> error::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| error::Error::Output(e.to_string()))?;
    println!("{json}");
    Ok(())
}

async fn execute(command: Command, config: &Config, run_id: &str) -> u8 {
    match command {
        Command::Run => {
            match commands::run(config, run_id, Arc::new(TracingProgress)).await {
                Ok(report) => match print_json(&report) {
                    Ok(()) => 0,
                    Err(e) => {
                        error!(error = %e, "run output failed");
                        e.exit_code()
                    }
                },
                Err(e) => {
                    let code = e.exit_code();
                    if code == error::EXIT_REAUTH {
                        error!(error = %e, "session expired, log in again to refresh credentials");
                    } else {
                        error!(error = %e, "run failed");
                    }
                    code
                }
            }
        }
        Command::CheckSession => match commands::check_session(config).await {
            Ok(report) => {
                info!(verdict = ?report.verdict, min_hours = ?report.min_hours, "session checked");
                if let Err(e) = print_json(&report) {
                    error!(error = %e, "session report output failed");
                }
                report.exit_code()
            }
            Err(e) => {
                error!(error = %e, "session check failed");
                e.exit_code()
            }
        },
    }
}

async fn export_metrics(handle: &PrometheusHandle, config: &Config) {
    if let Some(path) = &config.output.metrics_textfile
        && let Err(e) = metrics::write_textfile(handle, path).await
    {
        warn!(path = %path.display(), error = %e, "failed to write metrics textfile");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support.
    // stdout carries the JSON report, so logs go to stderr.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let prometheus_handle = metrics::install_recorder();

    let argv: Vec<String> = std::env::args().collect();
    let args = match parse_args(&argv) {
        Ok(args) => args,
        Err(e) => {
            error!(error = %e, "usage: mp-harvest [run|check-session] [--config <path>]");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let config_path = Config::resolve_path(args.config.as_deref());
    let config = match Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))
    {
        Ok(config) => config,
        Err(e) => {
            error!(error = %format!("{e:#}"), "startup failed");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let run_id = uuid::Uuid::new_v4().to_string();
    let span = info_span!("harvest", run_id = %run_id, command = args.command.name());

    let code = async {
        info!(
            config = %config_path.display(),
            credentials = %config.credentials.path.display(),
            "starting"
        );
        let code = execute(args.command, &config, &run_id).await;
        metrics::record_run(args.command.name(), code);
        export_metrics(&prometheus_handle, &config).await;
        info!(exit_code = code, "finished");
        code
    }
    .instrument(span)
    .await;

    ExitCode::from(code)
}
