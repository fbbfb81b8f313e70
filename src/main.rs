//! evmrace - Application Entry Point
//!
//! Discovers benchmark cases, measures every input natively and in the EVM,
//! and writes the result tables.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use evmrace::benchmark::{Orchestrator, SystemRunner};
use evmrace::Config;

/// Benchmark algorithms natively and inside the go-ethereum VM
#[derive(Debug, Parser)]
#[command(name = "evmrace", version, about)]
struct Args {
    /// Directory containing one subdirectory per benchmark case
    #[arg(long, env = "EVMRACE_BENCH_ROOT")]
    root: Option<PathBuf>,

    /// Directory receiving published native executables
    #[arg(long, env = "EVMRACE_NATIVE_OUTPUT_DIR")]
    native_output_dir: Option<PathBuf>,

    /// Directory receiving published wasm modules
    #[arg(long, env = "EVMRACE_VM_OUTPUT_DIR")]
    vm_output_dir: Option<PathBuf>,

    /// Directory receiving the result tables
    #[arg(long, env = "EVMRACE_RESULT_DIR")]
    result_dir: Option<PathBuf>,

    /// go-ethereum package the VM harness is injected into
    #[arg(long, env = "EVMRACE_VM_RUNTIME_DIR")]
    vm_runtime_dir: Option<PathBuf>,

    /// Native invocations per input
    #[arg(long, short = 'n')]
    repetitions: Option<u32>,

    /// Cases benchmarked concurrently
    #[arg(long, short = 'j')]
    parallel: Option<usize>,

    /// Only run the named case (repeatable)
    #[arg(long = "case", value_name = "NAME")]
    cases: Vec<String>,

    /// List discovered cases and exit
    #[arg(long)]
    list: bool,
}

impl Args {
    fn apply(self, config: &mut Config) -> Vec<String> {
        let paths = &mut config.paths;
        if let Some(root) = self.root {
            paths.bench_root = root;
        }
        if let Some(dir) = self.native_output_dir {
            paths.native_output_dir = dir;
        }
        if let Some(dir) = self.vm_output_dir {
            paths.vm_output_dir = dir;
        }
        if let Some(dir) = self.result_dir {
            paths.result_dir = dir;
        }
        if let Some(dir) = self.vm_runtime_dir {
            paths.vm_runtime_dir = dir;
        }
        if let Some(n) = self.repetitions {
            config.benchmark.native_repetitions = n;
        }
        if let Some(n) = self.parallel {
            config.benchmark.max_parallel_cases = n;
        }
        self.cases
    }
}

fn spawn_signal_handler(tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        tracing::warn!("Shutdown signal received, aborting in-flight benchmark");
        let _ = tx.send(true);
    });
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let list_only = args.list;

    let mut config = Config::from_env().context("invalid configuration")?;
    let case_filter = args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting evmrace");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = Arc::new(SystemRunner::new(shutdown_rx.clone()));

    if list_only {
        let orchestrator =
            Orchestrator::new(config, runner, shutdown_rx).with_case_filter(case_filter);
        for case in orchestrator.discover_cases()? {
            println!("{}", case.name);
        }
        return Ok(ExitCode::SUCCESS);
    }

    config
        .prepare_output_dirs()
        .context("cannot prepare output directories")?;
    tracing::info!(
        bench_root = %config.paths.bench_root.display(),
        results = %config.paths.result_dir.display(),
        "Configuration loaded"
    );

    spawn_signal_handler(shutdown_tx);

    let orchestrator = Orchestrator::new(config, runner, shutdown_rx).with_case_filter(case_filter);
    let report = orchestrator.run().await?;

    tracing::info!(
        run_id = %report.run_id,
        native = report.native.len(),
        vm = report.vm.len(),
        failures = report.failures.len(),
        cancelled = report.cancelled,
        "Run finished"
    );

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
