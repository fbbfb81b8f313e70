//! Execution driver
//!
//! Runs the built benchmarks and extracts metrics from their text output.
//! Output is matched by content anywhere in the captured lines, never by
//! position, so extra diagnostic lines from the tools are tolerated.

use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio::fs;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::constants::{layout, FAILURE_OUTPUT_TAIL_LINES};
use crate::error::{AppError, AppResult};
use crate::models::{BenchmarkCase, EvmBenchResult};
use crate::utils::parse_duration;

use super::builder::GeneratedArtifactPaths;
use super::process::{CommandRunner, CommandSpec, ProcessOutput};

static NATIVE_ELAPSED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Time elapsed in bench\(\) is: ([\w\.]+)").expect("valid elapsed regex")
});

static GAS_USED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"gasUsed: (\d+)").expect("valid gas regex"));

static NS_PER_OP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+\s+(\d+(?:\.\d+)?) ns/op").expect("valid ns/op regex")
});

/// Elapsed seconds reported by one native invocation (first tagged line)
pub fn parse_native_elapsed(lines: &[String]) -> AppResult<f64> {
    let raw = lines
        .iter()
        .find_map(|line| NATIVE_ELAPSED.captures(line))
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| AppError::Parse("no \"Time elapsed in bench()\" line in output".to_string()))?;
    parse_duration(raw.as_str())
}

fn last_capture<'a>(re: &Regex, lines: &'a [String]) -> Option<&'a str> {
    lines
        .iter()
        .rev()
        .find_map(|line| re.captures(line).and_then(|caps| caps.get(1)))
        .map(|m| m.as_str())
}

/// Gas and per-operation time from `go test -bench` output (last match wins)
pub fn parse_vm_output(lines: &[String]) -> AppResult<EvmBenchResult> {
    let gas = last_capture(&GAS_USED, lines)
        .ok_or_else(|| AppError::Parse("no \"gasUsed:\" line in go test output".to_string()))?;
    let gas_used = gas
        .parse()
        .map_err(|e| AppError::Parse(format!("gasUsed {:?}: {}", gas, e)))?;

    let ns = last_capture(&NS_PER_OP, lines)
        .ok_or_else(|| AppError::Parse("no \"ns/op\" line in go test output".to_string()))?;
    let time = parse_duration(&format!("{}ns", ns))?;

    Ok(EvmBenchResult { time, gas_used })
}

fn ensure_success(output: &ProcessOutput, spec: &CommandSpec) -> AppResult<()> {
    if output.success() {
        return Ok(());
    }
    tracing::warn!(command = %spec, "Benchmark output:\n{}", output.text());
    let tail = output.tail(FAILURE_OUTPUT_TAIL_LINES);
    Err(AppError::Execution(format!(
        "{} failed with {}:\n{}",
        spec,
        output.describe_exit(),
        tail
    )))
}

/// Samples produced by one native run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NativeSamples {
    /// Elapsed seconds of every completed invocation
    pub times: Vec<f64>,
    /// Shutdown stopped the run before every repetition finished
    pub interrupted: bool,
}

/// Runs the compiled native binary repeatedly
pub struct NativeExecutor {
    config: Arc<Config>,
    runner: Arc<dyn CommandRunner>,
}

impl NativeExecutor {
    pub fn new(config: Arc<Config>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// Collect one elapsed-time sample per repetition.
    ///
    /// A shutdown during the loop is not an error: the samples of the
    /// invocations that completed are returned and marked as interrupted.
    pub async fn run(&self, case: &BenchmarkCase, paths: &GeneratedArtifactPaths) -> AppResult<NativeSamples> {
        let repetitions = self.config.benchmark.native_repetitions;
        let spec = CommandSpec::new(
            paths.native_binary.to_string_lossy(),
            &paths.working_dir,
            self.config.run_timeout(),
        );

        tracing::info!(case = %case.name, repetitions, binary = %spec, "Running native benchmark");

        let mut times = Vec::with_capacity(repetitions as usize);
        for iteration in 0..repetitions {
            let output = match self.runner.run(&spec).await {
                Ok(output) => output,
                Err(e) if e.is_cancelled() => {
                    tracing::warn!(
                        case = %case.name,
                        completed = times.len(),
                        repetitions,
                        "Native benchmark interrupted"
                    );
                    return Ok(NativeSamples {
                        times,
                        interrupted: true,
                    });
                }
                Err(e) => return Err(e),
            };
            for line in &output.lines {
                tracing::debug!(case = %case.name, iteration, "{}", line);
            }
            ensure_success(&output, &spec)?;

            let elapsed = parse_native_elapsed(&output.lines)
                .map_err(|e| AppError::Parse(format!("sample {}: {}", iteration + 1, e)))?;
            times.push(elapsed);
        }

        Ok(NativeSamples {
            times,
            interrupted: false,
        })
    }
}

/// Runs the Go EVM benchmark through the shared go-ethereum checkout
pub struct VmExecutor {
    config: Arc<Config>,
    runner: Arc<dyn CommandRunner>,
    /// Guards the single injection point inside the VM runtime package
    injection_lock: Arc<Mutex<()>>,
}

impl VmExecutor {
    pub fn new(config: Arc<Config>, runner: Arc<dyn CommandRunner>, injection_lock: Arc<Mutex<()>>) -> Self {
        Self {
            config,
            runner,
            injection_lock,
        }
    }

    /// Inject the rendered harness into the runtime package and benchmark it
    pub async fn run(&self, case: &BenchmarkCase, harness_source: &str) -> AppResult<EvmBenchResult> {
        let filled = case.vm_filled_path();
        fs::write(&filled, harness_source).await?;

        let runtime_dir = &self.config.paths.vm_runtime_dir;
        if !runtime_dir.is_dir() {
            return Err(AppError::Execution(format!(
                "VM runtime directory not found: {}",
                runtime_dir.display()
            )));
        }
        let injected = runtime_dir.join(layout::vm_filled_file(&case.name));

        let _guard = self.injection_lock.lock().await;
        fs::copy(&filled, &injected).await?;

        let result = self.run_injected(case, runtime_dir).await;

        if let Err(e) = fs::remove_file(&injected).await {
            tracing::warn!(file = %injected.display(), error = %e, "Failed to remove injected harness");
        }
        result
    }

    async fn run_injected(&self, case: &BenchmarkCase, runtime_dir: &Path) -> AppResult<EvmBenchResult> {
        let spec = CommandSpec::new(&self.config.toolchain.go_program, runtime_dir, self.config.run_timeout())
            .args(["test", "-bench"])
            .arg(case.vm_bench_name())
            .arg("-benchtime")
            .arg(&self.config.benchmark.vm_bench_time);

        tracing::info!(case = %case.name, command = %spec, "Running VM benchmark");

        let output = self.runner.run(&spec).await?;
        for line in &output.lines {
            tracing::debug!(case = %case.name, "{}", line);
        }
        ensure_success(&output, &spec)?;

        parse_vm_output(&output.lines)
    }
}
