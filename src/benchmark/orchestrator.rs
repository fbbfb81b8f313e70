//! Run orchestration
//!
//! Discovers cases under the bench root and drives every input through the
//! native and VM pipelines:
//!
//! ```text
//! native: generate -> build -> publish -> execute (N samples)
//! vm:     generate -> inject -> go test -> parse
//! ```
//!
//! A failing unit is recorded and the run moves on. Cases may run
//! concurrently, but results are merged in discovery order.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::{watch, Mutex};
use walkdir::WalkDir;

use crate::config::Config;
use crate::constants::{layout, SKIPPED_DIRS};
use crate::error::{AppError, AppResult};
use crate::models::{
    BenchmarkCase, Environment, EvmBenchResult, InputSpec, NativeBenchResult, ResultKey, ResultTable,
    RunReport, Stage, UnitFailure,
};

use super::aggregator::ResultWriter;
use super::builder::BuildDriver;
use super::codegen::{native_bindings, render_file, vm_bindings};
use super::executor::{NativeExecutor, VmExecutor};
use super::process::CommandRunner;

type StageResult<T> = Result<T, (Stage, AppError)>;

fn at(stage: Stage) -> impl FnOnce(AppError) -> (Stage, AppError) {
    move |e| (stage, e)
}

/// Everything produced by one case
#[derive(Default)]
struct CaseOutcome {
    native: ResultTable<NativeBenchResult>,
    vm: ResultTable<EvmBenchResult>,
    failures: Vec<UnitFailure>,
    cancelled: bool,
}

impl CaseOutcome {
    fn fail(
        &mut self,
        case: &BenchmarkCase,
        input: Option<&InputSpec>,
        environment: Option<Environment>,
        stage: Stage,
        error: &AppError,
    ) {
        tracing::error!(
            case = %case.name,
            input = input.map(|s| s.name.as_str()).unwrap_or("-"),
            environment = environment.map(|e| e.as_str()).unwrap_or("-"),
            stage = stage.as_str(),
            error = %error,
            "Benchmark unit failed"
        );
        self.failures.push(UnitFailure {
            case: case.name.clone(),
            name: input.map(|s| s.name.clone()),
            environment,
            stage,
            error_code: error.error_code().to_string(),
            message: error.to_string(),
        });
    }
}

pub struct Orchestrator {
    config: Arc<Config>,
    shutdown: watch::Receiver<bool>,
    case_filter: Vec<String>,
    builder: BuildDriver,
    native: NativeExecutor,
    vm: VmExecutor,
}

impl Orchestrator {
    pub fn new(config: Config, runner: Arc<dyn CommandRunner>, shutdown: watch::Receiver<bool>) -> Self {
        let config = Arc::new(config);
        let injection_lock = Arc::new(Mutex::new(()));
        Self {
            builder: BuildDriver::new(config.clone(), runner.clone()),
            native: NativeExecutor::new(config.clone(), runner.clone()),
            vm: VmExecutor::new(config.clone(), runner, injection_lock),
            config,
            shutdown,
            case_filter: Vec::new(),
        }
    }

    /// Restrict the run to the named cases
    pub fn with_case_filter(mut self, cases: Vec<String>) -> Self {
        self.case_filter = cases;
        self
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Immediate subdirectories of the bench root that hold a manifest, by name
    pub fn discover_cases(&self) -> AppResult<Vec<BenchmarkCase>> {
        let root = std::fs::canonicalize(&self.config.paths.bench_root).map_err(|e| {
            AppError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "bench root {}: {}",
                    self.config.paths.bench_root.display(),
                    e
                ),
            ))
        })?;

        let mut cases = Vec::new();
        for entry in WalkDir::new(&root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| AppError::Io(std::io::Error::other(e.to_string())))?;
            if !entry.file_type().is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_str()) {
                continue;
            }
            if !self.case_filter.is_empty() && !self.case_filter.contains(&name) {
                continue;
            }

            let case = BenchmarkCase::new(name, entry.path());
            if !case.has_manifest() {
                tracing::info!(dir = %case.dir.display(), "Skipping directory without manifest");
                continue;
            }
            cases.push(case);
        }

        for wanted in &self.case_filter {
            if !cases.iter().any(|c| &c.name == wanted) {
                tracing::warn!(case = %wanted, "Requested case not found under bench root");
            }
        }

        Ok(cases)
    }

    /// Benchmark every discovered case without writing result files
    pub async fn collect(&self) -> AppResult<RunReport> {
        let mut report = RunReport::new();
        let cases = self.discover_cases()?;
        report.cases = cases.iter().map(|c| c.name.clone()).collect();

        tracing::info!(
            run_id = %report.run_id,
            cases = cases.len(),
            parallel = self.config.benchmark.max_parallel_cases,
            "Starting benchmark run"
        );

        let outcomes: Vec<CaseOutcome> = stream::iter(cases.iter())
            .map(|case| self.run_case(case))
            .buffered(self.config.benchmark.max_parallel_cases.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            report.native.extend(outcome.native);
            report.vm.extend(outcome.vm);
            report.failures.extend(outcome.failures);
            report.cancelled |= outcome.cancelled;
        }
        report.cancelled |= self.is_shutdown();
        report.finished_at = Some(Utc::now());

        Ok(report)
    }

    /// Benchmark every case and write the result files
    pub async fn run(&self) -> AppResult<RunReport> {
        let report = self.collect().await?;
        ResultWriter::new(&self.config.paths.result_dir)
            .write_all(&report)
            .await?;
        Ok(report)
    }

    async fn run_case(&self, case: &BenchmarkCase) -> CaseOutcome {
        let mut outcome = CaseOutcome::default();
        if self.is_shutdown() {
            outcome.cancelled = true;
            return outcome;
        }

        let inputs = match case.load_inputs().await {
            Ok(inputs) => inputs,
            Err(e) => {
                outcome.fail(case, None, None, Stage::Load, &e);
                return outcome;
            }
        };
        if !case.native_template_dir().is_dir() {
            let e = AppError::Template(format!(
                "template project not found: {}",
                case.native_template_dir().display()
            ));
            outcome.fail(case, None, None, Stage::Load, &e);
            return outcome;
        }

        tracing::info!(case = %case.name, inputs = inputs.len(), "Benchmarking case");

        for spec in &inputs {
            if self.is_shutdown() {
                outcome.cancelled = true;
                break;
            }
            let key = ResultKey::new(&case.name, &spec.name);

            match self.run_native(case, spec).await {
                Ok((result, interrupted)) => {
                    tracing::info!(
                        case = %case.name,
                        input = %spec.name,
                        samples = result.bench_times.len(),
                        exec_size = result.exec_size,
                        interrupted,
                        "Native benchmark finished"
                    );
                    if !result.bench_times.is_empty() {
                        outcome.native.insert(key.clone(), result);
                    }
                    if interrupted {
                        outcome.cancelled = true;
                        break;
                    }
                }
                Err((_, e)) if e.is_cancelled() => {
                    outcome.cancelled = true;
                    break;
                }
                Err((stage, e)) => outcome.fail(case, Some(spec), Some(Environment::Native), stage, &e),
            }

            match self.run_vm(case, spec).await {
                Ok(result) => {
                    tracing::info!(
                        case = %case.name,
                        input = %spec.name,
                        time = result.time,
                        gas_used = result.gas_used,
                        "VM benchmark finished"
                    );
                    outcome.vm.insert(key, result);
                }
                Err((_, e)) if e.is_cancelled() => {
                    outcome.cancelled = true;
                    break;
                }
                Err((stage, e)) => outcome.fail(case, Some(spec), Some(Environment::Vm), stage, &e),
            }
        }

        outcome
    }

    /// Native result for one input, flagged when shutdown cut the samples short
    async fn run_native(&self, case: &BenchmarkCase, spec: &InputSpec) -> StageResult<(NativeBenchResult, bool)> {
        let bindings = native_bindings(case, spec).map_err(at(Stage::Generate))?;
        let template = case.native_template_dir().join(layout::NATIVE_SOURCE_FILE);
        let source = render_file(&template, &bindings)
            .await
            .map_err(at(Stage::Generate))?;

        let paths = self
            .builder
            .prepare(case, &source)
            .await
            .map_err(at(Stage::Build))?;
        let exec_size = self
            .builder
            .build(case, &paths)
            .await
            .map_err(at(Stage::Build))?;
        self.builder
            .publish(spec, &paths)
            .await
            .map_err(at(Stage::Publish))?;

        let samples = self
            .native
            .run(case, &paths)
            .await
            .map_err(at(Stage::Execute))?;

        Ok((
            NativeBenchResult {
                bench_times: samples.times,
                exec_size,
            },
            samples.interrupted,
        ))
    }

    async fn run_vm(&self, case: &BenchmarkCase, spec: &InputSpec) -> StageResult<EvmBenchResult> {
        let bindings = vm_bindings(case, spec).map_err(at(Stage::Generate))?;
        let harness = render_file(&case.vm_template_path(), &bindings)
            .await
            .map_err(at(Stage::Generate))?;

        self.vm
            .run(case, &harness)
            .await
            .map_err(at(Stage::Execute))
    }
}
