//! Application configuration management
//!
//! Configuration is loaded from `EVMRACE_*` environment variables (a `.env`
//! file is honoured) and may be overridden from the command line. The output
//! directories are validated and created once at startup, before any case
//! is processed.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::constants::{
    DEFAULT_BENCH_ROOT, DEFAULT_BUILD_TIMEOUT_SECS, DEFAULT_CARGO_PROGRAM, DEFAULT_GO_PROGRAM,
    DEFAULT_LOG_FILTER, DEFAULT_MAX_PARALLEL_CASES, DEFAULT_NATIVE_OUTPUT_DIR,
    DEFAULT_NATIVE_REPETITIONS, DEFAULT_RESULT_DIR, DEFAULT_RUN_TIMEOUT_SECS,
    DEFAULT_VM_BENCH_TIME, DEFAULT_VM_OUTPUT_DIR, DEFAULT_VM_RUNTIME_DIR, DEFAULT_WASM_TARGET,
};
use crate::utils::parse_duration;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub paths: PathsConfig,
    pub toolchain: ToolchainConfig,
    pub benchmark: BenchmarkConfig,
    pub log_filter: String,
}

/// Filesystem locations
#[derive(Debug, Clone)]
pub struct PathsConfig {
    /// Directory whose subdirectories are benchmark cases
    pub bench_root: PathBuf,
    /// Published native executables, one per input name
    pub native_output_dir: PathBuf,
    /// Published wasm modules, one per input name
    pub vm_output_dir: PathBuf,
    /// Result tables and run summary
    pub result_dir: PathBuf,
    /// go-ethereum package the VM harness is copied into
    pub vm_runtime_dir: PathBuf,
}

/// External tool invocation settings
#[derive(Debug, Clone)]
pub struct ToolchainConfig {
    pub cargo_program: String,
    pub go_program: String,
    pub wasm_target: String,
}

/// Benchmark execution configuration
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Native invocations per input
    pub native_repetitions: u32,
    /// Value passed to `go test -benchtime`
    pub vm_bench_time: String,
    pub build_timeout_secs: u64,
    pub run_timeout_secs: u64,
    /// Cases processed concurrently; 1 keeps the run strictly sequential
    pub max_parallel_cases: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = |key: &str, default: &str| {
            PathBuf::from(lookup(key).unwrap_or_else(|| default.to_string()))
        };

        let config = Self {
            paths: PathsConfig {
                bench_root: path("EVMRACE_BENCH_ROOT", DEFAULT_BENCH_ROOT),
                native_output_dir: path("EVMRACE_NATIVE_OUTPUT_DIR", DEFAULT_NATIVE_OUTPUT_DIR),
                vm_output_dir: path("EVMRACE_VM_OUTPUT_DIR", DEFAULT_VM_OUTPUT_DIR),
                result_dir: path("EVMRACE_RESULT_DIR", DEFAULT_RESULT_DIR),
                vm_runtime_dir: path("EVMRACE_VM_RUNTIME_DIR", DEFAULT_VM_RUNTIME_DIR),
            },
            toolchain: ToolchainConfig {
                cargo_program: lookup("EVMRACE_CARGO")
                    .unwrap_or_else(|| DEFAULT_CARGO_PROGRAM.to_string()),
                go_program: lookup("EVMRACE_GO").unwrap_or_else(|| DEFAULT_GO_PROGRAM.to_string()),
                wasm_target: lookup("EVMRACE_WASM_TARGET")
                    .unwrap_or_else(|| DEFAULT_WASM_TARGET.to_string()),
            },
            benchmark: BenchmarkConfig {
                native_repetitions: parse_var(
                    &lookup,
                    "EVMRACE_NATIVE_REPETITIONS",
                    DEFAULT_NATIVE_REPETITIONS,
                )?,
                vm_bench_time: lookup("EVMRACE_VM_BENCH_TIME")
                    .unwrap_or_else(|| DEFAULT_VM_BENCH_TIME.to_string()),
                build_timeout_secs: parse_var(
                    &lookup,
                    "EVMRACE_BUILD_TIMEOUT_SECS",
                    DEFAULT_BUILD_TIMEOUT_SECS,
                )?,
                run_timeout_secs: parse_var(
                    &lookup,
                    "EVMRACE_RUN_TIMEOUT_SECS",
                    DEFAULT_RUN_TIMEOUT_SECS,
                )?,
                max_parallel_cases: parse_var(
                    &lookup,
                    "EVMRACE_MAX_PARALLEL_CASES",
                    DEFAULT_MAX_PARALLEL_CASES,
                )?,
            },
            log_filter: lookup("RUST_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that cannot be expressed in the types
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.benchmark.native_repetitions == 0 {
            return Err(ConfigError::InvalidValue(
                "EVMRACE_NATIVE_REPETITIONS must be at least 1".to_string(),
            ));
        }
        if self.benchmark.max_parallel_cases == 0 {
            return Err(ConfigError::InvalidValue(
                "EVMRACE_MAX_PARALLEL_CASES must be at least 1".to_string(),
            ));
        }
        if !is_bench_time(&self.benchmark.vm_bench_time) {
            return Err(ConfigError::InvalidValue(format!(
                "EVMRACE_VM_BENCH_TIME is neither a duration nor an iteration count: {}",
                self.benchmark.vm_bench_time
            )));
        }
        Ok(())
    }

    /// Create the output directories, failing if any cannot be used
    pub fn prepare_output_dirs(&self) -> Result<(), ConfigError> {
        for dir in [
            &self.paths.native_output_dir,
            &self.paths.vm_output_dir,
            &self.paths.result_dir,
        ] {
            ensure_dir(dir)?;
        }
        Ok(())
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.benchmark.build_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.benchmark.run_timeout_secs)
    }
}

/// `go test -benchtime` accepts a duration or a fixed iteration count (`100x`)
static ITERATION_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+x$").expect("valid iteration count regex"));

fn is_bench_time(value: &str) -> bool {
    ITERATION_COUNT.is_match(value) || parse_duration(value).is_ok()
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{}={}", key, raw))),
        None => Ok(default),
    }
}

fn ensure_dir(dir: &Path) -> Result<(), ConfigError> {
    std::fs::create_dir_all(dir).map_err(|e| ConfigError::OutputDir {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    if !dir.is_dir() {
        return Err(ConfigError::OutputDir {
            path: dir.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }
    Ok(())
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Output directory {path:?} unusable: {reason}")]
    OutputDir { path: PathBuf, reason: String },
}
