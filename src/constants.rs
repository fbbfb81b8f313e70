//! Application-wide constants
//!
//! Defaults for configuration plus the file-layout conventions shared
//! between benchmark cases, the native toolchain and the VM runtime.

// =============================================================================
// CONFIGURATION DEFAULTS
// =============================================================================

/// Default directory scanned for benchmark cases
pub const DEFAULT_BENCH_ROOT: &str = ".";

/// Default directory receiving published native executables
pub const DEFAULT_NATIVE_OUTPUT_DIR: &str = "/evmnativefiles";

/// Default directory receiving published wasm modules
pub const DEFAULT_VM_OUTPUT_DIR: &str = "/evmwasmfiles";

/// Default directory receiving result tables
pub const DEFAULT_RESULT_DIR: &str = "/evmraceresults";

/// Default go-ethereum package the VM harness is injected into
pub const DEFAULT_VM_RUNTIME_DIR: &str = "/go-ethereum/core/vm/runtime";

/// Default number of native invocations per input
pub const DEFAULT_NATIVE_REPETITIONS: u32 = 20;

/// Default `-benchtime` passed to `go test`
pub const DEFAULT_VM_BENCH_TIME: &str = "5s";

/// Default timeout for a single build invocation
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 900;

/// Default timeout for a single benchmark invocation
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 600;

/// Default number of cases processed concurrently
pub const DEFAULT_MAX_PARALLEL_CASES: usize = 1;

/// Default cargo executable
pub const DEFAULT_CARGO_PROGRAM: &str = "cargo";

/// Default go executable
pub const DEFAULT_GO_PROGRAM: &str = "go";

/// Default wasm target triple
pub const DEFAULT_WASM_TARGET: &str = "wasm32-unknown-unknown";

/// Default log filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "evmrace=info";

// =============================================================================
// CASE LAYOUT
// =============================================================================

/// File layout of a benchmark case directory
pub mod layout {
    /// Template project for the native environment
    pub const NATIVE_TEMPLATE_DIR: &str = "rust-code";

    /// Regenerated working copy of the native template project
    pub const NATIVE_WORKING_DIR: &str = "rust-code-filled";

    /// Source file (relative to the project) holding the placeholders
    pub const NATIVE_SOURCE_FILE: &str = "src/bench.rs";

    /// Manifest file name for a case
    pub fn manifest_file(case: &str) -> String {
        format!("{}-inputs.json", case)
    }

    /// VM harness template file name for a case
    pub fn vm_template_file(case: &str) -> String {
        format!("{}_test.go", case)
    }

    /// Filled VM harness file name for a case
    pub fn vm_filled_file(case: &str) -> String {
        format!("{}_filled_test.go", case)
    }

    /// Cargo binary target for a case
    pub fn native_bin(case: &str) -> String {
        format!("{}_native", case)
    }

    /// Wasm artifact produced by the library target of a case
    pub fn wasm_artifact(case: &str) -> String {
        format!("{}_wasm.wasm", case)
    }
}

/// Directory names under the bench root that are never cases
pub const SKIPPED_DIRS: &[&str] = &["__pycache__", "target", "node_modules"];

// =============================================================================
// OUTPUT FILES
// =============================================================================

/// Native result table
pub const NATIVE_RESULTS_FILE: &str = "native_benchmarks.csv";

/// VM result table
pub const EVM_RESULTS_FILE: &str = "evm_benchmarks.csv";

/// Failed units table
pub const FAILURES_FILE: &str = "failures.csv";

/// Run metadata
pub const SUMMARY_FILE: &str = "run_summary.json";

/// Lines of captured tool output kept in a failure record
pub const FAILURE_OUTPUT_TAIL_LINES: usize = 40;
