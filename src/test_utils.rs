//! Test fixtures: temporary configs, case directories, and a fake toolchain
//!
//! The fake toolchain stands in for cargo, the native benchmark binary and
//! `go test`, producing the same files and output lines the real tools do.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

use crate::benchmark::process::{CommandRunner, CommandSpec, ProcessOutput};
use crate::config::Config;
use crate::constants::layout;
use crate::error::{AppError, AppResult};
use crate::models::BenchmarkCase;

/// Contents of the fake native binary; its length is the reported size
pub const FAKE_BINARY: &[u8] = b"\x7fELF fake native binary";

pub const NATIVE_TEMPLATE: &str = "fn bench() {\n    {{input}}\n    {{expected}}\n    run(&input, &expected);\n}\n";

pub const VM_TEMPLATE: &str =
    "package runtime\n\nconst input = \"{{input}}\"\nconst expected = \"{{expected}}\"\n";

/// Config rooted in a temporary directory
pub fn test_config(root: &Path) -> Config {
    let vars: HashMap<&str, PathBuf> = HashMap::from([
        ("EVMRACE_BENCH_ROOT", root.join("bench")),
        ("EVMRACE_NATIVE_OUTPUT_DIR", root.join("out/native")),
        ("EVMRACE_VM_OUTPUT_DIR", root.join("out/wasm")),
        ("EVMRACE_RESULT_DIR", root.join("out/results")),
        ("EVMRACE_VM_RUNTIME_DIR", root.join("go-ethereum/core/vm/runtime")),
    ]);
    for dir in ["EVMRACE_BENCH_ROOT", "EVMRACE_VM_RUNTIME_DIR"] {
        std::fs::create_dir_all(&vars[dir]).unwrap();
    }

    Config::from_lookup(|key| match key {
        "EVMRACE_BUILD_TIMEOUT_SECS" | "EVMRACE_RUN_TIMEOUT_SECS" => Some("30".to_string()),
        _ => vars.get(key).map(|p| p.display().to_string()),
    })
    .unwrap()
}

/// Create a case directory with a manifest and both templates
pub async fn write_case(bench_root: &Path, name: &str, inputs: &[(&str, &str, &str)]) -> BenchmarkCase {
    let dir = bench_root.join(name);
    let template = dir.join(layout::NATIVE_TEMPLATE_DIR);
    tokio::fs::create_dir_all(template.join("src")).await.unwrap();

    let manifest: Vec<serde_json::Value> = inputs
        .iter()
        .map(|(input_name, input, expected)| {
            serde_json::json!({ "name": input_name, "input": input, "expected": expected })
        })
        .collect();
    tokio::fs::write(
        dir.join(layout::manifest_file(name)),
        serde_json::to_string_pretty(&manifest).unwrap(),
    )
    .await
    .unwrap();

    tokio::fs::write(
        template.join("Cargo.toml"),
        format!("[package]\nname = \"{}\"\nversion = \"0.1.0\"\n", name),
    )
    .await
    .unwrap();
    tokio::fs::write(template.join(layout::NATIVE_SOURCE_FILE), NATIVE_TEMPLATE)
        .await
        .unwrap();
    tokio::fs::write(dir.join(layout::vm_template_file(name)), VM_TEMPLATE)
        .await
        .unwrap();

    BenchmarkCase::new(name, dir)
}

/// Formatted log output captured for assertions
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Capture `warn` and above on the current thread until the guard drops
pub fn capture_logs() -> (DefaultGuard, LogBuffer) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .finish();
    (tracing::subscriber::set_default(subscriber), buffer)
}

/// [`CommandRunner`] simulating cargo, native binaries and `go test`
pub struct FakeToolchain {
    /// Duration printed by the native binary
    pub native_elapsed: String,
    /// Output of `go test`
    pub vm_lines: Vec<String>,
    /// Builds whose generated source contains this text fail to compile
    pub fail_build_when_source_contains: Option<String>,
    /// Signal shutdown on the n-th native invocation (1-based), which then
    /// reports cancellation like an aborted process
    pub shutdown_on_native_run: Option<(usize, watch::Sender<bool>)>,
    native_runs: AtomicUsize,
    pub calls: Mutex<Vec<CommandSpec>>,
}

impl Default for FakeToolchain {
    fn default() -> Self {
        Self {
            native_elapsed: "10ms".to_string(),
            vm_lines: vec![
                "running benchmark...".to_string(),
                "gasUsed: 21000".to_string(),
                "goos: linux".to_string(),
                "       4          12345678 ns/op".to_string(),
                "PASS".to_string(),
                "ok      github.com/ethereum/go-ethereum/core/vm/runtime 13.472s".to_string(),
            ],
            fail_build_when_source_contains: None,
            shutdown_on_native_run: None,
            native_runs: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeToolchain {
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_build_when_source_contains: Some(marker.to_string()),
            ..Self::default()
        }
    }

    pub fn cancelling_at_native_run(n: usize, shutdown: watch::Sender<bool>) -> Self {
        Self {
            shutdown_on_native_run: Some((n, shutdown)),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    fn cargo(&self, spec: &CommandSpec) -> AppResult<ProcessOutput> {
        let source = std::fs::read_to_string(spec.cwd.join(layout::NATIVE_SOURCE_FILE))?;
        if let Some(marker) = &self.fail_build_when_source_contains {
            if source.contains(marker.as_str()) {
                return Ok(ProcessOutput::new(
                    Some(101),
                    vec![
                        "   Compiling bench v0.1.0".to_string(),
                        "error: could not compile `bench`".to_string(),
                    ],
                ));
            }
        }

        // The working copy lives directly inside the case directory.
        let case = spec
            .cwd
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AppError::Execution("working copy outside a case".to_string()))?;

        let (dir, file) = match spec.args.iter().position(|a| a == "--target") {
            Some(i) => (
                spec.cwd.join("target").join(&spec.args[i + 1]).join("release"),
                layout::wasm_artifact(&case),
            ),
            None => (spec.cwd.join("target/release"), layout::native_bin(&case)),
        };
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(file), FAKE_BINARY)?;

        Ok(ProcessOutput::new(Some(0), vec!["    Finished release".to_string()]))
    }

    fn native(&self, spec: &CommandSpec) -> AppResult<ProcessOutput> {
        let run = self.native_runs.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, shutdown)) = &self.shutdown_on_native_run {
            if run >= *at {
                let _ = shutdown.send(true);
                return Err(AppError::Cancelled(format!("aborted {}", spec)));
            }
        }
        Ok(ProcessOutput::new(
            Some(0),
            vec![
                format!("Time elapsed in bench() is: {}", self.native_elapsed),
                "result ok".to_string(),
            ],
        ))
    }

    fn go(&self, spec: &CommandSpec) -> AppResult<ProcessOutput> {
        let injected = std::fs::read_dir(&spec.cwd)?
            .filter_map(Result::ok)
            .any(|e| e.file_name().to_string_lossy().ends_with("_filled_test.go"));
        if !injected {
            return Ok(ProcessOutput::new(Some(1), vec!["no test files".to_string()]));
        }
        Ok(ProcessOutput::new(Some(0), self.vm_lines.clone()))
    }
}

#[async_trait]
impl CommandRunner for FakeToolchain {
    async fn run(&self, spec: &CommandSpec) -> AppResult<ProcessOutput> {
        self.calls.lock().unwrap().push(spec.clone());

        match spec.program.as_str() {
            "cargo" => self.cargo(spec),
            "go" => self.go(spec),
            program if program.ends_with("_native") => self.native(spec),
            other => Err(AppError::Execution(format!("unexpected program {}", other))),
        }
    }
}
