//! Build driver for the native environment
//!
//! For one input of a case:
//! 1. Regenerate the working copy from the template project
//! 2. Inject the rendered `src/bench.rs`
//! 3. `cargo build` the native binary and the wasm library
//! 4. Publish the artifacts under the input name

use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs;

use crate::config::Config;
use crate::constants::{layout, FAILURE_OUTPUT_TAIL_LINES};
use crate::error::{AppError, AppResult};
use crate::models::{BenchmarkCase, InputSpec};

use super::process::{CommandRunner, CommandSpec, ProcessOutput};
use super::workspace::{prepare_working_copy, publish_artifact, write_source};

/// Paths generated for one (case, input) in the native environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifactPaths {
    pub working_dir: PathBuf,
    pub source_file: PathBuf,
    pub native_binary: PathBuf,
    pub wasm_module: PathBuf,
}

impl GeneratedArtifactPaths {
    pub fn for_case(case: &BenchmarkCase, wasm_target: &str) -> Self {
        let working_dir = case.native_working_dir();
        Self {
            source_file: working_dir.join(layout::NATIVE_SOURCE_FILE),
            native_binary: working_dir
                .join("target/release")
                .join(layout::native_bin(&case.name)),
            wasm_module: working_dir
                .join("target")
                .join(wasm_target)
                .join("release")
                .join(layout::wasm_artifact(&case.name)),
            working_dir,
        }
    }
}

/// Artifacts published for one input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedArtifacts {
    pub native_binary: PathBuf,
    pub wasm_module: PathBuf,
}

/// Drives cargo for the native template project of a case
pub struct BuildDriver {
    config: Arc<Config>,
    runner: Arc<dyn CommandRunner>,
}

impl BuildDriver {
    pub fn new(config: Arc<Config>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// Regenerate the working copy and inject the rendered source
    pub async fn prepare(&self, case: &BenchmarkCase, source: &str) -> AppResult<GeneratedArtifactPaths> {
        let paths = GeneratedArtifactPaths::for_case(case, &self.config.toolchain.wasm_target);

        prepare_working_copy(&case.native_template_dir(), &paths.working_dir).await?;
        write_source(&paths.working_dir, layout::NATIVE_SOURCE_FILE, source).await?;

        tracing::debug!(
            case = %case.name,
            source = %paths.source_file.display(),
            "Injected generated source"
        );
        Ok(paths)
    }

    /// Build the native binary and the wasm module, returning the binary size
    pub async fn build(&self, case: &BenchmarkCase, paths: &GeneratedArtifactPaths) -> AppResult<u64> {
        let toolchain = &self.config.toolchain;

        let native = CommandSpec::new(&toolchain.cargo_program, &paths.working_dir, self.config.build_timeout())
            .args(["build", "--release", "--bin"])
            .arg(layout::native_bin(&case.name));
        self.invoke(case, &native).await?;

        let exec_size = artifact_size(&paths.native_binary).await?;

        let wasm = CommandSpec::new(&toolchain.cargo_program, &paths.working_dir, self.config.build_timeout())
            .args(["build", "--release", "--lib", "--target"])
            .arg(&toolchain.wasm_target);
        self.invoke(case, &wasm).await?;

        artifact_size(&paths.wasm_module).await?;

        tracing::info!(case = %case.name, exec_size, "Native build finished");
        Ok(exec_size)
    }

    /// Copy the built artifacts to the shared output directories
    pub async fn publish(&self, spec: &InputSpec, paths: &GeneratedArtifactPaths) -> AppResult<PublishedArtifacts> {
        let out = &self.config.paths;
        let wasm_module = publish_artifact(
            &paths.wasm_module,
            &out.vm_output_dir,
            &format!("{}.wasm", spec.name),
        )
        .await?;
        let native_binary = publish_artifact(
            &paths.native_binary,
            &out.native_output_dir,
            &format!("{}_native", spec.name),
        )
        .await?;

        Ok(PublishedArtifacts {
            native_binary,
            wasm_module,
        })
    }

    async fn invoke(&self, case: &BenchmarkCase, spec: &CommandSpec) -> AppResult<ProcessOutput> {
        tracing::info!(case = %case.name, command = %spec, "Compiling");

        let output = self.runner.run(spec).await.map_err(|e| match e {
            AppError::Execution(msg) => AppError::Build(msg),
            other => other,
        })?;

        for line in &output.lines {
            tracing::debug!(case = %case.name, "{}", line);
        }

        if !output.success() {
            tracing::warn!(case = %case.name, command = %spec, "Build output:\n{}", output.text());
            let tail = output.tail(FAILURE_OUTPUT_TAIL_LINES);
            return Err(AppError::Build(format!(
                "{} failed with {}:\n{}",
                spec,
                output.describe_exit(),
                tail
            )));
        }

        Ok(output)
    }
}

async fn artifact_size(path: &std::path::Path) -> AppResult<u64> {
    let meta = fs::metadata(path)
        .await
        .map_err(|e| AppError::Build(format!("expected artifact {} missing: {}", path.display(), e)))?;
    Ok(meta.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::process::MockCommandRunner;
    use crate::test_utils::{capture_logs, test_config, write_case};

    #[test]
    fn test_artifact_paths() {
        let case = BenchmarkCase::new("sha1", "/bench/sha1");
        let paths = GeneratedArtifactPaths::for_case(&case, "wasm32-unknown-unknown");
        assert_eq!(paths.working_dir, PathBuf::from("/bench/sha1/rust-code-filled"));
        assert_eq!(
            paths.source_file,
            PathBuf::from("/bench/sha1/rust-code-filled/src/bench.rs")
        );
        assert_eq!(
            paths.native_binary,
            PathBuf::from("/bench/sha1/rust-code-filled/target/release/sha1_native")
        );
        assert_eq!(
            paths.wasm_module,
            PathBuf::from(
                "/bench/sha1/rust-code-filled/target/wasm32-unknown-unknown/release/sha1_wasm.wasm"
            )
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_build_error() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Arc::new(test_config(tmp.path()));
        let case = write_case(&config.paths.bench_root, "sha1", &[("a", "00", "00")]).await;

        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|spec| spec.has_arg_pair("--bin", "sha1_native"))
            .times(1)
            .returning(|_| {
                Ok(ProcessOutput::new(
                    Some(101),
                    vec!["error[E0425]: cannot find value `input`".to_string()],
                ))
            });

        let driver = BuildDriver::new(config, Arc::new(runner));
        let paths = driver.prepare(&case, "fn main() {}").await.unwrap();
        let err = driver.build(&case, &paths).await.unwrap_err();

        assert!(matches!(err, AppError::Build(ref msg) if msg.contains("E0425")));
    }

    #[tokio::test]
    async fn test_missing_artifact_is_build_error() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Arc::new(test_config(tmp.path()));
        let case = write_case(&config.paths.bench_root, "sha1", &[("a", "00", "00")]).await;

        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .times(1)
            .returning(|_| Ok(ProcessOutput::new(Some(0), Vec::new())));

        let driver = BuildDriver::new(config, Arc::new(runner));
        let paths = driver.prepare(&case, "fn main() {}").await.unwrap();
        let err = driver.build(&case, &paths).await.unwrap_err();

        assert!(matches!(err, AppError::Build(ref msg) if msg.contains("sha1_native")));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_build_error() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Arc::new(test_config(tmp.path()));
        let case = write_case(&config.paths.bench_root, "sha1", &[("a", "00", "00")]).await;

        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_| Err(AppError::Execution("cargo: not found".to_string())));

        let driver = BuildDriver::new(config, Arc::new(runner));
        let paths = driver.prepare(&case, "fn main() {}").await.unwrap();
        assert!(matches!(
            driver.build(&case, &paths).await,
            Err(AppError::Build(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_build_logs_every_line() {
        let (_guard, logs) = capture_logs();
        let tmp = tempfile::tempdir().unwrap();
        let config = Arc::new(test_config(tmp.path()));
        let case = write_case(&config.paths.bench_root, "sha1", &[("a", "00", "00")]).await;

        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(1).returning(|_| {
            let mut lines = vec!["error[E0308]: mismatched types".to_string()];
            lines.extend((0..80).map(|i| format!("  --> src/bench.rs:{}:1", i)));
            lines.push("error: could not compile `sha1`".to_string());
            Ok(ProcessOutput::new(Some(101), lines))
        });

        let driver = BuildDriver::new(config, Arc::new(runner));
        let paths = driver.prepare(&case, "fn main() {}").await.unwrap();
        let err = driver.build(&case, &paths).await.unwrap_err();

        // The failure record keeps a short tail; the log carries everything.
        assert!(!err.to_string().contains("E0308"));
        let logged = logs.contents();
        assert!(logged.contains("error[E0308]: mismatched types"));
        assert!(logged.contains("could not compile"));
    }
}
