//! Benchmark case and input vector models

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::constants::layout;
use crate::error::{AppError, AppResult};
use crate::utils::byte_len;

/// A benchmarked algorithm and the directory holding its templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkCase {
    /// Case name, equal to the directory name (e.g. `sha1`)
    pub name: String,
    /// Absolute path of the case directory
    pub dir: PathBuf,
}

impl BenchmarkCase {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
        }
    }

    /// `<case>/<case>-inputs.json`
    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(layout::manifest_file(&self.name))
    }

    /// Native template project
    pub fn native_template_dir(&self) -> PathBuf {
        self.dir.join(layout::NATIVE_TEMPLATE_DIR)
    }

    /// Disposable working copy of the native template project
    pub fn native_working_dir(&self) -> PathBuf {
        self.dir.join(layout::NATIVE_WORKING_DIR)
    }

    /// VM harness template
    pub fn vm_template_path(&self) -> PathBuf {
        self.dir.join(layout::vm_template_file(&self.name))
    }

    /// Rendered VM harness, kept next to the template for inspection
    pub fn vm_filled_path(&self) -> PathBuf {
        self.dir.join(layout::vm_filled_file(&self.name))
    }

    /// Benchmark function name matched by `go test -bench`.
    ///
    /// Go only runs exported benchmarks, so the first letter of the case
    /// name is upper-cased: `sha1` becomes `BenchmarkSha1`.
    pub fn vm_bench_name(&self) -> String {
        let mut chars = self.name.chars();
        match chars.next() {
            Some(first) => format!("Benchmark{}{}", first.to_uppercase(), chars.as_str()),
            None => "Benchmark".to_string(),
        }
    }

    /// Whether the directory looks like a case (has a manifest)
    pub fn has_manifest(&self) -> bool {
        self.manifest_path().is_file()
    }

    /// Load and validate the input vectors of this case
    pub async fn load_inputs(&self) -> AppResult<Vec<InputSpec>> {
        let path = self.manifest_path();
        let text = fs::read_to_string(&path).await.map_err(|e| {
            AppError::Manifest(format!("cannot read {}: {}", path.display(), e))
        })?;
        parse_manifest(&text, &path)
    }
}

/// One named test vector of a case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    pub name: String,
    /// Hex-encoded input bytes
    pub input: String,
    /// Hex-encoded expected output bytes
    pub expected: String,
}

impl InputSpec {
    /// Check that both payloads are whole-byte hex strings
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::Manifest("input with empty name".to_string()));
        }
        byte_len(&self.input)
            .map_err(|e| AppError::Manifest(format!("input {:?}: {}", self.name, e)))?;
        byte_len(&self.expected)
            .map_err(|e| AppError::Manifest(format!("expected of {:?}: {}", self.name, e)))?;
        Ok(())
    }
}

/// Parse a manifest, preserving file order
pub fn parse_manifest(text: &str, origin: &Path) -> AppResult<Vec<InputSpec>> {
    let inputs: Vec<InputSpec> = serde_json::from_str(text)
        .map_err(|e| AppError::Manifest(format!("{}: {}", origin.display(), e)))?;

    let mut seen = HashSet::new();
    for spec in &inputs {
        spec.validate()?;
        if !seen.insert(spec.name.as_str()) {
            return Err(AppError::Manifest(format!(
                "{}: duplicate input name {:?}",
                origin.display(),
                spec.name
            )));
        }
    }

    Ok(inputs)
}
