//! Benchmark result models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Execution environment of a benchmark variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Compiled Rust binary executed directly
    Native,
    /// EVM bytecode executed by the go-ethereum runtime
    Vm,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Native => "native",
            Environment::Vm => "vm",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage a failure occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Load,
    Generate,
    Build,
    Publish,
    Execute,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Generate => "generate",
            Stage::Build => "build",
            Stage::Publish => "publish",
            Stage::Execute => "execute",
        }
    }
}

/// Identity of one input vector across the whole run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResultKey {
    pub case: String,
    pub name: String,
}

impl ResultKey {
    pub fn new(case: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            case: case.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.case, self.name)
    }
}

/// Native measurement for one input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeBenchResult {
    /// Elapsed seconds, one entry per invocation
    pub bench_times: Vec<f64>,
    /// Size of the native executable in bytes
    pub exec_size: u64,
}

/// VM measurement for one input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvmBenchResult {
    /// Seconds per operation reported by the Go benchmark
    pub time: f64,
    pub gas_used: u64,
}

/// Failure marker recorded instead of a metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub case: String,
    /// Input name, absent when the whole case failed to load
    pub name: Option<String>,
    pub environment: Option<Environment>,
    pub stage: Stage,
    pub error_code: String,
    pub message: String,
}

/// Insertion-ordered table keyed by [`ResultKey`].
///
/// Re-inserting a key replaces the value in place, so row order is the
/// order in which keys were first recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable<T> {
    rows: Vec<(ResultKey, T)>,
}

impl<T> ResultTable<T> {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn insert(&mut self, key: ResultKey, value: T) {
        match self.rows.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.rows.push((key, value)),
        }
    }

    pub fn get(&self, key: &ResultKey) -> Option<&T> {
        self.rows.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResultKey, &T)> {
        self.rows.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append every row of `other`, in its order
    pub fn extend(&mut self, other: ResultTable<T>) {
        for (key, value) in other.rows {
            self.insert(key, value);
        }
    }
}

impl<T> Default for ResultTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cases: Vec<String>,
    pub native: ResultTable<NativeBenchResult>,
    pub vm: ResultTable<EvmBenchResult>,
    pub failures: Vec<UnitFailure>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            cases: Vec::new(),
            native: ResultTable::new(),
            vm: ResultTable::new(),
            failures: Vec::new(),
            cancelled: false,
        }
    }

    /// A run succeeds when every unit produced a metric
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
