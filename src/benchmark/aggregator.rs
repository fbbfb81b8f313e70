//! Result tables
//!
//! Serializes a [`RunReport`] into the CSV tables and the JSON run summary.
//! Writers only depend on the report, so identical reports produce
//! byte-identical files.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use uuid::Uuid;

use crate::constants::{EVM_RESULTS_FILE, FAILURES_FILE, NATIVE_RESULTS_FILE, SUMMARY_FILE};
use crate::error::AppResult;
use crate::models::{EvmBenchResult, NativeBenchResult, ResultKey, ResultTable, RunReport, UnitFailure};

const NATIVE_HEADER: [&str; 3] = ["test_name", "elapsed_times", "native_file_size"];
const EVM_HEADER: [&str; 3] = ["test_name", "elapsed_time", "gas_used"];
const FAILURE_HEADER: [&str; 5] = ["case", "test_name", "environment", "stage", "error"];

/// Separator between samples inside the `elapsed_times` field
const SAMPLE_SEPARATOR: &str = ", ";

/// Row labels for a table.
///
/// The bare input name is used unless the same name appears under more than
/// one case in the table, in which case it becomes `<case>/<name>`.
pub fn display_names<T>(table: &ResultTable<T>) -> Vec<String> {
    let mut cases_by_name: HashMap<&str, HashSet<&str>> = HashMap::new();
    for (key, _) in table.iter() {
        cases_by_name
            .entry(key.name.as_str())
            .or_default()
            .insert(key.case.as_str());
    }

    table
        .iter()
        .map(|(key, _)| label(key, &cases_by_name))
        .collect()
}

fn label(key: &ResultKey, cases_by_name: &HashMap<&str, HashSet<&str>>) -> String {
    let shared = cases_by_name
        .get(key.name.as_str())
        .is_some_and(|cases| cases.len() > 1);
    if shared {
        key.to_string()
    } else {
        key.name.clone()
    }
}

fn csv_writer<W: Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::CRLF)
        .from_writer(writer)
}

/// `test_name,elapsed_times,native_file_size`
pub fn write_native_csv<W: Write>(writer: W, table: &ResultTable<NativeBenchResult>) -> AppResult<()> {
    let mut wtr = csv_writer(writer);
    wtr.write_record(NATIVE_HEADER)?;

    for (name, (_, result)) in display_names(table).into_iter().zip(table.iter()) {
        let times = result
            .bench_times
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(SAMPLE_SEPARATOR);
        wtr.write_record([name, times, result.exec_size.to_string()])?;
    }

    wtr.flush()?;
    Ok(())
}

/// `test_name,elapsed_time,gas_used`
pub fn write_evm_csv<W: Write>(writer: W, table: &ResultTable<EvmBenchResult>) -> AppResult<()> {
    let mut wtr = csv_writer(writer);
    wtr.write_record(EVM_HEADER)?;

    for (name, (_, result)) in display_names(table).into_iter().zip(table.iter()) {
        wtr.write_record([name, result.time.to_string(), result.gas_used.to_string()])?;
    }

    wtr.flush()?;
    Ok(())
}

/// `case,test_name,environment,stage,error`
pub fn write_failures_csv<W: Write>(writer: W, failures: &[UnitFailure]) -> AppResult<()> {
    let mut wtr = csv_writer(writer);
    wtr.write_record(FAILURE_HEADER)?;

    for failure in failures {
        let error = format!("{}: {}", failure.error_code, failure.message);
        wtr.write_record([
            failure.case.as_str(),
            failure.name.as_deref().unwrap_or(""),
            failure.environment.map(|e| e.as_str()).unwrap_or(""),
            failure.stage.as_str(),
            error.as_str(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Run metadata written next to the tables
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cases: &'a [String],
    pub native_results: usize,
    pub vm_results: usize,
    pub failures: usize,
    pub cancelled: bool,
    pub success: bool,
}

impl<'a> From<&'a RunReport> for RunSummary<'a> {
    fn from(report: &'a RunReport) -> Self {
        Self {
            run_id: report.run_id,
            started_at: report.started_at,
            finished_at: report.finished_at,
            cases: &report.cases,
            native_results: report.native.len(),
            vm_results: report.vm.len(),
            failures: report.failures.len(),
            cancelled: report.cancelled,
            success: report.is_success(),
        }
    }
}

pub fn write_summary_json<W: Write>(mut writer: W, report: &RunReport) -> AppResult<()> {
    serde_json::to_writer_pretty(&mut writer, &RunSummary::from(report))?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Writes every output file of a run into one directory
pub struct ResultWriter {
    result_dir: PathBuf,
}

impl ResultWriter {
    pub fn new(result_dir: impl Into<PathBuf>) -> Self {
        Self {
            result_dir: result_dir.into(),
        }
    }

    /// Overwrite all result files with the contents of `report`
    pub async fn write_all(&self, report: &RunReport) -> AppResult<Vec<PathBuf>> {
        fs::create_dir_all(&self.result_dir).await?;

        let mut native = Vec::new();
        write_native_csv(&mut native, &report.native)?;
        let mut evm = Vec::new();
        write_evm_csv(&mut evm, &report.vm)?;
        let mut failures = Vec::new();
        write_failures_csv(&mut failures, &report.failures)?;
        let mut summary = Vec::new();
        write_summary_json(&mut summary, report)?;

        let mut written = Vec::with_capacity(4);
        for (file, contents) in [
            (NATIVE_RESULTS_FILE, native),
            (EVM_RESULTS_FILE, evm),
            (FAILURES_FILE, failures),
            (SUMMARY_FILE, summary),
        ] {
            written.push(self.write_file(file, &contents).await?);
        }

        tracing::info!(
            dir = %self.result_dir.display(),
            native = report.native.len(),
            vm = report.vm.len(),
            failures = report.failures.len(),
            "Results written"
        );
        Ok(written)
    }

    async fn write_file(&self, name: &str, contents: &[u8]) -> AppResult<PathBuf> {
        let path = self.result_dir.join(name);
        fs::write(&path, contents).await?;
        Ok(path)
    }

    pub fn result_dir(&self) -> &Path {
        &self.result_dir
    }
}
