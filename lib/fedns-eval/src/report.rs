//! CSV reports of benchmark runs

use crate::{EvalError, Result};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

pub const EXECUTION_HEADER: &str = "Run,Execution Time (ms)";
pub const DIFFERENCE_HEADER: &str = "Run,Time Difference (ms)";

/// One measured run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvalResult {
    pub run: u64,
    /// Elapsed milliseconds or a block height, depending on the producer
    pub value: i64,
}

impl EvalResult {
    pub fn new(run: u64, value: i64) -> Self {
        Self { run, value }
    }
}

fn write_rows(path: &Path, header: &str, rows: &[EvalResult]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "{}", header)?;
    for row in rows {
        writeln!(out, "{},{}", row.run, row.value)?;
    }
    out.flush()?;
    Ok(())
}

/// Write `results` under the `Run,Execution Time (ms)` header, in the order given
pub fn write_csv(path: impl AsRef<Path>, results: &[EvalResult]) -> Result<()> {
    let path = path.as_ref();
    write_rows(path, EXECUTION_HEADER, results)?;
    info!("Execution times saved to {}", path.display());
    Ok(())
}

/// Read a two-column report back, keyed by run
pub fn read_csv(path: impl AsRef<Path>) -> Result<BTreeMap<u64, i64>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let malformed = |line: usize, reason: String| EvalError::MalformedReport {
        path: path.display().to_string(),
        line,
        reason,
    };

    let mut rows = BTreeMap::new();
    for (i, line) in content.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let (run, value) = line
            .split_once(',')
            .ok_or_else(|| malformed(i + 1, "expected two columns".to_string()))?;
        let run = run
            .trim()
            .parse()
            .map_err(|e| malformed(i + 1, format!("run: {}", e)))?;
        let value = value
            .trim()
            .parse()
            .map_err(|e| malformed(i + 1, format!("value: {}", e)))?;
        rows.insert(run, value);
    }
    Ok(rows)
}

/// Per-run difference `minuend - subtrahend` over the runs both reports
/// contain, written under the `Run,Time Difference (ms)` header
pub fn subtract(
    minuend: impl AsRef<Path>,
    subtrahend: impl AsRef<Path>,
    out: impl AsRef<Path>,
) -> Result<Vec<EvalResult>> {
    let left = read_csv(minuend)?;
    let right = read_csv(subtrahend)?;

    let diff: Vec<EvalResult> = left
        .iter()
        .filter_map(|(run, a)| right.get(run).map(|b| EvalResult::new(*run, a - b)))
        .collect();

    write_rows(out.as_ref(), DIFFERENCE_HEADER, &diff)?;
    Ok(diff)
}
