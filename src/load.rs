use anyhow::{format_err, Context, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use log::info;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Sampling interval assumed for load tables. The source data carries no
/// timestamps, so this is never checked.
pub const DEFAULT_STEP_MINUTES: i64 = 15;

/// Start of the synthetic time index (2023-01-01 00:00).
pub fn default_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Parses a cell as a number. Empty, textual and NaN cells are missing.
pub fn coerce_numeric(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Power values by row and load (building) name. The source row labels are
/// dropped; rows are placed on a synthetic time index instead.
#[derive(Debug, Clone, Default)]
pub struct LoadTable {
    /// Load names from the header, excluding the index column.
    pub columns: Vec<String>,

    /// Row-major cells, `None` where the value was not numeric.
    pub values: Vec<Vec<Option<f64>>>,
}

impl LoadTable {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of cells that could not be read as numbers.
    pub fn missing(&self) -> usize {
        self.values.iter().flatten().filter(|v| v.is_none()).count()
    }

    /// Sum across all loads for each row, skipping missing cells.
    pub fn total(&self) -> Vec<f64> {
        self.values
            .iter()
            .map(|row| row.iter().flatten().sum())
            .collect()
    }
}

/// Reads a load table whose first column is the row index. The index values
/// themselves are not kept.
pub fn read_load_table<R: Read>(reader: R) -> Result<LoadTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    if headers.is_empty() {
        return Err(format_err!("load table has no header"));
    }
    let columns: Vec<String> = headers.iter().skip(1).map(|h| h.to_string()).collect();

    let mut table = LoadTable {
        columns,
        ..Default::default()
    };
    for record in rdr.records() {
        let record = record?;
        let row = (1..=table.columns.len())
            .map(|j| record.get(j).and_then(coerce_numeric))
            .collect();
        table.values.push(row);
    }
    Ok(table)
}

pub fn load_load_table(path: &Path) -> Result<LoadTable> {
    let file =
        File::open(path).with_context(|| format!("unable to open {}", path.display()))?;
    let table =
        read_load_table(file).with_context(|| format!("unable to read {}", path.display()))?;
    info!(
        "Loaded {} rows x {} loads from {} ({} missing cells)",
        table.len(),
        table.columns.len(),
        path.display(),
        table.missing()
    );
    Ok(table)
}

/// Evenly spaced timestamps: `start`, `start + step`, ...
pub fn time_index(start: NaiveDateTime, periods: usize, step: Duration) -> Vec<NaiveDateTime> {
    (0..periods)
        .map(|i| start + step * i as i32)
        .collect()
}

/// Aggregate load series on a synthetic time axis.
#[derive(Debug, Clone)]
pub struct LoadProfile {
    pub timestamps: Vec<NaiveDateTime>,
    pub total: Vec<f64>,
}

impl LoadProfile {
    pub fn from_table(table: &LoadTable, start: NaiveDateTime, step: Duration) -> Self {
        let total = table.total();
        let timestamps = time_index(start, total.len(), step);
        Self { timestamps, total }
    }

    pub fn len(&self) -> usize {
        self.total.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total.is_empty()
    }

    pub fn peak(&self) -> Option<(NaiveDateTime, f64)> {
        self.timestamps
            .iter()
            .zip(&self.total)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(t, p)| (*t, *p))
    }
}
