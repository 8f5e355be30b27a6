//! Tabular data: CSV files and tables recovered from extracted text.

use super::FormatError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

/// Read every record of a CSV file. Ragged rows are allowed; there is no
/// header handling, the first record is just the first row.
pub fn read_csv(path: &Path) -> Result<Vec<Vec<String>>, FormatError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

pub fn write_csv(rows: &[Vec<String>], path: &Path) -> Result<(), FormatError> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_path(path)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

static RE_COLUMN_GAP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\t+| {2,}").unwrap());

/// Recover a table from layout-preserving text: a line is a row when it
/// splits into at least two cells on tabs or runs of two or more spaces.
///
/// Returns `None` unless at least two such rows exist. When no line splits,
/// the caller gets `None` and should fall back to one cell per line.
pub fn detect_table(text: &str) -> Option<Vec<Vec<String>>> {
    let rows: Vec<Vec<String>> = text
        .lines()
        .map(|line| {
            RE_COLUMN_GAP
                .split(line.trim())
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|cells| cells.len() >= 2)
        .collect();
    (rows.len() >= 2).then_some(rows)
}

/// One row per non-empty line, single column.
pub fn lines_as_rows(text: &str) -> Vec<Vec<String>> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| vec![l.to_string()])
        .collect()
}
