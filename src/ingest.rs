//! Tabular ingestion for dataset files.
//!
//! Parses plain CSV text into a feature sequence and an optional label grid,
//! following the loose column conventions of the dataset tooling:
//!
//! - an `X`/`x`/`X_data`/`x_data` column whose first cell is a comma- or
//!   semicolon-separated list, otherwise the first data row's numeric
//!   fields in order;
//! - labels from a `Y`/`y`/`Y_data`/`y_data` list column, or from
//!   `Y_0..Y_440` columns in header order.
//!
//! Labels are always length-normalized; ingestion never rejects a label
//! sequence for its length. Failure to extract features is reported as
//! [`GridError::MalformedInput`] with no partial processing.

use crate::error::{GridError, Result};
use crate::grid;

const X_COLUMNS: [&str; 4] = ["X", "x", "X_data", "x_data"];
const Y_COLUMNS: [&str; 4] = ["Y", "y", "Y_data", "y_data"];

/// One parsed training or prediction example.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Feature sequence, arbitrary length >= 1
    pub features: Vec<f32>,
    /// Label grid, normalized to 441 tokens when present
    pub labels: Option<Vec<u32>>,
}

/// Parse a CSV document into features and optional labels.
///
/// # Errors
/// Returns [`GridError::MalformedInput`] when no feature sequence can be
/// extracted.
pub fn parse_dataset(text: &str) -> Result<Dataset> {
    let table = Table::parse(text)
        .ok_or_else(|| GridError::MalformedInput("document contains no data rows".to_string()))?;

    let features = extract_features(&table).ok_or_else(|| {
        GridError::MalformedInput("could not extract a feature sequence".to_string())
    })?;
    let labels = extract_labels(&table);

    Ok(Dataset { features, labels })
}

/// Parse a bare list of floats, accepting commas or semicolons.
#[must_use]
pub fn parse_float_list(cell: &str) -> Option<Vec<f32>> {
    let values: Vec<f32> = cell
        .replace(';', ",")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    if values.is_empty() { None } else { Some(values) }
}

/// Parse a bare list of integer tokens. Values written as floats ("1.0")
/// are accepted and truncated.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_token_list(cell: &str) -> Option<Vec<u32>> {
    let values = parse_float_list(cell)?;
    Some(values.into_iter().map(|v| v.max(0.0) as u32).collect())
}

struct Table {
    headers: Vec<String>,
    row: Vec<String>,
}

impl Table {
    /// Header line plus the first data row; further rows are ignored.
    fn parse(text: &str) -> Option<Self> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let headers = split_csv_line(lines.next()?);
        let row = split_csv_line(lines.next()?);
        if headers.is_empty() || row.is_empty() {
            return None;
        }
        Some(Self { headers, row })
    }

    fn column(&self, names: &[&str]) -> Option<&str> {
        let idx = self
            .headers
            .iter()
            .position(|h| names.iter().any(|n| h == n))?;
        self.row.get(idx).map(String::as_str)
    }
}

fn extract_features(table: &Table) -> Option<Vec<f32>> {
    // Case 1: an X column holding the whole sequence in one cell.
    if let Some(cell) = table.column(&X_COLUMNS) {
        if let Some(values) = parse_float_list(cell) {
            return Some(values);
        }
    }

    // Case 2: the first data row, all numeric fields in order.
    let values: Vec<f32> = table
        .row
        .iter()
        .filter_map(|cell| cell.trim().parse::<f32>().ok())
        .collect();
    if values.is_empty() { None } else { Some(values) }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn extract_labels(table: &Table) -> Option<Vec<u32>> {
    // Case 1: a Y column holding the whole grid in one cell.
    if let Some(cell) = table.column(&Y_COLUMNS) {
        if let Some(tokens) = parse_token_list(cell) {
            return Some(grid::normalize_tokens(&tokens));
        }
    }

    // Case 2: Y_0..Y_440 columns in header order.
    let mut tokens = Vec::new();
    for (idx, header) in table.headers.iter().enumerate() {
        if !header.to_lowercase().starts_with("y_") {
            continue;
        }
        let value = table.row.get(idx)?.trim().parse::<f32>().ok()?;
        tokens.push(value.max(0.0) as u32);
    }
    if tokens.is_empty() {
        None
    } else {
        Some(grid::normalize_tokens(&tokens))
    }
}

/// Split one CSV line into fields, honoring double-quoted cells.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(field.trim().to_string());
                field.clear();
            }
            _ => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}
