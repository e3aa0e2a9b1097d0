//! Purpose: Row-level data munging: width normalization, header detection, filtering, number cleaning.
//! Exports: `Row`, `Cell`, `pad_row`, `fit_row`, `looks_like_header`, `filter_by_column`, `clean_number_br`.
//! Role: Pure functions between the reader and the writer; no I/O.
//! Invariants: Row order is preserved by every function here.
//! Invariants: Header detection is a predicate over one row, nothing else.
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// One spreadsheet row as returned by the values API.
pub type Row = Vec<String>;

/// A scalar sent to the values API.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn empty() -> Self {
        Cell::Text(String::new())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

pub fn text_row(row: Row) -> Vec<Cell> {
    row.into_iter().map(Cell::Text).collect()
}

/// Right-pads with empty cells; never truncates.
pub fn pad_row(mut row: Row, width: usize) -> Row {
    if row.len() < width {
        row.resize(width, String::new());
    }
    row
}

/// Pads or truncates to exactly `width` cells.
pub fn fit_row(row: Row, width: usize) -> Row {
    let mut row = pad_row(row, width);
    row.truncate(width);
    row
}

/// Matches `^\s*[-+]?\d+([.,]\d+)?\s*$`; `\d` covers every Unicode decimal digit.
pub fn is_number_like(cell: &str) -> bool {
    static NUMBER_RE: OnceLock<Option<Regex>> = OnceLock::new();
    NUMBER_RE
        .get_or_init(|| Regex::new(r"^\s*[-+]?\d+([.,]\d+)?\s*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(cell))
}

/// A row is a header when at least one non-blank cell is not number-like.
pub fn looks_like_header(row: &[String]) -> bool {
    row.iter()
        .map(|cell| cell.trim())
        .any(|cell| !cell.is_empty() && !is_number_like(cell))
}

/// Keeps rows whose `column` (0-based) equals `target` after trimming both sides.
///
/// The output always starts with a header: the source's first row when it
/// looks like one, otherwise `default_header`. Every output row is fitted to
/// `width` cells.
pub fn filter_by_column(
    values: &[Row],
    column: usize,
    target: &str,
    width: usize,
    default_header: &[String],
) -> Vec<Row> {
    let has_header = values.first().is_some_and(|row| looks_like_header(row));
    let (header, data) = if has_header {
        (fit_row(values[0].clone(), width), &values[1..])
    } else {
        (fit_row(default_header.to_vec(), width), values)
    };
    let target = target.trim();

    let mut out = Vec::with_capacity(data.len() + 1);
    out.push(header);
    out.extend(
        data.iter()
            .map(|row| fit_row(row.clone(), width))
            .filter(|row| row.get(column).is_some_and(|cell| cell.trim() == target)),
    );
    out
}

/// Parses a pt-BR formatted number (`1.234,56`) into a numeric cell.
///
/// Anything that does not survive parsing becomes an empty text cell.
pub fn clean_number_br(value: &str) -> Cell {
    let kept: String = value
        .chars()
        .filter(|ch| ch.is_ascii_digit() || matches!(ch, ',' | '.' | '-'))
        .collect();
    if kept.is_empty() {
        return Cell::empty();
    }
    let normalized = if kept.contains(',') && kept.contains('.') {
        kept.replace('.', "").replace(',', ".")
    } else {
        kept.replace(',', ".")
    };
    match normalized.parse::<f64>() {
        Ok(number) if number.is_finite() => Cell::Number(number),
        _ => Cell::empty(),
    }
}
