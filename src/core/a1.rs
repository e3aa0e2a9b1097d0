//! Purpose: A1-notation helpers: column letters, range strings, and row partitioning.
//! Exports: `column_index`, `column_letters`, `full_columns`, `block`, `anchor`, `Segment`, `segments`.
//! Role: The one place that turns row/column coordinates into range strings.
//! Invariants: Column indices are 1-based (`A` = 1); rows in range strings are 1-based.
//! Invariants: `segments` yields a contiguous, ordered, half-open partition of `0..total`.
use super::error::{Error, ErrorKind};

/// Bijective base-26: `A` = 1, `Z` = 26, `AA` = 27.
pub fn column_index(letters: &str) -> Result<usize, Error> {
    let trimmed = letters.trim();
    if trimmed.is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("empty column letters"));
    }
    let mut index = 0usize;
    for ch in trimmed.chars() {
        if !ch.is_ascii_alphabetic() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("invalid column letters: {trimmed}")));
        }
        let digit = (ch.to_ascii_uppercase() as u8 - b'A' + 1) as usize;
        index = index
            .checked_mul(26)
            .and_then(|value| value.checked_add(digit))
            .ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("column letters out of range: {trimmed}"))
            })?;
    }
    Ok(index)
}

/// Inverse of [`column_index`].
pub fn column_letters(index: usize) -> Result<String, Error> {
    if index == 0 {
        return Err(Error::new(ErrorKind::Usage).with_message("column index must be >= 1"));
    }
    let mut out = Vec::new();
    let mut rest = index;
    while rest > 0 {
        let digit = (rest - 1) % 26;
        out.push(b'A' + digit as u8);
        rest = (rest - 1) / 26;
    }
    out.reverse();
    Ok(String::from_utf8(out).unwrap_or_default())
}

/// `Sheet!A:AC`
pub fn full_columns(sheet: &str, first: &str, last: &str) -> String {
    format!("{sheet}!{first}:{last}")
}

/// `Sheet!A1:AC10`
pub fn block(sheet: &str, first: &str, start_row: usize, last: &str, end_row: usize) -> String {
    format!("{sheet}!{first}{start_row}:{last}{end_row}")
}

/// `Sheet!A5`: a single-cell anchor; the API extends it to fit the payload.
pub fn anchor(sheet: &str, column: &str, row: usize) -> String {
    format!("{sheet}!{column}{row}")
}

/// Half-open row range `[start, end)`, 0-based.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// First row of the segment in 1-based sheet coordinates.
    pub fn first_row(&self) -> usize {
        self.start + 1
    }

    /// Last row of the segment in 1-based sheet coordinates (inclusive).
    pub fn last_row(&self) -> usize {
        self.end
    }
}

pub fn segments(total: usize, size: usize) -> impl Iterator<Item = Segment> {
    let size = size.max(1);
    (0..total)
        .step_by(size)
        .map(move |start| Segment {
            start,
            end: (start + size).min(total),
        })
}
