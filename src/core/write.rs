//! Purpose: Chunked writer: clear the destination, grow its grid, then write fixed-size blocks.
//! Exports: `WritePlan`, `WriteReport`, `ChunkedWriter`.
//! Role: Pushes a projected/filtered row set into one destination sheet under API payload limits.
//! Invariants: The destination column span is cleared before any block is written.
//! Invariants: Blocks are written in increasing row order; each is addressed by its first row.
//! Invariants: The grid is only ever grown, never shrunk.
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::a1::{anchor, segments};
use super::error::{Error, ErrorKind};
use super::retry::{RetryPolicy, pause, with_retry};
use super::rows::Cell;
use super::sheets::{Sheets, ValueInput, find_sheet};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct WritePlan {
    /// Column span cleared before writing, e.g. `A:E`.
    pub clear_columns: String,
    pub chunk_rows: usize,
    pub chunk_pause_ms: u64,
    pub value_input: ValueInput,
    /// Lower bound for the destination column count.
    pub min_columns: u64,
}

impl Default for WritePlan {
    fn default() -> Self {
        Self {
            clear_columns: "A:E".to_string(),
            chunk_rows: 1200,
            chunk_pause_ms: 200,
            value_input: ValueInput::UserEntered,
            min_columns: 5,
        }
    }
}

impl WritePlan {
    pub fn with_chunk_rows(mut self, chunk_rows: usize) -> Self {
        self.chunk_rows = chunk_rows;
        self
    }

    fn chunk_pause(&self) -> Duration {
        Duration::from_millis(self.chunk_pause_ms)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WriteReport {
    pub rows_written: usize,
    pub chunks: usize,
    pub resized: bool,
}

pub struct ChunkedWriter<'a, S: ?Sized> {
    sheets: &'a S,
    retry: &'a RetryPolicy,
    plan: &'a WritePlan,
}

impl<'a, S: Sheets + ?Sized> ChunkedWriter<'a, S> {
    pub fn new(sheets: &'a S, retry: &'a RetryPolicy, plan: &'a WritePlan) -> Self {
        Self {
            sheets,
            retry,
            plan,
        }
    }

    pub fn write(
        &self,
        spreadsheet_id: &str,
        sheet: &str,
        rows: &[Vec<Cell>],
    ) -> Result<WriteReport, Error> {
        let total = rows.len();
        if total == 0 {
            debug!("nothing to write to {spreadsheet_id}:{sheet}");
            return Ok(WriteReport::default());
        }

        let clear_range = format!("{sheet}!{}", self.plan.clear_columns);
        with_retry(
            self.retry,
            &format!("clear {spreadsheet_id}:{clear_range}"),
            || self.sheets.clear_values(spreadsheet_id, &clear_range),
        )?;
        info!("cleared {spreadsheet_id}:{clear_range}");

        let width = rows.iter().map(Vec::len).max().unwrap_or(0) as u64;
        let resized = self.ensure_grid(
            spreadsheet_id,
            sheet,
            total as u64,
            width.max(self.plan.min_columns),
        )?;

        let chunk_rows = self.plan.chunk_rows.max(1);
        let chunk_count = total.div_ceil(chunk_rows);
        let mut report = WriteReport {
            rows_written: 0,
            chunks: 0,
            resized,
        };
        for segment in segments(total, chunk_rows) {
            let range = anchor(sheet, "A", segment.first_row());
            let block = &rows[segment.start..segment.end];
            debug!(
                "writing chunk {}/{chunk_count}: rows {}-{}",
                report.chunks + 1,
                segment.first_row(),
                segment.last_row()
            );
            with_retry(
                self.retry,
                &format!(
                    "write {spreadsheet_id}:{sheet} rows {}-{}",
                    segment.first_row(),
                    segment.last_row()
                ),
                || {
                    self.sheets
                        .update_values(spreadsheet_id, &range, block, self.plan.value_input)
                },
            )?;
            report.rows_written = segment.end;
            report.chunks += 1;
            info!("wrote {}/{total} to {spreadsheet_id}:{sheet}", segment.end);
            pause(self.plan.chunk_pause());
        }
        Ok(report)
    }

    /// Grows the grid of `sheet` to at least `min_rows` x `min_columns`.
    /// Returns whether a resize was issued.
    pub fn ensure_grid(
        &self,
        spreadsheet_id: &str,
        sheet: &str,
        min_rows: u64,
        min_columns: u64,
    ) -> Result<bool, Error> {
        let properties = with_retry(
            self.retry,
            &format!("read metadata of {spreadsheet_id}"),
            || self.sheets.sheet_properties(spreadsheet_id),
        )?;
        let Some(current) = find_sheet(&properties, sheet) else {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message(format!("sheet '{sheet}' not found"))
                .with_spreadsheet(spreadsheet_id));
        };

        let rows = current.row_count.max(min_rows);
        let columns = current.column_count.max(min_columns);
        if rows == current.row_count && columns == current.column_count {
            return Ok(false);
        }

        info!(
            "resizing grid of {spreadsheet_id}:{sheet} from {}x{} to {rows}x{columns}",
            current.row_count, current.column_count
        );
        let sheet_id = current.sheet_id;
        with_retry(
            self.retry,
            &format!("resize {spreadsheet_id}:{sheet}"),
            || {
                self.sheets
                    .resize_sheet(spreadsheet_id, sheet_id, rows, columns)
            },
        )?;
        Ok(true)
    }
}
