//! Purpose: Adaptive bulk reader: one full-range request, then segmented reads with AIMD sizing.
//! Exports: `ReadPlan`, `ReadPath`, `ReadOutcome`, `AdaptiveReader`.
//! Role: Produces the ordered, width-normalized row set consumed by the jobs.
//! Invariants: After the segment `[pos, end)` is read the accumulated row count equals `end`.
//! Invariants: Segments are issued strictly in increasing row order; none is skipped or repeated on success.
//! Invariants: Segment size grows additively on success and halves on failure, bounded by `[segment_min, segment_max]`.
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::a1::{block, column_index, full_columns};
use super::error::{Error, ErrorKind};
use super::retry::{RetryPolicy, pause, with_retry};
use super::rows::{Row, pad_row};
use super::sheets::Sheets;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadPlan {
    /// Last column of the read range; the first is always `A`.
    pub last_column: String,
    /// Column whose populated length defines the row count in the fallback path.
    pub count_column: String,
    pub single_shot: bool,
    /// One single-shot attempt per entry; the entry is the pause after that attempt fails.
    pub single_shot_waits_secs: Vec<f64>,
    pub segment_init: usize,
    pub segment_min: usize,
    pub segment_step: usize,
    pub segment_max: usize,
    pub segment_pause_ms: u64,
}

impl Default for ReadPlan {
    fn default() -> Self {
        Self {
            last_column: "AC".to_string(),
            count_column: "A".to_string(),
            single_shot: true,
            single_shot_waits_secs: vec![2.0, 5.0],
            segment_init: 2000,
            segment_min: 200,
            segment_step: 200,
            segment_max: 4000,
            segment_pause_ms: 200,
        }
    }
}

impl ReadPlan {
    pub fn with_last_column(mut self, last_column: impl Into<String>) -> Self {
        self.last_column = last_column.into();
        self
    }

    fn segment_pause(&self) -> Duration {
        Duration::from_millis(self.segment_pause_ms)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReadPath {
    SingleShot,
    Segmented,
}

impl ReadPath {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadPath::SingleShot => "single_shot",
            ReadPath::Segmented => "segmented",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReadOutcome {
    pub rows: Vec<Row>,
    pub path: ReadPath,
    pub segments: usize,
    pub shrinks: usize,
}

pub struct AdaptiveReader<'a, S: ?Sized> {
    sheets: &'a S,
    retry: &'a RetryPolicy,
    plan: &'a ReadPlan,
}

impl<'a, S: Sheets + ?Sized> AdaptiveReader<'a, S> {
    pub fn new(sheets: &'a S, retry: &'a RetryPolicy, plan: &'a ReadPlan) -> Self {
        Self {
            sheets,
            retry,
            plan,
        }
    }

    /// Reads `A:{last_column}` of `sheet`, every row padded to the range width.
    pub fn read(&self, spreadsheet_id: &str, sheet: &str) -> Result<ReadOutcome, Error> {
        let width = column_index(&self.plan.last_column)?;

        if self.plan.single_shot {
            let range = full_columns(sheet, "A", &self.plan.last_column);
            info!("reading {range} in one request");
            if let Some(rows) = self.read_single_shot(spreadsheet_id, &range)? {
                info!("loaded {} rows", rows.len());
                return Ok(ReadOutcome {
                    rows: rows.into_iter().map(|row| pad_row(row, width)).collect(),
                    path: ReadPath::SingleShot,
                    segments: 1,
                    shrinks: 0,
                });
            }
            info!("falling back to adaptive segmented read");
        }

        let total = self.count_rows(spreadsheet_id, sheet)?;
        if total == 0 {
            info!("no rows found in {sheet}; nothing to read");
            return Ok(ReadOutcome {
                rows: Vec::new(),
                path: ReadPath::Segmented,
                segments: 0,
                shrinks: 0,
            });
        }
        info!("detected {total} rows in {sheet}");
        self.read_segmented(spreadsheet_id, sheet, total, width)
    }

    fn read_single_shot(&self, spreadsheet_id: &str, range: &str) -> Result<Option<Vec<Row>>, Error> {
        let attempts = self.plan.single_shot_waits_secs.len();
        for (idx, wait_secs) in self.plan.single_shot_waits_secs.iter().enumerate() {
            match self.sheets.get_values(spreadsheet_id, range) {
                Ok(rows) => return Ok(Some(rows)),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    let wait = Duration::from_secs_f64(wait_secs.max(0.0));
                    warn!(
                        "single read failed (attempt {}/{attempts}): {err}; waiting {:.1}s",
                        idx + 1,
                        wait.as_secs_f64()
                    );
                    pause(wait);
                }
            }
        }
        Ok(None)
    }

    fn count_rows(&self, spreadsheet_id: &str, sheet: &str) -> Result<usize, Error> {
        let column = &self.plan.count_column;
        let range = full_columns(sheet, column, column);
        let rows = with_retry(self.retry, &format!("count rows ({range})"), || {
            self.sheets.get_values(spreadsheet_id, &range)
        })?;
        Ok(rows.len())
    }

    fn read_segmented(
        &self,
        spreadsheet_id: &str,
        sheet: &str,
        total: usize,
        width: usize,
    ) -> Result<ReadOutcome, Error> {
        let min = self.plan.segment_min.max(1);
        let max = self.plan.segment_max.max(min);
        let mut size = self.plan.segment_init.clamp(min, max);
        let mut rows: Vec<Row> = Vec::with_capacity(total);
        let mut pos = 0usize;
        let mut segments = 0usize;
        let mut shrinks = 0usize;

        while pos < total {
            let end = (pos + size).min(total);
            let range = block(sheet, "A", pos + 1, &self.plan.last_column, end);
            let desc = format!("read {sheet} rows {}-{end}", pos + 1);
            match with_retry(self.retry, &desc, || {
                self.sheets.get_values(spreadsheet_id, &range)
            }) {
                Ok(mut chunk) => {
                    let wanted = end - pos;
                    if chunk.len() > wanted {
                        warn!(
                            "{range} returned {} rows, expected at most {wanted}; truncating",
                            chunk.len()
                        );
                        chunk.truncate(wanted);
                    }
                    // Trailing blank rows are omitted by the API.
                    chunk.resize(wanted, Vec::new());
                    rows.extend(chunk.into_iter().map(|row| pad_row(row, width)));
                    debug_assert_eq!(rows.len(), end);
                    segments += 1;
                    info!("read {}/{total}", rows.len());
                    pos = end;
                    pause(self.plan.segment_pause());
                    if size < max {
                        size = (size + self.plan.segment_step).min(max);
                        debug!("segment size raised to {size}");
                    }
                }
                Err(err) if err.kind() == ErrorKind::Exhausted || err.is_retryable() => {
                    let next = (size / 2).max(min);
                    if next == size {
                        return Err(err);
                    }
                    warn!("shrinking segment: {size} -> {next}");
                    size = next;
                    shrinks += 1;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(ReadOutcome {
            rows,
            path: ReadPath::Segmented,
            segments,
            shrinks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{AdaptiveReader, ReadPath, ReadPlan};
    use crate::api::memory::{Fault, MemorySheets, Op};
    use crate::core::error::ErrorKind;
    use crate::core::retry::RetryPolicy;
    use crate::core::rows::Row;

    fn numbered_rows(count: usize, width: usize) -> Vec<Row> {
        (0..count)
            .map(|r| (0..width).map(|c| format!("{r}:{c}")).collect())
            .collect()
    }

    fn quiet_plan() -> ReadPlan {
        ReadPlan {
            single_shot_waits_secs: vec![0.0, 0.0],
            segment_pause_ms: 0,
            ..ReadPlan::default()
        }
    }

    #[test]
    fn single_shot_returns_padded_rows() {
        let sheets = MemorySheets::new();
        sheets.add_sheet("src", "Data", vec![vec!["a".to_string()], vec!["b".to_string()]]);
        let plan = quiet_plan();
        let retry = RetryPolicy::immediate(3);

        let outcome = AdaptiveReader::new(&sheets, &retry, &plan)
            .read("src", "Data")
            .expect("read");
        assert_eq!(outcome.path, ReadPath::SingleShot);
        assert_eq!(outcome.rows.len(), 2);
        assert!(outcome.rows.iter().all(|row| row.len() == 29));
        assert_eq!(sheets.calls_of(Op::Get), 1);
    }

    #[test]
    fn fallback_reads_small_sheet_in_one_segment() {
        let sheets = MemorySheets::new();
        let source = vec![
            vec!["1".to_string(), "2".to_string()],
            vec!["3".to_string(), "4".to_string()],
            vec!["5".to_string(), "6".to_string()],
        ];
        sheets.add_sheet("src", "Data", source.clone());
        sheets.inject(Fault::new(Op::Get, ErrorKind::Unavailable).on_range("Data!A:AC").times(2));
        let plan = quiet_plan();
        let retry = RetryPolicy::immediate(3);

        let outcome = AdaptiveReader::new(&sheets, &retry, &plan)
            .read("src", "Data")
            .expect("read");
        assert_eq!(outcome.path, ReadPath::Segmented);
        assert_eq!(outcome.segments, 1);
        assert_eq!(outcome.rows.len(), 3);
        for (got, want) in outcome.rows.iter().zip(&source) {
            assert_eq!(&got[..2], &want[..]);
            assert_eq!(got.len(), 29);
        }
        assert!(sheets.ranges_of(Op::Get).contains(&"Data!A1:AC3".to_string()));
    }

    #[test]
    fn segmented_read_restores_trailing_blank_rows() {
        let sheets = MemorySheets::new();
        let mut source = numbered_rows(5, 1);
        source.push(Vec::new());
        source.push(vec!["tail".to_string()]);
        sheets.add_sheet("src", "Data", source);
        // Segment [3, 6) ends on the blank row, which the API leaves out.
        let plan = ReadPlan {
            single_shot: false,
            segment_init: 3,
            segment_min: 2,
            segment_step: 0,
            segment_max: 3,
            ..quiet_plan()
        };
        let retry = RetryPolicy::immediate(2);

        let outcome = AdaptiveReader::new(&sheets, &retry, &plan)
            .read("src", "Data")
            .expect("read");
        assert_eq!(outcome.rows.len(), 7);
        assert_eq!(outcome.rows[5], vec![String::new(); 29]);
        assert_eq!(outcome.rows[6][0], "tail");
    }

    #[test]
    fn shrinks_on_failure_and_grows_back() {
        let sheets = MemorySheets::new();
        let source = numbered_rows(1000, 3);
        sheets.add_sheet("src", "Data", source.clone());
        // The first 400-row request fails; the 200-row retry and later ones succeed.
        sheets.inject(Fault::new(Op::Get, ErrorKind::Unavailable).on_range("Data!A1:AC400").times(2));
        let plan = ReadPlan {
            single_shot: false,
            segment_init: 400,
            segment_min: 100,
            segment_step: 100,
            segment_max: 500,
            ..quiet_plan()
        };
        let retry = RetryPolicy::immediate(2);

        let outcome = AdaptiveReader::new(&sheets, &retry, &plan)
            .read("src", "Data")
            .expect("read");
        assert_eq!(outcome.shrinks, 1);
        assert_eq!(outcome.rows.len(), 1000);
        for (got, want) in outcome.rows.iter().zip(&source) {
            assert_eq!(&got[..3], &want[..]);
        }
        let ranges = sheets.ranges_of(Op::Get);
        assert_eq!(
            ranges,
            vec![
                "Data!A:A",
                "Data!A1:AC400",
                "Data!A1:AC400",
                "Data!A1:AC200",
                "Data!A201:AC500",
                "Data!A501:AC900",
                "Data!A901:AC1000",
            ]
        );
    }

    #[test]
    fn repeated_shrinks_keep_every_row_in_order() {
        let plan = ReadPlan {
            single_shot: false,
            ..quiet_plan()
        };
        let retry = RetryPolicy::immediate(1);
        for total in [1, 199, 200, 201, 999, 2000, 2001, 7777] {
            let sheets = MemorySheets::new();
            let source = numbered_rows(total, 2);
            sheets.add_sheet("src", "Data", source.clone());
            // 2000 -> 1000 -> 500 -> 250 on the first segment.
            sheets.inject(Fault::new(Op::Get, ErrorKind::Unavailable).on_range("Data!A1:").times(3));
            // The grown 450-row second segment then drops to the 200-row floor.
            sheets.inject(Fault::new(Op::Get, ErrorKind::Unavailable).on_range("Data!A251:").times(2));

            let outcome = AdaptiveReader::new(&sheets, &retry, &plan)
                .read("src", "Data")
                .expect("read");
            let expected_shrinks = if total > 250 { 5 } else { 3 };
            assert_eq!(outcome.shrinks, expected_shrinks, "total {total}");
            assert_eq!(outcome.rows.len(), total, "total {total}");
            for (got, want) in outcome.rows.iter().zip(&source) {
                assert_eq!(&got[..2], &want[..], "total {total}");
            }
        }
    }

    #[test]
    fn failure_at_floor_propagates() {
        let sheets = MemorySheets::new();
        sheets.add_sheet("src", "Data", numbered_rows(10, 1));
        sheets.inject(Fault::new(Op::Get, ErrorKind::Unavailable).on_range("Data!A1:"));
        let plan = ReadPlan {
            single_shot: false,
            segment_init: 8,
            segment_min: 2,
            ..quiet_plan()
        };
        let retry = RetryPolicy::immediate(2);

        let err = AdaptiveReader::new(&sheets, &retry, &plan)
            .read("src", "Data")
            .expect_err("floor");
        assert_eq!(err.kind(), ErrorKind::Exhausted);
        let tried: Vec<_> = sheets
            .ranges_of(Op::Get)
            .into_iter()
            .filter(|range| range.starts_with("Data!A1:"))
            .collect();
        assert_eq!(tried.last().map(String::as_str), Some("Data!A1:AC2"));
    }

    #[test]
    fn empty_sheet_reads_nothing() {
        let sheets = MemorySheets::new();
        sheets.add_sheet("src", "Data", Vec::new());
        let plan = ReadPlan {
            single_shot: false,
            ..quiet_plan()
        };
        let retry = RetryPolicy::immediate(2);

        let outcome = AdaptiveReader::new(&sheets, &retry, &plan)
            .read("src", "Data")
            .expect("read");
        assert!(outcome.rows.is_empty());
        assert_eq!(sheets.calls_of(Op::Get), 1);
    }

    #[test]
    fn permanent_single_shot_error_is_not_masked() {
        let sheets = MemorySheets::new();
        sheets.add_sheet("src", "Data", numbered_rows(3, 1));
        sheets.inject(Fault::new(Op::Get, ErrorKind::Permission));
        let plan = quiet_plan();
        let retry = RetryPolicy::immediate(2);

        let err = AdaptiveReader::new(&sheets, &retry, &plan)
            .read("src", "Data")
            .expect_err("permission");
        assert_eq!(err.kind(), ErrorKind::Permission);
        assert_eq!(sheets.calls_of(Op::Get), 1);
    }
}
