//! Purpose: Export job: read a wide source sheet, project selected columns, write them to a destination.
//! Exports: `ExportConfig`, `ColumnMap`, `ExportReport`, `run_export`, `project_rows`.
//! Role: Reader -> projection -> writer pipeline for one source/destination pair.
//! Invariants: Row order and count are preserved by the projection.
//! Invariants: Row 0 is never number-cleaned so a header survives as text.
use serde::{Deserialize, Deserializer};
use tracing::{info, warn};

use crate::config::overlay;
use crate::core::a1::column_index;
use crate::core::error::{Error, ErrorKind};
use crate::core::read::{AdaptiveReader, ReadPath, ReadPlan};
use crate::core::retry::RetryPolicy;
use crate::core::rows::{Cell, Row, clean_number_br};
use crate::core::sheets::Sheets;
use crate::core::write::{ChunkedWriter, WritePlan};

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ColumnMap {
    pub column: String,
    #[serde(default)]
    pub numeric: bool,
}

impl ColumnMap {
    pub fn text(column: &str) -> Self {
        Self {
            column: column.to_string(),
            numeric: false,
        }
    }

    pub fn numeric(column: &str) -> Self {
        Self {
            column: column.to_string(),
            numeric: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    pub source_id: String,
    pub source_sheet: String,
    pub destination_id: String,
    pub destination_sheet: String,
    #[serde(deserialize_with = "export_read")]
    pub read: ReadPlan,
    #[serde(deserialize_with = "export_write")]
    pub write: WritePlan,
    /// Source columns in destination order; destination columns start at `A`.
    pub columns: Vec<ColumnMap>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            source_id: String::new(),
            source_sheet: "BD_Carteira".to_string(),
            destination_id: String::new(),
            destination_sheet: "BD_Esteira".to_string(),
            read: ReadPlan::default().with_last_column("AC"),
            write: WritePlan::default().with_chunk_rows(1200),
            columns: vec![
                ColumnMap::text("A"),
                ColumnMap::numeric("AB"),
                ColumnMap::text("Z"),
                ColumnMap::numeric("X"),
                ColumnMap::text("AC"),
            ],
        }
    }
}

fn export_read<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ReadPlan, D::Error> {
    overlay(ExportConfig::default().read, deserializer)
}

fn export_write<'de, D: Deserializer<'de>>(deserializer: D) -> Result<WritePlan, D::Error> {
    overlay(ExportConfig::default().write, deserializer)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExportReport {
    pub rows_read: usize,
    pub rows_written: usize,
    pub chunks: usize,
    pub read_path: ReadPath,
}

pub fn run_export<S: Sheets + ?Sized>(
    sheets: &S,
    retry: &RetryPolicy,
    config: &ExportConfig,
) -> Result<ExportReport, Error> {
    require_id("source_id", &config.source_id)?;
    require_id("destination_id", &config.destination_id)?;
    let columns = resolve_columns(config)?;

    let listing = config
        .columns
        .iter()
        .map(|map| map.column.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    info!(
        "exporting {} -> {} (columns {listing})",
        config.source_sheet, config.destination_sheet
    );

    let outcome = AdaptiveReader::new(sheets, retry, &config.read)
        .read(&config.source_id, &config.source_sheet)?;
    let rows_read = outcome.rows.len();
    if rows_read == 0 {
        warn!("nothing to write");
        return Ok(ExportReport {
            rows_read: 0,
            rows_written: 0,
            chunks: 0,
            read_path: outcome.path,
        });
    }

    info!("projecting {rows_read} rows");
    let projected = project_rows(&outcome.rows, &columns);
    let written = ChunkedWriter::new(sheets, retry, &config.write).write(
        &config.destination_id,
        &config.destination_sheet,
        &projected,
    )?;
    info!("export finished: {} rows", written.rows_written);

    Ok(ExportReport {
        rows_read,
        rows_written: written.rows_written,
        chunks: written.chunks,
        read_path: outcome.path,
    })
}

/// `columns` holds 0-based source indices and whether to number-clean them.
pub fn project_rows(rows: &[Row], columns: &[(usize, bool)]) -> Vec<Vec<Cell>> {
    rows.iter()
        .enumerate()
        .map(|(idx, row)| {
            columns
                .iter()
                .map(|&(column, numeric)| {
                    let value = row.get(column).map(String::as_str).unwrap_or_default();
                    if numeric && idx > 0 {
                        clean_number_br(value)
                    } else {
                        Cell::from(value)
                    }
                })
                .collect()
        })
        .collect()
}

fn resolve_columns(config: &ExportConfig) -> Result<Vec<(usize, bool)>, Error> {
    let width = column_index(&config.read.last_column)?;
    config
        .columns
        .iter()
        .map(|map| {
            let index = column_index(&map.column)?;
            if index > width {
                return Err(Error::new(ErrorKind::Usage).with_message(format!(
                    "column {} is outside the read range A:{}",
                    map.column, config.read.last_column
                )));
            }
            Ok((index - 1, map.numeric))
        })
        .collect()
}

fn require_id(field: &str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("{field} is not configured"))
            .with_hint("Set it in the --config file or pass it as a flag."));
    }
    Ok(())
}
