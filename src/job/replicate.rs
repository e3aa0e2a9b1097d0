//! Purpose: Replicate job: fan one source sheet out to many destination spreadsheets, filtered per destination.
//! Exports: `ReplicateConfig`, `Destination`, `DestinationStatus`, `DestinationOutcome`, `ReplicateReport`,
//! `run_replicate`, `find_config_sheet`, `read_destinations`.
//! Role: Config-sheet lookup -> destination list -> one adaptive read -> filtered chunked write per destination.
//! Invariants: The source is read once per run regardless of destination count.
//! Invariants: A failing or unsuitable destination never stops the remaining ones.
//! Invariants: Setup failures (no config sheet, unreadable source) abort the run.
use serde::{Deserialize, Deserializer};
use tracing::{error, info, warn};

use crate::config::overlay;
use crate::core::a1::{block, column_index};
use crate::core::error::{Error, ErrorKind};
use crate::core::read::{AdaptiveReader, ReadPlan};
use crate::core::retry::{RetryPolicy, with_retry};
use crate::core::rows::{Cell, Row, filter_by_column, looks_like_header, text_row};
use crate::core::sheets::{SheetProperties, Sheets, find_sheet};
use crate::core::write::{ChunkedWriter, WritePlan};

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ReplicateConfig {
    pub origin_id: String,
    /// Tried in order; the first existing title wins.
    pub config_sheet_candidates: Vec<String>,
    pub filter_column: String,
    pub destination_column: String,
    /// 1-based first data row of the config sheet.
    pub start_row: usize,
    pub source_sheet: String,
    pub destination_sheet: String,
    /// Source column compared against each destination's filter value.
    pub match_column: String,
    pub width: usize,
    pub default_header: Vec<String>,
    #[serde(deserialize_with = "replicate_read")]
    pub read: ReadPlan,
    #[serde(deserialize_with = "replicate_write")]
    pub write: WritePlan,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            origin_id: String::new(),
            config_sheet_candidates: ["Config", "BD_Config", "config", "CONFIG"]
                .iter()
                .map(|title| title.to_string())
                .collect(),
            filter_column: "BH".to_string(),
            destination_column: "BI".to_string(),
            start_row: 3,
            source_sheet: "BD_Esteira".to_string(),
            destination_sheet: "BD_Esteira".to_string(),
            match_column: "E".to_string(),
            width: 5,
            default_header: [
                "Projeto",
                "Valor Considerado",
                "Status Esteira",
                "Valor Recebido",
                "Unidade",
            ]
            .iter()
            .map(|title| title.to_string())
            .collect(),
            read: ReadPlan::default().with_last_column("E"),
            write: WritePlan::default().with_chunk_rows(1500),
        }
    }
}

fn replicate_read<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ReadPlan, D::Error> {
    overlay(ReplicateConfig::default().read, deserializer)
}

fn replicate_write<'de, D: Deserializer<'de>>(deserializer: D) -> Result<WritePlan, D::Error> {
    overlay(ReplicateConfig::default().write, deserializer)
}

/// One configured destination: a row of the config sheet with a non-empty id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Destination {
    /// 1-based row of the config sheet the pair came from.
    pub row: usize,
    pub filter: String,
    pub spreadsheet_id: String,
}

#[derive(Debug)]
pub enum DestinationStatus {
    Written { rows: usize, chunks: usize },
    Skipped { reason: String },
    Failed { error: Error },
}

impl DestinationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationStatus::Written { .. } => "written",
            DestinationStatus::Skipped { .. } => "skipped",
            DestinationStatus::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug)]
pub struct DestinationOutcome {
    pub destination: Destination,
    pub status: DestinationStatus,
}

#[derive(Debug, Default)]
pub struct ReplicateReport {
    pub config_sheet: Option<String>,
    /// Source rows excluding a detected header.
    pub source_rows: usize,
    pub has_header: bool,
    pub destinations: Vec<DestinationOutcome>,
}

impl ReplicateReport {
    pub fn written(&self) -> usize {
        self.count(|status| matches!(status, DestinationStatus::Written { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|status| matches!(status, DestinationStatus::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|status| matches!(status, DestinationStatus::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&DestinationStatus) -> bool) -> usize {
        self.destinations
            .iter()
            .filter(|outcome| pred(&outcome.status))
            .count()
    }
}

pub fn run_replicate<S: Sheets + ?Sized>(
    sheets: &S,
    retry: &RetryPolicy,
    config: &ReplicateConfig,
) -> Result<ReplicateReport, Error> {
    if config.origin_id.trim().is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("origin_id is not configured")
            .with_hint("Set it in the --config file or pass --origin."));
    }
    let match_index = column_index(&config.match_column)?;
    if match_index > config.width {
        return Err(Error::new(ErrorKind::Usage).with_message(format!(
            "match column {} is outside the {}-column output",
            config.match_column, config.width
        )));
    }

    let config_sheet = find_config_sheet(sheets, retry, config)?;
    info!(
        "config sheet '{}' ({} rows x {} columns)",
        config_sheet.title, config_sheet.row_count, config_sheet.column_count
    );

    let destinations = read_destinations(sheets, retry, config, &config_sheet)?;
    let mut report = ReplicateReport {
        config_sheet: Some(config_sheet.title.clone()),
        ..ReplicateReport::default()
    };
    if destinations.is_empty() {
        info!(
            "no destinations in {}:{} from row {}; nothing to do",
            config.filter_column, config.destination_column, config.start_row
        );
        return Ok(report);
    }
    info!("{} destinations configured", destinations.len());

    let source = AdaptiveReader::new(sheets, retry, &config.read)
        .read(&config.origin_id, &config.source_sheet)?;
    if source.rows.is_empty() {
        warn!("source '{}' is empty; nothing to do", config.source_sheet);
        return Ok(report);
    }
    report.has_header = looks_like_header(&source.rows[0]);
    report.source_rows = source.rows.len() - usize::from(report.has_header);
    info!(
        "source loaded: {} rows ({})",
        report.source_rows,
        if report.has_header { "with header" } else { "no header" }
    );

    for destination in destinations {
        let result = replicate_one(
            sheets,
            retry,
            config,
            &source.rows,
            match_index - 1,
            &destination,
        );
        let status = match result {
            Ok(status) => status,
            Err(err) => {
                error!(
                    "destination {} (row {}) failed: {err}",
                    destination.spreadsheet_id, destination.row
                );
                DestinationStatus::Failed { error: err }
            }
        };
        report.destinations.push(DestinationOutcome {
            destination,
            status,
        });
    }

    info!(
        "replication finished: {} written, {} skipped, {} failed",
        report.written(),
        report.skipped(),
        report.failed()
    );
    Ok(report)
}

/// First candidate title present in the origin spreadsheet.
pub fn find_config_sheet<S: Sheets + ?Sized>(
    sheets: &S,
    retry: &RetryPolicy,
    config: &ReplicateConfig,
) -> Result<SheetProperties, Error> {
    let props = with_retry(retry, "read origin metadata", || {
        sheets.sheet_properties(&config.origin_id)
    })?;
    config
        .config_sheet_candidates
        .iter()
        .find_map(|title| find_sheet(&props, title).cloned())
        .ok_or_else(|| {
            let available: Vec<&str> = props.iter().map(|p| p.title.as_str()).collect();
            Error::new(ErrorKind::Structure)
                .with_message(format!(
                    "no config sheet found (tried {}; available: {})",
                    config.config_sheet_candidates.join(", "),
                    available.join(", ")
                ))
                .with_spreadsheet(config.origin_id.clone())
        })
}

/// Reads the filter/id column pair from `start_row` to the sheet's last row.
///
/// Pairs are zipped by row; a missing cell on either side reads as empty,
/// and rows with an empty destination id are dropped.
pub fn read_destinations<S: Sheets + ?Sized>(
    sheets: &S,
    retry: &RetryPolicy,
    config: &ReplicateConfig,
    config_sheet: &SheetProperties,
) -> Result<Vec<Destination>, Error> {
    let needed = column_index(&config.filter_column)?.max(column_index(&config.destination_column)?);
    if (config_sheet.column_count as usize) < needed {
        return Err(Error::new(ErrorKind::Structure)
            .with_message(format!(
                "config sheet '{}' has {} columns; {}:{} are required",
                config_sheet.title,
                config_sheet.column_count,
                config.filter_column,
                config.destination_column
            ))
            .with_spreadsheet(config.origin_id.clone()));
    }

    let last_row = (config_sheet.row_count as usize).max(config.start_row + 1);
    let ranges = vec![
        block(
            &config_sheet.title,
            &config.filter_column,
            config.start_row,
            &config.filter_column,
            last_row,
        ),
        block(
            &config_sheet.title,
            &config.destination_column,
            config.start_row,
            &config.destination_column,
            last_row,
        ),
    ];
    let desc = format!(
        "read config {}:{}",
        config.filter_column, config.destination_column
    );
    let mut columns = with_retry(retry, &desc, || {
        sheets.batch_get_values(&config.origin_id, &ranges)
    })?
    .into_iter();
    let filters = columns.next().unwrap_or_default();
    let ids = columns.next().unwrap_or_default();

    let first_cell = |rows: &[Row], idx: usize| -> String {
        rows.get(idx)
            .and_then(|row| row.first())
            .map(|cell| cell.trim().to_string())
            .unwrap_or_default()
    };
    let destinations = (0..filters.len().max(ids.len()))
        .filter_map(|idx| {
            let spreadsheet_id = first_cell(&ids, idx);
            if spreadsheet_id.is_empty() {
                return None;
            }
            Some(Destination {
                row: config.start_row + idx,
                filter: first_cell(&filters, idx),
                spreadsheet_id,
            })
        })
        .collect();
    Ok(destinations)
}

fn replicate_one<S: Sheets + ?Sized>(
    sheets: &S,
    retry: &RetryPolicy,
    config: &ReplicateConfig,
    source: &[Row],
    match_index: usize,
    destination: &Destination,
) -> Result<DestinationStatus, Error> {
    let label = if destination.filter.is_empty() {
        "(empty)"
    } else {
        destination.filter.as_str()
    };
    info!(
        "row {}: {} == '{label}' -> {}",
        destination.row, config.match_column, destination.spreadsheet_id
    );

    let props = with_retry(retry, "read destination metadata", || {
        sheets.sheet_properties(&destination.spreadsheet_id)
    })?;
    if find_sheet(&props, &config.destination_sheet).is_none() {
        let reason = format!("no sheet named '{}'", config.destination_sheet);
        warn!("{}: {reason}; skipping", destination.spreadsheet_id);
        return Ok(DestinationStatus::Skipped { reason });
    }

    let rows = filter_by_column(
        source,
        match_index,
        &destination.filter,
        config.width,
        &config.default_header,
    );
    info!("{} matching rows (plus header)", rows.len().saturating_sub(1));
    let cells: Vec<Vec<Cell>> = rows.into_iter().map(text_row).collect();
    let written = ChunkedWriter::new(sheets, retry, &config.write).write(
        &destination.spreadsheet_id,
        &config.destination_sheet,
        &cells,
    )?;
    Ok(DestinationStatus::Written {
        rows: written.rows_written,
        chunks: written.chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::{ReplicateConfig, find_config_sheet, read_destinations};
    use crate::api::memory::MemorySheets;
    use crate::core::error::ErrorKind;
    use crate::core::retry::RetryPolicy;

    fn config() -> ReplicateConfig {
        ReplicateConfig {
            origin_id: "origin".to_string(),
            ..ReplicateConfig::default()
        }
    }

    fn config_rows(pairs: &[(&str, &str)]) -> Vec<Vec<String>> {
        // Two header rows, then BH/BI pairs starting at row 3.
        let mut rows = vec![Vec::new(), Vec::new()];
        for (filter, id) in pairs {
            let mut row = vec![String::new(); 61];
            row[59] = filter.to_string();
            row[60] = id.to_string();
            rows.push(row);
        }
        rows
    }

    #[test]
    fn config_sheet_candidates_are_tried_in_order() {
        let sheets = MemorySheets::new();
        sheets.add_sheet("origin", "config", Vec::new());
        sheets.add_sheet("origin", "BD_Config", Vec::new());
        let found = find_config_sheet(&sheets, &RetryPolicy::immediate(1), &config()).expect("found");
        assert_eq!(found.title, "BD_Config");
    }

    #[test]
    fn missing_config_sheet_is_structural() {
        let sheets = MemorySheets::new();
        sheets.add_sheet("origin", "Other", Vec::new());
        sheets.add_sheet("origin", "BD_Esteira", Vec::new());
        let err = find_config_sheet(&sheets, &RetryPolicy::immediate(1), &config()).expect_err("none");
        assert_eq!(err.kind(), ErrorKind::Structure);
        let message = err.message().unwrap_or_default();
        assert!(message.contains("tried Config, BD_Config"), "{message}");
        assert!(message.contains("available: Other, BD_Esteira"), "{message}");
    }

    #[test]
    fn missing_origin_hint_names_the_flag() {
        let sheets = MemorySheets::new();
        let cfg = ReplicateConfig::default();
        let err = super::run_replicate(&sheets, &RetryPolicy::immediate(1), &cfg).expect_err("usage");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err.hint().unwrap_or_default().contains("--origin."));
    }

    #[test]
    fn destinations_skip_empty_ids_and_keep_empty_filters() {
        let sheets = MemorySheets::new();
        sheets.add_sheet_with_grid(
            "origin",
            "Config",
            config_rows(&[("X", "dest-1"), ("Y", ""), ("", "dest-3"), (" Z ", " dest-4 ")]),
            1000,
            61,
        );
        let cfg = config();
        let props = sheets.properties("origin", "Config").expect("props");
        let destinations =
            read_destinations(&sheets, &RetryPolicy::immediate(1), &cfg, &props).expect("read");
        let summary: Vec<(usize, &str, &str)> = destinations
            .iter()
            .map(|dest| (dest.row, dest.filter.as_str(), dest.spreadsheet_id.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![(3, "X", "dest-1"), (5, "", "dest-3"), (6, "Z", "dest-4")]
        );
    }

    #[test]
    fn narrow_config_sheet_is_structural() {
        let sheets = MemorySheets::new();
        sheets.add_sheet_with_grid("origin", "Config", Vec::new(), 1000, 26);
        let cfg = config();
        let props = sheets.properties("origin", "Config").expect("props");
        let err = read_destinations(&sheets, &RetryPolicy::immediate(1), &cfg, &props)
            .expect_err("narrow");
        assert_eq!(err.kind(), ErrorKind::Structure);
    }
}
