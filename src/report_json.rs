//! Purpose: JSON serializers for job reports printed on stdout.
//! Exports: `export_json`, `replicate_json`, `destination_notice`.
//! Role: Keep the summary envelope shape consistent across commands.
//! Invariants: Stable key names for v0 summaries; fields are additive-only.
//! Invariants: Per-destination detail keys appear only for the matching status.

use serde_json::{Map, Value, json};
use sheetrelay::job::{
    DestinationOutcome, DestinationStatus, ExportConfig, ExportReport, ReplicateConfig,
    ReplicateReport,
};
use sheetrelay::notice::{Notice, notice_time_now};

use crate::error_json;

pub(crate) fn export_json(config: &ExportConfig, report: &ExportReport) -> Value {
    json!({
        "export": {
            "source": config.source_id,
            "source_sheet": config.source_sheet,
            "destination": config.destination_id,
            "destination_sheet": config.destination_sheet,
            "read_path": report.read_path.as_str(),
            "rows_read": report.rows_read,
            "rows_written": report.rows_written,
            "chunks": report.chunks,
        }
    })
}

pub(crate) fn replicate_json(config: &ReplicateConfig, report: &ReplicateReport) -> Value {
    let destinations = report
        .destinations
        .iter()
        .map(destination_json)
        .collect::<Vec<_>>();
    json!({
        "replicate": {
            "origin": config.origin_id,
            "config_sheet": report.config_sheet,
            "source_sheet": config.source_sheet,
            "source_rows": report.source_rows,
            "has_header": report.has_header,
            "written": report.written(),
            "skipped": report.skipped(),
            "failed": report.failed(),
            "destinations": destinations,
        }
    })
}

fn destination_json(outcome: &DestinationOutcome) -> Value {
    let mut map = Map::new();
    map.insert("row".to_string(), json!(outcome.destination.row));
    map.insert("filter".to_string(), json!(outcome.destination.filter));
    map.insert(
        "spreadsheet".to_string(),
        json!(outcome.destination.spreadsheet_id),
    );
    map.insert("status".to_string(), json!(outcome.status.as_str()));
    match &outcome.status {
        DestinationStatus::Written { rows, chunks } => {
            map.insert("rows".to_string(), json!(rows));
            map.insert("chunks".to_string(), json!(chunks));
        }
        DestinationStatus::Skipped { reason } => {
            map.insert("reason".to_string(), json!(reason));
        }
        DestinationStatus::Failed { error } => {
            if let Some(inner) = error_json(error).get("error") {
                map.insert("error".to_string(), inner.clone());
            }
        }
    }
    Value::Object(map)
}

/// Notice for a destination that did not receive data; `None` when it was written.
pub(crate) fn destination_notice(outcome: &DestinationOutcome) -> Option<Notice> {
    let (kind, message) = match &outcome.status {
        DestinationStatus::Written { .. } => return None,
        DestinationStatus::Skipped { reason } => ("destination_skipped", reason.clone()),
        DestinationStatus::Failed { error } => ("destination_failed", error.to_string()),
    };
    let mut details = Map::new();
    details.insert("row".to_string(), json!(outcome.destination.row));
    details.insert("filter".to_string(), json!(outcome.destination.filter));
    if let DestinationStatus::Failed { error } = &outcome.status {
        details.insert("error_kind".to_string(), json!(format!("{:?}", error.kind())));
    }
    Some(Notice {
        kind: kind.to_string(),
        time: notice_time_now(),
        cmd: "replicate".to_string(),
        target: outcome.destination.spreadsheet_id.clone(),
        message,
        details,
    })
}
