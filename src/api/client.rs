//! Purpose: Blocking HTTP client for the Google Sheets v4 values and metadata endpoints.
//! Exports: `SheetsClient`, `ClientOptions`.
//! Role: Production implementation of `Sheets`; one HTTP request per trait call.
//! Invariants: Every request carries a fresh bearer token from the configured `TokenSource`.
//! Invariants: HTTP failures map onto `ErrorKind` so the retry layer can tell transient from permanent.
//! Invariants: Cells come back as strings regardless of the JSON scalar type the API used.
#![allow(clippy::result_large_err)]

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use super::auth::TokenSource;
use crate::core::error::{Error, ErrorKind};
use crate::core::rows::{Cell, Row};
use crate::core::sheets::{SheetProperties, Sheets, ValueInput};

type ApiResult<T> = Result<T, Error>;

pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/";

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ClientOptions {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 600,
        }
    }
}

#[derive(Clone)]
pub struct SheetsClient {
    inner: Arc<SheetsClientInner>,
}

struct SheetsClientInner {
    base_url: Url,
    agent: ureq::Agent,
    tokens: Box<dyn TokenSource>,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchValueRanges {
    #[serde(default)]
    value_ranges: Vec<ValueRange>,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Deserialize)]
struct SheetMeta {
    #[serde(default)]
    properties: SheetMetaProperties,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SheetMetaProperties {
    #[serde(default)]
    sheet_id: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    grid_properties: Option<GridProperties>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    #[serde(default = "default_row_count")]
    row_count: u64,
    #[serde(default = "default_column_count")]
    column_count: u64,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: RemoteError,
}

#[derive(Deserialize)]
struct RemoteError {
    message: Option<String>,
    status: Option<String>,
    #[serde(default)]
    errors: Vec<RemoteErrorDetail>,
}

#[derive(Deserialize)]
struct RemoteErrorDetail {
    reason: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    major_dimension: &'static str,
    values: &'a [Vec<Cell>],
}

fn default_row_count() -> u64 {
    1000
}

fn default_column_count() -> u64 {
    26
}

impl SheetsClient {
    pub fn new(options: &ClientOptions, tokens: Box<dyn TokenSource>) -> ApiResult<Self> {
        let base_url = normalize_base_url(&options.base_url)?;
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(options.timeout_secs))
            .build();
        Ok(Self {
            inner: Arc::new(SheetsClientInner {
                base_url,
                agent,
                tokens,
            }),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    fn values_url(&self, spreadsheet_id: &str, tail: &str) -> ApiResult<Url> {
        build_url(
            &self.inner.base_url,
            &["v4", "spreadsheets", spreadsheet_id, "values", tail],
        )
    }

    fn request_json<T, R>(&self, method: &str, url: &Url, body: Option<&T>) -> ApiResult<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let token = self.inner.tokens.access_token()?;
        let request = self
            .inner
            .agent
            .request(method, url.as_str())
            .set("Accept", "application/json")
            .set("Authorization", &format!("Bearer {token}"));
        debug!("{method} {url}");
        let response = match body {
            None => request.call(),
            Some(body) => {
                let payload = serde_json::to_string(body).map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to encode request json")
                        .with_source(err)
                })?;
                request
                    .set("Content-Type", "application/json")
                    .send_string(&payload)
            }
        };

        match response {
            Ok(resp) => read_json_response(resp),
            Err(ureq::Error::Status(code, resp)) => Err(parse_error_response(code, resp)),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Io)
                .with_message("request failed")
                .with_source(err)),
        }
    }
}

impl Sheets for SheetsClient {
    fn get_values(&self, spreadsheet_id: &str, range: &str) -> ApiResult<Vec<Row>> {
        let mut url = self.values_url(spreadsheet_id, range)?;
        url.query_pairs_mut().append_pair("majorDimension", "ROWS");
        let envelope: ValueRange = self
            .request_json::<(), _>("GET", &url, None)
            .map_err(|err| err.with_spreadsheet(spreadsheet_id).with_range(range))?;
        Ok(rows_from_values(envelope.values))
    }

    fn batch_get_values(&self, spreadsheet_id: &str, ranges: &[String]) -> ApiResult<Vec<Vec<Row>>> {
        let mut url = build_url(
            &self.inner.base_url,
            &["v4", "spreadsheets", spreadsheet_id, "values:batchGet"],
        )?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("majorDimension", "ROWS");
            for range in ranges {
                pairs.append_pair("ranges", range);
            }
        }
        let envelope: BatchValueRanges = self
            .request_json::<(), _>("GET", &url, None)
            .map_err(|err| err.with_spreadsheet(spreadsheet_id))?;
        let mut out: Vec<Vec<Row>> = envelope
            .value_ranges
            .into_iter()
            .map(|range| rows_from_values(range.values))
            .collect();
        out.resize(ranges.len(), Vec::new());
        Ok(out)
    }

    fn clear_values(&self, spreadsheet_id: &str, range: &str) -> ApiResult<()> {
        let url = self.values_url(spreadsheet_id, &format!("{range}:clear"))?;
        let _value: Value = self
            .request_json("POST", &url, Some(&json!({})))
            .map_err(|err| err.with_spreadsheet(spreadsheet_id).with_range(range))?;
        Ok(())
    }

    fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: &[Vec<Cell>],
        input: ValueInput,
    ) -> ApiResult<()> {
        let mut url = self.values_url(spreadsheet_id, range)?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", input.as_str());
        let payload = UpdateRequest {
            major_dimension: "ROWS",
            values: rows,
        };
        let _value: Value = self
            .request_json("PUT", &url, Some(&payload))
            .map_err(|err| err.with_spreadsheet(spreadsheet_id).with_range(range))?;
        Ok(())
    }

    fn sheet_properties(&self, spreadsheet_id: &str) -> ApiResult<Vec<SheetProperties>> {
        let mut url = build_url(&self.inner.base_url, &["v4", "spreadsheets", spreadsheet_id])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties");
        let meta: SpreadsheetMeta = self
            .request_json::<(), _>("GET", &url, None)
            .map_err(|err| err.with_spreadsheet(spreadsheet_id))?;
        Ok(meta
            .sheets
            .into_iter()
            .map(|sheet| {
                let grid = sheet.properties.grid_properties.unwrap_or(GridProperties {
                    row_count: default_row_count(),
                    column_count: default_column_count(),
                });
                SheetProperties {
                    sheet_id: sheet.properties.sheet_id,
                    title: sheet.properties.title,
                    row_count: grid.row_count,
                    column_count: grid.column_count,
                }
            })
            .collect())
    }

    fn resize_sheet(
        &self,
        spreadsheet_id: &str,
        sheet_id: i64,
        row_count: u64,
        column_count: u64,
    ) -> ApiResult<()> {
        let url = build_url(
            &self.inner.base_url,
            &[
                "v4",
                "spreadsheets",
                &format!("{spreadsheet_id}:batchUpdate"),
            ],
        )?;
        let payload = json!({
            "requests": [{
                "updateSheetProperties": {
                    "properties": {
                        "sheetId": sheet_id,
                        "gridProperties": {
                            "rowCount": row_count,
                            "columnCount": column_count,
                        }
                    },
                    "fields": "gridProperties.rowCount,gridProperties.columnCount",
                }
            }]
        });
        let _value: Value = self
            .request_json("POST", &url, Some(&payload))
            .map_err(|err| err.with_spreadsheet(spreadsheet_id))?;
        Ok(())
    }
}

fn normalize_base_url(raw: &str) -> ApiResult<Url> {
    let mut url = Url::parse(raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid api base url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("api base url must use http or https scheme"));
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("api base url must not include a path"));
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn build_url(base_url: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            Error::new(ErrorKind::Usage).with_message("api base url cannot be a base")
        })?;
        path.clear();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

fn read_json_response<R>(response: ureq::Response) -> ApiResult<R>
where
    R: DeserializeOwned,
{
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("invalid response json")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    let mut kind = error_kind_from_status(status);
    let mut err_message = format!("remote error status {status}");
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
        let remote = envelope.error;
        if is_rate_limit(&remote) {
            kind = ErrorKind::RateLimited;
        }
        if let Some(message) = remote.message {
            err_message = message;
        }
    }
    Error::new(kind).with_message(err_message).with_status(status)
}

/// Quota errors sometimes arrive as 403 with a rate-limit reason.
fn is_rate_limit(remote: &RemoteError) -> bool {
    remote.status.as_deref() == Some("RESOURCE_EXHAUSTED")
        || remote.errors.iter().any(|detail| {
            detail
                .reason
                .as_deref()
                .is_some_and(|reason| reason.to_ascii_lowercase().contains("ratelimit"))
        })
}

fn error_kind_from_status(status: u16) -> ErrorKind {
    match status {
        400 | 413 => ErrorKind::Usage,
        401 => ErrorKind::Auth,
        403 => ErrorKind::Permission,
        404 => ErrorKind::NotFound,
        408 => ErrorKind::Io,
        429 => ErrorKind::RateLimited,
        500..=599 => ErrorKind::Unavailable,
        _ => ErrorKind::Internal,
    }
}

fn rows_from_values(values: Vec<Vec<Value>>) -> Vec<Row> {
    values
        .into_iter()
        .map(|row| row.into_iter().map(cell_text).collect())
        .collect()
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        other => other.to_string(),
    }
}
