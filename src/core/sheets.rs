//! Purpose: The remote spreadsheet seam the read/write loops are generic over.
//! Exports: `Sheets`, `SheetProperties`, `ValueInput`, `find_sheet`.
//! Role: Implemented by the HTTP client and by the in-memory backend.
//! Invariants: Every method is a single remote call; retrying is the caller's job.
use super::error::Error;
use super::rows::{Cell, Row};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SheetProperties {
    pub sheet_id: i64,
    pub title: String,
    pub row_count: u64,
    pub column_count: u64,
}

/// How the API treats written values.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum ValueInput {
    /// Parse like typed into the UI: numeric and date-like text become numbers and dates.
    #[default]
    UserEntered,
    Raw,
}

impl ValueInput {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueInput::UserEntered => "USER_ENTERED",
            ValueInput::Raw => "RAW",
        }
    }
}

pub trait Sheets {
    /// Rows of `range`; trailing blank rows and trailing blank cells are omitted by the API.
    fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Row>, Error>;

    /// One row set per requested range, in request order.
    fn batch_get_values(
        &self,
        spreadsheet_id: &str,
        ranges: &[String],
    ) -> Result<Vec<Vec<Row>>, Error>;

    fn clear_values(&self, spreadsheet_id: &str, range: &str) -> Result<(), Error>;

    fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: &[Vec<Cell>],
        input: ValueInput,
    ) -> Result<(), Error>;

    fn sheet_properties(&self, spreadsheet_id: &str) -> Result<Vec<SheetProperties>, Error>;

    fn resize_sheet(
        &self,
        spreadsheet_id: &str,
        sheet_id: i64,
        row_count: u64,
        column_count: u64,
    ) -> Result<(), Error>;
}

pub fn find_sheet<'a>(sheets: &'a [SheetProperties], title: &str) -> Option<&'a SheetProperties> {
    sheets.iter().find(|sheet| sheet.title == title)
}
