//! Purpose: In-memory `Sheets` backend with call recording and fault injection.
//! Exports: `MemorySheets`, `Fault`, `Op`, `Call`.
//! Role: Offline stand-in for the HTTP client; drives the read/write loops and jobs in tests.
//! Invariants: Reads mimic the values API: trailing blank cells and trailing blank rows are omitted.
//! Invariants: Writes outside the sheet grid fail the way the API does ("exceeds grid limits").
use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::core::a1::column_index;
use crate::core::error::{Error, ErrorKind};
use crate::core::rows::{Cell, Row};
use crate::core::sheets::{SheetProperties, Sheets, ValueInput};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Op {
    Get,
    BatchGet,
    Clear,
    Update,
    Properties,
    Resize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Call {
    pub op: Op,
    pub spreadsheet: String,
    pub range: String,
}

/// Makes matching calls fail with `kind`, `times` times (forever when unset).
#[derive(Clone, Debug)]
pub struct Fault {
    op: Op,
    kind: ErrorKind,
    spreadsheet: Option<String>,
    range: Option<String>,
    remaining: Option<usize>,
}

impl Fault {
    pub fn new(op: Op, kind: ErrorKind) -> Self {
        Self {
            op,
            kind,
            spreadsheet: None,
            range: None,
            remaining: None,
        }
    }

    pub fn on_spreadsheet(mut self, spreadsheet: impl Into<String>) -> Self {
        self.spreadsheet = Some(spreadsheet.into());
        self
    }

    /// Matches any range containing `fragment`.
    pub fn on_range(mut self, fragment: impl Into<String>) -> Self {
        self.range = Some(fragment.into());
        self
    }

    pub fn times(mut self, count: usize) -> Self {
        self.remaining = Some(count);
        self
    }

    fn matches(&self, call: &Call) -> bool {
        self.op == call.op
            && self.remaining != Some(0)
            && self
                .spreadsheet
                .as_ref()
                .is_none_or(|id| *id == call.spreadsheet)
            && self
                .range
                .as_ref()
                .is_none_or(|fragment| call.range.contains(fragment.as_str()))
    }
}

struct MemorySheet {
    properties: SheetProperties,
    values: Vec<Row>,
}

#[derive(Default)]
struct State {
    books: BTreeMap<String, Vec<MemorySheet>>,
    calls: Vec<Call>,
    faults: Vec<Fault>,
    next_sheet_id: i64,
}

#[derive(Default)]
pub struct MemorySheets {
    state: RefCell<State>,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sheet with a grid of at least 1000 x 26, like a fresh spreadsheet tab.
    pub fn add_sheet(&self, spreadsheet_id: &str, title: &str, values: Vec<Row>) {
        let rows = (values.len() as u64).max(1000);
        let columns = values.iter().map(Vec::len).max().unwrap_or(0).max(26) as u64;
        self.add_sheet_with_grid(spreadsheet_id, title, values, rows, columns);
    }

    pub fn add_sheet_with_grid(
        &self,
        spreadsheet_id: &str,
        title: &str,
        values: Vec<Row>,
        row_count: u64,
        column_count: u64,
    ) {
        let mut state = self.state.borrow_mut();
        state.next_sheet_id += 1;
        let sheet_id = state.next_sheet_id;
        state
            .books
            .entry(spreadsheet_id.to_string())
            .or_default()
            .push(MemorySheet {
                properties: SheetProperties {
                    sheet_id,
                    title: title.to_string(),
                    row_count,
                    column_count,
                },
                values,
            });
    }

    pub fn inject(&self, fault: Fault) {
        self.state.borrow_mut().faults.push(fault);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn calls_of(&self, op: Op) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|call| call.op == op)
            .count()
    }

    pub fn ranges_of(&self, op: Op) -> Vec<String> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|call| call.op == op)
            .map(|call| call.range.clone())
            .collect()
    }

    /// Contents of a sheet as a full-range read would return them.
    pub fn values(&self, spreadsheet_id: &str, title: &str) -> Vec<Row> {
        let state = self.state.borrow();
        state
            .books
            .get(spreadsheet_id)
            .and_then(|sheets| sheets.iter().find(|sheet| sheet.properties.title == title))
            .map(|sheet| visible(sheet.values.iter().cloned()))
            .unwrap_or_default()
    }

    pub fn properties(&self, spreadsheet_id: &str, title: &str) -> Option<SheetProperties> {
        let state = self.state.borrow();
        state
            .books
            .get(spreadsheet_id)?
            .iter()
            .find(|sheet| sheet.properties.title == title)
            .map(|sheet| sheet.properties.clone())
    }

    fn record(&self, op: Op, spreadsheet_id: &str, range: &str) -> Result<(), Error> {
        let mut state = self.state.borrow_mut();
        let call = Call {
            op,
            spreadsheet: spreadsheet_id.to_string(),
            range: range.to_string(),
        };
        let fault = state.faults.iter_mut().find(|fault| fault.matches(&call));
        let injected = fault.map(|fault| {
            if let Some(remaining) = fault.remaining.as_mut() {
                *remaining -= 1;
            }
            fault.kind
        });
        state.calls.push(call);
        match injected {
            Some(kind) => Err(Error::new(kind)
                .with_message("injected fault")
                .with_spreadsheet(spreadsheet_id)
                .with_range(range)),
            None => Ok(()),
        }
    }

    fn read_range(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Row>, Error> {
        let state = self.state.borrow();
        let sheets = book(&state, spreadsheet_id)?;
        let area = Area::parse(range)?;
        let sheet = sheets
            .iter()
            .find(|sheet| sheet.properties.title == area.sheet)
            .ok_or_else(|| unparsable(range))?;

        let first_row = area.first_row.unwrap_or(1).max(1) - 1;
        let last_row = area
            .last_row
            .unwrap_or(sheet.values.len())
            .min(sheet.values.len());
        let rows = (first_row..last_row).map(|idx| {
            let row = &sheet.values[idx];
            let start = (area.first_col - 1).min(row.len());
            let end = area.last_col.min(row.len());
            row[start..end.max(start)].to_vec()
        });
        Ok(visible(rows))
    }
}

impl Sheets for MemorySheets {
    fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Row>, Error> {
        self.record(Op::Get, spreadsheet_id, range)?;
        self.read_range(spreadsheet_id, range)
    }

    fn batch_get_values(
        &self,
        spreadsheet_id: &str,
        ranges: &[String],
    ) -> Result<Vec<Vec<Row>>, Error> {
        self.record(Op::BatchGet, spreadsheet_id, &ranges.join(","))?;
        ranges
            .iter()
            .map(|range| self.read_range(spreadsheet_id, range))
            .collect()
    }

    fn clear_values(&self, spreadsheet_id: &str, range: &str) -> Result<(), Error> {
        self.record(Op::Clear, spreadsheet_id, range)?;
        let area = Area::parse(range)?;
        let mut state = self.state.borrow_mut();
        let sheet = sheet_mut(&mut state, spreadsheet_id, &area.sheet, range)?;
        let first_row = area.first_row.unwrap_or(1).max(1) - 1;
        let last_row = area
            .last_row
            .unwrap_or(sheet.values.len())
            .min(sheet.values.len());
        for row in sheet.values[first_row.min(last_row)..last_row].iter_mut() {
            let end = area.last_col.min(row.len());
            for cell in row.iter_mut().take(end).skip(area.first_col - 1) {
                cell.clear();
            }
        }
        Ok(())
    }

    fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: &[Vec<Cell>],
        _input: ValueInput,
    ) -> Result<(), Error> {
        self.record(Op::Update, spreadsheet_id, range)?;
        let area = Area::parse(range)?;
        let mut state = self.state.borrow_mut();
        let sheet = sheet_mut(&mut state, spreadsheet_id, &area.sheet, range)?;

        let start_row = area.first_row.unwrap_or(1).max(1) - 1;
        let start_col = area.first_col - 1;
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        if (start_row + rows.len()) as u64 > sheet.properties.row_count
            || (start_col + width) as u64 > sheet.properties.column_count
        {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("Range ({range}) exceeds grid limits"))
                .with_spreadsheet(spreadsheet_id)
                .with_range(range));
        }

        if sheet.values.len() < start_row + rows.len() {
            sheet.values.resize(start_row + rows.len(), Vec::new());
        }
        for (offset, cells) in rows.iter().enumerate() {
            let target = &mut sheet.values[start_row + offset];
            if target.len() < start_col + cells.len() {
                target.resize(start_col + cells.len(), String::new());
            }
            for (col, cell) in cells.iter().enumerate() {
                target[start_col + col] = render(cell);
            }
        }
        Ok(())
    }

    fn sheet_properties(&self, spreadsheet_id: &str) -> Result<Vec<SheetProperties>, Error> {
        self.record(Op::Properties, spreadsheet_id, "")?;
        let state = self.state.borrow();
        Ok(book(&state, spreadsheet_id)?
            .iter()
            .map(|sheet| sheet.properties.clone())
            .collect())
    }

    fn resize_sheet(
        &self,
        spreadsheet_id: &str,
        sheet_id: i64,
        row_count: u64,
        column_count: u64,
    ) -> Result<(), Error> {
        self.record(Op::Resize, spreadsheet_id, &sheet_id.to_string())?;
        let mut state = self.state.borrow_mut();
        let sheet = state
            .books
            .get_mut(spreadsheet_id)
            .and_then(|sheets| {
                sheets
                    .iter_mut()
                    .find(|sheet| sheet.properties.sheet_id == sheet_id)
            })
            .ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("No grid with id: {sheet_id}"))
                    .with_spreadsheet(spreadsheet_id)
            })?;
        sheet.properties.row_count = row_count;
        sheet.properties.column_count = column_count;
        Ok(())
    }
}

/// Parsed `Sheet!A1:B2`, `Sheet!A:B` or `Sheet!A5`.
struct Area {
    sheet: String,
    first_col: usize,
    last_col: usize,
    first_row: Option<usize>,
    last_row: Option<usize>,
}

impl Area {
    fn parse(range: &str) -> Result<Self, Error> {
        let (sheet, cells) = range.rsplit_once('!').ok_or_else(|| unparsable(range))?;
        let sheet = sheet.trim_matches('\'').to_string();
        let (start, end) = match cells.split_once(':') {
            Some((start, end)) => (start, Some(end)),
            None => (cells, None),
        };
        let (first_col, first_row) = split_cell(start, range)?;
        let (last_col, last_row) = match end {
            Some(end) => split_cell(end, range)?,
            None => (first_col, first_row),
        };
        Ok(Self {
            sheet,
            first_col,
            last_col,
            first_row,
            last_row,
        })
    }
}

fn split_cell(cell: &str, range: &str) -> Result<(usize, Option<usize>), Error> {
    let digits_at = cell.find(|ch: char| ch.is_ascii_digit()).unwrap_or(cell.len());
    let (letters, digits) = cell.split_at(digits_at);
    let column = column_index(letters).map_err(|_| unparsable(range))?;
    let row = if digits.is_empty() {
        None
    } else {
        Some(digits.parse::<usize>().map_err(|_| unparsable(range))?)
    };
    Ok((column, row))
}

fn unparsable(range: &str) -> Error {
    Error::new(ErrorKind::Usage)
        .with_message(format!("Unable to parse range: {range}"))
        .with_range(range)
}

fn book<'a>(state: &'a State, spreadsheet_id: &str) -> Result<&'a Vec<MemorySheet>, Error> {
    state.books.get(spreadsheet_id).ok_or_else(|| {
        Error::new(ErrorKind::NotFound)
            .with_message("Requested entity was not found.")
            .with_spreadsheet(spreadsheet_id)
    })
}

fn sheet_mut<'a>(
    state: &'a mut State,
    spreadsheet_id: &str,
    title: &str,
    range: &str,
) -> Result<&'a mut MemorySheet, Error> {
    let sheets = state.books.get_mut(spreadsheet_id).ok_or_else(|| {
        Error::new(ErrorKind::NotFound)
            .with_message("Requested entity was not found.")
            .with_spreadsheet(spreadsheet_id)
    })?;
    sheets
        .iter_mut()
        .find(|sheet| sheet.properties.title == title)
        .ok_or_else(|| unparsable(range))
}

fn visible(rows: impl Iterator<Item = Row>) -> Vec<Row> {
    let mut out: Vec<Row> = rows
        .map(|mut row| {
            while row.last().is_some_and(String::is_empty) {
                row.pop();
            }
            row
        })
        .collect();
    while out.last().is_some_and(Vec::is_empty) {
        out.pop();
    }
    out
}

fn render(cell: &Cell) -> String {
    match cell {
        Cell::Text(text) => text.clone(),
        Cell::Number(number) if number.fract() == 0.0 && number.abs() < 1e15 => {
            format!("{}", *number as i64)
        }
        Cell::Number(number) => number.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Fault, MemorySheets, Op};
    use crate::core::error::ErrorKind;
    use crate::core::rows::Cell;
    use crate::core::sheets::{Sheets, ValueInput};

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|cell| cell.to_string()).collect()
    }

    #[test]
    fn reads_omit_trailing_blanks() {
        let sheets = MemorySheets::new();
        sheets.add_sheet(
            "id",
            "Data",
            vec![row(&["a", "", ""]), row(&[]), row(&["", "b"]), row(&["", ""])],
        );
        let values = sheets.get_values("id", "Data!A:C").expect("values");
        assert_eq!(values, vec![row(&["a"]), row(&[]), row(&["", "b"])]);
        let column_a = sheets.get_values("id", "Data!A:A").expect("column");
        assert_eq!(column_a, vec![row(&["a"])]);
        let block = sheets.get_values("id", "'Data'!B2:C3").expect("block");
        assert_eq!(block, vec![row(&[]), row(&["b"])]);
    }

    #[test]
    fn writes_beyond_grid_fail() {
        let sheets = MemorySheets::new();
        sheets.add_sheet_with_grid("id", "Out", Vec::new(), 2, 2);
        let rows = vec![vec![Cell::from("x")]; 3];
        let err = sheets
            .update_values("id", "Out!A1", &rows, ValueInput::UserEntered)
            .expect_err("grid");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn faults_fire_the_requested_number_of_times() {
        let sheets = MemorySheets::new();
        sheets.add_sheet("id", "Data", vec![row(&["a"])]);
        sheets.inject(Fault::new(Op::Get, ErrorKind::Unavailable).times(1));
        assert!(sheets.get_values("id", "Data!A:A").is_err());
        assert!(sheets.get_values("id", "Data!A:A").is_ok());
        assert_eq!(sheets.calls_of(Op::Get), 2);
    }

    #[test]
    fn numbers_render_like_the_sheet_displays_them() {
        let sheets = MemorySheets::new();
        sheets.add_sheet("id", "Out", Vec::new());
        let rows = vec![vec![Cell::from(3.0), Cell::from(2.5), Cell::from("t")]];
        sheets
            .update_values("id", "Out!B2", &rows, ValueInput::UserEntered)
            .expect("update");
        assert_eq!(
            sheets.values("id", "Out"),
            vec![row(&[]), row(&["", "3", "2.5", "t"])]
        );
    }
}
