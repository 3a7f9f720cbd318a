//! Spreadsheet backends the uploader writes through.

pub mod google;
pub mod workbook;

use crate::error::UploadError;

pub use google::GoogleSheetsClient;
pub use workbook::LocalWorkbookBackend;

/// Grid size used when a worksheet has to be created.
pub const NEW_WORKSHEET_ROWS: u32 = 1000;
pub const NEW_WORKSHEET_COLS: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorksheetInfo {
    pub title: String,
    pub row_count: u32,
    pub column_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadsheetInfo {
    pub title: String,
    pub worksheets: Vec<WorksheetInfo>,
}

impl SpreadsheetInfo {
    pub fn has_worksheet(&self, title: &str) -> bool {
        self.worksheets.iter().any(|w| w.title == title)
    }
}

/// Named-worksheet row operations. Rows are 1-based, row 1 holds the header.
pub trait SheetsBackend {
    fn spreadsheet_info(&mut self) -> Result<SpreadsheetInfo, UploadError>;

    fn add_worksheet(&mut self, title: &str, rows: u32, cols: u32) -> Result<(), UploadError>;

    /// Every non-empty row of the worksheet, header included.
    fn read_values(&mut self, worksheet: &str) -> Result<Vec<Vec<String>>, UploadError>;

    /// Overwrite cells starting at column A of `start_row`.
    fn update_values(&mut self, worksheet: &str, start_row: u32, rows: &[Vec<String>]) -> Result<(), UploadError>;

    /// Add rows after the last non-empty row.
    fn append_rows(&mut self, worksheet: &str, rows: &[Vec<String>]) -> Result<(), UploadError>;

    /// Blank every row from `from_row` down. `from_row == 1` clears the header too.
    fn clear_rows(&mut self, worksheet: &str, from_row: u32) -> Result<(), UploadError>;
}

/// A1 reference for a worksheet, quoting the title: `'Budget & Expenses'!A2`.
pub fn a1_range(worksheet: &str, cells: &str) -> String {
    let quoted = format!("'{}'", worksheet.replace('\'', "''"));
    if cells.is_empty() {
        quoted
    } else {
        format!("{}!{}", quoted, cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_titles() {
        assert_eq!(a1_range("Task Tracker", "A1"), "'Task Tracker'!A1");
        assert_eq!(a1_range("Mom's List", "A2:ZZ"), "'Mom''s List'!A2:ZZ");
        assert_eq!(a1_range("Budget", ""), "'Budget'");
    }
}
