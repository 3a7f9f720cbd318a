use super::{SheetsBackend, SpreadsheetInfo, WorksheetInfo};
use crate::error::UploadError;
use crate::excel::{read_sheets, save_sheets};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A local xlsx file standing in for the remote spreadsheet.
///
/// The workbook is read once with calamine and rewritten whole after every change.
pub struct LocalWorkbookBackend {
    path: PathBuf,
    sheets: Vec<(String, Vec<Vec<String>>)>,
}

impl LocalWorkbookBackend {
    pub fn open(path: &Path) -> Result<Self, UploadError> {
        let sheets = if path.exists() {
            read_sheets(path).map_err(|e| UploadError::Workbook(format!("{}: {}", path.display(), e)))?
        } else {
            Vec::new()
        };
        debug!(path = %path.display(), sheets = sheets.len(), "opened local workbook");
        Ok(Self {
            path: path.to_path_buf(),
            sheets,
        })
    }

    fn sheet_mut(&mut self, title: &str) -> Result<&mut Vec<Vec<String>>, UploadError> {
        self.sheets
            .iter_mut()
            .find(|(name, _)| name == title)
            .map(|(_, rows)| rows)
            .ok_or_else(|| UploadError::WorksheetNotFound(title.to_string()))
    }

    fn save(&self) -> Result<(), UploadError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| UploadError::Workbook(format!("{}: {}", parent.display(), e)))?;
        }
        save_sheets(&self.path, &self.sheets)
            .map_err(|e| UploadError::Workbook(format!("{}: {}", self.path.display(), e)))
    }
}

fn trim_trailing_empty(rows: &mut Vec<Vec<String>>) {
    while rows.last().is_some_and(|r| r.iter().all(String::is_empty)) {
        rows.pop();
    }
}

impl SheetsBackend for LocalWorkbookBackend {
    fn spreadsheet_info(&mut self) -> Result<SpreadsheetInfo, UploadError> {
        let title = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("workbook")
            .to_string();
        Ok(SpreadsheetInfo {
            title,
            worksheets: self
                .sheets
                .iter()
                .map(|(name, rows)| WorksheetInfo {
                    title: name.clone(),
                    row_count: rows.len() as u32,
                    column_count: rows.iter().map(Vec::len).max().unwrap_or(0) as u32,
                })
                .collect(),
        })
    }

    fn add_worksheet(&mut self, title: &str, _rows: u32, _cols: u32) -> Result<(), UploadError> {
        if self.sheets.iter().any(|(name, _)| name == title) {
            return Err(UploadError::Api {
                status: 400,
                body: format!("worksheet '{}' already exists", title),
            });
        }
        self.sheets.push((title.to_string(), Vec::new()));
        self.save()
    }

    fn read_values(&mut self, worksheet: &str) -> Result<Vec<Vec<String>>, UploadError> {
        let mut rows = self.sheet_mut(worksheet)?.clone();
        trim_trailing_empty(&mut rows);
        Ok(rows)
    }

    fn update_values(&mut self, worksheet: &str, start_row: u32, rows: &[Vec<String>]) -> Result<(), UploadError> {
        let sheet = self.sheet_mut(worksheet)?;
        let start = start_row.max(1) as usize - 1;
        if sheet.len() < start + rows.len() {
            sheet.resize(start + rows.len(), Vec::new());
        }
        for (i, row) in rows.iter().enumerate() {
            sheet[start + i] = row.clone();
        }
        self.save()
    }

    fn append_rows(&mut self, worksheet: &str, rows: &[Vec<String>]) -> Result<(), UploadError> {
        let sheet = self.sheet_mut(worksheet)?;
        trim_trailing_empty(sheet);
        sheet.extend(rows.iter().cloned());
        self.save()
    }

    fn clear_rows(&mut self, worksheet: &str, from_row: u32) -> Result<(), UploadError> {
        let sheet = self.sheet_mut(worksheet)?;
        sheet.truncate(from_row.max(1) as usize - 1);
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn changes_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("tracker.xlsx");

        let mut backend = LocalWorkbookBackend::open(&path).unwrap();
        assert!(backend.spreadsheet_info().unwrap().worksheets.is_empty());
        backend.add_worksheet("Task Tracker", 1000, 20).unwrap();
        backend.update_values("Task Tracker", 1, &[row(&["Upload Timestamp", "Task"])]).unwrap();
        backend.append_rows("Task Tracker", &[row(&["t1", "Fix sink"]), row(&["t1", "Paint"])]).unwrap();

        let mut reopened = LocalWorkbookBackend::open(&path).unwrap();
        let info = reopened.spreadsheet_info().unwrap();
        assert_eq!(info.title, "tracker");
        assert!(info.has_worksheet("Task Tracker"));
        assert_eq!(reopened.read_values("Task Tracker").unwrap().len(), 3);

        reopened.clear_rows("Task Tracker", 2).unwrap();
        assert_eq!(
            reopened.read_values("Task Tracker").unwrap(),
            vec![row(&["Upload Timestamp", "Task"])]
        );
    }

    #[test]
    fn unknown_worksheet() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = LocalWorkbookBackend::open(&dir.path().join("w.xlsx")).unwrap();
        assert!(matches!(
            backend.read_values("Nope"),
            Err(UploadError::WorksheetNotFound(_))
        ));
        backend.add_worksheet("A", 10, 10).unwrap();
        assert!(backend.add_worksheet("A", 10, 10).is_err());
    }
}
