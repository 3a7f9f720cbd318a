//! Spreadsheet maintenance used by the `sheet_admin` binary.

use crate::config::AppConfig;
use crate::db::Db;
use crate::error::UploadError;
use crate::sheets::{SheetsBackend, NEW_WORKSHEET_COLS, NEW_WORKSHEET_ROWS};
use crate::types::DocumentType;
use crate::uploader::header_row;
use std::fmt::Write as _;
use tracing::info;

const TAIL_ROWS: usize = 5;

/// Every worksheet the configuration writes to, with the document type whose header it carries.
pub fn configured_worksheets(config: &AppConfig) -> Vec<(String, DocumentType)> {
    let mut out: Vec<(String, DocumentType)> = DocumentType::ALL
        .iter()
        .map(|t| (config.worksheet_for("", *t), *t))
        .collect();
    for (image, ws) in &config.ocr.worksheet_overrides {
        if let Some(t) = config.ocr.image_mappings.get(image) {
            if !out.iter().any(|(name, _)| name == ws) {
                out.push((ws.clone(), *t));
            }
        }
    }
    out
}

/// Title, worksheet sizes, and for each shown worksheet its header and last rows.
pub fn status(backend: &mut dyn SheetsBackend, only: Option<&str>) -> Result<String, UploadError> {
    let info = backend.spreadsheet_info()?;
    let mut out = String::new();
    let _ = writeln!(out, "Spreadsheet: {}", info.title);
    let _ = writeln!(out, "Worksheets ({}):", info.worksheets.len());
    for ws in &info.worksheets {
        let _ = writeln!(out, "  {} ({} rows x {} cols)", ws.title, ws.row_count, ws.column_count);
    }

    let shown: Vec<&str> = match only {
        Some(name) => {
            if !info.has_worksheet(name) {
                return Err(UploadError::WorksheetNotFound(name.to_string()));
            }
            vec![name]
        }
        None => info.worksheets.iter().map(|w| w.title.as_str()).collect(),
    };
    for name in shown {
        let rows = backend.read_values(name)?;
        let _ = writeln!(out, "\n[{}] {} data row(s)", name, rows.len().saturating_sub(1));
        match rows.split_first() {
            None => {
                let _ = writeln!(out, "  (empty)");
            }
            Some((header, data)) => {
                let _ = writeln!(out, "  header: {}", header.join(" | "));
                let skip = data.len().saturating_sub(TAIL_ROWS);
                for (i, row) in data.iter().enumerate().skip(skip) {
                    let _ = writeln!(out, "  {:>4}: {}", i + 2, row.join(" | "));
                }
            }
        }
    }
    Ok(out)
}

/// Create missing worksheets and give empty ones a header row. Returns the worksheets created.
pub fn setup(backend: &mut dyn SheetsBackend, worksheets: &[(String, DocumentType)]) -> Result<Vec<String>, UploadError> {
    let info = backend.spreadsheet_info()?;
    let mut created = Vec::new();
    for (name, doc_type) in worksheets {
        if !info.has_worksheet(name) {
            backend.add_worksheet(name, NEW_WORKSHEET_ROWS, NEW_WORKSHEET_COLS)?;
            info!(worksheet = %name, "created worksheet");
            created.push(name.clone());
        }
        if backend.read_values(name)?.is_empty() {
            backend.update_values(name, 1, &[header_row(*doc_type)])?;
        }
    }
    Ok(created)
}

/// Clear data rows (or everything with `include_header`). Returns (worksheet, rows removed).
pub fn clear(
    backend: &mut dyn SheetsBackend,
    worksheets: &[String],
    include_header: bool,
) -> Result<Vec<(String, usize)>, UploadError> {
    let info = backend.spreadsheet_info()?;
    let mut cleared = Vec::new();
    for name in worksheets {
        if !info.has_worksheet(name) {
            return Err(UploadError::WorksheetNotFound(name.clone()));
        }
        let rows = backend.read_values(name)?.len();
        let from_row = if include_header { 1 } else { 2 };
        backend.clear_rows(name, from_row)?;
        let removed = rows.saturating_sub(from_row as usize - 1);
        info!(worksheet = %name, rows = removed, "cleared");
        cleared.push((name.clone(), removed));
    }
    Ok(cleared)
}

/// Latest runs, then the history entries matching `run` and `search`.
pub fn history(db: &Db, run: Option<i64>, search: Option<&str>, limit: usize) -> Result<String, String> {
    let mut out = String::new();
    let runs = db.recent_runs(limit)?;
    let _ = writeln!(out, "Recent runs ({}):", runs.len());
    for (id, started_at, images, records) in &runs {
        let _ = writeln!(
            out,
            "  #{} {} {} image(s), {} record(s)",
            id,
            started_at,
            images.map_or("-".to_string(), |n| n.to_string()),
            records.map_or("-".to_string(), |n| n.to_string()),
        );
    }

    let entries = db.get_history(run, search)?;
    let _ = writeln!(out, "\nHistory ({} entries):", entries.len());
    for e in &entries {
        let _ = write!(
            out,
            "  run {} {} [{}] {} -> {} ({} record(s), {} words, {:.1}% conf)",
            e.run_id,
            e.file_name,
            e.document_type.as_deref().unwrap_or("-"),
            e.status,
            e.worksheet.as_deref().unwrap_or("-"),
            e.record_count,
            e.word_count,
            e.average_confidence,
        );
        match &e.error_message {
            Some(msg) => {
                let _ = writeln!(out, ": {}", msg);
            }
            None => out.push('\n'),
        }
    }
    Ok(out)
}
