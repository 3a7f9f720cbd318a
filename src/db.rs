use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;

/// Run history kept next to the extracted data (`history.db`).
pub struct Db {
    conn: Mutex<Connection>,
}

/// One image outcome as stored in the history table.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: i64,
    pub run_id: i64,
    pub created_at: String,
    pub document_type: Option<String>,
    pub file_name: String,
    pub worksheet: Option<String>,
    pub status: String,
    pub record_count: i64,
    pub word_count: i64,
    pub average_confidence: f64,
    pub extracted_data: String,
    pub error_message: Option<String>,
}

/// Everything `add_history_record` stores for one image.
pub struct NewHistory<'a> {
    pub run_id: i64,
    pub document_type: Option<&'a str>,
    pub file_name: &'a str,
    pub worksheet: Option<&'a str>,
    pub status: &'a str,
    pub record_count: usize,
    pub word_count: usize,
    pub average_confidence: f64,
    pub extracted_data: &'a Value,
    pub error_message: Option<&'a str>,
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY,
        applied_at TEXT DEFAULT CURRENT_TIMESTAMP
    );
    INSERT INTO schema_version (version) SELECT 1 WHERE NOT EXISTS (SELECT 1 FROM schema_version LIMIT 1);
    CREATE TABLE IF NOT EXISTS runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        started_at TEXT NOT NULL,
        finished_at TEXT,
        upload_requested INTEGER NOT NULL,
        upload_mode TEXT NOT NULL,
        images INTEGER,
        records INTEGER
    );
    CREATE TABLE IF NOT EXISTS history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        document_type TEXT,
        file_name TEXT NOT NULL,
        worksheet TEXT,
        status TEXT NOT NULL,
        record_count INTEGER NOT NULL,
        word_count INTEGER NOT NULL,
        average_confidence REAL NOT NULL,
        extracted_data TEXT NOT NULL,
        error_message TEXT,
        FOREIGN KEY (run_id) REFERENCES runs(id)
    );
    CREATE INDEX IF NOT EXISTS idx_history_run ON history(run_id);
";

impl Db {
    pub fn new(db_path: &Path) -> Result<Self, String> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let conn = Connection::open(db_path).map_err(|e| e.to_string())?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, String> {
        let conn = Connection::open_in_memory().map_err(|e| e.to_string())?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, String> {
        conn.execute_batch(SCHEMA).map_err(|e| e.to_string())?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn start_run(&self, upload_requested: bool, upload_mode: &str) -> Result<i64, String> {
        let started_at = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO runs (started_at, upload_requested, upload_mode) VALUES (?, ?, ?)",
            params![started_at, upload_requested, upload_mode],
        )
        .map_err(|e| e.to_string())?;
        Ok(conn.last_insert_rowid())
    }

    pub fn finish_run(&self, run_id: i64, images: usize, records: usize) -> Result<(), String> {
        let finished_at = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE runs SET finished_at = ?, images = ?, records = ? WHERE id = ?",
            params![finished_at, images as i64, records as i64, run_id],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn add_history_record(&self, entry: &NewHistory<'_>) -> Result<i64, String> {
        let created_at = chrono::Utc::now().to_rfc3339();
        let data_str = serde_json::to_string(entry.extracted_data).map_err(|e| e.to_string())?;
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO history (run_id, created_at, document_type, file_name, worksheet, status, record_count, word_count, average_confidence, extracted_data, error_message) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                entry.run_id,
                created_at,
                entry.document_type,
                entry.file_name,
                entry.worksheet,
                entry.status,
                entry.record_count as i64,
                entry.word_count as i64,
                entry.average_confidence,
                data_str,
                entry.error_message
            ],
        )
        .map_err(|e| e.to_string())?;
        Ok(conn.last_insert_rowid())
    }

    /// History rows, newest first. `run_id` narrows to one run; `search` matches file name or extracted data.
    pub fn get_history(&self, run_id: Option<i64>, search: Option<&str>) -> Result<Vec<HistoryEntry>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let base = "SELECT id, run_id, created_at, document_type, file_name, worksheet, status, record_count, word_count, average_confidence, extracted_data, error_message FROM history";
        let pattern = search.map(|s| format!("%{}%", s));
        let mut stmt = conn
            .prepare(&format!(
                "{} WHERE (?1 IS NULL OR run_id = ?1) AND (?2 IS NULL OR file_name LIKE ?2 OR extracted_data LIKE ?2) ORDER BY id DESC",
                base
            ))
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map(params![run_id, pattern], |row| {
                Ok(HistoryEntry {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    created_at: row.get(2)?,
                    document_type: row.get(3)?,
                    file_name: row.get(4)?,
                    worksheet: row.get(5)?,
                    status: row.get(6)?,
                    record_count: row.get(7)?,
                    word_count: row.get(8)?,
                    average_confidence: row.get(9)?,
                    extracted_data: row.get(10)?,
                    error_message: row.get(11)?,
                })
            })
            .map_err(|e| e.to_string())?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| e.to_string())?);
        }
        Ok(out)
    }

    /// (run id, started_at, images, records) for the latest runs.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<(i64, String, Option<i64>, Option<i64>)>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let mut stmt = conn
            .prepare("SELECT id, started_at, images, records FROM runs ORDER BY id DESC LIMIT ?")
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map(params![limit as i64], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
            .map_err(|e| e.to_string())?;
        let out: Vec<_> = rows.filter_map(|r| r.ok()).collect();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry<'a>(run_id: i64, file: &'a str, status: &'a str, data: &'a Value) -> NewHistory<'a> {
        NewHistory {
            run_id,
            document_type: Some("financial"),
            file_name: file,
            worksheet: Some("Budget & Expenses"),
            status,
            record_count: 2,
            word_count: 14,
            average_confidence: 87.5,
            extracted_data: data,
            error_message: None,
        }
    }

    #[test]
    fn records_runs_and_history() {
        let db = Db::open_in_memory().unwrap();
        let run = db.start_run(true, "append").unwrap();
        let data = json!([{ "description": "Paint supplies" }]);
        db.add_history_record(&entry(run, "financial_notes.jpg", "uploaded", &data)).unwrap();
        db.add_history_record(&NewHistory {
            document_type: None,
            worksheet: None,
            record_count: 0,
            error_message: Some("no document type mapping"),
            ..entry(run, "unknown.jpg", "skipped (unmapped)", &json!([]))
        })
        .unwrap();
        db.finish_run(run, 2, 2).unwrap();

        let all = db.get_history(Some(run), None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].file_name, "unknown.jpg");
        assert_eq!(all[0].document_type, None);
        assert_eq!(all[1].average_confidence, 87.5);

        let found = db.get_history(None, Some("Paint")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].status, "uploaded");

        let runs = db.recent_runs(5).unwrap();
        assert_eq!(runs[0].0, run);
        assert_eq!(runs[0].2, Some(2));
    }

    #[test]
    fn file_database_is_created_with_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.db");
        let db = Db::new(&path).unwrap();
        db.start_run(false, "append").unwrap();
        assert!(path.exists());
        drop(db);
        let reopened = Db::new(&path).unwrap();
        assert_eq!(reopened.recent_runs(10).unwrap().len(), 1);
    }
}
