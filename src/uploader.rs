//! Worksheet upload with append/replace semantics and retry on transient failures.

use crate::config::{Backoff, UploadConfig};
use crate::error::UploadError;
use crate::sheets::{SheetsBackend, NEW_WORKSHEET_COLS, NEW_WORKSHEET_ROWS};
use crate::types::{DocumentType, Record, UploadMode};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const TIMESTAMP_HEADER: &str = "Upload Timestamp";

/// Source of upload timestamps and of the pause between retries.
pub trait Clock {
    fn timestamp(&self) -> String;
    fn sleep(&self, delay: Duration);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn timestamp(&self) -> String {
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
    }

    fn sleep(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per operation, first try included.
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            delay: config.retry_delay(),
            backoff: config.backoff,
        }
    }

    /// Pause after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => self.delay.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1))),
        }
    }
}

/// What one `upload` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub worksheet: String,
    pub rows_written: usize,
    pub created_worksheet: bool,
    pub cleared: bool,
}

pub struct SheetUploader {
    backend: Box<dyn SheetsBackend>,
    policy: RetryPolicy,
    clock: Box<dyn Clock>,
    /// Worksheets already cleared by a replace in this run.
    replaced: HashSet<String>,
    known_worksheets: Option<HashSet<String>>,
}

impl SheetUploader {
    pub fn new(backend: Box<dyn SheetsBackend>, policy: RetryPolicy) -> Self {
        Self::with_clock(backend, policy, Box::new(SystemClock))
    }

    pub fn with_clock(backend: Box<dyn SheetsBackend>, policy: RetryPolicy, clock: Box<dyn Clock>) -> Self {
        Self {
            backend,
            policy,
            clock,
            replaced: HashSet::new(),
            known_worksheets: None,
        }
    }

    /// Check that the spreadsheet is reachable. Returns its title.
    pub fn verify(&mut self) -> Result<String, UploadError> {
        let info = self.with_retry("spreadsheet info", |b| b.spreadsheet_info())?;
        self.known_worksheets = Some(info.worksheets.iter().map(|w| w.title.clone()).collect());
        Ok(info.title)
    }

    /// Create the worksheet if it does not exist yet. Returns true when it was created.
    pub fn ensure_worksheet(&mut self, worksheet: &str) -> Result<bool, UploadError> {
        if self.known_worksheets.is_none() {
            self.verify()?;
        }
        if self
            .known_worksheets
            .as_ref()
            .is_some_and(|known| known.contains(worksheet))
        {
            return Ok(false);
        }
        info!(worksheet, "creating worksheet");
        let title = worksheet.to_string();
        self.with_retry("add worksheet", |b| {
            // an earlier attempt may have gone through before failing
            if b.spreadsheet_info()?.has_worksheet(&title) {
                return Ok(());
            }
            b.add_worksheet(&title, NEW_WORKSHEET_ROWS, NEW_WORKSHEET_COLS)
        })?;
        if let Some(known) = self.known_worksheets.as_mut() {
            known.insert(worksheet.to_string());
        }
        Ok(true)
    }

    /// Write `records` to `worksheet`, each row stamped with the upload time.
    pub fn upload(
        &mut self,
        worksheet: &str,
        doc_type: DocumentType,
        records: &[Record],
        mode: UploadMode,
    ) -> Result<UploadReceipt, UploadError> {
        let created_worksheet = self.ensure_worksheet(worksheet)?;

        let timestamp = self.clock.timestamp();
        let header = header_row(doc_type);
        let rows: Vec<Vec<String>> = records
            .iter()
            .map(|r| {
                let mut row = Vec::with_capacity(header.len());
                row.push(timestamp.clone());
                row.extend(r.cells());
                row
            })
            .collect();

        let clear_first = mode == UploadMode::Replace && !self.replaced.contains(worksheet);
        let ws = worksheet.to_string();

        if clear_first {
            self.with_retry("clear worksheet", |b| b.clear_rows(&ws, 1))?;
            self.with_retry("write header", |b| b.update_values(&ws, 1, std::slice::from_ref(&header)))?;
            self.replaced.insert(ws.clone());
            debug!(worksheet, "cleared for replace");
        }

        // count existing rows once so a retried append can tell whether it already landed
        let before = self.with_retry("read worksheet", |b| b.read_values(&ws))?;
        if before.is_empty() {
            self.with_retry("write header", |b| b.update_values(&ws, 1, std::slice::from_ref(&header)))?;
        }
        let base_len = before.len().max(1);

        if !rows.is_empty() {
            let policy = self.policy;
            let mut attempt = 0;
            loop {
                attempt += 1;
                match self.backend.append_rows(&ws, &rows) {
                    Ok(()) => break,
                    Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                        let delay = policy.delay_after(attempt);
                        warn!(worksheet, attempt, error = %e, ?delay, "append failed, retrying");
                        self.clock.sleep(delay);
                        if let Ok(now) = self.backend.read_values(&ws) {
                            if now.len() >= base_len + rows.len() {
                                debug!(worksheet, "append had been applied, not repeating");
                                break;
                            }
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        info!(worksheet, rows = rows.len(), mode = %mode, "uploaded");
        Ok(UploadReceipt {
            worksheet: worksheet.to_string(),
            rows_written: rows.len(),
            created_worksheet,
            cleared: clear_first,
        })
    }

    fn with_retry<T, F>(&mut self, what: &str, mut op: F) -> Result<T, UploadError>
    where
        F: FnMut(&mut dyn SheetsBackend) -> Result<T, UploadError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(self.backend.as_mut()) {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(operation = what, attempt, error = %e, ?delay, "transient failure, retrying");
                    self.clock.sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Header row of an uploaded worksheet: timestamp column then the record columns.
pub fn header_row(doc_type: DocumentType) -> Vec<String> {
    std::iter::once(TIMESTAMP_HEADER)
        .chain(doc_type.record_headers().iter().copied())
        .map(str::to_string)
        .collect()
}
