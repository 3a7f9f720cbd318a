//! Batch orchestration: classify, OCR, parse, back up and optionally upload each image in turn.

use crate::classifier::DocumentClassifier;
use crate::config::AppConfig;
use crate::db::{Db, NewHistory};
use crate::error::{ConfigError, OcrError, PipelineError};
use crate::excel::{self, SummaryRow};
use crate::ocr::{self, OcrEngine, OcrStats};
use crate::parsers::parser_for;
use crate::types::{DocumentType, Record, UploadMode};
use crate::uploader::{SheetUploader, UploadReceipt};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "bmp", "gif", "webp"];

/// Per-image progress. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    Pending,
    OcrDone,
    Parsed,
    LocallySaved,
    Uploaded,
    UploadFailed,
    /// Upload was requested but the image produced no records.
    UploadSkipped,
}

impl ImageState {
    fn rank(self) -> u8 {
        match self {
            ImageState::Pending => 0,
            ImageState::OcrDone => 1,
            ImageState::Parsed => 2,
            ImageState::LocallySaved => 3,
            ImageState::Uploaded | ImageState::UploadFailed | ImageState::UploadSkipped => 4,
        }
    }

    pub fn can_advance_to(self, next: ImageState) -> bool {
        next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImageState::Pending => "pending",
            ImageState::OcrDone => "ocr done",
            ImageState::Parsed => "parsed",
            ImageState::LocallySaved => "saved locally",
            ImageState::Uploaded => "uploaded",
            ImageState::UploadFailed => "upload failed",
            ImageState::UploadSkipped => "upload skipped (no records)",
        }
    }
}

/// Why an image stopped before it was saved locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    SkippedUnmapped,
    SkippedMissing,
    OcrFailed(String),
    WriteFailed(String),
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::SkippedUnmapped => f.write_str("skipped (unmapped)"),
            Disposition::SkippedMissing => f.write_str("skipped (file not found)"),
            Disposition::OcrFailed(e) => write!(f, "OCR failed: {}", e),
            Disposition::WriteFailed(e) => write!(f, "local write failed: {}", e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageOutcome {
    pub image: String,
    pub document_type: Option<DocumentType>,
    pub worksheet: Option<String>,
    pub state: ImageState,
    pub disposition: Option<Disposition>,
    pub records: Vec<Record>,
    pub stats: OcrStats,
    pub upload_error: Option<String>,
    pub receipt: Option<UploadReceipt>,
    pub outputs: Vec<PathBuf>,
}

impl ImageOutcome {
    fn new(image: &str) -> Self {
        Self {
            image: image.to_string(),
            document_type: None,
            worksheet: None,
            state: ImageState::Pending,
            disposition: None,
            records: Vec::new(),
            stats: OcrStats::default(),
            upload_error: None,
            receipt: None,
            outputs: Vec::new(),
        }
    }

    fn advance(&mut self, next: ImageState) {
        if self.state.can_advance_to(next) {
            self.state = next;
        } else {
            error!(image = %self.image, from = self.state.as_str(), to = next.as_str(), "ignored backward state change");
        }
    }

    fn stop(mut self, disposition: Disposition) -> Self {
        match &disposition {
            Disposition::SkippedUnmapped | Disposition::SkippedMissing => {
                warn!(image = %self.image, "{}", disposition)
            }
            _ => error!(image = %self.image, "{}", disposition),
        }
        self.disposition = Some(disposition);
        self
    }

    /// Text for summaries and history: the disposition, else the state.
    pub fn status_text(&self) -> String {
        match &self.disposition {
            Some(Disposition::SkippedUnmapped) => "skipped (unmapped)".to_string(),
            Some(Disposition::SkippedMissing) => "skipped (file not found)".to_string(),
            Some(Disposition::OcrFailed(_)) => "ocr failed".to_string(),
            Some(Disposition::WriteFailed(_)) => "write failed".to_string(),
            None => self.state.as_str().to_string(),
        }
    }

    pub fn error_text(&self) -> Option<String> {
        match &self.disposition {
            Some(Disposition::SkippedUnmapped) => Some("no document type mapping".to_string()),
            Some(Disposition::SkippedMissing) => Some("image file not found".to_string()),
            Some(Disposition::OcrFailed(e)) | Some(Disposition::WriteFailed(e)) => Some(e.clone()),
            None => self.upload_error.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub outcomes: Vec<ImageOutcome>,
    pub upload_requested: bool,
    pub summary_workbook: Option<PathBuf>,
}

impl BatchSummary {
    /// Images that reached local backup.
    pub fn images_processed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.state.rank() >= ImageState::LocallySaved.rank())
            .count()
    }

    pub fn records_by_type(&self) -> BTreeMap<DocumentType, usize> {
        let mut counts = BTreeMap::new();
        for o in &self.outcomes {
            if let Some(t) = o.document_type {
                *counts.entry(t).or_insert(0) += o.records.len();
            }
        }
        counts
    }

    pub fn total_records(&self) -> usize {
        self.outcomes.iter().map(|o| o.records.len()).sum()
    }

    pub fn count_state(&self, state: ImageState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state && o.disposition.is_none()).count()
    }

    /// Skipped and failed images with their cause, including failed uploads.
    pub fn problems(&self) -> Vec<(&str, String)> {
        self.outcomes
            .iter()
            .filter_map(|o| match (&o.disposition, &o.upload_error) {
                (Some(d), _) => Some((o.image.as_str(), d.to_string())),
                (None, Some(e)) => Some((o.image.as_str(), format!("upload failed: {}", e))),
                _ => None,
            })
            .collect()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("=== OCR batch summary ===\n");
        out.push_str(&format!("Images considered: {}\n", self.outcomes.len()));
        out.push_str(&format!("Images processed:  {}\n", self.images_processed()));
        for t in DocumentType::ALL {
            let n = self.records_by_type().get(&t).copied().unwrap_or(0);
            out.push_str(&format!("Records ({}): {}\n", t, n));
        }
        if self.upload_requested {
            out.push_str(&format!(
                "Uploads: {} uploaded, {} failed, {} skipped (no records)\n",
                self.count_state(ImageState::Uploaded),
                self.count_state(ImageState::UploadFailed),
                self.count_state(ImageState::UploadSkipped)
            ));
        } else {
            out.push_str("Uploads: not requested\n");
        }
        for o in &self.outcomes {
            if o.disposition.is_none() {
                out.push_str(&format!(
                    "  {}: {} record(s), {} word(s), avg confidence {:.1}, {}\n",
                    o.image,
                    o.records.len(),
                    o.stats.word_count,
                    o.stats.average_confidence,
                    o.status_text()
                ));
                if let Some(r) = &o.receipt {
                    let mut flags = String::new();
                    if r.created_worksheet {
                        flags.push_str(", worksheet created");
                    }
                    if r.cleared {
                        flags.push_str(", cleared first");
                    }
                    out.push_str(&format!("    -> {}: {} row(s){}\n", r.worksheet, r.rows_written, flags));
                }
                if !o.outputs.is_empty() {
                    let files: Vec<String> = o
                        .outputs
                        .iter()
                        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                        .collect();
                    out.push_str(&format!("    saved: {}\n", files.join(", ")));
                }
            }
        }
        let problems = self.problems();
        if !problems.is_empty() {
            out.push_str("Skipped / failed:\n");
            for (image, why) in problems {
                out.push_str(&format!("  {}: {}\n", image, why));
            }
        }
        if let Some(p) = &self.summary_workbook {
            out.push_str(&format!("Summary workbook: {}\n", p.display()));
        }
        out
    }
}

/// Per-run knobs coming from the command line on top of the config.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Explicit image subset, processed in this order.
    pub images: Option<Vec<String>>,
    pub mode: UploadMode,
    pub write_summary_workbook: bool,
}

pub struct Pipeline<'a> {
    config: &'a AppConfig,
    classifier: DocumentClassifier,
    engine: Box<dyn OcrEngine + 'a>,
    uploader: Option<SheetUploader>,
    history: Option<Db>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a AppConfig,
        classifier: DocumentClassifier,
        engine: Box<dyn OcrEngine + 'a>,
        uploader: Option<SheetUploader>,
    ) -> Self {
        Self {
            config,
            classifier,
            engine,
            uploader,
            history: None,
        }
    }

    pub fn with_history(mut self, history: Option<Db>) -> Self {
        self.history = history;
        self
    }

    pub fn run(&mut self, options: &RunOptions) -> Result<BatchSummary, PipelineError> {
        let image_dir = &self.config.ocr.image_folder;
        if !image_dir.is_dir() {
            return Err(ConfigError::MissingImageFolder(image_dir.clone()).into());
        }
        let output_dir = &self.config.ocr.output_folder;
        std::fs::create_dir_all(output_dir).map_err(|source| PipelineError::OutputFolder {
            path: output_dir.clone(),
            source,
        })?;

        let images = match &options.images {
            Some(list) => list.clone(),
            None => list_images(image_dir)?,
        };
        let upload_requested = self.uploader.is_some();
        info!(
            images = images.len(),
            engine = self.engine.name(),
            upload = upload_requested,
            mode = %options.mode,
            "starting batch"
        );

        let run_id = self.history.as_ref().and_then(|db| {
            db.start_run(upload_requested, &options.mode.to_string())
                .map_err(|e| warn!(error = %e, "could not record run start"))
                .ok()
        });

        let mut summary = BatchSummary {
            upload_requested,
            ..BatchSummary::default()
        };
        for name in &images {
            let outcome = self.process_image(name, options.mode);
            if let (Some(db), Some(run_id)) = (&self.history, run_id) {
                record_history(db, run_id, &outcome);
            }
            summary.outcomes.push(outcome);
        }

        if let (Some(db), Some(run_id)) = (&self.history, run_id) {
            if let Err(e) = db.finish_run(run_id, summary.images_processed(), summary.total_records()) {
                warn!(error = %e, "could not record run end");
            }
        }

        if options.write_summary_workbook {
            let rows: Vec<SummaryRow> = summary.outcomes.iter().map(summary_row).collect();
            let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
            match excel::write_summary_workbook(output_dir, &rows, &stamp) {
                Ok(path) => summary.summary_workbook = Some(path),
                Err(e) => warn!(error = %e, "could not write summary workbook"),
            }
        }

        info!(
            processed = summary.images_processed(),
            records = summary.total_records(),
            problems = summary.problems().len(),
            "batch finished"
        );
        Ok(summary)
    }

    fn process_image(&mut self, name: &str, mode: UploadMode) -> ImageOutcome {
        let mut outcome = ImageOutcome::new(name);

        let Some(doc_type) = self.classifier.classify(name) else {
            return outcome.stop(Disposition::SkippedUnmapped);
        };
        let worksheet = self.config.worksheet_for(name, doc_type);
        outcome.document_type = Some(doc_type);
        outcome.worksheet = Some(worksheet.clone());

        let path = self.config.ocr.image_folder.join(name);
        if !path.is_file() {
            return outcome.stop(Disposition::SkippedMissing);
        }

        info!(image = name, doc_type = %doc_type, "running OCR");
        let detections = match self.engine.recognize(&path) {
            Ok(d) if d.iter().all(|w| w.text.trim().is_empty()) => {
                return outcome.stop(Disposition::OcrFailed(OcrError::Empty.to_string()));
            }
            Ok(d) => d,
            Err(e) => return outcome.stop(Disposition::OcrFailed(e.to_string())),
        };
        outcome.stats = ocr::stats(&detections);
        outcome.advance(ImageState::OcrDone);
        info!(
            image = name,
            words = outcome.stats.word_count,
            avg_confidence = %format!("{:.1}", outcome.stats.average_confidence),
            "OCR done"
        );

        let lines = ocr::reconstruct_lines(&detections, self.config.ocr.confidence_threshold);
        let parser = parser_for(doc_type, &self.config.parsing);
        outcome.records = parser.parse(&lines, name);
        outcome.advance(ImageState::Parsed);
        info!(image = name, records = outcome.records.len(), "parsed");

        let output_dir = &self.config.ocr.output_folder;
        let all_lines = ocr::reconstruct_lines(&detections, 0.0);
        let saved_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let written = excel::write_text_dump(output_dir, name, &all_lines).and_then(|txt| {
            excel::write_backup_workbook(output_dir, name, doc_type, &detections, &outcome.records, &saved_at)
                .map(|xlsx| vec![txt, xlsx])
        });
        match written {
            Ok(paths) => {
                debug!(image = name, files = ?paths, "saved locally");
                outcome.outputs = paths;
            }
            Err(e) => return outcome.stop(Disposition::WriteFailed(e.to_string())),
        }
        outcome.advance(ImageState::LocallySaved);

        let Some(uploader) = self.uploader.as_mut() else {
            return outcome;
        };
        let no_records = outcome.records.is_empty();
        // replace still has to clear what earlier runs left in the worksheet
        if no_records && mode == UploadMode::Append {
            info!(image = name, "no records, upload skipped");
            outcome.advance(ImageState::UploadSkipped);
            return outcome;
        }
        match uploader.upload(&worksheet, doc_type, &outcome.records, mode) {
            Ok(receipt) => {
                info!(
                    image = name,
                    worksheet = %receipt.worksheet,
                    rows = receipt.rows_written,
                    created = receipt.created_worksheet,
                    cleared = receipt.cleared,
                    "upload complete"
                );
                outcome.receipt = Some(receipt);
                outcome.advance(if no_records {
                    ImageState::UploadSkipped
                } else {
                    ImageState::Uploaded
                });
            }
            Err(e) => {
                error!(image = name, worksheet = %worksheet, error = %e, "upload failed, local backups kept");
                outcome.upload_error = Some(e.to_string());
                outcome.advance(ImageState::UploadFailed);
            }
        }
        outcome
    }
}

/// Image files in a folder, sorted by name.
pub fn list_images(dir: &Path) -> Result<Vec<String>, PipelineError> {
    let entries = std::fs::read_dir(dir).map_err(|source| PipelineError::ListImages {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|name| {
            Path::new(name)
                .extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| IMAGE_EXTENSIONS.contains(&x.to_ascii_lowercase().as_str()))
        })
        .collect();
    names.sort();
    Ok(names)
}

fn summary_row(o: &ImageOutcome) -> SummaryRow {
    SummaryRow {
        image: o.image.clone(),
        document_type: o.document_type.map(|t| t.to_string()).unwrap_or_default(),
        worksheet: o.worksheet.clone().unwrap_or_default(),
        final_state: o.status_text(),
        records: o.records.len(),
        words: o.stats.word_count,
        average_confidence: o.stats.average_confidence,
        error: o.error_text().unwrap_or_default(),
    }
}

fn record_history(db: &Db, run_id: i64, o: &ImageOutcome) {
    let data = serde_json::to_value(&o.records).unwrap_or(serde_json::Value::Null);
    let doc_type = o.document_type.map(|t| t.as_str());
    let status = o.status_text();
    let error = o.error_text();
    let entry = NewHistory {
        run_id,
        document_type: doc_type,
        file_name: &o.image,
        worksheet: o.worksheet.as_deref(),
        status: &status,
        record_count: o.records.len(),
        word_count: o.stats.word_count,
        average_confidence: o.stats.average_confidence,
        extracted_data: &data,
        error_message: error.as_deref(),
    };
    if let Err(e) = db.add_history_record(&entry) {
        warn!(image = %o.image, error = %e, "could not record history");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_only_move_forward() {
        use ImageState::*;
        assert!(Pending.can_advance_to(OcrDone));
        assert!(Parsed.can_advance_to(LocallySaved));
        assert!(LocallySaved.can_advance_to(UploadFailed));
        assert!(!LocallySaved.can_advance_to(Parsed));
        assert!(!Uploaded.can_advance_to(UploadFailed));

        let mut o = ImageOutcome::new("a.jpg");
        o.advance(Parsed);
        o.advance(OcrDone);
        assert_eq!(o.state, Parsed);
    }

    #[test]
    fn lists_only_images_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.PNG", "a.jpg", "notes.txt", "c.jpeg"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.jpg")).unwrap();
        assert_eq!(list_images(dir.path()).unwrap(), vec!["a.jpg", "b.PNG", "c.jpeg"]);
    }

    #[test]
    fn summary_counts() {
        let mut uploaded = ImageOutcome::new("financial_notes.jpg");
        uploaded.document_type = Some(DocumentType::Financial);
        uploaded.state = ImageState::Uploaded;
        uploaded.outputs = vec![
            PathBuf::from("out/financial_notes_ocr.txt"),
            PathBuf::from("out/financial_notes_ocr.xlsx"),
        ];
        uploaded.receipt = Some(UploadReceipt {
            worksheet: "Budget & Expenses".into(),
            rows_written: 3,
            created_worksheet: true,
            cleared: false,
        });
        let mut failed = ImageOutcome::new("task_checklist.jpg");
        failed.document_type = Some(DocumentType::Task);
        failed.state = ImageState::UploadFailed;
        failed.upload_error = Some("rate limited".into());
        let skipped = ImageOutcome::new("unknown.jpg").stop(Disposition::SkippedUnmapped);

        let summary = BatchSummary {
            outcomes: vec![uploaded, failed, skipped],
            upload_requested: true,
            summary_workbook: None,
        };
        assert_eq!(summary.images_processed(), 2);
        assert_eq!(summary.count_state(ImageState::Uploaded), 1);
        assert_eq!(summary.count_state(ImageState::UploadFailed), 1);
        let problems = summary.problems();
        assert_eq!(problems.len(), 2);
        assert_eq!(problems[1], ("unknown.jpg", "skipped (unmapped)".to_string()));

        let text = summary.render();
        assert!(text.contains("1 uploaded, 1 failed, 0 skipped"));
        assert!(text.contains("    -> Budget & Expenses: 3 row(s), worksheet created\n"));
        assert!(text.contains("    saved: financial_notes_ocr.txt, financial_notes_ocr.xlsx\n"));
        assert!(text.contains("unknown.jpg: skipped (unmapped)"));
    }
}
