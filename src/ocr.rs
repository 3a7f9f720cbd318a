use crate::error::OcrError;
use crate::types::{Detection, LineKey, OcrLine};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Word level of Tesseract's TSV hierarchy.
const WORD_LEVEL: u32 = 5;
const TSV_COLUMNS: usize = 12;

/// Anything that turns an image into word detections.
pub trait OcrEngine {
    fn name(&self) -> &str;

    /// Word detections in engine order. Non-text regions (confidence < 0) are already dropped.
    fn recognize(&self, image_path: &Path) -> Result<Vec<Detection>, OcrError>;
}

/// Runs the `tesseract` CLI and reads its TSV output from stdout.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    command: String,
    args: Vec<String>,
}

impl TesseractEngine {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image_path: &Path) -> Result<Vec<Detection>, OcrError> {
        if !image_path.is_file() {
            return Err(OcrError::ImageNotFound(image_path.to_path_buf()));
        }

        let output = Command::new(&self.command)
            .arg(image_path)
            .arg("stdout")
            .args(&self.args)
            .arg("tsv")
            .output()
            .map_err(|source| OcrError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(OcrError::EngineFailed {
                status: output.status.to_string(),
                stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let detections = parse_tsv(&stdout)?;
        debug!(
            image = %image_path.display(),
            words = detections.len(),
            "tesseract finished"
        );
        Ok(detections)
    }
}

/// Parse Tesseract TSV (`level page_num block_num par_num line_num word_num left top width height conf text`).
/// Only word rows with a non-negative confidence are returned.
pub fn parse_tsv(tsv: &str) -> Result<Vec<Detection>, OcrError> {
    let mut detections = Vec::new();
    for (idx, raw) in tsv.lines().enumerate() {
        let line_no = idx + 1;
        if raw.trim().is_empty() || raw.starts_with("level\t") {
            continue;
        }
        let cols: Vec<&str> = raw.splitn(TSV_COLUMNS, '\t').collect();
        if cols.len() < TSV_COLUMNS - 1 {
            return Err(OcrError::Malformed {
                line: line_no,
                reason: format!("expected {} columns, found {}", TSV_COLUMNS, cols.len()),
            });
        }

        let level: u32 = parse_col(&cols, 0, line_no)?;
        if level != WORD_LEVEL {
            continue;
        }
        let confidence: f32 = parse_col(&cols, 10, line_no)?;
        if confidence < 0.0 {
            continue;
        }

        detections.push(Detection {
            page: parse_col(&cols, 1, line_no)?,
            block: parse_col(&cols, 2, line_no)?,
            paragraph: parse_col(&cols, 3, line_no)?,
            line: parse_col(&cols, 4, line_no)?,
            word: parse_col(&cols, 5, line_no)?,
            left: parse_col(&cols, 6, line_no)?,
            top: parse_col(&cols, 7, line_no)?,
            width: parse_col(&cols, 8, line_no)?,
            height: parse_col(&cols, 9, line_no)?,
            confidence,
            text: cols.get(11).copied().unwrap_or("").to_string(),
        });
    }
    Ok(detections)
}

fn parse_col<T: std::str::FromStr>(cols: &[&str], idx: usize, line: usize) -> Result<T, OcrError> {
    let raw = cols.get(idx).map(|s| s.trim()).unwrap_or("");
    raw.parse().map_err(|_| OcrError::Malformed {
        line,
        reason: format!("column {} is not a number: '{}'", idx + 1, raw),
    })
}

/// Group usable words into lines in document order.
///
/// A word is usable when its confidence is at least `min_confidence` and its trimmed text is
/// non-empty. Within a line words are ordered by `left` (then word index), whatever the input order.
pub fn reconstruct_lines(detections: &[Detection], min_confidence: f32) -> Vec<OcrLine> {
    let mut groups: BTreeMap<LineKey, Vec<&Detection>> = BTreeMap::new();
    for d in detections {
        if d.confidence < min_confidence || d.text.trim().is_empty() {
            continue;
        }
        groups.entry(d.line_key()).or_default().push(d);
    }

    groups
        .into_iter()
        .map(|(key, mut words)| {
            words.sort_by_key(|d| (d.left, d.word));
            let text = words
                .iter()
                .map(|d| d.text.trim())
                .collect::<Vec<_>>()
                .join(" ");
            let confidence =
                words.iter().map(|d| d.confidence as f64).sum::<f64>() / words.len() as f64;
            OcrLine {
                key,
                text,
                confidence,
            }
        })
        .collect()
}

/// Word count and mean confidence over all text detections of an image.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OcrStats {
    pub word_count: usize,
    pub average_confidence: f64,
}

pub fn stats(detections: &[Detection]) -> OcrStats {
    let words: Vec<&Detection> = detections
        .iter()
        .filter(|d| d.confidence >= 0.0 && !d.text.trim().is_empty())
        .collect();
    if words.is_empty() {
        return OcrStats::default();
    }
    let total: f64 = words.iter().map(|d| d.confidence as f64).sum();
    OcrStats {
        word_count: words.len(),
        average_confidence: total / words.len() as f64,
    }
}

#[cfg(test)]
pub(crate) fn word(line: u32, word: u32, left: i32, confidence: f32, text: &str) -> Detection {
    Detection {
        page: 1,
        block: 1,
        paragraph: 1,
        line,
        word,
        left,
        top: 10 * line as i32,
        width: 40,
        height: 20,
        confidence,
        text: text.to_string(),
    }
}
