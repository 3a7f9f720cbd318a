//! Run configuration: a YAML file (same layout as the tracker's `config.yaml`) plus `.env` overrides.

use crate::error::ConfigError;
use crate::types::{DocumentType, UploadMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const CONFIG_FILE_NAME: &str = "config.yaml";

pub const ENV_SPREADSHEET_ID: &str = "RENOVATION_OCR_SPREADSHEET_ID";
pub const ENV_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const ENV_ACCESS_TOKEN: &str = "GOOGLE_SHEETS_ACCESS_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub google_sheets: SheetsConfig,
    pub ocr: OcrConfig,
    pub upload: UploadConfig,
    pub parsing: ParsingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    pub spreadsheet_id: Option<String>,
    pub credentials_file: PathBuf,
    /// Worksheet per document type.
    pub worksheets: BTreeMap<DocumentType, String>,
    /// Filled from the environment only, never read from YAML.
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            credentials_file: PathBuf::from("credentials.json"),
            worksheets: BTreeMap::new(),
            access_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub image_folder: PathBuf,
    pub output_folder: PathBuf,
    pub tesseract_cmd: String,
    pub tesseract_args: Vec<String>,
    /// Words below this confidence (0-100) are ignored by the parsers.
    pub confidence_threshold: f32,
    /// Image filename -> document type.
    pub image_mappings: BTreeMap<String, DocumentType>,
    /// Image filename -> worksheet, overriding the per-type worksheet.
    pub worksheet_overrides: BTreeMap<String, String>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            image_folder: PathBuf::from("./images"),
            output_folder: PathBuf::from("./extracted_data"),
            tesseract_cmd: "tesseract".to_string(),
            tesseract_args: vec!["--psm".into(), "6".into(), "--oem".into(), "3".into()],
            confidence_threshold: 30.0,
            image_mappings: BTreeMap::new(),
            worksheet_overrides: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadTarget {
    #[default]
    Google,
    /// A local xlsx standing in for the remote spreadsheet.
    Workbook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub target: UploadTarget,
    pub workbook_path: PathBuf,
    pub mode: UploadMode,
    pub max_retries: u32,
    pub retry_delay_secs: f64,
    pub backoff: Backoff,
    pub timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            target: UploadTarget::Google,
            workbook_path: PathBuf::from("./extracted_data/renovation_tracker.xlsx"),
            mode: UploadMode::Append,
            max_retries: 3,
            retry_delay_secs: 2.0,
            backoff: Backoff::Fixed,
            timeout_secs: 60,
        }
    }
}

impl UploadConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay_secs.max(0.0))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    /// Reference date for timeline headers in task checklists ("One Week Before Your Move").
    pub moving_day: Option<chrono::NaiveDate>,
}

impl AppConfig {
    /// Worksheet for an image: explicit override first, then the per-type table, then the built-in name.
    pub fn worksheet_for(&self, image_name: &str, doc_type: DocumentType) -> String {
        if let Some(ws) = self.ocr.worksheet_overrides.get(image_name) {
            return ws.clone();
        }
        self.google_sheets
            .worksheets
            .get(&doc_type)
            .cloned()
            .unwrap_or_else(|| doc_type.default_worksheet().to_string())
    }

    /// Every worksheet the configuration can write to, deduplicated and sorted.
    pub fn all_worksheets(&self) -> Vec<String> {
        let mut names: Vec<String> = DocumentType::ALL
            .iter()
            .map(|t| {
                self.google_sheets
                    .worksheets
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| t.default_worksheet().to_string())
            })
            .chain(self.ocr.worksheet_overrides.values().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Apply `.env`/environment overrides for secrets and identifiers.
    pub fn apply_env(&mut self) {
        let _ = dotenvy::dotenv();
        if let Ok(id) = std::env::var(ENV_SPREADSHEET_ID) {
            if !id.trim().is_empty() {
                self.google_sheets.spreadsheet_id = Some(id.trim().to_string());
            }
        }
        if let Ok(path) = std::env::var(ENV_CREDENTIALS) {
            if !path.trim().is_empty() {
                self.google_sheets.credentials_file = PathBuf::from(path.trim());
            }
        }
        if let Ok(token) = std::env::var(ENV_ACCESS_TOKEN) {
            if !token.trim().is_empty() {
                self.google_sheets.access_token = Some(token.trim().to_string());
            }
        }
    }

    /// Checks that do not depend on whether upload was requested.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.ocr.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "ocr.confidence_threshold must be within 0-100, got {}",
                self.ocr.confidence_threshold
            )));
        }
        if self.ocr.tesseract_cmd.trim().is_empty() {
            return Err(ConfigError::Invalid("ocr.tesseract_cmd is empty".to_string()));
        }
        if self.upload.max_retries == 0 {
            return Err(ConfigError::Invalid("upload.max_retries must be at least 1".to_string()));
        }
        if !self.upload.retry_delay_secs.is_finite() || self.upload.retry_delay_secs < 0.0 {
            return Err(ConfigError::Invalid("upload.retry_delay_secs must be >= 0".to_string()));
        }
        for name in self.all_worksheets() {
            validate_worksheet_name(&name)?;
        }
        Ok(())
    }

    /// Extra checks when the run will upload.
    pub fn validate_for_upload(&self) -> Result<(), ConfigError> {
        if self.upload.target == UploadTarget::Workbook {
            return Ok(());
        }
        let id = self.google_sheets.spreadsheet_id.as_deref().unwrap_or("").trim();
        if id.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "google_sheets.spreadsheet_id is not set (config or {})",
                ENV_SPREADSHEET_ID
            )));
        }
        if self.google_sheets.access_token.is_none() && !self.google_sheets.credentials_file.exists() {
            return Err(ConfigError::Credentials(format!(
                "credentials file not found: {} (or set {})",
                self.google_sheets.credentials_file.display(),
                ENV_ACCESS_TOKEN
            )));
        }
        Ok(())
    }
}

/// Google Sheets titles: 1-100 chars, no `[]*?/\:`.
fn validate_worksheet_name(name: &str) -> Result<(), ConfigError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > 100 {
        return Err(ConfigError::Invalid(format!("invalid worksheet name '{}'", name)));
    }
    if let Some(c) = trimmed.chars().find(|c| "[]*?/\\:".contains(*c)) {
        return Err(ConfigError::Invalid(format!(
            "worksheet name '{}' contains '{}'",
            name, c
        )));
    }
    Ok(())
}

/// Resolve the config path: explicit path, then `./config.yaml`, then `<config dir>/renovation-ocr/config.yaml`.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Ok(local);
    }
    let mut searched = vec![local.display().to_string()];
    if let Some(dir) = dirs::config_dir() {
        let user = dir.join("renovation-ocr").join(CONFIG_FILE_NAME);
        if user.exists() {
            return Ok(user);
        }
        searched.push(user.display().to_string());
    }
    Err(ConfigError::NotFound(searched.join(", ")))
}

pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "Loaded config");
    debug!(mappings = config.ocr.image_mappings.len(), "Image mappings");
    Ok(config)
}

pub fn parse_config(raw: &str) -> Result<AppConfig, serde_yaml::Error> {
    if raw.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    serde_yaml::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
google_sheets:
  spreadsheet_id: "abc123"
  credentials_file: creds.json
  worksheets:
    financial: "Budget & Expenses"
    task: "Task Tracker"
ocr:
  image_folder: ./scans
  confidence_threshold: 45
  image_mappings:
    financial_notes.jpg: financial
    task_checklist.jpg: tasks
    property_layout.jpg: layout
  worksheet_overrides:
    property_layout.jpg: "Floor Plan"
upload:
  mode: replace
  max_retries: 5
  retry_delay_secs: 0.5
  backoff: exponential
parsing:
  moving_day: 2025-11-15
"#;

    #[test]
    fn parses_full_config() {
        let cfg = parse_config(SAMPLE).unwrap();
        assert_eq!(cfg.google_sheets.spreadsheet_id.as_deref(), Some("abc123"));
        assert_eq!(cfg.ocr.image_folder, PathBuf::from("./scans"));
        assert_eq!(cfg.ocr.confidence_threshold, 45.0);
        assert_eq!(cfg.ocr.image_mappings.get("task_checklist.jpg"), Some(&DocumentType::Task));
        assert_eq!(cfg.upload.mode, UploadMode::Replace);
        assert_eq!(cfg.upload.backoff, Backoff::Exponential);
        assert_eq!(cfg.upload.retry_delay(), Duration::from_millis(500));
        assert_eq!(
            cfg.parsing.moving_day,
            chrono::NaiveDate::from_ymd_opt(2025, 11, 15)
        );
        // untouched sections keep their defaults
        assert_eq!(cfg.ocr.tesseract_cmd, "tesseract");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn worksheet_resolution_order() {
        let cfg = parse_config(SAMPLE).unwrap();
        assert_eq!(cfg.worksheet_for("property_layout.jpg", DocumentType::Layout), "Floor Plan");
        assert_eq!(cfg.worksheet_for("financial_notes.jpg", DocumentType::Financial), "Budget & Expenses");
        // no table entry for layout: built-in name
        assert_eq!(cfg.worksheet_for("other.jpg", DocumentType::Layout), "Property Layout");
        assert_eq!(
            cfg.all_worksheets(),
            vec!["Budget & Expenses", "Floor Plan", "Property Layout", "Task Tracker"]
        );
    }

    #[test]
    fn empty_file_is_default() {
        let cfg = parse_config("   \n").unwrap();
        assert_eq!(cfg.upload.max_retries, 3);
        assert_eq!(cfg.ocr.confidence_threshold, 30.0);
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = AppConfig::default();
        cfg.ocr.confidence_threshold = 120.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = AppConfig::default();
        cfg.upload.max_retries = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.ocr.worksheet_overrides.insert("a.jpg".into(), "Bad/Name".into());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn upload_needs_spreadsheet_and_credentials() {
        let mut cfg = AppConfig::default();
        assert!(matches!(cfg.validate_for_upload(), Err(ConfigError::Invalid(_))));

        cfg.google_sheets.spreadsheet_id = Some("abc".into());
        cfg.google_sheets.credentials_file = PathBuf::from("/definitely/missing/creds.json");
        assert!(matches!(cfg.validate_for_upload(), Err(ConfigError::Credentials(_))));

        cfg.google_sheets.access_token = Some("ya29.token".into());
        assert!(cfg.validate_for_upload().is_ok());

        let mut offline = AppConfig::default();
        offline.upload.target = UploadTarget::Workbook;
        assert!(offline.validate_for_upload().is_ok());
    }

    #[test]
    fn unknown_document_type_is_a_parse_error() {
        let raw = "ocr:\n  image_mappings:\n    a.jpg: receipts\n";
        assert!(parse_config(raw).is_err());
    }
}
