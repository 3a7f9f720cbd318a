use std::path::PathBuf;
use thiserror::Error;

/// Problems found while loading or validating configuration. Fatal before any image is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config YAML at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no config file found (looked in {0})")]
    NotFound(String),

    #[error("image folder not found: {0}")]
    MissingImageFolder(PathBuf),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("credentials error: {0}")]
    Credentials(String),
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("image not found: {0}")]
    ImageNotFound(PathBuf),

    #[error("could not start OCR engine '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OCR engine exited with {status}: {stderr}")]
    EngineFailed { status: String, stderr: String },

    #[error("malformed OCR output at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("OCR produced no text")]
    Empty,
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("could not write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write workbook {path}: {source}")]
    Xlsx {
        path: PathBuf,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("rate limited by spreadsheet API: {0}")]
    RateLimited(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("spreadsheet service error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("spreadsheet request rejected ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("worksheet '{0}' not found")]
    WorksheetNotFound(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("workbook error: {0}")]
    Workbook(String),
}

impl UploadError {
    /// Rate limits, connection problems and 5xx responses are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            UploadError::RateLimited(_) | UploadError::Network(_) | UploadError::Server { .. }
        )
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            UploadError::InvalidResponse(e.to_string())
        } else {
            UploadError::Network(e.to_string())
        }
    }
}

/// Setup failures that stop the whole run (non-zero exit).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("upload target unavailable: {0}")]
    UploadTarget(#[source] UploadError),

    #[error("could not create output folder {path}: {source}")]
    OutputFolder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not list image folder {path}: {source}")]
    ListImages {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(UploadError::RateLimited("quota".into()).is_transient());
        assert!(UploadError::Network("reset".into()).is_transient());
        assert!(UploadError::Server { status: 503, body: String::new() }.is_transient());
        assert!(!UploadError::Api { status: 400, body: String::new() }.is_transient());
        assert!(!UploadError::Auth("bad key".into()).is_transient());
    }
}
