use crate::types::{DocumentType, UploadMode};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "renovation-ocr")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "OCR handwritten renovation notes into budget, task and layout sheets", long_about = None)]
pub struct Cli {
    /// Path to config.yaml (default: ./config.yaml, then the user config dir)
    #[arg(long, short = 'c', env = "RENOVATION_OCR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Upload parsed records to the configured spreadsheet
    #[arg(long)]
    pub upload_to_sheets: bool,

    /// Only process these image file names, in this order
    #[arg(long, num_args = 1..)]
    pub images: Option<Vec<String>>,

    /// Override ocr.image_folder
    #[arg(long)]
    pub image_folder: Option<PathBuf>,

    /// Override ocr.output_folder
    #[arg(long)]
    pub output_folder: Option<PathBuf>,

    /// Upload mode (append or replace); default from config
    #[arg(long)]
    pub mode: Option<UploadMode>,

    /// Treat every image as this document type instead of using the mapping table
    #[arg(long)]
    pub doc_type: Option<DocumentType>,

    /// Minimum word confidence (0-100) used by the parsers
    #[arg(long)]
    pub min_confidence: Option<f32>,

    /// Do not record this run in history.db
    #[arg(long)]
    pub no_history: bool,

    /// Skip the ocr_summary_<timestamp>.xlsx workbook
    #[arg(long)]
    pub no_summary: bool,

    /// Debug logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Parser, Debug)]
#[command(name = "sheet_admin")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect, prepare and clear the tracker spreadsheet", long_about = None)]
pub struct AdminCli {
    #[arg(long, short = 'c', env = "RENOVATION_OCR_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, short = 'v')]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: AdminCommand,
}

#[derive(Subcommand, Debug)]
pub enum AdminCommand {
    /// Show the spreadsheet title, worksheets and the latest rows
    Status {
        /// Only show this worksheet
        #[arg(long)]
        worksheet: Option<String>,
    },
    /// Verify access and create any missing configured worksheets
    Setup,
    /// Clear data rows from worksheets
    Clear {
        /// Worksheets to clear (default: all configured worksheets)
        #[arg(long)]
        worksheet: Vec<String>,

        /// Clear header rows too
        #[arg(long)]
        all: bool,

        /// Confirm the clear
        #[arg(long)]
        yes: bool,
    },
    /// Show recent runs and the per-image history from history.db
    History {
        /// Only entries from this run
        #[arg(long)]
        run: Option<i64>,

        /// Match file names or extracted data
        #[arg(long)]
        search: Option<String>,

        /// Number of runs listed
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_main_flags() {
        let cli = Cli::try_parse_from([
            "renovation-ocr",
            "--upload-to-sheets",
            "--images",
            "financial_notes.jpg",
            "task_checklist.jpg",
            "--mode",
            "replace",
            "--doc-type",
            "tasks",
            "--min-confidence",
            "45",
        ])
        .unwrap();
        assert!(cli.upload_to_sheets);
        assert_eq!(cli.images.as_ref().map(Vec::len), Some(2));
        assert_eq!(cli.mode, Some(UploadMode::Replace));
        assert_eq!(cli.doc_type, Some(DocumentType::Task));
        assert_eq!(cli.min_confidence, Some(45.0));
        assert!(!cli.no_history);
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["renovation-ocr", "--mode", "overwrite"]).is_err());
    }

    #[test]
    fn parses_admin_commands() {
        let cli = AdminCli::try_parse_from([
            "sheet_admin",
            "clear",
            "--worksheet",
            "Task Tracker",
            "--worksheet",
            "Budget & Expenses",
            "--yes",
        ])
        .unwrap();
        match cli.command {
            AdminCommand::Clear { worksheet, all, yes } => {
                assert_eq!(worksheet.len(), 2);
                assert!(!all);
                assert!(yes);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_history_filters() {
        let cli = AdminCli::try_parse_from(["sheet_admin", "history", "--run", "3", "--search", "lumber"]).unwrap();
        match cli.command {
            AdminCommand::History { run, search, limit } => {
                assert_eq!(run, Some(3));
                assert_eq!(search.as_deref(), Some("lumber"));
                assert_eq!(limit, 10);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
