pub mod admin;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod excel;
pub mod ocr;
pub mod parsers;
pub mod pipeline;
pub mod sheets;
pub mod types;
pub mod uploader;

use anyhow::{bail, Context};
use clap::Parser;
use cli::{AdminCli, AdminCommand, Cli};
use config::{AppConfig, UploadTarget};
use error::{PipelineError, UploadError};
use sheets::{GoogleSheetsClient, LocalWorkbookBackend, SheetsBackend};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uploader::{RetryPolicy, SheetUploader};

const HISTORY_DB: &str = "history.db";

/// Logs go to stderr so the batch summary on stdout stays clean. `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// The spreadsheet the config points at: Google Sheets or a local workbook.
pub fn build_backend(config: &AppConfig) -> Result<Box<dyn SheetsBackend>, UploadError> {
    match config.upload.target {
        UploadTarget::Google => {
            let timeout = Duration::from_secs(config.upload.timeout_secs.max(1));
            Ok(Box::new(GoogleSheetsClient::from_config(&config.google_sheets, timeout)?))
        }
        UploadTarget::Workbook => Ok(Box::new(LocalWorkbookBackend::open(&config.upload.workbook_path)?)),
    }
}

fn load(path: Option<&std::path::Path>) -> anyhow::Result<AppConfig> {
    let path = config::resolve_config_path(path)?;
    let mut config = config::load_config(&path)?;
    config.apply_env();
    Ok(config)
}

/// Entry point of the `renovation-ocr` binary.
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run_batch(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_batch(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = load(cli.config.as_deref())?;
    if let Some(dir) = cli.image_folder {
        config.ocr.image_folder = dir;
    }
    if let Some(dir) = cli.output_folder {
        config.ocr.output_folder = dir;
    }
    if let Some(min) = cli.min_confidence {
        config.ocr.confidence_threshold = min;
    }
    let mode = cli.mode.unwrap_or(config.upload.mode);
    config.validate()?;

    let uploader = if cli.upload_to_sheets {
        config.validate_for_upload()?;
        let backend = build_backend(&config).map_err(PipelineError::UploadTarget)?;
        let mut uploader = SheetUploader::new(backend, RetryPolicy::from_config(&config.upload));
        let title = uploader.verify().map_err(PipelineError::UploadTarget)?;
        info!(spreadsheet = %title, "connected to spreadsheet");
        Some(uploader)
    } else {
        None
    };

    let history = if cli.no_history {
        None
    } else {
        let path = config.ocr.output_folder.join(HISTORY_DB);
        db::Db::new(&path)
            .map_err(|e| warn!(path = %path.display(), error = %e, "history disabled"))
            .ok()
    };

    let engine = ocr::TesseractEngine::new(config.ocr.tesseract_cmd.clone(), config.ocr.tesseract_args.clone());
    let classifier = classifier::DocumentClassifier::new(config.ocr.image_mappings.clone()).with_override(cli.doc_type);
    debug!(mapped = ?classifier.mapped_names().collect::<Vec<_>>(), forced = ?cli.doc_type, "classifier ready");
    let options = pipeline::RunOptions {
        images: cli.images,
        mode,
        write_summary_workbook: !cli.no_summary,
    };

    let summary = pipeline::Pipeline::new(&config, classifier, Box::new(engine), uploader)
        .with_history(history)
        .run(&options)?;
    print!("{}", summary.render());
    Ok(ExitCode::SUCCESS)
}

/// Entry point of the `sheet_admin` binary.
pub fn run_admin() -> ExitCode {
    let cli = AdminCli::parse();
    init_tracing(cli.verbose);
    match admin_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn admin_command(cli: AdminCli) -> anyhow::Result<()> {
    let config = load(cli.config.as_deref())?;
    config.validate()?;
    match cli.command {
        AdminCommand::History { run, search, limit } => show_history(&config, run, search.as_deref(), limit),
        command => spreadsheet_command(&config, command),
    }
}

/// Reads the local history database; no spreadsheet access needed.
fn show_history(config: &AppConfig, run: Option<i64>, search: Option<&str>, limit: usize) -> anyhow::Result<()> {
    let path = config.ocr.output_folder.join(HISTORY_DB);
    if !path.exists() {
        bail!("no history database at {}", path.display());
    }
    let db = db::Db::new(&path).map_err(anyhow::Error::msg)?;
    print!("{}", admin::history(&db, run, search, limit).map_err(anyhow::Error::msg)?);
    Ok(())
}

fn spreadsheet_command(config: &AppConfig, command: AdminCommand) -> anyhow::Result<()> {
    config.validate_for_upload()?;
    let mut backend = build_backend(config).context("could not open spreadsheet")?;

    match command {
        AdminCommand::Status { worksheet } => {
            print!("{}", admin::status(backend.as_mut(), worksheet.as_deref())?);
        }
        AdminCommand::Setup => {
            let title = backend.spreadsheet_info()?.title;
            println!("Spreadsheet: {}", title);
            let created = admin::setup(backend.as_mut(), &admin::configured_worksheets(config))?;
            if created.is_empty() {
                println!("All configured worksheets already exist");
            }
            for name in created {
                println!("Created worksheet: {}", name);
            }
        }
        AdminCommand::Clear { worksheet, all, yes } => {
            if !yes {
                bail!("refusing to clear without --yes");
            }
            let targets = if worksheet.is_empty() {
                config.all_worksheets()
            } else {
                worksheet
            };
            for (name, rows) in admin::clear(backend.as_mut(), &targets, all)? {
                println!("Cleared {} row(s) from {}", rows, name);
            }
        }
        AdminCommand::History { run, search, limit } => show_history(config, run, search.as_deref(), limit)?,
    }
    Ok(())
}
