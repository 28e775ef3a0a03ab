// sheetwise CLI - spreadsheet normalization, AI transforms and analysis
//
// Every subcommand runs one service handler and prints its JSON body.

mod logger;

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::json;

use sheetwise_cli::exit_codes::{
    exit_code_for, EXIT_AI_DISABLED, EXIT_AI_MISSING_KEY, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE,
    EXIT_VIZ_NO_CHARTS,
};
use sheetwise_cli::{ApiError, ApiResponse, Service};
use sheetwise_config::ai::AIConfigStatus;
use sheetwise_config::{ResolvedAIConfig, Settings};

#[derive(Parser)]
#[command(name = "sheetwise")]
#[command(about = "Normalize messy spreadsheets, transform them with natural language, chart them")]
#[command(version)]
#[command(long_version = LONG_VERSION)]
struct Cli {
    /// Settings file (default: ~/.config/sheetwise/settings.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Put uploads, processed files and analyses under this directory
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// More log output on stderr (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (", env!("SHEETWISE_COMMIT"), ")",
    "\nbuild:   ", env!("SHEETWISE_PROFILE"),
    "\ntarget:  ", env!("SHEETWISE_TARGET"),
);

#[derive(Subcommand)]
enum Commands {
    /// Fill merged cells, detect header rows and write a flat table
    #[command(after_help = "\
Examples:
  sheetwise normalize report.xlsx
  sheetwise normalize legacy.xls --data-dir ./work")]
    Normalize {
        /// .xls or .xlsx workbook
        file: PathBuf,
    },

    /// Apply a natural-language instruction to a processed table
    #[command(after_help = "\
Examples:
  sheetwise transform --filename processed_1234.xlsx --instruction 'sort by total, descending'
  sheetwise transform --filename processed_1234.xlsx --instruction 'add a margin column' \\
      --preview-json preview.json")]
    Transform {
        #[arg(long, short = 'i')]
        instruction: String,

        /// Processed file name as returned by `normalize`
        #[arg(long, short = 'f')]
        filename: String,

        /// Preview `{columns, data}` JSON used when the processed file cannot be read
        #[arg(long, value_name = "PATH")]
        preview_json: Option<PathBuf>,
    },

    /// Statistics, an AI-written report and generated charts
    Analyze {
        /// .xls, .xlsx or .csv file
        file: PathBuf,

        /// Exit non-zero when no chart could be produced
        #[arg(long)]
        require_charts: bool,
    },

    /// Print the path of a generated chart
    Image {
        analysis_id: String,
        /// e.g. plot_1.png
        name: String,
    },

    /// Copy a processed file, or the rendered report of an analysis
    Download {
        filename: String,

        /// `filename` is an `analysis_<id>.xlsx`; render its HTML report
        #[arg(long)]
        analysis: bool,

        /// Destination (default: print the stored path)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Show the resolved AI configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    if let Some(root) = &cli.data_dir {
        settings = settings.with_data_root(root);
    }

    let result = match cli.command {
        Commands::Config => cmd_config(&settings),
        command => run(&Service::from_settings(settings), command),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    /// Error already reported on stdout as a JSON body.
    fn reported(code: u8) -> Self {
        Self { code, message: String::new(), hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ApiError> for CliError {
    fn from(e: ApiError) -> Self {
        let response = e.into_response();
        let code = exit_code_for(&response);
        let message = response.body["error"].as_str().unwrap_or_default().to_string();
        Self { code, message, hint: None }
    }
}

fn print_json(value: &serde_json::Value) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CliError::io(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

/// Print the body; a non-200 response becomes the matching exit code.
fn emit(response: ApiResponse) -> Result<(), CliError> {
    print_json(&response.body)?;
    if response.is_success() {
        Ok(())
    } else {
        Err(CliError::reported(exit_code_for(&response)))
    }
}

fn run(service: &Service, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Normalize { file } => emit(service.normalize(&file)),
        Commands::Transform { instruction, filename, preview_json } => {
            cmd_transform(service, instruction, filename, preview_json)
        }
        Commands::Analyze { file, require_charts } => {
            let response = service.analyze(&file);
            let charts = response.body["visualization"]["success"].as_bool().unwrap_or(false);
            emit(response)?;
            if require_charts && !charts {
                return Err(CliError {
                    code: EXIT_VIZ_NO_CHARTS,
                    message: "no chart was produced".to_string(),
                    hint: None,
                });
            }
            Ok(())
        }
        Commands::Image { analysis_id, name } => {
            let path = service.analysis_image(&analysis_id, &name)?;
            println!("{}", path.display());
            Ok(())
        }
        Commands::Download { filename, analysis, output } => {
            let path = if analysis {
                service.download_analysis(&filename)?
            } else {
                service.download_processed(&filename)?
            };
            match output {
                Some(dest) => {
                    fs::copy(&path, &dest).map_err(|e| {
                        CliError::io(format!("Failed to write {}: {}", dest.display(), e))
                    })?;
                    println!("{}", dest.display());
                }
                None => println!("{}", path.display()),
            }
            Ok(())
        }
        Commands::Config => cmd_config(service.settings()),
    }
}

// ============================================================================
// transform
// ============================================================================

fn cmd_transform(
    service: &Service,
    instruction: String,
    filename: String,
    preview_json: Option<PathBuf>,
) -> Result<(), CliError> {
    let preview = match preview_json {
        Some(path) => {
            let text = fs::read_to_string(&path)
                .map_err(|e| CliError::io(format!("Failed to read {}: {}", path.display(), e)))?;
            serde_json::from_str::<serde_json::Value>(&text)
                .map_err(|e| CliError::args(format!("invalid preview JSON: {}", e)))?
        }
        None => preview_from_processed(service, &filename)?,
    };

    emit(service.transform(&json!({
        "instruction": instruction,
        "previewData": preview,
        "filename": filename,
    })))
}

/// Preview of a stored processed file, so `--preview-json` can be omitted.
fn preview_from_processed(service: &Service, filename: &str) -> Result<serde_json::Value, CliError> {
    let path = service.download_processed(filename).map_err(|e| {
        CliError::from(e).with_hint("run `sheetwise normalize` first or pass --preview-json")
    })?;
    let dataset = sheetwise_io::xlsx::read_dataset(&path).map_err(|e| CliError::io(e.to_string()))?;
    serde_json::to_value(dataset.preview(service.settings().preview_rows))
        .map_err(|e| CliError::io(e.to_string()))
}

// ============================================================================
// config
// ============================================================================

fn cmd_config(settings: &Settings) -> Result<(), CliError> {
    let config = ResolvedAIConfig::from_settings(&settings.ai);
    print_json(&json!({
        "status": config.status.as_str(),
        "blockingReason": config.blocking_reason,
        "provider": config.provider_name(),
        "model": config.model,
        "endpoint": config.endpoint,
        "key": if config.api_key.is_some() { "present" } else { "missing" },
        "keySource": config.key_source.as_str(),
        "timeoutSecs": config.timeout_secs,
        "settingsFile": Settings::config_path_display(),
        "uploadDir": settings.upload_dir(),
        "processedDir": settings.processed_dir(),
        "analysisDir": settings.analysis_dir(),
    }))?;

    match config.status {
        AIConfigStatus::Ready => Ok(()),
        AIConfigStatus::Disabled => Err(CliError::reported(EXIT_AI_DISABLED)),
        AIConfigStatus::MissingKey => Err(CliError::reported(EXIT_AI_MISSING_KEY)
            .with_hint(config.blocking_reason.unwrap_or_default())),
    }
}
