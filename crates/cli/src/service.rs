// Transport-agnostic request handlers.
//
// Each handler takes plain inputs (an uploaded file path, a JSON body, a file
// name) and returns an `ApiResponse` carrying an HTTP-style status and a JSON
// body. Every failure becomes a body with an `error` field; nothing panics
// out to the caller.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};

use sheetwise_ai::tasks::{generate_chart_code, generate_report, run_transform, TransformTask};
use sheetwise_ai::{ChatClient, ChatRequest, Markers, ReasoningService, ServiceError};
use sheetwise_config::{ResolvedAIConfig, Settings};
use sheetwise_core::{AnalysisRecord, DirStore, KvStore, StoreError};
use sheetwise_engine::diff::{summarize, DiffOptions};
use sheetwise_engine::normalize::NormalizeOptions;
use sheetwise_engine::stats::{basic_stats, categorical_stats, numeric_stats, DEFAULT_TOP_CATEGORIES};
use sheetwise_engine::Dataset;
use sheetwise_io::report::{
    summary_rows, write_analysis_workbook, write_html_report, AnalysisWorkbook, ReportContent,
};
use sheetwise_io::store::{ANALYSIS_EXTENSIONS, WORKBOOK_EXTENSIONS};
use sheetwise_io::{load_table, normalize_workbook, xlsx, IoError, Storage, TempArtifacts};
use sheetwise_viz::{execute, VisualizationResult, VizOptions};

/// Status plus JSON body, as an HTTP front end would send it.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    /// Missing or malformed request fields
    Validation(String),
    NotFound(String),
    Io(IoError),
    Service(ServiceError),
    /// The model answered but no table could be recovered from it
    Extraction { message: String, explanation: String },
    Store(StoreError),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Validation(_) => 400,
            ApiError::NotFound(_) => 404,
            ApiError::Io(IoError::Unsupported(_) | IoError::TooLarge { .. }) => 400,
            ApiError::Io(_) | ApiError::Service(_) | ApiError::Extraction { .. } | ApiError::Store(_) => 500,
        }
    }

    pub fn into_response(self) -> ApiResponse {
        let status = self.status();
        let body = match &self {
            ApiError::Extraction { explanation, .. } => json!({
                "error": self.to_string(),
                "aiExplanation": explanation,
            }),
            _ => json!({ "error": self.to_string() }),
        };
        ApiResponse { status, body }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Validation(msg) => write!(f, "{}", msg),
            ApiError::NotFound(msg) => write!(f, "{}", msg),
            ApiError::Io(e) => write!(f, "{}", e),
            ApiError::Service(e) => write!(f, "{}", e),
            ApiError::Extraction { message, .. } => write!(f, "{}", message),
            ApiError::Store(e) => write!(f, "record store: {}", e),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<IoError> for ApiError {
    fn from(e: IoError) -> Self {
        ApiError::Io(e)
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError::Service(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

fn respond(result: Result<Value, ApiError>) -> ApiResponse {
    match result {
        Ok(body) => ApiResponse::ok(body),
        Err(e) => {
            log::error!("request failed ({}): {}", e.status(), e);
            e.into_response()
        }
    }
}

/// Stand-in when no reasoning service is configured: every call fails with
/// the configuration problem.
struct Unconfigured(ServiceError);

impl ReasoningService for Unconfigured {
    fn complete(&self, _request: &ChatRequest) -> Result<String, ServiceError> {
        Err(self.0.clone())
    }
}

// ============================================================================
// Service
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransformRequest {
    #[serde(default)]
    instruction: String,
    #[serde(default)]
    preview_data: Value,
    #[serde(default)]
    filename: String,
}

pub struct Service {
    settings: Settings,
    storage: Storage,
    records: Box<dyn KvStore>,
    reasoning: Box<dyn ReasoningService>,
}

impl Service {
    pub fn new(settings: Settings, records: Box<dyn KvStore>, reasoning: Box<dyn ReasoningService>) -> Self {
        let storage = Storage::new(
            settings.upload_dir(),
            settings.processed_dir(),
            settings.analysis_dir(),
            settings.max_upload_bytes,
        );
        Self {
            settings,
            storage,
            records,
            reasoning,
        }
    }

    /// Service with the configured chat client and analysis records kept
    /// next to the analysis artifacts.
    pub fn from_settings(settings: Settings) -> Self {
        let config = ResolvedAIConfig::from_settings(&settings.ai);
        let reasoning: Box<dyn ReasoningService> = match ChatClient::from_config(&config) {
            Ok(client) => Box::new(client),
            Err(e) => {
                log::warn!("reasoning service unavailable: {}", e);
                Box::new(Unconfigured(e))
            }
        };
        let records = Box::new(DirStore::new(settings.analysis_dir().join("records")));
        Self::new(settings, records, reasoning)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    fn markers(&self) -> Markers {
        Markers {
            explanation: self.settings.explanation_marker.clone(),
            results: self.settings.results_marker.clone(),
        }
    }

    fn preview_json(&self, dataset: &Dataset) -> Value {
        serde_json::to_value(dataset.preview(self.settings.preview_rows)).unwrap_or(Value::Null)
    }

    // ------------------------------------------------------------------------
    // normalize
    // ------------------------------------------------------------------------

    /// Resolve merges and header rows of an uploaded workbook.
    pub fn normalize(&self, upload: &Path) -> ApiResponse {
        respond(self.try_normalize(upload))
    }

    fn try_normalize(&self, upload: &Path) -> Result<Value, ApiError> {
        let stored = self.storage.accept_upload(upload, WORKBOOK_EXTENSIONS)?;
        let opts = NormalizeOptions {
            empty_ratio_threshold: self.settings.empty_ratio_threshold,
        };
        let output = normalize_workbook(&stored, self.storage.processed_dir(), &opts)?;

        Ok(json!({
            "success": true,
            "preview": self.preview_json(&output.dataset),
            "downloadFilename": output.download_filename,
            "summary": output.summary,
        }))
    }

    // ------------------------------------------------------------------------
    // transform
    // ------------------------------------------------------------------------

    /// Apply a natural-language instruction to a processed dataset.
    pub fn transform(&self, request: &Value) -> ApiResponse {
        respond(self.try_transform(request))
    }

    fn try_transform(&self, request: &Value) -> Result<Value, ApiError> {
        let request: TransformRequest = serde_json::from_value(request.clone())
            .map_err(|e| ApiError::Validation(format!("invalid request body: {}", e)))?;
        let preview_missing = match &request.preview_data {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Object(m) => m.is_empty(),
            _ => false,
        };
        if request.instruction.trim().is_empty() || preview_missing || request.filename.is_empty() {
            return Err(ApiError::Validation(
                "missing required parameters (instruction, previewData, filename)".to_string(),
            ));
        }

        let original = self.load_transform_input(&request)?;
        let numeric = numeric_stats(&original);
        let categorical = categorical_stats(&original, DEFAULT_TOP_CATEGORIES);
        let markers = self.markers();
        let task = TransformTask {
            dataset: &original,
            instruction: &request.instruction,
            numeric: &numeric,
            categorical: &categorical,
            markers: &markers,
            preview_rows: self.settings.prompt_preview_rows,
            max_rows: self.settings.max_result_rows,
        };

        let extraction = run_transform(self.reasoning.as_ref(), &task, &self.settings.ai)?;
        if !extraction.success {
            return Err(ApiError::Extraction {
                message: "could not extract processed data from the model response".to_string(),
                explanation: extraction.explanation,
            });
        }

        let transformed = Dataset::from_records(&extraction.rows);
        fs::create_dir_all(self.storage.processed_dir()).map_err(IoError::from)?;
        let download_filename = format!("ai_processed_{}.xlsx", uuid::Uuid::new_v4());
        xlsx::write_dataset(&transformed, &self.storage.processed_path(&download_filename)?)?;

        let diff = summarize(
            &original,
            &transformed,
            &DiffOptions {
                sample_rows: self.settings.diff_sample_rows,
                max_modified: self.settings.diff_max_modified,
            },
        );
        let mut summary = serde_json::to_value(&diff).unwrap_or_else(|_| json!({}));
        if let Some(map) = summary.as_object_mut() {
            map.insert("totalRows".to_string(), json!(transformed.row_count()));
            map.insert("totalCols".to_string(), json!(transformed.col_count()));
            map.insert("instruction".to_string(), json!(request.instruction));
        }
        log::info!(
            "transform produced {}x{} ({} added, {} removed, {} modified columns)",
            transformed.row_count(),
            transformed.col_count(),
            diff.added_columns.len(),
            diff.removed_columns.len(),
            diff.modified_columns.len()
        );

        Ok(json!({
            "success": true,
            "preview": self.preview_json(&transformed),
            "summary": summary,
            "downloadFilename": download_filename,
            "aiExplanation": extraction.explanation,
        }))
    }

    /// The full processed file when it can be read, else the client's preview.
    fn load_transform_input(&self, request: &TransformRequest) -> Result<Dataset, ApiError> {
        if let Ok(path) = self.storage.processed_path(&request.filename) {
            if path.exists() {
                match xlsx::read_dataset(&path) {
                    Ok(ds) => {
                        log::debug!("loaded {} rows from {}", ds.row_count(), path.display());
                        return Ok(ds);
                    }
                    Err(e) => log::warn!("falling back to preview data: {}", e),
                }
            }
        }

        let preview = match &request.preview_data {
            Value::String(s) => serde_json::from_str::<Value>(s)
                .map_err(|e| ApiError::Validation(format!("invalid previewData: {}", e)))?,
            other => other.clone(),
        };
        Dataset::from_split_json(&preview)
            .ok_or_else(|| ApiError::Validation("previewData must have columns and data".to_string()))
    }

    // ------------------------------------------------------------------------
    // analyze
    // ------------------------------------------------------------------------

    /// Statistics, a written report and generated charts for an uploaded table.
    pub fn analyze(&self, upload: &Path) -> ApiResponse {
        respond(self.try_analyze(upload))
    }

    fn try_analyze(&self, upload: &Path) -> Result<Value, ApiError> {
        let source_filename = upload
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut temps = TempArtifacts::new();
        let stored = temps.track(self.storage.accept_upload(upload, ANALYSIS_EXTENSIONS)?);
        let dataset = load_table(&stored)?;
        temps.cleanup();

        let basic = basic_stats(&dataset);
        let numeric = numeric_stats(&dataset);
        let categorical = categorical_stats(&dataset, DEFAULT_TOP_CATEGORIES);
        let analysis_id = uuid::Uuid::new_v4().to_string();
        log::info!(
            "analysis {}: {} rows, {} columns",
            analysis_id,
            basic.rows,
            basic.columns
        );

        let ai = &self.settings.ai;
        let report = generate_report(self.reasoning.as_ref(), &dataset, &basic, &numeric, &categorical, ai);
        let visualization = match generate_chart_code(
            self.reasoning.as_ref(),
            &dataset,
            &numeric,
            &categorical,
            self.settings.viz_max_routines,
            ai,
        ) {
            Ok(code) => {
                let images_dir = self.storage.images_dir(&analysis_id)?;
                execute(&code, &dataset, &images_dir, &self.viz_options())
            }
            Err(e) => {
                log::error!("chart code generation failed: {}", e);
                VisualizationResult {
                    success: false,
                    images: Vec::new(),
                    code: String::new(),
                    error: Some(e.to_string()),
                    repairs: Vec::new(),
                    failures: Vec::new(),
                }
            }
        };

        let basic_json = serde_json::to_value(&basic).unwrap_or(Value::Null);
        let stats_rows = summary_rows(&basic_json);
        let download_filename = format!("analysis_{}.xlsx", analysis_id);
        fs::create_dir_all(self.storage.analysis_dir()).map_err(IoError::from)?;
        write_analysis_workbook(
            &AnalysisWorkbook {
                dataset: &dataset,
                stats: &stats_rows,
                report: &report,
                code: &visualization.code,
            },
            &self.storage.analysis_path(&download_filename)?,
        )?;

        let preview = self.preview_json(&dataset);
        AnalysisRecord {
            analysis_id: analysis_id.clone(),
            source_filename,
            download_filename: download_filename.clone(),
            basic_stats: basic_json.clone(),
            preview: preview.clone(),
            report: report.clone(),
            images: visualization.images.iter().map(|i| i.file_name.clone()).collect(),
            visualization_success: visualization.success,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
        .save(self.records.as_ref())?;

        Ok(json!({
            "success": true,
            "basicStats": basic_json,
            "numericStats": numeric,
            "categoricalStats": categorical,
            "preview": preview,
            "analysisReport": report,
            "visualization": visualization_json(&visualization),
            "downloadFilename": download_filename,
            "analysisId": analysis_id,
        }))
    }

    fn viz_options(&self) -> VizOptions {
        VizOptions {
            max_routines: self.settings.viz_max_routines,
            width: self.settings.viz_width,
            height: self.settings.viz_height,
            instruction_limit: self.settings.viz_instruction_limit,
            timeout: std::time::Duration::from_secs(self.settings.viz_timeout_secs),
            font_paths: self.settings.viz_font_paths.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // downloads
    // ------------------------------------------------------------------------

    /// Path of a processed workbook.
    pub fn download_processed(&self, filename: &str) -> Result<PathBuf, ApiError> {
        let path = self.storage.processed_path(filename)?;
        if path.is_file() {
            Ok(path)
        } else {
            Err(ApiError::NotFound(format!("processed file not found: {}", filename)))
        }
    }

    /// Render the HTML report for `analysis_<id>.xlsx` and return its path.
    ///
    /// Falls back to the workbook itself when no analysis record exists.
    pub fn download_analysis(&self, filename: &str) -> Result<PathBuf, ApiError> {
        let workbook = self.storage.analysis_path(filename)?;
        if !workbook.is_file() {
            return Err(ApiError::NotFound(format!("analysis file not found: {}", filename)));
        }

        let analysis_id = filename
            .strip_prefix("analysis_")
            .and_then(|s| s.strip_suffix(".xlsx"))
            .unwrap_or(filename);
        let Some(record) = AnalysisRecord::load(self.records.as_ref(), analysis_id)? else {
            log::warn!("no analysis record for {}; returning the workbook", analysis_id);
            return Ok(workbook);
        };

        let preview = Dataset::from_split_json(&record.preview).unwrap_or_default();
        let stats = summary_rows(&record.basic_stats);
        let mut images = Vec::new();
        for name in &record.images {
            let path = self.storage.image_path(analysis_id, name)?;
            match fs::read(&path) {
                Ok(bytes) => images.push(STANDARD.encode(bytes)),
                Err(e) => log::warn!("skipping image {}: {}", path.display(), e),
            }
        }

        let generated_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let report_path = self.storage.report_path(analysis_id)?;
        write_html_report(
            &ReportContent {
                title: &record.source_filename,
                generated_at: &generated_at,
                stats: &stats,
                preview: &preview,
                report: &record.report,
                images: &images,
            },
            &report_path,
        )?;
        Ok(report_path)
    }

    /// Path of one generated chart.
    pub fn analysis_image(&self, analysis_id: &str, image_name: &str) -> Result<PathBuf, ApiError> {
        let path = self.storage.image_path(analysis_id, image_name)?;
        if path.is_file() {
            Ok(path)
        } else {
            Err(ApiError::NotFound(format!("image not found: {}/{}", analysis_id, image_name)))
        }
    }
}

/// `{success, images, code}` on success, `{success, error, code}` otherwise.
pub fn visualization_json(result: &VisualizationResult) -> Value {
    let mut body = if result.success {
        json!({
            "success": true,
            "images": result.images.iter().map(|i| i.base64.as_str()).collect::<Vec<_>>(),
            "code": result.code,
        })
    } else {
        json!({
            "success": false,
            "error": result.error.clone().unwrap_or_default(),
            "code": result.code,
        })
    };
    if !result.repairs.is_empty() {
        body["repairs"] = serde_json::to_value(&result.repairs).unwrap_or(Value::Null);
    }
    body
}
