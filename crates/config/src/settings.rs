// Application settings
// Loaded from ~/.config/sheetwise/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// AI provider selection
///
/// Every provider except `None` speaks the OpenAI chat-completions protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AIProvider {
    /// AI features disabled
    None,
    /// Local model via Ollama's OpenAI-compatible endpoint
    Local,
    /// OpenAI API
    #[serde(rename = "openai")]
    OpenAI,
    /// Alibaba Cloud DashScope (compatible mode)
    #[default]
    #[serde(rename = "dashscope")]
    DashScope,
}

impl AIProvider {
    /// Returns true if AI features are enabled
    pub fn is_enabled(&self) -> bool {
        !matches!(self, AIProvider::None)
    }

    pub fn needs_api_key(&self) -> bool {
        matches!(self, AIProvider::OpenAI | AIProvider::DashScope)
    }

    /// Short name, used for env var lookup
    pub fn name(&self) -> &'static str {
        match self {
            AIProvider::None => "none",
            AIProvider::Local => "local",
            AIProvider::OpenAI => "openai",
            AIProvider::DashScope => "dashscope",
        }
    }

    /// Returns the default model for this provider
    pub fn default_model(&self) -> &'static str {
        match self {
            AIProvider::None => "",
            AIProvider::Local => "qwen2.5:7b",
            AIProvider::OpenAI => "gpt-4o",
            AIProvider::DashScope => "qwen-max",
        }
    }

    /// Base URL of the chat-completions API (without `/chat/completions`)
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            AIProvider::None => "",
            AIProvider::Local => "http://localhost:11434/v1",
            AIProvider::OpenAI => "https://api.openai.com/v1",
            AIProvider::DashScope => "https://dashscope.aliyuncs.com/compatible-mode/v1",
        }
    }
}

/// AI-specific settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AISettings {
    /// Selected AI provider
    pub provider: AIProvider,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Override for the provider's API base URL
    pub endpoint: Option<String>,

    /// Sampling temperature for instruction-driven transforms
    pub transform_temperature: f32,

    /// Sampling temperature for the written analysis report
    pub report_temperature: f32,

    /// Sampling temperature for chart code generation
    pub visualization_temperature: f32,

    pub transform_max_tokens: u32,
    pub report_max_tokens: u32,
    pub visualization_max_tokens: u32,

    /// HTTP timeout in seconds
    pub timeout_secs: u64,
}

impl Default for AISettings {
    fn default() -> Self {
        Self {
            provider: AIProvider::DashScope,
            model: String::new(), // Empty = use provider default
            endpoint: None,
            transform_temperature: 0.3,
            report_temperature: 0.5,
            visualization_temperature: 0.3,
            transform_max_tokens: 4000,
            report_max_tokens: 2000,
            visualization_max_tokens: 3000,
            timeout_secs: 120,
        }
    }
}

impl AISettings {
    /// Get the effective model (user-specified or provider default)
    pub fn effective_model(&self) -> &str {
        if self.model.is_empty() {
            self.provider.default_model()
        } else {
            &self.model
        }
    }

    /// Get the effective API base URL
    pub fn effective_endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(self.provider.default_endpoint())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Storage
    #[serde(rename = "storage.uploadDir")]
    pub upload_dir: Option<PathBuf>,

    #[serde(rename = "storage.processedDir")]
    pub processed_dir: Option<PathBuf>,

    #[serde(rename = "storage.analysisDir")]
    pub analysis_dir: Option<PathBuf>,

    #[serde(rename = "storage.maxUploadBytes")]
    pub max_upload_bytes: u64,

    // Normalization
    #[serde(rename = "normalize.emptyRatioThreshold")]
    pub empty_ratio_threshold: f64,

    #[serde(rename = "normalize.previewRows")]
    pub preview_rows: usize,

    // Structured-result extraction
    #[serde(rename = "extract.explanationMarker")]
    pub explanation_marker: String,

    #[serde(rename = "extract.resultsMarker")]
    pub results_marker: String,

    #[serde(rename = "extract.maxRows")]
    pub max_result_rows: usize,

    #[serde(rename = "extract.promptPreviewRows")]
    pub prompt_preview_rows: usize,

    // Diff
    #[serde(rename = "diff.sampleRows")]
    pub diff_sample_rows: usize,

    #[serde(rename = "diff.maxModifiedColumns")]
    pub diff_max_modified: usize,

    // Visualization
    #[serde(rename = "viz.maxRoutines")]
    pub viz_max_routines: usize,

    #[serde(rename = "viz.width")]
    pub viz_width: u32,

    #[serde(rename = "viz.height")]
    pub viz_height: u32,

    #[serde(rename = "viz.instructionLimit")]
    pub viz_instruction_limit: u64,

    #[serde(rename = "viz.timeoutSecs")]
    pub viz_timeout_secs: u64,

    /// Font files tried in order for chart text; first existing one wins
    #[serde(rename = "viz.fontPaths")]
    pub viz_font_paths: Vec<PathBuf>,

    // AI
    #[serde(rename = "ai", default)]
    pub ai: AISettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            // Storage
            upload_dir: None,
            processed_dir: None,
            analysis_dir: None,
            max_upload_bytes: 16 * 1024 * 1024,
            // Normalization
            empty_ratio_threshold: 0.4,
            preview_rows: 10,
            // Extraction
            explanation_marker: "=== EXPLANATION ===".to_string(),
            results_marker: "=== PROCESSED DATA ===".to_string(),
            max_result_rows: 1000,
            prompt_preview_rows: 20,
            // Diff
            diff_sample_rows: 100,
            diff_max_modified: 10,
            // Visualization
            viz_max_routines: 5,
            viz_width: 1000,
            viz_height: 600,
            viz_instruction_limit: 100_000_000,
            viz_timeout_secs: 30,
            viz_font_paths: default_font_paths(),
            // AI
            ai: AISettings::default(),
        }
    }
}

/// CJK-capable system fonts, most common locations first.
fn default_font_paths() -> Vec<PathBuf> {
    [
        "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
        "/System/Library/Fonts/PingFang.ttc",
        "C:\\Windows\\Fonts\\msyh.ttc",
        "C:\\Windows\\Fonts\\simhei.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

const DEFAULT_CONFIG: &str = r#"{
    // Storage (null = platform data directory)
    "storage.uploadDir": null,
    "storage.processedDir": null,
    "storage.analysisDir": null,
    "storage.maxUploadBytes": 16777216,

    // A row is header-like when at least this fraction of its cells is empty
    "normalize.emptyRatioThreshold": 0.4,
    "normalize.previewRows": 10,

    // Markers the model is asked to put around its explanation and its data
    "extract.explanationMarker": "=== EXPLANATION ===",
    "extract.resultsMarker": "=== PROCESSED DATA ===",
    "extract.maxRows": 1000,
    "extract.promptPreviewRows": 20,

    "diff.sampleRows": 100,
    "diff.maxModifiedColumns": 10,

    // Chart generation sandbox
    "viz.maxRoutines": 5,
    "viz.width": 1000,
    "viz.height": 600,
    "viz.instructionLimit": 100000000,
    "viz.timeoutSecs": 30,

    // Provider options: "none", "local", "openai", "dashscope"
    // API keys come from SHEETWISE_<PROVIDER>_KEY, never from this file
    "ai": {
        "provider": "dashscope",
        "model": "",
        "timeout_secs": 120
    }
}
"#;

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        Self::base_dir().join("settings.json")
    }

    /// ~/.config/sheetwise (or ./sheetwise when no config dir exists)
    fn base_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sheetwise")
    }

    /// Data root for uploads, processed files and analyses
    fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sheetwise")
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir.clone().unwrap_or_else(|| Self::data_dir().join("uploads"))
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.processed_dir.clone().unwrap_or_else(|| Self::data_dir().join("processed"))
    }

    pub fn analysis_dir(&self) -> PathBuf {
        self.analysis_dir.clone().unwrap_or_else(|| Self::data_dir().join("analysis"))
    }

    /// Point every storage directory under one root (tests, `--data-dir`)
    pub fn with_data_root(mut self, root: &Path) -> Self {
        self.upload_dir = Some(root.join("uploads"));
        self.processed_dir = Some(root.join("processed"));
        self.analysis_dir = Some(root.join("analysis"));
        self
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();

        if !path.exists() {
            let settings = Self::default();
            settings.create_default_file();
            return settings;
        }

        Self::load_from(&path)
    }

    /// Load settings from an explicit file. Missing or invalid files yield defaults.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("Error parsing {}: {}; using default settings", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Error reading {}: {}; using default settings", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse settings JSON, ignoring lines that start with `//`
    pub fn parse(contents: &str) -> Result<Self, String> {
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");

        serde_json::from_str(&cleaned).map_err(|e| e.to_string())
    }

    /// Save current settings to disk
    pub fn save(&self) -> Result<(), String> {
        let path = Self::config_path();

        // Ensure directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| e.to_string())?;

        fs::write(&path, json).map_err(|e| e.to_string())
    }

    /// Create default settings file with comments
    fn create_default_file(&self) {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::warn!("Error creating config directory: {}", e);
                return;
            }
        }

        if let Err(e) = fs::write(&path, DEFAULT_CONFIG) {
            log::warn!("Error writing default settings.json: {}", e);
        }
    }

    /// Get the config file path for display/opening
    pub fn config_path_display() -> String {
        Self::config_path().to_string_lossy().to_string()
    }
}
