// Reasoning-service client
//
// Every supported provider exposes the OpenAI chat-completions protocol, so a
// single blocking client covers them all. Handlers depend on the
// `ReasoningService` trait so tests can substitute canned responses.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sheetwise_config::ai::{AIConfigStatus, ResolvedAIConfig};

/// Error from the reasoning service
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// Provider disabled or not usable
    NotConfigured(String),
    /// API key missing
    MissingKey(String),
    /// Network error
    Network(String),
    /// API error response
    Api { status: u16, message: String },
    /// Failed to parse response
    Parse(String),
    /// Provider returned unexpected format
    InvalidResponse(String),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::NotConfigured(msg) => write!(f, "AI not configured: {}", msg),
            ServiceError::MissingKey(msg) => write!(f, "API key not configured: {}", msg),
            ServiceError::Network(msg) => write!(f, "Network error: {}", msg),
            ServiceError::Api { status, message } => write!(f, "API error ({}): {}", status, message),
            ServiceError::Parse(msg) => write!(f, "Failed to parse response: {}", msg),
            ServiceError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
        }
    }
}

impl std::error::Error for ServiceError {}

/// One system + user exchange with its sampling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Anything that turns a prompt into response text.
pub trait ReasoningService {
    fn complete(&self, request: &ChatRequest) -> Result<String, ServiceError>;
}

// ============================================================================
// Chat-completions wire types
// ============================================================================

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<CompletionMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct CompletionMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionResponseMessage,
}

#[derive(Deserialize)]
struct CompletionResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompletionError {
    error: CompletionErrorDetail,
}

#[derive(Deserialize)]
struct CompletionErrorDetail {
    message: String,
}

// ============================================================================
// Client
// ============================================================================

/// Blocking chat-completions client.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl ChatClient {
    /// Build a client from the resolved configuration, refusing when the
    /// provider is disabled or its key is missing.
    pub fn from_config(config: &ResolvedAIConfig) -> Result<Self, ServiceError> {
        match config.status {
            AIConfigStatus::Disabled => {
                return Err(ServiceError::NotConfigured(
                    config.blocking_reason.clone().unwrap_or_else(|| "AI is disabled".to_string()),
                ));
            }
            AIConfigStatus::MissingKey => {
                return Err(ServiceError::MissingKey(
                    config.blocking_reason.clone().unwrap_or_default(),
                ));
            }
            AIConfigStatus::Ready => {}
        }

        Self::with_base_url(
            &config.endpoint,
            &config.model,
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Client against an explicit API base URL (without `/chat/completions`).
    pub fn with_base_url(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(format!("sheetwise/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl ReasoningService for ChatClient {
    fn complete(&self, request: &ChatRequest) -> Result<String, ServiceError> {
        let body = CompletionRequest {
            model: &self.model,
            messages: vec![
                CompletionMessage {
                    role: "system",
                    content: &request.system,
                },
                CompletionMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);
        log::debug!("POST {} (model {}, max_tokens {})", url, self.model, request.max_tokens);

        let mut builder = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().map_err(|e| ServiceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().unwrap_or_default();
            let message = serde_json::from_str::<CompletionError>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            log::warn!("reasoning service returned {}: {}", status.as_u16(), message);
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .map_err(|e| ServiceError::Parse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ServiceError::InvalidResponse("No choices in response".to_string()))
    }
}
