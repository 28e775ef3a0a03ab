// AI configuration and secrets management
//
// API keys are looked up from:
// 1. System keychain (when built with the `keychain` feature)
// 2. Environment variables (SHEETWISE_<PROVIDER>_KEY)
//
// Keys are NEVER stored in settings.json

use std::env;

use crate::settings::{AIProvider, AISettings, Settings};

/// Service name for keychain storage
#[cfg(feature = "keychain")]
const KEYCHAIN_SERVICE: &str = "sheetwise";

/// Source of an API key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Key retrieved from system keychain
    Keychain,
    /// Key retrieved from environment variable
    Environment,
    /// No key found
    None,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Keychain => "keychain",
            KeySource::Environment => "environment",
            KeySource::None => "none",
        }
    }
}

/// Result of key lookup
#[derive(Debug, Clone)]
pub struct KeyLookup {
    pub key: Option<String>,
    pub source: KeySource,
}

/// Get the environment variable name for a provider
pub fn env_var_name(provider: &str) -> String {
    format!("SHEETWISE_{}_KEY", provider.to_uppercase())
}

#[cfg(feature = "keychain")]
fn keychain_account(provider: &str) -> String {
    format!("ai/{}", provider.to_lowercase())
}

/// Get an API key for the specified provider
pub fn get_api_key(provider: &str) -> KeyLookup {
    #[cfg(feature = "keychain")]
    {
        if let Ok(entry) = keyring::Entry::new(KEYCHAIN_SERVICE, &keychain_account(provider)) {
            if let Ok(key) = entry.get_password() {
                return KeyLookup {
                    key: Some(key),
                    source: KeySource::Keychain,
                };
            }
        }
    }

    let env_name = env_var_name(provider);
    if let Ok(key) = env::var(&env_name) {
        if !key.is_empty() {
            return KeyLookup {
                key: Some(key),
                source: KeySource::Environment,
            };
        }
    }

    KeyLookup {
        key: None,
        source: KeySource::None,
    }
}

/// Store an API key in the system keychain
#[cfg(feature = "keychain")]
pub fn set_api_key(provider: &str, key: &str) -> Result<(), String> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, &keychain_account(provider))
        .map_err(|e| format!("Failed to create keychain entry: {}", e))?;

    entry
        .set_password(key)
        .map_err(|e| format!("Failed to store key in keychain: {}", e))
}

#[cfg(not(feature = "keychain"))]
pub fn set_api_key(_provider: &str, _key: &str) -> Result<(), String> {
    Err("Keychain support not enabled. Set SHEETWISE_<PROVIDER>_KEY environment variable instead.".to_string())
}

// ============================================================================
// Resolved AI Configuration (single source of truth)
// ============================================================================

/// Status of the AI configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AIConfigStatus {
    /// AI is disabled (provider = None)
    Disabled,
    /// Configuration is complete
    Ready,
    /// Provider is configured but API key is missing
    MissingKey,
}

impl AIConfigStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Ready => "ready",
            Self::MissingKey => "missing_key",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// The effective AI configuration, fully resolved from all sources.
#[derive(Debug, Clone)]
pub struct ResolvedAIConfig {
    pub provider: AIProvider,
    /// Effective model (resolved from settings or provider default)
    pub model: String,
    /// Effective API base URL
    pub endpoint: String,
    /// API key (if available and provider needs one)
    pub api_key: Option<String>,
    pub key_source: KeySource,
    pub timeout_secs: u64,
    pub status: AIConfigStatus,
    /// Human-readable reason if not ready
    pub blocking_reason: Option<String>,
}

impl ResolvedAIConfig {
    /// Resolve the effective AI configuration from settings.
    pub fn from_settings(settings: &AISettings) -> Self {
        let provider = settings.provider;

        if !provider.is_enabled() {
            return Self {
                provider,
                model: String::new(),
                endpoint: String::new(),
                api_key: None,
                key_source: KeySource::None,
                timeout_secs: settings.timeout_secs,
                status: AIConfigStatus::Disabled,
                blocking_reason: Some("AI provider is set to \"none\"".to_string()),
            };
        }

        let (api_key, key_source, status, blocking_reason) = if provider.needs_api_key() {
            let lookup = get_api_key(provider.name());
            match lookup.key {
                Some(key) => (Some(key), lookup.source, AIConfigStatus::Ready, None),
                None => (
                    None,
                    KeySource::None,
                    AIConfigStatus::MissingKey,
                    Some(format!("No API key found. Set {}", env_var_name(provider.name()))),
                ),
            }
        } else {
            // Local provider doesn't need a key
            (None, KeySource::None, AIConfigStatus::Ready, None)
        };

        Self {
            provider,
            model: settings.effective_model().to_string(),
            endpoint: settings.effective_endpoint().trim_end_matches('/').to_string(),
            api_key,
            key_source,
            timeout_secs: settings.timeout_secs,
            status,
            blocking_reason,
        }
    }

    /// Load settings and resolve in one call (convenience method)
    pub fn load() -> Self {
        let settings = Settings::load();
        Self::from_settings(&settings.ai)
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_name() {
        assert_eq!(env_var_name("dashscope"), "SHEETWISE_DASHSCOPE_KEY");
    }

    #[test]
    fn test_disabled_provider() {
        let settings = AISettings { provider: AIProvider::None, ..AISettings::default() };
        let resolved = ResolvedAIConfig::from_settings(&settings);
        assert_eq!(resolved.status, AIConfigStatus::Disabled);
        assert!(!resolved.status.is_ready());
    }

    #[test]
    fn test_local_provider_needs_no_key() {
        let settings = AISettings {
            provider: AIProvider::Local,
            endpoint: Some("http://127.0.0.1:9999/v1/".into()),
            ..AISettings::default()
        };
        let resolved = ResolvedAIConfig::from_settings(&settings);
        assert_eq!(resolved.status, AIConfigStatus::Ready);
        assert_eq!(resolved.endpoint, "http://127.0.0.1:9999/v1");
        assert_eq!(resolved.model, "qwen2.5:7b");
    }

    #[test]
    fn test_env_key_lookup() {
        env::set_var("SHEETWISE_OPENAI_KEY", "sk-test");
        let settings = AISettings { provider: AIProvider::OpenAI, ..AISettings::default() };
        let resolved = ResolvedAIConfig::from_settings(&settings);
        assert_eq!(resolved.api_key.as_deref(), Some("sk-test"));
        assert_eq!(resolved.key_source, KeySource::Environment);
        assert!(resolved.status.is_ready());
        env::remove_var("SHEETWISE_OPENAI_KEY");
    }
}
