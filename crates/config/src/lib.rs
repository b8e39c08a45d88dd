//! Configuration loading, validation, and management for Evaloop.
//!
//! Loads configuration from `~/.evaloop/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.evaloop/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Router key of the provider used for every oracle call
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Model used for constrained function calls
    #[serde(default = "default_functions_model")]
    pub functions_model: String,

    /// Model used for free-text completions
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound on every oracle call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub capabilities: CapabilitiesConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "localai".into()
}
fn default_functions_model() -> String {
    "functions".into()
}
fn default_llm_model() -> String {
    "gpt-4".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_request_timeout() -> u64 {
    1200
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("functions_model", &self.functions_model)
            .field("llm_model", &self.llm_model)
            .field("temperature", &self.temperature)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("orchestrator", &self.orchestrator)
            .field("memory", &self.memory)
            .field("capabilities", &self.capabilities)
            .field("providers", &self.providers)
            .finish()
    }
}

/// Which results the critic reviews.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticMode {
    Off,
    /// Only non-empty plans
    #[default]
    Plans,
    /// Plans and single-action results
    All,
}

impl std::str::FromStr for CriticMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "plans" => Ok(Self::Plans),
            "all" => Ok(Self::All),
            other => Err(ConfigError::ValidationError(format!(
                "unknown critic mode '{other}' (expected off, plans or all)"
            ))),
        }
    }
}

/// Knobs of the evaluate loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub critic: CriticMode,

    /// Ask after each action round whether another action is needed
    #[serde(default)]
    pub re_evaluate: bool,

    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Summarize digests and subtask instructions through the oracle
    #[serde(default)]
    pub postprocess: bool,

    /// Feed earlier subtask results into later subtask prompts
    #[serde(default)]
    pub subtask_context: bool,

    /// Restrict classification to this single action (empty = none)
    #[serde(default)]
    pub force_action: String,

    /// Planner instruction override (empty = built-in)
    #[serde(default)]
    pub plan_message: String,
}

fn default_max_rounds() -> usize {
    3
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            critic: CriticMode::default(),
            re_evaluate: false,
            max_rounds: default_max_rounds(),
            postprocess: false,
            subtask_context: false,
            force_action: String::new(),
            plan_message: String::new(),
        }
    }
}

impl OrchestratorConfig {
    pub fn force_action(&self) -> Option<&str> {
        Some(self.force_action.trim()).filter(|s| !s.is_empty())
    }

    pub fn plan_message(&self) -> Option<&str> {
        Some(self.plan_message.trim()).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "file" or "in_memory"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// JSONL file for the file backend (empty = under the config dir)
    #[serde(default)]
    pub path: String,

    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

fn default_memory_backend() -> String {
    "file".into()
}
fn default_search_limit() -> usize {
    5
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: String::new(),
            search_limit: default_search_limit(),
        }
    }
}

impl MemoryConfig {
    pub fn resolved_path(&self) -> PathBuf {
        if self.path.trim().is_empty() {
            AppConfig::config_dir().join("memory").join("memories.jsonl")
        } else {
            PathBuf::from(&self.path)
        }
    }
}

/// Settings for the built-in capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitiesConfig {
    /// Instant Answer endpoint used by `search_internet`
    #[serde(default = "default_search_url")]
    pub search_url: String,

    /// Root directory for `write_file` (empty = under the config dir)
    #[serde(default)]
    pub workspace: String,
}

fn default_search_url() -> String {
    "https://api.duckduckgo.com".into()
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            search_url: default_search_url(),
            workspace: String::new(),
        }
    }
}

impl CapabilitiesConfig {
    pub fn resolved_workspace(&self) -> PathBuf {
        if self.workspace.trim().is_empty() {
            AppConfig::workspace_dir()
        } else {
            PathBuf::from(&self.workspace)
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.evaloop/config.toml).
    ///
    /// Environment variables override the file:
    /// - `EVALOOP_API_KEY`, then `OPENAI_API_KEY`
    /// - `OPENAI_API_BASE` (the default provider's URL, `/v1` appended)
    /// - `FUNCTIONS_MODEL`, `LLM_MODEL`, `EVALOOP_PROVIDER`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides read through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = var("EVALOOP_API_KEY").or_else(|| var("OPENAI_API_KEY"));
        }

        if let Some(provider) = var("EVALOOP_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(base) = var("OPENAI_API_BASE") {
            let url = format!("{}/v1", base.trim_end_matches('/'));
            self.providers
                .entry(self.default_provider.clone())
                .or_default()
                .api_url = Some(url);
        }

        if let Some(model) = var("FUNCTIONS_MODEL") {
            self.functions_model = model;
        }
        if let Some(model) = var("LLM_MODEL") {
            self.llm_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".evaloop")
    }

    /// Get the workspace directory path.
    pub fn workspace_dir() -> PathBuf {
        Self::config_dir().join("workspace")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_secs must be > 0".into(),
            ));
        }

        if self.orchestrator.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_rounds must be >= 1".into(),
            ));
        }

        match self.memory.backend.as_str() {
            "file" | "in_memory" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown memory backend '{other}'"
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            functions_model: default_functions_model(),
            llm_model: default_llm_model(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout(),
            orchestrator: OrchestratorConfig::default(),
            memory: MemoryConfig::default(),
            capabilities: CapabilitiesConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for evaloop_core::Error {
    fn from(e: ConfigError) -> Self {
        evaloop_core::Error::Config { message: e.to_string() }
    }
}
