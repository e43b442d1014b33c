//! Configuration loading, validation, and management for convoy.
//!
//! Loads configuration from `~/.convoy/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.convoy/config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Conversation and tool-loop limits
    #[serde(default)]
    pub agent: AgentConfig,

    /// Per-call timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Inline vs. durable execution
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Messaging platform connection
    #[serde(default)]
    pub transport: TransportConfig,

    /// HTTP server
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("model", &self.model)
            .field("agent", &self.agent)
            .field("timeouts", &self.timeouts)
            .field("workflow", &self.workflow)
            .field("transport", &self.transport)
            .field("gateway", &self.gateway)
            .field("logging", &self.logging)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Offer the vendor's hosted image generation tool
    #[serde(default)]
    pub image_generation: bool,

    /// Offer the vendor's hosted web search tool
    #[serde(default)]
    pub web_search: bool,
}

fn default_model() -> String {
    "gpt-4.1-mini".into()
}
fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_output_tokens() -> u32 {
    600
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_url: default_api_url(),
            api_key: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            image_generation: false,
            web_search: false,
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("image_generation", &self.image_generation)
            .field("web_search", &self.web_search)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Turns kept per chat
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,

    #[serde(default = "default_max_attachments")]
    pub max_image_attachments: usize,

    #[serde(default = "default_max_attachments")]
    pub max_file_attachments: usize,

    /// Platform messages fetched when a chat is first seen
    #[serde(default = "default_max_history")]
    pub hydration_window: usize,

    /// Only this service is answered when the message names one
    #[serde(default = "default_supported_service")]
    pub supported_service: String,

    /// Prefix that wakes the assistant in silent mode
    #[serde(default = "default_activation_token")]
    pub activation_token: String,

    /// Display name the assistant uses for itself
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,

    /// Run independent tool calls from one model turn concurrently
    #[serde(default)]
    pub parallel_tool_calls: bool,
}

fn default_max_history() -> usize {
    50
}
fn default_max_tool_iterations() -> usize {
    50
}
fn default_max_attachments() -> usize {
    4
}
fn default_supported_service() -> String {
    "iMessage".into()
}
fn default_activation_token() -> String {
    "chat".into()
}
fn default_assistant_name() -> String {
    "Convoy".into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            max_tool_iterations: default_max_tool_iterations(),
            max_image_attachments: default_max_attachments(),
            max_file_attachments: default_max_attachments(),
            hydration_window: default_max_history(),
            supported_service: default_supported_service(),
            activation_token: default_activation_token(),
            assistant_name: default_assistant_name(),
            parallel_tool_calls: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_llm_secs")]
    pub llm_secs: u64,

    #[serde(default = "default_tool_secs")]
    pub tool_secs: u64,

    #[serde(default = "default_transport_secs")]
    pub transport_secs: u64,
}

fn default_llm_secs() -> u64 {
    120
}
fn default_tool_secs() -> u64 {
    30
}
fn default_transport_secs() -> u64 {
    15
}

impl TimeoutConfig {
    pub fn llm(&self) -> Duration {
        Duration::from_secs(self.llm_secs)
    }

    pub fn tool(&self) -> Duration {
        Duration::from_secs(self.tool_secs)
    }

    pub fn transport(&self) -> Duration {
        Duration::from_secs(self.transport_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm_secs: default_llm_secs(),
            tool_secs: default_tool_secs(),
            transport_secs: default_transport_secs(),
        }
    }
}

/// Execution mode selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowMode {
    #[default]
    Inline,
    Durable,
}

impl std::str::FromStr for WorkflowMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(Self::Inline),
            "durable" => Ok(Self::Durable),
            other => Err(ConfigError::ValidationError(format!(
                "unknown workflow mode '{other}' (expected inline or durable)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub mode: WorkflowMode,

    /// Prefix for the chat-scoped workflow id
    #[serde(default = "default_id_prefix")]
    pub id_prefix: String,

    #[serde(default = "default_max_activity_attempts")]
    pub max_activity_attempts: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_id_prefix() -> String {
    "chat-".into()
}
fn default_max_activity_attempts() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    500
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            mode: WorkflowMode::Inline,
            id_prefix: default_id_prefix(),
            max_activity_attempts: default_max_activity_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_transport_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// HMAC-SHA256 secret for inbound webhooks. Unset disables validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,
}

fn default_transport_url() -> String {
    "http://127.0.0.1:1234".into()
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: default_transport_url(),
            password: None,
            webhook_secret: None,
        }
    }
}

impl std::fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConfig")
            .field("base_url", &self.base_url)
            .field("password", &redact(&self.password))
            .field("webhook_secret", &redact(&self.webhook_secret))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8787
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

impl AppConfig {
    /// Load configuration from the default path (~/.convoy/config.toml).
    ///
    /// Environment overrides:
    /// - `CONVOY_API_KEY`, then `OPENAI_API_KEY` (only when the file has no key)
    /// - `CONVOY_MODEL`
    /// - `CONVOY_TRANSPORT_URL`, `CONVOY_TRANSPORT_PASSWORD`
    /// - `CONVOY_WORKFLOW_MODE`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::default_path())
    }

    /// Load `path`, then apply the environment overrides listed on [`AppConfig::load`].
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
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

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if self.model.api_key.is_none() {
            self.model.api_key = var("CONVOY_API_KEY").or_else(|| var("OPENAI_API_KEY"));
        }
        if let Some(model) = var("CONVOY_MODEL") {
            self.model.model = model;
        }
        if let Some(url) = var("CONVOY_TRANSPORT_URL") {
            self.transport.base_url = url;
        }
        if let Some(password) = var("CONVOY_TRANSPORT_PASSWORD") {
            self.transport.password = Some(password);
        }
        if let Some(mode) = var("CONVOY_WORKFLOW_MODE") {
            self.workflow.mode = mode.parse()?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".convoy")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.agent.max_history == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_history must be at least 1".into(),
            ));
        }
        if self.agent.max_tool_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_iterations must be at least 1".into(),
            ));
        }
        if self.workflow.max_activity_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "workflow.max_activity_attempts must be at least 1".into(),
            ));
        }
        if self.agent.activation_token.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "agent.activation_token must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.model.api_key.is_some()
    }

    /// Generate a default config TOML string (for `init-config`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
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
