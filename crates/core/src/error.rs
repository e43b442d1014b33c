//! Error types for the convoy domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator boundary has its own error enum. Admission rejects,
//! duplicates, and suppressed runs are policy outcomes and never show up here.

use thiserror::Error;

/// The top-level error type for all convoy operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Activity error: {0}")]
    Activity(#[from] ActivityError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Transport not configured: {0}")]
    NotConfigured(String),

    #[error("{operation} failed: {reason}")]
    RequestFailed { operation: String, reason: String },

    #[error("{operation} timed out after {timeout_secs}s")]
    Timeout { operation: String, timeout_secs: u64 },

    #[error("Unexpected transport response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Tool {0} is only available in group chats")]
    GroupOnly(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("{0} is not configured")]
    NotConfigured(String),
}

/// Failure of one activity attempt at the durable boundary.
#[derive(Debug, Clone, Error)]
pub enum ActivityError {
    /// The engine may run the activity again.
    #[error("Activity {activity} failed: {reason}")]
    Retryable { activity: String, reason: String },

    /// Retrying cannot help (bad input, contract violation).
    #[error("Activity {activity} failed permanently: {reason}")]
    Fatal { activity: String, reason: String },

    #[error("Activity payload could not be encoded: {0}")]
    Serialization(String),
}

impl ActivityError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    #[error("Workflow {0} was terminated by a newer run")]
    Terminated(String),

    #[error("Activity {activity} gave up after {attempts} attempts: {reason}")]
    ActivityExhausted {
        activity: String,
        attempts: u32,
        reason: String,
    },

    #[error("Durable engine unavailable: {0}")]
    EngineUnavailable(String),
}
