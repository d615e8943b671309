//! Error types for the intake engine.

use std::time::Duration;

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// State store and record persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures from the consumed adapters (extraction, validation, scoring,
/// object storage). The workflow layer maps these onto user-safe replies.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Adapter {name} call failed: {reason}")]
    CallFailed { name: String, reason: String },

    #[error("Adapter {name} returned an unparseable response: {reason}")]
    InvalidResponse { name: String, reason: String },

    #[error("Adapter {name} timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

impl AdapterError {
    /// Whether this failure is a bounded-timeout expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced at the workflow boundary.
///
/// The dispatcher translates each variant into a short user-safe reply;
/// the raw error is only ever logged.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Field extraction failed: {0}")]
    Extraction(#[source] AdapterError),

    #[error("Media upload failed: {0}")]
    Upload(#[source] AdapterError),

    #[error("Validation adapter failed: {0}")]
    Validation(#[source] AdapterError),

    #[error("Scoring adapter failed: {0}")]
    Scoring(#[source] AdapterError),

    #[error("State store failed: {0}")]
    Store(#[from] StoreError),

    #[error("Record persistence failed: {0}")]
    Persistence(#[source] StoreError),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
