//! Error types for Travel Assist.

use std::time::Duration;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
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

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Mail transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} is not configured")]
    NotConfigured { name: String },

    #[error("Failed to fetch from channel {name}: {reason}")]
    FetchFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Channel {name} timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("No LLM provider configured")]
    NoProvider,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Notification sink errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Sink {sink} delivery failed: {reason}")]
    DeliveryFailed { sink: String, reason: String },

    #[error("Sink {sink} timed out after {timeout:?}")]
    Timeout { sink: String, timeout: Duration },
}

/// Pipeline-related errors.
///
/// Inference failures never surface here; they are replaced by heuristics.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] DatabaseError),

    #[error("Channel fetch failed: {0}")]
    ChannelFetch(String),

    #[error("Mail transport is not configured")]
    TransportDisabled,

    #[error("Mail server check failed: {0}")]
    ConnectivityCheck(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
