//! Error handling for the hostpulse engine
//!
//! This module provides the typed error taxonomy for the sampling engine:
//! source read failures, configuration rejection, actuation failures, and
//! lifecycle errors. Nothing inside the sampling loop propagates an unhandled
//! failure to the consumer; these types surface only through direct calls.

use thiserror::Error;

/// The main error type for the hostpulse engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Metric source related errors
    #[error("Metric source error: {0}")]
    Source(#[from] SourceError),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Optimization actuation errors
    #[error("Actuation error: {0}")]
    Actuation(#[from] ActuationError),

    /// Unexpected failure during one loop iteration; recovered by
    /// backoff-and-continue, surfaced here only for counting and logging
    #[error("Transient tick failure: {reason}")]
    TransientTick { reason: String },

    /// Lifecycle call made in the wrong state
    #[error("Invalid engine state: expected {expected}, was {actual}")]
    InvalidState { expected: String, actual: String },

    /// The sampling loop did not exit within the bounded stop wait
    #[error("Shutdown timed out after {waited_ms} ms")]
    ShutdownTimeout { waited_ms: u64 },

    /// Acknowledgment of an alert id not present in the log
    #[error("Unknown alert id: {id}")]
    UnknownAlert { id: u64 },

    /// Metrics registry errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metric source specific errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Source unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Source read timed out after {waited_ms} ms")]
    Timeout { waited_ms: u64 },

    #[error("Source disabled after {failures} consecutive failures")]
    Disabled { failures: u32 },
}

/// Configuration related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Configuration parsing error: {reason}")]
    ParseError { reason: String },

    #[error("Invalid configuration value: {field} = {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Configuration file permission denied: {path}")]
    PermissionDenied { path: String },
}

/// Optimization actuation errors
///
/// These never reach the engine's callers directly: the actuator converts
/// them into a non-succeeded [`crate::optimize::OptimizationResult`].
#[derive(Error, Debug, Clone)]
pub enum ActuationError {
    #[error("Action not supported on this platform: {action}")]
    Unsupported { action: String },

    #[error("Platform call failed: {reason}")]
    PlatformCall { reason: String },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, EngineError>;

/// A specialized result type for metric source reads
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// A specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// A specialized result type for actuation operations
pub type ActuationResult<T> = std::result::Result<T, ActuationError>;

impl EngineError {
    /// Check if this error is recovered locally by the sampling loop
    pub fn is_recoverable(&self) -> bool {
        match self {
            EngineError::Source(_) => true,
            EngineError::TransientTick { .. } => true,
            EngineError::Actuation(_) => true,
            EngineError::ShutdownTimeout { .. } => false,
            EngineError::InvalidState { .. } => false,
            _ => true,
        }
    }

    /// Get the error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::Source(_) => "source",
            EngineError::Config(_) => "config",
            EngineError::Actuation(_) => "actuation",
            EngineError::TransientTick { .. } => "tick",
            EngineError::InvalidState { .. } => "lifecycle",
            EngineError::ShutdownTimeout { .. } => "lifecycle",
            EngineError::UnknownAlert { .. } => "alerts",
            EngineError::Metrics(_) => "metrics",
            EngineError::Io(_) => "io",
        }
    }
}
