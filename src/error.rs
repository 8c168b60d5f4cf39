//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout Bookshelf.
//! All errors are structured and map to specific error codes for JSON output.
//!
//! # Error Categories
//! - `InvalidInput`: Malformed write body or missing required parameters
//! - `ConnectionFailed`: Store connection or pool errors
//! - `QueryFailed`: Read query or row-scan errors
//! - `TransactionFailed`: Any failure inside the multi-step write (always rolled back)
//! - `EngineError`: Engine-specific database errors
//! - `ConfigError`: Configuration file or connection registry errors
//!
//! Malformed read parameters are never errors: the query parser degrades them
//! to defaults instead.

use thiserror::Error;

/// Main error type for Bookshelf operations
#[derive(Error, Debug)]
pub enum BookshelfError {
    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Database connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Read query execution failed
    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    /// Write transaction failed and was rolled back
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Engine-specific database error
    #[error("Engine error ({engine}): {detail}")]
    EngineError { engine: String, detail: String },

    /// Configuration error (file not found, invalid JSON, etc.)
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl BookshelfError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::QueryFailed(_) => "QUERY_FAILED",
            Self::TransactionFailed(_) => "TRANSACTION_FAILED",
            Self::EngineError { .. } => "ENGINE_ERROR",
            Self::ConfigError(_) => "CONFIG_ERROR",
        }
    }

    /// Whether the caller sent something unusable (as opposed to a server-side failure)
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    /// Get human-readable error message (no credentials or connection strings)
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create a query failed error
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::QueryFailed(message.into())
    }

    /// Create a transaction failed error
    pub fn transaction_failed(message: impl Into<String>) -> Self {
        Self::TransactionFailed(message.into())
    }

    /// Create an engine-specific error
    pub fn engine_error(engine: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::EngineError {
            engine: engine.into(),
            detail: detail.into(),
        }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }
}

/// Result type alias for Bookshelf operations
pub type Result<T> = std::result::Result<T, BookshelfError>;
