//! # Application Error Types
//!
//! This module defines common error types used throughout the stashbot application.
//! It provides structured error handling for the bot core and its collaborators.

use std::fmt;

use crate::removal_api::RemovalError;

/// General application error type for consistent error handling
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Configuration validation errors
    Config(String),
    /// Validation errors (file size, file type, colors, etc.)
    Validation(String),
    /// Actions referencing an expired or absent session
    Session(String),
    /// Database operation errors
    Database(String),
    /// Background-removal API errors
    Removal(RemovalError),
    /// Network/communication errors
    Network(String),
    /// Image decoding and compositing errors
    Image(String),
    /// Internal application errors
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "[CONFIG] {}", msg),
            AppError::Validation(msg) => write!(f, "[VALIDATION] {}", msg),
            AppError::Session(msg) => write!(f, "[SESSION] {}", msg),
            AppError::Database(msg) => write!(f, "[DATABASE] {}", msg),
            AppError::Removal(err) => write!(f, "[REMOVAL] {}", err),
            AppError::Network(msg) => write!(f, "[NETWORK] {}", msg),
            AppError::Image(msg) => write!(f, "[IMAGE] {}", msg),
            AppError::Internal(msg) => write!(f, "[INTERNAL] {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Image(err.to_string())
    }
}

impl From<RemovalError> for AppError {
    fn from(err: RemovalError) -> Self {
        AppError::Removal(err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Network(err.to_string())
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Standardized error logging utilities for consistent error reporting across the application
pub mod error_logging {
    use tracing::error;

    /// Log database operation errors with contextual information
    pub fn log_database_error(
        error: &impl std::fmt::Display,
        operation: &str,
        user_id: Option<i64>,
        additional_context: Option<&[(&str, &dyn std::fmt::Display)]>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            user_id = ?user_id,
            additional_context = ?additional_context.map(|ctx| ctx.iter().map(|(k,v)| format!("{}={}", k, v)).collect::<Vec<_>>().join(", ")),
            "Database operation failed"
        );
    }

    /// Log background-removal API failures with the status class that caused them
    pub fn log_removal_error(
        error: &crate::removal_api::RemovalError,
        user_id: i64,
        image_size: usize,
        duration: std::time::Duration,
    ) {
        error!(
            error = %error,
            status = ?error.status_code(),
            user_id = %user_id,
            image_size_bytes = %image_size,
            duration_ms = %duration.as_millis(),
            "Background removal failed"
        );
    }

    /// Log network/communication errors with connection context
    pub fn log_network_error(
        error: &impl std::fmt::Display,
        operation: &str,
        endpoint: Option<&str>,
        user_id: Option<i64>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            endpoint = ?endpoint,
            user_id = ?user_id,
            "Network operation failed"
        );
    }

    /// Log validation errors with input context
    pub fn log_validation_error(
        error: &impl std::fmt::Display,
        operation: &str,
        user_id: Option<i64>,
        input_type: &str,
        input_value: Option<&str>,
    ) {
        tracing::warn!(
            error = %error,
            operation = %operation,
            user_id = ?user_id,
            input_type = %input_type,
            input_value = ?input_value.map(|v| v.chars().take(100).collect::<String>()),
            "Validation failed"
        );
    }

    /// Log internal application errors with component context
    pub fn log_internal_error(
        error: &impl std::fmt::Display,
        component: &str,
        operation: &str,
        user_id: Option<i64>,
    ) {
        error!(
            error = %error,
            component = %component,
            operation = %operation,
            user_id = ?user_id,
            "Internal application error"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_tags() {
        assert_eq!(
            AppError::Validation("too big".to_string()).to_string(),
            "[VALIDATION] too big"
        );
        assert_eq!(
            AppError::Removal(RemovalError::QuotaExceeded).to_string(),
            "[REMOVAL] API quota exceeded (HTTP 402)"
        );
    }

    #[test]
    fn test_from_removal_error() {
        let err: AppError = RemovalError::Timeout.into();
        assert_eq!(err, AppError::Removal(RemovalError::Timeout));
    }
}
