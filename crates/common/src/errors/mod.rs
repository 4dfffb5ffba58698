//! Error types for CiteWeave services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - HTTP status code mapping
//! - Structured error responses
//! - User-facing messages for the explorer UI

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidFormat,

    // Resource errors (4xxx)
    NotFound,
    NodeNotFound,
    ConversationNotFound,
    PaperDataUnavailable,

    // Conflict errors (5xxx)
    ExpansionInProgress,

    // Rate limiting (6xxx)
    RateLimited,

    // Data errors (7xxx)
    DataIntegrityError,
    StorageError,

    // External service errors (8xxx)
    UpstreamError,
    JobFailed,
    SearchTimeout,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidFormat => 1003,

            // Resources (4xxx)
            ErrorCode::NotFound => 4001,
            ErrorCode::NodeNotFound => 4002,
            ErrorCode::ConversationNotFound => 4003,
            ErrorCode::PaperDataUnavailable => 4004,

            // Conflicts (5xxx)
            ErrorCode::ExpansionInProgress => 5001,

            // Rate limits (6xxx)
            ErrorCode::RateLimited => 6001,

            // Data (7xxx)
            ErrorCode::DataIntegrityError => 7001,
            ErrorCode::StorageError => 7002,

            // External (8xxx)
            ErrorCode::UpstreamError => 8001,
            ErrorCode::JobFailed => 8002,
            ErrorCode::SearchTimeout => 8003,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Graph node not found: {id}")]
    NodeNotFound { id: String },

    #[error("Conversation not found: {id}")]
    ConversationNotFound { id: String },

    #[error("No paper data available for node {node_id}")]
    PaperDataUnavailable { node_id: String },

    // Conflict errors
    #[error("Expansion already in progress for node {node_id}")]
    ExpansionInProgress { node_id: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Data errors
    #[error("Data integrity violation: expected paper {expected}, got {actual}")]
    DataIntegrity { expected: String, actual: String },

    #[error("Relationship storage error: {message}")]
    Storage { message: String },

    // External service errors
    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Search job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("Search job {job_id} still pending after {attempts} polls")]
    SearchTimeout { job_id: String, attempts: u32 },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::NodeNotFound { .. } => ErrorCode::NodeNotFound,
            AppError::ConversationNotFound { .. } => ErrorCode::ConversationNotFound,
            AppError::PaperDataUnavailable { .. } => ErrorCode::PaperDataUnavailable,
            AppError::ExpansionInProgress { .. } => ErrorCode::ExpansionInProgress,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::DataIntegrity { .. } => ErrorCode::DataIntegrityError,
            AppError::Storage { .. } => ErrorCode::StorageError,
            AppError::Upstream { .. } => ErrorCode::UpstreamError,
            AppError::JobFailed { .. } => ErrorCode::JobFailed,
            AppError::SearchTimeout { .. } => ErrorCode::SearchTimeout,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } |
            AppError::InvalidFormat { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::NotFound { .. } |
            AppError::NodeNotFound { .. } |
            AppError::ConversationNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::ExpansionInProgress { .. } => StatusCode::CONFLICT,

            // 422 Unprocessable Entity
            AppError::PaperDataUnavailable { .. } |
            AppError::DataIntegrity { .. } => StatusCode::UNPROCESSABLE_ENTITY,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Internal { .. } |
            AppError::Configuration { .. } |
            AppError::Serialization(_) |
            AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::Upstream { .. } |
            AppError::JobFailed { .. } |
            AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::Storage { .. } => StatusCode::SERVICE_UNAVAILABLE,

            // 504 Gateway Timeout
            AppError::SearchTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Short message suitable for a toast in the explorer UI
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation { message, .. } => message.clone(),
            AppError::ExpansionInProgress { .. } => {
                "A search is already in progress for this paper.".to_string()
            }
            AppError::SearchTimeout { .. } => {
                "The search is still processing. Please try again later.".to_string()
            }
            AppError::JobFailed { .. } => {
                "The search failed. Please adjust your filters and try again.".to_string()
            }
            AppError::DataIntegrity { .. } | AppError::PaperDataUnavailable { .. } => {
                "Paper details are unavailable for this node.".to_string()
            }
            AppError::Storage { .. } => {
                "Results are shown but could not be saved (storage issue).".to_string()
            }
            AppError::NodeNotFound { .. } | AppError::ConversationNotFound { .. } => {
                "This graph is out of date. Please reload it.".to_string()
            }
            AppError::RateLimited { .. } => "Too many requests. Please slow down.".to_string(),
            _ => "Something went wrong.".to_string(),
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    pub user_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let details = match &self {
            AppError::Validation { field: Some(field), .. } => {
                Some(serde_json::json!({ "field": field }))
            }
            AppError::SearchTimeout { job_id, attempts } => {
                Some(serde_json::json!({ "jobId": job_id, "attempts": attempts }))
            }
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                user_message: self.user_message(),
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string()
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Storage {
            message: err.to_string()
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::NodeNotFound { id: "n1".into() };
        assert_eq!(err.code(), ErrorCode::NodeNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "No phrases or query supplied".into(),
            field: Some("phrases".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_timeout_distinct_from_failure() {
        let timeout = AppError::SearchTimeout { job_id: "j".into(), attempts: 30 };
        let failed = AppError::JobFailed { job_id: "j".into(), message: "boom".into() };

        assert_ne!(timeout.code(), failed.code());
        assert_ne!(timeout.user_message(), failed.user_message());
        assert!(timeout.user_message().contains("still processing"));
    }

    #[test]
    fn test_storage_message_mentions_storage() {
        let err = AppError::Storage { message: "redis down".into() };
        assert!(err.user_message().contains("storage issue"));
        assert_eq!(err.code().as_code(), 7002);
    }
}
