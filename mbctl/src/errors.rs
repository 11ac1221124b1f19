use crate::db::errors::StorageError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Unknown model display name
    #[error("Configuration {name} does not exist")]
    ModelNotFound { name: String },

    /// A model's request template failed to compile
    #[error("Failed to compile request template for {model}")]
    TemplateCompilation { model: String, detail: String },

    /// Monthly usage ceiling reached for the user or global scope
    #[error("User has exceeded the user or global monthly usage limit")]
    Throttled,

    /// Non-2xx response from an upstream provider, surfaced verbatim
    #[error("Upstream provider returned status {status}")]
    Upstream {
        status: u16,
        body: Option<serde_json::Value>,
    },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Storage operation error
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            // Unknown model names are a caller mistake, not a server fault
            Error::BadRequest { .. } | Error::ModelNotFound { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Throttled => StatusCode::TOO_MANY_REQUESTS,
            Error::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Error::TemplateCompilation { .. } | Error::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Error::Storage(err) => match err {
                StorageError::NotFound => StatusCode::NOT_FOUND,
                StorageError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message
                .clone()
                .unwrap_or_else(|| "Authentication required".to_string()),
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::ModelNotFound { name } => format!("Configuration {name} does not exist"),
            Error::TemplateCompilation { model, .. } => {
                format!("Failed to compile request template for {model}")
            }
            Error::Throttled => self.to_string(),
            Error::Upstream { status, .. } => format!("Upstream provider returned status {status}"),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Storage(err) => match err {
                StorageError::NotFound => "Resource not found".to_string(),
                StorageError::Other(_) => "Storage error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Storage(StorageError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::TemplateCompilation { model, detail } => {
                // The raw template detail is needed to diagnose what failed to parse
                tracing::error!(%model, %detail, "Template compilation failed");
            }
            Error::Unauthenticated { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::Throttled => {
                tracing::warn!("Throttled request: {}", self);
            }
            Error::Upstream { status, .. } => {
                tracing::warn!(status = *status, "Upstream provider error");
            }
            Error::BadRequest { .. }
            | Error::NotFound { .. }
            | Error::ModelNotFound { .. }
            | Error::Storage(StorageError::NotFound) => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();

        // Upstream failures carry the provider's own body through verbatim
        let body = match &self {
            Error::Upstream { body, .. } => json!({ "error": body }),
            _ => json!({ "error": self.user_message() }),
        };

        (status, axum::response::Json(body)).into_response()
    }
}

/// Convert from String errors (e.g., from external functions)
impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal { operation: msg }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
