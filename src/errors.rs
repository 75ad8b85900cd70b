use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Where the UI is sent when the session has no usable token.
pub const LOGIN_REDIRECT: &str = "/login";

/// Application-specific error types.
///
/// Validation failures in the intake flow are not errors: they come back as
/// step outcomes that re-prompt the user.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Missing token, or the assistant service rejected it.
    Unauthorized(String),
    /// Bad request error (invalid input).
    BadRequest(String),
    /// Resource not found error.
    NotFound(String),
    /// The assistant service answered with a non-2xx status.
    Upstream {
        /// HTTP status returned by the assistant service, if any.
        status: Option<u16>,
        /// Decoded error message.
        message: String,
    },
    /// Transport failure talking to an external service.
    Transport(String),
    /// Client store read/write failure.
    Storage(String),
    /// Internal server error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// Builds an `Upstream` error without a status code.
    pub fn upstream(message: impl Into<String>) -> Self {
        AppError::Upstream {
            status: None,
            message: message.into(),
        }
    }

    /// Strips `WithContext` layers and returns the innermost error.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// True when the UI should be sent back to the login page.
    pub fn requires_login(&self) -> bool {
        matches!(self.root(), AppError::Unauthorized(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Upstream {
                status: Some(status),
                message,
            } => write!(f, "Assistant API error ({}): {}", status, message),
            AppError::Upstream {
                status: None,
                message,
            } => write!(f, "Assistant API error: {}", message),
            AppError::Transport(msg) => write!(f, "Transport error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Maps each error variant to an HTTP status code and JSON body.
    ///
    /// `Unauthorized` carries the login redirect so the UI can leave the page.
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized access: {}", msg);
                let body = Json(json!({
                    "error": "Unauthorized",
                    "redirect": LOGIN_REDIRECT,
                }));
                return (StatusCode::UNAUTHORIZED, body).into_response();
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Upstream { message, .. } => {
                tracing::error!("Assistant API error: {}", message);
                (StatusCode::BAD_GATEWAY, message.clone())
            }
            AppError::Transport(msg) => {
                tracing::error!("Transport error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "External service unavailable".to_string(),
                )
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage error".to_string(),
                )
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::WithContext { source, context } => {
                tracing::error!("Error with context: {} -> {}", context, source);
                return (**source).clone().into_response();
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InternalError(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}
