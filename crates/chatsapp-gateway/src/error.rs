//! Gateway error types.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chatsapp_backend::{BackendError, Rejection};
use chatsapp_core::error::IdError;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors that can occur in the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No valid session for the request.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Malformed client input. Never reaches the backend.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The backend declared the request failed.
    #[error("Backend rejected request: {0}")]
    BackendRejected(Rejection),

    /// The backend could not be reached in time.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::BackendRejected(rejection) => match rejection {
                Rejection::InvalidArgument
                | Rejection::AccountExists
                | Rejection::AccountNotFound => StatusCode::BAD_REQUEST,
                Rejection::Unauthorized => StatusCode::FORBIDDEN,
                Rejection::MessageFailed | Rejection::Failed => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the client.
    pub fn public_message(&self) -> String {
        match self {
            Self::Unauthenticated => "Please log in to continue.".to_string(),
            Self::BadRequest(detail) => detail.clone(),
            Self::BackendRejected(Rejection::MessageFailed) => {
                "Message could not be delivered.".to_string()
            }
            Self::BackendRejected(Rejection::Unauthorized) => {
                "You do not have access to this conversation.".to_string()
            }
            Self::BackendRejected(_) => "Request could not be completed.".to_string(),
            Self::BackendUnavailable(_) => {
                "Service temporarily unavailable. Please try again later.".to_string()
            }
            Self::Internal(_) | Self::Io(_) => "Something went wrong. Please try again.".to_string(),
        }
    }

    fn log(&self) {
        match self {
            Self::Unauthenticated => debug!("Rejected unauthenticated request"),
            Self::BadRequest(detail) => debug!(detail = %detail, "Rejected malformed request"),
            Self::BackendRejected(Rejection::MessageFailed | Rejection::Failed) => {
                warn!(error = %self, "Backend reported failure")
            }
            Self::BackendRejected(_) => info!(error = %self, "Backend rejected request"),
            Self::BackendUnavailable(_) | Self::Internal(_) | Self::Io(_) => {
                error!(error = %self, "Request failed")
            }
        }
    }
}

impl From<BackendError> for GatewayError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Rejected(rejection) => Self::BackendRejected(rejection),
            BackendError::Connect { .. } | BackendError::Unavailable(_) | BackendError::Timeout(_) => {
                Self::BackendUnavailable(err.to_string())
            }
            BackendError::Internal(_) | BackendError::Protocol(_) | BackendError::StreamClosed => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<IdError> for GatewayError {
    fn from(err: IdError) -> Self {
        Self::BadRequest(format!("Invalid identifier: {}", err))
    }
}

impl From<JsonRejection> for GatewayError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for GatewayError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        self.log();
        let body = serde_json::json!({
            "success": false,
            "error": self.public_message(),
        });
        (self.status(), Json(body)).into_response()
    }
}
