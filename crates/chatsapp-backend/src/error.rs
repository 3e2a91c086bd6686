//! Backend connector error types.

use std::fmt;
use thiserror::Error;

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// A failure the backend declared explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// Registration with a username that is already taken.
    AccountExists,
    /// Login for an unknown username.
    AccountNotFound,
    /// Wrong password or insufficient permission.
    Unauthorized,
    /// The chat service reported the message as not delivered.
    MessageFailed,
    /// The service rejected a request argument.
    InvalidArgument,
    /// Generic failure status.
    Failed,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AccountExists => "account exists",
            Self::AccountNotFound => "account not found",
            Self::Unauthorized => "unauthorized",
            Self::MessageFailed => "message failed",
            Self::InvalidArgument => "invalid argument",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Errors that can occur while talking to the backend services.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Channel establishment failed.
    #[error("Connection to {endpoint} failed: {message}")]
    Connect { endpoint: String, message: String },

    /// The service is unreachable.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The service failed while handling the call. It may have acted on it.
    #[error("Backend failure: {0}")]
    Internal(String),

    /// The call did not complete within its deadline.
    #[error("Backend call timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The backend declared the request failed.
    #[error("Backend rejected request: {0}")]
    Rejected(Rejection),

    /// The response could not be decoded into domain types.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The stream ended before the expected message arrived.
    #[error("Stream closed")]
    StreamClosed,
}

impl BackendError {
    /// Whether retrying the call on a fresh channel can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Unavailable(_))
    }

    /// The rejection, if the backend declared one.
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Self::Rejected(r) => Some(*r),
            _ => None,
        }
    }
}

impl From<tonic::Status> for BackendError {
    fn from(status: tonic::Status) -> Self {
        use tonic::Code;

        match status.code() {
            Code::DeadlineExceeded => Self::Timeout(std::time::Duration::ZERO),
            Code::InvalidArgument => Self::Rejected(Rejection::InvalidArgument),
            Code::NotFound => Self::Rejected(Rejection::AccountNotFound),
            Code::AlreadyExists => Self::Rejected(Rejection::AccountExists),
            Code::PermissionDenied | Code::Unauthenticated => {
                Self::Rejected(Rejection::Unauthorized)
            }
            Code::Unavailable => Self::Unavailable(status.message().to_string()),
            _ => Self::Internal(format!("{}: {}", status.code(), status.message())),
        }
    }
}

impl From<tonic::transport::Error> for BackendError {
    fn from(err: tonic::transport::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}
