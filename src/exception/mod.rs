//! Per-request failures and the global error step.
//!
//! Anything a chain step or handler returns as `Err` ends up in the [`ErrorHandler`],
//! which turns it into the structured [`ErrorResponse`] body. Failures here never affect
//! other in-flight requests.

use axum::http::StatusCode;
use axum::response::Response;

mod handler;
mod response;

pub use handler::{ErrorHandler, ErrorHandlerConfig, NotFoundConfig};
pub use response::{ErrorIdentifier, ErrorResponse};

/// Standard result type of chain steps and handlers.
pub type HandlerResult<T = Response> = Result<T, HandlerError>;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A failure meant to be shown to the client as is.
    #[error("{message}")]
    Http {
        status: StatusCode,
        identifier: ErrorIdentifier,
        message: String,
        reason: Option<String>,
    },

    /// Anything else. Rendered as a generic 500 unless internal errors are exposed.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn new(status: StatusCode, identifier: ErrorIdentifier, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            identifier,
            message: message.into(),
            reason: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorIdentifier::UserRequestInvalid, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ErrorIdentifier::AccessUnauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, ErrorIdentifier::AccessForbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorIdentifier::NotFound, message)
    }

    pub fn with_reason(self, reason: impl Into<String>) -> Self {
        match self {
            Self::Http {
                status,
                identifier,
                message,
                ..
            } => Self::Http {
                status,
                identifier,
                message,
                reason: Some(reason.into()),
            },
            other => other,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Http { status, .. } => *status,
            Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<crate::error::SwitchyardError> for HandlerError {
    fn from(err: crate::error::SwitchyardError) -> Self {
        Self::Unexpected(anyhow::Error::new(err))
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Unexpected(anyhow::Error::new(err))
    }
}
