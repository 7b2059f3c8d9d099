use crate::exception::{ErrorIdentifier, ErrorResponse, HandlerError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::any::Any;

#[derive(Debug, Clone)]
pub struct ErrorHandlerConfig {
    /// Send the message of unexpected errors to clients instead of the generic one.
    pub expose_internal_errors: bool,
    /// Add an RFC 3339 `timestamp` to every error body.
    pub include_timestamp: bool,
    pub unexpected_message: String,
}

impl Default for ErrorHandlerConfig {
    fn default() -> Self {
        Self {
            expose_internal_errors: false,
            include_timestamp: false,
            unexpected_message: "An unexpected error occurred".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotFoundConfig {
    pub message: String,
}

impl Default for NotFoundConfig {
    fn default() -> Self {
        Self {
            message: "The route you requested could not be found".to_string(),
        }
    }
}

/// Converts failures escaping a chain into structured responses.
#[derive(Debug, Clone, Default)]
pub struct ErrorHandler {
    config: ErrorHandlerConfig,
}

impl ErrorHandler {
    pub fn new(config: ErrorHandlerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ErrorHandlerConfig {
        &self.config
    }

    pub fn handle(&self, error: HandlerError) -> Response {
        match error {
            HandlerError::Http {
                status,
                identifier,
                message,
                reason,
            } => {
                if status.is_server_error() {
                    tracing::error!(%status, %identifier, message = message.as_str(), "Request failed");
                } else {
                    tracing::debug!(%status, %identifier, message = message.as_str(), "Request rejected");
                }
                self.respond(ErrorResponse::new(status, identifier, message).with_reason(reason))
            }
            HandlerError::Unexpected(err) => {
                tracing::error!(error = ?err, "Unhandled error escaped a request handler");
                let message = if self.config.expose_internal_errors {
                    err.to_string()
                } else {
                    self.config.unexpected_message.clone()
                };
                self.respond(ErrorResponse::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorIdentifier::UnexpectedError,
                    message,
                ))
            }
        }
    }

    /// Render a panic caught while serving a request.
    pub fn handle_panic(&self, payload: Box<dyn Any + Send + 'static>) -> Response {
        let detail = payload
            .downcast_ref::<String>()
            .cloned()
            .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!(panic = %detail, "Request handler panicked");

        let message = if self.config.expose_internal_errors {
            detail
        } else {
            self.config.unexpected_message.clone()
        };
        self.respond(ErrorResponse::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorIdentifier::UnexpectedError,
            message,
        ))
    }

    pub fn not_found(&self, config: &NotFoundConfig) -> Response {
        self.respond(ErrorResponse::new(
            StatusCode::NOT_FOUND,
            ErrorIdentifier::NotFound,
            config.message.clone(),
        ))
    }

    pub fn respond(&self, mut body: ErrorResponse) -> Response {
        if self.config.include_timestamp {
            body.timestamp = Some(chrono::Utc::now().to_rfc3339());
        }
        body.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(response: Response) -> ErrorResponse {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_unexpected_errors_are_hidden_by_default() {
        let handler = ErrorHandler::default();
        let response = handler.handle(anyhow::anyhow!("database password rejected").into());
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_of(response).await;
        assert_eq!(body.identifier, ErrorIdentifier::UnexpectedError);
        assert_eq!(body.message, "An unexpected error occurred");
    }

    #[tokio::test]
    async fn test_exposed_internal_errors_and_timestamp() {
        let handler = ErrorHandler::new(ErrorHandlerConfig {
            expose_internal_errors: true,
            include_timestamp: true,
            ..Default::default()
        });
        let body = body_of(handler.handle(anyhow::anyhow!("boom").into())).await;
        assert_eq!(body.message, "boom");
        assert!(body.timestamp.is_some());
    }

    #[tokio::test]
    async fn test_http_errors_keep_status_and_reason() {
        let handler = ErrorHandler::default();
        let error = HandlerError::forbidden("Not your order").with_reason("owner mismatch");
        let response = handler.handle(error);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = body_of(response).await;
        assert_eq!(body.identifier, ErrorIdentifier::AccessForbidden);
        assert_eq!(body.reason.as_deref(), Some("owner mismatch"));
    }

    #[tokio::test]
    async fn test_panic_payload_is_rendered_generically() {
        let handler = ErrorHandler::default();
        let response = handler.handle_panic(Box::new("index out of bounds"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_of(response).await.message, "An unexpected error occurred");
    }
}
