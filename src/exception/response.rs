use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Machine-readable kind of an error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorIdentifier {
    UserRequestInvalid,
    AccessUnauthorized,
    AccessForbidden,
    NotFound,
    PayloadTooLarge,
    UnexpectedError,
}

/// Body of every error response produced by the framework.
///
/// ```json
/// {
///   "identifier": "USER_REQUEST_INVALID",
///   "statusCode": 400,
///   "message": "The supplied body data did not pass validation",
///   "reason": null
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub identifier: ErrorIdentifier,
    pub status_code: u16,
    pub message: String,
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, identifier: ErrorIdentifier, message: impl Into<String>) -> Self {
        Self {
            identifier,
            status_code: status.as_u16(),
            message: message.into(),
            reason: None,
            timestamp: None,
        }
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_null_reason_and_camel_case() {
        let body = ErrorResponse::new(
            StatusCode::BAD_REQUEST,
            ErrorIdentifier::UserRequestInvalid,
            "The supplied body data did not pass validation",
        );
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "identifier": "USER_REQUEST_INVALID",
                "statusCode": 400,
                "message": "The supplied body data did not pass validation",
                "reason": null,
            })
        );
    }

    #[test]
    fn test_identifier_display_matches_wire_name() {
        assert_eq!(ErrorIdentifier::AccessUnauthorized.to_string(), "ACCESS_UNAUTHORIZED");
    }
}
