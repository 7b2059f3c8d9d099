//! Validator interfaces consumed by the chain builder.
//!
//! The framework never interprets shapes itself. A route or event declares an opaque
//! [`Shape`]; at request time the registered validator receives that shape together with
//! the data extracted from the request and answers with a [`ValidationOutcome`].

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, Request, Uri},
};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

mod builtins;

pub use builtins::{BearerTokenValidator, RequiredFields, RequiredFieldsValidator};

/// Result of a validation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub fail_reason: Option<String>,
}

impl ValidationOutcome {
    pub fn valid() -> Self {
        Self {
            valid: true,
            fail_reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            fail_reason: Some(reason.into()),
        }
    }
}

impl From<bool> for ValidationOutcome {
    fn from(valid: bool) -> Self {
        Self {
            valid,
            fail_reason: None,
        }
    }
}

/// Type-erased validation shape.
#[derive(Clone)]
pub struct Shape {
    inner: Arc<dyn Any + Send + Sync>,
    name: &'static str,
}

impl Shape {
    pub fn new<S: Any + Send + Sync>(shape: S) -> Self {
        Self {
            inner: Arc::new(shape),
            name: std::any::type_name::<S>(),
        }
    }

    pub fn downcast_ref<S: Any>(&self) -> Option<&S> {
        self.inner.downcast_ref::<S>()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({})", self.name)
    }
}

/// Validates body, query, URL parameters or socket payloads against a shape.
#[async_trait]
pub trait RequestValidator: Send + Sync + 'static {
    async fn validate(&self, shape: &Shape, data: &Value) -> ValidationOutcome;
}

/// Authorizes an HTTP request.
///
/// The request is mutable so an implementation can attach the authenticated identity to
/// its extensions for the handler.
#[async_trait]
pub trait AuthValidator: Send + Sync + 'static {
    async fn authorize(&self, request: &mut Request<Body>) -> ValidationOutcome;
}

/// Request data visible when a websocket connection is opened.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub headers: HeaderMap,
    pub uri: Uri,
}

/// Authorizes websocket connections before the upgrade.
#[async_trait]
pub trait SocketAuthValidator: Send + Sync + 'static {
    async fn authorize(&self, handshake: &Handshake) -> ValidationOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_bool() {
        assert_eq!(ValidationOutcome::from(true), ValidationOutcome::valid());
        let outcome = ValidationOutcome::from(false);
        assert!(!outcome.valid);
        assert!(outcome.fail_reason.is_none());
    }

    #[test]
    fn test_shape_downcast() {
        let shape = Shape::new(RequiredFields::new(["name"]));
        assert!(shape.downcast_ref::<RequiredFields>().is_some());
        assert!(shape.downcast_ref::<String>().is_none());
        assert!(shape.name().ends_with("RequiredFields"));
    }
}
