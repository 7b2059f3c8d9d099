use crate::validation::{
    AuthValidator, RequestValidator, Shape, ValidationOutcome,
};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, header},
};
use serde_json::Value;

/// Shape listing the keys an object must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredFields {
    fields: Vec<String>,
}

impl RequiredFields {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

/// Checks [`RequiredFields`] shapes. Any other shape is accepted as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredFieldsValidator;

#[async_trait]
impl RequestValidator for RequiredFieldsValidator {
    async fn validate(&self, shape: &Shape, data: &Value) -> ValidationOutcome {
        let Some(required) = shape.downcast_ref::<RequiredFields>() else {
            return ValidationOutcome::valid();
        };
        let Some(object) = data.as_object() else {
            return ValidationOutcome::invalid("expected a JSON object");
        };

        let missing: Vec<&str> = required
            .fields()
            .iter()
            .filter(|field| object.get(field.as_str()).is_none_or(Value::is_null))
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            ValidationOutcome::valid()
        } else {
            ValidationOutcome::invalid(format!("missing fields: {}", missing.join(", ")))
        }
    }
}

/// Accepts requests carrying `Authorization: Bearer <token>` with a known token.
#[derive(Debug, Clone)]
pub struct BearerTokenValidator {
    tokens: Vec<String>,
}

impl BearerTokenValidator {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl AuthValidator for BearerTokenValidator {
    async fn authorize(&self, request: &mut Request<Body>) -> ValidationOutcome {
        let token = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        match token {
            Some(token) if self.tokens.iter().any(|known| known == token) => {
                ValidationOutcome::valid()
            }
            Some(_) => ValidationOutcome::invalid("unknown token"),
            None => ValidationOutcome::invalid("missing bearer token"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_required_fields() {
        let shape = Shape::new(RequiredFields::new(["name", "email"]));
        let validator = RequiredFieldsValidator;

        let outcome = validator
            .validate(&shape, &json!({"name": "ada", "email": "ada@example.com"}))
            .await;
        assert!(outcome.valid);

        let outcome = validator.validate(&shape, &json!({"name": "ada"})).await;
        assert_eq!(outcome.fail_reason.as_deref(), Some("missing fields: email"));

        let outcome = validator.validate(&shape, &Value::Null).await;
        assert!(!outcome.valid);
    }

    #[tokio::test]
    async fn test_bearer_token() {
        let validator = BearerTokenValidator::new(["secret"]);

        let mut request = Request::get("/")
            .header(header::AUTHORIZATION, "Bearer secret")
            .body(Body::empty())
            .unwrap();
        assert!(validator.authorize(&mut request).await.valid);

        let mut request = Request::get("/").body(Body::empty()).unwrap();
        let outcome = validator.authorize(&mut request).await;
        assert_eq!(outcome.fail_reason.as_deref(), Some("missing bearer token"));
    }
}
