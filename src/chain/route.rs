use crate::controller::{HttpMethod, RouteHandler};
use crate::exception::{ErrorHandler, ErrorIdentifier, HandlerError, HandlerResult};
use crate::middleware::{Middleware, Next};
use crate::validation::{AuthValidator, RequestValidator, Shape};
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{FromRequestParts, Path, Query, rejection::PathRejection},
    http::{Request, StatusCode},
    response::Response,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StepKind {
    ControllerMiddleware,
    Auth,
    BodyValidation,
    QueryValidation,
    ParamsValidation,
    RouteMiddleware,
    Handler,
}

/// Where a validation step reads its data from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Body,
    Query,
    Params,
}

impl DataSource {
    pub(crate) fn step_kind(self) -> StepKind {
        match self {
            Self::Body => StepKind::BodyValidation,
            Self::Query => StepKind::QueryValidation,
            Self::Params => StepKind::ParamsValidation,
        }
    }

    fn rejection_message(self) -> &'static str {
        match self {
            Self::Body => "The supplied body data did not pass validation",
            Self::Query => "The supplied query parameters did not pass validation",
            Self::Params => "The supplied URL parameters did not pass validation",
        }
    }

    fn rejection(self, reason: Option<String>) -> HandlerError {
        HandlerError::Http {
            status: StatusCode::BAD_REQUEST,
            identifier: ErrorIdentifier::UserRequestInvalid,
            message: self.rejection_message().to_string(),
            reason,
        }
    }
}

pub(crate) struct ChainStep {
    kind: StepKind,
    middleware: Arc<dyn Middleware>,
}

impl ChainStep {
    pub(crate) fn new(kind: StepKind, middleware: Arc<dyn Middleware>) -> Self {
        Self { kind, middleware }
    }
}

/// Executable chain of one route.
#[derive(Clone)]
pub struct RouteChain {
    method: HttpMethod,
    path: String,
    steps: Arc<[ChainStep]>,
    error_handler: Arc<ErrorHandler>,
}

impl RouteChain {
    pub(crate) fn new(
        method: HttpMethod,
        path: String,
        steps: Vec<ChainStep>,
        error_handler: Arc<ErrorHandler>,
    ) -> Self {
        Self {
            method,
            path,
            steps: steps.into(),
            error_handler,
        }
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Declared path, `:name` syntax.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn steps(&self) -> Vec<StepKind> {
        self.steps.iter().map(|step| step.kind).collect()
    }

    /// Run the chain. Errors escaping a step are rendered by the error handler.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let steps: Vec<Arc<dyn Middleware>> = self
            .steps
            .iter()
            .map(|step| Arc::clone(&step.middleware))
            .collect();

        match Next::chain(steps, end_of_chain()).run(request).await {
            Ok(response) => response,
            Err(error) => self.error_handler.handle(error),
        }
    }
}

impl std::fmt::Debug for RouteChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteChain")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("steps", &self.steps())
            .finish()
    }
}

// The handler step never calls `next`.
fn end_of_chain() -> Next {
    Next::new(|_request| {
        Box::pin(async {
            Err::<Response, _>(HandlerError::Unexpected(anyhow::anyhow!(
                "request chain ended without a response"
            )))
        })
    })
}

pub(crate) struct AuthStep {
    pub(crate) validator: Arc<dyn AuthValidator>,
}

#[async_trait]
impl Middleware for AuthStep {
    async fn run(&self, mut request: Request<Body>, next: Next) -> HandlerResult {
        let outcome = self.validator.authorize(&mut request).await;
        if !outcome.valid {
            tracing::debug!(reason = ?outcome.fail_reason, "Request failed authorization");
            return Err(HandlerError::Http {
                status: StatusCode::UNAUTHORIZED,
                identifier: ErrorIdentifier::AccessUnauthorized,
                message: "You are not authorized to access this resource".to_string(),
                reason: outcome.fail_reason,
            });
        }
        next.run(request).await
    }
}

pub(crate) struct ValidationStep {
    pub(crate) source: DataSource,
    pub(crate) shape: Shape,
    pub(crate) validator: Arc<dyn RequestValidator>,
    pub(crate) body_limit: usize,
}

impl ValidationStep {
    /// Extract the data to validate, handing back the request intact.
    async fn extract(&self, request: Request<Body>) -> HandlerResult<(Request<Body>, Value)> {
        match self.source {
            DataSource::Body => {
                let (parts, body) = request.into_parts();
                let bytes = axum::body::to_bytes(body, self.body_limit)
                    .await
                    .map_err(|err| {
                        HandlerError::new(
                            StatusCode::PAYLOAD_TOO_LARGE,
                            ErrorIdentifier::PayloadTooLarge,
                            "The request body could not be read",
                        )
                        .with_reason(err.to_string())
                    })?;
                let data = if bytes.is_empty() {
                    Value::Null
                } else {
                    serde_json::from_slice(&bytes)
                        .map_err(|err| self.source.rejection(Some(err.to_string())))?
                };
                Ok((Request::from_parts(parts, Body::from(bytes)), data))
            }
            DataSource::Query => {
                let Query(query) = Query::<HashMap<String, String>>::try_from_uri(request.uri())
                    .map_err(|err| self.source.rejection(Some(err.body_text())))?;
                Ok((request, serde_json::to_value(query)?))
            }
            DataSource::Params => {
                let (mut parts, body) = request.into_parts();
                // Only a route without parameters has none to extract.
                let params = match Path::<HashMap<String, String>>::from_request_parts(&mut parts, &()).await {
                    Ok(Path(params)) => params,
                    Err(PathRejection::MissingPathParams(_)) => HashMap::new(),
                    Err(err) => return Err(self.source.rejection(Some(err.body_text()))),
                };
                Ok((Request::from_parts(parts, body), serde_json::to_value(params)?))
            }
        }
    }
}

#[async_trait]
impl Middleware for ValidationStep {
    async fn run(&self, request: Request<Body>, next: Next) -> HandlerResult {
        let (request, data) = self.extract(request).await?;
        let outcome = self.validator.validate(&self.shape, &data).await;
        if !outcome.valid {
            return Err(self.source.rejection(outcome.fail_reason));
        }
        next.run(request).await
    }
}

pub(crate) struct HandlerStep<C> {
    pub(crate) instance: Arc<C>,
    pub(crate) handler: RouteHandler<C>,
}

#[async_trait]
impl<C: Send + Sync + 'static> Middleware for HandlerStep<C> {
    async fn run(&self, request: Request<Body>, _next: Next) -> HandlerResult {
        (self.handler)(Arc::clone(&self.instance), request).await
    }
}
