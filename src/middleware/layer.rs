use crate::exception::{ErrorHandler, HandlerError};
use crate::middleware::{Middleware, Next, pattern_matches};
use axum::{body::Body, http::Request, response::Response};
use futures::future::BoxFuture;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Middleware applied to every request whose path matches `pattern`.
#[derive(Clone)]
pub struct AppMiddleware {
    pub pattern: String,
    pub middleware: Arc<dyn Middleware>,
}

impl AppMiddleware {
    pub fn new(pattern: impl Into<String>, middleware: Arc<dyn Middleware>) -> Self {
        Self {
            pattern: pattern.into(),
            middleware,
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        pattern_matches(&self.pattern, path)
    }
}

/// Tower layer running app-wide middleware in front of the router.
///
/// Errors returned by the middleware are rendered through the application's
/// [`ErrorHandler`], so the wrapped service stays infallible.
#[derive(Clone)]
pub struct AppMiddlewareLayer {
    middleware: Arc<[AppMiddleware]>,
    error_handler: Arc<ErrorHandler>,
}

impl AppMiddlewareLayer {
    pub fn new(middleware: Vec<AppMiddleware>, error_handler: Arc<ErrorHandler>) -> Self {
        Self {
            middleware: middleware.into(),
            error_handler,
        }
    }
}

impl<S> Layer<S> for AppMiddlewareLayer {
    type Service = AppMiddlewareService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AppMiddlewareService {
            inner,
            middleware: Arc::clone(&self.middleware),
            error_handler: Arc::clone(&self.error_handler),
        }
    }
}

#[derive(Clone)]
pub struct AppMiddlewareService<S> {
    inner: S,
    middleware: Arc<[AppMiddleware]>,
    error_handler: Arc<ErrorHandler>,
}

impl<S> Service<Request<Body>> for AppMiddlewareService<S>
where
    S: Service<Request<Body>, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        // The ready service is the one that must handle this request.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);

        let path = request.uri().path().to_owned();
        let steps: Vec<Arc<dyn Middleware>> = self
            .middleware
            .iter()
            .filter(|entry| entry.matches(&path))
            .map(|entry| Arc::clone(&entry.middleware))
            .collect();
        let error_handler = Arc::clone(&self.error_handler);

        Box::pin(async move {
            let terminal = Next::new(move |request| {
                Box::pin(async move {
                    let mut inner = inner;
                    match inner.call(request).await {
                        Ok(response) => Ok::<_, HandlerError>(response),
                        Err(never) => match never {},
                    }
                })
            });

            let response = match Next::chain(steps, terminal).run(request).await {
                Ok(response) => response,
                Err(error) => error_handler.handle(error),
            };
            Ok(response)
        })
    }
}
