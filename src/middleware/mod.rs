//! Middleware trait, the `Next` continuation and middleware declarations.

use crate::di::{Container, Injectable, InjectableConfig, Lifecycle};
use crate::error::{Result, SwitchyardError};
use crate::exception::HandlerResult;
use crate::metadata::{MetadataKey, MetadataStore, TypeKey};
use async_trait::async_trait;
use axum::{body::Body, http::Request};
use futures::future::BoxFuture;
use std::sync::Arc;

mod layer;

pub use layer::{AppMiddleware, AppMiddlewareLayer, AppMiddlewareService};

/// Represents the rest of the chain after the current step.
pub struct Next {
    run: Box<dyn FnOnce(Request<Body>) -> BoxFuture<'static, HandlerResult> + Send>,
}

impl Next {
    /// Create a new Next handler
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Request<Body>) -> BoxFuture<'static, HandlerResult> + Send + 'static,
    {
        Self { run: Box::new(f) }
    }

    /// Execute the rest of the chain
    pub async fn run(self, request: Request<Body>) -> HandlerResult {
        (self.run)(request).await
    }

    /// Wrap `terminal` so that `steps` run first, in iteration order.
    pub fn chain<I>(steps: I, terminal: Next) -> Next
    where
        I: IntoIterator<Item = Arc<dyn Middleware>>,
        I::IntoIter: DoubleEndedIterator,
    {
        // Fold from the back so the first step ends up outermost.
        steps.into_iter().rev().fold(terminal, |next, step| {
            Next::new(move |request| Box::pin(async move { step.run(request, next).await }))
        })
    }
}

/// A step of a request chain.
///
/// A middleware either produces a response itself (short-circuiting everything after
/// it) or hands the request to `next`.
///
/// # Example
/// ```
/// use switchyard::middleware::{Middleware, Next};
/// use switchyard::exception::HandlerResult;
/// use switchyard::async_trait;
/// use axum::{body::Body, http::Request};
///
/// struct RequestTimer;
///
/// #[async_trait]
/// impl Middleware for RequestTimer {
///     async fn run(&self, request: Request<Body>, next: Next) -> HandlerResult {
///         let started = std::time::Instant::now();
///         let response = next.run(request).await?;
///         tracing::info!(elapsed = ?started.elapsed(), "request served");
///         Ok(response)
///     }
/// }
/// ```
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn run(&self, request: Request<Body>, next: Next) -> HandlerResult;
}

/// Metadata attached to a middleware type.
#[derive(Debug, Clone, Default)]
pub struct MiddlewareConfig {
    pub identifier: Option<String>,
    /// Path pattern for app-wide use. `None` means every path.
    pub route: Option<String>,
    pub lifecycle: Lifecycle,
}

impl MiddlewareConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn route(mut self, pattern: impl Into<String>) -> Self {
        self.route = Some(pattern.into());
        self
    }

    pub fn singleton(mut self) -> Self {
        self.lifecycle = Lifecycle::Singleton;
        self
    }

    /// Pattern used for app-wide registration, `/*` when none was declared.
    pub fn pattern(&self) -> &str {
        self.route.as_deref().unwrap_or("/*")
    }
}

impl MetadataStore {
    /// Mark `M` as middleware. Middleware is always injectable too.
    pub fn mark_middleware<M>(&self, config: MiddlewareConfig) -> Result<()>
    where
        M: Middleware + Injectable,
    {
        let mut injectable = match config.lifecycle {
            Lifecycle::Singleton => InjectableConfig::singleton(),
            Lifecycle::PerUse => InjectableConfig::per_use(),
        };
        if let Some(identifier) = &config.identifier {
            injectable = injectable.identifier(identifier.clone());
        }
        self.mark_injectable::<M>(injectable)?;
        self.set(TypeKey::of::<M>(), MetadataKey::MiddlewareConfig, config);
        Ok(())
    }

    pub fn middleware_config(&self, target: TypeKey) -> Option<MiddlewareConfig> {
        self.get(target, MetadataKey::MiddlewareConfig)
    }
}

/// Reference to a middleware type, captured where the middleware is declared.
#[derive(Clone, Copy)]
pub struct MiddlewareRef {
    target: TypeKey,
    resolve: fn(&Container) -> Result<Arc<dyn Middleware>>,
}

impl MiddlewareRef {
    pub fn of<M: Middleware>() -> Self {
        Self {
            target: TypeKey::of::<M>(),
            resolve: resolve_middleware::<M>,
        }
    }

    pub fn target(&self) -> TypeKey {
        self.target
    }

    /// Declared configuration of the referenced type.
    ///
    /// # Errors
    /// [`SwitchyardError::NotMiddleware`] when the type was never marked as middleware.
    pub fn config(&self, store: &MetadataStore) -> Result<MiddlewareConfig> {
        store
            .middleware_config(self.target)
            .ok_or_else(|| SwitchyardError::NotMiddleware {
                type_name: self.target.name().to_string(),
            })
    }

    pub fn resolve(&self, container: &Container) -> Result<Arc<dyn Middleware>> {
        self.config(container.metadata())?;
        (self.resolve)(container)
    }
}

impl std::fmt::Debug for MiddlewareRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MiddlewareRef").field(&self.target).finish()
    }
}

fn resolve_middleware<M: Middleware>(container: &Container) -> Result<Arc<dyn Middleware>> {
    let middleware: Arc<dyn Middleware> = container.resolve::<M>()?;
    Ok(middleware)
}

/// Whether an app-wide middleware pattern applies to `path`.
///
/// A trailing `*` matches the prefix and everything below it; any other pattern must
/// match the whole path, ignoring a trailing slash.
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => {
            let prefix = prefix.trim_end_matches('/');
            prefix.is_empty()
                || path == prefix
                || path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
        }
        None => path.trim_end_matches('/') == pattern.trim_end_matches('/'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::{IntoResponse, Response};
    use std::sync::Mutex;

    struct Record {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Middleware for Record {
        async fn run(&self, request: Request<Body>, next: Next) -> HandlerResult {
            self.log.lock().unwrap().push(self.name);
            next.run(request).await
        }
    }

    struct Stop;

    #[async_trait]
    impl Middleware for Stop {
        async fn run(&self, _request: Request<Body>, _next: Next) -> HandlerResult {
            Ok("stopped".into_response())
        }
    }

    fn terminal(log: Arc<Mutex<Vec<&'static str>>>) -> Next {
        Next::new(move |_request| {
            Box::pin(async move {
                log.lock().unwrap().push("terminal");
                Ok::<Response, _>("done".into_response())
            })
        })
    }

    #[tokio::test]
    async fn test_chain_runs_steps_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let steps: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(Record { name: "first", log: log.clone() }),
            Arc::new(Record { name: "second", log: log.clone() }),
        ];

        Next::chain(steps, terminal(log.clone()))
            .run(Request::new(Body::empty()))
            .await
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "terminal"]);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let steps: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(Stop),
            Arc::new(Record { name: "after", log: log.clone() }),
        ];

        Next::chain(steps, terminal(log.clone()))
            .run(Request::new(Body::empty()))
            .await
            .unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_pattern_matching() {
        assert!(pattern_matches("/*", "/anything/at/all"));
        assert!(pattern_matches("*", "/"));
        assert!(pattern_matches("/api/*", "/api"));
        assert!(pattern_matches("/api/*", "/api/users/1"));
        assert!(!pattern_matches("/api/*", "/apiary"));
        assert!(pattern_matches("/health", "/health/"));
        assert!(!pattern_matches("/health", "/health/live"));
    }

    #[test]
    fn test_unmarked_middleware_is_rejected() {
        let store = MetadataStore::new();
        let reference = MiddlewareRef::of::<Stop>();
        assert!(matches!(
            reference.config(&store),
            Err(SwitchyardError::NotMiddleware { .. })
        ));
    }
}
