use crate::controller::{AuthRequirement, HttpMethod, RouteDescriptor, RouteHandler};
use crate::di::{Injectable, InjectableConfig};
use crate::error::Result;
use crate::exception::HandlerResult;
use crate::metadata::{MetadataKey, MetadataStore, TypeKey};
use crate::middleware::{Middleware, MiddlewareRef};
use crate::validation::Shape;
use axum::{
    body::Body,
    http::Request,
    response::IntoResponse,
};
use futures::future::BoxFuture;
use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Route options, combined with a handler in [`ControllerDefinition::route`].
#[derive(Debug, Clone)]
pub struct RouteDefinition {
    method: HttpMethod,
    path: Option<String>,
    auth: AuthRequirement,
    body_shape: Option<Shape>,
    query_shape: Option<Shape>,
    params_shape: Option<Shape>,
    middleware: Vec<MiddlewareRef>,
}

impl RouteDefinition {
    /// Route for `method` at `path` relative to the controller. An empty path maps to
    /// the controller path itself.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            method,
            path: (!path.is_empty()).then_some(path),
            auth: AuthRequirement::Inherit,
            body_shape: None,
            query_shape: None,
            params_shape: None,
            middleware: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn auth_required(mut self, required: bool) -> Self {
        self.auth = required.into();
        self
    }

    pub fn body_shape<S: Any + Send + Sync>(mut self, shape: S) -> Self {
        self.body_shape = Some(Shape::new(shape));
        self
    }

    pub fn query_shape<S: Any + Send + Sync>(mut self, shape: S) -> Self {
        self.query_shape = Some(Shape::new(shape));
        self
    }

    pub fn params_shape<S: Any + Send + Sync>(mut self, shape: S) -> Self {
        self.params_shape = Some(Shape::new(shape));
        self
    }

    /// Append route middleware. Runs after the validation steps, in declaration order.
    pub fn middleware<M: Middleware>(mut self) -> Self {
        self.middleware.push(MiddlewareRef::of::<M>());
        self
    }
}

/// Declaration of controller `C`.
///
/// # Example
/// ```
/// use switchyard::controller::{ControllerDefinition, RouteDefinition};
/// use switchyard::exception::HandlerResult;
/// use switchyard::MetadataStore;
/// use axum::{body::Body, http::Request};
/// use std::sync::Arc;
///
/// #[derive(Default, switchyard::DeriveInjectable)]
/// struct HealthController;
///
/// impl HealthController {
///     async fn status(self: Arc<Self>, _request: Request<Body>) -> HandlerResult<&'static str> {
///         Ok("ok")
///     }
/// }
///
/// let store = MetadataStore::new();
/// ControllerDefinition::<HealthController>::new("health")
///     .route(RouteDefinition::get("").auth_required(false), HealthController::status)
///     .register(&store)
///     .unwrap();
/// ```
pub struct ControllerDefinition<C> {
    path: String,
    identifier: Option<String>,
    middleware: Vec<MiddlewareRef>,
    routes: Vec<RouteDescriptor<C>>,
    _controller: PhantomData<fn() -> C>,
}

impl<C: Injectable> ControllerDefinition<C> {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            identifier: None,
            middleware: Vec::new(),
            routes: Vec::new(),
            _controller: PhantomData,
        }
    }

    /// Dependency key of the controller, defaults to the type name.
    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Append controller middleware. Runs first for every route of the controller.
    pub fn middleware<M: Middleware>(mut self) -> Self {
        self.middleware.push(MiddlewareRef::of::<M>());
        self
    }

    pub fn route<H, Fut, R>(mut self, route: RouteDefinition, handler: H) -> Self
    where
        H: Fn(Arc<C>, Request<Body>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<R>> + Send + 'static,
        R: IntoResponse,
    {
        let handler: RouteHandler<C> = Arc::new(
            move |controller: Arc<C>, request: Request<Body>| -> BoxFuture<'static, HandlerResult> {
                let fut = handler(controller, request);
                Box::pin(async move { fut.await.map(IntoResponse::into_response) })
            },
        );

        self.routes.push(RouteDescriptor {
            method: route.method,
            path: route.path,
            auth: route.auth,
            body_shape: route.body_shape,
            query_shape: route.query_shape,
            params_shape: route.params_shape,
            middleware: route.middleware,
            handler,
        });
        self
    }

    /// Write the declaration into `store`. The controller becomes an injectable singleton.
    pub fn register(self, store: &MetadataStore) -> Result<()> {
        let mut config = InjectableConfig::singleton();
        if let Some(identifier) = self.identifier {
            config = config.identifier(identifier);
        }
        store.mark_injectable::<C>(config)?;

        let target = TypeKey::of::<C>();
        tracing::debug!(
            controller = %target,
            path = self.path.as_str(),
            routes = self.routes.len(),
            "Registered controller"
        );
        store.set(target, MetadataKey::ControllerPath, self.path);
        store.set(target, MetadataKey::ControllerMiddleware, self.middleware);
        store.set(target, MetadataKey::ControllerRoutes, self.routes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerDescriptor;
    use crate::di::{Container, Lifecycle};

    struct Users;

    impl Injectable for Users {
        fn inject(_container: &Container) -> Result<Self> {
            Ok(Users)
        }
    }

    impl Users {
        async fn list(self: Arc<Self>, _request: Request<Body>) -> HandlerResult<&'static str> {
            Ok("[]")
        }
    }

    #[test]
    fn test_register_writes_descriptor() {
        let store = MetadataStore::new();
        ControllerDefinition::<Users>::new("users")
            .route(RouteDefinition::get(""), Users::list)
            .route(RouteDefinition::get("/:id").auth_required(false), Users::list)
            .register(&store)
            .unwrap();

        let descriptor = ControllerDescriptor::<Users>::load(&store).unwrap();
        assert_eq!(descriptor.path, "users");
        assert_eq!(descriptor.routes.len(), 2);
        assert_eq!(descriptor.routes[0].path, None);
        assert_eq!(descriptor.routes[0].auth, AuthRequirement::Inherit);
        assert_eq!(descriptor.routes[1].path.as_deref(), Some("/:id"));
        assert_eq!(descriptor.routes[1].auth, AuthRequirement::NotRequired);
        assert_eq!(
            store.lifecycle_of(TypeKey::of::<Users>()),
            Lifecycle::Singleton
        );
    }
}
