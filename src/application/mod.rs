//! Application assembly.
//!
//! [`ApplicationBuilder`] collects the controllers, app-wide middleware, validators and
//! dependency overrides of an application; [`ApplicationBuilder::bootstrap`] turns them
//! into an [`Application`] holding the container, the router and the socket server.

use crate::chain::{ChainBuilder, Collaborators, RouteChain};
use crate::config::ApplicationConfig;
use crate::controller::HttpMethod;
use crate::di::{Container, Injectable};
use crate::error::Result;
use crate::metadata::MetadataStore;
use crate::middleware::{Middleware, MiddlewareRef};
use crate::validation::{AuthValidator, RequestValidator, SocketAuthValidator};
use crate::websocket::SocketServer;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

mod bootstrap;
mod shutdown;

pub use shutdown::shutdown_signal;

use bootstrap::{SocketMount, mount_controller, mount_websocket_controller};

type Override = Box<dyn FnOnce(&Container) -> Result<()> + Send>;

struct ControllerMount {
    name: &'static str,
    mount: fn(&ChainBuilder) -> Result<Vec<RouteChain>>,
}

struct WebSocketMount {
    name: &'static str,
    mount: fn(&ChainBuilder) -> Result<SocketMount>,
}

/// Builder for [`Application`].
///
/// # Example
/// ```
/// use switchyard::application::ApplicationBuilder;
/// use switchyard::controller::{ControllerDefinition, RouteDefinition};
/// use switchyard::exception::HandlerResult;
/// use switchyard::MetadataStore;
/// use axum::{body::Body, http::Request};
/// use std::sync::Arc;
///
/// #[derive(Default, switchyard::DeriveInjectable)]
/// struct PingController;
///
/// impl PingController {
///     async fn ping(self: Arc<Self>, _request: Request<Body>) -> HandlerResult<&'static str> {
///         Ok("pong")
///     }
/// }
///
/// let store = Arc::new(MetadataStore::new());
/// ControllerDefinition::<PingController>::new("ping")
///     .route(RouteDefinition::get("").auth_required(false), PingController::ping)
///     .register(&store)
///     .unwrap();
///
/// let app = ApplicationBuilder::new(store)
///     .controller::<PingController>()
///     .bootstrap()
///     .unwrap();
/// assert_eq!(app.routes().len(), 1);
/// ```
pub struct ApplicationBuilder {
    metadata: Arc<MetadataStore>,
    config: ApplicationConfig,
    collaborators: Collaborators,
    controllers: Vec<ControllerMount>,
    websocket_controllers: Vec<WebSocketMount>,
    before_controllers: Vec<MiddlewareRef>,
    after_controllers: Vec<MiddlewareRef>,
    overrides: Vec<Override>,
}

impl ApplicationBuilder {
    pub fn new(metadata: Arc<MetadataStore>) -> Self {
        Self {
            metadata,
            config: ApplicationConfig::default(),
            collaborators: Collaborators::default(),
            controllers: Vec::new(),
            websocket_controllers: Vec::new(),
            before_controllers: Vec::new(),
            after_controllers: Vec::new(),
            overrides: Vec::new(),
        }
    }

    pub fn config(mut self, config: ApplicationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn controller<C: Injectable>(mut self) -> Self {
        self.controllers.push(ControllerMount {
            name: std::any::type_name::<C>(),
            mount: mount_controller::<C>,
        });
        self
    }

    pub fn websocket_controller<C: Injectable>(mut self) -> Self {
        self.websocket_controllers.push(WebSocketMount {
            name: std::any::type_name::<C>(),
            mount: mount_websocket_controller::<C>,
        });
        self
    }

    /// Middleware running before routing, for paths matching its route pattern.
    pub fn before_controllers<M: Middleware>(mut self) -> Self {
        self.before_controllers.push(MiddlewareRef::of::<M>());
        self
    }

    /// Middleware running for requests no controller route matched.
    pub fn after_controllers<M: Middleware>(mut self) -> Self {
        self.after_controllers.push(MiddlewareRef::of::<M>());
        self
    }

    /// Resolve `A` as `B` in this application. Applied before anything is resolved.
    pub fn override_dependency<A, B, F>(mut self, cast: F) -> Self
    where
        A: ?Sized + Send + Sync + 'static,
        B: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<B>) -> Arc<A> + Send + Sync + 'static,
    {
        self.overrides.push(Box::new(move |container: &Container| {
            container.override_dependency::<A, B, F>(cast)
        }));
        self
    }

    pub fn auth_validator<V: AuthValidator>(mut self, validator: V) -> Self {
        self.collaborators.auth = Some(Arc::new(validator));
        self
    }

    pub fn body_validator<V: RequestValidator>(mut self, validator: V) -> Self {
        self.collaborators.body = Some(Arc::new(validator));
        self
    }

    pub fn query_validator<V: RequestValidator>(mut self, validator: V) -> Self {
        self.collaborators.query = Some(Arc::new(validator));
        self
    }

    pub fn params_validator<V: RequestValidator>(mut self, validator: V) -> Self {
        self.collaborators.params = Some(Arc::new(validator));
        self
    }

    pub fn socket_data_validator<V: RequestValidator>(mut self, validator: V) -> Self {
        self.collaborators.socket_data = Some(Arc::new(validator));
        self
    }

    pub fn socket_auth_validator<V: SocketAuthValidator>(mut self, validator: V) -> Self {
        self.collaborators.socket_auth = Some(Arc::new(validator));
        self
    }

    /// Build every chain and assemble the router.
    ///
    /// Nothing is registered unless every chain builds; the first configuration error
    /// is returned.
    pub fn bootstrap(self) -> Result<Application> {
        bootstrap::bootstrap(self)
    }
}

/// A bootstrapped application.
pub struct Application {
    container: Arc<Container>,
    router: Router,
    sockets: SocketServer,
    routes: Vec<(HttpMethod, String)>,
    config: ApplicationConfig,
}

impl Application {
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn sockets(&self) -> &SocketServer {
        &self.sockets
    }

    /// Registered routes, `:name` syntax, in registration order.
    pub fn routes(&self) -> &[(HttpMethod, String)] {
        &self.routes
    }

    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    /// Bind the configured address and serve until a shutdown signal arrives.
    pub async fn listen(self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.bind_address).await?;
        self.serve(listener).await
    }

    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        tracing::info!(address = ?listener.local_addr().ok(), "Application listening");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        tracing::info!("Application stopped");
        Ok(())
    }
}
