//! Composes declared routes and events into executable chains.
//!
//! A route chain always runs its steps in the same order:
//! controller middleware, auth, body validation, query validation, params validation,
//! route middleware and finally the handler. Steps whose collaborator is missing fail
//! the build, never the request.

use crate::controller::{BoundController, RouteDescriptor};
use crate::di::{Container, Injectable};
use crate::error::{Result, SwitchyardError};
use crate::exception::ErrorHandler;
use crate::middleware::Middleware;
use crate::validation::{AuthValidator, RequestValidator, SocketAuthValidator};
use crate::websocket::{EventHandlerDescriptor, WebSocketControllerDescriptor};
use std::sync::Arc;
use strum_macros::Display;

mod event;
mod route;

pub use event::{ConnectionChain, EventChain};
pub use route::{DataSource, RouteChain, StepKind};

use route::{AuthStep, ChainStep, HandlerStep, ValidationStep};

/// Default limit for buffered request bodies.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Validators a chain may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Collaborator {
    #[strum(serialize = "auth validator")]
    AuthValidator,
    #[strum(serialize = "body validator")]
    BodyValidator,
    #[strum(serialize = "query validator")]
    QueryValidator,
    #[strum(serialize = "params validator")]
    ParamsValidator,
    #[strum(serialize = "socket data validator")]
    SocketDataValidator,
}

/// The registered validators.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub auth: Option<Arc<dyn AuthValidator>>,
    pub body: Option<Arc<dyn RequestValidator>>,
    pub query: Option<Arc<dyn RequestValidator>>,
    pub params: Option<Arc<dyn RequestValidator>>,
    pub socket_data: Option<Arc<dyn RequestValidator>>,
    pub socket_auth: Option<Arc<dyn SocketAuthValidator>>,
}

impl Collaborators {
    fn require<T: ?Sized>(
        slot: &Option<Arc<T>>,
        collaborator: Collaborator,
        target: &str,
    ) -> Result<Arc<T>> {
        slot.clone().ok_or_else(|| SwitchyardError::MissingCollaborator {
            collaborator,
            target: target.to_string(),
        })
    }
}

pub struct ChainBuilder {
    container: Arc<Container>,
    collaborators: Collaborators,
    error_handler: Arc<ErrorHandler>,
    global_prefix: Option<String>,
    body_limit: usize,
}

impl ChainBuilder {
    pub fn new(container: Arc<Container>, collaborators: Collaborators) -> Self {
        Self {
            container,
            collaborators,
            error_handler: Arc::new(ErrorHandler::default()),
            global_prefix: None,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn error_handler(mut self, error_handler: Arc<ErrorHandler>) -> Self {
        self.error_handler = error_handler;
        self
    }

    /// Prefix joined in front of every controller path.
    pub fn global_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.global_prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Full path of `route`, global prefix included.
    pub fn route_path<C>(&self, controller: &BoundController<C>, route: &RouteDescriptor<C>) -> String {
        let path = join_paths(
            &controller.descriptor.path,
            route.path.as_deref().unwrap_or_default(),
        );
        match &self.global_prefix {
            Some(prefix) => join_paths(prefix, &path),
            None => path,
        }
    }

    pub fn build_route_chain<C: Injectable>(
        &self,
        controller: &BoundController<C>,
        route: &RouteDescriptor<C>,
    ) -> Result<RouteChain> {
        let path = self.route_path(controller, route);
        let target = format!("{} {}", route.method, path);
        let mut steps = Vec::new();

        for reference in &controller.descriptor.middleware {
            steps.push(ChainStep::new(
                StepKind::ControllerMiddleware,
                reference.resolve(&self.container)?,
            ));
        }

        if route.auth.is_required() {
            let validator = Collaborators::require(
                &self.collaborators.auth,
                Collaborator::AuthValidator,
                &target,
            )?;
            steps.push(ChainStep::new(StepKind::Auth, Arc::new(AuthStep { validator })));
        }

        let validations = [
            (DataSource::Body, &route.body_shape, &self.collaborators.body, Collaborator::BodyValidator),
            (DataSource::Query, &route.query_shape, &self.collaborators.query, Collaborator::QueryValidator),
            (DataSource::Params, &route.params_shape, &self.collaborators.params, Collaborator::ParamsValidator),
        ];
        for (source, shape, validator, collaborator) in validations {
            let Some(shape) = shape else { continue };
            let validator = Collaborators::require(validator, collaborator, &target)?;
            let step: Arc<dyn Middleware> = Arc::new(ValidationStep {
                source,
                shape: shape.clone(),
                validator,
                body_limit: self.body_limit,
            });
            steps.push(ChainStep::new(source.step_kind(), step));
        }

        for reference in &route.middleware {
            steps.push(ChainStep::new(
                StepKind::RouteMiddleware,
                reference.resolve(&self.container)?,
            ));
        }

        steps.push(ChainStep::new(
            StepKind::Handler,
            Arc::new(HandlerStep {
                instance: Arc::clone(&controller.instance),
                handler: Arc::clone(&route.handler),
            }),
        ));

        Ok(RouteChain::new(
            route.method,
            path,
            steps,
            Arc::clone(&self.error_handler),
        ))
    }

    pub fn build_event_chain<C: Send + Sync + 'static>(
        &self,
        namespace: &str,
        controller: &Arc<C>,
        event: &EventHandlerDescriptor<C>,
    ) -> Result<EventChain> {
        let validation = match &event.data_shape {
            Some(shape) => {
                let target = format!("event '{}' in namespace {namespace}", event.event);
                let validator = Collaborators::require(
                    &self.collaborators.socket_data,
                    Collaborator::SocketDataValidator,
                    &target,
                )?;
                Some((validator, shape.clone()))
            }
            None => None,
        };

        let instance = Arc::clone(controller);
        let handler = Arc::clone(&event.handler);
        Ok(EventChain::new(
            namespace,
            &event.event,
            validation,
            move |context, payload, ack| handler(Arc::clone(&instance), context, payload, ack),
        ))
    }

    /// Connection chain of a websocket controller, `None` when it declares no
    /// connection handler.
    pub fn build_connection_chain<C: Send + Sync + 'static>(
        &self,
        controller: &Arc<C>,
        descriptor: &WebSocketControllerDescriptor<C>,
    ) -> Option<ConnectionChain> {
        let handler = descriptor.connection_handler.clone()?;
        let instance = Arc::clone(controller);
        Some(ConnectionChain::new(
            &descriptor.namespace,
            move |context| handler(Arc::clone(&instance), context),
        ))
    }
}

/// Join a controller path and a route suffix.
///
/// The result always starts with `/`; the two parts are separated by exactly one `/`
/// unless one of them already supplies it.
pub fn join_paths(base: &str, suffix: &str) -> String {
    let mut path = if base.starts_with('/') {
        base.to_string()
    } else {
        format!("/{base}")
    };
    if suffix.is_empty() {
        return path;
    }
    match (path.ends_with('/'), suffix.starts_with('/')) {
        (true, true) => path.push_str(&suffix[1..]),
        (false, false) => {
            path.push('/');
            path.push_str(suffix);
        }
        _ => path.push_str(suffix),
    }
    path
}

/// Translate `:name` and `*name` segments to the router's `{name}` and `{*name}`.
pub fn to_router_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{name}}}")
            } else if let Some(name) = segment.strip_prefix('*') {
                let name = if name.is_empty() { "rest" } else { name };
                format!("{{*{name}}}")
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Router path with parameter names erased, so `/users/{id}` and `/users/{name}` compare equal.
pub fn route_shape(router_path: &str) -> String {
    router_path
        .split('/')
        .map(|segment| {
            if segment.starts_with("{*") {
                "{*}"
            } else if segment.starts_with('{') {
                "{}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
