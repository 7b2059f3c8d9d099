use crate::application::{Application, ApplicationBuilder};
use crate::chain::{ChainBuilder, ConnectionChain, EventChain, RouteChain, join_paths, route_shape, to_router_path};
use crate::config::CommonMiddlewareConfig;
use crate::controller::BoundController;
use crate::di::{Container, Injectable};
use crate::error::{Result, SwitchyardError};
use crate::exception::{ErrorHandler, HandlerError, NotFoundConfig};
use crate::middleware::{AppMiddleware, AppMiddlewareLayer, MiddlewareRef, Next};
use crate::websocket::{SocketServer, WebSocketControllerDescriptor, socket_router};
use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Request},
    response::Response,
    routing::{MethodRouter, on},
};
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Chains of one websocket controller.
pub(super) struct SocketMount {
    namespace: String,
    connection: Option<ConnectionChain>,
    events: Vec<EventChain>,
}

pub(super) fn mount_controller<C: Injectable>(builder: &ChainBuilder) -> Result<Vec<RouteChain>> {
    let controller = BoundController::<C>::resolve(builder.container())?;
    controller
        .descriptor
        .routes
        .iter()
        .map(|route| builder.build_route_chain(&controller, route))
        .collect()
}

pub(super) fn mount_websocket_controller<C: Injectable>(builder: &ChainBuilder) -> Result<SocketMount> {
    let descriptor = WebSocketControllerDescriptor::<C>::load(builder.container().metadata())?;
    let controller = builder.container().resolve::<C>()?;
    let events = descriptor
        .events
        .iter()
        .map(|event| builder.build_event_chain(&descriptor.namespace, &controller, event))
        .collect::<Result<Vec<_>>>()?;

    Ok(SocketMount {
        connection: builder.build_connection_chain(&controller, &descriptor),
        namespace: descriptor.namespace,
        events,
    })
}

pub(super) fn bootstrap(app: ApplicationBuilder) -> Result<Application> {
    let ApplicationBuilder {
        metadata,
        config,
        collaborators,
        controllers,
        websocket_controllers,
        before_controllers,
        after_controllers,
        overrides,
    } = app;

    let container = Arc::new(Container::new(metadata));
    for apply in overrides {
        apply(container.as_ref())?;
    }

    let error_handler = Arc::new(ErrorHandler::new(config.error_handler.clone()));
    let mut chains = ChainBuilder::new(Arc::clone(&container), collaborators.clone())
        .error_handler(Arc::clone(&error_handler))
        .body_limit(config.body_limit);
    if let Some(prefix) = &config.global_prefix {
        chains = chains.global_prefix(prefix.clone());
    }

    // Build everything first so a configuration error leaves nothing registered.
    let mut routes = Vec::new();
    for controller in &controllers {
        tracing::debug!(controller = controller.name, "Building controller chains");
        routes.extend((controller.mount)(&chains)?);
    }

    let mut sockets = Vec::new();
    for controller in &websocket_controllers {
        tracing::debug!(controller = controller.name, "Building websocket controller chains");
        sockets.push((controller.mount)(&chains)?);
    }
    let socket_path = (!websocket_controllers.is_empty()).then_some(config.socket_path.as_str());
    check_routes(&routes, socket_path)?;

    let before = resolve_app_middleware(&container, &before_controllers)?;
    let after = resolve_app_middleware(&container, &after_controllers)?;
    let cors = cors_layer(&config.common)?;

    let socket_server = SocketServer::new(collaborators.socket_auth.clone());
    for mount in sockets {
        socket_server.add_namespace(&mount.namespace);
        if let Some(connection) = mount.connection {
            socket_server.add_connection_chain(connection);
        }
        for event in mount.events {
            socket_server.add_event_chain(event);
        }
    }

    let mut router = Router::new();
    for (path, method_router) in method_routers(&routes) {
        router = router.route(&path, method_router);
    }
    if !websocket_controllers.is_empty() {
        router = router.merge(socket_router(
            socket_server.clone(),
            Arc::clone(&error_handler),
            &config.socket_path,
        ));
    }

    // Unmatched paths and unmatched methods take the same way out.
    let unmatched = fallback(after, Arc::clone(&error_handler), config.not_found.clone());
    router = router
        .method_not_allowed_fallback(unmatched.clone())
        .fallback(unmatched)
        .layer(AppMiddlewareLayer::new(before, Arc::clone(&error_handler)));

    let panic_handler = Arc::clone(&error_handler);
    router = router.layer(CatchPanicLayer::custom(
        move |payload: Box<dyn std::any::Any + Send + 'static>| panic_handler.handle_panic(payload),
    ));
    if let Some(cors) = cors {
        router = router.layer(cors);
    }
    if config.common.request_tracing {
        router = router.layer(TraceLayer::new_for_http());
    }

    tracing::info!(
        routes = routes.len(),
        namespaces = socket_server.namespaces().len(),
        "Application bootstrapped"
    );

    Ok(Application {
        container,
        router,
        sockets: socket_server,
        routes: routes
            .iter()
            .map(|chain| (chain.method(), chain.path().to_string()))
            .collect(),
        config,
    })
}

/// Reject routes the router could not hold side by side.
///
/// Two routes with the same shape must use the same parameter names, and no route may
/// live under the socket path.
fn check_routes(routes: &[RouteChain], socket_path: Option<&str>) -> Result<()> {
    let mut seen = HashSet::new();
    let mut shapes: HashMap<String, (String, &str)> = HashMap::new();
    let socket_base = socket_path.map(|path| join_paths(path, ""));

    for chain in routes {
        let path = to_router_path(chain.path());
        let shape = route_shape(&path);
        if !seen.insert((chain.method(), shape.clone())) {
            return Err(SwitchyardError::DuplicateRoute {
                method: chain.method().to_string(),
                path: chain.path().to_string(),
            });
        }

        match shapes.get(&shape) {
            Some((existing, declared)) if *existing != path => {
                return Err(SwitchyardError::ConflictingRoute {
                    path: chain.path().to_string(),
                    existing: declared.to_string(),
                });
            }
            Some(_) => {}
            None => {
                shapes.insert(shape, (path.clone(), chain.path()));
            }
        }

        if let Some(base) = &socket_base {
            let nested = base.trim_end_matches('/');
            if path == *base || path.starts_with(&format!("{nested}/")) {
                return Err(SwitchyardError::ConflictingRoute {
                    path: chain.path().to_string(),
                    existing: format!("websocket endpoint {base}"),
                });
            }
        }
    }
    Ok(())
}

fn method_routers(routes: &[RouteChain]) -> BTreeMap<String, MethodRouter> {
    let mut grouped: BTreeMap<String, MethodRouter> = BTreeMap::new();
    for chain in routes {
        let path = to_router_path(chain.path());
        tracing::info!(method = %chain.method(), path = chain.path(), "Mapped route");

        let filter = chain.method().method_filter();
        let chain = chain.clone();
        let handler = move |request: Request<Body>| async move { chain.handle(request).await };
        let method_router = match grouped.remove(&path) {
            Some(existing) => existing.on(filter, handler),
            None => on(filter, handler),
        };
        grouped.insert(path, method_router);
    }
    grouped
}

fn resolve_app_middleware(container: &Container, references: &[MiddlewareRef]) -> Result<Vec<AppMiddleware>> {
    references
        .iter()
        .map(|reference| {
            let config = reference.config(container.metadata())?;
            Ok(AppMiddleware::new(config.pattern(), reference.resolve(container)?))
        })
        .collect()
}

fn cors_layer(common: &CommonMiddlewareConfig) -> Result<Option<CorsLayer>> {
    if common.cors_origins.is_empty() {
        return Ok(None);
    }
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if common.cors_origins.iter().any(|origin| origin == "*") {
        return Ok(Some(layer.allow_origin(Any)));
    }

    let origins = common
        .cors_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|_| SwitchyardError::InvalidConfig {
                key: "CORS_ORIGINS".to_string(),
                value: origin.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(layer.allow_origin(origins)))
}

/// Fallback running after-controller middleware, then answering not found.
fn fallback(
    after: Vec<AppMiddleware>,
    error_handler: Arc<ErrorHandler>,
    not_found: NotFoundConfig,
) -> impl Fn(Request<Body>) -> BoxFuture<'static, Response> + Clone + Send + Sync + 'static {
    let after: Arc<[AppMiddleware]> = after.into();
    let not_found = Arc::new(not_found);
    move |request: Request<Body>| -> BoxFuture<'static, Response> {
        let path = request.uri().path().to_owned();
        let steps: Vec<_> = after
            .iter()
            .filter(|entry| entry.matches(&path))
            .map(|entry| Arc::clone(&entry.middleware))
            .collect();
        let error_handler = Arc::clone(&error_handler);
        let not_found = Arc::clone(&not_found);

        Box::pin(async move {
            let responder = Arc::clone(&error_handler);
            let terminal = Next::new(move |_request| {
                Box::pin(async move { Ok::<_, HandlerError>(responder.not_found(&not_found)) })
            });
            match Next::chain(steps, terminal).run(request).await {
                Ok(response) => response,
                Err(error) => error_handler.handle(error),
            }
        })
    }
}
