use crate::chain::{ConnectionChain, EventChain};
use crate::exception::{ErrorHandler, HandlerError};
use crate::validation::{Handshake, SocketAuthValidator, ValidationOutcome};
use crate::websocket::{Acknowledgement, Envelope, Socket, SocketContext};
use axum::{
    Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::{HeaderMap, Uri},
    response::{IntoResponse, Response},
    routing::get,
};
use dashmap::DashMap;
use futures::{FutureExt, SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use uuid::Uuid;

#[derive(Clone, Default)]
struct Namespace {
    connection: Vec<ConnectionChain>,
    events: HashMap<String, Vec<EventChain>>,
}

#[derive(Default)]
struct ServerState {
    namespaces: DashMap<String, Namespace>,
    sockets: DashMap<Uuid, Socket>,
    auth: Option<Arc<dyn SocketAuthValidator>>,
}

/// Namespaced websocket dispatcher.
///
/// Cheap to clone; all clones share the same namespaces and connected sockets.
#[derive(Clone, Default)]
pub struct SocketServer {
    state: Arc<ServerState>,
}

impl SocketServer {
    pub fn new(auth: Option<Arc<dyn SocketAuthValidator>>) -> Self {
        Self {
            state: Arc::new(ServerState {
                auth,
                ..ServerState::default()
            }),
        }
    }

    pub(crate) fn add_connection_chain(&self, chain: ConnectionChain) {
        self.state
            .namespaces
            .entry(chain.namespace().to_string())
            .or_default()
            .connection
            .push(chain);
    }

    pub(crate) fn add_event_chain(&self, chain: EventChain) {
        tracing::info!(
            namespace = chain.namespace(),
            event = chain.event(),
            "Mapped socket event"
        );
        self.state
            .namespaces
            .entry(chain.namespace().to_string())
            .or_default()
            .events
            .entry(chain.event().to_string())
            .or_default()
            .push(chain);
    }

    /// Make `namespace` known even when it has no handlers yet.
    pub(crate) fn add_namespace(&self, namespace: &str) {
        self.state
            .namespaces
            .entry(namespace.to_string())
            .or_default();
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.state.namespaces.contains_key(namespace)
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.state
            .namespaces
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of connected sockets.
    pub fn len(&self) -> usize {
        self.state.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.sockets.is_empty()
    }

    pub fn socket(&self, id: Uuid) -> Option<Socket> {
        self.state.sockets.get(&id).map(|entry| entry.value().clone())
    }

    /// Run the server-level socket auth validator. Valid when none is registered.
    pub async fn authorize(&self, handshake: &Handshake) -> ValidationOutcome {
        match &self.state.auth {
            Some(validator) => validator.authorize(handshake).await,
            None => ValidationOutcome::valid(),
        }
    }

    /// Track `socket` and run the connection handlers of its namespace.
    pub async fn connect(&self, socket: Socket) {
        tracing::debug!(socket = %socket.id(), namespace = socket.namespace(), "Socket connected");
        self.state.sockets.insert(socket.id(), socket.clone());

        let chains = self
            .state
            .namespaces
            .get(socket.namespace())
            .map(|namespace| namespace.connection.clone())
            .unwrap_or_default();
        for chain in chains {
            chain
                .handle(SocketContext::new(socket.clone(), self.clone()))
                .await;
        }
    }

    /// Run the chains listening for `event` on the socket's namespace.
    ///
    /// The acknowledgement goes to the first listener.
    pub async fn dispatch(
        &self,
        socket: &Socket,
        event: &str,
        payload: Value,
        ack: Option<Acknowledgement>,
    ) {
        let chains = self
            .state
            .namespaces
            .get(socket.namespace())
            .and_then(|namespace| namespace.events.get(event).cloned())
            .unwrap_or_default();
        if chains.is_empty() {
            tracing::debug!(namespace = socket.namespace(), event, "No handler for socket event");
            return;
        }

        let mut ack = ack;
        for chain in chains {
            chain
                .handle(
                    SocketContext::new(socket.clone(), self.clone()),
                    payload.clone(),
                    ack.take(),
                )
                .await;
        }
    }

    pub fn disconnect(&self, id: Uuid) {
        if self.state.sockets.remove(&id).is_some() {
            tracing::debug!(socket = %id, "Socket disconnected");
        }
    }

    /// Emit to every connected socket of `namespace`. Returns the number reached.
    pub fn broadcast(&self, namespace: &str, event: &str, data: Value) -> usize {
        self.state
            .sockets
            .iter()
            .filter(|entry| entry.namespace() == namespace)
            .filter(|entry| entry.emit(event, data.clone()))
            .count()
    }
}

#[derive(Clone)]
struct UpgradeState {
    server: SocketServer,
    error_handler: Arc<ErrorHandler>,
}

/// Router serving the root namespace at `path` and every other namespace below it.
pub(crate) fn socket_router(server: SocketServer, error_handler: Arc<ErrorHandler>, path: &str) -> Router {
    let base = crate::chain::join_paths(path, "");
    let nested = crate::chain::join_paths(&base, "{*namespace}");
    Router::new()
        .route(&base, get(upgrade_root))
        .route(&nested, get(upgrade_namespace))
        .with_state(UpgradeState {
            server,
            error_handler,
        })
}

async fn upgrade_root(
    State(state): State<UpgradeState>,
    headers: HeaderMap,
    uri: Uri,
    upgrade: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    accept(state, "/".to_string(), Handshake { headers, uri }, upgrade).await
}

async fn upgrade_namespace(
    State(state): State<UpgradeState>,
    Path(namespace): Path<String>,
    headers: HeaderMap,
    uri: Uri,
    upgrade: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let namespace = crate::chain::join_paths(&namespace, "");
    accept(state, namespace, Handshake { headers, uri }, upgrade).await
}

/// Check the namespace and the handshake, then upgrade.
///
/// The upgrade itself is required last, so unknown namespaces and refused handshakes are
/// answered the same way with or without upgrade headers.
async fn accept(
    state: UpgradeState,
    namespace: String,
    handshake: Handshake,
    upgrade: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if !state.server.has_namespace(&namespace) {
        return state
            .error_handler
            .handle(HandlerError::not_found("Unknown socket namespace").with_reason(namespace));
    }

    let outcome = state.server.authorize(&handshake).await;
    if !outcome.valid {
        let error = HandlerError::unauthorized("The socket connection was not authorized");
        let error = match outcome.fail_reason {
            Some(reason) => error.with_reason(reason),
            None => error,
        };
        return state.error_handler.handle(error);
    }

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };
    let server = state.server;
    upgrade
        .on_upgrade(move |connection| serve_connection(server, namespace, connection))
        .into_response()
}

async fn serve_connection(server: SocketServer, namespace: String, connection: WebSocket) {
    let (mut sink, mut stream) = connection.split();
    let (socket, mut outgoing) = Socket::channel(namespace);

    let writer = tokio::spawn(async move {
        while let Some(envelope) = outgoing.recv().await {
            let text = match serde_json::to_string(&envelope) {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(error = %err, "Failed to encode socket frame");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    server.connect(socket.clone()).await;

    // Events start in arrival order and then run concurrently; whatever is unfinished
    // when the client leaves is aborted.
    let mut events = JoinSet::new();
    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let envelope: Envelope = match serde_json::from_str(text.as_str()) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::debug!(socket = %socket.id(), error = %err, "Ignoring malformed socket frame");
                continue;
            }
        };
        let Some(event) = envelope.event else {
            continue;
        };

        let ack = envelope.ack.map(|id| socket.acknowledgement(id));
        let server = server.clone();
        let task_socket = socket.clone();
        start_in_order(&mut events, async move {
            server.dispatch(&task_socket, &event, envelope.data, ack).await;
        })
        .await;
        reap_finished(&mut events, socket.id());
    }

    events.abort_all();
    server.disconnect(socket.id());
    writer.abort();
}

/// Poll `task` once on the reader, so its handler starts before the next frame is read,
/// and only spawn it when it still has work left.
async fn start_in_order<F>(events: &mut JoinSet<()>, task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let mut task = task.boxed();
    if futures::poll!(task.as_mut()).is_pending() {
        events.spawn(task);
    }
}

/// Collect finished event tasks. Returns how many of them panicked.
fn reap_finished(events: &mut JoinSet<()>, socket: Uuid) -> usize {
    let mut failed = 0;
    while let Some(finished) = events.try_join_next() {
        if let Err(err) = finished {
            if err.is_cancelled() {
                continue;
            }
            tracing::warn!(socket = %socket, error = %err, "Socket event task failed");
            failed += 1;
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::{ErrorHandlerConfig, HandlerResult};
    use async_trait::async_trait;
    use axum::{body::Body, http::{Request, StatusCode}};
    use futures::future::BoxFuture;
    use serde_json::json;
    use std::sync::Mutex;
    use tower::ServiceExt;

    fn listener(name: &'static str, log: Arc<Mutex<Vec<(&'static str, bool)>>>) -> EventChain {
        EventChain::new("/chat", "message", None, move |_context, payload, ack| -> BoxFuture<'static, HandlerResult<()>> {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().unwrap().push((name, ack.is_some()));
                if let Some(ack) = ack {
                    ack.send(json!({ "echo": payload }));
                }
                Ok(())
            })
        })
    }

    fn chat_server(log: &Arc<Mutex<Vec<(&'static str, bool)>>>) -> SocketServer {
        let server = SocketServer::new(None);
        server.add_namespace("/chat");
        server.add_event_chain(listener("first", Arc::clone(log)));
        server.add_event_chain(listener("second", Arc::clone(log)));
        server
    }

    #[tokio::test]
    async fn test_dispatch_acknowledges_through_first_listener() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let server = chat_server(&log);
        let (socket, mut frames) = Socket::channel("/chat");
        server.connect(socket.clone()).await;

        server
            .dispatch(&socket, "message", json!("hi"), Some(socket.acknowledgement(7)))
            .await;

        assert_eq!(*log.lock().unwrap(), vec![("first", true), ("second", false)]);
        assert_eq!(frames.try_recv().unwrap(), Envelope::ack(7, json!({ "echo": "hi" })));
        assert!(frames.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dispatch_ignores_other_namespaces_and_unknown_events() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let server = chat_server(&log);
        let (lobby, _frames) = Socket::channel("/lobby");
        let (chat, _chat_frames) = Socket::channel("/chat");

        server.dispatch(&lobby, "message", json!("hi"), None).await;
        server.dispatch(&chat, "typing", json!(true), None).await;
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_runs_connection_handlers_and_tracks_socket() {
        let server = SocketServer::new(None);
        server.add_connection_chain(ConnectionChain::new("/chat", |context| -> BoxFuture<'static, HandlerResult<()>> {
            Box::pin(async move {
                context.emit("welcome", json!({ "id": context.socket().id().to_string() }));
                Ok(())
            })
        }));
        let (socket, mut frames) = Socket::channel("/chat");

        server.connect(socket.clone()).await;
        assert_eq!(server.len(), 1);
        assert!(server.socket(socket.id()).is_some());
        let welcome = frames.try_recv().unwrap();
        assert_eq!(welcome.event.as_deref(), Some("welcome"));

        server.disconnect(socket.id());
        assert!(server.is_empty());
        assert!(server.socket(socket.id()).is_none());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_only_the_namespace() {
        let server = SocketServer::new(None);
        let (alice, mut alice_frames) = Socket::channel("/chat");
        let (bob, mut bob_frames) = Socket::channel("/chat");
        let (carol, mut carol_frames) = Socket::channel("/news");
        for socket in [&alice, &bob, &carol] {
            server.connect(socket.clone()).await;
        }

        assert_eq!(server.broadcast("/chat", "notice", json!("maintenance")), 2);
        assert_eq!(
            alice_frames.try_recv().unwrap(),
            Envelope::event("notice", json!("maintenance"))
        );
        assert!(bob_frames.try_recv().is_ok());
        assert!(carol_frames.try_recv().is_err());

        server.disconnect(bob.id());
        assert_eq!(server.broadcast("/chat", "notice", json!("again")), 1);
    }

    struct DenyAll;

    #[async_trait]
    impl SocketAuthValidator for DenyAll {
        async fn authorize(&self, _handshake: &Handshake) -> ValidationOutcome {
            ValidationOutcome::invalid("bad token")
        }
    }

    async fn status_and_body(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    fn error_handler() -> Arc<ErrorHandler> {
        Arc::new(ErrorHandler::new(ErrorHandlerConfig::default()))
    }

    #[tokio::test]
    async fn test_unknown_namespace_is_not_found() {
        let server = SocketServer::new(None);
        server.add_namespace("/chat");
        let router = socket_router(server, error_handler(), "/ws");

        let (status, body) = status_and_body(router, "/ws/unknown").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["reason"], "/unknown");
    }

    #[tokio::test]
    async fn test_refused_handshake_is_unauthorized() {
        let server = SocketServer::new(Some(Arc::new(DenyAll)));
        server.add_namespace("/");
        server.add_namespace("/chat");
        let router = socket_router(server, error_handler(), "/ws");

        let (status, body) = status_and_body(router.clone(), "/ws").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["identifier"], "ACCESS_UNAUTHORIZED");
        assert_eq!(body["reason"], "bad token");

        let (status, _) = status_and_body(router, "/ws/chat").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_accepted_handshake_still_needs_an_upgrade() {
        let server = SocketServer::new(None);
        server.add_namespace("/");
        let router = socket_router(server, error_handler(), "/ws");

        let (status, _) = status_and_body(router, "/ws").await;
        assert!(status.is_client_error());
        assert_ne!(status, StatusCode::UNAUTHORIZED);
        assert_ne!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_events_start_in_arrival_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        let mut events = JoinSet::new();

        let first = Arc::clone(&log);
        start_in_order(&mut events, async move {
            first.lock().unwrap().push("first started");
            let _ = wait.await;
            first.lock().unwrap().push("first finished");
        })
        .await;
        assert_eq!(*log.lock().unwrap(), vec!["first started"]);

        let second = Arc::clone(&log);
        start_in_order(&mut events, async move {
            second.lock().unwrap().push("second");
        })
        .await;
        assert_eq!(*log.lock().unwrap(), vec!["first started", "second"]);
        assert_eq!(events.len(), 1);

        release.send(()).unwrap();
        while events.join_next().await.is_some() {}
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first started", "second", "first finished"]
        );
    }

    #[tokio::test]
    async fn test_panicked_event_tasks_are_reported() {
        let mut events: JoinSet<()> = JoinSet::new();
        events.spawn(async { panic!("handler exploded") });
        events.spawn(async {});

        let mut failed = 0;
        for _ in 0..100 {
            if events.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
            failed += reap_finished(&mut events, Uuid::new_v4());
        }
        assert!(events.is_empty());
        assert_eq!(failed, 1);
    }
}
