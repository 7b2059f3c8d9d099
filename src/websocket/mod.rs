//! Websocket controllers and the namespaced socket server.
//!
//! A websocket controller listens on one namespace. It may declare a connection handler
//! and any number of event handlers, each optionally validating its payload against a
//! data shape.

use crate::chain::join_paths;
use crate::di::{Injectable, InjectableConfig};
use crate::error::{Result, SwitchyardError};
use crate::exception::HandlerResult;
use crate::metadata::{MetadataKey, MetadataStore, TypeKey};
use crate::validation::Shape;
use futures::future::BoxFuture;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

mod server;
mod socket;

pub use server::SocketServer;
pub use socket::{Acknowledgement, Envelope, Socket, SocketContext};

pub(crate) use server::socket_router;

pub type EventHandler<C> = Arc<
    dyn Fn(Arc<C>, SocketContext, Value, Option<Acknowledgement>) -> BoxFuture<'static, HandlerResult<()>>
        + Send
        + Sync,
>;

pub type ConnectionHandler<C> =
    Arc<dyn Fn(Arc<C>, SocketContext) -> BoxFuture<'static, HandlerResult<()>> + Send + Sync>;

pub struct EventHandlerDescriptor<C> {
    pub event: String,
    pub data_shape: Option<Shape>,
    pub handler: EventHandler<C>,
}

impl<C> Clone for EventHandlerDescriptor<C> {
    fn clone(&self) -> Self {
        Self {
            event: self.event.clone(),
            data_shape: self.data_shape.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

pub struct WebSocketControllerDescriptor<C> {
    pub namespace: String,
    pub connection_handler: Option<ConnectionHandler<C>>,
    pub events: Vec<EventHandlerDescriptor<C>>,
}

impl<C: 'static> WebSocketControllerDescriptor<C> {
    /// Read the descriptor of `C` from the store.
    ///
    /// # Errors
    /// [`SwitchyardError::MalformedWebSocketController`] when `C` has no dependency key or
    /// no event list.
    pub fn load(store: &MetadataStore) -> Result<Self> {
        let target = TypeKey::of::<C>();
        if store.dependency_key(target).is_none() {
            return Err(SwitchyardError::malformed_websocket_controller(
                target.name(),
                "not marked as injectable",
            ));
        }
        let events: Vec<EventHandlerDescriptor<C>> = store
            .get(target, MetadataKey::WebSocketEventHandlers)
            .ok_or_else(|| {
                SwitchyardError::malformed_websocket_controller(target.name(), "missing event list")
            })?;
        let namespace: String = store
            .get(target, MetadataKey::WebSocketNamespace)
            .unwrap_or_else(|| "/".to_string());
        let connection_handler = store.get(target, MetadataKey::WebSocketConnectionHandler);

        Ok(Self {
            namespace,
            connection_handler,
            events,
        })
    }
}

/// Options of one event handler.
#[derive(Debug, Clone)]
pub struct EventDefinition {
    event: String,
    data_shape: Option<Shape>,
}

impl EventDefinition {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data_shape: None,
        }
    }

    pub fn data_shape<S: Any + Send + Sync>(mut self, shape: S) -> Self {
        self.data_shape = Some(Shape::new(shape));
        self
    }
}

/// Declaration of websocket controller `C`.
pub struct WebSocketControllerDefinition<C> {
    namespace: String,
    identifier: Option<String>,
    connection_handlers: Vec<ConnectionHandler<C>>,
    events: Vec<EventHandlerDescriptor<C>>,
    _controller: PhantomData<fn() -> C>,
}

impl<C: Injectable> Default for WebSocketControllerDefinition<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Injectable> WebSocketControllerDefinition<C> {
    pub fn new() -> Self {
        Self {
            namespace: "/".to_string(),
            identifier: None,
            connection_handlers: Vec::new(),
            events: Vec::new(),
            _controller: PhantomData,
        }
    }

    pub fn namespace(mut self, namespace: impl AsRef<str>) -> Self {
        self.namespace = join_paths(namespace.as_ref(), "");
        self
    }

    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn on_connection<H, Fut>(mut self, handler: H) -> Self
    where
        H: Fn(Arc<C>, SocketContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        let handler: ConnectionHandler<C> = Arc::new(
            move |controller: Arc<C>, context: SocketContext| -> BoxFuture<'static, HandlerResult<()>> {
                Box::pin(handler(controller, context))
            },
        );
        self.connection_handlers.push(handler);
        self
    }

    pub fn on_event<H, Fut>(mut self, event: EventDefinition, handler: H) -> Self
    where
        H: Fn(Arc<C>, SocketContext, Value, Option<Acknowledgement>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        let handler: EventHandler<C> = Arc::new(
            move |controller: Arc<C>,
                  context: SocketContext,
                  payload: Value,
                  ack: Option<Acknowledgement>|
                  -> BoxFuture<'static, HandlerResult<()>> {
                Box::pin(handler(controller, context, payload, ack))
            },
        );
        self.events.push(EventHandlerDescriptor {
            event: event.event,
            data_shape: event.data_shape,
            handler,
        });
        self
    }

    /// Write the declaration into `store`. The controller becomes an injectable singleton.
    ///
    /// # Errors
    /// [`SwitchyardError::DuplicateConnectionHandler`] when more than one connection
    /// handler is declared for `C`.
    pub fn register(mut self, store: &MetadataStore) -> Result<()> {
        let target = TypeKey::of::<C>();
        let already_declared = store.has(target, MetadataKey::WebSocketConnectionHandler);
        if self.connection_handlers.len() > 1
            || (already_declared && !self.connection_handlers.is_empty())
        {
            return Err(SwitchyardError::DuplicateConnectionHandler {
                type_name: target.name().to_string(),
            });
        }

        let mut config = InjectableConfig::singleton();
        if let Some(identifier) = self.identifier.take() {
            config = config.identifier(identifier);
        }
        store.mark_injectable::<C>(config)?;

        tracing::debug!(
            controller = %target,
            namespace = self.namespace.as_str(),
            events = self.events.len(),
            "Registered websocket controller"
        );
        if let Some(handler) = self.connection_handlers.pop() {
            store.set(target, MetadataKey::WebSocketConnectionHandler, handler);
        }
        store.set(target, MetadataKey::WebSocketNamespace, self.namespace);
        store.set(target, MetadataKey::WebSocketEventHandlers, self.events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::Container;

    struct Chat;

    impl Injectable for Chat {
        fn inject(_container: &Container) -> Result<Self> {
            Ok(Chat)
        }
    }

    impl Chat {
        async fn joined(self: Arc<Self>, _context: SocketContext) -> HandlerResult<()> {
            Ok(())
        }

        async fn message(
            self: Arc<Self>,
            _context: SocketContext,
            _payload: Value,
            _ack: Option<Acknowledgement>,
        ) -> HandlerResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_two_connection_handlers_are_rejected() {
        let store = MetadataStore::new();
        let err = WebSocketControllerDefinition::<Chat>::new()
            .on_connection(Chat::joined)
            .on_connection(Chat::joined)
            .register(&store)
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::DuplicateConnectionHandler { .. }));
        assert!(!store.is_injectable::<Chat>());
    }

    #[test]
    fn test_register_writes_descriptor() {
        let store = MetadataStore::new();
        WebSocketControllerDefinition::<Chat>::new()
            .namespace("chat")
            .on_connection(Chat::joined)
            .on_event(EventDefinition::new("message"), Chat::message)
            .register(&store)
            .unwrap();

        let descriptor = WebSocketControllerDescriptor::<Chat>::load(&store).unwrap();
        assert_eq!(descriptor.namespace, "/chat");
        assert!(descriptor.connection_handler.is_some());
        assert_eq!(descriptor.events.len(), 1);
        assert_eq!(descriptor.events[0].event, "message");
    }

    #[test]
    fn test_load_requires_event_list() {
        let store = MetadataStore::new();
        store
            .mark_injectable::<Chat>(InjectableConfig::singleton())
            .unwrap();
        let err = WebSocketControllerDescriptor::<Chat>::load(&store).err().unwrap();
        assert!(matches!(err, SwitchyardError::MalformedWebSocketController { .. }));
    }
}
