use crate::exception::HandlerResult;
use crate::validation::{RequestValidator, Shape};
use crate::websocket::{Acknowledgement, SocketContext};
use futures::future::BoxFuture;
use serde_json::{Value, json};
use std::sync::Arc;

type EventInvoker = Arc<
    dyn Fn(SocketContext, Value, Option<Acknowledgement>) -> BoxFuture<'static, HandlerResult<()>>
        + Send
        + Sync,
>;

type ConnectionInvoker =
    Arc<dyn Fn(SocketContext) -> BoxFuture<'static, HandlerResult<()>> + Send + Sync>;

/// Executable chain of one websocket event handler.
#[derive(Clone)]
pub struct EventChain {
    namespace: String,
    event: String,
    validation: Option<(Arc<dyn RequestValidator>, Shape)>,
    invoke: EventInvoker,
}

impl EventChain {
    pub(crate) fn new<F>(
        namespace: &str,
        event: &str,
        validation: Option<(Arc<dyn RequestValidator>, Shape)>,
        invoke: F,
    ) -> Self
    where
        F: Fn(SocketContext, Value, Option<Acknowledgement>) -> BoxFuture<'static, HandlerResult<()>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            namespace: namespace.to_string(),
            event: event.to_string(),
            validation,
            invoke: Arc::new(invoke),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn validates(&self) -> bool {
        self.validation.is_some()
    }

    /// Validate `payload` when a data shape is declared, then run the handler.
    ///
    /// A rejected payload is answered on `ack` with `{"status": "Validation Error"}` and
    /// the handler is not invoked. Handler errors are logged.
    pub async fn handle(&self, context: SocketContext, payload: Value, ack: Option<Acknowledgement>) {
        if let Some((validator, shape)) = &self.validation {
            let outcome = validator.validate(shape, &payload).await;
            if !outcome.valid {
                tracing::debug!(
                    namespace = self.namespace.as_str(),
                    event = self.event.as_str(),
                    reason = ?outcome.fail_reason,
                    "Socket payload failed validation"
                );
                if let Some(ack) = ack {
                    let mut body = json!({ "status": "Validation Error" });
                    if let Some(reason) = outcome.fail_reason {
                        body["reason"] = Value::String(reason);
                    }
                    ack.send(body);
                }
                return;
            }
        }

        if let Err(err) = (self.invoke)(context, payload, ack).await {
            tracing::warn!(
                namespace = self.namespace.as_str(),
                event = self.event.as_str(),
                error = %err,
                "Socket event handler failed"
            );
        }
    }
}

/// Connection handler of one websocket controller.
#[derive(Clone)]
pub struct ConnectionChain {
    namespace: String,
    invoke: ConnectionInvoker,
}

impl ConnectionChain {
    pub(crate) fn new<F>(namespace: &str, invoke: F) -> Self
    where
        F: Fn(SocketContext) -> BoxFuture<'static, HandlerResult<()>> + Send + Sync + 'static,
    {
        Self {
            namespace: namespace.to_string(),
            invoke: Arc::new(invoke),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn handle(&self, context: SocketContext) {
        if let Err(err) = (self.invoke)(context).await {
            tracing::warn!(
                namespace = self.namespace.as_str(),
                error = %err,
                "Socket connection handler failed"
            );
        }
    }
}
