use std::sync::atomic::{AtomicUsize, Ordering};
use switchyard::prelude::*;
use switchyard::validation::RequiredFields;

/// Chat room on the `/chat` namespace.
#[derive(Default, DeriveInjectable)]
pub struct ChatController {
    messages: AtomicUsize,
}

impl ChatController {
    pub fn declare(store: &MetadataStore) -> Result<()> {
        WebSocketControllerDefinition::<ChatController>::new()
            .namespace("chat")
            .on_connection(ChatController::joined)
            .on_event(
                EventDefinition::new("message").data_shape(RequiredFields::new(["text"])),
                ChatController::message,
            )
            .register(store)
    }

    async fn joined(self: Arc<Self>, context: SocketContext) -> HandlerResult<()> {
        context.emit("welcome", json!({ "id": context.socket().id() }));
        Ok(())
    }

    async fn message(
        self: Arc<Self>,
        context: SocketContext,
        payload: Value,
        ack: Option<Acknowledgement>,
    ) -> HandlerResult<()> {
        let sequence = self.messages.fetch_add(1, Ordering::Relaxed) + 1;
        let delivered = context.broadcast(
            "message",
            json!({ "from": context.socket().id(), "text": payload["text"], "sequence": sequence }),
        );
        if let Some(ack) = ack {
            ack.send(json!({ "status": "ok", "delivered": delivered }));
        }
        Ok(())
    }
}
