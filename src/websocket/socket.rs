use crate::websocket::SocketServer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

/// JSON frame exchanged with clients.
///
/// Clients send `{"event": "...", "data": ..., "ack": 7}`; the server answers
/// acknowledgements with `{"ack": 7, "data": ...}` and emits events as
/// `{"event": "...", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
}

impl Envelope {
    pub fn event(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: Some(event.into()),
            data,
            ack: None,
        }
    }

    pub fn ack(id: u64, data: Value) -> Self {
        Self {
            event: None,
            data,
            ack: Some(id),
        }
    }
}

/// A connected client.
#[derive(Debug, Clone)]
pub struct Socket {
    id: Uuid,
    namespace: String,
    outgoing: mpsc::UnboundedSender<Envelope>,
}

impl Socket {
    /// A socket whose outgoing frames are delivered to the returned receiver.
    pub fn channel(namespace: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (outgoing, receiver) = mpsc::unbounded_channel();
        let socket = Self {
            id: Uuid::new_v4(),
            namespace: namespace.into(),
            outgoing,
        };
        (socket, receiver)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Send an event to this client. Returns `false` once the connection is gone.
    pub fn emit(&self, event: impl Into<String>, data: Value) -> bool {
        self.send(Envelope::event(event, data))
    }

    pub(crate) fn send(&self, envelope: Envelope) -> bool {
        self.outgoing.send(envelope).is_ok()
    }

    /// Acknowledgement answering the client's request `id`.
    pub fn acknowledgement(&self, id: u64) -> Acknowledgement {
        let socket = self.clone();
        Acknowledgement::new(move |data| {
            socket.send(Envelope::ack(id, data));
        })
    }
}

/// Callback answering a client's request. Can be sent once.
pub struct Acknowledgement(Box<dyn FnOnce(Value) + Send>);

impl Acknowledgement {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(Value) + Send + 'static,
    {
        Self(Box::new(callback))
    }

    pub fn send(self, data: Value) {
        (self.0)(data)
    }
}

impl std::fmt::Debug for Acknowledgement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Acknowledgement")
    }
}

/// What websocket handlers get besides the payload.
#[derive(Clone)]
pub struct SocketContext {
    socket: Socket,
    server: SocketServer,
}

impl SocketContext {
    pub fn new(socket: Socket, server: SocketServer) -> Self {
        Self { socket, server }
    }

    pub fn socket(&self) -> &Socket {
        &self.socket
    }

    pub fn server(&self) -> &SocketServer {
        &self.server
    }

    pub fn emit(&self, event: impl Into<String>, data: Value) -> bool {
        self.socket.emit(event, data)
    }

    /// Emit to every socket of this socket's namespace.
    pub fn broadcast(&self, event: &str, data: Value) -> usize {
        self.server.broadcast(self.socket.namespace(), event, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_acknowledgement_frame() {
        let (socket, mut frames) = Socket::channel("/chat");
        socket.acknowledgement(3).send(json!({"ok": true}));

        let frame = frames.try_recv().unwrap();
        assert_eq!(frame, Envelope::ack(3, json!({"ok": true})));
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"ack": 3, "data": {"ok": true}})
        );
    }

    #[test]
    fn test_emit_after_close() {
        let (socket, frames) = Socket::channel("/");
        drop(frames);
        assert!(!socket.emit("tick", Value::Null));
    }

    #[test]
    fn test_envelope_parses_without_ack() {
        let frame: Envelope = serde_json::from_str(r#"{"event":"msg","data":"hi"}"#).unwrap();
        assert_eq!(frame.event.as_deref(), Some("msg"));
        assert_eq!(frame.ack, None);
    }
}
