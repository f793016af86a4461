use serde::{Deserialize, Serialize};

/// Payload tags a client may send.
///
/// Uses serde's default externally-tagged representation, which is exactly
/// the wire shape `spec.md` §6 specifies: unit variants serialize as a bare
/// string (`"Connect"`), the struct variant as `{"Text": {"text": "..."}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientPayload {
    /// Subscribe to the message's `route`.
    Connect,
    /// Unsubscribe from the message's `route`.
    Disconnect,
    /// A text event on the message's `route`.
    Text { text: String },
}

/// Payload tags the server may send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerPayload {
    /// A text event on the message's `route`.
    Text { text: String },
    /// The bundle failed to handle an event on this route; `callstack` is
    /// populated only in dev.
    ServerError { callstack: Option<String> },
}

/// A JSON-encoded message exchanged over the websocket, always carrying the
/// logical stream it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMessage<P> {
    /// The logical stream this message belongs to.
    pub route: String,
    /// The tagged payload.
    pub payload: P,
}

impl StreamMessage<ServerPayload> {
    /// Builds a `Text` server message for `route`.
    pub fn text(route: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            payload: ServerPayload::Text { text: text.into() },
        }
    }

    /// Builds a `ServerError` message for `route`, with an optional dev
    /// callstack.
    pub fn server_error(route: impl Into<String>, callstack: Option<String>) -> Self {
        Self {
            route: route.into(),
            payload: ServerPayload::ServerError { callstack },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_connect_round_trips() {
        let json = r#"{"route":"chat","payload":"Connect"}"#;
        let msg: StreamMessage<ClientPayload> = serde_json::from_str(json).unwrap();
        assert_eq!(msg.route, "chat");
        assert!(matches!(msg.payload, ClientPayload::Connect));
    }

    #[test]
    fn client_text_round_trips() {
        let json = r#"{"route":"chat","payload":{"Text":{"text":"hi"}}}"#;
        let msg: StreamMessage<ClientPayload> = serde_json::from_str(json).unwrap();
        match msg.payload {
            ClientPayload::Text { text } => assert_eq!(text, "hi"),
            _ => panic!("expected Text payload"),
        }
    }

    #[test]
    fn server_error_serializes_without_callstack_in_prod() {
        let msg = StreamMessage::server_error("chat", None);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"route\":\"chat\""));
        assert!(json.contains("ServerError"));
    }
}
