use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tungstenite::Message;

use crate::bundle::{Bundle, StreamEvent, StreamHandle};
use crate::config::{ServerEnvironment, StreamingConfig};
use crate::dispatch::truncate_trace;

use super::message::{ClientPayload, ServerPayload, StreamMessage};
use super::registry::StreamRegistry;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Decodes inbound stream frames, dispatches connect/disconnect/text
/// events to the bundle, and implements per-stream send and
/// broadcast-with-filter (`spec.md` §4.4).
pub struct StreamMultiplexer {
    registry: Arc<StreamRegistry>,
    bundle: Arc<dyn Bundle>,
    streaming_config: StreamingConfig,
    environment: ServerEnvironment,
}

impl StreamMultiplexer {
    /// Builds a multiplexer over a shared registry and bundle.
    pub fn new(
        registry: Arc<StreamRegistry>,
        bundle: Arc<dyn Bundle>,
        streaming_config: StreamingConfig,
        environment: ServerEnvironment,
    ) -> Self {
        Self {
            registry,
            bundle,
            streaming_config,
            environment,
        }
    }

    /// Runs one session's full lifecycle: register, receive loop, cleanup.
    /// `io` is the already-upgraded websocket stream (the HTTP upgrade
    /// itself happens in `crate::app`, mirroring how the teacher's
    /// `ApiError::WebSocketUpgrade` variant protects an in-flight upgrade
    /// from being dropped by error-handler cloning).
    pub async fn run<S>(&self, io: WebSocketStream<S>)
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let (mut sink, mut stream) = io.split();
        let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<StreamMessage<ServerPayload>>();
        let (close_tx, mut close_rx) = mpsc::unbounded_channel::<()>();
        let client_id = self.registry.register(outbox_tx).await;
        tracing::trace!(client_id, "stream session accepted");

        let timeout = self.streaming_config.timeout;
        let keepalive_enabled = self.streaming_config.keepalive_enabled();
        let mut ping_tick = tokio::time::interval(if keepalive_enabled {
            self.streaming_config.ping_period
        } else {
            std::time::Duration::from_secs(3600)
        });

        loop {
            tokio::select! {
                _ = close_rx.recv() => break,
                outgoing = outbox_rx.recv() => {
                    match outgoing {
                        Some(message) => {
                            let Ok(json) = serde_json::to_string(&message) else { continue };
                            if tokio::time::timeout(timeout, sink.send(Message::Text(json))).await.is_err() {
                                tracing::warn!(client_id, "write timed out, closing session");
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_tick.tick(), if keepalive_enabled => {
                    if tokio::time::timeout(timeout, sink.send(Message::Ping(Vec::new()))).await.is_err() {
                        tracing::warn!(client_id, "ping timed out, closing session");
                        break;
                    }
                }
                incoming = stream.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_frame(client_id, &text, &close_tx).await;
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {
                            // binary/ping/pong frames are not processed (spec.md §4.4.2)
                        }
                        Some(Err(err)) => {
                            tracing::error!(client_id, error = %err, "websocket read error");
                            break;
                        }
                    }
                }
            }
        }

        self.cleanup(client_id).await;
    }

    async fn handle_frame(&self, client_id: u64, text: &str, close_tx: &mpsc::UnboundedSender<()>) {
        let message: StreamMessage<ClientPayload> = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(err) => {
                tracing::warn!(client_id, error = %err, "malformed stream frame, ignored");
                return;
            }
        };
        let route = message.route;

        let already_subscribed = self.registry.is_subscribed(client_id, &route).await;
        match (already_subscribed, message.payload) {
            (false, ClientPayload::Connect) => {
                self.registry.subscribe(client_id, &route).await;
                self.deliver_event(
                    client_id,
                    &route,
                    StreamEvent::ClientConnected {
                        route: route.clone(),
                        client_id,
                    },
                    close_tx,
                )
                .await;
            }
            (true, ClientPayload::Text { text }) => {
                self.deliver_event(
                    client_id,
                    &route,
                    StreamEvent::Text {
                        route: route.clone(),
                        client_id,
                        text,
                    },
                    close_tx,
                )
                .await;
            }
            (true, ClientPayload::Disconnect) => {
                let emptied = self.registry.unsubscribe(client_id, &route).await;
                self.deliver_event(
                    client_id,
                    &route,
                    StreamEvent::ClientDisconnected {
                        route: route.clone(),
                        client_id,
                    },
                    close_tx,
                )
                .await;
                if emptied {
                    let _ = close_tx.send(());
                }
            }
            // unsubscribed + Text/Disconnect: treated as a no-op, per the
            // Open Question resolution recorded in DESIGN.md.
            (false, ClientPayload::Text { .. }) | (false, ClientPayload::Disconnect) => {}
            (true, ClientPayload::Connect) => {}
        }
    }

    async fn deliver_event(
        &self,
        client_id: u64,
        route: &str,
        event: StreamEvent,
        close_tx: &mpsc::UnboundedSender<()>,
    ) {
        let handle = SessionRouteHandle {
            registry: self.registry.clone(),
            client_id,
            route: route.to_string(),
            close_tx: close_tx.clone(),
        };
        if let Err(err) = self.bundle.handle_stream_event(event, &handle).await {
            tracing::error!(client_id, route, error = %err, "bundle raised an error handling stream event");
            let callstack = match self.environment {
                ServerEnvironment::Dev => {
                    Some(truncate_trace(&err, |frame| self.bundle.is_framework_frame(frame)))
                }
                ServerEnvironment::Prod => None,
            };
            self.registry
                .send_to(client_id, StreamMessage::server_error(route.to_string(), callstack))
                .await;
            handle.disconnect().await;
        }
    }

    async fn cleanup(&self, client_id: u64) {
        let routes = self.registry.subscribed_routes(client_id).await;
        let (noop_tx, _noop_rx) = mpsc::unbounded_channel();
        for route in routes {
            let handle = SessionRouteHandle {
                registry: self.registry.clone(),
                client_id,
                route: route.clone(),
                close_tx: noop_tx.clone(),
            };
            let _ = self
                .bundle
                .handle_stream_event(
                    StreamEvent::ClientDisconnected { route, client_id },
                    &handle,
                )
                .await;
        }
        self.registry.remove(client_id).await;
        tracing::trace!(client_id, "stream session cleaned up");
    }
}

struct SessionRouteHandle {
    registry: Arc<StreamRegistry>,
    client_id: u64,
    route: String,
    close_tx: mpsc::UnboundedSender<()>,
}

impl StreamHandle for SessionRouteHandle {
    fn send(&self, text: String) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.registry
                .send_to(self.client_id, StreamMessage::text(self.route.clone(), text))
                .await;
        })
    }

    fn broadcast(&self, text: String, filter: Box<dyn Fn(u64) -> bool + Send>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.registry
                .broadcast(&self.route, StreamMessage::text(self.route.clone(), text), filter)
                .await;
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let emptied = self.registry.unsubscribe(self.client_id, &self.route).await;
            if emptied {
                let _ = self.close_tx.send(());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::BundleError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingBundle {
        events: std::sync::Mutex<Vec<String>>,
    }

    impl Bundle for RecordingBundle {
        fn handle_request(
            &self,
            _api_path: &str,
            _request: crate::neutral::NeutralRequest,
        ) -> BoxFuture<'_, Result<Option<crate::neutral::NeutralResponse>, BundleError>> {
            Box::pin(async { Ok(None) })
        }

        fn handle_stream_event(
            &self,
            event: StreamEvent,
            _handle: &dyn StreamHandle,
        ) -> BoxFuture<'_, Result<(), BundleError>> {
            let label = match &event {
                StreamEvent::ClientConnected { route, client_id } => {
                    format!("connected:{route}:{client_id}")
                }
                StreamEvent::ClientDisconnected { route, client_id } => {
                    format!("disconnected:{route}:{client_id}")
                }
                StreamEvent::Text { route, client_id, text } => {
                    format!("text:{route}:{client_id}:{text}")
                }
            };
            self.events.lock().unwrap().push(label);
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn connect_text_disconnect_delivers_in_order() {
        let registry = Arc::new(StreamRegistry::new());
        let bundle = Arc::new(RecordingBundle {
            events: std::sync::Mutex::new(Vec::new()),
        });
        let multiplexer = StreamMultiplexer::new(
            registry.clone(),
            bundle.clone(),
            StreamingConfig {
                ping_period: std::time::Duration::from_secs(0),
                timeout: std::time::Duration::from_secs(5),
            },
            ServerEnvironment::Dev,
        );

        let (close_tx, _close_rx) = mpsc::unbounded_channel();
        let client_id = registry
            .register(mpsc::unbounded_channel().0)
            .await;

        multiplexer
            .handle_frame(client_id, r#"{"route":"chat","payload":"Connect"}"#, &close_tx)
            .await;
        multiplexer
            .handle_frame(
                client_id,
                r#"{"route":"chat","payload":{"Text":{"text":"hi"}}}"#,
                &close_tx,
            )
            .await;
        multiplexer
            .handle_frame(client_id, r#"{"route":"chat","payload":"Disconnect"}"#, &close_tx)
            .await;

        let events = bundle.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                format!("connected:chat:{client_id}"),
                format!("text:chat:{client_id}:hi"),
                format!("disconnected:chat:{client_id}"),
            ]
        );
    }

    #[tokio::test]
    async fn unsubscribed_text_is_a_noop() {
        let registry = Arc::new(StreamRegistry::new());
        let bundle = Arc::new(RecordingBundle {
            events: std::sync::Mutex::new(Vec::new()),
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let _ = calls.load(Ordering::Relaxed);
        let multiplexer = StreamMultiplexer::new(
            registry.clone(),
            bundle.clone(),
            StreamingConfig {
                ping_period: std::time::Duration::from_secs(0),
                timeout: std::time::Duration::from_secs(5),
            },
            ServerEnvironment::Dev,
        );
        let (close_tx, _close_rx) = mpsc::unbounded_channel();
        let client_id = registry.register(mpsc::unbounded_channel().0).await;

        multiplexer
            .handle_frame(
                client_id,
                r#"{"route":"chat","payload":{"Text":{"text":"hi"}}}"#,
                &close_tx,
            )
            .await;

        assert!(bundle.events.lock().unwrap().is_empty());
    }

    struct FailingBundle;

    impl Bundle for FailingBundle {
        fn handle_request(
            &self,
            _api_path: &str,
            _request: crate::neutral::NeutralRequest,
        ) -> BoxFuture<'_, Result<Option<crate::neutral::NeutralResponse>, BundleError>> {
            Box::pin(async { Ok(None) })
        }

        fn handle_stream_event(
            &self,
            _event: StreamEvent,
            _handle: &dyn StreamHandle,
        ) -> BoxFuture<'_, Result<(), BundleError>> {
            Box::pin(async {
                Err(BundleError {
                    causes: vec!["IllegalStateException: boom".to_string()],
                    frames: vec![vec!["UserHandler.handle".to_string()]],
                })
            })
        }
    }

    async fn server_error_callstack_for(environment: ServerEnvironment) -> Option<String> {
        let registry = Arc::new(StreamRegistry::new());
        let multiplexer = StreamMultiplexer::new(
            registry.clone(),
            Arc::new(FailingBundle),
            StreamingConfig {
                ping_period: std::time::Duration::from_secs(0),
                timeout: std::time::Duration::from_secs(5),
            },
            environment,
        );
        let (close_tx, _close_rx) = mpsc::unbounded_channel();
        let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel();
        let client_id = registry.register(outbox_tx).await;

        multiplexer
            .handle_frame(client_id, r#"{"route":"chat","payload":"Connect"}"#, &close_tx)
            .await;

        let message = outbox_rx.recv().await.expect("server error message");
        match message.payload {
            ServerPayload::ServerError { callstack } => callstack,
            other => panic!("expected a ServerError payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_carries_a_truncated_callstack_in_dev() {
        let callstack = server_error_callstack_for(ServerEnvironment::Dev).await;
        let callstack = callstack.expect("dev callstack must be populated");
        assert!(callstack.contains("IllegalStateException: boom"));
        assert!(callstack.contains("UserHandler.handle"));
    }

    #[tokio::test]
    async fn server_error_omits_the_callstack_in_prod() {
        let callstack = server_error_callstack_for(ServerEnvironment::Prod).await;
        assert!(callstack.is_none());
    }
}
