//! The connection layer: binds a TCP listener, assembles a router for the
//! configured environment/layout via [`crate::assembler::RoutingAssembler`],
//! and serves HTTP/1.1 and HTTP/2 connections over it.

#![warn(missing_docs)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use routerify_ng::RouterService;
use tokio::net::TcpListener;

use crate::assembler::RoutingAssembler;
use crate::bundle::Bundle;
use crate::config::{ServerEnvironment, ServerGlobals, SiteConfig, SiteLayout};
use crate::error::{RuntimeError, RuntimeErrorKind};

pub(crate) mod api_error;
/// The one response body type shared by every handler.
pub mod body;
/// Connection-serving logic: HTTP/1.1 and HTTP/2 builder variants.
pub mod handler;

use api_error::ApiError;

/// Advanced configuration options for HTTP/2 behavior.
///
/// All fields are optional; if a field is `None`, Hyper's internal default for
/// that setting is used. Most deployments can rely on the defaults and only
/// override `max_concurrent_streams` or timeouts for specific workloads.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Http2Config {
    /// If `true`, only HTTP/2 connections are accepted on this listener.
    /// If `false`, HTTP/1.1 and HTTP/2 are both supported (negotiated by Hyper).
    pub http2_only: bool,
    /// Maximum number of concurrent streams allowed per HTTP/2 connection.
    pub max_concurrent_streams: Option<u32>,
    /// Initial stream-level flow control window size.
    pub initial_stream_window_size: Option<u32>,
    /// Initial connection-level flow control window size.
    pub initial_connection_window_size: Option<u32>,
    /// Enable or disable Hyper's adaptive flow control window behavior.
    pub adaptive_window: Option<bool>,
    /// Maximum allowed HTTP/2 frame size in bytes.
    pub max_frame_size: Option<u32>,
    /// Maximum size of the header list (in octets) that is allowed.
    pub max_header_list_size: Option<u32>,
    /// Interval at which HTTP/2 PING frames are sent to keep the connection alive.
    pub keep_alive_interval: Option<Duration>,
    /// Timeout waiting for a PING ACK before considering the connection dead.
    pub keep_alive_timeout: Option<Duration>,
    /// Whether to send keep-alive PINGs even when the connection is idle.
    pub keep_alive_while_idle: Option<bool>,
}

/// The running server: a bound router plus connection-serving settings.
///
/// Built by [`Server::assemble`], which installs whichever of the four
/// routing assemblies matches `(environment, layout)`.
pub struct Server {
    host: String,
    http2: bool,
    http2_config: Option<Http2Config>,
    graceful_shutdown: bool,
    router_service: Arc<RouterService<ApiError>>,
}

impl Server {
    /// Assembles a server for `(environment, layout)` against `config`,
    /// with an optional API bundle.
    pub fn assemble(
        environment: ServerEnvironment,
        layout: SiteLayout,
        config: Arc<SiteConfig>,
        bundle: Option<Arc<dyn Bundle>>,
        globals: Arc<ServerGlobals>,
    ) -> Result<Self, RuntimeError> {
        let router = RoutingAssembler::build(environment, layout, config, bundle, globals)?;
        let router_service = RouterService::new(router)
            .map_err(|e| RuntimeError::new(RuntimeErrorKind::Configuration, e.to_string()))?;
        Ok(Self {
            host: String::from("0.0.0.0"),
            http2: true,
            http2_config: None,
            graceful_shutdown: false,
            router_service: Arc::new(router_service),
        })
    }

    /// Sets the host address to bind to. Defaults to `0.0.0.0`.
    pub fn host(&mut self, host: &str) -> &mut Self {
        self.host = host.to_string();
        self
    }

    /// Enables or disables HTTP/2 negotiation. Enabled by default.
    pub fn enable_http2(&mut self, enabled: bool) -> &mut Self {
        self.http2 = enabled;
        self
    }

    /// Applies advanced HTTP/2 configuration.
    pub fn http2_config(&mut self, config: Http2Config) -> &mut Self {
        self.http2_config = Some(config);
        self
    }

    /// Enables graceful shutdown on Ctrl-C: in-flight connections run to
    /// completion before the accept loop exits.
    pub fn with_graceful_shutdown(&mut self) -> &mut Self {
        self.graceful_shutdown = true;
        self
    }

    /// Binds `port` and serves connections until shutdown. `ready` is
    /// invoked once the listener is bound.
    pub async fn listen<F: FnOnce()>(&self, port: u16, ready: F) -> Result<(), RuntimeError> {
        let addr: SocketAddr = format!("{}:{}", self.host, port)
            .parse()
            .map_err(|e| RuntimeError::new(RuntimeErrorKind::Configuration, format!("invalid bind address: {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RuntimeError::new(RuntimeErrorKind::Configuration, format!("could not bind {addr}: {e}")))?;

        ready();

        let http2_enabled = self.http2;
        let http2_config = self.http2_config.clone();

        let mut shutdown = if self.graceful_shutdown {
            Some(Box::pin(tokio::signal::ctrl_c()))
        } else {
            None
        };

        loop {
            let accept_result = if let Some(ref mut sig) = shutdown {
                tokio::select! {
                    result = listener.accept() => Some(result),
                    _ = sig.as_mut() => None,
                }
            } else {
                Some(listener.accept().await)
            };

            match accept_result {
                Some(Ok((stream, _))) => {
                    let service = Arc::clone(&self.router_service);
                    let http2_config = http2_config.clone();
                    tokio::task::spawn(async move {
                        Self::handle_connection(stream, service, http2_enabled, http2_config).await;
                    });
                }
                Some(Err(err)) => {
                    tracing::error!(error = %err, "error accepting connection");
                }
                None => break,
            }
        }

        Ok(())
    }
}
