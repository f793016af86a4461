//! The API bundle boundary: a capability interface for the externally
//! supplied code module, modeled per `spec.md` §9 as `handle(request) ->
//! response` and `handle(streamEvent)` rather than hard-coded class names.

use std::future::Future;
use std::pin::Pin;

use crate::neutral::{NeutralRequest, NeutralResponse};

/// An error raised by the bundle while handling an API call or stream
/// event, carrying a formatted cause chain the dispatcher can truncate.
#[derive(Debug)]
pub struct BundleError {
    /// `Type: message` for each cause, outermost first, already formatted
    /// the way a truncated trace would render it.
    pub causes: Vec<String>,
    /// Frames for each cause, outermost first; each inner `Vec<String>` is
    /// one cause's frame list, innermost last.
    pub frames: Vec<Vec<String>>,
}

impl BundleError {
    /// Builds a single-cause error with no frames (the common case for a
    /// hand-constructed bundle error).
    pub fn simple(message: impl Into<String>) -> Self {
        Self {
            causes: vec![message.into()],
            frames: vec![Vec::new()],
        }
    }
}

impl std::fmt::Display for BundleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.causes.first().map(String::as_str).unwrap_or("bundle error"))
    }
}

impl std::error::Error for BundleError {}

/// A connect/disconnect/text event delivered to the bundle's stream
/// handler.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A session subscribed to `route`.
    ClientConnected { route: String, client_id: u64 },
    /// A session unsubscribed from (or disconnected while subscribed to)
    /// `route`.
    ClientDisconnected { route: String, client_id: u64 },
    /// A text frame arrived on `route` from `client_id`.
    Text {
        route: String,
        client_id: u64,
        text: String,
    },
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-(session, route) handle exposed to the bundle while it handles a
/// stream event, implementing the send/broadcast/disconnect facility of
/// `spec.md` §4.4.3. Implemented by `crate::streams::multiplexer` over the
/// `StreamRegistry`; kept as a trait here (rather than a concrete type) so
/// this module does not need to depend on the streams module.
pub trait StreamHandle: Send + Sync {
    /// Encodes `{route, Text(text)}` and transmits on this session only.
    fn send(&self, text: String) -> BoxFuture<'_, ()>;

    /// For every session subscribed to this route for which `filter`
    /// returns true, sends the encoded text message.
    fn broadcast(&self, text: String, filter: Box<dyn Fn(u64) -> bool + Send>) -> BoxFuture<'_, ()>;

    /// Removes this route from the session's set, and if the set becomes
    /// empty, closes the websocket.
    fn disconnect(&self) -> BoxFuture<'_, ()>;
}

/// The opaque handler interface supplied by the API bundle loader.
///
/// A language-neutral reimplementation models the bundle as this
/// capability interface rather than reaching for dynamic class loading or
/// string-prefix matching against a hard-coded framework sentinel; the
/// "which frames belong to the framework" predicate is instead supplied by
/// [`Bundle::is_framework_frame`], configurable per bundle loader.
pub trait Bundle: Send + Sync {
    /// Handles one API call at `api_path` (the captured tail, with a
    /// leading `/`). Returns `Ok(None)` for "no handler" (caller responds
    /// 404), `Ok(Some(response))` on success, `Err` on failure.
    fn handle_request(
        &self,
        api_path: &str,
        request: NeutralRequest,
    ) -> BoxFuture<'_, Result<Option<NeutralResponse>, BundleError>>;

    /// Handles one stream event, with a handle for issuing `send` /
    /// `broadcast` / `disconnect` calls on the originating (session,
    /// route) pair.
    fn handle_stream_event(
        &self,
        event: StreamEvent,
        handle: &dyn StreamHandle,
    ) -> BoxFuture<'_, Result<(), BundleError>>;

    /// How many stream routes this bundle declares. The RoutingAssembler
    /// uses this to decide whether to install the websocket endpoint at all
    /// in prod/fullstack (`spec.md` §4.7).
    fn num_api_streams(&self) -> usize {
        0
    }

    /// Whether a frame's class/module name belongs to the dispatch
    /// framework itself, used to truncate stack traces shown in dev
    /// responses (`spec.md` §4.3, §4.4.4). The default never matches,
    /// meaning traces are shown in full; a bundle loader that wants
    /// truncation supplies its own predicate.
    fn is_framework_frame(&self, _frame: &str) -> bool {
        false
    }
}
