//! The one response body type used across the whole connection layer.
//!
//! Static responses, API responses, the SSE status feed, and the websocket
//! upgrade response all need to share a single `Response<B>` type so they
//! can flow through the same `routerify_ng::Router`. A boxed body is the
//! natural way to unify a fixed `Full<Bytes>` body with the status feed's
//! long-lived streamed body.

use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full, StreamBody};
use hyper::body::Frame;
use std::convert::Infallible;

/// The response body type used by every handler in this crate.
pub type ResponseBody = BoxBody<Bytes, Infallible>;

/// Boxes a fixed, already-in-memory body.
pub fn full_body(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into()).boxed()
}

/// An empty body.
pub fn empty_body() -> ResponseBody {
    full_body(Bytes::new())
}

/// Boxes a stream of data frames into a [`ResponseBody`], used by
/// [`crate::statusfeed::StatusFeed`].
pub fn streamed_body<S>(stream: S) -> ResponseBody
where
    S: futures::Stream<Item = Result<Frame<Bytes>, Infallible>> + Send + 'static,
{
    StreamBody::new(stream).boxed()
}
