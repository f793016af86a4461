#![warn(missing_docs)]
//! The error type routerify_ng's `err_handler` receives, carrying either a
//! response to write or an in-flight websocket upgrade that must reach the
//! connection layer untouched.

use hyper::Response;

use crate::app::body::{empty_body, full_body, ResponseBody};
use crate::error::RuntimeError;

/// Error type threaded through the router. `Generic` carries a fully formed
/// response (so even an error path returns a definite status and body);
/// `WebSocketUpgrade` carries the `101` upgrade response, kept distinct so
/// the connection handler can hand it to `hyper::upgrade::on` without
/// cloning (routerify_ng's normal err_handler path would otherwise be free
/// to clone/log the response).
#[derive(Debug)]
pub enum ApiError {
    /// A response to write back as-is.
    Generic(Response<ResponseBody>),
    /// A completed `101 Switching Protocols` response for a websocket
    /// upgrade in progress.
    WebSocketUpgrade(Response<ResponseBody>),
}

unsafe impl Sync for ApiError {}

impl ApiError {
    /// Builds a `Generic` error from a status code and plain text body.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        let body = message.into();
        let response = Response::builder()
            .status(status)
            .header(hyper::header::CONTENT_TYPE, "text/plain")
            .body(full_body(body))
            .unwrap_or_else(|_| Response::new(empty_body()));
        ApiError::Generic(response)
    }
}

impl From<RuntimeError> for ApiError {
    fn from(err: RuntimeError) -> Self {
        ApiError::status(500, err.to_string())
    }
}

impl From<std::convert::Infallible> for ApiError {
    fn from(_: std::convert::Infallible) -> Self {
        ApiError::status(500, "unhandled error")
    }
}

impl From<hyper::Error> for ApiError {
    fn from(err: hyper::Error) -> Self {
        let status = if err.is_user() {
            400
        } else if err.is_canceled() {
            504
        } else {
            500
        };
        tracing::error!(error = %err, "hyper error");
        ApiError::status(status, err.to_string())
    }
}

impl From<ApiError> for Box<dyn std::error::Error + Send> {
    fn from(error: ApiError) -> Self {
        Box::new(error)
    }
}

impl From<Box<dyn std::error::Error>> for ApiError {
    fn from(error: Box<dyn std::error::Error>) -> Self {
        tracing::error!(error = %error, "internal error");
        ApiError::status(500, error.to_string())
    }
}

impl std::error::Error for ApiError {}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ApiError::Generic(response) => write!(f, "api error: {}", response.status()),
            ApiError::WebSocketUpgrade(response) => {
                write!(f, "websocket upgrade in flight: {}", response.status())
            }
        }
    }
}
