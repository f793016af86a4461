//! Access logging via `tracing`, installed as a pair of `routerify_ng`
//! pre/post hooks (the same shape the teacher uses for its built-in
//! logger middleware, trading `println!` for structured `tracing` events).

use std::time::Instant;

use routerify_ng::Middleware;

use crate::app::api_error::ApiError;
use crate::app::body::ResponseBody;

/// Stamps the request with its arrival time, for the post hook to read back.
#[derive(Clone, Copy)]
struct RequestStart(Instant);

/// Records the request's arrival time on its extensions.
pub fn pre() -> Middleware<ResponseBody, ApiError> {
    Middleware::pre(|mut req| async move {
        req.extensions_mut().insert(RequestStart(Instant::now()));
        Ok(req)
    })
}

/// Logs method, path, status and duration once the response is ready.
pub fn post() -> Middleware<ResponseBody, ApiError> {
    Middleware::post_with_info(|res, info| async move {
        let elapsed = info
            .extensions()
            .get::<RequestStart>()
            .map(|start| start.0.elapsed());
        tracing::info!(
            method = %info.method(),
            path = info.uri().path(),
            status = res.status().as_u16(),
            elapsed_ms = elapsed.map(|d| d.as_millis()),
            "request completed"
        );
        Ok(res)
    })
}
