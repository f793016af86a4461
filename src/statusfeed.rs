//! StatusFeed: the dev-only build status SSE endpoint (`spec.md` §4.6).
//!
//! Polls [`ServerGlobals`] every 300ms, writing a `: keepalive` comment every
//! tick and an `event: version` / `event: status` frame whenever the
//! respective value has changed since the last write. A write failure (the
//! peer having gone away) ends the stream quietly rather than propagating an
//! error.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use hyper::body::Frame;
use tokio::time::interval;

use crate::app::body::{streamed_body, ResponseBody};
use crate::config::ServerGlobals;

const POLL_PERIOD: Duration = Duration::from_millis(300);

struct FeedState {
    globals: Arc<ServerGlobals>,
    ticker: tokio::time::Interval,
    last_version: Option<i64>,
    last_status: Option<(Option<String>, bool)>,
}

/// Builds the streamed SSE body served at the dev status feed endpoint.
pub fn response_body(globals: Arc<ServerGlobals>) -> ResponseBody {
    streamed_body(event_stream(globals))
}

fn event_stream(globals: Arc<ServerGlobals>) -> impl Stream<Item = Result<Frame<Bytes>, Infallible>> {
    let state = FeedState {
        globals,
        ticker: interval(POLL_PERIOD),
        last_version: None,
        last_status: None,
    };
    futures::stream::unfold(state, |mut state| async move {
        state.ticker.tick().await;

        let mut payload = String::from(": keepalive\n\n");

        let version = state.globals.version();
        if state.last_version != Some(version) {
            payload.push_str(&format!("event: version\ndata: {version}\n\n"));
            state.last_version = Some(version);
        }

        let status = state.globals.status();
        let is_error = state.globals.is_status_error();
        let status_key = (status.clone(), is_error);
        if state.last_status.as_ref() != Some(&status_key) {
            let encoded = serde_json::json!({
                "text": status,
                "isError": is_error,
            });
            payload.push_str(&format!("event: status\ndata: {encoded}\n\n"));
            state.last_status = Some(status_key);
        }

        Some((Ok(Frame::data(Bytes::from(payload))), state))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn emits_version_and_status_only_once_until_changed() {
        let globals = Arc::new(ServerGlobals::new());
        globals.set_version(1);
        globals.set_status(Some("building".to_string()), false);

        let mut stream = Box::pin(event_stream(globals.clone()));

        let first = stream.next().await.unwrap().unwrap();
        let first_text = String::from_utf8(first.into_data().unwrap().to_vec()).unwrap();
        assert!(first_text.contains("event: version\ndata: 1"));
        assert!(first_text.contains("event: status"));

        let second = stream.next().await.unwrap().unwrap();
        let second_text = String::from_utf8(second.into_data().unwrap().to_vec()).unwrap();
        assert_eq!(second_text, ": keepalive\n\n");

        globals.set_version(2);
        let third = stream.next().await.unwrap().unwrap();
        let third_text = String::from_utf8(third.into_data().unwrap().to_vec()).unwrap();
        assert!(third_text.contains("event: version\ndata: 2"));
        assert!(!third_text.contains("event: status"));
    }
}
