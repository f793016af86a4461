//! Translates HTTP requests into [`NeutralRequest`]s, invokes the bundle,
//! and translates the result back (`spec.md` §4.3).

use std::sync::Arc;

use crate::bundle::{Bundle, BundleError};
use crate::config::ServerEnvironment;
use crate::neutral::{NeutralRequest, NeutralResponse};

/// Registers handlers for all seven HTTP methods under
/// `{prefix}/api/{params...}` and translates between the wire and the
/// bundle's neutral records.
pub struct ApiDispatcher {
    bundle: Arc<dyn Bundle>,
    environment: ServerEnvironment,
}

impl ApiDispatcher {
    /// Builds a dispatcher over the given bundle.
    pub fn new(bundle: Arc<dyn Bundle>, environment: ServerEnvironment) -> Self {
        Self { bundle, environment }
    }

    /// Dispatches one API call. `api_path` is the captured tail with a
    /// leading `/`. Returns the response to write to the wire, already
    /// HEAD-adjusted by the caller if needed.
    pub async fn dispatch(
        &self,
        api_path: &str,
        request: NeutralRequest,
    ) -> NeutralResponse {
        match self.bundle.handle_request(api_path, request).await {
            Ok(Some(response)) => response,
            Ok(None) => {
                tracing::warn!(path = api_path, "no bundle handler for api path");
                NeutralResponse::empty(404)
            }
            Err(err) => {
                tracing::error!(path = api_path, error = %err, "bundle raised an error handling request");
                self.error_response(&err)
            }
        }
    }

    fn error_response(&self, err: &BundleError) -> NeutralResponse {
        match self.environment {
            ServerEnvironment::Dev => {
                let trace = truncate_trace(err, |frame| self.bundle.is_framework_frame(frame));
                NeutralResponse::text(500, trace)
            }
            ServerEnvironment::Prod => NeutralResponse::empty(500),
        }
    }
}

/// Walks the cause chain emitting each cause's `Type: message` line
/// followed by its frames, taken while the stop predicate is false *and*
/// the frame is not a duplicate of the previous cause's innermost frame.
/// Every cause after the first is prefixed `caused by: ` (`spec.md` §7).
pub(crate) fn truncate_trace(err: &BundleError, is_framework_frame: impl Fn(&str) -> bool) -> String {
    let mut out = String::new();
    let mut previous_innermost: Option<&str> = None;

    for (i, (cause, frames)) in err.causes.iter().zip(err.frames.iter()).enumerate() {
        if i > 0 {
            out.push_str("caused by: ");
        }
        out.push_str(cause);
        out.push('\n');

        for (j, frame) in frames.iter().enumerate() {
            if is_framework_frame(frame) {
                break;
            }
            if j == 0 {
                if let Some(innermost) = previous_innermost {
                    if innermost == frame {
                        continue;
                    }
                }
            }
            out.push_str("    at ");
            out.push_str(frame);
            out.push('\n');
        }
        previous_innermost = frames.last().map(String::as_str);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_stops_before_framework_sentinel() {
        let err = BundleError {
            causes: vec!["IllegalStateException: boom".to_string()],
            frames: vec![vec![
                "UserHandler.handle".to_string(),
                "ApisFactoryImpl$create$2.invoke".to_string(),
                "Dispatcher.run".to_string(),
            ]],
        };
        let trace = truncate_trace(&err, |f| f.starts_with("ApisFactoryImpl"));
        assert!(trace.contains("IllegalStateException: boom"));
        assert!(trace.contains("UserHandler.handle"));
        assert!(!trace.contains("ApisFactoryImpl"));
        assert!(!trace.contains("Dispatcher.run"));
    }

    #[test]
    fn duplicate_leading_frame_across_causes_is_stripped() {
        let err = BundleError {
            causes: vec![
                "Outer: fail".to_string(),
                "Inner: root cause".to_string(),
            ],
            frames: vec![
                vec!["Outer.call".to_string(), "Shared.frame".to_string()],
                vec!["Shared.frame".to_string(), "Inner.deep".to_string()],
            ],
        };
        let trace = truncate_trace(&err, |_| false);
        assert_eq!(trace.matches("Shared.frame").count(), 1);
        assert!(trace.contains("caused by: Inner: root cause"));
    }
}
