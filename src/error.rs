use std::fmt::Display;

/// Category of error raised by the routing and streaming core.
///
/// Mirrors the taxonomy a deployed server needs to distinguish for logging
/// and response-status purposes: startup-fatal configuration problems,
/// recoverable per-request dispatch failures, and per-session stream
/// failures.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RuntimeErrorKind {
    /// Fatal at startup: missing site root, missing `system/` subfolder,
    /// invalid port.
    Configuration,
    /// Warning, continue without API: the bundle path was configured but
    /// the file is absent.
    BundleLoad,
    /// Recovered per-request: the bundle raised an error while handling an
    /// API call.
    RequestDispatch,
    /// Recovered per-frame: the bundle raised an error while handling a
    /// stream event.
    StreamDispatch,
    /// Recovered per-session: the websocket closed uncleanly or an I/O
    /// error interrupted the receive loop.
    ConnectionLifecycle,
    /// A requested resource has no handler (404 territory).
    ResourceMissing,
}

impl Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RuntimeErrorKind::Configuration => "configuration error",
            RuntimeErrorKind::BundleLoad => "bundle load warning",
            RuntimeErrorKind::RequestDispatch => "request dispatch error",
            RuntimeErrorKind::StreamDispatch => "stream dispatch error",
            RuntimeErrorKind::ConnectionLifecycle => "connection lifecycle error",
            RuntimeErrorKind::ResourceMissing => "resource missing",
        };
        write!(f, "{}", s)
    }
}

/// A structured error carrying both a [`RuntimeErrorKind`] and a
/// human-readable message, with an optional source error for `?`-based
/// propagation.
#[derive(Debug)]
pub struct RuntimeError {
    kind: RuntimeErrorKind,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RuntimeError {
    /// Builds a new error of the given kind with a message.
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attaches a lower-level cause to this error.
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The error's category.
    pub fn kind(&self) -> RuntimeErrorKind {
        self.kind
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for RuntimeError {
    fn from(err: std::io::Error) -> Self {
        RuntimeError::new(RuntimeErrorKind::Configuration, err.to_string()).with_source(err)
    }
}

impl From<serde_json::Error> for RuntimeError {
    fn from(err: serde_json::Error) -> Self {
        RuntimeError::new(RuntimeErrorKind::StreamDispatch, err.to_string()).with_source(err)
    }
}

impl From<tungstenite::Error> for RuntimeError {
    fn from(err: tungstenite::Error) -> Self {
        RuntimeError::new(RuntimeErrorKind::ConnectionLifecycle, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = RuntimeError::new(RuntimeErrorKind::ResourceMissing, "no handler for /x");
        assert_eq!(err.to_string(), "resource missing: no handler for /x");
    }

    #[test]
    fn source_is_preserved() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: RuntimeError = io_err.into();
        assert_eq!(err.kind(), RuntimeErrorKind::Configuration);
        assert!(std::error::Error::source(&err).is_some());
    }
}
