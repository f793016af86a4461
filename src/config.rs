//! Startup configuration and process-wide mutable globals.
//!
//! `SiteConfig` and its nested types are accepted here as already-parsed
//! values — parsing a config file (YAML or otherwise) into these structs is
//! explicitly out of scope for this crate. They derive `Serialize` /
//! `Deserialize` so a caller can plug in whichever format crate it likes at
//! the edge.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One `(fromPattern, toTemplate)` redirect rule.
///
/// `from_pattern` is a regex anchored at both ends; `to_template` may
/// reference capture groups with `$1`..`$9`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectRule {
    /// Anchored regex matched against the full request path.
    pub from_pattern: String,
    /// Replacement template, may reference `$1..$9`.
    pub to_template: String,
}

/// Websocket keepalive policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Interval between pings; a ping period of zero disables keepalive.
    #[serde(with = "duration_millis")]
    pub ping_period: Duration,
    /// Time allowed for a write or ping to complete before the session is
    /// closed.
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
}

impl StreamingConfig {
    /// Whether keepalive pings are enabled.
    pub fn keepalive_enabled(&self) -> bool {
        !self.ping_period.is_zero()
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Dev/prod variant of the paths the server reads at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePaths {
    /// Directory served as the content root (dev: the raw build output).
    pub content_root: PathBuf,
    /// Path to the compiled client-side script, served verbatim at its own
    /// name and `<script>.map`.
    pub compiled_script: PathBuf,
    /// Path to the external API bundle, if any.
    pub api_bundle: Option<PathBuf>,
    /// Root of the exported, production site layout.
    pub site_root: PathBuf,
}

/// Immutable, process-wide startup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Display name.
    pub title: String,
    /// Canonical URL prefix, stored normalized (no leading or trailing
    /// slash).
    pub base_path: String,
    /// Listening TCP port.
    pub port: u16,
    /// Ordered sequence of redirect rules, applied left-to-right.
    pub redirects: Vec<RedirectRule>,
    /// Websocket keepalive policy.
    pub streaming_config: StreamingConfig,
    /// Logical library name -> filesystem path, consumed only by the API
    /// bundle.
    pub native_library_mappings: std::collections::BTreeMap<String, PathBuf>,
    /// Dev and prod file path variants.
    pub dev_paths: FilePaths,
    /// Production file path variant.
    pub prod_paths: FilePaths,
}

impl SiteConfig {
    /// Normalizes `base_path`, stripping exactly one leading and one
    /// trailing `/` if present. Internal storage never carries slashes;
    /// they are reattached only at the wire boundary.
    pub fn normalize_base_path(raw: &str) -> String {
        let stripped = raw.strip_prefix('/').unwrap_or(raw);
        stripped.strip_suffix('/').unwrap_or(stripped).to_string()
    }

    /// File paths for the given environment.
    pub fn paths_for(&self, env: ServerEnvironment) -> &FilePaths {
        match env {
            ServerEnvironment::Dev => &self.dev_paths,
            ServerEnvironment::Prod => &self.prod_paths,
        }
    }
}

/// Which of the two runtime environments the server is operating in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerEnvironment {
    /// Live reload, single content root, diagnostic status feed enabled.
    Dev,
    /// Exported site layout, signed assets, no status feed.
    Prod,
}

/// Which of the two site layouts the server is serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiteLayout {
    /// Static files plus a dynamic API bundle.
    Fullstack,
    /// Static files only.
    Static,
}

/// Mutable, process-wide, dev-only globals mutated by an external build
/// watcher and read by [`crate::statusfeed::StatusFeed`].
///
/// Reads are lock-free by convention (see `spec.md` §9): each field is an
/// independent atomic, so a reader may observe a torn combination of
/// `version`/`status`/`is_status_error` across two different updates, but
/// convergence is guaranteed by the time the next poll tick runs.
pub struct ServerGlobals {
    version: AtomicI64,
    status_slot: std::sync::RwLock<Option<String>>,
    is_status_error: AtomicBool,
}

impl ServerGlobals {
    /// A fresh globals block: version 0, no status, not errored.
    pub fn new() -> Self {
        Self {
            version: AtomicI64::new(0),
            status_slot: std::sync::RwLock::new(None),
            is_status_error: AtomicBool::new(false),
        }
    }

    /// Current build version.
    pub fn version(&self) -> i64 {
        self.version.load(Ordering::Relaxed)
    }

    /// Sets the build version (called by the external build watcher).
    pub fn set_version(&self, version: i64) {
        self.version.store(version, Ordering::Relaxed);
    }

    /// Current status text, if any.
    pub fn status(&self) -> Option<String> {
        self.status_slot.read().unwrap().clone()
    }

    /// Whether the current status represents an error.
    pub fn is_status_error(&self) -> bool {
        self.is_status_error.load(Ordering::Relaxed)
    }

    /// Sets status text and error flag together (called by the build
    /// watcher).
    pub fn set_status(&self, status: Option<String>, is_error: bool) {
        *self.status_slot.write().unwrap() = status;
        self.is_status_error.store(is_error, Ordering::Relaxed);
    }
}

impl Default for ServerGlobals {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_both_slashes() {
        assert_eq!(SiteConfig::normalize_base_path("/docs/"), "docs");
        assert_eq!(SiteConfig::normalize_base_path("docs"), "docs");
        assert_eq!(SiteConfig::normalize_base_path("/"), "");
        assert_eq!(SiteConfig::normalize_base_path(""), "");
    }

    #[test]
    fn globals_default_to_zero_and_none() {
        let globals = ServerGlobals::new();
        assert_eq!(globals.version(), 0);
        assert_eq!(globals.status(), None);
        assert!(!globals.is_status_error());
    }

    #[test]
    fn keepalive_disabled_when_zero() {
        let cfg = StreamingConfig {
            ping_period: Duration::from_secs(0),
            timeout: Duration::from_secs(10),
        };
        assert!(!cfg.keepalive_enabled());
    }
}
