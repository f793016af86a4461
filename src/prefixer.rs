//! Route-prefix normalization and joining (`spec.md` §4.1).

/// Normalizes the configured `basePath` and joins tails onto it.
///
/// Route patterns registered with the HTTP layer are always
/// `prefix + "/{params...}"` where `params...` is a tail-capture variable.
#[derive(Debug, Clone)]
pub struct RoutePrefixer {
    prefix: String,
}

impl RoutePrefixer {
    /// Builds a prefixer from a raw (possibly slash-wrapped) base path.
    pub fn new(base_path: &str) -> Self {
        let stripped = base_path.strip_prefix('/').unwrap_or(base_path);
        let stripped = stripped.strip_suffix('/').unwrap_or(stripped);
        Self {
            prefix: stripped.to_string(),
        }
    }

    /// The normalized prefix, with no leading or trailing slash.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Joins `tail` onto the prefix, returning `"/" + prefix + "/" + tail`
    /// with double slashes collapsed. When the prefix is empty, returns
    /// `"/" + tail`.
    pub fn join(&self, tail: &str) -> String {
        let tail = tail.strip_prefix('/').unwrap_or(tail);
        if self.prefix.is_empty() {
            format!("/{}", tail)
        } else {
            format!("/{}/{}", self.prefix, tail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_prefix_joins_with_single_leading_slash() {
        let p = RoutePrefixer::new("");
        assert_eq!(p.join("api/echo"), "/api/echo");
        assert_eq!(p.join("/api/echo"), "/api/echo");
    }

    #[test]
    fn nonempty_prefix_strips_wrapping_slashes() {
        let p = RoutePrefixer::new("/docs/");
        assert_eq!(p.prefix(), "docs");
        assert_eq!(p.join("api/echo"), "/docs/api/echo");
    }

    #[test]
    fn no_double_slashes_when_tail_has_leading_slash() {
        let p = RoutePrefixer::new("docs");
        assert_eq!(p.join("/guide"), "/docs/guide");
    }
}
