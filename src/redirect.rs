//! Cumulative regex redirect rewriting (`spec.md` §4.2).

use regex::Regex;

use crate::config::RedirectRule;
use crate::error::{RuntimeError, RuntimeErrorKind};

struct CompiledRule {
    pattern: Regex,
    template: String,
}

/// Applies an ordered list of regex -> template rewrites to a path.
///
/// The fold is cumulative: each rule is fed the *current* path, not the
/// original one, so a second rule may further transform the output of the
/// first (this is deliberate — see the Open Question resolution in
/// `DESIGN.md`).
pub struct RedirectEngine {
    rules: Vec<CompiledRule>,
}

impl RedirectEngine {
    /// Compiles the configured rules. A rule's `from_pattern` that does not
    /// begin with `/` will simply never match a real path; this is
    /// configuration-level guidance, not enforced here, since the regex
    /// itself is opaque.
    pub fn new(rules: &[RedirectRule]) -> Result<Self, RuntimeError> {
        let compiled = rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.from_pattern)
                    .map(|pattern| CompiledRule {
                        pattern,
                        template: rule.to_template.clone(),
                    })
                    .map_err(|e| {
                        RuntimeError::new(
                            RuntimeErrorKind::Configuration,
                            format!("invalid redirect pattern '{}': {}", rule.from_pattern, e),
                        )
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules: compiled })
    }

    /// Folds every rule left to right over `path`, returning the final path
    /// if it differs from the input, or `None` if the path is unchanged
    /// (meaning no redirect should be issued).
    pub fn resolve(&self, path: &str) -> Option<String> {
        let mut current = path.to_string();
        for rule in &self.rules {
            if let Some(captures) = rule.pattern.captures(&current) {
                current = expand_template(&rule.template, &captures);
            }
        }
        if current != path {
            Some(current)
        } else {
            None
        }
    }
}

fn expand_template(template: &str, captures: &regex::Captures) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' {
            if let Some(&next) = chars.peek() {
                if next.is_ascii_digit() {
                    chars.next();
                    let idx = next.to_digit(10).unwrap() as usize;
                    if let Some(m) = captures.get(idx) {
                        out.push_str(m.as_str());
                    }
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(from: &str, to: &str) -> RedirectRule {
        RedirectRule {
            from_pattern: from.to_string(),
            to_template: to.to_string(),
        }
    }

    #[test]
    fn empty_rule_list_is_identity() {
        let engine = RedirectEngine::new(&[]).unwrap();
        assert_eq!(engine.resolve("/anything"), None);
    }

    #[test]
    fn single_rule_substitutes_captures() {
        let engine = RedirectEngine::new(&[rule("^/old/([^/]*)$", "/new/$1")]).unwrap();
        assert_eq!(engine.resolve("/old/alpha"), Some("/new/alpha".to_string()));
        assert_eq!(engine.resolve("/unrelated"), None);
    }

    #[test]
    fn fold_is_cumulative_not_first_match() {
        // Scenario 2 from spec.md §8.
        let engine = RedirectEngine::new(&[
            rule("^/old/([^/]*)$", "/new/$1"),
            rule("^/new/(.*)$", "/v2/$1"),
        ])
        .unwrap();
        assert_eq!(engine.resolve("/old/alpha"), Some("/v2/alpha".to_string()));
    }

    #[test]
    fn pure_function_of_path_and_rules() {
        let engine = RedirectEngine::new(&[rule("^/a$", "/b")]).unwrap();
        assert_eq!(engine.resolve("/a"), engine.resolve("/a"));
    }
}
