//! Glob pattern matching for routing rules
//!
//! Rule patterns support a single metacharacter: `*`, matching any run of
//! characters including the empty run. Everything else is literal. Patterns
//! are compiled once when the route table is built, not per request.

use regex::Regex;

/// A compiled `*`-wildcard pattern, anchored at both ends.
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
}

impl Pattern {
    /// Compile a glob pattern. Only `*` is special; all other characters
    /// (including regex metacharacters) match literally.
    ///
    /// The compiled regex is anchored and uses `.*` as the only quantifier,
    /// so matching cannot backtrack pathologically.
    pub fn compile(pattern: &str) -> Self {
        let mut source = String::with_capacity(pattern.len() + 8);
        source.push('^');
        for (index, part) in pattern.split('*').enumerate() {
            // Each boundary between split parts is one `*` in the pattern,
            // including the ones producing empty leading/trailing parts.
            if index > 0 {
                source.push_str(".*");
            }
            source.push_str(&regex::escape(part));
        }
        source.push('$');

        // The source is built from escaped literals and `.*` only, so
        // compilation cannot fail for any input pattern.
        let regex = Regex::new(&source).expect("escaped glob pattern is always a valid regex");
        Self { regex }
    }

    /// Whole-string, case-sensitive match. An empty pattern matches only
    /// the empty string.
    pub fn matches(&self, input: &str) -> bool {
        self.regex.is_match(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_pattern_matches_whole_string_only() {
        let p = Pattern::compile("claude-sonnet-4-5");
        assert!(p.matches("claude-sonnet-4-5"));
        assert!(!p.matches("claude-sonnet-4-5-20250929"));
        assert!(!p.matches("xclaude-sonnet-4-5"));
    }

    #[test]
    fn trailing_wildcard() {
        let p = Pattern::compile("claude-sonnet-*");
        assert!(p.matches("claude-sonnet-4-5"));
        assert!(p.matches("claude-sonnet-"));
        assert!(!p.matches("claude-opus-4"));
    }

    #[test]
    fn leading_and_inner_wildcards() {
        let p = Pattern::compile("*haiku*");
        assert!(p.matches("claude-haiku-4-5"));
        assert!(p.matches("haiku"));
        assert!(!p.matches("sonnet"));

        let p = Pattern::compile("glm-*-plus");
        assert!(p.matches("glm-4-plus"));
        assert!(!p.matches("glm-4-plus-x"));
    }

    #[test]
    fn star_matches_empty_run() {
        let p = Pattern::compile("a*b");
        assert!(p.matches("ab"));
        assert!(p.matches("axyzb"));
    }

    #[test]
    fn bare_star_matches_everything() {
        let p = Pattern::compile("*");
        assert!(p.matches(""));
        assert!(p.matches("anything-at-all"));
    }

    #[test]
    fn consecutive_stars_collapse_to_any() {
        let p = Pattern::compile("**");
        assert!(p.matches(""));
        assert!(p.matches("anything"));

        let p = Pattern::compile("a**b");
        assert!(p.matches("ab"));
        assert!(p.matches("a-middle-b"));
    }

    #[test]
    fn empty_pattern_matches_only_empty_string() {
        let p = Pattern::compile("");
        assert!(p.matches(""));
        assert!(!p.matches("x"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let p = Pattern::compile("model.v1+beta");
        assert!(p.matches("model.v1+beta"));
        assert!(!p.matches("modelxv1+beta"));
        assert!(!p.matches("model.v11beta"));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let p = Pattern::compile("Claude-*");
        assert!(p.matches("Claude-sonnet"));
        assert!(!p.matches("claude-sonnet"));
    }
}
