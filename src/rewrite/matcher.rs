//! Absolute URL matching over raw response bytes.
//!
//! # Responsibilities
//! - Find strict absolute URLs with an `http`, `https`, `ws` or `wss` scheme
//! - Never match bare relative paths
//!
//! # Design Decisions
//! - One compiled matcher per process, shared by reference across requests
//! - Byte-oriented so bodies that are not valid UTF-8 still get scanned
//! - Trailing sentence punctuation is not part of a match

use std::borrow::Cow;

use regex::bytes::{Captures, Regex};

/// Scheme, then any run of URL characters that does not end on punctuation.
/// One level of balanced parentheses is part of the URL.
const ABSOLUTE_URL: &str = concat!(
    r"(?i:https?|wss?)://",
    r#"(?:[^\s"'<>`\\{}|^()\[\]]|\([^\s"'<>`\\{}|^()\[\]]*\))*"#,
    r#"(?:[^\s"'<>`\\{}|^()\[\].,;:!?]|\([^\s"'<>`\\{}|^()\[\]]*\))"#,
);

/// Compiled absolute URL matcher.
#[derive(Debug, Clone)]
pub struct UrlMatcher {
    pattern: Regex,
}

impl UrlMatcher {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(ABSOLUTE_URL).expect("absolute URL pattern compiles"),
        }
    }

    /// All matched URLs in `haystack`, in order.
    #[cfg(test)]
    pub fn find_all<'h>(&self, haystack: &'h [u8]) -> Vec<&'h [u8]> {
        self.pattern.find_iter(haystack).map(|m| m.as_bytes()).collect()
    }

    /// Replace every matched URL with the output of `rewrite`.
    pub fn replace_all<'h, F>(&self, haystack: &'h [u8], mut rewrite: F) -> Cow<'h, [u8]>
    where
        F: FnMut(&[u8]) -> Vec<u8>,
    {
        self.pattern
            .replace_all(haystack, |caps: &Captures<'_>| rewrite(&caps[0]))
    }
}

impl Default for UrlMatcher {
    fn default() -> Self {
        Self::new()
    }
}
