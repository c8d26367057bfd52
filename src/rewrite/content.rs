//! Body content rewriting.
//!
//! Runs configured literal replacements, then host rewriting, then strips
//! HTML markers that would stop a rewritten page from loading.

use std::borrow::Cow;

use regex::bytes::Regex;

use crate::config::ReplacementRule;
use crate::rewrite::host::{replace_literal, HostRewriter};

/// Subresource integrity attribute, with its leading whitespace.
const INTEGRITY_ATTRIBUTE: &str = r#"\sintegrity="[^"]+""#;

/// Meta tag attribute key that turns a tag into a CSP declaration.
const CSP_META_KEY: &[u8] = br#"http-equiv="Content-Security-Policy""#;

/// Rewrites decoded response bodies. Built once and shared.
#[derive(Debug, Clone)]
pub struct ContentRewriter {
    replacements: Vec<ReplacementRule>,
    integrity: Regex,
}

impl ContentRewriter {
    pub fn new(replacements: Vec<ReplacementRule>) -> Self {
        Self {
            replacements,
            integrity: Regex::new(INTEGRITY_ATTRIBUTE).expect("integrity pattern compiles"),
        }
    }

    /// Rewrite a decoded body. `html` enables integrity and CSP stripping.
    pub fn rewrite(&self, body: &[u8], hosts: &HostRewriter<'_>, html: bool) -> Vec<u8> {
        let mut content: Cow<'_, [u8]> = Cow::Borrowed(body);

        // Each pair runs over the whole body before the next one.
        for rule in &self.replacements {
            content = replace_literal(content, rule.needle.as_bytes(), rule.value.as_bytes());
        }

        let mut content = hosts.rewrite(&content).into_owned();

        if html {
            content = self.integrity.replace_all(&content, &b""[..]).into_owned();
            content = replace_literal(Cow::Owned(content), CSP_META_KEY, b"").into_owned();
        }

        content
    }
}
