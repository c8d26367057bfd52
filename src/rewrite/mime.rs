//! Content-Type to file extension resolution.
//!
//! Body rewriting is gated on the extensions a media type maps to, not on the
//! media type itself, so that every alias of a textual type is covered.

/// Extensions whose bodies are scanned and rewritten.
pub const REWRITE_EXTENSIONS: &[&str] = &[
    "html", "htm", "xhtml", "xml", "yml", "yaml", "css", "js", "txt", "text", "json",
];

/// Extensions that get HTML-only treatment (integrity and CSP stripping).
pub const HTML_EXTENSIONS: &[&str] = &["html", "htm", "xhtml"];

/// Media types missing from the `mime_guess` table in some releases.
const EXTRA_TYPES: &[(&str, &[&str])] = &[
    ("text/javascript", &["js", "mjs"]),
    ("application/javascript", &["js"]),
    ("application/x-javascript", &["js"]),
    ("application/ecmascript", &["js"]),
    ("application/yaml", &["yaml", "yml"]),
    ("application/x-yaml", &["yaml", "yml"]),
    ("text/yaml", &["yaml", "yml"]),
    ("text/x-yaml", &["yaml", "yml"]),
    ("text/xml", &["xml"]),
    ("application/xml", &["xml"]),
    ("application/xhtml+xml", &["xhtml"]),
    ("application/json", &["json"]),
];

/// Extensions derived from a response `Content-Type` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionSet(Vec<&'static str>);

impl ExtensionSet {
    /// Derive the extension set for a `Content-Type` value. Parameters such as
    /// `charset` are ignored; an unknown or empty type yields an empty set.
    pub fn from_content_type(content_type: &str) -> Self {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if essence.is_empty() {
            return Self::default();
        }

        let mut extensions: Vec<&'static str> = mime_guess::get_mime_extensions_str(&essence)
            .map(|exts| exts.to_vec())
            .unwrap_or_default();

        for (media_type, exts) in EXTRA_TYPES {
            if *media_type == essence {
                for &ext in exts.iter() {
                    if !extensions.contains(&ext) {
                        extensions.push(ext);
                    }
                }
            }
        }

        Self(extensions)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// At least one extension is in the rewrite set.
    pub fn is_rewritable(&self) -> bool {
        self.0.iter().any(|ext| REWRITE_EXTENSIONS.contains(ext))
    }

    /// At least one extension is HTML-family.
    pub fn is_html(&self) -> bool {
        self.0.iter().any(|ext| HTML_EXTENSIONS.contains(ext))
    }
}
