//! Security filtering for untrusted page content
//!
//! Clipped pages are arbitrary third-party HTML and their metadata ends up in
//! filenames, front matter and Markdown links. This module holds the denylists
//! used by the renderer and the script-stripping filter the template engine
//! applies to every substituted value.
//!
//! # Defense Layers
//!
//! 1. **Element removal**: `script`, `style`, `iframe`, ... are dropped with
//!    their whole subtree
//! 2. **URL filtering**: `javascript:`-like link targets are rendered as plain
//!    text; images additionally accept `data:image/*`
//! 3. **Value filtering**: `<script>` blocks, `javascript:` prefixes and
//!    `on*="..."` handler attributes are removed from template values
//! 4. **Depth limit**: subtrees nested deeper than the limit are flattened
//!    to text instead of recursing further

use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

/// Maximum nesting depth rendered with full Markdown structure
const MAX_NESTING_DEPTH: usize = 512;

/// Elements removed together with their children
const DANGEROUS_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "iframe", "object", "embed", "applet", "link", "base",
    "template", "head", "meta", "title",
];

/// URL schemes never emitted as link targets
const DANGEROUS_URL_SCHEMES: &[&str] = &["javascript:", "vbscript:", "data:", "file:", "about:"];

/// Action to take for an element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanitizeAction {
    /// Render the element
    Allow,
    /// Drop the element and all its children
    Remove,
}

/// Denylist-based validator shared by the renderer
#[derive(Debug, Clone)]
pub struct SecurityValidator {
    max_depth: usize,
}

impl SecurityValidator {
    /// Create a validator with the default depth limit
    pub fn new() -> Self {
        Self {
            max_depth: MAX_NESTING_DEPTH,
        }
    }

    /// Create a validator with a custom depth limit
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Decide what to do with an element
    ///
    /// ```
    /// use markclip::security::{SecurityValidator, SanitizeAction};
    ///
    /// let validator = SecurityValidator::new();
    /// assert_eq!(validator.check_element("script"), SanitizeAction::Remove);
    /// assert_eq!(validator.check_element("div"), SanitizeAction::Allow);
    /// ```
    pub fn check_element(&self, tag_name: &str) -> SanitizeAction {
        if DANGEROUS_ELEMENTS.contains(&tag_name) {
            SanitizeAction::Remove
        } else {
            SanitizeAction::Allow
        }
    }

    /// Whether `depth` is past the structural rendering limit
    pub fn exceeds_depth(&self, depth: usize) -> bool {
        depth > self.max_depth
    }

    /// Check if a URL uses a dangerous scheme
    ///
    /// Leading whitespace and case are ignored, as browsers do.
    ///
    /// ```
    /// use markclip::security::SecurityValidator;
    ///
    /// let validator = SecurityValidator::new();
    /// assert!(validator.is_dangerous_url("  JavaScript:alert(1)"));
    /// assert!(!validator.is_dangerous_url("https://example.com"));
    /// ```
    pub fn is_dangerous_url(&self, url: &str) -> bool {
        let url_lower = url.trim_start().to_ascii_lowercase();
        DANGEROUS_URL_SCHEMES
            .iter()
            .any(|scheme| url_lower.starts_with(scheme))
    }

    /// Return the link target if it is safe to emit
    pub fn sanitize_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        if self.is_dangerous_url(url) {
            None
        } else {
            Some(url)
        }
    }

    /// Return the image source if it is safe to emit
    ///
    /// Inline `data:image/*` sources are allowed since they carry pixels, not
    /// markup.
    pub fn sanitize_image_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        let lower = url.trim_start().to_ascii_lowercase();
        if lower.starts_with("data:image/") && !lower.starts_with("data:image/svg") {
            return Some(url);
        }
        self.sanitize_url(url)
    }
}

impl Default for SecurityValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn script_block_regex() -> Option<&'static Regex> {
    static SCRIPT_BLOCK: OnceLock<Option<Regex>> = OnceLock::new();
    SCRIPT_BLOCK
        .get_or_init(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").ok())
        .as_ref()
}

fn javascript_scheme_regex() -> Option<&'static Regex> {
    static JAVASCRIPT_SCHEME: OnceLock<Option<Regex>> = OnceLock::new();
    JAVASCRIPT_SCHEME
        .get_or_init(|| Regex::new(r"(?i)javascript\s*:").ok())
        .as_ref()
}

fn event_handler_regex() -> Option<&'static Regex> {
    static EVENT_HANDLER: OnceLock<Option<Regex>> = OnceLock::new();
    EVENT_HANDLER
        .get_or_init(|| Regex::new(r#"(?i)\bon[a-z]+\s*=\s*("[^"]*"|'[^']*')"#).ok())
        .as_ref()
}

fn replace_all<'a>(value: Cow<'a, str>, regex: Option<&Regex>) -> Cow<'a, str> {
    let Some(regex) = regex else {
        return value;
    };
    if !regex.is_match(&value) {
        return value;
    }
    Cow::Owned(regex.replace_all(&value, "").into_owned())
}

/// Remove script-like content from a substituted template value
///
/// Strips `<script ...>...</script>` blocks, the `javascript:` scheme prefix
/// and `on*="..."` event-handler attributes. Applied to values only, never to
/// the literal template text around them.
///
/// ```
/// use markclip::security::strip_script_content;
///
/// assert_eq!(strip_script_content("Hi<script>x()</script>!"), "Hi!");
/// assert_eq!(strip_script_content("javascript:alert(1)"), "alert(1)");
/// assert_eq!(strip_script_content(r#"<b onclick="x()">t</b>"#), "<b >t</b>");
/// ```
pub fn strip_script_content(value: &str) -> Cow<'_, str> {
    let value = replace_all(Cow::Borrowed(value), script_block_regex());
    let value = replace_all(value, javascript_scheme_regex());
    replace_all(value, event_handler_regex())
}
