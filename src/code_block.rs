//! Code block formatting
//!
//! The renderer hands every `<pre>` block to a [`CodeBlockFormatter`] chosen
//! from `codeBlockStyle` when the renderer is built. Language detection is a
//! separate step so both formatters see the same result.
//!
//! # Language detection
//!
//! The first match wins, and class tokens always beat the id:
//!
//! 1. a `language-<lang>` class token (on `<code>`, then on `<pre>`)
//! 2. a `lang-<lang>` class token (on `<code>`, then on `<pre>`)
//! 3. a `code-lang-<lang>` id (on `<code>`, then on `<pre>`)

/// Shortest fence ever emitted
pub const MIN_FENCE_LENGTH: usize = 3;

/// Turns a code body and its language into a Markdown block
pub trait CodeBlockFormatter: Send + Sync {
    /// Format `code`, which still carries its trailing newline if it had one
    fn format(&self, code: &str, language: Option<&str>) -> String;
}

/// Fenced blocks with an info string
#[derive(Debug, Clone)]
pub struct FencedCodeBlock {
    fence_char: char,
    min_length: usize,
}

impl FencedCodeBlock {
    /// Build from the configured fence, e.g. ```` ``` ```` or `~~~~`
    pub fn new(fence: &str) -> Self {
        let fence_char = match fence.chars().next() {
            Some('~') => '~',
            _ => '`',
        };
        Self {
            fence_char,
            min_length: fence.chars().count().max(MIN_FENCE_LENGTH),
        }
    }
}

impl Default for FencedCodeBlock {
    fn default() -> Self {
        Self::new("```")
    }
}

impl CodeBlockFormatter for FencedCodeBlock {
    fn format(&self, code: &str, language: Option<&str>) -> String {
        let body = strip_one_trailing_newline(code);
        let length = fence_length(body, self.fence_char, self.min_length);
        let fence: String = std::iter::repeat_n(self.fence_char, length).collect();
        format!("{fence}{}\n{body}\n{fence}", language.unwrap_or_default())
    }
}

/// Four-space indented blocks; the language is dropped
#[derive(Debug, Clone, Copy, Default)]
pub struct IndentedCodeBlock;

impl CodeBlockFormatter for IndentedCodeBlock {
    fn format(&self, code: &str, _language: Option<&str>) -> String {
        strip_one_trailing_newline(code)
            .split('\n')
            .map(|line| {
                if line.is_empty() {
                    String::new()
                } else {
                    format!("    {line}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn strip_one_trailing_newline(code: &str) -> &str {
    code.strip_suffix('\n').unwrap_or(code)
}

/// Fence length for a code body
///
/// Starts at `min_length`; any run of `fence_char` opening a line (after
/// optional indentation) that is at least as long pushes it to run + 1.
///
/// ```
/// use markclip::code_block::fence_length;
///
/// assert_eq!(fence_length("let x = 1;", '`', 3), 3);
/// assert_eq!(fence_length("```rust\ncode\n```", '`', 3), 4);
/// assert_eq!(fence_length("inline ```` run", '`', 3), 3);
/// ```
pub fn fence_length(code: &str, fence_char: char, min_length: usize) -> usize {
    let mut length = min_length;
    for line in code.split('\n') {
        let run = line
            .trim_start_matches([' ', '\t'])
            .chars()
            .take_while(|&c| c == fence_char)
            .count();
        if run >= length {
            length = run + 1;
        }
    }
    length
}

fn class_token<'a>(class: Option<&'a str>, prefix: &str) -> Option<&'a str> {
    class?
        .split_whitespace()
        .find_map(|token| token.strip_prefix(prefix))
        .filter(|lang| !lang.is_empty())
}

/// Detect the language of a code block from its attributes
///
/// `code_*` are the attributes of the `<code>` child, `pre_*` those of the
/// `<pre>` element.
///
/// ```
/// use markclip::code_block::detect_language;
///
/// assert_eq!(
///     detect_language(Some("language-javascript lang-python"), None, None, None).as_deref(),
///     Some("javascript")
/// );
/// assert_eq!(
///     detect_language(Some("language-javascript"), Some("code-lang-python"), None, None).as_deref(),
///     Some("javascript")
/// );
/// assert_eq!(
///     detect_language(None, Some("code-lang-python"), None, None).as_deref(),
///     Some("python")
/// );
/// ```
pub fn detect_language(
    code_class: Option<&str>,
    code_id: Option<&str>,
    pre_class: Option<&str>,
    pre_id: Option<&str>,
) -> Option<String> {
    let by_class = ["language-", "lang-"].iter().find_map(|prefix| {
        class_token(code_class, prefix).or_else(|| class_token(pre_class, prefix))
    });
    let by_id = || {
        [code_id, pre_id].into_iter().find_map(|id| {
            id.and_then(|id| id.trim().strip_prefix("code-lang-"))
                .filter(|lang| !lang.is_empty())
        })
    };
    by_class.or_else(by_id).map(str::to_string)
}
