//! Markdown escaping for page text
//!
//! Text taken from a page must not accidentally turn into Markdown syntax.
//! [`escape_markdown`] backslash-escapes the characters that would: emphasis
//! markers and brackets anywhere, and block markers (`#`, `>`, `-`, `+`,
//! `1.`) only where they would start a block.

/// Escape Markdown syntax characters in a run of text
///
/// The start of `text` and every position after a newline count as a line
/// start.
///
/// # Examples
///
/// ```
/// use markclip::escape::escape_markdown;
///
/// assert_eq!(escape_markdown("*bold* [x]"), "\\*bold\\* \\[x\\]");
/// assert_eq!(escape_markdown("# not a heading"), "\\# not a heading");
/// assert_eq!(escape_markdown("1. not a list"), "1\\. not a list");
/// assert_eq!(escape_markdown("C# and 1.5"), "C# and 1.5");
/// ```
pub fn escape_markdown(text: &str) -> String {
    escape_markdown_from(text, true)
}

/// [`escape_markdown`] for text that may continue an existing line
///
/// With `at_line_start` false, block markers at the very start of `text` are
/// left alone.
pub fn escape_markdown_from(text: &str, at_line_start: bool) -> String {
    let mut result = String::with_capacity(text.len() + text.len() / 10);
    let mut at_line_start = at_line_start;
    let mut rest = text;

    while let Some(c) = rest.chars().next() {
        let after = &rest[c.len_utf8()..];
        if at_line_start && let Some(escaped) = escape_line_start(rest) {
            result.push_str(&escaped);
            rest = &rest[escaped.len() - 1..];
            at_line_start = false;
            continue;
        }
        match c {
            '\\' | '*' | '_' | '`' | '[' | ']' => {
                result.push('\\');
                result.push(c);
            }
            _ => result.push(c),
        }
        at_line_start = c == '\n' || (at_line_start && c == ' ');
        rest = after;
    }

    result
}

/// Escaped form of a block marker at the start of `line`, if there is one
///
/// The returned string is the marker with one backslash inserted.
fn escape_line_start(line: &str) -> Option<String> {
    let first = line.chars().next()?;
    match first {
        '#' | '>' => Some(format!("\\{}", first)),
        '-' | '+' if line[1..].starts_with(' ') => Some(format!("\\{}", first)),
        '-' if is_dash_line(line) => Some("\\-".to_string()),
        '=' => Some("\\=".to_string()),
        '~' if line.starts_with("~~~") => Some("\\~".to_string()),
        '0'..='9' => {
            let digits = line.chars().take_while(char::is_ascii_digit).count();
            let tail = &line[digits..];
            if tail.starts_with(". ") || tail == "." {
                Some(format!("{}\\.", &line[..digits]))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// A line of only dashes reads as a thematic break or setext underline
fn is_dash_line(text: &str) -> bool {
    let line = text.split('\n').next().unwrap_or_default();
    line.trim_end().chars().all(|c| c == '-' || c == ' ')
}

/// Backtick count needed to delimit `content` as inline code
///
/// One more than the longest backtick run inside the content.
///
/// ```
/// use markclip::escape::inline_code_ticks;
///
/// assert_eq!(inline_code_ticks("code"), 1);
/// assert_eq!(inline_code_ticks("a `b` c"), 2);
/// assert_eq!(inline_code_ticks("``x``"), 3);
/// ```
pub fn inline_code_ticks(content: &str) -> usize {
    let mut max_run = 0;
    let mut current_run = 0;

    for c in content.chars() {
        if c == '`' {
            current_run += 1;
            max_run = max_run.max(current_run);
        } else {
            current_run = 0;
        }
    }

    max_run + 1
}

/// Wrap `content` as inline code
///
/// Content that starts or ends with a backtick is padded with one space so
/// the delimiters stay separate.
pub fn inline_code(content: &str) -> String {
    let ticks = "`".repeat(inline_code_ticks(content));
    let pad = if content.starts_with('`') || content.ends_with('`') {
        " "
    } else {
        ""
    };
    format!("{ticks}{pad}{content}{pad}{ticks}")
}

/// Escape square brackets in link text and image alt text
pub fn escape_link_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape a double-quoted link title
pub fn escape_title(title: &str) -> String {
    title.replace('"', "\\\"")
}
