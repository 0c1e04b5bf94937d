//! Placeholder templates for titles, folders and front matter
//!
//! A template is literal text with `{field}` placeholders. Supported forms:
//!
//! - `{field}` and `{field:modifier}` for article fields such as `pageTitle`,
//!   `byline` or the URL-derived `domain`
//! - `{date}` and `{date:FORMAT}` with moment-style tokens (`YYYY-MM-DD`)
//! - `{keywords}` and `{keywords:SEPARATOR}`
//!
//! `\{` and `\}` produce literal braces. Placeholders naming an unknown field
//! are copied to the output unchanged.
//!
//! # Examples
//!
//! ```rust
//! use markclip::article::Article;
//! use markclip::template::text_replace;
//!
//! let article = Article {
//!     page_title: "Rust Ownership Explained".into(),
//!     keywords: Some(vec!["rust".into(), "memory".into()]),
//!     ..Default::default()
//! };
//!
//! assert_eq!(
//!     text_replace(Some("{pageTitle:kebab}"), &article, None),
//!     "rust-ownership-explained"
//! );
//! assert_eq!(
//!     text_replace(Some("tags: {keywords: #}"), &article, None),
//!     "tags: rust #memory"
//! );
//! ```

use chrono::{DateTime, Datelike, FixedOffset, Local, Timelike};

use crate::article::Article;
use crate::filename::{generate_valid_file_name, strip_chars};
use crate::options::DEFAULT_TITLE_TEMPLATE;
use crate::security::strip_script_content;

/// Format used by `{date}` and by formats without any recognised token
pub const DEFAULT_DATE_FORMAT: &str = "YYYY-MM-DDTHH:mm:ssZ";

/// Separator used by a bare `{keywords}`
pub const DEFAULT_KEYWORD_SEPARATOR: &str = ", ";

/// Last-resort result when nothing else contains a letter or digit
pub const FALLBACK_NAME: &str = "download";

/// One piece of a parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text copied as-is
    Literal(String),
    /// `{name}` or `{name:arg}`
    Placeholder {
        /// Field name
        name: String,
        /// Text after the first `:`, if any
        arg: Option<String>,
    },
}

/// Case and separator transforms applied with `{field:modifier}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Upper,
    Lower,
    Kebab,
    MixedKebab,
    Snake,
    MixedSnake,
    Camel,
    Pascal,
    ObsidianCal,
}

impl Modifier {
    /// Parse a modifier name, `None` when unknown
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "upper" => Modifier::Upper,
            "lower" => Modifier::Lower,
            "kebab" => Modifier::Kebab,
            "mixed-kebab" => Modifier::MixedKebab,
            "snake" => Modifier::Snake,
            "mixed_snake" => Modifier::MixedSnake,
            "camel" => Modifier::Camel,
            "pascal" => Modifier::Pascal,
            "obsidian-cal" => Modifier::ObsidianCal,
            _ => return None,
        })
    }

    /// Transform a substituted value
    ///
    /// ```
    /// use markclip::template::Modifier;
    ///
    /// assert_eq!(Modifier::Snake.apply("Hello World"), "hello_world");
    /// assert_eq!(Modifier::Camel.apply("hello big world"), "helloBigWorld");
    /// assert_eq!(Modifier::MixedKebab.apply("Hello  World"), "Hello-World");
    /// ```
    pub fn apply(self, value: &str) -> String {
        match self {
            Modifier::Upper => value.to_uppercase(),
            Modifier::Lower => value.to_lowercase(),
            Modifier::Kebab => join_lower(&split_words(value), "-"),
            Modifier::Snake => join_lower(&split_words(value), "_"),
            Modifier::MixedKebab => value.split_whitespace().collect::<Vec<_>>().join("-"),
            Modifier::MixedSnake => value.split_whitespace().collect::<Vec<_>>().join("_"),
            Modifier::ObsidianCal => value
                .split_whitespace()
                .collect::<Vec<_>>()
                .join("-")
                .split('-')
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join("-"),
            Modifier::Camel => {
                let words = split_words(value);
                let mut out = String::new();
                for (i, word) in words.iter().enumerate() {
                    if i == 0 {
                        out.push_str(&word.to_lowercase());
                    } else {
                        out.push_str(&capitalize(word));
                    }
                }
                out
            }
            Modifier::Pascal => split_words(value).iter().map(|w| capitalize(w)).collect(),
        }
    }
}

/// Split on whitespace, `-`, `_` and lower-to-upper case transitions
fn split_words(value: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in value.chars() {
        if c.is_whitespace() || c == '-' || c == '_' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn join_lower(words: &[String], separator: &str) -> String {
    words
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(separator)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
        None => String::new(),
    }
}

/// Split a template into literal text and placeholders
///
/// A `{` without a matching `}` is literal text.
///
/// ```
/// use markclip::template::{parse_template, Segment};
///
/// let segments = parse_template("a {date:HH:mm} \\{b\\}");
/// assert_eq!(segments[1], Segment::Placeholder {
///     name: "date".into(),
///     arg: Some("HH:mm".into()),
/// });
/// assert_eq!(segments[2], Segment::Literal(" {b}".into()));
/// ```
pub fn parse_template(template: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = template;

    while let Some(c) = rest.chars().next() {
        match c {
            '\\' if rest[1..].starts_with(['{', '}']) => {
                literal.push_str(&rest[1..2]);
                rest = &rest[2..];
            }
            '{' => {
                let body = &rest[1..];
                let close = body.find('}');
                let open = body.find('{');
                match close {
                    Some(end) if open.is_none_or(|o| o > end) && end > 0 => {
                        if !literal.is_empty() {
                            segments.push(Segment::Literal(std::mem::take(&mut literal)));
                        }
                        let inner = &body[..end];
                        let (name, arg) = match inner.split_once(':') {
                            Some((name, arg)) => (name, Some(arg.to_string())),
                            None => (inner, None),
                        };
                        segments.push(Segment::Placeholder {
                            name: name.trim().to_string(),
                            arg,
                        });
                        rest = &body[end + 1..];
                    }
                    _ => {
                        literal.push('{');
                        rest = body;
                    }
                }
            }
            _ => {
                literal.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

/// Render a template against an article
///
/// Blank or absent templates render as `{pageTitle}`. Every substituted value
/// has script-like content removed and, when `disallowed_chars` is given, is
/// run through the filename sanitizer. Characters of `disallowed_chars` are
/// removed from the whole result. A result without any letter or digit falls
/// back to the page title, then the title, then `"download"`.
pub fn text_replace(
    template: Option<&str>,
    article: &Article,
    disallowed_chars: Option<&str>,
) -> String {
    let now = article
        .captured_at
        .unwrap_or_else(|| Local::now().fixed_offset());
    text_replace_at(template, article, disallowed_chars, &now)
}

/// [`text_replace`] with an explicit timestamp for `{date}`
pub fn text_replace_at(
    template: Option<&str>,
    article: &Article,
    disallowed_chars: Option<&str>,
    now: &DateTime<FixedOffset>,
) -> String {
    let template = match template {
        Some(t) if !t.trim().is_empty() => t,
        _ => DEFAULT_TITLE_TEMPLATE,
    };
    let disallowed_chars = disallowed_chars.filter(|d| !d.is_empty());

    let mut output = String::with_capacity(template.len());
    for segment in parse_template(template) {
        match segment {
            Segment::Literal(text) => output.push_str(&text),
            Segment::Placeholder { name, arg } => {
                match substitute(&name, arg.as_deref(), article, now) {
                    Some((value, modifier)) => {
                        output.push_str(&finish_value(&value, modifier, disallowed_chars));
                    }
                    None => {
                        output.push('{');
                        output.push_str(&name);
                        if let Some(arg) = arg {
                            output.push(':');
                            output.push_str(&arg);
                        }
                        output.push('}');
                    }
                }
            }
        }
    }

    let output = filter_disallowed(output, disallowed_chars);
    if has_alphanumeric(&output) {
        return output;
    }

    [&article.page_title, &article.title]
        .into_iter()
        .map(|candidate| {
            filter_disallowed(strip_script_content(candidate).into_owned(), disallowed_chars)
        })
        .find(|candidate| has_alphanumeric(candidate))
        .unwrap_or_else(|| FALLBACK_NAME.to_string())
}

/// Base value of a placeholder and its modifier, `None` for unknown fields
fn substitute(
    name: &str,
    arg: Option<&str>,
    article: &Article,
    now: &DateTime<FixedOffset>,
) -> Option<(String, Option<Modifier>)> {
    match name {
        "date" => Some((format_date(arg.unwrap_or(DEFAULT_DATE_FORMAT), now), None)),
        "keywords" => {
            let separator = arg
                .map(unescape_separator)
                .unwrap_or_else(|| DEFAULT_KEYWORD_SEPARATOR.to_string());
            let joined = article
                .keywords
                .as_ref()
                .map(|keywords| keywords.join(&separator))
                .unwrap_or_default();
            Some((joined, None))
        }
        _ => article
            .field(name)
            .map(|value| (value, arg.and_then(Modifier::parse))),
    }
}

fn finish_value(value: &str, modifier: Option<Modifier>, disallowed_chars: Option<&str>) -> String {
    let mut value = strip_script_content(value).into_owned();
    if disallowed_chars.is_some() {
        value = generate_valid_file_name(&value, disallowed_chars);
    }
    match modifier {
        Some(modifier) => modifier.apply(&value),
        None => value,
    }
}

fn filter_disallowed(value: String, disallowed_chars: Option<&str>) -> String {
    match disallowed_chars {
        Some(set) => strip_chars(&value, set),
        None => value,
    }
}

fn has_alphanumeric(value: &str) -> bool {
    value.chars().any(char::is_alphanumeric)
}

/// `\n` and `\t` in a keyword separator stand for newline and tab
fn unescape_separator(separator: &str) -> String {
    separator.replace("\\n", "\n").replace("\\t", "\t")
}

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Longest first so `YYYY` wins over `YY` and `MMMM` over `MM`
const DATE_TOKENS: &[&str] = &[
    "YYYY", "MMMM", "dddd", "SSS", "MMM", "ddd", "YY", "MM", "DD", "HH", "hh", "mm", "ss", "ZZ",
    "M", "D", "H", "h", "m", "s", "A", "a", "Z", "X", "x",
];

/// Format a timestamp with moment-style tokens
///
/// Text inside `[...]` is copied literally. A format without any token
/// renders as [`DEFAULT_DATE_FORMAT`].
///
/// ```
/// use chrono::DateTime;
/// use markclip::template::format_date;
///
/// let t = DateTime::parse_from_rfc3339("2024-03-05T14:07:09+01:00").unwrap();
/// assert_eq!(format_date("YYYY-MM-DD", &t), "2024-03-05");
/// assert_eq!(format_date("D MMM YY, h:mm A", &t), "5 Mar 24, 2:07 PM");
/// assert_eq!(format_date("[Week of] MMMM", &t), "Week of March");
/// assert_eq!(format_date("???", &t), "2024-03-05T14:07:09+01:00");
/// ```
pub fn format_date(format: &str, now: &DateTime<FixedOffset>) -> String {
    render_date(format, now).unwrap_or_else(|| {
        render_date(DEFAULT_DATE_FORMAT, now).unwrap_or_default()
    })
}

/// `None` when the format contains no token
fn render_date(format: &str, now: &DateTime<FixedOffset>) -> Option<String> {
    let mut out = String::with_capacity(format.len() + 8);
    let mut matched = false;
    let mut rest = format;

    while let Some(c) = rest.chars().next() {
        if c == '['
            && let Some(end) = rest.find(']')
        {
            out.push_str(&rest[1..end]);
            rest = &rest[end + 1..];
            continue;
        }
        if let Some(token) = DATE_TOKENS.iter().find(|t| rest.starts_with(**t)) {
            out.push_str(&date_token(token, now));
            rest = &rest[token.len()..];
            matched = true;
            continue;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }

    matched.then_some(out)
}

fn date_token(token: &str, now: &DateTime<FixedOffset>) -> String {
    let hour12 = match now.hour() % 12 {
        0 => 12,
        h => h,
    };
    let month = now.month0() as usize;
    let weekday = now.weekday().num_days_from_monday() as usize;
    match token {
        "YYYY" => format!("{:04}", now.year()),
        "YY" => format!("{:02}", now.year().rem_euclid(100)),
        "MMMM" => MONTH_NAMES[month].to_string(),
        "MMM" => MONTH_NAMES[month][..3].to_string(),
        "MM" => format!("{:02}", now.month()),
        "M" => now.month().to_string(),
        "DD" => format!("{:02}", now.day()),
        "D" => now.day().to_string(),
        "dddd" => WEEKDAY_NAMES[weekday].to_string(),
        "ddd" => WEEKDAY_NAMES[weekday][..3].to_string(),
        "HH" => format!("{:02}", now.hour()),
        "H" => now.hour().to_string(),
        "hh" => format!("{:02}", hour12),
        "h" => hour12.to_string(),
        "mm" => format!("{:02}", now.minute()),
        "m" => now.minute().to_string(),
        "ss" => format!("{:02}", now.second()),
        "s" => now.second().to_string(),
        "SSS" => format!("{:03}", now.timestamp_subsec_millis().min(999)),
        "A" => if now.hour() < 12 { "AM" } else { "PM" }.to_string(),
        "a" => if now.hour() < 12 { "am" } else { "pm" }.to_string(),
        "Z" => utc_offset(now, ":"),
        "ZZ" => utc_offset(now, ""),
        "X" => now.timestamp().to_string(),
        "x" => now.timestamp_millis().to_string(),
        _ => String::new(),
    }
}

fn utc_offset(now: &DateTime<FixedOffset>, separator: &str) -> String {
    let seconds = now.offset().local_minus_utc();
    let sign = if seconds < 0 { '-' } else { '+' };
    let minutes = seconds.abs() / 60;
    format!("{}{:02}{}{:02}", sign, minutes / 60, separator, minutes % 60)
}
