//! Filename sanitization for clipped documents and images
//!
//! Generated filenames come from untrusted page titles and image URLs, so they
//! are run through an ordered list of [`SanitizePass`]es. Each pass is a pure
//! `String -> String` transform that can be tested on its own; the full
//! pipeline is [`SANITIZE_PASSES`].
//!
//! # Guarantees
//!
//! - No character of [`ILLEGAL_FILENAME_CHARS`] survives, so the result can
//!   never contain a path separator and therefore no `../` traversal.
//! - No character of the caller's `disallowed_chars` survives.
//! - Everything else (combining marks, astral-plane characters) is kept as-is.
//! - The result fits in [`MAX_FILENAME_BYTES`], keeping a short extension.
//! - Windows device names (`CON`, `LPT1`, ...) get [`RESERVED_NAME_SUFFIX`].
//! - Input made only of filtered characters becomes the empty string.
//! - The pipeline is idempotent.
//!
//! # Examples
//!
//! ```rust
//! use markclip::filename::generate_valid_file_name;
//!
//! assert_eq!(generate_valid_file_name("a/b:c?", None), "abc");
//! assert_eq!(generate_valid_file_name("  Hello \u{a0}  World ", None), "Hello World");
//! assert_eq!(generate_valid_file_name("[Draft] #1", Some("[]#^")), "Draft 1");
//! ```

/// Characters that are never valid in a filename on any supported platform
pub const ILLEGAL_FILENAME_CHARS: &[char] = &['/', '\\', '?', '*', ':', '<', '>', '|', '"'];

/// Upper bound for a sanitized filename, leaving room for a `.md` suffix
/// within the common 255-byte filesystem limit
pub const MAX_FILENAME_BYTES: usize = 240;

/// Appended to a filename whose stem is a reserved Windows device name
pub const RESERVED_NAME_SUFFIX: char = '_';

/// Longest extension kept intact when truncating
const MAX_EXTENSION_LEN: usize = 16;

const RESERVED_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// One step of the sanitization pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanitizePass {
    /// Remove [`ILLEGAL_FILENAME_CHARS`]
    StripIllegal,
    /// Replace U+00A0 with an ordinary space
    ReplaceNonBreakingSpace,
    /// Collapse whitespace runs to a single space
    CollapseWhitespace,
    /// Trim leading and trailing whitespace
    Trim,
    /// Remove every character of the caller's disallowed set
    StripDisallowed,
    /// Suffix reserved device names
    GuardReservedName,
    /// Cut to [`MAX_FILENAME_BYTES`], keeping the extension
    Truncate,
}

/// The full pipeline, in order
///
/// Whitespace is tidied a second time at the end because removing disallowed
/// characters or truncating can expose new runs or edges.
pub const SANITIZE_PASSES: &[SanitizePass] = &[
    SanitizePass::StripIllegal,
    SanitizePass::ReplaceNonBreakingSpace,
    SanitizePass::CollapseWhitespace,
    SanitizePass::Trim,
    SanitizePass::StripDisallowed,
    SanitizePass::GuardReservedName,
    SanitizePass::Truncate,
    SanitizePass::CollapseWhitespace,
    SanitizePass::Trim,
];

impl SanitizePass {
    /// Stable name, used in debug output
    pub fn name(self) -> &'static str {
        match self {
            SanitizePass::StripIllegal => "strip-illegal",
            SanitizePass::ReplaceNonBreakingSpace => "replace-nbsp",
            SanitizePass::CollapseWhitespace => "collapse-whitespace",
            SanitizePass::Trim => "trim",
            SanitizePass::StripDisallowed => "strip-disallowed",
            SanitizePass::GuardReservedName => "guard-reserved-name",
            SanitizePass::Truncate => "truncate",
        }
    }

    /// Apply this pass
    pub fn apply(self, input: String, disallowed_chars: Option<&str>) -> String {
        match self {
            SanitizePass::StripIllegal => {
                input.chars().filter(|c| !ILLEGAL_FILENAME_CHARS.contains(c)).collect()
            }
            SanitizePass::ReplaceNonBreakingSpace => {
                if input.contains('\u{a0}') {
                    input.replace('\u{a0}', " ")
                } else {
                    input
                }
            }
            SanitizePass::CollapseWhitespace => collapse_whitespace(&input),
            SanitizePass::Trim => {
                let trimmed = input.trim();
                if trimmed.len() == input.len() {
                    input
                } else {
                    trimmed.to_string()
                }
            }
            SanitizePass::StripDisallowed => match disallowed_chars {
                Some(set) if !set.is_empty() => strip_chars(&input, set),
                _ => input,
            },
            SanitizePass::GuardReservedName => guard_reserved_name(input),
            SanitizePass::Truncate => truncate_preserving_extension(input, MAX_FILENAME_BYTES),
        }
    }
}

/// Turn an arbitrary string into a safe filename
///
/// `disallowed_chars` is the user-configured extra set; `None` or an empty
/// string disables that pass.
pub fn generate_valid_file_name(raw: &str, disallowed_chars: Option<&str>) -> String {
    SANITIZE_PASSES
        .iter()
        .fold(raw.to_string(), |acc, pass| pass.apply(acc, disallowed_chars))
}

/// [`generate_valid_file_name`] lifted over an optional input
///
/// `None` passes through untouched; absence is not an error.
pub fn generate_valid_file_name_opt(
    raw: Option<&str>,
    disallowed_chars: Option<&str>,
) -> Option<String> {
    raw.map(|value| generate_valid_file_name(value, disallowed_chars))
}

/// Sanitize a relative folder path segment by segment
///
/// Empty, `.` and `..` segments are dropped, so the result never climbs out
/// of the host's download root. The result has no leading or trailing `/`.
///
/// ```rust
/// use markclip::filename::sanitize_relative_path;
///
/// assert_eq!(sanitize_relative_path("clips/../web: 2024/", None), "clips/web 2024");
/// ```
pub fn sanitize_relative_path(path: &str, disallowed_chars: Option<&str>) -> String {
    path.split(['/', '\\'])
        .map(|segment| generate_valid_file_name(segment, disallowed_chars))
        .filter(|segment| !segment.is_empty() && segment != "." && segment != "..")
        .collect::<Vec<_>>()
        .join("/")
}

/// Remove every character contained in `set`
pub fn strip_chars(input: &str, set: &str) -> String {
    input.chars().filter(|c| !set.contains(*c)).collect()
}

fn collapse_whitespace(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut prev_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !prev_space {
                result.push(' ');
                prev_space = true;
            }
        } else {
            result.push(ch);
            prev_space = false;
        }
    }
    result
}

fn guard_reserved_name(input: String) -> String {
    let stem = input.split('.').next().unwrap_or_default().trim_end();
    let reserved = RESERVED_DEVICE_NAMES
        .iter()
        .any(|name| name.eq_ignore_ascii_case(stem));
    if !reserved {
        return input;
    }

    let mut guarded = String::with_capacity(input.len() + 1);
    guarded.push_str(stem);
    guarded.push(RESERVED_NAME_SUFFIX);
    guarded.push_str(&input[stem.len()..]);
    guarded
}

/// Split `name` into stem and extension (with its dot) when it has one
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => {
            let ext = &name[idx + 1..];
            if !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
            {
                (&name[..idx], &name[idx..])
            } else {
                (name, "")
            }
        }
        _ => (name, ""),
    }
}

fn truncate_preserving_extension(input: String, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input;
    }

    let (stem, ext) = split_extension(&input);
    let budget = max_bytes.saturating_sub(ext.len());
    let mut cut = budget.min(stem.len());
    while cut > 0 && !stem.is_char_boundary(cut) {
        cut -= 1;
    }

    let mut truncated = String::with_capacity(cut + ext.len());
    truncated.push_str(stem[..cut].trim_end());
    truncated.push_str(ext);
    truncated
}
