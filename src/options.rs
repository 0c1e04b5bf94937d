//! Clipping options and defensive loading from the host's key/value store
//!
//! [`Options`] mirrors the flat camelCase configuration record kept by the host.
//! Stored values are not trusted: [`Options::from_store`] reads every known key
//! on its own, so one value of the wrong type only resets that key to its
//! default (with a `warn!`), never the whole record. Unknown keys survive in
//! [`Options::extra`] so a round trip through this crate does not lose them.
//!
//! # Examples
//!
//! ```rust
//! use markclip::options::{ImageStyle, Options};
//! use serde_json::json;
//!
//! let store = json!({
//!     "imageStyle": "obsidian",
//!     "title": 42,
//!     "someFutureKey": true
//! });
//! let options = Options::from_store(store.as_object().unwrap());
//!
//! assert_eq!(options.image_style, ImageStyle::Obsidian);
//! assert_eq!(options.title, "{pageTitle}"); // invalid value replaced
//! assert!(options.extra.contains_key("someFutureKey"));
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ValidationError;

/// Default filename template
pub const DEFAULT_TITLE_TEMPLATE: &str = "{pageTitle}";

/// Default set of characters stripped from generated filenames
pub const DEFAULT_DISALLOWED_CHARS: &str = "[]#^";

/// Default front matter template
pub const DEFAULT_FRONTMATTER: &str = "---\ncreated: {date:YYYY-MM-DDTHH:mm:ss} (UTC {date:Z})\ntags: [{keywords}]\nsource: {baseURI}\nauthor: {byline}\n---\n\n# {pageTitle}\n\n> ## Excerpt\n> {excerpt}\n\n---\n\n";

/// Heading syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadingStyle {
    /// `# Heading`
    #[default]
    Atx,
    /// Underlined with `===` / `---` for levels 1 and 2
    Setext,
}

/// Code block syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeBlockStyle {
    /// Fenced with the configured fence
    #[default]
    Fenced,
    /// Indented by four spaces
    Indented,
}

/// Link syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkStyle {
    /// `[text](url)`
    #[default]
    Inlined,
    /// `[text][1]` plus a reference list at the end
    Referenced,
    /// Link text only
    StripLinks,
}

/// Reference label form used by [`LinkStyle::Referenced`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkReferenceStyle {
    /// `[text][1]`
    #[default]
    Full,
    /// `[text][]`
    Collapsed,
    /// `[text]`
    Shortcut,
}

/// How images are written into the Markdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageStyle {
    /// `![alt](src "title")`
    #[default]
    #[serde(rename = "markdown")]
    Markdown,
    /// `![alt][fig1]` plus a numbered reference list
    #[serde(rename = "referenced")]
    Referenced,
    /// `![[local/path.png]]`
    #[serde(rename = "obsidian")]
    Obsidian,
    /// `![[path.png]]` without folder
    #[serde(rename = "obsidian-nofolder")]
    ObsidianNoFolder,
    /// Inline Markdown that keeps the remote URL even when downloading
    #[serde(rename = "originalSource")]
    OriginalSource,
    /// Images are dropped
    #[serde(rename = "noImage")]
    NoImage,
}

impl ImageStyle {
    /// Whether downloaded images are referenced by their local filename
    pub fn renames_locally(self) -> bool {
        matches!(
            self,
            ImageStyle::Markdown
                | ImageStyle::Referenced
                | ImageStyle::Obsidian
                | ImageStyle::ObsidianNoFolder
        )
    }

    /// Whether this style ever records images for download
    pub fn collects_images(self) -> bool {
        self != ImageStyle::NoImage
    }
}

/// Which host capability carries the export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DownloadMode {
    /// Direct file-download API
    #[default]
    DownloadsApi,
    /// Fallback: a data-URI link clicked by the UI layer
    ContentLink,
}

/// Clipping options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    pub heading_style: HeadingStyle,
    /// Thematic break marker
    pub hr: String,
    /// `-`, `*` or `+`
    pub bullet_list_marker: String,
    pub code_block_style: CodeBlockStyle,
    /// Three or more backticks or tildes
    pub fence: String,
    /// `_` or `*`
    pub em_delimiter: String,
    /// `**` or `__`
    pub strong_delimiter: String,
    pub link_style: LinkStyle,
    pub link_reference_style: LinkReferenceStyle,
    pub image_style: ImageStyle,
    /// Template prepended to the body when `include_template` is set
    pub frontmatter: String,
    /// Template appended to the body when `include_template` is set
    pub backmatter: String,
    /// Template for the document filename
    pub title: String,
    /// Template for the folder prefix of downloaded images
    pub image_prefix: String,
    /// Template for the folder the document is saved into
    pub md_clips_folder: Option<String>,
    /// Characters that must never appear in generated filenames
    pub disallowed_chars: String,
    pub include_template: bool,
    pub download_images: bool,
    /// Ask the host to show a save dialog for the document
    pub save_as: bool,
    /// Escape Markdown syntax characters found in page text
    pub turndown_escape: bool,
    pub download_mode: DownloadMode,
    /// Keys this crate does not know about
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            heading_style: HeadingStyle::Atx,
            hr: "___".to_string(),
            bullet_list_marker: "-".to_string(),
            code_block_style: CodeBlockStyle::Fenced,
            fence: "```".to_string(),
            em_delimiter: "_".to_string(),
            strong_delimiter: "**".to_string(),
            link_style: LinkStyle::Inlined,
            link_reference_style: LinkReferenceStyle::Full,
            image_style: ImageStyle::Markdown,
            frontmatter: DEFAULT_FRONTMATTER.to_string(),
            backmatter: String::new(),
            title: DEFAULT_TITLE_TEMPLATE.to_string(),
            image_prefix: "{pageTitle}/".to_string(),
            md_clips_folder: None,
            disallowed_chars: DEFAULT_DISALLOWED_CHARS.to_string(),
            include_template: false,
            download_images: false,
            save_as: false,
            turndown_escape: true,
            download_mode: DownloadMode::DownloadsApi,
            extra: Map::new(),
        }
    }
}

const KNOWN_KEYS: &[&str] = &[
    "headingStyle",
    "hr",
    "bulletListMarker",
    "codeBlockStyle",
    "fence",
    "emDelimiter",
    "strongDelimiter",
    "linkStyle",
    "linkReferenceStyle",
    "imageStyle",
    "frontmatter",
    "backmatter",
    "title",
    "imagePrefix",
    "mdClipsFolder",
    "disallowedChars",
    "includeTemplate",
    "downloadImages",
    "saveAs",
    "turndownEscape",
    "downloadMode",
];

impl Options {
    /// Load options from the host store, substituting defaults for bad values
    ///
    /// Every substitution is logged with `warn!`.
    pub fn from_store(store: &Map<String, Value>) -> Self {
        let (options, problems) = Self::from_store_with_report(store);
        for problem in &problems {
            warn!(error = %problem, "Invalid stored option replaced by default");
        }
        options
    }

    /// Like [`Options::from_store`], returning the problems instead of logging
    pub fn from_store_with_report(store: &Map<String, Value>) -> (Self, Vec<ValidationError>) {
        let mut options = Options::default();
        let mut problems = Vec::new();

        let mut record = |result: Result<(), ValidationError>| {
            if let Err(problem) = result {
                problems.push(problem);
            }
        };

        record(load_field(store, "headingStyle", &mut options.heading_style));
        record(load_field(store, "hr", &mut options.hr));
        record(load_checked(store, "bulletListMarker", &mut options.bullet_list_marker, |v| {
            matches!(v, "-" | "*" | "+")
        }));
        record(load_field(store, "codeBlockStyle", &mut options.code_block_style));
        record(load_checked(store, "fence", &mut options.fence, is_valid_fence));
        record(load_checked(store, "emDelimiter", &mut options.em_delimiter, |v| {
            matches!(v, "_" | "*")
        }));
        record(load_checked(store, "strongDelimiter", &mut options.strong_delimiter, |v| {
            matches!(v, "**" | "__")
        }));
        record(load_field(store, "linkStyle", &mut options.link_style));
        record(load_field(store, "linkReferenceStyle", &mut options.link_reference_style));
        record(load_field(store, "imageStyle", &mut options.image_style));
        record(load_field(store, "frontmatter", &mut options.frontmatter));
        record(load_field(store, "backmatter", &mut options.backmatter));
        record(load_field(store, "title", &mut options.title));
        record(load_field(store, "imagePrefix", &mut options.image_prefix));
        record(load_field(store, "mdClipsFolder", &mut options.md_clips_folder));
        record(load_field(store, "disallowedChars", &mut options.disallowed_chars));
        record(load_field(store, "includeTemplate", &mut options.include_template));
        record(load_field(store, "downloadImages", &mut options.download_images));
        record(load_field(store, "saveAs", &mut options.save_as));
        record(load_field(store, "turndownEscape", &mut options.turndown_escape));
        record(load_field(store, "downloadMode", &mut options.download_mode));

        for (key, value) in store {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                options.extra.insert(key.clone(), value.clone());
            }
        }

        // Absent counts as invalid for these two
        if !store.contains_key("title") {
            problems.push(ValidationError::Missing {
                key: "title".to_string(),
            });
        }
        if !store.contains_key("disallowedChars") {
            problems.push(ValidationError::Missing {
                key: "disallowedChars".to_string(),
            });
        }
        problems.extend(options.enforce_required());

        (options, problems)
    }

    /// Ensure `title` and `disallowed_chars` are usable, logging replacements
    ///
    /// Called before every conversion so hand-built options get the same
    /// guarantees as stored ones.
    pub fn validated(mut self) -> Self {
        for problem in self.enforce_required() {
            warn!(error = %problem, "Invalid option replaced by default");
        }
        self
    }

    fn enforce_required(&mut self) -> Vec<ValidationError> {
        let mut problems = Vec::new();
        if self.title.trim().is_empty() {
            self.title = DEFAULT_TITLE_TEMPLATE.to_string();
            problems.push(ValidationError::Missing {
                key: "title".to_string(),
            });
        }
        if self.disallowed_chars.is_empty() {
            self.disallowed_chars = DEFAULT_DISALLOWED_CHARS.to_string();
            problems.push(ValidationError::Missing {
                key: "disallowedChars".to_string(),
            });
        }
        problems
    }

    /// The disallowed set, or `None` when empty
    pub fn disallowed(&self) -> Option<&str> {
        if self.disallowed_chars.is_empty() {
            None
        } else {
            Some(&self.disallowed_chars)
        }
    }
}

fn is_valid_fence(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first @ ('`' | '~')) => value.chars().count() >= 3 && chars.all(|c| c == first),
        _ => false,
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Deserialize one key into `slot`; leaves the default on absence or error
fn load_field<T: DeserializeOwned>(
    store: &Map<String, Value>,
    key: &str,
    slot: &mut T,
) -> Result<(), ValidationError> {
    let Some(value) = store.get(key) else {
        return Ok(());
    };
    match serde_json::from_value::<T>(value.clone()) {
        Ok(parsed) => {
            *slot = parsed;
            Ok(())
        }
        Err(e) => Err(ValidationError::InvalidValue {
            key: key.to_string(),
            reason: format!("{} ({})", e, describe(value)),
        }),
    }
}

/// [`load_field`] for strings with an extra allowed-value check
fn load_checked(
    store: &Map<String, Value>,
    key: &str,
    slot: &mut String,
    is_allowed: impl Fn(&str) -> bool,
) -> Result<(), ValidationError> {
    let mut candidate = slot.clone();
    load_field(store, key, &mut candidate)?;
    if is_allowed(&candidate) {
        *slot = candidate;
        Ok(())
    } else {
        Err(ValidationError::InvalidValue {
            key: key.to_string(),
            reason: format!("unsupported value {:?}", candidate),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test store must be an object"),
        }
    }

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert_eq!(options.title, "{pageTitle}");
        assert_eq!(options.disallowed_chars, "[]#^");
        assert_eq!(options.fence, "```");
        assert_eq!(options.image_style, ImageStyle::Markdown);
        assert!(!options.include_template);
        assert!(options.turndown_escape);
    }

    #[test]
    fn test_load_valid_store() {
        let (options, problems) = Options::from_store_with_report(&store(json!({
            "headingStyle": "setext",
            "fence": "~~~",
            "linkStyle": "stripLinks",
            "imageStyle": "obsidian-nofolder",
            "title": "{date:YYYY} {pageTitle}",
            "disallowedChars": "#",
            "mdClipsFolder": "clips",
            "downloadImages": true,
            "downloadMode": "contentLink"
        })));

        assert!(problems.is_empty(), "unexpected problems: {problems:?}");
        assert_eq!(options.heading_style, HeadingStyle::Setext);
        assert_eq!(options.fence, "~~~");
        assert_eq!(options.link_style, LinkStyle::StripLinks);
        assert_eq!(options.image_style, ImageStyle::ObsidianNoFolder);
        assert_eq!(options.md_clips_folder.as_deref(), Some("clips"));
        assert!(options.download_images);
        assert_eq!(options.download_mode, DownloadMode::ContentLink);
    }

    #[test]
    fn test_invalid_title_and_disallowed_fall_back() {
        let (options, problems) = Options::from_store_with_report(&store(json!({
            "title": 12,
            "disallowedChars": null
        })));

        assert_eq!(options.title, DEFAULT_TITLE_TEMPLATE);
        assert_eq!(options.disallowed_chars, DEFAULT_DISALLOWED_CHARS);
        assert!(problems.iter().any(|p| matches!(
            p,
            ValidationError::InvalidValue { key, .. } if key == "title"
        )));
        assert!(problems.iter().any(|p| matches!(
            p,
            ValidationError::InvalidValue { key, .. } if key == "disallowedChars"
        )));
    }

    #[test]
    fn test_missing_required_keys_are_reported() {
        let (options, problems) = Options::from_store_with_report(&Map::new());
        assert_eq!(options.title, DEFAULT_TITLE_TEMPLATE);
        assert_eq!(problems.len(), 2);
    }

    #[test]
    fn test_empty_title_is_replaced() {
        let (options, problems) = Options::from_store_with_report(&store(json!({
            "title": "   ",
            "disallowedChars": ""
        })));
        assert_eq!(options.title, DEFAULT_TITLE_TEMPLATE);
        assert_eq!(options.disallowed_chars, DEFAULT_DISALLOWED_CHARS);
        assert_eq!(problems.len(), 2);
    }

    #[test]
    fn test_bad_value_only_resets_its_own_key() {
        let (options, problems) = Options::from_store_with_report(&store(json!({
            "title": "{title}",
            "disallowedChars": "#",
            "imageStyle": "sepia",
            "fence": "--",
            "bulletListMarker": "*"
        })));

        assert_eq!(options.image_style, ImageStyle::Markdown);
        assert_eq!(options.fence, "```");
        assert_eq!(options.bullet_list_marker, "*");
        assert_eq!(options.title, "{title}");
        assert_eq!(problems.len(), 2);
    }

    #[test]
    fn test_unknown_keys_preserved() {
        let options = Options::from_store(&store(json!({
            "title": "{pageTitle}",
            "disallowedChars": "#",
            "contextMenus": true,
            "obsidianVault": "notes"
        })));
        assert_eq!(options.extra.get("contextMenus"), Some(&json!(true)));
        assert_eq!(options.extra.get("obsidianVault"), Some(&json!("notes")));

        let round_trip = serde_json::to_value(&options).expect("serializable");
        assert_eq!(round_trip.get("obsidianVault"), Some(&json!("notes")));
        assert_eq!(round_trip.get("imageStyle"), Some(&json!("markdown")));
    }

    #[test]
    fn test_validated_repairs_hand_built_options() {
        let options = Options {
            title: String::new(),
            disallowed_chars: String::new(),
            ..Default::default()
        }
        .validated();
        assert_eq!(options.title, DEFAULT_TITLE_TEMPLATE);
        assert_eq!(options.disallowed_chars, DEFAULT_DISALLOWED_CHARS);
    }

    #[test]
    fn test_image_style_capabilities() {
        assert!(ImageStyle::Markdown.renames_locally());
        assert!(ImageStyle::ObsidianNoFolder.renames_locally());
        assert!(!ImageStyle::OriginalSource.renames_locally());
        assert!(ImageStyle::OriginalSource.collects_images());
        assert!(!ImageStyle::NoImage.collects_images());
    }
}
