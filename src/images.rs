//! Image handling for the renderer
//!
//! Two concerns live here:
//!
//! - **Naming**: [`image_file_name`] derives a local filename from an image
//!   URL (or from the MIME type of a `data:` URL) and [`ImageList`] records
//!   the `source URL -> local filename` map of one conversion, de-duplicating
//!   names as it goes.
//! - **Formatting**: an [`ImageFormatter`] writes the Markdown for one image.
//!   The formatter is picked from [`ImageStyle`] by [`formatter_for`] when
//!   the renderer is built.
//!
//! # Examples
//!
//! ```rust
//! use markclip::images::{image_file_name, ImageList};
//!
//! let mut images = ImageList::new();
//! let a = image_file_name("https://a.example/x/photo.png?w=200", "Post/", None);
//! let b = image_file_name("https://b.example/y/photo.png#top", "Post/", None);
//! assert_eq!(images.insert("https://a.example/x/photo.png?w=200", a), "Post/photo.png");
//! assert_eq!(images.insert("https://b.example/y/photo.png#top", b), "Post/photo.1.png");
//! ```

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::debug;

use crate::escape::{escape_link_text, escape_title};
use crate::filename::generate_valid_file_name;
use crate::options::ImageStyle;

/// Filename used when nothing better can be derived
pub const DEFAULT_IMAGE_NAME: &str = "image.png";

/// Characters percent-encoded in a local path segment used as a link target
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'(')
    .add(b')')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b']')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// File extension for an image MIME type, `png` when unknown
///
/// ```
/// use markclip::images::extension_for_mime;
///
/// assert_eq!(extension_for_mime("image/jpeg"), "jpg");
/// assert_eq!(extension_for_mime("IMAGE/SVG+XML"), "svg");
/// assert_eq!(extension_for_mime("application/x-unknown"), "png");
/// ```
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/png" | "image/apng" => "png",
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/bmp" | "image/x-ms-bmp" => "bmp",
        "image/avif" => "avif",
        "image/tiff" => "tiff",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        _ => "png",
    }
}

/// Local filename for an image source
///
/// `prefix` is an already rendered and sanitized folder prefix ending in `/`
/// (or empty). The basename is taken from the last path segment of `src` with
/// fragment and query removed, percent-decoded, then sanitized. `data:` URLs
/// are named `image.<ext>` after their MIME type.
pub fn image_file_name(src: &str, prefix: &str, disallowed_chars: Option<&str>) -> String {
    let name = if let Some(data) = src.trim_start().strip_prefix("data:") {
        let mime = data.split([';', ',']).next().unwrap_or_default();
        format!("image.{}", extension_for_mime(mime))
    } else {
        let without_fragment = src.split('#').next().unwrap_or_default();
        let path = without_fragment.split('?').next().unwrap_or_default();
        let last = path.rsplit('/').next().unwrap_or_default();
        let decoded = percent_decode_str(last).decode_utf8_lossy();
        generate_valid_file_name(&decoded, disallowed_chars)
    };

    let name = if name.is_empty() || name == "." || name == ".." {
        DEFAULT_IMAGE_NAME.to_string()
    } else {
        name
    };
    format!("{prefix}{name}")
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    let base_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    match name[base_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let dot = base_start + dot;
            (&name[..dot], Some(&name[dot + 1..]))
        }
        _ => (name, None),
    }
}

/// Ordered `source URL -> local filename` map of one conversion
///
/// Keys are unique. Two sources never share a local filename: a later source
/// whose name is taken gets a counter before its extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageList {
    entries: Vec<(String, String)>,
}

impl ImageList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `src`, returning the local filename it ended up with
    ///
    /// A source already present keeps its first filename.
    pub fn insert(&mut self, src: impl Into<String>, file_name: impl Into<String>) -> String {
        let src = src.into();
        if let Some(existing) = self.get(&src) {
            return existing.to_string();
        }

        let wanted = file_name.into();
        let mut candidate = wanted.clone();
        let mut counter = 1;
        while self.entries.iter().any(|(_, name)| *name == candidate) {
            let (stem, ext) = split_extension(&wanted);
            candidate = match ext {
                Some(ext) => format!("{stem}.{counter}.{ext}"),
                None => format!("{stem}.{counter}"),
            };
            counter += 1;
        }
        if candidate != wanted {
            debug!(src = %src, wanted = %wanted, file_name = %candidate, "Image filename de-duplicated");
        }

        self.entries.push((src, candidate.clone()));
        candidate
    }

    /// Local filename recorded for `src`
    pub fn get(&self, src: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == src)
            .map(|(_, name)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<S: Into<String>, F: Into<String>> FromIterator<(S, F)> for ImageList {
    fn from_iter<I: IntoIterator<Item = (S, F)>>(iter: I) -> Self {
        let mut list = ImageList::new();
        for (src, file_name) in iter {
            list.insert(src, file_name);
        }
        list
    }
}

impl Serialize for ImageList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (src, file_name) in &self.entries {
            map.serialize_entry(src, file_name)?;
        }
        map.end()
    }
}

/// One image as the renderer resolved it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTarget {
    pub alt: String,
    /// Local filename when downloaded and renamed, otherwise the absolute URL
    pub src: String,
    pub title: Option<String>,
    /// `src` is a local filename
    pub local: bool,
}

impl ImageTarget {
    /// `src` as a Markdown link destination
    fn destination(&self) -> String {
        if self.local {
            self.src
                .split('/')
                .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
                .collect::<Vec<_>>()
                .join("/")
        } else {
            self.src.replace(' ', "%20").replace(')', "%29")
        }
    }

    fn title_suffix(&self) -> String {
        match self.title.as_deref() {
            Some(title) if !title.is_empty() => format!(" \"{}\"", escape_title(title)),
            _ => String::new(),
        }
    }
}

/// Reference definitions collected by [`ReferencedImage`] during one call
#[derive(Debug, Default)]
pub struct ImageReferences {
    definitions: Vec<String>,
}

impl ImageReferences {
    /// Add a definition, returning its 1-based number
    pub fn push(&mut self, destination: String, title: String) -> usize {
        let number = self.definitions.len() + 1;
        self.definitions
            .push(format!("[fig{number}]: {destination}{title}"));
        number
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Definitions block, one per line
    pub fn render(&self) -> String {
        self.definitions.join("\n")
    }
}

/// Writes the Markdown for one image
pub trait ImageFormatter: Send + Sync {
    fn format(&self, image: &ImageTarget, references: &mut ImageReferences) -> String;
}

/// `![alt](src "title")`
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineImage;

impl ImageFormatter for InlineImage {
    fn format(&self, image: &ImageTarget, _references: &mut ImageReferences) -> String {
        format!(
            "![{}]({}{})",
            escape_link_text(&image.alt),
            image.destination(),
            image.title_suffix()
        )
    }
}

/// `![alt][figN]` with numbered definitions appended after the body
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferencedImage;

impl ImageFormatter for ReferencedImage {
    fn format(&self, image: &ImageTarget, references: &mut ImageReferences) -> String {
        let number = references.push(image.destination(), image.title_suffix());
        format!("![{}][fig{}]", escape_link_text(&image.alt), number)
    }
}

/// `![[path]]` wiki embeds for local images
///
/// Remote images cannot be embedded this way and fall back to inline syntax.
#[derive(Debug, Clone, Copy)]
pub struct WikiEmbed {
    pub keep_folder: bool,
}

impl ImageFormatter for WikiEmbed {
    fn format(&self, image: &ImageTarget, references: &mut ImageReferences) -> String {
        if !image.local {
            return InlineImage.format(image, references);
        }
        let path = if self.keep_folder {
            image.src.as_str()
        } else {
            image.src.rsplit('/').next().unwrap_or(&image.src)
        };
        format!("![[{path}]]")
    }
}

/// Drops images
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImage;

impl ImageFormatter for NoImage {
    fn format(&self, _image: &ImageTarget, _references: &mut ImageReferences) -> String {
        String::new()
    }
}

/// Formatter for an image style
pub fn formatter_for(style: ImageStyle) -> Box<dyn ImageFormatter> {
    match style {
        ImageStyle::Markdown | ImageStyle::OriginalSource => Box::new(InlineImage),
        ImageStyle::Referenced => Box::new(ReferencedImage),
        ImageStyle::Obsidian => Box::new(WikiEmbed { keep_folder: true }),
        ImageStyle::ObsidianNoFolder => Box::new(WikiEmbed { keep_folder: false }),
        ImageStyle::NoImage => Box::new(NoImage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(src: &str, local: bool) -> ImageTarget {
        ImageTarget {
            alt: "A [cat]".to_string(),
            src: src.to_string(),
            title: None,
            local,
        }
    }

    #[test]
    fn test_file_name_from_path() {
        assert_eq!(
            image_file_name("https://example.com/img/cat.jpg?size=large", "", None),
            "cat.jpg"
        );
        assert_eq!(
            image_file_name("https://example.com/img/cat.jpg#frag?x", "", None),
            "cat.jpg"
        );
        assert_eq!(
            image_file_name("https://example.com/img/my%20cat%3F.png", "p/", None),
            "p/my cat.png"
        );
    }

    #[test]
    fn test_file_name_from_data_url() {
        assert_eq!(
            image_file_name("data:image/jpeg;base64,/9j/4AAQ", "", None),
            "image.jpg"
        );
        assert_eq!(
            image_file_name("data:image/x-foo;base64,AAAA", "", None),
            "image.png"
        );
        assert_eq!(image_file_name("data:,", "", None), "image.png");
    }

    #[test]
    fn test_file_name_fallback_for_empty_basename() {
        assert_eq!(image_file_name("https://example.com/", "", None), "image.png");
        assert_eq!(image_file_name("https://example.com/..", "", None), "image.png");
    }

    #[test]
    fn test_file_name_disallowed_chars() {
        assert_eq!(
            image_file_name("https://example.com/%5Bfig%5D%231.png", "", Some("[]#^")),
            "fig1.png"
        );
    }

    #[test]
    fn test_image_list_dedupes_names() {
        let mut list = ImageList::new();
        assert_eq!(list.insert("https://a/x.png", "x.png"), "x.png");
        assert_eq!(list.insert("https://b/x.png", "x.png"), "x.1.png");
        assert_eq!(list.insert("https://c/x.png", "x.png"), "x.2.png");
        assert_eq!(list.insert("https://a/x.png", "other.png"), "x.png");
        assert_eq!(list.insert("https://d/noext", "noext"), "noext");
        assert_eq!(list.insert("https://e/noext", "noext"), "noext.1");
        assert_eq!(list.len(), 5);
    }

    #[test]
    fn test_split_extension_ignores_folder_dots() {
        assert_eq!(split_extension("v1.2/photo"), ("v1.2/photo", None));
        assert_eq!(split_extension("v1.2/photo.png"), ("v1.2/photo", Some("png")));
        assert_eq!(split_extension(".hidden"), (".hidden", None));
    }

    #[test]
    fn test_image_list_serializes_as_map() {
        let list: ImageList = [("https://a/1.png", "1.png")].into_iter().collect();
        assert_eq!(
            serde_json::to_string(&list).expect("serializable"),
            r#"{"https://a/1.png":"1.png"}"#
        );
    }

    #[test]
    fn test_inline_formatter_encodes_local_paths() {
        let mut refs = ImageReferences::default();
        let out = InlineImage.format(&target("My Page/cat (1).png", true), &mut refs);
        assert_eq!(out, "![A \\[cat\\]](My%20Page/cat%20%281%29.png)");
        assert!(refs.is_empty());
    }

    #[test]
    fn test_inline_formatter_title() {
        let mut refs = ImageReferences::default();
        let image = ImageTarget {
            title: Some("The \"cat\"".to_string()),
            ..target("https://x/c.png", false)
        };
        assert_eq!(
            InlineImage.format(&image, &mut refs),
            "![A \\[cat\\]](https://x/c.png \"The \\\"cat\\\"\")"
        );
    }

    #[test]
    fn test_referenced_formatter_numbers_images() {
        let mut refs = ImageReferences::default();
        assert_eq!(
            ReferencedImage.format(&target("https://x/1.png", false), &mut refs),
            "![A \\[cat\\]][fig1]"
        );
        assert_eq!(
            ReferencedImage.format(&target("https://x/2.png", false), &mut refs),
            "![A \\[cat\\]][fig2]"
        );
        assert_eq!(
            refs.render(),
            "[fig1]: https://x/1.png\n[fig2]: https://x/2.png"
        );
    }

    #[test]
    fn test_wiki_embeds() {
        let mut refs = ImageReferences::default();
        let local = target("Page/cat.png", true);
        assert_eq!(
            WikiEmbed { keep_folder: true }.format(&local, &mut refs),
            "![[Page/cat.png]]"
        );
        assert_eq!(
            WikiEmbed { keep_folder: false }.format(&local, &mut refs),
            "![[cat.png]]"
        );
        assert_eq!(
            WikiEmbed { keep_folder: true }.format(&target("https://x/c.png", false), &mut refs),
            "![A \\[cat\\]](https://x/c.png)"
        );
    }

    #[test]
    fn test_no_image_formatter() {
        let mut refs = ImageReferences::default();
        assert_eq!(NoImage.format(&target("https://x/c.png", false), &mut refs), "");
    }
}
