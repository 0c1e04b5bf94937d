//! Markdown renderer - transforms an article's HTML body into Markdown
//!
//! The renderer walks the html5ever DOM depth-first and writes Markdown into
//! a single buffer, one handler per element kind. Two parts are pluggable and
//! chosen once, when the renderer is built:
//!
//! - a [`CodeBlockFormatter`] for `<pre>` blocks (fenced or indented)
//! - an [`ImageFormatter`] for `<img>` (picked from [`ImageStyle`])
//!
//! # Per-call state
//!
//! Everything a conversion accumulates (the image list, the numbered link and
//! image references, the resolved image prefix) lives in a `RenderContext`
//! created at the start of [`MarkdownRenderer::convert`] and dropped at its
//! end. The renderer itself is immutable, so one instance can serve any
//! number of sequential or concurrent conversions without numbering or image
//! maps leaking between them.
//!
//! # Failure model
//!
//! Rendering is total. Malformed markup is repaired by the parser, dangerous
//! elements are dropped, unsafe link targets degrade to plain text and
//! subtrees nested past the depth limit are flattened to their text.
//!
//! # Examples
//!
//! ```rust
//! use markclip::article::Article;
//! use markclip::converter::MarkdownRenderer;
//!
//! let renderer = MarkdownRenderer::new();
//! let article = Article::default();
//! let result = renderer.convert(
//!     "<h1>Title</h1><p>Some <strong>bold</strong> text.</p>",
//!     &article,
//! );
//! assert_eq!(result.markdown, "# Title\n\nSome **bold** text.\n");
//! assert!(result.image_list.is_empty());
//! ```

use markup5ever_rcdom::{Handle, NodeData, RcDom};
use serde::Serialize;
use url::Url;

use crate::article::Article;
use crate::code_block::{CodeBlockFormatter, FencedCodeBlock, IndentedCodeBlock, detect_language};
use crate::escape::{escape_markdown_from, escape_title, inline_code};
use crate::filename::sanitize_relative_path;
use crate::images::{
    ImageFormatter, ImageList, ImageReferences, ImageTarget, formatter_for, image_file_name,
};
use crate::options::{
    CodeBlockStyle, HeadingStyle, ImageStyle, LinkReferenceStyle, LinkStyle, Options,
};
use crate::parser::{get_attr, parse_html, tag_name, text_content};
use crate::security::{SanitizeAction, SecurityValidator};
use crate::template::text_replace;

/// Marks a line of code block output that normalization must not touch
///
/// A Unicode noncharacter, so it cannot collide with Markdown syntax.
const CODE_LINE: char = '\u{FDD0}';

/// Elements rendered as blocks separated by blank lines
const BLOCK_CONTAINERS: &[&str] = &[
    "address",
    "article",
    "aside",
    "center",
    "dd",
    "details",
    "dialog",
    "div",
    "dl",
    "dt",
    "fieldset",
    "figcaption",
    "figure",
    "footer",
    "form",
    "header",
    "main",
    "nav",
    "section",
    "summary",
];

/// Renderer settings, the rendering subset of [`Options`]
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub heading_style: HeadingStyle,
    pub hr: String,
    pub bullet_list_marker: String,
    pub code_block_style: CodeBlockStyle,
    pub fence: String,
    pub em_delimiter: String,
    pub strong_delimiter: String,
    pub link_style: LinkStyle,
    pub link_reference_style: LinkReferenceStyle,
    pub image_style: ImageStyle,
    /// Record images in the image list and reference them locally
    pub download_images: bool,
    /// Template for the folder prefix of downloaded images
    pub image_prefix: String,
    pub disallowed_chars: String,
    /// Backslash-escape Markdown syntax found in page text
    pub escape: bool,
}

impl From<&Options> for RenderOptions {
    fn from(options: &Options) -> Self {
        Self {
            heading_style: options.heading_style,
            hr: options.hr.clone(),
            bullet_list_marker: options.bullet_list_marker.clone(),
            code_block_style: options.code_block_style,
            fence: options.fence.clone(),
            em_delimiter: options.em_delimiter.clone(),
            strong_delimiter: options.strong_delimiter.clone(),
            link_style: options.link_style,
            link_reference_style: options.link_reference_style,
            image_style: options.image_style,
            download_images: options.download_images,
            image_prefix: options.image_prefix.clone(),
            disallowed_chars: options.disallowed_chars.clone(),
            escape: options.turndown_escape,
        }
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from(&Options::default())
    }
}

/// Output of one conversion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    /// Markdown body, ending in a single newline unless empty
    pub markdown: String,
    /// `source URL -> local filename` for images to export
    pub image_list: ImageList,
}

/// State of a single conversion
struct RenderContext {
    base_url: Option<Url>,
    image_prefix: String,
    image_list: ImageList,
    image_references: ImageReferences,
    link_references: Vec<String>,
}

impl RenderContext {
    fn new(options: &RenderOptions, article: &Article) -> Self {
        let image_prefix = if options.download_images {
            let disallowed = Some(options.disallowed_chars.as_str()).filter(|d| !d.is_empty());
            render_image_prefix(&options.image_prefix, article, disallowed)
        } else {
            String::new()
        };
        Self {
            base_url: article.base_url(),
            image_prefix,
            image_list: ImageList::new(),
            image_references: ImageReferences::default(),
            link_references: Vec::new(),
        }
    }
}

/// Render the image prefix template into a safe relative folder
///
/// Returns an empty string or a path ending in `/`. A blank template means
/// no prefix at all.
///
/// ```
/// use markclip::article::Article;
/// use markclip::converter::render_image_prefix;
///
/// let article = Article::with_page_title("What's new: 2024");
/// assert_eq!(
///     render_image_prefix("assets/{pageTitle}/", &article, Some("[]#^")),
///     "assets/What's new 2024/"
/// );
/// assert_eq!(render_image_prefix("", &article, None), "");
/// ```
pub fn render_image_prefix(template: &str, article: &Article, disallowed: Option<&str>) -> String {
    if template.trim().is_empty() {
        return String::new();
    }
    let rendered = text_replace(Some(template), article, disallowed);
    let path = sanitize_relative_path(&rendered, disallowed);
    if path.is_empty() {
        path
    } else {
        format!("{path}/")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableAlignment {
    Unspecified,
    Left,
    Center,
    Right,
}

struct TableRow {
    cells: Vec<String>,
    alignments: Vec<TableAlignment>,
    in_head: bool,
}

/// HTML to Markdown renderer
///
/// # Examples
///
/// ```rust
/// use markclip::article::Article;
/// use markclip::converter::MarkdownRenderer;
/// use markclip::options::{ImageStyle, Options};
///
/// let options = Options {
///     image_style: ImageStyle::Referenced,
///     ..Default::default()
/// };
/// let renderer = MarkdownRenderer::from_options(&options);
/// let result = renderer.convert(r#"<img src="https://x.test/a.png" alt="A">"#, &Article::default());
/// assert_eq!(result.markdown, "![A][fig1]\n\n[fig1]: https://x.test/a.png\n");
/// ```
pub struct MarkdownRenderer {
    options: RenderOptions,
    code_blocks: Box<dyn CodeBlockFormatter>,
    images: Box<dyn ImageFormatter>,
    security_validator: SecurityValidator,
}

impl MarkdownRenderer {
    /// Create a renderer with default options
    pub fn new() -> Self {
        Self::with_options(RenderOptions::default())
    }

    /// Create a renderer from clipping options
    pub fn from_options(options: &Options) -> Self {
        Self::with_options(RenderOptions::from(options))
    }

    /// Create a renderer, picking formatters from the style options
    pub fn with_options(options: RenderOptions) -> Self {
        let code_blocks: Box<dyn CodeBlockFormatter> = match options.code_block_style {
            CodeBlockStyle::Fenced => Box::new(FencedCodeBlock::new(&options.fence)),
            CodeBlockStyle::Indented => Box::new(IndentedCodeBlock),
        };
        let images = formatter_for(options.image_style);
        Self::with_formatters(options, code_blocks, images)
    }

    /// Create a renderer with explicit formatters
    pub fn with_formatters(
        options: RenderOptions,
        code_blocks: Box<dyn CodeBlockFormatter>,
        images: Box<dyn ImageFormatter>,
    ) -> Self {
        Self {
            options,
            code_blocks,
            images,
            security_validator: SecurityValidator::new(),
        }
    }

    /// Replace the security validator (e.g. to lower the depth limit)
    pub fn with_security_validator(mut self, security_validator: SecurityValidator) -> Self {
        self.security_validator = security_validator;
        self
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Convert an HTML body to Markdown
    ///
    /// `article` supplies the base URI for relative URLs and the fields used
    /// by the image prefix template.
    pub fn convert(&self, html: &str, article: &Article) -> ConversionResult {
        let dom = parse_html(html);
        self.convert_dom(&dom, article)
    }

    /// Convert an already parsed DOM
    pub fn convert_dom(&self, dom: &RcDom, article: &Article) -> ConversionResult {
        let mut ctx = RenderContext::new(&self.options, article);
        let mut output = String::with_capacity(1024);

        self.traverse_node(&dom.document, &mut output, 0, &mut ctx);

        let mut references = ctx.link_references.join("\n");
        if !ctx.image_references.is_empty() {
            if !references.is_empty() {
                references.push('\n');
            }
            references.push_str(&ctx.image_references.render());
        }
        if !references.is_empty() {
            ensure_blank_line(&mut output);
            output.push_str(&references);
        }

        ConversionResult {
            markdown: normalize_output(&output),
            image_list: ctx.image_list,
        }
    }

    fn traverse_node(&self, node: &Handle, output: &mut String, depth: usize, ctx: &mut RenderContext) {
        match node.data {
            NodeData::Document => {
                for child in node.children.borrow().iter() {
                    self.traverse_node(child, output, depth, ctx);
                }
            }
            NodeData::Element { ref name, .. } => {
                let tag = name.local.as_ref();
                self.handle_element(node, tag, output, depth, ctx);
            }
            NodeData::Text { ref contents } => {
                self.handle_text(&contents.borrow(), output);
            }
            // Comments, doctypes and processing instructions produce nothing
            _ => {}
        }
    }

    fn traverse_children(
        &self,
        node: &Handle,
        output: &mut String,
        depth: usize,
        ctx: &mut RenderContext,
    ) {
        for child in node.children.borrow().iter() {
            self.traverse_node(child, output, depth + 1, ctx);
        }
    }

    /// Render the children of `node` into a fresh buffer
    fn render_children(&self, node: &Handle, depth: usize, ctx: &mut RenderContext) -> String {
        let mut buffer = String::new();
        self.traverse_children(node, &mut buffer, depth, ctx);
        buffer
    }

    fn handle_element(
        &self,
        node: &Handle,
        tag: &str,
        output: &mut String,
        depth: usize,
        ctx: &mut RenderContext,
    ) {
        if self.security_validator.check_element(tag) == SanitizeAction::Remove {
            return;
        }
        if self.security_validator.exceeds_depth(depth) {
            self.write_flattened(node, output);
            return;
        }

        match tag {
            "h1" => self.handle_heading(node, 1, output, depth, ctx),
            "h2" => self.handle_heading(node, 2, output, depth, ctx),
            "h3" => self.handle_heading(node, 3, output, depth, ctx),
            "h4" => self.handle_heading(node, 4, output, depth, ctx),
            "h5" => self.handle_heading(node, 5, output, depth, ctx),
            "h6" => self.handle_heading(node, 6, output, depth, ctx),
            "p" => self.handle_paragraph(node, output, depth, ctx),
            "br" => output.push_str("  \n"),
            "hr" => {
                ensure_blank_line(output);
                output.push_str(&self.options.hr);
                output.push_str("\n\n");
            }
            "a" => self.handle_link(node, output, depth, ctx),
            "img" => self.handle_image(node, output, ctx),
            "ul" => self.handle_list(node, output, depth, false, ctx),
            "ol" => self.handle_list(node, output, depth, true, ctx),
            "li" => {
                ensure_blank_line(output);
                let marker = self.options.bullet_list_marker.clone();
                output.push_str(&self.render_list_item(node, &marker, depth, ctx));
                output.push_str("\n\n");
            }
            "pre" => self.handle_code_block(node, output),
            "code" | "kbd" | "samp" | "tt" => self.handle_inline_code(node, output),
            "strong" | "b" => {
                let delimiter = self.options.strong_delimiter.clone();
                self.handle_delimited(node, &delimiter, output, depth, ctx);
            }
            "em" | "i" => {
                let delimiter = self.options.em_delimiter.clone();
                self.handle_delimited(node, &delimiter, output, depth, ctx);
            }
            "del" | "s" | "strike" => self.handle_delimited(node, "~~", output, depth, ctx),
            "blockquote" => self.handle_blockquote(node, output, depth, ctx),
            "table" => self.handle_table(node, output, depth, ctx),
            _ if BLOCK_CONTAINERS.contains(&tag) => {
                ensure_blank_line(output);
                self.traverse_children(node, output, depth, ctx);
                ensure_blank_line(output);
            }
            _ => self.traverse_children(node, output, depth, ctx),
        }
    }

    fn handle_text(&self, text: &str, output: &mut String) {
        let normalized = normalize_text(text);
        let needs_space = !output.is_empty() && !output.ends_with(|c: char| c.is_whitespace());

        if normalized.is_empty() {
            // Whitespace between inline elements still separates words
            if !text.is_empty() && needs_space {
                output.push(' ');
            }
            return;
        }

        if text.starts_with(|c: char| c.is_whitespace()) && needs_space {
            output.push(' ');
        }
        if self.options.escape {
            let at_line_start = output.is_empty() || output.ends_with('\n');
            output.push_str(&escape_markdown_from(&normalized, at_line_start));
        } else {
            output.push_str(&normalized);
        }
        if text.ends_with(|c: char| c.is_whitespace()) {
            output.push(' ');
        }
    }

    /// Text of a subtree past the depth limit
    fn write_flattened(&self, node: &Handle, output: &mut String) {
        let raw = text_content(node);
        self.handle_text(&raw, output);
    }

    fn handle_heading(
        &self,
        node: &Handle,
        level: usize,
        output: &mut String,
        depth: usize,
        ctx: &mut RenderContext,
    ) {
        let content = normalize_text(&self.render_children(node, depth, ctx));
        if content.is_empty() {
            return;
        }

        ensure_blank_line(output);
        match (self.options.heading_style, level) {
            (HeadingStyle::Setext, 1 | 2) => {
                let underline = if level == 1 { '=' } else { '-' };
                output.push_str(&content);
                output.push('\n');
                output.extend(std::iter::repeat_n(underline, content.chars().count()));
            }
            _ => {
                output.push_str(&"#".repeat(level));
                output.push(' ');
                output.push_str(&content);
            }
        }
        output.push_str("\n\n");
    }

    fn handle_paragraph(
        &self,
        node: &Handle,
        output: &mut String,
        depth: usize,
        ctx: &mut RenderContext,
    ) {
        ensure_blank_line(output);
        let start_len = output.len();
        self.traverse_children(node, output, depth, ctx);
        if output[start_len..].trim().is_empty() {
            output.truncate(start_len);
        } else {
            output.push_str("\n\n");
        }
    }

    /// `strong`, `em` and `del`: wrap the trimmed content, keep outer spaces
    fn handle_delimited(
        &self,
        node: &Handle,
        delimiter: &str,
        output: &mut String,
        depth: usize,
        ctx: &mut RenderContext,
    ) {
        let rendered = self.render_children(node, depth, ctx);
        push_inline(output, &rendered, |content| {
            format!("{delimiter}{content}{delimiter}")
        });
    }

    fn handle_link(&self, node: &Handle, output: &mut String, depth: usize, ctx: &mut RenderContext) {
        let rendered = self.render_children(node, depth, ctx);
        let href = get_attr(node, "href")
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty());

        let Some(href) = href else {
            push_inline(output, &rendered, str::to_string);
            return;
        };
        let resolved = resolve_url(ctx.base_url.as_ref(), &href);
        let Some(url) = self.security_validator.sanitize_url(&resolved) else {
            push_inline(output, &rendered, str::to_string);
            return;
        };

        let destination = encode_destination(url);
        let title = get_attr(node, "title")
            .map(|t| normalize_text(&t))
            .filter(|t| !t.is_empty())
            .map(|t| format!(" \"{}\"", escape_title(&t)))
            .unwrap_or_default();

        let link_style = self.options.link_style;
        let reference_style = self.options.link_reference_style;
        let references = &mut ctx.link_references;
        push_inline(output, &rendered, |content| match link_style {
            LinkStyle::StripLinks => content.to_string(),
            LinkStyle::Inlined => format!("[{content}]({destination}{title})"),
            LinkStyle::Referenced => match reference_style {
                LinkReferenceStyle::Full => {
                    let number = references.len() + 1;
                    references.push(format!("[{number}]: {destination}{title}"));
                    format!("[{content}][{number}]")
                }
                LinkReferenceStyle::Collapsed => {
                    references.push(format!("[{content}]: {destination}{title}"));
                    format!("[{content}][]")
                }
                LinkReferenceStyle::Shortcut => {
                    references.push(format!("[{content}]: {destination}{title}"));
                    format!("[{content}]")
                }
            },
        });
    }

    fn handle_image(&self, node: &Handle, output: &mut String, ctx: &mut RenderContext) {
        if !self.options.image_style.collects_images() {
            return;
        }

        let src = ["src", "data-src"]
            .iter()
            .filter_map(|attr| get_attr(node, attr))
            .map(|s| s.trim().to_string())
            .find(|s| !s.is_empty());
        let Some(src) = src else {
            return;
        };
        let resolved = if src.to_ascii_lowercase().starts_with("data:") {
            src
        } else {
            resolve_url(ctx.base_url.as_ref(), &src)
        };
        let Some(safe_src) = self.security_validator.sanitize_image_url(&resolved) else {
            return;
        };

        let (target_src, local) = if self.options.download_images {
            let disallowed =
                Some(self.options.disallowed_chars.as_str()).filter(|d| !d.is_empty());
            let wanted = image_file_name(safe_src, &ctx.image_prefix, disallowed);
            let file_name = ctx.image_list.insert(safe_src, wanted);
            if self.options.image_style.renames_locally() {
                (file_name, true)
            } else {
                (safe_src.to_string(), false)
            }
        } else {
            (safe_src.to_string(), false)
        };

        let target = ImageTarget {
            alt: normalize_text(&get_attr(node, "alt").unwrap_or_default()),
            src: target_src,
            title: get_attr(node, "title")
                .map(|t| normalize_text(&t))
                .filter(|t| !t.is_empty()),
            local,
        };
        output.push_str(&self.images.format(&target, &mut ctx.image_references));
    }

    fn handle_list(
        &self,
        node: &Handle,
        output: &mut String,
        depth: usize,
        ordered: bool,
        ctx: &mut RenderContext,
    ) {
        let mut number = if ordered {
            get_attr(node, "start")
                .and_then(|s| s.trim().parse::<usize>().ok())
                .unwrap_or(1)
        } else {
            0
        };

        let mut items: Vec<String> = Vec::new();
        for child in node.children.borrow().iter() {
            match tag_name(child).as_deref() {
                Some("li") => {
                    let marker = if ordered {
                        let marker = format!("{number}.");
                        number += 1;
                        marker
                    } else {
                        self.options.bullet_list_marker.clone()
                    };
                    items.push(self.render_list_item(child, &marker, depth, ctx));
                }
                // A list nested directly in a list belongs to the previous item
                Some("ul") | Some("ol") => {
                    let nested = tidy_block(&self.render_node(child, depth, ctx));
                    let nested = indent_lines(&nested, "  ");
                    match items.last_mut() {
                        Some(last) => {
                            last.push('\n');
                            last.push_str(&nested);
                        }
                        None => items.push(nested.trim_start().to_string()),
                    }
                }
                _ => {}
            }
        }

        if items.is_empty() {
            return;
        }
        ensure_blank_line(output);
        output.push_str(&items.join("\n"));
        output.push_str("\n\n");
    }

    fn render_node(&self, node: &Handle, depth: usize, ctx: &mut RenderContext) -> String {
        let mut buffer = String::new();
        self.traverse_node(node, &mut buffer, depth + 1, ctx);
        buffer
    }

    fn render_list_item(
        &self,
        node: &Handle,
        marker: &str,
        depth: usize,
        ctx: &mut RenderContext,
    ) -> String {
        let content = tidy_block(&self.render_children(node, depth, ctx));
        let loose = node.children.borrow().iter().any(|child| {
            matches!(
                tag_name(child).as_deref(),
                Some("p" | "pre" | "blockquote" | "table")
            )
        });
        let content = if loose {
            content
        } else {
            collapse_blank_lines(&content)
        };

        let indent = " ".repeat(marker.chars().count() + 1);
        let mut item = format!("{marker} ");
        item.push_str(indent_lines(&content, &indent).trim_start());
        item
    }

    fn handle_code_block(&self, node: &Handle, output: &mut String) {
        let children: Vec<Handle> = node
            .children
            .borrow()
            .iter()
            .filter(|child| !is_blank_text(child))
            .cloned()
            .collect();

        let (code, language) = match children.as_slice() {
            [only] if tag_name(only).as_deref() == Some("code") => {
                let language = detect_language(
                    get_attr(only, "class").as_deref(),
                    get_attr(only, "id").as_deref(),
                    get_attr(node, "class").as_deref(),
                    get_attr(node, "id").as_deref(),
                );
                (extract_code_content(only), language)
            }
            _ => (extract_code_content(node), None),
        };

        ensure_blank_line(output);
        output.push_str(&mark_code_lines(&self.code_blocks.format(&code, language.as_deref())));
        output.push_str("\n\n");
    }

    fn handle_inline_code(&self, node: &Handle, output: &mut String) {
        let content = extract_code_content(node).replace(['\n', '\r'], " ");
        if content.trim().is_empty() {
            return;
        }
        output.push_str(&inline_code(&content));
    }

    fn handle_blockquote(
        &self,
        node: &Handle,
        output: &mut String,
        depth: usize,
        ctx: &mut RenderContext,
    ) {
        let content = tidy_block(&self.render_children(node, depth, ctx));
        if content.is_empty() {
            return;
        }

        ensure_blank_line(output);
        let quoted: Vec<String> = content
            .split('\n')
            .map(|line| {
                if line.trim().is_empty() {
                    ">".to_string()
                } else {
                    format!("> {line}")
                }
            })
            .collect();
        output.push_str(&quoted.join("\n"));
        output.push_str("\n\n");
    }

    /// GFM table; the first `<thead>` row, else the first row, is the header
    fn handle_table(&self, node: &Handle, output: &mut String, depth: usize, ctx: &mut RenderContext) {
        let mut rows = Vec::new();
        self.collect_table_rows(node, false, &mut rows, depth, ctx);
        if rows.is_empty() {
            return;
        }

        let header_index = rows.iter().position(|row| row.in_head).unwrap_or(0);
        let header = rows.remove(header_index);
        let columns = rows
            .iter()
            .map(|row| row.cells.len())
            .chain(std::iter::once(header.cells.len()))
            .max()
            .unwrap_or(0);
        if columns == 0 {
            return;
        }

        ensure_blank_line(output);
        write_gfm_table(output, &header, &rows, columns);
        output.push('\n');
    }

    fn collect_table_rows(
        &self,
        node: &Handle,
        in_head: bool,
        rows: &mut Vec<TableRow>,
        depth: usize,
        ctx: &mut RenderContext,
    ) {
        for child in node.children.borrow().iter() {
            match tag_name(child).as_deref() {
                Some("tr") => rows.push(self.extract_table_row(child, in_head, depth, ctx)),
                Some("thead") => self.collect_table_rows(child, true, rows, depth + 1, ctx),
                Some("tbody" | "tfoot") => self.collect_table_rows(child, false, rows, depth + 1, ctx),
                _ => {}
            }
        }
    }

    fn extract_table_row(
        &self,
        tr: &Handle,
        in_head: bool,
        depth: usize,
        ctx: &mut RenderContext,
    ) -> TableRow {
        let mut row = TableRow {
            cells: Vec::new(),
            alignments: Vec::new(),
            in_head,
        };
        for cell in tr.children.borrow().iter() {
            if matches!(tag_name(cell).as_deref(), Some("th" | "td")) {
                let content = normalize_text(&self.render_children(cell, depth + 1, ctx));
                row.cells.push(content.replace('|', "\\|"));
                row.alignments.push(extract_alignment(cell));
            }
        }
        row
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Alignment from the `align` attribute or a `text-align` style
fn extract_alignment(cell: &Handle) -> TableAlignment {
    let from_keyword = |value: &str| {
        if value.contains("center") {
            TableAlignment::Center
        } else if value.contains("right") {
            TableAlignment::Right
        } else if value.contains("left") {
            TableAlignment::Left
        } else {
            TableAlignment::Unspecified
        }
    };

    if let Some(align) = get_attr(cell, "align") {
        return from_keyword(&align.to_ascii_lowercase());
    }
    if let Some(style) = get_attr(cell, "style") {
        let style = style.to_ascii_lowercase();
        if style.contains("text-align") {
            return from_keyword(&style);
        }
    }
    TableAlignment::Unspecified
}

fn write_gfm_table(output: &mut String, header: &TableRow, rows: &[TableRow], columns: usize) {
    let write_row = |output: &mut String, cells: &[String]| {
        output.push('|');
        for i in 0..columns {
            output.push(' ');
            output.push_str(cells.get(i).map(String::as_str).unwrap_or_default());
            output.push_str(" |");
        }
        output.push('\n');
    };

    write_row(output, &header.cells);

    output.push('|');
    for i in 0..columns {
        let alignment = header
            .alignments
            .get(i)
            .copied()
            .unwrap_or(TableAlignment::Unspecified);
        output.push(' ');
        output.push_str(match alignment {
            TableAlignment::Unspecified => "---",
            TableAlignment::Left => ":---",
            TableAlignment::Center => ":---:",
            TableAlignment::Right => "---:",
        });
        output.push_str(" |");
    }
    output.push('\n');

    for row in rows {
        write_row(output, &row.cells);
    }
}

/// Append `rendered` through `format`, keeping its outer whitespace outside
fn push_inline(output: &mut String, rendered: &str, format: impl FnOnce(&str) -> String) {
    let content = rendered.trim();
    let needs_space = !output.is_empty() && !output.ends_with(|c: char| c.is_whitespace());
    if content.is_empty() {
        if !rendered.is_empty() && needs_space {
            output.push(' ');
        }
        return;
    }
    if rendered.starts_with(|c: char| c.is_whitespace()) && needs_space {
        output.push(' ');
    }
    output.push_str(&format(content));
    if rendered.ends_with(|c: char| c.is_whitespace()) {
        output.push(' ');
    }
}

fn ensure_blank_line(output: &mut String) {
    if output.trim().is_empty() {
        output.clear();
        return;
    }
    let trimmed_len = output.trim_end_matches([' ', '\t']).len();
    output.truncate(trimmed_len);
    if output.ends_with("\n\n") {
        return;
    }
    if output.ends_with('\n') {
        output.push('\n');
    } else {
        output.push_str("\n\n");
    }
}

fn resolve_url(base: Option<&Url>, href: &str) -> String {
    match base {
        Some(base) => base
            .join(href)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| href.to_string()),
        None => href.to_string(),
    }
}

/// Make a URL safe inside `(...)`
fn encode_destination(url: &str) -> String {
    url.replace(' ', "%20")
        .replace('(', "%28")
        .replace(')', "%29")
}

fn is_blank_text(node: &Handle) -> bool {
    match node.data {
        NodeData::Text { ref contents } => contents.borrow().trim().is_empty(),
        NodeData::Comment { .. } => true,
        _ => false,
    }
}

/// Raw text of a code element; `<br>` becomes a newline
fn extract_code_content(node: &Handle) -> String {
    let mut output = String::new();
    let mut stack = vec![node.clone()];
    while let Some(node) = stack.pop() {
        match node.data {
            NodeData::Text { ref contents } => output.push_str(&contents.borrow()),
            NodeData::Element { ref name, .. } if name.local.as_ref() == "br" => output.push('\n'),
            NodeData::Element { .. } => {
                stack.extend(node.children.borrow().iter().rev().cloned());
            }
            _ => {}
        }
    }
    output
}

/// Collapse whitespace runs to single spaces and trim
fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace(CODE_LINE, "")
}

/// Trim surrounding blank lines and whitespace of a rendered block
fn tidy_block(block: &str) -> String {
    block.trim().to_string()
}

fn collapse_blank_lines(block: &str) -> String {
    block
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prefix every non-empty line with `indent`
fn indent_lines(block: &str, indent: &str) -> String {
    block
        .split('\n')
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{indent}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prefix every line of a formatted code block with [`CODE_LINE`]
fn mark_code_lines(block: &str) -> String {
    block
        .split('\n')
        .map(|line| format!("{CODE_LINE}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A hard break ending a paragraph does nothing
fn drop_trailing_hard_break(result: &mut String) {
    if result.ends_with("  \n") {
        let keep = result.trim_end_matches([' ', '\n']).len();
        result.truncate(keep);
        result.push('\n');
    }
}

/// Normalize the final Markdown body
///
/// Lines carrying the [`CODE_LINE`] marker are code block lines: the marker
/// is removed and the line is otherwise copied verbatim, keeping any list or
/// quote prefix written before it. Elsewhere trailing whitespace is removed
/// (a two-space hard break is kept), runs of blank lines collapse to one, and
/// leading and trailing blank lines are dropped. A non-empty result ends with
/// exactly one newline.
fn normalize_output(output: &str) -> String {
    let output = output.replace("\r\n", "\n");
    let mut result = String::with_capacity(output.len());
    let mut prev_blank = true;
    let mut prev_code = false;

    for line in output.split('\n') {
        if let Some((prefix, code)) = line.split_once(CODE_LINE) {
            let code = code.replace(CODE_LINE, "");
            if code.is_empty() {
                result.push_str(prefix.trim_end());
            } else {
                result.push_str(prefix);
                result.push_str(&code);
            }
            result.push('\n');
            prev_blank = false;
            prev_code = true;
            continue;
        }

        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            if !prev_blank {
                if !prev_code {
                    drop_trailing_hard_break(&mut result);
                }
                result.push('\n');
                prev_blank = true;
            }
            continue;
        }

        result.push_str(trimmed);
        if line.ends_with("  ") {
            result.push_str("  ");
        }
        result.push('\n');
        prev_blank = false;
        prev_code = false;
    }

    while result.ends_with("\n\n") {
        result.pop();
    }
    if !prev_code {
        drop_trailing_hard_break(&mut result);
    }
    if result.trim().is_empty() {
        result.clear();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn convert_html_for_test(html: &str) -> String {
        MarkdownRenderer::new()
            .convert(html, &Article::default())
            .markdown
    }

    fn convert_with(options: &Options, html: &str, article: &Article) -> ConversionResult {
        MarkdownRenderer::from_options(options).convert(html, article)
    }

    #[test]
    fn test_heading_conversion() {
        assert_eq!(
            convert_html_for_test("<h1>Main Title</h1><h2>Subtitle</h2><p>Some content here.</p>"),
            "# Main Title\n\n## Subtitle\n\nSome content here.\n"
        );
    }

    #[test]
    fn test_setext_headings() {
        let options = Options {
            heading_style: HeadingStyle::Setext,
            ..Default::default()
        };
        let result = convert_with(
            &options,
            "<h1>Title</h1><h2>Sub</h2><h3>Third</h3>",
            &Article::default(),
        );
        assert_eq!(result.markdown, "Title\n=====\n\nSub\n---\n\n### Third\n");
    }

    #[test]
    fn test_text_normalization() {
        assert_eq!(
            convert_html_for_test("<p>Text   with    multiple\n   spaces</p>"),
            "Text with multiple spaces\n"
        );
    }

    #[test]
    fn test_dangerous_elements_removed() {
        let html = "<p>Before</p><script>alert(1)</script><style>p{}</style>\
                    <iframe src=\"x\"></iframe><p>After</p>";
        assert_eq!(convert_html_for_test(html), "Before\n\nAfter\n");
    }

    #[test]
    fn test_malformed_html_does_not_fail() {
        let markdown = convert_html_for_test("<div><p>text</div></p>");
        assert_eq!(markdown, "text\n");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(convert_html_for_test(""), "");
        assert_eq!(convert_html_for_test("   \n  "), "");
    }

    #[test]
    fn test_inline_formatting() {
        assert_eq!(
            convert_html_for_test("<p><strong>Bold</strong> and <em>it</em> and <del>gone</del></p>"),
            "**Bold** and _it_ and ~~gone~~\n"
        );
    }

    #[test]
    fn test_custom_delimiters() {
        let options = Options {
            em_delimiter: "*".to_string(),
            strong_delimiter: "__".to_string(),
            ..Default::default()
        };
        let result = convert_with(&options, "<p><b>B</b> <i>I</i></p>", &Article::default());
        assert_eq!(result.markdown, "__B__ *I*\n");
    }

    #[test]
    fn test_delimiters_keep_outer_spaces() {
        assert_eq!(
            convert_html_for_test("<p>a<strong> bold </strong>b</p>"),
            "a **bold** b\n"
        );
    }

    #[test]
    fn test_text_escaping() {
        assert_eq!(
            convert_html_for_test("<p>*not bold* and [brackets]</p>"),
            "\\*not bold\\* and \\[brackets\\]\n"
        );

        let options = Options {
            turndown_escape: false,
            ..Default::default()
        };
        let result = convert_with(&options, "<p>*raw*</p>", &Article::default());
        assert_eq!(result.markdown, "*raw*\n");
    }

    #[test]
    fn test_dash_only_paragraph_is_not_a_rule() {
        assert_eq!(
            convert_html_for_test("<p>Intro</p><p>---</p>"),
            "Intro\n\n\\---\n"
        );
    }

    #[test]
    fn test_line_break_and_rule() {
        assert_eq!(
            convert_html_for_test("<p>a<br>b</p><hr><p>c</p>"),
            "a  \nb\n\n___\n\nc\n"
        );
    }

    #[test]
    fn test_blockquote() {
        assert_eq!(
            convert_html_for_test("<blockquote><p>one</p><p>two</p></blockquote>"),
            "> one\n>\n> two\n"
        );
    }

    #[test]
    fn test_unordered_list_conversion() {
        assert_eq!(
            convert_html_for_test("<ul>\n  <li>One</li>\n  <li>Two</li>\n</ul>"),
            "- One\n- Two\n"
        );
    }

    #[test]
    fn test_bullet_marker_option() {
        let options = Options {
            bullet_list_marker: "*".to_string(),
            ..Default::default()
        };
        let result = convert_with(&options, "<ul><li>x</li></ul>", &Article::default());
        assert_eq!(result.markdown, "* x\n");
    }

    #[test]
    fn test_ordered_list_numbering_and_start() {
        assert_eq!(
            convert_html_for_test("<ol><li>a</li><li>b</li></ol>"),
            "1. a\n2. b\n"
        );
        assert_eq!(
            convert_html_for_test("<ol start=\"9\"><li>a</li><li>b</li></ol>"),
            "9. a\n10. b\n"
        );
    }

    #[test]
    fn test_nested_list() {
        assert_eq!(
            convert_html_for_test("<ul><li>A<ul><li>B</li><li>C</li></ul></li><li>D</li></ul>"),
            "- A\n  - B\n  - C\n- D\n"
        );
    }

    #[test]
    fn test_code_block_with_language() {
        let html = "<pre><code class=\"language-rust\">fn main() {\n    println!(\"hi\");\n}\n</code></pre>";
        assert_eq!(
            convert_html_for_test(html),
            "```rust\nfn main() {\n    println!(\"hi\");\n}\n```\n"
        );
    }

    #[test]
    fn test_code_block_language_from_id() {
        let html = "<pre><code id=\"code-lang-python\">x = 1</code></pre>";
        assert_eq!(convert_html_for_test(html), "```python\nx = 1\n```\n");
    }

    #[test]
    fn test_code_block_class_beats_id() {
        let html =
            "<pre><code class=\"language-javascript\" id=\"code-lang-python\">x</code></pre>";
        assert_eq!(convert_html_for_test(html), "```javascript\nx\n```\n");
    }

    #[test]
    fn test_code_block_keeps_blank_lines_and_spacing() {
        let html = "<pre><code>a  =  1\n\n\n\nb</code></pre>";
        assert_eq!(convert_html_for_test(html), "```\na  =  1\n\n\n\nb\n```\n");
    }

    #[test]
    fn test_code_block_with_embedded_fence() {
        let html = "<pre><code>```\ninner\n```</code></pre>";
        assert_eq!(convert_html_for_test(html), "````\n```\ninner\n```\n````\n");
    }

    #[test]
    fn test_pre_without_code_child() {
        let html = "<pre class=\"language-go\">plain <b>text</b></pre>";
        assert_eq!(convert_html_for_test(html), "```\nplain text\n```\n");
    }

    #[test]
    fn test_highlighted_code_spans_flattened() {
        let html = "<pre><code class=\"lang-js\"><span class=\"k\">let</span> x<br>y</code></pre>";
        assert_eq!(convert_html_for_test(html), "```js\nlet x\ny\n```\n");
    }

    #[test]
    fn test_indented_code_blocks() {
        let options = Options {
            code_block_style: CodeBlockStyle::Indented,
            ..Default::default()
        };
        let result = convert_with(
            &options,
            "<p>x</p><pre><code class=\"language-rust\">let a = 1;\nlet b = 2;</code></pre>",
            &Article::default(),
        );
        assert_eq!(result.markdown, "x\n\n    let a = 1;\n    let b = 2;\n");
    }

    #[test]
    fn test_indented_code_keeps_blank_lines_and_trailing_spaces() {
        let options = Options {
            code_block_style: CodeBlockStyle::Indented,
            ..Default::default()
        };
        let result = convert_with(
            &options,
            "<pre><code>a  \n\n\n\nb</code></pre><p>after</p>",
            &Article::default(),
        );
        assert_eq!(result.markdown, "    a  \n\n\n\n    b\n\nafter\n");
    }

    #[test]
    fn test_code_block_in_blockquote_keeps_blank_lines() {
        assert_eq!(
            convert_html_for_test("<blockquote><pre><code>a\n\nb</code></pre></blockquote>"),
            "> ```\n> a\n>\n> b\n> ```\n"
        );
    }

    #[test]
    fn test_code_block_in_table_cell_is_flattened() {
        let markdown =
            convert_html_for_test("<table><tr><td><pre><code>x\ny</code></pre></td></tr></table>");
        assert!(markdown.contains("x"));
        assert!(!markdown.contains(CODE_LINE));
    }

    #[test]
    fn test_inline_code() {
        assert_eq!(
            convert_html_for_test("<p>Use <code>a_b*c</code> and <code>x`y</code></p>"),
            "Use `a_b*c` and ``x`y``\n"
        );
    }

    #[test]
    fn test_links_inlined_and_resolved() {
        let article = Article {
            base_uri: "https://example.com/blog/post".to_string(),
            ..Default::default()
        };
        let result = convert_with(
            &Options::default(),
            "<p><a href=\"/about\" title=\"About us\">About</a> <a href=\"next\">Next</a></p>",
            &article,
        );
        assert_eq!(
            result.markdown,
            "[About](https://example.com/about \"About us\") [Next](https://example.com/blog/next)\n"
        );
    }

    #[test]
    fn test_dangerous_link_becomes_text() {
        assert_eq!(
            convert_html_for_test("<p><a href=\"javascript:alert(1)\">click</a></p>"),
            "click\n"
        );
    }

    #[test]
    fn test_link_without_href() {
        assert_eq!(convert_html_for_test("<p><a>anchor</a></p>"), "anchor\n");
    }

    #[test]
    fn test_referenced_links() {
        let options = Options {
            link_style: LinkStyle::Referenced,
            ..Default::default()
        };
        let html = "<p><a href=\"https://a.test/x\">A</a> and <a href=\"https://b.test/y\">B</a></p>";
        let result = convert_with(&options, html, &Article::default());
        assert_eq!(
            result.markdown,
            "[A][1] and [B][2]\n\n[1]: https://a.test/x\n[2]: https://b.test/y\n"
        );

        let shortcut = Options {
            link_style: LinkStyle::Referenced,
            link_reference_style: LinkReferenceStyle::Shortcut,
            ..Default::default()
        };
        let result = convert_with(&shortcut, "<p><a href=\"https://a.test/x\">A</a></p>", &Article::default());
        assert_eq!(result.markdown, "[A]\n\n[A]: https://a.test/x\n");
    }

    #[test]
    fn test_strip_links() {
        let options = Options {
            link_style: LinkStyle::StripLinks,
            ..Default::default()
        };
        let result = convert_with(
            &options,
            "<p>See <a href=\"https://a.test\">this page</a>.</p>",
            &Article::default(),
        );
        assert_eq!(result.markdown, "See this page.\n");
    }

    #[test]
    fn test_image_inline_without_download() {
        let result = convert_with(
            &Options::default(),
            "<p><img src=\"https://x.test/a.png\" alt=\"A\" title=\"T\"></p>",
            &Article::default(),
        );
        assert_eq!(result.markdown, "![A](https://x.test/a.png \"T\")\n");
        assert!(result.image_list.is_empty());
    }

    #[test]
    fn test_image_download_renames_locally() {
        let options = Options {
            download_images: true,
            ..Default::default()
        };
        let article = Article {
            page_title: "My Page".to_string(),
            base_uri: "https://x.test/post/".to_string(),
            ..Default::default()
        };
        let result = convert_with(
            &options,
            "<img src=\"img/a.png?w=1\" alt=\"A\"><img src=\"/other/a.png\">",
            &article,
        );
        assert_eq!(
            result.markdown,
            "![A](My%20Page/a.png)![](My%20Page/a.1.png)\n"
        );
        let entries: Vec<_> = result.image_list.iter().collect();
        assert_eq!(
            entries,
            vec![
                ("https://x.test/post/img/a.png?w=1", "My Page/a.png"),
                ("https://x.test/other/a.png", "My Page/a.1.png"),
            ]
        );
    }

    #[test]
    fn test_original_source_style_downloads_but_keeps_url() {
        let options = Options {
            download_images: true,
            image_style: ImageStyle::OriginalSource,
            image_prefix: String::new(),
            ..Default::default()
        };
        let result = convert_with(&options, "<img src=\"https://x.test/a.png\">", &Article::default());
        assert_eq!(result.markdown, "![](https://x.test/a.png)\n");
        assert_eq!(result.image_list.get("https://x.test/a.png"), Some("a.png"));
    }

    #[test]
    fn test_obsidian_styles() {
        let article = Article::with_page_title("Clip");
        for (style, expected) in [
            (ImageStyle::Obsidian, "![[Clip/a.png]]\n"),
            (ImageStyle::ObsidianNoFolder, "![[a.png]]\n"),
        ] {
            let options = Options {
                download_images: true,
                image_style: style,
                ..Default::default()
            };
            let result = convert_with(&options, "<img src=\"https://x.test/a.png\">", &article);
            assert_eq!(result.markdown, expected);
        }
    }

    #[test]
    fn test_no_image_style() {
        let options = Options {
            download_images: true,
            image_style: ImageStyle::NoImage,
            ..Default::default()
        };
        let result = convert_with(&options, "<p>a<img src=\"https://x.test/a.png\">b</p>", &Article::default());
        assert_eq!(result.markdown, "ab\n");
        assert!(result.image_list.is_empty());
    }

    #[test]
    fn test_unsafe_images_skipped() {
        assert_eq!(
            convert_html_for_test("<p>x<img src=\"javascript:alert(1)\"><img></p>"),
            "x\n"
        );
    }

    #[test]
    fn test_data_uri_image_named_by_mime() {
        let options = Options {
            download_images: true,
            image_prefix: String::new(),
            ..Default::default()
        };
        let src = "data:image/gif;base64,R0lGODlhAQABAAAAACw=";
        let result = convert_with(&options, &format!("<img src=\"{src}\">"), &Article::default());
        assert_eq!(result.image_list.get(src), Some("image.gif"));
        assert_eq!(result.markdown, "![](image.gif)\n");
    }

    #[test]
    fn test_reference_numbering_restarts_per_call() {
        let options = Options {
            image_style: ImageStyle::Referenced,
            ..Default::default()
        };
        let renderer = MarkdownRenderer::from_options(&options);
        let html = "<p><img src=\"https://x.test/a.png\"><img src=\"https://x.test/b.png\"></p>";
        let first = renderer.convert(html, &Article::default());
        let second = renderer.convert(html, &Article::default());
        assert_eq!(first, second);
        assert!(second.markdown.contains("[fig1]: https://x.test/a.png"));
        assert!(!second.markdown.contains("fig3"));
    }

    #[test]
    fn test_table_conversion() {
        let html = "<table><tr><th>Name</th><th align=\"right\">Age</th><th style=\"text-align: center\">C</th></tr>\
                    <tr><td>Ann</td><td>31</td><td>a|b</td></tr><tr><td>Bob</td></tr></table>";
        assert_eq!(
            convert_html_for_test(html),
            "| Name | Age | C |\n| --- | ---: | :---: |\n| Ann | 31 | a\\|b |\n| Bob |  |  |\n"
        );
    }

    #[test]
    fn test_table_with_thead() {
        let html = "<table><tbody><tr><td>1</td></tr></tbody><thead><tr><th>H</th></tr></thead></table>";
        assert_eq!(convert_html_for_test(html), "| H |\n| --- |\n| 1 |\n");
    }

    #[test]
    fn test_block_containers_separate() {
        assert_eq!(
            convert_html_for_test("<div>one</div><div>two</div><span>three</span>"),
            "one\n\ntwo\n\nthree\n"
        );
    }

    #[test]
    fn test_depth_limit_flattens() {
        let renderer =
            MarkdownRenderer::new().with_security_validator(SecurityValidator::with_max_depth(3));
        let result = renderer.convert(
            "<div><div><div><div><p>deep <b>text</b></p></div></div></div></div>",
            &Article::default(),
        );
        assert_eq!(result.markdown, "deep text\n");
    }

    #[test]
    fn test_normalize_output() {
        assert_eq!(normalize_output("\n\nA  \r\n\r\n\r\nB   \n\n"), "A\n\nB\n");
        assert_eq!(normalize_output("a  \nb"), "a  \nb\n");
        let code = mark_code_lines("~~~~\nx   \n\n\n~~~\n~~~~");
        assert_eq!(
            normalize_output(&format!("{code}\n\n\nafter")),
            "~~~~\nx   \n\n\n~~~\n~~~~\n\nafter\n"
        );
        let quoted = mark_code_lines("a\n\nb").replace('\n', "\n> ");
        assert_eq!(normalize_output(&format!("> {quoted}")), "> a\n>\n> b\n");
    }

    #[test]
    fn test_deterministic_output() {
        let html = "<h1>T</h1><ul><li>a</li></ul><table><tr><td>x</td></tr></table>";
        assert_eq!(convert_html_for_test(html), convert_html_for_test(html));
    }

    proptest! {
        #[test]
        fn prop_convert_never_panics(html in ".{0,200}") {
            let markdown = convert_html_for_test(&html);
            prop_assert!(markdown.is_empty() || markdown.ends_with('\n'));
            prop_assert!(!markdown.ends_with("\n\n"));
        }

        #[test]
        fn prop_paragraph_text_is_preserved(words in prop::collection::vec("[a-zA-Z0-9]{1,10}", 1..10)) {
            let text = words.join(" ");
            let markdown = convert_html_for_test(&format!("<div><p>{text}</p></div>"));
            prop_assert_eq!(markdown, format!("{text}\n"));
        }
    }
}
