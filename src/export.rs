//! Export orchestration: article -> Markdown document + images -> host
//!
//! The orchestrator owns no I/O of its own. Everything that leaves the
//! process goes through a [`DownloadHost`], an async capability supplied by
//! the embedding application when the orchestrator is built. Two capabilities
//! exist:
//!
//! - the **downloads API**, which receives text content directly
//! - the **content link** fallback, which receives a `data:` URI the UI
//!   layer turns into a link click
//!
//! The mode is resolved once per export and never re-derived midway.
//!
//! # Failure isolation
//!
//! Every resource (the document, then each image) is its own unit of
//! failure. The outcome's `success` reflects the document only; failed images
//! are listed in [`ExportOutcome::per_resource_results`] and never cancel the
//! document or each other.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use markclip::error::ExportError;
//! use markclip::export::{DownloadHost, DownloadId, ExportOrchestrator, ExportRequest, HostCapabilities};
//! use markclip::{Article, Options};
//!
//! struct Accepting;
//!
//! #[async_trait]
//! impl DownloadHost for Accepting {
//!     async fn download(&self, request: ExportRequest) -> Result<DownloadId, ExportError> {
//!         Ok(DownloadId(request.filename))
//!     }
//! }
//!
//! # futures::executor::block_on(async {
//! let orchestrator = ExportOrchestrator::new(HostCapabilities::content_link_only(Arc::new(Accepting)));
//! let article = Article {
//!     page_title: "Hello: World".to_string(),
//!     content: "<p>Hi</p>".to_string(),
//!     ..Default::default()
//! };
//! let outcome = orchestrator.export_article(&article, &Options::default()).await;
//! assert!(outcome.success);
//! assert_eq!(outcome.document_filename, "Hello World.md");
//! # });
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Serialize, Serializer};
use tracing::{info, warn};

use crate::article::Article;
use crate::converter::{ConversionResult, MarkdownRenderer};
use crate::error::ExportError;
use crate::filename::{generate_valid_file_name, sanitize_relative_path};
use crate::images::ImageList;
use crate::options::{DownloadMode, Options};
use crate::template::{FALLBACK_NAME, text_replace};

/// MIME type of exported documents
pub const MARKDOWN_MIME_TYPE: &str = "text/markdown;charset=utf-8";

/// Everything `encodeURIComponent` leaves alone stays unescaped
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Opaque identifier the host returns for an accepted download
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DownloadId(pub String);

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a download request carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentRef {
    /// Inline content with its MIME type
    Text { body: String, mime_type: String },
    /// A URL the host fetches (remote image or `data:` URI)
    Url(String),
}

/// One request to the host download capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub content: ContentRef,
    /// Path relative to the host's download root
    pub filename: String,
    /// Ask the user where to save
    pub save_as: bool,
}

/// Host-side download capability
#[async_trait]
pub trait DownloadHost: Send + Sync {
    /// Start a download, returning the host's identifier on success
    async fn download(&self, request: ExportRequest) -> Result<DownloadId, ExportError>;
}

/// Download capabilities available in the host
#[derive(Clone)]
pub struct HostCapabilities {
    /// Direct file-download API, absent on hosts that lack it
    pub downloads_api: Option<Arc<dyn DownloadHost>>,
    /// Data-URI link fallback, always present
    pub content_link: Arc<dyn DownloadHost>,
}

impl HostCapabilities {
    /// Host with both capabilities
    pub fn new(downloads_api: Arc<dyn DownloadHost>, content_link: Arc<dyn DownloadHost>) -> Self {
        Self {
            downloads_api: Some(downloads_api),
            content_link,
        }
    }

    /// Host without a downloads API
    pub fn content_link_only(content_link: Arc<dyn DownloadHost>) -> Self {
        Self {
            downloads_api: None,
            content_link,
        }
    }

    /// Resolve the requested mode against what the host provides
    pub fn select(&self, requested: DownloadMode) -> (DownloadMode, Arc<dyn DownloadHost>) {
        match (requested, &self.downloads_api) {
            (DownloadMode::DownloadsApi, Some(api)) => (DownloadMode::DownloadsApi, Arc::clone(api)),
            (DownloadMode::DownloadsApi, None) => {
                warn!("Downloads API unavailable, falling back to content link");
                (DownloadMode::ContentLink, Arc::clone(&self.content_link))
            }
            (DownloadMode::ContentLink, _) => {
                (DownloadMode::ContentLink, Arc::clone(&self.content_link))
            }
        }
    }
}

impl fmt::Debug for HostCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCapabilities")
            .field("downloads_api", &self.downloads_api.is_some())
            .field("content_link", &true)
            .finish()
    }
}

/// A resource in an export
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Document,
    /// Image, by source URL
    Image(String),
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Document => f.write_str("document"),
            Resource::Image(src) => f.write_str(src),
        }
    }
}

impl Serialize for Resource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn serialize_error<S: Serializer>(
    error: &Option<ExportError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(error) => serializer.collect_str(error),
        None => serializer.serialize_none(),
    }
}

/// Result of exporting one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceResult {
    pub resource: Resource,
    pub filename: String,
    pub success: bool,
    #[serde(serialize_with = "serialize_error", skip_serializing_if = "Option::is_none")]
    pub error: Option<ExportError>,
}

/// Structured report of one export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOutcome {
    /// The document export succeeded
    pub success: bool,
    pub document_filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_id: Option<DownloadId>,
    /// Document error text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Capability actually used
    pub mode: DownloadMode,
    /// Document first, then images in image list order
    pub per_resource_results: Vec<ResourceResult>,
}

impl ExportOutcome {
    /// Images whose export failed
    pub fn failed_images(&self) -> impl Iterator<Item = &ResourceResult> {
        self.per_resource_results
            .iter()
            .filter(|r| !r.success && matches!(r.resource, Resource::Image(_)))
    }

    /// Document succeeded but some images did not
    pub fn is_partial(&self) -> bool {
        self.success && self.failed_images().next().is_some()
    }
}

/// Input of [`ExportOrchestrator::download`]
#[derive(Debug, Clone)]
pub struct DownloadData {
    /// Complete document (front matter, body, back matter)
    pub markdown: String,
    /// Document title, sanitized into the filename
    pub title: String,
    pub image_list: ImageList,
    /// Rendered folder template; its segments are sanitized here
    pub md_clips_folder: Option<String>,
    pub options: Options,
}

/// Converts articles and exports the result through the host
#[derive(Debug, Clone)]
pub struct ExportOrchestrator {
    capabilities: HostCapabilities,
}

impl ExportOrchestrator {
    pub fn new(capabilities: HostCapabilities) -> Self {
        Self { capabilities }
    }

    pub fn capabilities(&self) -> &HostCapabilities {
        &self.capabilities
    }

    /// Front matter + rendered body + back matter
    ///
    /// The templates apply only with `include_template`; otherwise both are
    /// empty whatever is configured.
    pub fn convert_article_to_markdown(&self, article: &Article, options: &Options) -> ConversionResult {
        let options = options.clone().validated();
        let (frontmatter, backmatter) = if options.include_template {
            (
                render_matter(&options.frontmatter, article),
                render_matter(&options.backmatter, article),
            )
        } else {
            (String::new(), String::new())
        };

        let body = MarkdownRenderer::from_options(&options).convert(&article.content, article);
        ConversionResult {
            markdown: format!("{frontmatter}{}{backmatter}", body.markdown),
            image_list: body.image_list,
        }
    }

    /// Document title from the `title` template
    pub fn clip_title(&self, article: &Article, options: &Options) -> String {
        let options = options.clone().validated();
        text_replace(Some(&options.title), article, options.disallowed())
    }

    /// Export the document, then its images
    ///
    /// The document request is awaited first. Images are then issued
    /// together, each under the clips folder, and every failure is recorded
    /// against its own resource.
    pub async fn download(&self, data: DownloadData) -> ExportOutcome {
        let DownloadData {
            markdown,
            title,
            image_list,
            md_clips_folder,
            options,
        } = data;
        let options = options.validated();
        let disallowed = options.disallowed();
        let (mode, host) = self.capabilities.select(options.download_mode);

        let folder = md_clips_folder
            .as_deref()
            .map(|folder| sanitize_relative_path(folder, disallowed))
            .unwrap_or_default();
        let document_filename = in_folder(&folder, &document_file_name(&title, disallowed));

        info!(
            filename = %document_filename,
            images = image_list.len(),
            mode = ?mode,
            "Starting export"
        );

        let request = ExportRequest {
            content: document_content(mode, markdown),
            filename: document_filename.clone(),
            save_as: options.save_as,
        };
        let document = host.download(request).await;

        let mut results = Vec::with_capacity(image_list.len() + 1);
        let (success, download_id, error) = match document {
            Ok(id) => {
                results.push(ResourceResult {
                    resource: Resource::Document,
                    filename: document_filename.clone(),
                    success: true,
                    error: None,
                });
                (true, Some(id), None)
            }
            Err(e) => {
                warn!(resource = "document", filename = %document_filename, error = %e, "Export failed");
                let message = e.to_string();
                results.push(ResourceResult {
                    resource: Resource::Document,
                    filename: document_filename.clone(),
                    success: false,
                    error: Some(e),
                });
                (false, None, Some(message))
            }
        };

        let image_exports = image_list.iter().map(|(src, local)| {
            let host = Arc::clone(&host);
            let filename = in_folder(&folder, local);
            async move {
                let request = ExportRequest {
                    content: ContentRef::Url(src.to_string()),
                    filename: filename.clone(),
                    save_as: false,
                };
                let result = host.download(request).await;
                (src, filename, result)
            }
        });

        for (src, filename, result) in join_all(image_exports).await {
            let error = match result {
                Ok(_) => None,
                Err(e) => {
                    warn!(resource = %src, filename = %filename, error = %e, "Export failed");
                    Some(e)
                }
            };
            results.push(ResourceResult {
                resource: Resource::Image(src.to_string()),
                filename,
                success: error.is_none(),
                error,
            });
        }

        let outcome = ExportOutcome {
            success,
            document_filename,
            download_id,
            error,
            mode,
            per_resource_results: results,
        };
        info!(
            filename = %outcome.document_filename,
            success = outcome.success,
            failed_images = outcome.failed_images().count(),
            "Export finished"
        );
        outcome
    }

    /// Convert, title and download an article in one call
    pub async fn export_article(&self, article: &Article, options: &Options) -> ExportOutcome {
        let options = options.clone().validated();
        let conversion = self.convert_article_to_markdown(article, &options);
        let title = self.clip_title(article, &options);
        let md_clips_folder = options
            .md_clips_folder
            .as_deref()
            .filter(|folder| !folder.trim().is_empty())
            .map(|folder| text_replace(Some(folder), article, options.disallowed()));

        self.download(DownloadData {
            markdown: conversion.markdown,
            title,
            image_list: conversion.image_list,
            md_clips_folder,
            options,
        })
        .await
    }
}

fn render_matter(template: &str, article: &Article) -> String {
    if template.trim().is_empty() {
        String::new()
    } else {
        text_replace(Some(template), article, None)
    }
}

/// `<sanitized title>.md`
fn document_file_name(title: &str, disallowed: Option<&str>) -> String {
    let name = generate_valid_file_name(title, disallowed);
    if name.is_empty() {
        format!("{FALLBACK_NAME}.md")
    } else {
        format!("{name}.md")
    }
}

fn in_folder(folder: &str, filename: &str) -> String {
    if folder.is_empty() {
        filename.to_string()
    } else {
        format!("{folder}/{filename}")
    }
}

fn document_content(mode: DownloadMode, markdown: String) -> ContentRef {
    match mode {
        DownloadMode::DownloadsApi => ContentRef::Text {
            body: markdown,
            mime_type: MARKDOWN_MIME_TYPE.to_string(),
        },
        DownloadMode::ContentLink => ContentRef::Url(markdown_data_uri(&markdown)),
    }
}

/// `data:` URI carrying a Markdown document
///
/// ```
/// use markclip::export::markdown_data_uri;
///
/// assert_eq!(markdown_data_uri("# Hi!\n"), "data:text/markdown;charset=utf-8,%23%20Hi!%0A");
/// ```
pub fn markdown_data_uri(markdown: &str) -> String {
    format!(
        "data:{MARKDOWN_MIME_TYPE},{}",
        utf8_percent_encode(markdown, URI_COMPONENT)
    )
}
