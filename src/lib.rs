//! markclip - Web Article to Markdown Clipping Engine
//!
//! This library turns an extracted web article into a Markdown document with
//! templated front matter, sanitized filenames and a list of images to
//! export, then hands document and images to a host download capability.
//!
//! # Architecture
//!
//! The library is structured into several modules:
//! - `options`: Clipping options and defensive loading from a key/value store
//! - `article`: The extracted article record
//! - `filename`: Filename sanitization as ordered, named passes
//! - `template`: `{placeholder}` templates for titles, folders and front matter
//! - `parser`: HTML5 parsing using html5ever
//! - `converter`: Markdown generation from the DOM tree
//! - `escape`: Markdown escaping of page text
//! - `code_block`: Code block formatters and language detection
//! - `images`: Image formatters, local filenames and the image list
//! - `security`: Element and URL denylists, script stripping
//! - `export`: Export orchestration over host download capabilities
//!
//! # Failure model
//!
//! Templating, rendering and sanitization always produce a result. Only the
//! export step fails, per resource, and failures are reported in an
//! [`ExportOutcome`] rather than returned as errors.

// Module declarations
pub mod article;
pub mod code_block;
pub mod converter;
pub mod error;
pub mod escape;
pub mod export;
pub mod filename;
pub mod images;
pub mod options;
pub mod parser;
pub mod security;
pub mod template;

// Re-export main types for convenience
pub use article::Article;
pub use converter::{ConversionResult, MarkdownRenderer};
pub use error::{ExportError, ValidationError};
pub use export::{DownloadData, DownloadHost, ExportOrchestrator, ExportOutcome, HostCapabilities};
pub use filename::generate_valid_file_name;
pub use images::ImageList;
pub use options::Options;
pub use parser::parse_html;
pub use template::text_replace;
