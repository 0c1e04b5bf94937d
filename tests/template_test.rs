//! Template rendering through the public API
//!
//! Covers titles, folder templates and the default front matter as an
//! embedding application would use them.

use chrono::DateTime;
use markclip::article::Article;
use markclip::options::{DEFAULT_FRONTMATTER, Options};
use markclip::template::text_replace;
use markclip::{generate_valid_file_name, ExportOrchestrator, HostCapabilities};
use proptest::prelude::*;
use std::sync::Arc;

mod common {
    use async_trait::async_trait;
    use markclip::error::ExportError;
    use markclip::export::{DownloadHost, DownloadId, ExportRequest};

    pub struct NullHost;

    #[async_trait]
    impl DownloadHost for NullHost {
        async fn download(&self, request: ExportRequest) -> Result<DownloadId, ExportError> {
            Ok(DownloadId(request.filename))
        }
    }
}

fn article() -> Article {
    Article {
        title: "Ownership".into(),
        page_title: "Understanding Ownership | The Book".into(),
        byline: "Ann Author".into(),
        excerpt: "Short.".into(),
        base_uri: "https://doc.example.org/book/ch04".into(),
        keywords: Some(vec!["rust".into(), "memory".into()]),
        captured_at: Some(
            DateTime::parse_from_rfc3339("2024-03-05T14:07:09+01:00").expect("valid timestamp"),
        ),
        ..Default::default()
    }
}

fn orchestrator() -> ExportOrchestrator {
    ExportOrchestrator::new(HostCapabilities::content_link_only(Arc::new(common::NullHost)))
}

#[test]
fn test_blank_template_renders_page_title() {
    let a = Article::with_page_title("X");
    assert_eq!(text_replace(Some(""), &a, None), "X");
}

#[test]
fn test_symbol_only_result_falls_back_to_page_title() {
    let a = Article::with_page_title("X");
    assert_eq!(text_replace(Some("!!!"), &a, None), "X");
}

#[test]
fn test_escaped_braces_round_trip() {
    assert_eq!(
        text_replace(Some("\\{pageTitle\\}"), &Article::default(), None),
        "{pageTitle}"
    );
}

#[test]
fn test_default_title_is_filename_safe() {
    let title = orchestrator().clip_title(&article(), &Options::default());
    assert_eq!(title, "Understanding Ownership The Book");
    assert_eq!(generate_valid_file_name(&title, None), title);
}

#[test]
fn test_title_with_date_and_domain() {
    let options = Options {
        title: "{date:YYYY-MM-DD} {domain} {title:snake}".into(),
        ..Default::default()
    };
    assert_eq!(
        orchestrator().clip_title(&article(), &options),
        "2024-03-05 doc.example.org ownership"
    );
}

#[test]
fn test_default_front_matter() {
    let rendered = text_replace(Some(DEFAULT_FRONTMATTER), &article(), None);
    assert_eq!(
        rendered,
        "---\n\
         created: 2024-03-05T14:07:09 (UTC +01:00)\n\
         tags: [rust, memory]\n\
         source: https://doc.example.org/book/ch04\n\
         author: Ann Author\n\
         ---\n\
         \n\
         # Understanding Ownership | The Book\n\
         \n\
         > ## Excerpt\n\
         > Short.\n\
         \n\
         ---\n\
         \n"
    );
}

#[test]
fn test_front_matter_joins_body() {
    let options = Options {
        include_template: true,
        frontmatter: "# {pageTitle:upper}\n\n".into(),
        backmatter: "\n_Clipped from {domain}_\n".into(),
        ..Default::default()
    };
    let article = Article {
        content: "<p>Body text.</p>".into(),
        ..article()
    };
    let result = orchestrator().convert_article_to_markdown(&article, &options);
    assert_eq!(
        result.markdown,
        "# UNDERSTANDING OWNERSHIP | THE BOOK\n\nBody text.\n\n_Clipped from doc.example.org_\n"
    );
}

#[test]
fn test_script_in_values_is_stripped() {
    let a = Article::with_page_title("Hi<script>alert(1)</script> there");
    let out = text_replace(Some("{pageTitle}"), &a, None);
    assert!(!out.contains("script"));
    assert!(!out.contains("alert"));
    assert!(out.contains("Hi"));
}

proptest! {
    #[test]
    fn prop_title_never_contains_disallowed(title in "\\PC{0,60}") {
        let a = Article::with_page_title(title);
        let out = text_replace(Some("{pageTitle} [x] #y ^z"), &a, Some("[]#^"));
        prop_assert!(!out.contains(['[', ']', '#', '^']));
        prop_assert!(!out.is_empty());
    }
}
