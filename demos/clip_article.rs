//! Clip an article end to end against a host that prints its downloads
//!
//! Run with `RUST_LOG=debug` to see option validation and export events.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use markclip::error::ExportError;
use markclip::export::{ContentRef, DownloadHost, DownloadId, ExportRequest};
use markclip::{Article, ExportOrchestrator, HostCapabilities, Options};
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// Prints every request; refuses images whose URL contains `missing`
#[derive(Default)]
struct PrintingHost {
    next_id: AtomicUsize,
}

#[async_trait]
impl DownloadHost for PrintingHost {
    async fn download(&self, request: ExportRequest) -> Result<DownloadId, ExportError> {
        match &request.content {
            ContentRef::Text { body, mime_type } => {
                println!("==> {} ({mime_type}, save as: {})", request.filename, request.save_as);
                println!("{body}");
            }
            ContentRef::Url(url) => {
                if url.contains("missing") {
                    return Err(ExportError::Host(format!("{url}: 404 Not Found")));
                }
                println!("==> {} <- {url}", request.filename);
            }
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(DownloadId(id.to_string()))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    // As an options page would store them; `title` has the wrong type
    let store = json!({
        "includeTemplate": true,
        "downloadImages": true,
        "imageStyle": "markdown",
        "frontmatter": "---\ntitle: {pageTitle}\nsource: {baseURI}\ntags: [{keywords}]\nclipped: {date:YYYY-MM-DD}\n---\n\n",
        "mdClipsFolder": "clips/{domain}",
        "title": 42,
    });
    let options = match store {
        serde_json::Value::Object(map) => Options::from_store(&map),
        _ => Options::default(),
    };

    let article = Article {
        page_title: "Making Sourdough: A Field Guide".into(),
        byline: "Sam Baker".into(),
        base_uri: "https://kitchen.example.org/guides/sourdough".into(),
        keywords: Some(vec!["bread".into(), "fermentation".into()]),
        content: r#"
            <h1>Making Sourdough</h1>
            <p>A starter needs <em>flour</em>, <em>water</em> and <strong>patience</strong>.</p>
            <p><img src="img/starter.jpg" alt="Starter"></p>
            <h2>Feeding schedule</h2>
            <table>
              <tr><th>Day</th><th align="right">Flour (g)</th></tr>
              <tr><td>1</td><td>50</td></tr>
              <tr><td>2</td><td>100</td></tr>
            </table>
            <pre><code class="language-python">ratio = flour / water
</code></pre>
            <p><img src="img/missing.jpg" alt="Crumb shot"></p>
        "#
        .into(),
        ..Default::default()
    };

    let host = Arc::new(PrintingHost::default());
    let orchestrator = ExportOrchestrator::new(HostCapabilities::new(host.clone(), host));
    let outcome = orchestrator.export_article(&article, &options).await;

    println!("---");
    println!("document: {} (success: {})", outcome.document_filename, outcome.success);
    for failed in outcome.failed_images() {
        if let Some(error) = &failed.error {
            println!("failed image {}: {error}", failed.resource);
        }
    }
    match serde_json::to_string_pretty(&outcome) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("cannot serialize outcome: {e}"),
    }
}
