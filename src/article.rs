//! The extracted article record
//!
//! An [`Article`] is produced by the content extractor outside this crate and
//! is treated as read-only input. Deserialization is lenient: extractors are
//! free to send `null` for any string field or a non-array `keywords`, and
//! both simply read as empty.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use url::Url;

/// Extracted web page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Article {
    /// Title chosen by the extractor
    #[serde(deserialize_with = "lenient_string")]
    pub title: String,
    /// Title of the page as shown by the browser
    #[serde(deserialize_with = "lenient_string")]
    pub page_title: String,
    /// Extracted HTML body
    #[serde(deserialize_with = "lenient_string")]
    pub content: String,
    #[serde(deserialize_with = "lenient_string")]
    pub text_content: String,
    #[serde(deserialize_with = "lenient_string")]
    pub excerpt: String,
    #[serde(deserialize_with = "lenient_string")]
    pub byline: String,
    /// Address the page was loaded from
    #[serde(rename = "baseURI", deserialize_with = "lenient_string")]
    pub base_uri: String,
    /// Meta keywords, absent when the page has none
    #[serde(deserialize_with = "lenient_keywords")]
    pub keywords: Option<Vec<String>>,
    #[serde(deserialize_with = "lenient_string")]
    pub site_name: String,
    pub published_time: Option<String>,
    /// Moment of capture used by `{date:...}`; the local clock when absent
    pub captured_at: Option<DateTime<FixedOffset>>,
}

/// Fields derived from [`Article::base_uri`]
pub const URL_FIELDS: &[&str] = &[
    "domain", "host", "hostname", "origin", "pathname", "protocol", "port", "search", "hash",
];

impl Article {
    /// Create an article with the given page title
    pub fn with_page_title(page_title: impl Into<String>) -> Self {
        Self {
            page_title: page_title.into(),
            ..Default::default()
        }
    }

    /// Parsed base URI, if it is an absolute URL
    pub fn base_url(&self) -> Option<Url> {
        Url::parse(self.base_uri.trim()).ok()
    }

    /// Look up a substitutable text field by its template name
    ///
    /// Returns `None` for names that are not template fields, including
    /// `content`, `keywords` and `date` which the template engine handles
    /// itself.
    ///
    /// ```
    /// use markclip::article::Article;
    ///
    /// let article = Article {
    ///     page_title: "Hello".into(),
    ///     base_uri: "https://www.example.com:8080/a/b?q=1#top".into(),
    ///     ..Default::default()
    /// };
    /// assert_eq!(article.field("pageTitle").as_deref(), Some("Hello"));
    /// assert_eq!(article.field("domain").as_deref(), Some("www.example.com"));
    /// assert_eq!(article.field("host").as_deref(), Some("www.example.com:8080"));
    /// assert_eq!(article.field("content"), None);
    /// ```
    pub fn field(&self, name: &str) -> Option<String> {
        let value = match name {
            "title" => self.title.clone(),
            "pageTitle" => self.page_title.clone(),
            "textContent" => self.text_content.clone(),
            "excerpt" => self.excerpt.clone(),
            "byline" => self.byline.clone(),
            "baseURI" => self.base_uri.clone(),
            "siteName" => self.site_name.clone(),
            "publishedTime" => self.published_time.clone().unwrap_or_default(),
            _ if URL_FIELDS.contains(&name) => self.url_field(name),
            _ => return None,
        };
        Some(value)
    }

    /// A URL-derived field, empty when the base URI does not parse
    fn url_field(&self, name: &str) -> String {
        let Some(url) = self.base_url() else {
            return String::new();
        };
        let hostname = url.host_str().unwrap_or_default().to_string();
        match name {
            "domain" | "hostname" => hostname,
            "host" => match url.port() {
                Some(port) => format!("{}:{}", hostname, port),
                None => hostname,
            },
            "origin" => url.origin().ascii_serialization(),
            "pathname" => url.path().to_string(),
            "protocol" => format!("{}:", url.scheme()),
            "port" => url.port().map(|p| p.to_string()).unwrap_or_default(),
            "search" => url.query().map(|q| format!("?{}", q)).unwrap_or_default(),
            "hash" => url
                .fragment()
                .map(|f| format!("#{}", f))
                .unwrap_or_default(),
            _ => String::new(),
        }
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(_) | Value::Object(_) => String::new(),
    })
}

fn lenient_keywords<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    })
}
