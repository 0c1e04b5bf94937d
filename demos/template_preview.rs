//! Preview title and folder templates against a sample article
//!
//! Usage: `cargo run --example template_preview -- "{date:YYYY}/{pageTitle:kebab}"`

use chrono::DateTime;
use markclip::template::text_replace;
use markclip::{generate_valid_file_name, Article};

const SAMPLES: &[&str] = &[
    "{pageTitle}",
    "{date:YYYY-MM-DD} {pageTitle:snake}",
    "{domain}/{title:kebab}",
    "{byline:upper} - {siteName}",
    "tags: {keywords:\\n- }",
    "\\{pageTitle\\}",
    "{unknown} stays",
    "!!!",
];

fn main() {
    let article = Article {
        title: "Sourdough Basics".into(),
        page_title: "Making Sourdough: A Field Guide | Kitchen".into(),
        byline: "Sam Baker".into(),
        site_name: "Kitchen".into(),
        base_uri: "https://kitchen.example.org/guides/sourdough?ref=home".into(),
        keywords: Some(vec!["bread".into(), "fermentation".into()]),
        captured_at: DateTime::parse_from_rfc3339("2024-06-01T08:30:00+02:00").ok(),
        ..Default::default()
    };

    let templates: Vec<String> = std::env::args().skip(1).collect();
    let templates: Vec<&str> = if templates.is_empty() {
        SAMPLES.to_vec()
    } else {
        templates.iter().map(String::as_str).collect()
    };

    for template in templates {
        let plain = text_replace(Some(template), &article, None);
        let filename = text_replace(Some(template), &article, Some("[]#^"));
        println!("template : {template}");
        println!("text     : {plain}");
        println!("filename : {}", generate_valid_file_name(&filename, Some("[]#^")));
        println!();
    }
}
