//! HTML5 parser using html5ever
//!
//! Article bodies come from arbitrary web pages, so they are parsed with
//! html5ever, which implements the WHATWG parsing algorithm: every input,
//! however broken, produces a tree, the same tree a browser would build.
//!
//! # Examples
//!
//! ```rust
//! use markclip::parser::{parse_html, text_content};
//!
//! // Misnested and unclosed tags are repaired, never rejected
//! let dom = parse_html("<div><p>text</div></p>");
//! assert_eq!(text_content(&dom.document), "text");
//! ```
//!
//! # Configuration
//!
//! The parser uses default html5ever configuration:
//! - **Scripting**: Disabled (scripts are not executed, `<noscript>` is parsed)
//! - **Error Handling**: Parse errors are collected by the tree builder and
//!   ignored
//! - **Tree Builder**: `RcDom` reference-counted nodes

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

/// Parse an HTML string into a DOM tree
///
/// Never fails. Fragments without `<html>`/`<body>` are wrapped the way a
/// browser would wrap them.
pub fn parse_html(html: &str) -> RcDom {
    parse_document(RcDom::default(), Default::default()).one(html)
}

/// Value of attribute `attr` on an element node
pub fn get_attr(node: &Handle, attr: &str) -> Option<String> {
    if let NodeData::Element { ref attrs, .. } = node.data {
        attrs
            .borrow()
            .iter()
            .find(|a| a.name.local.as_ref() == attr)
            .map(|a| a.value.to_string())
    } else {
        None
    }
}

/// Local name of an element node
pub fn tag_name(node: &Handle) -> Option<String> {
    match node.data {
        NodeData::Element { ref name, .. } => Some(name.local.as_ref().to_string()),
        _ => None,
    }
}

/// Concatenated text of all descendant text nodes, unnormalized
///
/// Walks with an explicit stack, so nesting depth is bounded only by memory.
pub fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    let mut stack = vec![node.clone()];
    while let Some(node) = stack.pop() {
        match node.data {
            NodeData::Text { ref contents } => out.push_str(&contents.borrow()),
            _ => stack.extend(node.children.borrow().iter().rev().cloned()),
        }
    }
    out
}
