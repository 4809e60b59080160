//! Term-frequency features from captured markup.
//!
//! ### Text
//! - Parse the document and walk it depth-first.
//! - Skip whole subtrees rooted at non-textual elements (see [`SKIPPED_TAGS`]).
//! - Join remaining text nodes with spaces.
//!
//! ### Normalization
//! - Lowercase, then replace ASCII punctuation with spaces.
//! - Split lines into phrase chunks on double spaces, drop empty chunks.
//!
//! ### Features
//! - Count whitespace-separated tokens across all chunks.

use scraper::{ElementRef, Html, node::Node};
use wbdiff_core::FeatureSet;

/// Elements whose content never contributes text.
pub const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "meta", "img", "audio", "video"];

const PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Extract the weighted feature set of an HTML document.
///
/// Empty or textless input yields an empty set, which callers treat as
/// "no usable signal".
pub fn extract_features(html: &str) -> FeatureSet {
    if html.trim().is_empty() {
        return FeatureSet::new();
    }

    let text = visible_text(html);
    let mut features = FeatureSet::new();
    for chunk in text_chunks(&text) {
        for token in chunk.split_whitespace() {
            *features.entry(token.to_string()).or_insert(0) += 1;
        }
    }
    features
}

/// Text nodes outside skipped elements, separated by single spaces.
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut buffer = String::new();
    collect_text(document.root_element(), &mut buffer);
    buffer.trim().to_string()
}

fn collect_text(element: ElementRef<'_>, buffer: &mut String) {
    if SKIPPED_TAGS.contains(&element.value().name()) {
        return;
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                buffer.push_str(text);
                buffer.push(' ');
            }
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, buffer);
                }
            }
            _ => {}
        }
    }
}

/// Lowercased, punctuation-free phrase chunks of `text`.
pub fn text_chunks(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if PUNCTUATION.contains(c) { ' ' } else { c })
        .collect();

    cleaned
        .lines()
        .flat_map(|line| line.trim().split("  "))
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(str::to_string)
        .collect()
}
