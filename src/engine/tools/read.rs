// ── read_url: fetch → readable text → character window ─────────────────

use super::ToolsService;
use crate::atoms::error::EngineResult;
use crate::atoms::types::ReadResult;
use crate::engine::text::char_slice;
use log::info;
use scraper::{ElementRef, Html, Node, Selector};

impl ToolsService {
    /// Fetch `url` through the proxy pool and return the window
    /// `[start, start + length)` of its readable text.
    pub async fn read_url(
        &self,
        url: &str,
        start: usize,
        length: usize,
    ) -> EngineResult<ReadResult> {
        info!("[tools] read {} start={} length={}", url, start, length);
        let body = self
            .proxies
            .fetch_text(self.fetcher.as_ref(), url, Some(self.request_timeout))
            .await?;
        Ok(window(url, &body, start, length))
    }
}

/// Reduce a fetched body to text and slice it.
pub fn window(url: &str, body: &str, start: usize, length: usize) -> ReadResult {
    let (title, text) = if looks_like_html(body) {
        extract_page(body)
    } else {
        (None, body.to_string())
    };
    let total_length = text.chars().count();
    ReadResult {
        url: url.to_string(),
        title,
        snippet: char_slice(&text, start, length),
        start,
        length,
        total_length,
        has_more: start.saturating_add(length) < total_length,
    }
}

/// Plain-text bodies pass through untouched; only markup is reduced.
pub fn looks_like_html(body: &str) -> bool {
    let head: String = body.trim_start().chars().take(512).collect::<String>().to_ascii_lowercase();
    head.starts_with("<!doctype html")
        || head.starts_with("<html")
        || head.contains("<body")
        || head.contains("<head")
        || (head.starts_with('<') && head.contains("</"))
}

/// `(title, readable text)` of an HTML document. Tries `<article>`,
/// `<main>` and common content containers, then block-level elements of
/// `<body>`, then all body text.
pub fn extract_page(html: &str) -> (Option<String>, String) {
    let document = Html::parse_document(html);
    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|el| collapse(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty());
    (title, extract_readable_text(&document))
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of an element, skipping script/style/noscript subtrees.
fn extract_text_from_element(element: &ElementRef) -> String {
    let mut text = String::new();
    for node in element.descendants() {
        let Node::Text(t) = node.value() else { continue };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript" | "template"))
        });
        if hidden {
            continue;
        }
        let trimmed = t.trim();
        if !trimmed.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(trimmed);
        }
    }
    text
}

const READABLE_CONTAINERS: [&str; 6] =
    ["article", "main", "[role=main]", ".post-content", ".entry-content", ".article-body"];

fn extract_readable_text(document: &Html) -> String {
    for sel_str in READABLE_CONTAINERS {
        if let Ok(sel) = Selector::parse(sel_str) {
            let parts: Vec<String> = document
                .select(&sel)
                .map(|el| extract_text_from_element(&el))
                .filter(|t| !t.trim().is_empty())
                .collect();
            if !parts.is_empty() {
                return parts.join("\n\n");
            }
        }
    }

    let Ok(body_sel) = Selector::parse("body") else { return String::new() };
    let Some(body) = document.select(&body_sel).next() else { return String::new() };

    // Block-level elements in document order; very short fragments are
    // usually navigation.
    let mut paragraphs = Vec::new();
    if let Ok(blocks) = Selector::parse("h1, h2, h3, h4, h5, h6, p, li, blockquote, pre, td") {
        for el in body.select(&blocks) {
            let text = extract_text_from_element(&el);
            if text.chars().count() > 20 {
                paragraphs.push(text);
            }
        }
    }
    if !paragraphs.is_empty() {
        paragraphs.dedup();
        return paragraphs.join("\n\n");
    }

    extract_text_from_element(&body)
}
