// ── web_search: HTML result pages → SearchResult ───────────────────────
//
// DuckDuckGo HTML:  .result  → a.result__a (href is a /l/?uddg= redirect)
//                            → .result__snippet
// Bing:             li.b_algo → h2 a
//                             → .b_caption p
//
// Layout drift yields zero results, never an error.

use super::ToolsService;
use crate::atoms::constants::MAX_RESULTS_PER_QUERY;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::SearchResult;
use log::info;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEngine {
    DuckDuckGo,
    Bing,
}

impl SearchEngine {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "duckduckgo" | "ddg" => Some(SearchEngine::DuckDuckGo),
            "bing" => Some(SearchEngine::Bing),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchEngine::DuckDuckGo => "duckduckgo",
            SearchEngine::Bing => "bing",
        }
    }

    pub fn search_url(&self, query: &str) -> String {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("q", query)
            .finish();
        match self {
            SearchEngine::DuckDuckGo => format!("https://html.duckduckgo.com/html/?{}", encoded),
            SearchEngine::Bing => format!("https://www.bing.com/search?{}", encoded),
        }
    }

    pub fn parse_results(&self, html: &str) -> Vec<SearchResult> {
        let results = match self {
            SearchEngine::DuckDuckGo => parse_duckduckgo(html),
            SearchEngine::Bing => parse_bing(html),
        };
        dedup_by_url(results)
    }
}

impl ToolsService {
    /// Run one query. Bounded by the search timeout as a whole, proxy
    /// fallback included.
    pub async fn search(
        &self,
        query: &str,
        engine: SearchEngine,
    ) -> EngineResult<Vec<SearchResult>> {
        let target = engine.search_url(query);
        info!("[tools] search '{}' via {}", query, engine.as_str());

        let fetch =
            self.proxies.fetch_text(self.fetcher.as_ref(), &target, Some(self.search_timeout));
        let html = tokio::time::timeout(self.search_timeout, fetch)
            .await
            .map_err(|_| {
                EngineError::Timeout(format!(
                    "search for '{}' timed out after {}s",
                    query,
                    self.search_timeout.as_secs()
                ))
            })??;

        let results = engine.parse_results(&html);
        info!("[tools] search '{}' → {} result(s)", query, results.len());
        Ok(results)
    }
}

// ── Parsers ────────────────────────────────────────────────────────────

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static DDG_RESULT: LazyLock<Selector> = LazyLock::new(|| selector(".result"));
static DDG_TITLE: LazyLock<Selector> = LazyLock::new(|| selector("a.result__a"));
static DDG_SNIPPET: LazyLock<Selector> = LazyLock::new(|| selector(".result__snippet"));
static BING_RESULT: LazyLock<Selector> = LazyLock::new(|| selector("li.b_algo"));
static BING_TITLE: LazyLock<Selector> = LazyLock::new(|| selector("h2 a"));
static BING_SNIPPET: LazyLock<Selector> = LazyLock::new(|| selector(".b_caption p"));

fn element_text(el: &ElementRef) -> String {
    el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn parse_duckduckgo(html: &str) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let mut results = Vec::new();
    for block in document.select(&DDG_RESULT) {
        let Some(anchor) = block.select(&DDG_TITLE).next() else { continue };
        let Some(url) = anchor.value().attr("href").and_then(decode_ddg_href) else { continue };
        let title = element_text(&anchor);
        if title.is_empty() {
            continue;
        }
        let snippet =
            block.select(&DDG_SNIPPET).next().map(|e| element_text(&e)).unwrap_or_default();
        results.push(SearchResult { title, url, snippet });
    }
    results
}

pub fn parse_bing(html: &str) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let mut results = Vec::new();
    for block in document.select(&BING_RESULT) {
        let Some(anchor) = block.select(&BING_TITLE).next() else { continue };
        let Some(url) = anchor.value().attr("href").filter(|h| is_http_url(h)) else { continue };
        let title = element_text(&anchor);
        if title.is_empty() {
            continue;
        }
        let snippet =
            block.select(&BING_SNIPPET).next().map(|e| element_text(&e)).unwrap_or_default();
        results.push(SearchResult { title, url: url.to_string(), snippet });
    }
    results
}

/// DuckDuckGo wraps result links as `//duckduckgo.com/l/?uddg=<encoded>&rut=…`.
/// Returns the real target, or the href itself when it is already absolute.
pub fn decode_ddg_href(href: &str) -> Option<String> {
    let absolute =
        if href.starts_with("//") { format!("https:{}", href) } else { href.to_string() };
    let parsed = url::Url::parse(&absolute).ok()?;
    if let Some((_, target)) = parsed.query_pairs().find(|(k, _)| k == "uddg") {
        let target = target.into_owned();
        return is_http_url(&target).then_some(target);
    }
    is_http_url(&absolute).then_some(absolute)
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// First occurrence of each url wins; capped per query.
pub fn dedup_by_url(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.url.clone()))
        .take(MAX_RESULTS_PER_QUERY)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::traits::{HttpFetch, HttpResponse};
    use crate::engine::proxy::{ProxyDescriptor, ProxyPool};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    /// Never answers within the search timeout.
    struct StalledFetch;

    #[async_trait]
    impl HttpFetch for StalledFetch {
        async fn get(&self, _url: &str, _timeout: Option<Duration>) -> EngineResult<HttpResponse> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(HttpResponse { status: 200, body: String::new() })
        }
    }

    const DDG_PAGE: &str = r#"
<html><body>
<div class="result">
  <h2><a class="result__a"
         href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Ftea&rut=abc">
    Green <b>tea</b> benefits</a></h2>
  <a class="result__snippet">Green tea is   rich in antioxidants.</a>
</div>
<div class="result">
  <h2><a class="result__a" href="https://direct.example/page">Direct link</a></h2>
</div>
<div class="result">
  <h2><a class="result__a"
         href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Ftea">Duplicate</a></h2>
</div>
<div class="result"><span>ad slot without anchor</span></div>
</body></html>"#;

    #[test]
    fn parses_duckduckgo_and_decodes_redirects() {
        let results = SearchEngine::DuckDuckGo.parse_results(DDG_PAGE);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://example.com/tea");
        assert_eq!(results[0].title, "Green tea benefits");
        assert_eq!(results[0].snippet, "Green tea is rich in antioxidants.");
        assert_eq!(results[1].url, "https://direct.example/page");
        assert_eq!(results[1].snippet, "");
    }

    #[test]
    fn parses_bing() {
        let html = r#"<ol><li class="b_algo"><h2><a href="https://rust-lang.org/">Rust</a></h2>
            <div class="b_caption"><p>A language empowering everyone.</p></div></li>
            <li class="b_algo"><h2><a href="/relative">Skip</a></h2></li></ol>"#;
        let results = SearchEngine::Bing.parse_results(html);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Rust");
        assert_eq!(results[0].snippet, "A language empowering everyone.");
    }

    #[test]
    fn unexpected_layout_yields_nothing() {
        assert!(SearchEngine::DuckDuckGo.parse_results("<html><p>captcha</p></html>").is_empty());
        assert!(SearchEngine::Bing.parse_results("").is_empty());
    }

    #[test]
    fn engine_names_and_urls() {
        assert_eq!(SearchEngine::parse("DuckDuckGo"), Some(SearchEngine::DuckDuckGo));
        assert_eq!(SearchEngine::parse("bing"), Some(SearchEngine::Bing));
        assert_eq!(SearchEngine::parse("altavista"), None);
        assert_eq!(
            SearchEngine::DuckDuckGo.search_url("green tea"),
            "https://html.duckduckgo.com/html/?q=green+tea"
        );
    }

    #[test]
    fn ddg_href_without_target_is_rejected() {
        assert_eq!(decode_ddg_href("/html/?q=next"), None);
        assert_eq!(decode_ddg_href("//duckduckgo.com/l/?uddg=javascript%3Aalert"), None);
    }

    #[tokio::test]
    async fn stalled_search_times_out() {
        let tools = ToolsService::new(
            Arc::new(StalledFetch),
            ProxyPool::new(vec![ProxyDescriptor::direct()], false),
            Duration::from_millis(50),
            Duration::from_secs(5),
        );
        let started = std::time::Instant::now();
        match tools.search("green tea", SearchEngine::DuckDuckGo).await {
            Err(EngineError::Timeout(msg)) => assert!(msg.contains("green tea"), "{}", msg),
            other => panic!("expected a timeout, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
