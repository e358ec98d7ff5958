// scoutchat Engine — Proxy fallback
//
// Public HTTP relays are flaky, so every tool fetch walks an ordered list of
// proxy descriptors until one returns a usable body:
//
//   build request URL → GET → non-2xx / error / bad envelope → next proxy
//                           → success → stop
//
// Health scoring (optional): +1 on success, −1 on failure, clamped to
// [PROXY_SCORE_MIN, PROXY_SCORE_MAX]. Candidates are re-sorted by score once
// per top-level operation, never inside a single fallback loop.

use crate::atoms::constants::{PROXY_SCORE_MAX, PROXY_SCORE_MIN};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::HttpFetch;
use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ── Descriptors ────────────────────────────────────────────────────────

/// How a proxy wraps the target's body.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Envelope {
    /// Body is the target's body.
    Raw,
    /// Body is JSON with the target's body in `contents` (allorigins `/get`).
    JsonContents,
    /// No relay: the target URL is fetched as-is.
    Direct,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProxyDescriptor {
    pub name: String,
    /// Request URL template. `{url}` is replaced by the percent-encoded
    /// target, `{raw_url}` by the target verbatim. Ignored for `Direct`.
    #[serde(default)]
    pub template: String,
    pub envelope: Envelope,
}

impl ProxyDescriptor {
    pub fn new(name: &str, template: &str, envelope: Envelope) -> Self {
        ProxyDescriptor { name: name.into(), template: template.into(), envelope }
    }

    pub fn direct() -> Self {
        ProxyDescriptor::new("direct", "", Envelope::Direct)
    }

    /// Transform a target URL into the proxied request URL.
    pub fn request_url(&self, target: &str) -> String {
        if self.envelope == Envelope::Direct {
            return target.to_string();
        }
        self.template
            .replace("{url}", &urlencoding::encode(target))
            .replace("{raw_url}", target)
    }

    /// Unwrap the proxy's response envelope into the target's body.
    pub fn unwrap_body(&self, body: String) -> EngineResult<String> {
        match self.envelope {
            Envelope::Raw | Envelope::Direct => Ok(body),
            Envelope::JsonContents => {
                let v: serde_json::Value = serde_json::from_str(&body)?;
                v["contents"]
                    .as_str()
                    .map(|s| s.to_string())
                    .ok_or_else(|| {
                        format!("{}: envelope has no 'contents' string", self.name).into()
                    })
            }
        }
    }
}

/// The public relays used when the config names none.
pub fn default_proxies() -> Vec<ProxyDescriptor> {
    vec![
        ProxyDescriptor::new(
            "allorigins",
            "https://api.allorigins.win/raw?url={url}",
            Envelope::Raw,
        ),
        ProxyDescriptor::new("corsproxy", "https://corsproxy.io/?url={url}", Envelope::Raw),
        ProxyDescriptor::new(
            "codetabs",
            "https://api.codetabs.com/v1/proxy?quest={raw_url}",
            Envelope::Raw,
        ),
        ProxyDescriptor::direct(),
    ]
}

// ── Pool ───────────────────────────────────────────────────────────────

pub struct ProxyPool {
    proxies: Vec<ProxyDescriptor>,
    scores: Mutex<Vec<i32>>,
    health_scoring: bool,
}

/// Snapshot of one proxy's standing, for display.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProxyStatus {
    pub name: String,
    pub score: i32,
}

impl ProxyPool {
    pub fn new(proxies: Vec<ProxyDescriptor>, health_scoring: bool) -> Self {
        let scores = Mutex::new(vec![0; proxies.len()]);
        ProxyPool { proxies, scores, health_scoring }
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Indices in try-order. Stable sort, so ties keep configured order.
    fn candidate_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.proxies.len()).collect();
        if self.health_scoring {
            let scores = self.scores.lock();
            order.sort_by(|a, b| scores[*b].cmp(&scores[*a]));
        }
        order
    }

    /// Proxies in the order the next operation will try them.
    pub fn status(&self) -> Vec<ProxyStatus> {
        let scores = self.scores.lock().clone();
        self.candidate_order()
            .into_iter()
            .map(|i| ProxyStatus { name: self.proxies[i].name.clone(), score: scores[i] })
            .collect()
    }

    fn record(&self, idx: usize, success: bool) {
        if !self.health_scoring {
            return;
        }
        let mut scores = self.scores.lock();
        let delta = if success { 1 } else { -1 };
        scores[idx] = (scores[idx] + delta).clamp(PROXY_SCORE_MIN, PROXY_SCORE_MAX);
    }

    /// Fetch `target` through the pool. Proxies are tried strictly in
    /// sequence; the first usable body wins.
    pub async fn fetch_text(
        &self,
        fetcher: &dyn HttpFetch,
        target: &str,
        timeout: Option<Duration>,
    ) -> EngineResult<String> {
        let order = self.candidate_order();
        let mut attempts = 0usize;
        let mut last_error = String::from("no proxies configured");

        for idx in order {
            let proxy = &self.proxies[idx];
            attempts += 1;
            let request_url = proxy.request_url(target);

            let outcome = match fetcher.get(&request_url, timeout).await {
                Ok(resp) if resp.is_success() => proxy.unwrap_body(resp.body),
                Ok(resp) => Err(EngineError::Other(format!("HTTP {}", resp.status))),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(body) => {
                    self.record(idx, true);
                    info!("[proxy] {} served {} ({} bytes)", proxy.name, target, body.len());
                    return Ok(body);
                }
                Err(e) => {
                    self.record(idx, false);
                    warn!("[proxy] {} failed for {}: {}", proxy.name, target, e);
                    last_error = format!("{}: {}", proxy.name, e);
                }
            }
        }

        Err(EngineError::ProxiesExhausted { attempts, last_error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::traits::HttpResponse;
    use async_trait::async_trait;

    /// Answers by request-URL prefix and records every call.
    struct PrefixFetch {
        routes: Vec<(String, EngineResult<HttpResponse>)>,
        calls: Mutex<Vec<String>>,
    }

    impl PrefixFetch {
        fn new(routes: Vec<(&str, EngineResult<HttpResponse>)>) -> Self {
            PrefixFetch {
                routes: routes.into_iter().map(|(p, r)| (p.to_string(), r)).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpFetch for PrefixFetch {
        async fn get(&self, url: &str, _timeout: Option<Duration>) -> EngineResult<HttpResponse> {
            self.calls.lock().push(url.to_string());
            for (prefix, result) in &self.routes {
                if url.starts_with(prefix.as_str()) {
                    return match result {
                        Ok(r) => Ok(r.clone()),
                        Err(e) => Err(EngineError::Other(e.to_string())),
                    };
                }
            }
            Err("connection refused".into())
        }
    }

    fn ok(body: &str) -> EngineResult<HttpResponse> {
        Ok(HttpResponse { status: 200, body: body.into() })
    }

    fn pool(n: usize, scoring: bool) -> ProxyPool {
        let proxies = (1..=n)
            .map(|i| {
                let template = format!("https://p{}.test/?u={{url}}", i);
                ProxyDescriptor::new(&format!("p{}", i), &template, Envelope::Raw)
            })
            .collect();
        ProxyPool::new(proxies, scoring)
    }

    #[test]
    fn request_url_encodes_target() {
        let p = ProxyDescriptor::new("x", "https://relay.test/?url={url}", Envelope::Raw);
        assert_eq!(
            p.request_url("https://a.b/c?d=e"),
            "https://relay.test/?url=https%3A%2F%2Fa.b%2Fc%3Fd%3De"
        );
        assert_eq!(ProxyDescriptor::direct().request_url("https://a.b"), "https://a.b");
    }

    #[test]
    fn json_envelope_is_unwrapped() {
        let p = ProxyDescriptor::new("ao", "https://ao.test/get?url={url}", Envelope::JsonContents);
        assert_eq!(p.unwrap_body(r#"{"contents":"<p>hi</p>"}"#.into()).unwrap(), "<p>hi</p>");
        assert!(p.unwrap_body(r#"{"status":1}"#.into()).is_err());
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let fetch = PrefixFetch::new(vec![
            ("https://p1.test", Ok(HttpResponse { status: 503, body: String::new() })),
            ("https://p2.test", Err("reset".into())),
            ("https://p3.test", ok("third")),
            ("https://p4.test", ok("fourth")),
        ]);
        let body = pool(4, false).fetch_text(&fetch, "https://target.test", None).await.unwrap();
        assert_eq!(body, "third");
        assert_eq!(fetch.calls.lock().len(), 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_all_attempts() {
        let fetch = PrefixFetch::new(vec![]);
        let err = pool(3, true).fetch_text(&fetch, "https://target.test", None).await.unwrap_err();
        match err {
            EngineError::ProxiesExhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn healthy_proxy_moves_to_front_for_next_operation() {
        let fetch = PrefixFetch::new(vec![("https://p2.test", ok("two"))]);
        let pool = pool(3, true);
        pool.fetch_text(&fetch, "https://target.test", None).await.unwrap();
        let order: Vec<String> = pool.status().into_iter().map(|s| s.name).collect();
        assert_eq!(order, vec!["p2", "p3", "p1"]);

        fetch.calls.lock().clear();
        pool.fetch_text(&fetch, "https://target.test", None).await.unwrap();
        assert_eq!(fetch.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn scores_are_clamped() {
        let fetch = PrefixFetch::new(vec![("https://p1.test", ok("one"))]);
        let pool = pool(1, true);
        for _ in 0..20 {
            pool.fetch_text(&fetch, "https://target.test", None).await.unwrap();
        }
        assert_eq!(pool.status()[0].score, PROXY_SCORE_MAX);
    }

    #[tokio::test]
    async fn fixed_order_without_scoring() {
        let fetch = PrefixFetch::new(vec![("https://p2.test", ok("two"))]);
        let pool = pool(2, false);
        pool.fetch_text(&fetch, "https://target.test", None).await.unwrap();
        fetch.calls.lock().clear();
        pool.fetch_text(&fetch, "https://target.test", None).await.unwrap();
        assert_eq!(fetch.calls.lock().len(), 2);
    }
}
