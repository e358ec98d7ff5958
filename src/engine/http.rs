// ── scoutchat Engine: HTTP Retry, Circuit-Breaker & Fetch Transport ──
//
// Shared HTTP utilities used by the model providers and the tools.
//
// Features:
//   • Exponential backoff with ±25% jitter (base 1s, max 30s, 3 retries)
//   • Retry on 429 (rate limit), 500, 502, 503, 504, 529
//   • Respects `Retry-After` header
//   • Circuit breaker: N consecutive failures → fail fast for a cooldown
//   • Certificate-pinned reqwest::Client for provider traffic
//   • `ReqwestFetch`: the `HttpFetch` transport behind the tools

use crate::atoms::constants::DEFAULT_USER_AGENT;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{HttpFetch, HttpResponse};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use rustls::ClientConfig;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

// ── Constants ──────────────────────────────────────────────────────────────

/// Default maximum number of retry attempts per provider request.
pub const MAX_RETRIES: u32 = 3;

/// Initial retry delay in milliseconds (doubles each attempt).
const INITIAL_RETRY_DELAY_MS: u64 = 1_000;

/// Maximum retry delay cap in milliseconds.
const MAX_RETRY_DELAY_MS: u64 = 30_000;

// ── Retryable status detection ─────────────────────────────────────────────

/// Check if an HTTP status code represents a transient/retryable error.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504 | 529)
}

// ── Backoff delay ──────────────────────────────────────────────────────────

/// Sleep with exponential backoff + ±25% jitter.
/// Respects Retry-After if the server sent one. Returns the slept duration.
pub async fn retry_delay(attempt: u32, retry_after_secs: Option<u64>) -> Duration {
    let delay = backoff_delay(attempt, retry_after_secs);
    tokio::time::sleep(delay).await;
    delay
}

fn backoff_delay(attempt: u32, retry_after_secs: Option<u64>) -> Duration {
    let base_ms = INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt.min(10));
    let capped_ms = base_ms.min(MAX_RETRY_DELAY_MS);
    let delay_ms = match retry_after_secs {
        Some(secs) => (secs.min(60) * 1000).max(capped_ms),
        None => capped_ms,
    };
    Duration::from_millis(apply_jitter(delay_ms))
}

/// Apply ±25% jitter to prevent thundering-herd effects.
fn apply_jitter(base_ms: u64) -> u64 {
    let jitter_range = (base_ms / 4) as i64;
    if jitter_range == 0 {
        return base_ms.max(100);
    }
    let offset = (rand_jitter() % (2 * jitter_range + 1)) - jitter_range;
    (base_ms as i64 + offset).max(100) as u64
}

/// Jitter source from the system clock nanos.
fn rand_jitter() -> i64 {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as i64
}

/// Parse Retry-After header value (integer seconds only).
pub fn parse_retry_after(header_value: &str) -> Option<u64> {
    header_value.trim().parse::<u64>().ok()
}

// ── Circuit Breaker ────────────────────────────────────────────────────────

/// Trips after `threshold` consecutive failures, then rejects requests for
/// `cooldown_secs` before letting a trial request through.
///
/// States:
///   Closed   — normal operation
///   Open     — rejecting requests (cooldown active)
///   HalfOpen — cooldown expired, one trial request allowed
pub struct CircuitBreaker {
    consecutive_failures: AtomicU32,
    /// Epoch secs when the circuit was tripped open.
    tripped_at: AtomicU64,
    threshold: u32,
    cooldown_secs: u64,
}

impl CircuitBreaker {
    pub const fn new(threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            tripped_at: AtomicU64::new(0),
            threshold,
            cooldown_secs,
        }
    }

    /// `Ok(())` if a request may go out, `Err(message)` while open.
    pub fn check(&self) -> Result<(), String> {
        let failures = self.consecutive_failures.load(Ordering::Relaxed);
        if failures < self.threshold {
            return Ok(());
        }
        let tripped = self.tripped_at.load(Ordering::Relaxed);
        let elapsed = now_secs().saturating_sub(tripped);
        if elapsed < self.cooldown_secs {
            Err(format!(
                "Circuit breaker open: {} consecutive failures, cooling down for {}s",
                failures,
                self.cooldown_secs - elapsed
            ))
        } else {
            Ok(())
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.tripped_at.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        let prev = self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        if prev + 1 >= self.threshold {
            self.tripped_at.store(now_secs(), Ordering::Relaxed);
            warn!(
                "[circuit-breaker] Tripped after {} consecutive failures — cooling down {}s",
                prev + 1,
                self.cooldown_secs
            );
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ── Certificate-Pinned Provider Client ─────────────────────────────────────
//
// Provider traffic carries API keys, so it only trusts the Mozilla root store
// (webpki-roots) and ignores CAs installed on the host.

fn pinned_tls_config() -> EngineResult<ClientConfig> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    Ok(
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| EngineError::Config(format!("TLS protocol setup failed: {}", e)))?
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    )
}

/// Build the certificate-pinned client used by every model provider.
pub fn pinned_client(timeout: Duration) -> EngineResult<Client> {
    Ok(Client::builder()
        .use_preconfigured_tls(pinned_tls_config()?)
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()?)
}

// ── Tool transport ─────────────────────────────────────────────────────────

/// `HttpFetch` over reqwest. Used for search pages, proxied reads and the
/// instant-answer API.
pub struct ReqwestFetch {
    client: Client,
    default_timeout: Duration,
}

impl ReqwestFetch {
    pub fn new(user_agent: Option<&str>, default_timeout: Duration) -> EngineResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(ReqwestFetch { client, default_timeout })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetch {
    async fn get(&self, url: &str, timeout: Option<Duration>) -> EngineResult<HttpResponse> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        debug!("[http] GET {} timeout={}s", url, timeout.as_secs());
        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::Timeout(format!("GET {} after {}s", url, timeout.as_secs()))
                } else {
                    EngineError::Network(e)
                }
            })?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(HttpResponse { status, body })
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
