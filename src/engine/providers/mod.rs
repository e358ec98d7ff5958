// scoutchat Engine — Model provider registry
// AnyProvider routes each request to the backend that speaks the model's
// dialect: Gemini-family names go to Google, everything else to the
// OpenAI-compatible provider.

pub mod google;
pub mod openai;

pub use google::GoogleProvider;
pub use openai::OpenAiProvider;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{ChunkSink, ModelProvider};
use crate::atoms::types::{truncate_utf8, Completion, Message, ProviderConfig, ProviderKind};
use crate::engine::http::{
    is_retryable_status, parse_retry_after, retry_delay, CircuitBreaker, MAX_RETRIES,
};
use async_trait::async_trait;
use futures::StreamExt;
use log::{error, warn};
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;

// ── Provider factory ───────────────────────────────────────────────────────────

/// Build the concrete provider for one config entry.
///
/// OpenAI, Ollama, OpenRouter and Custom all speak the chat-completions
/// dialect; only Google needs its own wire format.
pub fn provider_from_config(
    config: &ProviderConfig,
    timeout: Duration,
) -> EngineResult<Box<dyn ModelProvider>> {
    Ok(match config.kind {
        ProviderKind::Google => Box::new(GoogleProvider::new(config, timeout)?),
        _ => Box::new(OpenAiProvider::new(config, timeout)?),
    })
}

/// Type-erased routing provider. Holds at most one backend per dialect.
pub struct AnyProvider {
    openai: Option<Box<dyn ModelProvider>>,
    google: Option<Box<dyn ModelProvider>>,
}

impl AnyProvider {
    pub fn new(
        openai: Option<Box<dyn ModelProvider>>,
        google: Option<Box<dyn ModelProvider>>,
    ) -> Self {
        AnyProvider { openai, google }
    }

    pub fn from_configs(
        openai: Option<&ProviderConfig>,
        google: Option<&ProviderConfig>,
        timeout: Duration,
    ) -> EngineResult<Self> {
        Ok(AnyProvider {
            openai: openai.map(|c| provider_from_config(c, timeout)).transpose()?,
            google: google.map(|c| provider_from_config(c, timeout)).transpose()?,
        })
    }

    fn route(&self, model: &str) -> EngineResult<&dyn ModelProvider> {
        let (slot, label) = match ProviderKind::for_model(model) {
            ProviderKind::Google => (&self.google, "Gemini (set GEMINI_API_KEY)"),
            _ => (&self.openai, "OpenAI-compatible (set OPENAI_API_KEY)"),
        };
        slot.as_deref().ok_or_else(|| {
            EngineError::Config(format!("no {} provider configured for model '{}'", label, model))
        })
    }
}

#[async_trait]
impl ModelProvider for AnyProvider {
    fn name(&self) -> &str {
        "router"
    }

    async fn complete(&self, model: &str, history: &[Message]) -> EngineResult<Completion> {
        self.route(model)?.complete(model, history).await
    }

    async fn stream(
        &self,
        model: &str,
        history: &[Message],
        on_chunk: ChunkSink<'_>,
    ) -> EngineResult<Completion> {
        self.route(model)?.stream(model, history, on_chunk).await
    }
}

// ── Shared request plumbing ────────────────────────────────────────────────────

/// POST a JSON body with the shared retry policy:
///   • 429 / 5xx → exponential backoff, honouring Retry-After
///   • connect / transport errors → retried
///   • timeouts → returned at once as `EngineError::Timeout` (the chat
///     controller owns timeout retries)
///   • 401 / 403 → never retried
pub(crate) async fn post_json(
    client: &Client,
    circuit: &CircuitBreaker,
    provider: &str,
    url: &str,
    headers: &[(&str, String)],
    body: &Value,
) -> EngineResult<Response> {
    circuit.check().map_err(|msg| EngineError::provider(provider, msg))?;

    let mut last_error = String::new();
    let mut retry_after: Option<u64> = None;

    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            let delay = retry_delay(attempt - 1, retry_after.take()).await;
            warn!(
                "[engine] {} retry {}/{} after {}ms",
                provider,
                attempt,
                MAX_RETRIES,
                delay.as_millis()
            );
        }

        let mut req = client.post(url).header("Content-Type", "application/json");
        for (name, value) in headers {
            req = req.header(*name, value);
        }

        let response = match req.json(body).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                circuit.record_failure();
                return Err(EngineError::Timeout(format!("{} did not respond in time", provider)));
            }
            Err(e) => {
                circuit.record_failure();
                last_error = transport_error(e);
                if attempt < MAX_RETRIES {
                    continue;
                }
                return Err(EngineError::provider(provider, last_error));
            }
        };

        if response.status().is_success() {
            circuit.record_success();
            return Ok(response);
        }

        let status = response.status().as_u16();
        retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body_text = response.text().await.unwrap_or_default();
        last_error = format!("API error {}: {}", status, truncate_utf8(&body_text, 200));
        error!("[engine] {} error {}: {}", provider, status, truncate_utf8(&body_text, 500));
        circuit.record_failure();

        if status == 401 || status == 403 {
            return Err(EngineError::provider(provider, last_error));
        }
        if is_retryable_status(status) && attempt < MAX_RETRIES {
            continue;
        }
        return Err(EngineError::provider(provider, last_error));
    }

    Err(EngineError::provider(provider, last_error))
}

/// Read a JSON response body, mapping a body-read timeout to `Timeout`.
pub(crate) async fn read_json(provider: &str, response: Response) -> EngineResult<Value> {
    response.json::<Value>().await.map_err(|e| map_read_error(provider, e))
}

/// Walk an SSE body and hand every `data:` payload to `on_data`. Stops early
/// when `on_data` returns `false`. Lines are split on raw bytes so multi-byte
/// characters straddling network chunks survive.
pub(crate) async fn for_each_sse_data(
    provider: &str,
    response: Response,
    mut on_data: impl FnMut(&str) -> bool + Send,
) -> EngineResult<()> {
    let mut byte_stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(result) = byte_stream.next().await {
        let bytes = result.map_err(|e| map_read_error(provider, e))?;
        buffer.extend_from_slice(&bytes);

        while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(data) = line.trim().strip_prefix("data:") {
                if !on_data(data.trim_start()) {
                    return Ok(());
                }
            }
        }
    }

    // Trailing event without a final newline.
    let tail = String::from_utf8_lossy(&buffer);
    if let Some(data) = tail.trim().strip_prefix("data:") {
        on_data(data.trim_start());
    }
    Ok(())
}

/// reqwest errors print the request URL; strip it before the message can
/// reach a log line or the view.
fn transport_error(e: reqwest::Error) -> String {
    format!("HTTP request failed: {}", e.without_url())
}

fn map_read_error(provider: &str, e: reqwest::Error) -> EngineError {
    if e.is_timeout() {
        EngineError::Timeout(format!("{} response stalled", provider))
    } else {
        EngineError::provider(provider, format!("Stream read error: {}", e.without_url()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::TokenUsage;
    use parking_lot::Mutex;

    struct Named(&'static str, Mutex<Vec<String>>);

    #[async_trait]
    impl ModelProvider for Named {
        fn name(&self) -> &str {
            self.0
        }
        async fn complete(&self, model: &str, _history: &[Message]) -> EngineResult<Completion> {
            self.1.lock().push(model.to_string());
            Ok(Completion { text: self.0.into(), usage: Some(TokenUsage::default()), model: None })
        }
        async fn stream(
            &self,
            model: &str,
            history: &[Message],
            on_chunk: ChunkSink<'_>,
        ) -> EngineResult<Completion> {
            let c = self.complete(model, history).await?;
            on_chunk(&c.text);
            Ok(c)
        }
    }

    #[tokio::test]
    async fn routes_by_model_family() {
        let router = AnyProvider::new(
            Some(Box::new(Named("openai", Mutex::new(vec![])))),
            Some(Box::new(Named("google", Mutex::new(vec![])))),
        );
        let out = router.complete("gemini-1.5-flash", &[]).await.unwrap();
        assert_eq!(out.text, "google");
        let out = router.complete("gpt-4o-mini", &[]).await.unwrap();
        assert_eq!(out.text, "openai");

        let mut seen = String::new();
        let mut sink = |d: &str| seen.push_str(d);
        router.stream("gemini-pro", &[], &mut sink).await.unwrap();
        assert_eq!(seen, "google");
    }

    #[tokio::test]
    async fn missing_backend_is_a_config_error() {
        let router = AnyProvider::new(Some(Box::new(Named("openai", Mutex::new(vec![])))), None);
        let err = router.complete("gemini-pro", &[]).await.unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[tokio::test]
    async fn transport_errors_do_not_echo_the_url() {
        let err = Client::new()
            .get("http://127.0.0.1:9/models/m:generateContent?key=SECRET-KEY-123")
            .send()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("SECRET-KEY-123"));
        let msg = transport_error(err);
        assert!(msg.starts_with("HTTP request failed"));
        assert!(!msg.contains("SECRET-KEY-123"), "{}", msg);
        assert!(!msg.contains("127.0.0.1"), "{}", msg);
    }

    #[test]
    fn factory_picks_dialect() {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let google = ProviderConfig {
            kind: ProviderKind::Google,
            api_key: "k".into(),
            base_url: None,
        };
        let p = provider_from_config(&google, Duration::from_secs(5)).unwrap();
        assert_eq!(p.name(), "google");
        let ollama = ProviderConfig { kind: ProviderKind::Ollama, ..google };
        let p = provider_from_config(&ollama, Duration::from_secs(5)).unwrap();
        assert_eq!(p.name(), "openai");
    }
}
