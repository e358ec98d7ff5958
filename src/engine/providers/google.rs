// scoutchat Engine — Google Gemini Provider
// Implements the ModelProvider trait over models/{m}:generateContent and
// :streamGenerateContent?alt=sse. Thought parts from thinking models are
// dropped; only answer text reaches the caller.

use super::{for_each_sse_data, post_json, read_json};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{ChunkSink, ModelProvider};
use crate::atoms::types::{Completion, Message, ProviderConfig, Role, TokenUsage};
use crate::engine::http::{pinned_client, CircuitBreaker};
use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const PROVIDER: &str = "google";

// ── Struct ────────────────────────────────────────────────────────────────────

pub struct GoogleProvider {
    client: Client,
    base_url: String,
    api_key: String,
    circuit: CircuitBreaker,
}

/// Text, usage and model version pulled out of one response object
/// (a whole response, or one SSE event).
#[derive(Debug, Default, PartialEq)]
pub(crate) struct GeminiChunk {
    pub text: String,
    pub usage: Option<TokenUsage>,
    pub model: Option<String>,
    /// Non-STOP finish reason on a candidate with no content.
    pub blocked: Option<String>,
}

impl GoogleProvider {
    pub fn new(config: &ProviderConfig, timeout: Duration) -> EngineResult<Self> {
        if config.api_key.is_empty() {
            return Err(EngineError::Config("Gemini provider needs an api_key".into()));
        }
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| config.kind.default_base_url().to_string());
        Ok(GoogleProvider {
            client: pinned_client(timeout)?,
            base_url,
            api_key: config.api_key.clone(),
            circuit: CircuitBreaker::new(5, 60),
        })
    }

    /// Request URL. The key travels in a header, never in the URL, so
    /// transport errors that echo the URL cannot leak it.
    fn endpoint(&self, model: &str, stream: bool) -> String {
        let base = self.base_url.trim_end_matches('/');
        if stream {
            format!("{}/models/{}:streamGenerateContent?alt=sse", base, model)
        } else {
            format!("{}/models/{}:generateContent", base, model)
        }
    }

    fn auth_headers(&self) -> [(&'static str, String); 1] {
        [("x-goog-api-key", self.api_key.clone())]
    }

    /// Split system turns into `systemInstruction` and map the rest onto
    /// user/model `contents`. Gemini requires strictly alternating turns, so
    /// consecutive same-role messages are merged.
    pub(crate) fn format_messages(messages: &[Message]) -> (Option<Value>, Vec<Value>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut contents: Vec<Value> = Vec::new();

        for msg in messages {
            let role = match msg.role {
                Role::System => {
                    system_parts.push(&msg.content);
                    continue;
                }
                Role::User => "user",
                Role::Assistant => "model",
            };

            let part = json!({ "text": msg.content });
            match contents.last_mut() {
                Some(last) if last["role"] == role => {
                    if let Some(parts) = last["parts"].as_array_mut() {
                        parts.push(part);
                    }
                }
                _ => contents.push(json!({ "role": role, "parts": [part] })),
            }
        }

        let system_instruction = if system_parts.is_empty() {
            None
        } else {
            Some(json!({ "parts": [{ "text": system_parts.join("\n\n") }] }))
        };
        (system_instruction, contents)
    }

    fn request_body(messages: &[Message]) -> Value {
        let (system_instruction, mut contents) = Self::format_messages(messages);
        // Gemini rejects a request with no contents.
        if contents.is_empty() {
            contents.push(json!({ "role": "user", "parts": [{ "text": "Hello" }] }));
            warn!("[engine] Google: no contents after formatting, injected a fallback user turn");
        }
        let mut body = json!({ "contents": contents });
        if let Some(sys) = system_instruction {
            body["systemInstruction"] = sys;
        }
        body
    }

    pub(crate) fn parse_chunk(v: &Value) -> GeminiChunk {
        let mut chunk = GeminiChunk {
            model: v["modelVersion"].as_str().map(|s| s.to_string()),
            ..Default::default()
        };

        if let Some(candidate) = v["candidates"].get(0) {
            let parts = candidate["content"]["parts"].as_array();
            match parts {
                Some(parts) => {
                    for part in parts {
                        if part["thought"].as_bool() == Some(true) {
                            continue;
                        }
                        if let Some(t) = part["text"].as_str() {
                            chunk.text.push_str(t);
                        }
                    }
                }
                None => {
                    if let Some(reason) = candidate["finishReason"].as_str() {
                        if reason != "STOP" {
                            chunk.blocked = Some(reason.to_string());
                        }
                    }
                }
            }
        }

        if let Some(u) = v.get("usageMetadata") {
            let input = u["promptTokenCount"].as_u64().unwrap_or(0);
            let output = u["candidatesTokenCount"].as_u64().unwrap_or(0);
            if input > 0 || output > 0 {
                chunk.usage = Some(TokenUsage {
                    input_tokens: input,
                    output_tokens: output,
                    total_tokens: u["totalTokenCount"].as_u64().unwrap_or(input + output),
                });
            }
        }
        chunk
    }
}

fn blocked_error(reason: &str) -> EngineError {
    EngineError::provider(PROVIDER, format!("response blocked (finishReason={})", reason))
}

// ── ModelProvider implementation ───────────────────────────────────────────

#[async_trait]
impl ModelProvider for GoogleProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, model: &str, history: &[Message]) -> EngineResult<Completion> {
        info!("[engine] Google request model={}", model);
        let body = Self::request_body(history);
        let url = self.endpoint(model, false);
        let headers = self.auth_headers();
        let response =
            post_json(&self.client, &self.circuit, PROVIDER, &url, &headers, &body).await?;
        let v = read_json(PROVIDER, response).await?;

        if let Some(msg) = v["error"]["message"].as_str() {
            return Err(EngineError::provider(PROVIDER, msg));
        }
        let chunk = Self::parse_chunk(&v);
        if chunk.text.is_empty() {
            if let Some(reason) = &chunk.blocked {
                return Err(blocked_error(reason));
            }
        }
        Ok(Completion { text: chunk.text, usage: chunk.usage, model: chunk.model })
    }

    async fn stream(
        &self,
        model: &str,
        history: &[Message],
        on_chunk: ChunkSink<'_>,
    ) -> EngineResult<Completion> {
        info!("[engine] Google stream model={}", model);
        let body = Self::request_body(history);
        let url = self.endpoint(model, true);
        let headers = self.auth_headers();
        let response =
            post_json(&self.client, &self.circuit, PROVIDER, &url, &headers, &body).await?;

        let mut completion = Completion::default();
        let mut blocked: Option<String> = None;
        for_each_sse_data(PROVIDER, response, |data| {
            let Ok(v) = serde_json::from_str::<Value>(data) else { return true };
            let chunk = Self::parse_chunk(&v);
            if !chunk.text.is_empty() {
                on_chunk(&chunk.text);
                completion.text.push_str(&chunk.text);
            }
            if chunk.usage.is_some() {
                completion.usage = chunk.usage;
            }
            if completion.model.is_none() {
                completion.model = chunk.model;
            }
            if chunk.blocked.is_some() {
                blocked = chunk.blocked;
            }
            true
        })
        .await?;

        if completion.text.is_empty() {
            if let Some(reason) = &blocked {
                return Err(blocked_error(reason));
            }
        }
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_turns_become_instruction_and_roles_merge() {
        let (sys, contents) = GoogleProvider::format_messages(&[
            Message::system("be brief"),
            Message::user("q1"),
            Message::user("q1 continued"),
            Message::assistant("a1"),
            Message::user("q2"),
        ]);
        assert_eq!(sys.unwrap()["parts"][0]["text"], "be brief");
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"].as_array().unwrap().len(), 2);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "q2");
    }

    #[test]
    fn empty_history_gets_placeholder_turn() {
        let body = GoogleProvider::request_body(&[Message::system("sys")]);
        assert_eq!(body["contents"][0]["role"], "user");
        assert!(body["systemInstruction"].is_object());
    }

    #[test]
    fn parses_text_skipping_thoughts() {
        let v = json!({
            "modelVersion": "gemini-1.5-flash-002",
            "candidates": [{"content": {"parts": [
                {"text": "internal", "thought": true},
                {"text": "Par"}, {"text": "is"}
            ]}}],
            "usageMetadata": {
                "promptTokenCount": 4,
                "candidatesTokenCount": 2,
                "totalTokenCount": 6
            }
        });
        let c = GoogleProvider::parse_chunk(&v);
        assert_eq!(c.text, "Paris");
        assert_eq!(c.usage.unwrap().total_tokens, 6);
        assert_eq!(c.model.as_deref(), Some("gemini-1.5-flash-002"));
        assert!(c.blocked.is_none());
    }

    fn provider(api_key: &str) -> GoogleProvider {
        let config = ProviderConfig {
            kind: crate::atoms::types::ProviderKind::Google,
            api_key: api_key.into(),
            base_url: Some("http://127.0.0.1:9/".into()),
        };
        GoogleProvider::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn api_key_stays_out_of_the_url() {
        let p = provider("SECRET-KEY-123");
        for stream in [false, true] {
            let url = p.endpoint("gemini-pro", stream);
            assert!(!url.contains("SECRET-KEY-123"), "{}", url);
            assert!(!url.contains("key="), "{}", url);
        }
        assert_eq!(
            p.endpoint("gemini-pro", false),
            "http://127.0.0.1:9/models/gemini-pro:generateContent"
        );
        assert_eq!(p.auth_headers(), [("x-goog-api-key", "SECRET-KEY-123".to_string())]);
    }

    #[test]
    fn blocked_candidate_is_reported() {
        let v = json!({"candidates": [{"finishReason": "SAFETY"}]});
        let c = GoogleProvider::parse_chunk(&v);
        assert!(c.text.is_empty());
        assert_eq!(c.blocked.as_deref(), Some("SAFETY"));
    }
}
