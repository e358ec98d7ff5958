// scoutchat Engine — OpenAI-Compatible Provider
// Handles: OpenAI, OpenRouter, Ollama, and any OpenAI-compatible REST API.
// Implements the ModelProvider trait over POST {base}/chat/completions.

use super::{for_each_sse_data, post_json, read_json};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{ChunkSink, ModelProvider};
use crate::atoms::types::{Completion, Message, ProviderConfig, TokenUsage};
use crate::engine::http::{pinned_client, CircuitBreaker};
use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const PROVIDER: &str = "openai";

// ── OpenAI provider struct ─────────────────────────────────────────────────

pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    circuit: CircuitBreaker,
}

/// One decoded SSE event.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct SseDelta {
    pub text: Option<String>,
    pub usage: Option<TokenUsage>,
    pub model: Option<String>,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig, timeout: Duration) -> EngineResult<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| config.kind.default_base_url().to_string());
        if base_url.is_empty() {
            return Err(EngineError::Config("custom provider needs a base_url".into()));
        }
        Ok(OpenAiProvider {
            client: pinned_client(timeout)?,
            base_url,
            api_key: config.api_key.clone(),
            circuit: CircuitBreaker::new(5, 60),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Local servers (Ollama) run without a key; skip the header then.
    fn auth_headers(&self) -> Vec<(&'static str, String)> {
        if self.api_key.is_empty() {
            Vec::new()
        } else {
            vec![("Authorization", format!("Bearer {}", self.api_key))]
        }
    }

    fn format_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect()
    }

    fn request_body(model: &str, messages: &[Message], stream: bool) -> Value {
        let mut body = json!({
            "model": model,
            "messages": Self::format_messages(messages),
            "stream": stream,
        });
        if stream {
            body["stream_options"] = json!({ "include_usage": true });
        }
        body
    }

    fn parse_usage(u: &Value) -> Option<TokenUsage> {
        let input = u["prompt_tokens"].as_u64().unwrap_or(0);
        let output = u["completion_tokens"].as_u64().unwrap_or(0);
        if input == 0 && output == 0 {
            return None;
        }
        Some(TokenUsage {
            input_tokens: input,
            output_tokens: output,
            total_tokens: u["total_tokens"].as_u64().unwrap_or(input + output),
        })
    }

    /// Non-streaming response: `choices[0].message.content` plus `usage`.
    pub(crate) fn parse_completion(v: &Value) -> EngineResult<Completion> {
        if let Some(msg) = v["error"]["message"].as_str() {
            return Err(EngineError::provider(PROVIDER, msg));
        }
        let text = v["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                EngineError::provider(PROVIDER, "response has no choices[0].message.content")
            })?
            .to_string();
        Ok(Completion {
            text,
            usage: Self::parse_usage(&v["usage"]),
            model: v["model"].as_str().map(|s| s.to_string()),
        })
    }

    /// Parse a single SSE data line. `None` for `[DONE]` and unparseable lines.
    pub(crate) fn parse_sse_chunk(data: &str) -> Option<SseDelta> {
        if data == "[DONE]" {
            return None;
        }
        let v: Value = serde_json::from_str(data).ok()?;
        Some(SseDelta {
            text: v["choices"][0]["delta"]["content"].as_str().map(|s| s.to_string()),
            usage: v.get("usage").and_then(Self::parse_usage),
            model: v["model"].as_str().map(|s| s.to_string()),
        })
    }
}

// ── ModelProvider implementation ───────────────────────────────────────────

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, model: &str, history: &[Message]) -> EngineResult<Completion> {
        let url = self.endpoint();
        info!("[engine] OpenAI request to {} model={}", url, model);
        let body = Self::request_body(model, history, false);
        let headers = self.auth_headers();
        let response =
            post_json(&self.client, &self.circuit, PROVIDER, &url, &headers, &body).await?;
        let v = read_json(PROVIDER, response).await?;
        Self::parse_completion(&v)
    }

    async fn stream(
        &self,
        model: &str,
        history: &[Message],
        on_chunk: ChunkSink<'_>,
    ) -> EngineResult<Completion> {
        let url = self.endpoint();
        info!("[engine] OpenAI stream to {} model={}", url, model);
        let body = Self::request_body(model, history, true);
        let headers = self.auth_headers();
        let response =
            post_json(&self.client, &self.circuit, PROVIDER, &url, &headers, &body).await?;

        let mut completion = Completion::default();
        for_each_sse_data(PROVIDER, response, |data| {
            if data == "[DONE]" {
                return false;
            }
            if let Some(delta) = Self::parse_sse_chunk(data) {
                if let Some(text) = delta.text.filter(|t| !t.is_empty()) {
                    on_chunk(&text);
                    completion.text.push_str(&text);
                }
                if delta.usage.is_some() {
                    completion.usage = delta.usage;
                }
                if completion.model.is_none() {
                    completion.model = delta.model;
                }
            }
            true
        })
        .await?;
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::Role;

    #[test]
    fn body_carries_roles_in_order() {
        let body = OpenAiProvider::request_body(
            "gpt-4o-mini",
            &[Message::system("sys"), Message::user("hi"), Message::assistant("hello")],
            true,
        );
        let roles: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(Role::User.as_str(), "user");
    }

    #[test]
    fn parses_completion_and_usage() {
        let v = json!({
            "model": "gpt-4o-mini-2024",
            "choices": [{"message": {"role": "assistant", "content": "Paris"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 1, "total_tokens": 13}
        });
        let c = OpenAiProvider::parse_completion(&v).unwrap();
        assert_eq!(c.text, "Paris");
        assert_eq!(c.usage.unwrap().total_tokens, 13);
        assert_eq!(c.model.as_deref(), Some("gpt-4o-mini-2024"));
    }

    #[test]
    fn api_error_body_is_a_provider_error() {
        let v = json!({"error": {"message": "model not found"}});
        let err = OpenAiProvider::parse_completion(&v).unwrap_err();
        assert!(err.to_string().contains("model not found"));
    }

    #[test]
    fn parses_sse_deltas() {
        let chunk = r#"{"choices":[{"delta":{"content":"Par"}}]}"#;
        let d = OpenAiProvider::parse_sse_chunk(chunk).unwrap();
        assert_eq!(d.text.as_deref(), Some("Par"));
        assert!(d.usage.is_none());

        let d = OpenAiProvider::parse_sse_chunk(
            r#"{"choices":[],"usage":{"prompt_tokens":5,"completion_tokens":2}}"#,
        )
        .unwrap();
        assert!(d.text.is_none());
        assert_eq!(d.usage.unwrap().total_tokens, 7);

        assert!(OpenAiProvider::parse_sse_chunk("[DONE]").is_none());
        assert!(OpenAiProvider::parse_sse_chunk("not json").is_none());
    }
}
