// scoutchat Engine — Configuration
//
// Loaded from `~/.scoutchat/config.toml` (or an explicit path); a missing
// file means defaults. Environment variables override the file:
//
//   OPENAI_API_KEY   → [providers.openai] api_key
//   OPENAI_BASE_URL  → [providers.openai] base_url
//   GEMINI_API_KEY   → [providers.google] api_key
//
// Example:
//
//   [settings]
//   selected_model = "gemini-1.5-flash"
//   enable_cot = true
//
//   [tools]
//   health_scoring = false
//   [[tools.proxies]]
//   name = "allorigins"
//   template = "https://api.allorigins.win/get?url={url}"
//   envelope = "json_contents"

use crate::atoms::constants::{
    DEFAULT_MAX_MODEL_ATTEMPTS, DEFAULT_MAX_TOOL_ROUNDS, DEFAULT_MODEL_TIMEOUT_SECS,
    DEFAULT_READ_LENGTH, DEFAULT_REQUEST_TIMEOUT_SECS, MAX_ALTERNATIVE_QUERIES, SEARCH_TIMEOUT_SECS,
};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{ProviderConfig, ProviderKind, Settings};
use crate::engine::chat::ChatOptions;
use crate::engine::proxy::{default_proxies, ProxyDescriptor, ProxyPool};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ── Sections ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai: Option<ProviderConfig>,
    pub google: Option<ProviderConfig>,
}

/// `[tools]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub proxies: Vec<ProxyDescriptor>,
    pub health_scoring: bool,
    pub search_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub default_read_length: usize,
    pub max_alternative_queries: usize,
    pub user_agent: Option<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        ToolsConfig {
            proxies: default_proxies(),
            health_scoring: true,
            search_timeout_secs: SEARCH_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            default_read_length: DEFAULT_READ_LENGTH,
            max_alternative_queries: MAX_ALTERNATIVE_QUERIES,
            user_agent: None,
        }
    }
}

/// `[chat]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub max_tool_rounds: u32,
    pub max_model_attempts: u32,
    pub model_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        ChatConfig {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            max_model_attempts: DEFAULT_MAX_MODEL_ATTEMPTS,
            model_timeout_secs: DEFAULT_MODEL_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub providers: ProvidersConfig,
    pub settings: Settings,
    pub tools: ToolsConfig,
    pub chat: ChatConfig,
}

// ── Loading ────────────────────────────────────────────────────────────

/// `~/.scoutchat/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".scoutchat").join("config.toml"))
}

impl AppConfig {
    /// Load from `path` (or the default location), then apply environment
    /// overrides. An explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_config_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => AppConfig::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.normalize()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_toml(&raw)?;
        info!("[config] loaded {}", path.display());
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> EngineResult<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Environment overrides; `lookup` is injectable for tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.providers
                .openai
                .get_or_insert_with(|| blank_provider(ProviderKind::OpenAI))
                .api_key = key;
        }
        if let Some(url) = non_empty("OPENAI_BASE_URL") {
            self.providers
                .openai
                .get_or_insert_with(|| blank_provider(ProviderKind::OpenAI))
                .base_url = Some(url);
        }
        if let Some(key) = non_empty("GEMINI_API_KEY") {
            self.providers
                .google
                .get_or_insert_with(|| blank_provider(ProviderKind::Google))
                .api_key = key;
        }
    }

    /// Fix up section-implied values and reject nonsense.
    fn normalize(&mut self) -> EngineResult<()> {
        if let Some(google) = self.providers.google.as_mut() {
            google.kind = ProviderKind::Google;
        }
        if let Some(openai) = self.providers.openai.as_ref() {
            if openai.kind == ProviderKind::Google {
                return Err(EngineError::Config(
                    "[providers.openai] cannot use kind = \"google\"; use [providers.google]"
                        .into(),
                ));
            }
        }
        if self.tools.proxies.is_empty() {
            return Err(EngineError::Config("[tools] proxies must not be empty".into()));
        }
        if self.tools.default_read_length == 0 {
            return Err(EngineError::Config("[tools] default_read_length must be positive".into()));
        }
        Ok(())
    }

    // ── Derived runtime pieces ─────────────────────────────────────────

    pub fn chat_options(&self) -> ChatOptions {
        ChatOptions {
            max_tool_rounds: self.chat.max_tool_rounds,
            max_model_attempts: self.chat.max_model_attempts.max(1),
            model_timeout: Duration::from_secs(self.chat.model_timeout_secs),
            default_read_length: self.tools.default_read_length,
            max_alternative_queries: self.tools.max_alternative_queries,
        }
    }

    pub fn proxy_pool(&self) -> ProxyPool {
        ProxyPool::new(self.tools.proxies.clone(), self.tools.health_scoring)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.tools.search_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.tools.request_timeout_secs)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.chat.model_timeout_secs)
    }
}

fn blank_provider(kind: ProviderKind) -> ProviderConfig {
    ProviderConfig { kind, api_key: String::new(), base_url: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::ReasoningDetail;
    use crate::engine::proxy::Envelope;
    use std::collections::HashMap;

    #[test]
    fn empty_file_means_defaults() {
        let c = AppConfig::from_toml("").unwrap();
        assert_eq!(c.settings, Settings::default());
        assert_eq!(c.tools.search_timeout_secs, 15);
        assert_eq!(c.tools.default_read_length, 1122);
        assert_eq!(c.chat.max_model_attempts, 3);
        assert_eq!(c.tools.proxies.len(), 4);
        assert_eq!(c.tools.proxies[3].envelope, Envelope::Direct);
    }

    #[test]
    fn sections_parse() {
        let c = AppConfig::from_toml(
            r#"
            [providers.google]
            api_key = "g-key"

            [settings]
            selected_model = "gemini-1.5-flash"
            enable_cot = true
            reasoning_detail_level = "detailed"

            [tools]
            health_scoring = false
            [[tools.proxies]]
            name = "ao"
            template = "https://ao.test/get?url={url}"
            envelope = "json_contents"

            [chat]
            max_tool_rounds = 2
            "#,
        )
        .unwrap();
        assert_eq!(c.settings.selected_model, "gemini-1.5-flash");
        assert_eq!(c.settings.reasoning_detail_level, ReasoningDetail::Detailed);
        assert!(c.settings.streaming);
        assert!(!c.tools.health_scoring);
        assert_eq!(c.tools.proxies.len(), 1);
        assert_eq!(c.tools.proxies[0].envelope, Envelope::JsonContents);
        assert_eq!(c.chat_options().max_tool_rounds, 2);
        assert_eq!(c.providers.google.unwrap().api_key, "g-key");
    }

    #[test]
    fn malformed_toml_is_config_error() {
        assert!(matches!(AppConfig::from_toml("[settings\nx"), Err(EngineError::Config(_))));
    }

    #[test]
    fn env_overrides_file() {
        let mut c = AppConfig::from_toml("[providers.openai]\napi_key = \"file\"").unwrap();
        let env: HashMap<&str, &str> =
            [("OPENAI_API_KEY", "env"), ("GEMINI_API_KEY", "gem"), ("OPENAI_BASE_URL", "")].into();
        c.apply_env(|k| env.get(k).map(|v| v.to_string()));
        c.normalize().unwrap();
        let openai = c.providers.openai.unwrap();
        assert_eq!(openai.api_key, "env");
        assert_eq!(openai.base_url, None);
        let google = c.providers.google.unwrap();
        assert_eq!(google.api_key, "gem");
        assert_eq!(google.kind, ProviderKind::Google);
    }

    #[test]
    fn empty_proxy_list_is_rejected() {
        let mut c = AppConfig::from_toml("[tools]\nproxies = []").unwrap();
        assert!(c.normalize().is_err());
    }
}
