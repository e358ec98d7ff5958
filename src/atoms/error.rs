// ── scoutchat Atoms: Error Types ───────────────────────────────────────────
// Single canonical error enum for the engine, built with `thiserror`.
//
// Design rules:
//   • Variants follow the failure taxonomy of a chat turn: transport,
//     exhaustion, timeout, loop, validation (Tool), provider.
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • No variant carries an API key in its message.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP / network failure (reqwest layer).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Model provider HTTP or API-level failure.
    #[error("Provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    /// Tool argument validation or execution failure.
    #[error("Tool error: {tool}: {message}")]
    Tool { tool: String, message: String },

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An outbound call did not finish in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Every proxy in the pool was tried and none produced a usable body.
    #[error("All proxies failed after {attempts} attempt(s): {last_error}")]
    ProxiesExhausted { attempts: usize, last_error: String },

    /// The model kept issuing the same tool call.
    #[error("Tool call loop detected: '{tool}' repeated {count} times")]
    LoopDetected { tool: String, count: u32 },

    /// A send cycle is already in flight.
    #[error("A message is already being processed")]
    Busy,

    /// Catch-all for errors that do not yet have a dedicated variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl EngineError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider { provider: provider.into(), message: message.into() }
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool { tool: tool.into(), message: message.into() }
    }

    /// Timeouts and exhausted proxies are worth offering a manual retry for.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Timeout(_) | EngineError::ProxiesExhausted { .. } => true,
            EngineError::Network(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

// ── String → EngineError ───────────────────────────────────────────────────
// Allows `.ok_or("...")?` inside functions returning `EngineResult<T>`.

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError::Other(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError::Other(s.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(e: toml::de::Error) -> Self {
        EngineError::Config(e.to_string())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All engine operations return this type.
pub type EngineResult<T> = Result<T, EngineError>;

impl From<EngineError> for String {
    fn from(e: EngineError) -> Self {
        e.to_string()
    }
}
