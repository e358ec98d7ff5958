// ── scoutchat Atoms: Pure Data Types ─────────────────────────────────────────
// All plain struct/enum definitions that flow through the engine.
// Atoms layer rule: no I/O, no side effects, no imports from engine/.

use serde::{Deserialize, Serialize};

// ── Model / Provider Config ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAI,
    Google,
    Ollama,
    OpenRouter,
    Custom,
}

impl ProviderKind {
    pub fn default_base_url(&self) -> &str {
        match self {
            ProviderKind::OpenAI => "https://api.openai.com/v1",
            ProviderKind::Google => "https://generativelanguage.googleapis.com/v1beta",
            ProviderKind::Ollama => "http://localhost:11434/v1",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
            ProviderKind::Custom => "",
        }
    }

    /// Gemini-family model names go to Google; everything else speaks the
    /// OpenAI chat-completions dialect.
    pub fn for_model(model: &str) -> Self {
        if model.trim().to_ascii_lowercase().starts_with("gemini") {
            ProviderKind::Google
        } else {
            ProviderKind::OpenAI
        }
    }
}

// ── Messages ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// A finished model response, streamed or not.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
    /// Model name echoed back by the API, when it sends one.
    pub model: Option<String>,
}

// ── Settings ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningDetail {
    Brief,
    #[default]
    Standard,
    Detailed,
}

impl std::str::FromStr for ReasoningDetail {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "brief" => Ok(ReasoningDetail::Brief),
            "standard" => Ok(ReasoningDetail::Standard),
            "detailed" => Ok(ReasoningDetail::Detailed),
            other => Err(format!("unknown reasoning detail level '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub streaming: bool,
    pub enable_cot: bool,
    pub show_thinking: bool,
    pub selected_model: String,
    pub reasoning_detail_level: ReasoningDetail,
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            streaming: true,
            enable_cot: false,
            show_thinking: true,
            selected_model: "gpt-4o-mini".into(),
            reasoning_detail_level: ReasoningDetail::Standard,
            debug: false,
        }
    }
}

/// Partial update applied through `ChatController::update_settings`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    pub streaming: Option<bool>,
    pub enable_cot: Option<bool>,
    pub show_thinking: Option<bool>,
    pub selected_model: Option<String>,
    pub reasoning_detail_level: Option<ReasoningDetail>,
    pub debug: Option<bool>,
}

impl Settings {
    /// Apply a patch. Returns `true` when the system prompt must be rebuilt.
    pub fn apply(&mut self, patch: SettingsPatch) -> bool {
        let before = (self.enable_cot, self.reasoning_detail_level);
        if let Some(v) = patch.streaming {
            self.streaming = v;
        }
        if let Some(v) = patch.enable_cot {
            self.enable_cot = v;
        }
        if let Some(v) = patch.show_thinking {
            self.show_thinking = v;
        }
        if let Some(v) = patch.selected_model {
            if !v.trim().is_empty() {
                self.selected_model = v.trim().to_string();
            }
        }
        if let Some(v) = patch.reasoning_detail_level {
            self.reasoning_detail_level = v;
        }
        if let Some(v) = patch.debug {
            self.debug = v;
        }
        before != (self.enable_cot, self.reasoning_detail_level)
    }
}

// ── Tool Calling ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    WebSearch,
    ReadUrl,
    InstantAnswer,
}

impl ToolKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "web_search" => Some(ToolKind::WebSearch),
            "read_url" => Some(ToolKind::ReadUrl),
            "instant_answer" => Some(ToolKind::InstantAnswer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::WebSearch => "web_search",
            ToolKind::ReadUrl => "read_url",
            ToolKind::InstantAnswer => "instant_answer",
        }
    }
}

/// A tool call as emitted by the model: `{"tool": "...", "arguments": {...}}`.
/// The tool name is kept raw so unknown names can be reported to the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default = "empty_arguments")]
    pub arguments: serde_json::Value,
}

fn empty_arguments() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl ToolCall {
    pub fn kind(&self) -> Option<ToolKind> {
        ToolKind::parse(&self.tool)
    }

    /// Tool name plus canonical (key-sorted) arguments.
    pub fn signature(&self) -> String {
        format!("{}:{}", self.tool.trim(), self.arguments)
    }
}

// ── Tool results ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadResult {
    pub url: String,
    pub title: Option<String>,
    pub snippet: String,
    pub start: usize,
    pub length: usize,
    pub total_length: usize,
    pub has_more: bool,
}

/// Payload for `ChatView::render_tool_result_card`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolCard {
    SearchResults {
        query: String,
        results: Vec<SearchResult>,
        /// Indices into `results` the model suggested reading in full.
        highlighted: Vec<usize>,
    },
    Page(ReadResult),
    InstantAnswer {
        query: String,
        payload: serde_json::Value,
    },
}

/// What a manual retry affordance re-executes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RetryAction {
    ResendTurn,
    Search { query: String, engine: String },
    Read { url: String, start: usize, length: usize },
    InstantAnswer { query: String },
}

impl RetryAction {
    /// The tool call equivalent of this retry, if it is a tool retry.
    pub fn as_tool_call(&self) -> Option<ToolCall> {
        let (tool, arguments) = match self {
            RetryAction::ResendTurn => return None,
            RetryAction::Search { query, engine } => (
                ToolKind::WebSearch,
                serde_json::json!({ "query": query, "engine": engine }),
            ),
            RetryAction::Read { url, start, length } => (
                ToolKind::ReadUrl,
                serde_json::json!({ "url": url, "start": start, "length": length }),
            ),
            RetryAction::InstantAnswer { query } => {
                (ToolKind::InstantAnswer, serde_json::json!({ "query": query }))
            }
        };
        Some(ToolCall { tool: tool.as_str().to_string(), arguments })
    }
}

// ── Chain-of-thought ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StepKind {
    Fact,
    Assumption,
    Action,
    Decision,
    Step,
}

impl StepKind {
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "fact" => StepKind::Fact,
            "assumption" => StepKind::Assumption,
            "action" => StepKind::Action,
            "decision" => StepKind::Decision,
            _ => StepKind::Step,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Fact => "Fact",
            StepKind::Assumption => "Assumption",
            StepKind::Action => "Action",
            StepKind::Decision => "Decision",
            StepKind::Step => "Step",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReasoningStep {
    pub number: u32,
    pub kind: StepKind,
    pub text: String,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningStage {
    Thinking,
    Answering,
    Complete,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParsedReasoning {
    pub steps: Vec<ReasoningStep>,
    pub answer: String,
    pub has_structured_response: bool,
    pub partial: bool,
    pub stage: ReasoningStage,
    pub error: Option<String>,
}

// ── Controller state ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatPhase {
    Idle,
    Sending,
    AwaitingResponse,
    StreamingResponse,
    ToolDispatch,
}

/// How a send cycle ended. In-turn failures are outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Input was empty or whitespace-only; nothing happened.
    Rejected,
    /// The model produced a final answer.
    Answered(String),
    /// A handler stopped the turn (validation error, failed read, ...).
    Halted(String),
    /// The model request failed after all automatic retries.
    Failed(String),
    /// The same tool call was repeated past the threshold.
    LoopDetected(String),
    /// The tool round limit was reached before a final answer.
    RoundLimit,
}

/// Opaque handle for a pending assistant message in the view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageHandle(pub String);

impl MessageHandle {
    pub fn new() -> Self {
        MessageHandle(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for MessageHandle {
    fn default() -> Self {
        Self::new()
    }
}

// ── String helpers ─────────────────────────────────────────────────────

/// Truncate to at most `max_bytes` without splitting a UTF-8 character.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_patch_reports_prompt_changes() {
        let mut s = Settings::default();
        assert!(!s.apply(SettingsPatch { streaming: Some(false), ..Default::default() }));
        assert!(!s.streaming);
        assert!(s.apply(SettingsPatch { enable_cot: Some(true), ..Default::default() }));
        assert!(s.apply(SettingsPatch {
            reasoning_detail_level: Some(ReasoningDetail::Detailed),
            ..Default::default()
        }));
    }

    #[test]
    fn blank_model_name_is_ignored() {
        let mut s = Settings::default();
        s.apply(SettingsPatch { selected_model: Some("  ".into()), ..Default::default() });
        assert_eq!(s.selected_model, "gpt-4o-mini");
    }

    #[test]
    fn signature_is_key_order_independent() {
        let a: ToolCall =
            serde_json::from_str(r#"{"tool":"read_url","arguments":{"url":"https://a","start":0}}"#)
                .unwrap();
        let b: ToolCall =
            serde_json::from_str(r#"{"tool":"read_url","arguments":{"start":0,"url":"https://a"}}"#)
                .unwrap();
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn provider_kind_routes_gemini_models() {
        assert_eq!(ProviderKind::for_model("gemini-1.5-flash"), ProviderKind::Google);
        assert_eq!(ProviderKind::for_model("gpt-4o"), ProviderKind::OpenAI);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_utf8("héllo", 2), "h");
        assert_eq!(truncate_utf8("abc", 10), "abc");
    }

    #[test]
    fn retry_action_maps_back_to_tool_call() {
        let call = RetryAction::InstantAnswer { query: "paris".into() }.as_tool_call().unwrap();
        assert_eq!(call.kind(), Some(ToolKind::InstantAnswer));
        assert_eq!(call.arguments["query"], "paris");
        assert!(RetryAction::ResendTurn.as_tool_call().is_none());
    }
}
