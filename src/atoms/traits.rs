// ── scoutchat Atoms: Collaborator Traits ─────────────────────────────────────
// The three seams the controller talks through: model providers, outbound
// HTTP, and the view. Concrete implementations live in engine/ and in the CLI.

use crate::atoms::error::EngineResult;
use crate::atoms::types::{
    Completion, Message, MessageHandle, RetryAction, Role, ToolCard,
};
use async_trait::async_trait;
use std::time::Duration;

// ── Model providers ────────────────────────────────────────────────────

/// Callback receiving each streamed text delta.
pub type ChunkSink<'a> = &'a mut (dyn FnMut(&str) + Send);

#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;

    /// One-shot completion over the full history.
    async fn complete(&self, model: &str, history: &[Message]) -> EngineResult<Completion>;

    /// Streaming completion. `on_chunk` sees every text delta in order; the
    /// returned completion carries the concatenated text.
    async fn stream(
        &self,
        model: &str,
        history: &[Message],
        on_chunk: ChunkSink<'_>,
    ) -> EngineResult<Completion>;
}

// ── Outbound HTTP ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Plain GET transport used by the tools. Non-2xx statuses are returned,
/// not raised; transport failures are errors.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get(&self, url: &str, timeout: Option<Duration>) -> EngineResult<HttpResponse>;
}

// ── View ───────────────────────────────────────────────────────────────

/// Presentation layer. Purely reactive: the controller calls these and never
/// reads anything back except the pending-message handle.
pub trait ChatView: Send + Sync {
    fn render_message(&self, role: Role, text: &str);
    fn render_tool_result_card(&self, card: &ToolCard);
    fn show_status(&self, text: &str);
    fn clear_status(&self);
    fn create_pending_ai_message(&self) -> MessageHandle;
    fn update_message_content(&self, handle: &MessageHandle, text: &str);
    fn set_input_locked(&self, locked: bool);
    fn offer_retry(&self, action: &RetryAction, reason: &str);
}
