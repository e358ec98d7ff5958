// scoutchat Engine — Chat controller
//
// One send cycle:
//
//   Idle → Sending → StreamingResponse | AwaitingResponse
//        → (tool call?) ToolDispatch → continuation nudge → model again …
//        → Idle
//
// The whole cycle runs under the session mutex; a second send while one is
// in flight fails fast with `EngineError::Busy`. Model timeouts are retried
// automatically (`max_model_attempts` in total) before a manual retry is
// offered. Every in-turn failure ends as a `TurnOutcome`, never an `Err`.

pub mod dispatch;
pub mod guard;

pub use dispatch::DispatchOutcome;
pub use guard::LoopGuard;

use crate::atoms::constants::{
    DEFAULT_MAX_MODEL_ATTEMPTS, DEFAULT_MAX_TOOL_ROUNDS, DEFAULT_MODEL_TIMEOUT_SECS,
    DEFAULT_READ_LENGTH, MAX_ALTERNATIVE_QUERIES,
};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{ChatView, ModelProvider};
use crate::atoms::types::{
    ChatPhase, Completion, Message, MessageHandle, RetryAction, Role, Settings, SettingsPatch,
    TokenUsage, TurnOutcome,
};
use crate::engine::prompts::{continuation_nudge, system_prompt};
use crate::engine::reasoning::{parse_reasoning, render_reasoning};
use crate::engine::state::{Conversation, SeenUrls};
use crate::engine::tool_call::{extract_tool_call, looks_like_tool_call_prefix};
use crate::engine::tools::ToolsService;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;

// ── Options ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub max_tool_rounds: u32,
    pub max_model_attempts: u32,
    pub model_timeout: Duration,
    pub default_read_length: usize,
    pub max_alternative_queries: usize,
}

impl Default for ChatOptions {
    fn default() -> Self {
        ChatOptions {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            max_model_attempts: DEFAULT_MAX_MODEL_ATTEMPTS,
            model_timeout: Duration::from_secs(DEFAULT_MODEL_TIMEOUT_SECS),
            default_read_length: DEFAULT_READ_LENGTH,
            max_alternative_queries: MAX_ALTERNATIVE_QUERIES,
        }
    }
}

// ── Session ────────────────────────────────────────────────────────────

/// Everything a send cycle mutates. Lives behind the session mutex.
pub(crate) struct Session {
    pub(crate) conversation: Conversation,
    pub(crate) seen_urls: SeenUrls,
    pub(crate) guard: LoopGuard,
}

/// Restores the idle state on every exit path of a cycle.
struct CycleGuard<'a> {
    controller: &'a ChatController,
}

impl<'a> CycleGuard<'a> {
    fn engage(controller: &'a ChatController) -> Self {
        controller.view.set_input_locked(true);
        controller.set_phase(ChatPhase::Sending);
        CycleGuard { controller }
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.controller.set_phase(ChatPhase::Idle);
        self.controller.view.clear_status();
        self.controller.view.set_input_locked(false);
    }
}

/// Final text of one model call plus the pending message it streamed into.
struct ModelReply {
    text: String,
    pending: Option<MessageHandle>,
}

fn no_response_within(limit: Duration) -> EngineError {
    EngineError::Timeout(format!("no response within {}s", limit.as_secs()))
}

// ── Controller ─────────────────────────────────────────────────────────

pub struct ChatController {
    provider: Arc<dyn ModelProvider>,
    tools: Arc<ToolsService>,
    view: Arc<dyn ChatView>,
    options: ChatOptions,
    settings: RwLock<Settings>,
    phase: Mutex<ChatPhase>,
    usage: Mutex<TokenUsage>,
    session: tokio::sync::Mutex<Session>,
}

impl ChatController {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        tools: Arc<ToolsService>,
        view: Arc<dyn ChatView>,
        settings: Settings,
        options: ChatOptions,
    ) -> Self {
        let session = Session {
            conversation: Conversation::new(system_prompt(&settings)),
            seen_urls: SeenUrls::default(),
            guard: LoopGuard::default(),
        };
        ChatController {
            provider,
            tools,
            view,
            options,
            settings: RwLock::new(settings),
            phase: Mutex::new(ChatPhase::Idle),
            usage: Mutex::new(TokenUsage::default()),
            session: tokio::sync::Mutex::new(session),
        }
    }

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    pub fn phase(&self) -> ChatPhase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: ChatPhase) {
        *self.phase.lock() = phase;
    }

    /// Tokens reported by the provider since the conversation started.
    pub fn usage(&self) -> TokenUsage {
        self.usage.lock().clone()
    }

    fn record_usage(&self, completion: &Completion, requested: &str) {
        let Some(u) = &completion.usage else { return };
        let mut total = self.usage.lock();
        total.input_tokens += u.input_tokens;
        total.output_tokens += u.output_tokens;
        total.total_tokens += u.total_tokens;
        info!(
            "[chat] {} used {} in / {} out tokens (session total {})",
            completion.model.as_deref().unwrap_or(requested),
            u.input_tokens,
            u.output_tokens,
            total.total_tokens
        );
    }

    pub fn tools(&self) -> &ToolsService {
        &self.tools
    }

    /// Snapshot of the conversation, system instruction first.
    pub async fn history(&self) -> Vec<Message> {
        self.session.lock().await.conversation.messages().to_vec()
    }

    /// Apply a settings patch. When the patch changes the system prompt and
    /// no cycle is running, history element 0 is refreshed right away;
    /// otherwise the next model call picks it up.
    pub fn update_settings(&self, patch: SettingsPatch) -> Settings {
        let (rebuild, snapshot) = {
            let mut settings = self.settings.write();
            let rebuild = settings.apply(patch);
            (rebuild, settings.clone())
        };
        if rebuild {
            if let Ok(mut session) = self.session.try_lock() {
                session.conversation.replace_system(system_prompt(&snapshot));
            }
        }
        info!(
            "[chat] settings: model={} streaming={} cot={} detail={:?}",
            snapshot.selected_model,
            snapshot.streaming,
            snapshot.enable_cot,
            snapshot.reasoning_detail_level
        );
        snapshot
    }

    /// Reset the conversation to a fresh system instruction. Urls already
    /// shown stay remembered.
    pub fn clear_conversation(&self) -> EngineResult<()> {
        let mut session = self.session.try_lock().map_err(|_| EngineError::Busy)?;
        let prompt = system_prompt(&self.settings.read());
        session.conversation.clear(prompt);
        session.guard.reset();
        *self.usage.lock() = TokenUsage::default();
        info!("[chat] conversation cleared");
        Ok(())
    }

    // ── Send cycle ─────────────────────────────────────────────────────

    pub async fn send_message(&self, text: &str) -> EngineResult<TurnOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(TurnOutcome::Rejected);
        }
        let mut session = self.session.try_lock().map_err(|_| EngineError::Busy)?;
        let _cycle = CycleGuard::engage(self);

        info!("[chat] send ({} chars)", text.len());
        session.guard.reset();
        session.conversation.push_user(text);
        self.view.render_message(Role::User, text);

        Ok(self.run_turn(&mut session).await)
    }

    /// Re-execute a retry affordance.
    pub async fn retry(&self, action: RetryAction) -> EngineResult<TurnOutcome> {
        let mut session = self.session.try_lock().map_err(|_| EngineError::Busy)?;
        let _cycle = CycleGuard::engage(self);
        info!("[chat] retry {:?}", action);

        let Some(call) = action.as_tool_call() else {
            if session.conversation.last_user().is_none() {
                return Ok(TurnOutcome::Rejected);
            }
            return Ok(self.run_turn(&mut session).await);
        };

        session.guard.reset();
        Ok(match self.dispatch(&mut session, &call).await {
            DispatchOutcome::Continue(kind) => {
                session.conversation.push_user(continuation_nudge(kind));
                self.run_turn(&mut session).await
            }
            DispatchOutcome::Halt(reason) => TurnOutcome::Halted(reason),
            DispatchOutcome::LoopDetected(msg) => TurnOutcome::LoopDetected(msg),
        })
    }

    /// Model → (tool → nudge → model)* → answer.
    async fn run_turn(&self, session: &mut Session) -> TurnOutcome {
        let mut rounds = 0u32;
        loop {
            let settings = self.settings.read().clone();
            self.sync_system_prompt(session, &settings);

            let reply = match self.call_model(session.conversation.messages(), &settings).await {
                Ok(r) => r,
                Err(outcome) => return outcome,
            };
            if settings.debug {
                debug!("[chat] raw model output: {}", reply.text);
            }

            let Some(call) = extract_tool_call(&reply.text) else {
                self.show_answer(&reply, &settings);
                session.conversation.push_assistant(reply.text.clone());
                return TurnOutcome::Answered(reply.text);
            };

            if rounds >= self.options.max_tool_rounds {
                let msg = format!(
                    "⚠ Stopped after {} tool calls without a final answer. Ask again to continue.",
                    rounds
                );
                warn!("[chat] tool round limit reached");
                self.show_error(reply.pending.as_ref(), &msg);
                return TurnOutcome::RoundLimit;
            }
            rounds += 1;

            self.replace_pending(&reply, &format!("Using {}…", call.tool));
            session.conversation.push_assistant(reply.text.clone());

            match self.dispatch(session, &call).await {
                DispatchOutcome::Continue(kind) => {
                    session.conversation.push_user(continuation_nudge(kind));
                }
                DispatchOutcome::Halt(reason) => return TurnOutcome::Halted(reason),
                DispatchOutcome::LoopDetected(msg) => return TurnOutcome::LoopDetected(msg),
            }
        }
    }

    fn sync_system_prompt(&self, session: &mut Session, settings: &Settings) {
        let prompt = system_prompt(settings);
        if session.conversation.messages()[0].content != prompt {
            session.conversation.replace_system(prompt);
        }
    }

    // ── Model calls ────────────────────────────────────────────────────

    /// One model request with automatic timeout retries. Errors come back
    /// as the turn outcome, already reported to the view.
    async fn call_model(
        &self,
        history: &[Message],
        settings: &Settings,
    ) -> Result<ModelReply, TurnOutcome> {
        let attempts = self.options.max_model_attempts.max(1);
        let pending = settings.streaming.then(|| self.view.create_pending_ai_message());
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                self.view.show_status(&format!(
                    "Model timed out, retrying (attempt {}/{})…",
                    attempt, attempts
                ));
            }
            match self.model_once(history, settings, pending.as_ref()).await {
                Ok(completion) => {
                    self.view.clear_status();
                    self.record_usage(&completion, &settings.selected_model);
                    return Ok(ModelReply { text: completion.text, pending });
                }
                Err(EngineError::Timeout(msg)) => {
                    warn!("[chat] model timeout on attempt {}/{}: {}", attempt, attempts, msg);
                    last_error = msg;
                }
                Err(e) => {
                    let msg = format!("⚠ The model request failed: {}", e);
                    warn!("[chat] {}", msg);
                    self.show_error(pending.as_ref(), &msg);
                    self.view.offer_retry(&RetryAction::ResendTurn, &e.to_string());
                    return Err(TurnOutcome::Failed(e.to_string()));
                }
            }
        }

        let reason = format!("timed out after {} attempts ({})", attempts, last_error);
        self.show_error(pending.as_ref(), &format!("⚠ The model {}.", reason));
        self.view.offer_retry(&RetryAction::ResendTurn, &reason);
        Err(TurnOutcome::Failed(reason))
    }

    async fn model_once(
        &self,
        history: &[Message],
        settings: &Settings,
        pending: Option<&MessageHandle>,
    ) -> EngineResult<Completion> {
        let model = settings.selected_model.as_str();
        let limit = self.options.model_timeout;

        let result = match pending {
            None => {
                self.set_phase(ChatPhase::AwaitingResponse);
                self.view.show_status("Waiting for the model…");
                tokio::time::timeout(limit, self.provider.complete(model, history)).await
            }
            Some(handle) => {
                self.set_phase(ChatPhase::StreamingResponse);
                let (cot, show_thinking) = (settings.enable_cot, settings.show_thinking);
                let view = &self.view;
                let mut buffer = String::new();
                let mut on_chunk = |delta: &str| {
                    buffer.push_str(delta);
                    // Tool calls are not prose; keep them out of the bubble.
                    if looks_like_tool_call_prefix(&buffer) {
                        return;
                    }
                    let shown = if cot {
                        render_reasoning(&parse_reasoning(&buffer, true), show_thinking)
                    } else {
                        buffer.clone()
                    };
                    view.update_message_content(handle, &shown);
                };
                let stream = self.provider.stream(model, history, &mut on_chunk);
                tokio::time::timeout(limit, stream).await
            }
        };

        result.map_err(|_| no_response_within(limit))?
    }

    /// Reentrant one-shot call used by the search handler.
    pub(crate) async fn complete_once(&self, prompt: &[Message]) -> EngineResult<String> {
        let model = self.settings.read().selected_model.clone();
        let limit = self.options.model_timeout;
        let completion = tokio::time::timeout(limit, self.provider.complete(&model, prompt))
            .await
            .map_err(|_| no_response_within(limit))??;
        self.record_usage(&completion, &model);
        Ok(completion.text)
    }

    // ── Rendering ──────────────────────────────────────────────────────

    fn show_answer(&self, reply: &ModelReply, settings: &Settings) {
        let shown = if settings.enable_cot {
            render_reasoning(&parse_reasoning(&reply.text, false), settings.show_thinking)
        } else {
            reply.text.clone()
        };
        match &reply.pending {
            Some(handle) => self.view.update_message_content(handle, &shown),
            None => self.view.render_message(Role::Assistant, &shown),
        }
    }

    /// Swap a streamed bubble's content for a note; non-streaming turns
    /// get a status line instead.
    fn replace_pending(&self, reply: &ModelReply, note: &str) {
        match &reply.pending {
            Some(handle) => self.view.update_message_content(handle, note),
            None => self.view.show_status(note),
        }
    }

    fn show_error(&self, pending: Option<&MessageHandle>, msg: &str) {
        match pending {
            Some(handle) => self.view.update_message_content(handle, msg),
            None => self.view.render_message(Role::Assistant, msg),
        }
    }
}
