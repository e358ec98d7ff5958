// ── Tool dispatch ──────────────────────────────────────────────────────
//
//   loop guard → resolve tool → validate arguments → handler
//
// Validation failures never touch the network. Handlers report their own
// failures to the view and return `Halt`; successful handlers leave their
// result in history and return `Continue` so the controller re-invokes the
// model.

use super::{ChatController, Session};
use crate::atoms::constants::{DEFAULT_SEARCH_ENGINE, MAX_HIGHLIGHTED_RESULTS};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{
    ChatPhase, Message, ReadResult, RetryAction, Role, SearchResult, ToolCall, ToolCard, ToolKind,
};
use crate::engine::prompts;
use crate::engine::text::filter_alternative_queries;
use crate::engine::tools::SearchEngine;
use log::{info, warn};
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Result is in history; hand control back to the model.
    Continue(ToolKind),
    /// The turn ends here; the reason has already been shown.
    Halt(String),
    /// The loop guard refused the call.
    LoopDetected(String),
}

// ── Argument validation ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchArgs {
    pub query: String,
    pub engine: SearchEngine,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadArgs {
    pub url: String,
    pub start: usize,
    pub length: usize,
}

static HTTP_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://\S+$").expect("url pattern"));

fn invalid(tool: ToolKind, message: impl Into<String>) -> EngineError {
    EngineError::tool(tool.as_str(), message)
}

fn required_string(args: &Value, tool: ToolKind, field: &str) -> EngineResult<String> {
    let value = args[field]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid(tool, format!("'{}' must be a non-empty string", field)))?;
    Ok(value.to_string())
}

/// Absent or null → `None`; anything but a non-negative integer is an error.
fn optional_uint(args: &Value, tool: ToolKind, field: &str) -> EngineResult<Option<usize>> {
    match &args[field] {
        Value::Null => Ok(None),
        v => v
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| invalid(tool, format!("'{}' must be a non-negative integer", field))),
    }
}

enum Validated {
    Search(SearchArgs),
    Read(ReadArgs),
    Instant(String),
}

pub fn validate_search(args: &Value) -> EngineResult<SearchArgs> {
    let tool = ToolKind::WebSearch;
    let query = required_string(args, tool, "query")?;
    let engine_name = match &args["engine"] {
        Value::Null => DEFAULT_SEARCH_ENGINE.to_string(),
        Value::String(s) if !s.trim().is_empty() => s.clone(),
        _ => return Err(invalid(tool, "'engine' must be a string")),
    };
    let engine = SearchEngine::parse(&engine_name).ok_or_else(|| {
        invalid(tool, format!("unsupported engine '{}' (use duckduckgo or bing)", engine_name))
    })?;
    Ok(SearchArgs { query, engine })
}

pub fn validate_read(args: &Value, default_length: usize) -> EngineResult<ReadArgs> {
    let tool = ToolKind::ReadUrl;
    let url = required_string(args, tool, "url")?;
    if !HTTP_URL_RE.is_match(&url) {
        return Err(invalid(tool, format!("'{}' is not an http(s) URL", url)));
    }
    let start = optional_uint(args, tool, "start")?.unwrap_or(0);
    let length = optional_uint(args, tool, "length")?.unwrap_or(default_length);
    if length == 0 {
        return Err(invalid(tool, "'length' must be positive"));
    }
    Ok(ReadArgs { url, start, length })
}

pub fn validate_instant(args: &Value) -> EngineResult<String> {
    required_string(args, ToolKind::InstantAnswer, "query")
}

/// History line for a page read.
fn page_transcript(page: &ReadResult) -> String {
    let end = (page.start + page.snippet.chars().count()).min(page.total_length);
    let mut header = format!(
        "Content of {} (characters {}-{} of {}",
        page.url, page.start, end, page.total_length
    );
    if page.has_more {
        header.push_str(", more available with a larger start");
    }
    header.push(')');
    if let Some(title) = &page.title {
        header.push_str(&format!("\nTitle: {}", title));
    }
    format!("{}:\n{}", header, page.snippet)
}

// ── Dispatcher ─────────────────────────────────────────────────────────

impl ChatController {
    pub(super) async fn dispatch(&self, session: &mut Session, call: &ToolCall) -> DispatchOutcome {
        if let Err(e) = session.guard.record(call) {
            let msg = format!(
                "⚠ Stopped: {}. Rephrase your request or ask something else to continue.",
                e
            );
            warn!("[chat] {}", e);
            self.view.render_message(Role::Assistant, &msg);
            return DispatchOutcome::LoopDetected(msg);
        }

        let Some(kind) = call.kind() else {
            return self.reject(session, format!("Unknown tool '{}'", call.tool));
        };

        self.set_phase(ChatPhase::ToolDispatch);
        info!("[chat] dispatch {} {}", kind.as_str(), call.arguments);

        let validated = match kind {
            ToolKind::WebSearch => validate_search(&call.arguments).map(Validated::Search),
            ToolKind::ReadUrl => validate_read(&call.arguments, self.options.default_read_length)
                .map(Validated::Read),
            ToolKind::InstantAnswer => validate_instant(&call.arguments).map(Validated::Instant),
        };
        match validated {
            Ok(Validated::Search(args)) => self.handle_search(session, args).await,
            Ok(Validated::Read(args)) => self.handle_read(session, args).await,
            Ok(Validated::Instant(query)) => self.handle_instant(session, query).await,
            Err(e) => self.reject(session, format!("Invalid tool call: {}", e)),
        }
    }

    fn reject(&self, session: &mut Session, msg: String) -> DispatchOutcome {
        warn!("[chat] {}", msg);
        self.view.render_message(Role::Assistant, &format!("⚠ {}", msg));
        session.conversation.push_assistant(msg.clone());
        DispatchOutcome::Halt(msg)
    }

    // ── web_search ─────────────────────────────────────────────────────

    async fn handle_search(&self, session: &mut Session, args: SearchArgs) -> DispatchOutcome {
        let SearchArgs { query, engine } = args;
        self.view.show_status(&format!("Searching for \"{}\"…", query));

        let mut queries = vec![query.clone()];
        queries.extend(self.alternative_queries(&query).await);

        let mut merged: Vec<SearchResult> = Vec::new();
        let mut urls: HashSet<String> = HashSet::new();
        for (i, q) in queries.iter().enumerate() {
            self.view.show_status(&format!("Searching ({}/{}): {}", i + 1, queries.len(), q));
            match self.tools.search(q, engine).await {
                Ok(results) => {
                    for r in results {
                        if urls.insert(r.url.clone()) {
                            merged.push(r);
                        }
                    }
                }
                Err(e) => {
                    warn!("[chat] search '{}' failed: {}", q, e);
                    if e.is_retryable() {
                        let action = RetryAction::Search {
                            query: q.clone(),
                            engine: engine.as_str().into(),
                        };
                        self.view.offer_retry(&action, &e.to_string());
                    }
                    session
                        .conversation
                        .push_assistant(format!("Search for \"{}\" failed: {}", q, e));
                }
            }
        }

        if merged.is_empty() {
            let msg = format!("No results found for \"{}\".", query);
            self.view.render_message(Role::Assistant, &msg);
            session.conversation.push_assistant(msg);
            return DispatchOutcome::Continue(ToolKind::WebSearch);
        }

        let lines: Vec<String> = merged
            .iter()
            .enumerate()
            .map(|(i, r)| prompts::format_search_result_line(i, r))
            .collect();
        session
            .conversation
            .push_assistant(format!("Search results for \"{}\":\n{}", query, lines.join("\n")));

        let picked = self.select_results(&query, &merged).await;

        // Only urls not shown earlier this session reach the card.
        let mut fresh: Vec<SearchResult> = Vec::new();
        let mut highlighted: Vec<usize> = Vec::new();
        for (i, r) in merged.into_iter().enumerate() {
            if session.seen_urls.insert(&r.url) {
                if picked.contains(&i) {
                    highlighted.push(fresh.len());
                }
                fresh.push(r);
            }
        }

        if fresh.is_empty() {
            self.view.show_status("All results were already shown earlier in this session.");
        } else {
            self.view.render_tool_result_card(&ToolCard::SearchResults {
                query: query.clone(),
                results: fresh,
                highlighted,
            });
        }
        DispatchOutcome::Continue(ToolKind::WebSearch)
    }

    /// Paraphrases from the model, filtered for near-duplicates. Any failure
    /// means "search the original only".
    async fn alternative_queries(&self, query: &str) -> Vec<String> {
        let max = self.options.max_alternative_queries;
        if max == 0 {
            return Vec::new();
        }
        let prompt = prompts::alternative_queries_prompt(query, max);
        match self.complete_once(&prompt).await {
            Ok(text) => {
                let suggestions = prompts::parse_alternative_queries(&text);
                let kept = filter_alternative_queries(query, &suggestions, max);
                info!("[chat] alternative queries for '{}': {:?}", query, kept);
                kept
            }
            Err(e) => {
                warn!("[chat] alternative query generation failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Indices into `results` the model thinks are worth reading in full.
    async fn select_results(&self, query: &str, results: &[SearchResult]) -> Vec<usize> {
        let prompt = prompts::result_selection_prompt(query, results);
        match self.complete_once(&prompt).await {
            Ok(text) => {
                let mut picked = prompts::parse_selected_indices(&text, results.len());
                picked.truncate(MAX_HIGHLIGHTED_RESULTS);
                picked
            }
            Err(e) => {
                warn!("[chat] result selection failed: {}", e);
                Vec::new()
            }
        }
    }

    // ── read_url ───────────────────────────────────────────────────────

    async fn handle_read(&self, session: &mut Session, args: ReadArgs) -> DispatchOutcome {
        let ReadArgs { url, start, length } = args;
        self.view.show_status(&format!("Reading {}…", url));

        match self.tools.read_url(&url, start, length).await {
            Ok(page) => {
                session.conversation.push_assistant(page_transcript(&page));
                self.view.render_tool_result_card(&ToolCard::Page(page));
                DispatchOutcome::Continue(ToolKind::ReadUrl)
            }
            Err(e) => {
                let msg = format!("Could not read {}: {}", url, e);
                warn!("[chat] {}", msg);
                self.view.render_message(Role::Assistant, &format!("⚠ {}", msg));
                if e.is_retryable() {
                    let action = RetryAction::Read { url: url.clone(), start, length };
                    self.view.offer_retry(&action, &e.to_string());
                }
                session.conversation.push_assistant(msg.clone());
                DispatchOutcome::Halt(msg)
            }
        }
    }

    // ── instant_answer ─────────────────────────────────────────────────

    async fn handle_instant(&self, session: &mut Session, query: String) -> DispatchOutcome {
        self.view.show_status(&format!("Looking up \"{}\"…", query));

        match self.tools.instant_answer(&query).await {
            Ok(answer) => {
                session.conversation.push(Message::assistant(answer.pretty));
                self.view.render_tool_result_card(&ToolCard::InstantAnswer {
                    query,
                    payload: answer.payload,
                });
                DispatchOutcome::Continue(ToolKind::InstantAnswer)
            }
            Err(e) => {
                let msg = format!("Instant answer for \"{}\" failed: {}", query, e);
                warn!("[chat] {}", msg);
                self.view.render_message(Role::Assistant, &format!("⚠ {}", msg));
                self.view.offer_retry(&RetryAction::InstantAnswer { query }, &e.to_string());
                session.conversation.push_assistant(msg.clone());
                DispatchOutcome::Halt(msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_args_default_engine() {
        let a = validate_search(&json!({"query": " rust "})).unwrap();
        assert_eq!(a.query, "rust");
        assert_eq!(a.engine, SearchEngine::DuckDuckGo);
        let b = validate_search(&json!({"query": "x", "engine": "bing"})).unwrap();
        assert_eq!(b.engine, SearchEngine::Bing);
    }

    #[test]
    fn search_args_rejections() {
        assert!(validate_search(&json!({})).is_err());
        assert!(validate_search(&json!({"query": "   "})).is_err());
        assert!(validate_search(&json!({"query": "x", "engine": "yahoo"})).is_err());
        assert!(validate_search(&json!({"query": "x", "engine": 3})).is_err());
    }

    #[test]
    fn read_args_defaults_and_bounds() {
        let a = validate_read(&json!({"url": "https://example.com"}), 1122).unwrap();
        assert_eq!((a.start, a.length), (0, 1122));
        let args = json!({"url": "HTTP://example.com/x", "start": 5, "length": 10});
        let a = validate_read(&args, 1122).unwrap();
        assert_eq!((a.start, a.length), (5, 10));
    }

    #[test]
    fn read_args_rejections() {
        assert!(validate_read(&json!({"url": "ftp://example.com"}), 10).is_err());
        assert!(validate_read(&json!({"url": "example.com"}), 10).is_err());
        assert!(validate_read(&json!({"url": "https://a b"}), 10).is_err());
        assert!(validate_read(&json!({"url": "https://a", "start": -1}), 10).is_err());
        assert!(validate_read(&json!({"url": "https://a", "start": "3"}), 10).is_err());
        assert!(validate_read(&json!({"url": "https://a", "length": 0}), 10).is_err());
    }

    #[test]
    fn instant_args() {
        assert_eq!(
            validate_instant(&json!({"query": "capital of France"})).unwrap(),
            "capital of France"
        );
        assert!(validate_instant(&json!({"query": 7})).is_err());
    }

    #[test]
    fn page_transcript_mentions_window() {
        let page = ReadResult {
            url: "https://a".into(),
            title: Some("A".into()),
            snippet: "Hello worl".into(),
            start: 0,
            length: 10,
            total_length: 19,
            has_more: true,
        };
        let t = page_transcript(&page);
        assert!(t.starts_with("Content of https://a (characters 0-10 of 19, more available"));
        assert!(t.ends_with("Title: A:\nHello worl"));
    }
}
