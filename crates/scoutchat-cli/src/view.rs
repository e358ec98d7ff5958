// Terminal implementation of ChatView.
// Answers and cards go to stdout, status lines to stderr. A pending message
// is printed incrementally: when new content extends what is already on
// screen only the tail is written, otherwise the message is reprinted.

use parking_lot::Mutex;
use scoutchat::{ChatView, MessageHandle, RetryAction, Role, ToolCard};
use std::io::Write;

#[derive(Default)]
struct PendingMessage {
    handle: Option<MessageHandle>,
    printed: String,
}

#[derive(Default)]
pub struct TerminalView {
    pending: Mutex<PendingMessage>,
    /// Retry affordances offered during the latest cycle, oldest first.
    retries: Mutex<Vec<RetryAction>>,
    /// Echo user messages (one-shot mode); the REPL already shows them.
    echo_user: bool,
}

impl TerminalView {
    pub fn new(echo_user: bool) -> Self {
        TerminalView { echo_user, ..Default::default() }
    }

    /// Every pending retry affordance, consumed by `/retry`.
    pub fn take_retries(&self) -> Vec<RetryAction> {
        std::mem::take(&mut *self.retries.lock())
    }

    /// Terminate a streamed message with a newline.
    pub fn finish_pending(&self) {
        let mut pending = self.pending.lock();
        if pending.handle.take().is_some() && !pending.printed.is_empty() {
            println!();
        }
        pending.printed.clear();
    }
}

fn flush() {
    let _ = std::io::stdout().flush();
}

impl ChatView for TerminalView {
    fn render_message(&self, role: Role, text: &str) {
        match role {
            Role::User if !self.echo_user => {}
            Role::User => println!("> {}\n", text),
            Role::Assistant => {
                self.finish_pending();
                println!("{}\n", text);
            }
            Role::System => eprintln!("[system] {}", text),
        }
    }

    fn render_tool_result_card(&self, card: &ToolCard) {
        self.finish_pending();
        match card {
            ToolCard::SearchResults { query, results, highlighted } => {
                println!("── Search results for \"{}\" ──", query);
                for (i, r) in results.iter().enumerate() {
                    let mark = if highlighted.contains(&i) { "★" } else { " " };
                    println!("{} {}. {}\n     {}", mark, i + 1, r.title, r.url);
                    if !r.snippet.is_empty() {
                        println!("     {}", r.snippet);
                    }
                }
            }
            ToolCard::Page(page) => {
                let title = page.title.as_deref().unwrap_or(&page.url);
                println!("── {} ──", title);
                println!("{}", page.snippet);
                let end = page.start + page.snippet.chars().count();
                println!(
                    "   [{}–{} of {} chars{}]",
                    page.start,
                    end,
                    page.total_length,
                    if page.has_more { ", more available" } else { "" }
                );
            }
            ToolCard::InstantAnswer { query, payload } => {
                println!("── Instant answer: \"{}\" ──", query);
                let answer = ["Answer", "AbstractText", "Definition"]
                    .iter()
                    .find_map(|k| payload[*k].as_str().filter(|s| !s.is_empty()));
                match answer {
                    Some(text) => println!("{}", text),
                    None => {
                        let pretty = serde_json::to_string_pretty(payload)
                            .unwrap_or_else(|_| payload.to_string());
                        println!("{}", pretty);
                    }
                }
            }
        }
        println!();
    }

    fn show_status(&self, text: &str) {
        eprintln!("… {}", text);
    }

    fn clear_status(&self) {}

    fn create_pending_ai_message(&self) -> MessageHandle {
        self.finish_pending();
        let handle = MessageHandle::new();
        self.pending.lock().handle = Some(handle.clone());
        handle
    }

    fn update_message_content(&self, handle: &MessageHandle, text: &str) {
        let mut pending = self.pending.lock();
        if pending.handle.as_ref() != Some(handle) {
            return;
        }
        if let Some(tail) = text.strip_prefix(pending.printed.as_str()) {
            print!("{}", tail);
        } else {
            if !pending.printed.is_empty() {
                println!();
            }
            print!("{}", text);
        }
        pending.printed = text.to_string();
        flush();
    }

    fn set_input_locked(&self, locked: bool) {
        if locked {
            // A new cycle supersedes affordances from the previous one.
            self.retries.lock().clear();
        } else {
            self.finish_pending();
        }
        log::debug!("[cli] input {}", if locked { "locked" } else { "unlocked" });
    }

    fn offer_retry(&self, action: &RetryAction, reason: &str) {
        self.finish_pending();
        eprintln!("↻ {} (type /retry to try again)", reason);
        let mut retries = self.retries.lock();
        if !retries.contains(action) {
            retries.push(action.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search(query: &str) -> RetryAction {
        RetryAction::Search { query: query.into(), engine: "duckduckgo".into() }
    }

    #[test]
    fn every_failed_step_stays_retryable() {
        let view = TerminalView::new(false);
        view.set_input_locked(true);
        view.offer_retry(&search("green tea benefits"), "proxies exhausted");
        view.offer_retry(&search("matcha health effects"), "timed out");
        view.offer_retry(&search("green tea benefits"), "proxies exhausted");
        view.set_input_locked(false);

        assert_eq!(
            view.take_retries(),
            vec![search("green tea benefits"), search("matcha health effects")]
        );
        assert!(view.take_retries().is_empty());
    }

    #[test]
    fn new_cycle_drops_stale_retries() {
        let view = TerminalView::new(false);
        view.offer_retry(&RetryAction::ResendTurn, "timed out");
        view.set_input_locked(true);
        assert!(view.take_retries().is_empty());
    }
}
