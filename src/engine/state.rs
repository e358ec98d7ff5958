// scoutchat Engine — In-memory session state
//
// Conversation: the literal prompt sent upstream. Element 0 is always the
// system instruction; everything after it is append-only until `clear`.
//
// SeenUrls: urls already rendered as search results this session. Never
// cleared, not even when the conversation is.

use crate::atoms::types::{Message, Role};
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Conversation { messages: vec![Message::system(system_prompt)] }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(Message::assistant(content));
    }

    /// Refresh the system instruction in place.
    pub fn replace_system(&mut self, system_prompt: impl Into<String>) {
        self.messages[0] = Message::system(system_prompt);
    }

    /// Drop everything but a fresh system instruction.
    pub fn clear(&mut self, system_prompt: impl Into<String>) {
        self.messages.clear();
        self.messages.push(Message::system(system_prompt));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Only the system instruction is present.
    pub fn is_empty(&self) -> bool {
        self.messages.len() <= 1
    }

    /// Content of the most recent user turn, if any.
    pub fn last_user(&self) -> Option<&str> {
        self.messages.iter().rev().find(|m| m.role == Role::User).map(|m| m.content.as_str())
    }
}

#[derive(Debug, Default)]
pub struct SeenUrls {
    urls: HashSet<String>,
}

impl SeenUrls {
    /// Record `url`; `true` if it had not been seen before.
    pub fn insert(&mut self, url: &str) -> bool {
        self.urls.insert(url.to_string())
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_stays_first() {
        let mut c = Conversation::new("v1");
        c.push_user("hi");
        c.push_assistant("hello");
        c.replace_system("v2");
        assert_eq!(c.messages()[0], Message::system("v2"));
        assert_eq!(c.len(), 3);
        assert_eq!(c.last_user(), Some("hi"));

        c.clear("v3");
        assert_eq!(c.messages(), &[Message::system("v3")]);
        assert!(c.is_empty());
    }

    #[test]
    fn seen_urls_report_first_sighting() {
        let mut seen = SeenUrls::default();
        assert!(seen.insert("https://a"));
        assert!(!seen.insert("https://a"));
        assert!(seen.contains("https://a"));
        assert_eq!(seen.len(), 1);
    }
}
