// ── Loop guard ─────────────────────────────────────────────────────────
// Counts consecutive dispatches of the same tool signature. The call that
// pushes the count past the threshold is refused.

use crate::atoms::constants::TOOL_REPEAT_THRESHOLD;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::ToolCall;

#[derive(Debug)]
pub struct LoopGuard {
    last_signature: Option<String>,
    repeat_count: u32,
    threshold: u32,
}

impl Default for LoopGuard {
    fn default() -> Self {
        LoopGuard::new(TOOL_REPEAT_THRESHOLD)
    }
}

impl LoopGuard {
    pub fn new(threshold: u32) -> Self {
        LoopGuard { last_signature: None, repeat_count: 0, threshold }
    }

    /// Record a dispatch attempt. Errors with `LoopDetected` once the same
    /// signature has been seen more than `threshold` times in a row.
    pub fn record(&mut self, call: &ToolCall) -> EngineResult<u32> {
        let signature = call.signature();
        if self.last_signature.as_deref() == Some(signature.as_str()) {
            self.repeat_count += 1;
        } else {
            self.last_signature = Some(signature);
            self.repeat_count = 1;
        }

        if self.repeat_count > self.threshold {
            return Err(EngineError::LoopDetected {
                tool: call.tool.clone(),
                count: self.repeat_count,
            });
        }
        Ok(self.repeat_count)
    }

    pub fn reset(&mut self) {
        self.last_signature = None;
        self.repeat_count = 0;
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(query: &str) -> ToolCall {
        ToolCall { tool: "web_search".into(), arguments: json!({ "query": query }) }
    }

    #[test]
    fn fourth_identical_call_trips() {
        let mut g = LoopGuard::default();
        for expected in 1..=3 {
            assert_eq!(g.record(&call("rust")).unwrap(), expected);
        }
        match g.record(&call("rust")) {
            Err(EngineError::LoopDetected { tool, count }) => {
                assert_eq!(tool, "web_search");
                assert_eq!(count, 4);
            }
            other => panic!("expected loop detection, got {:?}", other),
        }
    }

    #[test]
    fn new_signature_resets_count() {
        let mut g = LoopGuard::default();
        g.record(&call("a")).unwrap();
        g.record(&call("a")).unwrap();
        assert_eq!(g.record(&call("b")).unwrap(), 1);
        assert_eq!(g.repeat_count(), 1);
    }

    #[test]
    fn reset_forgets_history() {
        let mut g = LoopGuard::default();
        for _ in 0..3 {
            g.record(&call("a")).unwrap();
        }
        g.reset();
        assert_eq!(g.record(&call("a")).unwrap(), 1);
    }
}
