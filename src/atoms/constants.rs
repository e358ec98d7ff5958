// ── scoutchat Atoms: Constants ───────────────────────────────────────────────
// Named limits and defaults shared across layers.

// ── Loop guard ─────────────────────────────────────────────────────────────
// The same tool signature may be dispatched this many times in a row; the
// next identical call ends the turn.
pub const TOOL_REPEAT_THRESHOLD: u32 = 3;

// ── Model request retries ──────────────────────────────────────────────────
// Timeouts during a model call are retried automatically: 3 attempts total.
pub const DEFAULT_MAX_MODEL_ATTEMPTS: u32 = 3;
pub const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 5;

// ── Tools ──────────────────────────────────────────────────────────────────
pub const SEARCH_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_READ_LENGTH: usize = 1122;
pub const MAX_ALTERNATIVE_QUERIES: usize = 2;
pub const MAX_HIGHLIGHTED_RESULTS: usize = 3;
pub const MAX_RESULTS_PER_QUERY: usize = 8;
pub const DEFAULT_SEARCH_ENGINE: &str = "duckduckgo";

// ── Near-duplicate query filter ────────────────────────────────────────────
pub const QUERY_MIN_EDIT_DISTANCE: usize = 5;
pub const QUERY_MAX_SIMILARITY: f64 = 0.7;

// ── Proxy health scores ────────────────────────────────────────────────────
// Clamped so a long-running winner cannot starve a recovered proxy forever.
pub const PROXY_SCORE_MIN: i32 = -5;
pub const PROXY_SCORE_MAX: i32 = 5;

pub const DEFAULT_USER_AGENT: &str = concat!(
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 ",
    "(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
);
