// scoutchat Engine — Prompt construction
//
// Every instruction the engine sends upstream lives here: the system prompt
// (tool protocol + optional chain-of-thought convention), the two helper
// prompts the search handler sends through the same model, and the
// continuation nudge appended after a tool result.

use crate::atoms::constants::MAX_HIGHLIGHTED_RESULTS;
use crate::atoms::types::{Message, ReasoningDetail, SearchResult, Settings, ToolKind};
use regex::Regex;
use std::sync::LazyLock;

const BASE_INSTRUCTIONS: &str = "\
You are a helpful research assistant. Answer clearly and accurately. When \
you are not certain of a fact, or the question concerns recent events, use \
a tool instead of guessing.";

const TOOL_INSTRUCTIONS: &str = r#"## Tools

To use a tool, reply with ONLY a JSON object and nothing else:

{"tool": "<name>", "arguments": {...}}

Available tools:
- web_search: search the web.
  Arguments: {"query": string, "engine": "duckduckgo" | "bing" (optional)}
- read_url: read the text of a web page.
  Arguments: {"url": "https://...", "start": integer (optional, default 0),
  "length": integer (optional)}
- instant_answer: quick factual lookup (definitions, conversions, well-known
  facts). Arguments: {"query": string}

Call at most one tool per reply. After a tool result arrives, either call
another tool or write your final answer. Do not repeat a tool call you have
already made with the same arguments."#;

/// Build the system instruction for the current settings.
pub fn system_prompt(settings: &Settings) -> String {
    let mut prompt = format!("{}\n\n{}", BASE_INSTRUCTIONS, TOOL_INSTRUCTIONS);
    if settings.enable_cot {
        prompt.push_str("\n\n");
        prompt.push_str(&cot_instructions(settings.reasoning_detail_level));
    }
    prompt
}

fn cot_instructions(level: ReasoningDetail) -> String {
    let depth = match level {
        ReasoningDetail::Brief => "Use 1 to 3 short steps. Keep each step to one sentence.",
        ReasoningDetail::Standard => "Use 3 to 6 steps. Keep each step focused on one idea.",
        ReasoningDetail::Detailed => {
            "Use as many steps as the problem needs. Spell out facts, assumptions and \
             intermediate results, and add a Summary line under every step."
        }
    };
    format!(
        "## Reasoning format

When answering (not when calling a tool), think step by step using exactly this format:

Step 1 [Fact]: <what you know>
Summary: <one-line summary, optional>
Step 2 [Assumption|Action|Decision]: <next step>
...
Final Answer: <your answer>

Step types are Fact, Assumption, Action and Decision. {}",
        depth
    )
}

// ── Search helpers ─────────────────────────────────────────────────────

/// Ask for paraphrased queries, one per line.
pub fn alternative_queries_prompt(query: &str, max: usize) -> Vec<Message> {
    vec![
        Message::system(
            "You rewrite web search queries. Reply with the rewritten queries only, \
             one per line, no numbering and no commentary.",
        ),
        Message::user(format!(
            "Suggest up to {} alternative search queries that would find different, \
             useful results for: {}",
            max, query
        )),
    ]
}

static LIST_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s*").expect("list marker pattern"));

/// Pull candidate queries out of the model's reply. Accepts a JSON array of
/// strings or one query per line (bullets, numbering and quotes stripped).
pub fn parse_alternative_queries(text: &str) -> Vec<String> {
    if let Some(start) = text.find('[') {
        if let Some(end) = text.rfind(']') {
            if end > start {
                if let Ok(list) = serde_json::from_str::<Vec<String>>(&text[start..=end]) {
                    return list
                        .into_iter()
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect();
                }
            }
        }
    }

    text.lines()
        .map(|line| LIST_MARKER_RE.replace(line, "").trim().trim_matches('"').trim().to_string())
        .filter(|line| !line.is_empty() && !line.ends_with(':'))
        .collect()
}

/// One history line per search result, numbered from 1.
pub fn format_search_result_line(index: usize, result: &SearchResult) -> String {
    format!("{}. {} — {}\n   {}", index + 1, result.title, result.url, result.snippet)
}

/// Ask which of the merged results deserve a full read.
pub fn result_selection_prompt(query: &str, results: &[SearchResult]) -> Vec<Message> {
    let listing = results
        .iter()
        .enumerate()
        .map(|(i, r)| format_search_result_line(i, r))
        .collect::<Vec<_>>()
        .join("\n");
    vec![
        Message::system(
            "You pick the most promising search results. Reply with the result numbers \
             only, comma separated, best first. Reply 'none' if nothing is relevant.",
        ),
        Message::user(format!(
            "Query: {}\n\nResults:\n{}\n\nWhich (at most {}) are worth reading in full?",
            query, listing, MAX_HIGHLIGHTED_RESULTS
        )),
    ]
}

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("number pattern"));

/// 1-based numbers in the reply → distinct 0-based indices below `count`,
/// in reply order, capped at `MAX_HIGHLIGHTED_RESULTS`.
pub fn parse_selected_indices(text: &str, count: usize) -> Vec<usize> {
    let mut picked = Vec::new();
    for m in NUMBER_RE.find_iter(text) {
        let Ok(n) = m.as_str().parse::<usize>() else { continue };
        if n == 0 || n > count || picked.contains(&(n - 1)) {
            continue;
        }
        picked.push(n - 1);
        if picked.len() >= MAX_HIGHLIGHTED_RESULTS {
            break;
        }
    }
    picked
}

// ── Tool loop ──────────────────────────────────────────────────────────

/// User-role message appended after a tool result to hand control back.
pub fn continuation_nudge(tool: ToolKind) -> String {
    format!(
        "The {} result is above. Use it to answer my previous question, or call \
         another tool if you still need more information.",
        tool.as_str()
    )
}
