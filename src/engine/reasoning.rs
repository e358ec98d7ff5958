// scoutchat Engine — Chain-of-thought response parser
//
// Grammar (labels case-insensitive; markdown bullets, headings and bold
// markers around labels are tolerated):
//
//   step     := "Step" N ["[" Type "]"] ":" text        Type ∈ Fact|Assumption|Action|Decision|Step
//               ["Summary:" text]
//   answer   := ("Final Answer" | "Answer" | "Conclusion") ":" text   — runs to end of input
//
//   fallback := ("Thinking" | "Reasoning") ":" block
//               ("Answer" | "Conclusion") ":" text
//
// A step's text runs until the next step, Summary or answer label. If no step
// matches, the fallback grammar is tried; if that fails too the whole text is
// the answer and (outside streaming) an advisory format note is attached.
//
// Parsing is a pure function of (text, partial): it re-runs on every streamed
// chunk and must give the same result for the same input.

use crate::atoms::types::{ParsedReasoning, ReasoningStage, ReasoningStep, StepKind};
use regex::Regex;
use std::sync::LazyLock;

const SUMMARY_MAX_CHARS: usize = 80;

pub const FORMAT_MISMATCH_NOTE: &str =
    "The response did not follow the step-by-step reasoning format; showing it as plain text.";
pub const MISSING_ANSWER_NOTE: &str = "The reasoning ended without a final answer.";

// A step label needs a `[Type]` tag or a `:`/`.` right after the number,
// so prose like "Step 3 of the recipe" stays prose.
static STEP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)^\s*[#>*_\s-]*step\s+(\d+)\s*",
        r"(?:\[\s*([a-z]+)\s*\][\s*_]*[:.\-]?|[\s*_]*[:.])",
        r"[\s*_]*(.*)$",
    ))
    .expect("step pattern")
});

static SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*[#>*_\s-]*summary[\s*_]*:[\s*_]*(.*)$").expect("summary pattern")
});

static ANSWER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*[#>*_\s-]*(?:final\s+answer|answer|conclusion)[\s*_]*:[\s*_]*(.*)$")
        .expect("answer pattern")
});

static THINKING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*[#>*_\s-]*(?:thinking|reasoning)[\s*_]*:[\s*_]*(.*)$")
        .expect("thinking pattern")
});

pub fn parse_reasoning(text: &str, partial: bool) -> ParsedReasoning {
    let (steps, answer) = scan_steps(text);
    if !steps.is_empty() {
        return finish(steps, answer, true, partial);
    }

    if let Some((thinking, answer)) = scan_fallback(text) {
        let steps = if thinking.trim().is_empty() {
            Vec::new()
        } else {
            vec![make_step(1, StepKind::Step, thinking, String::new())]
        };
        return finish(steps, answer, true, partial);
    }

    ParsedReasoning {
        steps: Vec::new(),
        answer: text.trim().to_string(),
        has_structured_response: false,
        partial,
        stage: if partial { ReasoningStage::Answering } else { ReasoningStage::Complete },
        error: if partial { None } else { Some(FORMAT_MISMATCH_NOTE.to_string()) },
    }
}

/// Primary grammar. Returns the steps and, if an answer label was seen, the
/// answer text.
fn scan_steps(text: &str) -> (Vec<ReasoningStep>, Option<String>) {
    let mut steps: Vec<(u32, StepKind, Vec<String>, Vec<String>)> = Vec::new();
    let mut in_summary = false;
    let mut answer: Option<Vec<String>> = None;

    for line in text.lines() {
        if let Some(lines) = answer.as_mut() {
            lines.push(line.to_string());
            continue;
        }
        if let Some(c) = ANSWER_RE.captures(line) {
            answer = Some(vec![c[1].to_string()]);
            continue;
        }
        if let Some(c) = STEP_RE.captures(line) {
            let number = c[1].parse().unwrap_or(steps.len() as u32 + 1);
            let kind = c.get(2).map(|m| StepKind::parse(m.as_str())).unwrap_or(StepKind::Step);
            steps.push((number, kind, vec![c[3].to_string()], Vec::new()));
            in_summary = false;
            continue;
        }
        let Some(current) = steps.last_mut() else { continue };
        if let Some(c) = SUMMARY_RE.captures(line) {
            current.3.push(c[1].to_string());
            in_summary = true;
        } else if in_summary {
            current.3.push(line.to_string());
        } else {
            current.2.push(line.to_string());
        }
    }

    let steps = steps
        .into_iter()
        .map(|(n, kind, text, summary)| make_step(n, kind, join_block(&text), join_block(&summary)))
        .collect();
    (steps, answer.map(|lines| join_block(&lines)))
}

/// Looser grammar: a Thinking/Reasoning block and/or an Answer/Conclusion
/// block. `None` when neither label is present.
fn scan_fallback(text: &str) -> Option<(String, Option<String>)> {
    let mut thinking: Option<Vec<String>> = None;
    let mut answer: Option<Vec<String>> = None;

    for line in text.lines() {
        if let Some(lines) = answer.as_mut() {
            lines.push(line.to_string());
        } else if let Some(c) = ANSWER_RE.captures(line) {
            answer = Some(vec![c[1].to_string()]);
        } else if let Some(c) = THINKING_RE.captures(line) {
            thinking.get_or_insert_with(Vec::new).push(c[1].to_string());
        } else if let Some(lines) = thinking.as_mut() {
            lines.push(line.to_string());
        }
    }

    if thinking.is_none() && answer.is_none() {
        return None;
    }
    Some((
        thinking.map(|l| join_block(&l)).unwrap_or_default(),
        answer.map(|l| join_block(&l)),
    ))
}

fn finish(
    steps: Vec<ReasoningStep>,
    answer: Option<String>,
    structured: bool,
    partial: bool,
) -> ParsedReasoning {
    let stage = match (partial, answer.is_some()) {
        (false, _) => ReasoningStage::Complete,
        (true, true) => ReasoningStage::Answering,
        (true, false) => ReasoningStage::Thinking,
    };
    let error = if !partial && answer.as_deref().map_or(true, |a| a.is_empty()) {
        Some(MISSING_ANSWER_NOTE.to_string())
    } else {
        None
    };
    ParsedReasoning {
        steps,
        answer: answer.unwrap_or_default(),
        has_structured_response: structured,
        partial,
        stage,
        error,
    }
}

fn make_step(number: u32, kind: StepKind, text: String, summary: String) -> ReasoningStep {
    let summary = if summary.is_empty() { first_sentence(&text) } else { summary };
    ReasoningStep { number, kind, text, summary }
}

fn join_block(lines: &[String]) -> String {
    lines
        .iter()
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .trim_end_matches("**")
        .trim()
        .to_string()
}

fn first_sentence(text: &str) -> String {
    let line = text.lines().next().unwrap_or("").trim();
    let sentence = match line.find(". ") {
        Some(i) => &line[..=i],
        None => line,
    };
    if sentence.chars().count() <= SUMMARY_MAX_CHARS {
        sentence.to_string()
    } else {
        let cut: String = sentence.chars().take(SUMMARY_MAX_CHARS - 1).collect();
        format!("{}…", cut.trim_end())
    }
}

// ── Rendering ──────────────────────────────────────────────────────────

/// Plain-text rendering for the view: advisory warning, the steps (when
/// `show_thinking`), then the answer.
pub fn render_reasoning(parsed: &ParsedReasoning, show_thinking: bool) -> String {
    let mut out = String::new();
    if let Some(err) = &parsed.error {
        out.push_str(&format!("⚠ {}\n\n", err));
    }

    if !parsed.steps.is_empty() {
        if show_thinking {
            out.push_str("Thinking:\n");
            for step in &parsed.steps {
                out.push_str(&format!(
                    "  {}. [{}] {}\n",
                    step.number,
                    step.kind.as_str(),
                    step.text
                ));
                if !step.summary.is_empty() && step.summary != step.text {
                    out.push_str(&format!("     ↳ {}\n", step.summary));
                }
            }
        } else if parsed.stage == ReasoningStage::Thinking {
            out.push_str(&format!("Thinking… ({} steps so far)\n", parsed.steps.len()));
        }
    }

    if !parsed.answer.is_empty() {
        if show_thinking && !parsed.steps.is_empty() {
            out.push_str("\nAnswer:\n");
        }
        out.push_str(&parsed.answer);
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "\
Step 1 [Fact]: Paris has been the capital of France since 987.
Summary: Paris is the long-standing capital.
Step 2 [Decision]: The question asks only for the capital.
It does not ask about history.
Final Answer: Paris.";

    #[test]
    fn parses_steps_and_answer() {
        let p = parse_reasoning(FULL, false);
        assert!(p.has_structured_response);
        assert_eq!(p.stage, ReasoningStage::Complete);
        assert_eq!(p.steps.len(), 2);
        assert_eq!(p.steps[0].kind, StepKind::Fact);
        assert_eq!(p.steps[0].summary, "Paris is the long-standing capital.");
        assert_eq!(p.steps[1].kind, StepKind::Decision);
        assert_eq!(
            p.steps[1].text,
            "The question asks only for the capital.\nIt does not ask about history."
        );
        assert_eq!(p.steps[1].summary, "The question asks only for the capital.");
        assert_eq!(p.answer, "Paris.");
        assert!(p.error.is_none());
    }

    #[test]
    fn parsing_is_idempotent() {
        assert_eq!(parse_reasoning(FULL, false), parse_reasoning(FULL, false));
        let partial = "Step 1 [Fact]: one\nStep 2";
        assert_eq!(parse_reasoning(partial, true), parse_reasoning(partial, true));
    }

    #[test]
    fn tolerates_markdown_labels() {
        let text = "**Step 1 [Assumption]:** the user means the city.\n\
                    - **Step 2:** check it\n\
                    ## Conclusion: it is Paris";
        let p = parse_reasoning(text, false);
        assert_eq!(p.steps.len(), 2);
        assert_eq!(p.steps[0].kind, StepKind::Assumption);
        assert_eq!(p.steps[0].text, "the user means the city.");
        assert_eq!(p.steps[1].kind, StepKind::Step);
        assert_eq!(p.answer, "it is Paris");
    }

    #[test]
    fn step_label_needs_a_separator_or_tag() {
        let p = parse_reasoning("Step 3 of the recipe is to whisk the eggs.", false);
        assert!(p.steps.is_empty());
        assert!(!p.has_structured_response);
        assert_eq!(p.answer, "Step 3 of the recipe is to whisk the eggs.");

        let p = parse_reasoning("Step 1. Read the label
Step 2 [Fact] the jar is empty
Answer: buy more", false);
        assert_eq!(p.steps.len(), 2);
        assert_eq!(p.steps[0].text, "Read the label");
        assert_eq!(p.steps[1].kind, StepKind::Fact);
        assert_eq!(p.steps[1].text, "the jar is empty");
    }

    #[test]
    fn streaming_steps_without_answer_are_thinking() {
        let p = parse_reasoning("Step 1 [Action]: search the web\nStep 2 [Fact]: found", true);
        assert_eq!(p.stage, ReasoningStage::Thinking);
        assert_eq!(p.steps.len(), 2);
        assert!(p.answer.is_empty());
        assert!(p.error.is_none());
    }

    #[test]
    fn streaming_answer_in_progress() {
        let p = parse_reasoning("Step 1: think\nAnswer: Par", true);
        assert_eq!(p.stage, ReasoningStage::Answering);
        assert_eq!(p.answer, "Par");
    }

    #[test]
    fn final_steps_without_answer_carry_advisory() {
        let p = parse_reasoning("Step 1 [Fact]: something", false);
        assert!(p.has_structured_response);
        assert_eq!(p.error.as_deref(), Some(MISSING_ANSWER_NOTE));
    }

    #[test]
    fn fallback_thinking_block() {
        let text = "Thinking: The user wants a capital.\nFrance's is well known.\nAnswer: Paris";
        let p = parse_reasoning(text, false);
        assert!(p.has_structured_response);
        assert_eq!(p.steps.len(), 1);
        assert_eq!(p.steps[0].text, "The user wants a capital.\nFrance's is well known.");
        assert_eq!(p.answer, "Paris");
    }

    #[test]
    fn unstructured_text_is_answer_with_warning() {
        let p = parse_reasoning("Paris is the capital of France.", false);
        assert!(!p.has_structured_response);
        assert_eq!(p.answer, "Paris is the capital of France.");
        assert_eq!(p.error.as_deref(), Some(FORMAT_MISMATCH_NOTE));

        let streaming = parse_reasoning("Paris is", true);
        assert!(streaming.error.is_none());
        assert_eq!(streaming.stage, ReasoningStage::Answering);
    }

    #[test]
    fn long_first_sentence_is_truncated_for_summary() {
        let long = format!("Step 1: {}", "word ".repeat(40));
        let p = parse_reasoning(&long, true);
        assert_eq!(p.steps[0].summary.chars().count(), SUMMARY_MAX_CHARS);
        assert!(p.steps[0].summary.ends_with('…'));
    }

    #[test]
    fn render_shows_warning_steps_and_answer() {
        let shown = render_reasoning(&parse_reasoning(FULL, false), true);
        assert!(shown.starts_with("Thinking:\n  1. [Fact] Paris has been"));
        assert!(shown.ends_with("Answer:\nParis."));

        let hidden = render_reasoning(&parse_reasoning(FULL, false), false);
        assert_eq!(hidden, "Paris.");

        let warned = render_reasoning(&parse_reasoning("just text", false), true);
        assert!(warned.starts_with("⚠ "));
        assert!(warned.ends_with("just text"));
    }
}
