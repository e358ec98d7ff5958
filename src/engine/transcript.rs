// scoutchat Engine — Transcript export
// Write-only dumps of the conversation on explicit request. Nothing reads
// these back.

use crate::atoms::error::EngineResult;
use crate::atoms::types::Message;
use crate::engine::text::escape_html;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct TranscriptJson<'a> {
    exported_at: String,
    model: &'a str,
    messages: &'a [Message],
}

pub fn to_json(
    messages: &[Message],
    model: &str,
    exported_at: DateTime<Utc>,
) -> EngineResult<String> {
    Ok(serde_json::to_string_pretty(&TranscriptJson {
        exported_at: exported_at.to_rfc3339(),
        model,
        messages,
    })?)
}

pub fn to_html(messages: &[Message], model: &str, exported_at: DateTime<Utc>) -> String {
    let mut out = String::from(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>scoutchat transcript</title>\n\
         <style>body{font-family:sans-serif;max-width:48rem;margin:auto}\
         .msg{white-space:pre-wrap;border-radius:6px;padding:.5rem .75rem;margin:.5rem 0}\
         .system{background:#eee;font-size:.85em}.user{background:#dbeafe}\
         .assistant{background:#f3f4f6}</style>\n\
         </head><body>\n",
    );
    out.push_str(&format!(
        "<h1>Transcript</h1>\n<p>Model: {} &middot; exported {}</p>\n",
        escape_html(model),
        exported_at.format("%Y-%m-%d %H:%M UTC")
    ));
    for m in messages {
        out.push_str(&format!(
            "<div class=\"msg {}\"><strong>{}</strong>\n{}</div>\n",
            m.role.as_str(),
            m.role.as_str(),
            escape_html(&m.content)
        ));
    }
    out.push_str("</body></html>\n");
    out
}

/// Write to `path`: HTML when it ends in `.html`/`.htm`, JSON otherwise.
pub fn save(path: &Path, messages: &[Message], model: &str) -> EngineResult<()> {
    let now = Utc::now();
    let is_html = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"));
    let body = if is_html { to_html(messages, model, now) } else { to_json(messages, model, now)? };
    std::fs::write(path, body)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Vec<Message> {
        vec![Message::system("sys"), Message::user("<b>hi</b> & bye"), Message::assistant("ok")]
    }

    #[test]
    fn json_keeps_roles_and_order() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let json = to_json(&sample(), "gpt-4o-mini", at).unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["model"], "gpt-4o-mini");
        assert_eq!(v["messages"][1]["role"], "user");
        assert_eq!(v["messages"][2]["content"], "ok");
        assert!(v["exported_at"].as_str().unwrap().starts_with("2026-01-02T03:04:05"));
    }

    #[test]
    fn html_escapes_content() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let html = to_html(&sample(), "m<1>", at);
        assert!(html.contains("&lt;b&gt;hi&lt;/b&gt; &amp; bye"));
        assert!(html.contains("Model: m&lt;1&gt;"));
        assert!(!html.contains("<b>hi</b>"));
    }
}
