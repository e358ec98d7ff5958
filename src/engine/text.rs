// scoutchat Engine — text helpers
// Edit distance for the near-duplicate query filter, and HTML escaping for
// transcript export.

use crate::atoms::constants::{QUERY_MAX_SIMILARITY, QUERY_MIN_EDIT_DISTANCE};

/// Character-level Levenshtein distance.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Lower-case and collapse whitespace.
pub fn normalize_query(q: &str) -> String {
    q.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `1 - distance / max_len` over normalized queries, in [0, 1].
pub fn query_similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (normalize_query(a), normalize_query(b));
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / max_len as f64
}

/// Two queries are worth searching separately only when they differ by at
/// least `QUERY_MIN_EDIT_DISTANCE` edits and are less than
/// `QUERY_MAX_SIMILARITY` similar.
pub fn is_distinct_query(a: &str, b: &str) -> bool {
    let (na, nb) = (normalize_query(a), normalize_query(b));
    let distance = levenshtein(&na, &nb);
    distance >= QUERY_MIN_EDIT_DISTANCE && query_similarity(&na, &nb) < QUERY_MAX_SIMILARITY
}

/// Keep suggestions distinct from the original and from each other, up to `max`.
pub fn filter_alternative_queries(
    original: &str,
    suggestions: &[String],
    max: usize,
) -> Vec<String> {
    let mut accepted: Vec<String> = Vec::new();
    for s in suggestions {
        if accepted.len() >= max {
            break;
        }
        let s = s.trim();
        if s.is_empty() || !is_distinct_query(original, s) {
            continue;
        }
        if accepted.iter().all(|a| is_distinct_query(a, s)) {
            accepted.push(s.to_string());
        }
    }
    accepted
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Slice `[start, start + length)` by characters, not bytes.
pub fn char_slice(s: &str, start: usize, length: usize) -> String {
    s.chars().skip(start).take(length).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
        assert_eq!(levenshtein("héllo", "hello"), 1);
    }

    #[test]
    fn green_tea_rephrasing_is_a_near_duplicate() {
        assert!(!is_distinct_query("health benefits of green tea", "benefits of green tea"));
    }

    #[test]
    fn case_and_spacing_do_not_make_queries_distinct() {
        assert!(!is_distinct_query("Rust async", "rust   ASYNC"));
    }

    #[test]
    fn real_paraphrase_is_distinct() {
        assert!(is_distinct_query(
            "health benefits of green tea",
            "green tea antioxidants research"
        ));
    }

    #[test]
    fn alternatives_are_filtered_against_each_other() {
        let suggestions = vec![
            "benefits of green tea".to_string(),
            "green tea antioxidants research".to_string(),
            "green tea antioxidant research".to_string(),
            "matcha caffeine content compared to coffee".to_string(),
            "one more".to_string(),
        ];
        let kept = filter_alternative_queries("health benefits of green tea", &suggestions, 2);
        assert_eq!(
            kept,
            vec![
                "green tea antioxidants research".to_string(),
                "matcha caffeine content compared to coffee".to_string()
            ]
        );
    }

    #[test]
    fn escape_html_escapes_markup() {
        assert_eq!(
            escape_html("<a href=\"x\">&'</a>"),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn char_slice_handles_multibyte() {
        assert_eq!(char_slice("Hello world example", 0, 10), "Hello worl");
        assert_eq!(char_slice("ääää", 1, 2), "ää");
        assert_eq!(char_slice("abc", 5, 2), "");
    }
}
