use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

/// A parsed, not-yet-validated comment from the model's reply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CandidateComment {
    pub file: String,
    pub comment: String,
    #[serde(default)]
    pub line: Option<u64>,
    #[serde(default)]
    pub start_line: Option<u64>,
}

/// Fragments that look like individual comment objects — anything brace
/// delimited containing a "file" key.
static FRAGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\{[^{}]*"file"[^{}]*\}"#).expect("fragment regex"));

/// Turn a model's free-text reply into candidate comments.
///
/// Total and infallible: models wrap JSON in prose, fences, or half-broken
/// syntax, and a whole review must never fail because of that. Fallback
/// chain: direct parse of the fence-stripped text, then the first-`[` to
/// last-`]` substring, then per-fragment extraction, then an empty list
/// with a diagnostic.
pub fn parse_reply(text: &str) -> Vec<CandidateComment> {
    let stripped = strip_code_fence(text);

    if let Some(comments) = try_parse_array(stripped) {
        return comments;
    }

    if let Some(slice) = bracket_slice(stripped) {
        if let Some(comments) = try_parse_array(slice) {
            debug!("reply parsed via bracket-extraction fallback");
            return comments;
        }
    }

    let fragments: Vec<CandidateComment> = FRAGMENT_RE
        .find_iter(stripped)
        .filter_map(|m| serde_json::from_str::<CandidateComment>(m.as_str()).ok())
        .filter(has_valid_shape)
        .collect();
    if !fragments.is_empty() {
        debug!(count = fragments.len(), "reply parsed via fragment-extraction fallback");
        return fragments;
    }

    warn!(reply_bytes = text.len(), "model reply contained no parseable comment list, treating as empty");
    Vec::new()
}

/// Parse a JSON array of comment objects, dropping individually invalid
/// elements instead of rejecting the whole array.
fn try_parse_array(text: &str) -> Option<Vec<CandidateComment>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(text.trim()).ok()?;
    Some(
        values
            .into_iter()
            .filter_map(|v| serde_json::from_value::<CandidateComment>(v).ok())
            .filter(has_valid_shape)
            .collect(),
    )
}

fn has_valid_shape(comment: &CandidateComment) -> bool {
    !comment.file.trim().is_empty() && !comment.comment.trim().is_empty()
}

/// Remove a leading/trailing markdown code fence (``` or ```json).
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the language tag on the opening fence line.
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.strip_suffix("```").map(str::trim).unwrap_or(body).trim()
}

fn bracket_slice(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_json_array() {
        let reply = "```json\n[{\"file\":\"a.ts\",\"line\":5,\"comment\":\"x\"}]\n```";
        let comments = parse_reply(reply);
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].file, "a.ts");
        assert_eq!(comments[0].line, Some(5));
        assert_eq!(comments[0].comment, "x");
        assert_eq!(comments[0].start_line, None);
    }

    #[test]
    fn test_parse_bare_array() {
        let reply = r#"[{"file":"b.rs","comment":"looks wrong","start_line":3,"line":6}]"#;
        let comments = parse_reply(reply);
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].start_line, Some(3));
        assert_eq!(comments[0].line, Some(6));
    }

    #[test]
    fn test_parse_recovers_array_from_surrounding_prose() {
        let reply = r#"Here you go: [{"file":"a.ts","comment":"ok"}] thanks"#;
        let comments = parse_reply(reply);
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].file, "a.ts");
        assert_eq!(comments[0].comment, "ok");
    }

    #[test]
    fn test_parse_recovers_individual_fragments() {
        // Broken between the objects, so only fragment extraction works.
        let reply = r#"{"file":"a.rs","comment":"first"} and also {"file":"b.rs","comment":"second","line":4} trailing ["#;
        let comments = parse_reply(reply);
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[1].file, "b.rs");
        assert_eq!(comments[1].line, Some(4));
    }

    #[test]
    fn test_parse_garbage_yields_empty_list() {
        assert!(parse_reply("I could not find any issues, great work!").is_empty());
        assert!(parse_reply("").is_empty());
    }

    #[test]
    fn test_invalid_elements_dropped_individually() {
        let reply = r#"[
            {"file":"a.rs","comment":"keep me","line":2},
            {"file":"","comment":"empty file"},
            {"file":"b.rs","comment":""},
            {"comment":"no file at all"},
            {"file":"c.rs","comment":"also keep"}
        ]"#;
        let comments = parse_reply(reply);
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].file, "a.rs");
        assert_eq!(comments[1].file, "c.rs");
    }

    #[test]
    fn test_non_integer_line_drops_only_that_element() {
        let reply = r#"[{"file":"a.rs","comment":"ok","line":"five"},{"file":"b.rs","comment":"fine","line":5}]"#;
        let comments = parse_reply(reply);
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].file, "b.rs");
    }

    #[test]
    fn test_fence_without_language_tag() {
        let reply = "```\n[{\"file\":\"a.rs\",\"comment\":\"x\"}]\n```";
        assert_eq!(parse_reply(reply).len(), 1);
    }
}
