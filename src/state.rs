use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marker locating the state blob inside a PR comment. The comment is
/// created on the first successful review and overwritten on each
/// subsequent one; never deleted by this pipeline.
pub const STATE_MARKER: &str = "<!-- pr-reviewer:state";
const STATE_END: &str = "-->";

/// Record of the last completed review for one pull request, used to
/// compute the incremental diff on the next run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewState {
    pub pr_number: u64,
    pub last_reviewed_commit_id: String,
    pub reviewed_commit_ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Render a ReviewState as a PR comment body: a human-readable line plus
/// the machine-readable blob inside an HTML comment.
pub fn encode(state: &ReviewState) -> String {
    // Serialization of this struct cannot fail; fall back to an empty blob
    // rather than panicking if it somehow does.
    let json = serde_json::to_string(state).unwrap_or_default();
    format!(
        "{marker}\n{json}\n{end}\n_Last reviewed commit: `{sha}` ({count} commit(s) at {ts})_",
        marker = STATE_MARKER,
        json = json,
        end = STATE_END,
        sha = state.last_reviewed_commit_id,
        count = state.reviewed_commit_ids.len(),
        ts = state.timestamp.format("%Y-%m-%d %H:%M UTC"),
    )
}

/// Extract a ReviewState from a comment body, or None when the marker is
/// missing or the embedded payload does not decode.
pub fn decode(body: &str) -> Option<ReviewState> {
    let after_marker = body.split(STATE_MARKER).nth(1)?;
    let blob = after_marker.split(STATE_END).next()?.trim();
    serde_json::from_str(blob).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> ReviewState {
        ReviewState {
            pr_number: 7,
            last_reviewed_commit_id: "c4".to_string(),
            reviewed_commit_ids: vec!["c3".to_string(), "c4".to_string()],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let state = sample_state();
        let body = encode(&state);
        let decoded = decode(&body).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_decode_ignores_surrounding_comment_text() {
        let state = sample_state();
        let body = format!("some banner text\n{}\ntrailing chatter", encode(&state));
        assert_eq!(decode(&body).unwrap(), state);
    }

    #[test]
    fn test_decode_missing_marker() {
        assert!(decode("just a regular PR comment").is_none());
    }

    #[test]
    fn test_decode_corrupt_payload() {
        let body = format!("{}\nnot json at all\n-->", STATE_MARKER);
        assert!(decode(&body).is_none());
    }
}
