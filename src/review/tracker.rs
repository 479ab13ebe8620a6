use chrono::Utc;
use tracing::{info, warn};

use crate::state::ReviewState;

/// What the current run should review, derived from the PR's commit list
/// and the previously persisted state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewScope {
    /// Commits not yet covered by a previous review, oldest first.
    /// Empty means there is nothing to review and the pipeline
    /// short-circuits with zero model calls and zero state mutation.
    pub new_commit_ids: Vec<String>,
    /// When incremental, the commit to diff against (the last reviewed
    /// one); None means review the full PR diff.
    pub base_commit: Option<String>,
    pub is_incremental: bool,
}

impl ReviewScope {
    pub fn nothing_to_review(&self) -> bool {
        self.new_commit_ids.is_empty()
    }
}

/// Decide between a full and an incremental review.
///
/// No prior state means a full review. With prior state, commits strictly
/// after the last reviewed one are reviewed incrementally. If the last
/// reviewed commit is gone from the list (history rewritten by a
/// force-push), fall back to a full review rather than failing — this can
/// regenerate comments on already-reviewed code, a known limitation.
pub fn resolve(all_commit_ids: &[String], prior: Option<&ReviewState>) -> ReviewScope {
    let Some(prior) = prior else {
        info!(commits = all_commit_ids.len(), "no prior review state, running full review");
        return full_scope(all_commit_ids);
    };

    let Some(position) = all_commit_ids
        .iter()
        .position(|sha| *sha == prior.last_reviewed_commit_id)
    else {
        warn!(
            last_reviewed = %prior.last_reviewed_commit_id,
            "last reviewed commit no longer in PR history (force-push?), falling back to full review"
        );
        return full_scope(all_commit_ids);
    };

    let new_commit_ids = all_commit_ids[position + 1..].to_vec();
    info!(
        new_commits = new_commit_ids.len(),
        base = %prior.last_reviewed_commit_id,
        "resolved incremental review scope"
    );
    ReviewScope {
        new_commit_ids,
        base_commit: Some(prior.last_reviewed_commit_id.clone()),
        is_incremental: true,
    }
}

fn full_scope(all_commit_ids: &[String]) -> ReviewScope {
    ReviewScope {
        new_commit_ids: all_commit_ids.to_vec(),
        base_commit: None,
        is_incremental: false,
    }
}

/// The state written after a successful review: head becomes the last
/// reviewed commit, and only the commits covered this run are recorded.
pub fn next_state(pr_number: u64, head_sha: &str, new_commit_ids: Vec<String>) -> ReviewState {
    ReviewState {
        pr_number,
        last_reviewed_commit_id: head_sha.to_string(),
        reviewed_commit_ids: new_commit_ids,
        timestamp: Utc::now(),
    }
}
