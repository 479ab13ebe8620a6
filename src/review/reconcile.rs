use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use super::parser::CandidateComment;
use crate::github::types::FileChange;

/// Where a reconciled comment attaches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    /// Anchored to a diff line (and optionally a range start).
    Diff { line: u64, start_line: Option<u64> },
    /// General comment about a reviewed file, posted on the PR thread.
    File,
}

/// A candidate comment that survived reconciliation against the diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewComment {
    pub file: String,
    pub body: String,
    pub anchor: Anchor,
}

/// Reconciliation result, with dropped candidates kept for observability.
#[derive(Debug, Default)]
pub struct Reconciled {
    pub comments: Vec<ReviewComment>,
    pub dropped: Vec<CandidateComment>,
}

/// Validate candidates against the diff's valid line sets.
///
/// File-level candidates (no line at all) survive when their file is among
/// the reviewed files. Diff-level candidates survive only when the anchor
/// line — the `line` value, which for a range is its end — is a line the
/// diff actually exposes for that file. Anything else is dropped and
/// logged; GitHub would reject it anyway, and a misanchored comment is
/// worse than none.
pub fn reconcile(
    candidates: Vec<CandidateComment>,
    files: &[FileChange],
    valid_sets: &HashMap<String, BTreeSet<usize>>,
) -> Reconciled {
    let reviewed: BTreeSet<&str> = files.iter().map(|f| f.filename.as_str()).collect();
    let mut result = Reconciled::default();

    for candidate in candidates {
        if !reviewed.contains(candidate.file.as_str()) {
            warn!(file = %candidate.file, "dropping comment for a file not in the reviewed diff");
            result.dropped.push(candidate);
            continue;
        }

        let anchor_line = candidate.line.or(candidate.start_line);
        let Some(line) = anchor_line else {
            result.comments.push(ReviewComment {
                file: candidate.file,
                body: candidate.comment,
                anchor: Anchor::File,
            });
            continue;
        };

        let in_diff = valid_sets
            .get(&candidate.file)
            .is_some_and(|set| set.contains(&(line as usize)));
        if !in_diff {
            warn!(file = %candidate.file, line, "dropping comment anchored outside the diff's valid lines");
            result.dropped.push(candidate);
            continue;
        }

        // GitHub requires start_line < line for ranged comments; collapse
        // degenerate ranges to a single line.
        let start_line = match (candidate.start_line, candidate.line) {
            (Some(start), Some(end)) if start < end => Some(start),
            _ => None,
        };
        result.comments.push(ReviewComment {
            file: candidate.file,
            body: candidate.comment,
            anchor: Anchor::Diff { line, start_line },
        });
    }

    debug!(
        kept = result.comments.len(),
        dropped = result.dropped.len(),
        "reconciled candidate comments"
    );
    result
}
