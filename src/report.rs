use colored::Colorize;
use tracing::instrument;

use crate::github::types::PullRequest;
use crate::provider::TokenUsage;
use crate::review::reconcile::{Anchor, Reconciled};
use crate::review::tracker::ReviewScope;
use crate::review::ReviewOutcome;

/// Everything worth telling the user (and the PR thread) about one run.
#[derive(Debug)]
pub struct RunSummary {
    pub pr_number: u64,
    pub pr_title: String,
    pub model: String,
    pub is_incremental: bool,
    pub new_commits: usize,
    pub files_reviewed: usize,
    pub chunks_sent: usize,
    pub failed_chunks: usize,
    pub diff_comments: usize,
    pub file_comments: usize,
    pub dropped_comments: usize,
    pub usage: TokenUsage,
}

/// Merge run artifacts into a RunSummary.
pub fn build(
    pr: &PullRequest,
    model: &str,
    scope: &ReviewScope,
    files_reviewed: usize,
    outcome: &ReviewOutcome,
    reconciled: &Reconciled,
) -> RunSummary {
    let diff_comments = reconciled
        .comments
        .iter()
        .filter(|c| matches!(c.anchor, Anchor::Diff { .. }))
        .count();
    RunSummary {
        pr_number: pr.number,
        pr_title: pr.title.clone(),
        model: model.to_string(),
        is_incremental: scope.is_incremental,
        new_commits: scope.new_commit_ids.len(),
        files_reviewed,
        chunks_sent: outcome.chunks_sent,
        failed_chunks: outcome.failed_chunks,
        diff_comments,
        file_comments: reconciled.comments.len() - diff_comments,
        dropped_comments: reconciled.dropped.len(),
        usage: outcome.usage,
    }
}

/// Print the run summary to the terminal with colors.
#[instrument(skip(summary), fields(pr = summary.pr_number))]
pub fn print_terminal(summary: &RunSummary) {
    println!();
    println!("PR #{}: \"{}\"", summary.pr_number, summary.pr_title);
    let mode = if summary.is_incremental {
        format!("incremental ({} new commit(s))", summary.new_commits).cyan()
    } else {
        "full review".cyan()
    };
    println!(
        "Mode: {} | Model: {} | Files: {} | Chunks: {}",
        mode, summary.model, summary.files_reviewed, summary.chunks_sent
    );
    println!();

    println!(
        "Comments: {} on diff lines, {} file-level",
        summary.diff_comments.to_string().green(),
        summary.file_comments.to_string().green()
    );
    if summary.dropped_comments > 0 {
        println!(
            "Dropped: {} comment(s) with invalid anchors",
            summary.dropped_comments.to_string().yellow()
        );
    }
    if summary.failed_chunks > 0 {
        println!(
            "Failed: {} chunk(s) got no review",
            summary.failed_chunks.to_string().red()
        );
    }
    println!(
        "Tokens: {} in / {} out",
        summary.usage.input_tokens, summary.usage.output_tokens
    );
    println!();
}

/// Format the summary comment posted on the PR thread.
pub fn to_markdown(summary: &RunSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "## Automated review of PR #{}\n\n",
        summary.pr_number
    ));
    if summary.is_incremental {
        out.push_str(&format!(
            "Incremental review covering {} new commit(s).\n\n",
            summary.new_commits
        ));
    } else {
        out.push_str("Full review of all changes.\n\n");
    }
    out.push_str(&format!(
        "| Files reviewed | Chunks | Comments | Model |\n|---|---|---|---|\n| {} | {} | {} | {} |\n",
        summary.files_reviewed,
        summary.chunks_sent,
        summary.diff_comments + summary.file_comments,
        summary.model,
    ));
    if summary.failed_chunks > 0 {
        out.push_str(&format!(
            "\n> {} chunk(s) could not be reviewed and were skipped.\n",
            summary.failed_chunks
        ));
    }
    out
}
