pub mod parser;
pub mod reconcile;
pub mod tracker;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info_span, warn, Instrument};

use crate::diff::chunk::DiffChunk;
use crate::provider::{estimate_usage, send_with_retry, ModelProvider, TokenUsage};
use parser::CandidateComment;

/// Dispatch knobs for one review run.
#[derive(Debug, Clone)]
pub struct ReviewOptions {
    /// Additional attempts after the first, for transient failures only.
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Upper bound on chunks in flight at once.
    pub concurrency: usize,
}

impl Default for ReviewOptions {
    fn default() -> Self {
        ReviewOptions {
            max_retries: 2,
            retry_delay: Duration::from_secs(2),
            concurrency: 3,
        }
    }
}

/// Aggregate of one review run across all chunks. Comment lists
/// concatenate and usage sums, so chunk completion order never changes
/// the outcome.
#[derive(Debug, Default)]
pub struct ReviewOutcome {
    pub candidates: Vec<CandidateComment>,
    pub usage: TokenUsage,
    pub chunks_sent: usize,
    pub failed_chunks: usize,
}

impl ReviewOutcome {
    /// Whether this run counts as a completed review. A run where every
    /// dispatched chunk failed (provider outage, bad credentials) produced
    /// zero model replies and must not advance the persisted state, or the
    /// affected commits would never be reviewed. A run with no chunks at
    /// all (empty diff) still completes.
    pub fn completed(&self) -> bool {
        self.chunks_sent == 0 || self.failed_chunks < self.chunks_sent
    }
}

/// Build the prompt for one chunk: reviewer instructions, optional
/// repository context, and the rendered diff+context payload. The reply
/// format is pinned to a single JSON array so the parser has something
/// predictable to aim at.
pub fn build_prompt(chunk: &DiffChunk) -> String {
    let mut prompt = String::from(
        "You are an experienced code reviewer. Review the following pull request changes \
         and report genuine problems: bugs, security issues, race conditions, missed edge \
         cases. Do not comment on style or formatting.\n\n",
    );

    if let Some(repo_context) = &chunk.repo_context {
        prompt.push_str("Repository context:\n");
        prompt.push_str(repo_context);
        prompt.push_str("\n\n");
    }

    prompt.push_str(
        "Respond with a single JSON array and nothing else. Each element must be an object \
         with keys: \"file\" (path from the diff), \"comment\" (the review comment), and \
         optionally \"line\" (new-file line number the comment refers to) and \"start_line\" \
         (for multi-line comments, the first line of the range). Only reference line numbers \
         that appear in the diff. Return [] if the changes look fine.\n\n",
    );
    prompt.push_str(&chunk.content);
    prompt
}

/// Send every chunk to the model and aggregate parsed candidates and
/// token usage.
///
/// Chunks run with bounded concurrency and no ordering dependency. A chunk
/// that exhausts its retry budget (or fails non-transiently) contributes no
/// comments; the omission is logged and siblings are unaffected.
pub async fn run_review(
    chunks: Vec<DiffChunk>,
    provider: Arc<dyn ModelProvider>,
    model: &str,
    opts: &ReviewOptions,
) -> ReviewOutcome {
    let mut outcome = ReviewOutcome {
        chunks_sent: chunks.len(),
        ..ReviewOutcome::default()
    };
    let concurrency = opts.concurrency.max(1);
    let mut in_flight = JoinSet::new();

    for (index, chunk) in chunks.into_iter().enumerate() {
        if in_flight.len() >= concurrency {
            if let Some(joined) = in_flight.join_next().await {
                absorb(&mut outcome, joined, model);
            }
        }

        let prompt = build_prompt(&chunk);
        let provider = Arc::clone(&provider);
        let model_name = model.to_string();
        let max_retries = opts.max_retries;
        let retry_delay = opts.retry_delay;
        in_flight.spawn(
            async move {
                let prompt_chars = prompt.len();
                let result = send_with_retry(
                    provider.as_ref(),
                    &model_name,
                    &prompt,
                    max_retries,
                    retry_delay,
                )
                .await;
                (index, prompt_chars, result)
            }
            .instrument(info_span!("review_chunk", chunk = index)),
        );
    }

    while let Some(joined) = in_flight.join_next().await {
        absorb(&mut outcome, joined, model);
    }

    outcome
}

type ChunkResult = (usize, usize, Result<crate::provider::ModelReply, crate::provider::ProviderError>);

fn absorb(
    outcome: &mut ReviewOutcome,
    joined: Result<ChunkResult, tokio::task::JoinError>,
    model: &str,
) {
    match joined {
        Ok((index, prompt_chars, Ok(reply))) => {
            let usage = reply
                .usage
                .unwrap_or_else(|| estimate_usage(model, prompt_chars, reply.text.len()));
            outcome.usage.add(usage);
            let candidates = parser::parse_reply(&reply.text);
            debug!(chunk = index, candidates = candidates.len(), "chunk reviewed");
            outcome.candidates.extend(candidates);
        }
        Ok((index, _, Err(err))) => {
            warn!(chunk = index, error = %err, "chunk failed, its comments are omitted from this review");
            outcome.failed_chunks += 1;
        }
        Err(join_err) => {
            warn!(error = %join_err, "chunk task panicked, its comments are omitted from this review");
            outcome.failed_chunks += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::types::{FileChange, FileStatus};
    use crate::provider::{MockProvider, ModelReply, ProviderError};
    use async_trait::async_trait;

    fn test_chunk(content: &str) -> DiffChunk {
        DiffChunk {
            content: content.to_string(),
            files: vec![FileChange {
                filename: "a.rs".to_string(),
                status: FileStatus::Modified,
                additions: 1,
                deletions: 0,
                patch: Some("@@ -1 +1 @@\n+x".to_string()),
            }],
            repo_context: None,
        }
    }

    #[test]
    fn test_prompt_embeds_chunk_and_context() {
        let mut chunk = test_chunk("## File: a.rs\ndiff body here");
        chunk.repo_context = Some("rust CLI, single crate".to_string());
        let prompt = build_prompt(&chunk);
        assert!(prompt.contains("single JSON array"));
        assert!(prompt.contains("rust CLI, single crate"));
        assert!(prompt.contains("diff body here"));
    }

    #[tokio::test]
    async fn test_run_review_aggregates_chunks() {
        let provider = Arc::new(MockProvider::new(
            r#"[{"file":"a.rs","comment":"check this","line":1}]"#,
        ));
        let chunks = vec![test_chunk("one"), test_chunk("two"), test_chunk("three")];
        let outcome = run_review(chunks, provider, "gpt-4o", &ReviewOptions::default()).await;
        assert_eq!(outcome.candidates.len(), 3);
        assert_eq!(outcome.chunks_sent, 3);
        assert_eq!(outcome.failed_chunks, 0);
        // No reported usage from the mock, so the estimate kicks in.
        assert!(outcome.usage.input_tokens > 0);
    }

    #[tokio::test]
    async fn test_failed_chunk_does_not_abort_siblings() {
        struct FailSecond;

        #[async_trait]
        impl ModelProvider for FailSecond {
            fn name(&self) -> &str {
                "failsecond"
            }

            async fn send(&self, _m: &str, prompt: &str) -> Result<ModelReply, ProviderError> {
                if prompt.contains("chunk-two") {
                    return Err(ProviderError::Status {
                        status: 400,
                        body: "bad".to_string(),
                    });
                }
                Ok(ModelReply {
                    text: r#"[{"file":"a.rs","comment":"fine","line":1}]"#.to_string(),
                    usage: None,
                })
            }
        }

        let chunks = vec![test_chunk("chunk-one"), test_chunk("chunk-two"), test_chunk("chunk-three")];
        let opts = ReviewOptions {
            retry_delay: Duration::from_millis(1),
            ..ReviewOptions::default()
        };
        let outcome = run_review(chunks, Arc::new(FailSecond), "gpt-4o", &opts).await;
        assert_eq!(outcome.candidates.len(), 2);
        assert_eq!(outcome.failed_chunks, 1);
    }

    #[tokio::test]
    async fn test_all_chunks_failing_marks_run_incomplete() {
        struct AlwaysUnauthorized;

        #[async_trait]
        impl ModelProvider for AlwaysUnauthorized {
            fn name(&self) -> &str {
                "unauthorized"
            }

            async fn send(&self, _m: &str, _p: &str) -> Result<ModelReply, ProviderError> {
                Err(ProviderError::Status {
                    status: 401,
                    body: "bad key".to_string(),
                })
            }
        }

        let chunks = vec![test_chunk("one"), test_chunk("two")];
        let outcome = run_review(
            chunks,
            Arc::new(AlwaysUnauthorized),
            "gpt-4o",
            &ReviewOptions::default(),
        )
        .await;
        assert_eq!(outcome.failed_chunks, 2);
        assert!(outcome.candidates.is_empty());
        // Nothing was reviewed, so the caller must not advance state.
        assert!(!outcome.completed());
    }

    #[tokio::test]
    async fn test_partial_failure_still_counts_as_completed() {
        struct FailSecond;

        #[async_trait]
        impl ModelProvider for FailSecond {
            fn name(&self) -> &str {
                "failsecond"
            }

            async fn send(&self, _m: &str, prompt: &str) -> Result<ModelReply, ProviderError> {
                if prompt.contains("chunk-two") {
                    return Err(ProviderError::Status {
                        status: 400,
                        body: "bad".to_string(),
                    });
                }
                Ok(ModelReply {
                    text: "[]".to_string(),
                    usage: None,
                })
            }
        }

        let chunks = vec![test_chunk("chunk-one"), test_chunk("chunk-two")];
        let outcome =
            run_review(chunks, Arc::new(FailSecond), "gpt-4o", &ReviewOptions::default()).await;
        assert_eq!(outcome.failed_chunks, 1);
        assert!(outcome.completed());
    }

    #[tokio::test]
    async fn test_run_review_with_no_chunks() {
        let provider = Arc::new(MockProvider::new("[]"));
        let outcome = run_review(Vec::new(), provider, "gpt-4o", &ReviewOptions::default()).await;
        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.usage, TokenUsage::default());
        // An empty diff is still a completed review.
        assert!(outcome.completed());
    }

    #[tokio::test]
    async fn test_malformed_reply_contributes_nothing_but_does_not_fail() {
        let provider = Arc::new(MockProvider::new("sure, the code looks good to me!"));
        let outcome = run_review(vec![test_chunk("one")], provider, "gpt-4o", &ReviewOptions::default()).await;
        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.failed_chunks, 0);
    }
}
