mod config;
mod diff;
mod github;
mod provider;
mod report;
mod review;
mod state;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use diff::chunk::{self, FilePayload};
use diff::context::{BoundaryPatterns, ExpandOptions};
use diff::lines;
use github::types::{FileChange, FileStatus, PullRequest};
use github::GithubClient;
use provider::anthropic::AnthropicProvider;
use provider::openai::OpenAiProvider;
use provider::{MockProvider, ModelProvider, ProviderError};
use review::tracker::ReviewScope;
use review::ReviewOptions;

/// PR Reviewer — sends a pull request's diff to a language model in
/// size-bounded, context-enriched chunks and posts the reply back as
/// line-anchored review comments. Re-runs only review commits pushed
/// since the last completed review.
#[derive(Parser, Debug)]
#[command(name = "pr-reviewer", version, about)]
struct Cli {
    /// GitHub Pull Request URL (e.g., https://github.com/org/repo/pull/42)
    ///
    /// Not required when --mock is used.
    pr_url: Option<String>,

    /// Review but print comments to the terminal instead of posting them
    #[arg(long)]
    dry_run: bool,

    /// Override the configured model identifier
    #[arg(long)]
    model: Option<String>,

    /// Override the configured backend ("openai" or "anthropic")
    #[arg(long)]
    provider: Option<String>,

    /// Review a built-in sample diff with a canned model reply
    /// (no GitHub or API token needed)
    #[arg(long)]
    r#mock: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.r#mock {
        info!("reviewing the embedded sample diff with a mock provider");
        return run_mock().await;
    }

    let pr_url = cli.pr_url.as_deref().ok_or(
        "PR URL is required unless --mock is used. Usage: pr-reviewer <URL> or pr-reviewer --mock",
    )?;
    run(pr_url, &cli).await
}

async fn run(pr_url: &str, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    info!(pr_url = %pr_url, "parsing PR URL");
    let parsed = github::parse_pr_url(pr_url)?;

    info!("loading configuration");
    let config = Config::load()?;
    let token = config.github_token().ok_or(github::GithubError::MissingToken)?;
    let model = cli.model.clone().unwrap_or_else(|| config.review.model.clone());
    let provider_name = cli
        .provider
        .clone()
        .unwrap_or_else(|| config.review.provider.clone());
    let provider = make_provider(&config, &provider_name)?;

    let client = GithubClient::new(token, parsed);

    info!("fetching pull request metadata and commits");
    let pr = client.pull_request().await?;
    let commits = client.list_commits().await?;

    // State read failure degrades to a full review rather than aborting.
    let prior = match client.read_state().await {
        Ok(prior) => prior,
        Err(err) => {
            warn!(error = %err, "failed to read review state, assuming none");
            None
        }
    };

    let scope = review::tracker::resolve(&commits, prior.as_ref().map(|p| &p.state));
    if scope.nothing_to_review() {
        info!("head commit already reviewed");
        println!("Nothing to review: no new commits since the last review.");
        return Ok(());
    }

    info!(incremental = scope.is_incremental, new_commits = scope.new_commit_ids.len(), "fetching diff");
    let files = match scope.base_commit.as_deref() {
        Some(base) => client.compare_files(base, &pr.head_sha).await?,
        None => client.list_files().await?,
    };

    let valid_sets = index_valid_lines(&files);
    let payloads = build_payloads(&client, &pr, &files, &config).await;
    let ignore = config.ignore_regexes()?;
    let chunks = chunk::plan(
        payloads,
        &ignore,
        config.review.max_chunk_bytes,
        config.review.repo_context.as_deref(),
    );

    info!(chunks = chunks.len(), model = %model, provider = %provider_name, "dispatching review");
    let opts = ReviewOptions {
        max_retries: config.review.max_retries,
        retry_delay: Duration::from_millis(config.review.retry_delay_ms),
        concurrency: config.review.concurrency,
    };
    let mut outcome = review::run_review(chunks, provider, &model, &opts).await;

    let candidates = std::mem::take(&mut outcome.candidates);
    let reconciled = review::reconcile::reconcile(candidates, &files, &valid_sets);
    let summary = report::build(&pr, &model, &scope, files.len(), &outcome, &reconciled);

    if cli.dry_run {
        println!("{}", report::to_markdown(&summary));
        for comment in &reconciled.comments {
            println!("- [{}] {}", comment.file, comment.body);
        }
    } else {
        info!(comments = reconciled.comments.len(), "posting comments");
        for comment in &reconciled.comments {
            // Best effort per comment: one rejected anchor must not block
            // the rest of the review.
            if let Err(err) = client.post_comment(&pr.head_sha, comment).await {
                warn!(file = %comment.file, error = %err, "failed to post comment");
            }
        }
        if let Err(err) = client.post_issue_comment(&report::to_markdown(&summary)).await {
            warn!(error = %err, "failed to post summary comment");
        }

        if outcome.completed() {
            let next =
                review::tracker::next_state(pr.number, &pr.head_sha, scope.new_commit_ids.clone());
            if let Err(err) = client
                .write_state(prior.as_ref().map(|p| p.comment_id), &next)
                .await
            {
                warn!(error = %err, "failed to persist review state; the next run may re-review these commits");
            }
        } else {
            warn!(
                failed = outcome.failed_chunks,
                "every chunk failed, leaving review state untouched so these commits are retried"
            );
        }
    }

    report::print_terminal(&summary);
    Ok(())
}

/// Fetch head-revision file content and expand it into context windows;
/// failures degrade to diff-only payloads.
async fn build_payloads(
    client: &GithubClient,
    pr: &PullRequest,
    files: &[FileChange],
    config: &Config,
) -> Vec<FilePayload> {
    let patterns = BoundaryPatterns::default();
    let expand_opts = ExpandOptions {
        small_file_threshold: config.review.small_file_threshold,
        radius: config.review.context_radius,
        ..ExpandOptions::default()
    };

    let mut payloads = Vec::with_capacity(files.len());
    for change in files {
        let context = match change.patch.as_deref() {
            Some(patch) if change.status != FileStatus::Removed => {
                match client.file_content(&change.filename, &pr.head_sha).await {
                    Ok(Some(text)) => diff::context::expand(
                        &text,
                        &lines::touched_ranges(patch),
                        &change.filename,
                        &patterns,
                        &expand_opts,
                    ),
                    Ok(None) => None,
                    Err(err) => {
                        debug!(file = %change.filename, error = %err, "could not fetch file content, reviewing diff only");
                        None
                    }
                }
            }
            _ => None,
        };
        payloads.push(FilePayload {
            content: chunk::render_file_payload(change, context.as_deref()),
            change: change.clone(),
        });
    }
    payloads
}

fn index_valid_lines(files: &[FileChange]) -> HashMap<String, BTreeSet<usize>> {
    files
        .iter()
        .map(|f| {
            (
                f.filename.clone(),
                lines::valid_lines(f.patch.as_deref().unwrap_or("")),
            )
        })
        .collect()
}

fn make_provider(config: &Config, name: &str) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    match name {
        "openai" => {
            let key = config
                .openai_api_key()
                .ok_or_else(|| ProviderError::MissingKey("openai".to_string()))?;
            Ok(Arc::new(OpenAiProvider::new(key)))
        }
        "anthropic" => {
            let key = config
                .anthropic_api_key()
                .ok_or_else(|| ProviderError::MissingKey("anthropic".to_string()))?;
            Ok(Arc::new(AnthropicProvider::new(key)))
        }
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}

/// Canned reply for the demo path: one comment on a valid diff line, one
/// anchored outside the diff (dropped at reconciliation), one file-level.
const MOCK_REPLY: &str = r#"```json
[
  {"file": "src/auth/login.rs", "line": 43, "comment": "Use a constant-time comparison for password hashes; `==` on strings leaks timing information."},
  {"file": "src/auth/login.rs", "line": 200, "comment": "This anchor is outside the diff and should be dropped."},
  {"file": "src/auth/mod.rs", "comment": "The new session module is exported but nothing in this PR uses it yet."}
]
```"#;

/// Run the full pipeline against the embedded fixture diff, without
/// touching GitHub or a model API.
async fn run_mock() -> Result<(), Box<dyn std::error::Error>> {
    let diff_text = include_str!("../tests/fixtures/sample_diff.patch");
    let files = diff::split_unified_diff(diff_text)?;
    let valid_sets = index_valid_lines(&files);

    let payloads: Vec<FilePayload> = files
        .iter()
        .map(|change| FilePayload {
            content: chunk::render_file_payload(change, None),
            change: change.clone(),
        })
        .collect();
    let chunks = chunk::plan(payloads, &[], 60_000, None);

    let provider = Arc::new(MockProvider::new(MOCK_REPLY));
    let mut outcome = review::run_review(chunks, provider, "mock", &ReviewOptions::default()).await;

    let candidates = std::mem::take(&mut outcome.candidates);
    let reconciled = review::reconcile::reconcile(candidates, &files, &valid_sets);

    let pr = PullRequest {
        number: 42,
        title: "Harden the login flow".to_string(),
        head_sha: "mock-head".to_string(),
    };
    let scope = ReviewScope {
        new_commit_ids: vec!["mock-head".to_string()],
        base_commit: None,
        is_incremental: false,
    };
    let summary = report::build(&pr, "mock", &scope, files.len(), &outcome, &reconciled);

    println!("{}", report::to_markdown(&summary));
    for comment in &reconciled.comments {
        println!("- [{}] {}", comment.file, comment.body);
    }
    report::print_terminal(&summary);
    Ok(())
}
