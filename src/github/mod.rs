pub mod types;

pub use types::{FileChange, PrUrl, PullRequest};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::review::reconcile::{Anchor, ReviewComment};
use crate::state::{self, ReviewState};

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("GitHub API request failed: {0}")]
    ApiRequest(#[from] reqwest::Error),

    #[error("Invalid PR URL: {0}")]
    InvalidUrl(String),

    #[error("GitHub token not found in config or environment")]
    MissingToken,
}

/// Parse a GitHub PR URL into its component parts.
///
/// Expected format: https://github.com/{owner}/{repo}/pull/{number}
pub fn parse_pr_url(url: &str) -> Result<PrUrl, GithubError> {
    let parsed =
        reqwest::Url::parse(url).map_err(|_| GithubError::InvalidUrl(url.to_string()))?;

    if parsed.host_str() != Some("github.com") {
        return Err(GithubError::InvalidUrl(url.to_string()));
    }

    let segments: Vec<_> = parsed
        .path_segments()
        .ok_or_else(|| GithubError::InvalidUrl(url.to_string()))?
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.len() != 4 || segments[2] != "pull" {
        return Err(GithubError::InvalidUrl(url.to_string()));
    }

    let pr_number = segments[3]
        .parse::<u64>()
        .map_err(|_| GithubError::InvalidUrl(url.to_string()))?;

    Ok(PrUrl {
        owner: segments[0].to_string(),
        repo: segments[1].to_string(),
        pr_number,
    })
}

/// State blob located in an existing PR comment: the comment id is kept so
/// the next write updates that comment instead of creating a duplicate.
#[derive(Debug, Clone)]
pub struct PersistedState {
    pub comment_id: u64,
    pub state: ReviewState,
}

/// Thin client over the GitHub REST API for one pull request.
///
/// All genuine I/O of the pipeline happens here: listing files and commits,
/// fetching file content for context expansion, posting comments, and
/// reading/writing the persisted review state.
pub struct GithubClient {
    client: reqwest::Client,
    token: String,
    pr: PrUrl,
    api_base: String,
}

impl GithubClient {
    pub fn new(token: String, pr: PrUrl) -> Self {
        GithubClient {
            client: reqwest::Client::new(),
            token,
            pr,
            api_base: "https://api.github.com".to_string(),
        }
    }

    fn repo_url(&self, tail: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base, self.pr.owner, self.pr.repo, tail
        )
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("User-Agent", "pr-reviewer")
            .bearer_auth(&self.token)
    }

    /// Fetch PR metadata (number, title, head SHA).
    #[instrument(skip(self), fields(pr = self.pr.pr_number))]
    pub async fn pull_request(&self) -> Result<PullRequest, GithubError> {
        #[derive(Deserialize)]
        struct Head {
            sha: String,
        }

        #[derive(Deserialize)]
        struct PullResponse {
            number: u64,
            title: String,
            head: Head,
        }

        let url = self.repo_url(&format!("pulls/{}", self.pr.pr_number));
        let metadata = self
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<PullResponse>()
            .await?;
        debug!(title = %metadata.title, head = %metadata.head.sha, "received PR metadata");

        Ok(PullRequest {
            number: metadata.number,
            title: metadata.title,
            head_sha: metadata.head.sha,
        })
    }

    /// Ordered commit SHAs for the pull request, oldest first.
    #[instrument(skip(self), fields(pr = self.pr.pr_number))]
    pub async fn list_commits(&self) -> Result<Vec<String>, GithubError> {
        #[derive(Deserialize)]
        struct Commit {
            sha: String,
        }

        let mut shas = Vec::new();
        let mut page = 1u32;
        loop {
            let url = self.repo_url(&format!(
                "pulls/{}/commits?per_page=100&page={}",
                self.pr.pr_number, page
            ));
            let batch = self
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .json::<Vec<Commit>>()
                .await?;
            let done = batch.len() < 100;
            shas.extend(batch.into_iter().map(|c| c.sha));
            if done {
                break;
            }
            page += 1;
        }
        debug!(commits = shas.len(), "listed PR commits");
        Ok(shas)
    }

    /// Ordered list of changed files for the full PR diff.
    #[instrument(skip(self), fields(pr = self.pr.pr_number))]
    pub async fn list_files(&self) -> Result<Vec<FileChange>, GithubError> {
        let mut files = Vec::new();
        let mut page = 1u32;
        loop {
            let url = self.repo_url(&format!(
                "pulls/{}/files?per_page=100&page={}",
                self.pr.pr_number, page
            ));
            let batch = self
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .json::<Vec<FileChange>>()
                .await?;
            let done = batch.len() < 100;
            files.extend(batch);
            if done {
                break;
            }
            page += 1;
        }
        debug!(files = files.len(), "listed PR files");
        Ok(files)
    }

    /// Changed files between two commits, used for incremental reviews.
    #[instrument(skip(self), fields(base = %base, head = %head))]
    pub async fn compare_files(
        &self,
        base: &str,
        head: &str,
    ) -> Result<Vec<FileChange>, GithubError> {
        #[derive(Deserialize)]
        struct CompareResponse {
            #[serde(default)]
            files: Vec<FileChange>,
        }

        let url = self.repo_url(&format!("compare/{}...{}", base, head));
        let compared = self
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<CompareResponse>()
            .await?;
        debug!(files = compared.files.len(), "compared commits");
        Ok(compared.files)
    }

    /// Build the contents-API URL with the file path percent-encoded per
    /// segment, so paths containing spaces, `#`, or `?` stay intact.
    fn contents_url(&self, path: &str, git_ref: &str) -> Result<reqwest::Url, GithubError> {
        let base = self.repo_url("contents");
        let mut url =
            reqwest::Url::parse(&base).map_err(|_| GithubError::InvalidUrl(base.clone()))?;
        url.path_segments_mut()
            .map_err(|_| GithubError::InvalidUrl(base))?
            .extend(path.split('/'));
        url.query_pairs_mut().append_pair("ref", git_ref);
        Ok(url)
    }

    /// Full text of a file at a given ref, or None when unavailable
    /// (deleted, binary, or otherwise not fetchable as text).
    pub async fn file_content(
        &self,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>, GithubError> {
        let url = self.contents_url(path, git_ref)?;
        let response = self
            .client
            .get(url)
            .header("User-Agent", "pr-reviewer")
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github.raw")
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(path = %path, "file content not available");
            return Ok(None);
        }

        let text = response.error_for_status()?.text().await?;
        Ok(Some(text))
    }

    /// Post one reconciled comment. Diff-anchored comments go on the review
    /// thread at file+line; file-level comments become general PR comments.
    pub async fn post_comment(
        &self,
        commit_id: &str,
        comment: &ReviewComment,
    ) -> Result<(), GithubError> {
        match &comment.anchor {
            Anchor::Diff { line, start_line } => {
                let mut body = serde_json::json!({
                    "body": comment.body,
                    "commit_id": commit_id,
                    "path": comment.file,
                    "line": line,
                    "side": "RIGHT",
                });
                if let Some(start) = start_line {
                    body["start_line"] = serde_json::json!(start);
                    body["start_side"] = serde_json::json!("RIGHT");
                }
                let url = self.repo_url(&format!("pulls/{}/comments", self.pr.pr_number));
                self.client
                    .post(&url)
                    .header("User-Agent", "pr-reviewer")
                    .bearer_auth(&self.token)
                    .json(&body)
                    .send()
                    .await?
                    .error_for_status()?;
            }
            Anchor::File => {
                let text = format!("**{}**: {}", comment.file, comment.body);
                self.post_issue_comment(&text).await?;
            }
        }
        Ok(())
    }

    /// Post a general comment on the PR conversation thread.
    pub async fn post_issue_comment(&self, body: &str) -> Result<(), GithubError> {
        let url = self.repo_url(&format!("issues/{}/comments", self.pr.pr_number));
        self.client
            .post(&url)
            .header("User-Agent", "pr-reviewer")
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Locate the persisted review state among existing PR comments.
    /// Returns None when no state comment exists or the blob fails to decode.
    #[instrument(skip(self), fields(pr = self.pr.pr_number))]
    pub async fn read_state(&self) -> Result<Option<PersistedState>, GithubError> {
        #[derive(Deserialize)]
        struct IssueComment {
            id: u64,
            body: String,
        }

        let mut page = 1u32;
        loop {
            let url = self.repo_url(&format!(
                "issues/{}/comments?per_page=100&page={}",
                self.pr.pr_number, page
            ));
            let batch = self
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .json::<Vec<IssueComment>>()
                .await?;
            let done = batch.len() < 100;

            for comment in &batch {
                if comment.body.contains(state::STATE_MARKER) {
                    match state::decode(&comment.body) {
                        Some(decoded) => {
                            debug!(comment_id = comment.id, last = %decoded.last_reviewed_commit_id, "found review state");
                            return Ok(Some(PersistedState {
                                comment_id: comment.id,
                                state: decoded,
                            }));
                        }
                        None => {
                            warn!(comment_id = comment.id, "state comment found but failed to decode");
                            return Ok(None);
                        }
                    }
                }
            }

            if done {
                return Ok(None);
            }
            page += 1;
        }
    }

    /// Persist review state: update the existing state comment if one is
    /// known, otherwise create it. Overwrites the whole blob.
    pub async fn write_state(
        &self,
        existing_comment_id: Option<u64>,
        state: &ReviewState,
    ) -> Result<(), GithubError> {
        let body = state::encode(state);
        match existing_comment_id {
            Some(id) => {
                let url = self.repo_url(&format!("issues/comments/{}", id));
                self.client
                    .patch(&url)
                    .header("User-Agent", "pr-reviewer")
                    .bearer_auth(&self.token)
                    .json(&serde_json::json!({ "body": body }))
                    .send()
                    .await?
                    .error_for_status()?;
            }
            None => self.post_issue_comment(&body).await?,
        }
        debug!(last = %state.last_reviewed_commit_id, "wrote review state");
        Ok(())
    }
}
