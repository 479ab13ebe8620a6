use serde::Deserialize;

/// Metadata about a pull request fetched from the GitHub API.
#[derive(Debug, Clone)]
pub struct PullRequest {
    /// PR number (e.g., 42)
    pub number: u64,
    /// PR title
    pub title: String,
    /// SHA of the current head commit
    pub head_sha: String,
}

/// A single changed file as reported by the GitHub diff endpoints.
///
/// `patch` is the per-file unified-diff fragment (hunks only, no
/// `diff --git` header). It is absent for binary files and for files
/// GitHub considers too large to inline.
#[derive(Debug, Clone, Deserialize)]
pub struct FileChange {
    pub filename: String,
    pub status: FileStatus,
    pub additions: usize,
    pub deletions: usize,
    #[serde(default)]
    pub patch: Option<String>,
}

/// File status in the diff, matching GitHub's `files[].status` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Removed,
    Renamed,
    #[serde(other)]
    Other,
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileStatus::Added => write!(f, "added"),
            FileStatus::Modified => write!(f, "modified"),
            FileStatus::Removed => write!(f, "removed"),
            FileStatus::Renamed => write!(f, "renamed"),
            FileStatus::Other => write!(f, "changed"),
        }
    }
}

/// Represents the parsed components of a GitHub PR URL.
#[derive(Debug, Clone)]
pub struct PrUrl {
    pub owner: String,
    pub repo: String,
    pub pr_number: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_change_deserialize() {
        let json = r#"{
            "filename": "src/main.rs",
            "status": "modified",
            "additions": 3,
            "deletions": 1,
            "patch": "@@ -1,2 +1,3 @@\n line1\n+line2\n line3"
        }"#;
        let file: FileChange = serde_json::from_str(json).unwrap();
        assert_eq!(file.filename, "src/main.rs");
        assert_eq!(file.status, FileStatus::Modified);
        assert!(file.patch.is_some());
    }

    #[test]
    fn test_file_change_without_patch() {
        // Binary and too-large files come back with no patch field.
        let json = r#"{"filename": "logo.png", "status": "added", "additions": 0, "deletions": 0}"#;
        let file: FileChange = serde_json::from_str(json).unwrap();
        assert!(file.patch.is_none());
    }

    #[test]
    fn test_unknown_status_maps_to_other() {
        let json = r#"{"filename": "a.rs", "status": "copied", "additions": 1, "deletions": 0}"#;
        let file: FileChange = serde_json::from_str(json).unwrap();
        assert_eq!(file.status, FileStatus::Other);
    }
}
