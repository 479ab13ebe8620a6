pub mod chunk;
pub mod context;
pub mod lines;

use thiserror::Error;

use crate::github::types::{FileChange, FileStatus};

#[derive(Debug, Error)]
pub enum DiffError {
    #[error("Failed to parse diff: {0}")]
    Parse(String),
}

/// Split a full unified diff (as produced by `git diff` or GitHub's diff
/// endpoint) into per-file changes, mirroring the shape the GitHub files
/// API returns: each FileChange carries only its own hunk text as `patch`.
///
/// Each file section starts with `diff --git a/{path} b/{path}`; new files
/// have `--- /dev/null`, deleted files have `+++ /dev/null`.
pub fn split_unified_diff(raw_diff: &str) -> Result<Vec<FileChange>, DiffError> {
    if raw_diff.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut current: Option<FileChange> = None;
    let mut in_hunks = false;

    let finish = |files: &mut Vec<FileChange>, file: &mut Option<FileChange>| {
        if let Some(mut file) = file.take() {
            if let Some(patch) = file.patch.as_mut() {
                if patch.is_empty() {
                    file.patch = None;
                } else if patch.ends_with('\n') {
                    patch.pop();
                }
            }
            files.push(file);
        }
    };

    for line in raw_diff.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            finish(&mut files, &mut current);
            in_hunks = false;
            let mut parts = rest.split_whitespace();
            let a_path = parts
                .next()
                .ok_or_else(|| DiffError::Parse("Missing a/ path in diff header".to_string()))?;
            let b_path = parts
                .next()
                .ok_or_else(|| DiffError::Parse("Missing b/ path in diff header".to_string()))?;
            let path = b_path
                .strip_prefix("b/")
                .or_else(|| a_path.strip_prefix("a/"))
                .unwrap_or(b_path)
                .to_string();
            current = Some(FileChange {
                filename: path,
                status: FileStatus::Modified,
                additions: 0,
                deletions: 0,
                patch: Some(String::new()),
            });
            continue;
        }

        if line.starts_with("--- ") || line.starts_with("+++ ") {
            if !in_hunks {
                if let Some(file) = current.as_mut() {
                    let path = line[4..].trim();
                    if line.starts_with("--- ") && path == "/dev/null" {
                        file.status = FileStatus::Added;
                    }
                    if line.starts_with("+++ ") && path == "/dev/null" {
                        file.status = FileStatus::Removed;
                    }
                }
                continue;
            }
        }

        if line.starts_with("@@") {
            in_hunks = true;
        }

        if !in_hunks {
            continue;
        }

        if let Some(file) = current.as_mut() {
            if line.starts_with('+') {
                file.additions += 1;
            } else if line.starts_with('-') {
                file.deletions += 1;
            }
            if let Some(patch) = file.patch.as_mut() {
                patch.push_str(line);
                patch.push('\n');
            }
        }
    }

    finish(&mut files, &mut current);
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_DIFF: &str = r#"diff --git a/src/main.rs b/src/main.rs
index abc1234..def5678 100644
--- a/src/main.rs
+++ b/src/main.rs
@@ -1,5 +1,7 @@
 fn main() {
-    println!("old");
+    println!("new");
+    // Added a comment
 }
"#;

    #[test]
    fn test_split_single_file_diff() {
        let files = split_unified_diff(SAMPLE_DIFF).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "src/main.rs");
        assert_eq!(files[0].additions, 2);
        assert_eq!(files[0].deletions, 1);
        let patch = files[0].patch.as_deref().unwrap();
        assert!(patch.starts_with("@@ -1,5 +1,7 @@"));
        assert!(!patch.contains("diff --git"));
    }

    #[test]
    fn test_split_new_file_diff() {
        let diff = r#"diff --git a/new_file.txt b/new_file.txt
new file mode 100644
index 0000000..e69de29
--- /dev/null
+++ b/new_file.txt
@@ -0,0 +1,2 @@
+hello
+world
"#;
        let files = split_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].status, FileStatus::Added);
        assert_eq!(files[0].additions, 2);
    }

    #[test]
    fn test_split_deleted_file_diff() {
        let diff = r#"diff --git a/old_file.txt b/old_file.txt
deleted file mode 100644
index e69de29..0000000
--- a/old_file.txt
+++ /dev/null
@@ -1,2 +0,0 @@
-hello
-world
"#;
        let files = split_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].status, FileStatus::Removed);
        assert_eq!(files[0].deletions, 2);
    }

    #[test]
    fn test_split_multi_file_diff() {
        let diff = format!(
            "{}diff --git a/b.txt b/b.txt\nindex 1..2 100644\n--- a/b.txt\n+++ b/b.txt\n@@ -1 +1 @@\n-x\n+y\n",
            SAMPLE_DIFF
        );
        let files = split_unified_diff(&diff).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].filename, "b.txt");
    }

    #[test]
    fn test_split_empty_diff() {
        let files = split_unified_diff("").unwrap();
        assert!(files.is_empty());
    }
}
