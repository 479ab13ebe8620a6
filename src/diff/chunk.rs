use regex::Regex;
use tracing::{debug, warn};

use crate::github::types::FileChange;

/// A size-bounded bundle of one or more files' diff+context payload, sent
/// to the model as a single prompt.
#[derive(Debug, Clone)]
pub struct DiffChunk {
    pub content: String,
    pub files: Vec<FileChange>,
    pub repo_context: Option<String>,
}

/// One file's pre-rendered payload, measured once before packing.
#[derive(Debug, Clone)]
pub struct FilePayload {
    pub change: FileChange,
    pub content: String,
}

/// Render a single file's chunk payload: the diff, plus the numbered
/// context window when one was produced.
pub fn render_file_payload(change: &FileChange, context: Option<&str>) -> String {
    let mut out = format!("## File: {} ({})\n", change.filename, change.status);
    match change.patch.as_deref() {
        Some(patch) => {
            out.push_str("### Diff\n```diff\n");
            out.push_str(patch);
            out.push_str("\n```\n");
        }
        None => out.push_str("(no textual diff available)\n"),
    }
    if let Some(context) = context {
        out.push_str("### Surrounding code (absolute line numbers)\n```\n");
        out.push_str(context);
        out.push_str("```\n");
    }
    out
}

/// Bin-pack file payloads into chunks of at most `max_bytes`.
///
/// Files matching an ignore pattern are dropped first. Remaining payloads
/// are sorted smallest-first and accumulated greedily; a file is never
/// split across chunks and never truncated. A single file larger than the
/// budget becomes its own oversized chunk.
pub fn plan(
    payloads: Vec<FilePayload>,
    ignore: &[Regex],
    max_bytes: usize,
    repo_context: Option<&str>,
) -> Vec<DiffChunk> {
    let mut kept: Vec<FilePayload> = payloads
        .into_iter()
        .filter(|p| {
            let ignored = ignore.iter().any(|re| re.is_match(&p.change.filename));
            if ignored {
                debug!(file = %p.change.filename, "skipping ignored file");
            }
            !ignored
        })
        .collect();

    // Smallest first packs more files per chunk than arrival order would,
    // without attempting optimal bin-packing.
    kept.sort_by_key(|p| p.content.len());

    let mut chunks: Vec<DiffChunk> = Vec::new();
    let mut current_content = String::new();
    let mut current_files: Vec<FileChange> = Vec::new();

    let close = |chunks: &mut Vec<DiffChunk>, content: &mut String, files: &mut Vec<FileChange>| {
        if !files.is_empty() {
            chunks.push(DiffChunk {
                content: std::mem::take(content),
                files: std::mem::take(files),
                repo_context: repo_context.map(str::to_string),
            });
        }
    };

    for payload in kept {
        let size = payload.content.len();
        if size > max_bytes {
            // Truncating would silently corrupt the diff the model sees, so
            // an oversized file always travels alone and whole.
            warn!(file = %payload.change.filename, bytes = size, max_bytes, "file exceeds chunk budget, sending as oversized singleton chunk");
            close(&mut chunks, &mut current_content, &mut current_files);
            chunks.push(DiffChunk {
                content: payload.content,
                files: vec![payload.change],
                repo_context: repo_context.map(str::to_string),
            });
            continue;
        }
        if !current_files.is_empty() && current_content.len() + size > max_bytes {
            close(&mut chunks, &mut current_content, &mut current_files);
        }
        current_content.push_str(&payload.content);
        current_files.push(payload.change);
    }
    close(&mut chunks, &mut current_content, &mut current_files);

    debug!(chunks = chunks.len(), "planned diff chunks");
    chunks
}
