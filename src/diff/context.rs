use std::collections::HashMap;

use regex::Regex;
use tracing::debug;

use super::lines::LineRange;

/// Tuning knobs for context-window expansion.
#[derive(Debug, Clone)]
pub struct ExpandOptions {
    /// Files at or below this many lines are included whole.
    pub small_file_threshold: usize,
    /// Lines of surrounding code on each side of the touched ranges.
    pub radius: usize,
    /// How far past the raw window bounds the boundary scans may look.
    pub lookback: usize,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        ExpandOptions {
            small_file_threshold: 300,
            radius: 150,
            lookback: 50,
        }
    }
}

/// How a language family closes its blocks, driving the forward boundary
/// scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockStyle {
    Braces,
    Indentation,
    Unknown,
}

/// Extension-keyed registry of declaration-start patterns.
///
/// This is a heuristic, not a parser: per language family an ordered list
/// of regexes that match lines where a function/class/type declaration
/// begins, with a generic fallback for unknown extensions. New languages
/// are added purely by registering patterns.
pub struct BoundaryPatterns {
    by_extension: HashMap<String, (Vec<Regex>, BlockStyle)>,
    fallback: Vec<Regex>,
}

impl BoundaryPatterns {
    pub fn new() -> Self {
        BoundaryPatterns {
            by_extension: HashMap::new(),
            fallback: compile(&[
                r"^\s*(export\s+|pub\s+|public\s+|private\s+|protected\s+|static\s+)*(function|def|fn|func|class|interface|struct|impl|trait)\b",
            ]),
        }
    }

    /// Register a pattern list for a set of file extensions.
    pub fn register(&mut self, extensions: &[&str], patterns: &[&str], braces: bool) {
        let style = if braces {
            BlockStyle::Braces
        } else {
            BlockStyle::Indentation
        };
        let compiled = compile(patterns);
        for ext in extensions {
            self.by_extension
                .insert(ext.to_string(), (compiled.clone(), style));
        }
    }

    fn lookup(&self, filename: &str) -> (&[Regex], BlockStyle) {
        let ext = filename.rsplit('.').next().unwrap_or("");
        match self.by_extension.get(ext) {
            Some((patterns, style)) => (patterns, *style),
            None => (&self.fallback, BlockStyle::Unknown),
        }
    }
}

impl Default for BoundaryPatterns {
    fn default() -> Self {
        let mut registry = BoundaryPatterns::new();
        registry.register(
            &["rs"],
            &[
                r"^\s*(pub(\([^)]*\))?\s+)?(async\s+)?(unsafe\s+)?fn\s+\w+",
                r"^\s*(pub(\([^)]*\))?\s+)?(struct|enum|trait|mod|union)\s+\w+",
                r"^\s*impl\b",
            ],
            true,
        );
        registry.register(
            &["js", "jsx", "ts", "tsx", "mjs", "cjs"],
            &[
                r"^\s*(export\s+)?(default\s+)?(async\s+)?function\b",
                r"^\s*(export\s+)?(abstract\s+)?class\s+\w+",
                r"^\s*(export\s+)?(const|let|var)\s+\w+\s*=\s*(async\s*)?(\(|function\b)",
                r"^\s*(export\s+)?(interface|type|enum)\s+\w+",
            ],
            true,
        );
        registry.register(
            &["py", "pyi"],
            &[r"^\s*(async\s+)?def\s+\w+", r"^\s*class\s+\w+", r"^\s*@\w+"],
            false,
        );
        registry.register(&["go"], &[r"^func\b", r"^type\s+\w+"], true);
        registry.register(
            &["java", "kt", "kts", "scala", "cs"],
            &[
                r"^\s*(public|private|protected|internal)\b.*[({]\s*$",
                r"^\s*(class|interface|enum|object|record)\s+\w+",
                r"^\s*(override\s+)?fun\s+\w+",
            ],
            true,
        );
        registry.register(
            &["c", "h", "cc", "cpp", "cxx", "hpp", "hh"],
            &[
                r"^[A-Za-z_][\w:<>,&*\s]*\s\**\w+\s*\([^;]*$",
                r"^\s*(class|struct|namespace|template)\b",
            ],
            true,
        );
        registry
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
}

/// Expand a file's touched diff ranges into a surrounding context window
/// and render it with absolute line-number prefixes.
///
/// Small files come back whole; larger files get a bounded window whose
/// start is nudged back to the nearest declaration line and whose end is
/// found by brace-depth or indentation, depending on the language. Both
/// scans are bounded so cost stays O(window size) and always terminates.
///
/// Returns None when there is nothing to anchor on (no touched ranges or
/// empty file). Callers skip removed and patch-less files before calling.
pub fn expand(
    full_text: &str,
    touched: &[LineRange],
    filename: &str,
    patterns: &BoundaryPatterns,
    opts: &ExpandOptions,
) -> Option<String> {
    let lines: Vec<&str> = full_text.lines().collect();
    let total = lines.len();
    if total == 0 {
        return None;
    }

    // Small files ship whole even when the patch exposes no new-side
    // lines (pure-deletion hunks).
    if total <= opts.small_file_threshold {
        return Some(render_numbered(&lines, 1, total));
    }
    if touched.is_empty() {
        return None;
    }

    let first_touched = touched.iter().map(|r| r.start).min().unwrap_or(1).min(total);
    let last_touched = touched.iter().map(|r| r.end).max().unwrap_or(1).min(total);

    let raw_start = first_touched.saturating_sub(opts.radius).max(1);
    let raw_end = (last_touched + opts.radius).min(total);

    let (regexes, style) = patterns.lookup(filename);
    let start = refine_start(&lines, raw_start, regexes, opts.lookback);
    let end = match style {
        BlockStyle::Braces => {
            refine_end_braces(&lines, start, last_touched, raw_end, opts.lookback, total)
        }
        BlockStyle::Indentation => {
            refine_end_indent(&lines, start, last_touched, raw_end, opts.lookback, total)
        }
        BlockStyle::Unknown => raw_end,
    };

    debug!(
        file = %filename,
        start,
        end,
        touched_start = first_touched,
        touched_end = last_touched,
        "expanded context window"
    );
    Some(render_numbered(&lines, start, end))
}

/// Scan backward from the raw window start, up to `lookback` lines, for
/// the nearest declaration-start line.
fn refine_start(lines: &[&str], raw_start: usize, regexes: &[Regex], lookback: usize) -> usize {
    let floor = raw_start.saturating_sub(lookback).max(1);
    for n in (floor..=raw_start).rev() {
        let text = lines[n - 1];
        if regexes.iter().any(|re| re.is_match(text)) {
            return n;
        }
    }
    raw_start
}

/// Track brace depth from the window start; once depth returns to zero
/// past the touched range, close the window there plus a small margin.
fn refine_end_braces(
    lines: &[&str],
    start: usize,
    last_touched: usize,
    raw_end: usize,
    lookahead: usize,
    total: usize,
) -> usize {
    const TRAILING_MARGIN: usize = 3;
    let limit = (raw_end + lookahead).min(total);
    let mut depth: i64 = 0;
    let mut opened = false;

    for n in start..=limit {
        for ch in lines[n - 1].chars() {
            match ch {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if opened && depth <= 0 && n >= last_touched {
            return (n + TRAILING_MARGIN).min(total);
        }
    }
    raw_end
}

/// Close the window at the first line past the touched range whose
/// indentation falls back to the window's base indentation.
fn refine_end_indent(
    lines: &[&str],
    start: usize,
    last_touched: usize,
    raw_end: usize,
    lookahead: usize,
    total: usize,
) -> usize {
    let limit = (raw_end + lookahead).min(total);
    let base = indent_of(lines[start - 1]);

    for n in (last_touched + 1)..=limit {
        let text = lines[n - 1];
        if text.trim().is_empty() {
            continue;
        }
        if indent_of(text) <= base {
            return n;
        }
    }
    raw_end
}

fn indent_of(line: &str) -> usize {
    line.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .count()
}

/// Prefix each selected line with its absolute 1-based line number. The
/// numbers are the stable anchor the model is told to reference.
fn render_numbered(lines: &[&str], start: usize, end: usize) -> String {
    let width = end.to_string().len();
    let mut out = String::new();
    for n in start..=end {
        out.push_str(&format!("{:>width$} | {}\n", n, lines[n - 1], width = width));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_file(total: usize) -> String {
        (1..=total)
            .map(|n| format!("    line{}", n))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_small_file_returned_whole() {
        let text = make_file(200);
        let touched = vec![LineRange { start: 50, end: 52 }];
        let patterns = BoundaryPatterns::default();
        let out = expand(&text, &touched, "a.rs", &patterns, &ExpandOptions::default()).unwrap();
        assert!(out.starts_with("  1 |"));
        assert!(out.contains("200 |     line200"));
    }

    #[test]
    fn test_large_file_returns_bounded_window() {
        let text = make_file(1000);
        let touched = vec![LineRange { start: 500, end: 502 }];
        let patterns = BoundaryPatterns::default();
        let out = expand(&text, &touched, "a.txt", &patterns, &ExpandOptions::default()).unwrap();
        assert!(!out.contains("   1 |"));
        assert!(!out.contains("1000 |"));
        assert!(out.contains("500 |"));
    }

    #[test]
    fn test_small_file_with_only_deletions_still_ships_whole() {
        // A pure-deletion patch has no new-side ranges, but a small file
        // is still worth showing in full.
        let text = make_file(120);
        let patterns = BoundaryPatterns::default();
        let out = expand(&text, &[], "a.rs", &patterns, &ExpandOptions::default()).unwrap();
        assert!(out.starts_with("  1 |"));
        assert!(out.contains("120 |"));
    }

    #[test]
    fn test_large_file_without_touched_ranges_returns_none() {
        let text = make_file(1000);
        let patterns = BoundaryPatterns::default();
        assert!(expand(&text, &[], "a.rs", &patterns, &ExpandOptions::default()).is_none());
    }

    #[test]
    fn test_start_moves_back_to_declaration() {
        let mut lines: Vec<String> = (1..=600).map(|n| format!("    body{}", n)).collect();
        // Declaration 20 lines above where the raw window would start.
        lines[330] = "fn interesting() {".to_string();
        let text = lines.join("\n");
        let touched = vec![LineRange { start: 500, end: 501 }];
        let patterns = BoundaryPatterns::default();
        let out = expand(&text, &touched, "a.rs", &patterns, &ExpandOptions::default()).unwrap();
        assert!(out.contains("331 | fn interesting() {"));
        assert!(!out.contains("330 |"));
    }

    #[test]
    fn test_brace_window_closes_after_function() {
        let mut lines: Vec<String> = (1..=600).map(|n| format!("    body{}", n)).collect();
        lines[340] = "fn touched() {".to_string();
        lines[360] = "}".to_string();
        let text = lines.join("\n");
        let touched = vec![LineRange { start: 350, end: 352 }];
        let opts = ExpandOptions {
            radius: 20,
            ..ExpandOptions::default()
        };
        let patterns = BoundaryPatterns::default();
        let out = expand(&text, &touched, "a.rs", &patterns, &opts).unwrap();
        // Closing brace on line 361 plus a small margin, nowhere near raw_end + radius.
        assert!(out.contains("361 | }"));
        assert!(!out.contains("370 |"));
    }

    #[test]
    fn test_indent_window_for_python() {
        let mut lines: Vec<String> = (1..=600).map(|n| format!("    body{}", n)).collect();
        lines[332] = "def touched():".to_string();
        lines[355] = "def next_one():".to_string();
        let text = lines.join("\n");
        let touched = vec![LineRange { start: 350, end: 351 }];
        let opts = ExpandOptions {
            radius: 15,
            ..ExpandOptions::default()
        };
        let patterns = BoundaryPatterns::default();
        let out = expand(&text, &touched, "a.py", &patterns, &opts).unwrap();
        // Backward scan finds the enclosing def just above the raw start.
        assert!(out.contains("333 | def touched():"));
        // Window stops at the next top-level declaration, not raw_end.
        assert!(out.contains("356 | def next_one():"));
        assert!(!out.contains("360 |"));
    }

    #[test]
    fn test_unknown_extension_uses_fallback_patterns() {
        let patterns = BoundaryPatterns::default();
        let (regexes, _) = patterns.lookup("weird.xyz");
        assert!(regexes.iter().any(|re| re.is_match("function doThing() {")));
    }

    #[test]
    fn test_register_new_language() {
        let mut patterns = BoundaryPatterns::new();
        patterns.register(&["zig"], &[r"^\s*(pub\s+)?fn\s+\w+"], true);
        let (regexes, _) = patterns.lookup("main.zig");
        assert!(regexes.iter().any(|re| re.is_match("pub fn main() void {")));
    }

    #[test]
    fn test_window_clamped_to_file_bounds() {
        let text = make_file(400);
        let touched = vec![LineRange { start: 1, end: 400 }];
        let patterns = BoundaryPatterns::default();
        let out = expand(&text, &touched, "a.txt", &patterns, &ExpandOptions::default()).unwrap();
        assert!(out.contains("  1 |"));
        assert!(out.contains("400 |"));
        assert!(!out.contains("401 |"));
    }
}
