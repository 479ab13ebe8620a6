use std::collections::BTreeSet;

/// Inclusive range of new-file line numbers derived from one diff hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

/// Compute the set of new-file line numbers a patch actually exposes
/// (context and added lines — never deleted lines).
///
/// A comment may only be anchored to a line in this set; GitHub rejects
/// review comments on lines that are not part of the diff.
pub fn valid_lines(patch: &str) -> BTreeSet<usize> {
    let mut lines = BTreeSet::new();
    let mut cursor: Option<usize> = None;

    for line in patch.lines() {
        if line.starts_with("@@") {
            cursor = parse_hunk_header(line).map(|(new_start, _)| new_start);
            continue;
        }
        let Some(current) = cursor.as_mut() else {
            continue;
        };
        // '\ No newline at end of file' belongs to neither side.
        if line.starts_with('+') || line.starts_with(' ') || line.is_empty() {
            lines.insert(*current);
            *current += 1;
        }
    }

    lines
}

/// One LineRange per hunk, in new-file coordinates. Hunks that only delete
/// (new-side count of zero) contribute no range.
pub fn touched_ranges(patch: &str) -> Vec<LineRange> {
    let mut ranges = Vec::new();
    for line in patch.lines() {
        if !line.starts_with("@@") {
            continue;
        }
        if let Some((start, count)) = parse_hunk_header(line) {
            if count > 0 {
                ranges.push(LineRange {
                    start,
                    end: start + count - 1,
                });
            }
        }
    }
    ranges
}

/// Parse the new-side range out of a hunk header `@@ -a[,b] +c[,d] @@`,
/// returning (c, d). The count defaults to 1 when omitted.
fn parse_hunk_header(line: &str) -> Option<(usize, usize)> {
    let header = line.trim().strip_prefix("@@")?.trim();
    let header = header.split("@@").next()?.trim();
    let new_part = header.split_whitespace().find(|p| p.starts_with('+'))?;
    parse_range(new_part, '+')
}

fn parse_range(part: &str, prefix: char) -> Option<(usize, usize)> {
    let range = part.strip_prefix(prefix)?;
    let (start_str, count_str) = match range.split_once(',') {
        Some((start, count)) => (start, count),
        None => (range, "1"),
    };
    let start = start_str.parse::<usize>().ok()?;
    let count = count_str.parse::<usize>().ok()?;
    Some((start, count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_lines_basic_hunk() {
        // One context line, one addition, one context line.
        let patch = "@@ -1,2 +1,3 @@\n line1\n+line2\n line3";
        let lines = valid_lines(patch);
        assert_eq!(lines, BTreeSet::from([1, 2, 3]));
    }

    #[test]
    fn test_valid_lines_skips_deletions() {
        let patch = "@@ -10,3 +10,2 @@\n keep\n-gone\n also keep";
        let lines = valid_lines(patch);
        // "gone" does not exist in the new file and must not shift the cursor.
        assert_eq!(lines, BTreeSet::from([10, 11]));
    }

    #[test]
    fn test_valid_lines_multiple_hunks() {
        let patch = "@@ -1,1 +1,2 @@\n a\n+b\n@@ -10,1 +11,1 @@\n+c";
        let lines = valid_lines(patch);
        assert_eq!(lines, BTreeSet::from([1, 2, 11]));
    }

    #[test]
    fn test_valid_lines_within_declared_hunk_bounds() {
        let patch = "@@ -5,4 +7,5 @@\n x\n+y\n x\n-z\n x\n+w";
        let lines = valid_lines(patch);
        for &line in &lines {
            assert!((7..=11).contains(&line), "line {} outside hunk", line);
        }
        assert_eq!(*lines.iter().max().unwrap(), 11);
    }

    #[test]
    fn test_valid_lines_empty_patch() {
        assert!(valid_lines("").is_empty());
    }

    #[test]
    fn test_valid_lines_ignores_no_newline_marker() {
        let patch = "@@ -1,1 +1,1 @@\n+last line\n\\ No newline at end of file";
        assert_eq!(valid_lines(patch), BTreeSet::from([1]));
    }

    #[test]
    fn test_touched_ranges() {
        let patch = "@@ -1,2 +1,3 @@\n a\n+b\n a\n@@ -20,5 +21,7 @@\n c\n+d\n c";
        let ranges = touched_ranges(patch);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0], LineRange { start: 1, end: 3 });
        assert_eq!(ranges[1], LineRange { start: 21, end: 27 });
    }

    #[test]
    fn test_touched_ranges_skips_pure_deletion_hunk() {
        let patch = "@@ -4,2 +3,0 @@\n-a\n-b";
        assert!(touched_ranges(patch).is_empty());
    }

    #[test]
    fn test_touched_ranges_count_defaults_to_one() {
        let patch = "@@ -1 +1 @@\n+x";
        assert_eq!(touched_ranges(patch), vec![LineRange { start: 1, end: 1 }]);
    }
}
