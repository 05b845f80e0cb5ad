//! Differences between two checkpoints

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::types::Checkpoint;

/// Kind of change to a file between two checkpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// File content carried in a diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "snake_case")]
pub enum FileContent {
    Utf8(String),
    Binary(Vec<u8>),
}

impl FileContent {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Self::Utf8(text),
            Err(e) => Self::Binary(e.into_bytes()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Utf8(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Utf8(text) => Some(text),
            Self::Binary(_) => None,
        }
    }
}

/// One changed file with before/after content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: String,
    pub change: ChangeKind,
    pub before: Option<FileContent>,
    pub after: Option<FileContent>,
    /// Unified diff, present when both sides are text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unified: Option<String>,
}

/// A changed path between two checkpoints, before content is loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChangedPath {
    pub path: String,
    pub change: ChangeKind,
}

/// Compare snapshot sets by path and hash
pub(crate) fn changed_paths(from: &Checkpoint, to: &Checkpoint) -> Vec<ChangedPath> {
    let paths: BTreeSet<&str> = from
        .snapshots
        .iter()
        .chain(to.snapshots.iter())
        .map(|s| s.path.as_str())
        .collect();

    paths
        .into_iter()
        .filter_map(|path| {
            let change = match (from.snapshot(path), to.snapshot(path)) {
                (None, Some(_)) => ChangeKind::Added,
                (Some(_), None) => ChangeKind::Deleted,
                (Some(a), Some(b)) if a.hash != b.hash => ChangeKind::Modified,
                _ => return None,
            };
            Some(ChangedPath {
                path: path.to_string(),
                change,
            })
        })
        .collect()
}

/// Line-based diff rendered as unified hunks
#[derive(Debug, Clone)]
pub struct TextDiff {
    pub hunks: Vec<DiffHunk>,
}

#[derive(Debug, Clone)]
pub struct DiffHunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<DiffLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLine {
    Context(String),
    Added(String),
    Removed(String),
}

const CONTEXT_LINES: usize = 3;
/// Above this many cells the LCS table is skipped and the file is shown as replaced
const MAX_LCS_CELLS: usize = 4_000_000;

impl TextDiff {
    pub fn compute(old: &str, new: &str) -> Self {
        let old_lines: Vec<&str> = old.lines().collect();
        let new_lines: Vec<&str> = new.lines().collect();
        let script = edit_script(&old_lines, &new_lines);
        Self {
            hunks: group_hunks(&script),
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.hunks.is_empty()
    }

    pub fn added_count(&self) -> usize {
        self.count(|l| matches!(l, DiffLine::Added(_)))
    }

    pub fn removed_count(&self) -> usize {
        self.count(|l| matches!(l, DiffLine::Removed(_)))
    }

    fn count(&self, pred: impl Fn(&DiffLine) -> bool) -> usize {
        self.hunks
            .iter()
            .flat_map(|h| &h.lines)
            .filter(|l| pred(l))
            .count()
    }

    /// Format as a unified diff body
    pub fn format_unified(&self, path: &str) -> String {
        let mut output = format!("--- a/{}\n+++ b/{}\n", path, path);
        for hunk in &self.hunks {
            output.push_str(&format!(
                "@@ -{},{} +{},{} @@\n",
                hunk.old_start, hunk.old_count, hunk.new_start, hunk.new_count
            ));
            for line in &hunk.lines {
                match line {
                    DiffLine::Context(s) => output.push_str(&format!(" {}\n", s)),
                    DiffLine::Added(s) => output.push_str(&format!("+{}\n", s)),
                    DiffLine::Removed(s) => output.push_str(&format!("-{}\n", s)),
                }
            }
        }
        output
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Keep(usize, usize),
    Remove(usize),
    Add(usize),
}

/// Longest-common-subsequence edit script between two line lists
fn edit_script<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<(Op, &'a str)> {
    // Shared prefix and suffix never need the table
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut script: Vec<(Op, &str)> = (0..prefix).map(|i| (Op::Keep(i, i), old[i])).collect();

    let (n, m) = (old_mid.len(), new_mid.len());
    if n * m > MAX_LCS_CELLS {
        script.extend((0..n).map(|i| (Op::Remove(prefix + i), old_mid[i])));
        script.extend((0..m).map(|j| (Op::Add(prefix + j), new_mid[j])));
    } else {
        let mut table = vec![vec![0u32; m + 1]; n + 1];
        for i in (0..n).rev() {
            for j in (0..m).rev() {
                table[i][j] = if old_mid[i] == new_mid[j] {
                    table[i + 1][j + 1] + 1
                } else {
                    table[i + 1][j].max(table[i][j + 1])
                };
            }
        }

        let (mut i, mut j) = (0, 0);
        while i < n || j < m {
            if i < n && j < m && old_mid[i] == new_mid[j] {
                script.push((Op::Keep(prefix + i, prefix + j), old_mid[i]));
                i += 1;
                j += 1;
            } else if i < n && (j == m || table[i + 1][j] >= table[i][j + 1]) {
                script.push((Op::Remove(prefix + i), old_mid[i]));
                i += 1;
            } else {
                script.push((Op::Add(prefix + j), new_mid[j]));
                j += 1;
            }
        }
    }

    let old_tail = old.len() - suffix;
    let new_tail = new.len() - suffix;
    script.extend((0..suffix).map(|k| (Op::Keep(old_tail + k, new_tail + k), old[old_tail + k])));
    script
}

fn group_hunks(script: &[(Op, &str)]) -> Vec<DiffHunk> {
    let changes: Vec<usize> = script
        .iter()
        .enumerate()
        .filter(|(_, (op, _))| !matches!(op, Op::Keep(..)))
        .map(|(i, _)| i)
        .collect();
    if changes.is_empty() {
        return Vec::new();
    }

    // Merge change positions whose context windows overlap
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for &idx in &changes {
        let start = idx.saturating_sub(CONTEXT_LINES);
        let end = (idx + CONTEXT_LINES + 1).min(script.len());
        match ranges.last_mut() {
            Some(last) if start <= last.1 => last.1 = end,
            _ => ranges.push((start, end)),
        }
    }

    ranges
        .into_iter()
        .map(|(start, end)| {
            let slice = &script[start..end];
            let (mut old_start, mut new_start) = (None, None);
            let (mut old_count, mut new_count) = (0, 0);
            let mut lines = Vec::with_capacity(slice.len());

            for (op, text) in slice {
                match *op {
                    Op::Keep(o, n) => {
                        old_start.get_or_insert(o);
                        new_start.get_or_insert(n);
                        old_count += 1;
                        new_count += 1;
                        lines.push(DiffLine::Context(text.to_string()));
                    }
                    Op::Remove(o) => {
                        old_start.get_or_insert(o);
                        old_count += 1;
                        lines.push(DiffLine::Removed(text.to_string()));
                    }
                    Op::Add(n) => {
                        new_start.get_or_insert(n);
                        new_count += 1;
                        lines.push(DiffLine::Added(text.to_string()));
                    }
                }
            }

            DiffHunk {
                old_start: hunk_start(old_start, old_count, script, start, true),
                old_count,
                new_start: hunk_start(new_start, new_count, script, start, false),
                new_count,
                lines,
            }
        })
        .collect()
}

/// 1-based start line; an empty side points at the line before the hunk
fn hunk_start(
    first: Option<usize>,
    count: usize,
    script: &[(Op, &str)],
    start: usize,
    old_side: bool,
) -> usize {
    match first {
        Some(line) if count > 0 => line + 1,
        _ => script[..start]
            .iter()
            .filter(|(op, _)| match op {
                Op::Keep(..) => true,
                Op::Remove(_) => old_side,
                Op::Add(_) => !old_side,
            })
            .count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_text_has_no_hunks() {
        let diff = TextDiff::compute("a\nb\n", "a\nb\n");
        assert!(!diff.has_changes());
    }

    #[test]
    fn test_single_line_change() {
        let diff = TextDiff::compute("a\nb\nc\n", "a\nB\nc\n");

        assert_eq!(diff.hunks.len(), 1);
        assert_eq!(diff.added_count(), 1);
        assert_eq!(diff.removed_count(), 1);
        let unified = diff.format_unified("f.txt");
        assert!(unified.contains("@@ -1,3 +1,3 @@"));
        assert!(unified.contains("-b\n+B\n"));
    }

    #[test]
    fn test_distant_changes_split_hunks() {
        let old: Vec<String> = (0..30).map(|i| format!("line {i}")).collect();
        let mut new = old.clone();
        new[2] = "changed 2".to_string();
        new[25] = "changed 25".to_string();

        let diff = TextDiff::compute(&old.join("\n"), &new.join("\n"));

        assert_eq!(diff.hunks.len(), 2);
        assert_eq!(diff.hunks[1].old_start, 23);
    }

    #[test]
    fn test_insertion_into_empty() {
        let diff = TextDiff::compute("", "new\n");

        assert_eq!(diff.added_count(), 1);
        assert_eq!(diff.hunks[0].old_start, 0);
        assert_eq!(diff.hunks[0].old_count, 0);
        assert_eq!(diff.hunks[0].new_start, 1);
    }

    #[test]
    fn test_file_content_detects_binary() {
        assert_eq!(
            FileContent::from_bytes(b"text".to_vec()).as_text(),
            Some("text")
        );
        let binary = FileContent::from_bytes(vec![0xff, 0xfe, 0x00]);
        assert!(binary.as_text().is_none());
        assert_eq!(binary.as_bytes(), &[0xff, 0xfe, 0x00]);
    }
}
