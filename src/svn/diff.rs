//! Unified-diff line counting for `svn diff -c <rev>` output.
//!
//! Pure text → counts. No I/O, no state. The parser is lenient: anything it
//! does not recognise (a `---` header without a following `+++`, binary-file
//! notices, property sections) contributes nothing instead of failing the
//! revision.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

const OLD_HEADER: &str = "---";
const NEW_HEADER: &str = "+++";
/// Revision token svn prints for the missing side of an add or delete.
const NONEXISTENT: &str = "(nonexistent)";

/// Added/deleted line counts for one file block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCounts {
    pub added: u64,
    pub deleted: u64,
}

/// Where a parsed file's content can be fetched from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileSource {
    /// Header path as svn printed it, relative to the diffed URL.
    pub path: String,
    /// The new-side header reads `(nonexistent)`: the revision deleted it.
    pub deleted: bool,
}

/// Result of parsing one revision's diff text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedDiff {
    pub lines_added: u64,
    pub lines_deleted: u64,
    /// File path → counts. Sorted so the cached file list is stable.
    pub files: BTreeMap<String, LineCounts>,
    /// File path → full source path, keyed like `files`. The file path may
    /// be shortened and is only good as a cache key.
    pub sources: BTreeMap<String, FileSource>,
}

/// Parse a concatenation of per-file unified-diff blocks.
///
/// A block starts at a `---` line immediately followed by a `+++` line and
/// runs until the next block. Inside a block, `+` lines count as added and
/// `-` lines as deleted; header lines (`---`/`+++` prefixed) never count.
/// A second block for the same path adds to the first, so the totals always
/// equal the per-file sums.
#[must_use]
pub fn parse_diff(diff: &str) -> ParsedDiff {
    let mut parsed = ParsedDiff::default();
    let lines: Vec<&str> = diff.lines().collect();
    let mut current: Option<String> = None;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if line.starts_with(OLD_HEADER) {
            if let Some(next) = lines.get(i + 1).filter(|l| l.starts_with(NEW_HEADER)) {
                let old_path = header_path(line, OLD_HEADER);
                let new_path = header_path(next, NEW_HEADER);
                let path = resolve_file_path(&old_path, &new_path);
                parsed.files.entry(path.clone()).or_default();
                parsed
                    .sources
                    .entry(path.clone())
                    .or_insert_with(|| FileSource {
                        path: source_path(&old_path, &new_path),
                        deleted: next.trim_end().ends_with(NONEXISTENT),
                    });
                current = Some(path);
                i += 2;
                continue;
            }
            // Unpaired `---`: never a content line.
            i += 1;
            continue;
        }

        if let Some(path) = current.as_ref() {
            if line.starts_with('+') && !line.starts_with(NEW_HEADER) {
                if let Some(counts) = parsed.files.get_mut(path) {
                    counts.added += 1;
                }
                parsed.lines_added += 1;
            } else if line.starts_with('-') {
                if let Some(counts) = parsed.files.get_mut(path) {
                    counts.deleted += 1;
                }
                parsed.lines_deleted += 1;
            }
        }
        i += 1;
    }

    parsed
}

/// Strip the marker and the trailing `(revision N)` / timestamp token from a
/// header line, returning the bare path.
fn header_path(line: &str, marker: &str) -> String {
    let rest = line[marker.len()..].trim();
    // svn separates the path from its revision token with a tab.
    let path = match rest.split_once('\t') {
        Some((path, _)) => path,
        None => match rest.rfind(" (") {
            Some(pos) if rest.ends_with(')') => &rest[..pos],
            _ => rest,
        },
    };
    path.trim().to_string()
}

/// Pick the file path for a block from its two headers.
///
/// An absolute old path is used verbatim without its leading slash. Otherwise
/// the path is the last two segments of the new path (or the final segment
/// if there is only one). A git-style `a/…` / `b/…` header pair collapses to
/// the shared remainder.
pub fn resolve_file_path(old: &str, new: &str) -> String {
    if let Some(stripped) = old.strip_prefix('/') {
        let new_stripped = new.trim_start_matches('/');
        if let (Some(old_rest), Some(new_rest)) =
            (stripped.strip_prefix("a/"), new_stripped.strip_prefix("b/"))
        {
            if old_rest == new_rest {
                return old_rest.to_string();
            }
        }
        return stripped.to_string();
    }

    let parts: Vec<&str> = new.split('/').collect();
    if parts.len() > 1 {
        parts[parts.len() - 2..].join("/")
    } else {
        parts.last().copied().unwrap_or_default().to_string()
    }
}

/// Untruncated path of a block, relative to the diffed URL.
fn source_path(old: &str, new: &str) -> String {
    if old.starts_with('/') {
        resolve_file_path(old, new)
    } else {
        new.trim_start_matches('/').to_string()
    }
}
