//! Per-revision line counts, served from the revision cache when possible.
//!
//! Fast path: the revision has a summary and every path in its file list has
//! a file entry → no svn calls at all. Anything less (no summary, or a
//! summary whose file entries have drifted) falls back to a full refetch of
//! the revision's diff. The whole diff is refetched even when only one file
//! entry is missing: `svn diff -c` costs one call regardless of file count.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::cache::RevisionCache;
use super::diff::parse_diff;
use super::{Credentials, SvnClient};
use crate::error::Result;

/// Per-file outcome of resolving one revision.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDetail {
    pub lines_added: u64,
    pub lines_deleted: u64,
    /// True when served from the cache.
    pub cached: bool,
    /// Author stored on the file entry; blank for freshly fetched files.
    pub author: String,
}

/// Line counts for one revision.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub files: BTreeMap<String, FileDetail>,
    /// Set when freshly computed counts could not be written to disk. The
    /// counts themselves are still valid.
    #[serde(skip)]
    pub save_error: Option<String>,
}

impl DiffResult {
    /// True when every file came from the cache (no svn calls were made).
    pub fn from_cache(&self) -> bool {
        self.files.values().all(|f| f.cached)
    }
}

/// SHA-256 hex digest of file content.
pub fn fingerprint(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Resolve `revision` of `branch_url` into line counts.
///
/// Any svn failure aborts this revision and is returned; nothing is written
/// to the cache for a revision that failed part-way. No retries.
pub fn resolve_revision<C: SvnClient + ?Sized>(
    client: &C,
    cache: &RevisionCache,
    branch_url: &str,
    revision: &str,
    credentials: &Credentials,
) -> Result<DiffResult> {
    if let Some(result) = from_cache(cache, revision) {
        debug!(revision, files = result.files.len(), "Diff served from cache");
        return Ok(result);
    }

    debug!(revision, branch_url, "Fetching diff");
    let diff_text = client.fetch_diff(branch_url, revision, credentials)?;
    let parsed = parse_diff(&diff_text);

    // Fetch every fingerprint before touching the cache so a failure leaves
    // no half-written revision behind.
    let mut fingerprints = Vec::with_capacity(parsed.files.len());
    for path in parsed.files.keys() {
        let (source, deleted) = match parsed.sources.get(path) {
            Some(src) => (src.path.as_str(), src.deleted),
            None => (path.as_str(), false),
        };
        if deleted {
            // Nothing exists at `revision`; the empty-content digest stands in.
            debug!(revision, path = %source, "File deleted, skipping content fetch");
            fingerprints.push(fingerprint(b""));
            continue;
        }
        let content = client.fetch_file_content(branch_url, revision, source, credentials)?;
        fingerprints.push(fingerprint(&content));
    }

    let mut files = BTreeMap::new();
    for ((path, counts), hash) in parsed.files.iter().zip(&fingerprints) {
        cache.put_file(revision, path, hash, "", counts.added, counts.deleted);
        files.insert(
            path.clone(),
            FileDetail {
                lines_added: counts.added,
                lines_deleted: counts.deleted,
                cached: false,
                author: String::new(),
            },
        );
    }

    let file_list: Vec<String> = parsed.files.keys().cloned().collect();
    cache.put_revision_summary(
        revision,
        branch_url,
        parsed.lines_added,
        parsed.lines_deleted,
        file_list.len(),
        file_list,
    );

    let save_error = match cache.save() {
        Ok(()) => None,
        Err(e) => {
            warn!(revision, error = %e, "Failed to save revision cache");
            Some(e.to_string())
        }
    };

    Ok(DiffResult {
        lines_added: parsed.lines_added,
        lines_deleted: parsed.lines_deleted,
        files,
        save_error,
    })
}

/// Cached result for `revision`, or `None` if the summary is missing or any
/// of its file entries is gone.
fn from_cache(cache: &RevisionCache, revision: &str) -> Option<DiffResult> {
    let summary = cache.get_revision_summary(revision)?;

    let mut files = BTreeMap::new();
    for path in &summary.file_list {
        let Some(entry) = cache.get_file(revision, path) else {
            debug!(revision, path = %path, "File entry missing, summary not usable");
            return None;
        };
        files.insert(
            path.clone(),
            FileDetail {
                lines_added: entry.lines_added,
                lines_deleted: entry.lines_deleted,
                cached: true,
                author: entry.author,
            },
        );
    }

    Some(DiffResult {
        lines_added: summary.lines_added,
        lines_deleted: summary.lines_deleted,
        files,
        save_error: None,
    })
}
