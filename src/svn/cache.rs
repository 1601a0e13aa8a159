//! Two-tier persistent store for per-revision diff counts.
//!
//! Tier 1 (`files`) holds one entry per (revision, path): line counts plus a
//! content fingerprint. Tier 2 (`summaries`) holds one entry per revision:
//! totals plus the list of paths the diff touched. A summary is only usable
//! while every path in its list still has a tier-1 entry; see
//! [`resolve`](super::resolve) for the fast path that relies on this.
//!
//! ## Persistence
//!
//! The whole store is one pretty-printed JSON document, rewritten on every
//! save (temp file + rename). A missing, unreadable, or wrong-version
//! document is replaced by an empty store. The cache only buys speed, so
//! load never fails the caller.
//!
//! ## Locking
//!
//! Map reads take the shared lock, mutations the exclusive lock. `save`
//! serializes under the shared lock (consistent snapshot) and writes the
//! bytes after releasing it. Saves are serialized among themselves by a
//! separate mutex so two writers never race on the temp file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, SvnStatError};

// ─── Constants ──────────────────────────────────────────────────────

/// Cache document version. Bump when the layout changes incompatibly;
/// a mismatch on load triggers a rebuild.
pub const CACHE_VERSION: &str = "2";

/// File name of the cache document inside the cache directory.
pub const CACHE_FILE_NAME: &str = "svn_cache.json";

/// Separator between revision and path in a tier-1 key. Never appears in an
/// svn revision number.
const KEY_SEP: char = '|';

// ─── Persisted types ────────────────────────────────────────────────

/// Tier 1: line counts for one file in one revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCacheEntry {
    pub revision: String,
    pub file_path: String,
    /// SHA-256 hex of the file content at `revision`. Audit only, never a key.
    pub fingerprint: String,
    /// Blank unless a caller attributes the file to someone.
    #[serde(default)]
    pub author: String,
    pub lines_added: u64,
    pub lines_deleted: u64,
    /// Unix seconds.
    pub written_at: i64,
}

/// Tier 2: totals for one revision plus the paths its diff covered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionSummaryEntry {
    pub revision: String,
    pub branch_url: String,
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub file_count: usize,
    pub file_list: Vec<String>,
    /// Unix seconds.
    pub written_at: i64,
}

/// The whole persisted document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheData {
    pub version: String,
    pub files: HashMap<String, FileCacheEntry>,
    pub summaries: HashMap<String, RevisionSummaryEntry>,
}

impl Default for CacheData {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION.to_string(),
            files: HashMap::new(),
            summaries: HashMap::new(),
        }
    }
}

/// Entry counts reported by `cache-info`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub file_entries: usize,
    pub revision_entries: usize,
}

// ─── Keys ───────────────────────────────────────────────────────────

/// Tier-1 key: `"<revision>|<path>"`.
pub fn file_cache_key(revision: &str, file_path: &str) -> String {
    format!("{}{}{}", revision, KEY_SEP, file_path)
}

/// Tier-2 key: the revision itself.
pub fn revision_cache_key(revision: &str) -> String {
    revision.to_string()
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

// ─── Store ──────────────────────────────────────────────────────────

/// Process-local handle to the revision cache. Owned by the caller and
/// shared by reference (or `Arc`) with the resolver and analysis runner.
#[derive(Debug)]
pub struct RevisionCache {
    dir: PathBuf,
    data: RwLock<CacheData>,
    save_lock: Mutex<()>,
}

impl RevisionCache {
    /// Empty store that will persist into `dir` on the next save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            data: RwLock::new(CacheData::default()),
            save_lock: Mutex::new(()),
        }
    }

    /// Load the store from `dir`, creating the directory when absent.
    ///
    /// Never fails: a missing, corrupt, or wrong-version document yields an
    /// empty store.
    pub fn load(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if !dir.exists() {
            if let Err(e) = fs::create_dir_all(&dir) {
                warn!(dir = %dir.display(), error = %e, "Failed to create cache directory");
            }
        }

        let path = dir.join(CACHE_FILE_NAME);
        let data = match read_document(&path) {
            Ok(Some(data)) if data.version == CACHE_VERSION => {
                info!(
                    path = %path.display(),
                    files = data.files.len(),
                    revisions = data.summaries.len(),
                    "Revision cache loaded"
                );
                data
            }
            Ok(Some(data)) => {
                warn!(
                    path = %path.display(),
                    found = %data.version,
                    expected = CACHE_VERSION,
                    "Cache version mismatch, starting with an empty cache"
                );
                CacheData::default()
            }
            Ok(None) => {
                info!(path = %path.display(), "No cache file, starting with an empty cache");
                CacheData::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read cache, starting with an empty cache");
                CacheData::default()
            }
        };

        Self {
            dir,
            data: RwLock::new(data),
            save_lock: Mutex::new(()),
        }
    }

    /// Directory the document is persisted into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the JSON document.
    pub fn path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE_NAME)
    }

    /// Write the current store to disk (temp file, then rename).
    pub fn save(&self) -> Result<()> {
        let _saving = self
            .save_lock
            .lock()
            .map_err(|e| SvnStatError::LockPoisoned(e.to_string()))?;
        let bytes = {
            let data = self
                .data
                .read()
                .map_err(|e| SvnStatError::LockPoisoned(e.to_string()))?;
            serde_json::to_vec_pretty(&*data)?
        };

        fs::create_dir_all(&self.dir)?;
        let path = self.path();
        let tmp_path = self.dir.join(format!("{}.tmp", CACHE_FILE_NAME));
        fs::write(&tmp_path, &bytes)?;
        fs::rename(&tmp_path, &path)?;

        debug!(path = %path.display(), bytes = bytes.len(), "Revision cache saved");
        Ok(())
    }

    /// Clone of the whole store.
    pub fn snapshot(&self) -> CacheData {
        self.read().clone()
    }

    pub fn stats(&self) -> CacheStats {
        let data = self.read();
        CacheStats {
            file_entries: data.files.len(),
            revision_entries: data.summaries.len(),
        }
    }

    /// Upsert a tier-1 entry, stamped with the current time.
    pub fn put_file(
        &self,
        revision: &str,
        file_path: &str,
        fingerprint: &str,
        author: &str,
        lines_added: u64,
        lines_deleted: u64,
    ) {
        let entry = FileCacheEntry {
            revision: revision.to_string(),
            file_path: file_path.to_string(),
            fingerprint: fingerprint.to_string(),
            author: author.to_string(),
            lines_added,
            lines_deleted,
            written_at: now_secs(),
        };
        self.write()
            .files
            .insert(file_cache_key(revision, file_path), entry);
    }

    /// Upsert a tier-2 entry, stamped with the current time.
    pub fn put_revision_summary(
        &self,
        revision: &str,
        branch_url: &str,
        lines_added: u64,
        lines_deleted: u64,
        file_count: usize,
        file_list: Vec<String>,
    ) {
        let entry = RevisionSummaryEntry {
            revision: revision.to_string(),
            branch_url: branch_url.to_string(),
            lines_added,
            lines_deleted,
            file_count,
            file_list,
            written_at: now_secs(),
        };
        self.write()
            .summaries
            .insert(revision_cache_key(revision), entry);
    }

    pub fn get_file(&self, revision: &str, file_path: &str) -> Option<FileCacheEntry> {
        self.read()
            .files
            .get(&file_cache_key(revision, file_path))
            .cloned()
    }

    pub fn get_revision_summary(&self, revision: &str) -> Option<RevisionSummaryEntry> {
        self.read()
            .summaries
            .get(&revision_cache_key(revision))
            .cloned()
    }

    /// Drop one tier-1 entry. The revision's summary stays, and becomes
    /// unusable until the revision is fetched again.
    pub fn remove_file(&self, revision: &str, file_path: &str) -> Option<FileCacheEntry> {
        self.write().files.remove(&file_cache_key(revision, file_path))
    }

    /// Empty both tiers (in memory only; call [`save`](Self::save) to persist).
    pub fn clear(&self) {
        let mut data = self.write();
        data.files.clear();
        data.summaries.clear();
    }

    /// Highest numeric revision with a summary recorded for `branch_url`.
    pub fn latest_revision_for(&self, branch_url: &str) -> Option<String> {
        self.read()
            .summaries
            .values()
            .filter(|s| s.branch_url == branch_url)
            .filter_map(|s| s.revision.parse::<u64>().ok().map(|n| (n, &s.revision)))
            .max_by_key(|(n, _)| *n)
            .map(|(_, rev)| rev.clone())
    }

    // Map mutations are single inserts/removes, so a poisoned lock still
    // guards a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, CacheData> {
        self.data.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheData> {
        self.data.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// `Ok(None)` when the document does not exist.
fn read_document(path: &Path) -> Result<Option<CacheData>> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}
