//! cache-info and cache-clear commands.

use std::fs;
use std::path::PathBuf;

use svnstat::{Credentials, RevisionCache, SvnCli, SvnClient, SvnStatError};

pub fn cmd_cache_info(
    cache_dir: PathBuf,
    url: Option<&str>,
    credentials: &Credentials,
) -> Result<(), SvnStatError> {
    let cache = RevisionCache::load(cache_dir);
    let path = cache.path();
    let stats = cache.stats();

    eprintln!("Cache directory: {}", cache.dir().display());
    match fs::metadata(&path) {
        Ok(meta) => eprintln!(
            "Cache file:      {} ({:.1} MB)",
            path.display(),
            meta.len() as f64 / 1_048_576.0
        ),
        Err(_) => eprintln!("Cache file:      {} (not written yet)", path.display()),
    }
    eprintln!("File entries:    {}", stats.file_entries);
    eprintln!("Revisions:       {}", stats.revision_entries);

    if let Some(url) = url {
        eprintln!();
        eprintln!("Branch:          {}", url);
        eprintln!(
            "Latest cached:   {}",
            cache.latest_revision_for(url).as_deref().unwrap_or("(none)")
        );
        match SvnCli::default().latest_revision(url, credentials) {
            Ok(rev) => eprintln!("Latest on server: {}", rev),
            Err(e) => eprintln!("Latest on server: unavailable ({})", e),
        }
    }
    Ok(())
}

pub fn cmd_cache_clear(cache_dir: PathBuf) -> Result<(), SvnStatError> {
    let cache = RevisionCache::load(cache_dir);
    let before = cache.stats();
    cache.clear();
    cache.save()?;
    eprintln!(
        "Removed {} file entries and {} revisions from {}",
        before.file_entries,
        before.revision_entries,
        cache.path().display()
    );
    Ok(())
}
