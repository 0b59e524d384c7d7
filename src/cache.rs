//! Disk-backed search result cache.
//!
//! Maps a normalized `"artist|track"` key to either a resolved match or a
//! `null` tombstone. A tombstone is a real answer: once a key has any value,
//! the resolver never queries the network for it again, in this run or any
//! later one. Every mutation rewrites the whole file through a temp-file
//! rename, so an interrupted run can lose at most the latest write, never
//! corrupt the file.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::ResolvedMatch;

/// Builds the cache lookup key from a normalized artist/track pair.
pub fn cache_key(artist_norm: &str, track_norm: &str) -> String {
    format!("{artist_norm}|{track_norm}")
}

/// Persistent map from normalized (artist, track) keys to search outcomes.
pub struct ResultCache {
    path: PathBuf,
    entries: BTreeMap<String, Option<ResolvedMatch>>,
}

impl ResultCache {
    /// Loads the cache from `path`. An absent file yields an empty cache; an
    /// unreadable or malformed file is an error, since running without the
    /// cache means uncontrolled API usage.
    pub fn load(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read cache file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("malformed cache file {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Pure lookup. Outer `None` means the key was never resolved; inner
    /// `None` is a tombstone.
    pub fn get(&self, key: &str) -> Option<&Option<ResolvedMatch>> {
        self.entries.get(key)
    }

    /// Inserts or overwrites an entry, then persists the entire map.
    pub fn put(&mut self, key: &str, entry: Option<ResolvedMatch>) -> Result<()> {
        self.entries.insert(key.to_string(), entry);
        self.persist()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Full rewrite via a sibling temp file and rename, keeping the on-disk
    /// file whole even if the process dies mid-write.
    fn persist(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("failed to write cache file {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace cache file {}", self.path.display()))?;
        Ok(())
    }
}
