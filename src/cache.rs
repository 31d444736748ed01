//! # Instrumentation Cache
//!
//! On-disk cache of instrumented files so the loader skips re-parsing
//! unchanged sources. One JSON file per crate version at
//! `<cacheDir>/register-<version>.json`, keyed by the JSON encoding of
//! `{filename, esm, jsx}`, holding `{lastMod, code, map}` entries.
//!
//! All IO failures are swallowed: a broken cache only costs a re-parse.
//! Writes are deferred behind a dirty flag; hosts flush at a convenient
//! tick (and `Drop` flushes as a backstop).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::parser::source_maps::SourceMap;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Cache key fields, serialized in this exact order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheKey {
    pub filename: String,
    pub esm: bool,
    pub jsx: bool,
}

impl CacheKey {
    fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Source file mtime, milliseconds since the epoch.
    pub last_mod: u64,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<SourceMap>,
}

/// Instrumented-file cache with fail-silent IO.
#[derive(Debug)]
pub struct RegisterCache {
    path: PathBuf,
    entries: HashMap<String, CacheEntry>,
    dirty: bool,
}

impl RegisterCache {
    /// Opens (or initializes) the cache under `cache_dir`. Read failures
    /// yield an empty cache.
    pub fn open(cache_dir: &Path) -> Self {
        let path = cache_dir.join(format!("register-{VERSION}.json"));
        let entries = std::fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default();
        Self {
            path,
            entries,
            dirty: false,
        }
    }

    /// Cached code for `key`, valid only when the stored mtime matches.
    pub fn get(&self, key: &CacheKey, last_mod: u64) -> Option<&CacheEntry> {
        self.entries
            .get(&key.encode())
            .filter(|entry| entry.last_mod == last_mod)
    }

    pub fn insert(&mut self, key: &CacheKey, entry: CacheEntry) {
        self.entries.insert(key.encode(), entry);
        self.dirty = true;
    }

    /// Writes the cache out if anything changed. Failures are logged and
    /// swallowed.
    pub fn flush(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;
        let Ok(bytes) = serde_json::to_vec(&self.entries) else {
            return;
        };
        if let Some(parent) = self.path.parent() {
            if let Err(error) = std::fs::create_dir_all(parent) {
                warn!("instrumentation cache directory failed: {error}");
                return;
            }
        }
        if let Err(error) = std::fs::write(&self.path, bytes) {
            warn!(
                "instrumentation cache write failed ({}): {error}",
                self.path.display()
            );
        }
    }
}

impl Drop for RegisterCache {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("revivify-cache-test-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn round_trips_entries() {
        let dir = temp_dir("round");
        let key = CacheKey {
            filename: "a.js".to_string(),
            esm: false,
            jsx: false,
        };
        {
            let mut cache = RegisterCache::open(&dir);
            cache.insert(
                &key,
                CacheEntry {
                    last_mod: 42,
                    code: "instrumented".to_string(),
                    map: None,
                },
            );
            cache.flush();
        }
        let cache = RegisterCache::open(&dir);
        let entry = cache.get(&key, 42).expect("entry");
        assert_eq!(entry.code, "instrumented");
        // Stale mtime misses.
        assert!(cache.get(&key, 43).is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn distinct_flags_are_distinct_keys() {
        let a = CacheKey {
            filename: "a.js".to_string(),
            esm: false,
            jsx: false,
        };
        let b = CacheKey {
            filename: "a.js".to_string(),
            esm: true,
            jsx: false,
        };
        assert_ne!(a.encode(), b.encode());
    }

    #[test]
    fn unreadable_cache_is_empty_not_fatal() {
        let dir = temp_dir("bad");
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join(format!("register-{VERSION}.json")), b"not json").expect("write");
        let cache = RegisterCache::open(&dir);
        let key = CacheKey {
            filename: "a.js".to_string(),
            esm: false,
            jsx: false,
        };
        assert!(cache.get(&key, 1).is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
