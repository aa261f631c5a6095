//! URL-keyed document cache shared by every provider
//!
//! Entries live in memory and are optionally mirrored to a [`CacheStorage`]
//! on disk so later runs can reuse them. Bodies that fail to parse must be
//! dropped with [`FetchCache::invalidate`] so the next attempt goes back to
//! the network.

use crate::cache::{CacheError, CacheStats, CacheStorage};
use crate::http::{FetchError, HttpFetcher};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// A fetched document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Normalized URL the body was fetched from
    pub url: String,
    /// Response body
    pub body: String,
    /// When the body was retrieved from the network
    pub fetched_at: SystemTime,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Option<Duration>) -> bool {
        match ttl {
            None => true,
            Some(ttl) => self
                .fetched_at
                .elapsed()
                .map(|age| age <= ttl)
                // Timestamps from the future are treated as fresh.
                .unwrap_or(true),
        }
    }
}

/// Get-or-fetch cache in front of an [`HttpFetcher`]
pub struct FetchCache {
    fetcher: Arc<dyn HttpFetcher>,
    entries: Mutex<HashMap<String, Arc<CacheEntry>>>,
    disk: Option<CacheStorage<CacheEntry>>,
    ttl: Option<Duration>,
}

impl std::fmt::Debug for FetchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCache")
            .field("entries", &self.entries.lock().len())
            .field("disk", &self.disk.as_ref().map(|d| d.cache_dir().to_path_buf()))
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl FetchCache {
    /// Creates an in-memory cache in front of `fetcher`
    pub fn new(fetcher: Arc<dyn HttpFetcher>) -> Self {
        Self {
            fetcher,
            entries: Mutex::new(HashMap::new()),
            disk: None,
            ttl: None,
        }
    }

    /// Mirrors entries to the platform cache directory
    pub fn persistent(fetcher: Arc<dyn HttpFetcher>) -> Result<Self, CacheError> {
        let mut cache = Self::new(fetcher);
        cache.disk = Some(CacheStorage::open("http")?);
        Ok(cache)
    }

    /// Mirrors entries to a cache directory below `base_dir`
    pub fn persistent_in(
        fetcher: Arc<dyn HttpFetcher>,
        base_dir: &std::path::Path,
    ) -> Result<Self, CacheError> {
        let mut cache = Self::new(fetcher);
        cache.disk = Some(CacheStorage::open_in(base_dir, "http")?);
        Ok(cache)
    }

    /// Treats entries older than `ttl` as missing
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns the cached body for `url`, fetching it on a miss
    ///
    /// Network errors are never cached.
    pub fn get_or_fetch(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, FetchError> {
        let key = normalize_url(url);

        if let Some(entry) = self.lookup(&key) {
            debug!(url = %crate::http::redact_url(&key), "cache hit");
            return Ok(entry.body.clone());
        }

        let body = self.fetcher.get(url, headers)?;
        let entry = Arc::new(CacheEntry {
            url: key.clone(),
            body,
            fetched_at: SystemTime::now(),
        });

        self.entries.lock().insert(key.clone(), Arc::clone(&entry));
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.store(&disk_key(&key), &entry) {
                warn!(error = %e, "failed to persist cache entry");
            }
        }

        Ok(entry.body.clone())
    }

    /// Forgets the entry for `url` so the next request hits the network
    pub fn invalidate(&self, url: &str) {
        let key = normalize_url(url);
        let removed = self.entries.lock().remove(&key).is_some();

        if let Some(disk) = &self.disk {
            if let Err(e) = disk.remove(&disk_key(&key)) {
                warn!(error = %e, "failed to remove cache entry from disk");
            }
        }

        debug!(url = %crate::http::redact_url(&key), removed, "cache entry invalidated");
    }

    /// Whether a fresh entry exists for `url`
    pub fn contains(&self, url: &str) -> bool {
        self.lookup(&normalize_url(url)).is_some()
    }

    /// Drops every entry, in memory and on disk
    pub fn clear(&self) -> Result<usize, CacheError> {
        let in_memory = {
            let mut entries = self.entries.lock();
            let count = entries.len();
            entries.clear();
            count
        };

        match &self.disk {
            Some(disk) => disk.clear(),
            None => Ok(in_memory),
        }
    }

    /// Reports the number and size of cached entries
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        match &self.disk {
            Some(disk) => disk.stats(),
            None => {
                let entries = self.entries.lock();
                Ok(CacheStats {
                    entries: entries.len(),
                    total_bytes: entries.values().map(|e| e.body.len() as u64).sum(),
                })
            }
        }
    }

    fn lookup(&self, key: &str) -> Option<Arc<CacheEntry>> {
        {
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get(key) {
                if entry.is_fresh(self.ttl) {
                    return Some(Arc::clone(entry));
                }
                entries.remove(key);
            }
        }

        let disk = self.disk.as_ref()?;
        match disk.load(&disk_key(key)) {
            Ok(Some(entry)) if entry.url == key && entry.is_fresh(self.ttl) => {
                let entry = Arc::new(entry);
                self.entries
                    .lock()
                    .insert(key.to_string(), Arc::clone(&entry));
                Some(entry)
            }
            Ok(_) => None,
            Err(e) => {
                // A damaged file is as good as a miss.
                warn!(error = %e, "discarding unreadable cache entry");
                let _ = disk.remove(&disk_key(key));
                None
            }
        }
    }
}

/// Normalizes a URL into a cache key
///
/// Scheme and host are lowercased by the parser, the fragment is dropped and
/// query pairs are sorted so equivalent requests share an entry.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    let Ok(mut parsed) = url::Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    parsed.set_fragment(None);

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        pairs.sort();
        parsed.query_pairs_mut().clear().extend_pairs(pairs);
    }

    parsed.to_string()
}

fn disk_key(key: &str) -> String {
    blake3::hash(key.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves numbered bodies so tests can tell fetches apart
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    impl CountingFetcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl HttpFetcher for CountingFetcher {
        fn get(&self, url: &str, _headers: &[(&str, &str)]) -> Result<String, FetchError> {
            if url.contains("missing") {
                return Err(FetchError::Http {
                    url: url.to_string(),
                    status: 404,
                });
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("body-{}", n))
        }
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("HTTPS://Example.org/path?b=2&a=1#frag"),
            "https://example.org/path?a=1&b=2"
        );
        assert_eq!(normalize_url(" not a url "), "not a url");
    }

    #[test]
    fn test_hit_does_not_refetch() {
        let fetcher = CountingFetcher::new();
        let cache = FetchCache::new(fetcher.clone());

        assert_eq!(cache.get_or_fetch("https://x.org/a?q=1", &[]).unwrap(), "body-1");
        assert_eq!(cache.get_or_fetch("https://x.org/a?q=1", &[]).unwrap(), "body-1");
        assert_eq!(fetcher.calls(), 1);
    }

    #[test]
    fn test_invalidate_forces_refetch() {
        let fetcher = CountingFetcher::new();
        let cache = FetchCache::new(fetcher.clone());

        let first = cache.get_or_fetch("https://x.org/a", &[]).unwrap();
        cache.invalidate("https://x.org/a");
        let second = cache.get_or_fetch("https://x.org/a", &[]).unwrap();

        assert_ne!(first, second);
        assert_eq!(fetcher.calls(), 2);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let fetcher = CountingFetcher::new();
        let cache = FetchCache::new(fetcher.clone());

        let err = cache.get_or_fetch("https://x.org/missing", &[]).unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(!cache.contains("https://x.org/missing"));
    }

    #[test]
    fn test_ttl_expiry() {
        let fetcher = CountingFetcher::new();
        let cache = FetchCache::new(fetcher.clone()).with_ttl(Some(Duration::ZERO));

        cache.get_or_fetch("https://x.org/a", &[]).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        cache.get_or_fetch("https://x.org/a", &[]).unwrap();
        assert_eq!(fetcher.calls(), 2);
    }

    #[test]
    fn test_disk_entries_survive_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new();

        let cache = FetchCache::persistent_in(fetcher.clone(), dir.path()).unwrap();
        cache.get_or_fetch("https://x.org/a", &[]).unwrap();
        drop(cache);

        let reopened = FetchCache::persistent_in(fetcher.clone(), dir.path()).unwrap();
        assert_eq!(reopened.get_or_fetch("https://x.org/a", &[]).unwrap(), "body-1");
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(reopened.stats().unwrap().entries, 1);

        reopened.invalidate("https://x.org/a");
        assert_eq!(reopened.stats().unwrap().entries, 0);
    }

    #[test]
    fn test_concurrent_get_and_invalidate() {
        let fetcher = CountingFetcher::new();
        let cache = FetchCache::new(fetcher.clone());

        std::thread::scope(|s| {
            for worker in 0..8 {
                let cache = &cache;
                s.spawn(move || {
                    for round in 0..50 {
                        let url = format!("https://x.org/{}", round % 5);
                        cache.get_or_fetch(&url, &[]).unwrap();
                        if (round + worker) % 3 == 0 {
                            cache.invalidate(&url);
                        }
                    }
                });
            }
        });

        assert!(cache.stats().unwrap().entries <= 5);
    }
}
