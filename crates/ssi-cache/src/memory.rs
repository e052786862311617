//! In-memory cache implementation.
//!
//! [`MemoryCache`] keeps every bucket in a shared map for the lifetime of the
//! process. Nothing is written to disk, so a fresh process always starts cold.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::{Cache, CacheBucket};

/// Entries of one bucket: key -> (etag, value).
type Entries = HashMap<String, (String, Vec<u8>)>;

/// Process-local [`Cache`].
///
/// Cloning a `MemoryCache` yields a handle to the same storage.
#[derive(Clone, Default)]
pub struct MemoryCache {
    buckets: Arc<Mutex<HashMap<String, Arc<Mutex<Entries>>>>>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cache for MemoryCache {
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket> {
        let entries = match self.buckets.lock() {
            Ok(mut buckets) => Arc::clone(buckets.entry(name.to_owned()).or_default()),
            Err(_) => {
                // A poisoned registry only loses sharing, not correctness.
                tracing::debug!(bucket = name, "Cache registry poisoned, using detached bucket");
                Arc::default()
            }
        };
        Box::new(MemoryCacheBucket { entries })
    }
}

/// A single bucket backed by a shared map.
struct MemoryCacheBucket {
    entries: Arc<Mutex<Entries>>,
}

impl CacheBucket for MemoryCacheBucket {
    fn get(&self, key: &str, etag: &str) -> Option<Vec<u8>> {
        let entries = self.entries.lock().ok()?;
        let (stored_etag, value) = entries.get(key)?;

        if !etag.is_empty() && stored_etag != etag {
            return None;
        }

        Some(value.clone())
    }

    fn set(&self, key: &str, etag: &str, value: &[u8]) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_owned(), (etag.to_owned(), value.to_vec()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_bucket_set_and_get() {
        let cache = MemoryCache::new();
        let bucket = cache.bucket("sources");

        bucket.set("key", "etag1", b"hello");
        assert_eq!(bucket.get("key", "etag1"), Some(b"hello".to_vec()));
    }

    #[test]
    fn test_memory_bucket_etag_mismatch() {
        let bucket = MemoryCache::new().bucket("sources");

        bucket.set("key", "etag1", b"hello");
        assert_eq!(bucket.get("key", "etag2"), None);
    }

    #[test]
    fn test_memory_bucket_empty_etag_skips_validation() {
        let bucket = MemoryCache::new().bucket("sources");

        bucket.set("key", "etag1", b"hello");
        assert_eq!(bucket.get("key", ""), Some(b"hello".to_vec()));
    }

    #[test]
    fn test_memory_bucket_overwrite() {
        let bucket = MemoryCache::new().bucket("sources");

        bucket.set("key", "v1", b"first");
        bucket.set("key", "v2", b"second");

        assert_eq!(bucket.get("key", "v1"), None);
        assert_eq!(bucket.get("key", "v2"), Some(b"second".to_vec()));
    }

    #[test]
    fn test_same_name_shares_storage() {
        let cache = MemoryCache::new();
        let writer = cache.bucket("sources");
        let reader = cache.clone().bucket("sources");

        writer.set("key", "v1", b"shared");
        assert_eq!(reader.get("key", "v1"), Some(b"shared".to_vec()));
    }

    #[test]
    fn test_buckets_are_isolated() {
        let cache = MemoryCache::new();
        cache.bucket("a").set("key", "v1", b"data");

        assert_eq!(cache.bucket("b").get("key", "v1"), None);
    }
}
