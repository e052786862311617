//! Source caching for the SSI renderer.
//!
//! An include that appears on many pages is read once per modification time
//! instead of once per tag. Loaders talk to a [`Cache`], which hands out
//! independent named [`CacheBucket`]s; every entry in a bucket is stamped with
//! a version string and only returned to a reader asking for the same version.
//!
//! [`MemoryCache`] keeps entries for the life of the process, [`NullCache`]
//! keeps nothing.
//!
//! ```
//! use ssi_cache::{Cache, MemoryCache};
//!
//! let cache = MemoryCache::new();
//! let sources = cache.bucket("sources");
//! sources.set("nav.html", "mtime:17", b"<nav/>");
//!
//! assert_eq!(sources.get("nav.html", "mtime:17"), Some(b"<nav/>".to_vec()));
//! assert_eq!(sources.get("nav.html", "mtime:18"), None);
//! ```

mod ext;
mod memory;

pub use ext::CacheBucketExt;
pub use memory::MemoryCache;

/// Versioned byte store for one kind of cached data.
pub trait CacheBucket: Send + Sync {
    /// Bytes stored under `key` with version `etag`.
    ///
    /// An empty `etag` accepts whatever version is stored.
    fn get(&self, key: &str, etag: &str) -> Option<Vec<u8>>;

    /// Store `value` under `key`, replacing any other version.
    fn set(&self, key: &str, etag: &str, value: &[u8]);
}

/// Source of named [`CacheBucket`]s.
///
/// Handles opened with the same name see the same entries.
pub trait Cache: Send + Sync {
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket>;
}

/// Cache that forgets everything: every lookup misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl Cache for NullCache {
    fn bucket(&self, _name: &str) -> Box<dyn CacheBucket> {
        Box::new(Self)
    }
}

impl CacheBucket for NullCache {
    fn get(&self, _key: &str, _etag: &str) -> Option<Vec<u8>> {
        None
    }

    fn set(&self, _key: &str, _etag: &str, _value: &[u8]) {}
}
