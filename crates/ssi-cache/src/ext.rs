//! Text helpers on top of byte buckets.

use crate::CacheBucket;

/// Decoded-text access to any [`CacheBucket`].
///
/// ```
/// use ssi_cache::{Cache, CacheBucketExt, MemoryCache};
///
/// let sources = MemoryCache::new().bucket("sources");
/// sources.set_string("footer.html", "1700000000", "<footer/>");
///
/// let hit = sources.get_string("footer.html", "1700000000");
/// assert_eq!(hit.as_deref(), Some("<footer/>"));
/// ```
pub trait CacheBucketExt: CacheBucket {
    /// Cached text, or `None` when missing, stale or not UTF-8.
    fn get_string(&self, key: &str, etag: &str) -> Option<String> {
        self.get(key, etag).and_then(|bytes| String::from_utf8(bytes).ok())
    }

    fn set_string(&self, key: &str, etag: &str, value: &str) {
        self.set(key, etag, value.as_bytes());
    }
}

impl<B: CacheBucket + ?Sized> CacheBucketExt for B {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cache, MemoryCache};

    #[test]
    fn test_string_roundtrip_respects_etag() {
        let bucket = MemoryCache::new().bucket("sources");
        bucket.set_string("a.txt", "1", "alpha");

        assert_eq!(bucket.get_string("a.txt", "1").as_deref(), Some("alpha"));
        assert_eq!(bucket.get_string("a.txt", "2"), None);
    }

    #[test]
    fn test_invalid_utf8_is_a_miss() {
        let bucket = MemoryCache::new().bucket("sources");
        bucket.set("bin", "1", &[0xff, 0xfe, 0x00]);

        assert_eq!(bucket.get_string("bin", "1"), None);
    }
}
