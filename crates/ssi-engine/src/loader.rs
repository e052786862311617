//! Source loading and output writing.
//!
//! Both sides are traits so embedders can render from memory, a VCS, or a
//! remote store. The defaults work on the local file system through
//! `tokio::fs`.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use futures::future::LocalBoxFuture;
use ssi_cache::{Cache, CacheBucket, CacheBucketExt, NullCache};

use crate::encoding::Encoding;

/// Cache bucket holding decoded sources.
const SOURCES_BUCKET: &str = "sources";

/// Name that writes to standard output instead of a file.
pub const STDOUT: &str = "-";

/// A source could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The resource could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// Requested path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The bytes are not valid in the requested encoding.
    #[error("{} is not valid {encoding}", path.display())]
    Decode {
        /// Requested path.
        path: PathBuf,
        /// Encoding that failed.
        encoding: Encoding,
    },
}

/// Output could not be written.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The destination could not be written.
    #[error("cannot write {}: {source}", path.display())]
    Io {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The text contains a character the encoding cannot represent.
    #[error("cannot write {}: {ch:?} is not representable in {encoding}", path.display())]
    Unencodable {
        /// Destination path.
        path: PathBuf,
        /// First offending character.
        ch: char,
        /// Target encoding.
        encoding: Encoding,
    },
}

/// Loads source text by name.
///
/// Used for the document itself and by deferred inserts such as `include`.
pub trait SourceLoader {
    /// Load and decode the resource at `path`.
    fn load<'a>(
        &'a self,
        path: &'a Path,
        encoding: Encoding,
    ) -> LocalBoxFuture<'a, Result<String, LoadError>>;
}

/// Writes rendered text by name.
pub trait OutputWriter {
    /// Encode and write `text` to `path`; [`STDOUT`] means standard output.
    fn write<'a>(
        &'a self,
        path: &'a Path,
        text: &'a str,
        encoding: Encoding,
    ) -> LocalBoxFuture<'a, Result<(), WriteError>>;
}

/// File system loader with an etag-validated cache.
///
/// The etag is the file's modification time, so edits between renders are
/// picked up while unchanged includes are decoded only once.
pub struct FileLoader {
    cache: Box<dyn CacheBucket>,
}

impl Default for FileLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl FileLoader {
    /// Create a loader without caching.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: NullCache.bucket(SOURCES_BUCKET),
        }
    }

    /// Create a loader that caches decoded sources in `cache`.
    #[must_use]
    pub fn with_cache(cache: &dyn Cache) -> Self {
        Self {
            cache: cache.bucket(SOURCES_BUCKET),
        }
    }
}

impl SourceLoader for FileLoader {
    fn load<'a>(
        &'a self,
        path: &'a Path,
        encoding: Encoding,
    ) -> LocalBoxFuture<'a, Result<String, LoadError>> {
        Box::pin(async move {
            let io_err = |source| LoadError::Io {
                path: path.to_path_buf(),
                source,
            };

            let metadata = tokio::fs::metadata(path).await.map_err(io_err)?;
            let etag = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_nanos().to_string())
                .unwrap_or_default();
            let key = format!("{encoding}:{}", path.display());

            // An empty etag would match anything, so skip the cache entirely.
            if !etag.is_empty()
                && let Some(text) = self.cache.get_string(&key, &etag)
            {
                tracing::debug!(path = %path.display(), "Source cache hit");
                return Ok(text);
            }

            let bytes = tokio::fs::read(path).await.map_err(io_err)?;
            let text = encoding.decode(bytes).ok_or_else(|| LoadError::Decode {
                path: path.to_path_buf(),
                encoding,
            })?;

            if !etag.is_empty() {
                self.cache.set_string(&key, &etag, &text);
            }
            tracing::debug!(path = %path.display(), bytes = text.len(), "Loaded source");
            Ok(text)
        })
    }
}

/// In-memory loader for embedding and tests.
///
/// # Example
///
/// ```
/// use ssi_engine::MemoryLoader;
///
/// let loader = MemoryLoader::new()
///     .with_source("header.html", "<header/>")
///     .with_source("footer.html", "<footer/>");
/// assert_eq!(loader.len(), 2);
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemoryLoader {
    sources: HashMap<PathBuf, String>,
}

impl MemoryLoader {
    /// Create an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source.
    #[must_use]
    pub fn with_source(mut self, path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    /// Add or replace a source.
    pub fn insert(&mut self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.sources.insert(path.into(), text.into());
    }

    /// Number of known sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether no sources are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl SourceLoader for MemoryLoader {
    fn load<'a>(
        &'a self,
        path: &'a Path,
        _encoding: Encoding,
    ) -> LocalBoxFuture<'a, Result<String, LoadError>> {
        let result = self.sources.get(path).cloned().ok_or_else(|| LoadError::Io {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such source"),
        });
        Box::pin(async move { result })
    }
}

/// File system writer; [`STDOUT`] writes to standard output synchronously.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileWriter;

impl OutputWriter for FileWriter {
    fn write<'a>(
        &'a self,
        path: &'a Path,
        text: &'a str,
        encoding: Encoding,
    ) -> LocalBoxFuture<'a, Result<(), WriteError>> {
        Box::pin(async move {
            let bytes = encoding.encode(text).map_err(|ch| WriteError::Unencodable {
                path: path.to_path_buf(),
                ch,
                encoding,
            })?;
            let io_err = |source| WriteError::Io {
                path: path.to_path_buf(),
                source,
            };

            if path == Path::new(STDOUT) {
                let mut stdout = io::stdout().lock();
                stdout.write_all(&bytes).map_err(io_err)?;
                return stdout.flush().map_err(io_err);
            }

            tokio::fs::write(path, bytes).await.map_err(io_err)?;
            tracing::debug!(path = %path.display(), "Wrote output");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use ssi_cache::MemoryCache;

    use super::*;

    #[tokio::test]
    async fn test_file_loader_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "alpha").unwrap();

        let text = FileLoader::new().load(&path, Encoding::Utf8).await.unwrap();
        assert_eq!(text, "alpha");
    }

    #[tokio::test]
    async fn test_file_loader_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");

        let err = FileLoader::new().load(&path, Encoding::Utf8).await.unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
        assert!(err.to_string().contains("missing.txt"));
    }

    #[tokio::test]
    async fn test_file_loader_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin");
        std::fs::write(&path, [0xffu8, 0xfe]).unwrap();

        let err = FileLoader::new().load(&path, Encoding::Utf8).await.unwrap_err();
        assert!(matches!(err, LoadError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_file_loader_populates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "alpha").unwrap();

        let cache = MemoryCache::new();
        let loader = FileLoader::with_cache(&cache);
        loader.load(&path, Encoding::Utf8).await.unwrap();

        let key = format!("utf-8:{}", path.display());
        assert_eq!(
            cache.bucket(SOURCES_BUCKET).get_string(&key, "").as_deref(),
            Some("alpha")
        );
    }

    #[tokio::test]
    async fn test_memory_loader() {
        let loader = MemoryLoader::new().with_source("b.txt", "B");

        assert_eq!(loader.load(Path::new("b.txt"), Encoding::Utf8).await.unwrap(), "B");
        assert!(loader.load(Path::new("c.txt"), Encoding::Utf8).await.is_err());
    }

    #[tokio::test]
    async fn test_file_writer_encodes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");

        FileWriter.write(&path, "caf\u{e9}", Encoding::Latin1).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![b'c', b'a', b'f', 0xe9]);
    }

    #[tokio::test]
    async fn test_file_writer_unencodable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");

        let err = FileWriter
            .write(&path, "\u{20ac}", Encoding::Latin1)
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::Unencodable { ch: '\u{20ac}', .. }));
        assert!(!path.exists());
    }
}
