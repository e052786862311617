//! Handler context.
//!
//! Provides source location, path resolution and loader access to command
//! handlers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::encoding::Encoding;
use crate::loader::SourceLoader;
use crate::tag::SourcePos;

/// Context handed to every command handler alongside the tag.
///
/// The cursor is created by the document for each tag and provides:
///
/// - Source file information and the tag's position for error messages
/// - Path resolution for `file` (document-relative) and `virtual`
///   (root-relative) references
/// - The document's loader and variables
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use ssi_engine::Document;
///
/// let doc = Document::new().with_base_dir("/srv/www");
/// let cursor = doc.cursor();
///
/// assert_eq!(cursor.resolve_virtual("/inc/nav.html"), Path::new("/srv/www/inc/nav.html"));
/// ```
pub struct Cursor<'a> {
    /// Path of the document being rendered (if known).
    pub source_path: Option<&'a Path>,
    /// Root directory for `virtual` paths and the fallback for `file` paths.
    pub base_dir: &'a Path,
    /// Position of the current tag.
    pub position: SourcePos,
    /// Segment index the tag's replacement will occupy.
    pub segment_index: usize,
    /// Encoding used for loading includes.
    pub encoding: Encoding,
    pub(crate) loader: &'a Arc<dyn SourceLoader>,
    pub(crate) vars: &'a HashMap<String, String>,
}

impl Cursor<'_> {
    /// Resolve a `file` reference relative to the current document's
    /// directory (or the base directory when the document has no path).
    #[must_use]
    pub fn resolve_file(&self, relative: &str) -> PathBuf {
        let dir = self
            .source_path
            .and_then(Path::parent)
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(self.base_dir);
        dir.join(relative)
    }

    /// Resolve a `virtual` reference relative to the base directory.
    ///
    /// A leading `/` is treated as the base directory itself.
    #[must_use]
    pub fn resolve_virtual(&self, path: &str) -> PathBuf {
        self.base_dir.join(path.trim_start_matches('/'))
    }

    /// Shared handle to the document's loader, for use inside fetchers.
    #[must_use]
    pub fn loader(&self) -> Arc<dyn SourceLoader> {
        Arc::clone(self.loader)
    }

    /// Look up a document variable.
    #[must_use]
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}
