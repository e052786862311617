//! Parsed directive tags.

use std::fmt;

use crate::error::TagError;

/// Position of a tag in the source text.
///
/// Both line and character are 1-indexed; characters are counted in Unicode
/// scalar values, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePos {
    /// Line number (1-indexed).
    pub line: usize,
    /// Character within the line (1-indexed).
    pub column: usize,
}

impl SourcePos {
    /// Create a position.
    #[must_use]
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A directive-like marker found in the source text.
///
/// Handlers consume attributes with [`pop_attr`](Self::pop_attr); whatever is
/// left after the handler chain ran is reported as a usage error (unless the
/// document disables that check).
///
/// # Example
///
/// ```
/// use ssi_engine::{SourcePos, Tag};
///
/// let mut tag = Tag::new(
///     "!--#include",
///     Some("include".to_owned()),
///     vec![("file".to_owned(), "b.txt".to_owned())],
///     SourcePos::new(3, 7),
///     r#"<!--#include file="b.txt"-->"#,
/// );
///
/// assert_eq!(tag.pop_attr("file").as_deref(), Some("b.txt"));
/// assert!(tag.leftover_attrs().next().is_none());
/// assert_eq!(tag.label(), r#"cmd "include" @ 3:7"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    name: String,
    command: Option<String>,
    attrs: Vec<(String, String)>,
    position: SourcePos,
    source: String,
}

impl Tag {
    /// Build a tag from its parsed parts.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        command: Option<String>,
        attrs: Vec<(String, String)>,
        position: SourcePos,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            command,
            attrs,
            position,
            source: source.into(),
        }
    }

    /// Raw tag name, including the command prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Command name (tag name without the configured prefix).
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// Where the tag starts in the source.
    #[must_use]
    pub fn position(&self) -> SourcePos {
        self.position
    }

    /// Original source text of the whole tag, `<` and `>` included.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Look at an attribute without consuming it.
    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Consume an attribute, returning its value.
    pub fn pop_attr(&mut self, key: &str) -> Option<String> {
        let idx = self.attrs.iter().position(|(k, _)| k == key)?;
        Some(self.attrs.remove(idx).1)
    }

    /// Consume an attribute, falling back to `default` when it is absent.
    pub fn pop_attr_or(&mut self, key: &str, default: &str) -> String {
        self.pop_attr(key).unwrap_or_else(|| default.to_owned())
    }

    /// Names of attributes nobody consumed, in source order.
    pub fn leftover_attrs(&self) -> impl Iterator<Item = &str> {
        self.attrs.iter().map(|(k, _)| k.as_str())
    }

    /// Diagnostic label: `cmd "name" @ line:char` or `tag <name> @ line:char`.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.command {
            Some(cmd) => format!("cmd \"{cmd}\" @ {}", self.position),
            None => format!("tag <{}> @ {}", self.name, self.position),
        }
    }

    /// Build an error that names this tag and its position.
    #[must_use]
    pub fn error(&self, message: impl Into<String>) -> TagError {
        TagError::new(self.label(), message)
    }

    /// Reject attributes left over after the handlers ran.
    ///
    /// # Errors
    ///
    /// Returns a [`TagError`] listing the leftover attribute names.
    pub fn reject_leftover_attrs(&self) -> Result<(), TagError> {
        if self.attrs.is_empty() {
            return Ok(());
        }
        let names: Vec<String> = self
            .leftover_attrs()
            .map(|name| format!("\"{name}\""))
            .collect();
        Err(self.error(format!("leftover attributes: {}", names.join(", "))))
    }
}
