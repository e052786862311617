//! Error types for rendering.
//!
//! Errors fall into four groups:
//!
//! - [`UsageError`]: the caller drove the [`Document`](crate::Document) out of
//!   order. These abort the pass immediately.
//! - [`TagError`]: a tag could not be handled (malformed, unsupported handler
//!   value, leftover attributes). Also fatal for the pass.
//! - [`FetchError`]: one deferred insert failed. Recovered per slot and
//!   reported together as [`RenderError::FailedInserts`] once every insert
//!   settled.
//! - Structural errors ([`RenderError::Merge`]) for segments that are not text
//!   when merging.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::Phase;
use crate::loader::{LoadError, WriteError};
use crate::tag::Tag;

/// The caller used the document out of order.
#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    /// Source text was set after tokenizing.
    #[error("cannot set source text: already tokenized")]
    AlreadyTokenized,
    /// Neither source text nor a filename was given.
    #[error("document has neither source text nor a filename")]
    NoSource,
    /// An operation was invoked in the wrong phase.
    #[error("cannot {action} in phase {phase}")]
    OutOfPhase {
        /// What was attempted.
        action: &'static str,
        /// The phase the document was in.
        phase: Phase,
    },
    /// `render()` was entered while inserts from a previous pass are unsettled.
    #[error("cannot render while inserts are pending ({count} outstanding)")]
    PendingInserts {
        /// Number of unsettled inserts.
        count: usize,
    },
    /// Output was requested before the merge completed.
    #[error("document is not rendered yet (phase {phase})")]
    NotRendered {
        /// The phase the document was in.
        phase: Phase,
    },
}

/// A tag could not be handled.
///
/// The label names the command (or raw tag) and its source position, e.g.
/// `cmd "bad" @ 1:2`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{label}: {message}")]
pub struct TagError {
    label: String,
    message: String,
}

impl TagError {
    /// Create an error for the tag described by `label`.
    #[must_use]
    pub fn new(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            message: message.into(),
        }
    }

    /// Tag label (`cmd "name" @ line:char`).
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Error message without the label.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A deferred insert failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The fetcher did not deliver within its time limit.
    #[error("{label}: timed out after {}ms", limit.as_millis())]
    Timeout {
        /// Label of the tag that produced the fetcher.
        label: String,
        /// The limit that expired.
        limit: Duration,
    },
    /// The fetcher dropped its delivery handle without delivering.
    #[error("{label}: fetcher finished without delivering a result")]
    Abandoned {
        /// Label of the tag that produced the fetcher.
        label: String,
    },
    /// The fetcher (or its filter) reported an error.
    #[error("{0}")]
    Failed(String),
}

impl FetchError {
    /// Create a failure from any displayable error.
    #[must_use]
    pub fn failed(message: impl std::fmt::Display) -> Self {
        Self::Failed(message.to_string())
    }
}

impl From<LoadError> for FetchError {
    fn from(err: LoadError) -> Self {
        Self::failed(err)
    }
}

/// A post-processing hook failed.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HookError(String);

impl HookError {
    /// Create a hook error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<WriteError> for HookError {
    fn from(err: WriteError) -> Self {
        Self(err.to_string())
    }
}

impl From<UsageError> for HookError {
    fn from(err: UsageError) -> Self {
        Self(err.to_string())
    }
}

/// A deferred insert that failed, kept for aggregate reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedInsert {
    /// The tag whose fetcher failed.
    pub tag: Tag,
    /// Why it failed.
    pub error: FetchError,
}

/// Everything that can end a render pass.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The document was driven out of order.
    #[error(transparent)]
    Usage(#[from] UsageError),
    /// The source could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),
    /// A tag could not be handled.
    #[error(transparent)]
    Tag(#[from] TagError),
    /// A settled segment is not text.
    #[error("segment #{index}: {reason}")]
    Merge {
        /// Index of the offending segment.
        index: usize,
        /// What was found instead of text.
        reason: String,
    },
    /// A post-processing hook failed.
    #[error("hook {label} failed: {source}")]
    Hook {
        /// Diagnostic label of the hook (`post_fx#3`).
        label: String,
        /// The hook's error.
        #[source]
        source: HookError,
    },
    /// All inserts settled but at least one of them failed.
    #[error("errors in deferred rendering: {} of the inserts failed", failed.len())]
    FailedInserts {
        /// Failed inserts keyed by segment index.
        failed: BTreeMap<usize, FailedInsert>,
    },
    /// Writing the output failed.
    #[error(transparent)]
    Write(#[from] WriteError),
}
