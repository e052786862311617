//! Render phases of a [`Document`](crate::Document).

use std::fmt;

/// Named stage of a document's render state machine.
///
/// Phases only ever move forward within one render pass. The derived ordering
/// follows declaration order, so `phase >= Phase::SegmentsMerged` means "the
/// merged text exists".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Freshly constructed, nothing loaded.
    Init,
    /// Source text was read from the loader but not installed yet.
    ReadSourceFile,
    /// Source text is available.
    HasSourceText,
    /// The tokenizer is running (or failed while running).
    Tokenizing,
    /// Segments and pending inserts are known.
    Tokenized,
    /// Deferred inserts are in flight.
    FetchingInserts,
    /// Every deferred insert settled.
    FetchedAllInserts,
    /// Segments were concatenated into the output text.
    SegmentsMerged,
    /// Post-processing hooks are draining.
    RunningHooks,
    /// Terminal: the pass completed.
    Done,
}

impl Phase {
    /// Stable lowercase name used in logs and error messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::ReadSourceFile => "read_source_file",
            Self::HasSourceText => "has_source_text",
            Self::Tokenizing => "tokenizing",
            Self::Tokenized => "tokenized",
            Self::FetchingInserts => "fetching_inserts",
            Self::FetchedAllInserts => "fetched_all_inserts",
            Self::SegmentsMerged => "segments_merged",
            Self::RunningHooks => "running_hooks",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
