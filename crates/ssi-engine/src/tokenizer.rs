//! Tokenizer: splits source text into segments.
//!
//! The scan looks for `<`, asks the matcher what it found, and dispatches
//! command tags through the registry. Text between tags becomes literal
//! segments; each dispatched tag becomes one segment of its own, either final
//! text or a placeholder for a deferred insert.

use std::collections::BTreeMap;

use crate::Phase;
use crate::dispatch::Dispatched;
use crate::document::Document;
use crate::error::{RenderError, TagError, UsageError};
use crate::matcher::{Matched, match_tag};
use crate::segment::{PendingInsert, Segment};
use crate::tag::SourcePos;

/// Converts byte offsets to line/character positions, scanning forward only.
#[derive(Debug, Default)]
struct PositionTracker {
    offset: usize,
    line: usize,
    column: usize,
}

impl PositionTracker {
    /// Position of byte `offset` in `text`; `offset` must not go backwards.
    fn advance_to(&mut self, text: &str, offset: usize) -> SourcePos {
        for ch in text[self.offset..offset].chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        self.offset = offset;
        SourcePos::new(self.line + 1, self.column + 1)
    }
}

impl Document {
    /// Split the source text into segments and collect deferred inserts.
    ///
    /// Runs synchronously: handlers are called in source order, and fetchers
    /// they return are only started by
    /// [`fetch_pending_inserts`](Self::fetch_pending_inserts).
    ///
    /// # Errors
    ///
    /// Returns a usage error when there is no source text yet or the document
    /// was already tokenized, and a [`TagError`] for the first tag that could
    /// not be handled. A failed pass leaves the document in
    /// [`Phase::Tokenizing`].
    pub fn tokenize(&mut self) -> Result<(), RenderError> {
        match self.phase {
            Phase::HasSourceText => {}
            Phase::Init | Phase::ReadSourceFile => {
                return Err(UsageError::OutOfPhase {
                    action: "tokenize",
                    phase: self.phase,
                }
                .into());
            }
            _ => return Err(UsageError::AlreadyTokenized.into()),
        }
        self.advance(Phase::Tokenizing);

        let (segments, pending) = self.scan()?;
        tracing::debug!(
            document = %self,
            segments = segments.len(),
            pending = pending.len(),
            "Tokenized"
        );
        self.segments = segments;
        self.pending = pending;
        self.advance(Phase::Tokenized);
        Ok(())
    }

    fn scan(&self) -> Result<(Vec<Segment>, BTreeMap<usize, PendingInsert>), TagError> {
        let text = self.source.as_str();
        let syntax = self.registry.syntax();
        let reject_leftover = self.options.reject_leftover_attrs;

        let mut segments = Vec::new();
        let mut pending = BTreeMap::new();
        let mut tracker = PositionTracker::default();
        let mut literal_start = 0;
        let mut search_from = 0;

        while let Some(found) = text[search_from..].find('<') {
            let at = search_from + found;
            let position = tracker.advance_to(text, at);

            let (mut tag, len) = match match_tag(&text[at..], position, syntax)? {
                Matched::NotATag => {
                    search_from = at + 1;
                    continue;
                }
                Matched::Literal { len } => {
                    search_from = at + len;
                    continue;
                }
                Matched::Command { tag, len } => (tag, len),
            };

            if literal_start < at {
                segments.push(Segment::Text(text[literal_start..at].to_owned()));
            }
            let index = segments.len();
            let cursor = self.cursor_at(position, index);
            match self.registry.dispatch(&mut tag, &cursor, reject_leftover)? {
                Dispatched::Text(replacement) => segments.push(Segment::Text(replacement)),
                Dispatched::Deferred(fetcher) => {
                    tracing::debug!(index, tag = %tag.label(), "Deferred insert");
                    pending.insert(index, PendingInsert::new(tag, fetcher));
                    segments.push(Segment::Pending);
                }
            }

            literal_start = at + len;
            search_from = literal_start;
        }

        if literal_start < text.len() {
            segments.push(Segment::Text(text[literal_start..].to_owned()));
        }
        Ok((segments, pending))
    }
}
