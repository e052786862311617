//! Output segments and merging.

use crate::Phase;
use crate::document::Document;
use crate::error::{FetchError, RenderError, UsageError};
use crate::fetcher::{Fetcher, InsertFilter};
use crate::tag::Tag;

/// One piece of the output, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Final text.
    Text(String),
    /// Waiting for a deferred insert.
    Pending,
    /// The deferred insert for this slot failed.
    Failed(FetchError),
}

impl Segment {
    /// The text, if this segment is final.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Pending | Self::Failed(_) => None,
        }
    }
}

/// Bookkeeping for one unsettled slot.
pub(crate) struct PendingInsert {
    pub tag: Tag,
    pub fetcher: Option<Fetcher>,
    pub filter: Option<InsertFilter>,
}

impl PendingInsert {
    pub(crate) fn new(tag: Tag, mut fetcher: Fetcher) -> Self {
        let filter = fetcher.take_filter();
        Self {
            tag,
            fetcher: Some(fetcher),
            filter,
        }
    }
}

impl Document {
    /// Concatenate all segments into the output text.
    ///
    /// Called by [`render`](Self::render) after every insert settled. Fails on
    /// the first segment that is not text.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::OutOfPhase`] unless the phase is
    /// [`Phase::FetchedAllInserts`], and [`RenderError::Merge`] naming the
    /// first pending or failed segment.
    pub fn merge_segments(&mut self) -> Result<(), RenderError> {
        if self.phase != Phase::FetchedAllInserts {
            return Err(UsageError::OutOfPhase {
                action: "merge segments",
                phase: self.phase,
            }
            .into());
        }

        let capacity = self
            .segments
            .iter()
            .filter_map(Segment::as_text)
            .map(str::len)
            .sum();
        let mut merged = String::with_capacity(capacity);
        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Text(text) => merged.push_str(text),
                Segment::Pending => {
                    return Err(RenderError::Merge {
                        index,
                        reason: "insert never settled".to_owned(),
                    });
                }
                Segment::Failed(error) => {
                    return Err(RenderError::Merge {
                        index,
                        reason: format!("stale fetch error: {error}"),
                    });
                }
            }
        }

        tracing::debug!(
            document = %self,
            segments = self.segments.len(),
            bytes = merged.len(),
            "Merged segments"
        );
        self.merged = Some(merged);
        self.advance(Phase::SegmentsMerged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_text() {
        assert_eq!(Segment::Text("a".to_owned()).as_text(), Some("a"));
        assert_eq!(Segment::Pending.as_text(), None);
    }

    #[test]
    fn test_merge_requires_settled_phase() {
        let mut doc = Document::from_text("abc");

        let err = doc.merge_segments().unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot merge segments in phase has_source_text"
        );
    }
}
