//! Runs deferred inserts concurrently on the current task.
//!
//! Every fetcher and its deadline timer are polled from a single
//! `FuturesUnordered`; their results arrive as settlements over a channel
//! and are applied one at a time, so segment updates never race. The first
//! settlement for a slot wins: a timeout and a late delivery for the same slot
//! produce exactly one outcome.

use std::sync::Arc;

use futures::StreamExt;
use futures::future::LocalBoxFuture;
use futures::stream::FuturesUnordered;
use tokio::sync::mpsc;

use crate::Phase;
use crate::document::Document;
use crate::error::{FailedInsert, FetchError, RenderError, UsageError};
use crate::fetcher::{Delivery, Settlement};
use crate::segment::{PendingInsert, Segment};

impl Document {
    /// Start every deferred insert and wait until all of them settled.
    ///
    /// Inserts run concurrently; the order in which they finish does not
    /// affect the output. A failing insert does not cancel the others.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::OutOfPhase`] unless the document is
    /// [`Phase::Tokenized`], and [`RenderError::FailedInserts`] listing every
    /// failed insert once all of them settled.
    pub async fn fetch_pending_inserts(&mut self) -> Result<(), RenderError> {
        if self.phase != Phase::Tokenized {
            return Err(UsageError::OutOfPhase {
                action: "fetch inserts",
                phase: self.phase,
            }
            .into());
        }
        self.advance(Phase::FetchingInserts);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tasks: FuturesUnordered<LocalBoxFuture<'static, ()>> = FuturesUnordered::new();
        let default_timeout = self.options.timeout;

        for (&index, insert) in &mut self.pending {
            let Some(fetcher) = insert.fetcher.take() else {
                continue;
            };
            let label: Arc<str> = Arc::from(insert.tag.label());
            let limit = fetcher.deadline().resolve(default_timeout);
            tracing::debug!(index, tag = %label, ?limit, "Starting insert");

            if let Some(limit) = limit {
                let tx = tx.clone();
                let label = label.to_string();
                tasks.push(Box::pin(async move {
                    tokio::time::sleep(limit).await;
                    // The receiver is gone once every slot settled.
                    let _ = tx.send(Settlement {
                        index,
                        result: Err(FetchError::Timeout { label, limit }),
                    });
                }));
            }
            tasks.push(fetcher.into_task(Delivery::new(index, label, tx.clone())));
        }
        drop(tx);

        while !self.pending.is_empty() {
            tokio::select! {
                Some(settlement) = rx.recv() => self.settle(settlement),
                Some(()) = tasks.next(), if !tasks.is_empty() => {}
                else => break,
            }
        }

        // Only reachable if a delivery handle escaped without a deadline and
        // every sender is gone.
        for (index, PendingInsert { tag, .. }) in std::mem::take(&mut self.pending) {
            let error = FetchError::Abandoned { label: tag.label() };
            self.record_failure(index, FailedInsert { tag, error });
        }

        self.advance(Phase::FetchedAllInserts);
        if self.failed.is_empty() {
            Ok(())
        } else {
            Err(RenderError::FailedInserts {
                failed: self.failed.clone(),
            })
        }
    }

    /// Apply one delivery. Deliveries for slots that already settled are
    /// ignored.
    pub(crate) fn settle(&mut self, settlement: Settlement) {
        let Settlement { index, result } = settlement;
        let Some(PendingInsert { tag, filter, .. }) = self.pending.remove(&index) else {
            tracing::debug!(index, "Ignoring late or duplicate insert delivery");
            return;
        };

        let result = match (result, filter) {
            (Ok(text), Some(filter)) => filter(text),
            (result, _) => result,
        };

        match result {
            Ok(text) => {
                tracing::debug!(
                    index,
                    tag = %tag.label(),
                    bytes = text.len(),
                    "Insert settled"
                );
                if let Some(slot) = self.segments.get_mut(index) {
                    *slot = Segment::Text(text);
                }
            }
            Err(error) => self.record_failure(index, FailedInsert { tag, error }),
        }
    }

    fn record_failure(&mut self, index: usize, failure: FailedInsert) {
        tracing::warn!(
            index,
            tag = %failure.tag.label(),
            error = %failure.error,
            "Insert failed"
        );
        if let Some(slot) = self.segments.get_mut(index) {
            *slot = Segment::Failed(failure.error.clone());
        }
        self.failed.insert(index, failure);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::fetcher::Fetcher;
    use crate::registry::CommandRegistry;

    fn deferred_doc(source: &str) -> Document {
        let registry = CommandRegistry::default()
            .with_handler("a", |_, _, _| {
                Ok(Fetcher::from_future(async { Ok("A".to_owned()) }).into())
            })
            .with_handler("b", |_, _, _| {
                Ok(Fetcher::from_future(async { Ok("B".to_owned()) }).into())
            });
        let mut doc = Document::with_registry(&registry);
        doc.set_source_text(source).unwrap();
        doc.tokenize().unwrap();
        doc
    }

    #[test]
    fn test_duplicate_settlement_is_ignored() {
        let mut doc = deferred_doc("<!--#a-->");
        doc.settle(Settlement {
            index: 0,
            result: Ok("first".to_owned()),
        });
        doc.settle(Settlement {
            index: 0,
            result: Err(FetchError::failed("second")),
        });

        assert_eq!(doc.segments(), &[Segment::Text("first".to_owned())]);
        assert!(doc.failed_inserts().is_empty());
    }

    #[test]
    fn test_settlement_for_unknown_slot_is_ignored() {
        let mut doc = deferred_doc("x<!--#a-->");
        doc.settle(Settlement {
            index: 0,
            result: Ok("nope".to_owned()),
        });

        assert_eq!(doc.segments()[0], Segment::Text("x".to_owned()));
        assert_eq!(doc.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_fills_every_slot() {
        let mut doc = deferred_doc("<!--#a-->-<!--#b-->");
        doc.fetch_pending_inserts().await.unwrap();

        assert_eq!(doc.phase(), Phase::FetchedAllInserts);
        assert_eq!(
            doc.segments(),
            &[
                Segment::Text("A".to_owned()),
                Segment::Text("-".to_owned()),
                Segment::Text("B".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_without_inserts() {
        let mut doc = deferred_doc("plain");
        doc.fetch_pending_inserts().await.unwrap();

        assert_eq!(doc.phase(), Phase::FetchedAllInserts);
    }

    #[tokio::test]
    async fn test_fetch_requires_tokenized() {
        let mut doc = Document::from_text("abc");

        let err = doc.fetch_pending_inserts().await.unwrap_err();
        assert!(matches!(err, RenderError::Usage(UsageError::OutOfPhase { .. })));
    }

    #[tokio::test]
    async fn test_filter_applies_to_delivered_text() {
        let registry = CommandRegistry::default().with_handler("x", |_, _, _| {
            Ok(Fetcher::from_future(async { Ok("abc".to_owned()) })
                .with_filter(|text| Ok(text.to_uppercase()))
                .into())
        });
        let mut doc = Document::with_registry(&registry);
        doc.set_source_text("<!--#x-->").unwrap();
        doc.tokenize().unwrap();
        doc.fetch_pending_inserts().await.unwrap();

        assert_eq!(doc.segments(), &[Segment::Text("ABC".to_owned())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_override() {
        let registry = CommandRegistry::default()
            .with_handler("slow", |_, _, _| {
                Ok(Fetcher::from_future(async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok("late".to_owned())
                })
                .with_timeout(Duration::from_millis(10))
                .into())
            })
            .with_handler("patient", |_, _, _| {
                Ok(Fetcher::from_future(async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok("ok".to_owned())
                })
                .without_timeout()
                .into())
            });
        let mut doc =
            Document::with_registry(&registry).with_timeout(Some(Duration::from_secs(1)));
        doc.set_source_text("<!--#slow--><!--#patient-->").unwrap();
        doc.tokenize().unwrap();

        let err = doc.fetch_pending_inserts().await.unwrap_err();
        let RenderError::FailedInserts { failed } = err else {
            panic!("expected failed inserts");
        };
        assert_eq!(failed.keys().copied().collect::<Vec<_>>(), vec![0]);
        assert_eq!(failed[&0].error.to_string(), r#"cmd "slow" @ 1:1: timed out after 10ms"#);
        assert_eq!(doc.segments()[1], Segment::Text("ok".to_owned()));
    }
}
