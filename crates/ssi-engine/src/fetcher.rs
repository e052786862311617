//! Deferred inserts: fetchers and their delivery handles.
//!
//! A handler that cannot produce its replacement right away returns a
//! [`Fetcher`]. The document starts every fetcher once tokenizing is done and
//! waits for all of them before merging.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::LocalBoxFuture;
use tokio::sync::mpsc;

use crate::error::FetchError;

/// Post-processing applied to delivered text before it is stored.
pub type InsertFilter = Box<dyn FnOnce(String) -> Result<String, FetchError>>;

/// One delivery for a segment slot, sent to the document's scheduler.
#[derive(Debug)]
pub(crate) struct Settlement {
    pub index: usize,
    pub result: Result<String, FetchError>,
}

/// How long a fetcher may take before its slot fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Deadline {
    /// Use the document's default timeout.
    #[default]
    Default,
    /// Fail after this long.
    After(Duration),
    /// Never time out.
    Never,
}

impl Deadline {
    /// Resolve against the document default.
    pub(crate) fn resolve(self, default: Option<Duration>) -> Option<Duration> {
        match self {
            Self::Default => default,
            Self::After(limit) => Some(limit),
            Self::Never => None,
        }
    }
}

enum Start {
    Future(LocalBoxFuture<'static, Result<String, FetchError>>),
    Callback(Box<dyn FnOnce(Delivery)>),
}

/// A one-shot asynchronous operation producing the text for one tag.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use ssi_engine::Fetcher;
///
/// // Future-based
/// let a = Fetcher::from_future(async { Ok("B".to_owned()) })
///     .with_timeout(Duration::from_millis(250));
///
/// // Callback-based: deliver from anywhere, exactly once
/// let b = Fetcher::from_callback(|delivery| {
///     std::thread::spawn(move || delivery.deliver(Ok("C".to_owned())));
/// })
/// .with_filter(|text| Ok(text.to_uppercase()));
/// ```
pub struct Fetcher {
    start: Start,
    deadline: Deadline,
    filter: Option<InsertFilter>,
}

impl Fetcher {
    /// Fetch by awaiting `future`.
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<String, FetchError>> + 'static,
    {
        Self::new(Start::Future(Box::pin(future)))
    }

    /// Fetch by handing a [`Delivery`] to `start`.
    ///
    /// `start` runs on a later scheduler tick, never inside the call that
    /// registers it. Dropping the delivery without using it fails the slot.
    pub fn from_callback<F>(start: F) -> Self
    where
        F: FnOnce(Delivery) + 'static,
    {
        Self::new(Start::Callback(Box::new(start)))
    }

    fn new(start: Start) -> Self {
        Self {
            start,
            deadline: Deadline::Default,
            filter: None,
        }
    }

    /// Override the document's default timeout for this fetcher.
    #[must_use]
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.deadline = Deadline::After(limit);
        self
    }

    /// Never time out this fetcher.
    #[must_use]
    pub fn without_timeout(mut self) -> Self {
        self.deadline = Deadline::Never;
        self
    }

    /// Post-process the delivered text before it is stored.
    #[must_use]
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: FnOnce(String) -> Result<String, FetchError> + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    /// This fetcher's deadline.
    #[must_use]
    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// Split off the filter so the document can keep it with the slot.
    pub(crate) fn take_filter(&mut self) -> Option<InsertFilter> {
        self.filter.take()
    }

    /// Turn the fetcher into a task that delivers exactly once.
    pub(crate) fn into_task(self, delivery: Delivery) -> LocalBoxFuture<'static, ()> {
        match self.start {
            Start::Future(future) => Box::pin(async move {
                let result = future.await;
                delivery.deliver(result);
            }),
            Start::Callback(start) => Box::pin(async move {
                tokio::task::yield_now().await;
                start(delivery);
            }),
        }
    }
}

impl fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.start {
            Start::Future(_) => "future",
            Start::Callback(_) => "callback",
        };
        f.debug_struct("Fetcher")
            .field("kind", &kind)
            .field("deadline", &self.deadline)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

/// Completion handle for one deferred insert.
///
/// Consumed by [`deliver`](Self::deliver). A handle dropped without delivering
/// fails its slot with [`FetchError::Abandoned`].
pub struct Delivery {
    index: usize,
    label: Arc<str>,
    tx: Option<mpsc::UnboundedSender<Settlement>>,
}

impl Delivery {
    pub(crate) fn new(
        index: usize,
        label: Arc<str>,
        tx: mpsc::UnboundedSender<Settlement>,
    ) -> Self {
        Self {
            index,
            label,
            tx: Some(tx),
        }
    }

    /// Segment index this delivery settles.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Deliver the result.
    pub fn deliver(mut self, result: Result<String, FetchError>) {
        self.send(result);
    }

    fn send(&mut self, result: Result<String, FetchError>) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        if tx
            .send(Settlement {
                index: self.index,
                result,
            })
            .is_err()
        {
            tracing::debug!(index = self.index, tag = %self.label, "Delivery after render finished");
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if self.tx.is_some() {
            let label = self.label.to_string();
            self.send(Err(FetchError::Abandoned { label }));
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("index", &self.index)
            .field("label", &self.label)
            .field("delivered", &self.tx.is_none())
            .finish()
    }
}
