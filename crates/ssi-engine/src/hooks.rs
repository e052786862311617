//! Post-processing hooks.
//!
//! Hooks run after the merge, one at a time: every `post_fx` hook first, then
//! `late_fx` hooks. A hook may enqueue further hooks; a `post_fx` hook added by
//! a `late_fx` hook still runs before the remaining `late_fx` hooks.

use futures::future::LocalBoxFuture;

use crate::document::Document;
use crate::error::{HookError, RenderError};

/// Future returned by a hook; borrows the document for its duration.
pub type HookFuture<'d> = LocalBoxFuture<'d, Result<(), HookError>>;

pub(crate) type BoxedHook = Box<dyn for<'d> FnOnce(&'d mut Document) -> HookFuture<'d>>;

impl Document {
    /// Queue a hook for the first post-processing wave.
    ///
    /// # Example
    ///
    /// ```
    /// use ssi_engine::{Document, HookError};
    ///
    /// let mut doc = Document::from_text("hello");
    /// doc.post_fx(|doc| {
    ///     Box::pin(async move {
    ///         let shouted = doc.text()?.to_uppercase();
    ///         doc.replace_text(shouted)?;
    ///         Ok::<_, HookError>(())
    ///     })
    /// });
    /// ```
    pub fn post_fx<F>(&mut self, hook: F) -> &mut Self
    where
        F: for<'d> FnOnce(&'d mut Document) -> HookFuture<'d> + 'static,
    {
        self.post_fx.push_back(Box::new(hook));
        self
    }

    /// Queue a hook that runs after every `post_fx` hook.
    pub fn late_fx<F>(&mut self, hook: F) -> &mut Self
    where
        F: for<'d> FnOnce(&'d mut Document) -> HookFuture<'d> + 'static,
    {
        self.late_fx.push_back(Box::new(hook));
        self
    }

    /// Number of hooks not run yet.
    #[must_use]
    pub fn queued_hooks(&self) -> usize {
        self.post_fx.len() + self.late_fx.len()
    }

    /// Run the next queued hook. Returns `false` when both queues are empty.
    pub(crate) async fn run_next_hook(&mut self) -> Result<bool, RenderError> {
        let (queue, hook) = if let Some(hook) = self.post_fx.pop_front() {
            ("post_fx", hook)
        } else if let Some(hook) = self.late_fx.pop_front() {
            ("late_fx", hook)
        } else {
            return Ok(false);
        };

        let label = format!("{queue}#{}", self.next_id());
        tracing::debug!(document = %self, hook = %label, "Running hook");
        hook(self)
            .await
            .map_err(|source| RenderError::Hook { label, source })?;
        Ok(true)
    }
}
