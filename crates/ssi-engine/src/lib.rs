//! Asynchronous rendering of SSI-style directives.
//!
//! A [`Document`] scans its source for tags such as
//! `<!--#include file="nav.html"-->`, hands each one to the handler chain of
//! its [`CommandRegistry`], and replaces the tag with whatever the chain
//! returns: literal text right away, or text delivered later by a
//! [`Fetcher`]. All fetchers of one document run concurrently on the current
//! task; each has its own timeout, and a failing fetcher never cancels the
//! others.
//!
//! # Architecture
//!
//! - **Tokenizer / matcher**: finds `<...>` candidates, checks the configured
//!   prefix and suffix, parses attributes (quote-aware inside command tags).
//! - **Dispatcher**: runs `>before`, the command handler (or `>other`), and
//!   `>after`, then classifies the result.
//! - **Scheduler**: starts every fetcher, enforces deadlines, applies the first
//!   delivery per slot.
//! - **Merger and hooks**: concatenates the segments, then drains the
//!   `post_fx` and `late_fx` hook queues.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use ssi_engine::{CommandRegistry, Document, MemoryLoader};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = CommandRegistry::default().with_alias("include", "include");
//! let loader = MemoryLoader::new()
//!     .with_source("site/index.shtml", r#"A<!--#include file="b.txt"-->C"#)
//!     .with_source("site/b.txt", "B");
//!
//! let mut doc = Document::with_registry(&registry)
//!     .with_filename("site/index.shtml")
//!     .with_loader(Arc::new(loader));
//! doc.render().await?;
//!
//! assert_eq!(doc.text()?, "ABC");
//! # Ok(())
//! # }
//! ```

mod builtins;
mod cursor;
mod dispatch;
mod document;
mod encoding;
mod error;
mod fetcher;
mod grammar;
mod hooks;
mod loader;
mod matcher;
mod phase;
pub mod registry;
mod scheduler;
mod segment;
mod tag;
mod tokenizer;
mod value;

pub use builtins::BUILTIN_NAMES;
pub use cursor::Cursor;
pub use document::{DEFAULT_TIMEOUT, Document, RenderOptions};
pub use encoding::{Encoding, UnknownEncoding};
pub use error::{FailedInsert, FetchError, HookError, RenderError, TagError, UsageError};
pub use fetcher::{Deadline, Delivery, Fetcher, InsertFilter};
pub use hooks::HookFuture;
pub use loader::{
    FileLoader, FileWriter, LoadError, MemoryLoader, OutputWriter, STDOUT, SourceLoader,
    WriteError,
};
pub use phase::Phase;
pub use registry::{CommandEntry, CommandHandler, CommandRegistry};
pub use segment::Segment;
pub use tag::{SourcePos, Tag};
pub use value::HandlerValue;
