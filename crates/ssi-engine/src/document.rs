//! The document: one render pass over one source.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::Phase;
use crate::cursor::Cursor;
use crate::encoding::{BYTE_ORDER_MARK, Encoding};
use crate::error::{FailedInsert, RenderError, UsageError};
use crate::hooks::BoxedHook;
use crate::loader::{FileLoader, FileWriter, OutputWriter, SourceLoader};
use crate::registry::CommandRegistry;
use crate::segment::{PendingInsert, Segment};
use crate::tag::SourcePos;

/// Default per-insert timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-document render settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Encoding for the source, includes and output.
    pub encoding: Encoding,
    /// Re-apply a byte-order mark found in the source to the output.
    pub preserve_bom: bool,
    /// Default time limit for each deferred insert (`None` disables it).
    pub timeout: Option<Duration>,
    /// Treat attributes no handler consumed as an error.
    pub reject_leftover_attrs: bool,
    /// Root for `virtual` includes.
    pub base_dir: PathBuf,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            encoding: Encoding::Utf8,
            preserve_bom: true,
            timeout: Some(DEFAULT_TIMEOUT),
            reject_leftover_attrs: true,
            base_dir: PathBuf::from("."),
        }
    }
}

/// A source document and the state of its render pass.
///
/// A document moves through [`Phase`]s in order: load the source, tokenize it
/// (dispatching every command tag), fetch deferred inserts, merge, run hooks.
/// [`render`](Self::render) drives all of it; the individual steps are public
/// for embedders that need finer control.
///
/// # Example
///
/// ```
/// use ssi_engine::{CommandRegistry, Document, Fetcher, HandlerValue};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = CommandRegistry::default()
///     .with_handler("now", |_, _, _| Ok(HandlerValue::from("12:00")))
///     .with_handler("later", |_, _, _| {
///         Ok(Fetcher::from_future(async { Ok("done".to_owned()) }).into())
///     });
///
/// let mut doc = Document::with_registry(&registry);
/// doc.set_source_text("<!--#now--> / <!--#later-->")?;
/// doc.render().await?;
/// assert_eq!(doc.text()?, "12:00 / done");
/// # Ok(())
/// # }
/// ```
pub struct Document {
    pub(crate) filename: Option<PathBuf>,
    pub(crate) options: RenderOptions,
    pub(crate) phase: Phase,
    pub(crate) source: String,
    pub(crate) byte_order_mark: Option<char>,
    pub(crate) segments: Vec<Segment>,
    pub(crate) pending: BTreeMap<usize, PendingInsert>,
    pub(crate) failed: BTreeMap<usize, FailedInsert>,
    pub(crate) merged: Option<String>,
    pub(crate) post_fx: VecDeque<BoxedHook>,
    pub(crate) late_fx: VecDeque<BoxedHook>,
    pub(crate) registry: CommandRegistry,
    pub(crate) vars: HashMap<String, String>,
    pub(crate) loader: Arc<dyn SourceLoader>,
    writer: Arc<dyn OutputWriter>,
    next_id: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self::with_registry(&CommandRegistry::default())
    }
}

impl Document {
    /// Create a document with the default registry and no source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a document whose registry is a copy of `template`.
    #[must_use]
    pub fn with_registry(template: &CommandRegistry) -> Self {
        Self {
            filename: None,
            options: RenderOptions::default(),
            phase: Phase::Init,
            source: String::new(),
            byte_order_mark: None,
            segments: Vec::new(),
            pending: BTreeMap::new(),
            failed: BTreeMap::new(),
            merged: None,
            post_fx: VecDeque::new(),
            late_fx: VecDeque::new(),
            registry: template.clone(),
            vars: HashMap::new(),
            loader: Arc::new(FileLoader::new()),
            writer: Arc::new(FileWriter),
            next_id: 0,
        }
    }

    /// Create a document that loads its source from `path` when rendered.
    #[must_use]
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::new().with_filename(path)
    }

    /// Create a document with the default registry and the given source.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        let mut doc = Self::new();
        doc.install_source(text.into());
        doc
    }

    /// Set the file to load the source from.
    #[must_use]
    pub fn with_filename(mut self, path: impl Into<PathBuf>) -> Self {
        self.filename = Some(path.into());
        self
    }

    /// Replace all render options.
    #[must_use]
    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the encoding.
    #[must_use]
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.options.encoding = encoding;
        self
    }

    /// Set whether a source byte-order mark is kept in the output.
    #[must_use]
    pub fn with_preserve_bom(mut self, preserve: bool) -> Self {
        self.options.preserve_bom = preserve;
        self
    }

    /// Set the default per-insert timeout (`None` disables it).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Set whether unconsumed attributes are an error.
    #[must_use]
    pub fn with_reject_leftover_attrs(mut self, reject: bool) -> Self {
        self.options.reject_leftover_attrs = reject;
        self
    }

    /// Set the root directory for `virtual` includes.
    #[must_use]
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.base_dir = dir.into();
        self
    }

    /// Use `loader` for the source and includes.
    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn SourceLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Use `writer` for [`save_to_file`](Self::save_to_file).
    #[must_use]
    pub fn with_writer(mut self, writer: Arc<dyn OutputWriter>) -> Self {
        self.writer = writer;
        self
    }

    /// Set a variable readable by handlers (see the `echo` built-in).
    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_var(name, value);
        self
    }

    /// Set a variable readable by handlers.
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Provide the source text directly instead of loading a file.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::AlreadyTokenized`] once tokenizing started.
    pub fn set_source_text(&mut self, text: impl Into<String>) -> Result<&mut Self, UsageError> {
        if self.phase >= Phase::Tokenizing {
            return Err(UsageError::AlreadyTokenized);
        }
        self.install_source(text.into());
        Ok(self)
    }

    fn install_source(&mut self, text: String) {
        match text.strip_prefix(BYTE_ORDER_MARK) {
            Some(rest) => {
                self.byte_order_mark = Some(BYTE_ORDER_MARK);
                self.source = rest.to_owned();
            }
            None => {
                self.byte_order_mark = None;
                self.source = text;
            }
        }
        self.advance(Phase::HasSourceText);
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// File the source is loaded from, if any.
    #[must_use]
    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// Render settings.
    #[must_use]
    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// This document's own registry.
    #[must_use]
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Mutable access to this document's registry; other documents built from
    /// the same template are unaffected.
    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    /// Source text without the byte-order mark, once available.
    #[must_use]
    pub fn source_text(&self) -> Option<&str> {
        (self.phase >= Phase::HasSourceText).then_some(self.source.as_str())
    }

    /// Byte-order mark removed from the source, if there was one.
    #[must_use]
    pub fn byte_order_mark(&self) -> Option<char> {
        self.byte_order_mark
    }

    /// Segments produced by the tokenizer.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of deferred inserts not settled yet.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Deferred inserts that failed, by segment index.
    #[must_use]
    pub fn failed_inserts(&self) -> &BTreeMap<usize, FailedInsert> {
        &self.failed
    }

    /// A cursor at the start of the document.
    #[must_use]
    pub fn cursor(&self) -> Cursor<'_> {
        self.cursor_at(SourcePos::new(1, 1), 0)
    }

    pub(crate) fn cursor_at(&self, position: SourcePos, segment_index: usize) -> Cursor<'_> {
        Cursor {
            source_path: self.filename.as_deref(),
            base_dir: &self.options.base_dir,
            position,
            segment_index,
            encoding: self.options.encoding,
            loader: &self.loader,
            vars: &self.vars,
        }
    }

    /// Next diagnostic id, unique within this document.
    pub(crate) fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn advance(&mut self, next: Phase) {
        if next != self.phase {
            tracing::debug!(
                document = %self,
                from = %self.phase,
                to = %next,
                "Phase transition"
            );
        }
        self.phase = next;
    }

    /// Run the pass to completion.
    ///
    /// Calling `render` again on a finished document is a no-op; calling it on
    /// a document whose inserts failed reports them again.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error (usage, load, tag, merge, hook) or
    /// [`RenderError::FailedInserts`] after every insert settled.
    pub async fn render(&mut self) -> Result<(), RenderError> {
        tracing::debug!(document = %self, phase = %self.phase, "Rendering");
        while self.step().await? {}
        Ok(())
    }

    /// Advance the pass by one step. Returns `false` once the document is
    /// [`Phase::Done`].
    ///
    /// Every step moves the document to the next phase, except while hooks
    /// run: each hook is one step.
    ///
    /// # Errors
    ///
    /// See [`render`](Self::render).
    pub async fn step(&mut self) -> Result<bool, RenderError> {
        match self.phase {
            Phase::Init => {
                let Some(path) = self.filename.as_deref() else {
                    return Err(UsageError::NoSource.into());
                };
                let text = self.loader.load(path, self.options.encoding).await?;
                self.source = text;
                self.advance(Phase::ReadSourceFile);
            }
            Phase::ReadSourceFile => {
                let text = std::mem::take(&mut self.source);
                self.install_source(text);
            }
            Phase::HasSourceText => self.tokenize()?,
            Phase::Tokenizing => {
                return Err(UsageError::OutOfPhase {
                    action: "resume an aborted tokenize",
                    phase: self.phase,
                }
                .into());
            }
            Phase::Tokenized => self.fetch_pending_inserts().await?,
            Phase::FetchingInserts => {
                return Err(UsageError::PendingInserts {
                    count: self.pending.len(),
                }
                .into());
            }
            Phase::FetchedAllInserts => {
                if !self.failed.is_empty() {
                    return Err(RenderError::FailedInserts {
                        failed: self.failed.clone(),
                    });
                }
                self.merge_segments()?;
            }
            Phase::SegmentsMerged => self.advance(Phase::RunningHooks),
            Phase::RunningHooks => {
                if !self.run_next_hook().await? {
                    self.advance(Phase::Done);
                }
            }
            Phase::Done => return Ok(false),
        }
        Ok(true)
    }

    /// The rendered text, with the byte-order mark re-applied if configured.
    ///
    /// Available as soon as the segments are merged
    /// ([`Phase::SegmentsMerged`]), not only once the document is
    /// [`Phase::Done`]: hooks read and rewrite it while they run. Until the
    /// pass is done the result may still change under
    /// [`replace_text`](Self::replace_text).
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::NotRendered`] before the merge.
    pub fn text(&self) -> Result<String, UsageError> {
        let Some(merged) = self
            .merged
            .as_deref()
            .filter(|_| self.phase >= Phase::SegmentsMerged)
        else {
            return Err(UsageError::NotRendered { phase: self.phase });
        };

        let mut text = String::with_capacity(merged.len() + BYTE_ORDER_MARK.len_utf8());
        if self.options.preserve_bom
            && let Some(bom) = self.byte_order_mark
        {
            text.push(bom);
        }
        text.push_str(merged);
        Ok(text)
    }

    /// Replace the rendered text; meant for hooks.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::OutOfPhase`] outside of
    /// [`Phase::SegmentsMerged`] and [`Phase::RunningHooks`].
    pub fn replace_text(&mut self, text: impl Into<String>) -> Result<(), UsageError> {
        if !matches!(self.phase, Phase::SegmentsMerged | Phase::RunningHooks) {
            return Err(UsageError::OutOfPhase {
                action: "replace text",
                phase: self.phase,
            });
        }
        self.merged = Some(text.into());
        Ok(())
    }

    /// Write the rendered text through the document's writer; `-` is
    /// standard output.
    ///
    /// # Errors
    ///
    /// Returns a usage error before the merge and [`RenderError::Write`] when
    /// writing fails.
    pub async fn save_to_file(&self, dest: impl AsRef<Path>) -> Result<(), RenderError> {
        let text = self.text()?;
        self.writer
            .write(dest.as_ref(), &text, self.options.encoding)
            .await?;
        Ok(())
    }

    /// Load, render and return the text of `path` using `registry`.
    ///
    /// # Errors
    ///
    /// See [`render`](Self::render).
    pub async fn render_file(
        path: impl Into<PathBuf>,
        registry: &CommandRegistry,
    ) -> Result<String, RenderError> {
        let mut doc = Self::with_registry(registry).with_filename(path);
        doc.render().await?;
        Ok(doc.text()?)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filename {
            Some(path) => write!(f, "[Document {}]", path.display()),
            None => f.write_str("[Document <no file name>]"),
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("filename", &self.filename)
            .field("phase", &self.phase)
            .field("segments", &self.segments.len())
            .field("pending", &self.pending.len())
            .field("failed", &self.failed.len())
            .field("queued_hooks", &self.queued_hooks())
            .finish_non_exhaustive()
    }
}
