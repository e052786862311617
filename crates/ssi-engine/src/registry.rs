//! Command registry: maps command names to handlers.
//!
//! Every [`Document`](crate::Document) clones its registry from a template at
//! construction, so changes made through one document never leak into
//! another or back into the template.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::builtins;
use crate::cursor::Cursor;
use crate::error::TagError;
use crate::matcher::TagSyntax;
use crate::tag::Tag;
use crate::value::HandlerValue;

/// Key setting the tag-name prefix that marks command tags.
pub const PREFIX: &str = ">prefix";
/// Key setting the suffix a complete tag body must end with.
pub const SUFFIX: &str = ">suffix";
/// Chain slot run before the specific handler of every command tag.
pub const BEFORE: &str = ">before";
/// Chain slot run when no specific handler exists.
pub const OTHER: &str = ">other";
/// Chain slot run after every command tag; may override the result.
pub const AFTER: &str = ">after";

/// Default prefix: `<!--#name ...-->`.
const DEFAULT_PREFIX: &str = "!--#";
/// Default suffix: the comment close before `>`.
const DEFAULT_SUFFIX: &str = "--";

/// A command handler.
///
/// Receives the value produced by the previous handler in the chain, the tag
/// (to consume attributes), and the cursor. Implemented for every matching
/// closure or `fn`.
pub trait CommandHandler {
    /// Handle one tag.
    ///
    /// # Errors
    ///
    /// Returns a [`TagError`] (usually from [`Tag::error`]) to abort the pass.
    fn call(
        &self,
        prev: HandlerValue,
        tag: &mut Tag,
        cursor: &Cursor<'_>,
    ) -> Result<HandlerValue, TagError>;
}

impl<F> CommandHandler for F
where
    F: Fn(HandlerValue, &mut Tag, &Cursor<'_>) -> Result<HandlerValue, TagError>,
{
    fn call(
        &self,
        prev: HandlerValue,
        tag: &mut Tag,
        cursor: &Cursor<'_>,
    ) -> Result<HandlerValue, TagError> {
        self(prev, tag, cursor)
    }
}

/// One registry entry.
#[derive(Clone)]
pub enum CommandEntry {
    /// A handler.
    Handler(Arc<dyn CommandHandler>),
    /// Name of another entry, or of a built-in.
    Alias(String),
}

impl fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler(_) => f.write_str("Handler(..)"),
            Self::Alias(target) => f.debug_tuple("Alias").field(target).finish(),
        }
    }
}

/// Command name → handler mapping plus the tag markers.
///
/// # Example
///
/// ```
/// use ssi_engine::{CommandRegistry, HandlerValue};
/// use ssi_engine::registry::AFTER;
///
/// let template = CommandRegistry::default()
///     .with_handler("year", |_prev, _tag, _cursor| Ok(HandlerValue::from("2024")))
///     .with_alias("inc", "include")
///     .with_alias(AFTER, "reject_leftover_attrs");
///
/// assert!(template.resolve("year").is_some());
/// assert!(template.resolve("inc").is_some()); // built-in via alias
/// assert!(template.resolve("missing").is_none());
/// ```
#[derive(Clone, Debug)]
pub struct CommandRegistry {
    prefix: Option<String>,
    suffix: Option<String>,
    entries: HashMap<String, CommandEntry>,
}

impl Default for CommandRegistry {
    /// SSI markers (`<!--#name ...-->`), no commands.
    fn default() -> Self {
        Self {
            prefix: Some(DEFAULT_PREFIX.to_owned()),
            suffix: Some(DEFAULT_SUFFIX.to_owned()),
            entries: HashMap::new(),
        }
    }
}

impl CommandRegistry {
    /// Registry without markers: every tag is dispatched under `<name`.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            prefix: None,
            suffix: None,
            entries: HashMap::new(),
        }
    }

    /// Prefix identifying command tags.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Suffix required at the end of a tag body.
    #[must_use]
    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    /// Apply a string setting the way configuration files express it.
    ///
    /// [`PREFIX`] and [`SUFFIX`] set the markers (an empty value clears
    /// them); any other key becomes an alias for `value`.
    pub fn configure(&mut self, key: &str, value: &str) {
        let marker = (!value.is_empty()).then(|| value.to_owned());
        match key {
            PREFIX => self.prefix = marker,
            SUFFIX => self.suffix = marker,
            _ => self.insert_alias(key, value),
        }
    }

    /// Register a closure or `fn` under `key`.
    pub fn insert_handler<F>(&mut self, key: impl Into<String>, handler: F)
    where
        F: Fn(HandlerValue, &mut Tag, &Cursor<'_>) -> Result<HandlerValue, TagError> + 'static,
    {
        self.insert_shared(key, Arc::new(handler));
    }

    /// Register an already shared handler under `key`.
    pub fn insert_shared(&mut self, key: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        self.entries.insert(key.into(), CommandEntry::Handler(handler));
    }

    /// Make `key` resolve to whatever `target` names.
    pub fn insert_alias(&mut self, key: impl Into<String>, target: impl Into<String>) {
        self.entries
            .insert(key.into(), CommandEntry::Alias(target.into()));
    }

    /// Remove an entry.
    pub fn remove(&mut self, key: &str) -> Option<CommandEntry> {
        self.entries.remove(key)
    }

    /// Builder form of [`insert_handler`](Self::insert_handler).
    #[must_use]
    pub fn with_handler<F>(mut self, key: impl Into<String>, handler: F) -> Self
    where
        F: Fn(HandlerValue, &mut Tag, &Cursor<'_>) -> Result<HandlerValue, TagError> + 'static,
    {
        self.insert_handler(key, handler);
        self
    }

    /// Builder form of [`insert_alias`](Self::insert_alias).
    #[must_use]
    pub fn with_alias(mut self, key: impl Into<String>, target: impl Into<String>) -> Self {
        self.insert_alias(key, target);
        self
    }

    /// Builder form of [`configure`](Self::configure).
    #[must_use]
    pub fn with_setting(mut self, key: &str, value: &str) -> Self {
        self.configure(key, value);
        self
    }

    /// Whether `key` has an entry (resolvable or not).
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Resolve `key` to a handler.
    ///
    /// Handlers are returned directly. An alias is looked up once more, first
    /// among this registry's handlers, then in the built-in table.
    #[must_use]
    pub fn resolve(&self, key: &str) -> Option<Arc<dyn CommandHandler>> {
        match self.entries.get(key)? {
            CommandEntry::Handler(handler) => Some(Arc::clone(handler)),
            CommandEntry::Alias(target) => match self.entries.get(target) {
                Some(CommandEntry::Handler(handler)) => Some(Arc::clone(handler)),
                _ => builtins::lookup(target),
            },
        }
    }

    pub(crate) fn syntax(&self) -> TagSyntax<'_> {
        TagSyntax {
            prefix: self.prefix(),
            suffix: self.suffix(),
        }
    }
}
