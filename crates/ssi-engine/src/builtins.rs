//! Built-in command handlers.
//!
//! Built-ins are never dispatched directly; a registry reaches them through an
//! alias (`include = "include"`, `>after = "reject_leftover_attrs"`).

use std::sync::Arc;

use crate::cursor::Cursor;
use crate::error::{FetchError, TagError};
use crate::fetcher::Fetcher;
use crate::registry::CommandHandler;
use crate::tag::Tag;
use crate::value::HandlerValue;

/// Names accepted as alias targets without a registry entry.
pub const BUILTIN_NAMES: &[&str] = &[
    "identity",
    "verbatim",
    "drop",
    "reject_leftover_attrs",
    "include",
    "echo",
];

/// Text substituted by `echo` for unknown variables.
const ECHO_FALLBACK: &str = "(none)";

pub(crate) fn lookup(name: &str) -> Option<Arc<dyn CommandHandler>> {
    let handler: Arc<dyn CommandHandler> = match name {
        "identity" => Arc::new(identity),
        "verbatim" => Arc::new(verbatim),
        "drop" => Arc::new(drop_tag),
        "reject_leftover_attrs" => Arc::new(reject_leftover_attrs),
        "include" => Arc::new(include),
        "echo" => Arc::new(echo),
        _ => return None,
    };
    Some(handler)
}

/// Pass the previous value through.
fn identity(
    prev: HandlerValue,
    _tag: &mut Tag,
    _cursor: &Cursor<'_>,
) -> Result<HandlerValue, TagError> {
    Ok(prev)
}

/// Keep the tag text as it appears in the source.
fn verbatim(
    _prev: HandlerValue,
    _tag: &mut Tag,
    _cursor: &Cursor<'_>,
) -> Result<HandlerValue, TagError> {
    Ok(HandlerValue::Null)
}

/// Replace the tag with nothing.
fn drop_tag(
    _prev: HandlerValue,
    _tag: &mut Tag,
    _cursor: &Cursor<'_>,
) -> Result<HandlerValue, TagError> {
    Ok(HandlerValue::Text(String::new()))
}

fn reject_leftover_attrs(
    prev: HandlerValue,
    tag: &mut Tag,
    _cursor: &Cursor<'_>,
) -> Result<HandlerValue, TagError> {
    tag.reject_leftover_attrs()?;
    Ok(prev)
}

/// `<!--#include file="x"-->` or `<!--#include virtual="/x"-->`.
///
/// The file is loaded through the document's loader as a deferred insert.
/// Included text is inserted as-is, not rendered.
fn include(
    _prev: HandlerValue,
    tag: &mut Tag,
    cursor: &Cursor<'_>,
) -> Result<HandlerValue, TagError> {
    let path = match (tag.pop_attr("file"), tag.pop_attr("virtual")) {
        (Some(file), None) => cursor.resolve_file(&file),
        (None, Some(path)) => cursor.resolve_virtual(&path),
        (Some(_), Some(_)) => {
            return Err(tag.error(r#"use either "file" or "virtual", not both"#));
        }
        (None, None) => return Err(tag.error(r#"missing attribute "file" or "virtual""#)),
    };

    let loader = cursor.loader();
    let encoding = cursor.encoding;
    let fetcher = Fetcher::from_future(async move {
        loader
            .load(&path, encoding)
            .await
            .map_err(FetchError::from)
    });
    Ok(fetcher.into())
}

/// `<!--#echo var="name" default="..."-->`.
fn echo(
    _prev: HandlerValue,
    tag: &mut Tag,
    cursor: &Cursor<'_>,
) -> Result<HandlerValue, TagError> {
    let Some(name) = tag.pop_attr("var") else {
        return Err(tag.error(r#"missing attribute "var""#));
    };
    let fallback = tag.pop_attr_or("default", ECHO_FALLBACK);
    let text = cursor.var(&name).map_or(fallback, str::to_owned);
    Ok(text.into())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::Document;
    use crate::tag::SourcePos;

    fn tag(command: &str, attrs: &[(&str, &str)]) -> Tag {
        Tag::new(
            format!("!--#{command}"),
            Some(command.to_owned()),
            attrs
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            SourcePos::new(1, 1),
            format!("<!--#{command}-->"),
        )
    }

    fn run(doc: &Document, name: &str, tag: &mut Tag) -> Result<HandlerValue, TagError> {
        lookup(name)
            .expect("builtin")
            .call(HandlerValue::Null, tag, &doc.cursor())
    }

    #[test]
    fn test_every_listed_builtin_resolves() {
        for name in BUILTIN_NAMES {
            assert!(lookup(name).is_some(), "{name}");
        }
        assert!(lookup("exec").is_none());
    }

    #[test]
    fn test_identity_passes_previous_value() {
        let doc = Document::new();
        let result = lookup("identity")
            .unwrap()
            .call(HandlerValue::from("x"), &mut tag("a", &[]), &doc.cursor())
            .unwrap();
        assert!(matches!(result, HandlerValue::Text(ref s) if s == "x"));
    }

    #[test]
    fn test_verbatim_is_falsy() {
        let doc = Document::new();
        assert!(run(&doc, "verbatim", &mut tag("a", &[])).unwrap().is_falsy());
    }

    #[test]
    fn test_echo_uses_var() {
        let mut doc = Document::new();
        doc.set_var("title", "Home");

        let result = run(&doc, "echo", &mut tag("echo", &[("var", "title")])).unwrap();
        assert_eq!(result.to_string(), r#""Home""#);
    }

    #[test]
    fn test_echo_default_for_unknown_var() {
        let doc = Document::new();

        let result = run(&doc, "echo", &mut tag("echo", &[("var", "nope")])).unwrap();
        assert_eq!(result.to_string(), r#""(none)""#);

        let mut with_default = tag("echo", &[("var", "nope"), ("default", "-")]);
        let result = run(&doc, "echo", &mut with_default).unwrap();
        assert_eq!(result.to_string(), r#""-""#);
        assert_eq!(with_default.leftover_attrs().count(), 0);
    }

    #[test]
    fn test_echo_requires_var() {
        let doc = Document::new();
        let err = run(&doc, "echo", &mut tag("echo", &[])).unwrap_err();
        assert_eq!(err.to_string(), r#"cmd "echo" @ 1:1: missing attribute "var""#);
    }

    #[test]
    fn test_include_requires_exactly_one_source() {
        let doc = Document::new();

        let err = run(&doc, "include", &mut tag("include", &[])).unwrap_err();
        assert!(err.message().contains("missing attribute"));

        let mut both = tag("include", &[("file", "a"), ("virtual", "/b")]);
        let err = run(&doc, "include", &mut both).unwrap_err();
        assert!(err.message().contains("not both"));
    }

    #[test]
    fn test_include_defers() {
        let doc = Document::new();
        let mut tag = tag("include", &[("file", "b.txt")]);

        let result = run(&doc, "include", &mut tag).unwrap();
        assert!(matches!(result, HandlerValue::Fetch(_)));
        assert_eq!(tag.leftover_attrs().count(), 0);
    }

    #[test]
    fn test_reject_leftover_attrs_builtin() {
        let doc = Document::new();
        let err = run(&doc, "reject_leftover_attrs", &mut tag("x", &[("k", "v")])).unwrap_err();
        assert_eq!(err.message(), r#"leftover attributes: "k""#);
    }
}
