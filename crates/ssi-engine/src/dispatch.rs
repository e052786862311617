//! Handler chain for one tag.
//!
//! For every matched tag the registry runs, in order:
//!
//! 1. `>before`
//! 2. the specific handler (`command`, or `<name` for tags without a command)
//! 3. `>other`, only when step 2 found nothing
//! 4. `>after`
//!
//! Each step receives the previous step's value. Missing steps pass the value
//! through unchanged.

use crate::cursor::Cursor;
use crate::error::TagError;
use crate::fetcher::Fetcher;
use crate::registry::{AFTER, BEFORE, CommandRegistry, OTHER};
use crate::tag::Tag;
use crate::value::HandlerValue;

/// What replaces a tag once its chain ran.
#[derive(Debug)]
pub(crate) enum Dispatched {
    /// Literal text, available now.
    Text(String),
    /// Text delivered later by a fetcher.
    Deferred(Fetcher),
}

impl CommandRegistry {
    /// Run the handler chain for `tag` and classify the result.
    ///
    /// With `reject_leftover` set, attributes no handler consumed are an error
    /// whenever a specific or `>other` handler ran.
    pub(crate) fn dispatch(
        &self,
        tag: &mut Tag,
        cursor: &Cursor<'_>,
        reject_leftover: bool,
    ) -> Result<Dispatched, TagError> {
        let (value, _) = self.apply(BEFORE, HandlerValue::Null, tag, cursor)?;

        let key = match tag.command() {
            Some(command) => command.to_owned(),
            None => format!("<{}", tag.name()),
        };
        let (mut value, mut handled) = self.apply(&key, value, tag, cursor)?;
        if !handled {
            (value, handled) = self.apply(OTHER, value, tag, cursor)?;
        }

        let (value, _) = self.apply(AFTER, value, tag, cursor)?;

        if handled && reject_leftover {
            tag.reject_leftover_attrs()?;
        }
        classify(value, tag)
    }

    fn apply(
        &self,
        key: &str,
        prev: HandlerValue,
        tag: &mut Tag,
        cursor: &Cursor<'_>,
    ) -> Result<(HandlerValue, bool), TagError> {
        match self.resolve(key) {
            Some(handler) => {
                tracing::trace!(key, tag = %tag.label(), "Calling handler");
                Ok((handler.call(prev, tag, cursor)?, true))
            }
            None => Ok((prev, false)),
        }
    }
}

fn classify(value: HandlerValue, tag: &Tag) -> Result<Dispatched, TagError> {
    if value.is_falsy() {
        return Ok(Dispatched::Text(tag.source().to_owned()));
    }
    match value {
        HandlerValue::Text(text) => Ok(Dispatched::Text(text)),
        HandlerValue::Fetch(fetcher) => Ok(Dispatched::Deferred(fetcher)),
        other => Err(tag.error(format!(
            "Unsupported return value from command handler: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::Document;
    use crate::tag::SourcePos;

    fn command_tag(command: &str, attrs: &[(&str, &str)]) -> Tag {
        Tag::new(
            format!("!--#{command}"),
            Some(command.to_owned()),
            attrs
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            SourcePos::new(1, 2),
            format!("<!--#{command}-->"),
        )
    }

    fn dispatch(registry: &CommandRegistry, tag: &mut Tag) -> Result<Dispatched, TagError> {
        let doc = Document::new();
        registry.dispatch(tag, &doc.cursor(), true)
    }

    fn text(result: Result<Dispatched, TagError>) -> String {
        match result.unwrap() {
            Dispatched::Text(text) => text,
            Dispatched::Deferred(_) => panic!("expected text"),
        }
    }

    #[test]
    fn test_unknown_command_keeps_source() {
        let registry = CommandRegistry::default();
        let mut tag = command_tag("nope", &[("a", "1")]);

        // No handler ran, so leftover attributes are not checked.
        assert_eq!(text(dispatch(&registry, &mut tag)), "<!--#nope-->");
    }

    #[test]
    fn test_chain_order() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let record = |name: &'static str| {
            let calls = Rc::clone(&calls);
            move |prev: HandlerValue, _: &mut Tag, _: &Cursor<'_>| {
                calls.borrow_mut().push(name);
                Ok::<_, TagError>(prev)
            }
        };
        let registry = CommandRegistry::default()
            .with_handler(BEFORE, record(">before"))
            .with_handler("x", record("x"))
            .with_handler(OTHER, record(">other"))
            .with_handler(AFTER, record(">after"));

        dispatch(&registry, &mut command_tag("x", &[])).unwrap();
        dispatch(&registry, &mut command_tag("y", &[])).unwrap();

        assert_eq!(
            *calls.borrow(),
            vec![">before", "x", ">after", ">before", ">other", ">after"]
        );
    }

    #[test]
    fn test_after_overrides_result() {
        let registry = CommandRegistry::default()
            .with_handler("x", |_, _, _| Ok(HandlerValue::from("x")))
            .with_handler(AFTER, |prev: HandlerValue, _: &mut Tag, _: &Cursor<'_>| {
                Ok(HandlerValue::from(format!("[{prev}]")))
            });

        assert_eq!(text(dispatch(&registry, &mut command_tag("x", &[]))), r#"["x"]"#);
    }

    #[test]
    fn test_unsupported_value_names_tag() {
        let registry =
            CommandRegistry::default().with_handler("bad", |_, _, _| Ok(HandlerValue::from(42_i64)));

        let err = dispatch(&registry, &mut command_tag("bad", &[])).unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"cmd "bad" @ 1:2: Unsupported return value from command handler: 42"#
        );
    }

    #[test]
    fn test_leftover_attrs_after_handler() {
        let registry = CommandRegistry::default()
            .with_handler("x", |_, tag: &mut Tag, _: &Cursor<'_>| {
                tag.pop_attr("used");
                Ok(HandlerValue::from(""))
            });
        let mut tag = command_tag("x", &[("used", "1"), ("extra", "2")]);

        let err = dispatch(&registry, &mut tag).unwrap_err();
        assert_eq!(err.message(), r#"leftover attributes: "extra""#);
    }

    #[test]
    fn test_leftover_check_can_be_disabled() {
        let registry =
            CommandRegistry::default().with_handler("x", |_, _, _| Ok(HandlerValue::from("ok")));
        let doc = Document::new();
        let mut tag = command_tag("x", &[("extra", "2")]);

        let result = registry.dispatch(&mut tag, &doc.cursor(), false);
        assert_eq!(text(result), "ok");
    }

    #[test]
    fn test_plain_tag_dispatches_by_name() {
        let registry =
            CommandRegistry::empty().with_handler("<br", |_, _, _| Ok(HandlerValue::from("<br/>")));
        let mut tag = Tag::new("br", None, Vec::new(), SourcePos::new(1, 1), "<br>");

        assert_eq!(text(dispatch(&registry, &mut tag)), "<br/>");
    }

    #[test]
    fn test_falsy_values_keep_source() {
        let registry = CommandRegistry::default()
            .with_handler("f", |_, _, _| Ok(HandlerValue::Bool(false)))
            .with_handler("z", |_, _, _| Ok(HandlerValue::Number(0.0)));

        assert_eq!(text(dispatch(&registry, &mut command_tag("f", &[]))), "<!--#f-->");
        assert_eq!(text(dispatch(&registry, &mut command_tag("z", &[]))), "<!--#z-->");
    }
}
