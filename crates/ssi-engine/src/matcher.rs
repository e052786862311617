//! Tag matcher: decides what a `<` marker in the source is.

use crate::error::TagError;
use crate::grammar::{parse_attrs, split_name};
use crate::tag::{SourcePos, Tag};

/// Marker configuration taken from the command registry.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TagSyntax<'a> {
    /// Tag-name prefix identifying command tags (`!--#`).
    pub prefix: Option<&'a str>,
    /// Suffix a complete tag body must end with (`--`).
    pub suffix: Option<&'a str>,
}

/// Result of matching at a `<` marker.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Matched {
    /// Not tag-shaped; the `<` is ordinary text.
    NotATag,
    /// Tag-shaped but not a command; its `len` bytes pass through verbatim.
    Literal { len: usize },
    /// A command tag spanning `len` bytes.
    Command { tag: Tag, len: usize },
}

/// Match a candidate tag at the start of `input`, which must begin with `<`.
///
/// # Errors
///
/// Returns a [`TagError`] when a command tag has malformed attributes.
pub(crate) fn match_tag(
    input: &str,
    position: SourcePos,
    syntax: TagSyntax<'_>,
) -> Result<Matched, TagError> {
    let quoted = syntax
        .prefix
        .is_none_or(|prefix| input[1..].starts_with(prefix));
    let Some(len) = find_tag_end(input, quoted) else {
        return Ok(Matched::NotATag);
    };

    let raw = &input[..len];
    let mut body = &raw[1..len - 1];

    if let Some(suffix) = syntax.suffix {
        match body.strip_suffix(suffix) {
            Some(stripped) => body = stripped,
            None => return Ok(Matched::Literal { len }),
        }
    }

    let (name, attr_text) = split_name(body);
    if name.is_empty() {
        return Ok(Matched::NotATag);
    }

    let command = match syntax.prefix {
        Some(prefix) => match name.strip_prefix(prefix) {
            Some(cmd) => Some(cmd.to_owned()),
            None => return Ok(Matched::Literal { len }),
        },
        None => None,
    };

    match parse_attrs(attr_text) {
        Ok(attrs) => Ok(Matched::Command {
            tag: Tag::new(name, command, attrs, position, raw),
            len,
        }),
        Err(msg) => Err(Tag::new(name, command, Vec::new(), position, raw)
            .error(format!("malformed tag: {msg}"))),
    }
}

/// Find the byte length of a tag starting at `input[0] == '<'`, up to and
/// including the closing `>`.
///
/// With `quoted`, a `>` or `<` inside a quoted attribute value does not end
/// the tag. Only command tags are scanned that way: an apostrophe in a comment
/// or plain markup must not hide the tags that follow it.
///
/// Returns `None` when another `<` starts before the tag closes or when the
/// input ends first.
fn find_tag_end(input: &str, quoted: bool) -> Option<usize> {
    let mut quote = None;

    for (i, c) in input.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') if quoted => quote = Some(c),
            (None, '>') => return Some(i + 1),
            (None, '<') => return None,
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const SSI: TagSyntax<'static> = TagSyntax {
        prefix: Some("!--#"),
        suffix: Some("--"),
    };

    fn pos() -> SourcePos {
        SourcePos::new(1, 1)
    }

    #[test]
    fn test_command_tag() {
        let input = r#"<!--#include file="b.txt"-->C"#;
        let Matched::Command { tag, len } = match_tag(input, pos(), SSI).unwrap() else {
            panic!("expected command tag");
        };

        assert_eq!(len, input.len() - 1);
        assert_eq!(tag.name(), "!--#include");
        assert_eq!(tag.command(), Some("include"));
        assert_eq!(tag.attr("file"), Some("b.txt"));
        assert_eq!(tag.source(), r#"<!--#include file="b.txt"-->"#);
    }

    #[test]
    fn test_plain_html_is_literal() {
        assert_eq!(
            match_tag("<p class=\"x\">", pos(), SSI).unwrap(),
            Matched::Literal { len: 13 }
        );
    }

    #[test]
    fn test_comment_without_prefix_is_literal() {
        let input = "<!-- note -->";
        assert_eq!(
            match_tag(input, pos(), SSI).unwrap(),
            Matched::Literal { len: input.len() }
        );
    }

    #[test]
    fn test_missing_suffix_is_literal() {
        let input = r#"<!--#include file="b.txt">"#;
        assert_eq!(
            match_tag(input, pos(), SSI).unwrap(),
            Matched::Literal { len: input.len() }
        );
    }

    #[test]
    fn test_unclosed_is_not_a_tag() {
        assert_eq!(match_tag("< 3 and more", pos(), SSI).unwrap(), Matched::NotATag);
        assert_eq!(match_tag("<a <b>", pos(), SSI).unwrap(), Matched::NotATag);
    }

    #[test]
    fn test_gt_inside_quotes() {
        let input = r#"<!--#echo var="a>b"-->"#;
        let Matched::Command { tag, len } = match_tag(input, pos(), SSI).unwrap() else {
            panic!("expected command tag");
        };
        assert_eq!(len, input.len());
        assert_eq!(tag.attr("var"), Some("a>b"));
    }

    #[test]
    fn test_no_prefix_dispatches_every_tag() {
        let syntax = TagSyntax::default();
        let Matched::Command { tag, .. } = match_tag("<br clear=all>", pos(), syntax).unwrap()
        else {
            panic!("expected command tag");
        };
        assert_eq!(tag.name(), "br");
        assert_eq!(tag.command(), None);
        assert_eq!(tag.attr("clear"), Some("all"));
    }

    #[test]
    fn test_malformed_command_tag() {
        let input = r#"<!--#echo var="a" var="b"-->"#;
        let err = match_tag(input, SourcePos::new(4, 9), SSI).unwrap_err();

        assert_eq!(err.label(), r#"cmd "echo" @ 4:9"#);
        assert!(err.message().contains("duplicate"));
    }

    #[test]
    fn test_find_tag_end() {
        assert_eq!(find_tag_end("<a>", true), Some(3));
        assert_eq!(find_tag_end("<a title='>'>x", true), Some(13));
        assert_eq!(find_tag_end("<a title='>'>x", false), Some(11));
        assert_eq!(find_tag_end("<a", true), None);
    }

    #[test]
    fn test_apostrophe_in_comment_ends_at_first_gt() {
        let input = "<!-- don't edit --><!--#x--><!-- it's generated -->";
        assert_eq!(
            match_tag(input, pos(), SSI).unwrap(),
            Matched::Literal { len: "<!-- don't edit -->".len() }
        );
    }

    #[test]
    fn test_quotes_only_tracked_in_command_tags() {
        let input = r#"<p title="a>b">"#;
        assert_eq!(
            match_tag(input, pos(), SSI).unwrap(),
            Matched::Literal { len: r#"<p title="a>"#.len() }
        );
    }
}
