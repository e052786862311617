//! Tag grammar: name and attribute parsing for a single candidate tag.
//!
//! The grammar only sees the inside of a tag, with `<`, `>` and any configured
//! suffix already removed: `!--#include file="b.txt"`.

/// Split a tag body into its name and the attribute text that follows.
pub(crate) fn split_name(body: &str) -> (&str, &str) {
    let end = body.find(char::is_whitespace).unwrap_or(body.len());
    (&body[..end], &body[end..])
}

/// Parse attributes: `key="value"`, `key='value'`, `key=value` or bare `key`.
///
/// Bare keys get an empty value. Returns a message describing the first
/// problem when the attribute text is malformed.
pub(crate) fn parse_attrs(input: &str) -> Result<Vec<(String, String)>, String> {
    let mut attrs: Vec<(String, String)> = Vec::new();
    let mut remaining = input.trim_start();

    while !remaining.is_empty() {
        let key_end = remaining
            .find(|c: char| c.is_whitespace() || c == '=')
            .unwrap_or(remaining.len());
        if key_end == 0 {
            return Err(format!("attribute value without a name near `{}`", excerpt(remaining)));
        }

        let key = &remaining[..key_end];
        if key.contains(['"', '\'']) {
            return Err(format!("unexpected quote in attribute name `{key}`"));
        }
        if attrs.iter().any(|(k, _)| k == key) {
            return Err(format!("duplicate attribute \"{key}\""));
        }

        let after_key = remaining[key_end..].trim_start();
        let value = if let Some(after_eq) = after_key.strip_prefix('=') {
            let (value, rest) = parse_value(key, after_eq.trim_start())?;
            remaining = rest;
            value
        } else {
            remaining = after_key;
            String::new()
        };

        attrs.push((key.to_owned(), value));
        remaining = remaining.trim_start();
    }

    Ok(attrs)
}

/// Parse one attribute value, returning it with the unparsed rest.
fn parse_value<'a>(key: &str, s: &'a str) -> Result<(String, &'a str), String> {
    let mut chars = s.chars();
    match chars.next() {
        Some(quote @ ('"' | '\'')) => {
            let inner = &s[1..];
            let Some(end) = inner.find(quote) else {
                return Err(format!("unterminated value for attribute \"{key}\""));
            };
            Ok((decode_entities(&inner[..end]), &inner[end + 1..]))
        }
        Some(_) => {
            let end = s.find(char::is_whitespace).unwrap_or(s.len());
            Ok((decode_entities(&s[..end]), &s[end..]))
        }
        None => Err(format!("missing value for attribute \"{key}\"")),
    }
}

/// Decode the XML predefined entities.
fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_owned();
    }
    s.replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Short excerpt of the remaining input for error messages.
fn excerpt(s: &str) -> &str {
    match s.char_indices().nth(16) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_split_name() {
        assert_eq!(
            split_name(r#"!--#include file="b.txt""#),
            ("!--#include", r#" file="b.txt""#)
        );
        assert_eq!(split_name("br"), ("br", ""));
        assert_eq!(split_name(" leading"), ("", " leading"));
    }

    #[test]
    fn test_quoted_values() {
        let attrs = parse_attrs(r#" file="b.txt" alt='x y'"#).unwrap();
        assert_eq!(attrs, pairs(&[("file", "b.txt"), ("alt", "x y")]));
    }

    #[test]
    fn test_unquoted_and_bare() {
        let attrs = parse_attrs("width=10 hidden").unwrap();
        assert_eq!(attrs, pairs(&[("width", "10"), ("hidden", "")]));
    }

    #[test]
    fn test_spaces_around_equals() {
        let attrs = parse_attrs(r#"var = "title""#).unwrap();
        assert_eq!(attrs, pairs(&[("var", "title")]));
    }

    #[test]
    fn test_entities_decoded() {
        let attrs = parse_attrs(r#"text="a &lt;b&gt; &amp;amp; &quot;c&quot;""#).unwrap();
        assert_eq!(attrs, pairs(&[("text", r#"a <b> &amp; "c""#)]));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse_attrs("").unwrap(), Vec::new());
        assert_eq!(parse_attrs("   ").unwrap(), Vec::new());
    }

    #[test]
    fn test_duplicate_attribute() {
        let err = parse_attrs(r#"a="1" a="2""#).unwrap_err();
        assert!(err.contains("duplicate"));
    }

    #[test]
    fn test_value_without_name() {
        let err = parse_attrs(r#"="orphan""#).unwrap_err();
        assert!(err.contains("without a name"));
    }

    #[test]
    fn test_unterminated_value() {
        let err = parse_attrs(r#"file="b.txt"#).unwrap_err();
        assert!(err.contains("unterminated"));
    }

    #[test]
    fn test_missing_value() {
        let err = parse_attrs("file=").unwrap_err();
        assert!(err.contains("missing value"));
    }
}
