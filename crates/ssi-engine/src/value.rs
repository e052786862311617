//! Values passed along a command handler chain.

use std::fmt;
use std::num::FpCategory;

use crate::fetcher::Fetcher;

/// What a command handler returns.
///
/// The value that leaves the chain decides what replaces the tag:
///
/// | value                         | replacement                         |
/// |-------------------------------|-------------------------------------|
/// | `Null`, `Bool(false)`, `0`    | the tag's original text, verbatim   |
/// | `Text(s)` (even empty)        | `s`                                 |
/// | `Fetch(f)`                    | whatever `f` delivers later         |
/// | anything else                 | error naming the tag                |
///
/// Numbers and booleans exist because handlers may be built from untyped
/// configuration; they are never a valid replacement.
#[derive(Debug, Default)]
pub enum HandlerValue {
    /// No value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Numeric value.
    Number(f64),
    /// Literal replacement text.
    Text(String),
    /// Deferred replacement.
    Fetch(Fetcher),
}

impl HandlerValue {
    /// Whether the value means "keep the original tag text".
    #[must_use]
    pub fn is_falsy(&self) -> bool {
        match self {
            Self::Null | Self::Bool(false) => true,
            Self::Number(n) => matches!(n.classify(), FpCategory::Zero | FpCategory::Nan),
            Self::Bool(true) | Self::Text(_) | Self::Fetch(_) => false,
        }
    }
}

impl fmt::Display for HandlerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Fetch(_) => f.write_str("<fetcher>"),
        }
    }
}

impl From<String> for HandlerValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for HandlerValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<bool> for HandlerValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for HandlerValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for HandlerValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<Fetcher> for HandlerValue {
    fn from(f: Fetcher) -> Self {
        Self::Fetch(f)
    }
}

impl<T: Into<HandlerValue>> From<Option<T>> for HandlerValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_falsy_values() {
        assert!(HandlerValue::Null.is_falsy());
        assert!(HandlerValue::Bool(false).is_falsy());
        assert!(HandlerValue::Number(0.0).is_falsy());
        assert!(HandlerValue::Number(f64::NAN).is_falsy());
    }

    #[test]
    fn test_truthy_values() {
        assert!(!HandlerValue::from("").is_falsy());
        assert!(!HandlerValue::Bool(true).is_falsy());
        assert!(!HandlerValue::from(42_i64).is_falsy());
        assert!(!HandlerValue::from(Fetcher::from_future(async { Ok(String::new()) })).is_falsy());
    }

    #[test]
    fn test_option_conversion() {
        assert!(matches!(HandlerValue::from(None::<String>), HandlerValue::Null));
        assert!(matches!(HandlerValue::from(Some("x")), HandlerValue::Text(ref s) if s == "x"));
    }

    #[test]
    fn test_display() {
        assert_eq!(HandlerValue::from(42_i64).to_string(), "42");
        assert_eq!(HandlerValue::from("a").to_string(), "\"a\"");
    }
}
