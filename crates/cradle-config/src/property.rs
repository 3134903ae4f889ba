//! Typed values for engine configuration and system properties.
//!
//! Engine settings historically travelled as untyped property bags. The
//! values accepted by the engine are restricted to strings, integers,
//! booleans, and an explicit null, so they are modelled as a closed enum and
//! validated when settings are resolved rather than when the engine reads
//! them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resolve::ConfigError;

/// Ordered mapping from property key to typed value.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// A single engine configuration or system property value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Explicit null; rendered as an empty value.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Free-form text.
    String(String),
}

impl PropertyValue {
    /// Parses a value supplied on the command line.
    ///
    /// Bare `null` yields [`PropertyValue::Null`], `true`/`false` yield
    /// booleans, decimal integers yield [`PropertyValue::Int`], and text
    /// wrapped in double quotes is kept verbatim without the quotes.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if let Some(inner) = trimmed
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
        {
            return Self::String(inner.to_owned());
        }
        match trimmed {
            "null" => Self::Null,
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            other => other
                .parse::<i64>()
                .map_or_else(|_| Self::String(other.to_owned()), Self::Int),
        }
    }

    /// Returns the integer payload when the value is an integer.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the text payload when the value is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(value) => write!(formatter, "{value}"),
            Self::Int(value) => write!(formatter, "{value}"),
            Self::String(value) => formatter.write_str(value),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u16> for PropertyValue {
    fn from(value: u16) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Splits a `KEY=VALUE` assignment into a key and a typed value.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidAssignment`] when the input lacks an `=` or
/// the key is empty.
pub fn parse_assignment(input: &str) -> Result<(String, PropertyValue), ConfigError> {
    let Some((key, value)) = input.split_once('=') else {
        return Err(ConfigError::InvalidAssignment {
            input: input.to_owned(),
        });
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(ConfigError::InvalidAssignment {
            input: input.to_owned(),
        });
    }
    Ok((key.to_owned(), PropertyValue::parse(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::null("null", PropertyValue::Null)]
    #[case::truthy("true", PropertyValue::Bool(true))]
    #[case::falsy("false", PropertyValue::Bool(false))]
    #[case::integer("5000", PropertyValue::Int(5000))]
    #[case::negative("-1", PropertyValue::Int(-1))]
    #[case::quoted_nil("\"nil\"", PropertyValue::String(String::from("nil")))]
    #[case::quoted_number("\"42\"", PropertyValue::String(String::from("42")))]
    #[case::text("PasswordAuthenticator", PropertyValue::from("PasswordAuthenticator"))]
    fn parses_command_line_values(#[case] input: &str, #[case] expected: PropertyValue) {
        assert_eq!(PropertyValue::parse(input), expected);
    }

    #[test]
    fn null_renders_as_empty_text() {
        assert_eq!(PropertyValue::Null.to_string(), "");
        assert_eq!(PropertyValue::Bool(false).to_string(), "false");
    }

    #[test]
    fn assignment_splits_on_first_equals() {
        let (key, value) = parse_assignment("cassandra.num_tokens=a=b").expect("valid assignment");
        assert_eq!(key, "cassandra.num_tokens");
        assert_eq!(value, PropertyValue::from("a=b"));
    }

    #[rstest]
    #[case::missing_equals("storage_port")]
    #[case::empty_key("=7000")]
    fn assignment_rejects_malformed_input(#[case] input: &str) {
        let error = parse_assignment(input).expect_err("assignment should fail");
        assert!(matches!(error, ConfigError::InvalidAssignment { .. }));
    }
}
