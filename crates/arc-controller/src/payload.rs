//! Opaque artifact payloads.
//!
//! An artifact carries a free-form document that is forwarded to the
//! workflow as parameters. It has no fixed schema, so it is modelled as a
//! recursive sum type instead of a dynamically typed value: every traversal
//! has to handle scalars, maps and lists explicitly, and maps are ordered so
//! traversals are reproducible.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::{Error, Result};

/// A leaf value in a payload document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scalar {
    /// JSON `null`.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number, kept in its parsed JSON form.
    Number(Number),
    /// A string.
    String(String),
}

impl fmt::Display for Scalar {
    /// Renders the value the way it is passed to a workflow parameter.
    ///
    /// Strings are written without quotes and `null` becomes the empty string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// A nested key/value document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Payload {
    /// A leaf value.
    Scalar(Scalar),
    /// An object with keys in lexicographic order.
    Map(BTreeMap<String, Payload>),
    /// An ordered sequence.
    List(Vec<Payload>),
}

static EMPTY_DOCUMENT: BTreeMap<String, Payload> = BTreeMap::new();

impl Default for Payload {
    fn default() -> Self {
        Self::Scalar(Scalar::Null)
    }
}

impl Payload {
    /// Creates an empty document.
    #[must_use]
    pub fn empty() -> Self {
        Self::Map(BTreeMap::new())
    }

    /// Returns the top-level entries of the document.
    ///
    /// An absent payload (`null`) is an empty document.
    ///
    /// # Errors
    ///
    /// Returns `Error::Serialization` if the top level is a scalar or a list.
    pub fn entries(&self) -> Result<&BTreeMap<String, Payload>> {
        match self {
            Self::Map(map) => Ok(map),
            Self::Scalar(Scalar::Null) => Ok(&EMPTY_DOCUMENT),
            Self::Scalar(_) => Err(Error::serialization(
                "payload must be a key/value document, got a scalar",
            )),
            Self::List(_) => Err(Error::serialization(
                "payload must be a key/value document, got a list",
            )),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Scalar(Scalar::Null),
            Value::Bool(b) => Self::Scalar(Scalar::Bool(b)),
            Value::Number(n) => Self::Scalar(Scalar::Number(n)),
            Value::String(s) => Self::Scalar(Scalar::String(s)),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<Payload> for Value {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Scalar(Scalar::Null) => Self::Null,
            Payload::Scalar(Scalar::Bool(b)) => Self::Bool(b),
            Payload::Scalar(Scalar::Number(n)) => Self::Number(n),
            Payload::Scalar(Scalar::String(s)) => Self::String(s),
            Payload::List(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Payload::Map(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_nested_json_losslessly() {
        let value = json!({"image": "nginx", "tags": ["1.25", "latest"], "opts": {"insecure": false}});
        let payload = Payload::from(value.clone());
        assert_eq!(Value::from(payload), value);
    }

    #[test]
    fn null_payload_is_an_empty_document() {
        let payload = Payload::default();
        let entries = payload
            .entries()
            .unwrap_or_else(|e| panic!("null payload should be a document: {e}"));
        assert!(entries.is_empty());
    }

    #[test]
    fn scalar_and_list_payloads_are_rejected() {
        assert!(matches!(
            Payload::from(json!("just a string")).entries(),
            Err(Error::Serialization { .. })
        ));
        assert!(matches!(
            Payload::from(json!([1, 2])).entries(),
            Err(Error::Serialization { .. })
        ));
    }

    #[test]
    fn scalars_render_without_quotes() {
        assert_eq!(Scalar::String("high".into()).to_string(), "high");
        assert_eq!(Scalar::Bool(true).to_string(), "true");
        assert_eq!(Scalar::Number(Number::from(42)).to_string(), "42");
        assert_eq!(Scalar::Null.to_string(), "");
    }

    #[test]
    fn deserializes_through_serde() {
        let payload: Payload = serde_json::from_str(r#"{"b": 1, "a": {"c": null}}"#)
            .unwrap_or_else(|e| panic!("deserialize: {e}"));
        let Payload::Map(map) = payload else {
            panic!("expected a map");
        };
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
