use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar carried by a payload attribute.
///
/// The derived total order (variant rank first, then the natural order of
/// the carried value) is the canonical order used wherever replicas must
/// agree on iteration: most-voted tie-breaks, duplicate detection, and any
/// listing that ends up in an error message.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    /// Explicit "no value" sentinel. A legal vote key: a quorum can agree
    /// on the absence of a value.
    Null,
    Bool(bool),
    Uint(u64),
    Text(String),
}

impl PayloadValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PayloadValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PayloadValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for PayloadValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadValue::Null => f.write_str("null"),
            PayloadValue::Bool(value) => write!(f, "{value}"),
            PayloadValue::Uint(value) => write!(f, "{value}"),
            PayloadValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for PayloadValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for PayloadValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<u64> for PayloadValue {
    fn from(value: u64) -> Self {
        Self::Uint(value)
    }
}

impl From<bool> for PayloadValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
