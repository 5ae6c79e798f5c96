//! Value Codec
//!
//! Every value is stored in one text column. Strings are stored as-is;
//! binary values are stored as lowercase hex, two characters per byte, so
//! arbitrary bytes (including NUL) survive any text-safe column at the cost
//! of doubling their size. A separate kind column records which encoding was
//! used.

use crate::error::{Result, StoreError};
use bytes::Bytes;

/// The logical value held by an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// UTF-8 text
    String(String),
    /// Raw bytes
    Binary(Bytes),
}

impl Value {
    /// Returns the text if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Binary(_) => None,
        }
    }

    /// Returns the raw bytes of either variant.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Value::String(s) => s.as_bytes(),
            Value::Binary(b) => b,
        }
    }

    /// Consumes the value and returns its bytes.
    pub fn into_bytes(self) -> Bytes {
        match self {
            Value::String(s) => Bytes::from(s),
            Value::Binary(b) => b,
        }
    }

    /// The kind this value is stored as.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::String(_) => ValueKind::String,
            Value::Binary(_) => ValueKind::Binary,
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Binary(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Binary(Bytes::from(b))
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Binary(Bytes::copy_from_slice(b))
    }
}

/// Discriminator stored in the `vtype` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String = 0,
    Binary = 1,
}

impl ValueKind {
    pub fn as_i64(self) -> i64 {
        self as i64
    }
}

impl TryFrom<i64> for ValueKind {
    type Error = StoreError;

    fn try_from(raw: i64) -> Result<Self> {
        match raw {
            0 => Ok(ValueKind::String),
            1 => Ok(ValueKind::Binary),
            other => Err(StoreError::InvalidData(format!(
                "unknown value kind {other}"
            ))),
        }
    }
}

/// Encodes a value into its column text and kind.
pub fn encode(value: &Value) -> (String, ValueKind) {
    match value {
        Value::String(s) => (s.clone(), ValueKind::String),
        Value::Binary(b) => (hex::encode(b), ValueKind::Binary),
    }
}

/// Decodes column text back into a value.
///
/// # Errors
///
/// Returns [`StoreError::Codec`] if a binary value is not valid hex.
pub fn decode(raw: String, kind: ValueKind) -> Result<Value> {
    match kind {
        ValueKind::String => Ok(Value::String(raw)),
        ValueKind::Binary => Ok(Value::Binary(Bytes::from(hex::decode(raw)?))),
    }
}
