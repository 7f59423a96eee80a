//! Record and key value types.
//!
//! The engine is agnostic about where records come from: anything that can
//! name its own type and expose scalar fields can participate in relationship
//! evaluation. Records are shared as [`SharedRecord`] so that one fetched
//! record can appear in several branches of an evaluation without copying.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use uuid::Uuid;

/// A scalar value used as a record identity or a batch load key.
///
/// Load keys must be hashable and comparable so the loader can deduplicate
/// requests, which is why floating point values are not representable here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    /// Null value (an absent foreign key).
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// UUID value.
    Uuid(Uuid),
    /// String value.
    String(SmolStr),
}

impl KeyValue {
    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the string form if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get the integer form if this is an integer value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Uuid(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for KeyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for KeyValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<Uuid> for KeyValue {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        Self::String(v.into())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        Self::String(v.into())
    }
}

impl From<SmolStr> for KeyValue {
    fn from(v: SmolStr) -> Self {
        Self::String(v)
    }
}

impl<T: Into<KeyValue>> From<Option<T>> for KeyValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

/// A record participating in relationship evaluation.
///
/// Implementations name their own type (the hook for wrapper resolution) and
/// expose the scalar fields used as load keys.
pub trait Record: Send + Sync + fmt::Debug {
    /// The record's type name, used to resolve a wrapper definition when a
    /// relationship carries no explicit override.
    fn type_name(&self) -> &str;

    /// Get a scalar field by name, if present.
    fn field(&self, name: &str) -> Option<KeyValue>;

    /// The record's identity, by convention its `id` field.
    fn id(&self) -> KeyValue {
        self.field("id").unwrap_or(KeyValue::Null)
    }
}

/// A record shared across branches of an evaluation.
pub type SharedRecord = Arc<dyn Record>;

/// A record backed by a JSON object plus a type tag.
///
/// This is the default record representation for serializer hosts, and the
/// fixture type used throughout the tests.
#[derive(Debug, Clone)]
pub struct JsonRecord {
    type_name: SmolStr,
    value: serde_json::Value,
}

impl JsonRecord {
    /// Create a new JSON record with the given type tag.
    pub fn new(type_name: impl Into<SmolStr>, value: serde_json::Value) -> Self {
        Self {
            type_name: type_name.into(),
            value,
        }
    }

    /// Create a shared JSON record.
    pub fn shared(type_name: impl Into<SmolStr>, value: serde_json::Value) -> SharedRecord {
        Arc::new(Self::new(type_name, value))
    }

    /// The underlying JSON value.
    pub fn value(&self) -> &serde_json::Value {
        &self.value
    }
}

impl Record for JsonRecord {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn field(&self, name: &str) -> Option<KeyValue> {
        match self.value.get(name)? {
            serde_json::Value::Null => Some(KeyValue::Null),
            serde_json::Value::Bool(b) => Some(KeyValue::Bool(*b)),
            serde_json::Value::Number(n) => n.as_i64().map(KeyValue::Int),
            serde_json::Value::String(s) => Some(KeyValue::String(s.as_str().into())),
            _ => None,
        }
    }
}
