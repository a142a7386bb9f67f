//! Shared primitive identifiers, field types, and stored values.

use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Opaque entity identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Returns the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Storage type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Boolean stored as an integer.
    Bool,
    /// Signed 64-bit integer.
    Int,
    /// Double precision float.
    Float,
    /// UTF-8 text.
    String,
    /// [`Timestamp`] stored as an integer.
    Time,
    /// JSON document stored as text.
    Json,
}

impl FieldType {
    /// SQL column affinity used when creating tables.
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Bool | Self::Int | Self::Time => "INTEGER",
            Self::Float => "REAL",
            Self::String | Self::Json => "TEXT",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Time => "time",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

/// A single stored or assigned value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    String(String),
    /// Timestamp in milliseconds.
    Time(Timestamp),
    /// JSON document.
    Json(serde_json::Value),
}

impl Value {
    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true when the value can be stored in a column of type `ty`.
    ///
    /// Null matches every type; nullability is checked separately.
    pub fn matches(&self, ty: FieldType) -> bool {
        matches!(
            (self, ty),
            (Self::Null, _)
                | (Self::Bool(_), FieldType::Bool)
                | (Self::Int(_), FieldType::Int)
                | (Self::Float(_), FieldType::Float)
                | (Self::Int(_), FieldType::Float)
                | (Self::String(_), FieldType::String)
                | (Self::Time(_), FieldType::Time)
                | (Self::Json(_), FieldType::Json)
        )
    }

    /// Returns the text content for string values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content for int values.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the timestamp content for time values.
    pub fn as_time(&self) -> Option<Timestamp> {
        match self {
            Self::Time(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the JSON content for json values.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Converts to a plain JSON value for views.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(v) => serde_json::Value::Bool(*v),
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Float(v) => serde_json::Value::from(*v),
            Self::String(v) => serde_json::Value::String(v.clone()),
            Self::Time(v) => serde_json::Value::from(*v),
            Self::Json(v) => v.clone(),
        }
    }

    /// Converts a plain JSON value into a value of type `ty`.
    ///
    /// Returns `None` when the JSON shape does not fit the type.
    pub fn from_json(ty: FieldType, json: &serde_json::Value) -> Option<Self> {
        if json.is_null() {
            return Some(Self::Null);
        }
        match ty {
            FieldType::Bool => json.as_bool().map(Self::Bool),
            FieldType::Int => json.as_i64().map(Self::Int),
            FieldType::Float => json.as_f64().map(Self::Float),
            FieldType::String => json.as_str().map(|s| Self::String(s.to_string())),
            FieldType::Time => json.as_u64().map(Self::Time),
            FieldType::Json => Some(Self::Json(json.clone())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Time(v) => write!(f, "{v}ms"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<EntityId> for Value {
    fn from(value: EntityId) -> Self {
        Self::String(value.0)
    }
}

/// Current wall-clock time in milliseconds.
pub fn now_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
