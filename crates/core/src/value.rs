//! Scalar attribute values and their type tags.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::error::SchemaError;

/// An item as a mapping of attribute name to value.
///
/// Ordered so that iteration (and therefore error reporting and wire
/// encoding) is deterministic.
pub type Item = BTreeMap<String, Value>;

/// The scalar kinds an attribute can be declared as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Int,
    Float,
    Bool,
    Uuid,
    DateTime,
}

impl AttributeType {
    /// Returns the canonical tag for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::String => "string",
            AttributeType::Int => "int",
            AttributeType::Float => "float",
            AttributeType::Bool => "bool",
            AttributeType::Uuid => "uuid",
            AttributeType::DateTime => "datetime",
        }
    }

    /// Reinterprets a loosely-typed stored value as this type.
    ///
    /// Stores only know strings, numbers and booleans, so a `uuid` comes back
    /// as a string and a whole `float` may come back as an integer. Returns
    /// `None` when the stored value cannot represent this type.
    pub fn decode(&self, value: Value) -> Option<Value> {
        match (*self, value) {
            (AttributeType::String, v @ Value::String(_)) => Some(v),
            (AttributeType::Int, v @ Value::Int(_)) => Some(v),
            (AttributeType::Float, v @ Value::Float(_)) => Some(v),
            (AttributeType::Float, Value::Int(i)) => Some(Value::Float(i as f64)),
            (AttributeType::Bool, v @ Value::Bool(_)) => Some(v),
            (AttributeType::Uuid, v @ Value::Uuid(_)) => Some(v),
            (AttributeType::Uuid, Value::String(s)) => Uuid::parse_str(&s).ok().map(Value::Uuid),
            (AttributeType::DateTime, v @ Value::DateTime(_)) => Some(v),
            (AttributeType::DateTime, Value::String(s)) => DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc))),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "str" | "string" => Ok(AttributeType::String),
            "int" => Ok(AttributeType::Int),
            "float" => Ok(AttributeType::Float),
            "bool" => Ok(AttributeType::Bool),
            "uuid" => Ok(AttributeType::Uuid),
            "datetime" => Ok(AttributeType::DateTime),
            _ => Err(SchemaError::UnsupportedType(s.to_string())),
        }
    }
}

/// A single scalar attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
}

impl Value {
    /// Returns the runtime type tag of this value.
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            Value::String(_) => AttributeType::String,
            Value::Int(_) => AttributeType::Int,
            Value::Float(_) => AttributeType::Float,
            Value::Bool(_) => AttributeType::Bool,
            Value::Uuid(_) => AttributeType::Uuid,
            Value::DateTime(_) => AttributeType::DateTime,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Orders two values of the same type.
    ///
    /// Values of different types are unordered, mirroring the store where a
    /// comparison across types never holds.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Uuid(u) => write!(f, "{u}"),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::String(s) => serializer.serialize_str(s),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Uuid(u) => u.serialize(serializer),
            Value::DateTime(dt) => serializer.serialize_str(&dt.to_rfc3339()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Uuid(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::DateTime(value)
    }
}

/// Builds an [`Item`] from `name => value` pairs.
///
/// ```
/// use dynabridge_core::{item, Value};
///
/// let user = item! { "UserId" => "u1", "Age" => 42 };
/// assert_eq!(user.get("Age"), Some(&Value::Int(42)));
/// ```
#[macro_export]
macro_rules! item {
    () => { $crate::Item::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut item = $crate::Item::new();
        $( item.insert(::std::string::String::from($name), $crate::Value::from($value)); )+
        item
    }};
}
