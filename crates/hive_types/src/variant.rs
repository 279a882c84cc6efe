//! Process value type carried by data items and attributes
//!
//! A [`Variant`] is what an item reports as its value and what every attribute
//! maps to. `Variant::Null` doubles as "no value" for items and as the removal
//! marker inside attribute diffs.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Variant
// ─────────────────────────────────────────────────────────────────────────────

/// A dynamically typed process value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Variant {
    /// No value
    Null,
    /// Boolean value
    Bool(bool),
    /// 32-bit integer
    Int32(i32),
    /// 64-bit integer
    Int64(i64),
    /// 64-bit floating point
    Double(f64),
    /// UTF-8 string
    String(String),
}

impl Default for Variant {
    fn default() -> Self {
        Variant::Null
    }
}

impl Variant {
    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }

    /// Get as boolean
    ///
    /// Numbers are true when non-zero, like the field devices report them.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(b) => Some(*b),
            Variant::Int32(i) => Some(*i != 0),
            Variant::Int64(i) => Some(*i != 0),
            Variant::Double(d) => Some(*d != 0.0),
            _ => None,
        }
    }

    /// Get as i64 (also converts from double if lossless)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Variant::Int32(i) => Some(*i as i64),
            Variant::Int64(i) => Some(*i),
            Variant::Double(d) if d.fract() == 0.0 => Some(*d as i64),
            _ => None,
        }
    }

    /// Get as f64 (also converts from integers)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Variant::Double(d) => Some(*d),
            Variant::Int32(i) => Some(*i as f64),
            Variant::Int64(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the contained type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Variant::Null => "null",
            Variant::Bool(_) => "bool",
            Variant::Int32(_) => "int32",
            Variant::Int64(_) => "int64",
            Variant::Double(_) => "double",
            Variant::String(_) => "string",
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::Null => write!(f, "NULL"),
            Variant::Bool(b) => write!(f, "{}", b),
            Variant::Int32(i) => write!(f, "{}", i),
            Variant::Int64(i) => write!(f, "{}", i),
            Variant::Double(d) => write!(f, "{}", d),
            Variant::String(s) => write!(f, "{}", s),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// From Implementations
// ─────────────────────────────────────────────────────────────────────────────

impl From<()> for Variant {
    fn from(_: ()) -> Self {
        Variant::Null
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Bool(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Variant::Int32(v)
    }
}

impl From<i64> for Variant {
    fn from(v: i64) -> Self {
        Variant::Int64(v)
    }
}

impl From<u32> for Variant {
    fn from(v: u32) -> Self {
        Variant::Int64(v as i64)
    }
}

impl From<f32> for Variant {
    fn from(v: f32) -> Self {
        Variant::Double(v as f64)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Double(v)
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Variant::String(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_string())
    }
}

impl<T: Into<Variant>> From<Option<T>> for Variant {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Variant::Null,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// serde_json::Value Interop
// ─────────────────────────────────────────────────────────────────────────────

/// Error when converting a structured value into a [`Variant`]
#[derive(Debug, Clone, thiserror::Error)]
pub enum VariantConversionError {
    #[error("Expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}

impl TryFrom<serde_json::Value> for Variant {
    type Error = VariantConversionError;

    fn try_from(v: serde_json::Value) -> Result<Self, Self::Error> {
        match v {
            serde_json::Value::Null => Ok(Variant::Null),
            serde_json::Value::Bool(b) => Ok(Variant::Bool(b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(i32::try_from(i).map(Variant::Int32).unwrap_or(Variant::Int64(i)))
                } else if let Some(f) = n.as_f64() {
                    Ok(Variant::Double(f))
                } else {
                    Err(VariantConversionError::TypeMismatch {
                        expected: "number",
                        actual: "u64 out of range",
                    })
                }
            }
            serde_json::Value::String(s) => Ok(Variant::String(s)),
            serde_json::Value::Array(_) => Err(VariantConversionError::TypeMismatch {
                expected: "scalar",
                actual: "array",
            }),
            serde_json::Value::Object(_) => Err(VariantConversionError::TypeMismatch {
                expected: "scalar",
                actual: "object",
            }),
        }
    }
}

impl From<Variant> for serde_json::Value {
    fn from(v: Variant) -> Self {
        match v {
            Variant::Null => serde_json::Value::Null,
            Variant::Bool(b) => serde_json::Value::Bool(b),
            Variant::Int32(i) => serde_json::Value::Number(i.into()),
            Variant::Int64(i) => serde_json::Value::Number(i.into()),
            Variant::Double(d) => serde_json::Number::from_f64(d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Variant::String(s) => serde_json::Value::String(s),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
