//! Element types and attribute values shared by every backend
//!
//! Backends hand back very different native type systems (netCDF external
//! types, numpy type strings in Zarr v2, named types in Zarr v3, GRIB and
//! TIFF sample formats). Everything is folded into [`ElementType`] so that
//! descriptors carry one vocabulary of string tags, and into the closed
//! [`AttributeValue`] variant so that no backend-native object crosses the
//! serialization boundary.

use crate::envelope::serialize_float;
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use std::fmt;

/// Element type of an array variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
    Complex64,
    Complex128,
    /// Datetime with its unit, e.g. `ns`
    DateTime64(String),
    TimeDelta64(String),
    /// Fixed-width byte strings of `n` bytes
    Bytes(usize),
    /// Fixed-width unicode strings of `n` characters
    Unicode(usize),
    /// Opaque records of `n` bytes
    Void(usize),
    /// Variable-length strings and anything else held by reference
    Object,
}

impl ElementType {
    /// String tag used in variable descriptors.
    pub fn tag(&self) -> String {
        match self {
            ElementType::Bool => "bool".to_string(),
            ElementType::Int8 => "int8".to_string(),
            ElementType::Int16 => "int16".to_string(),
            ElementType::Int32 => "int32".to_string(),
            ElementType::Int64 => "int64".to_string(),
            ElementType::UInt8 => "uint8".to_string(),
            ElementType::UInt16 => "uint16".to_string(),
            ElementType::UInt32 => "uint32".to_string(),
            ElementType::UInt64 => "uint64".to_string(),
            ElementType::Float16 => "float16".to_string(),
            ElementType::Float32 => "float32".to_string(),
            ElementType::Float64 => "float64".to_string(),
            ElementType::Complex64 => "complex64".to_string(),
            ElementType::Complex128 => "complex128".to_string(),
            ElementType::DateTime64(unit) => format!("datetime64[{}]", unit),
            ElementType::TimeDelta64(unit) => format!("timedelta64[{}]", unit),
            ElementType::Bytes(n) => format!("|S{}", n),
            ElementType::Unicode(n) => format!("<U{}", n),
            ElementType::Void(n) => format!("|V{}", n),
            ElementType::Object => "object".to_string(),
        }
    }

    /// Width of one element in bytes.
    pub fn width(&self) -> usize {
        match self {
            ElementType::Bool | ElementType::Int8 | ElementType::UInt8 => 1,
            ElementType::Int16 | ElementType::UInt16 | ElementType::Float16 => 2,
            ElementType::Int32 | ElementType::UInt32 | ElementType::Float32 => 4,
            ElementType::Int64
            | ElementType::UInt64
            | ElementType::Float64
            | ElementType::Complex64
            | ElementType::DateTime64(_)
            | ElementType::TimeDelta64(_)
            | ElementType::Object => 8,
            ElementType::Complex128 => 16,
            ElementType::Bytes(n) | ElementType::Void(n) => *n,
            ElementType::Unicode(n) => n.saturating_mul(4),
        }
    }

    /// True for types whose values can be read as real numbers for plotting.
    pub fn is_real_valued(&self) -> bool {
        !matches!(
            self,
            ElementType::Complex64
                | ElementType::Complex128
                | ElementType::Bytes(_)
                | ElementType::Unicode(_)
                | ElementType::Void(_)
                | ElementType::Object
        )
    }

    /// Parse a numpy type string such as `<f8`, `|b1`, `<M8[ns]` or `<U12`.
    ///
    /// Returns the element type and whether the stored bytes are big-endian.
    pub fn from_typestr(typestr: &str) -> Option<(ElementType, bool)> {
        let mut chars = typestr.chars();
        let (big_endian, rest) = match chars.next()? {
            '>' => (true, chars.as_str()),
            '<' | '|' | '=' => (false, chars.as_str()),
            _ => (false, typestr),
        };
        let kind = rest.chars().next()?;
        let size = &rest[kind.len_utf8()..];
        let unit = |s: &str| -> String {
            s.find('[')
                .and_then(|start| s[start + 1..].strip_suffix(']').map(str::to_string))
                .unwrap_or_else(|| "generic".to_string())
        };
        let element = match (kind, size) {
            ('b', "1") => ElementType::Bool,
            ('i', "1") => ElementType::Int8,
            ('i', "2") => ElementType::Int16,
            ('i', "4") => ElementType::Int32,
            ('i', "8") => ElementType::Int64,
            ('u', "1") => ElementType::UInt8,
            ('u', "2") => ElementType::UInt16,
            ('u', "4") => ElementType::UInt32,
            ('u', "8") => ElementType::UInt64,
            ('f', "2") => ElementType::Float16,
            ('f', "4") => ElementType::Float32,
            ('f', "8") => ElementType::Float64,
            ('c', "8") => ElementType::Complex64,
            ('c', "16") => ElementType::Complex128,
            ('M', s) if s.starts_with('8') => ElementType::DateTime64(unit(s)),
            ('m', s) if s.starts_with('8') => ElementType::TimeDelta64(unit(s)),
            ('S', n) => ElementType::Bytes(n.parse().ok()?),
            ('U', n) => ElementType::Unicode(n.parse().ok()?),
            ('V', n) => ElementType::Void(n.parse().ok()?),
            ('O', _) => ElementType::Object,
            _ => return None,
        };
        Some((element, big_endian))
    }

    /// Parse a named data type (`float64`, `uint8`, `string`, ...).
    pub fn from_name(name: &str) -> Option<ElementType> {
        let element = match name {
            "bool" => ElementType::Bool,
            "int8" => ElementType::Int8,
            "int16" => ElementType::Int16,
            "int32" => ElementType::Int32,
            "int64" => ElementType::Int64,
            "uint8" => ElementType::UInt8,
            "uint16" => ElementType::UInt16,
            "uint32" => ElementType::UInt32,
            "uint64" => ElementType::UInt64,
            "float16" => ElementType::Float16,
            "float32" => ElementType::Float32,
            "float64" => ElementType::Float64,
            "complex64" => ElementType::Complex64,
            "complex128" => ElementType::Complex128,
            "string" | "str" | "object" => ElementType::Object,
            other => {
                if let Some(unit) = other
                    .strip_prefix("datetime64[")
                    .and_then(|s| s.strip_suffix(']'))
                {
                    ElementType::DateTime64(unit.to_string())
                } else if let Some(unit) = other
                    .strip_prefix("timedelta64[")
                    .and_then(|s| s.strip_suffix(']'))
                {
                    ElementType::TimeDelta64(unit.to_string())
                } else {
                    return None;
                }
            }
        };
        Some(element)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

impl Serialize for ElementType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.tag())
    }
}

/// Attribute value attached to a group or a variable.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Str(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    /// Sequence of scalar values
    Array(Vec<AttributeValue>),
    /// Anything without a faithful scalar mapping, kept as its string form
    Opaque(String),
}

impl AttributeValue {
    /// Convert a JSON attribute (Zarr `.zattrs` / `zarr.json`) into a value.
    ///
    /// Nested arrays and objects have no scalar mapping and are kept as their
    /// JSON text.
    pub fn from_json(value: &serde_json::Value) -> AttributeValue {
        use serde_json::Value;
        match value {
            Value::String(s) => AttributeValue::Str(s.clone()),
            Value::Bool(b) => AttributeValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    AttributeValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    AttributeValue::UInt(u)
                } else {
                    AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::Array(items) if items.iter().all(is_json_scalar) => {
                AttributeValue::Array(items.iter().map(AttributeValue::from_json).collect())
            }
            Value::Null => AttributeValue::Opaque("null".to_string()),
            other => AttributeValue::Opaque(other.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

fn is_json_scalar(value: &serde_json::Value) -> bool {
    !matches!(
        value,
        serde_json::Value::Array(_) | serde_json::Value::Object(_)
    )
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Str(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Str(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(values: Vec<T>) -> Self {
        AttributeValue::Array(values.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Str(s) | AttributeValue::Opaque(s) => f.write_str(s),
            AttributeValue::Int(i) => write!(f, "{}", i),
            AttributeValue::UInt(u) => write!(f, "{}", u),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AttributeValue::Str(s) | AttributeValue::Opaque(s) => serializer.serialize_str(s),
            AttributeValue::Int(i) => serializer.serialize_i64(*i),
            AttributeValue::UInt(u) => serializer.serialize_u64(*u),
            AttributeValue::Float(v) => serialize_float(*v, serializer),
            AttributeValue::Bool(b) => serializer.serialize_bool(*b),
            AttributeValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}
