//! Rust's substitute for a reflected Java value. Every wire parameter and
//! every return value is one of these variants; §4.2/§4.3 of the spec pick a
//! variant (and its encoding) based on the declared [`crate::signature::TypeDesc`].

use crate::error::ProtocolError;
use crate::signature::TypeDesc;

/// Array length/nesting caps from `spec.md` §4.3.1.
pub const MAX_ARRAY_LEN: usize = 100_000;
pub const MAX_ARRAY_DEPTH: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    Str(String),
    BoolArray(Vec<bool>),
    ByteArray(Vec<i8>),
    ShortArray(Vec<i16>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
    FloatArray(Vec<f32>),
    DoubleArray(Vec<f64>),
    CharArray(Vec<char>),
    StringArray(Vec<String>),
    /// Opaque auto-serialized bytes: object arrays, collections, and any
    /// other Serializable-equivalent payload (`spec.md` §4.2 item 3, §4.3.1).
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Textual form used by the built-in primitive/wrapper/String mapper
    /// (`spec.md` §4.2 item 4). Arrays use the Java `Arrays.toString`-style
    /// bracketed, comma-space-separated rendering.
    pub fn to_text(&self) -> Result<String, ProtocolError> {
        Ok(match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Byte(b) => b.to_string(),
            Value::Short(s) => s.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Long(l) => l.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Double(d) => d.to_string(),
            Value::Char(c) => c.to_string(),
            Value::Str(s) => s.clone(),
            Value::BoolArray(v) => bracket(v.iter().map(|b| b.to_string())),
            Value::ByteArray(v) => bracket(v.iter().map(|b| b.to_string())),
            Value::ShortArray(v) => bracket(v.iter().map(|s| s.to_string())),
            Value::IntArray(v) => bracket(v.iter().map(|i| i.to_string())),
            Value::LongArray(v) => bracket(v.iter().map(|l| l.to_string())),
            Value::FloatArray(v) => bracket(v.iter().map(|f| f.to_string())),
            Value::DoubleArray(v) => bracket(v.iter().map(|d| d.to_string())),
            Value::CharArray(v) => bracket(v.iter().map(|c| c.to_string())),
            Value::StringArray(v) => bracket(v.iter().cloned()),
            Value::Bytes(_) => {
                return Err(ProtocolError::ParamParse(
                    "opaque bytes have no textual form".into(),
                ))
            }
        })
    }

    pub fn as_i32(&self) -> Result<i32, ProtocolError> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Short(s) => Ok(*s as i32),
            Value::Byte(b) => Ok(*b as i32),
            other => Err(ProtocolError::ParamParse(format!(
                "expected int, got {other:?}"
            ))),
        }
    }

    pub fn as_i64(&self) -> Result<i64, ProtocolError> {
        match self {
            Value::Long(l) => Ok(*l),
            other => other.as_i32().map(|i| i as i64),
        }
    }

    pub fn as_f64(&self) -> Result<f64, ProtocolError> {
        match self {
            Value::Double(d) => Ok(*d),
            Value::Float(f) => Ok(*f as f64),
            other => Err(ProtocolError::ParamParse(format!(
                "expected floating point, got {other:?}"
            ))),
        }
    }

    pub fn as_bool(&self) -> Result<bool, ProtocolError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(ProtocolError::ParamParse(format!(
                "expected bool, got {other:?}"
            ))),
        }
    }

    pub fn as_str(&self) -> Result<&str, ProtocolError> {
        match self {
            Value::Str(s) => Ok(s.as_str()),
            other => Err(ProtocolError::ParamParse(format!(
                "expected String, got {other:?}"
            ))),
        }
    }

    /// Checks the size/depth caps of `spec.md` §4.3.1 for any array-shaped
    /// value this codec produces or consumes. Depth is always 1 for our
    /// flat array variants; [`Value::Bytes`] stands in for anything nested
    /// deeper and is checked by the auto-serialization path instead.
    /// Response encoding has no declared return type to consult (the wire
    /// signature only ever describes parameters, `spec.md` §4.3.4), so the
    /// return value's own shape stands in for it. `Bytes` is reported as
    /// `java.io.Serializable` to route through the auto-serialization path
    /// rather than the String fallback.
    pub fn inferred_type(&self) -> TypeDesc {
        match self {
            Value::Null => TypeDesc::Object("java.lang.Object".to_string()),
            Value::Bool(_) => TypeDesc::Boolean,
            Value::Byte(_) => TypeDesc::Byte,
            Value::Short(_) => TypeDesc::Short,
            Value::Int(_) => TypeDesc::Int,
            Value::Long(_) => TypeDesc::Long,
            Value::Float(_) => TypeDesc::Float,
            Value::Double(_) => TypeDesc::Double,
            Value::Char(_) => TypeDesc::Char,
            Value::Str(_) => TypeDesc::Object("java.lang.String".to_string()),
            Value::BoolArray(_) => TypeDesc::Array(Box::new(TypeDesc::Boolean)),
            Value::ByteArray(_) => TypeDesc::Array(Box::new(TypeDesc::Byte)),
            Value::ShortArray(_) => TypeDesc::Array(Box::new(TypeDesc::Short)),
            Value::IntArray(_) => TypeDesc::Array(Box::new(TypeDesc::Int)),
            Value::LongArray(_) => TypeDesc::Array(Box::new(TypeDesc::Long)),
            Value::FloatArray(_) => TypeDesc::Array(Box::new(TypeDesc::Float)),
            Value::DoubleArray(_) => TypeDesc::Array(Box::new(TypeDesc::Double)),
            Value::CharArray(_) => TypeDesc::Array(Box::new(TypeDesc::Char)),
            Value::StringArray(_) => {
                TypeDesc::Array(Box::new(TypeDesc::Object("java.lang.String".to_string())))
            }
            Value::Bytes(_) => TypeDesc::Object("java.io.Serializable".to_string()),
        }
    }

    pub fn check_array_caps(&self) -> Result<(), ProtocolError> {
        let len = match self {
            Value::BoolArray(v) => Some(v.len()),
            Value::ByteArray(v) => Some(v.len()),
            Value::ShortArray(v) => Some(v.len()),
            Value::IntArray(v) => Some(v.len()),
            Value::LongArray(v) => Some(v.len()),
            Value::FloatArray(v) => Some(v.len()),
            Value::DoubleArray(v) => Some(v.len()),
            Value::CharArray(v) => Some(v.len()),
            Value::StringArray(v) => Some(v.len()),
            _ => None,
        };
        if let Some(len) = len {
            if len > MAX_ARRAY_LEN {
                return Err(ProtocolError::ArrayTooLong {
                    len,
                    max: MAX_ARRAY_LEN,
                });
            }
        }
        Ok(())
    }
}

fn bracket(items: impl Iterator<Item = String>) -> String {
    let mut out = String::from("[");
    for (i, item) in items.enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&item);
    }
    out.push(']');
    out
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}
impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

/// Serializes any `Serialize` type to the opaque blob used by the
/// auto-serialization mapper (`spec.md` §9 "Opaque object serialization").
pub fn to_opaque<T: serde::Serialize>(value: &T) -> Result<Value, ProtocolError> {
    bincode::serialize(value)
        .map(Value::Bytes)
        .map_err(|e| ProtocolError::Serde(e.to_string()))
}

/// Deserializes a value previously produced by [`to_opaque`].
pub fn from_opaque<T: serde::de::DeserializeOwned>(value: &Value) -> Result<T, ProtocolError> {
    match value {
        Value::Bytes(bytes) => {
            bincode::deserialize(bytes).map_err(|e| ProtocolError::Serde(e.to_string()))
        }
        other => Err(ProtocolError::ParamParse(format!(
            "expected opaque bytes, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn textual_form_matches_java_to_string() {
        assert_eq!(Value::Int(8).to_text().unwrap(), "8");
        assert_eq!(Value::Bool(true).to_text().unwrap(), "true");
        assert_eq!(
            Value::IntArray(vec![1, 2, 3]).to_text().unwrap(),
            "[1, 2, 3]"
        );
        assert_eq!(Value::Str("".into()).to_text().unwrap(), "");
    }

    #[test]
    fn array_len_cap_enforced() {
        let v = Value::IntArray(vec![0; MAX_ARRAY_LEN + 1]);
        assert!(v.check_array_caps().is_err());
    }

    #[test]
    fn opaque_roundtrip() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Point {
            x: i32,
            y: i32,
        }
        let p = Point { x: 1, y: 2 };
        let blob = to_opaque(&p).unwrap();
        let back: Point = from_opaque(&blob).unwrap();
        assert_eq!(p, back);
    }
}
