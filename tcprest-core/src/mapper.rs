//! Priority-ordered value <-> string resolution (`spec.md` §4.2). The
//! registry only ever grows or replaces entries (`addMapper` is idempotent
//! replace); lookups never mutate it.

use crate::error::ProtocolError;
use crate::signature::TypeDesc;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A pure, thread-safe value <-> string codec for one canonical class name.
pub trait Mapper: Send + Sync {
    fn to_string(&self, value: &Value) -> Result<String, ProtocolError>;
    fn from_string(&self, s: &str) -> Result<Value, ProtocolError>;
}

/// The six collection interfaces that always resolve to the
/// auto-serialization mapper (`spec.md` §4.2 item 2).
pub const COLLECTION_INTERFACES: &[&str] = &[
    "java.util.List",
    "java.util.Map",
    "java.util.Set",
    "java.util.Queue",
    "java.util.Deque",
    "java.util.Collection",
];

const PRIMITIVE_NAMES: &[&str] = &[
    "boolean", "byte", "char", "short", "int", "long", "float", "double",
];

const WRAPPER_NAMES: &[&str] = &[
    "java.lang.Boolean",
    "java.lang.Byte",
    "java.lang.Character",
    "java.lang.Short",
    "java.lang.Integer",
    "java.lang.Long",
    "java.lang.Float",
    "java.lang.Double",
];

struct BuiltinMapper(&'static str);

impl Mapper for BuiltinMapper {
    fn to_string(&self, value: &Value) -> Result<String, ProtocolError> {
        value.to_text()
    }

    fn from_string(&self, s: &str) -> Result<Value, ProtocolError> {
        convert_builtin(self.0, s)
    }
}

fn convert_builtin(name: &str, s: &str) -> Result<Value, ProtocolError> {
    let err = |e: std::num::ParseIntError| ProtocolError::ParamParse(e.to_string());
    let errf = |e: std::num::ParseFloatError| ProtocolError::ParamParse(e.to_string());
    Ok(match name {
        "boolean" | "java.lang.Boolean" => Value::Bool(
            s.parse()
                .map_err(|_| ProtocolError::ParamParse(format!("invalid boolean '{s}'")))?,
        ),
        "byte" | "java.lang.Byte" => Value::Byte(s.parse().map_err(err)?),
        "short" | "java.lang.Short" => Value::Short(s.parse().map_err(err)?),
        "int" | "java.lang.Integer" => Value::Int(s.parse().map_err(err)?),
        "long" | "java.lang.Long" => Value::Long(s.parse().map_err(err)?),
        "float" | "java.lang.Float" => Value::Float(s.parse().map_err(errf)?),
        "double" | "java.lang.Double" => Value::Double(s.parse().map_err(errf)?),
        "char" | "java.lang.Character" => {
            // "char decodes first character of the empty-safe string" (§4.2).
            Value::Char(s.chars().next().unwrap_or('\0'))
        }
        "java.lang.String" => Value::Str(s.to_string()),
        other => {
            return Err(ProtocolError::ParamParse(format!(
                "no built-in mapper for {other}"
            )))
        }
    })
}

/// Canonical resolution per `spec.md` §4.2: user mapper, then collection
/// interface, then auto-serialization, then built-in, then arrays, then the
/// String fallback.
pub struct MapperRegistry {
    user: RwLock<HashMap<String, Arc<dyn Mapper>>>,
    builtins: HashMap<&'static str, Arc<dyn Mapper>>,
}

impl Default for MapperRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl MapperRegistry {
    pub fn with_builtins() -> Self {
        let mut builtins: HashMap<&'static str, Arc<dyn Mapper>> = HashMap::new();
        builtins.insert("java.lang.String", Arc::new(BuiltinMapper("java.lang.String")));
        for name in PRIMITIVE_NAMES.iter().chain(WRAPPER_NAMES.iter()) {
            builtins.insert(name, Arc::new(BuiltinMapper(name)));
        }
        MapperRegistry {
            user: RwLock::new(HashMap::new()),
            builtins,
        }
    }

    /// `addMapper`: idempotent replace, never removes entries on lookup.
    pub fn add_mapper(&self, canonical_name: impl Into<String>, mapper: Arc<dyn Mapper>) {
        self.user
            .write()
            .expect("mapper registry poisoned")
            .insert(canonical_name.into(), mapper);
    }

    fn user_mapper(&self, canonical_name: &str) -> Option<Arc<dyn Mapper>> {
        self.user
            .read()
            .expect("mapper registry poisoned")
            .get(canonical_name)
            .cloned()
    }

    pub fn is_collection_interface(name: &str) -> bool {
        COLLECTION_INTERFACES.contains(&name)
    }

    pub fn builtin(&self, canonical_name: &str) -> Option<Arc<dyn Mapper>> {
        self.builtins.get(canonical_name).cloned()
    }

    /// Which Base64 alphabet a parameter declared as `ty` was encoded with,
    /// decided from the type alone (mirroring `encode`'s own priority
    /// chain) rather than by trying one alphabet and guessing from whether
    /// the result happens to be valid UTF-8 (`spec.md` §4.3.3 step 6,
    /// P1/P2 type-first order).
    pub fn alphabet_for(&self, ty: &TypeDesc) -> Alphabet {
        let canonical = ty.canonical_name();

        if self.user_mapper(&canonical).is_some() {
            return Alphabet::Standard;
        }
        if Self::is_collection_interface(&canonical) {
            return Alphabet::UrlSafe;
        }
        if ty.is_array() && !ty.is_primitive_array() && !ty.is_string_array() {
            return Alphabet::UrlSafe;
        }
        if canonical == "java.io.Serializable" {
            // `Value::inferred_type`'s convention for an opaque return body.
            return Alphabet::UrlSafe;
        }
        if self.builtin(&canonical).is_some() {
            return Alphabet::Standard;
        }
        if ty.is_primitive_array() || ty.is_string_array() {
            return Alphabet::Standard;
        }
        // An otherwise-unrecognized object type with no registered mapper:
        // `encode` falls back to the textual String form for these, so
        // decoding assumes the same absent any other signal.
        Alphabet::Standard
    }

    /// Resolution priority for encoding a value declared as `ty`, per
    /// §4.2's six-step chain. Returns the textual form plus whether the
    /// result must be URL-safe-Base64 (auto-serialized / collection) rather
    /// than standard-Base64 (primitive/wrapper/String/primitive array).
    pub fn encode(&self, ty: &TypeDesc, value: &Value) -> Result<EncodedParam, ProtocolError> {
        let canonical = match value {
            // When encoding we prefer the *value's* canonical name, falling
            // back to the declared type, mirroring `v.getClass().name`.
            Value::Bytes(_) => ty.canonical_name(),
            _ => ty.canonical_name(),
        };

        if let Some(mapper) = self.user_mapper(&canonical) {
            let text = mapper.to_string(value)?;
            return Ok(if text.is_empty() {
                EncodedParam::Empty
            } else {
                EncodedParam::Standard(text)
            });
        }

        if Self::is_collection_interface(&canonical) {
            return Ok(EncodedParam::UrlSafe(encode_opaque(value)?));
        }

        if ty.is_array() && !ty.is_primitive_array() && !ty.is_string_array() {
            // Object array: auto-serialize the whole array (§4.3.1).
            return Ok(EncodedParam::UrlSafe(encode_opaque(value)?));
        }

        if let Some(mapper) = self.builtin(&canonical) {
            let text = mapper.to_string(value)?;
            return Ok(if text.is_empty() {
                EncodedParam::Empty
            } else {
                EncodedParam::Standard(text)
            });
        }

        if ty.is_primitive_array() || ty.is_string_array() {
            let text = value.to_text()?;
            return Ok(if text.is_empty() {
                EncodedParam::Empty
            } else {
                EncodedParam::Standard(text)
            });
        }

        if matches!(value, Value::Bytes(_)) {
            return Ok(EncodedParam::UrlSafe(encode_opaque(value)?));
        }

        // Fallback: treat as String.
        let text = value.to_text()?;
        Ok(if text.is_empty() {
            EncodedParam::Empty
        } else {
            EncodedParam::Standard(text)
        })
    }

    /// Resolution priority for decoding a string received for declared type
    /// `ty` (`spec.md` §4.3.3 step 6, P1..P6).
    pub fn decode(&self, ty: &TypeDesc, raw: &DecodedSegment) -> Result<Value, ProtocolError> {
        let canonical = ty.canonical_name();

        // P1: primitive/wrapper/String/primitive array/String[] via
        // standard Base64 + typed convert.
        if let DecodedSegment::Standard(text) = raw {
            if ty.is_primitive_array() {
                return decode_primitive_array(ty, text);
            }
            if ty.is_string_array() {
                return Ok(Value::StringArray(parse_bracketed_strings(text)));
            }
            if let Some(mapper) = self.builtin(&canonical) {
                return mapper.from_string(text);
            }
        }

        // P2: object array types via URL-safe Base64 + auto-deserialize.
        if ty.is_array() && !ty.is_primitive_array() && !ty.is_string_array() {
            if let DecodedSegment::UrlSafe(bytes) = raw {
                return Ok(Value::Bytes(bytes.clone()));
            }
        }

        // P3: user mapper.
        if let Some(mapper) = self.user_mapper(&canonical) {
            let text = match raw {
                DecodedSegment::Standard(t) => t.clone(),
                DecodedSegment::UrlSafe(bytes) => {
                    String::from_utf8(bytes.clone()).map_err(ProtocolError::InvalidUtf8)?
                }
                DecodedSegment::Empty => String::new(),
            };
            return mapper.from_string(&text);
        }

        // P4: collection interface -> auto-deserialize.
        if Self::is_collection_interface(&canonical) {
            if let DecodedSegment::UrlSafe(bytes) = raw {
                return Ok(Value::Bytes(bytes.clone()));
            }
        }

        // P5: Serializable -> auto-deserialize.
        if let DecodedSegment::UrlSafe(bytes) = raw {
            return Ok(Value::Bytes(bytes.clone()));
        }

        // P6: fallback String.
        match raw {
            DecodedSegment::Standard(text) => Ok(Value::Str(text.clone())),
            DecodedSegment::Empty => Ok(Value::Str(String::new())),
            DecodedSegment::UrlSafe(bytes) => Ok(Value::Bytes(bytes.clone())),
        }
    }
}

/// The Base64 alphabet a declared parameter/return type decodes with
/// (`MapperRegistry::alphabet_for`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alphabet {
    Standard,
    UrlSafe,
}

/// Whether `ty` resolves through a built-in or collection-interface mapper
/// without needing a user-registered mapper or the opaque auto-serialization
/// fallback (`spec.md` §4.5: "validate that every... type is mappable...
/// log a warning for unmappable types but do not fail"). Anything else
/// still works at call time via a user mapper or `Value::Bytes`
/// auto-serialization, but neither is automatic the way Java's
/// reflection-based serialization is, so it is worth flagging at
/// registration time.
pub fn is_builtin_mappable(ty: &TypeDesc) -> bool {
    if ty.is_primitive_array() || ty.is_string_array() {
        return true;
    }
    if ty.is_array() {
        return false;
    }
    let canonical = ty.canonical_name();
    PRIMITIVE_NAMES.contains(&canonical.as_str())
        || WRAPPER_NAMES.contains(&canonical.as_str())
        || canonical == "java.lang.String"
        || MapperRegistry::is_collection_interface(&canonical)
}

/// What shape the encoded parameter took before Base64 (used by the codec
/// to choose the right Base64 alphabet).
pub enum EncodedParam {
    Empty,
    Standard(String),
    UrlSafe(Vec<u8>),
}

/// What shape a decoded-but-not-yet-typed parameter segment took (the codec
/// already knows, from the leading Base64 alphabet detection, which this is).
pub enum DecodedSegment {
    Empty,
    Standard(String),
    UrlSafe(Vec<u8>),
}

fn encode_opaque(value: &Value) -> Result<Vec<u8>, ProtocolError> {
    match value {
        Value::Bytes(b) => Ok(b.clone()),
        other => Err(ProtocolError::ParamParse(format!(
            "value {other:?} has no opaque encoding registered; supply a user mapper or pre-serialize to Value::Bytes"
        ))),
    }
}

fn parse_bracketed_strings(text: &str) -> Vec<String> {
    let inner = text.trim_start_matches('[').trim_end_matches(']');
    if inner.is_empty() {
        return vec![];
    }
    inner.split(", ").map(|s| s.to_string()).collect()
}

fn decode_primitive_array(ty: &TypeDesc, text: &str) -> Result<Value, ProtocolError> {
    let TypeDesc::Array(inner) = ty else {
        return Err(ProtocolError::InvalidSignature("not an array type".into()));
    };
    let inner = &**inner;
    let parts = parse_bracketed_strings(text);
    Ok(match inner {
        TypeDesc::Boolean => Value::BoolArray(
            parts
                .iter()
                .map(|s| s.parse().map_err(|_| ProtocolError::ParamParse(s.clone())))
                .collect::<Result<_, _>>()?,
        ),
        TypeDesc::Byte => Value::ByteArray(
            parts
                .iter()
                .map(|s| s.parse().map_err(|_| ProtocolError::ParamParse(s.clone())))
                .collect::<Result<_, _>>()?,
        ),
        TypeDesc::Short => Value::ShortArray(
            parts
                .iter()
                .map(|s| s.parse().map_err(|_| ProtocolError::ParamParse(s.clone())))
                .collect::<Result<_, _>>()?,
        ),
        TypeDesc::Int => Value::IntArray(
            parts
                .iter()
                .map(|s| s.parse().map_err(|_| ProtocolError::ParamParse(s.clone())))
                .collect::<Result<_, _>>()?,
        ),
        TypeDesc::Long => Value::LongArray(
            parts
                .iter()
                .map(|s| s.parse().map_err(|_| ProtocolError::ParamParse(s.clone())))
                .collect::<Result<_, _>>()?,
        ),
        TypeDesc::Float => Value::FloatArray(
            parts
                .iter()
                .map(|s| s.parse().map_err(|_| ProtocolError::ParamParse(s.clone())))
                .collect::<Result<_, _>>()?,
        ),
        TypeDesc::Double => Value::DoubleArray(
            parts
                .iter()
                .map(|s| s.parse().map_err(|_| ProtocolError::ParamParse(s.clone())))
                .collect::<Result<_, _>>()?,
        ),
        TypeDesc::Char => Value::CharArray(
            parts
                .iter()
                .map(|s| s.chars().next().ok_or_else(|| ProtocolError::ParamParse(s.clone())))
                .collect::<Result<_, _>>()?,
        ),
        TypeDesc::Object(_) | TypeDesc::Array(_) => {
            return Err(ProtocolError::InvalidSignature(
                "not a primitive array".into(),
            ))
        }
    })
}
