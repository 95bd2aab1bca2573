//! JVM-style method descriptors (`spec.md` §4.1). `TypeDesc` enumerates the
//! possible parameter types; `parse_signature`/`render_signature` convert
//! between the `(T1T2…)` wire form and a `Vec<TypeDesc>`.

use crate::error::ProtocolError;
use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// Reference type, canonical dotted name (e.g. `java.lang.String`).
    Object(String),
    Array(Box<TypeDesc>),
}

impl TypeDesc {
    /// The single-letter/`L...;`/`[` JVM descriptor for this type.
    pub fn descriptor(&self) -> String {
        match self {
            TypeDesc::Boolean => "Z".to_string(),
            TypeDesc::Byte => "B".to_string(),
            TypeDesc::Char => "C".to_string(),
            TypeDesc::Short => "S".to_string(),
            TypeDesc::Int => "I".to_string(),
            TypeDesc::Long => "J".to_string(),
            TypeDesc::Float => "F".to_string(),
            TypeDesc::Double => "D".to_string(),
            TypeDesc::Object(name) => format!("L{};", name.replace('.', "/")),
            TypeDesc::Array(inner) => format!("[{}", inner.descriptor()),
        }
    }

    /// The canonical class name a user mapper / the resource registry keys
    /// on. Primitives use their Java wrapper name's primitive form per
    /// `spec.md` §4.2; arrays use the element's canonical name.
    pub fn canonical_name(&self) -> String {
        match self {
            TypeDesc::Boolean => "boolean".to_string(),
            TypeDesc::Byte => "byte".to_string(),
            TypeDesc::Char => "char".to_string(),
            TypeDesc::Short => "short".to_string(),
            TypeDesc::Int => "int".to_string(),
            TypeDesc::Long => "long".to_string(),
            TypeDesc::Float => "float".to_string(),
            TypeDesc::Double => "double".to_string(),
            TypeDesc::Object(name) => name.clone(),
            TypeDesc::Array(inner) => inner.canonical_name(),
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, TypeDesc::Object(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, TypeDesc::Array(_))
    }

    pub fn is_primitive_array(&self) -> bool {
        matches!(self, TypeDesc::Array(inner) if !matches!(**inner, TypeDesc::Object(_) | TypeDesc::Array(_)))
    }

    pub fn is_string_array(&self) -> bool {
        matches!(self, TypeDesc::Array(inner) if matches!(&**inner, TypeDesc::Object(n) if n == "java.lang.String"))
    }

    /// Nesting depth: 0 for a non-array type, 1 + the element's depth for an
    /// array (`spec.md` §4.3.1 "nested up to depth 10").
    pub fn array_depth(&self) -> usize {
        match self {
            TypeDesc::Array(inner) => 1 + inner.array_depth(),
            _ => 0,
        }
    }
}

/// Rejects a type whose array nesting exceeds the cap (`spec.md` §4.3.1,
/// §8 Testable Property 8: "exceeding the max nesting depth... raises
/// ProtocolError").
pub(crate) fn check_array_depth(ty: &TypeDesc) -> Result<(), ProtocolError> {
    let depth = ty.array_depth();
    if depth > crate::value::MAX_ARRAY_DEPTH {
        return Err(ProtocolError::ArrayTooDeep {
            depth,
            max: crate::value::MAX_ARRAY_DEPTH,
        });
    }
    Ok(())
}

/// Parses a single descriptor token starting at `chars`, advancing past it.
fn parse_one(chars: &mut std::iter::Peekable<std::str::Chars>) -> Result<TypeDesc, ProtocolError> {
    match chars.next() {
        Some('Z') => Ok(TypeDesc::Boolean),
        Some('B') => Ok(TypeDesc::Byte),
        Some('C') => Ok(TypeDesc::Char),
        Some('S') => Ok(TypeDesc::Short),
        Some('I') => Ok(TypeDesc::Int),
        Some('J') => Ok(TypeDesc::Long),
        Some('F') => Ok(TypeDesc::Float),
        Some('D') => Ok(TypeDesc::Double),
        Some('[') => Ok(TypeDesc::Array(Box::new(parse_one(chars)?))),
        Some('L') => {
            let mut name = String::new();
            loop {
                match chars.next() {
                    Some(';') => break,
                    Some(c) => name.push(if c == '/' { '.' } else { c }),
                    None => {
                        return Err(ProtocolError::InvalidSignature(
                            "unterminated object type".into(),
                        ))
                    }
                }
            }
            Ok(TypeDesc::Object(name))
        }
        Some(other) => Err(ProtocolError::InvalidSignature(format!(
            "unexpected descriptor char '{other}'"
        ))),
        None => Err(ProtocolError::InvalidSignature(
            "unexpected end of signature".into(),
        )),
    }
}

/// Parses `(T1T2…)` into the parameter type list. The parentheses are
/// required; a return-type suffix (if present) is ignored since the wire
/// format never carries one (§3: `typeSignature` covers parameters only).
pub fn parse_signature(sig: &str) -> Result<Vec<TypeDesc>, ProtocolError> {
    let body = sig
        .strip_prefix('(')
        .and_then(|s| s.split(')').next())
        .ok_or_else(|| ProtocolError::InvalidSignature(sig.to_string()))?;
    let mut chars = body.chars().peekable();
    let mut out = Vec::new();
    while chars.peek().is_some() {
        let ty = parse_one(&mut chars)?;
        check_array_depth(&ty)?;
        out.push(ty);
    }
    Ok(out)
}

/// Renders a parameter type list back into `(T1T2…)`.
pub fn render_signature(types: &[TypeDesc]) -> String {
    let mut out = String::from("(");
    for t in types {
        out.push_str(&t.descriptor());
    }
    out.push(')');
    out
}

static CLASS_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*(\.[A-Za-z_$][A-Za-z0-9_$]*)*$").unwrap());
static METHOD_IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap());

/// Strict dotted-identifier grammar for class names (`spec.md` §4.3.6):
/// rejects `/`, `|`, whitespace, `..`, and any non-identifier character.
pub fn is_valid_class_identifier(name: &str) -> bool {
    !name.is_empty() && !name.contains("..") && CLASS_IDENT.is_match(name)
}

/// Strict identifier grammar for method names.
pub fn is_valid_method_identifier(name: &str) -> bool {
    !name.is_empty() && METHOD_IDENT.is_match(name)
}

/// Builds the `methodName(signature)` dispatch key used by the resource
/// registry (`spec.md` §9 "Reflected invocation → dispatch table").
pub fn dispatch_key(method: &str, signature: &str) -> String {
    format!("{method}{signature}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_primitive_signature() {
        let types = parse_signature("(II)").unwrap();
        assert_eq!(types, vec![TypeDesc::Int, TypeDesc::Int]);
        assert_eq!(render_signature(&types), "(II)");
    }

    #[test]
    fn parses_object_and_array_signature() {
        let types = parse_signature("(Ljava/lang/String;I)").unwrap();
        assert_eq!(
            types,
            vec![TypeDesc::Object("java.lang.String".into()), TypeDesc::Int]
        );

        let arr = parse_signature("([I)").unwrap();
        assert_eq!(arr, vec![TypeDesc::Array(Box::new(TypeDesc::Int))]);
        assert!(arr[0].is_primitive_array());
    }

    #[test]
    fn empty_signature_is_valid() {
        assert_eq!(parse_signature("()").unwrap(), vec![]);
    }

    #[test]
    fn nested_array_within_cap_parses() {
        let sig = format!("({}I)", "[".repeat(crate::value::MAX_ARRAY_DEPTH));
        let types = parse_signature(&sig).unwrap();
        assert_eq!(types[0].array_depth(), crate::value::MAX_ARRAY_DEPTH);
    }

    #[test]
    fn nested_array_beyond_cap_is_rejected() {
        let sig = format!("({}I)", "[".repeat(crate::value::MAX_ARRAY_DEPTH + 1));
        assert!(matches!(
            parse_signature(&sig),
            Err(ProtocolError::ArrayTooDeep { .. })
        ));
    }

    #[test]
    fn rejects_delimiter_injection() {
        assert!(!is_valid_class_identifier("com.example/Hidden"));
        assert!(!is_valid_class_identifier("com..example.Foo"));
        assert!(!is_valid_class_identifier("com.example.Foo|bar"));
        assert!(!is_valid_method_identifier("m/x"));
        assert!(is_valid_class_identifier("com.example.Calculator"));
        assert!(is_valid_method_identifier("add"));
    }
}
