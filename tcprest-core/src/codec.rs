//! Protocol V2: line encoding/decoding for requests and responses
//! (`spec.md` §4.3). This module only has pure, allocation-based logic — no
//! I/O — so it is shared unchanged by the server pipeline and the client
//! proxy.

use crate::error::{ProtocolError, RequestError, SecurityError};
use crate::mapper::{Alphabet, DecodedSegment, EncodedParam, MapperRegistry};
use crate::security::SecurityConfig;
use crate::signature::{self, parse_signature, render_signature, TypeDesc};
use crate::value::Value;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;

const VERSION: &str = "V2";
const COMPRESSION_FLAG: &str = "0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success = 0,
    Business = 1,
    Server = 2,
    Protocol = 3,
}

impl Status {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        Ok(match code {
            0 => Status::Success,
            1 => Status::Business,
            2 => Status::Server,
            3 => Status::Protocol,
            other => {
                return Err(ProtocolError::MalformedHead {
                    expected: 0,
                    got: other as usize,
                })
            }
        })
    }
}

/// A fully decoded request head, before parameter decoding (`spec.md` §3
/// "Invocation context", minus the resolved instance which the registry
/// supplies later).
pub struct RequestHead {
    pub class_name: String,
    pub method_name: String,
    pub signature: String,
    pub param_types: Vec<TypeDesc>,
    pub raw_params: Vec<String>,
}

fn encode_param_segment(
    ty: &TypeDesc,
    value: &Value,
    mappers: &MapperRegistry,
) -> Result<String, ProtocolError> {
    if value.is_null() {
        return Ok("~".to_string());
    }
    value.check_array_caps()?;
    match mappers.encode(ty, value)? {
        EncodedParam::Empty => Ok(String::new()),
        EncodedParam::Standard(text) => Ok(STANDARD.encode(text.as_bytes())),
        EncodedParam::UrlSafe(bytes) => Ok(URL_SAFE_NO_PAD.encode(bytes)),
    }
}

/// Decodes one segment using the alphabet the declared type `ty` dictates
/// (`MapperRegistry::alphabet_for`), rather than guessing the alphabet from
/// whichever decode happens to succeed: standard and URL-safe-no-pad agree
/// on all but two characters, so a guess can silently misclassify an
/// auto-serialized payload whose bytes are incidentally valid standard
/// Base64 and valid UTF-8 (`spec.md` §4.3.3 step 6, P1/P2 type-first order).
fn decode_param_segment(
    raw: &str,
    ty: &TypeDesc,
    mappers: &MapperRegistry,
) -> Result<DecodedSegment, ProtocolError> {
    if raw.is_empty() {
        return Ok(DecodedSegment::Empty);
    }
    match mappers.alphabet_for(ty) {
        Alphabet::Standard => {
            let bytes = STANDARD.decode(raw)?;
            let text = String::from_utf8(bytes)?;
            Ok(DecodedSegment::Standard(text))
        }
        Alphabet::UrlSafe => {
            let bytes = URL_SAFE_NO_PAD.decode(raw)?;
            Ok(DecodedSegment::UrlSafe(bytes))
        }
    }
}

/// Decodes a body segment with no declared type to consult: used only for
/// a client-side response decode where the caller supplied no
/// `return_type`. Standard is tried first (the common case for
/// primitives/String) and URL-safe is the fallback; unlike request
/// parameter decoding this cannot be made fully deterministic, since there
/// is no signature on the wire for response bodies (`spec.md` §4.3.4).
fn guess_param_segment(raw: &str) -> Result<DecodedSegment, ProtocolError> {
    if raw.is_empty() {
        return Ok(DecodedSegment::Empty);
    }
    if let Ok(bytes) = STANDARD.decode(raw) {
        if let Ok(text) = String::from_utf8(bytes.clone()) {
            return Ok(DecodedSegment::Standard(text));
        }
        return Ok(DecodedSegment::UrlSafe(bytes));
    }
    let bytes = URL_SAFE_NO_PAD.decode(raw)?;
    Ok(DecodedSegment::UrlSafe(bytes))
}

/// Exception bodies are always produced by `encode_exception_response`,
/// which always uses standard Base64 over the literal `"FQCN: message"`
/// text — no guessing needed.
fn decode_exception_body(raw: &str) -> Result<String, ProtocolError> {
    let bytes = STANDARD.decode(raw)?;
    Ok(String::from_utf8(bytes)?)
}

/// Splits `meta = className "/" methodName typeSignature` without being
/// confused by the `/` characters inside object-type descriptors
/// (`Ljava/lang/String;`): the class/method separator is the last `/`
/// strictly before the first `(`, since identifiers never contain `/`
/// themselves (`spec.md` §4.1, §4.3.3 step 3).
fn split_meta(meta: &str) -> Result<(String, String, String), ProtocolError> {
    let paren_idx = meta
        .find('(')
        .ok_or_else(|| ProtocolError::InvalidSignature(meta.to_string()))?;
    let head = &meta[..paren_idx];
    let slash_idx = head
        .rfind('/')
        .ok_or_else(|| ProtocolError::InvalidSignature(meta.to_string()))?;
    let class_name = head[..slash_idx].to_string();
    let method_name = head[slash_idx + 1..].to_string();
    let close_idx = meta[paren_idx..]
        .find(')')
        .map(|i| i + paren_idx)
        .ok_or_else(|| ProtocolError::InvalidSignature(meta.to_string()))?;
    let signature = meta[paren_idx..=close_idx].to_string();
    Ok((class_name, method_name, signature))
}

/// Splits the `[p0,p1,…]` parameter list into exactly `expected` segments
/// (the arity already known from the parsed signature), rather than
/// guessing the count from the string's own shape. Guessing cannot tell a
/// single parameter that itself encodes to the empty string (e.g.
/// `echo("")`, `spec.md` §8 Scenario S4) apart from a zero-parameter call,
/// since both produce an empty bracket interior `[]`. Safe to split on
/// plain commas because no encoded segment ever contains one (`spec.md`
/// §4.3.1).
fn split_param_list(list: &str, expected: usize) -> Result<Vec<String>, ProtocolError> {
    let inner = list
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or(ProtocolError::MalformedParamList)?;
    if expected == 0 {
        return if inner.is_empty() {
            Ok(vec![])
        } else {
            Err(ProtocolError::ParamParse(format!(
                "expected 0 parameters, got a non-empty parameter list '{inner}'"
            )))
        };
    }
    let parts: Vec<String> = inner.splitn(expected, ',').map(|s| s.to_string()).collect();
    if parts.len() != expected {
        return Err(ProtocolError::ParamParse(format!(
            "expected {expected} parameters, got {}",
            parts.len()
        )));
    }
    Ok(parts)
}

/// Strips and verifies the optional trailing `|CHK:<hex>` (and `|SIG:<hex>`,
/// accepted but never required — `spec.md` §9 open question on SIG)
/// segments from a line, returning the remaining message body.
fn strip_envelope<'a>(line: &'a str, security: &SecurityConfig) -> Result<&'a str, SecurityError> {
    let mut body = line;
    // SIG, if present, is always the last segment; CHK precedes it.
    if let Some(idx) = body.rfind("|SIG:") {
        body = &body[..idx];
    }
    let mut chk: Option<&str> = None;
    if let Some(idx) = body.rfind("|CHK:") {
        chk = Some(&body[idx + 5..]);
        body = &body[..idx];
    }

    security.verify_checksum(body, chk)?;
    Ok(body)
}

/// Encodes a request line (`spec.md` §4.3.2). `params` pairs each
/// parameter's declared type with its value.
pub fn encode_request(
    class_name: &str,
    method_name: &str,
    params: &[(TypeDesc, Value)],
    mappers: &MapperRegistry,
    security: &SecurityConfig,
) -> Result<String, RequestError> {
    security.validate_identifiers(class_name, method_name)?;
    security.enforce_whitelist(class_name)?;

    let types: Vec<TypeDesc> = params.iter().map(|(t, _)| t.clone()).collect();
    for ty in &types {
        signature::check_array_depth(ty)?;
    }
    let signature = render_signature(&types);
    let meta = format!("{class_name}/{method_name}{signature}");
    let meta_b64 = STANDARD.encode(meta.as_bytes());

    let mut segments = Vec::with_capacity(params.len());
    for (ty, value) in params {
        segments.push(encode_param_segment(ty, value, mappers)?);
    }
    let param_list = format!("[{}]", segments.join(","));

    let mut head = format!("{VERSION}|{COMPRESSION_FLAG}|{meta_b64}|{param_list}");
    if let Some(chk) = security.compute_checksum(&head) {
        head = format!("{head}|CHK:{chk}");
    }
    Ok(head)
}

/// Parses a request line's head into a [`RequestHead`], verifying the
/// envelope and identifier/whitelist rules but leaving typed parameter
/// decoding to the caller (`parser.rs`) since it needs the resolved method's
/// parameter types from the registry.
pub fn decode_request_head(
    line: &str,
    security: &SecurityConfig,
) -> Result<RequestHead, RequestError> {
    if line.is_empty() {
        return Err(ProtocolError::EmptyFrame.into());
    }
    if !line.starts_with("V2|") {
        return Err(ProtocolError::MissingPrefix.into());
    }
    let body = strip_envelope(line, security)?;

    let fields: Vec<&str> = body.splitn(4, '|').collect();
    if fields.len() != 4 {
        return Err(ProtocolError::MalformedHead {
            expected: 4,
            got: fields.len(),
        }
        .into());
    }
    let meta_bytes = STANDARD.decode(fields[2]).map_err(ProtocolError::from)?;
    let meta = String::from_utf8(meta_bytes).map_err(ProtocolError::from)?;
    let (class_name, method_name, signature) = split_meta(&meta)?;

    security.validate_identifiers(&class_name, &method_name)?;
    security.enforce_whitelist(&class_name)?;

    let param_types = parse_signature(&signature)?;
    let raw_params = split_param_list(fields[3], param_types.len())?;

    Ok(RequestHead {
        class_name,
        method_name,
        signature,
        param_types,
        raw_params,
    })
}

/// Decodes the raw parameter segments of a [`RequestHead`] into [`Value`]s,
/// per the P1..P6 priority chain (`spec.md` §4.3.3 step 6).
pub fn decode_params(
    head: &RequestHead,
    mappers: &MapperRegistry,
) -> Result<Vec<Value>, ProtocolError> {
    let mut out = Vec::with_capacity(head.raw_params.len());
    for (raw, ty) in head.raw_params.iter().zip(head.param_types.iter()) {
        if raw == "~" || raw == "NULL" {
            // "NULL" is the legacy marker, accepted decode-only for
            // backward compatibility with recorded traces (spec.md §9).
            out.push(Value::Null);
            continue;
        }
        let segment = decode_param_segment(raw, ty, mappers)?;
        out.push(mappers.decode(ty, &segment)?);
    }
    Ok(out)
}

/// Encodes a success/exception response line (`spec.md` §4.3.4).
pub fn encode_response(
    status: Status,
    body: Option<(&TypeDesc, &Value)>,
    mappers: &MapperRegistry,
    security: &SecurityConfig,
) -> Result<String, ProtocolError> {
    let encoded_body = match body {
        None => "null".to_string(),
        Some((_, value)) if value.is_null() => "null".to_string(),
        Some((ty, value)) => {
            let segment = encode_param_segment(ty, value, mappers)?;
            format!("{{{segment}}}")
        }
    };
    let mut head = format!("{VERSION}|{COMPRESSION_FLAG}|{}|{encoded_body}", status.code());
    if let Some(chk) = security.compute_checksum(&head) {
        head = format!("{head}|CHK:{chk}");
    }
    Ok(head)
}

/// Encodes a non-success body: `"<FQCN>: <message>"`.
pub fn encode_exception_response(
    status: Status,
    fqcn: &str,
    message: &str,
    security: &SecurityConfig,
) -> String {
    let text = format!("{fqcn}: {message}");
    let encoded = STANDARD.encode(text.as_bytes());
    let mut head = format!("{VERSION}|{COMPRESSION_FLAG}|{}|{{{encoded}}}", status.code());
    if let Some(chk) = security.compute_checksum(&head) {
        head = format!("{head}|CHK:{chk}");
    }
    head
}

pub struct DecodedResponse {
    pub status: Status,
    /// `None` for a null success body.
    pub body_segment: Option<DecodedSegment>,
}

/// Decodes a response line's head and envelope (`spec.md` §4.3.5 steps 1-2).
/// `return_type` is the declared return type of the method being called, when
/// the caller (a typed wrapper) knows it; `None` when it doesn't (the wire
/// carries no return-type descriptor), in which case the body alphabet is
/// guessed the same way a pre-type-first decode would (see
/// [`guess_param_segment`]). A non-success status always decodes its body as
/// the literal exception text, regardless of `return_type`.
pub fn decode_response_head(
    line: &str,
    security: &SecurityConfig,
    mappers: &MapperRegistry,
    return_type: Option<&TypeDesc>,
) -> Result<DecodedResponse, RequestError> {
    if line.is_empty() {
        return Err(ProtocolError::EmptyFrame.into());
    }
    if !line.starts_with("V2|") {
        return Err(ProtocolError::MissingPrefix.into());
    }
    let body = strip_envelope(line, security)?;
    let fields: Vec<&str> = body.splitn(4, '|').collect();
    if fields.len() != 4 {
        return Err(ProtocolError::MalformedHead {
            expected: 4,
            got: fields.len(),
        }
        .into());
    }
    let status_code: u8 = fields[2]
        .parse()
        .map_err(|_| ProtocolError::MalformedHead { expected: 1, got: 0 })?;
    let status = Status::from_code(status_code)?;

    let raw_body = fields[3];
    if raw_body == "null" {
        return Ok(DecodedResponse {
            status,
            body_segment: None,
        });
    }
    let inner = raw_body
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or(ProtocolError::MalformedHead { expected: 1, got: 0 })?;

    let segment = if status != Status::Success {
        DecodedSegment::Standard(decode_exception_body(inner)?)
    } else {
        match return_type {
            Some(ty) => decode_param_segment(inner, ty, mappers)?,
            None => guess_param_segment(inner)?,
        }
    };
    Ok(DecodedResponse {
        status,
        body_segment: Some(segment),
    })
}

/// Parses the `"<FQCN>: <message>"` textual body of a non-success response.
pub fn parse_exception_text(text: &str) -> (String, String) {
    match text.split_once(": ") {
        Some((fqcn, message)) => (fqcn.to_string(), message.to_string()),
        None => (text.to_string(), String::new()),
    }
}
