use thiserror::Error;

/// A malformed frame, an unresolvable class/method, a parameter that failed
/// to parse, or an array that broke the size/depth caps (`spec.md` §4.3.1).
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("missing V2 prefix")]
    MissingPrefix,

    #[error("empty request")]
    EmptyFrame,

    #[error("malformed head: expected {expected} fields, got {got}")]
    MalformedHead { expected: usize, got: usize },

    #[error("invalid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("invalid utf8 in frame: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("invalid type signature: {0}")]
    InvalidSignature(String),

    #[error("unknown class: {0}")]
    UnknownClass(String),

    #[error("no method {method}{signature} on {class}")]
    UnknownMethod {
        class: String,
        method: String,
        signature: String,
    },

    #[error("failed to construct instance of {0}")]
    Construct(String),

    #[error("parameter parse failure: {0}")]
    ParamParse(String),

    #[error("array length {len} exceeds cap of {max}")]
    ArrayTooLong { len: usize, max: usize },

    #[error("array nesting depth {depth} exceeds cap of {max}")]
    ArrayTooDeep { depth: usize, max: usize },

    #[error("serialization error: {0}")]
    Serde(String),

    #[error("malformed parameter list")]
    MalformedParamList,
}

/// CHK absent when required, CHK verification failed, whitelist rejection,
/// or an identifier that violates the class/method grammar (`spec.md` §4.3.6).
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("checksum required but absent")]
    ChecksumMissing,

    #[error("checksum verification failed")]
    ChecksumMismatch,

    #[error("malformed checksum segment: {0}")]
    MalformedChecksum(String),

    #[error("class {0} is not whitelisted")]
    NotWhitelisted(String),

    #[error("invalid class identifier: {0}")]
    InvalidClassIdentifier(String),

    #[error("invalid method identifier: {0}")]
    InvalidMethodIdentifier(String),
}

/// Client-side read deadline expired (`spec.md` §4.7 step 2).
#[derive(Debug, Error)]
#[error("call timed out")]
pub struct TimeoutError;

/// The outcome of a handler invocation other than a plain success value.
/// Mirrors the BusinessException / anything-else split of `spec.md` §4.6.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{fqcn}: {message}")]
    Business { fqcn: String, message: String },

    #[error("{fqcn}: {message}")]
    Server { fqcn: String, message: String },
}

impl ServiceError {
    pub fn business(fqcn: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::Business {
            fqcn: fqcn.into(),
            message: message.into(),
        }
    }

    pub fn server(fqcn: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::Server {
            fqcn: fqcn.into(),
            message: message.into(),
        }
    }
}

/// Which remote surrogate to raise when the original exception class has no
/// reconstructor registered locally (`spec.md` §4.3.5 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKind {
    Business,
    Server,
}

/// Errors a `ClientProxy` call can produce (`spec.md` §7).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote {kind:?} exception {fqcn}: {message}")]
    Remote {
        kind: RemoteKind,
        fqcn: String,
        message: String,
    },

    #[error("reconstructed exception {fqcn}: {message}")]
    Reconstructed { fqcn: String, message: String },
}

/// Keeps a `SecurityError` distinct from a `ProtocolError` through
/// `encode_request`/`decode_request_head`/`decode_response_head` instead of
/// collapsing both into a stringly-typed `ProtocolError` variant, so a
/// caller (or `ClientError::Security`) can still tell the two failure
/// domains apart (`spec.md` §7, Testable Property 7: "rejected with
/// SecurityError before any I/O").
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Security(#[from] SecurityError),
}

impl From<RequestError> for ClientError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Protocol(e) => ClientError::Protocol(e),
            RequestError::Security(e) => ClientError::Security(e),
        }
    }
}
