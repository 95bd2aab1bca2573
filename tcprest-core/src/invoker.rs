//! Runs a parsed [`RequestContext`] against its resolved service and
//! classifies the outcome into a wire [`Status`] (`spec.md` §4.4, §4.6).

use crate::codec::Status;
use crate::error::ProtocolError;
use crate::parser::RequestContext;
use crate::registry::InvokeOutcome;
use crate::value::Value;

/// A handler's outcome translated to what the pipeline needs to encode a
/// response: a status code plus either a return value or exception text.
pub enum Outcome {
    Success(Value),
    Exception { status: Status, fqcn: String, message: String },
}

pub fn invoke(ctx: &RequestContext) -> Outcome {
    match ctx.service.invoke(&ctx.method_name, &ctx.signature, &ctx.params) {
        Ok(value) => Outcome::Success(value),
        Err(InvokeOutcome::Service(service_err)) => match service_err {
            crate::error::ServiceError::Business { fqcn, message } => Outcome::Exception {
                status: Status::Business,
                fqcn,
                message,
            },
            crate::error::ServiceError::Server { fqcn, message } => Outcome::Exception {
                status: Status::Server,
                fqcn,
                message,
            },
        },
        Err(InvokeOutcome::Protocol(protocol_err)) => Outcome::Exception {
            status: Status::Protocol,
            fqcn: protocol_fqcn(&protocol_err),
            message: protocol_err.to_string(),
        },
    }
}

/// A stand-in "exception class" reported to the caller for protocol-layer
/// failures, since there is no real Java exception to name (`spec.md` §4.6:
/// "any other handler failure maps to a protocol-level error").
fn protocol_fqcn(err: &ProtocolError) -> String {
    let kind = match err {
        ProtocolError::UnknownClass(_) => "UnknownClassException",
        ProtocolError::UnknownMethod { .. } => "UnknownMethodException",
        ProtocolError::Construct(_) => "ResourceConstructionException",
        ProtocolError::InvalidSignature(_) => "InvalidSignatureException",
        ProtocolError::ParamParse(_) => "ParameterDecodingException",
        ProtocolError::ArrayTooLong { .. } | ProtocolError::ArrayTooDeep { .. } => {
            "ArrayLimitExceededException"
        }
        _ => "ProtocolException",
    };
    format!("tcprest.{kind}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::MapperRegistry;
    use crate::parser::parse_request;
    use crate::registry::{ResourceRegistry, ServiceBuilder};
    use crate::security::SecurityConfig;
    use crate::signature::TypeDesc;

    struct Calculator;

    fn registry() -> ResourceRegistry {
        let registry = ResourceRegistry::new();
        registry.add_singleton_resource(
            ServiceBuilder::<Calculator>::new("com.example.Calculator")
                .method("add", "(II)", |_, params| {
                    Ok(Value::Int(params[0].as_i32()? + params[1].as_i32()?))
                })
                .method("fail", "()", |_, _| {
                    Err(crate::error::ServiceError::business(
                        "com.example.ValidationException",
                        "bad input",
                    ))
                })
                .build_singleton(Calculator),
        );
        registry
    }

    #[test]
    fn success_invocation_returns_value() {
        let registry = registry();
        let mappers = MapperRegistry::with_builtins();
        let security = SecurityConfig::default();
        let line = crate::codec::encode_request(
            "com.example.Calculator",
            "add",
            &[(TypeDesc::Int, Value::Int(2)), (TypeDesc::Int, Value::Int(3))],
            &mappers,
            &security,
        )
        .unwrap();
        let ctx = parse_request(&line, &registry, &mappers, &security).unwrap();
        match invoke(&ctx) {
            Outcome::Success(v) => assert_eq!(v, Value::Int(5)),
            _ => panic!("expected success"),
        }
    }

    #[test]
    fn business_exception_is_classified() {
        let registry = registry();
        let mappers = MapperRegistry::with_builtins();
        let security = SecurityConfig::default();
        let line = crate::codec::encode_request(
            "com.example.Calculator",
            "fail",
            &[],
            &mappers,
            &security,
        )
        .unwrap();
        let ctx = parse_request(&line, &registry, &mappers, &security).unwrap();
        match invoke(&ctx) {
            Outcome::Exception { status, fqcn, .. } => {
                assert_eq!(status, Status::Business);
                assert_eq!(fqcn, "com.example.ValidationException");
            }
            _ => panic!("expected exception"),
        }
    }

    #[test]
    fn unknown_method_is_protocol_error() {
        let registry = registry();
        let mappers = MapperRegistry::with_builtins();
        let security = SecurityConfig::default();
        let line = crate::codec::encode_request(
            "com.example.Calculator",
            "subtract",
            &[(TypeDesc::Int, Value::Int(2)), (TypeDesc::Int, Value::Int(3))],
            &mappers,
            &security,
        )
        .unwrap();
        let ctx = parse_request(&line, &registry, &mappers, &security).unwrap();
        match invoke(&ctx) {
            Outcome::Exception { status, .. } => assert_eq!(status, Status::Protocol),
            _ => panic!("expected protocol exception"),
        }
    }
}
