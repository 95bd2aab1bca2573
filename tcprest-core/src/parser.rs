//! Ties the wire codec to the resource registry to build one invocation's
//! context (`spec.md` §3 "Invocation context", §4.3.3).

use crate::codec::{self, RequestHead};
use crate::error::{ProtocolError, RequestError};
use crate::mapper::MapperRegistry;
use crate::registry::{ResourceRegistry, ServiceDescriptor};
use crate::security::SecurityConfig;
use crate::value::Value;
use std::sync::Arc;

/// Everything the invoker needs to run one request: the resolved service,
/// the method/signature it was asked to call, and the already-decoded
/// parameter values.
pub struct RequestContext {
    pub service: Arc<ServiceDescriptor>,
    pub method_name: String,
    pub signature: String,
    pub params: Vec<Value>,
}

/// Parses one request line end-to-end: envelope, head, class resolution,
/// and parameter decoding. The resolved method's declared parameter types
/// come from the [`RequestHead`] itself (mirrored on the wire), not the
/// registry — the registry only supplies the handler.
pub fn parse_request(
    line: &str,
    registry: &ResourceRegistry,
    mappers: &MapperRegistry,
    security: &SecurityConfig,
) -> Result<RequestContext, RequestError> {
    let head: RequestHead = codec::decode_request_head(line, security)?;
    let service = registry
        .get_resource(&head.class_name)
        .ok_or_else(|| ProtocolError::UnknownClass(head.class_name.clone()))?;
    let params = codec::decode_params(&head, mappers)?;

    Ok(RequestContext {
        service,
        method_name: head.method_name,
        signature: head.signature,
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ServiceBuilder;

    struct Echo;

    fn build() -> ResourceRegistry {
        let registry = ResourceRegistry::new();
        registry.add_singleton_resource(
            ServiceBuilder::<Echo>::new("com.example.Echo")
                .method("echo", "(I)", |_, params| Ok(params[0].clone()))
                .build_singleton(Echo),
        );
        registry
    }

    #[test]
    fn resolves_class_and_decodes_params() {
        let registry = build();
        let mappers = MapperRegistry::with_builtins();
        let security = SecurityConfig::default();
        let line =
            codec::encode_request("com.example.Echo", "echo", &[(crate::signature::TypeDesc::Int, Value::Int(42))], &mappers, &security)
                .unwrap();
        let ctx = parse_request(&line, &registry, &mappers, &security).unwrap();
        assert_eq!(ctx.method_name, "echo");
        assert_eq!(ctx.params, vec![Value::Int(42)]);
    }

    #[test]
    fn unknown_class_is_rejected() {
        let registry = build();
        let mappers = MapperRegistry::with_builtins();
        let security = SecurityConfig::default();
        let line = codec::encode_request(
            "com.example.Missing",
            "m",
            &[],
            &mappers,
            &security,
        )
        .unwrap();
        assert!(matches!(
            parse_request(&line, &registry, &mappers, &security),
            Err(RequestError::Protocol(ProtocolError::UnknownClass(_)))
        ));
    }
}
