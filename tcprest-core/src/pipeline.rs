//! Transport-agnostic request pipeline (`spec.md` §4.6): one line in, one
//! line out. Kept free of any I/O so both the reference TCP transport and
//! tests can drive it directly.

use crate::codec::{self, Status};
use crate::error::RequestError;
use crate::invoker::{self, Outcome};
use crate::mapper::MapperRegistry;
use crate::parser;
use crate::registry::ResourceRegistry;
use crate::security::SecurityConfig;
use log::{debug, warn};
use std::sync::Arc;

/// Shared, immutable server configuration a connection handler runs
/// requests against (`spec.md` §3 "Security config (immutable snapshot per
/// server/client)", "Resource registry").
pub struct Pipeline {
    registry: Arc<ResourceRegistry>,
    mappers: Arc<MapperRegistry>,
    security: Arc<SecurityConfig>,
}

impl Pipeline {
    pub fn new(
        registry: Arc<ResourceRegistry>,
        mappers: Arc<MapperRegistry>,
        security: Arc<SecurityConfig>,
    ) -> Self {
        Pipeline {
            registry,
            mappers,
            security,
        }
    }

    /// Handles one request line, always returning a well-formed response
    /// line — parser/security/framework failures before invocation are
    /// reported as status 3 rather than propagated (`spec.md` §4.3.4).
    pub fn handle_line(&self, line: &str) -> String {
        let ctx = match parser::parse_request(line, &self.registry, &self.mappers, &self.security) {
            Ok(ctx) => ctx,
            Err(err) => {
                warn!("rejecting request before invocation: {err}");
                let fqcn = match err {
                    RequestError::Security(_) => "tcprest.SecurityException",
                    RequestError::Protocol(_) => "tcprest.ProtocolException",
                };
                return codec::encode_exception_response(
                    Status::Protocol,
                    fqcn,
                    &err.to_string(),
                    &self.security,
                );
            }
        };

        debug!(
            "invoking {}.{}{}",
            ctx.service.canonical_name(),
            ctx.method_name,
            ctx.signature
        );

        match invoker::invoke(&ctx) {
            Outcome::Success(value) => {
                let ty = value.inferred_type();
                let body = if value.is_null() { None } else { Some((&ty, &value)) };
                match codec::encode_response(Status::Success, body, &self.mappers, &self.security) {
                    Ok(line) => line,
                    Err(err) => codec::encode_exception_response(
                        Status::Server,
                        "tcprest.ResponseEncodingException",
                        &err.to_string(),
                        &self.security,
                    ),
                }
            }
            Outcome::Exception { status, fqcn, message } => {
                codec::encode_exception_response(status, &fqcn, &message, &self.security)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ServiceBuilder;
    use crate::signature::TypeDesc;
    use crate::value::Value;

    struct Calculator;

    fn pipeline() -> Pipeline {
        let registry = ResourceRegistry::new();
        registry.add_singleton_resource(
            ServiceBuilder::<Calculator>::new("Calculator")
                .method("add", "(II)", |_, params| {
                    Ok(Value::Int(params[0].as_i32()? + params[1].as_i32()?))
                })
                .build_singleton(Calculator),
        );
        Pipeline::new(
            Arc::new(registry),
            Arc::new(MapperRegistry::with_builtins()),
            Arc::new(SecurityConfig::default()),
        )
    }

    #[test]
    fn s1_end_to_end_matches_wire_example() {
        let pipeline = pipeline();
        let mappers = MapperRegistry::with_builtins();
        let security = SecurityConfig::default();
        let request = codec::encode_request(
            "Calculator",
            "add",
            &[(TypeDesc::Int, Value::Int(5)), (TypeDesc::Int, Value::Int(3))],
            &mappers,
            &security,
        )
        .unwrap();
        let response = pipeline.handle_line(&request);
        assert!(response.starts_with("V2|0|0|"));
        let decoded = codec::decode_response_head(&response, &security, &mappers, None).unwrap();
        assert_eq!(decoded.status, Status::Success);
    }

    #[test]
    fn malformed_line_yields_protocol_status() {
        let pipeline = pipeline();
        let response = pipeline.handle_line("not a valid line");
        let security = SecurityConfig::default();
        let mappers = MapperRegistry::with_builtins();
        let decoded = codec::decode_response_head(&response, &security, &mappers, None).unwrap();
        assert_eq!(decoded.status, Status::Protocol);
    }
}
