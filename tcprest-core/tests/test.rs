use std::sync::Arc;
use std::time::Duration;
use tcprest_core::{
    client::ClientFactory,
    error::{ClientError, RemoteKind, ServiceError},
    mapper::MapperRegistry,
    pipeline::Pipeline,
    registry::{ResourceRegistry, ServiceBuilder},
    security::SecurityConfig,
    signature::TypeDesc,
    transport,
    value::Value,
};

struct Calculator;
struct Echo;

fn build_registry() -> ResourceRegistry {
    let registry = ResourceRegistry::new();
    registry.add_singleton_resource(
        ServiceBuilder::<Calculator>::new("com.example.Calculator")
            .method("add", "(II)", |_, params| {
                Ok(Value::Int(params[0].as_i32()? + params[1].as_i32()?))
            })
            .method("add", "(DD)", |_, params| {
                Ok(Value::Double(params[0].as_f64()? + params[1].as_f64()?))
            })
            .method("validateAge", "(I)", |_, params| {
                let age = params[0].as_i32()?;
                if age < 0 {
                    Err(ServiceError::business("com.example.ValidationException", "neg"))
                } else {
                    Ok(Value::Null)
                }
            })
            .build_singleton(Calculator),
    );
    registry.add_singleton_resource(
        ServiceBuilder::<Echo>::new("com.example.Echo")
            .method("echo", "(Ljava/lang/String;)", |_, params| {
                Ok(params[0].clone())
            })
            .build_singleton(Echo),
    );
    registry
}

async fn start_server(security: SecurityConfig) -> (transport::ServerHandle, u16) {
    let pipeline = Arc::new(Pipeline::new(
        Arc::new(build_registry()),
        Arc::new(MapperRegistry::with_builtins()),
        Arc::new(security),
    ));
    let handle = transport::up("127.0.0.1:0".parse().unwrap(), pipeline)
        .await
        .unwrap();
    let port = handle.server_port();
    (handle, port)
}

#[tokio::test]
async fn s1_simple_primitive_call() {
    let (handle, port) = start_server(SecurityConfig::default()).await;
    let factory = ClientFactory::new(
        format!("127.0.0.1:{port}").parse().unwrap(),
        Arc::new(MapperRegistry::with_builtins()),
        Arc::new(SecurityConfig::default()),
    );
    let calc = factory.get("com.example.Calculator");

    let result = calc
        .call(
            "add",
            &[(TypeDesc::Int, Value::Int(5)), (TypeDesc::Int, Value::Int(3))],
            Some(&TypeDesc::Int),
            None,
        )
        .await
        .unwrap();
    assert_eq!(result, Value::Int(8));

    handle.down().await;
}

#[tokio::test]
async fn s2_overload_resolution_by_signature() {
    let (handle, port) = start_server(SecurityConfig::default()).await;
    let factory = ClientFactory::new(
        format!("127.0.0.1:{port}").parse().unwrap(),
        Arc::new(MapperRegistry::with_builtins()),
        Arc::new(SecurityConfig::default()),
    );
    let calc = factory.get("com.example.Calculator");

    let result = calc
        .call(
            "add",
            &[(TypeDesc::Double, Value::Double(5.5)), (TypeDesc::Double, Value::Double(3.3))],
            Some(&TypeDesc::Double),
            None,
        )
        .await
        .unwrap();
    assert_eq!(result, Value::Double(8.8));

    handle.down().await;
}

#[tokio::test]
async fn s3_business_exception_surrogate_and_reconstruction() {
    let (handle, port) = start_server(SecurityConfig::default()).await;
    let factory = ClientFactory::new(
        format!("127.0.0.1:{port}").parse().unwrap(),
        Arc::new(MapperRegistry::with_builtins()),
        Arc::new(SecurityConfig::default()),
    );
    let calc = factory.get("com.example.Calculator");

    let err = calc
        .call("validateAge", &[(TypeDesc::Int, Value::Int(-1))], None, None)
        .await
        .unwrap_err();
    match err {
        ClientError::Remote { kind, fqcn, message } => {
            assert_eq!(kind, RemoteKind::Business);
            assert_eq!(fqcn, "com.example.ValidationException");
            assert_eq!(message, "neg");
        }
        other => panic!("expected Remote surrogate, got {other:?}"),
    }

    factory.exceptions().register("com.example.ValidationException");
    let err = calc
        .call("validateAge", &[(TypeDesc::Int, Value::Int(-1))], None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Reconstructed { .. }));

    handle.down().await;
}

#[tokio::test]
async fn s4_null_and_empty_are_distinct() {
    let (handle, port) = start_server(SecurityConfig::default()).await;
    let factory = ClientFactory::new(
        format!("127.0.0.1:{port}").parse().unwrap(),
        Arc::new(MapperRegistry::with_builtins()),
        Arc::new(SecurityConfig::default()),
    );
    let echo = factory.get("com.example.Echo");

    let result = echo
        .call(
            "echo",
            &[(TypeDesc::Object("java.lang.String".into()), Value::Null)],
            Some(&TypeDesc::Object("java.lang.String".into())),
            None,
        )
        .await
        .unwrap();
    assert_eq!(result, Value::Null);

    let result = echo
        .call(
            "echo",
            &[(
                TypeDesc::Object("java.lang.String".into()),
                Value::Str(String::new()),
            )],
            Some(&TypeDesc::Object("java.lang.String".into())),
            None,
        )
        .await
        .unwrap();
    assert_eq!(result, Value::Str(String::new()));

    handle.down().await;
}

#[tokio::test]
async fn s5_whitelist_enforcement_rejects_hidden_class() {
    let security =
        SecurityConfig::default().with_whitelist(vec!["com.example.Calculator".to_string()]);
    let (handle, port) = start_server(security).await;
    let factory = ClientFactory::new(
        format!("127.0.0.1:{port}").parse().unwrap(),
        Arc::new(MapperRegistry::with_builtins()),
        Arc::new(SecurityConfig::default()),
    );
    let hidden = factory.get("com.example.Echo");

    let err = hidden
        .call(
            "echo",
            &[(TypeDesc::Object("java.lang.String".into()), Value::Str("x".into()))],
            None,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Remote { kind: RemoteKind::Server, .. }));

    handle.down().await;
}

#[tokio::test]
async fn s6_hmac_tampering_is_rejected_end_to_end() {
    let security = SecurityConfig::with_hmac("k");
    let (handle, port) = start_server(security).await;

    let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let mappers = MapperRegistry::with_builtins();
    let client_security = SecurityConfig::with_hmac("k");
    let request = tcprest_core::codec::encode_request(
        "com.example.Calculator",
        "add",
        &[(TypeDesc::Int, Value::Int(1)), (TypeDesc::Int, Value::Int(2))],
        &mappers,
        &client_security,
    )
    .unwrap();

    let mut tampered = request.into_bytes();
    tampered[10] ^= 0x01;
    stream.write_all(&tampered).await.unwrap();
    stream.write_all(b"\n").await.unwrap();

    let mut response = String::new();
    BufReader::new(&mut stream).read_line(&mut response).await.unwrap();
    let decoded = tcprest_core::codec::decode_response_head(
        response.trim_end(),
        &SecurityConfig::default(),
        &mappers,
        None,
    )
    .unwrap();
    assert_eq!(decoded.status, tcprest_core::codec::Status::Protocol);

    handle.down().await;
}

#[tokio::test]
async fn timeout_on_a_hung_server_raises_timeout_error() {
    let (handle, port) = start_server(SecurityConfig::default()).await;
    let factory = ClientFactory::new(
        format!("127.0.0.1:{port}").parse().unwrap(),
        Arc::new(MapperRegistry::with_builtins()),
        Arc::new(SecurityConfig::default()),
    );
    let calc = factory.get("com.example.Calculator");

    let err = calc
        .call(
            "add",
            &[(TypeDesc::Int, Value::Int(1)), (TypeDesc::Int, Value::Int(2))],
            None,
            Some(Duration::from_nanos(1)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Timeout(_)));

    handle.down().await;
}
