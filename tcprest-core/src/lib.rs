#![allow(dead_code)]

pub mod client;
pub mod codec;
pub mod error;
pub mod invoker;
pub mod mapper;
pub mod parser;
pub mod pipeline;
pub mod registry;
pub mod security;
pub mod signature;
pub mod transport;
pub mod value;

pub use client::{ClientFactory, ClientProxy, ExceptionRegistry};
pub use error::{
    ClientError, ProtocolError, RemoteKind, RequestError, SecurityError, ServiceError, TimeoutError,
};
pub use mapper::{Mapper, MapperRegistry};
pub use pipeline::Pipeline;
pub use registry::{ResourceRegistry, ServiceBuilder, ServiceDescriptor};
pub use security::{ChecksumKind, SecurityConfig};
pub use signature::TypeDesc;
pub use value::Value;
