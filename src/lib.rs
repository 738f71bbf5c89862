//! API gateway engine: routes inbound HTTP exchanges to HTTP, RPC, gRPC or
//! raw TCP downstreams through pluggable protocol handlers.

pub mod config;
pub mod error;
pub mod gateway;
pub mod grpc;
pub mod http;
pub mod lifecycle;
pub mod mapping;
pub mod observability;
pub mod protocol;
pub mod proxy;
pub mod routing;

pub use config::GatewayConfig;
pub use error::{ErrorKind, GatewayError, GatewayResult, RpcCode};
pub use gateway::{ErrorCodeHook, Gateway, GatewayBuilder, Hook};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use mapping::StatusMapping;
pub use protocol::{ClientTransport, Exchange, ProtocolHandler, ProtocolRegistry};
