//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the gateway from configuration (handlers, transports, hooks)
//! - Compile the route table
//! - Reject routes naming a protocol nobody registered
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Hooks extend the status mapping before it is sealed

use std::sync::Arc;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult, RpcCode};
use crate::gateway::{ErrorCodeHook, Gateway, GatewayBuilder};
use crate::routing::Router;

/// Everything the inbound server needs.
#[derive(Debug, Clone)]
pub struct Bootstrapped {
    pub gateway: Arc<Gateway>,
    pub routes: Arc<Router>,
}

/// Built-in protocols plus configured error codes.
pub fn bootstrap(config: &GatewayConfig) -> GatewayResult<Bootstrapped> {
    let builder = Gateway::builder()
        .builtin_protocols(config)
        .hook(Arc::new(ErrorCodeHook::from_config(config)?));
    bootstrap_with(config, builder)
}

/// Finish bootstrap from a caller-prepared builder (extra protocols,
/// transports or hooks).
pub fn bootstrap_with(config: &GatewayConfig, builder: GatewayBuilder) -> GatewayResult<Bootstrapped> {
    let gateway = builder.build()?;
    let routes = Router::from_config(
        config.routes.clone(),
        Duration::from_millis(config.timeouts.call_timeout_ms),
    );

    let registered = gateway.registry().names();
    for protocol in routes.protocols() {
        if !registered.iter().any(|name| name == protocol) {
            return Err(GatewayError::config(
                RpcCode::UNSUPPORTED_PROTOCOL,
                format!("route uses unregistered protocol {protocol}"),
            ));
        }
    }

    tracing::info!(
        routes = routes.len(),
        protocols = ?registered,
        "Gateway bootstrapped"
    );

    Ok(Bootstrapped {
        gateway: Arc::new(gateway),
        routes: Arc::new(routes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::parse_config;

    #[tokio::test]
    async fn builtin_protocols_registered() {
        let config = parse_config(
            r#"
            [observability]
            metrics_enabled = false

            [[routes]]
            name = "web"
            protocol = "http"
            target = "127.0.0.1:3000"

            [[routes]]
            name = "orders"
            protocol = "grpc"
            target = "127.0.0.1:50051"
            "#,
        )
        .unwrap();

        let boot = bootstrap(&config).unwrap();
        assert_eq!(boot.gateway.registry().names(), vec!["grpc", "http", "raw", "rpc"]);
        assert_eq!(boot.routes.len(), 2);
        assert!(boot.gateway.mapping().is_sealed());
    }

    #[tokio::test]
    async fn unknown_route_protocol_rejected() {
        let config = parse_config(
            r#"
            [[routes]]
            name = "legacy"
            protocol = "thrift"
            target = "127.0.0.1:9090"
            "#,
        )
        .unwrap();

        let err = bootstrap(&config).unwrap_err();
        assert_eq!(err.code, RpcCode::UNSUPPORTED_PROTOCOL);
    }
}
