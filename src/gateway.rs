//! Gateway driver.
//!
//! # Responsibilities
//! - Resolve the protocol handler for a routed exchange
//! - Run pre hooks, the handler lifecycle and post hooks in order
//! - Select the client transport for the outbound call
//! - Map errors that reach the boundary to an HTTP status
//!
//! # Data Flow
//! ```text
//! (protocol, Target, Exchange)
//!     → registry lookup
//!     → Hook::before (each)
//!     → with_ctx → cli_options → trans_req_body → trans_rsp_body
//!     → ClientTransport::round_trip
//!         └─ on error: handle_err (business errors absorbed, others abort)
//!     → handle_rsp_body
//!     → Hook::after (each)
//!     → Response, or mapped error response
//! ```
//!
//! # Design Decisions
//! - The status mapping is sealed when the gateway is built
//! - The handler's transport wins over the per-protocol table

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Response, StatusCode};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult, RpcCode};
use crate::grpc::{ConnPool, GrpcTransport, TonicDialer};
use crate::mapping::StatusMapping;
use crate::observability::metrics;
use crate::protocol::grpc::GrpcHandler;
use crate::protocol::http::HttpHandler;
use crate::protocol::raw::{RawHandler, RawTcpTransport};
use crate::protocol::rpc::RpcHandler;
use crate::protocol::{
    error_headers, Call, ClientTransport, Exchange, ProtocolHandler, ProtocolRegistry, Target,
};
use crate::proxy::ReverseProxy;

/// Opaque pre/post processing around the lifecycle.
#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    /// Runs once at bootstrap, before the mapping is sealed.
    fn setup(&self, _mapping: &StatusMapping) -> GatewayResult<()> {
        Ok(())
    }

    /// Runs before `with_ctx`; an error aborts the exchange.
    async fn before(&self, _exchange: &mut Exchange) -> GatewayResult<()> {
        Ok(())
    }

    /// Runs after `handle_rsp_body` with the published upstream head.
    async fn after(&self, _exchange: &Exchange) {}
}

/// Registers configured error codes and success statuses.
#[derive(Debug, Clone, Default)]
pub struct ErrorCodeHook {
    codes: Vec<(RpcCode, StatusCode)>,
    success: Vec<StatusCode>,
}

impl ErrorCodeHook {
    pub fn new(codes: Vec<(RpcCode, StatusCode)>, success: Vec<StatusCode>) -> Self {
        Self { codes, success }
    }

    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let status = |code: u16| {
            StatusCode::from_u16(code).map_err(|e| {
                GatewayError::config(RpcCode::UNKNOWN, format!("invalid HTTP status {code}: {e}"))
            })
        };

        let codes = config
            .error_codes
            .iter()
            .map(|entry| Ok((RpcCode(entry.code), status(entry.http_status)?)))
            .collect::<GatewayResult<Vec<_>>>()?;
        let success = config
            .success_statuses
            .iter()
            .map(|code| status(*code))
            .collect::<GatewayResult<Vec<_>>>()?;

        Ok(Self::new(codes, success))
    }
}

#[async_trait]
impl Hook for ErrorCodeHook {
    fn name(&self) -> &str {
        "error-codes"
    }

    fn setup(&self, mapping: &StatusMapping) -> GatewayResult<()> {
        for (code, status) in &self.codes {
            mapping.register_code(*code, *status)?;
        }
        for status in &self.success {
            mapping.register_success_status(*status)?;
        }
        Ok(())
    }
}

pub struct Gateway {
    registry: Arc<ProtocolRegistry>,
    mapping: Arc<StatusMapping>,
    transports: HashMap<String, Arc<dyn ClientTransport>>,
    hooks: Vec<Arc<dyn Hook>>,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::default()
    }

    pub fn registry(&self) -> &Arc<ProtocolRegistry> {
        &self.registry
    }

    pub fn mapping(&self) -> &Arc<StatusMapping> {
        &self.mapping
    }

    /// Run one exchange to completion. Never fails: errors become responses.
    pub async fn serve(&self, protocol: &str, target: &Target, mut exchange: Exchange) -> Response<Body> {
        let start = Instant::now();

        let response = match self.run(protocol, target, &mut exchange).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(
                    request_id = %exchange.id(),
                    protocol,
                    target = %target.address,
                    kind = %err.kind,
                    code = %err.code,
                    error = %err.message,
                    "Exchange failed"
                );
                self.error_response(&err)
            }
        };

        let status = response.status();
        metrics::record_exchange(protocol, status.as_u16(), self.mapping.is_success(status), start);
        response
    }

    async fn run(
        &self,
        protocol: &str,
        target: &Target,
        exchange: &mut Exchange,
    ) -> GatewayResult<Response<Body>> {
        let handler = self.registry.lookup(protocol)?;

        for hook in &self.hooks {
            hook.before(exchange).await?;
        }

        handler.with_ctx(exchange)?;
        let options = handler.cli_options(exchange)?;
        let payload = handler.trans_req_body(exchange)?;
        let mut rsp = handler.trans_rsp_body(exchange)?;

        let transport = self.transport_for(protocol, options.transport.as_ref())?;
        let call = Call {
            target,
            options: &options,
            payload,
        };

        tracing::debug!(
            request_id = %exchange.id(),
            protocol,
            target = %target.address,
            timeout = ?call.timeout(),
            "Outbound call"
        );

        if let Err(err) = transport.round_trip(exchange, &call, &mut rsp).await {
            handler.handle_err(exchange, err)?;
        }
        handler.handle_rsp_body(exchange, rsp)?;

        for hook in &self.hooks {
            hook.after(exchange).await;
        }

        exchange.take_response().ok_or_else(|| {
            GatewayError::framework(RpcCode::SERVER_SYSTEM_ERR, "lifecycle finished without a response")
        })
    }

    fn transport_for(
        &self,
        protocol: &str,
        own: Option<&Arc<dyn ClientTransport>>,
    ) -> GatewayResult<Arc<dyn ClientTransport>> {
        own.or_else(|| self.transports.get(protocol))
            .cloned()
            .ok_or_else(|| {
                GatewayError::config(
                    RpcCode::NO_TRANSPORT,
                    format!("no client transport for protocol {protocol}"),
                )
            })
    }

    /// Mapped status, code/message headers, message as body.
    pub fn error_response(&self, err: &GatewayError) -> Response<Body> {
        let mut response = Response::new(Body::from(err.message.clone()));
        *response.status_mut() = self.mapping.http_status(err.code);
        *response.headers_mut() = error_headers(err);
        response
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("protocols", &self.registry.names())
            .field("transports", &self.transports.keys().collect::<Vec<_>>())
            .field("hooks", &self.hooks.iter().map(|h| h.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Default)]
pub struct GatewayBuilder {
    registry: ProtocolRegistry,
    mapping: StatusMapping,
    transports: HashMap<String, Arc<dyn ClientTransport>>,
    hooks: Vec<Arc<dyn Hook>>,
}

impl GatewayBuilder {
    /// Register the built-in `http`, `rpc`, `grpc` and `raw` protocols.
    /// The `rpc` transport is left to the host stack.
    pub fn builtin_protocols(self, config: &GatewayConfig) -> Self {
        let proxy: Arc<dyn ClientTransport> = Arc::new(ReverseProxy::new(&config.proxy));
        let dialer = TonicDialer::new(Duration::from_millis(config.grpc.dial_timeout_ms));
        let grpc: Arc<dyn ClientTransport> =
            Arc::new(GrpcTransport::new(Arc::new(ConnPool::new(Arc::new(dialer)))));
        let raw: Arc<dyn ClientTransport> = Arc::new(RawTcpTransport);

        self.handler("http", Arc::new(HttpHandler::new(proxy)))
            .handler("rpc", Arc::new(RpcHandler::new()))
            .handler("grpc", Arc::new(GrpcHandler::new(grpc)))
            .handler("raw", Arc::new(RawHandler::new(raw)))
    }

    pub fn handler(self, name: &str, handler: Arc<dyn ProtocolHandler>) -> Self {
        self.registry.register(name, handler);
        self
    }

    /// Transport used when the protocol's handler does not bring one.
    pub fn transport(mut self, protocol: &str, transport: Arc<dyn ClientTransport>) -> Self {
        self.transports.insert(protocol.to_string(), transport);
        self
    }

    pub fn hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Run every hook's setup, seal the mapping and freeze the gateway.
    pub fn build(self) -> GatewayResult<Gateway> {
        for hook in &self.hooks {
            hook.setup(&self.mapping)?;
            tracing::debug!(hook = hook.name(), "Hook set up");
        }
        self.mapping.seal();

        Ok(Gateway {
            registry: Arc::new(self.registry),
            mapping: Arc::new(self.mapping),
            transports: self.transports,
            hooks: self.hooks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::rpc::RpcHandler;
    use crate::protocol::{RspBody, HEADER_RET_CODE};
    use axum::http::Request;
    use bytes::Bytes;

    struct Reply(Result<&'static [u8], GatewayError>);

    #[async_trait]
    impl ClientTransport for Reply {
        async fn round_trip(&self, _: &mut Exchange, _: &Call<'_>, rsp: &mut RspBody) -> GatewayResult<()> {
            match &self.0 {
                Ok(bytes) => {
                    *rsp = RspBody::Bytes(Some(Bytes::from_static(bytes)));
                    Ok(())
                }
                Err(err) => Err(err.clone()),
            }
        }
    }

    fn target() -> Target {
        Target {
            address: "127.0.0.1:1".into(),
            method: Some("user.Get".into()),
            timeout: Duration::from_secs(1),
        }
    }

    fn exchange() -> Exchange {
        let (parts, _) = Request::builder()
            .method("POST")
            .uri("/user")
            .body(())
            .unwrap()
            .into_parts();
        Exchange::new(parts, Bytes::from_static(b"{}"))
    }

    #[tokio::test]
    async fn missing_transport_is_config_error() {
        let gateway = Gateway::builder()
            .handler("rpc", Arc::new(RpcHandler::new()))
            .build()
            .unwrap();
        let response = gateway.serve("rpc", &target(), exchange()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[HEADER_RET_CODE], "10003");
    }

    #[tokio::test]
    async fn table_transport_used_when_handler_has_none() {
        let gateway = Gateway::builder()
            .handler("rpc", Arc::new(RpcHandler::new()))
            .transport("rpc", Arc::new(Reply(Ok(b"{\"id\":1}"))))
            .build()
            .unwrap();
        let response = gateway.serve("rpc", &target(), exchange()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(body.as_ref(), b"{\"id\":1}");
    }

    #[tokio::test]
    async fn unknown_protocol_maps_to_error_status() {
        let gateway = Gateway::builder().build().unwrap();
        let response = gateway.serve("thrift", &target(), exchange()).await;
        assert_eq!(response.headers()[HEADER_RET_CODE], "10002");
    }

    #[test]
    fn build_seals_mapping_after_hook_setup() {
        let hook = ErrorCodeHook::new(
            vec![(RpcCode(20001), StatusCode::CONFLICT)],
            vec![StatusCode::CREATED],
        );
        let gateway = Gateway::builder().hook(Arc::new(hook)).build().unwrap();

        assert!(gateway.mapping().is_sealed());
        assert_eq!(gateway.mapping().http_status(RpcCode(20001)), StatusCode::CONFLICT);
        assert!(gateway.mapping().is_success(StatusCode::CREATED));
        assert!(gateway
            .mapping()
            .register_code(RpcCode(20002), StatusCode::GONE)
            .is_err());
    }

    #[test]
    fn duplicate_code_in_hook_fails_build() {
        let hook = ErrorCodeHook::new(vec![(RpcCode::SERVER_TIMEOUT, StatusCode::BAD_GATEWAY)], vec![]);
        assert!(Gateway::builder().hook(Arc::new(hook)).build().is_err());
    }
}
