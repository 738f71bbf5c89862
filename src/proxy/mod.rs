//! HTTP reverse-proxy engine.
//!
//! # Data Flow
//! ```text
//! Exchange (buffered inbound request)
//!     → request.rs (strip hop-by-hop, re-target, keep upgrade intent)
//!     → hyper client (HTTP/1)
//!     → 101? upgrade.rs (verify tokens, hijack, bidirectional relay)
//!     → else response.rs (strip hop-by-hop, flush policy, trailers)
//!     → Exchange response
//! ```
//!
//! # Design Decisions
//! - No retries; one attempt per exchange
//! - The call timeout bounds the wait for the response head, not the body
//! - Upgrade tokens are validated before any connection is hijacked

pub mod buffer;
pub mod hop;
pub mod request;
pub mod response;
pub mod upgrade;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{CONNECTION, UPGRADE};
use axum::http::{HeaderValue, Response, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::config::ProxySettings;
use crate::error::{GatewayError, GatewayResult, RpcCode};
use crate::protocol::{Call, ClientTransport, Exchange, RspBody};

use buffer::BufferPool;
use request::{outbound_request, Outbound};

/// Client transport for the `http` protocol.
#[derive(Debug, Clone)]
pub struct ReverseProxy {
    client: Client<HttpConnector, Body>,
    flush_interval: Duration,
    buffers: Arc<BufferPool>,
}

impl ReverseProxy {
    pub fn new(settings: &ProxySettings) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_millis(settings.connect_timeout_ms)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            flush_interval: Duration::from_millis(settings.flush_interval_ms),
            buffers: Arc::new(BufferPool::new(settings.buffer_size)),
        }
    }

    /// Answer the caller with 101 and relay bytes once both sides upgrade.
    fn switch_protocols(
        &self,
        exchange: &mut Exchange,
        requested: Option<&str>,
        mut response: Response<hyper::body::Incoming>,
    ) -> GatewayResult<()> {
        let token = upgrade::check_switch(requested, response.headers())?;
        let token = HeaderValue::from_str(&token)
            .map_err(|e| GatewayError::invalid_request(format!("upgrade token: {e}")))?;

        let caller = exchange.take_upgrade().ok_or_else(|| {
            GatewayError::framework(
                RpcCode::SERVER_SYSTEM_ERR,
                "inbound connection does not support hijacking",
            )
        })?;
        let backend = hyper::upgrade::on(&mut response);

        let mut headers = response.headers().clone();
        hop::strip_hop_by_hop(&mut headers);
        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(UPGRADE, token);

        let mut switching = Response::new(Body::empty());
        *switching.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
        *switching.headers_mut() = headers;

        tracing::debug!(request_id = %exchange.id(), "Switching protocols, hijacking connection");
        tokio::spawn(upgrade::hijack(caller, backend, exchange.id().to_string()));

        exchange.set_response(switching);
        Ok(())
    }
}

fn classify(err: hyper_util::client::legacy::Error) -> GatewayError {
    if err.is_connect() {
        GatewayError::transport(RpcCode::CLIENT_CONNECT_FAIL, format!("connect backend: {err}"))
    } else {
        GatewayError::transport(RpcCode::CLIENT_NET_ERR, format!("backend request: {err}"))
    }
}

#[async_trait]
impl ClientTransport for ReverseProxy {
    async fn round_trip(
        &self,
        exchange: &mut Exchange,
        call: &Call<'_>,
        _rsp: &mut RspBody,
    ) -> GatewayResult<()> {
        let Outbound { request, upgrade } =
            outbound_request(&exchange.request, call.payload.clone(), &call.target.address)?;
        let timeout = call.timeout();

        tracing::debug!(
            request_id = %exchange.id(),
            method = %request.method(),
            uri = %request.uri(),
            upgrade = ?upgrade,
            "Proxying request"
        );

        let response = match tokio::time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(classify(e)),
            Err(_) => {
                return Err(GatewayError::transport(
                    RpcCode::CLIENT_INVOKE_TIMEOUT,
                    format!("backend did not answer within {timeout:?}"),
                ))
            }
        };

        if response.status() == StatusCode::SWITCHING_PROTOCOLS {
            return self.switch_protocols(exchange, upgrade.as_deref(), response);
        }

        let response = response::forward_response(
            response,
            self.flush_interval,
            self.buffers.clone(),
            exchange.id(),
        )
        .await?;
        exchange.set_response(response);
        Ok(())
    }
}
