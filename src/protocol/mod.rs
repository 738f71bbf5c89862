//! Protocol transformation subsystem.
//!
//! # Data Flow
//! ```text
//! Exchange (inbound HTTP)
//!     → registry.rs (protocol name → handler)
//!     → handler.with_ctx         install the protocol's header bundle
//!     → handler.cli_options      static call options
//!     → handler.trans_req_body   inbound body → outbound payload
//!     → handler.trans_rsp_body   placeholder for the call result
//!     → ClientTransport::round_trip (proxy, grpc, raw, or host RPC stack)
//!     → handler.handle_err       only when the call failed
//!     → handler.handle_rsp_body  write response, publish upstream head
//! ```
//!
//! # Design Decisions
//! - Handlers are synchronous; only the transport awaits the network
//! - The transport comes from the call options or the gateway's table
//! - Business errors become a 200 carrying the code and message as headers

pub mod exchange;
pub mod grpc;
pub mod http;
pub mod raw;
pub mod registry;
pub mod rpc;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Response, StatusCode};
use bytes::Bytes;

use crate::error::{GatewayError, GatewayResult};

pub use exchange::{Exchange, GrpcHeader, Header, HeaderBundle, Metadata, UpstreamHead};
pub use registry::ProtocolRegistry;

/// Response header carrying the RPC code of an error.
pub const HEADER_RET_CODE: &str = "x-gateway-ret-code";
/// Response header carrying the URL-encoded error message.
pub const HEADER_RET_MSG: &str = "x-gateway-ret-msg";

/// Serialization used for the outbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Serialization {
    Json,
    /// GET semantics: the payload is the raw query string.
    Get,
    Form,
    Protobuf,
    /// Bytes pass through untouched.
    #[default]
    Noop,
    /// The framework must not encode; the transport owns the bytes.
    Unsupported,
}

impl Serialization {
    /// Content type written back to the inbound caller.
    pub fn response_content_type(&self) -> &'static str {
        match self {
            Serialization::Protobuf => "application/protobuf",
            Serialization::Noop | Serialization::Unsupported => "application/octet-stream",
            Serialization::Json | Serialization::Get | Serialization::Form => "application/json",
        }
    }
}

/// Downstream address and per-route call parameters.
#[derive(Debug, Clone)]
pub struct Target {
    pub address: String,
    /// RPC method or gRPC path; the inbound path is used when absent.
    pub method: Option<String>,
    pub timeout: Duration,
}

/// Static options a handler supplies for its outbound call.
#[derive(Clone, Default)]
pub struct CallOptions {
    /// Overrides the route timeout.
    pub timeout: Option<Duration>,
    /// Transport owned by the handler; falls back to the gateway table.
    pub transport: Option<Arc<dyn ClientTransport>>,
    /// Ask the transport to fill `Header::rsp_metadata`.
    pub capture_rsp_metadata: bool,
}

impl fmt::Debug for CallOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallOptions")
            .field("timeout", &self.timeout)
            .field("transport", &self.transport.is_some())
            .field("capture_rsp_metadata", &self.capture_rsp_metadata)
            .finish()
    }
}

/// Call envelope handed to a transport.
#[derive(Debug)]
pub struct Call<'a> {
    pub target: &'a Target,
    pub options: &'a CallOptions,
    pub payload: Option<Bytes>,
}

impl Call<'_> {
    pub fn timeout(&self) -> Duration {
        self.options.timeout.unwrap_or(self.target.timeout)
    }

    /// RPC method or gRPC path, defaulting to the inbound path.
    pub fn method<'e>(&'e self, exchange: &'e Exchange) -> &'e str {
        self.target
            .method
            .as_deref()
            .unwrap_or_else(|| exchange.request.uri.path())
    }
}

/// Placeholder the outbound call populates.
#[derive(Debug)]
pub enum RspBody {
    /// The transport streamed the response straight into the exchange.
    Streamed,
    /// Opaque payload bytes.
    Bytes(Option<Bytes>),
    /// The transport stores the result in the header bundle.
    InBundle,
}

/// Outbound call seam.
#[async_trait]
pub trait ClientTransport: Send + Sync {
    async fn round_trip(
        &self,
        exchange: &mut Exchange,
        call: &Call<'_>,
        rsp: &mut RspBody,
    ) -> GatewayResult<()>;
}

/// Capability set every downstream protocol implements, run in this order.
pub trait ProtocolHandler: Send + Sync {
    /// Prepare the exchange context; fails if it belongs to another protocol.
    fn with_ctx(&self, exchange: &mut Exchange) -> GatewayResult<()>;

    fn cli_options(&self, exchange: &Exchange) -> GatewayResult<CallOptions>;

    /// Outbound payload; `None` when the call carries no body.
    fn trans_req_body(&self, exchange: &mut Exchange) -> GatewayResult<Option<Bytes>>;

    fn trans_rsp_body(&self, exchange: &mut Exchange) -> GatewayResult<RspBody>;

    /// Absorb a business error or propagate anything else.
    fn handle_err(&self, exchange: &mut Exchange, err: GatewayError) -> GatewayResult<()>;

    /// Write the response and publish the upstream head.
    fn handle_rsp_body(&self, exchange: &mut Exchange, rsp: RspBody) -> GatewayResult<()>;
}

/// Record a business error on the exchange; everything else propagates.
pub fn absorb_business_error(exchange: &mut Exchange, err: GatewayError) -> GatewayResult<()> {
    if !err.is_business() {
        return Err(err);
    }
    tracing::debug!(
        request_id = %exchange.id(),
        code = %err.code,
        message = %err.message,
        "Business error absorbed"
    );
    exchange.set_business_error(err);
    Ok(())
}

/// Headers describing an error, message URL-encoded so any text fits.
pub fn error_headers(err: &GatewayError) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(HEADER_RET_CODE, HeaderValue::from(err.code.as_i32()));
    let message: String = url::form_urlencoded::byte_serialize(err.message.as_bytes()).collect();
    if let Ok(value) = HeaderValue::from_str(&message) {
        headers.insert(HEADER_RET_MSG, value);
    }
    headers
}

/// Success-looking response for an absorbed business error.
pub fn business_response(err: &GatewayError) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    *response.headers_mut() = error_headers(err);
    response
}

/// Response metadata that is valid as HTTP headers; the rest is dropped.
/// Framing headers belong to the downstream response and `grpc-*` keys to the
/// RPC status; neither is copied. Repeated keys keep every value.
pub fn metadata_headers(metadata: &Metadata) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (key, value) in metadata.iter() {
        if key.ends_with("-bin")
            || key.starts_with("grpc-")
            || key == "content-length"
            || key == "transfer-encoding"
        {
            continue;
        }
        let (Ok(name), Ok(value)) = (
            axum::http::HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_bytes(value),
        ) else {
            continue;
        };
        headers.append(name, value);
    }
    headers
}

/// Copy the head of the response under construction into the exchange.
pub(crate) fn publish_response_head(exchange: &mut Exchange) -> GatewayResult<()> {
    let head = exchange
        .response()
        .map(|response| UpstreamHead {
            status: response.status(),
            version: response.version(),
            headers: response.headers().clone(),
        })
        .ok_or_else(|| {
            GatewayError::framework(
                crate::error::RpcCode::SERVER_SYSTEM_ERR,
                "exchange reached the response stage without a response",
            )
        })?;
    exchange.publish_upstream_head(head);
    Ok(())
}

/// Answer an absorbed business error, if any. Returns whether it did.
pub(crate) fn respond_business_error(exchange: &mut Exchange) -> GatewayResult<bool> {
    let Some(err) = exchange.business_error() else {
        return Ok(false);
    };
    let response = business_response(err);
    exchange.set_response(response);
    publish_response_head(exchange)?;
    Ok(true)
}

/// Write `body` as a 200 with the given content type and publish the head.
pub(crate) fn respond_bytes(
    exchange: &mut Exchange,
    content_type: &str,
    body: Bytes,
    extra: HeaderMap,
) -> GatewayResult<()> {
    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.extend(extra);
    if let Ok(value) = HeaderValue::from_str(content_type) {
        headers.insert(axum::http::header::CONTENT_TYPE, value);
    }

    exchange.set_response(response);
    publish_response_head(exchange)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcCode;
    use axum::http::Request;

    fn exchange() -> Exchange {
        let (parts, _) = Request::builder().uri("/x").body(()).unwrap().into_parts();
        Exchange::new(parts, Bytes::new())
    }

    #[test]
    fn business_error_is_absorbed() {
        let mut ex = exchange();
        absorb_business_error(&mut ex, GatewayError::business(20001, "out of stock")).unwrap();
        let err = ex.business_error().unwrap();
        let response = business_response(err);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[HEADER_RET_CODE], "20001");
        assert_eq!(response.headers()[HEADER_RET_MSG], "out+of+stock");
    }

    #[test]
    fn framework_error_propagates() {
        let mut ex = exchange();
        let err = GatewayError::transport(RpcCode::CLIENT_NET_ERR, "reset");
        assert_eq!(absorb_business_error(&mut ex, err.clone()), Err(err));
        assert!(ex.business_error().is_none());
    }

    #[test]
    fn business_error_response_publishes_head() {
        let mut ex = exchange();
        assert!(!respond_business_error(&mut ex).unwrap());

        ex.set_business_error(GatewayError::business(20002, "quota"));
        assert!(respond_business_error(&mut ex).unwrap());
        let head = ex.upstream_head().unwrap();
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(head.headers[HEADER_RET_CODE], "20002");
    }

    #[test]
    fn metadata_headers_skip_binary_and_invalid() {
        let mut md = Metadata::new();
        md.insert("x-tenant".into(), b"acme".to_vec());
        md.insert("trace-bin".into(), vec![0xff]);
        md.insert("bad name".into(), b"v".to_vec());
        let headers = metadata_headers(&md);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["x-tenant"], "acme");
    }

    #[test]
    fn metadata_headers_keep_repeated_values_and_drop_rpc_status() {
        let mut md = Metadata::new();
        md.append("set-cookie".into(), b"a=1".to_vec());
        md.append("set-cookie".into(), b"b=2".to_vec());
        md.insert("grpc-status".into(), b"0".to_vec());
        md.insert("grpc-message".into(), b"ok".to_vec());
        md.insert("content-length".into(), b"12".to_vec());

        let headers = metadata_headers(&md);
        let cookies: Vec<_> = headers.get_all("set-cookie").iter().collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
        assert!(headers.get("grpc-status").is_none());
        assert!(headers.get("grpc-message").is_none());
        assert!(headers.get("content-length").is_none());
        assert_eq!(headers.len(), 2);
    }
}
