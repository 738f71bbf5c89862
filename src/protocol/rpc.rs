//! `rpc` protocol handler: HTTP in front of the host RPC stack.
//!
//! # Responsibilities
//! - Pick the outbound serialization from the inbound method and content type
//! - Hand the raw body (or query string for GET) to the RPC transport
//! - Write the RPC reply back with the matching content type and response metadata
//!
//! The RPC transport itself belongs to the host stack; it is resolved from the
//! gateway's transport table unless the handler was built with one.

use std::sync::Arc;

use axum::http::{HeaderMap, Method};
use bytes::Bytes;

use crate::error::{ErrorKind, GatewayError, GatewayResult, RpcCode};
use crate::protocol::{
    absorb_business_error, metadata_headers, respond_business_error, respond_bytes, CallOptions,
    ClientTransport, Exchange, Header, HeaderBundle, ProtocolHandler, RspBody, Serialization,
};

#[derive(Default)]
pub struct RpcHandler {
    transport: Option<Arc<dyn ClientTransport>>,
}

impl RpcHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(transport: Arc<dyn ClientTransport>) -> Self {
        Self {
            transport: Some(transport),
        }
    }
}

/// Serialization for a non-GET request with the given content type.
pub fn serialization_for(content_type: &str) -> GatewayResult<Serialization> {
    match content_type {
        "" | "application/json" => Ok(Serialization::Json),
        "application/x-www-form-urlencoded" => Ok(Serialization::Form),
        "application/protobuf" | "application/x-protobuf" => Ok(Serialization::Protobuf),
        other => Err(GatewayError::new(
            ErrorKind::Request,
            RpcCode::SERVER_DECODE_FAIL,
            format!("unsupported content type: {other}"),
        )),
    }
}

impl ProtocolHandler for RpcHandler {
    fn with_ctx(&self, exchange: &mut Exchange) -> GatewayResult<()> {
        exchange.install_bundle(HeaderBundle::Rpc(Header::default()))
    }

    fn cli_options(&self, _exchange: &Exchange) -> GatewayResult<CallOptions> {
        Ok(CallOptions {
            transport: self.transport.clone(),
            capture_rsp_metadata: true,
            ..CallOptions::default()
        })
    }

    fn trans_req_body(&self, exchange: &mut Exchange) -> GatewayResult<Option<Bytes>> {
        let (serialization, payload) = if exchange.request.method == Method::GET {
            let query = exchange.request.uri.query().unwrap_or("");
            (Serialization::Get, Bytes::copy_from_slice(query.as_bytes()))
        } else {
            (serialization_for(exchange.content_type())?, exchange.body.clone())
        };

        let header = exchange
            .header_mut()
            .ok_or_else(|| GatewayError::invalid_request("rpc handler ran without its header"))?;
        header.serialization = serialization;
        header.req_body = Some(payload.clone());
        Ok(Some(payload))
    }

    fn trans_rsp_body(&self, _exchange: &mut Exchange) -> GatewayResult<RspBody> {
        Ok(RspBody::Bytes(None))
    }

    fn handle_err(&self, exchange: &mut Exchange, err: GatewayError) -> GatewayResult<()> {
        absorb_business_error(exchange, err)
    }

    fn handle_rsp_body(&self, exchange: &mut Exchange, rsp: RspBody) -> GatewayResult<()> {
        if respond_business_error(exchange)? {
            return Ok(());
        }

        let (serialization, in_header, extra) = match exchange.header() {
            Some(header) => (
                header.serialization,
                header.rsp_body.clone(),
                metadata_headers(&header.rsp_metadata),
            ),
            None => (Serialization::Json, None, HeaderMap::new()),
        };
        let body = match rsp {
            RspBody::Bytes(Some(bytes)) => bytes,
            _ => in_header.unwrap_or_default(),
        };

        respond_bytes(exchange, serialization.response_content_type(), body, extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::CONTENT_TYPE;
    use axum::http::Request;

    fn exchange(method: Method, uri: &str, content_type: Option<&str>, body: &'static str) -> Exchange {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header(CONTENT_TYPE, ct);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        Exchange::new(parts, Bytes::from_static(body.as_bytes()))
    }

    #[test]
    fn json_post_passes_body_through() {
        let handler = RpcHandler::new();
        let mut ex = exchange(Method::POST, "/user.Get", Some("application/json"), r#"{"id":1}"#);
        handler.with_ctx(&mut ex).unwrap();

        let payload = handler.trans_req_body(&mut ex).unwrap().unwrap();
        assert_eq!(payload.as_ref(), br#"{"id":1}"#);
        assert_eq!(ex.header().unwrap().serialization, Serialization::Json);
    }

    #[test]
    fn get_sends_raw_query() {
        let handler = RpcHandler::new();
        let mut ex = exchange(Method::GET, "/user.Get?id=1&name=a%20b", None, "");
        handler.with_ctx(&mut ex).unwrap();

        let payload = handler.trans_req_body(&mut ex).unwrap().unwrap();
        assert_eq!(payload.as_ref(), b"id=1&name=a%20b");
        assert_eq!(ex.header().unwrap().serialization, Serialization::Get);
    }

    #[test]
    fn empty_content_type_defaults_to_json_both_ways() {
        let handler = RpcHandler::new();
        let mut ex = exchange(Method::POST, "/user.Get", None, "{}");
        handler.with_ctx(&mut ex).unwrap();
        handler.trans_req_body(&mut ex).unwrap();
        assert_eq!(ex.header().unwrap().serialization, Serialization::Json);

        let rsp = RspBody::Bytes(Some(Bytes::from_static(b"{\"ok\":true}")));
        handler.handle_rsp_body(&mut ex, rsp).unwrap();
        let response = ex.response().unwrap();
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(ex.upstream_head().unwrap().headers[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn form_and_protobuf_recognised() {
        assert_eq!(
            serialization_for("application/x-www-form-urlencoded").unwrap(),
            Serialization::Form
        );
        assert_eq!(
            serialization_for("application/x-protobuf").unwrap(),
            Serialization::Protobuf
        );
    }

    #[test]
    fn unsupported_content_aborts() {
        let handler = RpcHandler::new();
        let mut ex = exchange(Method::POST, "/user.Get", Some("text/xml"), "<a/>");
        handler.with_ctx(&mut ex).unwrap();
        let err = handler.trans_req_body(&mut ex).unwrap_err();
        assert_eq!(err.code, RpcCode::SERVER_DECODE_FAIL);
        assert_eq!(err.kind, ErrorKind::Request);
    }

    #[test]
    fn response_metadata_becomes_headers() {
        let handler = RpcHandler::new();
        let mut ex = exchange(Method::POST, "/user.Get", None, "{}");
        handler.with_ctx(&mut ex).unwrap();
        handler.trans_req_body(&mut ex).unwrap();
        {
            let header = ex.header_mut().unwrap();
            header.rsp_metadata.insert("x-shard".into(), b"7".to_vec());
            header.rsp_body = Some(Bytes::from_static(b"[]"));
        }

        handler.handle_rsp_body(&mut ex, RspBody::Bytes(None)).unwrap();
        let response = ex.response().unwrap();
        assert_eq!(response.headers()["x-shard"], "7");
    }
}
