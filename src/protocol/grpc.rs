//! `grpc` protocol handler.
//!
//! Inbound HTTP semantics travel as reserved metadata: every header, URL
//! encoded, under one key and the raw query string under another. The body
//! is forwarded untouched; the transport stores the reply in the bundle.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::{GatewayError, GatewayResult};
use crate::grpc::metadata::{encode_headers, HTTP_HEADER_KEY, HTTP_QUERY_KEY};
use crate::protocol::{
    absorb_business_error, metadata_headers, respond_business_error, respond_bytes, CallOptions,
    ClientTransport, Exchange, GrpcHeader, HeaderBundle, ProtocolHandler, RspBody, Serialization,
};

pub struct GrpcHandler {
    transport: Arc<dyn ClientTransport>,
}

impl GrpcHandler {
    pub fn new(transport: Arc<dyn ClientTransport>) -> Self {
        Self { transport }
    }
}

impl ProtocolHandler for GrpcHandler {
    fn with_ctx(&self, exchange: &mut Exchange) -> GatewayResult<()> {
        exchange.install_bundle(HeaderBundle::Grpc(GrpcHeader::default()))
    }

    fn cli_options(&self, _exchange: &Exchange) -> GatewayResult<CallOptions> {
        Ok(CallOptions {
            transport: Some(self.transport.clone()),
            capture_rsp_metadata: true,
            ..CallOptions::default()
        })
    }

    fn trans_req_body(&self, exchange: &mut Exchange) -> GatewayResult<Option<Bytes>> {
        let headers = encode_headers(&exchange.request.headers);
        let query = exchange.request.uri.query().unwrap_or("").as_bytes().to_vec();
        let body = exchange.body.clone();

        let grpc = exchange
            .grpc_header_mut()
            .ok_or_else(|| GatewayError::invalid_request("grpc handler requires a grpc header"))?;
        let header = &mut grpc.header;
        header.req_metadata.insert(HTTP_HEADER_KEY.to_string(), headers.into_bytes());
        header.req_metadata.insert(HTTP_QUERY_KEY.to_string(), query);
        header.serialization = Serialization::Unsupported;
        header.req_body = Some(body.clone());
        Ok(Some(body))
    }

    fn trans_rsp_body(&self, _exchange: &mut Exchange) -> GatewayResult<RspBody> {
        Ok(RspBody::InBundle)
    }

    fn handle_err(&self, exchange: &mut Exchange, err: GatewayError) -> GatewayResult<()> {
        absorb_business_error(exchange, err)
    }

    fn handle_rsp_body(&self, exchange: &mut Exchange, _rsp: RspBody) -> GatewayResult<()> {
        if respond_business_error(exchange)? {
            return Ok(());
        }

        let header = exchange
            .header()
            .ok_or_else(|| GatewayError::invalid_request("grpc handler requires a grpc header"))?;
        let body = header.rsp_body.clone().unwrap_or_default();
        let extra = metadata_headers(&header.rsp_metadata);

        respond_bytes(exchange, "application/json", body, extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grpc::metadata::decode_headers;
    use crate::protocol::{Call, Header};
    use async_trait::async_trait;
    use axum::http::header::CONTENT_TYPE;
    use axum::http::Request;

    struct Unused;

    #[async_trait]
    impl ClientTransport for Unused {
        async fn round_trip(&self, _: &mut Exchange, _: &Call<'_>, _: &mut RspBody) -> GatewayResult<()> {
            Ok(())
        }
    }

    fn exchange() -> Exchange {
        let (parts, _) = Request::builder()
            .method("POST")
            .uri("/shop.Orders/Get?region=eu&debug")
            .header("authorization", "Bearer t")
            .header("x-tag", "a")
            .header("x-tag", "b")
            .body(())
            .unwrap()
            .into_parts();
        Exchange::new(parts, Bytes::from_static(br#"{"id":9}"#))
    }

    #[test]
    fn request_semantics_travel_as_metadata() {
        let handler = GrpcHandler::new(Arc::new(Unused));
        let mut ex = exchange();
        handler.with_ctx(&mut ex).unwrap();

        let payload = handler.trans_req_body(&mut ex).unwrap().unwrap();
        assert_eq!(payload.as_ref(), br#"{"id":9}"#);

        let header = ex.header().unwrap();
        assert_eq!(header.serialization, Serialization::Unsupported);
        assert_eq!(header.req_body.as_deref(), Some(&br#"{"id":9}"#[..]));
        assert_eq!(&header.req_metadata[HTTP_QUERY_KEY], b"region=eu&debug");

        let encoded = String::from_utf8(header.req_metadata[HTTP_HEADER_KEY].to_vec()).unwrap();
        let decoded = decode_headers(&encoded).unwrap();
        assert_eq!(decoded["authorization"], "Bearer t");
        let tags: Vec<_> = decoded.get_all("x-tag").iter().collect();
        assert_eq!(tags, vec!["a", "b"]);
    }

    #[test]
    fn requires_grpc_bundle() {
        let handler = GrpcHandler::new(Arc::new(Unused));
        let mut ex = exchange();
        assert!(handler.trans_req_body(&mut ex).is_err());

        ex.install_bundle(HeaderBundle::Http(Header::default())).unwrap();
        assert!(handler.with_ctx(&mut ex).is_err());
    }

    #[test]
    fn reply_comes_from_the_bundle() {
        let handler = GrpcHandler::new(Arc::new(Unused));
        let mut ex = exchange();
        handler.with_ctx(&mut ex).unwrap();
        {
            let grpc = ex.grpc_header_mut().unwrap();
            grpc.header.rsp_body = Some(Bytes::from_static(br#"{"total":3}"#));
            grpc.header.rsp_metadata.insert("x-served-by".into(), b"orders-2".to_vec());
            grpc.header.rsp_metadata.insert("content-type".into(), b"application/grpc".to_vec());
        }

        handler.handle_rsp_body(&mut ex, RspBody::InBundle).unwrap();
        let head = ex.upstream_head().unwrap();
        assert_eq!(head.headers["x-served-by"], "orders-2");
        assert_eq!(head.headers[CONTENT_TYPE], "application/json");
    }
}
