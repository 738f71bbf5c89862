//! `http` protocol handler: plain reverse proxying.
//!
//! The transport streams the backend response straight into the exchange,
//! so the placeholder stays empty and the response stage only publishes the
//! head (or answers an absorbed business error).

use std::sync::Arc;

use axum::http::Method;
use bytes::Bytes;

use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{
    absorb_business_error, publish_response_head, respond_business_error, CallOptions,
    ClientTransport, Exchange, Header, HeaderBundle, ProtocolHandler, RspBody, Serialization,
};

pub struct HttpHandler {
    transport: Arc<dyn ClientTransport>,
}

impl HttpHandler {
    pub fn new(transport: Arc<dyn ClientTransport>) -> Self {
        Self { transport }
    }
}

impl ProtocolHandler for HttpHandler {
    fn with_ctx(&self, exchange: &mut Exchange) -> GatewayResult<()> {
        exchange.install_bundle(HeaderBundle::Http(Header::default()))
    }

    fn cli_options(&self, _exchange: &Exchange) -> GatewayResult<CallOptions> {
        Ok(CallOptions {
            transport: Some(self.transport.clone()),
            ..CallOptions::default()
        })
    }

    fn trans_req_body(&self, exchange: &mut Exchange) -> GatewayResult<Option<Bytes>> {
        let method = &exchange.request.method;
        let payload = if *method == Method::GET || *method == Method::HEAD || exchange.body.is_empty() {
            None
        } else {
            Some(exchange.body.clone())
        };

        let header = exchange
            .header_mut()
            .ok_or_else(|| GatewayError::invalid_request("http handler ran without its header"))?;
        header.serialization = Serialization::Noop;
        header.req_body = payload.clone();
        Ok(payload)
    }

    fn trans_rsp_body(&self, _exchange: &mut Exchange) -> GatewayResult<RspBody> {
        Ok(RspBody::Streamed)
    }

    fn handle_err(&self, exchange: &mut Exchange, err: GatewayError) -> GatewayResult<()> {
        absorb_business_error(exchange, err)
    }

    fn handle_rsp_body(&self, exchange: &mut Exchange, _rsp: RspBody) -> GatewayResult<()> {
        if respond_business_error(exchange)? {
            return Ok(());
        }
        publish_response_head(exchange)
    }
}
