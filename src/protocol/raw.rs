//! `raw` protocol: bytes in, bytes out over a plain TCP connection.
//!
//! The transport writes the buffered request body, half-closes the
//! connection and reads the reply until the peer closes, all within the
//! call timeout.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{GatewayError, GatewayResult, RpcCode};
use crate::protocol::{
    absorb_business_error, respond_business_error, respond_bytes, Call, CallOptions,
    ClientTransport, Exchange, Header, HeaderBundle, ProtocolHandler, RspBody, Serialization,
};

pub struct RawHandler {
    transport: Arc<dyn ClientTransport>,
}

impl RawHandler {
    pub fn new(transport: Arc<dyn ClientTransport>) -> Self {
        Self { transport }
    }
}

impl ProtocolHandler for RawHandler {
    fn with_ctx(&self, exchange: &mut Exchange) -> GatewayResult<()> {
        exchange.install_bundle(HeaderBundle::Raw(Header::default()))
    }

    fn cli_options(&self, _exchange: &Exchange) -> GatewayResult<CallOptions> {
        Ok(CallOptions {
            transport: Some(self.transport.clone()),
            ..CallOptions::default()
        })
    }

    fn trans_req_body(&self, exchange: &mut Exchange) -> GatewayResult<Option<Bytes>> {
        let payload = (!exchange.body.is_empty()).then(|| exchange.body.clone());
        let header = exchange
            .header_mut()
            .ok_or_else(|| GatewayError::invalid_request("raw handler ran without its header"))?;
        header.serialization = Serialization::Noop;
        header.req_body = payload.clone();
        Ok(payload)
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
        let body = match rsp {
            RspBody::Bytes(Some(bytes)) => bytes,
            _ => Bytes::new(),
        };
        respond_bytes(
            exchange,
            Serialization::Noop.response_content_type(),
            body,
            Default::default(),
        )
    }
}

/// One TCP connection per call.
#[derive(Debug, Clone, Default)]
pub struct RawTcpTransport;

impl RawTcpTransport {
    async fn exchange_bytes(address: &str, payload: Option<Bytes>) -> GatewayResult<Vec<u8>> {
        let mut stream = TcpStream::connect(address).await.map_err(|e| {
            GatewayError::transport(RpcCode::CLIENT_CONNECT_FAIL, format!("connect {address}: {e}"))
        })?;
        let net_err =
            |e: std::io::Error| GatewayError::transport(RpcCode::CLIENT_NET_ERR, format!("{address}: {e}"));

        if let Some(payload) = payload {
            stream.write_all(&payload).await.map_err(net_err)?;
        }
        stream.shutdown().await.map_err(net_err)?;

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.map_err(net_err)?;
        Ok(reply)
    }
}

#[async_trait]
impl ClientTransport for RawTcpTransport {
    async fn round_trip(
        &self,
        exchange: &mut Exchange,
        call: &Call<'_>,
        rsp: &mut RspBody,
    ) -> GatewayResult<()> {
        let timeout = call.timeout();
        let address = call.target.address.as_str();

        tracing::debug!(request_id = %exchange.id(), target = %address, "Raw exchange");

        let reply = tokio::time::timeout(timeout, Self::exchange_bytes(address, call.payload.clone()))
            .await
            .map_err(|_| {
                GatewayError::transport(
                    RpcCode::CLIENT_INVOKE_TIMEOUT,
                    format!("{address} did not answer within {timeout:?}"),
                )
            })??;

        let reply = Bytes::from(reply);
        if let Some(header) = exchange.header_mut() {
            header.rsp_body = Some(reply.clone());
        }
        *rsp = RspBody::Bytes(Some(reply));
        Ok(())
    }
}
