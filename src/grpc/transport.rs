//! gRPC client transport.
//!
//! # Data Flow
//! ```text
//! gRPC bundle (req_body, req_metadata)
//!     → outgoing metadata (no `connection`)
//!     → pooled channel, content-type application/grpc+json
//!     → unary call with the passthrough codec, bounded by the call timeout
//!     → bundle (rsp_body, rsp_metadata, rsp_md)
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::header::CONTENT_TYPE;
use axum::http::uri::PathAndQuery;
use axum::http::HeaderValue;
use tonic::body::BoxBody;
use tonic::{Code, Status};
use tower::ServiceBuilder;

use crate::error::{GatewayError, GatewayResult, RpcCode};
use crate::grpc::codec::{GatewayCodec, Payload, CONTENT_SUBTYPE};
use crate::grpc::metadata::{incoming_metadata, outgoing_metadata};
use crate::grpc::pool::ChannelSource;
use crate::protocol::{Call, ClientTransport, Exchange, RspBody};

#[derive(Clone)]
pub struct GrpcTransport {
    source: Arc<dyn ChannelSource>,
}

impl GrpcTransport {
    pub fn new(source: Arc<dyn ChannelSource>) -> Self {
        Self { source }
    }
}

impl std::fmt::Debug for GrpcTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcTransport").finish_non_exhaustive()
    }
}

/// Map a call status to a transport error.
pub fn classify_status(status: &Status) -> GatewayError {
    let code = match status.code() {
        Code::DeadlineExceeded => RpcCode::CLIENT_INVOKE_TIMEOUT,
        Code::Cancelled => RpcCode::CLIENT_CANCELED,
        _ => RpcCode::CLIENT_NET_ERR,
    };
    GatewayError::transport(code, format!("grpc {}: {}", status.code(), status.message()))
}

#[async_trait]
impl ClientTransport for GrpcTransport {
    async fn round_trip(
        &self,
        exchange: &mut Exchange,
        call: &Call<'_>,
        _rsp: &mut RspBody,
    ) -> GatewayResult<()> {
        let method = call.method(exchange).to_string();
        let path = PathAndQuery::try_from(method.as_str())
            .map_err(|e| GatewayError::invalid_request(format!("grpc method {method}: {e}")))?;
        let timeout = call.timeout();
        let request_id = exchange.id().to_string();

        let grpc = exchange.grpc_header_mut().ok_or_else(|| {
            GatewayError::invalid_request("grpc transport requires a grpc header bundle")
        })?;
        let payload = grpc
            .header
            .req_body
            .clone()
            .or_else(|| call.payload.clone())
            .unwrap_or_default();

        let mut request = tonic::Request::new(Payload::Bytes(payload));
        *request.metadata_mut() = outgoing_metadata(&grpc.header.req_metadata)?;
        request.set_timeout(timeout);

        let channel = self.source.get(&call.target.address).await?;
        let content_type = HeaderValue::from_str(&format!("application/grpc+{CONTENT_SUBTYPE}"))
            .map_err(|e| GatewayError::framework(RpcCode::CLIENT_ENCODE_FAIL, e.to_string()))?;
        let service = ServiceBuilder::new()
            .map_request(move |mut req: axum::http::Request<BoxBody>| {
                req.headers_mut().insert(CONTENT_TYPE, content_type.clone());
                req
            })
            .service(channel);
        let mut client = tonic::client::Grpc::new(service);

        tracing::debug!(
            request_id = %request_id,
            target = %call.target.address,
            method = %method,
            "Invoking grpc method"
        );

        let invoke = async {
            client
                .ready()
                .await
                .map_err(|e| Status::unavailable(format!("channel not ready: {e}")))?;
            client.unary(request, path, GatewayCodec).await
        };

        let response = match tokio::time::timeout(timeout, invoke).await {
            Ok(Ok(response)) => response,
            Ok(Err(status)) => return Err(classify_status(&status)),
            Err(_) => {
                return Err(GatewayError::transport(
                    RpcCode::CLIENT_INVOKE_TIMEOUT,
                    format!("grpc {method} did not answer within {timeout:?}"),
                ))
            }
        };

        let (md, body, _) = response.into_parts();
        grpc.header.rsp_metadata = incoming_metadata(&md);
        grpc.header.rsp_body = Some(body);
        grpc.rsp_md = md;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(
            classify_status(&Status::deadline_exceeded("slow")).code,
            RpcCode::CLIENT_INVOKE_TIMEOUT
        );
        assert_eq!(
            classify_status(&Status::cancelled("gone")).code,
            RpcCode::CLIENT_CANCELED
        );
        let err = classify_status(&Status::unavailable("down"));
        assert_eq!(err.code, RpcCode::CLIENT_NET_ERR);
        assert_eq!(err.kind, crate::error::ErrorKind::Transport);
    }
}
