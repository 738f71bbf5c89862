//! Exchange-scoped state.
//!
//! # Responsibilities
//! - Hold the inbound request head and its fully buffered body
//! - Keep the pending inbound upgrade so a transport can hijack the connection
//! - Carry the per-protocol header bundle between lifecycle stages
//! - Collect the response, the published upstream head and any absorbed business error
//!
//! # Design Decisions
//! - The header bundle is a tagged variant; each handler only touches its own tag
//! - The exchange is created at request start and dropped at request end

use std::collections::BTreeMap;

use axum::body::Body;
use axum::http::{request, HeaderMap, Request, Response, StatusCode, Version};
use bytes::Bytes;
use hyper::upgrade::OnUpgrade;
use tonic::metadata::MetadataMap;

use crate::error::{ErrorKind, GatewayError, GatewayResult, RpcCode};
use crate::protocol::Serialization;

/// Multi-valued metadata keyed by lowercase name. Values of one key keep
/// their arrival order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Metadata {
    entries: BTreeMap<String, Vec<Vec<u8>>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every value of `key` with `value`.
    pub fn insert(&mut self, key: String, value: Vec<u8>) {
        self.entries.insert(key, vec![value]);
    }

    /// Add `value` after any existing values of `key`.
    pub fn append(&mut self, key: String, value: Vec<u8>) {
        self.entries.entry(key).or_default().push(value);
    }

    /// First value of `key`.
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries
            .get(key)
            .and_then(|values| values.first())
            .map(Vec::as_slice)
    }

    pub fn get_all(&self, key: &str) -> &[Vec<u8>] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every `(key, value)` pair, repeated keys once per value.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> + '_ {
        self.entries.iter().flat_map(|(key, values)| {
            values.iter().map(move |value| (key.as_str(), value.as_slice()))
        })
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::ops::Index<&str> for Metadata {
    type Output = [u8];

    /// First value of `key`; panics when the key is absent, like `HeaderMap`.
    fn index(&self, key: &str) -> &[u8] {
        match self.get(key) {
            Some(value) => value,
            None => panic!("no metadata entry for {key}"),
        }
    }
}

/// Protocol-neutral part of the header bundle.
#[derive(Debug, Default, Clone)]
pub struct Header {
    /// Serialization the outbound call should use.
    pub serialization: Serialization,
    /// Outbound request bytes.
    pub req_body: Option<Bytes>,
    /// Response bytes, set by the transport after a successful call.
    pub rsp_body: Option<Bytes>,
    /// Metadata sent with the outbound call.
    pub req_metadata: Metadata,
    /// Metadata received with the response.
    pub rsp_metadata: Metadata,
}

/// gRPC bundle: the common header plus the raw response metadata.
#[derive(Debug, Default)]
pub struct GrpcHeader {
    pub header: Header,
    pub rsp_md: MetadataMap,
}

/// One variant per protocol, consumed only by that protocol's handler.
#[derive(Debug)]
pub enum HeaderBundle {
    Http(Header),
    Rpc(Header),
    Grpc(GrpcHeader),
    Raw(Header),
}

impl HeaderBundle {
    pub fn protocol(&self) -> &'static str {
        match self {
            HeaderBundle::Http(_) => "http",
            HeaderBundle::Rpc(_) => "rpc",
            HeaderBundle::Grpc(_) => "grpc",
            HeaderBundle::Raw(_) => "raw",
        }
    }

    pub fn header(&self) -> &Header {
        match self {
            HeaderBundle::Http(h) | HeaderBundle::Rpc(h) | HeaderBundle::Raw(h) => h,
            HeaderBundle::Grpc(g) => &g.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut Header {
        match self {
            HeaderBundle::Http(h) | HeaderBundle::Rpc(h) | HeaderBundle::Raw(h) => h,
            HeaderBundle::Grpc(g) => &mut g.header,
        }
    }
}

/// Copy of the upstream response head, published for post hooks.
#[derive(Debug, Clone)]
pub struct UpstreamHead {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
}

/// One inbound request/response cycle.
#[derive(Debug)]
pub struct Exchange {
    id: String,
    pub request: request::Parts,
    pub body: Bytes,
    upgrade: Option<OnUpgrade>,
    bundle: Option<HeaderBundle>,
    response: Option<Response<Body>>,
    upstream_head: Option<UpstreamHead>,
    business_error: Option<GatewayError>,
}

impl Exchange {
    /// Build an exchange from an already buffered request.
    pub fn new(mut request: request::Parts, body: Bytes) -> Self {
        let upgrade = request.extensions.remove::<OnUpgrade>();
        let id = request
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Self {
            id,
            request,
            body,
            upgrade,
            bundle: None,
            response: None,
            upstream_head: None,
            business_error: None,
        }
    }

    /// Buffer the inbound body (bounded by `limit`) and build the exchange.
    pub async fn from_request(request: Request<Body>, limit: usize) -> GatewayResult<Self> {
        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, limit).await.map_err(|e| {
            GatewayError::new(
                ErrorKind::Request,
                RpcCode::SERVER_DECODE_FAIL,
                format!("read request body: {e}"),
            )
        })?;
        Ok(Self::new(parts, body))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Take the inbound upgrade handle; only one transport may hijack.
    pub fn take_upgrade(&mut self) -> Option<OnUpgrade> {
        self.upgrade.take()
    }

    /// Install a bundle, keeping one of the same protocol that a pre hook already
    /// populated. A bundle of another protocol means the context has the wrong type.
    pub fn install_bundle(&mut self, bundle: HeaderBundle) -> GatewayResult<()> {
        match &self.bundle {
            Some(existing) if existing.protocol() == bundle.protocol() => Ok(()),
            Some(existing) => Err(GatewayError::invalid_request(format!(
                "exchange carries a {} header, {} handler cannot run",
                existing.protocol(),
                bundle.protocol()
            ))),
            None => {
                self.bundle = Some(bundle);
                Ok(())
            }
        }
    }

    pub fn bundle(&self) -> Option<&HeaderBundle> {
        self.bundle.as_ref()
    }

    pub fn bundle_mut(&mut self) -> Option<&mut HeaderBundle> {
        self.bundle.as_mut()
    }

    /// The common header of the bundle, whichever variant is installed.
    pub fn header(&self) -> Option<&Header> {
        self.bundle.as_ref().map(HeaderBundle::header)
    }

    pub fn header_mut(&mut self) -> Option<&mut Header> {
        self.bundle.as_mut().map(HeaderBundle::header_mut)
    }

    pub fn grpc_header_mut(&mut self) -> Option<&mut GrpcHeader> {
        match self.bundle.as_mut() {
            Some(HeaderBundle::Grpc(g)) => Some(g),
            _ => None,
        }
    }

    pub fn set_response(&mut self, response: Response<Body>) {
        self.response = Some(response);
    }

    pub fn response(&self) -> Option<&Response<Body>> {
        self.response.as_ref()
    }

    pub fn take_response(&mut self) -> Option<Response<Body>> {
        self.response.take()
    }

    pub fn publish_upstream_head(&mut self, head: UpstreamHead) {
        self.upstream_head = Some(head);
    }

    pub fn upstream_head(&self) -> Option<&UpstreamHead> {
        self.upstream_head.as_ref()
    }

    pub fn set_business_error(&mut self, err: GatewayError) {
        self.business_error = Some(err);
    }

    pub fn business_error(&self) -> Option<&GatewayError> {
        self.business_error.as_ref()
    }

    /// Inbound content type without parameters, empty when absent.
    pub fn content_type(&self) -> &str {
        self.request
            .headers
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::trim)
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange() -> Exchange {
        let (parts, _) = Request::builder()
            .uri("/orders?id=7")
            .header("x-request-id", "req-1")
            .header("content-type", "application/json; charset=utf-8")
            .body(())
            .unwrap()
            .into_parts();
        Exchange::new(parts, Bytes::from_static(b"{}"))
    }

    #[test]
    fn reads_request_id_and_content_type() {
        let ex = exchange();
        assert_eq!(ex.id(), "req-1");
        assert_eq!(ex.content_type(), "application/json");
    }

    #[test]
    fn same_protocol_bundle_is_kept() {
        let mut ex = exchange();
        let mut header = Header::default();
        header.req_metadata.insert("tenant".into(), b"a".to_vec());
        ex.install_bundle(HeaderBundle::Rpc(header)).unwrap();
        ex.install_bundle(HeaderBundle::Rpc(Header::default())).unwrap();
        assert_eq!(
            ex.header().unwrap().req_metadata.get("tenant"),
            Some(&b"a"[..])
        );
    }

    #[test]
    fn metadata_keeps_every_value_in_order() {
        let mut md = Metadata::new();
        md.append("set-cookie".into(), b"a=1".to_vec());
        md.append("set-cookie".into(), b"b=2".to_vec());
        md.insert("x-shard".into(), b"1".to_vec());
        md.insert("x-shard".into(), b"2".to_vec());

        assert_eq!(md.get_all("set-cookie"), &[b"a=1".to_vec(), b"b=2".to_vec()]);
        assert_eq!(&md["set-cookie"], b"a=1");
        assert_eq!(md.get_all("x-shard"), &[b"2".to_vec()]);
        assert_eq!(md.iter().count(), 3);
        assert!(md.get_all("missing").is_empty());
    }

    #[test]
    fn foreign_bundle_is_rejected() {
        let mut ex = exchange();
        ex.install_bundle(HeaderBundle::Http(Header::default())).unwrap();
        let err = ex
            .install_bundle(HeaderBundle::Grpc(GrpcHeader::default()))
            .unwrap_err();
        assert_eq!(err.code, RpcCode::INVALID_REQUEST);
        assert!(ex.grpc_header_mut().is_none());
    }
}
