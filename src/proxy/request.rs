//! Inbound → outbound request conversion.
//!
//! # Responsibilities
//! - Copy method, version, Host, path and query, headers and the buffered body
//! - Strip hop-by-hop headers, re-adding upgrade and `TE: trailers` when needed
//! - Point the request at the downstream address

use axum::body::Body;
use axum::http::header::{CONNECTION, CONTENT_LENGTH, HOST, TE, UPGRADE};
use axum::http::{request, HeaderValue, Request, Uri, Version};
use bytes::Bytes;

use crate::error::{GatewayError, GatewayResult};
use crate::proxy::hop::{accepts_trailers, strip_hop_by_hop, upgrade_type, validate_token};

/// Outbound request plus the upgrade token it asks for.
#[derive(Debug)]
pub struct Outbound {
    pub request: Request<Body>,
    pub upgrade: Option<String>,
}

/// Build the request sent to `address` from the inbound head and payload.
pub fn outbound_request(
    parts: &request::Parts,
    payload: Option<Bytes>,
    address: &str,
) -> GatewayResult<Outbound> {
    let upgrade = upgrade_type(&parts.headers)
        .map(validate_token)
        .transpose()?;
    let trailers = accepts_trailers(&parts.headers);

    let mut headers = parts.headers.clone();
    strip_hop_by_hop(&mut headers);

    if let Some(token) = &upgrade {
        let value = HeaderValue::from_str(token)
            .map_err(|e| GatewayError::invalid_request(format!("upgrade token: {e}")))?;
        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(UPGRADE, value);
    }
    if trailers {
        headers.insert(TE, HeaderValue::from_static("trailers"));
    }
    if !headers.contains_key(HOST) {
        if let Some(authority) = parts.uri.authority() {
            if let Ok(value) = HeaderValue::from_str(authority.as_str()) {
                headers.insert(HOST, value);
            }
        }
    }

    let body = match payload {
        Some(bytes) => {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
            Body::from(bytes)
        }
        None => {
            // The inbound body was not forwarded; never announce one.
            headers.remove(CONTENT_LENGTH);
            Body::empty()
        }
    };

    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let uri: Uri = format!("http://{address}{path}")
        .parse()
        .map_err(|e| GatewayError::invalid_request(format!("target uri: {e}")))?;

    // The outbound client speaks HTTP/1; h2 and h3 callers are downgraded.
    let version = match parts.version {
        Version::HTTP_10 => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let mut request = Request::new(body);
    *request.method_mut() = parts.method.clone();
    *request.uri_mut() = uri;
    *request.version_mut() = version;
    *request.headers_mut() = headers;

    Ok(Outbound { request, upgrade })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcCode;
    use crate::proxy::hop::HOP_BY_HOP_HEADERS;
    use axum::http::Method;

    fn parts(builder: axum::http::request::Builder) -> request::Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn hop_by_hop_headers_never_forwarded() {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/items?page=2")
            .header(HOST, "gateway.local")
            .header("x-trace", "t1")
            .header("connection", "x-private");
        for name in HOP_BY_HOP_HEADERS {
            if name != "connection" {
                builder = builder.header(name, "set-by-client");
            }
        }
        builder = builder.header("x-private", "secret");

        let out = outbound_request(&parts(builder), Some(Bytes::from("abc")), "10.0.0.1:8080").unwrap();
        let headers = out.request.headers();

        for name in HOP_BY_HOP_HEADERS {
            assert!(headers.get(name).is_none(), "{name} forwarded");
        }
        assert!(headers.get("x-private").is_none());
        assert_eq!(headers["x-trace"], "t1");
        assert_eq!(headers[HOST], "gateway.local");
        assert_eq!(headers[CONTENT_LENGTH], "3");
        assert_eq!(out.request.method(), Method::POST);
        assert_eq!(
            out.request.uri().to_string(),
            "http://10.0.0.1:8080/api/items?page=2"
        );
        assert!(out.upgrade.is_none());
    }

    #[test]
    fn dropped_body_drops_its_length() {
        let builder = Request::builder()
            .method(Method::GET)
            .uri("/x")
            .header(CONTENT_LENGTH, "3");
        let out = outbound_request(&parts(builder), None, "127.0.0.1:9000").unwrap();
        assert!(out.request.headers().get(CONTENT_LENGTH).is_none());
    }

    #[test]
    fn upgrade_headers_re_added() {
        let builder = Request::builder()
            .uri("/ws")
            .header(CONNECTION, "Upgrade")
            .header(UPGRADE, "websocket")
            .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==");

        let out = outbound_request(&parts(builder), None, "127.0.0.1:9000").unwrap();
        let headers = out.request.headers();
        assert_eq!(headers[CONNECTION], "Upgrade");
        assert_eq!(headers[UPGRADE], "websocket");
        assert_eq!(headers["sec-websocket-key"], "dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(out.upgrade.as_deref(), Some("websocket"));
    }

    #[test]
    fn te_trailers_advertised() {
        let builder = Request::builder().uri("/").header(TE, "trailers, deflate");
        let out = outbound_request(&parts(builder), None, "127.0.0.1:9000").unwrap();
        assert_eq!(out.request.headers()[TE], "trailers");
    }

    #[test]
    fn non_printable_upgrade_token_rejected() {
        let builder = Request::builder()
            .uri("/ws")
            .header(CONNECTION, "upgrade")
            .header(UPGRADE, HeaderValue::from_bytes(&[0xff, 0x41]).unwrap());
        let err = outbound_request(&parts(builder), None, "127.0.0.1:9000").unwrap_err();
        assert_eq!(err.code, RpcCode::INVALID_REQUEST);
    }

    #[test]
    fn http2_caller_downgraded() {
        let builder = Request::builder()
            .uri("https://api.example.com/v1")
            .version(Version::HTTP_2);
        let out = outbound_request(&parts(builder), None, "127.0.0.1:9000").unwrap();
        assert_eq!(out.request.version(), Version::HTTP_11);
        assert_eq!(out.request.headers()[HOST], "api.example.com");
    }
}
