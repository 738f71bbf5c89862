//! Carrying HTTP semantics across gRPC metadata.
//!
//! # Responsibilities
//! - Encode inbound HTTP headers into one URL-encoded metadata value and back
//! - Convert gateway metadata into outgoing gRPC request metadata
//! - Convert gRPC response metadata back into gateway metadata
//!
//! # Design Decisions
//! - Repeated header values keep their order through encode/decode
//! - `connection` is never forwarded: it would make the h2 client negotiate an upgrade
//! - Keys ending in `-bin` travel as binary metadata

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use percent_encoding::percent_decode_str;
use tonic::metadata::{
    AsciiMetadataKey, AsciiMetadataValue, BinaryMetadataKey, BinaryMetadataValue, KeyAndValueRef,
    MetadataMap,
};

use crate::error::{GatewayError, GatewayResult};
use crate::protocol::Metadata;

/// Metadata key carrying the URL-encoded inbound headers.
pub const HTTP_HEADER_KEY: &str = "x-gateway-http-header";
/// Metadata key carrying the raw inbound query string.
pub const HTTP_QUERY_KEY: &str = "x-gateway-http-query";

/// `name=value&name=value...`, one pair per header value. Values are
/// percent-encoded byte for byte, so opaque (non UTF-8) values survive.
pub fn encode_headers(headers: &HeaderMap) -> String {
    let mut encoded = String::new();
    for (name, value) in headers {
        if !encoded.is_empty() {
            encoded.push('&');
        }
        encoded.extend(url::form_urlencoded::byte_serialize(name.as_str().as_bytes()));
        encoded.push('=');
        encoded.extend(url::form_urlencoded::byte_serialize(value.as_bytes()));
    }
    encoded
}

/// Inverse of [`encode_headers`].
pub fn decode_headers(encoded: &str) -> GatewayResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    for pair in encoded.split('&').filter(|pair| !pair.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        let name = percent_decode(name);
        let value = percent_decode(value);

        let name = HeaderName::from_bytes(&name).map_err(|e| {
            GatewayError::invalid_request(format!(
                "header name {:?}: {e}",
                String::from_utf8_lossy(&name)
            ))
        })?;
        let value = HeaderValue::from_bytes(&value)
            .map_err(|e| GatewayError::invalid_request(format!("header value for {name}: {e}")))?;
        headers.append(name, value);
    }
    Ok(headers)
}

/// Form-style decoding on raw bytes: `+` is a space, `%XX` is one byte.
fn percent_decode(input: &str) -> Vec<u8> {
    let spaced = input.replace('+', " ");
    percent_decode_str(&spaced).collect()
}

/// Gateway metadata → outgoing request metadata.
pub fn outgoing_metadata(metadata: &Metadata) -> GatewayResult<MetadataMap> {
    let mut map = MetadataMap::new();
    for (key, value) in metadata.iter() {
        if key.eq_ignore_ascii_case("connection") {
            continue;
        }
        if key.ends_with("-bin") {
            let key = BinaryMetadataKey::from_bytes(key.as_bytes())
                .map_err(|e| GatewayError::invalid_request(format!("metadata key {key}: {e}")))?;
            map.append_bin(key, BinaryMetadataValue::from_bytes(value));
        } else {
            let key = AsciiMetadataKey::from_bytes(key.as_bytes())
                .map_err(|e| GatewayError::invalid_request(format!("metadata key {key}: {e}")))?;
            let value = AsciiMetadataValue::try_from(value)
                .map_err(|e| GatewayError::invalid_request(format!("metadata value for {key}: {e}")))?;
            map.append(key, value);
        }
    }
    Ok(map)
}

/// Response metadata → gateway metadata; binary values are decoded and
/// repeated keys keep every value.
pub fn incoming_metadata(map: &MetadataMap) -> Metadata {
    let mut metadata = Metadata::new();
    for entry in map.iter() {
        match entry {
            KeyAndValueRef::Ascii(key, value) => {
                metadata.append(key.as_str().to_string(), value.as_bytes().to_vec());
            }
            KeyAndValueRef::Binary(key, value) => {
                if let Ok(bytes) = value.to_bytes() {
                    metadata.append(key.as_str().to_string(), bytes.to_vec());
                }
            }
        }
    }
    metadata
}
