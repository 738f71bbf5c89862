//! Hop-by-hop header handling.
//!
//! # Responsibilities
//! - Strip the fixed hop-by-hop set from requests and responses
//! - Strip every header the `Connection` value names
//! - Detect and validate upgrade tokens
//!
//! # Design Decisions
//! - Names compare case-insensitively (`HeaderMap` lowercases on insert)
//! - Upgrade tokens must be printable ASCII; anything else is rejected

use axum::http::header::{CONNECTION, TE, UPGRADE};
use axum::http::{HeaderMap, HeaderValue};

use crate::error::{GatewayError, GatewayResult};

/// Headers meaningful for a single transport leg only.
pub const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Comma-separated tokens of every value of a header, trimmed and lowercased.
fn tokens(headers: &HeaderMap, name: impl axum::http::header::AsHeaderName) -> Vec<String> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Remove the fixed hop-by-hop set plus anything listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in tokens(headers, CONNECTION) {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

/// The requested upgrade protocol, if `Connection` carries the `upgrade` token.
pub fn upgrade_type(headers: &HeaderMap) -> Option<&HeaderValue> {
    if !tokens(headers, CONNECTION).iter().any(|t| t == "upgrade") {
        return None;
    }
    headers.get(UPGRADE)
}

/// Whether the inbound `TE` lists `trailers`.
pub fn accepts_trailers(headers: &HeaderMap) -> bool {
    tokens(headers, TE).iter().any(|t| t == "trailers")
}

pub fn is_printable_ascii(bytes: &[u8]) -> bool {
    !bytes.is_empty() && bytes.iter().all(|b| (0x20..=0x7e).contains(b))
}

/// Upgrade token as a string, rejecting non-printable bytes.
pub fn validate_token(value: &HeaderValue) -> GatewayResult<String> {
    let bytes = value.as_bytes();
    if !is_printable_ascii(bytes) {
        return Err(GatewayError::invalid_request(format!(
            "upgrade token {:?} is not printable ASCII",
            String::from_utf8_lossy(bytes)
        )));
    }
    Ok(String::from_utf8_lossy(bytes).into_owned())
}
