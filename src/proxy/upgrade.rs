//! Protocol upgrade (101 Switching Protocols) handling.
//!
//! # Responsibilities
//! - Verify the backend switched to the protocol the caller asked for
//! - Hijack both connections once the 101 head has been delivered
//! - Pump bytes in both directions until either side finishes
//!
//! # Data Flow
//! ```text
//! caller ──read──▶ copy task (to backend) ──write──▶ backend
//! caller ◀─write── copy task (to caller)  ◀──read─── backend
//!                         │
//!                 result queue (cap 2) → first result tears down both ends
//! ```

use std::fmt;
use std::io;

use axum::http::header::UPGRADE;
use axum::http::HeaderMap;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::{GatewayError, GatewayResult};
use crate::proxy::hop::validate_token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToBackend,
    ToCaller,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ToBackend => f.write_str("caller->backend"),
            Direction::ToCaller => f.write_str("backend->caller"),
        }
    }
}

/// Check the 101 response against the requested upgrade. Returns the
/// negotiated token.
pub fn check_switch(requested: Option<&str>, response: &HeaderMap) -> GatewayResult<String> {
    let requested = requested.ok_or_else(|| {
        GatewayError::invalid_request("backend switched protocols without an upgrade request")
    })?;
    let returned = response
        .get(UPGRADE)
        .ok_or_else(|| GatewayError::invalid_request("101 response without Upgrade header"))?;
    let returned = validate_token(returned)?;

    if !returned.eq_ignore_ascii_case(requested) {
        return Err(GatewayError::invalid_request(format!(
            "backend tried to switch protocol {returned} when {requested} was requested"
        )));
    }
    Ok(returned)
}

/// Wait for both upgrades to complete, then relay.
pub async fn hijack(caller: OnUpgrade, backend: OnUpgrade, request_id: String) {
    let (caller, backend) = match tokio::try_join!(caller, backend) {
        Ok(pair) => pair,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Upgrade hijack failed");
            return;
        }
    };

    match relay(TokioIo::new(caller), TokioIo::new(backend)).await {
        Ok((direction, bytes)) => tracing::debug!(
            request_id = %request_id,
            direction = %direction,
            bytes,
            "Upgraded connection closed"
        ),
        Err((direction, e)) => tracing::warn!(
            request_id = %request_id,
            direction = %direction,
            error = %e,
            "Upgraded connection copy failed"
        ),
    }
}

/// Copy bytes both ways. The first copy task to report ends the relay and both
/// connections are dropped; the other task's result is discarded.
pub async fn relay<A, B>(caller: A, backend: B) -> Result<(Direction, u64), (Direction, io::Error)>
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut caller_rd, mut caller_wr) = tokio::io::split(caller);
    let (mut backend_rd, mut backend_wr) = tokio::io::split(backend);
    let (tx, mut rx) = mpsc::channel::<(Direction, io::Result<u64>)>(2);

    let to_backend = {
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = tokio::io::copy(&mut caller_rd, &mut backend_wr).await;
            let _ = backend_wr.shutdown().await;
            let _ = tx.send((Direction::ToBackend, result)).await;
        })
    };
    let to_caller = tokio::spawn(async move {
        let result = tokio::io::copy(&mut backend_rd, &mut caller_wr).await;
        let _ = caller_wr.shutdown().await;
        let _ = tx.send((Direction::ToCaller, result)).await;
    });

    let first = rx.recv().await;

    to_backend.abort();
    to_caller.abort();
    let _ = to_backend.await;
    let _ = to_caller.await;

    match first {
        Some((direction, Ok(bytes))) => Ok((direction, bytes)),
        Some((direction, Err(e))) => Err((direction, e)),
        None => Err((
            Direction::ToBackend,
            io::Error::new(io::ErrorKind::Other, "copy tasks ended without reporting"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcCode;
    use axum::http::HeaderValue;
    use tokio::io::AsyncReadExt;

    fn upgrade_headers(token: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(UPGRADE, HeaderValue::from_static(token));
        headers
    }

    #[test]
    fn matching_tokens_case_insensitive() {
        let token = check_switch(Some("websocket"), &upgrade_headers("WebSocket")).unwrap();
        assert_eq!(token, "WebSocket");
    }

    #[test]
    fn mismatched_tokens_rejected() {
        let err = check_switch(Some("websocket"), &upgrade_headers("h2c")).unwrap_err();
        assert_eq!(err.code, RpcCode::INVALID_REQUEST);
    }

    #[test]
    fn unrequested_switch_rejected() {
        assert!(check_switch(None, &upgrade_headers("h2c")).is_err());
        assert!(check_switch(Some("h2c"), &HeaderMap::new()).is_err());
    }

    #[tokio::test]
    async fn relays_both_directions_until_one_side_closes() {
        let (mut caller, caller_side) = tokio::io::duplex(64);
        let (backend_side, mut backend) = tokio::io::duplex(64);

        let relay = tokio::spawn(relay(caller_side, backend_side));

        caller.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        backend.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        backend.write_all(b"pong").await.unwrap();
        caller.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        drop(caller);
        let (direction, bytes) = relay.await.unwrap().unwrap();
        assert_eq!(direction, Direction::ToBackend);
        assert_eq!(bytes, 4);

        // Backend end was torn down with the relay.
        let mut rest = Vec::new();
        assert_eq!(backend.read_to_end(&mut rest).await.unwrap(), 0);
    }
}
