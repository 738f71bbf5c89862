//! RPC code to HTTP status mapping.
//!
//! # Responsibilities
//! - Map RPC result codes (framework and gateway codes) to HTTP statuses
//! - Track which HTTP statuses count as a successful exchange
//! - Accept extensions only while the gateway is bootstrapping
//!
//! # Design Decisions
//! - Readers load an immutable snapshot through `ArcSwap`, never a lock
//! - Writers serialize on a mutex and publish a new snapshot
//! - Registering a code twice is an error; the first mapping stays
//! - `seal` ends the bootstrap phase; later registrations are rejected

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use axum::http::StatusCode;

use crate::error::{GatewayError, GatewayResult, RpcCode};

/// Code → status table and success-status set.
#[derive(Debug)]
pub struct StatusMapping {
    codes: ArcSwap<HashMap<RpcCode, StatusCode>>,
    success: ArcSwap<HashSet<StatusCode>>,
    write_lock: Mutex<()>,
    sealed: AtomicBool,
}

impl StatusMapping {
    /// Create a mapping seeded with the framework defaults.
    pub fn new() -> Self {
        let codes: HashMap<RpcCode, StatusCode> = [
            (RpcCode::SERVER_DECODE_FAIL, StatusCode::BAD_REQUEST),
            (RpcCode::SERVER_ENCODE_FAIL, StatusCode::INTERNAL_SERVER_ERROR),
            (RpcCode::SERVER_NO_SERVICE, StatusCode::NOT_FOUND),
            (RpcCode::SERVER_NO_FUNC, StatusCode::NOT_FOUND),
            (RpcCode::SERVER_TIMEOUT, StatusCode::GATEWAY_TIMEOUT),
            (RpcCode::SERVER_OVERLOAD, StatusCode::TOO_MANY_REQUESTS),
            (RpcCode::SERVER_LIMITED, StatusCode::TOO_MANY_REQUESTS),
            (RpcCode::SERVER_AUTH_FAIL, StatusCode::UNAUTHORIZED),
            (RpcCode::SERVER_VALIDATE_FAIL, StatusCode::BAD_REQUEST),
            (RpcCode::CLIENT_INVOKE_TIMEOUT, StatusCode::REQUEST_TIMEOUT),
            (RpcCode::CLIENT_CANCELED, StatusCode::REQUEST_TIMEOUT),
            (RpcCode::CLIENT_NET_ERR, StatusCode::INTERNAL_SERVER_ERROR),
            (RpcCode::UNKNOWN, StatusCode::INTERNAL_SERVER_ERROR),
            (RpcCode::INVALID_REQUEST, StatusCode::FORBIDDEN),
        ]
        .into_iter()
        .collect();

        Self {
            codes: ArcSwap::from_pointee(codes),
            success: ArcSwap::from_pointee(HashSet::from([StatusCode::OK])),
            write_lock: Mutex::new(()),
            sealed: AtomicBool::new(false),
        }
    }

    /// Add a code → status pair. Fails if the code is already mapped or the
    /// mapping has been sealed.
    pub fn register_code(&self, code: RpcCode, status: StatusCode) -> GatewayResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.ensure_open()?;

        let current = self.codes.load();
        if let Some(existing) = current.get(&code) {
            return Err(GatewayError::config(
                RpcCode::UNKNOWN,
                format!("code {code} already mapped to {existing}"),
            ));
        }

        let mut next = HashMap::clone(&current);
        next.insert(code, status);
        self.codes.store(Arc::new(next));
        tracing::debug!(code = %code, status = %status, "Registered error mapping");
        Ok(())
    }

    /// Add an HTTP status that counts as success. Fails if already present or sealed.
    pub fn register_success_status(&self, status: StatusCode) -> GatewayResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.ensure_open()?;

        let current = self.success.load();
        if current.contains(&status) {
            return Err(GatewayError::config(
                RpcCode::UNKNOWN,
                format!("status {status} already registered as success"),
            ));
        }

        let mut next = HashSet::clone(&current);
        next.insert(status);
        self.success.store(Arc::new(next));
        Ok(())
    }

    /// HTTP status for a code, `500` when unmapped.
    pub fn http_status(&self, code: RpcCode) -> StatusCode {
        self.codes
            .load()
            .get(&code)
            .copied()
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn is_success(&self, status: StatusCode) -> bool {
        self.success.load().contains(&status)
    }

    /// End the bootstrap phase.
    pub fn seal(&self) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> GatewayResult<()> {
        if self.is_sealed() {
            return Err(GatewayError::config(
                RpcCode::UNKNOWN,
                "error mapping can only be extended during plugin setup",
            ));
        }
        Ok(())
    }
}

impl Default for StatusMapping {
    fn default() -> Self {
        Self::new()
    }
}
