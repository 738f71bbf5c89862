//! Gateway error taxonomy.
//!
//! # Responsibilities
//! - Classify failures (config, request, transport, business, framework)
//! - Carry the RPC result code used to select an HTTP status
//! - Provide constructors for the codes the gateway raises itself
//!
//! # Design Decisions
//! - One error type crosses every protocol boundary; the code is the contract
//! - Business errors are the only kind a handler may absorb into a response

use std::fmt;

/// RPC result code shared by every downstream protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RpcCode(pub i32);

impl RpcCode {
    pub const OK: RpcCode = RpcCode(0);
    pub const SERVER_DECODE_FAIL: RpcCode = RpcCode(1);
    pub const SERVER_ENCODE_FAIL: RpcCode = RpcCode(2);
    pub const SERVER_NO_SERVICE: RpcCode = RpcCode(11);
    pub const SERVER_NO_FUNC: RpcCode = RpcCode(12);
    pub const SERVER_TIMEOUT: RpcCode = RpcCode(21);
    pub const SERVER_OVERLOAD: RpcCode = RpcCode(22);
    pub const SERVER_LIMITED: RpcCode = RpcCode(23);
    pub const SERVER_SYSTEM_ERR: RpcCode = RpcCode(31);
    pub const SERVER_AUTH_FAIL: RpcCode = RpcCode(41);
    pub const SERVER_VALIDATE_FAIL: RpcCode = RpcCode(51);
    pub const CLIENT_INVOKE_TIMEOUT: RpcCode = RpcCode(101);
    pub const CLIENT_CONNECT_FAIL: RpcCode = RpcCode(111);
    pub const CLIENT_ENCODE_FAIL: RpcCode = RpcCode(121);
    pub const CLIENT_DECODE_FAIL: RpcCode = RpcCode(122);
    pub const CLIENT_NET_ERR: RpcCode = RpcCode(141);
    pub const CLIENT_CANCELED: RpcCode = RpcCode(161);
    pub const UNKNOWN: RpcCode = RpcCode(999);

    /// Gateway-level codes live above the RPC framework's range.
    pub const INVALID_REQUEST: RpcCode = RpcCode(10001);
    pub const UNSUPPORTED_PROTOCOL: RpcCode = RpcCode(10002);
    pub const NO_TRANSPORT: RpcCode = RpcCode(10003);

    pub fn as_i32(self) -> i32 {
        self.0
    }
}

impl fmt::Display for RpcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for RpcCode {
    fn from(code: i32) -> Self {
        RpcCode(code)
    }
}

/// Failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad gateway configuration (unregistered protocol, missing transport).
    Config,
    /// The inbound request cannot be transformed.
    Request,
    /// Connect failures, timeouts, cancellations and other frame-level errors.
    Transport,
    /// Downstream application failure meant to reach the caller as a normal response.
    Business,
    /// Everything else.
    Framework,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Config => "config",
            ErrorKind::Request => "request",
            ErrorKind::Transport => "transport",
            ErrorKind::Business => "business",
            ErrorKind::Framework => "framework",
        };
        f.write_str(name)
    }
}

/// Error raised anywhere in the exchange pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error, code: {code}, msg: {message}")]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub code: RpcCode,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, code: RpcCode, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
        }
    }

    pub fn config(code: RpcCode, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, code, message)
    }

    /// Malformed inbound request (bad upgrade token, foreign context).
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Request, RpcCode::INVALID_REQUEST, message)
    }

    pub fn unsupported_protocol(name: &str) -> Self {
        Self::config(
            RpcCode::UNSUPPORTED_PROTOCOL,
            format!("unsupported protocol: {name}"),
        )
    }

    /// Frame-level error produced by a client transport.
    pub fn transport(code: RpcCode, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, code, message)
    }

    pub fn business(code: impl Into<RpcCode>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Business, code.into(), message)
    }

    pub fn framework(code: RpcCode, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Framework, code, message)
    }

    pub fn is_business(&self) -> bool {
        self.kind == ErrorKind::Business
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
