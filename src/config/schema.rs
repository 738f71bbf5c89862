//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Reverse proxy settings for the `http` protocol.
    pub proxy: ProxySettings,

    /// gRPC client settings.
    pub grpc: GrpcSettings,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Route definitions mapping requests to protocols and targets.
    pub routes: Vec<RouteConfig>,

    /// Extra RPC code → HTTP status pairs registered at bootstrap.
    pub error_codes: Vec<ErrorCodeConfig>,

    /// Extra statuses counted as success in metrics.
    pub success_statuses: Vec<u16>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest inbound body buffered before the lifecycle runs.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_size: 4 * 1024 * 1024,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole inbound request, enforced by the server layer, in seconds.
    pub request_secs: u64,

    /// Default outbound call timeout when a route sets none, in milliseconds.
    pub call_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 60,
            call_timeout_ms: 30_000,
        }
    }
}

/// Reverse proxy settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Periodic flush interval for streamed bodies; 0 writes the body in one frame.
    pub flush_interval_ms: u64,

    /// Size of pooled copy buffers.
    pub buffer_size: usize,

    /// TCP connect timeout towards backends.
    pub connect_timeout_ms: u64,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            flush_interval_ms: 100,
            buffer_size: 32 * 1024,
            connect_timeout_ms: 5_000,
        }
    }
}

/// gRPC client settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GrpcSettings {
    /// Bound on dialing a new pooled channel.
    pub dial_timeout_ms: u64,
}

impl Default for GrpcSettings {
    fn default() -> Self {
        Self {
            dial_timeout_ms: 3_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Route configuration mapping requests to a protocol and target.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Host header to match (case-insensitive, port ignored).
    pub host: Option<String>,

    /// Path prefix to match.
    pub path_prefix: Option<String>,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,

    /// Registered protocol name (`http`, `rpc`, `grpc`, `raw`, ...).
    pub protocol: String,

    /// Downstream address (e.g., "127.0.0.1:3000").
    pub target: String,

    /// RPC method or gRPC path; the inbound path is used when unset.
    #[serde(default)]
    pub method: Option<String>,

    /// Per-route call timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Additional RPC code mapping.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorCodeConfig {
    pub code: i32,
    pub http_status: u16,
}
