//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → bootstrap builds routes, transports and hooks from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the status mapping is sealed at startup
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ErrorCodeConfig, GatewayConfig, GrpcSettings, ListenerConfig, ObservabilityConfig,
    ProxySettings, RouteConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
