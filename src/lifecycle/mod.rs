//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build gateway (hooks, seal mapping) → Compile routes
//!
//! Shutdown (shutdown.rs):
//!     Trigger → axum stops accepting → in-flight exchanges finish → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - A route naming an unregistered protocol stops startup
//! - Upgraded connections are detached from the exchange and are not drained

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{bootstrap, bootstrap_with, Bootstrapped};
