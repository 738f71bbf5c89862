//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request head (host, path)
//!     → router.rs (route lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: matched Route (protocol name + Target) or NoMatch
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Sort by priority
//!     → Compile matchers
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - A route only picks the protocol and target; the gateway does the rest
//! - Host and path prefix are the only conditions, both optional
//! - Highest priority first, config order among equals

pub mod matcher;
pub mod router;

pub use router::{Route, Router};
