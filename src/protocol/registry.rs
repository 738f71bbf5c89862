//! Protocol handler registry.
//!
//! # Responsibilities
//! - Map protocol names to their handler
//! - Overwrite on re-registration (never append)
//! - Report unknown names as an unsupported-protocol error
//!
//! # Design Decisions
//! - Registration clones the current table under a mutex and swaps it in
//! - Lookups load the published snapshot and never block each other

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;

use crate::error::{GatewayError, GatewayResult};
use crate::protocol::ProtocolHandler;

type HandlerTable = HashMap<String, Arc<dyn ProtocolHandler>>;

/// Name → handler table shared by every exchange.
pub struct ProtocolRegistry {
    handlers: ArcSwap<HandlerTable>,
    write_lock: Mutex<()>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self {
            handlers: ArcSwap::from_pointee(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Register `handler` under `name`, replacing any previous handler.
    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn ProtocolHandler>) {
        let name = name.into();
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut next = HashMap::clone(&self.handlers.load());
        if next.insert(name.clone(), handler).is_some() {
            tracing::warn!(protocol = %name, "Protocol handler replaced");
        } else {
            tracing::debug!(protocol = %name, "Protocol handler registered");
        }
        self.handlers.store(Arc::new(next));
    }

    pub fn lookup(&self, name: &str) -> GatewayResult<Arc<dyn ProtocolHandler>> {
        self.handlers
            .load()
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::unsupported_protocol(name))
    }

    /// Registered protocol names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.load().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolRegistry")
            .field("protocols", &self.names())
            .finish()
    }
}
