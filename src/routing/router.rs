//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up matching route for request
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in priority order (acceptable for typical route counts)
//! - Equal priorities keep config order (stable sort)
//! - Explicit NoMatch rather than silent default

use std::time::Duration;

use axum::http::request::Parts;

use crate::config::RouteConfig;
use crate::protocol::Target;
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub protocol: String,
    pub target: Target,
    priority: u32,
    matcher: AndMatcher,
}

/// Immutable, priority-ordered route table.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Compile routes; `default_timeout` applies where a route sets none.
    pub fn from_config(configs: Vec<RouteConfig>, default_timeout: Duration) -> Self {
        let mut routes: Vec<Route> = configs
            .into_iter()
            .map(|config| {
                let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
                if let Some(host) = config.host {
                    matchers.push(Box::new(HostMatcher::new(host)));
                }
                if let Some(prefix) = config.path_prefix {
                    matchers.push(Box::new(PathPrefixMatcher::new(prefix)));
                }

                Route {
                    name: config.name,
                    protocol: config.protocol,
                    target: Target {
                        address: config.target,
                        method: config.method,
                        timeout: config
                            .timeout_ms
                            .map(Duration::from_millis)
                            .unwrap_or(default_timeout),
                    },
                    priority: config.priority,
                    matcher: AndMatcher::new(matchers),
                }
            })
            .collect();

        routes.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { routes }
    }

    /// First route, in priority order, whose conditions all hold.
    pub fn match_request(&self, req: &Parts) -> Option<&Route> {
        self.routes.iter().find(|route| route.matcher.matches(req))
    }

    /// Distinct protocol names the routes refer to.
    pub fn protocols(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.iter().map(|r| r.protocol.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
