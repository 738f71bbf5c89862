//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with a catch-all handler
//! - Wire up middleware (request ID, tracing, timeout)
//! - Bind server to listener and drain on shutdown
//! - Route each request and hand it to the gateway

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, RpcCode};
use crate::gateway::Gateway;
use crate::http::request::MakeRequestUuid;
use crate::protocol::Exchange;
use crate::routing::Router as RouteTable;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub routes: Arc<RouteTable>,
    pub max_body_size: usize,
}

/// Inbound HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &GatewayConfig, gateway: Arc<Gateway>, routes: Arc<RouteTable>) -> Self {
        let state = AppState {
            gateway,
            routes,
            max_body_size: config.listener.max_body_size,
        };
        let router = Self::build_router(config, state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(dispatch))
            .route("/", any(dispatch))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The configured router, for serving it some other way.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all handler: route, buffer, run the gateway lifecycle.
async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    let (parts, body) = request.into_parts();

    let Some(route) = state.routes.match_request(&parts) else {
        tracing::warn!(
            method = %parts.method,
            path = %parts.uri.path(),
            "No route matched"
        );
        let err = GatewayError::framework(
            RpcCode::SERVER_NO_SERVICE,
            format!("no route for {}", parts.uri.path()),
        );
        return state.gateway.error_response(&err);
    };

    tracing::debug!(
        route = %route.name,
        protocol = %route.protocol,
        target = %route.target.address,
        "Route matched"
    );

    let exchange = match Exchange::from_request(Request::from_parts(parts, body), state.max_body_size).await {
        Ok(exchange) => exchange,
        Err(err) => {
            tracing::warn!(route = %route.name, error = %err, "Failed to read request body");
            return state.gateway.error_response(&err);
        }
    };

    state.gateway.serve(&route.protocol, &route.target, exchange).await
}
