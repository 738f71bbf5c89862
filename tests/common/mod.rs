//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use relay_gateway::config::{GatewayConfig, RouteConfig};
use relay_gateway::gateway::{Gateway, GatewayBuilder};
use relay_gateway::lifecycle::{bootstrap_with, Shutdown};
use relay_gateway::HttpServer;

/// A running gateway; dropping it stops the server.
pub struct TestGateway {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub fn route(name: &str, prefix: &str, protocol: &str, target: impl ToString) -> RouteConfig {
    RouteConfig {
        name: name.to_string(),
        host: None,
        path_prefix: Some(prefix.to_string()),
        priority: 0,
        protocol: protocol.to_string(),
        target: target.to_string(),
        method: None,
        timeout_ms: None,
    }
}

pub fn config(routes: Vec<RouteConfig>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.observability.metrics_enabled = false;
    config.timeouts.call_timeout_ms = 2_000;
    config.routes = routes;
    config
}

/// Start a gateway with the built-in protocols.
pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let builder = Gateway::builder().builtin_protocols(&config);
    start_gateway_with(config, builder).await
}

/// Start a gateway from a prepared builder.
pub async fn start_gateway_with(config: GatewayConfig, builder: GatewayBuilder) -> TestGateway {
    let boot = bootstrap_with(&config, builder).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, boot.gateway, boot.routes);
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    TestGateway { addr, shutdown }
}

/// Read one request head (up to the blank line).
pub async fn read_head(socket: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match socket.read(&mut byte).await {
            Ok(0) | Err(_) => break,
            Ok(_) => head.push(byte[0]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Accept connections forever, handing each socket to `f`.
pub async fn start_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = std::sync::Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move { f(socket).await });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(extra_headers: &'static str, body: &'static str) -> SocketAddr {
    start_backend(move |mut socket| async move {
        read_head(&mut socket).await;
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n{}",
            body.len(),
            extra_headers,
            body
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    })
    .await
}

/// Backend answering with the request head it received as the body.
pub async fn start_echo_head_backend() -> SocketAddr {
    start_backend(|mut socket| async move {
        let head = read_head(&mut socket).await;
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            head.len(),
            head
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    })
    .await
}

/// Backend writing a chunked body, pausing before each chunk.
pub async fn start_streaming_backend(
    extra_headers: &'static str,
    chunks: Vec<(Duration, &'static str)>,
    trailers: &'static str,
) -> SocketAddr {
    start_backend(move |mut socket| {
        let chunks = chunks.clone();
        async move {
            read_head(&mut socket).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n{extra_headers}Connection: close\r\n\r\n"
            );
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            for (delay, chunk) in chunks {
                tokio::time::sleep(delay).await;
                let frame = format!("{:x}\r\n{}\r\n", chunk.len(), chunk);
                if socket.write_all(frame.as_bytes()).await.is_err() {
                    return;
                }
            }
            let _ = socket.write_all(format!("0\r\n{trailers}\r\n").as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    })
    .await
}

/// Backend switching to `token` and then echoing every byte.
pub async fn start_upgrade_backend(token: &'static str) -> SocketAddr {
    start_backend(move |mut socket| async move {
        read_head(&mut socket).await;
        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: {token}\r\n\r\n"
        );
        if socket.write_all(response.as_bytes()).await.is_err() {
            return;
        }
        let (mut rd, mut wr) = socket.split();
        let _ = tokio::io::copy(&mut rd, &mut wr).await;
    })
    .await
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
