//! Address-keyed gRPC channel pool.
//!
//! # Responsibilities
//! - Hand out one live channel per downstream address
//! - Dial on a miss, plaintext, bounded by the dial timeout
//! - Keep the first channel stored when concurrent dials race
//!
//! # Design Decisions
//! - Hits read the `DashMap` shard without waiting on in-flight dials
//! - The losing dial's channel goes back to its caller and closes when dropped
//! - Entries are never evicted; tonic reconnects a channel internally

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tonic::transport::{Channel, Endpoint};

use crate::error::{GatewayError, GatewayResult, RpcCode};
use crate::observability::metrics;

/// Opens a new channel to an address.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, address: &str) -> GatewayResult<Channel>;
}

/// Source of channels for the gRPC transport.
#[async_trait]
pub trait ChannelSource: Send + Sync {
    async fn get(&self, address: &str) -> GatewayResult<Channel>;
}

/// Plaintext HTTP/2 dialer.
#[derive(Debug, Clone)]
pub struct TonicDialer {
    timeout: Duration,
}

impl TonicDialer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Dialer for TonicDialer {
    async fn dial(&self, address: &str) -> GatewayResult<Channel> {
        let endpoint = Endpoint::from_shared(format!("http://{address}"))
            .map_err(|e| {
                GatewayError::transport(RpcCode::CLIENT_CONNECT_FAIL, format!("endpoint {address}: {e}"))
            })?
            .connect_timeout(self.timeout);

        match tokio::time::timeout(self.timeout, endpoint.connect()).await {
            Ok(Ok(channel)) => Ok(channel),
            Ok(Err(e)) => Err(GatewayError::transport(
                RpcCode::CLIENT_CONNECT_FAIL,
                format!("dial {address}: {e}"),
            )),
            Err(_) => Err(GatewayError::transport(
                RpcCode::CLIENT_CONNECT_FAIL,
                format!("dial {address}: timed out after {:?}", self.timeout),
            )),
        }
    }
}

pub struct ConnPool {
    channels: DashMap<String, Channel>,
    dialer: Arc<dyn Dialer>,
}

impl ConnPool {
    pub fn new(dialer: Arc<dyn Dialer>) -> Self {
        Self {
            channels: DashMap::new(),
            dialer,
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl std::fmt::Debug for ConnPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnPool")
            .field("channels", &self.channels.len())
            .finish()
    }
}

#[async_trait]
impl ChannelSource for ConnPool {
    async fn get(&self, address: &str) -> GatewayResult<Channel> {
        if let Some(channel) = self.channels.get(address) {
            return Ok(channel.value().clone());
        }

        let dialed = self.dialer.dial(address).await?;
        metrics::record_pool_dial();

        match self.channels.entry(address.to_string()) {
            Entry::Occupied(existing) => {
                tracing::debug!(address, "Lost channel insert race, using the stored channel");
                // The stored channel serves future calls; ours serves this one.
                drop(existing);
                Ok(dialed)
            }
            Entry::Vacant(slot) => {
                tracing::debug!(address, "Pooled new gRPC channel");
                slot.insert(dialed.clone());
                Ok(dialed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Never touches the network: lazy channels connect on first use.
    struct LazyDialer {
        dials: AtomicUsize,
    }

    #[async_trait]
    impl Dialer for LazyDialer {
        async fn dial(&self, address: &str) -> GatewayResult<Channel> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            let endpoint = Endpoint::from_shared(format!("http://{address}")).unwrap();
            Ok(endpoint.connect_lazy())
        }
    }

    struct FailingDialer;

    #[async_trait]
    impl Dialer for FailingDialer {
        async fn dial(&self, address: &str) -> GatewayResult<Channel> {
            Err(GatewayError::transport(
                RpcCode::CLIENT_CONNECT_FAIL,
                format!("dial {address}: refused"),
            ))
        }
    }

    #[tokio::test]
    async fn concurrent_gets_store_at_most_one_entry() {
        let dialer = Arc::new(LazyDialer {
            dials: AtomicUsize::new(0),
        });
        let pool = Arc::new(ConnPool::new(dialer.clone()));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move { pool.get("127.0.0.1:50051").await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(pool.len(), 1);
        assert!(dialer.dials.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn hit_does_not_dial() {
        let dialer = Arc::new(LazyDialer {
            dials: AtomicUsize::new(0),
        });
        let pool = ConnPool::new(dialer.clone());

        pool.get("127.0.0.1:50051").await.unwrap();
        pool.get("127.0.0.1:50051").await.unwrap();
        pool.get("127.0.0.1:50052").await.unwrap();

        assert_eq!(dialer.dials.load(Ordering::SeqCst), 2);
        assert_eq!(pool.len(), 2);
    }

    #[tokio::test]
    async fn failed_dial_stores_nothing() {
        let pool = ConnPool::new(Arc::new(FailingDialer));
        let err = pool.get("127.0.0.1:1").await.unwrap_err();
        assert_eq!(err.code, RpcCode::CLIENT_CONNECT_FAIL);
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn tonic_dialer_reports_connect_failure() {
        let dialer = TonicDialer::new(Duration::from_millis(200));
        let err = dialer.dial("127.0.0.1:1").await.unwrap_err();
        assert_eq!(err.code, RpcCode::CLIENT_CONNECT_FAIL);
    }
}
