//! Shared Redis connection for all store adapters.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::sync::RwLock;

/// Liveness and lifecycle of the backing store.
#[async_trait]
pub trait StoreConnection: Send + Sync {
    /// Health check - verify the store answers.
    async fn ping(&self) -> Result<bool>;

    /// Release the connection at shutdown. Later calls fail.
    async fn close(&self);
}

/// One Redis client per process. The connection is opened on first use and
/// shared by every store (the manager reconnects on its own after failures).
pub struct RedisConnection {
    client: redis::Client,
    connect_timeout: Duration,
    manager: RwLock<Option<ConnectionManager>>,
    closed: AtomicBool,
}

impl RedisConnection {
    pub fn open(url: &str, connect_timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid redis url")?;

        Ok(Self {
            client,
            connect_timeout,
            manager: RwLock::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Get a handle to the shared connection, connecting if needed.
    pub async fn get(&self) -> Result<ConnectionManager> {
        if self.closed.load(Ordering::Acquire) {
            anyhow::bail!("store connection closed");
        }

        if let Some(manager) = self.manager.read().await.as_ref() {
            return Ok(manager.clone());
        }

        let mut slot = self.manager.write().await;
        if let Some(manager) = slot.as_ref() {
            return Ok(manager.clone());
        }

        let manager = tokio::time::timeout(
            self.connect_timeout,
            ConnectionManager::new(self.client.clone()),
        )
        .await
        .context("timed out connecting to redis")?
        .context("failed to connect to redis")?;

        tracing::info!("redis connected");
        *slot = Some(manager.clone());

        Ok(manager)
    }
}

#[async_trait]
impl StoreConnection for RedisConnection {
    async fn ping(&self) -> Result<bool> {
        let mut conn = self.get().await?;
        let result: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(result == "PONG")
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if self.manager.write().await.take().is_some() {
            tracing::info!("redis connection closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_rejects_malformed_url() {
        assert!(RedisConnection::open("not a url", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn closed_connection_refuses_new_handles() {
        let conn = RedisConnection::open("redis://127.0.0.1:6379", Duration::from_secs(1)).unwrap();
        conn.close().await;

        let Err(err) = conn.get().await else {
            panic!("expected closed connection");
        };
        assert_eq!(err.to_string(), "store connection closed");
    }
}
