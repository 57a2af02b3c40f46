use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;
use tokio::sync::mpsc;

use crate::error::AppResult;

/// Keys for catalog responses cached in Redis
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Resolved similar-items list for a seed ASIN
    Similar {
        region: String,
        asin: String,
        limit: usize,
    },
    /// Resolved keyword search results
    Search {
        region: String,
        query: String,
        limit: usize,
    },
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Similar {
                region,
                asin,
                limit,
            } => write!(f, "sims:{}:{}:{}", region, asin, limit),
            CacheKey::Search {
                region,
                query,
                limit,
            } => write!(
                f,
                "search:{}:{}:{}",
                region,
                limit,
                query.trim().to_lowercase()
            ),
        }
    }
}

/// Creates a Redis client for caching
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Message for asynchronous cache writes
struct CacheWriteMessage {
    key: String,
    value: String,
    ttl: u64,
}

/// Cache handler for storing and retrieving catalog data from Redis
///
/// A disabled cache misses on every read and drops every write, so callers
/// never have to special-case a missing Redis.
#[derive(Clone)]
pub struct Cache {
    conn: Option<ConnectionManager>,
    write_tx: Option<mpsc::UnboundedSender<CacheWriteMessage>>,
}

/// Handle for gracefully shutting down the cache writer
pub struct CacheWriterHandle {
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl CacheWriterHandle {
    /// Signals the writer task to flush pending writes and stop
    pub async fn shutdown(self) {
        if let Some(tx) = self.shutdown_tx {
            let _ = tx.send(()).await;
            tracing::info!("Cache writer shutdown signal sent");
        }
    }
}

impl Cache {
    /// Connects to Redis and spawns the background writer task
    pub async fn connect(redis_client: Client) -> AppResult<(Self, CacheWriterHandle)> {
        let conn = ConnectionManager::new(redis_client).await?;

        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let writer_conn = conn.clone();
        tokio::spawn(async move {
            Self::cache_writer_task(writer_conn, write_rx, shutdown_rx).await;
        });

        let cache = Self {
            conn: Some(conn),
            write_tx: Some(write_tx),
        };

        let handle = CacheWriterHandle {
            shutdown_tx: Some(shutdown_tx),
        };

        Ok((cache, handle))
    }

    /// A cache that never stores anything
    pub fn disabled() -> (Self, CacheWriterHandle) {
        (
            Self {
                conn: None,
                write_tx: None,
            },
            CacheWriterHandle { shutdown_tx: None },
        )
    }

    /// Background task that drains the write channel into Redis
    ///
    /// On shutdown the remaining queued writes are flushed before exiting.
    async fn cache_writer_task(
        conn: ConnectionManager,
        mut write_rx: mpsc::UnboundedReceiver<CacheWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer task started");

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    if let Err(e) = Self::write_to_redis(conn.clone(), msg).await {
                        tracing::error!(error = %e, "Failed to write to Redis cache");
                    }
                }
                _ = shutdown_rx.recv() => {
                    write_rx.close();
                    let mut flushed = 0;
                    while let Some(msg) = write_rx.recv().await {
                        if let Err(e) = Self::write_to_redis(conn.clone(), msg).await {
                            tracing::error!(error = %e, "Failed to flush cache write during shutdown");
                        } else {
                            flushed += 1;
                        }
                    }

                    tracing::info!(flushed = flushed, "Cache writer task stopped");
                    break;
                }
            }
        }
    }

    async fn write_to_redis(mut conn: ConnectionManager, msg: CacheWriteMessage) -> AppResult<()> {
        let _: () = conn.set_ex(msg.key, msg.value, msg.ttl).await?;
        Ok(())
    }

    /// Retrieves a value from the cache by key
    ///
    /// Redis errors and undecodable entries are logged and reported as a miss.
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let mut conn = self.conn.clone()?;

        let cached: Option<String> = match conn.get(key.to_string()).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Redis get failed");
                return None;
            }
        };

        match serde_json::from_str(&cached?) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Discarding undecodable cache entry");
                None
            }
        }
    }

    /// Queues a value for writing without waiting for Redis
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        let Some(write_tx) = &self.write_tx else {
            return;
        };

        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Cache serialization error");
                return;
            }
        };

        let msg = CacheWriteMessage {
            key: key.to_string(),
            value: json,
            ttl,
        };

        if let Err(e) = write_tx.send(msg) {
            tracing::error!(error = %e, "Failed to send cache write message");
        }
    }
}
