// src/store/redis_backend.rs
use super::backend::{LatencyScore, ProxyEntry, StoreBackend, StoreError};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Backend over Redis sorted sets, one key per namespace, scored by latency.
///
/// The connection is opened on first use and dropped again after an I/O failure, so an
/// unreachable server only costs the calls made while it is down. `replace` fills a
/// scratch key and renames it onto the namespace inside one MULTI block.
pub struct RedisBackend {
    client: Client,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisBackend {
    /// Parses `url` without connecting.
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(unavailable)?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        let mut slot = self.connection.lock().await;
        if let Some(con) = slot.as_ref() {
            return Ok(con.clone());
        }

        let con = tokio::time::timeout(
            CONNECT_TIMEOUT,
            self.client.get_multiplexed_tokio_connection(),
        )
        .await
        .map_err(|_| StoreError::Unavailable("timed out connecting to redis".into()))?
        .map_err(unavailable)?;
        info!("Connected to redis");
        *slot = Some(con.clone());
        Ok(con)
    }

    async fn forget_on_io_error(&self, e: &RedisError) {
        if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
            debug!(error = %e, "Dropping redis connection");
            self.connection.lock().await.take();
        }
    }

    async fn query<T: redis::FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T, StoreError> {
        let mut con = self.connection().await?;
        match cmd.query_async::<_, T>(&mut con).await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.forget_on_io_error(&e).await;
                Err(unavailable(e))
            }
        }
    }
}

fn unavailable(e: RedisError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn scratch_key(namespace: &str) -> String {
    format!("{namespace}:swap")
}

fn into_entries(scored: Vec<(String, LatencyScore)>) -> Vec<ProxyEntry> {
    scored
        .into_iter()
        .map(|(address, score)| ProxyEntry::new(address, score))
        .collect()
}

/// MULTI / DEL scratch / ZADD scratch .. / RENAME scratch namespace / EXEC.
/// An empty snapshot deletes the namespace instead, since ZADD needs at least one member.
fn replace_pipeline(namespace: &str, entries: &[ProxyEntry]) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic();
    if entries.is_empty() {
        pipe.cmd("DEL").arg(namespace).ignore();
        return pipe;
    }

    let scratch = scratch_key(namespace);
    pipe.cmd("DEL").arg(&scratch).ignore();
    pipe.cmd("ZADD").arg(&scratch);
    for entry in entries {
        pipe.arg(entry.latency_ms).arg(&entry.address);
    }
    pipe.ignore();
    pipe.cmd("RENAME").arg(&scratch).arg(namespace).ignore();
    pipe
}

#[async_trait]
impl StoreBackend for RedisBackend {
    async fn upsert(
        &self,
        namespace: &str,
        address: &str,
        score: LatencyScore,
    ) -> Result<(), StoreError> {
        self.query::<()>(redis::cmd("ZADD").arg(namespace).arg(score).arg(address))
            .await
    }

    async fn first(&self, namespace: &str) -> Result<Option<ProxyEntry>, StoreError> {
        let scored: Vec<(String, LatencyScore)> = self
            .query(
                redis::cmd("ZRANGE")
                    .arg(namespace)
                    .arg(0)
                    .arg(0)
                    .arg("WITHSCORES"),
            )
            .await?;
        Ok(into_entries(scored).into_iter().next())
    }

    async fn ranked(&self, namespace: &str) -> Result<Vec<ProxyEntry>, StoreError> {
        let scored: Vec<(String, LatencyScore)> = self
            .query(
                redis::cmd("ZRANGE")
                    .arg(namespace)
                    .arg(0)
                    .arg(-1)
                    .arg("WITHSCORES"),
            )
            .await?;
        Ok(into_entries(scored))
    }

    async fn len(&self, namespace: &str) -> Result<usize, StoreError> {
        self.query(redis::cmd("ZCARD").arg(namespace)).await
    }

    async fn remove(&self, namespace: &str, addresses: &[&str]) -> Result<usize, StoreError> {
        if addresses.is_empty() {
            return Ok(0);
        }
        self.query(redis::cmd("ZREM").arg(namespace).arg(addresses))
            .await
    }

    async fn clear(&self, namespace: &str) -> Result<(), StoreError> {
        self.query::<()>(redis::cmd("DEL").arg(namespace)).await
    }

    async fn replace(&self, namespace: &str, entries: Vec<ProxyEntry>) -> Result<(), StoreError> {
        let failed = |reason: String| StoreError::Replace {
            namespace: namespace.to_string(),
            reason,
        };

        let mut con = self.connection().await.map_err(|e| failed(e.to_string()))?;
        let pipe = replace_pipeline(namespace, &entries);
        if let Err(e) = pipe.query_async::<_, ()>(&mut con).await {
            self.forget_on_io_error(&e).await;
            return Err(failed(e.to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RankedStore;
    use std::sync::Arc;

    // Nothing listens on port 1.
    const DEAD_URL: &str = "redis://127.0.0.1:1/";

    #[test]
    fn open_rejects_non_redis_urls() {
        assert!(matches!(
            RedisBackend::open("http://127.0.0.1:6379"),
            Err(StoreError::Unavailable(_))
        ));
        assert!(RedisBackend::open("redis://127.0.0.1:6379/0").is_ok());
    }

    #[test]
    fn swap_renames_scratch_key_in_one_transaction() {
        let entries = vec![
            ProxyEntry::new("http://a:1", 10),
            ProxyEntry::new("http://b:1", 20),
        ];
        let pipe = replace_pipeline("proxies", &entries);
        let packed = String::from_utf8_lossy(&pipe.get_packed_pipeline()).into_owned();

        let order: Vec<usize> = ["MULTI", "DEL", "ZADD", "RENAME", "EXEC"]
            .iter()
            .map(|word| packed.find(word).unwrap_or_else(|| panic!("{word} missing")))
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]), "{packed}");
        assert!(packed.contains("proxies:swap"));
        assert!(packed.contains("http://b:1"));
    }

    #[test]
    fn empty_swap_only_deletes() {
        let pipe = replace_pipeline("proxies", &[]);
        let packed = String::from_utf8_lossy(&pipe.get_packed_pipeline()).into_owned();
        assert!(packed.contains("DEL"));
        assert!(!packed.contains("ZADD"));
        assert!(!packed.contains("RENAME"));
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let backend = RedisBackend::open(DEAD_URL).unwrap();
        assert!(matches!(
            backend.len("proxies").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            backend.replace("proxies", vec![ProxyEntry::new("http://a:1", 1)]).await,
            Err(StoreError::Replace { .. })
        ));
    }

    #[tokio::test]
    async fn ranked_store_degrades_when_server_is_down() {
        let live = RankedStore::new(Arc::new(RedisBackend::open(DEAD_URL).unwrap()), "proxies");
        let staging = RankedStore::in_memory("staging");
        staging.upsert("http://a:1", 5).await;

        live.upsert("http://a:1", 5).await;
        assert_eq!(live.best().await, None);
        assert!(live.all().await.is_empty());
        assert_eq!(live.count().await, 0);
        assert!(!live.remove("http://a:1").await);
        assert!(live.atomic_replace_with(&staging).await.is_err());
    }

    // Needs a disposable server: REDIS_URL=redis://127.0.0.1/ cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn sorted_set_round_trip() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into());
        let backend: Arc<dyn StoreBackend> = Arc::new(RedisBackend::open(&url).unwrap());
        let live = RankedStore::new(backend, "proxy_pool_test_live");
        let staging = live.sibling("proxy_pool_test_staging");
        live.clear().await;
        staging.clear().await;

        live.upsert("http://b:1", 20).await;
        live.upsert("http://a:1", 20).await;
        live.upsert("http://c:1", 5).await;
        assert_eq!(live.best().await, Some(ProxyEntry::new("http://c:1", 5)));
        assert_eq!(live.all().await, vec!["http://c:1", "http://a:1", "http://b:1"]);
        assert!(live.remove("http://c:1").await);
        assert_eq!(live.count().await, 2);

        staging.upsert("http://z:1", 7).await;
        assert_eq!(live.atomic_replace_with(&staging).await.unwrap(), 1);
        assert_eq!(live.entries().await, vec![ProxyEntry::new("http://z:1", 7)]);

        staging.clear().await;
        assert_eq!(live.atomic_replace_with(&staging).await.unwrap(), 0);
        assert_eq!(live.count().await, 0);
    }
}
