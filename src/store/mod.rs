//! One key-value interface over a single node, a sharded cluster or an
//! in-process map.
//!
//! The topology is chosen once in [`StoreClient::connect`] and every call
//! dispatches on it with a single `match`. Connections are pooled by the
//! underlying client, so a `StoreClient` is cheap to clone and safe to share.
//!
//! No call is ever retried here. A failed or timed-out call is returned to
//! the caller as a [`StoreError`].

pub mod cluster;
pub mod memory;
pub mod single;

use std::future::Future;
use std::time::Duration;

use redis::Script;
use redis::aio::ConnectionLike;

use crate::config::{StoreConfig, StoreTopology};
use crate::error::StoreError;

pub use cluster::ClusterStore;
pub use memory::MemoryStore;
pub use single::SingleNodeStore;

/// A `Result` type for store calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// `COUNT` hint passed to `SCAN`.
pub const SCAN_BATCH: usize = 100;

/// Decides, per matched key, whether a pattern delete removes it.
pub type KeyFilter<'a> = &'a (dyn Fn(&str) -> bool + Sync);

/// Converts a TTL in minutes to seconds. `<= 0` means no expiry.
pub(crate) fn ttl_seconds(ttl_minutes: i64) -> StoreResult<Option<u64>> {
    if ttl_minutes <= 0 {
        return Ok(None);
    }
    ttl_minutes
        .checked_mul(60)
        .map(|secs| Some(secs as u64))
        .ok_or(StoreError::InvalidTtl(ttl_minutes))
}

/// Fixed-window counter. Refuses to count past the limit, starts the window
/// on the first hit and repairs a counter that somehow lost its TTL.
///
/// KEYS[1] = counter, ARGV[1] = limit, ARGV[2] = window in ms.
/// Returns `{allowed, count, ttl_ms}`.
const WINDOW_SCRIPT: &str = r#"
local limit = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current >= limit then
  local ttl = redis.call('PTTL', KEYS[1])
  if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], window)
    ttl = window
  end
  return {0, current, ttl}
end
current = redis.call('INCR', KEYS[1])
local ttl = redis.call('PTTL', KEYS[1])
if current == 1 or ttl < 0 then
  redis.call('PEXPIRE', KEYS[1], window)
  ttl = window
end
return {1, current, ttl}
"#;

pub(crate) fn window_script() -> Script {
    Script::new(WINDOW_SCRIPT)
}

/// Result of one hit against a rate window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    /// Whether the hit was counted.
    pub allowed: bool,
    /// The counter value after this hit.
    pub count: u64,
    /// Time left in the current window.
    pub ttl: Duration,
}

impl WindowHit {
    pub(crate) fn from_script((allowed, count, ttl_ms): (i64, i64, i64)) -> Self {
        Self {
            allowed: allowed == 1,
            count: count.max(0) as u64,
            ttl: Duration::from_millis(ttl_ms.max(0) as u64),
        }
    }
}

/// How a scan batch is deleted.
#[derive(Debug, Clone, Copy)]
pub(crate) enum DeleteMode {
    /// One multi-key `DEL` per batch.
    Batch,
    /// A pipeline of single-key `DEL`s; required on cluster nodes, where a
    /// batch may span hash slots.
    PerKey,
}

/// Cursor-based `SCAN MATCH` + `DEL` on one connection, until the cursor
/// returns to zero. Only keys accepted by `filter` are deleted.
pub(crate) async fn scan_and_delete<C>(
    conn: &mut C,
    pattern: &str,
    filter: KeyFilter<'_>,
    mode: DeleteMode,
) -> StoreResult<u64>
where
    C: ConnectionLike + Send,
{
    let mut cursor: u64 = 0;
    let mut deleted: u64 = 0;

    loop {
        let (next, mut keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(SCAN_BATCH)
            .query_async(&mut *conn)
            .await?;

        keys.retain(|key| filter(key.as_str()));
        if !keys.is_empty() {
            deleted += match mode {
                DeleteMode::Batch => {
                    let n: u64 = redis::cmd("DEL").arg(&keys).query_async(&mut *conn).await?;
                    n
                }
                DeleteMode::PerKey => {
                    let mut pipe = redis::pipe();
                    for key in &keys {
                        pipe.del(key);
                    }
                    let counts: Vec<u64> = pipe.query_async(&mut *conn).await?;
                    counts.iter().sum()
                }
            };
        }

        if next == 0 {
            break;
        }
        cursor = next;
    }

    Ok(deleted)
}

#[derive(Clone)]
enum Backend {
    Single(SingleNodeStore),
    Cluster(ClusterStore),
    Memory(MemoryStore),
}

/// Topology-agnostic store handle.
#[derive(Clone)]
pub struct StoreClient {
    backend: Backend,
    command_timeout: Option<Duration>,
}

impl std::fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreClient")
            .field("topology", &self.topology())
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

impl StoreClient {
    /// Connects to the store described by `config`.
    ///
    /// The topology is derived from the address: several comma-separated
    /// endpoints select the cluster backend.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let backend = match config.topology() {
            StoreTopology::Single => Backend::Single(SingleNodeStore::connect(config).await?),
            StoreTopology::Cluster => Backend::Cluster(ClusterStore::connect(config).await?),
            StoreTopology::Memory => Backend::Memory(MemoryStore::new()),
        };

        Ok(Self {
            backend,
            command_timeout: config.command_timeout,
        })
    }

    /// An in-process store with no deadline.
    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory(MemoryStore::new()),
            command_timeout: None,
        }
    }

    /// Replaces the per-call deadline.
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn topology(&self) -> StoreTopology {
        match self.backend {
            Backend::Single(_) => StoreTopology::Single,
            Backend::Cluster(_) => StoreTopology::Cluster,
            Backend::Memory(_) => StoreTopology::Memory,
        }
    }

    async fn guard<T, F>(&self, call: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match self.command_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| StoreError::Timeout(limit))?,
            None => call.await,
        }
    }

    /// Reads a value.
    pub async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.guard(async {
            match &self.backend {
                Backend::Single(s) => s.get(key).await,
                Backend::Cluster(s) => s.get(key).await,
                Backend::Memory(s) => s.get(key),
            }
        })
        .await
    }

    /// Writes a value. `ttl_minutes <= 0` stores it without expiry.
    pub async fn set(&self, key: &str, value: &[u8], ttl_minutes: i64) -> StoreResult<()> {
        self.guard(async {
            match &self.backend {
                Backend::Single(s) => s.set(key, value, ttl_minutes).await,
                Backend::Cluster(s) => s.set(key, value, ttl_minutes).await,
                Backend::Memory(s) => s.set(key, value, ttl_minutes),
            }
        })
        .await
    }

    /// Deletes one key. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.guard(async {
            match &self.backend {
                Backend::Single(s) => s.delete(key).await,
                Backend::Cluster(s) => s.delete(key).await,
                Backend::Memory(s) => s.delete(key),
            }
        })
        .await
    }

    pub async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.guard(async {
            match &self.backend {
                Backend::Single(s) => s.exists(key).await,
                Backend::Cluster(s) => s.exists(key).await,
                Backend::Memory(s) => s.exists(key),
            }
        })
        .await
    }

    /// Resets the TTL of an existing key. Returns whether the key existed.
    pub async fn expire(&self, key: &str, ttl_minutes: i64) -> StoreResult<bool> {
        self.guard(async {
            match &self.backend {
                Backend::Single(s) => s.expire(key, ttl_minutes).await,
                Backend::Cluster(s) => s.expire(key, ttl_minutes).await,
                Backend::Memory(s) => s.expire(key, ttl_minutes),
            }
        })
        .await
    }

    /// Deletes every key matching a glob pattern and returns how many went.
    ///
    /// On a cluster this runs on every primary and fails as a whole if any
    /// shard fails. Deletes are idempotent, so the call can be retried.
    pub async fn delete_by_pattern(&self, pattern: &str) -> StoreResult<u64> {
        self.delete_matching(pattern, &|_| true).await
    }

    /// Like [`delete_by_pattern`](Self::delete_by_pattern), but keeps any
    /// matched key that `filter` rejects.
    pub async fn delete_matching(&self, pattern: &str, filter: KeyFilter<'_>) -> StoreResult<u64> {
        if pattern.is_empty() {
            return Ok(0);
        }
        self.guard(async {
            match &self.backend {
                Backend::Single(s) => s.delete_by_pattern(pattern, filter).await,
                Backend::Cluster(s) => s.delete_by_pattern(pattern, filter).await,
                Backend::Memory(s) => s.delete_by_pattern(pattern, filter),
            }
        })
        .await
    }

    /// Counts one hit against a fixed window, atomically.
    pub async fn hit_window(&self, key: &str, limit: u64, window: Duration) -> StoreResult<WindowHit> {
        self.guard(async {
            match &self.backend {
                Backend::Single(s) => s.hit_window(key, limit, window).await,
                Backend::Cluster(s) => s.hit_window(key, limit, window).await,
                Backend::Memory(s) => Ok(s.hit_window(key, limit, window)),
            }
        })
        .await
    }

    /// Round-trips a `PING`.
    pub async fn ping(&self) -> StoreResult<()> {
        self.guard(async {
            match &self.backend {
                Backend::Single(s) => s.ping().await,
                Backend::Cluster(s) => s.ping().await,
                Backend::Memory(_) => Ok(()),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_client_round_trip() {
        let store = StoreClient::memory();
        assert_eq!(store.topology(), StoreTopology::Memory);

        store.set("k", b"v", 0).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert!(store.exists("k").await.unwrap());
        assert!(store.delete("k").await.unwrap());
        assert!(!store.exists("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn empty_pattern_deletes_nothing() {
        let store = StoreClient::memory();
        store.set("k", b"v", 0).await.unwrap();
        assert_eq!(store.delete_by_pattern("").await.unwrap(), 0);
        assert!(store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn filtered_delete_keeps_rejected_matches() {
        let store = StoreClient::memory();
        store.set("Jwt::u1::phone-1", b"a", 0).await.unwrap();
        store.set("Jwt::u1::phone-2-1", b"b", 0).await.unwrap();

        let removed = store
            .delete_matching("Jwt::u1::phone-*", &|key| !key.contains("phone-2"))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.exists("Jwt::u1::phone-2-1").await.unwrap());
    }

    #[test]
    fn ttl_conversion_rejects_overflow() {
        assert_eq!(ttl_seconds(0).unwrap(), None);
        assert_eq!(ttl_seconds(-3).unwrap(), None);
        assert_eq!(ttl_seconds(2).unwrap(), Some(120));
        assert!(matches!(ttl_seconds(i64::MAX / 30), Err(StoreError::InvalidTtl(_))));
    }

    #[tokio::test]
    async fn set_with_overflowing_ttl_is_an_error() {
        let store = StoreClient::memory();
        assert!(matches!(
            store.set("k", b"v", i64::MAX).await,
            Err(StoreError::InvalidTtl(_))
        ));
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_surface_as_timeouts() {
        let store = StoreClient::memory().with_command_timeout(Some(Duration::from_millis(50)));
        let res: StoreResult<()> = store
            .guard(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(res, Err(StoreError::Timeout(d)) if d == Duration::from_millis(50)));
    }

    #[test]
    fn window_hit_from_script_reply() {
        let hit = WindowHit::from_script((1, 2, 900));
        assert!(hit.allowed);
        assert_eq!(hit.count, 2);
        assert_eq!(hit.ttl, Duration::from_millis(900));

        let denied = WindowHit::from_script((0, 3, -2));
        assert!(!denied.allowed);
        assert_eq!(denied.ttl, Duration::ZERO);
    }
}
