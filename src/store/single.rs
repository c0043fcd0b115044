use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ErrorKind, IntoConnectionInfo, RedisError, Script};

use super::{DeleteMode, KeyFilter, StoreResult, WindowHit, scan_and_delete, ttl_seconds, window_script};
use crate::config::StoreConfig;

/// A single Redis node behind a reconnecting, multiplexed connection.
#[derive(Clone)]
pub struct SingleNodeStore {
    conn: ConnectionManager,
    window: Arc<Script>,
}

impl SingleNodeStore {
    /// Opens the connection manager for the first (and only) endpoint.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let endpoint = config
            .endpoints()
            .into_iter()
            .next()
            .ok_or_else(|| RedisError::from((ErrorKind::InvalidClientConfig, "no store address")))?;

        let mut info = endpoint.as_str().into_connection_info()?;
        info.redis.db = config.db;
        if let Some(password) = &config.password {
            info.redis.password = Some(password.to_string());
        }

        let client = redis::Client::open(info)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("✅ Redis Connection Manager initialized (single node, db {})", config.db);

        Ok(Self {
            conn,
            window: Arc::new(window_script()),
        })
    }

    pub async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let value: Option<Vec<u8>> = self.conn.clone().get(key).await?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &[u8], ttl_minutes: i64) -> StoreResult<()> {
        let _: () = set_command(key, value, ttl_minutes)?
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> StoreResult<bool> {
        let removed: u64 = self.conn.clone().del(key).await?;
        Ok(removed > 0)
    }

    pub async fn exists(&self, key: &str) -> StoreResult<bool> {
        let exists: bool = self.conn.clone().exists(key).await?;
        Ok(exists)
    }

    pub async fn expire(&self, key: &str, ttl_minutes: i64) -> StoreResult<bool> {
        expire_on(&mut self.conn.clone(), key, ttl_minutes).await
    }

    pub async fn delete_by_pattern(&self, pattern: &str, filter: KeyFilter<'_>) -> StoreResult<u64> {
        let deleted = scan_and_delete(&mut self.conn.clone(), pattern, filter, DeleteMode::Batch).await?;
        tracing::debug!("🧹 Deleted {} keys matching {}", deleted, pattern);
        Ok(deleted)
    }

    pub async fn hit_window(&self, key: &str, limit: u64, window: Duration) -> StoreResult<WindowHit> {
        let reply: (i64, i64, i64) = self
            .window
            .key(key)
            .arg(limit)
            .arg(window.as_millis() as u64)
            .invoke_async(&mut self.conn.clone())
            .await?;
        Ok(WindowHit::from_script(reply))
    }

    pub async fn ping(&self) -> StoreResult<()> {
        let _: String = redis::cmd("PING").query_async(&mut self.conn.clone()).await?;
        Ok(())
    }
}

/// `SET key value [EX seconds]`, so the value and its TTL land together.
pub(crate) fn set_command(key: &str, value: &[u8], ttl_minutes: i64) -> StoreResult<redis::Cmd> {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(value);
    if let Some(secs) = ttl_seconds(ttl_minutes)? {
        cmd.arg("EX").arg(secs);
    }
    Ok(cmd)
}

/// `EXPIRE` for positive TTLs, `PERSIST` otherwise.
pub(crate) async fn expire_on<C>(conn: &mut C, key: &str, ttl_minutes: i64) -> StoreResult<bool>
where
    C: redis::aio::ConnectionLike + Send,
{
    if let Some(secs) = ttl_seconds(ttl_minutes)? {
        let updated: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(secs)
            .query_async(&mut *conn)
            .await?;
        Ok(updated == 1)
    } else {
        // PERSIST answers 0 for keys without a TTL, so ask EXISTS instead.
        let _: i64 = redis::cmd("PERSIST").arg(key).query_async(&mut *conn).await?;
        let exists: bool = redis::cmd("EXISTS").arg(key).query_async(&mut *conn).await?;
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn set_command_carries_ttl_in_seconds() {
        let cmd = set_command("k", b"v", 2).unwrap();
        let args: Vec<Vec<u8>> = cmd
            .args_iter()
            .filter_map(|arg| match arg {
                redis::Arg::Simple(bytes) => Some(bytes.to_vec()),
                redis::Arg::Cursor => None,
            })
            .collect();
        assert_eq!(args, vec![b"SET".to_vec(), b"k".to_vec(), b"v".to_vec(), b"EX".to_vec(), b"120".to_vec()]);

        assert_eq!(set_command("k", b"v", 0).unwrap().args_iter().count(), 3);
        assert!(matches!(set_command("k", b"v", i64::MAX), Err(StoreError::InvalidTtl(_))));
    }
}
