//! In-process store for tests and local development.
//!
//! Expiry is checked lazily on access against [`tokio::time::Instant`], so
//! tests running on a paused clock can move through TTLs and rate windows
//! with `tokio::time::advance`. Patterns use the same glob rules as Redis,
//! including backslash escapes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use globset::GlobBuilder;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{KeyFilter, StoreResult, WindowHit, ttl_seconds};
use crate::error::StoreError;

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// `HashMap`-backed store. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

/// Deadline for a TTL in minutes. A deadline past what `Instant` can hold
/// is treated as no expiry.
fn deadline(now: Instant, ttl_minutes: i64) -> StoreResult<Option<Instant>> {
    Ok(ttl_seconds(ttl_minutes)?.and_then(|secs| now.checked_add(Duration::from_secs(secs))))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub fn set(&self, key: &str, value: &[u8], ttl_minutes: i64) -> StoreResult<()> {
        let expires_at = deadline(Instant::now(), ttl_minutes)?;
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    pub fn delete(&self, key: &str) -> StoreResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .remove(key)
            .is_some_and(|entry| entry.is_live(now)))
    }

    pub fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    pub fn expire(&self, key: &str, ttl_minutes: i64) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.expires_at = deadline(now, ttl_minutes)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn delete_by_pattern(&self, pattern: &str, filter: KeyFilter<'_>) -> StoreResult<u64> {
        let matcher = GlobBuilder::new(pattern)
            .literal_separator(false)
            .backslash_escape(true)
            .build()
            .map_err(|e| StoreError::Pattern(e.to_string()))?
            .compile_matcher();

        let now = Instant::now();
        let mut deleted = 0;
        self.entries.lock().retain(|key, entry| {
            if matcher.is_match(key.as_str()) && filter(key.as_str()) {
                if entry.is_live(now) {
                    deleted += 1;
                }
                false
            } else {
                true
            }
        });

        Ok(deleted)
    }

    pub fn hit_window(&self, key: &str, limit: u64, window: Duration) -> WindowHit {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let live = entries.get(key).filter(|e| e.is_live(now));
        let current: u64 = live
            .and_then(|e| std::str::from_utf8(&e.value).ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let expires_at = live.and_then(|e| e.expires_at).unwrap_or(now + window);
        let ttl = expires_at.saturating_duration_since(now);

        if current >= limit {
            return WindowHit {
                allowed: false,
                count: current,
                ttl,
            };
        }

        let count = current + 1;
        entries.insert(
            key.to_string(),
            Entry {
                value: count.to_string().into_bytes(),
                expires_at: Some(expires_at),
            },
        );

        WindowHit {
            allowed: true,
            count,
            ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = MemoryStore::new();
        store.set("short", b"1", 1).unwrap();
        store.set("forever", b"2", 0).unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.exists("short").unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!store.exists("short").unwrap());
        assert!(store.exists("forever").unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expire_resets_and_clears_ttl() {
        let store = MemoryStore::new();
        store.set("k", b"v", 1).unwrap();
        assert!(store.expire("k", 0).unwrap());

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(store.exists("k").unwrap());

        assert!(store.expire("k", 1).unwrap());
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!store.exists("k").unwrap());
        assert!(!store.expire("k", 1).unwrap());
    }

    #[test]
    fn pattern_delete_matches_globs_only() {
        let store = MemoryStore::new();
        for key in ["Jwt::u1::d1-1", "Jwt::u1::d2-1", "Jwt::u10::d1-1", "other"] {
            store.set(key, b"x", 0).unwrap();
        }

        assert_eq!(store.delete_by_pattern("Jwt::u1::*", &|_| true).unwrap(), 2);
        assert!(store.exists("Jwt::u10::d1-1").unwrap());
        assert!(store.exists("other").unwrap());
    }

    #[test]
    fn escaped_metacharacters_match_literally() {
        let store = MemoryStore::new();
        store.set("Jwt::a*b::d-1", b"x", 0).unwrap();
        store.set("Jwt::axb::d-1", b"x", 0).unwrap();

        assert_eq!(store.delete_by_pattern(r"Jwt::a\*b::*", &|_| true).unwrap(), 1);
        assert!(store.exists("Jwt::axb::d-1").unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn window_counts_up_to_limit_then_resets() {
        let store = MemoryStore::new();
        let window = Duration::from_secs(1);

        for expected in 1..=3 {
            let hit = store.hit_window("rl", 3, window);
            assert!(hit.allowed);
            assert_eq!(hit.count, expected);
        }
        let denied = store.hit_window("rl", 3, window);
        assert!(!denied.allowed);
        assert_eq!(denied.count, 3);

        tokio::time::advance(Duration::from_millis(1001)).await;
        let hit = store.hit_window("rl", 3, window);
        assert!(hit.allowed);
        assert_eq!(hit.count, 1);
    }
}
