//! Session issuance, cache-backed validation and revocation.
//!
//! A session is live while its key exists in the store. Signing writes the
//! key, the store TTL or an explicit revocation removes it, and nothing ever
//! brings it back.

use std::sync::Arc;

use chrono::Utc;

use crate::config::DEFAULT_ISSUER;
use crate::crypto::token::TokenCodec;
use crate::error::{AppError, Result, StoreError};
use crate::keyspace::KeySpace;
use crate::models::session::{Claims, Session};
use crate::store::StoreClient;
use crate::validation::session::validate_identifier;

/// Issues, checks and revokes sessions on top of a codec and a store.
#[derive(Clone)]
pub struct SessionCache {
    codec: Arc<TokenCodec>,
    keys: KeySpace,
    store: StoreClient,
    ttl_minutes: i64,
    default_issuer: String,
}

impl SessionCache {
    /// Creates a new `SessionCache`.
    ///
    /// # Arguments
    ///
    /// * `codec` - Signs and verifies tokens.
    /// * `keys` - Derives cache keys.
    /// * `store` - Holds the cached sessions.
    /// * `ttl_minutes` - Session lifetime; `<= 0` means never expire.
    pub fn new(codec: TokenCodec, keys: KeySpace, store: StoreClient, ttl_minutes: i64) -> Self {
        Self {
            codec: Arc::new(codec),
            keys,
            store,
            ttl_minutes: ttl_minutes.max(0),
            default_issuer: DEFAULT_ISSUER.to_string(),
        }
    }

    /// Sets the issuer used when a caller passes an empty one.
    pub fn with_default_issuer(mut self, issuer: impl Into<String>) -> Self {
        let issuer = issuer.into();
        if !issuer.is_empty() {
            self.default_issuer = issuer;
        }
        self
    }

    pub fn key_space(&self) -> &KeySpace {
        &self.keys
    }

    pub fn store(&self) -> &StoreClient {
        &self.store
    }

    pub fn ttl_minutes(&self) -> i64 {
        self.ttl_minutes
    }

    fn check_ids(&self, id: &str, device_id: Option<&str>) -> Result<()> {
        validate_identifier("id", id, self.keys.separator())?;
        if let Some(device_id) = device_id {
            validate_identifier("device_id", device_id, self.keys.separator())?;
        }
        Ok(())
    }

    /// Deletes the sessions of exactly one device. The glob alone would also
    /// catch `phone-2` when asked for `phone`.
    async fn delete_device_sessions(&self, id: &str, device_id: &str) -> Result<u64> {
        let keys = &self.keys;
        let removed = self
            .store
            .delete_matching(&keys.device_pattern(id, device_id), &|key| {
                keys.is_device_session_key(key, id, device_id)
            })
            .await?;
        Ok(removed)
    }

    /// Signs a token and makes it the only cached session of its device.
    ///
    /// Older sessions of the same (user, device) are deleted first, then the
    /// new one is written. A failure between the two leaves the device with
    /// no live session, never with two.
    pub async fn sign_and_cache(
        &self,
        id: &str,
        name: &str,
        kind: &str,
        device_id: &str,
        issuer: &str,
    ) -> Result<Session> {
        self.check_ids(id, Some(device_id))?;

        let issued_at = Utc::now().timestamp();
        let expires_at = if self.ttl_minutes > 0 {
            self.ttl_minutes
                .checked_mul(60)
                .and_then(|secs| issued_at.checked_add(secs))
                .ok_or_else(|| {
                    AppError::Validation(format!("Session TTL of {} minutes is too large", self.ttl_minutes))
                })?
        } else {
            0
        };

        let claims = Claims {
            id: id.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
            device_id: device_id.to_string(),
            issuer: if issuer.is_empty() {
                self.default_issuer.clone()
            } else {
                issuer.to_string()
            },
            issued_at,
            expires_at,
        };

        let token = self.codec.sign(&claims)?;
        let session = Session { claims, token };
        let payload = sonic_rs::to_vec(&session)
            .map_err(|e| StoreError::Serialization(format!("Session serialization failed: {}", e)))?;

        let superseded = self.delete_device_sessions(id, device_id).await?;

        let key = self.keys.session_key(id, device_id, issued_at);
        self.store.set(&key, &payload, self.ttl_minutes).await?;

        tracing::info!(
            "✅ Session issued for user {} on device {} ({} superseded)",
            id,
            device_id,
            superseded
        );

        Ok(session)
    }

    /// Checks the signature and claim shape only. Does not touch the store.
    pub fn verify(&self, token: &str) -> Result<Session> {
        let claims = self.codec.verify(token)?;
        Ok(Session {
            claims,
            token: token.to_string(),
        })
    }

    /// Whether the session's key is still cached. Absent means revoked or
    /// expired.
    pub async fn exists_in_cache(&self, session: &Session) -> Result<bool> {
        let key = self.keys.session_key(
            &session.claims.id,
            &session.claims.device_id,
            session.claims.issued_at,
        );
        let exists = self.store.exists(&key).await?;
        tracing::debug!("🔑 Session cache {} for {}", if exists { "hit" } else { "miss" }, session.claims.id);
        Ok(exists)
    }

    /// Verifies a token and confirms its session is still live.
    pub async fn validate(&self, token: &str) -> Result<Session> {
        let session = self.verify(token)?;
        if !self.exists_in_cache(&session).await? {
            return Err(AppError::SessionInactive);
        }
        Ok(session)
    }

    /// Reads back the cached copy of a session.
    pub async fn cached_session(
        &self,
        id: &str,
        device_id: &str,
        issued_at: i64,
    ) -> Result<Option<Session>> {
        let key = self.keys.session_key(id, device_id, issued_at);
        let Some(payload) = self.store.get(&key).await? else {
            return Ok(None);
        };

        let session: Session = sonic_rs::from_slice(&payload)
            .map_err(|e| StoreError::Serialization(format!("Invalid cached session: {}", e)))?;
        Ok(Some(session))
    }

    /// Revokes every session of a user, on every device.
    pub async fn revoke_user(&self, id: &str) -> Result<u64> {
        self.check_ids(id, None)?;
        let removed = self.store.delete_by_pattern(&self.keys.user_pattern(id)).await?;
        tracing::info!("🚪 Revoked {} sessions of user {}", removed, id);
        Ok(removed)
    }

    /// Revokes every session of a user on one device.
    pub async fn revoke_device(&self, id: &str, device_id: &str) -> Result<u64> {
        self.check_ids(id, Some(device_id))?;
        let removed = self.delete_device_sessions(id, device_id).await?;
        tracing::info!("🚪 Revoked {} sessions of user {} on device {}", removed, id, device_id);
        Ok(removed)
    }

    /// Revokes exactly one session. Returns whether it was still cached.
    pub async fn revoke_session(&self, id: &str, device_id: &str, issued_at: i64) -> Result<bool> {
        self.check_ids(id, Some(device_id))?;
        let removed = self
            .store
            .delete(&self.keys.session_key(id, device_id, issued_at))
            .await?;
        tracing::info!("🚪 Revoked session {}/{}/{} (existed: {})", id, device_id, issued_at, removed);
        Ok(removed)
    }
}
