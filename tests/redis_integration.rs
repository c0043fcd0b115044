//! Runs against a live Redis. Start one and run with
//! `cargo test --test redis_integration -- --ignored`.

use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;

use sessionguard::config::StoreConfig;
use sessionguard::{AppError, KeySpace, RateLimiter, SessionCache, StoreClient, TokenCodec};

const PUBLIC: &[u8] = include_bytes!("fixtures/primary_public.pem");
const PRIVATE: &[u8] = include_bytes!("fixtures/primary_private.pem");

static REDIS_URL: Lazy<String> =
    Lazy::new(|| std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6380/".to_string()));

static REDIS_CLIENT: Lazy<redis::Client> = Lazy::new(|| redis::Client::open(REDIS_URL.as_str()).unwrap());

async fn get_redis_conn() -> ConnectionManager {
    REDIS_CLIENT.get_connection_manager().await.unwrap()
}

fn unique(tag: &str) -> String {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    format!("{}{}", tag, nanos)
}

async fn store() -> StoreClient {
    StoreClient::connect(&StoreConfig::new(REDIS_URL.as_str())).await.unwrap()
}

/// Each test gets its own prefix so runs never see each other's keys.
async fn cache(ttl_minutes: i64) -> SessionCache {
    SessionCache::new(
        TokenCodec::from_pem(PUBLIC, PRIVATE).unwrap(),
        KeySpace::new(unique("Test"), "::"),
        store().await,
        ttl_minutes,
    )
}

#[tokio::test]
#[ignore]
async fn session_key_carries_the_configured_ttl() {
    let cache = cache(5).await;
    let session = cache.sign_and_cache("u1", "alice", "admin", "d1", "tests").await.unwrap();

    let key = cache.key_space().session_key("u1", "d1", session.claims.issued_at);
    let mut con = get_redis_conn().await;
    let ttl: i64 = redis::cmd("TTL").arg(&key).query_async(&mut con).await.unwrap();
    assert!(ttl > 290 && ttl <= 300, "ttl was {}", ttl);

    assert!(cache.revoke_session("u1", "d1", session.claims.issued_at).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn zero_ttl_session_has_no_expiry() {
    let cache = cache(0).await;
    let session = cache.sign_and_cache("u1", "alice", "admin", "d1", "tests").await.unwrap();

    let key = cache.key_space().session_key("u1", "d1", session.claims.issued_at);
    let mut con = get_redis_conn().await;
    let ttl: i64 = redis::cmd("TTL").arg(&key).query_async(&mut con).await.unwrap();
    assert_eq!(ttl, -1);

    cache.revoke_user("u1").await.unwrap();
}

#[tokio::test]
#[ignore]
async fn revoke_user_removes_more_than_one_scan_batch() {
    let cache = cache(5).await;
    for n in 0..150 {
        cache
            .sign_and_cache("u1", "alice", "admin", &format!("d{}", n), "tests")
            .await
            .unwrap();
    }
    let survivor = cache.sign_and_cache("u10", "bob", "user", "d1", "tests").await.unwrap();

    assert_eq!(cache.revoke_user("u1").await.unwrap(), 150);
    assert!(cache.exists_in_cache(&survivor).await.unwrap());
    assert_eq!(cache.revoke_user("u10").await.unwrap(), 1);
}

#[tokio::test]
#[ignore]
async fn device_revocation_spares_dashed_sibling_devices() {
    let cache = cache(5).await;
    let sibling = cache.sign_and_cache("u1", "alice", "admin", "phone-2", "tests").await.unwrap();
    cache.sign_and_cache("u1", "alice", "admin", "phone", "tests").await.unwrap();

    assert_eq!(cache.revoke_device("u1", "phone").await.unwrap(), 1);
    assert!(cache.exists_in_cache(&sibling).await.unwrap());
    cache.revoke_user("u1").await.unwrap();
}

#[tokio::test]
#[ignore]
async fn revoked_session_fails_validation() {
    let cache = cache(5).await;
    let session = cache.sign_and_cache("u1", "alice", "admin", "d1", "tests").await.unwrap();
    assert!(cache.validate(&session.token).await.is_ok());

    cache.revoke_device("u1", "d1").await.unwrap();
    assert!(matches!(cache.validate(&session.token).await, Err(AppError::SessionInactive)));
}

#[tokio::test]
#[ignore]
async fn glob_characters_in_prefix_are_literal() {
    let store = store().await;
    let prefix = unique("Lit*");
    let literal = SessionCache::new(
        TokenCodec::from_pem(PUBLIC, PRIVATE).unwrap(),
        KeySpace::new(prefix.clone(), "::"),
        store.clone(),
        5,
    );
    let neighbour = SessionCache::new(
        TokenCodec::from_pem(PUBLIC, PRIVATE).unwrap(),
        KeySpace::new(prefix.replace('*', "X"), "::"),
        store,
        5,
    );

    let kept = neighbour.sign_and_cache("u1", "bob", "user", "d1", "tests").await.unwrap();
    literal.sign_and_cache("u1", "alice", "admin", "d1", "tests").await.unwrap();

    assert_eq!(literal.revoke_user("u1").await.unwrap(), 1);
    assert!(neighbour.exists_in_cache(&kept).await.unwrap());
    neighbour.revoke_user("u1").await.unwrap();
}

#[tokio::test]
#[ignore]
async fn fixed_window_denies_after_limit() {
    let limiter = RateLimiter::new(store().await);
    let key = unique("it:");

    for _ in 0..3 {
        limiter.allow_per_minute(&key, 3).await.unwrap();
    }
    assert!(matches!(
        limiter.allow_per_minute(&key, 3).await,
        Err(AppError::RateLimitExceeded(_))
    ));

    let mut con = get_redis_conn().await;
    let stored: u64 = redis::cmd("GET")
        .arg(format!("rate_limit:{}", key))
        .query_async(&mut con)
        .await
        .unwrap();
    assert_eq!(stored, 3);
    let pttl: i64 = redis::cmd("PTTL")
        .arg(format!("rate_limit:{}", key))
        .query_async(&mut con)
        .await
        .unwrap();
    assert!(pttl > 0 && pttl <= 60_000);
}
