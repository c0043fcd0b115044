use crate::config::Config;
use crate::crypto::token::TokenCodec;
use crate::error::Result;
use crate::keyspace::KeySpace;
use crate::services::rate_limit::RateLimiter;
use crate::services::sessions::SessionCache;
use crate::store::StoreClient;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// Session issuance, validation and revocation.
    pub sessions: SessionCache,
    /// Per-key call counters.
    pub limiter: RateLimiter,
    /// The application's configuration.
    pub config: Config,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let codec = TokenCodec::from_pem(&config.jwt.public_key, &config.jwt.private_key)?;
        tracing::info!("✅ RSA key pair loaded");

        let store = StoreClient::connect(&config.store).await?;
        tracing::info!("✅ Store client initialized ({:?})", store.topology());

        let keys = KeySpace::new(config.jwt.prefix.clone(), config.jwt.separator.clone());
        let sessions = SessionCache::new(codec, keys, store.clone(), config.jwt.expire_in_minutes)
            .with_default_issuer(config.jwt.issuer.clone());
        tracing::info!(
            "✅ Session cache initialized (ttl {} min)",
            sessions.ttl_minutes()
        );

        let limiter = RateLimiter::new(store);

        Ok(AppState {
            sessions,
            limiter,
            config: config.clone(),
        })
    }
}
