//! Signed session tokens backed by a Redis session cache.
//!
//! Tokens are RS256 JWTs. A token is accepted only while its cache key
//! exists, which lets a user, a device or a single session be revoked
//! before the token itself expires. The same store backs a fixed-window
//! rate limiter.

pub mod config;
pub mod error;
pub mod keyspace;
pub mod router;
pub mod state;
pub mod store;

pub mod crypto {
    pub mod token;
}

pub mod models {
    pub mod session;
}

pub mod services {
    pub mod rate_limit;
    pub mod sessions;
}

pub mod handlers {
    pub mod health;
    pub mod sessions;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod rate_limit;
}

pub mod validation {
    pub mod session;
}

pub use config::Config;
pub use crypto::token::TokenCodec;
pub use error::{AppError, Result, StoreError};
pub use keyspace::KeySpace;
pub use models::session::{Claims, Session};
pub use services::rate_limit::{RateDecision, RateLimit, RateLimiter, RateWindow};
pub use services::sessions::SessionCache;
pub use state::AppState;
pub use store::StoreClient;
