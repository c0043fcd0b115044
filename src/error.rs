use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::time::Duration;
use thiserror::Error;

/// Failures raised by the key-value store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A Redis command failed.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A pattern delete did not complete on every shard.
    ///
    /// Some keys may already be gone; the whole call must be retried.
    #[error("Pattern delete failed on {failed} of {total} shards ({deleted} keys removed): {first}")]
    PartialFanOut {
        failed: usize,
        total: usize,
        deleted: u64,
        first: String,
    },

    /// The call did not finish before the configured deadline.
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    /// A cached value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A TTL too large to express in seconds.
    #[error("TTL of {0} minutes is out of range")]
    InvalidTtl(i64),

    /// A key pattern could not be compiled.
    #[error("Invalid key pattern: {0}")]
    Pattern(String),
}

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Signing failed (missing or unusable private key).
    #[error("Token signing failed: {0}")]
    Signature(String),

    /// Key material could not be parsed.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The token is unparsable, badly signed or uses the wrong algorithm.
    #[error("Token format error")]
    TokenFormat,

    /// The token was issued with an incompatible claim schema.
    #[error("Token version error: missing claim `{0}`")]
    TokenVersion(&'static str),

    /// The token verified but its `exp` has passed.
    #[error("Token expired")]
    TokenExpired,

    /// The token verified but its session is no longer cached.
    #[error("Session is not active")]
    SessionInactive,

    /// A store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A rate limit exceeded error.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// An authentication error.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::Store(StoreError::Redis(e))
    }
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Signature(ref msg) => {
                tracing::error!("Token signing failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Token signing failed".to_string())
            }

            AppError::InvalidKey(ref msg) => {
                tracing::error!("Invalid key: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }

            AppError::TokenFormat => {
                tracing::warn!("Rejected malformed token");
                (StatusCode::UNAUTHORIZED, "Invalid token".to_string())
            }

            AppError::TokenVersion(claim) => {
                tracing::warn!("Rejected token without claim `{}`", claim);
                (StatusCode::UNAUTHORIZED, "Unsupported token version".to_string())
            }

            AppError::TokenExpired => {
                tracing::debug!("Rejected expired token");
                (StatusCode::UNAUTHORIZED, "Token expired".to_string())
            }

            AppError::SessionInactive => {
                tracing::debug!("Rejected token for inactive session");
                (StatusCode::UNAUTHORIZED, "Session is not active".to_string())
            }

            AppError::Store(ref e) => {
                tracing::error!("Store error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Cache error".to_string())
            }

            AppError::RateLimitExceeded(ref msg) => {
                tracing::warn!("Rate limit exceeded: {}", msg);
                (StatusCode::TOO_MANY_REQUESTS, msg.clone())
            }

            AppError::Authentication(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                (StatusCode::UNAUTHORIZED, msg.clone())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_errors_map_to_unauthorized() {
        for err in [
            AppError::TokenFormat,
            AppError::TokenVersion("did"),
            AppError::TokenExpired,
            AppError::SessionInactive,
            AppError::Authentication("missing header".into()),
        ] {
            assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn partial_fan_out_is_a_server_error() {
        let err: AppError = StoreError::PartialFanOut {
            failed: 1,
            total: 3,
            deleted: 4,
            first: "connection refused".into(),
        }
        .into();
        assert!(err.to_string().contains("1 of 3 shards"));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn rate_limit_maps_to_too_many_requests() {
        let res = AppError::RateLimitExceeded("slow down".into()).into_response();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
