use std::env;
use std::time::Duration;
use anyhow::{Context, Result};
use zeroize::Zeroizing;

/// Default cache key prefix.
pub const DEFAULT_PREFIX: &str = "Jwt";
/// Default cache key separator.
pub const DEFAULT_SEPARATOR: &str = "::";
/// Default token issuer.
pub const DEFAULT_ISSUER: &str = "sessionguard";
/// Longest accepted session lifetime: one hundred years.
pub const MAX_EXPIRE_MINUTES: i64 = 100 * 366 * 24 * 60;
/// Default header carrying the issuance credential.
pub const DEFAULT_ISSUE_KEY_HEADER: &str = "X-Issue-Key";

/// How the store is deployed. Decided once from the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreTopology {
    /// One node, addressed directly.
    Single,
    /// A sharded cluster; the address lists several seed nodes.
    Cluster,
    /// In-process store, for tests and local development.
    Memory,
}

impl StoreTopology {
    /// Derives the topology from an address string.
    ///
    /// A comma-separated list of endpoints implies a cluster.
    pub fn from_address(address: &str) -> Self {
        if address.starts_with("memory://") {
            StoreTopology::Memory
        } else if address.contains(',') {
            StoreTopology::Cluster
        } else {
            StoreTopology::Single
        }
    }
}

/// Store connection settings.
#[derive(Clone)]
pub struct StoreConfig {
    /// One address, or several separated by commas for a cluster.
    pub address: String,
    /// Database index (single node only).
    pub db: i64,
    /// Optional password.
    pub password: Option<Zeroizing<String>>,
    /// Deadline applied to every store call.
    pub command_timeout: Option<Duration>,
}

impl StoreConfig {
    /// Creates a config for a single address with no password.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            db: 0,
            password: None,
            command_timeout: None,
        }
    }

    /// Returns the topology implied by the address.
    pub fn topology(&self) -> StoreTopology {
        StoreTopology::from_address(&self.address)
    }

    /// Splits the address into its endpoints, normalised to `redis://` URLs.
    pub fn endpoints(&self) -> Vec<String> {
        self.address
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.contains("://") {
                    s.to_string()
                } else {
                    format!("redis://{}/", s)
                }
            })
            .collect()
    }
}

/// Token and key-space settings.
#[derive(Clone)]
pub struct JwtConfig {
    /// Cache key prefix.
    pub prefix: String,
    /// Cache key separator.
    pub separator: String,
    /// Issuer written into tokens issued by this service.
    pub issuer: String,
    /// Session lifetime in minutes; `<= 0` means never expire.
    pub expire_in_minutes: i64,
    /// RSA public key PEM.
    pub public_key: Vec<u8>,
    /// RSA private key PEM.
    pub private_key: Zeroizing<Vec<u8>>,
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The store settings.
    pub store: StoreConfig,
    /// The token settings.
    pub jwt: JwtConfig,
    /// The header carrying bearer tokens.
    pub auth_header: String,
    /// The schema preceding the token in that header.
    pub auth_header_schema: String,
    /// Per-IP issuance limit per minute.
    pub issue_rate_limit_per_minute: u32,
    /// The header carrying the issuance credential.
    pub issue_key_header: String,
    /// Shared secret a caller must present to issue sessions.
    pub issue_api_key: Zeroizing<String>,
    /// The HTTP listen address.
    pub bind_address: String,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let address = env::var("STORE_ADDRESS")
            .unwrap_or_else(|_| "127.0.0.1:6379".to_string());
        if address.trim().is_empty() {
            anyhow::bail!("STORE_ADDRESS must not be empty");
        }

        let timeout_ms: u64 = env::var("STORE_COMMAND_TIMEOUT_MS")
            .unwrap_or_else(|_| "2000".to_string())
            .parse()
            .context("Invalid STORE_COMMAND_TIMEOUT_MS")?;

        let store = StoreConfig {
            address,
            db: env::var("STORE_DB")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .context("Invalid STORE_DB")?,
            password: env::var("STORE_PASSWORD")
                .ok()
                .filter(|p| !p.is_empty())
                .map(Zeroizing::new),
            command_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
        };

        let public_key = read_pem("JWT_PUBLIC_KEY")?;
        let private_key = Zeroizing::new(read_pem("JWT_PRIVATE_KEY")?);

        let jwt = JwtConfig {
            prefix: non_empty_or("JWT_PREFIX", DEFAULT_PREFIX),
            separator: non_empty_or("JWT_SEPARATOR", DEFAULT_SEPARATOR),
            issuer: non_empty_or("JWT_ISSUER", DEFAULT_ISSUER),
            expire_in_minutes: parse_expire_minutes(
                &env::var("JWT_EXPIRE_MINUTES").unwrap_or_else(|_| "10080".to_string()),
            )?,
            public_key,
            private_key,
        };

        Ok(Self {
            store,
            jwt,
            auth_header: non_empty_or("AUTH_HEADER", "Authorization"),
            auth_header_schema: non_empty_or("AUTH_HEADER_SCHEMA", "Bearer"),
            issue_rate_limit_per_minute: env::var("ISSUE_RATE_LIMIT_PER_MINUTE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid ISSUE_RATE_LIMIT_PER_MINUTE")?,
            issue_key_header: non_empty_or("ISSUE_KEY_HEADER", DEFAULT_ISSUE_KEY_HEADER),
            issue_api_key: env::var("ISSUE_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty())
                .map(Zeroizing::new)
                .context("ISSUE_API_KEY must be set")?,
            bind_address: env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "127.0.0.1:3000".to_string()),
        })
    }
}

/// Parses `JWT_EXPIRE_MINUTES`. Values `<= 0` mean never expire.
fn parse_expire_minutes(raw: &str) -> Result<i64> {
    let minutes: i64 = raw.trim().parse().context("Invalid JWT_EXPIRE_MINUTES")?;
    if minutes > MAX_EXPIRE_MINUTES {
        anyhow::bail!(
            "JWT_EXPIRE_MINUTES must be at most {} (got {})",
            MAX_EXPIRE_MINUTES,
            minutes
        );
    }
    Ok(minutes)
}

fn non_empty_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Reads a PEM block from `NAME` or from the file named by `NAME_FILE`.
fn read_pem(name: &str) -> Result<Vec<u8>> {
    if let Ok(inline) = env::var(name) {
        if !inline.trim().is_empty() {
            // Inline PEM in .env files usually carries escaped newlines.
            return Ok(inline.replace("\\n", "\n").into_bytes());
        }
    }

    let path = env::var(format!("{}_FILE", name))
        .with_context(|| format!("{} or {}_FILE must be set", name, name))?;
    let pem = std::fs::read(&path)
        .with_context(|| format!("Failed to read {} from {}", name, path))?;

    if pem.is_empty() {
        anyhow::bail!("{} file {} is empty", name, path);
    }
    Ok(pem)
}
