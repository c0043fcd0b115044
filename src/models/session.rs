use serde::{Deserialize, Serialize};

/// The claim set carried by every token.
///
/// Field names on the wire are `id`, `name`, `kind`, `did`, `iss`, `iat`
/// and `exp`. `exp == 0` means the token never expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// The ID of the user this token belongs to.
    pub id: String,
    /// The user's login name.
    pub name: String,
    /// The user's kind. Opaque to the engine.
    pub kind: String,
    /// The device the token was issued to.
    #[serde(rename = "did")]
    pub device_id: String,
    /// The signing authority.
    #[serde(rename = "iss")]
    pub issuer: String,
    /// Unix seconds when the token was issued.
    #[serde(rename = "iat")]
    pub issued_at: i64,
    /// Unix seconds when the token expires, or 0.
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

impl Claims {
    /// Returns `true` if the token has an expiry and it is at or before `now`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at > 0 && self.expires_at <= now
    }
}

/// Represents one issued, signed token.
///
/// This is also the value cached under the session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The verified claim set.
    pub claims: Claims,
    /// The serialized token. Never part of the signed claims.
    pub token: String,
}
