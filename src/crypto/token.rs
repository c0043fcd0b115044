//! RS256 signing and verification of session tokens.
//!
//! Verification needs only the public key, so any instance holding it can
//! check tokens issued elsewhere. It never consults the cache: a token can
//! verify while its session is already revoked.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::session::Claims;

/// The claim set as it appears on the wire, every field optional so that
/// tokens from an older schema can be told apart from malformed ones.
#[derive(Deserialize)]
struct WireClaims {
    id: Option<String>,
    name: Option<String>,
    kind: Option<String>,
    did: Option<String>,
    iss: Option<String>,
    iat: Option<f64>,
    exp: Option<f64>,
}

impl WireClaims {
    fn into_claims(self) -> Result<Claims> {
        Ok(Claims {
            id: self.id.ok_or(AppError::TokenVersion("id"))?,
            name: self.name.ok_or(AppError::TokenVersion("name"))?,
            kind: self.kind.ok_or(AppError::TokenVersion("kind"))?,
            device_id: self.did.ok_or(AppError::TokenVersion("did"))?,
            issuer: self.iss.ok_or(AppError::TokenVersion("iss"))?,
            issued_at: self.iat.ok_or(AppError::TokenVersion("iat"))? as i64,
            expires_at: self.exp.ok_or(AppError::TokenVersion("exp"))? as i64,
        })
    }
}

/// Signs and verifies tokens with one RSA key pair.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: Option<EncodingKey>,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    /// Creates a codec that can both sign and verify.
    ///
    /// # Arguments
    ///
    /// * `public_pem` - PEM-encoded RSA public key.
    /// * `private_pem` - PEM-encoded RSA private key (PKCS#1 or PKCS#8).
    pub fn from_pem(public_pem: &[u8], private_pem: &[u8]) -> Result<Self> {
        let encoding = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| AppError::InvalidKey(format!("Invalid private key: {}", e)))?;
        let mut codec = Self::verify_only(public_pem)?;
        codec.encoding = Some(encoding);
        Ok(codec)
    }

    /// Creates a codec that only verifies. [`sign`](Self::sign) fails with
    /// [`AppError::Signature`].
    pub fn verify_only(public_pem: &[u8]) -> Result<Self> {
        let decoding = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| AppError::InvalidKey(format!("Invalid public key: {}", e)))?;

        let mut validation = Validation::new(Algorithm::RS256);
        // Only accept RS256
        validation.algorithms = vec![Algorithm::RS256];
        // exp == 0 means "never"; expiry and required claims are checked here.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Ok(Self {
            encoding: None,
            decoding,
            validation,
        })
    }

    pub fn can_sign(&self) -> bool {
        self.encoding.is_some()
    }

    /// Signs a claim set and returns the serialized token.
    pub fn sign(&self, claims: &Claims) -> Result<String> {
        let key = self
            .encoding
            .as_ref()
            .ok_or_else(|| AppError::Signature("private key not configured".to_string()))?;

        encode(&Header::new(Algorithm::RS256), claims, key)
            .map_err(|e| AppError::Signature(format!("Encoding failed: {}", e)))
    }

    /// Verifies a token's signature, algorithm and claim shape.
    ///
    /// # Errors
    ///
    /// - `AppError::TokenFormat` - unparsable, wrong algorithm or bad signature
    /// - `AppError::TokenVersion` - a required claim is missing
    /// - `AppError::TokenExpired` - `exp` is set and has passed
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let data = decode::<WireClaims>(token, &self.decoding, &self.validation).map_err(|e| {
            tracing::debug!("Token rejected: {:?}", e.kind());
            AppError::TokenFormat
        })?;

        let claims = data.claims.into_claims()?;
        if claims.is_expired_at(Utc::now().timestamp()) {
            return Err(AppError::TokenExpired);
        }

        Ok(claims)
    }
}
