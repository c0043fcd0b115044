//! Cache key derivation for sessions.
//!
//! Keys have the shape `<prefix><sep><userId><sep><deviceId>-<issuedAt>`.
//! The two ancestor prefixes (`prefix::userId` and `prefix::userId::deviceId`)
//! are only ever used through glob patterns, never as literal keys.

use crate::config::{DEFAULT_PREFIX, DEFAULT_SEPARATOR};

/// Joins the device id and the issue timestamp in the last key segment.
pub const DEVICE_IAT_JOINER: &str = "-";

/// Deterministic mapping from (user, device, timestamp) to store keys.
///
/// The separator must not occur inside identifiers; callers enforce that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
    separator: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX, DEFAULT_SEPARATOR)
    }
}

impl KeySpace {
    /// Creates a key space. Empty values fall back to the defaults.
    pub fn new(prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let separator = separator.into();
        Self {
            prefix: if prefix.is_empty() { DEFAULT_PREFIX.to_string() } else { prefix },
            separator: if separator.is_empty() { DEFAULT_SEPARATOR.to_string() } else { separator },
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// The full key of one session.
    pub fn session_key(&self, user_id: &str, device_id: &str, issued_at: i64) -> String {
        format!(
            "{}{}{}{}{}{}{}",
            self.prefix, self.separator, user_id, self.separator, device_id, DEVICE_IAT_JOINER, issued_at
        )
    }

    /// Prefix shared by every session of a user on one device.
    pub fn device_prefix(&self, user_id: &str, device_id: &str) -> String {
        format!(
            "{}{}{}{}{}",
            self.prefix, self.separator, user_id, self.separator, device_id
        )
    }

    /// Prefix shared by every session of a user.
    pub fn user_prefix(&self, user_id: &str) -> String {
        format!("{}{}{}", self.prefix, self.separator, user_id)
    }

    /// Glob matching every session of a user.
    ///
    /// The wildcard sits after the separator so `u1` never matches `u10`.
    pub fn user_pattern(&self, user_id: &str) -> String {
        format!(
            "{}{}{}{}*",
            escape_glob(&self.prefix),
            escape_glob(&self.separator),
            escape_glob(user_id),
            escape_glob(&self.separator)
        )
    }

    /// Whether `key` is a session key of exactly this user and device.
    ///
    /// The device glob also matches devices whose id extends `device_id`
    /// with `-...` (`phone` vs `phone-2`); only a numeric tail after the
    /// joiner belongs to this device.
    pub fn is_device_session_key(&self, key: &str, user_id: &str, device_id: &str) -> bool {
        key.strip_prefix(self.device_prefix(user_id, device_id).as_str())
            .and_then(|rest| rest.strip_prefix(DEVICE_IAT_JOINER))
            .is_some_and(|iat| !iat.is_empty() && iat.bytes().all(|b| b.is_ascii_digit()))
    }

    /// Glob matching every session of a user on one device, and of any
    /// device whose id extends it with `-`. Narrow the matches with
    /// [`is_device_session_key`](Self::is_device_session_key).
    ///
    /// The wildcard sits after the joiner so `d1` never matches `d10`.
    pub fn device_pattern(&self, user_id: &str, device_id: &str) -> String {
        format!(
            "{}{}{}{}{}{}*",
            escape_glob(&self.prefix),
            escape_glob(&self.separator),
            escape_glob(user_id),
            escape_glob(&self.separator),
            escape_glob(device_id),
            DEVICE_IAT_JOINER
        )
    }
}

/// Backslash-escapes the characters the store's glob matcher treats specially.
pub fn escape_glob(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '{' | '}' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
