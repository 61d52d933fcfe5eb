//! SHA-256 digests as published by package indexes.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

/// Error returned when a digest string is not a SHA-256 hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid sha256 digest '{0}': expected 64 hex characters")]
pub struct HashError(pub String);

/// A validated SHA-256 digest (64 lower-case hex characters).
///
/// Index listings publish digests as `sha256=<hex>` fragments or
/// `{"sha256": "<hex>"}` maps. Both end up here, so an invalid digest is
/// rejected when the listing is read rather than when the wheel is checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Sha256Hash(String);

impl Sha256Hash {
    /// Validate and normalize a digest. A `sha256:` or `sha256=` prefix is
    /// accepted and stripped.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the hex part is not exactly 64 hex digits.
    pub fn new(s: &str) -> Result<Self, HashError> {
        let trimmed = s.trim();
        let hex = trimmed
            .strip_prefix("sha256:")
            .or_else(|| trimmed.strip_prefix("sha256="))
            .unwrap_or(trimmed);
        if hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self(hex.to_ascii_lowercase()))
        } else {
            Err(HashError(s.to_string()))
        }
    }

    /// Hex digest of raw bytes already hashed by the caller.
    pub fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    /// Return the hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Sha256Hash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Sha256Hash {
    type Error = HashError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for Sha256Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(&s).map_err(serde::de::Error::custom)
    }
}
