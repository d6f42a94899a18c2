// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stable identifiers: [`StableId`] for bucketing/allowlists and
//! [`FeatureId`] for feature resolution.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Canonical prefix of every serialized [`FeatureId`].
pub const FEATURE_ID_PREFIX: &str = "feature";

/// Separator between [`FeatureId`] segments.
const SEGMENT_SEPARATOR: &str = "::";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures constructing an identifier from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The stable id was empty or whitespace-only.
    #[error("stable id must not be blank")]
    Blank,

    /// The stable id exceeds 128 bits (32 hex characters).
    #[error("stable id '{0}' is longer than 32 hex characters")]
    TooLong(String),

    /// The stable id contains a character outside `[0-9a-f]`.
    #[error("stable id '{id}' contains non-hex character '{ch}'")]
    NonHex {
        /// Offending id (already lowercased).
        id: String,
        /// First non-hex character found.
        ch: char,
    },

    /// The string is not of the form `feature::<namespace>::<key>`.
    #[error("malformed feature id '{0}' (expected feature::<namespace>::<key>)")]
    MalformedFeatureId(String),

    /// A namespace or key segment is empty or contains `:` / whitespace.
    #[error("{what} '{value}' must be non-empty and free of ':' and whitespace")]
    InvalidSegment {
        /// Which segment was rejected (`"namespace"` or `"key"`).
        what: &'static str,
        /// The rejected value.
        value: String,
    },
}

// ---------------------------------------------------------------------------
// StableId
// ---------------------------------------------------------------------------

/// A stable, canonical-hex identity used for deterministic bucketing and
/// allowlist membership.
///
/// The canonical form is lowercase hex, at most 32 characters (128 bits).
/// A `StableId` is never interpreted — it only ever feeds the bucketing
/// hash and set lookups.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct StableId(String);

impl StableId {
    /// Maximum canonical length in hex characters.
    pub const MAX_HEX_LEN: usize = 32;

    /// Derive a stable id by hashing arbitrary input bytes.
    ///
    /// Uses the first 16 bytes of SHA-256, hex-encoded. Two calls with the
    /// same input always produce the same id.
    pub fn of(input: impl AsRef<[u8]>) -> Self {
        let digest = Sha256::digest(input.as_ref());
        let hex = format!("{digest:x}");
        Self(hex[..Self::MAX_HEX_LEN].to_string())
    }

    /// Adopt a pre-computed hex id.
    ///
    /// Uppercase hex is accepted and lowercased; blank, overlong, or
    /// non-hex input is rejected.
    pub fn from_hex(hex: impl Into<String>) -> Result<Self, IdError> {
        let hex = hex.into().to_ascii_lowercase();
        if hex.trim().is_empty() {
            return Err(IdError::Blank);
        }
        if hex.len() > Self::MAX_HEX_LEN {
            return Err(IdError::TooLong(hex));
        }
        if let Some(ch) = hex.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(IdError::NonHex { id: hex, ch });
        }
        Ok(Self(hex))
    }

    /// The canonical lowercase hex form.
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for StableId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::from_hex(raw).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// FeatureId
// ---------------------------------------------------------------------------

/// Canonical identity of a feature: `feature::<namespace>::<key>`.
///
/// Ordered component-wise (namespace, then key), which keeps
/// configurations and encoded documents deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureId {
    namespace: String,
    key: String,
}

impl FeatureId {
    /// Build a feature id from its segments.
    ///
    /// Segments must be non-empty and free of `:` and whitespace.
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Result<Self, IdError> {
        let namespace = namespace.into();
        let key = key.into();
        validate_segment("namespace", &namespace)?;
        validate_segment("key", &key)?;
        Ok(Self { namespace, key })
    }

    /// Parse a canonical `feature::<namespace>::<key>` string.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        let malformed = || IdError::MalformedFeatureId(raw.to_string());
        let rest = raw
            .strip_prefix(FEATURE_ID_PREFIX)
            .and_then(|r| r.strip_prefix(SEGMENT_SEPARATOR))
            .ok_or_else(malformed)?;
        let (namespace, key) = rest.split_once(SEGMENT_SEPARATOR).ok_or_else(malformed)?;
        Self::new(namespace, key).map_err(|_| malformed())
    }

    /// The namespace seed segment.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The key segment.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The canonical serialized form.
    pub fn canonical(&self) -> String {
        format!("{FEATURE_ID_PREFIX}{SEGMENT_SEPARATOR}{}{SEGMENT_SEPARATOR}{}", self.namespace, self.key)
    }
}

fn validate_segment(what: &'static str, value: &str) -> Result<(), IdError> {
    if value.is_empty() || value.contains(':') || value.chars().any(char::is_whitespace) {
        return Err(IdError::InvalidSegment {
            what,
            value: value.to_string(),
        });
    }
    Ok(())
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{FEATURE_ID_PREFIX}{SEGMENT_SEPARATOR}{}{SEGMENT_SEPARATOR}{}",
            self.namespace, self.key
        )
    }
}

impl Serialize for FeatureId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.canonical())
    }
}

impl<'de> Deserialize<'de> for FeatureId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
