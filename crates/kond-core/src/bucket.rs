// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deterministic SHA-256 bucketing for percentage rollouts.
//!
//! The bucket of a `(salt, feature_key, stable_id)` triple is stable across
//! processes and platforms. Including the feature key decorrelates rollouts
//! of different features; rotating the salt re-buckets a feature's whole
//! population uniformly.

use crate::id::StableId;
use crate::rampup::RampUp;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Number of rollout buckets.
pub const BUCKET_COUNT: u32 = 10_000;

/// Bucket assigned to contexts that carry no stable id.
///
/// Keeps evaluation total: an id-less context is only ever enrolled by a
/// ramp-up of 100.
pub const MISSING_STABLE_ID_BUCKET: u32 = BUCKET_COUNT - 1;

/// Compute the bucket for a `(salt, feature_key, stable_id)` triple.
///
/// Hashes the UTF-8 bytes of `"{salt}:{feature_key}:{stable_id_hex}"` with
/// SHA-256 and reduces the first four bytes (big-endian) modulo
/// [`BUCKET_COUNT`]. `feature_key` is the canonical feature id string,
/// e.g. `feature::app::dark_mode`.
pub fn bucket_for(salt: &str, feature_key: &str, stable_id: &StableId) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(feature_key.as_bytes());
    hasher.update(b":");
    hasher.update(stable_id.as_hex().as_bytes());
    let digest = hasher.finalize();
    let n = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    n % BUCKET_COUNT
}

/// How a rule's rollout gate was decided, attached to evaluation results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketInfo {
    /// The computed bucket in `[0, 10_000)`.
    pub bucket: u32,
    /// Inclusion threshold in basis points.
    pub threshold_bp: u32,
    /// Whether the context cleared the gate (allowlist or bucket).
    pub in_rollout: bool,
    /// The rule's rollout percentage.
    pub ramp_up: RampUp,
    /// Salt the bucket was derived from.
    pub salt: String,
    /// Canonical feature key the bucket was derived from.
    pub feature_key: String,
}
