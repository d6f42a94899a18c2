// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rollout percentages.

use serde::Serialize;
use std::fmt;

/// A rollout percentage in `[0.0, 100.0]`.
///
/// `<= 0` enrolls nobody, `>= 100` enrolls everybody; anything in between
/// gates on the deterministic bucket (see [`crate::bucket`]).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct RampUp(f64);

/// Rejected rollout percentage.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("ramp-up {0} is outside 0.0..=100.0")]
pub struct RampUpError(pub f64);

impl RampUp {
    /// Nobody.
    pub const ZERO: RampUp = RampUp(0.0);

    /// Everybody.
    pub const FULL: RampUp = RampUp(100.0);

    /// Validate a percentage. Non-finite or out-of-range values are
    /// rejected.
    pub fn new(percent: f64) -> Result<Self, RampUpError> {
        if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
            return Err(RampUpError(percent));
        }
        Ok(Self(percent))
    }

    /// The raw percentage.
    pub fn percent(&self) -> f64 {
        self.0
    }

    /// Inclusion threshold in basis points: `round(percent * 100)`, so
    /// `10.0 → 1000`.
    pub fn threshold_bp(&self) -> u32 {
        (self.0 * 100.0).round() as u32
    }

    /// Whether a bucket in `[0, 10_000)` is enrolled at this percentage.
    pub fn admits_bucket(&self, bucket: u32) -> bool {
        self.0 >= 100.0 || (self.0 > 0.0 && bucket < self.threshold_bp())
    }

    /// Whether this ramp-up enrolls nobody.
    pub fn is_zero(&self) -> bool {
        self.0 <= 0.0
    }

    /// Whether this ramp-up enrolls everybody.
    pub fn is_full(&self) -> bool {
        self.0 >= 100.0
    }
}

impl fmt::Display for RampUp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}
