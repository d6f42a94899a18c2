// SPDX-License-Identifier: MIT OR Apache-2.0
//! Semantic version triples and version ranges for targeting.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// A `(major, minor, patch)` version with total order by tuple comparison.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Version {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component.
    pub patch: u32,
}

impl Version {
    /// The smallest version, `0.0.0`.
    pub const MIN: Version = Version::new(0, 0, 0);

    /// Build a version from its components.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Failure parsing a `MAJOR.MINOR.PATCH` string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version '{0}' (expected MAJOR.MINOR.PATCH)")]
pub struct VersionParseError(pub String);

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let mut next = || {
            parts
                .next()
                .and_then(|p| p.parse::<u32>().ok())
                .ok_or_else(|| VersionParseError(s.to_string()))
        };
        let (major, minor, patch) = (next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(VersionParseError(s.to_string()));
        }
        Ok(Self::new(major, minor, patch))
    }
}

// ---------------------------------------------------------------------------
// VersionRange
// ---------------------------------------------------------------------------

/// Failure constructing a fully bounded range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("version range lower bound {min} exceeds upper bound {max}")]
pub struct VersionRangeError {
    /// Rejected lower bound.
    pub min: Version,
    /// Rejected upper bound.
    pub max: Version,
}

/// An interval of versions a rule can target.
///
/// Bounds are inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionRange {
    /// Matches every version.
    Unbounded,
    /// Matches `min` and everything above it.
    MinBound(Version),
    /// Matches `max` and everything below it.
    MaxBound(Version),
    /// Matches the inclusive interval `[min, max]`.
    FullyBound {
        /// Inclusive lower bound.
        min: Version,
        /// Inclusive upper bound.
        max: Version,
    },
}

impl VersionRange {
    /// Range matching `min` and above.
    pub const fn at_least(min: Version) -> Self {
        Self::MinBound(min)
    }

    /// Range matching `max` and below.
    pub const fn at_most(max: Version) -> Self {
        Self::MaxBound(max)
    }

    /// Inclusive `[min, max]` range; rejects inverted bounds.
    pub fn bounded(min: Version, max: Version) -> Result<Self, VersionRangeError> {
        if min > max {
            return Err(VersionRangeError { min, max });
        }
        Ok(Self::FullyBound { min, max })
    }

    /// Whether `version` lies inside the range.
    pub fn contains(&self, version: Version) -> bool {
        match self {
            Self::Unbounded => true,
            Self::MinBound(min) => version >= *min,
            Self::MaxBound(max) => version <= *max,
            Self::FullyBound { min, max } => version >= *min && version <= *max,
        }
    }

    /// Whether the range constrains anything at all.
    ///
    /// Distinguishes [`VersionRange::Unbounded`] (specificity zero) from
    /// every bounded form.
    pub fn has_bounds(&self) -> bool {
        !matches!(self, Self::Unbounded)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => f.write_str("*"),
            Self::MinBound(min) => write!(f, ">={min}"),
            Self::MaxBound(max) => write!(f, "<={max}"),
            Self::FullyBound { min, max } => write!(f, "{min}..={max}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- Version --------------------------------------------------------

    #[test]
    fn ordering_is_tuple_comparison() {
        assert!(Version::new(1, 0, 0) < Version::new(1, 0, 1));
        assert!(Version::new(1, 9, 9) < Version::new(2, 0, 0));
        assert!(Version::new(0, 10, 0) > Version::new(0, 9, 99));
    }

    #[test]
    fn display_and_parse_round_trip() {
        let v = Version::new(2, 13, 4);
        assert_eq!(v.to_string(), "2.13.4");
        assert_eq!("2.13.4".parse::<Version>().unwrap(), v);
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["", "1", "1.2", "1.2.3.4", "a.b.c", "1.2.x", "-1.2.3"] {
            assert!(bad.parse::<Version>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn serde_uses_component_fields() {
        let v = Version::new(2, 0, 0);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"major":2,"minor":0,"patch":0}"#);
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    // -- VersionRange ---------------------------------------------------

    #[test]
    fn unbounded_contains_everything() {
        assert!(VersionRange::Unbounded.contains(Version::MIN));
        assert!(VersionRange::Unbounded.contains(Version::new(99, 0, 0)));
        assert!(!VersionRange::Unbounded.has_bounds());
    }

    #[test]
    fn min_bound_is_inclusive() {
        let range = VersionRange::at_least(Version::new(2, 0, 0));
        assert!(range.contains(Version::new(2, 0, 0)));
        assert!(range.contains(Version::new(3, 1, 0)));
        assert!(!range.contains(Version::new(1, 9, 9)));
        assert!(range.has_bounds());
    }

    #[test]
    fn max_bound_is_inclusive() {
        let range = VersionRange::at_most(Version::new(2, 0, 0));
        assert!(range.contains(Version::new(2, 0, 0)));
        assert!(range.contains(Version::new(0, 1, 0)));
        assert!(!range.contains(Version::new(2, 0, 1)));
    }

    #[test]
    fn fully_bound_checks_both_ends() {
        let range = VersionRange::bounded(Version::new(1, 0, 0), Version::new(2, 0, 0)).unwrap();
        assert!(range.contains(Version::new(1, 0, 0)));
        assert!(range.contains(Version::new(1, 5, 0)));
        assert!(range.contains(Version::new(2, 0, 0)));
        assert!(!range.contains(Version::new(0, 9, 0)));
        assert!(!range.contains(Version::new(2, 0, 1)));
    }

    #[test]
    fn bounded_rejects_inverted_bounds() {
        let err = VersionRange::bounded(Version::new(2, 0, 0), Version::new(1, 0, 0)).unwrap_err();
        assert_eq!(err.min, Version::new(2, 0, 0));
        assert_eq!(err.max, Version::new(1, 0, 0));
    }

    #[test]
    fn display_forms() {
        assert_eq!(VersionRange::Unbounded.to_string(), "*");
        assert_eq!(VersionRange::at_least(Version::new(2, 0, 0)).to_string(), ">=2.0.0");
        assert_eq!(VersionRange::at_most(Version::new(2, 0, 0)).to_string(), "<=2.0.0");
        assert_eq!(
            VersionRange::bounded(Version::new(1, 0, 0), Version::new(2, 0, 0))
                .unwrap()
                .to_string(),
            "1.0.0..=2.0.0"
        );
    }
}
