// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evaluation contexts.
//!
//! A context exposes *capabilities* — locale, platform, version, stable id,
//! axis values — as optional accessors. A rule that needs a capability the
//! context does not expose simply fails to match; nothing panics.

use crate::axis::AxisValue;
use crate::id::StableId;
use crate::version::Version;
use std::collections::BTreeMap;

/// Runtime inputs to flag evaluation.
///
/// Implement this for your own request/session types, or use the concrete
/// [`EvalContext`]. Every accessor defaults to "capability absent".
pub trait Context: Send + Sync {
    /// BCP-47-ish locale id, e.g. `"en-US"`.
    fn locale(&self) -> Option<&str> {
        None
    }

    /// Platform id, e.g. `"IOS"`.
    fn platform(&self) -> Option<&str> {
        None
    }

    /// Application version.
    fn version(&self) -> Option<Version> {
        None
    }

    /// Stable identity for bucketing and allowlists.
    fn stable_id(&self) -> Option<&StableId> {
        None
    }

    /// Values this context carries for the given axis id.
    fn axis_values(&self, axis_id: &str) -> &[String] {
        let _ = axis_id;
        &[]
    }
}

/// Concrete catch-all context: a product of optional capabilities plus an
/// axis map, assembled builder-style.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalContext {
    locale: Option<String>,
    platform: Option<String>,
    version: Option<Version>,
    stable_id: Option<StableId>,
    axes: BTreeMap<String, Vec<String>>,
}

impl EvalContext {
    /// An empty context exposing no capabilities.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a locale id.
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Attach a platform id.
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Attach an application version.
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Attach a stable id.
    pub fn with_stable_id(mut self, stable_id: StableId) -> Self {
        self.stable_id = Some(stable_id);
        self
    }

    /// Attach a typed axis value (e.g. an environment).
    pub fn with_axis<A: AxisValue>(self, value: A) -> Self {
        self.with_axis_value(A::axis_id(), value.id())
    }

    /// Attach a raw axis value by id.
    pub fn with_axis_value(
        mut self,
        axis_id: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.axes.entry(axis_id.into()).or_default().push(value.into());
        self
    }
}

impl Context for EvalContext {
    fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    fn version(&self) -> Option<Version> {
        self.version
    }

    fn stable_id(&self) -> Option<&StableId> {
        self.stable_id.as_ref()
    }

    fn axis_values(&self, axis_id: &str) -> &[String] {
        self.axes.get(axis_id).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_context_exposes_nothing() {
        let ctx = EvalContext::new();
        assert!(ctx.locale().is_none());
        assert!(ctx.platform().is_none());
        assert!(ctx.version().is_none());
        assert!(ctx.stable_id().is_none());
        assert!(ctx.axis_values("environment").is_empty());
    }

    #[test]
    fn builder_sets_capabilities() {
        let ctx = EvalContext::new()
            .with_locale("en-US")
            .with_platform("IOS")
            .with_version(Version::new(2, 1, 0))
            .with_stable_id(StableId::of("u1"))
            .with_axis_value("environment", "prod");
        assert_eq!(ctx.locale(), Some("en-US"));
        assert_eq!(ctx.platform(), Some("IOS"));
        assert_eq!(ctx.version(), Some(Version::new(2, 1, 0)));
        assert_eq!(ctx.stable_id(), Some(&StableId::of("u1")));
        assert_eq!(ctx.axis_values("environment"), ["prod".to_string()]);
    }

    #[test]
    fn axis_values_accumulate() {
        let ctx = EvalContext::new()
            .with_axis_value("tenant", "acme")
            .with_axis_value("tenant", "globex");
        assert_eq!(ctx.axis_values("tenant").len(), 2);
        assert!(ctx.axis_values("region").is_empty());
    }
}
