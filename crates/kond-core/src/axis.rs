// SPDX-License-Identifier: MIT OR Apache-2.0
//! Named targeting axes and the process-wide axis registry.
//!
//! An axis is a named dimension with a finite value set (environment,
//! tenant, cohort, …). Axes are static program structure: they are
//! registered during startup and read-only afterwards. Conflicting
//! redefinition is fatal; identical re-registration is a no-op
//! (first-writer-wins).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{OnceLock, RwLock};

/// A value of a targeting axis.
///
/// Typically implemented on a fieldless enum:
///
/// ```
/// use kond_core::AxisValue;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// enum Environment { Dev, Staging, Prod }
///
/// impl AxisValue for Environment {
///     fn axis_id() -> &'static str { "environment" }
///     fn id(&self) -> &'static str {
///         match self {
///             Self::Dev => "dev",
///             Self::Staging => "staging",
///             Self::Prod => "prod",
///         }
///     }
///     fn values() -> &'static [Self] {
///         &[Self::Dev, Self::Staging, Self::Prod]
///     }
/// }
/// ```
pub trait AxisValue: Copy + Eq + Send + Sync + 'static {
    /// Stable id of the axis this value belongs to.
    fn axis_id() -> &'static str;

    /// Stable id of this value.
    fn id(&self) -> &'static str;

    /// Every value of the axis, for registration.
    fn values() -> &'static [Self];
}

/// Registered shape of an axis: its id and known value ids.
///
/// An empty value set means the axis is open-ended and the codec skips
/// value-membership validation for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisDescriptor {
    /// Stable axis id.
    pub id: String,
    /// Known value ids, possibly empty.
    pub values: BTreeSet<String>,
}

impl AxisDescriptor {
    /// Build a descriptor from raw parts.
    pub fn new(id: impl Into<String>, values: impl IntoIterator<Item = String>) -> Self {
        Self {
            id: id.into(),
            values: values.into_iter().collect(),
        }
    }
}

static AXES: OnceLock<RwLock<BTreeMap<String, AxisDescriptor>>> = OnceLock::new();

fn registry() -> &'static RwLock<BTreeMap<String, AxisDescriptor>> {
    AXES.get_or_init(|| RwLock::new(BTreeMap::new()))
}

/// Register a typed axis.
///
/// # Panics
///
/// Panics if the axis id is already registered with a different value set.
pub fn register_axis<A: AxisValue>() {
    register_axis_descriptor(AxisDescriptor::new(
        A::axis_id(),
        A::values().iter().map(|v| v.id().to_string()),
    ));
}

/// Register an axis by raw descriptor.
///
/// # Panics
///
/// Panics if the axis id is already registered with a different value set.
pub fn register_axis_descriptor(descriptor: AxisDescriptor) {
    let mut map = registry().write().expect("axis registry poisoned");
    if let Some(existing) = map.get(&descriptor.id) {
        if *existing == descriptor {
            return;
        }
        let registered = existing.values.clone();
        // Release the lock before panicking; a poisoned registry would
        // cascade into every later registration.
        drop(map);
        panic!(
            "axis '{}' re-registered with a conflicting shape (registered values {:?}, new values {:?})",
            descriptor.id, registered, descriptor.values
        );
    }
    map.insert(descriptor.id.clone(), descriptor);
}

/// Look up a registered axis.
pub fn lookup_axis(axis_id: &str) -> Option<AxisDescriptor> {
    registry().read().expect("axis registry poisoned").get(axis_id).cloned()
}

/// Whether an axis id is registered.
pub fn is_axis_registered(axis_id: &str) -> bool {
    registry().read().expect("axis registry poisoned").contains_key(axis_id)
}

/// Drop every registered axis. Test fixtures only.
#[cfg(feature = "test-support")]
pub fn reset_axis_registry() {
    registry().write().expect("axis registry poisoned").clear();
}
