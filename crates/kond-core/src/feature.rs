// SPDX-License-Identifier: MIT OR Apache-2.0
//! Feature declaration and the process-wide feature catalog.
//!
//! Features are static program structure: declared once per process and
//! registered eagerly, so the codec can resolve wire documents against a
//! compiled [`NamespaceSchema`] and the engine can trust declared types.

use crate::context::{Context, EvalContext};
use crate::flag::{definition_from_parts, FlagEntry, FlagParts, FlagPartsError};
use crate::id::FeatureId;
use crate::value::{FlagValue, ValueKind};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

// ---------------------------------------------------------------------------
// Feature
// ---------------------------------------------------------------------------

/// A declared, typed feature.
///
/// `T` is the value type every evaluation of this feature returns; `C` is
/// the context type its rules may inspect (defaults to [`EvalContext`]).
/// Declaring a feature registers it in the process-wide catalog so that
/// JSON snapshots can be decoded against it.
pub struct Feature<T, C = EvalContext> {
    id: FeatureId,
    default: T,
    _ctx: std::marker::PhantomData<fn(&C)>,
}

impl<T: FlagValue, C: Context + 'static> Feature<T, C> {
    /// Declare a feature under a namespace and register it eagerly.
    ///
    /// Identical re-declaration is a no-op; production code declares each
    /// feature exactly once, at init.
    ///
    /// # Panics
    ///
    /// Panics if the namespace/key segments are invalid, or if the feature
    /// id is already registered with a different value shape — both are
    /// programming errors in static program structure.
    pub fn register(namespace: &str, key: &str, default: T) -> Self {
        let id = FeatureId::new(namespace, key)
            .unwrap_or_else(|err| panic!("invalid feature declaration: {err}"));
        register_handle(Arc::new(FeatureHandle {
            id: id.clone(),
            kind: T::kind(),
            class_name: T::class_name(),
            build: Arc::new(|parts| {
                definition_from_parts::<T, C>(parts).map(FlagEntry::new)
            }),
        }));
        Self {
            id,
            default,
            _ctx: std::marker::PhantomData,
        }
    }

    /// Canonical feature id.
    pub fn id(&self) -> &FeatureId {
        &self.id
    }

    /// Key segment of the id.
    pub fn key(&self) -> &str {
        self.id.key()
    }

    /// The declared default, returned whenever evaluation cannot consult a
    /// definition (kill-switch) or no rule wins an empty registry.
    pub fn default_value(&self) -> &T {
        &self.default
    }
}

impl<T: Clone, C> Clone for Feature<T, C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            default: self.default.clone(),
            _ctx: std::marker::PhantomData,
        }
    }
}

impl<T: fmt::Debug, C> fmt::Debug for Feature<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feature")
            .field("id", &self.id.canonical())
            .field("default", &self.default)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Registered shape of a feature: identity, declared value kind, and the
/// decode vtable the codec uses to build typed definitions.
pub struct FeatureHandle {
    id: FeatureId,
    kind: ValueKind,
    class_name: Option<&'static str>,
    build: Arc<dyn Fn(FlagParts) -> Result<FlagEntry, FlagPartsError> + Send + Sync>,
}

impl FeatureHandle {
    /// Canonical feature id.
    pub fn id(&self) -> &FeatureId {
        &self.id
    }

    /// Declared value kind.
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Declared enum/struct class name, for `ENUM`/`STRUCT` features.
    pub fn class_name(&self) -> Option<&'static str> {
        self.class_name
    }

    /// Build a typed, erased definition from decoded parts.
    pub fn build_flag(&self, parts: FlagParts) -> Result<FlagEntry, FlagPartsError> {
        (self.build)(parts)
    }
}

impl fmt::Debug for FeatureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureHandle")
            .field("id", &self.id.canonical())
            .field("kind", &self.kind)
            .field("class_name", &self.class_name)
            .finish_non_exhaustive()
    }
}

static CATALOG: OnceLock<RwLock<BTreeMap<FeatureId, Arc<FeatureHandle>>>> = OnceLock::new();

fn catalog() -> &'static RwLock<BTreeMap<FeatureId, Arc<FeatureHandle>>> {
    CATALOG.get_or_init(|| RwLock::new(BTreeMap::new()))
}

fn register_handle(handle: Arc<FeatureHandle>) {
    let mut map = catalog().write().expect("feature catalog poisoned");
    if let Some(existing) = map.get(&handle.id) {
        // First-writer-wins: identical shape keeps the existing handle.
        if existing.kind == handle.kind && existing.class_name == handle.class_name {
            return;
        }
        let (registered_kind, registered_class) = (existing.kind, existing.class_name);
        // Release the lock before panicking; a poisoned catalog would
        // cascade into every later declaration.
        drop(map);
        panic!(
            "feature '{}' re-registered with a conflicting shape ({} {:?} vs {} {:?})",
            handle.id.canonical(),
            registered_kind,
            registered_class,
            handle.kind,
            handle.class_name,
        );
    }
    map.insert(handle.id.clone(), handle);
}

/// Look up a registered feature.
pub fn lookup_feature(id: &FeatureId) -> Option<Arc<FeatureHandle>> {
    catalog().read().expect("feature catalog poisoned").get(id).cloned()
}

/// Drop every registered feature. Test fixtures only.
#[cfg(feature = "test-support")]
pub fn reset_feature_catalog() {
    catalog().write().expect("feature catalog poisoned").clear();
}

// ---------------------------------------------------------------------------
// NamespaceSchema
// ---------------------------------------------------------------------------

/// The features registered under one namespace — the compiled schema the
/// codec resolves snapshot documents against.
#[derive(Debug, Clone)]
pub struct NamespaceSchema {
    namespace: String,
    features: BTreeMap<FeatureId, Arc<FeatureHandle>>,
}

impl NamespaceSchema {
    /// Snapshot the catalog's view of one namespace.
    pub fn for_namespace(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let features = catalog()
            .read()
            .expect("feature catalog poisoned")
            .iter()
            .filter(|(id, _)| id.namespace() == namespace)
            .map(|(id, handle)| (id.clone(), Arc::clone(handle)))
            .collect();
        Self { namespace, features }
    }

    /// The namespace this schema describes.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Resolve a feature id against the schema.
    pub fn resolve(&self, id: &FeatureId) -> Option<&Arc<FeatureHandle>> {
        self.features.get(id)
    }

    /// Ids of every feature in the schema.
    pub fn feature_ids(&self) -> impl Iterator<Item = &FeatureId> {
        self.features.keys()
    }

    /// Number of features in the schema.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the schema has no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TaggedValue;
    use std::collections::BTreeSet;

    #[test]
    fn registration_is_idempotent_for_identical_shapes() {
        let a: Feature<bool> = Feature::register("feattest", "idempotent", false);
        let b: Feature<bool> = Feature::register("feattest", "idempotent", true);
        assert_eq!(a.id(), b.id());
        assert!(lookup_feature(a.id()).is_some());
    }

    #[test]
    #[should_panic(expected = "conflicting shape")]
    fn conflicting_shape_is_fatal() {
        let _: Feature<bool> = Feature::register("feattest", "conflict", false);
        let _: Feature<String> = Feature::register("feattest", "conflict", String::new());
    }

    #[test]
    #[should_panic(expected = "invalid feature declaration")]
    fn invalid_segments_are_fatal() {
        let _: Feature<bool> = Feature::register("feattest", "bad key", false);
    }

    #[test]
    fn schema_filters_by_namespace() {
        let _: Feature<bool> = Feature::register("schema_a", "one", false);
        let _: Feature<bool> = Feature::register("schema_a", "two", false);
        let _: Feature<bool> = Feature::register("schema_b", "other", false);
        let schema = NamespaceSchema::for_namespace("schema_a");
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.namespace(), "schema_a");
        assert!(schema
            .resolve(&FeatureId::new("schema_a", "one").unwrap())
            .is_some());
        assert!(schema
            .resolve(&FeatureId::new("schema_b", "other").unwrap())
            .is_none());
    }

    #[test]
    fn handle_builds_typed_entries() {
        let feature: Feature<bool> = Feature::register("feattest", "buildable", false);
        let handle = lookup_feature(feature.id()).expect("registered");
        assert_eq!(handle.kind(), ValueKind::Boolean);
        let entry = handle
            .build_flag(FlagParts {
                feature: feature.id().clone(),
                default: TaggedValue::Boolean { value: true },
                salt: "v1".into(),
                active: true,
                rollout_allowlist: BTreeSet::new(),
                rules: Vec::new(),
            })
            .expect("builds");
        assert!(entry.definition::<bool, EvalContext>().is_some());
    }

    #[test]
    fn handle_rejects_mismatched_parts() {
        let feature: Feature<bool> = Feature::register("feattest", "mismatch", false);
        let handle = lookup_feature(feature.id()).expect("registered");
        let err = handle
            .build_flag(FlagParts {
                feature: feature.id().clone(),
                default: TaggedValue::Int { value: 3 },
                salt: "v1".into(),
                active: true,
                rollout_allowlist: BTreeSet::new(),
                rules: Vec::new(),
            })
            .unwrap_err();
        assert!(matches!(err, FlagPartsError::DefaultValue(_)));
    }
}
