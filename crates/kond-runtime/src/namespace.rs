// SPDX-License-Identifier: MIT OR Apache-2.0
//! The namespace registry: one isolation boundary's live state.
//!
//! Readers load the current snapshot through an atomic pointer and never
//! block. Every mutation — loads, rollbacks, overrides, definition
//! updates — serializes on one namespace-scoped mutex and publishes with
//! a single release-store, so no reader ever observes a torn snapshot.

use arc_swap::ArcSwap;
use kond_codec::ParseError;
use kond_core::config::Configuration;
use kond_core::context::Context;
use kond_core::feature::{Feature, NamespaceSchema};
use kond_core::flag::{FlagDefinition, FlagEntry};
use kond_core::id::FeatureId;
use kond_core::value::FlagValue;
use kond_telemetry::{ConfigLoadRecord, ConfigRollbackRecord, Hooks};
use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type OverrideMap = BTreeMap<FeatureId, Arc<dyn Any + Send + Sync>>;

/// A namespace's registry: current configuration, bounded rollback
/// history, kill-switch, per-feature overrides, and hooks.
///
/// Shared by many reader threads and typically one updater thread.
pub struct Namespace {
    id: String,
    history_limit: usize,
    current: ArcSwap<Configuration>,
    overrides: ArcSwap<OverrideMap>,
    hooks: ArcSwap<Hooks>,
    disabled: AtomicBool,
    // Serializes every mutation; owns the history.
    write: Mutex<VecDeque<Arc<Configuration>>>,
}

impl Namespace {
    /// Create a namespace with an empty configuration.
    ///
    /// `history_limit` fixes how many previous snapshots [`rollback`]
    /// can reach; it never changes afterwards.
    ///
    /// [`rollback`]: Namespace::rollback
    pub fn new(id: impl Into<String>, history_limit: usize, hooks: Hooks) -> Self {
        Self {
            id: id.into(),
            history_limit,
            current: ArcSwap::from_pointee(Configuration::empty()),
            overrides: ArcSwap::from_pointee(OverrideMap::new()),
            hooks: ArcSwap::from_pointee(hooks),
            disabled: AtomicBool::new(false),
            write: Mutex::new(VecDeque::new()),
        }
    }

    /// The namespace id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The fixed history capacity.
    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Snapshots currently available to roll back to.
    pub fn history_len(&self) -> usize {
        self.write.lock().expect("namespace lock poisoned").len()
    }

    /// The current snapshot (lock-free).
    pub fn current(&self) -> Arc<Configuration> {
        self.current.load_full()
    }

    /// The compiled schema of every feature declared under this
    /// namespace's id.
    pub fn schema(&self) -> NamespaceSchema {
        NamespaceSchema::for_namespace(self.id.clone())
    }

    // -- Lifecycle ------------------------------------------------------

    /// Atomically install `config`, pushing the previous snapshot onto
    /// the history (dropping the oldest beyond the limit).
    pub fn load(&self, config: Configuration) {
        let record = ConfigLoadRecord {
            namespace_id: self.id.clone(),
            feature_count: config.len(),
            version: config.metadata().version.clone(),
            success: true,
        };
        {
            let mut history = self.write.lock().expect("namespace lock poisoned");
            let previous = self.current.swap(Arc::new(config));
            history.push_front(previous);
            history.truncate(self.history_limit);
        }
        tracing::debug!(namespace = %self.id, version = record.version.as_deref(), "configuration loaded");
        let hooks = self.hooks.load();
        hooks.emit_config_load(&record);
    }

    /// Decode a snapshot document and install it.
    ///
    /// On any decode failure the current snapshot is untouched; the error
    /// is logged through the hooks and a failed load is recorded.
    pub fn load_json(&self, json: &str, schema: &NamespaceSchema) -> Result<(), ParseError> {
        match kond_codec::decode_snapshot(json, schema) {
            Ok(config) => {
                self.load(config);
                Ok(())
            }
            Err(err) => {
                self.reject_load(&err);
                Err(err)
            }
        }
    }

    /// Decode a patch document, apply it to the current snapshot, and
    /// install the result (with normal load/history semantics).
    ///
    /// Patches are atomic: any failure leaves the namespace untouched.
    pub fn apply_patch_json(&self, json: &str, schema: &NamespaceSchema) -> Result<(), ParseError> {
        let current = self.current();
        match kond_codec::apply_patch_json(&current, json, schema) {
            Ok(next) => {
                self.load(next);
                Ok(())
            }
            Err(err) => {
                self.reject_load(&err);
                Err(err)
            }
        }
    }

    fn reject_load(&self, err: &ParseError) {
        let hooks = self.hooks.load();
        let cause: &(dyn std::error::Error + 'static) = err;
        hooks.warn(|| format!("rejected configuration for namespace '{}'", self.id), Some(cause));
        hooks.emit_config_load(&ConfigLoadRecord {
            namespace_id: self.id.clone(),
            feature_count: 0,
            version: None,
            success: false,
        });
    }

    /// Roll back `steps` loads.
    ///
    /// Pops `steps` entries from the history and installs the last popped
    /// one; the rolled-back snapshot is *not* re-pushed. With fewer than
    /// `steps` entries available (or `steps == 0`) nothing changes and
    /// `false` is returned.
    pub fn rollback(&self, steps: usize) -> bool {
        let (success, version) = {
            let mut history = self.write.lock().expect("namespace lock poisoned");
            if steps == 0 || history.len() < steps {
                (false, None)
            } else {
                let mut target = None;
                for _ in 0..steps {
                    target = history.pop_front();
                }
                let target = target.expect("history length checked above");
                let version = target.metadata().version.clone();
                self.current.store(target);
                (true, version)
            }
        };
        if success {
            tracing::debug!(namespace = %self.id, steps, "configuration rolled back");
        } else {
            tracing::debug!(namespace = %self.id, steps, "rollback refused: insufficient history");
        }
        let hooks = self.hooks.load();
        hooks.emit_config_rollback(&ConfigRollbackRecord {
            namespace_id: self.id.clone(),
            steps,
            success,
            version,
        });
        success
    }

    /// Replace exactly one definition in the current snapshot, without
    /// touching the history. Meant for test fixtures and runtime
    /// patchers.
    pub fn update_definition<T: FlagValue, C: Context + 'static>(
        &self,
        definition: FlagDefinition<T, C>,
    ) {
        let _guard = self.write.lock().expect("namespace lock poisoned");
        let next = self.current.load().with_updated(FlagEntry::new(definition));
        self.current.store(Arc::new(next));
    }

    // -- Kill-switch ----------------------------------------------------

    /// Force every evaluation in this namespace to its feature's declared
    /// default. Definitions are retained; the switch wins over overrides.
    pub fn disable_all(&self) {
        self.disabled.store(true, Ordering::Release);
        tracing::info!(namespace = %self.id, "namespace disabled");
    }

    /// Clear the kill-switch.
    pub fn enable_all(&self) {
        self.disabled.store(false, Ordering::Release);
        tracing::info!(namespace = %self.id, "namespace enabled");
    }

    /// Whether the kill-switch is on.
    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    // -- Overrides ------------------------------------------------------

    /// Pin `feature` to `value`, bypassing rule evaluation (but not the
    /// kill-switch). The value type is witnessed by the feature handle.
    pub fn set_override<T: FlagValue, C: Context + 'static>(
        &self,
        feature: &Feature<T, C>,
        value: T,
    ) {
        let _guard = self.write.lock().expect("namespace lock poisoned");
        let mut next = OverrideMap::clone(&self.overrides.load_full());
        next.insert(feature.id().clone(), Arc::new(value));
        self.overrides.store(Arc::new(next));
    }

    /// Remove a pinned value.
    pub fn clear_override<T: FlagValue, C: Context + 'static>(&self, feature: &Feature<T, C>) {
        let _guard = self.write.lock().expect("namespace lock poisoned");
        let mut next = OverrideMap::clone(&self.overrides.load_full());
        next.remove(feature.id());
        self.overrides.store(Arc::new(next));
    }

    /// Whether the feature currently has a pinned value.
    pub fn has_override<T: FlagValue, C: Context + 'static>(
        &self,
        feature: &Feature<T, C>,
    ) -> bool {
        self.overrides.load().contains_key(feature.id())
    }

    /// Lock-free override lookup for the evaluation hot path.
    pub(crate) fn override_value<T: FlagValue>(&self, id: &FeatureId) -> Option<T> {
        let overrides = self.overrides.load();
        let stored = overrides.get(id)?;
        match stored.downcast_ref::<T>() {
            Some(value) => Some(value.clone()),
            None => panic!(
                "override for feature '{id}' holds a different type than the declared value type"
            ),
        }
    }

    // -- Hooks ----------------------------------------------------------

    /// Atomically replace the hooks. Events already dispatching keep the
    /// hooks they started with.
    pub fn set_hooks(&self, hooks: Hooks) {
        self.hooks.store(Arc::new(hooks));
    }

    /// The hooks currently installed.
    pub(crate) fn hooks(&self) -> Arc<Hooks> {
        self.hooks.load_full()
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("id", &self.id)
            .field("features", &self.current.load().len())
            .field("history_limit", &self.history_limit)
            .field("disabled", &self.is_disabled())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use kond_core::Rule;
    use kond_telemetry::InMemoryMetrics;
    use kond_telemetry::NoopLogger;

    fn feature(key: &str) -> Feature<String> {
        Feature::register("nstest", key, "default".to_string())
    }

    fn config_with(feature: &Feature<String>, version: &str, value: &str) -> Configuration {
        Configuration::builder()
            .flag(
                FlagDefinition::builder(feature)
                    .default_value(value.to_string())
                    .build()
                    .unwrap(),
            )
            .version(version)
            .build()
    }

    fn namespace_with_metrics(limit: usize) -> (Namespace, InMemoryMetrics) {
        let metrics = InMemoryMetrics::new();
        let hooks = Hooks::new(Arc::new(NoopLogger), Arc::new(metrics.clone()));
        (Namespace::new("nstest", limit, hooks), metrics)
    }

    // -- Load & history ---------------------------------------------------

    #[test]
    fn load_pushes_previous_onto_history() {
        let (ns, metrics) = namespace_with_metrics(5);
        let f = feature("history");
        ns.load(config_with(&f, "1", "a"));
        ns.load(config_with(&f, "2", "b"));
        assert_eq!(ns.history_len(), 2); // initial empty + v1
        assert_eq!(ns.current().metadata().version.as_deref(), Some("2"));
        let loads = metrics.loads();
        assert_eq!(loads.len(), 2);
        assert!(loads.iter().all(|l| l.success));
        assert_eq!(loads[1].version.as_deref(), Some("2"));
        assert_eq!(loads[1].feature_count, 1);
    }

    #[test]
    fn history_is_bounded() {
        let (ns, _) = namespace_with_metrics(2);
        let f = feature("bounded");
        for version in ["1", "2", "3", "4", "5"] {
            ns.load(config_with(&f, version, version));
        }
        assert_eq!(ns.history_len(), 2);
        assert!(ns.rollback(1));
        assert_eq!(ns.current().metadata().version.as_deref(), Some("4"));
    }

    // -- Rollback ----------------------------------------------------------

    #[test]
    fn rollback_installs_previous_snapshot() {
        let (ns, metrics) = namespace_with_metrics(5);
        let f = feature("rollback");
        ns.load(config_with(&f, "1", "a"));
        ns.load(config_with(&f, "2", "b"));
        assert!(ns.rollback(1));
        assert_eq!(ns.current().metadata().version.as_deref(), Some("1"));
        let record = &metrics.rollbacks()[0];
        assert!(record.success);
        assert_eq!(record.version.as_deref(), Some("1"));
        // The rolled-back snapshot is gone, not re-pushed.
        assert_eq!(ns.history_len(), 1);
    }

    #[test]
    fn rollback_multiple_steps_discards_intermediates() {
        let (ns, _) = namespace_with_metrics(5);
        let f = feature("steps");
        ns.load(config_with(&f, "1", "a"));
        ns.load(config_with(&f, "2", "b"));
        ns.load(config_with(&f, "3", "c"));
        assert!(ns.rollback(2));
        assert_eq!(ns.current().metadata().version.as_deref(), Some("1"));
    }

    #[test]
    fn insufficient_history_refuses_without_mutation() {
        let (ns, metrics) = namespace_with_metrics(5);
        let f = feature("insufficient");
        ns.load(config_with(&f, "1", "a"));
        assert!(!ns.rollback(5));
        assert!(!ns.rollback(0));
        assert_eq!(ns.current().metadata().version.as_deref(), Some("1"));
        assert!(metrics.rollbacks().iter().all(|r| !r.success));
    }

    // -- Kill-switch --------------------------------------------------------

    #[test]
    fn kill_switch_toggles() {
        let (ns, _) = namespace_with_metrics(1);
        assert!(!ns.is_disabled());
        ns.disable_all();
        assert!(ns.is_disabled());
        ns.enable_all();
        assert!(!ns.is_disabled());
    }

    // -- Overrides -----------------------------------------------------------

    #[test]
    fn overrides_are_typed_and_clearable() {
        let (ns, _) = namespace_with_metrics(1);
        let f = feature("override");
        assert!(!ns.has_override(&f));
        ns.set_override(&f, "pinned".to_string());
        assert!(ns.has_override(&f));
        assert_eq!(ns.override_value::<String>(f.id()), Some("pinned".to_string()));
        ns.clear_override(&f);
        assert!(!ns.has_override(&f));
        assert_eq!(ns.override_value::<String>(f.id()), None);
    }

    // -- update_definition ---------------------------------------------------

    #[test]
    fn update_definition_replaces_without_history() {
        let (ns, _) = namespace_with_metrics(5);
        let f = feature("update");
        ns.load(config_with(&f, "1", "a"));
        let history_before = ns.history_len();
        ns.update_definition(
            FlagDefinition::builder(&f)
                .default_value("patched".to_string())
                .rule(Rule::builder().platforms(["IOS"]), "ios".to_string())
                .build()
                .unwrap(),
        );
        assert_eq!(ns.history_len(), history_before);
        let def = ns.current().definition(&f).unwrap().clone();
        assert_eq!(def.default_value(), "patched");
        assert_eq!(def.rules().len(), 1);
    }

    // -- load_json ------------------------------------------------------------

    #[test]
    fn rejected_json_leaves_snapshot_untouched() {
        let (ns, metrics) = namespace_with_metrics(5);
        let f = feature("jsonfail");
        ns.load(config_with(&f, "1", "a"));
        let schema = ns.schema();
        let err = ns.load_json("{broken", &schema).unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
        assert_eq!(ns.current().metadata().version.as_deref(), Some("1"));
        let loads = metrics.loads();
        assert!(!loads.last().unwrap().success);
    }

    #[test]
    fn load_json_installs_decoded_snapshot() {
        let (ns, _) = namespace_with_metrics(5);
        let f = feature("jsonload");
        let json = serde_json::json!({
            "meta": {"version": "9"},
            "flags": [{
                "key": f.id().canonical(),
                "defaultValue": {"type": "STRING", "value": "wired"},
                "salt": "v1",
            }],
        })
        .to_string();
        ns.load_json(&json, &ns.schema()).expect("loads");
        assert_eq!(ns.current().metadata().version.as_deref(), Some("9"));
        assert_eq!(ns.current().definition(&f).unwrap().default_value(), "wired");
    }

    #[test]
    fn apply_patch_json_goes_through_load() {
        let (ns, _) = namespace_with_metrics(5);
        let f = feature("jsonpatch");
        ns.load(config_with(&f, "1", "a"));
        let patch = serde_json::json!({
            "flags": [{
                "key": f.id().canonical(),
                "defaultValue": {"type": "STRING", "value": "patched"},
                "salt": "v1",
            }],
        })
        .to_string();
        ns.apply_patch_json(&patch, &ns.schema()).expect("applies");
        assert_eq!(ns.current().definition(&f).unwrap().default_value(), "patched");
        assert!(ns.rollback(1));
        assert_eq!(ns.current().definition(&f).unwrap().default_value(), "a");
    }
}
