// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical snapshot and patch encoding.
//!
//! Output is deterministic: `serde_json`'s map is BTreeMap-backed, so
//! object keys come out in lexicographic order; sets serialize as sorted
//! arrays; flags follow feature-id order and rules their canonical order.

use crate::error::EncodeError;
use kond_core::config::{ConfigMetadata, Configuration, ConfigurationPatch};
use kond_core::flag::{DynRule, FlagEntry};
use kond_core::id::FeatureId;
use kond_core::targeting::CriterionSpec;
use kond_core::version::{Version, VersionRange};
use serde_json::{json, Map, Value};

/// Encode a configuration into its canonical JSON string.
///
/// Fails only for definitions that carry extension/guard criteria or
/// resolver values — those have no wire form.
pub fn encode_snapshot(config: &Configuration) -> Result<String, EncodeError> {
    to_string(&encode_snapshot_value(config)?)
}

/// Encode a configuration into a JSON tree (object form of
/// [`encode_snapshot`]).
pub fn encode_snapshot_value(config: &Configuration) -> Result<Value, EncodeError> {
    let mut flags = Vec::with_capacity(config.len());
    for (id, entry) in config.iter() {
        flags.push(encode_flag(id, entry)?);
    }
    let mut root = Map::new();
    if let Some(meta) = encode_meta(config.metadata()) {
        root.insert("meta".to_string(), meta);
    }
    root.insert("flags".to_string(), Value::Array(flags));
    Ok(Value::Object(root))
}

/// Encode a patch into its canonical JSON string.
pub fn encode_patch(patch: &ConfigurationPatch) -> Result<String, EncodeError> {
    let mut flags = Vec::with_capacity(patch.add_or_replace.len());
    for entry in &patch.add_or_replace {
        flags.push(encode_flag(entry.feature_id(), entry)?);
    }
    let remove_keys: Vec<Value> = patch
        .remove
        .iter()
        .map(|id| Value::String(id.canonical()))
        .collect();
    let mut root = Map::new();
    if let Some(meta) = patch.metadata.as_ref().and_then(encode_meta) {
        root.insert("meta".to_string(), meta);
    }
    root.insert("flags".to_string(), Value::Array(flags));
    root.insert("removeKeys".to_string(), Value::Array(remove_keys));
    to_string(&Value::Object(root))
}

// ---------------------------------------------------------------------------
// Pieces
// ---------------------------------------------------------------------------

fn encode_meta(meta: &ConfigMetadata) -> Option<Value> {
    if meta.version.is_none() && meta.generated_at_epoch_millis.is_none() && meta.source.is_none() {
        return None;
    }
    let mut obj = Map::new();
    if let Some(version) = &meta.version {
        obj.insert("version".to_string(), json!(version));
    }
    if let Some(millis) = meta.generated_at_epoch_millis {
        obj.insert("generatedAtEpochMillis".to_string(), json!(millis));
    }
    if let Some(source) = &meta.source {
        obj.insert("source".to_string(), json!(source));
    }
    Some(Value::Object(obj))
}

fn encode_flag(id: &FeatureId, entry: &FlagEntry) -> Result<Value, EncodeError> {
    let mut rules = Vec::new();
    for (index, rule) in entry.dyn_rules().into_iter().enumerate() {
        rules.push(encode_rule(id, index, rule)?);
    }
    let default = serde_json::to_value(entry.default_tagged()).map_err(|err| EncodeError::Json {
        message: err.to_string(),
    })?;
    let allowlist: Vec<Value> = entry
        .rollout_allowlist()
        .iter()
        .map(|id| Value::String(id.as_hex().to_string()))
        .collect();

    let mut obj = Map::new();
    obj.insert("key".to_string(), Value::String(id.canonical()));
    obj.insert("defaultValue".to_string(), default);
    obj.insert("salt".to_string(), Value::String(entry.salt().to_string()));
    obj.insert("isActive".to_string(), Value::Bool(entry.is_active()));
    obj.insert("rollupAllowlist".to_string(), Value::Array(allowlist));
    obj.insert("rules".to_string(), Value::Array(rules));
    Ok(Value::Object(obj))
}

fn encode_rule(feature: &FeatureId, index: usize, rule: DynRule) -> Result<Value, EncodeError> {
    let unsupported = |what: &'static str| EncodeError::Unsupported {
        feature: feature.canonical(),
        index,
        what,
    };

    let value = rule.value.ok_or_else(|| unsupported("resolver value"))?;
    let value = serde_json::to_value(value).map_err(|err| EncodeError::Json {
        message: err.to_string(),
    })?;

    let mut obj = Map::new();
    obj.insert("value".to_string(), value);
    obj.insert("rampUp".to_string(), json!(rule.spec.ramp_up.percent()));
    let allowlist: Vec<Value> = rule
        .spec
        .allowlist
        .iter()
        .map(|id| Value::String(id.as_hex().to_string()))
        .collect();
    obj.insert("rampUpAllowlist".to_string(), Value::Array(allowlist));
    if let Some(note) = &rule.spec.note {
        obj.insert("note".to_string(), Value::String(note.clone()));
    }

    let mut axes = Map::new();
    encode_criteria(&rule.spec.criteria, &mut obj, &mut axes, &unsupported)?;
    if !axes.is_empty() {
        obj.insert("axes".to_string(), Value::Object(axes));
    }
    Ok(Value::Object(obj))
}

fn encode_criteria(
    criteria: &[CriterionSpec],
    obj: &mut Map<String, Value>,
    axes: &mut Map<String, Value>,
    unsupported: &impl Fn(&'static str) -> EncodeError,
) -> Result<(), EncodeError> {
    for criterion in criteria {
        match criterion {
            CriterionSpec::Locales(set) => {
                obj.insert("locales".to_string(), string_set(set));
            }
            CriterionSpec::Platforms(set) => {
                obj.insert("platforms".to_string(), string_set(set));
            }
            CriterionSpec::Version(range) => {
                obj.insert("versionRange".to_string(), encode_version_range(range));
            }
            CriterionSpec::Axis { axis_id, values } => {
                axes.insert(axis_id.clone(), string_set(values));
            }
            CriterionSpec::Extension { .. } => return Err(unsupported("extension criterion")),
            CriterionSpec::Guarded { .. } => return Err(unsupported("guard criterion")),
            CriterionSpec::All(children) => {
                encode_criteria(children, obj, axes, unsupported)?;
            }
        }
    }
    Ok(())
}

fn encode_version_range(range: &VersionRange) -> Value {
    match range {
        VersionRange::Unbounded => json!({"type": "UNBOUNDED"}),
        VersionRange::MinBound(min) => json!({"type": "MIN_BOUND", "min": encode_version(min)}),
        VersionRange::MaxBound(max) => json!({"type": "MAX_BOUND", "max": encode_version(max)}),
        VersionRange::FullyBound { min, max } => json!({
            "type": "MIN_AND_MAX_BOUND",
            "min": encode_version(min),
            "max": encode_version(max),
        }),
    }
}

fn encode_version(version: &Version) -> Value {
    json!({"major": version.major, "minor": version.minor, "patch": version.patch})
}

fn string_set(set: &std::collections::BTreeSet<String>) -> Value {
    Value::Array(set.iter().map(|s| Value::String(s.clone())).collect())
}

fn to_string(value: &Value) -> Result<String, EncodeError> {
    serde_json::to_string(value).map_err(|err| EncodeError::Json {
        message: err.to_string(),
    })
}
