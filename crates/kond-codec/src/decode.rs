// SPDX-License-Identifier: MIT OR Apache-2.0
//! Snapshot and patch decoding.
//!
//! Decoding is a manual walk over `serde_json::Value` so that every
//! failure carries the JSON path it happened at. Feature resolution goes
//! through the caller's [`NamespaceSchema`]; value typing goes through
//! the feature catalog's decode vtables.

use crate::error::ParseError;
use kond_core::axis;
use kond_core::config::{ConfigMetadata, Configuration, ConfigurationPatch};
use kond_core::flag::{FlagEntry, FlagParts, FlagPartsError};
use kond_core::id::{FeatureId, StableId};
use kond_core::rampup::RampUp;
use kond_core::rule::RuleSpec;
use kond_core::targeting::{CriterionSpec, TargetingError};
use kond_core::value::{TaggedValue, ValueError, ValueKind};
use kond_core::version::{Version, VersionRange};
use kond_core::NamespaceSchema;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Wire tags of [`VersionRange`] variants. `MIN_AND_MAX_BOUND` is the
/// canonical fully-bounded tag; nothing else is accepted.
pub const VERSION_RANGE_TAGS: [&str; 4] =
    ["UNBOUNDED", "MIN_BOUND", "MAX_BOUND", "MIN_AND_MAX_BOUND"];

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Decode a snapshot document against a namespace schema.
pub fn decode_snapshot(json: &str, schema: &NamespaceSchema) -> Result<Configuration, ParseError> {
    let root = parse_root(json)?;
    let obj = as_object(&root, "$")?;

    let metadata = match obj.get("meta") {
        Some(meta) => decode_meta(meta, "$.meta")?,
        None => ConfigMetadata::default(),
    };

    let flags = as_array(required(obj, "flags", "$")?, "$.flags")?;
    let mut builder = Configuration::builder().metadata(metadata);
    let mut seen: BTreeSet<FeatureId> = BTreeSet::new();
    for (index, value) in flags.iter().enumerate() {
        let path = format!("$.flags[{index}]");
        let entry = decode_flag(value, schema, &path)?;
        if !seen.insert(entry.feature_id().clone()) {
            return Err(ParseError::InvalidScalar {
                field: format!("{path}.key"),
                reason: format!("duplicate feature key '{}'", entry.feature_id()),
            });
        }
        builder = builder.entry(entry);
    }
    Ok(builder.build())
}

/// Decode a patch document against a namespace schema.
pub fn decode_patch(json: &str, schema: &NamespaceSchema) -> Result<ConfigurationPatch, ParseError> {
    let root = parse_root(json)?;
    let obj = as_object(&root, "$")?;

    let metadata = match obj.get("meta") {
        Some(meta) => Some(decode_meta(meta, "$.meta")?),
        None => None,
    };

    let mut add_or_replace = Vec::new();
    if let Some(flags) = obj.get("flags") {
        let flags = as_array(flags, "$.flags")?;
        let mut seen: BTreeSet<FeatureId> = BTreeSet::new();
        for (index, value) in flags.iter().enumerate() {
            let path = format!("$.flags[{index}]");
            let entry = decode_flag(value, schema, &path)?;
            if !seen.insert(entry.feature_id().clone()) {
                return Err(ParseError::InvalidScalar {
                    field: format!("{path}.key"),
                    reason: format!("duplicate feature key '{}'", entry.feature_id()),
                });
            }
            add_or_replace.push(entry);
        }
    }

    let mut remove = BTreeSet::new();
    if let Some(keys) = obj.get("removeKeys") {
        let keys = as_array(keys, "$.removeKeys")?;
        for (index, value) in keys.iter().enumerate() {
            let path = format!("$.removeKeys[{index}]");
            let raw = as_str(value, &path)?;
            let id = FeatureId::parse(raw).map_err(|err| ParseError::InvalidScalar {
                field: path,
                reason: err.to_string(),
            })?;
            remove.insert(id);
        }
    }

    Ok(ConfigurationPatch {
        add_or_replace,
        remove,
        metadata,
    })
}

/// Decode a patch and apply it to `current`, producing the new snapshot.
///
/// The whole patch is atomic: any failure leaves `current` untouched and
/// nothing is returned but the error. Removals of features absent from
/// `current` are logged and ignored.
pub fn apply_patch_json(
    current: &Configuration,
    json: &str,
    schema: &NamespaceSchema,
) -> Result<Configuration, ParseError> {
    let patch = decode_patch(json, schema)?;
    for id in patch.dangling_removals(current) {
        tracing::debug!(feature = %id, "patch removes an undefined feature; ignoring");
    }
    Ok(patch.apply_to(current))
}

// ---------------------------------------------------------------------------
// Document pieces
// ---------------------------------------------------------------------------

fn decode_meta(value: &Value, path: &str) -> Result<ConfigMetadata, ParseError> {
    let obj = as_object(value, path)?;
    let version = match obj.get("version") {
        Some(v) => Some(as_str(v, &format!("{path}.version"))?.to_string()),
        None => None,
    };
    let generated_at_epoch_millis = match obj.get("generatedAtEpochMillis") {
        Some(v) => Some(as_i64(v, &format!("{path}.generatedAtEpochMillis"))?),
        None => None,
    };
    let source = match obj.get("source") {
        Some(v) => Some(as_str(v, &format!("{path}.source"))?.to_string()),
        None => None,
    };
    Ok(ConfigMetadata {
        version,
        generated_at_epoch_millis,
        source,
    })
}

fn decode_flag(
    value: &Value,
    schema: &NamespaceSchema,
    path: &str,
) -> Result<FlagEntry, ParseError> {
    let obj = as_object(value, path)?;

    let key_path = format!("{path}.key");
    let raw_key = as_str(required(obj, "key", path)?, &key_path)?;
    let feature = FeatureId::parse(raw_key).map_err(|err| ParseError::InvalidScalar {
        field: key_path,
        reason: err.to_string(),
    })?;
    let handle = schema.resolve(&feature).ok_or_else(|| ParseError::UnknownFeature {
        feature_id: feature.canonical(),
    })?;

    let default = decode_tagged(
        required(obj, "defaultValue", path)?,
        &format!("{path}.defaultValue"),
    )?;
    let salt = as_str(required(obj, "salt", path)?, &format!("{path}.salt"))?.to_string();
    let active = match obj.get("isActive") {
        Some(v) => as_bool(v, &format!("{path}.isActive"))?,
        None => true,
    };
    let rollout_allowlist = match obj.get("rollupAllowlist") {
        Some(v) => decode_allowlist(v, &format!("{path}.rollupAllowlist"))?,
        None => BTreeSet::new(),
    };

    let mut rules = Vec::new();
    if let Some(value) = obj.get("rules") {
        let array = as_array(value, &format!("{path}.rules"))?;
        for (index, rule) in array.iter().enumerate() {
            rules.push(decode_rule(rule, &format!("{path}.rules[{index}]"))?);
        }
    }

    let parts = FlagParts {
        feature: feature.clone(),
        default,
        salt,
        active,
        rollout_allowlist,
        rules,
    };
    handle
        .build_flag(parts)
        .map_err(|err| map_parts_error(&feature, err, path))
}

fn decode_rule(value: &Value, path: &str) -> Result<(RuleSpec, TaggedValue), ParseError> {
    let obj = as_object(value, path)?;

    let rule_value = decode_tagged(required(obj, "value", path)?, &format!("{path}.value"))?;

    let ramp_path = format!("{path}.rampUp");
    let ramp_raw = as_f64(required(obj, "rampUp", path)?, &ramp_path)?;
    let ramp_up = RampUp::new(ramp_raw).map_err(|err| ParseError::InvalidScalar {
        field: ramp_path,
        reason: err.to_string(),
    })?;

    let allowlist = match obj.get("rampUpAllowlist") {
        Some(v) => decode_allowlist(v, &format!("{path}.rampUpAllowlist"))?,
        None => BTreeSet::new(),
    };

    let note = match obj.get("note") {
        Some(v) => Some(as_str(v, &format!("{path}.note"))?.to_string()),
        None => None,
    };

    // Criteria are assembled in canonical category order: locales,
    // platforms, version, axes (sorted by axis id).
    let mut criteria = Vec::new();
    if let Some(v) = obj.get("locales") {
        criteria.push(CriterionSpec::Locales(decode_string_set(
            v,
            &format!("{path}.locales"),
        )?));
    }
    if let Some(v) = obj.get("platforms") {
        criteria.push(CriterionSpec::Platforms(decode_string_set(
            v,
            &format!("{path}.platforms"),
        )?));
    }
    if let Some(v) = obj.get("versionRange") {
        criteria.push(CriterionSpec::Version(decode_version_range(
            v,
            &format!("{path}.versionRange"),
        )?));
    }
    if let Some(v) = obj.get("axes") {
        let axes_path = format!("{path}.axes");
        let axes = as_object(v, &axes_path)?;
        for (axis_id, values) in axes {
            let axis_path = format!("{axes_path}.{axis_id}");
            let descriptor = axis::lookup_axis(axis_id).ok_or_else(|| ParseError::UnknownAxis {
                axis_id: axis_id.clone(),
            })?;
            let values = decode_string_set(values, &axis_path)?;
            if !descriptor.values.is_empty() {
                if let Some(unknown) = values.iter().find(|v| !descriptor.values.contains(*v)) {
                    return Err(ParseError::InvalidScalar {
                        field: axis_path,
                        reason: format!("unknown value '{unknown}' for axis '{axis_id}'"),
                    });
                }
            }
            criteria.push(CriterionSpec::Axis {
                axis_id: axis_id.clone(),
                values,
            });
        }
    }

    Ok((
        RuleSpec {
            criteria,
            note,
            ramp_up,
            allowlist,
        },
        rule_value,
    ))
}

fn decode_tagged(value: &Value, path: &str) -> Result<TaggedValue, ParseError> {
    let obj = as_object(value, path)?;
    let tag_path = format!("{path}.type");
    let tag = as_str(required(obj, "type", path)?, &tag_path)?;
    let kind = ValueKind::from_tag(tag).ok_or_else(|| ParseError::UnknownVariant {
        field: tag_path,
        tag: tag.to_string(),
    })?;
    match kind {
        ValueKind::Boolean => Ok(TaggedValue::Boolean {
            value: as_bool(required(obj, "value", path)?, &format!("{path}.value"))?,
        }),
        ValueKind::String => Ok(TaggedValue::String {
            value: as_str(required(obj, "value", path)?, &format!("{path}.value"))?.to_string(),
        }),
        ValueKind::Int => Ok(TaggedValue::Int {
            value: as_i64(required(obj, "value", path)?, &format!("{path}.value"))?,
        }),
        ValueKind::Double => Ok(TaggedValue::Double {
            value: as_f64(required(obj, "value", path)?, &format!("{path}.value"))?,
        }),
        ValueKind::Enum => Ok(TaggedValue::Enum {
            enum_name: as_str(
                required(obj, "enumClassName", path)?,
                &format!("{path}.enumClassName"),
            )?
            .to_string(),
            constant: as_str(
                required(obj, "constantName", path)?,
                &format!("{path}.constantName"),
            )?
            .to_string(),
        }),
        ValueKind::Struct => Ok(TaggedValue::Struct {
            struct_name: as_str(required(obj, "className", path)?, &format!("{path}.className"))?
                .to_string(),
            fields: required(obj, "fields", path)?.clone(),
        }),
    }
}

fn decode_version_range(value: &Value, path: &str) -> Result<VersionRange, ParseError> {
    let obj = as_object(value, path)?;
    let tag_path = format!("{path}.type");
    let tag = as_str(required(obj, "type", path)?, &tag_path)?;
    match tag {
        "UNBOUNDED" => Ok(VersionRange::Unbounded),
        "MIN_BOUND" => Ok(VersionRange::MinBound(decode_version(
            required(obj, "min", path)?,
            &format!("{path}.min"),
        )?)),
        "MAX_BOUND" => Ok(VersionRange::MaxBound(decode_version(
            required(obj, "max", path)?,
            &format!("{path}.max"),
        )?)),
        "MIN_AND_MAX_BOUND" => {
            let min = decode_version(required(obj, "min", path)?, &format!("{path}.min"))?;
            let max = decode_version(required(obj, "max", path)?, &format!("{path}.max"))?;
            VersionRange::bounded(min, max).map_err(|err| ParseError::InvalidScalar {
                field: path.to_string(),
                reason: err.to_string(),
            })
        }
        other => Err(ParseError::UnknownVariant {
            field: tag_path,
            tag: other.to_string(),
        }),
    }
}

fn decode_version(value: &Value, path: &str) -> Result<Version, ParseError> {
    let obj = as_object(value, path)?;
    let component = |key: &str| -> Result<u32, ParseError> {
        let field = format!("{path}.{key}");
        let raw = as_i64(required(obj, key, path)?, &field)?;
        u32::try_from(raw).map_err(|_| ParseError::InvalidScalar {
            field,
            reason: format!("component {raw} is outside 0..=u32::MAX"),
        })
    };
    Ok(Version::new(component("major")?, component("minor")?, component("patch")?))
}

fn decode_allowlist(value: &Value, path: &str) -> Result<BTreeSet<StableId>, ParseError> {
    let array = as_array(value, path)?;
    let mut out = BTreeSet::new();
    for (index, raw) in array.iter().enumerate() {
        let field = format!("{path}[{index}]");
        let hex = as_str(raw, &field)?;
        let id = StableId::from_hex(hex).map_err(|err| ParseError::InvalidScalar {
            field: field.clone(),
            reason: err.to_string(),
        })?;
        if !out.insert(id) {
            return Err(ParseError::InvalidScalar {
                field,
                reason: format!("duplicate entry '{hex}'"),
            });
        }
    }
    Ok(out)
}

fn decode_string_set(value: &Value, path: &str) -> Result<BTreeSet<String>, ParseError> {
    let array = as_array(value, path)?;
    if array.is_empty() {
        return Err(ParseError::InvalidScalar {
            field: path.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    let mut out = BTreeSet::new();
    for (index, raw) in array.iter().enumerate() {
        let field = format!("{path}[{index}]");
        let s = as_str(raw, &field)?.to_string();
        if !out.insert(s.clone()) {
            return Err(ParseError::InvalidScalar {
                field,
                reason: format!("duplicate entry '{s}'"),
            });
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Translate typed-assembly failures into wire errors with paths.
fn map_parts_error(feature: &FeatureId, err: FlagPartsError, path: &str) -> ParseError {
    match err {
        FlagPartsError::DefaultValue(source) => {
            map_value_error(feature, source, &format!("{path}.defaultValue"))
        }
        FlagPartsError::RuleValue { index, source } => {
            map_value_error(feature, source, &format!("{path}.rules[{index}].value"))
        }
        FlagPartsError::Rule { index, source } => {
            map_targeting_error(source, &format!("{path}.rules[{index}]"))
        }
        FlagPartsError::Definition(err) => match err {
            kond_core::flag::DefinitionError::DuplicateRule { index, .. } => {
                ParseError::DuplicateRule {
                    feature: feature.canonical(),
                    index,
                }
            }
            other => ParseError::InvalidScalar {
                field: path.to_string(),
                reason: other.to_string(),
            },
        },
    }
}

fn map_value_error(feature: &FeatureId, err: ValueError, path: &str) -> ParseError {
    match err {
        ValueError::KindMismatch { expected, found } => ParseError::TypeMismatch {
            feature: feature.canonical(),
            expected: expected.tag().to_string(),
            found: found.tag().to_string(),
        },
        ValueError::UnknownConstant { constant, .. } => ParseError::UnknownVariant {
            field: format!("{path}.constantName"),
            tag: constant,
        },
        ValueError::ClassMismatch { found, .. } => ParseError::UnknownVariant {
            field: path.to_string(),
            tag: found,
        },
        ValueError::BadFields { reason } => ParseError::InvalidScalar {
            field: format!("{path}.fields"),
            reason,
        },
    }
}

fn map_targeting_error(err: TargetingError, path: &str) -> ParseError {
    match err {
        TargetingError::UnregisteredAxis { axis_id } => ParseError::UnknownAxis { axis_id },
        other => ParseError::InvalidScalar {
            field: path.to_string(),
            reason: other.to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Value walking
// ---------------------------------------------------------------------------

fn parse_root(json: &str) -> Result<Value, ParseError> {
    serde_json::from_str(json).map_err(|err| ParseError::Syntax {
        path: "$".to_string(),
        message: err.to_string(),
    })
}

fn required<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<&'a Value, ParseError> {
    obj.get(key).ok_or_else(|| ParseError::InvalidScalar {
        field: format!("{path}.{key}"),
        reason: "missing required field".to_string(),
    })
}

fn as_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, ParseError> {
    value.as_object().ok_or_else(|| type_error(value, path, "an object"))
}

fn as_array<'a>(value: &'a Value, path: &str) -> Result<&'a Vec<Value>, ParseError> {
    value.as_array().ok_or_else(|| type_error(value, path, "an array"))
}

fn as_str<'a>(value: &'a Value, path: &str) -> Result<&'a str, ParseError> {
    value.as_str().ok_or_else(|| type_error(value, path, "a string"))
}

fn as_bool(value: &Value, path: &str) -> Result<bool, ParseError> {
    value.as_bool().ok_or_else(|| type_error(value, path, "a boolean"))
}

fn as_i64(value: &Value, path: &str) -> Result<i64, ParseError> {
    value.as_i64().ok_or_else(|| type_error(value, path, "an integer"))
}

fn as_f64(value: &Value, path: &str) -> Result<f64, ParseError> {
    value.as_f64().ok_or_else(|| type_error(value, path, "a number"))
}

fn type_error(value: &Value, path: &str, expected: &str) -> ParseError {
    let found = match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    };
    ParseError::InvalidScalar {
        field: path.to_string(),
        reason: format!("expected {expected}, found {found}"),
    }
}
