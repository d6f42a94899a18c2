// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! kond-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The value model of Konditional: everything that is *data* — ids,
//! versions, ramp-ups, buckets, values, contexts, criteria, rules,
//! definitions, configurations, results — plus the process-wide axis and
//! feature registries. The runtime (`kond-runtime`) layers lifecycle and
//! evaluation on top; the codec (`kond-codec`) layers the JSON boundary.

/// Targeting axes and the process-wide axis registry.
pub mod axis;
/// Deterministic SHA-256 bucketing.
pub mod bucket;
/// Configurations, patches, and diffs.
pub mod config;
/// Evaluation contexts.
pub mod context;
/// Feature declaration and the feature catalog.
pub mod feature;
/// Flag definitions and type erasure.
pub mod flag;
/// Stable identifiers.
pub mod id;
/// Rollout percentages.
pub mod rampup;
/// Evaluation results and decisions.
pub mod result;
/// Rules and rule building.
pub mod rule;
/// Targeting criteria and specificity.
pub mod targeting;
/// Typed flag values and their dynamic form.
pub mod value;
/// Version triples and ranges.
pub mod version;

pub use axis::{
    is_axis_registered, lookup_axis, register_axis, register_axis_descriptor, AxisDescriptor,
    AxisValue,
};
pub use bucket::{bucket_for, BucketInfo, BUCKET_COUNT, MISSING_STABLE_ID_BUCKET};
pub use config::{ConfigDiff, ConfigMetadata, Configuration, ConfigurationBuilder, ConfigurationPatch};
pub use context::{Context, EvalContext};
pub use feature::{lookup_feature, Feature, FeatureHandle, NamespaceSchema};
pub use flag::{
    DefinitionError, DynFlag, DynRule, FlagDefinition, FlagDefinitionBuilder, FlagEntry,
    FlagParts, FlagPartsError, FlagRule, RuleValue,
};
pub use id::{FeatureId, IdError, StableId, FEATURE_ID_PREFIX};
pub use rampup::{RampUp, RampUpError};
pub use result::{Decision, DecisionKind, EvaluationMode, EvaluationResult, RuleMatch};
pub use rule::{Rule, RuleBuildError, RuleBuilder, RuleExplanation, RuleSpec};
pub use targeting::{Criterion, CriterionSpec, Extension, Guard, Specificity, TargetingError};
pub use value::{FlagValue, TaggedValue, ValueError, ValueKind};
pub use version::{Version, VersionParseError, VersionRange, VersionRangeError};

#[cfg(feature = "test-support")]
pub use axis::reset_axis_registry;
#[cfg(feature = "test-support")]
pub use feature::reset_feature_catalog;
