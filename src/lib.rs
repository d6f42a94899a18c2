// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! konditional
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! This crate is the facade: it re-exports the whole public surface of
//! the member crates. If you only take one dependency, take this one.

pub use kond_codec::{
    apply_patch_json, decode_patch, decode_snapshot, encode_patch, encode_snapshot,
    encode_snapshot_value, EncodeError, ParseError, VERSION_RANGE_TAGS,
};
pub use kond_core::{
    bucket_for, is_axis_registered, lookup_axis, lookup_feature, register_axis,
    register_axis_descriptor, AxisDescriptor, AxisValue, BucketInfo, ConfigDiff, ConfigMetadata,
    Configuration, ConfigurationBuilder, ConfigurationPatch, Context, Criterion, CriterionSpec,
    Decision, DecisionKind, DefinitionError, DynFlag, DynRule, EvalContext, EvaluationMode,
    EvaluationResult, Extension, Feature, FeatureHandle, FeatureId, FlagDefinition,
    FlagDefinitionBuilder, FlagEntry, FlagParts, FlagPartsError, FlagRule, FlagValue, Guard,
    IdError, NamespaceSchema, RampUp, RampUpError, Rule, RuleBuildError, RuleBuilder,
    RuleExplanation, RuleMatch, RuleSpec, RuleValue, Specificity, StableId, TaggedValue,
    TargetingError, ValueError, ValueKind, Version, VersionParseError, VersionRange,
    VersionRangeError, BUCKET_COUNT, FEATURE_ID_PREFIX, MISSING_STABLE_ID_BUCKET,
};
pub use kond_runtime::{
    evaluate_with_shadow, FeatureExt, MismatchKind, Namespace, ShadowMismatch, ShadowOptions,
};
pub use kond_telemetry::{
    ConfigLoadRecord, ConfigRollbackRecord, EvaluationRecord, Hooks, InMemoryMetrics, LogLevel,
    Logger, MetricsCollector, NoopLogger, NoopMetrics, TracingLogger,
};

/// Everything a typical host needs in scope.
pub mod prelude {
    pub use kond_core::{
        AxisValue, Configuration, Context, EvalContext, Feature, FlagDefinition, FlagValue,
        NamespaceSchema, RampUp, Rule, StableId, Version, VersionRange,
    };
    pub use kond_runtime::{evaluate_with_shadow, FeatureExt, Namespace, ShadowOptions};
    pub use kond_telemetry::Hooks;
}
