// SPDX-License-Identifier: MIT OR Apache-2.0
//! The evaluation engine.
//!
//! Evaluation is a pure function of `(feature, context)` for a fixed
//! snapshot: one atomic snapshot read, then rule selection in canonical
//! order with the deterministic bucket gate. It never blocks and never
//! fails once the feature's definition is loaded — missing registration
//! is a programming error and panics.

use crate::namespace::Namespace;
use kond_core::bucket::{bucket_for, BucketInfo, MISSING_STABLE_ID_BUCKET};
use kond_core::context::Context;
use kond_core::feature::Feature;
use kond_core::flag::FlagDefinition;
use kond_core::result::{Decision, EvaluationMode, EvaluationResult, RuleMatch};
use kond_core::value::FlagValue;
use kond_telemetry::EvaluationRecord;
use std::time::Instant;

impl Namespace {
    /// Evaluate a feature and return its value.
    ///
    /// Convenience over [`evaluate_with_reason`]; see there for the
    /// semantics and panics.
    ///
    /// [`evaluate_with_reason`]: Namespace::evaluate_with_reason
    pub fn evaluate<T: FlagValue, C: Context + 'static>(
        &self,
        feature: &Feature<T, C>,
        ctx: &C,
    ) -> T {
        self.evaluate_with_reason(feature, ctx).value
    }

    /// Evaluate a feature and return the value together with the decision
    /// that produced it.
    ///
    /// Decision order: kill-switch, override, inactive flag, rules in
    /// canonical order (criteria match, then the allowlist/bucket gate),
    /// definition default. The first rule that matched but was held back
    /// by its rollout is reported as `skipped_by_rollout`.
    ///
    /// # Panics
    ///
    /// Panics if the namespace's current configuration holds no
    /// definition for the feature, or holds one of a different type —
    /// both programming errors: register and load definitions at init.
    pub fn evaluate_with_reason<T: FlagValue, C: Context + 'static>(
        &self,
        feature: &Feature<T, C>,
        ctx: &C,
    ) -> EvaluationResult<T> {
        self.evaluate_in_mode(feature, ctx, EvaluationMode::Normal)
    }

    pub(crate) fn evaluate_in_mode<T: FlagValue, C: Context + 'static>(
        &self,
        feature: &Feature<T, C>,
        ctx: &C,
        mode: EvaluationMode,
    ) -> EvaluationResult<T> {
        let started = Instant::now();
        let snapshot = self.current();
        let config_version = snapshot.metadata().version.clone();

        let (value, decision) = if self.is_disabled() {
            // The kill-switch pre-empts everything, overrides included:
            // its contract is "declared defaults, no matter what state
            // the namespace holds".
            (feature.default_value().clone(), Decision::RegistryDisabled)
        } else if let Some(value) = self.override_value::<T>(feature.id()) {
            (value, Decision::overridden())
        } else {
            let definition = snapshot
                .definition(feature)
                .unwrap_or_else(|| match snapshot.get(feature.id()) {
                    Some(_) => panic!(
                        "feature '{}' is registered with namespace '{}' under a different value type",
                        feature.id(),
                        self.id(),
                    ),
                    None => panic!(
                        "feature '{}' has no definition in namespace '{}'; load a configuration first",
                        feature.id(),
                        self.id(),
                    ),
                });
            evaluate_definition(definition, ctx)
        };

        let result = EvaluationResult {
            namespace_id: self.id().to_string(),
            feature_key: feature.id().canonical(),
            config_version,
            mode,
            duration_ns: started.elapsed().as_nanos() as u64,
            value,
            decision,
        };

        let hooks = self.hooks();
        hooks.emit_evaluation(&EvaluationRecord {
            namespace_id: result.namespace_id.clone(),
            feature_key: result.feature_key.clone(),
            mode: result.mode,
            decision: result.decision.kind(),
            config_version: result.config_version.clone(),
            duration_ns: result.duration_ns,
        });
        hooks.debug(|| {
            format!(
                "evaluated {} in {}: {} ({:?} mode)",
                result.feature_key,
                result.namespace_id,
                result.decision.kind(),
                result.mode,
            )
        });
        result
    }
}

/// Rule selection against one definition.
fn evaluate_definition<T: FlagValue, C: Context + 'static>(
    definition: &FlagDefinition<T, C>,
    ctx: &C,
) -> (T, Decision) {
    if !definition.is_active() {
        return (definition.default_value().clone(), Decision::Inactive);
    }

    let feature_key = definition.feature_id().canonical();
    let stable_id = ctx.stable_id();
    let mut skipped_by_rollout: Option<RuleMatch> = None;

    for flag_rule in definition.rules() {
        let rule = flag_rule.rule();
        if !rule.matches(ctx) {
            continue;
        }

        let bucket = match stable_id {
            Some(id) => bucket_for(definition.salt(), &feature_key, id),
            None => MISSING_STABLE_ID_BUCKET,
        };
        let in_allowlist = stable_id.is_some_and(|id| {
            rule.allowlist().contains(id) || definition.rollout_allowlist().contains(id)
        });
        let in_rollout = in_allowlist || rule.ramp_up().admits_bucket(bucket);

        let matched = RuleMatch {
            explanation: rule.explanation(),
            bucket: Some(BucketInfo {
                bucket,
                threshold_bp: rule.ramp_up().threshold_bp(),
                in_rollout,
                ramp_up: rule.ramp_up(),
                salt: definition.salt().to_string(),
                feature_key: feature_key.clone(),
            }),
        };

        if in_rollout {
            return (
                flag_rule.value().resolve(ctx),
                Decision::Rule {
                    matched,
                    skipped_by_rollout,
                },
            );
        }
        // First skipped rule in canonical order = the most specific one.
        if skipped_by_rollout.is_none() {
            skipped_by_rollout = Some(matched);
        }
    }

    (
        definition.default_value().clone(),
        Decision::Default { skipped_by_rollout },
    )
}

/// Evaluation sugar on [`Feature`] itself, mirroring the host API.
pub trait FeatureExt<T, C> {
    /// Evaluate against a namespace; see [`Namespace::evaluate`].
    fn evaluate(&self, ctx: &C, namespace: &Namespace) -> T;

    /// Evaluate with the full decision; see
    /// [`Namespace::evaluate_with_reason`].
    fn evaluate_with_reason(&self, ctx: &C, namespace: &Namespace) -> EvaluationResult<T>;

    /// Evaluate against a baseline with a shadow candidate; see
    /// [`crate::shadow::evaluate_with_shadow`].
    fn evaluate_with_shadow(
        &self,
        ctx: &C,
        candidate: &Namespace,
        baseline: &Namespace,
        options: &crate::shadow::ShadowOptions,
        on_mismatch: impl FnOnce(crate::shadow::ShadowMismatch<T>),
    ) -> T;
}

impl<T: FlagValue, C: Context + 'static> FeatureExt<T, C> for Feature<T, C> {
    fn evaluate(&self, ctx: &C, namespace: &Namespace) -> T {
        namespace.evaluate(self, ctx)
    }

    fn evaluate_with_reason(&self, ctx: &C, namespace: &Namespace) -> EvaluationResult<T> {
        namespace.evaluate_with_reason(self, ctx)
    }

    fn evaluate_with_shadow(
        &self,
        ctx: &C,
        candidate: &Namespace,
        baseline: &Namespace,
        options: &crate::shadow::ShadowOptions,
        on_mismatch: impl FnOnce(crate::shadow::ShadowMismatch<T>),
    ) -> T {
        crate::shadow::evaluate_with_shadow(self, ctx, candidate, baseline, options, on_mismatch)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
