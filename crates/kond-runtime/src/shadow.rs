// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shadow evaluation: compare a candidate configuration against the
//! baseline serving live traffic.
//!
//! The baseline's value is always what the caller receives; the candidate
//! only produces comparison telemetry (reported with
//! [`EvaluationMode::Shadow`] so dashboards can segregate volumes).

use crate::namespace::Namespace;
use kond_core::context::Context;
use kond_core::feature::Feature;
use kond_core::result::{Decision, EvaluationMode, EvaluationResult};
use kond_core::value::FlagValue;

/// What differed between baseline and candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MismatchKind {
    /// The served values differ.
    Value,
    /// The decision variants differ (only reported when opted in).
    Decision,
}

/// Knobs for [`evaluate_with_shadow`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ShadowOptions {
    /// Evaluate the candidate even when the baseline namespace is
    /// kill-switched. Off by default: a disabled baseline usually means
    /// an incident, not an experiment.
    pub evaluate_candidate_when_baseline_disabled: bool,
    /// Also compare decision variants, not just values.
    pub compare_decisions: bool,
}

/// A baseline/candidate disagreement handed to the mismatch callback.
#[derive(Debug, Clone)]
pub struct ShadowMismatch<T> {
    /// Canonical feature id.
    pub feature_key: String,
    /// The baseline's result (its value was served).
    pub baseline: EvaluationResult<T>,
    /// The candidate's result.
    pub candidate: EvaluationResult<T>,
    /// Every way they disagreed.
    pub kinds: Vec<MismatchKind>,
}

/// Evaluate `feature` against both registries and return the baseline's
/// value.
///
/// The baseline runs in [`EvaluationMode::Normal`]; when it is
/// kill-switched and the options say so, the candidate is skipped
/// entirely. Otherwise the candidate runs in [`EvaluationMode::Shadow`],
/// and any disagreement is passed to `on_mismatch` after a structured
/// warning is logged.
///
/// # Panics
///
/// Panics under the same conditions as
/// [`Namespace::evaluate_with_reason`], for either registry.
pub fn evaluate_with_shadow<T, C>(
    feature: &Feature<T, C>,
    ctx: &C,
    candidate: &Namespace,
    baseline: &Namespace,
    options: &ShadowOptions,
    on_mismatch: impl FnOnce(ShadowMismatch<T>),
) -> T
where
    T: FlagValue,
    C: Context + 'static,
{
    let base = baseline.evaluate_in_mode(feature, ctx, EvaluationMode::Normal);
    if matches!(base.decision, Decision::RegistryDisabled)
        && !options.evaluate_candidate_when_baseline_disabled
    {
        return base.value;
    }

    let cand = candidate.evaluate_in_mode(feature, ctx, EvaluationMode::Shadow);

    let mut kinds = Vec::new();
    if base.value != cand.value {
        kinds.push(MismatchKind::Value);
    }
    if options.compare_decisions && base.decision.kind() != cand.decision.kind() {
        kinds.push(MismatchKind::Decision);
    }

    if kinds.is_empty() {
        return base.value;
    }

    tracing::warn!(
        feature = %base.feature_key,
        baseline_namespace = %baseline.id(),
        candidate_namespace = %candidate.id(),
        baseline_decision = %base.decision.kind(),
        candidate_decision = %cand.decision.kind(),
        kinds = ?kinds,
        "shadow evaluation mismatch"
    );

    let value = base.value.clone();
    on_mismatch(ShadowMismatch {
        feature_key: base.feature_key.clone(),
        baseline: base,
        candidate: cand,
        kinds,
    });
    value
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
