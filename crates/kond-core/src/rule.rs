// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rules: criteria bound to a rollout gate.

use crate::context::Context;
use crate::id::StableId;
use crate::rampup::{RampUp, RampUpError};
use crate::targeting::{
    canonicalize_criteria, Criterion, CriterionSpec, Extension, Guard, Specificity,
    TargetingError,
};
use crate::version::VersionRange;
use std::collections::BTreeSet;
use std::fmt;

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// Targeting criteria plus the rollout gate that decides whether a
/// matching context actually receives the rule's value.
pub struct Rule<C> {
    criteria: Vec<Criterion<C>>,
    note: Option<String>,
    ramp_up: RampUp,
    allowlist: BTreeSet<StableId>,
}

impl<C> Rule<C> {
    /// Start building a rule. With no criteria it matches everything at
    /// full rollout.
    pub fn builder() -> RuleBuilder<C> {
        RuleBuilder::new()
    }

    /// Optional free-form note; ties in specificity break on it.
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    /// Rollout percentage gating matched contexts.
    pub fn ramp_up(&self) -> RampUp {
        self.ramp_up
    }

    /// Stable ids that bypass the rollout gate.
    pub fn allowlist(&self) -> &BTreeSet<StableId> {
        &self.allowlist
    }

    /// Summed specificity of the criteria.
    pub fn specificity(&self) -> Specificity {
        self.criteria
            .iter()
            .fold(Specificity::ZERO, |acc, c| {
                let s = c.specificity();
                Specificity {
                    base: acc.base + s.base,
                    extension: acc.extension + s.extension,
                }
            })
    }

    /// Closure-free mirror of the whole rule.
    pub fn spec(&self) -> RuleSpec {
        RuleSpec {
            criteria: self.criteria.iter().map(Criterion::spec).collect(),
            note: self.note.clone(),
            ramp_up: self.ramp_up,
            allowlist: self.allowlist.clone(),
        }
    }

    /// Explanation attached to evaluation results.
    pub fn explanation(&self) -> RuleExplanation {
        self.spec().explanation()
    }

    /// Canonical identity for duplicate detection: criteria signature plus
    /// rollout and allowlist (the note is presentation, not identity).
    pub(crate) fn signature(&self) -> String {
        self.spec().signature()
    }

    /// Rebuild a rule from its mirror (codec path). Fails for specs that
    /// carry extensions or guards.
    pub fn from_spec(spec: &RuleSpec) -> Result<Self, TargetingError> {
        let criteria = spec
            .criteria
            .iter()
            .map(Criterion::from_spec)
            .collect::<Result<Vec<_>, _>>()?;
        let criteria = canonicalize_criteria(criteria)?;
        Ok(Self {
            criteria,
            note: spec.note.clone(),
            ramp_up: spec.ramp_up,
            allowlist: spec.allowlist.clone(),
        })
    }
}

impl<C: Context> Rule<C> {
    /// Whether every criterion matches the context.
    pub fn matches(&self, ctx: &C) -> bool {
        self.criteria.iter().all(|c| c.matches(ctx))
    }
}

impl<C> Clone for Rule<C> {
    fn clone(&self) -> Self {
        Self {
            criteria: self.criteria.clone(),
            note: self.note.clone(),
            ramp_up: self.ramp_up,
            allowlist: self.allowlist.clone(),
        }
    }
}

impl<C> fmt::Debug for Rule<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("criteria", &self.criteria)
            .field("note", &self.note)
            .field("ramp_up", &self.ramp_up)
            .field("allowlist", &self.allowlist)
            .finish()
    }
}

impl<C> PartialEq for Rule<C> {
    fn eq(&self, other: &Self) -> bool {
        self.spec() == other.spec()
    }
}

// ---------------------------------------------------------------------------
// RuleBuilder
// ---------------------------------------------------------------------------

/// Plain builder mirroring the declarative rule syntax.
///
/// Invalid input (empty sets, out-of-range ramp-ups, duplicate criterion
/// categories) is remembered and surfaced at [`build`](RuleBuilder::build)
/// — rule construction fails loudly at build time, never at evaluation
/// time.
pub struct RuleBuilder<C> {
    criteria: Vec<Criterion<C>>,
    note: Option<String>,
    ramp_up: RampUp,
    allowlist: BTreeSet<StableId>,
    error: Option<RuleBuildError>,
}

/// Rejected rule construction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleBuildError {
    /// A criterion was invalid or duplicated.
    #[error(transparent)]
    Targeting(#[from] TargetingError),
    /// The ramp-up percentage was out of range.
    #[error(transparent)]
    RampUp(#[from] RampUpError),
}

impl<C> RuleBuilder<C> {
    fn new() -> Self {
        Self {
            criteria: Vec::new(),
            note: None,
            ramp_up: RampUp::FULL,
            allowlist: BTreeSet::new(),
            error: None,
        }
    }

    fn push(mut self, built: Result<Criterion<C>, TargetingError>) -> Self {
        match built {
            Ok(criterion) => self.criteria.push(criterion),
            Err(err) if self.error.is_none() => self.error = Some(err.into()),
            Err(_) => {}
        }
        self
    }

    /// Require the context locale to be one of `ids`.
    pub fn locales<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Criterion::locales(ids))
    }

    /// Require the context platform to be one of `ids`.
    pub fn platforms<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Criterion::platforms(ids))
    }

    /// Require the context version to lie in `range`.
    pub fn version(self, range: VersionRange) -> Self {
        self.push(Ok(Criterion::version(range)))
    }

    /// Require at least one context value of the typed axis to be in
    /// `values`.
    pub fn axis<A, I>(self, values: I) -> Self
    where
        A: crate::axis::AxisValue,
        I: IntoIterator<Item = A>,
    {
        self.push(Criterion::axis::<A, I>(values))
    }

    /// Raw-axis variant of [`axis`](RuleBuilder::axis).
    pub fn axis_values<I, S>(self, axis_id: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Criterion::axis_values(axis_id, values))
    }

    /// Attach a named host predicate with weight 1.
    pub fn matching(
        self,
        name: impl Into<String>,
        predicate: impl Fn(&C) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.push(Ok(Criterion::extension(Extension::new(name, predicate))))
    }

    /// Attach a pre-built extension.
    pub fn extension(self, extension: Extension<C>) -> Self {
        self.push(Ok(Criterion::extension(extension)))
    }

    /// Attach a guard.
    pub fn guarded(self, guard: Guard<C>) -> Self {
        self.push(Ok(Criterion::guarded(guard)))
    }

    /// Attach an arbitrary criterion.
    pub fn criterion(self, criterion: Criterion<C>) -> Self {
        self.push(Ok(criterion))
    }

    /// Attach a note; ties in specificity break on it lexicographically.
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Gate matched contexts at `percent` of the population.
    pub fn ramp_up(mut self, percent: f64) -> Self {
        match RampUp::new(percent) {
            Ok(ramp_up) => self.ramp_up = ramp_up,
            Err(err) if self.error.is_none() => self.error = Some(err.into()),
            Err(_) => {}
        }
        self
    }

    /// Gate with a pre-validated ramp-up.
    pub fn rollout(mut self, ramp_up: RampUp) -> Self {
        self.ramp_up = ramp_up;
        self
    }

    /// Let `id` bypass the rollout gate after the criteria match.
    pub fn allow(mut self, id: StableId) -> Self {
        self.allowlist.insert(id);
        self
    }

    /// Finish the rule, canonicalizing criteria order.
    pub fn build(self) -> Result<Rule<C>, RuleBuildError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let criteria = canonicalize_criteria(self.criteria)?;
        Ok(Rule {
            criteria,
            note: self.note,
            ramp_up: self.ramp_up,
            allowlist: self.allowlist,
        })
    }
}

// ---------------------------------------------------------------------------
// RuleSpec & RuleExplanation
// ---------------------------------------------------------------------------

/// Closure-free mirror of a rule, used for equality, encoding, and
/// duplicate detection.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSpec {
    /// Mirrors of the criteria in canonical order.
    pub criteria: Vec<CriterionSpec>,
    /// Optional note.
    pub note: Option<String>,
    /// Rollout percentage.
    pub ramp_up: RampUp,
    /// Rollout-bypassing stable ids.
    pub allowlist: BTreeSet<StableId>,
}

impl RuleSpec {
    /// Summed specificity of the criteria.
    pub fn specificity(&self) -> Specificity {
        self.criteria.iter().fold(Specificity::ZERO, |acc, c| {
            let s = c.specificity();
            Specificity {
                base: acc.base + s.base,
                extension: acc.extension + s.extension,
            }
        })
    }

    /// Canonical duplicate-detection identity: criteria signatures plus
    /// rollout threshold and allowlist.
    pub fn signature(&self) -> String {
        let criteria: Vec<String> = self.criteria.iter().map(CriterionSpec::signature).collect();
        let allow: Vec<&str> = self.allowlist.iter().map(StableId::as_hex).collect();
        format!(
            "[{}]@{}bp/allow[{}]",
            criteria.join(";"),
            self.ramp_up.threshold_bp(),
            allow.join(",")
        )
    }

    /// Build the explanation attached to evaluation results.
    pub fn explanation(&self) -> RuleExplanation {
        let summary = if self.criteria.is_empty() {
            "match-all".to_string()
        } else {
            self.criteria
                .iter()
                .map(CriterionSpec::summary)
                .collect::<Vec<_>>()
                .join(" AND ")
        };
        let mut extensions = Vec::new();
        for criterion in &self.criteria {
            criterion.extension_names(&mut extensions);
        }
        RuleExplanation {
            summary,
            specificity: self.specificity(),
            extensions,
            note: self.note.clone(),
        }
    }
}

/// Why a rule was (or was not) selected — the criteria summary carried on
/// evaluation results.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RuleExplanation {
    /// Human-readable criteria summary.
    pub summary: String,
    /// The rule's specificity.
    pub specificity: Specificity,
    /// Names of extension predicates involved.
    pub extensions: Vec<String>,
    /// The rule's note, if any.
    pub note: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
