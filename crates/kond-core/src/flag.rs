// SPDX-License-Identifier: MIT OR Apache-2.0
//! Flag definitions: a feature's default, salt, activity, and ordered
//! rules, plus the type-erased form configurations store.
//!
//! Definitions are immutable values. Rules are held in *canonical order*
//! — `(-total_specificity, note, insertion_index)` — so the first matching
//! in-rollout rule during evaluation is always the most specific one, and
//! encoded documents are independent of construction order beyond that.

use crate::context::{Context, EvalContext};
use crate::id::{FeatureId, StableId};
use crate::rule::{Rule, RuleBuildError, RuleBuilder, RuleSpec};
use crate::targeting::TargetingError;
use crate::value::{FlagValue, TaggedValue, ValueError, ValueKind};
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Rejected flag-definition construction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DefinitionError {
    /// Two rules share the same canonical identity (criteria signature,
    /// rollout, and rule allowlist).
    #[error("duplicate rule at index {index}: {signature}")]
    DuplicateRule {
        /// Insertion index of the second occurrence.
        index: usize,
        /// The colliding signature.
        signature: String,
    },

    /// A rule failed to build.
    #[error("rule at index {index}: {source}")]
    Rule {
        /// Insertion index of the failing rule.
        index: usize,
        /// Underlying rule error.
        source: RuleBuildError,
    },
}

/// Failure assembling a typed definition from decoded parts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FlagPartsError {
    /// The default value does not fit the declared type.
    #[error("default value: {0}")]
    DefaultValue(#[source] ValueError),

    /// A rule value does not fit the declared type.
    #[error("rule {index} value: {source}")]
    RuleValue {
        /// Rule index in document order.
        index: usize,
        /// Underlying conversion error.
        source: ValueError,
    },

    /// A rule's criteria could not be reconstituted.
    #[error("rule {index}: {source}")]
    Rule {
        /// Rule index in document order.
        index: usize,
        /// Underlying targeting error.
        source: TargetingError,
    },

    /// The assembled definition violated a definition invariant.
    #[error(transparent)]
    Definition(DefinitionError),
}

// ---------------------------------------------------------------------------
// RuleValue
// ---------------------------------------------------------------------------

/// The value a rule yields when it wins: either a fixed value or a
/// deferred resolver run against the evaluation context.
pub enum RuleValue<T, C> {
    /// A value fixed at definition time.
    Fixed(T),
    /// A resolver executed only after the rule matches and clears its
    /// rollout gate, before hooks fire.
    Resolver(Arc<dyn Fn(&C) -> T + Send + Sync>),
}

impl<T: Clone, C> RuleValue<T, C> {
    /// Produce the value for a winning rule.
    pub fn resolve(&self, ctx: &C) -> T {
        match self {
            Self::Fixed(value) => value.clone(),
            Self::Resolver(resolver) => resolver(ctx),
        }
    }

    /// The fixed value, if this is not a resolver.
    pub fn fixed(&self) -> Option<&T> {
        match self {
            Self::Fixed(value) => Some(value),
            Self::Resolver(_) => None,
        }
    }
}

impl<T: Clone, C> Clone for RuleValue<T, C> {
    fn clone(&self) -> Self {
        match self {
            Self::Fixed(value) => Self::Fixed(value.clone()),
            Self::Resolver(resolver) => Self::Resolver(Arc::clone(resolver)),
        }
    }
}

impl<T: fmt::Debug, C> fmt::Debug for RuleValue<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Self::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

impl<T: PartialEq, C> PartialEq for RuleValue<T, C> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Fixed(a), Self::Fixed(b)) => a == b,
            // Resolvers compare by identity; distinct closures are distinct.
            (Self::Resolver(a), Self::Resolver(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// FlagDefinition
// ---------------------------------------------------------------------------

/// One rule bound to the value it yields.
pub struct FlagRule<T, C> {
    rule: Rule<C>,
    value: RuleValue<T, C>,
}

impl<T, C> FlagRule<T, C> {
    /// The targeting rule.
    pub fn rule(&self) -> &Rule<C> {
        &self.rule
    }

    /// The value it yields.
    pub fn value(&self) -> &RuleValue<T, C> {
        &self.value
    }
}

// Manual impls: deriving would demand the same bounds of `C`, which is
// only ever a phantom in closures here.
impl<T: Clone, C> Clone for FlagRule<T, C> {
    fn clone(&self) -> Self {
        Self {
            rule: self.rule.clone(),
            value: self.value.clone(),
        }
    }
}

impl<T: PartialEq, C> PartialEq for FlagRule<T, C> {
    fn eq(&self, other: &Self) -> bool {
        self.rule == other.rule && self.value == other.value
    }
}

impl<T: fmt::Debug, C> fmt::Debug for FlagRule<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlagRule")
            .field("rule", &self.rule)
            .field("value", &self.value)
            .finish()
    }
}

/// A feature's complete rollout definition.
pub struct FlagDefinition<T, C = EvalContext> {
    feature: FeatureId,
    default: T,
    salt: String,
    active: bool,
    rollout_allowlist: BTreeSet<StableId>,
    rules: Vec<FlagRule<T, C>>,
}

impl<T: Clone, C> Clone for FlagDefinition<T, C> {
    fn clone(&self) -> Self {
        Self {
            feature: self.feature.clone(),
            default: self.default.clone(),
            salt: self.salt.clone(),
            active: self.active,
            rollout_allowlist: self.rollout_allowlist.clone(),
            rules: self.rules.clone(),
        }
    }
}

impl<T: PartialEq, C> PartialEq for FlagDefinition<T, C> {
    fn eq(&self, other: &Self) -> bool {
        self.feature == other.feature
            && self.default == other.default
            && self.salt == other.salt
            && self.active == other.active
            && self.rollout_allowlist == other.rollout_allowlist
            && self.rules == other.rules
    }
}

impl<T: fmt::Debug, C> fmt::Debug for FlagDefinition<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlagDefinition")
            .field("feature", &self.feature.canonical())
            .field("default", &self.default)
            .field("salt", &self.salt)
            .field("active", &self.active)
            .field("rollout_allowlist", &self.rollout_allowlist)
            .field("rules", &self.rules)
            .finish()
    }
}

impl<T: FlagValue, C: Context + 'static> FlagDefinition<T, C> {
    /// Start building a definition for a declared feature; the default
    /// seeds from the feature's declared default.
    pub fn builder(feature: &crate::feature::Feature<T, C>) -> FlagDefinitionBuilder<T, C> {
        FlagDefinitionBuilder::new(feature.id().clone(), feature.default_value().clone())
    }

    /// The feature this definition belongs to.
    pub fn feature_id(&self) -> &FeatureId {
        &self.feature
    }

    /// The default yielded when no rule wins.
    pub fn default_value(&self) -> &T {
        &self.default
    }

    /// Bucketing salt. Rotating it uniformly re-buckets the population.
    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// Whether the flag participates in rule evaluation at all.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Definition-wide rollout-bypassing stable ids.
    pub fn rollout_allowlist(&self) -> &BTreeSet<StableId> {
        &self.rollout_allowlist
    }

    /// Rules in canonical order.
    pub fn rules(&self) -> &[FlagRule<T, C>] {
        &self.rules
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`FlagDefinition`]; errors accumulate and surface at
/// [`build`](FlagDefinitionBuilder::build).
pub struct FlagDefinitionBuilder<T, C = EvalContext> {
    feature: FeatureId,
    default: T,
    salt: String,
    active: bool,
    rollout_allowlist: BTreeSet<StableId>,
    rules: Vec<FlagRule<T, C>>,
    error: Option<DefinitionError>,
}

impl<T: FlagValue, C: Context + 'static> FlagDefinitionBuilder<T, C> {
    pub(crate) fn new(feature: FeatureId, default: T) -> Self {
        Self {
            feature,
            default,
            salt: "v1".to_string(),
            active: true,
            rollout_allowlist: BTreeSet::new(),
            rules: Vec::new(),
            error: None,
        }
    }

    /// Override the default value (seeded from the feature declaration).
    pub fn default_value(mut self, default: T) -> Self {
        self.default = default;
        self
    }

    /// Set the bucketing salt (defaults to `"v1"`).
    pub fn salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = salt.into();
        self
    }

    /// Mark the flag active or inactive.
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Let `id` bypass every rule's rollout gate.
    pub fn allow(mut self, id: StableId) -> Self {
        self.rollout_allowlist.insert(id);
        self
    }

    /// Attach a rule yielding a fixed value.
    pub fn rule(self, rule: RuleBuilder<C>, value: T) -> Self {
        self.push_rule(rule, RuleValue::Fixed(value))
    }

    /// Attach a rule yielding a deferred resolver.
    pub fn rule_with(
        self,
        rule: RuleBuilder<C>,
        resolver: impl Fn(&C) -> T + Send + Sync + 'static,
    ) -> Self {
        self.push_rule(rule, RuleValue::Resolver(Arc::new(resolver)))
    }

    fn push_rule(mut self, rule: RuleBuilder<C>, value: RuleValue<T, C>) -> Self {
        let index = self.rules.len();
        match rule.build() {
            Ok(rule) => self.rules.push(FlagRule { rule, value }),
            Err(source) if self.error.is_none() => {
                self.error = Some(DefinitionError::Rule { index, source });
            }
            Err(_) => {}
        }
        self
    }

    /// Finish the definition: reject duplicate rules and install the
    /// canonical rule order.
    pub fn build(self) -> Result<FlagDefinition<T, C>, DefinitionError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let rules = canonical_rules(self.rules)?;
        Ok(FlagDefinition {
            feature: self.feature,
            default: self.default,
            salt: self.salt,
            active: self.active,
            rollout_allowlist: self.rollout_allowlist,
            rules,
        })
    }
}

/// Reject duplicate rules, then sort by
/// `(-total_specificity, note, insertion_index)` (the sort is stable, so
/// insertion order is the final tie-break).
fn canonical_rules<T, C>(
    rules: Vec<FlagRule<T, C>>,
) -> Result<Vec<FlagRule<T, C>>, DefinitionError> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    for (index, flag_rule) in rules.iter().enumerate() {
        let signature = flag_rule.rule.spec().signature();
        if !seen.insert(signature.clone()) {
            return Err(DefinitionError::DuplicateRule { index, signature });
        }
    }
    let mut rules = rules;
    rules.sort_by(|a, b| {
        b.rule
            .specificity()
            .total()
            .cmp(&a.rule.specificity().total())
            .then_with(|| a.rule.note().unwrap_or("").cmp(b.rule.note().unwrap_or("")))
    });
    Ok(rules)
}

// ---------------------------------------------------------------------------
// Parts (codec seam)
// ---------------------------------------------------------------------------

/// Type-neutral decoded form of a flag definition, produced by the codec
/// and converted into a typed definition through the feature catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagParts {
    /// Feature the definition belongs to.
    pub feature: FeatureId,
    /// Default value in dynamic form.
    pub default: TaggedValue,
    /// Bucketing salt.
    pub salt: String,
    /// Whether the flag is active.
    pub active: bool,
    /// Definition-wide allowlist.
    pub rollout_allowlist: BTreeSet<StableId>,
    /// Rules in document order, values in dynamic form.
    pub rules: Vec<(RuleSpec, TaggedValue)>,
}

/// Assemble a typed definition from decoded parts, running the same
/// invariants as the builder path.
pub(crate) fn definition_from_parts<T: FlagValue, C: Context + 'static>(
    parts: FlagParts,
) -> Result<FlagDefinition<T, C>, FlagPartsError> {
    let default = T::from_tagged(&parts.default).map_err(FlagPartsError::DefaultValue)?;
    let mut rules: Vec<FlagRule<T, C>> = Vec::with_capacity(parts.rules.len());
    for (index, (spec, tagged)) in parts.rules.iter().enumerate() {
        let rule =
            Rule::from_spec(spec).map_err(|source| FlagPartsError::Rule { index, source })?;
        let value =
            T::from_tagged(tagged).map_err(|source| FlagPartsError::RuleValue { index, source })?;
        rules.push(FlagRule {
            rule,
            value: RuleValue::Fixed(value),
        });
    }
    let rules = canonical_rules(rules).map_err(FlagPartsError::Definition)?;
    Ok(FlagDefinition {
        feature: parts.feature,
        default,
        salt: parts.salt,
        active: parts.active,
        rollout_allowlist: parts.rollout_allowlist,
        rules,
    })
}

// ---------------------------------------------------------------------------
// Type erasure
// ---------------------------------------------------------------------------

/// A rule in dynamic projection: its spec plus its value, when fixed.
/// Resolver values have no dynamic form and project to `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct DynRule {
    /// Mirror of the rule.
    pub spec: RuleSpec,
    /// Fixed value in dynamic form, absent for resolvers.
    pub value: Option<TaggedValue>,
}

/// Object-safe view of a flag definition, independent of its value and
/// context types. Configurations store these; encoding, diffing, and
/// equality run on this projection.
pub trait DynFlag: Send + Sync + 'static {
    /// Feature the definition belongs to.
    fn feature_id(&self) -> &FeatureId;
    /// Declared value kind.
    fn value_kind(&self) -> ValueKind;
    /// Bucketing salt.
    fn salt(&self) -> &str;
    /// Whether the flag is active.
    fn is_active(&self) -> bool;
    /// Definition-wide allowlist.
    fn rollout_allowlist(&self) -> &BTreeSet<StableId>;
    /// Default value in dynamic form.
    fn default_tagged(&self) -> TaggedValue;
    /// Rules in canonical order, dynamic projection.
    fn dyn_rules(&self) -> Vec<DynRule>;
    /// Equality through the erasure boundary.
    fn eq_flag(&self, other: &dyn DynFlag) -> bool;
    /// Downcast support.
    fn as_any(&self) -> &dyn Any;
}

impl<T: FlagValue, C: Context + 'static> DynFlag for FlagDefinition<T, C> {
    fn feature_id(&self) -> &FeatureId {
        &self.feature
    }

    fn value_kind(&self) -> ValueKind {
        T::kind()
    }

    fn salt(&self) -> &str {
        &self.salt
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn rollout_allowlist(&self) -> &BTreeSet<StableId> {
        &self.rollout_allowlist
    }

    fn default_tagged(&self) -> TaggedValue {
        self.default.to_tagged()
    }

    fn dyn_rules(&self) -> Vec<DynRule> {
        self.rules
            .iter()
            .map(|r| DynRule {
                spec: r.rule.spec(),
                value: r.value.fixed().map(FlagValue::to_tagged),
            })
            .collect()
    }

    fn eq_flag(&self, other: &dyn DynFlag) -> bool {
        other
            .as_any()
            .downcast_ref::<FlagDefinition<T, C>>()
            .is_some_and(|o| o == self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Shared, type-erased flag definition — the unit a [`Configuration`]
/// stores per feature.
///
/// [`Configuration`]: crate::config::Configuration
#[derive(Clone)]
pub struct FlagEntry {
    inner: Arc<dyn DynFlag>,
}

impl FlagEntry {
    /// Erase a typed definition.
    pub fn new<T: FlagValue, C: Context + 'static>(definition: FlagDefinition<T, C>) -> Self {
        Self {
            inner: Arc::new(definition),
        }
    }

    /// Recover the typed definition, if the types match.
    pub fn definition<T: FlagValue, C: Context + 'static>(&self) -> Option<&FlagDefinition<T, C>> {
        self.inner.as_any().downcast_ref()
    }

    /// Feature the definition belongs to.
    pub fn feature_id(&self) -> &FeatureId {
        self.inner.feature_id()
    }

    /// Declared value kind.
    pub fn value_kind(&self) -> ValueKind {
        self.inner.value_kind()
    }

    /// Bucketing salt.
    pub fn salt(&self) -> &str {
        self.inner.salt()
    }

    /// Whether the flag is active.
    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    /// Definition-wide allowlist.
    pub fn rollout_allowlist(&self) -> &BTreeSet<StableId> {
        self.inner.rollout_allowlist()
    }

    /// Default value in dynamic form.
    pub fn default_tagged(&self) -> TaggedValue {
        self.inner.default_tagged()
    }

    /// Rules in canonical order, dynamic projection.
    pub fn dyn_rules(&self) -> Vec<DynRule> {
        self.inner.dyn_rules()
    }
}

impl PartialEq for FlagEntry {
    fn eq(&self, other: &Self) -> bool {
        self.inner.eq_flag(other.inner.as_ref())
    }
}

impl fmt::Debug for FlagEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlagEntry")
            .field("feature", &self.inner.feature_id().canonical())
            .field("kind", &self.inner.value_kind())
            .field("active", &self.inner.is_active())
            .field("rules", &self.inner.dyn_rules().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Feature;

    fn feature(key: &str) -> Feature<bool> {
        Feature::register("flagtest", key, false)
    }

    // -- Builder & canonical order --------------------------------------

    #[test]
    fn builder_defaults() {
        let def = FlagDefinition::builder(&feature("defaults")).build().unwrap();
        assert!(def.is_active());
        assert_eq!(def.salt(), "v1");
        assert!(!def.default_value());
        assert!(def.rules().is_empty());
    }

    #[test]
    fn rules_sort_by_specificity_descending() {
        let def = FlagDefinition::builder(&feature("ordering"))
            .rule(Rule::builder(), true) // specificity 0
            .rule(Rule::builder().platforms(["IOS"]).locales(["en-US"]), true) // 2
            .rule(Rule::builder().platforms(["IOS"]), true) // 1
            .build()
            .unwrap();
        let totals: Vec<u32> = def
            .rules()
            .iter()
            .map(|r| r.rule().specificity().total())
            .collect();
        assert_eq!(totals, [2, 1, 0]);
    }

    #[test]
    fn specificity_ties_break_on_note() {
        let def = FlagDefinition::builder(&feature("note_ties"))
            .rule(Rule::builder().platforms(["IOS"]).note("zeta"), true)
            .rule(Rule::builder().platforms(["ANDROID"]).note("alpha"), true)
            .build()
            .unwrap();
        let notes: Vec<&str> = def
            .rules()
            .iter()
            .map(|r| r.rule().note().unwrap())
            .collect();
        assert_eq!(notes, ["alpha", "zeta"]);
    }

    #[test]
    fn missing_note_sorts_as_empty() {
        let def = FlagDefinition::builder(&feature("empty_note"))
            .rule(Rule::builder().platforms(["IOS"]).note("alpha"), true)
            .rule(Rule::builder().platforms(["ANDROID"]), true)
            .build()
            .unwrap();
        assert!(def.rules()[0].rule().note().is_none());
        assert_eq!(def.rules()[1].rule().note(), Some("alpha"));
    }

    #[test]
    fn duplicate_rules_are_rejected() {
        let err = FlagDefinition::builder(&feature("duplicate"))
            .rule(Rule::builder().platforms(["IOS"]).ramp_up(10.0), true)
            .rule(Rule::builder().platforms(["IOS"]).ramp_up(10.0), false)
            .build()
            .unwrap_err();
        assert!(matches!(err, DefinitionError::DuplicateRule { index: 1, .. }));
    }

    #[test]
    fn same_criteria_different_rollout_is_not_duplicate() {
        let def = FlagDefinition::builder(&feature("rollouts"))
            .rule(Rule::builder().platforms(["IOS"]).ramp_up(10.0), true)
            .rule(Rule::builder().platforms(["IOS"]).ramp_up(50.0), true)
            .build();
        assert!(def.is_ok());
    }

    #[test]
    fn rule_errors_carry_their_index() {
        let err = FlagDefinition::builder(&feature("bad_rule"))
            .rule(Rule::builder().platforms(["IOS"]), true)
            .rule(Rule::builder().ramp_up(250.0), true)
            .build()
            .unwrap_err();
        assert!(matches!(err, DefinitionError::Rule { index: 1, .. }));
    }

    // -- Parts round-trip ------------------------------------------------

    #[test]
    fn parts_round_trip() {
        let def = FlagDefinition::builder(&feature("parts"))
            .salt("v2")
            .rule(Rule::builder().platforms(["IOS"]).ramp_up(25.0).note("n"), true)
            .build()
            .unwrap();
        let parts = FlagParts {
            feature: def.feature_id().clone(),
            default: def.default_tagged(),
            salt: def.salt().to_string(),
            active: def.is_active(),
            rollout_allowlist: def.rollout_allowlist().clone(),
            rules: def
                .dyn_rules()
                .into_iter()
                .map(|r| (r.spec, r.value.unwrap()))
                .collect(),
        };
        let rebuilt: FlagDefinition<bool> = definition_from_parts(parts).unwrap();
        assert_eq!(rebuilt, def);
    }

    #[test]
    fn parts_reject_wrong_kind() {
        let parts = FlagParts {
            feature: FeatureId::new("flagtest", "wrong_kind").unwrap(),
            default: TaggedValue::Int { value: 1 },
            salt: "v1".into(),
            active: true,
            rollout_allowlist: BTreeSet::new(),
            rules: Vec::new(),
        };
        let err = definition_from_parts::<bool, EvalContext>(parts).unwrap_err();
        assert!(matches!(err, FlagPartsError::DefaultValue(_)));
    }

    // -- Erasure ----------------------------------------------------------

    #[test]
    fn entry_recovers_typed_definition() {
        let def = FlagDefinition::builder(&feature("erase"))
            .rule(Rule::builder().platforms(["IOS"]), true)
            .build()
            .unwrap();
        let entry = FlagEntry::new(def.clone());
        assert_eq!(entry.definition::<bool, EvalContext>(), Some(&def));
        assert!(entry.definition::<String, EvalContext>().is_none());
        assert_eq!(entry.value_kind(), ValueKind::Boolean);
    }

    #[test]
    fn entry_equality_goes_through_erasure() {
        let make = |ramp: f64| {
            FlagEntry::new(
                FlagDefinition::builder(&feature("eq"))
                    .rule(Rule::builder().platforms(["IOS"]).ramp_up(ramp), true)
                    .build()
                    .unwrap(),
            )
        };
        assert_eq!(make(10.0), make(10.0));
        assert_ne!(make(10.0), make(20.0));
    }

    #[test]
    fn resolver_rules_project_without_value() {
        let def = FlagDefinition::builder(&feature("resolver"))
            .rule_with(Rule::builder().platforms(["IOS"]), |_ctx| true)
            .build()
            .unwrap();
        let rules = def.dyn_rules();
        assert_eq!(rules.len(), 1);
        assert!(rules[0].value.is_none());
    }

    #[test]
    fn resolver_values_resolve_against_context() {
        let value: RuleValue<i64, EvalContext> = RuleValue::Resolver(Arc::new(|_| 7));
        assert_eq!(value.resolve(&EvalContext::new()), 7);
        assert!(value.fixed().is_none());
    }
}
