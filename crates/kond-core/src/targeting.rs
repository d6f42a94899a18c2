// SPDX-License-Identifier: MIT OR Apache-2.0
//! Targeting criteria, AND-composition, and specificity.
//!
//! A criterion either matches a context or it does not; a rule matches when
//! all of its criteria do. Criteria carry *specificity* — the weight that
//! orders rules within a flag definition. Closures (extension predicates,
//! guard evidence) are paired with stable names so that criteria stay
//! comparable, explainable, and duplicate-detectable without being
//! serializable.

use crate::axis::{self, AxisValue};
use crate::context::Context;
use crate::version::VersionRange;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Specificity
// ---------------------------------------------------------------------------

/// Additive weight of a rule's criteria; higher wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct Specificity {
    /// Count of non-extension criteria (version only when bounded).
    pub base: u32,
    /// Summed weight of extension criteria.
    pub extension: u32,
}

impl Specificity {
    /// Zero weight.
    pub const ZERO: Specificity = Specificity { base: 0, extension: 0 };

    fn base(n: u32) -> Self {
        Self { base: n, extension: 0 }
    }

    fn extension(weight: u32) -> Self {
        Self { base: 0, extension: weight }
    }

    fn plus(self, other: Self) -> Self {
        Self {
            base: self.base + other.base,
            extension: self.extension + other.extension,
        }
    }

    /// Combined weight used for ordering.
    pub fn total(&self) -> u32 {
        self.base + self.extension
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Build-time rejection of an invalid criterion combination.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetingError {
    /// A set-valued criterion was given an empty set.
    #[error("{what} criterion requires a non-empty set")]
    EmptySet {
        /// Which criterion was rejected.
        what: &'static str,
    },

    /// A raw axis constraint names an axis missing from the registry.
    #[error("axis '{axis_id}' is not registered")]
    UnregisteredAxis {
        /// The unknown axis id.
        axis_id: String,
    },

    /// Two criteria of the same category were attached to one rule.
    #[error("a rule may carry at most one {what} criterion")]
    DuplicateCriterion {
        /// Colliding category (e.g. `"locales"`, `"axis 'environment'"`).
        what: String,
    },

    /// A spec-only criterion (extension/guard) cannot be rebuilt from the
    /// wire — predicates have no serialized form.
    #[error("criterion '{name}' has no serialized form and cannot be reconstituted")]
    NotReconstructible {
        /// Name of the criterion.
        name: String,
    },
}

// ---------------------------------------------------------------------------
// Extension & Guard
// ---------------------------------------------------------------------------

/// A host-supplied named predicate over the context type.
pub struct Extension<C> {
    name: String,
    weight: u32,
    predicate: Arc<dyn Fn(&C) -> bool + Send + Sync>,
}

impl<C> Extension<C> {
    /// Wrap a predicate under a stable name with weight 1.
    ///
    /// The name identifies the predicate in explanations and duplicate
    /// detection; two extensions with the same name inside one rule are
    /// rejected at build time.
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&C) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            weight: 1,
            predicate: Arc::new(predicate),
        }
    }

    /// Override the specificity weight.
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Stable predicate name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Specificity weight.
    pub fn weight(&self) -> u32 {
        self.weight
    }
}

impl<C> Clone for Extension<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            weight: self.weight,
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<C> fmt::Debug for Extension<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .finish_non_exhaustive()
    }
}

/// A criterion over a capability-restricted context `R`, lifted to `C`
/// through an evidence projection `C -> Option<R>`.
///
/// If the evidence fails, the guard does not match. Specificity is
/// inherited from the inner criterion.
pub struct Guard<C> {
    name: String,
    specificity: Specificity,
    inner_spec: Box<CriterionSpec>,
    matcher: Arc<dyn Fn(&C) -> bool + Send + Sync>,
}

impl<C> Guard<C> {
    /// Lift `inner` over `evidence`.
    pub fn new<R, E>(name: impl Into<String>, evidence: E, inner: Criterion<R>) -> Self
    where
        R: Context + 'static,
        E: Fn(&C) -> Option<R> + Send + Sync + 'static,
    {
        let specificity = inner.specificity();
        let inner_spec = Box::new(inner.spec());
        let matcher =
            Arc::new(move |ctx: &C| evidence(ctx).is_some_and(|witness| inner.matches(&witness)));
        Self {
            name: name.into(),
            specificity,
            inner_spec,
            matcher,
        }
    }

    /// Stable guard name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<C> Clone for Guard<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            specificity: self.specificity,
            inner_spec: self.inner_spec.clone(),
            matcher: Arc::clone(&self.matcher),
        }
    }
}

impl<C> fmt::Debug for Guard<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("name", &self.name)
            .field("inner", &self.inner_spec)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Criterion
// ---------------------------------------------------------------------------

/// One targeting condition. Rules AND these together.
pub enum Criterion<C> {
    /// Context locale must be in the set.
    Locales(BTreeSet<String>),
    /// Context platform must be in the set.
    Platforms(BTreeSet<String>),
    /// Context version must lie in the range.
    Version(VersionRange),
    /// At least one of the context's values for the axis must be in the set.
    Axis {
        /// Registered axis id.
        axis_id: String,
        /// Accepted value ids.
        values: BTreeSet<String>,
    },
    /// Host-supplied predicate.
    Extension(Extension<C>),
    /// Criterion over a restricted context, lifted through evidence.
    Guarded(Guard<C>),
    /// AND of children; the empty list matches everything.
    All(Vec<Criterion<C>>),
}

impl<C> Criterion<C> {
    /// Locale constraint; rejects an empty set.
    pub fn locales<I, S>(ids: I) -> Result<Self, TargetingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        non_empty_set("locales", ids).map(Self::Locales)
    }

    /// Platform constraint; rejects an empty set.
    pub fn platforms<I, S>(ids: I) -> Result<Self, TargetingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        non_empty_set("platforms", ids).map(Self::Platforms)
    }

    /// Version-range constraint.
    pub fn version(range: VersionRange) -> Self {
        Self::Version(range)
    }

    /// Typed axis constraint. Registers the axis if it is not yet
    /// registered (idempotent), so a typed constraint can never reference
    /// an unknown axis.
    pub fn axis<A, I>(values: I) -> Result<Self, TargetingError>
    where
        A: AxisValue,
        I: IntoIterator<Item = A>,
    {
        axis::register_axis::<A>();
        let values: BTreeSet<String> = values.into_iter().map(|v| v.id().to_string()).collect();
        if values.is_empty() {
            return Err(TargetingError::EmptySet { what: "axis" });
        }
        Ok(Self::Axis {
            axis_id: A::axis_id().to_string(),
            values,
        })
    }

    /// Raw axis constraint; the axis id must already be registered.
    pub fn axis_values<I, S>(axis_id: impl Into<String>, values: I) -> Result<Self, TargetingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let axis_id = axis_id.into();
        if !axis::is_axis_registered(&axis_id) {
            return Err(TargetingError::UnregisteredAxis { axis_id });
        }
        let values = non_empty_set("axis", values)?;
        Ok(Self::Axis { axis_id, values })
    }

    /// Wrap an extension predicate.
    pub fn extension(extension: Extension<C>) -> Self {
        Self::Extension(extension)
    }

    /// Wrap a guard.
    pub fn guarded(guard: Guard<C>) -> Self {
        Self::Guarded(guard)
    }

    /// AND-composition; `all([])` matches everything.
    pub fn all(children: Vec<Criterion<C>>) -> Self {
        Self::All(children)
    }

    /// Specificity contributed by this criterion.
    pub fn specificity(&self) -> Specificity {
        match self {
            Self::Locales(_) | Self::Platforms(_) | Self::Axis { .. } => Specificity::base(1),
            Self::Version(range) => Specificity::base(u32::from(range.has_bounds())),
            Self::Extension(ext) => Specificity::extension(ext.weight),
            Self::Guarded(guard) => guard.specificity,
            Self::All(children) => children
                .iter()
                .fold(Specificity::ZERO, |acc, c| acc.plus(c.specificity())),
        }
    }

    /// Closure-free mirror for signatures, summaries, and encoding.
    pub fn spec(&self) -> CriterionSpec {
        match self {
            Self::Locales(set) => CriterionSpec::Locales(set.clone()),
            Self::Platforms(set) => CriterionSpec::Platforms(set.clone()),
            Self::Version(range) => CriterionSpec::Version(*range),
            Self::Axis { axis_id, values } => CriterionSpec::Axis {
                axis_id: axis_id.clone(),
                values: values.clone(),
            },
            Self::Extension(ext) => CriterionSpec::Extension {
                name: ext.name.clone(),
                weight: ext.weight,
            },
            Self::Guarded(guard) => CriterionSpec::Guarded {
                name: guard.name.clone(),
                inner: guard.inner_spec.clone(),
            },
            Self::All(children) => CriterionSpec::All(children.iter().map(Criterion::spec).collect()),
        }
    }

    /// Rebuild a criterion from its wire-expressible mirror.
    ///
    /// Extension and guard specs are rejected: their predicates have no
    /// serialized form.
    pub fn from_spec(spec: &CriterionSpec) -> Result<Self, TargetingError> {
        match spec {
            CriterionSpec::Locales(set) => {
                if set.is_empty() {
                    return Err(TargetingError::EmptySet { what: "locales" });
                }
                Ok(Self::Locales(set.clone()))
            }
            CriterionSpec::Platforms(set) => {
                if set.is_empty() {
                    return Err(TargetingError::EmptySet { what: "platforms" });
                }
                Ok(Self::Platforms(set.clone()))
            }
            CriterionSpec::Version(range) => Ok(Self::Version(*range)),
            CriterionSpec::Axis { axis_id, values } => {
                Self::axis_values(axis_id.clone(), values.iter().cloned())
            }
            CriterionSpec::Extension { name, .. } | CriterionSpec::Guarded { name, .. } => {
                Err(TargetingError::NotReconstructible { name: name.clone() })
            }
            CriterionSpec::All(children) => Ok(Self::All(
                children.iter().map(Self::from_spec).collect::<Result<_, _>>()?,
            )),
        }
    }
}

impl<C: Context> Criterion<C> {
    /// Whether this criterion matches the context.
    ///
    /// A criterion that needs a capability the context does not expose
    /// does not match.
    pub fn matches(&self, ctx: &C) -> bool {
        match self {
            Self::Locales(set) => ctx.locale().is_some_and(|l| set.contains(l)),
            Self::Platforms(set) => ctx.platform().is_some_and(|p| set.contains(p)),
            Self::Version(range) => ctx.version().is_some_and(|v| range.contains(v)),
            Self::Axis { axis_id, values } => ctx
                .axis_values(axis_id)
                .iter()
                .any(|v| values.contains(v.as_str())),
            Self::Extension(ext) => (ext.predicate)(ctx),
            Self::Guarded(guard) => (guard.matcher)(ctx),
            Self::All(children) => children.iter().all(|c| c.matches(ctx)),
        }
    }
}

impl<C> Clone for Criterion<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Locales(set) => Self::Locales(set.clone()),
            Self::Platforms(set) => Self::Platforms(set.clone()),
            Self::Version(range) => Self::Version(*range),
            Self::Axis { axis_id, values } => Self::Axis {
                axis_id: axis_id.clone(),
                values: values.clone(),
            },
            Self::Extension(ext) => Self::Extension(ext.clone()),
            Self::Guarded(guard) => Self::Guarded(guard.clone()),
            Self::All(children) => Self::All(children.clone()),
        }
    }
}

impl<C> fmt::Debug for Criterion<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.spec(), f)
    }
}

impl<C> PartialEq for Criterion<C> {
    fn eq(&self, other: &Self) -> bool {
        self.spec() == other.spec()
    }
}

fn non_empty_set<I, S>(what: &'static str, items: I) -> Result<BTreeSet<String>, TargetingError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let set: BTreeSet<String> = items.into_iter().map(Into::into).collect();
    if set.is_empty() {
        return Err(TargetingError::EmptySet { what });
    }
    Ok(set)
}

// ---------------------------------------------------------------------------
// CriterionSpec
// ---------------------------------------------------------------------------

/// Closure-free mirror of a [`Criterion`].
///
/// This is the comparable, explainable, encodable projection: duplicate
/// detection, rule explanations, configuration equality, and the JSON
/// codec all run on specs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CriterionSpec {
    /// Locale set constraint.
    Locales(BTreeSet<String>),
    /// Platform set constraint.
    Platforms(BTreeSet<String>),
    /// Version range constraint.
    Version(VersionRange),
    /// Axis value constraint.
    Axis {
        /// Registered axis id.
        axis_id: String,
        /// Accepted value ids.
        values: BTreeSet<String>,
    },
    /// Named host predicate (not serializable).
    Extension {
        /// Stable predicate name.
        name: String,
        /// Specificity weight.
        weight: u32,
    },
    /// Named guard over an inner criterion (not serializable).
    Guarded {
        /// Stable guard name.
        name: String,
        /// Mirror of the guarded criterion.
        inner: Box<CriterionSpec>,
    },
    /// AND of children.
    All(Vec<CriterionSpec>),
}

impl CriterionSpec {
    /// Specificity contributed by this spec (mirrors [`Criterion`]).
    pub fn specificity(&self) -> Specificity {
        match self {
            Self::Locales(_) | Self::Platforms(_) | Self::Axis { .. } => Specificity::base(1),
            Self::Version(range) => Specificity::base(u32::from(range.has_bounds())),
            Self::Extension { weight, .. } => Specificity::extension(*weight),
            Self::Guarded { inner, .. } => inner.specificity(),
            Self::All(children) => children
                .iter()
                .fold(Specificity::ZERO, |acc, c| acc.plus(c.specificity())),
        }
    }

    /// Canonical signature used for duplicate detection and ordering.
    pub fn signature(&self) -> String {
        match self {
            Self::Locales(set) => format!("locales{{{}}}", join(set)),
            Self::Platforms(set) => format!("platforms{{{}}}", join(set)),
            Self::Version(range) => format!("version{{{range}}}"),
            Self::Axis { axis_id, values } => format!("axis{{{axis_id}:{}}}", join(values)),
            Self::Extension { name, weight } => format!("ext{{{name}#{weight}}}"),
            Self::Guarded { name, inner } => format!("guard{{{name}:{}}}", inner.signature()),
            Self::All(children) => {
                let inner: Vec<String> = children.iter().map(CriterionSpec::signature).collect();
                format!("all({})", inner.join(";"))
            }
        }
    }

    /// Human-readable summary used in rule explanations.
    pub fn summary(&self) -> String {
        match self {
            Self::Locales(set) => format!("locale in [{}]", join(set)),
            Self::Platforms(set) => format!("platform in [{}]", join(set)),
            Self::Version(range) => format!("version {range}"),
            Self::Axis { axis_id, values } => format!("{axis_id} in [{}]", join(values)),
            Self::Extension { name, .. } => format!("extension {name}"),
            Self::Guarded { name, inner } => format!("guard {name}({})", inner.summary()),
            Self::All(children) => {
                let inner: Vec<String> = children.iter().map(CriterionSpec::summary).collect();
                inner.join(" AND ")
            }
        }
    }

    /// Collect extension predicate names (including guarded ones).
    pub fn extension_names(&self, out: &mut Vec<String>) {
        match self {
            Self::Extension { name, .. } => out.push(name.clone()),
            Self::Guarded { inner, .. } => inner.extension_names(out),
            Self::All(children) => {
                for child in children {
                    child.extension_names(out);
                }
            }
            _ => {}
        }
    }

    /// Category key for canonical in-rule ordering and uniqueness.
    fn category(&self) -> (u8, String) {
        match self {
            Self::Locales(_) => (0, String::new()),
            Self::Platforms(_) => (1, String::new()),
            Self::Version(_) => (2, String::new()),
            Self::Axis { axis_id, .. } => (3, axis_id.clone()),
            Self::Extension { name, .. } => (4, name.clone()),
            Self::Guarded { name, .. } => (5, name.clone()),
            // Flattened away before ordering; sorts last defensively.
            Self::All(_) => (6, String::new()),
        }
    }

    /// Category label for error messages.
    fn category_label(&self) -> String {
        match self {
            Self::Locales(_) => "locales".to_string(),
            Self::Platforms(_) => "platforms".to_string(),
            Self::Version(_) => "version".to_string(),
            Self::Axis { axis_id, .. } => format!("axis '{axis_id}'"),
            Self::Extension { name, .. } => format!("extension '{name}'"),
            Self::Guarded { name, .. } => format!("guard '{name}'"),
            Self::All(_) => "all".to_string(),
        }
    }
}

fn join(set: &BTreeSet<String>) -> String {
    set.iter().cloned().collect::<Vec<_>>().join(",")
}

/// Canonicalize a rule's criteria: flatten `All` nodes, enforce at most
/// one criterion per category, and sort into the fixed category order.
///
/// Both code-built and decoded rules pass through here, so a rule's
/// criteria order never depends on construction order.
pub(crate) fn canonicalize_criteria<C>(
    criteria: Vec<Criterion<C>>,
) -> Result<Vec<Criterion<C>>, TargetingError> {
    let mut flat: Vec<Criterion<C>> = Vec::with_capacity(criteria.len());
    flatten_into(criteria, &mut flat);

    let mut seen: BTreeSet<(u8, String)> = BTreeSet::new();
    for criterion in &flat {
        let spec = criterion.spec();
        if !seen.insert(spec.category()) {
            return Err(TargetingError::DuplicateCriterion {
                what: spec.category_label(),
            });
        }
    }

    flat.sort_by_key(|c| c.spec().category());
    Ok(flat)
}

fn flatten_into<C>(criteria: Vec<Criterion<C>>, out: &mut Vec<Criterion<C>>) {
    for criterion in criteria {
        match criterion {
            Criterion::All(children) => flatten_into(children, out),
            other => out.push(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
