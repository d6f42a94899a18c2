// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evaluation results: the value plus the decision that produced it.

use crate::bucket::BucketInfo;
use crate::rule::RuleExplanation;
use crate::targeting::Specificity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether an evaluation served live traffic or ran as a shadow
/// comparison; telemetry segregates volumes on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// Live evaluation.
    Normal,
    /// Comparison evaluation against a candidate configuration.
    Shadow,
}

/// A matched (or skipped) rule as reported in decisions.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    /// Why the rule applied: criteria summary, specificity, extensions.
    pub explanation: RuleExplanation,
    /// How the rollout gate was decided; absent for synthetic matches
    /// (overrides).
    pub bucket: Option<BucketInfo>,
}

impl RuleMatch {
    /// Synthetic match reported when an override pre-empts evaluation.
    pub fn override_marker() -> Self {
        Self {
            explanation: RuleExplanation {
                summary: "override".to_string(),
                specificity: Specificity::ZERO,
                extensions: Vec::new(),
                note: Some("override".to_string()),
            },
            bucket: None,
        }
    }
}

/// Why an evaluation produced its value.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The namespace kill-switch forced the default.
    RegistryDisabled,
    /// The flag itself is inactive.
    Inactive,
    /// A rule (or an override) supplied the value.
    Rule {
        /// The winning rule.
        matched: RuleMatch,
        /// The first rule that matched but was held back by its rollout
        /// gate — by canonical order, the most specific such rule.
        skipped_by_rollout: Option<RuleMatch>,
    },
    /// No rule produced a value; the definition default applied.
    Default {
        /// The first matched-but-skipped rule, as above.
        skipped_by_rollout: Option<RuleMatch>,
    },
}

impl Decision {
    /// Construct an override decision (synthetic rule match).
    pub fn overridden() -> Self {
        Self::Rule {
            matched: RuleMatch::override_marker(),
            skipped_by_rollout: None,
        }
    }

    /// The variant, for telemetry and comparisons.
    pub fn kind(&self) -> DecisionKind {
        match self {
            Self::RegistryDisabled => DecisionKind::RegistryDisabled,
            Self::Inactive => DecisionKind::Inactive,
            Self::Rule { .. } => DecisionKind::Rule,
            Self::Default { .. } => DecisionKind::Default,
        }
    }
}

/// Discriminant of a [`Decision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Kill-switch default.
    RegistryDisabled,
    /// Inactive-flag default.
    Inactive,
    /// Rule-supplied value.
    Rule,
    /// Fell through to the default.
    Default,
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RegistryDisabled => "registry_disabled",
            Self::Inactive => "inactive",
            Self::Rule => "rule",
            Self::Default => "default",
        };
        f.write_str(s)
    }
}

/// The outcome of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult<T> {
    /// Namespace the evaluation ran against.
    pub namespace_id: String,
    /// Canonical feature id.
    pub feature_key: String,
    /// `metadata.version` of the snapshot consulted, if labeled.
    pub config_version: Option<String>,
    /// Live or shadow.
    pub mode: EvaluationMode,
    /// Wall-clock duration of the evaluation.
    pub duration_ns: u64,
    /// The value served.
    pub value: T,
    /// Why that value was served.
    pub decision: Decision,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_kinds() {
        assert_eq!(Decision::RegistryDisabled.kind(), DecisionKind::RegistryDisabled);
        assert_eq!(Decision::Inactive.kind(), DecisionKind::Inactive);
        assert_eq!(
            Decision::Default { skipped_by_rollout: None }.kind(),
            DecisionKind::Default
        );
        assert_eq!(Decision::overridden().kind(), DecisionKind::Rule);
    }

    #[test]
    fn override_marker_shape() {
        let m = RuleMatch::override_marker();
        assert_eq!(m.explanation.summary, "override");
        assert_eq!(m.explanation.specificity.total(), 0);
        assert!(m.bucket.is_none());
    }

    #[test]
    fn mode_serde_tags() {
        assert_eq!(serde_json::to_string(&EvaluationMode::Shadow).unwrap(), r#""shadow""#);
        assert_eq!(
            serde_json::to_string(&DecisionKind::RegistryDisabled).unwrap(),
            r#""registry_disabled""#
        );
    }

    #[test]
    fn decision_kind_display() {
        assert_eq!(DecisionKind::Rule.to_string(), "rule");
        assert_eq!(DecisionKind::RegistryDisabled.to_string(), "registry_disabled");
    }
}
