// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed errors of the codec boundary.
//!
//! Every branch of decoding maps to one of these; no exception-like value
//! crosses the boundary, and the live snapshot is never touched by a
//! failed decode.

/// A rejected snapshot or patch document.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    /// The document is not well-formed JSON.
    #[error("malformed JSON at {path}: {message}")]
    Syntax {
        /// JSON path of the failure (`$` for the document itself).
        path: String,
        /// Parser message.
        message: String,
    },

    /// The document references a feature the namespace schema does not
    /// know.
    #[error("unknown feature '{feature_id}'")]
    UnknownFeature {
        /// Canonical feature id from the document.
        feature_id: String,
    },

    /// A value's tag does not match the feature's declared kind.
    #[error("feature '{feature}': expected a {expected} value, found {found}")]
    TypeMismatch {
        /// Canonical feature id.
        feature: String,
        /// Declared kind tag.
        expected: String,
        /// Tag found on the wire.
        found: String,
    },

    /// A tag is outside its enumeration (value kind, version-range type,
    /// enum constant, class name).
    #[error("unknown tag '{tag}' for {field}")]
    UnknownVariant {
        /// JSON path of the offending field.
        field: String,
        /// The rejected tag.
        tag: String,
    },

    /// A scalar failed validation (bad hex, out-of-range ramp-up,
    /// duplicate set entry, missing required field, …).
    #[error("invalid value for {field}: {reason}")]
    InvalidScalar {
        /// JSON path of the offending field.
        field: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Two rules in one flag share a canonical identity.
    #[error("feature '{feature}' has a duplicate rule at index {index}")]
    DuplicateRule {
        /// Canonical feature id.
        feature: String,
        /// Document-order index of the second occurrence.
        index: usize,
    },

    /// A rule constrains an axis missing from the process axis registry.
    #[error("axis '{axis_id}' is not registered")]
    UnknownAxis {
        /// The unknown axis id.
        axis_id: String,
    },
}

/// A configuration that cannot be expressed on the wire.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    /// A rule carries a construct with no serialized form.
    #[error("feature '{feature}' rule {index} uses a non-serializable {what}")]
    Unsupported {
        /// Canonical feature id.
        feature: String,
        /// Rule index in canonical order.
        index: usize,
        /// What could not be serialized (`"extension criterion"`,
        /// `"guard criterion"`, or `"resolver value"`).
        what: &'static str,
    },

    /// The JSON writer failed (unreachable for well-formed values).
    #[error("JSON serialization failed: {message}")]
    Json {
        /// Writer message.
        message: String,
    },
}
