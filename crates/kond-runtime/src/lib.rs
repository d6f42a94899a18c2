// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! kond-runtime
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Request path: `context → namespace.current() → definition → engine →
//! EvaluationResult → hooks → value`. Update path: `JSON → codec →
//! Configuration → namespace.load (atomic swap, history push) → hooks`.

/// The evaluation engine.
pub mod engine;
/// The namespace registry.
pub mod namespace;
/// Shadow evaluation.
pub mod shadow;

pub use engine::FeatureExt;
pub use namespace::Namespace;
pub use shadow::{evaluate_with_shadow, MismatchKind, ShadowMismatch, ShadowOptions};
