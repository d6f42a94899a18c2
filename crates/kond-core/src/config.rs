// SPDX-License-Identifier: MIT OR Apache-2.0
//! Immutable configuration snapshots, patches, and diffs.

use crate::context::Context;
use crate::feature::Feature;
use crate::flag::{FlagDefinition, FlagEntry};
use crate::id::FeatureId;
use crate::value::FlagValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Provenance attached to a configuration snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Human-assigned version label.
    pub version: Option<String>,
    /// Generation timestamp, milliseconds since the Unix epoch.
    pub generated_at_epoch_millis: Option<i64>,
    /// Producing system, e.g. `"admin-ui"`.
    pub source: Option<String>,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// An immutable snapshot of every flag definition in a namespace.
///
/// Configurations are values: produced by code (builder), by the codec,
/// or derived from another configuration (`with_changes`, patches), and
/// installed atomically into a namespace. They are never mutated in place.
#[derive(Clone, Default, PartialEq)]
pub struct Configuration {
    flags: BTreeMap<FeatureId, FlagEntry>,
    metadata: ConfigMetadata,
}

impl Configuration {
    /// An empty snapshot with empty metadata.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Start building a snapshot.
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    /// Snapshot metadata.
    pub fn metadata(&self) -> &ConfigMetadata {
        &self.metadata
    }

    /// Look up the erased definition for a feature id.
    pub fn get(&self, id: &FeatureId) -> Option<&FlagEntry> {
        self.flags.get(id)
    }

    /// Look up the typed definition for a declared feature.
    pub fn definition<T: FlagValue, C: Context + 'static>(
        &self,
        feature: &Feature<T, C>,
    ) -> Option<&FlagDefinition<T, C>> {
        self.flags.get(feature.id()).and_then(FlagEntry::definition)
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Whether the snapshot holds no definitions.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Iterate definitions in feature-id order.
    pub fn iter(&self) -> impl Iterator<Item = (&FeatureId, &FlagEntry)> {
        self.flags.iter()
    }

    /// Ids of every defined feature, in order.
    pub fn feature_ids(&self) -> impl Iterator<Item = &FeatureId> {
        self.flags.keys()
    }

    /// Compare two snapshots feature-by-feature.
    pub fn diff(&self, other: &Configuration) -> ConfigDiff {
        let mut diff = ConfigDiff::default();
        for (id, entry) in &self.flags {
            match other.flags.get(id) {
                None => diff.removed.push(id.clone()),
                Some(theirs) if theirs != entry => diff.changed.push(id.clone()),
                Some(_) => {}
            }
        }
        for id in other.flags.keys() {
            if !self.flags.contains_key(id) {
                diff.added.push(id.clone());
            }
        }
        diff
    }

    /// Derive a snapshot with upserts and removals applied.
    ///
    /// Removals of absent features are no-ops. Metadata is preserved
    /// unless `metadata` replaces it.
    pub fn with_changes(
        &self,
        add_or_replace: Vec<FlagEntry>,
        remove: &BTreeSet<FeatureId>,
        metadata: Option<ConfigMetadata>,
    ) -> Configuration {
        let mut flags = self.flags.clone();
        for id in remove {
            flags.remove(id);
        }
        for entry in add_or_replace {
            flags.insert(entry.feature_id().clone(), entry);
        }
        Configuration {
            flags,
            metadata: metadata.unwrap_or_else(|| self.metadata.clone()),
        }
    }

    /// Derive a snapshot with exactly one definition replaced (or added).
    pub fn with_updated(&self, entry: FlagEntry) -> Configuration {
        let mut flags = self.flags.clone();
        flags.insert(entry.feature_id().clone(), entry);
        Configuration {
            flags,
            metadata: self.metadata.clone(),
        }
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("features", &self.flags.len())
            .field("metadata", &self.metadata)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`Configuration`]. Inserting a definition for a feature
/// that already has one replaces it (last wins).
#[derive(Default)]
pub struct ConfigurationBuilder {
    flags: BTreeMap<FeatureId, FlagEntry>,
    metadata: ConfigMetadata,
}

impl ConfigurationBuilder {
    /// Add a typed definition.
    pub fn flag<T: FlagValue, C: Context + 'static>(
        self,
        definition: FlagDefinition<T, C>,
    ) -> Self {
        self.entry(FlagEntry::new(definition))
    }

    /// Add an erased definition.
    pub fn entry(mut self, entry: FlagEntry) -> Self {
        self.flags.insert(entry.feature_id().clone(), entry);
        self
    }

    /// Replace the whole metadata block.
    pub fn metadata(mut self, metadata: ConfigMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the metadata version label.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.metadata.version = Some(version.into());
        self
    }

    /// Set the metadata source label.
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.metadata.source = Some(source.into());
        self
    }

    /// Set the generation timestamp.
    pub fn generated_at(mut self, epoch_millis: i64) -> Self {
        self.metadata.generated_at_epoch_millis = Some(epoch_millis);
        self
    }

    /// Finish the snapshot.
    pub fn build(self) -> Configuration {
        Configuration {
            flags: self.flags,
            metadata: self.metadata,
        }
    }
}

// ---------------------------------------------------------------------------
// Diff & patch
// ---------------------------------------------------------------------------

/// Feature-level difference between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDiff {
    /// Features present only in the other snapshot.
    pub added: Vec<FeatureId>,
    /// Features present only in this snapshot.
    pub removed: Vec<FeatureId>,
    /// Features present in both with different definitions.
    pub changed: Vec<FeatureId>,
}

impl ConfigDiff {
    /// Whether the two snapshots were identical.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

impl fmt::Display for ConfigDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "+{} -{} ~{}",
            self.added.len(),
            self.removed.len(),
            self.changed.len()
        )
    }
}

/// An incremental update: upserts plus removals, optionally replacing the
/// snapshot metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigurationPatch {
    /// Definitions to insert or replace.
    pub add_or_replace: Vec<FlagEntry>,
    /// Features to remove; absent features are ignored.
    pub remove: BTreeSet<FeatureId>,
    /// Replacement metadata, if the patch carries any.
    pub metadata: Option<ConfigMetadata>,
}

impl ConfigurationPatch {
    /// Apply to a snapshot, producing a new one.
    pub fn apply_to(&self, config: &Configuration) -> Configuration {
        config.with_changes(
            self.add_or_replace.clone(),
            &self.remove,
            self.metadata.clone(),
        )
    }

    /// Ids of removals that would be no-ops against `config`.
    pub fn dangling_removals(&self, config: &Configuration) -> Vec<FeatureId> {
        self.remove
            .iter()
            .filter(|id| config.get(id).is_none())
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
