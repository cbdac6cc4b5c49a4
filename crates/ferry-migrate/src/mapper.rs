//! Source-to-destination identifier tables.
//!
//! Nothing here is persisted. Each run rebuilds the milestone table from the
//! destination's current milestones (matched by title) and grows the issue
//! table as issues are created.

use std::collections::BTreeMap;

use crate::client::{LabelResponse, MilestoneResponse};
use crate::error::{MigrationError, Result};
use crate::types::CommentMapping;

/// A write-once map from source identifiers to destination identifiers.
#[derive(Debug, Clone)]
pub struct IdMap {
    kind: &'static str,
    entries: BTreeMap<u64, u64>,
}

impl IdMap {
    /// Create an empty map. `kind` names the entity in conflict errors.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    /// Look up the destination identifier for `source`.
    pub fn resolve(&self, source: u64) -> Option<u64> {
        self.entries.get(&source).copied()
    }

    /// Record `source -> destination`.
    ///
    /// Registering the same pair again is a no-op. Registering a different
    /// destination for an already mapped source fails and keeps the first.
    pub fn register(&mut self, source: u64, destination: u64) -> Result<()> {
        match self.entries.get(&source) {
            Some(&existing) if existing != destination => Err(MigrationError::MappingConflict {
                kind: self.kind,
                source_id: source,
                existing,
                attempted: destination,
            }),
            Some(_) => Ok(()),
            None => {
                self.entries.insert(source, destination);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the table, ordered by source identifier.
    pub fn to_map(&self) -> BTreeMap<u64, u64> {
        self.entries.clone()
    }
}

/// Per-run identifier tables for milestones, issues and comments.
#[derive(Debug, Clone)]
pub struct EntityMapper {
    milestones: IdMap,
    issues: IdMap,
    comments: Vec<CommentMapping>,
}

impl Default for EntityMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityMapper {
    pub fn new() -> Self {
        Self {
            milestones: IdMap::new("milestone"),
            issues: IdMap::new("issue"),
            comments: Vec::new(),
        }
    }

    pub fn resolve_milestone(&self, source_id: u64) -> Option<u64> {
        self.milestones.resolve(source_id)
    }

    pub fn register_milestone(&mut self, source_id: u64, destination_number: u64) -> Result<()> {
        self.milestones.register(source_id, destination_number)
    }

    /// Resolve a source issue number to its destination issue number.
    pub fn resolve_issue(&self, source_number: u64) -> Option<u64> {
        self.issues.resolve(source_number)
    }

    pub fn register_issue(&mut self, source_number: u64, destination_number: u64) -> Result<()> {
        self.issues.register(source_number, destination_number)
    }

    pub fn register_comment(&mut self, mapping: CommentMapping) {
        self.comments.push(mapping);
    }

    pub fn milestones(&self) -> &IdMap {
        &self.milestones
    }

    pub fn issues(&self) -> &IdMap {
        &self.issues
    }

    pub fn comments(&self) -> &[CommentMapping] {
        &self.comments
    }
}

/// Linear scan of a freshly listed destination collection.
pub fn find_existing<T, F>(collection: &[T], predicate: F) -> Option<&T>
where
    F: Fn(&T) -> bool,
{
    collection.iter().find(|item| predicate(*item))
}

/// Milestones are matched on their exact title.
pub fn same_title(title: &str) -> impl Fn(&MilestoneResponse) -> bool + '_ {
    move |milestone| milestone.title == title
}

/// Labels are matched on their case-folded name.
pub fn same_label(name: &str) -> impl Fn(&LabelResponse) -> bool + '_ {
    let folded = name.to_lowercase();
    move |label| label.name.to_lowercase() == folded
}
