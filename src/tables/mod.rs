//! In-memory tables rebuilt from the journal.
//!
//! Two logical tables: live entities (with their fork-pointer column) and
//! revisions (with the `(original_id, number)` uniqueness constraint).
//! A transaction is validated against both before any of it is applied.

mod entities;
mod revisions;

pub use entities::EntityTable;
pub use revisions::RevisionTable;

use crate::error::{LedgerError, Result};
use crate::journal::JournalOp;
use crate::types::{EntityId, ForkPointer, RevisionId, RevisionNumber, Timestamp};
use std::collections::{HashMap, HashSet};

/// Both tables, guarded together so readers never observe half a transaction.
#[derive(Debug, Default)]
pub struct Tables {
    pub entities: EntityTable,
    pub revisions: RevisionTable,
}

/// What applying a transaction changed beyond its own rows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Live entities whose fork pointer was rewritten.
    pub reparented: usize,
}

impl Tables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check every operation against the tables plus the operations staged
    /// before it in the same transaction.
    pub fn validate(&self, ops: &[JournalOp]) -> Result<()> {
        let mut staged_entities: HashSet<EntityId> = HashSet::new();
        let mut staged_revisions: HashMap<RevisionId, EntityId> = HashMap::new();
        let mut staged_last: HashMap<EntityId, Option<RevisionNumber>> = HashMap::new();

        for op in ops {
            match op {
                JournalOp::PutEntity(entity) => {
                    staged_entities.insert(entity.id);
                }
                JournalOp::InsertRevision(revision) => {
                    let lineage = revision.original_id;
                    if !self.entities.contains(lineage) && !staged_entities.contains(&lineage) {
                        return Err(LedgerError::LineageNotFound(lineage));
                    }
                    if revision.is_current {
                        return Err(LedgerError::IntegrityViolation(format!(
                            "revision {} is marked current",
                            revision.id
                        )));
                    }
                    if self.revisions.contains(revision.id)
                        || staged_revisions.contains_key(&revision.id)
                    {
                        return Err(LedgerError::IntegrityViolation(format!(
                            "revision id {} already in use",
                            revision.id
                        )));
                    }

                    let last = staged_last
                        .entry(lineage)
                        .or_insert_with(|| self.revisions.last_number(lineage));
                    let expected = last
                        .map(RevisionNumber::next)
                        .unwrap_or(RevisionNumber::FIRST);

                    if revision.number < expected {
                        return Err(LedgerError::NumberConflict {
                            lineage,
                            number: revision.number,
                        });
                    }
                    if revision.number > expected {
                        return Err(LedgerError::IntegrityViolation(format!(
                            "lineage {} would skip from {:?} to {}",
                            lineage, last, revision.number
                        )));
                    }

                    match revision.branched_from {
                        Some(ForkPointer::Revision(id))
                            if !self.revisions.contains(id) && !staged_revisions.contains_key(&id) =>
                        {
                            return Err(LedgerError::IntegrityViolation(format!(
                                "revision {} forks from unknown revision {}",
                                revision.id, id
                            )));
                        }
                        Some(ForkPointer::Entity(id))
                            if !self.entities.contains(id) && !staged_entities.contains(&id) =>
                        {
                            return Err(LedgerError::IntegrityViolation(format!(
                                "revision {} forks from unknown entity {}",
                                revision.id, id
                            )));
                        }
                        _ => {}
                    }

                    *last = Some(revision.number);
                    staged_revisions.insert(revision.id, lineage);
                }
                JournalOp::StampRevised { revision, .. }
                | JournalOp::SoftDeleteRevision { revision, .. } => {
                    if !self.revisions.contains(*revision) && !staged_revisions.contains_key(revision)
                    {
                        return Err(LedgerError::RevisionNotFound(revision.to_string()));
                    }
                }
                JournalOp::ReparentForks { from, to } => {
                    let owner = self
                        .revisions
                        .get(*to)
                        .map(|r| r.original_id)
                        .or_else(|| staged_revisions.get(to).copied())
                        .ok_or_else(|| LedgerError::RevisionNotFound(to.to_string()))?;
                    if owner != *from {
                        return Err(LedgerError::IntegrityViolation(format!(
                            "revision {} belongs to lineage {}, not {}",
                            to, owner, from
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Apply an already validated transaction.
    pub fn apply(&mut self, ops: Vec<JournalOp>, at: Timestamp) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();

        for op in ops {
            match op {
                JournalOp::PutEntity(entity) => self.entities.put(entity),
                JournalOp::InsertRevision(revision) => self.revisions.insert(revision),
                JournalOp::StampRevised { revision, at } => {
                    self.revisions.stamp_revised(revision, at)
                }
                JournalOp::ReparentForks { from, to } => {
                    outcome.reparented += self.entities.reparent(from, to, at);
                }
                JournalOp::SoftDeleteRevision { revision, at } => {
                    self.revisions.soft_delete(revision, at);
                }
            }
        }

        outcome
    }
}
