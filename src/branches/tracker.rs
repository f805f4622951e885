//! Fork pointer maintenance and provenance walks.

use crate::error::{LedgerError, Result};
use crate::journal::JournalOp;
use crate::tables::Tables;
use crate::types::{EntityId, ForkPointer, LiveEntity, Revision, Timestamp};
use serde_json::Value;
use std::collections::HashSet;
use std::ops::Bound;

/// Build a new live entity branched from `source`.
///
/// Fields are copied with `overrides` merged over them key by key. An
/// override that is not an object replaces the fields outright; `null`
/// leaves them untouched. Associations are copied unchanged.
pub fn branch_entity(
    source: &LiveEntity,
    id: EntityId,
    overrides: Value,
    now: Timestamp,
) -> LiveEntity {
    let fields = match (source.fields.clone(), overrides) {
        (fields, Value::Null) => fields,
        (Value::Object(mut base), Value::Object(changes)) => {
            base.extend(changes);
            Value::Object(base)
        }
        (_, replacement) => replacement,
    };

    LiveEntity {
        id,
        type_tag: source.type_tag.clone(),
        fields,
        associations: source.associations.clone(),
        branched_from: Some(ForkPointer::Entity(source.id)),
        created_at: now,
        updated_at: now,
    }
}

/// The operation re-pointing `Entity(lineage)` forks at `revision`.
///
/// Fails unless `revision` was taken from `lineage`.
pub fn reparent_op(lineage: EntityId, revision: &Revision) -> Result<JournalOp> {
    if revision.original_id != lineage {
        return Err(LedgerError::IntegrityViolation(format!(
            "revision {} belongs to lineage {}, not {}",
            revision.id, revision.original_id, lineage
        )));
    }
    Ok(JournalOp::ReparentForks {
        from: lineage,
        to: revision.id,
    })
}

/// Read-only queries over fork pointers.
pub struct BranchTracker<'a> {
    tables: &'a Tables,
}

impl<'a> BranchTracker<'a> {
    pub fn new(tables: &'a Tables) -> Self {
        Self { tables }
    }

    /// Live entities whose pointer still names `lineage` itself.
    pub fn stale_forks(&self, lineage: EntityId) -> Vec<EntityId> {
        self.tables
            .entities
            .forked_from(ForkPointer::Entity(lineage))
            .into_iter()
            .filter(|id| *id != lineage)
            .collect()
    }

    /// Every live entity forked from `lineage`, whether its pointer names the
    /// live row or one of the lineage's revisions.
    pub fn forks_of(&self, lineage: EntityId) -> Vec<EntityId> {
        let mut forks = self.stale_forks(lineage);
        for revision in self
            .tables
            .revisions
            .scan(lineage, Bound::Unbounded, Bound::Unbounded)
        {
            forks.extend(
                self.tables
                    .entities
                    .forked_from(ForkPointer::Revision(revision.id)),
            );
        }
        forks.sort();
        forks.dedup();
        forks
    }

    /// Fork points from `entity` back to its root, nearest first.
    ///
    /// A revision pointer continues through the pointer that revision
    /// inherited when it was taken.
    pub fn fork_chain(&self, entity: EntityId) -> Result<Vec<ForkPointer>> {
        let start = self
            .tables
            .entities
            .get(entity)
            .ok_or(LedgerError::LineageNotFound(entity))?;

        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = start.branched_from;

        while let Some(pointer) = next {
            if !seen.insert(pointer) {
                return Err(LedgerError::IntegrityViolation(format!(
                    "fork chain of {} loops at {:?}",
                    entity, pointer
                )));
            }
            chain.push(pointer);

            next = match pointer {
                ForkPointer::Entity(id) => self
                    .tables
                    .entities
                    .get(id)
                    .ok_or_else(|| {
                        LedgerError::IntegrityViolation(format!(
                            "fork pointer names missing entity {}",
                            id
                        ))
                    })?
                    .branched_from,
                ForkPointer::Revision(id) => self
                    .tables
                    .revisions
                    .get(id)
                    .ok_or_else(|| {
                        LedgerError::IntegrityViolation(format!(
                            "fork pointer names missing revision {}",
                            id
                        ))
                    })?
                    .branched_from,
            };
        }

        Ok(chain)
    }
}
