//! Live entity table.

use crate::types::{EntityId, ForkPointer, LiveEntity, RevisionId, Timestamp};
use std::collections::{BTreeSet, HashMap};

/// Live entity rows with an index on the fork-pointer column.
#[derive(Debug, Default)]
pub struct EntityTable {
    /// Rows by ID.
    rows: HashMap<EntityId, LiveEntity>,

    /// Fork pointer -> entities currently carrying it.
    by_fork: HashMap<ForkPointer, BTreeSet<EntityId>>,
}

impl EntityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: EntityId) -> Option<&LiveEntity> {
        self.rows.get(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.rows.contains_key(&id)
    }

    /// Insert or overwrite a row, keeping the fork index in step.
    pub fn put(&mut self, entity: LiveEntity) {
        if let Some(old) = self.rows.get(&entity.id) {
            if let Some(pointer) = old.branched_from {
                self.unindex(pointer, entity.id);
            }
        }
        if let Some(pointer) = entity.branched_from {
            self.by_fork.entry(pointer).or_default().insert(entity.id);
        }
        self.rows.insert(entity.id, entity);
    }

    /// Entities whose fork pointer equals `pointer`, in ID order.
    pub fn forked_from(&self, pointer: ForkPointer) -> Vec<EntityId> {
        self.by_fork
            .get(&pointer)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Batch-rewrite every fork pointer equal to `Entity(from)` into
    /// `Revision(to)`. The lineage's own row is never touched.
    ///
    /// Returns the number of rows rewritten; zero on a repeat call.
    pub fn reparent(&mut self, from: EntityId, to: RevisionId, at: Timestamp) -> usize {
        let stale = ForkPointer::Entity(from);
        let ids: Vec<EntityId> = self
            .forked_from(stale)
            .into_iter()
            .filter(|id| *id != from)
            .collect();

        let fresh = ForkPointer::Revision(to);
        for id in &ids {
            if let Some(row) = self.rows.get_mut(id) {
                row.branched_from = Some(fresh);
                row.updated_at = at;
            }
            self.unindex(stale, *id);
            self.by_fork.entry(fresh).or_default().insert(*id);
        }

        ids.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LiveEntity> {
        self.rows.values()
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    /// Highest assigned ID (0 when empty).
    pub fn max_id(&self) -> u64 {
        self.rows.keys().map(|id| id.0).max().unwrap_or(0)
    }

    fn unindex(&mut self, pointer: ForkPointer, id: EntityId) {
        if let Some(ids) = self.by_fork.get_mut(&pointer) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_fork.remove(&pointer);
            }
        }
    }
}
