//! Per-lineage row locks.

use crate::types::EntityId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// One mutex per lineage, created on first use.
///
/// Holding a lineage's lock across "read last number" and "commit" keeps
/// concurrent appenders to that lineage from computing the same number,
/// while appends to other lineages proceed in parallel.
#[derive(Default)]
pub struct LineageLocks {
    locks: Mutex<HashMap<EntityId, Arc<Mutex<()>>>>,
}

impl LineageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for `lineage`. Callers lock the returned handle.
    pub fn handle(&self, lineage: EntityId) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.lock().entry(lineage).or_default())
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
