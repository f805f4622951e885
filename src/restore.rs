//! Restoring a live entity to one of its revisions.
//!
//! The revert context travels as an explicit [`RestoreContext`] through the
//! hook calls instead of living on the entity row.

use crate::error::Result;
use crate::types::{EntityId, ForkPointer, LiveEntity, Revision, RevisionId, Timestamp};

/// The in-progress restore handed to hooks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestoreContext {
    pub entity: EntityId,
    /// The revision being restored.
    pub reverting_to: RevisionId,
    /// The snapshot of the pre-restore state. `None` until it is written, so
    /// `before_restore` always sees `None`.
    pub reverting_from: Option<RevisionId>,
}

/// Callbacks around a restore.
pub trait RestoreHooks {
    /// Called before anything is written. An error aborts the restore and is
    /// returned to the caller.
    fn before_restore(&mut self, _context: &RestoreContext, _target: &Revision) -> Result<()> {
        Ok(())
    }

    /// Called once the restore has committed.
    fn after_restore(&mut self, _context: &RestoreContext, _entity: &LiveEntity) {}
}

/// Hooks that do nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl RestoreHooks for NoHooks {}

/// Result of a committed restore.
#[derive(Clone, Debug)]
pub struct RestoreOutcome {
    pub context: RestoreContext,
    /// The live entity after the restore.
    pub entity: LiveEntity,
    /// The revision capturing the state that was replaced.
    pub snapshot: Revision,
}

/// The live row after restoring `target` over `current`.
///
/// Fields and type tag come from the target. Its captured associations are
/// laid over the current ones; associations it never captured are kept. The
/// fork pointer records the restored revision.
pub fn restored_entity(current: &LiveEntity, target: &Revision, now: Timestamp) -> LiveEntity {
    let mut associations = current.associations.clone();
    associations.extend(
        target
            .associations
            .iter()
            .map(|(name, value)| (name.clone(), value.clone())),
    );

    LiveEntity {
        id: current.id,
        type_tag: target.type_tag.clone(),
        fields: target.fields.clone(),
        associations,
        branched_from: Some(ForkPointer::Revision(target.id)),
        created_at: current.created_at,
        updated_at: now,
    }
}
