//! Revision ledger.
//!
//! Assigns each new revision the next number in its lineage, stamps the
//! superseded predecessor, and carries the fork re-parenting that must land
//! in the same transaction. Number assignment is serialized per lineage, and
//! the `(original_id, number)` constraint in the tables catches any race that
//! slips past; such conflicts are retried a bounded number of times.

mod locks;
mod numbering;
mod retry;

pub use locks::LineageLocks;
pub use numbering::{plan_append, AppendPlan};
pub use retry::{with_conflict_retry, DEFAULT_CONFLICT_RETRIES};

/// How concurrent appends to one lineage are kept from colliding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AppendConcurrency {
    /// Take the lineage's row lock around numbering and commit.
    #[default]
    LineageLock,
    /// No lock: rely on the uniqueness check and retry on conflict.
    Optimistic,
}
