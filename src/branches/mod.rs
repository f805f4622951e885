//! Branch lineage tracking.
//!
//! A live entity branched from another carries a fork pointer. While the
//! source is still live the pointer names the source entity; once the source
//! is snapshotted the pointer is rewritten to the frozen revision, so branch
//! provenance never refers to state that has since moved on.

mod tracker;

pub use tracker::{branch_entity, reparent_op, BranchTracker};
