//! # Lineage
//!
//! An append-only revision ledger. Every live entity owns a lineage of
//! immutable revisions numbered `1..N` without gaps, and branches record the
//! exact revision they diverged from.
//!
//! ## Core Concepts
//!
//! - **Live entities**: the current, mutable state of a domain object
//! - **Revisions**: frozen snapshots, numbered per lineage and stamped when superseded
//! - **Fork pointers**: branch provenance, re-pointed at the frozen revision on each append
//! - **Selectors**: `first`, `last`, `previous`, `~k`, numbers, ids and labels
//! - **Association selection**: which named sub-objects a snapshot copies
//!
//! ## Example
//!
//! ```ignore
//! use lineage::{EntityInput, RevisionSelector, RevisionStore, StoreConfig, TypeTag};
//!
//! let store = RevisionStore::open_or_create(StoreConfig {
//!     path: "./my-ledger".into(),
//!     ..Default::default()
//! })?;
//!
//! let post = store.create_entity(EntityInput::new(TypeTag::base("Post"), json!({"title": "Draft"})))?;
//! let (rev, _) = store.revise(post.id, json!({"title": "Final"}))?;
//! assert_eq!(rev.number.0, 1);
//!
//! let first = store.resolve(post.id, &RevisionSelector::First, &Default::default())?;
//! ```

pub mod associations;
pub mod branches;
pub mod error;
pub mod journal;
pub mod ledger;
pub mod navigator;
pub mod restore;
pub mod store;
pub mod subscriptions;
pub mod tables;
pub mod types;

// Re-exports
pub use associations::{select_associations, AssociationRegistry, CloneAssociations};
pub use branches::BranchTracker;
pub use error::{LedgerError, Result};
pub use ledger::AppendConcurrency;
pub use navigator::{DeletedRows, LineageReport, ListOptions, Navigator, RevisionSelector};
pub use restore::{NoHooks, RestoreContext, RestoreHooks, RestoreOutcome};
pub use store::{RevisionStore, StoreConfig};
pub use subscriptions::{
    DropReason, LedgerEvent, RevisionSummary, SubscriptionConfig, SubscriptionFilter,
    SubscriptionHandle, SubscriptionId, SubscriptionManager,
};
pub use types::*;
