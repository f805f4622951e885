//! In-process notifications of ledger changes.
//!
//! Subscribers learn the identifier of every new revision, so restore and
//! audit hooks living outside the ledger can react to it. Other events cover
//! fork re-parenting, restores and soft deletes.
//!
//! Each subscriber has a bounded buffer; one that falls behind is dropped
//! rather than stalling writers.
//!
//! # Example
//!
//! ```ignore
//! let handle = store.subscribe(SubscriptionConfig {
//!     filter: SubscriptionFilter::lineages(vec![post.id]),
//!     ..Default::default()
//! });
//!
//! while let Ok(event) = handle.recv() {
//!     match event {
//!         LedgerEvent::RevisionCreated { revision } => println!("new revision {}", revision.id),
//!         LedgerEvent::Dropped { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DropReason, LedgerEvent, RevisionSummary, SubscriptionConfig, SubscriptionFilter,
    SubscriptionHandle, SubscriptionId,
};
