//! Snapshot association selection.
//!
//! Resolves which named sub-objects of a live entity are copied into a new
//! revision. Only names are produced here; copying is done by the caller.

mod config;
mod registry;

pub use config::{select_associations, CloneAssociations};
pub use registry::{AssociationRegistry, DEFAULT_ASSOCIATION_CACHE_SIZE};
