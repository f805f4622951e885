//! Lineage navigation: ancestry queries and revision resolution.
//!
//! Every read takes an explicit [`ListOptions`] saying whether soft-deleted
//! and current rows are wanted; nothing is filtered behind the caller's back.

mod query;
mod selector;

pub use query::{LineageReport, Navigator};
pub use selector::RevisionSelector;

use crate::types::Revision;

/// Treatment of soft-deleted rows in a read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeletedRows {
    #[default]
    Exclude,
    Include,
    Only,
}

/// Row visibility for a read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub deleted: DeletedRows,
    /// Admit rows flagged current. Stored revisions never are, so this only
    /// matters for rows handed in by callers.
    pub include_current: bool,
}

impl ListOptions {
    /// Visible and soft-deleted rows alike.
    pub fn with_deleted() -> Self {
        Self {
            deleted: DeletedRows::Include,
            ..Default::default()
        }
    }

    /// Soft-deleted rows only.
    pub fn only_deleted() -> Self {
        Self {
            deleted: DeletedRows::Only,
            ..Default::default()
        }
    }

    pub fn admits(&self, revision: &Revision) -> bool {
        if revision.is_current && !self.include_current {
            return false;
        }
        match self.deleted {
            DeletedRows::Exclude => !revision.is_deleted(),
            DeletedRows::Include => true,
            DeletedRows::Only => revision.is_deleted(),
        }
    }
}
