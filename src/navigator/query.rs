//! Ancestor/descendant queries over the revision table.

use super::{DeletedRows, ListOptions, RevisionSelector};
use crate::error::{LedgerError, Result};
use crate::tables::RevisionTable;
use crate::types::{EntityId, Revision, RevisionNumber};
use std::ops::Bound;

/// Summary of a lineage that passed [`Navigator::verify_lineage`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineageReport {
    pub lineage: EntityId,
    pub revisions: usize,
    pub deleted: usize,
    pub last: Option<RevisionNumber>,
}

#[derive(Clone, Copy)]
enum Direction {
    Before,
    After,
}

/// Read-only view over the revision table.
pub struct Navigator<'a> {
    revisions: &'a RevisionTable,
}

impl<'a> Navigator<'a> {
    pub fn new(revisions: &'a RevisionTable) -> Self {
        Self { revisions }
    }

    /// Same-lineage revisions numbered below `revision`, newest first.
    pub fn ancestors_of(&self, revision: &Revision, options: &ListOptions) -> Vec<Revision> {
        self.revisions
            .scan(
                revision.original_id,
                Bound::Unbounded,
                Bound::Excluded(revision.number),
            )
            .rev()
            .filter(|r| options.admits(r))
            .cloned()
            .collect()
    }

    /// Same-lineage revisions numbered above `revision`, oldest first.
    pub fn descendants_of(&self, revision: &Revision, options: &ListOptions) -> Vec<Revision> {
        self.revisions
            .scan(
                revision.original_id,
                Bound::Excluded(revision.number),
                Bound::Unbounded,
            )
            .filter(|r| options.admits(r))
            .cloned()
            .collect()
    }

    /// A whole lineage, oldest first.
    pub fn list(&self, lineage: EntityId, options: &ListOptions) -> Vec<Revision> {
        if options.deleted == DeletedRows::Only {
            return self
                .revisions
                .deleted_numbers(lineage)
                .into_iter()
                .flatten()
                .filter_map(|number| self.revisions.by_number(lineage, *number))
                .filter(|r| options.admits(r))
                .cloned()
                .collect();
        }

        self.revisions
            .scan(lineage, Bound::Unbounded, Bound::Unbounded)
            .filter(|r| options.admits(r))
            .cloned()
            .collect()
    }

    /// The immediate ancestor of `revision`.
    ///
    /// Ancestor order is authoritative; a neighbour whose number is not
    /// exactly one less is reported as an integrity violation. Returns `None`
    /// when there is no ancestor or `options` hides it.
    pub fn previous_revision(
        &self,
        revision: &Revision,
        options: &ListOptions,
    ) -> Result<Option<Revision>> {
        Ok(self
            .neighbour(revision, Direction::Before)?
            .filter(|r| options.admits(r))
            .cloned())
    }

    /// The immediate descendant of `revision`. See [`Self::previous_revision`].
    pub fn next_revision(
        &self,
        revision: &Revision,
        options: &ListOptions,
    ) -> Result<Option<Revision>> {
        Ok(self
            .neighbour(revision, Direction::After)?
            .filter(|r| options.admits(r))
            .cloned())
    }

    /// Resolve a selector within a lineage.
    ///
    /// `First`, `Last` and `Label` pick among the rows `options` admits, and
    /// `Previous`/`Back` count back by number from that newest admitted row.
    /// The row reached must itself be admitted.
    pub fn resolve(
        &self,
        lineage: EntityId,
        selector: &RevisionSelector,
        options: &ListOptions,
    ) -> Result<Revision> {
        let found = match selector {
            RevisionSelector::Number(number) => self.revisions.by_number(lineage, *number),
            RevisionSelector::Id(id) => self
                .revisions
                .get(*id)
                .filter(|r| r.original_id == lineage),
            RevisionSelector::First => self.oldest_admitted(lineage, options),
            RevisionSelector::Last => self.newest_admitted(lineage, options),
            RevisionSelector::Previous => self.back_from_last(lineage, 1, options)?,
            RevisionSelector::Back(steps) => self.back_from_last(lineage, *steps, options)?,
            RevisionSelector::Label(label) => self
                .revisions
                .scan(lineage, Bound::Unbounded, Bound::Unbounded)
                .rev()
                .find(|r| r.label.as_deref() == Some(label.as_str()) && options.admits(r)),
        };

        found
            .filter(|r| options.admits(r))
            .cloned()
            .ok_or_else(|| {
                LedgerError::RevisionNotFound(format!("{} in lineage {}", selector, lineage))
            })
    }

    /// Check that a lineage is numbered exactly `1..=N`, that only its newest
    /// revision is unsuperseded, and that no stored content has changed.
    pub fn verify_lineage(&self, lineage: EntityId) -> Result<LineageReport> {
        let rows: Vec<&Revision> = self
            .revisions
            .scan(lineage, Bound::Unbounded, Bound::Unbounded)
            .collect();

        let mut expected = RevisionNumber::FIRST;
        for (i, row) in rows.iter().enumerate() {
            if row.number != expected {
                return Err(LedgerError::IntegrityViolation(format!(
                    "lineage {} expected number {} but found {}",
                    lineage, expected, row.number
                )));
            }
            if row.is_current {
                return Err(LedgerError::IntegrityViolation(format!(
                    "revision {} is stored as current",
                    row.id
                )));
            }

            let newest = i + 1 == rows.len();
            if newest == row.revised_at.is_some() {
                return Err(LedgerError::IntegrityViolation(format!(
                    "revision {} (number {}) has revised_at {:?}",
                    row.id, row.number, row.revised_at
                )));
            }

            if !row.content_intact()? {
                return Err(LedgerError::IntegrityViolation(format!(
                    "revision {} content no longer matches its digest",
                    row.id
                )));
            }

            expected = expected.next();
        }

        Ok(LineageReport {
            lineage,
            revisions: rows.len(),
            deleted: rows.iter().filter(|r| r.is_deleted()).count(),
            last: rows.last().map(|r| r.number),
        })
    }

    fn oldest_admitted(&self, lineage: EntityId, options: &ListOptions) -> Option<&'a Revision> {
        let revisions = self.revisions;
        revisions
            .scan(lineage, Bound::Unbounded, Bound::Unbounded)
            .find(|r| options.admits(r))
    }

    fn newest_admitted(&self, lineage: EntityId, options: &ListOptions) -> Option<&'a Revision> {
        let revisions = self.revisions;
        revisions
            .scan(lineage, Bound::Unbounded, Bound::Unbounded)
            .rev()
            .find(|r| options.admits(r))
    }

    fn back_from_last(
        &self,
        lineage: EntityId,
        steps: u64,
        options: &ListOptions,
    ) -> Result<Option<&'a Revision>> {
        let mut current = self.newest_admitted(lineage, options);
        for _ in 0..steps {
            current = match current {
                Some(revision) => self.neighbour(revision, Direction::Before)?,
                None => return Ok(None),
            };
        }
        Ok(current)
    }

    fn neighbour(&self, revision: &Revision, direction: Direction) -> Result<Option<&'a Revision>> {
        let lineage = revision.original_id;
        let (found, expected) = match direction {
            Direction::Before => (
                self.revisions
                    .scan(lineage, Bound::Unbounded, Bound::Excluded(revision.number))
                    .next_back(),
                revision.number.prev(),
            ),
            Direction::After => (
                self.revisions
                    .scan(lineage, Bound::Excluded(revision.number), Bound::Unbounded)
                    .next(),
                Some(revision.number.next()),
            ),
        };

        match found {
            Some(row) if Some(row.number) != expected => Err(LedgerError::IntegrityViolation(
                format!(
                    "lineage {} jumps from {} to {}",
                    lineage, revision.number, row.number
                ),
            )),
            other => Ok(other),
        }
    }
}
