//! Revision table.

use crate::types::{EntityId, Revision, RevisionId, RevisionNumber, Timestamp};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

/// Revision rows with a unique `(original_id, number)` index and an
/// `(original_id, deleted)` index for default listings.
#[derive(Debug, Default)]
pub struct RevisionTable {
    /// Rows by ID.
    rows: HashMap<RevisionId, Revision>,

    /// Unique index, ordered so a lineage is one contiguous key range.
    by_lineage: BTreeMap<(EntityId, RevisionNumber), RevisionId>,

    /// Soft-deleted numbers per lineage.
    deleted: HashMap<EntityId, BTreeSet<RevisionNumber>>,
}

impl RevisionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: RevisionId) -> Option<&Revision> {
        self.rows.get(&id)
    }

    pub fn contains(&self, id: RevisionId) -> bool {
        self.rows.contains_key(&id)
    }

    pub fn by_number(&self, lineage: EntityId, number: RevisionNumber) -> Option<&Revision> {
        self.by_lineage
            .get(&(lineage, number))
            .and_then(|id| self.rows.get(id))
    }

    /// Highest number stored for a lineage.
    pub fn last_number(&self, lineage: EntityId) -> Option<RevisionNumber> {
        self.by_lineage
            .range((lineage, RevisionNumber(0))..=(lineage, RevisionNumber(u64::MAX)))
            .next_back()
            .map(|((_, number), _)| *number)
    }

    /// The revision with the highest number in a lineage.
    pub fn last_in_lineage(&self, lineage: EntityId) -> Option<&Revision> {
        self.last_number(lineage)
            .and_then(|number| self.by_number(lineage, number))
    }

    /// Rows of one lineage within a number range, ascending.
    pub fn scan(
        &self,
        lineage: EntityId,
        lower: Bound<RevisionNumber>,
        upper: Bound<RevisionNumber>,
    ) -> impl DoubleEndedIterator<Item = &Revision> + '_ {
        let lo = match lower {
            Bound::Included(n) => Bound::Included((lineage, n)),
            Bound::Excluded(n) => Bound::Excluded((lineage, n)),
            Bound::Unbounded => Bound::Included((lineage, RevisionNumber(0))),
        };
        let hi = match upper {
            Bound::Included(n) => Bound::Included((lineage, n)),
            Bound::Excluded(n) => Bound::Excluded((lineage, n)),
            Bound::Unbounded => Bound::Included((lineage, RevisionNumber(u64::MAX))),
        };

        let range = if range_is_empty(&lo, &hi) {
            None
        } else {
            Some(self.by_lineage.range((lo, hi)))
        };

        range
            .into_iter()
            .flatten()
            .filter_map(move |(_, id)| self.rows.get(id))
    }

    /// Number of revisions in a lineage.
    pub fn lineage_len(&self, lineage: EntityId) -> usize {
        self.scan(lineage, Bound::Unbounded, Bound::Unbounded).count()
    }

    /// Soft-deleted numbers of a lineage.
    pub fn deleted_numbers(&self, lineage: EntityId) -> Option<&BTreeSet<RevisionNumber>> {
        self.deleted.get(&lineage)
    }

    pub fn insert(&mut self, revision: Revision) {
        self.by_lineage
            .insert((revision.original_id, revision.number), revision.id);
        if revision.deleted_at.is_some() {
            self.deleted
                .entry(revision.original_id)
                .or_default()
                .insert(revision.number);
        }
        self.rows.insert(revision.id, revision);
    }

    /// Set `revised_at` on a predecessor. The only in-place change a stored
    /// revision ever sees besides soft deletion.
    pub fn stamp_revised(&mut self, id: RevisionId, at: Timestamp) {
        if let Some(row) = self.rows.get_mut(&id) {
            row.revised_at = Some(at);
        }
    }

    /// Set `deleted_at` once; later calls keep the first stamp.
    pub fn soft_delete(&mut self, id: RevisionId, at: Timestamp) -> bool {
        match self.rows.get_mut(&id) {
            Some(row) if row.deleted_at.is_none() => {
                row.deleted_at = Some(at);
                self.deleted
                    .entry(row.original_id)
                    .or_default()
                    .insert(row.number);
                true
            }
            _ => false,
        }
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.values().map(|numbers| numbers.len()).sum()
    }

    /// Number of distinct lineages with at least one revision.
    pub fn lineage_count(&self) -> usize {
        let mut count = 0;
        let mut last = None;
        for (lineage, _) in self.by_lineage.keys() {
            if last != Some(*lineage) {
                count += 1;
                last = Some(*lineage);
            }
        }
        count
    }

    /// Highest assigned ID (0 when empty).
    pub fn max_id(&self) -> u64 {
        self.rows.keys().map(|id| id.0).max().unwrap_or(0)
    }
}

/// `BTreeMap::range` panics on inverted bounds; treat them as empty instead.
fn range_is_empty<K: Ord>(lo: &Bound<K>, hi: &Bound<K>) -> bool {
    match (lo, hi) {
        (Bound::Included(a), Bound::Included(b)) => a > b,
        (Bound::Included(a), Bound::Excluded(b))
        | (Bound::Excluded(a), Bound::Included(b)) => a >= b,
        (Bound::Excluded(a), Bound::Excluded(b)) => a >= b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{content_digest, TypeTag};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn revision(id: u64, lineage: u64, number: u64) -> Revision {
        let fields = json!({"n": number});
        let associations = BTreeMap::new();
        let digest = content_digest(&fields, &associations).unwrap();
        Revision {
            id: RevisionId(id),
            original_id: EntityId(lineage),
            number: RevisionNumber(number),
            is_current: false,
            created_at: Timestamp(number as i64),
            revised_at: None,
            current_at: Timestamp(number as i64 + 1),
            deleted_at: None,
            branched_from: None,
            label: None,
            type_tag: TypeTag::base("Doc"),
            fields,
            associations,
            digest,
        }
    }

    #[test]
    fn test_last_number_is_per_lineage() {
        let mut table = RevisionTable::new();
        table.insert(revision(1, 1, 1));
        table.insert(revision(2, 1, 2));
        table.insert(revision(3, 2, 1));

        assert_eq!(table.last_number(EntityId(1)), Some(RevisionNumber(2)));
        assert_eq!(table.last_number(EntityId(2)), Some(RevisionNumber(1)));
        assert_eq!(table.last_number(EntityId(3)), None);
        assert_eq!(table.lineage_count(), 2);
        assert_eq!(table.last_in_lineage(EntityId(1)).unwrap().id, RevisionId(2));
    }

    #[test]
    fn test_scan_bounds() {
        let mut table = RevisionTable::new();
        for n in 1..=5 {
            table.insert(revision(n, 7, n));
        }
        table.insert(revision(99, 8, 1));

        let below: Vec<u64> = table
            .scan(EntityId(7), Bound::Unbounded, Bound::Excluded(RevisionNumber(3)))
            .rev()
            .map(|r| r.number.0)
            .collect();
        assert_eq!(below, vec![2, 1]);

        let above: Vec<u64> = table
            .scan(EntityId(7), Bound::Excluded(RevisionNumber(3)), Bound::Unbounded)
            .map(|r| r.number.0)
            .collect();
        assert_eq!(above, vec![4, 5]);

        let none: Vec<_> = table
            .scan(EntityId(7), Bound::Excluded(RevisionNumber(3)), Bound::Excluded(RevisionNumber(2)))
            .collect();
        assert!(none.is_empty());

        assert_eq!(table.lineage_len(EntityId(7)), 5);
    }

    #[test]
    fn test_soft_delete_once() {
        let mut table = RevisionTable::new();
        table.insert(revision(1, 1, 1));

        assert!(table.soft_delete(RevisionId(1), Timestamp(10)));
        assert!(!table.soft_delete(RevisionId(1), Timestamp(20)));
        assert_eq!(table.get(RevisionId(1)).unwrap().deleted_at, Some(Timestamp(10)));
        assert_eq!(table.deleted_count(), 1);
        assert!(table
            .deleted_numbers(EntityId(1))
            .unwrap()
            .contains(&RevisionNumber(1)));
    }
}
