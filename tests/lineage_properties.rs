//! Property tests for numbering, navigation and association selection.

use lineage::{
    select_associations, CloneAssociations, EntityId, EntityInput, ListOptions, RevisionNumber,
    RevisionSelector, RevisionStore, SnapshotInput, StoreConfig, TypeTag,
};
use proptest::prelude::*;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use tempfile::TempDir;

const LINEAGES: usize = 3;

fn fresh_store(dir: &TempDir) -> RevisionStore {
    RevisionStore::create(StoreConfig {
        path: dir.path().join("ledger"),
        journal_sync_interval: 1_000,
        ..Default::default()
    })
    .unwrap_or_else(|e| panic!("store create failed: {e}"))
}

fn entities(store: &RevisionStore, count: usize) -> Vec<EntityId> {
    (0..count)
        .map(|i| {
            store
                .create_entity(EntityInput::new(TypeTag::base("Doc"), json!({"i": i})))
                .unwrap_or_else(|e| panic!("create failed: {e}"))
                .id
        })
        .collect()
}

fn names_strategy() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec(
        prop_oneof![
            Just("comments"),
            Just("tags"),
            Just("owner"),
            Just("files"),
            Just("members"),
        ]
        .prop_map(String::from),
        0..5,
    )
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]

    #[test]
    fn numbers_are_gap_free_under_interleaving(
        order in proptest::collection::vec(0..LINEAGES, 1..40)
    ) {
        let dir = TempDir::new().unwrap();
        let store = fresh_store(&dir);
        let ids = entities(&store, LINEAGES);

        let mut expected: BTreeMap<EntityId, u64> = BTreeMap::new();
        for (step, which) in order.iter().enumerate() {
            let lineage = ids[*which];
            let rev = store
                .append(lineage, SnapshotInput::new(json!({"step": step})))
                .unwrap_or_else(|e| panic!("append failed: {e}"));
            let count = expected.entry(lineage).or_insert(0);
            *count += 1;
            prop_assert_eq!(rev.number, RevisionNumber(*count));
        }

        for lineage in ids {
            let numbers: Vec<u64> = store
                .list_revisions(lineage, &ListOptions::default())
                .unwrap()
                .iter()
                .map(|r| r.number.0)
                .collect();
            let n = expected.get(&lineage).copied().unwrap_or(0);
            prop_assert_eq!(numbers, (1..=n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn ancestors_and_descendants_partition_the_lineage(
        count in 1usize..15,
        others in 0usize..5,
    ) {
        let dir = TempDir::new().unwrap();
        let store = fresh_store(&dir);
        let ids = entities(&store, 2);

        let revisions: Vec<_> = (0..count)
            .map(|i| store.append(ids[0], SnapshotInput::new(json!({"i": i}))).unwrap())
            .collect();
        for i in 0..others {
            store.append(ids[1], SnapshotInput::new(json!({"i": i}))).unwrap();
        }

        let opts = ListOptions::default();
        for rev in &revisions {
            let ancestors = store.ancestors_of(rev.id, &opts).unwrap();
            let descendants = store.descendants_of(rev.id, &opts).unwrap();

            let below: Vec<u64> = (1..rev.number.0).rev().collect();
            let above: Vec<u64> = (rev.number.0 + 1..=count as u64).collect();
            prop_assert_eq!(ancestors.iter().map(|r| r.number.0).collect::<Vec<_>>(), below);
            prop_assert_eq!(descendants.iter().map(|r| r.number.0).collect::<Vec<_>>(), above);
            prop_assert!(ancestors.iter().chain(&descendants).all(|r| r.original_id == ids[0]));
        }

        let last = store.resolve(ids[0], &RevisionSelector::Last, &opts).unwrap();
        let first = store.resolve(ids[0], &RevisionSelector::First, &opts).unwrap();
        prop_assert_eq!(last.number.0, count as u64);
        prop_assert_eq!(first.number, RevisionNumber::FIRST);
    }

    #[test]
    fn back_selector_counts_from_the_newest(count in 1u64..12, steps in 0u64..14) {
        let dir = TempDir::new().unwrap();
        let store = fresh_store(&dir);
        let id = entities(&store, 1)[0];
        for i in 0..count {
            store.append(id, SnapshotInput::new(json!({"i": i}))).unwrap();
        }

        let result = store.resolve(id, &RevisionSelector::Back(steps), &ListOptions::default());
        if steps < count {
            prop_assert_eq!(result.unwrap().number.0, count - steps);
        } else {
            prop_assert!(result.is_err());
        }
    }

    #[test]
    fn reparenting_twice_equals_once(branches in 0usize..6) {
        let dir = TempDir::new().unwrap();
        let store = fresh_store(&dir);
        let source = entities(&store, 1)[0];
        for _ in 0..branches {
            store.branch(source, json!({})).unwrap();
        }

        let rev = store.append(source, SnapshotInput::new(json!({}))).unwrap();
        let once = store.list_entities();

        prop_assert_eq!(store.reparent_forks(source, rev.id).unwrap(), 0);
        prop_assert_eq!(store.list_entities(), once);
        prop_assert_eq!(store.forks_of(source).len(), branches);
    }

    #[test]
    fn except_and_only_split_the_declared_set(
        declared in names_strategy(),
        excluded in names_strategy(),
    ) {
        let declared_set: BTreeSet<String> = declared.iter().cloned().collect();
        let excluded_set: BTreeSet<String> = excluded.iter().cloned().collect();

        let all = select_associations(&declared, &CloneAssociations::All);
        let except = select_associations(&declared, &CloneAssociations::Except(excluded.clone()));
        let kept: Vec<String> = excluded_set.intersection(&declared_set).cloned().collect();
        let only = select_associations(&declared, &CloneAssociations::Only(kept));

        prop_assert_eq!(&all, &declared_set);
        prop_assert!(except.is_disjoint(&excluded_set));
        prop_assert!(except.is_disjoint(&only));
        prop_assert_eq!(except.union(&only).cloned().collect::<BTreeSet<_>>(), declared_set);
        prop_assert!(select_associations(&declared, &CloneAssociations::None).is_empty());
    }
}
