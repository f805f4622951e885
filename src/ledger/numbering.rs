//! Revision numbering and stamping.

use crate::error::Result;
use crate::journal::JournalOp;
use crate::types::{
    content_digest, LiveEntity, Revision, RevisionId, RevisionNumber, SnapshotInput, Timestamp,
    CURRENT_AT_OFFSET_MICROS,
};

/// A revision ready to commit plus the operations that must land with it.
#[derive(Clone, Debug)]
pub struct AppendPlan {
    pub revision: Revision,
    pub ops: Vec<JournalOp>,
}

/// Build the next revision of `entity`'s lineage.
///
/// `last` is the highest-numbered stored revision of the lineage, if any. The
/// plan stamps it as superseded, inserts the new row numbered `last + 1`, and
/// re-points branches that still fork from the live entity to the new row.
pub fn plan_append(
    entity: &LiveEntity,
    last: Option<&Revision>,
    id: RevisionId,
    input: SnapshotInput,
    now: Timestamp,
) -> Result<AppendPlan> {
    let number = last
        .map(|prev| prev.number.next())
        .unwrap_or(RevisionNumber::FIRST);
    let digest = content_digest(&input.fields, &input.associations)?;

    let revision = Revision {
        id,
        original_id: entity.id,
        number,
        is_current: false,
        created_at: now,
        revised_at: None,
        current_at: now.plus_micros(CURRENT_AT_OFFSET_MICROS),
        deleted_at: None,
        branched_from: entity.branched_from,
        label: input.label,
        type_tag: entity.type_tag.clone(),
        fields: input.fields,
        associations: input.associations,
        digest,
    };

    let mut ops = Vec::with_capacity(3);
    if let Some(prev) = last {
        ops.push(JournalOp::StampRevised {
            revision: prev.id,
            at: now,
        });
    }
    ops.push(JournalOp::InsertRevision(revision.clone()));
    ops.push(JournalOp::ReparentForks {
        from: entity.id,
        to: id,
    });

    Ok(AppendPlan { revision, ops })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityId, ForkPointer, TypeTag};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn entity() -> LiveEntity {
        LiveEntity {
            id: EntityId(3),
            type_tag: TypeTag::derived("Project", "Internal"),
            fields: json!({"name": "Rich"}),
            associations: BTreeMap::new(),
            branched_from: Some(ForkPointer::Revision(RevisionId(11))),
            created_at: Timestamp(0),
            updated_at: Timestamp(0),
        }
    }

    #[test]
    fn test_first_revision_plan() {
        let plan = plan_append(
            &entity(),
            None,
            RevisionId(20),
            SnapshotInput::new(json!({"name": "Rich"})).with_label("initial"),
            Timestamp(1_000),
        )
        .unwrap();

        let rev = &plan.revision;
        assert_eq!(rev.number, RevisionNumber(1));
        assert!(!rev.is_current);
        assert_eq!(rev.original_id, EntityId(3));
        assert_eq!(rev.current_at, Timestamp(1_000 + CURRENT_AT_OFFSET_MICROS));
        assert_eq!(rev.branched_from, Some(ForkPointer::Revision(RevisionId(11))));
        assert_eq!(rev.type_tag, TypeTag::derived("Project", "Internal"));
        assert_eq!(rev.label.as_deref(), Some("initial"));
        assert!(rev.content_intact().unwrap());

        // No predecessor to stamp
        assert_eq!(plan.ops.len(), 2);
        assert!(matches!(plan.ops[0], JournalOp::InsertRevision(_)));
        assert!(matches!(
            plan.ops[1],
            JournalOp::ReparentForks { from: EntityId(3), to: RevisionId(20) }
        ));
    }

    #[test]
    fn test_follow_up_stamps_predecessor() {
        let first = plan_append(
            &entity(),
            None,
            RevisionId(20),
            SnapshotInput::new(json!({})),
            Timestamp(1_000),
        )
        .unwrap()
        .revision;

        let plan = plan_append(
            &entity(),
            Some(&first),
            RevisionId(21),
            SnapshotInput::new(json!({})),
            Timestamp(2_000),
        )
        .unwrap();

        assert_eq!(plan.revision.number, RevisionNumber(2));
        assert!(matches!(
            plan.ops[0],
            JournalOp::StampRevised { revision: RevisionId(20), at: Timestamp(2_000) }
        ));
    }
}
