//! Subscription types.

use crate::types::{EntityId, Revision, RevisionId, RevisionNumber};
use serde::{Deserialize, Serialize};

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before the subscriber is dropped.
    /// Default: 1000
    pub buffer_size: usize,

    pub filter: SubscriptionFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            filter: SubscriptionFilter::all(),
        }
    }
}

/// Filter criteria for subscriptions.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionFilter {
    /// Only these lineages (None = every lineage).
    pub lineages: Option<Vec<EntityId>>,

    /// Only revisions of these type names, base or derived (None = all).
    pub type_names: Option<Vec<String>>,

    pub include_revisions: bool,

    /// Fork re-parenting events.
    pub include_branch_events: bool,

    pub include_restores: bool,

    pub include_deletes: bool,
}

impl SubscriptionFilter {
    /// New revisions only.
    pub fn revisions() -> Self {
        Self {
            include_revisions: true,
            ..Default::default()
        }
    }

    /// Every event for the given lineages.
    pub fn lineages(lineages: Vec<EntityId>) -> Self {
        Self {
            lineages: Some(lineages),
            ..Self::all()
        }
    }

    /// Everything.
    pub fn all() -> Self {
        Self {
            lineages: None,
            type_names: None,
            include_revisions: true,
            include_branch_events: true,
            include_restores: true,
            include_deletes: true,
        }
    }

    pub(crate) fn admits_lineage(&self, lineage: EntityId) -> bool {
        self.lineages
            .as_ref()
            .map_or(true, |lineages| lineages.contains(&lineage))
    }
}

/// Events emitted to subscribers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A revision was appended.
    RevisionCreated { revision: RevisionSummary },

    /// Live entities forked from `lineage` now point at `revision`.
    ForksReparented {
        lineage: EntityId,
        revision: RevisionId,
        count: usize,
    },

    /// A live entity was restored to one of its revisions.
    Restored {
        entity: EntityId,
        reverting_to: RevisionId,
        reverting_from: Option<RevisionId>,
    },

    RevisionDeleted {
        lineage: EntityId,
        revision: RevisionId,
    },

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Summary of a revision (for events, avoids sending the full snapshot).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RevisionSummary {
    pub id: RevisionId,
    pub lineage: EntityId,
    pub number: RevisionNumber,
    pub type_name: String,
    pub label: Option<String>,
    pub created_at: i64,
    /// Encoded size of the snapshot fields in bytes.
    pub fields_size: usize,
    /// The fields themselves, if small enough.
    pub fields: Option<serde_json::Value>,
}

impl RevisionSummary {
    pub fn from_revision(revision: &Revision, include_fields_threshold: usize) -> Self {
        let fields_size = serde_json::to_vec(&revision.fields)
            .map(|bytes| bytes.len())
            .unwrap_or(0);

        let fields = if fields_size <= include_fields_threshold {
            Some(revision.fields.clone())
        } else {
            None
        };

        Self {
            id: revision.id,
            lineage: revision.original_id,
            number: revision.number,
            type_name: revision.type_tag.name().to_string(),
            label: revision.label.clone(),
            created_at: revision.created_at.0,
            fields_size,
            fields,
        }
    }
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to manage a subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<LedgerEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<LedgerEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<LedgerEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<LedgerEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
