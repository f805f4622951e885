//! Subscription manager for broadcasting ledger events.

use crate::types::{EntityId, Revision, RevisionId};
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::types::{
    DropReason, LedgerEvent, RevisionSummary, SubscriptionConfig, SubscriptionHandle,
    SubscriptionId,
};

/// Default threshold for including snapshot fields in revision events (bytes).
const DEFAULT_FIELDS_THRESHOLD: usize = 4096;

/// Internal subscription state.
struct Subscription {
    config: SubscriptionConfig,
    sender: Sender<LedgerEvent>,
}

impl Subscription {
    /// Try to send an event. Returns false if the buffer is full or the
    /// receiver is gone; the subscriber is then dropped.
    fn try_send(&self, event: LedgerEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }

    fn matches_revision(&self, revision: &Revision) -> bool {
        let filter = &self.config.filter;
        if !filter.include_revisions || !filter.admits_lineage(revision.original_id) {
            return false;
        }

        if let Some(ref names) = filter.type_names {
            let tag = &revision.type_tag;
            return names
                .iter()
                .any(|name| name == tag.name() || name == tag.base_name());
        }

        true
    }
}

/// Manages subscriptions and broadcasts events.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
    /// Threshold for including fields in revision events.
    fields_threshold: usize,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::with_fields_threshold(DEFAULT_FIELDS_THRESHOLD)
    }

    pub fn with_fields_threshold(threshold: usize) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            fields_threshold: threshold,
        }
    }

    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        self.subscriptions
            .write()
            .insert(id, Subscription { config, sender });

        SubscriptionHandle { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscriptions.write();
        if let Some(sub) = subs.remove(&id) {
            // Best effort
            let _ = sub.sender.try_send(LedgerEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    // --- Broadcasting ---

    /// Announce a new revision.
    pub fn broadcast_revision(&self, revision: &Revision) {
        let summary = RevisionSummary::from_revision(revision, self.fields_threshold);
        let event = LedgerEvent::RevisionCreated { revision: summary };

        self.broadcast(|sub| sub.matches_revision(revision), event);
    }

    pub fn broadcast_reparented(&self, lineage: EntityId, revision: RevisionId, count: usize) {
        let event = LedgerEvent::ForksReparented {
            lineage,
            revision,
            count,
        };

        self.broadcast(
            |sub| sub.config.filter.include_branch_events && sub.config.filter.admits_lineage(lineage),
            event,
        );
    }

    pub fn broadcast_restored(
        &self,
        entity: EntityId,
        reverting_to: RevisionId,
        reverting_from: Option<RevisionId>,
    ) {
        let event = LedgerEvent::Restored {
            entity,
            reverting_to,
            reverting_from,
        };

        self.broadcast(
            |sub| sub.config.filter.include_restores && sub.config.filter.admits_lineage(entity),
            event,
        );
    }

    pub fn broadcast_deleted(&self, lineage: EntityId, revision: RevisionId) {
        let event = LedgerEvent::RevisionDeleted { lineage, revision };

        self.broadcast(
            |sub| sub.config.filter.include_deletes && sub.config.filter.admits_lineage(lineage),
            event,
        );
    }

    /// Drops subscribers that fail to receive.
    fn broadcast<F>(&self, filter: F, event: LedgerEvent)
    where
        F: Fn(&Subscription) -> bool,
    {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if filter(sub) && !sub.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    debug!(subscription = id.0, "dropping slow subscriber");
                    // Might fail, that's ok
                    let _ = sub.sender.try_send(LedgerEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
