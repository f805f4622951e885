//! The revision store tying all components together.

use crate::associations::{AssociationRegistry, DEFAULT_ASSOCIATION_CACHE_SIZE};
use crate::branches::{branch_entity, reparent_op, BranchTracker};
use crate::error::{LedgerError, Result};
use crate::journal::{Journal, JournalOp};
use crate::ledger::{
    plan_append, with_conflict_retry, AppendConcurrency, LineageLocks, DEFAULT_CONFLICT_RETRIES,
};
use crate::navigator::{LineageReport, ListOptions, Navigator, RevisionSelector};
use crate::restore::{restored_entity, RestoreContext, RestoreHooks, RestoreOutcome};
use crate::subscriptions::{SubscriptionConfig, SubscriptionHandle, SubscriptionId, SubscriptionManager};
use crate::tables::{ApplyOutcome, Tables};
use crate::types::{
    EntityId, EntityInput, ForkPointer, LedgerStats, LiveEntity, Revision, RevisionId,
    SnapshotInput, Timestamp,
};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Base path for the store.
    pub path: PathBuf,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Re-runs of an append that lost a numbering race.
    pub conflict_retries: u32,

    /// Sync the journal every N commits.
    pub journal_sync_interval: u64,

    /// Memoized association selections (number of types).
    pub association_cache_size: usize,

    pub concurrency: AppendConcurrency,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./ledger"),
            create_if_missing: true,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
            journal_sync_interval: 1,
            association_cache_size: DEFAULT_ASSOCIATION_CACHE_SIZE,
            concurrency: AppendConcurrency::default(),
        }
    }
}

/// Magic bytes for store manifest.
const STORE_MAGIC: &[u8; 4] = b"LDG\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

const JOURNAL_FILE: &str = "journal.log";

/// The revision store.
///
/// Holds live entities and their revision lineages. Provides:
/// - Appending revisions with gap-free per-lineage numbering
/// - Re-pointing branches at the revision that froze their source
/// - Ancestor/descendant navigation and selector resolution
/// - Per-type association selection for snapshots
/// - Restore with before/after hooks
pub struct RevisionStore {
    config: StoreConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    journal: Journal,

    tables: RwLock<Tables>,

    /// Serializes validate, write and apply so a transaction is checked
    /// against exactly the state it lands on.
    commit_lock: Mutex<()>,

    lineage_locks: LineageLocks,

    associations: AssociationRegistry,

    subscriptions: SubscriptionManager,

    next_entity_id: AtomicU64,
    next_revision_id: AtomicU64,
}

impl RevisionStore {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: StoreConfig) -> Result<Self> {
        if config.path.join("MANIFEST").exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(LedgerError::NotInitialized)
        }
    }

    /// Create a new store.
    pub fn create(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        Self::write_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        Self::start(config, lock_file)
    }

    /// Open an existing store, replaying its journal.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        Self::start(config, lock_file)
    }

    fn start(config: StoreConfig, lock_file: File) -> Result<Self> {
        let (journal, transactions) = Journal::open(
            config.path.join(JOURNAL_FILE),
            config.journal_sync_interval,
        )?;

        let mut tables = Tables::new();
        let replayed = transactions.len();
        for transaction in transactions {
            tables.validate(&transaction.ops).map_err(|e| {
                LedgerError::Corruption(format!(
                    "transaction {} does not replay: {}",
                    transaction.seq, e
                ))
            })?;
            tables.apply(transaction.ops, transaction.committed_at);
        }

        info!(
            path = %config.path.display(),
            transactions = replayed,
            entities = tables.entities.count(),
            revisions = tables.revisions.count(),
            "revision store opened"
        );

        let next_entity_id = AtomicU64::new(tables.entities.max_id() + 1);
        let next_revision_id = AtomicU64::new(tables.revisions.max_id() + 1);

        Ok(Self {
            associations: AssociationRegistry::new(config.association_cache_size),
            config,
            _lock_file: lock_file,
            journal,
            tables: RwLock::new(tables),
            commit_lock: Mutex::new(()),
            lineage_locks: LineageLocks::new(),
            subscriptions: SubscriptionManager::new(),
            next_entity_id,
            next_revision_id,
        })
    }

    // --- Live Entities ---

    /// Insert a new live entity.
    pub fn create_entity(&self, input: EntityInput) -> Result<LiveEntity> {
        if let Some(pointer) = input.branched_from {
            let tables = self.tables.read();
            let known = match pointer {
                ForkPointer::Entity(id) => tables.entities.contains(id),
                ForkPointer::Revision(id) => tables.revisions.contains(id),
            };
            if !known {
                return Err(LedgerError::IntegrityViolation(format!(
                    "fork pointer {:?} names nothing",
                    pointer
                )));
            }
        }

        let now = Timestamp::now();
        let entity = LiveEntity {
            id: EntityId(self.next_entity_id.fetch_add(1, Ordering::SeqCst)),
            type_tag: input.type_tag,
            fields: input.fields,
            associations: input.associations,
            branched_from: input.branched_from,
            created_at: now,
            updated_at: now,
        };

        self.commit(vec![JournalOp::PutEntity(entity.clone())])?;
        debug!(entity = %entity.id, type_tag = %entity.type_tag, "entity created");

        Ok(entity)
    }

    pub fn get_entity(&self, id: EntityId) -> Result<LiveEntity> {
        self.tables
            .read()
            .entities
            .get(id)
            .cloned()
            .ok_or(LedgerError::LineageNotFound(id))
    }

    /// All live entities in ID order.
    pub fn list_entities(&self) -> Vec<LiveEntity> {
        let mut entities: Vec<LiveEntity> = self.tables.read().entities.iter().cloned().collect();
        entities.sort_by_key(|e| e.id);
        entities
    }

    // --- Revision Ledger ---

    /// Append a revision to `lineage`.
    ///
    /// The new row is numbered one past the lineage's highest number, its
    /// predecessor is stamped as superseded, and live branches still forked
    /// from the entity are re-pointed at it, all in one transaction.
    pub fn append(&self, lineage: EntityId, input: SnapshotInput) -> Result<Revision> {
        let (revision, _) =
            self.write_revision(lineage, |_, _| Ok((input.clone(), Vec::new())))?;
        Ok(revision)
    }

    /// Snapshot the live state of `entity` with its selected associations.
    pub fn snapshot(&self, entity: EntityId, label: Option<&str>) -> Result<Revision> {
        let (revision, _) = self.write_revision(entity, |live, _| {
            let selected = self.associations.selected_for(&live.type_tag);
            let mut input = SnapshotInput::capture(live, &selected);
            input.label = label.map(str::to_string);
            Ok((input, Vec::new()))
        })?;
        Ok(revision)
    }

    /// Snapshot the current state, then replace the live fields.
    pub fn revise(
        &self,
        entity: EntityId,
        fields: serde_json::Value,
    ) -> Result<(Revision, LiveEntity)> {
        let mut updated = None;
        let (revision, _) = self.write_revision(entity, |live, _| {
            let selected = self.associations.selected_for(&live.type_tag);
            let input = SnapshotInput::capture(live, &selected);

            let mut next = live.clone();
            next.fields = fields.clone();
            next.updated_at = Timestamp::now();
            updated = Some(next.clone());

            Ok((input, vec![JournalOp::PutEntity(next)]))
        })?;

        let entity = updated.ok_or_else(|| {
            LedgerError::IntegrityViolation(format!("revise of {} produced no live row", entity))
        })?;
        Ok((revision, entity))
    }

    /// Re-point live entities forked from `original` at `revision`.
    ///
    /// Returns how many rows changed; a repeat call changes none.
    pub fn reparent_forks(&self, original: EntityId, revision: RevisionId) -> Result<usize> {
        let op = {
            let tables = self.tables.read();
            let target = tables
                .revisions
                .get(revision)
                .ok_or_else(|| LedgerError::RevisionNotFound(revision.to_string()))?;
            reparent_op(original, target)?
        };

        let outcome = self.commit(vec![op])?;
        debug!(lineage = %original, %revision, count = outcome.reparented, "forks reparented");
        if outcome.reparented > 0 {
            self.subscriptions
                .broadcast_reparented(original, revision, outcome.reparented);
        }

        Ok(outcome.reparented)
    }

    /// Soft-delete a revision. Returns false if it was already deleted.
    pub fn soft_delete_revision(&self, id: RevisionId) -> Result<bool> {
        let lineage = {
            let tables = self.tables.read();
            let revision = tables
                .revisions
                .get(id)
                .ok_or_else(|| LedgerError::RevisionNotFound(id.to_string()))?;
            if revision.is_deleted() {
                return Ok(false);
            }
            revision.original_id
        };

        self.commit(vec![JournalOp::SoftDeleteRevision {
            revision: id,
            at: Timestamp::now(),
        }])?;
        self.subscriptions.broadcast_deleted(lineage, id);

        Ok(true)
    }

    // --- Navigation ---

    pub fn get_revision(&self, id: RevisionId) -> Result<Revision> {
        self.tables
            .read()
            .revisions
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::RevisionNotFound(id.to_string()))
    }

    /// Same-lineage revisions numbered below `revision`, newest first.
    pub fn ancestors_of(&self, revision: RevisionId, options: &ListOptions) -> Result<Vec<Revision>> {
        self.with_revision(revision, |nav, rev| Ok(nav.ancestors_of(rev, options)))
    }

    /// Same-lineage revisions numbered above `revision`, oldest first.
    pub fn descendants_of(
        &self,
        revision: RevisionId,
        options: &ListOptions,
    ) -> Result<Vec<Revision>> {
        self.with_revision(revision, |nav, rev| Ok(nav.descendants_of(rev, options)))
    }

    pub fn previous_revision(
        &self,
        revision: RevisionId,
        options: &ListOptions,
    ) -> Result<Option<Revision>> {
        self.with_revision(revision, |nav, rev| nav.previous_revision(rev, options))
    }

    pub fn next_revision(
        &self,
        revision: RevisionId,
        options: &ListOptions,
    ) -> Result<Option<Revision>> {
        self.with_revision(revision, |nav, rev| nav.next_revision(rev, options))
    }

    /// Resolve a selector within `entity`'s lineage.
    pub fn resolve(
        &self,
        entity: EntityId,
        selector: &RevisionSelector,
        options: &ListOptions,
    ) -> Result<Revision> {
        let tables = self.tables.read();
        Navigator::new(&tables.revisions).resolve(entity, selector, options)
    }

    /// `entity`'s revisions in number order.
    pub fn list_revisions(&self, entity: EntityId, options: &ListOptions) -> Result<Vec<Revision>> {
        let tables = self.tables.read();
        Self::ensure_lineage(&tables, entity)?;
        Ok(Navigator::new(&tables.revisions).list(entity, options))
    }

    pub fn verify_lineage(&self, entity: EntityId) -> Result<LineageReport> {
        let tables = self.tables.read();
        Self::ensure_lineage(&tables, entity)?;
        Navigator::new(&tables.revisions).verify_lineage(entity)
    }

    // --- Associations ---

    /// Association names cloned into snapshots of `type_name`.
    pub fn selected_associations(&self, type_name: &str) -> Arc<BTreeSet<String>> {
        self.associations.selected(type_name)
    }

    pub fn associations(&self) -> &AssociationRegistry {
        &self.associations
    }

    // --- Branches ---

    /// Create a live entity branched from `source`, with `overrides` merged
    /// over its fields.
    pub fn branch(&self, source: EntityId, overrides: serde_json::Value) -> Result<LiveEntity> {
        let source_row = self.get_entity(source)?;
        let id = EntityId(self.next_entity_id.fetch_add(1, Ordering::SeqCst));
        let entity = branch_entity(&source_row, id, overrides, Timestamp::now());

        self.commit(vec![JournalOp::PutEntity(entity.clone())])?;
        info!(%source, branch = %entity.id, "entity branched");

        Ok(entity)
    }

    /// Fork points from `entity` back to its root, nearest first.
    pub fn fork_chain(&self, entity: EntityId) -> Result<Vec<ForkPointer>> {
        let tables = self.tables.read();
        BranchTracker::new(&tables).fork_chain(entity)
    }

    /// Live entities forked from `entity` or from any of its revisions.
    pub fn forks_of(&self, entity: EntityId) -> Vec<EntityId> {
        let tables = self.tables.read();
        BranchTracker::new(&tables).forks_of(entity)
    }

    // --- Restore ---

    /// Restore `entity` to the revision `selector` picks.
    ///
    /// The replaced state is snapshotted first, in the same transaction that
    /// overwrites the live row. `before_restore` may veto; `after_restore`
    /// runs once the transaction has committed.
    pub fn restore<H>(
        &self,
        entity: EntityId,
        selector: &RevisionSelector,
        hooks: &mut H,
    ) -> Result<RestoreOutcome>
    where
        H: RestoreHooks + ?Sized,
    {
        let target = self.resolve(entity, selector, &ListOptions::default())?;
        let mut context = RestoreContext {
            entity,
            reverting_to: target.id,
            reverting_from: None,
        };

        hooks.before_restore(&context, &target)?;

        let mut restored = None;
        let (snapshot, _) = self.write_revision(entity, |live, _| {
            let selected = self.associations.selected_for(&live.type_tag);
            let input = SnapshotInput::capture(live, &selected);

            let next = restored_entity(live, &target, Timestamp::now());
            restored = Some(next.clone());

            Ok((input, vec![JournalOp::PutEntity(next)]))
        })?;

        let restored = restored.ok_or_else(|| {
            LedgerError::IntegrityViolation(format!("restore of {} produced no live row", entity))
        })?;
        context.reverting_from = Some(snapshot.id);

        info!(
            %entity,
            reverting_to = %target.id,
            reverting_from = %snapshot.id,
            "entity restored"
        );

        hooks.after_restore(&context, &restored);
        self.subscriptions
            .broadcast_restored(entity, target.id, context.reverting_from);

        Ok(RestoreOutcome {
            context,
            entity: restored,
            snapshot,
        })
    }

    // --- Subscriptions ---

    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        self.subscriptions.subscribe(config)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.unsubscribe(id)
    }

    // --- Store Operations ---

    pub fn stats(&self) -> LedgerStats {
        let tables = self.tables.read();
        LedgerStats {
            entity_count: tables.entities.count() as u64,
            revision_count: tables.revisions.count() as u64,
            lineage_count: tables.revisions.lineage_count() as u64,
            deleted_revision_count: tables.revisions.deleted_count() as u64,
            transaction_count: self.journal.transaction_count(),
            journal_bytes: self.journal.size(),
        }
    }

    /// Sync all data to disk.
    pub fn sync(&self) -> Result<()> {
        self.journal.sync()
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // --- Private Helpers ---

    /// Shared append path. `build` sees the live row and the lineage's
    /// newest revision and returns the snapshot content plus any operations
    /// that must commit with it. It may run more than once.
    fn write_revision<F>(&self, lineage: EntityId, mut build: F) -> Result<(Revision, ApplyOutcome)>
    where
        F: FnMut(&LiveEntity, Option<&Revision>) -> Result<(SnapshotInput, Vec<JournalOp>)>,
    {
        let (revision, outcome) = with_conflict_retry(self.config.conflict_retries, |attempt| {
            let row_lock = match self.config.concurrency {
                AppendConcurrency::LineageLock => Some(self.lineage_locks.handle(lineage)),
                AppendConcurrency::Optimistic => None,
            };
            let _row = row_lock.as_ref().map(|lock| lock.lock());

            let plan = {
                let tables = self.tables.read();
                let entity = tables
                    .entities
                    .get(lineage)
                    .ok_or(LedgerError::LineageNotFound(lineage))?;
                let last = tables.revisions.last_in_lineage(lineage);
                let (input, extra) = build(entity, last)?;

                let id = RevisionId(self.next_revision_id.fetch_add(1, Ordering::SeqCst));
                let mut plan = plan_append(entity, last, id, input, Timestamp::now())?;
                plan.ops.extend(extra);
                plan
            };

            if attempt > 0 {
                debug!(%lineage, attempt, number = %plan.revision.number, "re-planned append");
            }

            let outcome = self.commit(plan.ops)?;
            Ok((plan.revision, outcome))
        })?;

        debug!(
            %lineage,
            revision = %revision.id,
            number = %revision.number,
            reparented = outcome.reparented,
            "revision appended"
        );

        self.subscriptions.broadcast_revision(&revision);
        if outcome.reparented > 0 {
            self.subscriptions
                .broadcast_reparented(lineage, revision.id, outcome.reparented);
        }

        Ok((revision, outcome))
    }

    /// Validate, write and apply one transaction. Nothing is applied if
    /// validation or the write fails.
    fn commit(&self, ops: Vec<JournalOp>) -> Result<ApplyOutcome> {
        let _commit = self.commit_lock.lock();

        self.tables.read().validate(&ops)?;
        let transaction = self.journal.commit(ops)?;

        Ok(self
            .tables
            .write()
            .apply(transaction.ops, transaction.committed_at))
    }

    fn with_revision<T>(
        &self,
        revision: RevisionId,
        f: impl FnOnce(&Navigator<'_>, &Revision) -> Result<T>,
    ) -> Result<T> {
        let tables = self.tables.read();
        let row = tables
            .revisions
            .get(revision)
            .ok_or_else(|| LedgerError::RevisionNotFound(revision.to_string()))?;
        f(&Navigator::new(&tables.revisions), row)
    }

    /// A lineage is known if its live row or any of its revisions exists.
    fn ensure_lineage(tables: &Tables, entity: EntityId) -> Result<()> {
        if tables.entities.contains(entity) || tables.revisions.lineage_len(entity) > 0 {
            Ok(())
        } else {
            Err(LedgerError::LineageNotFound(entity))
        }
    }

    fn write_manifest(path: &Path) -> Result<()> {
        use std::io::Write;

        let manifest_path = path.join("MANIFEST");
        let mut file = File::create(manifest_path)?;

        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        use std::io::Read;

        let manifest_path = path.join("MANIFEST");
        let mut file = File::open(manifest_path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(LedgerError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(LedgerError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_path = path.join("LOCK");
        let lock_file = File::create(lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| LedgerError::Locked)?;

        Ok(lock_file)
    }
}

impl Drop for RevisionStore {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}
