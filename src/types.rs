//! Core types for the revision ledger.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Offset added to `created_at` to form a revision's `current_at`.
///
/// A revision always sorts strictly after a predecessor stamped in the same
/// instant when ordered by validity time.
pub const CURRENT_AT_OFFSET_MICROS: i64 = 1_000_000;

/// Identifier of a live entity. Doubles as the lineage key of its revisions.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a stored revision.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RevisionId(pub u64);

impl fmt::Debug for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RevisionId({})", self.0)
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a revision within its lineage, starting at 1.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RevisionNumber(pub u64);

impl fmt::Debug for RevisionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rev({})", self.0)
    }
}

impl fmt::Display for RevisionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl RevisionNumber {
    /// The number given to the first revision of every lineage.
    pub const FIRST: RevisionNumber = RevisionNumber(1);

    pub fn next(self) -> Self {
        RevisionNumber(self.0 + 1)
    }

    /// The preceding number, or `None` for the first revision.
    pub fn prev(self) -> Option<Self> {
        if self.0 > 1 {
            Some(RevisionNumber(self.0 - 1))
        } else {
            None
        }
    }
}

/// Content hash of a revision's snapshot (SHA-256).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// Compute hash from bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Hash(hasher.finalize().into())
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Hash(arr))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as i64)
    }

    pub fn plus_micros(self, micros: i64) -> Self {
        Timestamp(self.0.saturating_add(micros))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Dynamic type of a live entity, recorded on every revision taken from it.
///
/// Polymorphic lineages store the derived variant alongside the base type so
/// consumers can branch on the tag without consulting the live row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    Base(String),
    Derived { base: String, variant: String },
}

impl TypeTag {
    pub fn base(name: impl Into<String>) -> Self {
        TypeTag::Base(name.into())
    }

    pub fn derived(base: impl Into<String>, variant: impl Into<String>) -> Self {
        TypeTag::Derived {
            base: base.into(),
            variant: variant.into(),
        }
    }

    /// The most specific type name.
    pub fn name(&self) -> &str {
        match self {
            TypeTag::Base(name) => name,
            TypeTag::Derived { variant, .. } => variant,
        }
    }

    /// The base type name shared by every variant of a lineage.
    pub fn base_name(&self) -> &str {
        match self {
            TypeTag::Base(name) => name,
            TypeTag::Derived { base, .. } => base,
        }
    }

    pub fn is_derived(&self) -> bool {
        matches!(self, TypeTag::Derived { .. })
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Base(name) => write!(f, "{}", name),
            TypeTag::Derived { base, variant } => write!(f, "{}<{}>", variant, base),
        }
    }
}

/// Where a lineage last diverged from.
///
/// `Entity` is the transient form: it points at a live, still-mutable row and
/// is rewritten to `Revision` as soon as that row is snapshotted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForkPointer {
    Entity(EntityId),
    Revision(RevisionId),
}

/// The current, mutable state of a domain object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LiveEntity {
    pub id: EntityId,
    pub type_tag: TypeTag,
    /// Domain fields.
    pub fields: serde_json::Value,
    /// Associated sub-objects by association name.
    pub associations: BTreeMap<String, serde_json::Value>,
    /// Fork pointer.
    pub branched_from: Option<ForkPointer>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Input for creating a live entity (before id assigned).
#[derive(Clone, Debug)]
pub struct EntityInput {
    pub type_tag: TypeTag,
    pub fields: serde_json::Value,
    pub associations: BTreeMap<String, serde_json::Value>,
    pub branched_from: Option<ForkPointer>,
}

impl EntityInput {
    pub fn new(type_tag: TypeTag, fields: serde_json::Value) -> Self {
        Self {
            type_tag,
            fields,
            associations: BTreeMap::new(),
            branched_from: None,
        }
    }

    /// Attach an associated sub-object.
    pub fn with_association(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.associations.insert(name.into(), value);
        self
    }

    pub fn with_branched_from(mut self, pointer: ForkPointer) -> Self {
        self.branched_from = Some(pointer);
        self
    }
}

/// An immutable historical snapshot of a live entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    /// Unique identifier (assigned by store).
    pub id: RevisionId,

    /// Lineage key: the live entity this revision belongs to.
    pub original_id: EntityId,

    /// Position in the lineage (assigned by store).
    pub number: RevisionNumber,

    /// Always false for stored rows; the live entity is the current state.
    pub is_current: bool,

    pub created_at: Timestamp,

    /// When a newer revision superseded this one.
    pub revised_at: Option<Timestamp>,

    /// Logical validity start.
    pub current_at: Timestamp,

    /// Soft-delete marker.
    pub deleted_at: Option<Timestamp>,

    /// Fork pointer inherited from the live entity at snapshot time.
    pub branched_from: Option<ForkPointer>,

    pub label: Option<String>,

    pub type_tag: TypeTag,

    pub fields: serde_json::Value,

    pub associations: BTreeMap<String, serde_json::Value>,

    /// Digest of `fields` and `associations` at creation.
    pub digest: Hash,
}

impl Revision {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Recompute the content digest and compare with the stored one.
    pub fn content_intact(&self) -> Result<bool, serde_json::Error> {
        Ok(content_digest(&self.fields, &self.associations)? == self.digest)
    }
}

/// Snapshot content for a new revision (before id/number assigned).
#[derive(Clone, Debug, Default)]
pub struct SnapshotInput {
    pub fields: serde_json::Value,
    pub associations: BTreeMap<String, serde_json::Value>,
    pub label: Option<String>,
}

impl SnapshotInput {
    pub fn new(fields: serde_json::Value) -> Self {
        Self {
            fields,
            associations: BTreeMap::new(),
            label: None,
        }
    }

    /// Create snapshot input with fields serialized from a domain value.
    pub fn json(fields: &impl Serialize) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_value(fields)?))
    }

    /// Capture a live entity's fields plus the named associations it carries.
    ///
    /// Selected names the entity does not carry are skipped.
    pub fn capture(entity: &LiveEntity, selected: &BTreeSet<String>) -> Self {
        let associations = entity
            .associations
            .iter()
            .filter(|(name, _)| selected.contains(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Self {
            fields: entity.fields.clone(),
            associations,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_association(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.associations.insert(name.into(), value);
        self
    }
}

/// SHA-256 over the canonical JSON encoding of snapshot content.
pub fn content_digest(
    fields: &serde_json::Value,
    associations: &BTreeMap<String, serde_json::Value>,
) -> Result<Hash, serde_json::Error> {
    let encoded = serde_json::to_vec(&(fields, associations))?;
    Ok(Hash::from_bytes(&encoded))
}

/// Ledger statistics.
#[derive(Clone, Debug, Default)]
pub struct LedgerStats {
    pub entity_count: u64,
    pub revision_count: u64,
    pub lineage_count: u64,
    pub deleted_revision_count: u64,
    pub transaction_count: u64,
    pub journal_bytes: u64,
}
