//! Transaction journal.
//!
//! Every ledger mutation is written as one checksummed frame holding a whole
//! transaction, so a revision insert, its predecessor stamp and the fork
//! re-parenting it triggers land on disk together or not at all. On open the
//! frames are replayed in order to rebuild the in-memory tables.

use crate::error::{LedgerError, Result};
use crate::types::{EntityId, LiveEntity, Revision, RevisionId, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Magic bytes for journal file.
const JOURNAL_MAGIC: &[u8; 4] = b"LJR\0";

/// Current journal format version.
const JOURNAL_VERSION: u8 = 1;

/// Magic + version.
const HEADER_SIZE: u64 = 5;

/// Length prefix + checksum suffix around each frame.
const FRAME_OVERHEAD: u64 = 8;

/// Sanity limit on a single frame.
const MAX_FRAME_SIZE: u64 = 100 * 1024 * 1024;

/// A single mutation inside a transaction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum JournalOp {
    /// Insert or overwrite a live entity row.
    PutEntity(LiveEntity),
    /// Append a revision row.
    InsertRevision(Revision),
    /// Mark a revision as superseded.
    StampRevised { revision: RevisionId, at: Timestamp },
    /// Re-point every live entity forked from `from` to the frozen revision `to`.
    ReparentForks { from: EntityId, to: RevisionId },
    /// Soft-delete a revision.
    SoftDeleteRevision { revision: RevisionId, at: Timestamp },
}

/// A committed group of operations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub seq: u64,
    pub committed_at: Timestamp,
    pub ops: Vec<JournalOp>,
}

struct JournalFile {
    file: File,
    /// Offset of the end of the last good frame.
    size: u64,
    next_seq: u64,
    writes_since_sync: u64,
    /// Set when a failed commit could not be cut back off the file.
    broken: Option<String>,
    #[cfg(test)]
    fail_next_sync: bool,
}

impl JournalFile {
    fn sync_data(&mut self) -> Result<()> {
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_sync) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "injected sync failure").into());
        }
        self.file.sync_data()?;
        Ok(())
    }

    /// Write the frame at `offset`, syncing when `sync` is set.
    fn persist(&mut self, offset: u64, frame: &[u8], sync: bool) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(frame)?;
        if sync {
            self.sync_data()?;
        }
        Ok(())
    }
}

/// Append-only transaction journal.
pub struct Journal {
    path: PathBuf,
    inner: Mutex<JournalFile>,
    /// Sync every N commits (0 and 1 both mean every commit).
    sync_interval: u64,
}

impl Journal {
    /// Open or create a journal, returning it with the transactions it holds.
    pub fn open(path: impl AsRef<Path>, sync_interval: u64) -> Result<(Self, Vec<Transaction>)> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let file_len = file.metadata()?.len();

        let (size, transactions) = if file_len == 0 {
            file.write_all(JOURNAL_MAGIC)?;
            file.write_all(&[JOURNAL_VERSION])?;
            file.sync_all()?;
            (HEADER_SIZE, Vec::new())
        } else {
            Self::recover(&mut file, file_len)?
        };

        let next_seq = transactions.last().map(|t| t.seq + 1).unwrap_or(1);
        debug!(
            path = %path.display(),
            transactions = transactions.len(),
            "journal opened"
        );

        let journal = Self {
            path,
            inner: Mutex::new(JournalFile {
                file,
                size,
                next_seq,
                writes_since_sync: 0,
                broken: None,
                #[cfg(test)]
                fail_next_sync: false,
            }),
            sync_interval: sync_interval.max(1),
        };

        Ok((journal, transactions))
    }

    /// Durably append one transaction.
    ///
    /// If the write or its sync fails, the file is cut back to its previous
    /// length and the sequence does not advance, so a transaction reported as
    /// failed never replays. When the cut itself fails the journal refuses
    /// further commits.
    pub fn commit(&self, ops: Vec<JournalOp>) -> Result<Transaction> {
        let mut inner = self.inner.lock();
        if let Some(reason) = &inner.broken {
            return Err(LedgerError::Corruption(reason.clone()));
        }

        let transaction = Transaction {
            seq: inner.next_seq,
            committed_at: Timestamp::now(),
            ops,
        };

        let encoded = rmp_serde::to_vec(&transaction)?;
        if encoded.len() as u64 > MAX_FRAME_SIZE {
            return Err(LedgerError::Serialization(format!(
                "transaction of {} bytes exceeds frame limit",
                encoded.len()
            )));
        }

        let mut frame = Vec::with_capacity(encoded.len() + FRAME_OVERHEAD as usize);
        frame.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        frame.extend_from_slice(&encoded);
        frame.extend_from_slice(&crc32fast::hash(&encoded).to_le_bytes());

        let offset = inner.size;
        let sync_due = inner.writes_since_sync + 1 >= self.sync_interval;
        if let Err(e) = inner.persist(offset, &frame, sync_due) {
            if let Err(cut) = inner.file.set_len(offset) {
                warn!(seq = transaction.seq, error = %cut, "failed to discard unacknowledged frame");
                inner.broken = Some(format!(
                    "transaction {} failed and could not be rolled back",
                    transaction.seq
                ));
            }
            return Err(e);
        }

        inner.size = offset + frame.len() as u64;
        inner.next_seq += 1;
        inner.writes_since_sync = if sync_due { 0 } else { inner.writes_since_sync + 1 };

        Ok(transaction)
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.file.sync_all()?;
        inner.writes_since_sync = 0;
        Ok(())
    }

    /// Bytes used by the journal, header included.
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    /// Number of committed transactions.
    pub fn transaction_count(&self) -> u64 {
        self.inner.lock().next_seq - 1
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Verify the header and read every intact frame.
    ///
    /// An incomplete frame at the tail is the remains of an interrupted commit
    /// and is truncated away. A damaged frame followed by further data is
    /// reported as corruption.
    fn recover(file: &mut File, file_len: u64) -> Result<(u64, Vec<Transaction>)> {
        file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(file.try_clone()?);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != JOURNAL_MAGIC {
            return Err(LedgerError::InvalidFormat("Invalid journal magic".into()));
        }

        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        if version[0] != JOURNAL_VERSION {
            return Err(LedgerError::InvalidFormat(format!(
                "Unsupported journal version: {}",
                version[0]
            )));
        }

        let mut transactions = Vec::new();
        let mut offset = HEADER_SIZE;

        loop {
            let remaining = file_len - offset;
            if remaining == 0 {
                break;
            }
            if remaining < FRAME_OVERHEAD {
                Self::truncate_torn_tail(file, offset, remaining)?;
                break;
            }

            let mut len_bytes = [0u8; 4];
            reader.read_exact(&mut len_bytes)?;
            let len = u32::from_le_bytes(len_bytes) as u64;
            let frame_end = offset + FRAME_OVERHEAD + len;

            if frame_end > file_len {
                Self::truncate_torn_tail(file, offset, remaining)?;
                break;
            }
            if len > MAX_FRAME_SIZE {
                return Err(LedgerError::Corruption(format!(
                    "journal frame at offset {} too large",
                    offset
                )));
            }

            let mut encoded = vec![0u8; len as usize];
            reader.read_exact(&mut encoded)?;

            let mut checksum_bytes = [0u8; 4];
            reader.read_exact(&mut checksum_bytes)?;
            let stored_checksum = u32::from_le_bytes(checksum_bytes);
            let computed_checksum = crc32fast::hash(&encoded);

            if stored_checksum != computed_checksum {
                if frame_end == file_len {
                    Self::truncate_torn_tail(file, offset, remaining)?;
                    break;
                }
                return Err(LedgerError::ChecksumMismatch {
                    expected: stored_checksum,
                    got: computed_checksum,
                });
            }

            let transaction: Transaction = rmp_serde::from_slice(&encoded).map_err(|e| {
                LedgerError::Corruption(format!("undecodable frame at offset {}: {}", offset, e))
            })?;
            transactions.push(transaction);
            offset = frame_end;
        }

        Ok((offset, transactions))
    }

    fn truncate_torn_tail(file: &mut File, offset: u64, dropped: u64) -> Result<()> {
        warn!(offset, dropped, "discarding incomplete journal frame");
        file.set_len(offset)?;
        file.sync_all()?;
        Ok(())
    }
}
