use super::{decode_document, entity_prefix, record_key, run_query, Predicate, Row, RowQuery, RowReader};
use crate::error::{TransformError, TransformResult};
use crate::record::RecordId;
use log::{debug, warn};
use serde_json::{Map, Value};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
};
use std::collections::BTreeMap;
use std::sync::Mutex;

type Snapshot = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// How a commit attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// A record read by the transaction was changed by another commit in the
    /// meantime. Nothing was written.
    Conflict { key: String },
}

/// Unit of work over the records tree.
///
/// Writes are buffered and only become visible to other readers on
/// [`commit`](Self::commit). Reads through the transaction see its own pending
/// writes; every committed value it reads is remembered, and the commit only
/// goes through if none of them changed since. Dropping an uncommitted
/// transaction discards everything it buffered.
pub struct StoreTransaction {
    tree: sled::Tree,
    pending: Snapshot,
    reads: Mutex<Snapshot>,
    finished: bool,
}

impl StoreTransaction {
    pub(crate) fn new(tree: sled::Tree) -> Self {
        Self {
            tree,
            pending: BTreeMap::new(),
            reads: Mutex::new(BTreeMap::new()),
            finished: false,
        }
    }

    fn remember_read(&self, key: &[u8], value: Option<&[u8]>) -> TransformResult<()> {
        let mut reads = self
            .reads
            .lock()
            .map_err(|_| TransformError::Persistence("Transaction read set lock poisoned".to_string()))?;
        reads
            .entry(key.to_vec())
            .or_insert_with(|| value.map(<[u8]>::to_vec));
        Ok(())
    }

    /// Document of a record as seen by this transaction.
    pub fn get_document(&self, entity: &str, id: &RecordId) -> TransformResult<Option<Map<String, Value>>> {
        let key = record_key(entity, id);
        match self.pending.get(&key) {
            Some(Some(bytes)) => Ok(Some(decode_document(bytes)?)),
            Some(None) => Ok(None),
            None => {
                let stored = self.tree.get(&key)?;
                self.remember_read(&key, stored.as_deref())?;
                match stored {
                    Some(bytes) => Ok(Some(decode_document(&bytes)?)),
                    None => Ok(None),
                }
            }
        }
    }

    /// Buffers a full document write for a record.
    pub fn put_document(
        &mut self,
        entity: &str,
        id: &RecordId,
        document: &Map<String, Value>,
    ) -> TransformResult<()> {
        let bytes = serde_json::to_vec(document)?;
        self.pending.insert(record_key(entity, id), Some(bytes));
        Ok(())
    }

    /// Buffers removal of a record.
    pub fn delete_document(&mut self, entity: &str, id: &RecordId) {
        self.pending.insert(record_key(entity, id), None);
    }

    /// Number of buffered writes.
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Applies all buffered writes atomically. A conflict with another commit
    /// is reported as a persistence error.
    pub fn commit(self) -> TransformResult<()> {
        match self.try_commit()? {
            CommitOutcome::Committed => Ok(()),
            CommitOutcome::Conflict { key } => Err(TransformError::Persistence(format!(
                "Record {} was modified by a concurrent transaction",
                key
            ))),
        }
    }

    /// Applies all buffered writes atomically unless a record this
    /// transaction read has changed since, in which case nothing is written.
    ///
    /// Writes are visible once this returns `Committed`. The following flush
    /// is best effort: a flush failure is logged, not returned.
    pub fn try_commit(mut self) -> TransformResult<CommitOutcome> {
        let pending = std::mem::take(&mut self.pending);
        self.finished = true;
        let reads = match self.reads.get_mut() {
            Ok(reads) => std::mem::take(reads),
            Err(_) => {
                return Err(TransformError::Persistence(
                    "Transaction read set lock poisoned".to_string(),
                ))
            }
        };

        let result = self
            .tree
            .transaction(|tree| -> ConflictableTransactionResult<(), Vec<u8>> {
                for (key, seen) in &reads {
                    let current = tree.get(key.as_slice())?;
                    if current.as_deref() != seen.as_deref() {
                        return Err(ConflictableTransactionError::Abort(key.clone()));
                    }
                }
                for (key, value) in &pending {
                    match value {
                        Some(bytes) => {
                            tree.insert(key.as_slice(), bytes.as_slice())?;
                        }
                        None => {
                            tree.remove(key.as_slice())?;
                        }
                    }
                }
                Ok(())
            });

        match result {
            Ok(()) => {
                flush_best_effort(self.tree.flush());
                debug!("Committed {} record writes", pending.len());
                Ok(CommitOutcome::Committed)
            }
            Err(TransactionError::Abort(key)) => {
                let key = String::from_utf8_lossy(&key).into_owned();
                debug!("Commit of {} writes hit a conflict on {}", pending.len(), key);
                Ok(CommitOutcome::Conflict { key })
            }
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    /// Discards all buffered writes.
    pub fn rollback(mut self) {
        let discarded = self.pending.len();
        self.pending.clear();
        self.finished = true;
        debug!("Rolled back {} record writes", discarded);
    }
}

/// Returns whether the flush succeeded.
fn flush_best_effort(result: sled::Result<usize>) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            warn!("Committed writes are visible but not yet flushed: {}", e);
            false
        }
    }
}

impl Drop for StoreTransaction {
    fn drop(&mut self) {
        if !self.finished && !self.pending.is_empty() {
            warn!(
                "Transaction dropped without commit; discarding {} writes",
                self.pending.len()
            );
        }
    }
}

impl RowReader for StoreTransaction {
    fn query(&self, query: &RowQuery) -> TransformResult<Vec<Row>> {
        let mut documents = BTreeMap::new();
        if let Some(Predicate::PrimaryKey(id)) = query.predicate() {
            let key = record_key(query.entity(), id);
            if let Some(document) = self.get_document(query.entity(), id)? {
                documents.insert(key, serde_json::to_vec(&document)?);
            }
            return run_query(query, documents);
        }

        let prefix = entity_prefix(query.entity());
        for item in self.tree.scan_prefix(&prefix) {
            let (key, bytes) = item?;
            self.remember_read(&key, Some(&*bytes))?;
            documents.insert(key.to_vec(), bytes.to_vec());
        }
        for (key, value) in self.pending.range(prefix.clone()..) {
            if !key.starts_with(&prefix) {
                break;
            }
            match value {
                Some(bytes) => {
                    documents.insert(key.clone(), bytes.clone());
                }
                None => {
                    documents.remove(key);
                }
            }
        }
        run_query(query, documents)
    }
}
