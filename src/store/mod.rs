//! sled-backed record storage.
//!
//! Records live in a single tree keyed by `"{entity}:{record_id}"`, each value
//! being the record's JSON document. Writes only happen through a
//! [`StoreTransaction`], which buffers them and applies them as one batch.

pub mod query;
pub mod transaction;

pub use query::{Predicate, Row, RowQuery};
pub use transaction::{CommitOutcome, StoreTransaction};

use crate::constants::RECORDS_TREE;
use crate::error::{TransformError, TransformResult};
use crate::record::RecordId;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Executes read-only row queries. No row-level visibility filtering is
/// applied.
pub trait RowReader {
    fn query(&self, query: &RowQuery) -> TransformResult<Vec<Row>>;

    /// First matching row, if any.
    fn query_one(&self, query: &RowQuery) -> TransformResult<Option<Row>> {
        Ok(self.query(query)?.into_iter().next())
    }
}

pub(crate) fn record_key(entity: &str, id: &RecordId) -> Vec<u8> {
    format!("{}:{}", entity, id).into_bytes()
}

pub(crate) fn entity_prefix(entity: &str) -> Vec<u8> {
    format!("{}:", entity).into_bytes()
}

pub(crate) fn decode_document(bytes: &[u8]) -> TransformResult<Map<String, Value>> {
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(map) => Ok(map),
        other => Err(TransformError::Persistence(format!(
            "Stored record is not a JSON object: {}",
            other
        ))),
    }
}

/// Runs `query` over documents already narrowed to its entity, keyed by full
/// record key.
pub(crate) fn run_query(
    query: &RowQuery,
    documents: BTreeMap<Vec<u8>, Vec<u8>>,
) -> TransformResult<Vec<Row>> {
    let prefix_len = entity_prefix(query.entity()).len();
    let mut rows = Vec::new();
    for (key, bytes) in documents {
        let id_text = String::from_utf8_lossy(&key[prefix_len..]).into_owned();
        let id: RecordId = id_text.parse()?;
        let document = decode_document(&bytes)?;
        if let Some(row) = query.apply(id, &document) {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Handle to the records tree. Cheap to clone and shareable across threads.
#[derive(Clone)]
pub struct RecordStore {
    tree: sled::Tree,
}

impl RecordStore {
    /// Opens the records tree of `db`.
    pub fn open(db: &sled::Db) -> TransformResult<Self> {
        Ok(Self {
            tree: db.open_tree(RECORDS_TREE)?,
        })
    }

    /// Starts a unit of work over this store.
    pub fn begin(&self) -> StoreTransaction {
        StoreTransaction::new(self.tree.clone())
    }

    /// Committed document of a record, if it exists.
    pub fn get_document(&self, entity: &str, id: &RecordId) -> TransformResult<Option<Map<String, Value>>> {
        match self.tree.get(record_key(entity, id))? {
            Some(bytes) => Ok(Some(decode_document(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Number of committed records of `entity`.
    pub fn count(&self, entity: &str) -> usize {
        self.tree.scan_prefix(entity_prefix(entity)).count()
    }
}

impl RowReader for RecordStore {
    fn query(&self, query: &RowQuery) -> TransformResult<Vec<Row>> {
        let mut documents = BTreeMap::new();
        match query.predicate() {
            Some(Predicate::PrimaryKey(id)) => {
                let key = record_key(query.entity(), id);
                if let Some(bytes) = self.tree.get(&key)? {
                    documents.insert(key, bytes.to_vec());
                }
            }
            _ => {
                for item in self.tree.scan_prefix(entity_prefix(query.entity())) {
                    let (key, bytes) = item?;
                    documents.insert(key.to_vec(), bytes.to_vec());
                }
            }
        }
        run_query(query, documents)
    }
}
