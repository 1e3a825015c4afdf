// Document store boundary.
//
// The scoring core never talks to a concrete backend directly: every
// component takes a `DocumentStore` so an in-memory store can stand in for
// the durable one in tests. Documents are untyped JSON objects keyed by
// (path, id), where `path` is a collection such as "awards" or
// "brackets/main/rounds/round_1/picks". Typed decoding happens at this
// boundary via `decode_doc`.

pub mod memory;
pub mod sqlite;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::warn;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Ceiling on operations per atomic batch. Mirrors the backing store's
/// write-batch limit; callers that need more writes flush and continue.
pub const MAX_BATCH_OPS: usize = 450;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("batch of {size} ops exceeds the {MAX_BATCH_OPS}-op limit")]
    BatchTooLarge { size: usize },

    #[error("increment target `{path}/{id}.{field}` holds a non-numeric value")]
    NonNumericIncrement {
        path: String,
        id: String,
        field: String,
    },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One write in an atomic batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Shallow-merge `fields` into the document, creating it if absent.
    /// A `null` field value deletes that key from the document.
    Upsert {
        path: String,
        id: String,
        fields: Value,
    },
    /// Remove the document entirely. Deleting a missing document is a no-op.
    Delete { path: String, id: String },
    /// Add `delta` to a numeric field, treating a missing document or field
    /// as zero.
    Increment {
        path: String,
        id: String,
        field: String,
        delta: f64,
    },
}

impl WriteOp {
    pub fn path(&self) -> &str {
        match self {
            WriteOp::Upsert { path, .. }
            | WriteOp::Delete { path, .. }
            | WriteOp::Increment { path, .. } => path,
        }
    }
}

/// An ordered set of writes that commit together or not at all.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        WriteBatch::default()
    }

    pub fn upsert(&mut self, path: &str, id: &str, fields: Value) {
        self.ops.push(WriteOp::Upsert {
            path: path.to_string(),
            id: id.to_string(),
            fields,
        });
    }

    pub fn delete(&mut self, path: &str, id: &str) {
        self.ops.push(WriteOp::Delete {
            path: path.to_string(),
            id: id.to_string(),
        });
    }

    pub fn increment(&mut self, path: &str, id: &str, field: &str, delta: f64) {
        self.ops.push(WriteOp::Increment {
            path: path.to_string(),
            id: id.to_string(),
            field: field.to_string(),
            delta,
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }
}

/// An immutable view of one collection, pushed to subscribers on change.
///
/// `loaded` is the "not loading" signal: it flips to true once the store
/// has produced its first read of the path, so waiters can distinguish
/// "empty because nothing exists" from "empty because nothing arrived yet".
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub docs: Arc<BTreeMap<String, Value>>,
    pub loaded: bool,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// The injected backing-store collaborator. Tests substitute `MemoryStore`
/// for `SqliteStore` through this seam.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document, or `None` if absent.
    async fn get(&self, path: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// Fetch every document under a path, keyed by document id.
    async fn list(&self, path: &str) -> Result<BTreeMap<String, Value>, StoreError>;

    /// Single-document upsert-merge (same semantics as `WriteOp::Upsert`).
    async fn upsert_merge(&self, path: &str, id: &str, fields: Value) -> Result<(), StoreError>;

    /// Commit a batch atomically. Rejects batches over `MAX_BATCH_OPS`.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Subscribe to a path. The receiver holds the latest snapshot and is
    /// updated after every commit that touches the path. Dropping the
    /// receiver tears the subscription down.
    async fn subscribe(&self, path: &str) -> Result<watch::Receiver<Snapshot>, StoreError>;
}

/// Decode a document into its schema struct. Malformed documents are a
/// data-quality problem owned upstream, so the failure is logged and the
/// entry skipped rather than raised (genuinely optional fields use serde
/// defaults on the struct instead).
pub fn decode_doc<T: DeserializeOwned>(path: &str, id: &str, doc: &Value) -> Option<T> {
    match serde_json::from_value(doc.clone()) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!("skipping malformed document {path}/{id}: {e}");
            None
        }
    }
}

/// Shallow-merge `fields` into `doc`. Both must be JSON objects; a `null`
/// value in `fields` deletes the key. Non-object inputs replace the
/// document wholesale.
pub(crate) fn merge_fields(doc: &mut Value, fields: &Value) {
    let (Some(target), Some(updates)) = (doc.as_object_mut(), fields.as_object()) else {
        *doc = fields.clone();
        return;
    };
    for (key, value) in updates {
        if value.is_null() {
            target.remove(key);
        } else {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// Add `delta` to a numeric document field, treating a missing field (or
/// explicit null) as zero. Non-numeric targets are an error so a corrupt
/// total never silently absorbs an increment.
pub(crate) fn increment_field(
    doc: &mut Value,
    path: &str,
    id: &str,
    field: &str,
    delta: f64,
) -> Result<(), StoreError> {
    let Some(object) = doc.as_object_mut() else {
        return Err(StoreError::NonNumericIncrement {
            path: path.to_string(),
            id: id.to_string(),
            field: field.to_string(),
        });
    };
    let current = match object.get(field) {
        None | Some(Value::Null) => 0.0,
        Some(value) => value
            .as_f64()
            .ok_or_else(|| StoreError::NonNumericIncrement {
                path: path.to_string(),
                id: id.to_string(),
                field: field.to_string(),
            })?,
    };
    let updated = serde_json::Number::from_f64(current + delta)
        .map(Value::Number)
        .unwrap_or(Value::Null);
    object.insert(field.to_string(), updated);
    Ok(())
}
