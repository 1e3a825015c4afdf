// In-memory document store.
//
// Backs tests and small single-process deployments. All state lives under
// one std mutex; the lock is never held across an await point.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

use super::{
    increment_field, merge_fields, DocumentStore, Snapshot, StoreError, WriteBatch, WriteOp,
    MAX_BATCH_OPS,
};

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, Value>>,
    watchers: HashMap<String, watch::Sender<Snapshot>>,
}

/// In-process `DocumentStore` with per-path change notification.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store mutex poisoned")
    }

    /// Apply a batch to a staged copy of the touched collections, so a
    /// failing op leaves the live data untouched.
    fn apply_batch(inner: &mut Inner, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut staged: HashMap<String, BTreeMap<String, Value>> = HashMap::new();
        for op in batch.ops() {
            staged
                .entry(op.path().to_string())
                .or_insert_with(|| inner.collections.get(op.path()).cloned().unwrap_or_default());
        }

        for op in batch.ops() {
            match op {
                WriteOp::Upsert { path, id, fields } => {
                    let collection = staged.get_mut(path).expect("staged above");
                    let doc = collection
                        .entry(id.clone())
                        .or_insert_with(|| Value::Object(Default::default()));
                    merge_fields(doc, fields);
                }
                WriteOp::Delete { path, id } => {
                    staged.get_mut(path).expect("staged above").remove(id);
                }
                WriteOp::Increment {
                    path,
                    id,
                    field,
                    delta,
                } => {
                    let collection = staged.get_mut(path).expect("staged above");
                    let doc = collection
                        .entry(id.clone())
                        .or_insert_with(|| Value::Object(Default::default()));
                    increment_field(doc, path, id, field, *delta)?;
                }
            }
        }

        for (path, collection) in staged {
            inner.collections.insert(path, collection);
        }
        Ok(())
    }

    fn notify(inner: &mut Inner, paths: &HashSet<String>) {
        for path in paths {
            if let Some(sender) = inner.watchers.get(path) {
                let docs = inner.collections.get(path).cloned().unwrap_or_default();
                sender.send_replace(Snapshot {
                    docs: Arc::new(docs),
                    loaded: true,
                });
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .collections
            .get(path)
            .and_then(|collection| collection.get(id))
            .cloned())
    }

    async fn list(&self, path: &str) -> Result<BTreeMap<String, Value>, StoreError> {
        let inner = self.lock();
        Ok(inner.collections.get(path).cloned().unwrap_or_default())
    }

    async fn upsert_merge(&self, path: &str, id: &str, fields: Value) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.upsert(path, id, fields);
        self.commit(batch).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.len() > MAX_BATCH_OPS {
            return Err(StoreError::BatchTooLarge { size: batch.len() });
        }
        let touched: HashSet<String> =
            batch.ops().iter().map(|op| op.path().to_string()).collect();

        let mut inner = self.lock();
        Self::apply_batch(&mut inner, &batch)?;
        Self::notify(&mut inner, &touched);
        Ok(())
    }

    async fn subscribe(&self, path: &str) -> Result<watch::Receiver<Snapshot>, StoreError> {
        let mut inner = self.lock();
        let initial = Snapshot {
            docs: Arc::new(inner.collections.get(path).cloned().unwrap_or_default()),
            loaded: true,
        };
        let sender = inner
            .watchers
            .entry(path.to_string())
            .or_insert_with(|| watch::channel(initial.clone()).0);
        sender.send_replace(initial);
        Ok(sender.subscribe())
    }
}
