// SQLite-backed document store.
//
// Documents live in a single table keyed (path, id) with a JSON body
// column; an atomic batch is one transaction. Pass ":memory:" for an
// ephemeral database (useful for tests).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::watch;

use super::{
    increment_field, merge_fields, DocumentStore, Snapshot, StoreError, WriteBatch, WriteOp,
    MAX_BATCH_OPS,
};

pub struct SqliteStore {
    conn: Mutex<Connection>,
    watchers: Mutex<HashMap<String, watch::Sender<Snapshot>>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                path TEXT NOT NULL,
                id   TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (path, id)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_path ON documents(path);
            ",
        )?;

        Ok(SqliteStore {
            conn: Mutex::new(conn),
            watchers: Mutex::new(HashMap::new()),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("sqlite store mutex poisoned")
    }

    fn read_doc(conn: &Connection, path: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE path = ?1 AND id = ?2",
                params![path, id],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn write_doc(conn: &Connection, path: &str, id: &str, doc: &Value) -> Result<(), StoreError> {
        conn.execute(
            "INSERT OR REPLACE INTO documents (path, id, body) VALUES (?1, ?2, ?3)",
            params![path, id, serde_json::to_string(doc)?],
        )?;
        Ok(())
    }

    fn list_docs(conn: &Connection, path: &str) -> Result<BTreeMap<String, Value>, StoreError> {
        let mut stmt =
            conn.prepare("SELECT id, body FROM documents WHERE path = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![path], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut docs = BTreeMap::new();
        for row in rows {
            let (id, body) = row?;
            docs.insert(id, serde_json::from_str(&body)?);
        }
        Ok(docs)
    }

    /// Push fresh snapshots to every watcher of a touched path. Called with
    /// the connection still locked so notifications reflect the committed
    /// state exactly.
    fn notify(&self, conn: &Connection, touched: &HashSet<String>) -> Result<(), StoreError> {
        let watchers = self.watchers.lock().expect("watcher mutex poisoned");
        for path in touched {
            if let Some(sender) = watchers.get(path) {
                sender.send_replace(Snapshot {
                    docs: Arc::new(Self::list_docs(conn, path)?),
                    loaded: true,
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, path: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let conn = self.conn();
        Self::read_doc(&conn, path, id)
    }

    async fn list(&self, path: &str) -> Result<BTreeMap<String, Value>, StoreError> {
        let conn = self.conn();
        Self::list_docs(&conn, path)
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

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for op in batch.ops() {
            match op {
                WriteOp::Upsert { path, id, fields } => {
                    let mut doc = Self::read_doc(&tx, path, id)?
                        .unwrap_or_else(|| Value::Object(Default::default()));
                    merge_fields(&mut doc, fields);
                    Self::write_doc(&tx, path, id, &doc)?;
                }
                WriteOp::Delete { path, id } => {
                    tx.execute(
                        "DELETE FROM documents WHERE path = ?1 AND id = ?2",
                        params![path, id],
                    )?;
                }
                WriteOp::Increment {
                    path,
                    id,
                    field,
                    delta,
                } => {
                    let mut doc = Self::read_doc(&tx, path, id)?
                        .unwrap_or_else(|| Value::Object(Default::default()));
                    increment_field(&mut doc, path, id, field, *delta)?;
                    Self::write_doc(&tx, path, id, &doc)?;
                }
            }
        }
        tx.commit()?;

        self.notify(&conn, &touched)
    }

    async fn subscribe(&self, path: &str) -> Result<watch::Receiver<Snapshot>, StoreError> {
        let conn = self.conn();
        let initial = Snapshot {
            docs: Arc::new(Self::list_docs(&conn, path)?),
            loaded: true,
        };
        drop(conn);

        let mut watchers = self.watchers.lock().expect("watcher mutex poisoned");
        let sender = watchers
            .entry(path.to_string())
            .or_insert_with(|| watch::channel(initial.clone()).0);
        sender.send_replace(initial);
        Ok(sender.subscribe())
    }
}
