use crate::infrastructure::error::InfraError;
use crate::infrastructure::query::{
    apply_select, ensure_row_id, merge_row, row_matches, upsert_match_index, Query, Store,
};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

// Write half of the emulation engine, shared by both local backends. The
// sqlite store persists each collection as one JSON array blob, the same
// shape the original kept under a single local-storage key.

fn insert_rows(rows: &mut Vec<Value>, incoming: Vec<Value>) -> Vec<Value> {
    let mut inserted = Vec::with_capacity(incoming.len());
    for mut row in incoming {
        ensure_row_id(&mut row);
        rows.push(row.clone());
        inserted.push(row);
    }
    inserted
}

fn update_rows(rows: &mut [Value], query: &Query, patch: &Value) -> Vec<Value> {
    let mut patched = Vec::new();
    for row in rows.iter_mut() {
        if row_matches(row, query.filters()) {
            merge_row(row, patch);
            patched.push(row.clone());
        }
    }
    patched
}

fn delete_rows(rows: &mut Vec<Value>, query: &Query) -> usize {
    let before = rows.len();
    rows.retain(|row| !row_matches(row, query.filters()));
    before - rows.len()
}

fn upsert_rows(rows: &mut Vec<Value>, incoming: Vec<Value>, fallback_key: Option<&str>) -> Vec<Value> {
    let mut stored = Vec::with_capacity(incoming.len());
    for mut row in incoming {
        match upsert_match_index(rows, &row, fallback_key) {
            Some(index) => {
                merge_row(&mut rows[index], &row);
                stored.push(rows[index].clone());
            }
            None => {
                ensure_row_id(&mut row);
                rows.push(row.clone());
                stored.push(row);
            }
        }
    }
    stored
}

/// Offline fallback store: replays the remote query semantics against JSON
/// collection blobs in a local sqlite file.
#[derive(Debug, Clone)]
pub struct SqliteLocalStore {
    db_path: PathBuf,
}

impl SqliteLocalStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }

    fn read_collection(connection: &Connection, name: &str) -> Result<Vec<Value>, InfraError> {
        let raw: Option<String> = connection
            .query_row(
                "SELECT rows FROM collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        let Some(raw) = raw else {
            return Ok(Vec::new());
        };
        let parsed: Value = serde_json::from_str(&raw)?;
        match parsed {
            Value::Array(rows) => Ok(rows),
            _ => Err(InfraError::Store(format!(
                "collection {name} is not a JSON array"
            ))),
        }
    }

    fn write_collection(
        connection: &Connection,
        name: &str,
        rows: &[Value],
    ) -> Result<(), InfraError> {
        let serialized = serde_json::to_string(rows)?;
        connection.execute(
            "INSERT INTO collections (name, rows)
             VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET rows = excluded.rows",
            params![name, serialized],
        )?;
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteLocalStore {
    async fn select(&self, collection: &str, query: &Query) -> Result<Vec<Value>, InfraError> {
        let connection = self.connect()?;
        let rows = Self::read_collection(&connection, collection)?;
        Ok(apply_select(&rows, query))
    }

    async fn insert(&self, collection: &str, rows: Vec<Value>) -> Result<Vec<Value>, InfraError> {
        let connection = self.connect()?;
        let mut stored = Self::read_collection(&connection, collection)?;
        let inserted = insert_rows(&mut stored, rows);
        Self::write_collection(&connection, collection, &stored)?;
        Ok(inserted)
    }

    async fn update(
        &self,
        collection: &str,
        query: &Query,
        patch: Value,
    ) -> Result<Vec<Value>, InfraError> {
        let connection = self.connect()?;
        let mut stored = Self::read_collection(&connection, collection)?;
        let patched = update_rows(&mut stored, query, &patch);
        Self::write_collection(&connection, collection, &stored)?;
        Ok(patched)
    }

    async fn delete(&self, collection: &str, query: &Query) -> Result<usize, InfraError> {
        let connection = self.connect()?;
        let mut stored = Self::read_collection(&connection, collection)?;
        let removed = delete_rows(&mut stored, query);
        Self::write_collection(&connection, collection, &stored)?;
        Ok(removed)
    }

    async fn upsert(
        &self,
        collection: &str,
        rows: Vec<Value>,
        fallback_key: Option<&str>,
    ) -> Result<Vec<Value>, InfraError> {
        let connection = self.connect()?;
        let mut stored = Self::read_collection(&connection, collection)?;
        let result = upsert_rows(&mut stored, rows, fallback_key);
        Self::write_collection(&connection, collection, &stored)?;
        Ok(result)
    }
}

/// Same semantics without any disk; used by tests and as the seed state for
/// fresh workspaces.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: Mutex<HashMap<String, Vec<Value>>>,
}

impl InMemoryStore {
    fn with_collection<T>(
        &self,
        collection: &str,
        operation: impl FnOnce(&mut Vec<Value>) -> T,
    ) -> Result<T, InfraError> {
        let mut collections = self
            .collections
            .lock()
            .map_err(|error| InfraError::Store(format!("collection lock poisoned: {error}")))?;
        Ok(operation(collections.entry(collection.to_string()).or_default()))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn select(&self, collection: &str, query: &Query) -> Result<Vec<Value>, InfraError> {
        self.with_collection(collection, |rows| apply_select(rows, query))
    }

    async fn insert(&self, collection: &str, rows: Vec<Value>) -> Result<Vec<Value>, InfraError> {
        self.with_collection(collection, |stored| insert_rows(stored, rows))
    }

    async fn update(
        &self,
        collection: &str,
        query: &Query,
        patch: Value,
    ) -> Result<Vec<Value>, InfraError> {
        self.with_collection(collection, |stored| update_rows(stored, query, &patch))
    }

    async fn delete(&self, collection: &str, query: &Query) -> Result<usize, InfraError> {
        self.with_collection(collection, |stored| delete_rows(stored, query))
    }

    async fn upsert(
        &self,
        collection: &str,
        rows: Vec<Value>,
        fallback_key: Option<&str>,
    ) -> Result<Vec<Value>, InfraError> {
        self.with_collection(collection, |stored| upsert_rows(stored, rows, fallback_key))
    }
}
