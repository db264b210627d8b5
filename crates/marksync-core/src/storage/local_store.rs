//! SQLite-backed document store organized into named collections.
//!
//! Every record is a JSON document stored in a `body` column; the fields a
//! collection indexes are copied into their own columns on each `put`.
//! All public operations are async and funnel through [`LocalStore::call`],
//! which runs the blocking SQLite work on tokio's blocking pool.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::OnceCell;

use super::migrations;
use super::schema::{index_value_to_sql, key_to_sql, Collection};
use crate::error::StoreError;

/// Handle to the local store. Cloning is cheap and shares the connection.
#[derive(Clone)]
pub struct LocalStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore").field("path", &self.path).finish()
    }
}

impl LocalStore {
    /// Open (creating if needed) the store at `path` and migrate it.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        if path.is_some() {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
        }
        migrations::migrate(&conn).map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        tracing::debug!(path = ?path, "local store ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// True when both handles share one underlying connection.
    pub fn same_handle(&self, other: &LocalStore) -> bool {
        Arc::ptr_eq(&self.conn, &other.conn)
    }

    /// Run a blocking closure against the connection on the blocking pool.
    pub async fn call<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Worker("connection mutex poisoned".into()))?;
            f(&mut *guard)
        })
        .await?
    }

    /// Upsert `record` by primary key and return it as stored.
    ///
    /// For auto-increment collections a record without an `id` is inserted
    /// and the assigned id is written back into the document.
    pub async fn put(&self, collection: &str, record: Value) -> Result<Value, StoreError> {
        let collection: Collection = collection.parse()?;
        self.call(move |conn| put_record(conn, collection, record)).await
    }

    /// Read, change and write one record in a single transaction.
    ///
    /// `f` receives the stored record (`None` when absent) and returns the
    /// replacement, or `None` to leave the row untouched. Returns what was
    /// written.
    pub async fn update<F>(
        &self,
        collection: &str,
        key: Value,
        f: F,
    ) -> Result<Option<Value>, StoreError>
    where
        F: FnOnce(Option<Value>) -> Result<Option<Value>, StoreError> + Send + 'static,
    {
        let collection: Collection = collection.parse()?;
        let key = key_to_sql(collection, &key)?;
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let sql = format!("SELECT body FROM {} WHERE id = ?1", collection.table());
            let body: Option<String> = tx.query_row(&sql, [key], |row| row.get(0)).optional()?;
            let current = body.map(|b| decode(collection, &b)).transpose()?;
            let Some(next) = f(current)? else {
                return Ok(None);
            };
            let written = write_record(&tx, collection, next)?;
            tx.commit()?;
            Ok(Some(written))
        })
        .await
    }

    /// Fetch one record by primary key.
    pub async fn get(&self, collection: &str, key: Value) -> Result<Option<Value>, StoreError> {
        let collection: Collection = collection.parse()?;
        let key = key_to_sql(collection, &key)?;
        self.call(move |conn| {
            let sql = format!("SELECT body FROM {} WHERE id = ?1", collection.table());
            let body: Option<String> = conn
                .query_row(&sql, [key], |row| row.get(0))
                .optional()?;
            body.map(|b| decode(collection, &b)).transpose()
        })
        .await
    }

    /// All records in primary-key order.
    pub async fn get_all(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        let collection: Collection = collection.parse()?;
        self.call(move |conn| {
            let sql = format!("SELECT body FROM {} ORDER BY id", collection.table());
            query_bodies(conn, collection, &sql, Vec::new())
        })
        .await
    }

    /// Records whose indexed field equals `value`, in primary-key order.
    pub async fn get_by_index(
        &self,
        collection: &str,
        index_name: &str,
        value: Value,
    ) -> Result<Vec<Value>, StoreError> {
        let collection: Collection = collection.parse()?;
        let def = collection.index(index_name)?;
        let bound = index_value_to_sql(def, &value)?;
        self.call(move |conn| {
            let sql = format!(
                "SELECT body FROM {} WHERE {} IS ?1 ORDER BY id",
                collection.table(),
                def.column
            );
            query_bodies(conn, collection, &sql, vec![bound])
        })
        .await
    }

    /// Delete by primary key. Returns whether a record was removed.
    pub async fn delete(&self, collection: &str, key: Value) -> Result<bool, StoreError> {
        let collection: Collection = collection.parse()?;
        let key = key_to_sql(collection, &key)?;
        self.call(move |conn| {
            let sql = format!("DELETE FROM {} WHERE id = ?1", collection.table());
            Ok(conn.execute(&sql, [key])? > 0)
        })
        .await
    }

    pub async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let collection: Collection = collection.parse()?;
        self.call(move |conn| {
            let sql = format!("SELECT COUNT(*) FROM {}", collection.table());
            let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(n as usize)
        })
        .await
    }

    pub async fn count_by_index(
        &self,
        collection: &str,
        index_name: &str,
        value: Value,
    ) -> Result<usize, StoreError> {
        let collection: Collection = collection.parse()?;
        let def = collection.index(index_name)?;
        let bound = index_value_to_sql(def, &value)?;
        self.call(move |conn| {
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE {} IS ?1",
                collection.table(),
                def.column
            );
            let n: i64 = conn.query_row(&sql, [bound], |row| row.get(0))?;
            Ok(n as usize)
        })
        .await
    }

    /// Move queue entries into `sync_queue_archive` and drop them from the
    /// live queue, in one transaction. Returns the number moved.
    pub async fn archive_queue_items(&self, ids: Vec<i64>) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let archived_at = Utc::now().to_rfc3339();
            let mut moved = 0;
            for id in &ids {
                let copied = tx.execute(
                    "INSERT OR REPLACE INTO sync_queue_archive (id, body, archived_at)
                     SELECT id, body, ?2 FROM sync_queue WHERE id = ?1",
                    params![id, archived_at],
                )?;
                if copied > 0 {
                    tx.execute("DELETE FROM sync_queue WHERE id = ?1", [id])?;
                    moved += 1;
                }
            }
            tx.commit()?;
            Ok(moved)
        })
        .await
    }

    pub async fn archived_queue_count(&self) -> Result<usize, StoreError> {
        self.call(|conn| {
            let n: i64 =
                conn.query_row("SELECT COUNT(*) FROM sync_queue_archive", [], |row| row.get(0))?;
            Ok(n as usize)
        })
        .await
    }
}

fn decode(collection: Collection, body: &str) -> Result<Value, StoreError> {
    serde_json::from_str(body).map_err(|e| StoreError::Corrupt {
        collection: collection.name().to_string(),
        message: e.to_string(),
    })
}

fn query_bodies(
    conn: &Connection,
    collection: Collection,
    sql: &str,
    bound: Vec<SqlValue>,
) -> Result<Vec<Value>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(bound), |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for body in rows {
        out.push(decode(collection, &body?)?);
    }
    Ok(out)
}

fn put_record(
    conn: &mut Connection,
    collection: Collection,
    record: Value,
) -> Result<Value, StoreError> {
    let tx = conn.transaction()?;
    let written = write_record(&tx, collection, record)?;
    tx.commit()?;
    Ok(written)
}

fn write_record(
    tx: &Connection,
    collection: Collection,
    mut record: Value,
) -> Result<Value, StoreError> {
    let obj = record
        .as_object()
        .ok_or_else(|| StoreError::Schema(format!("{collection} records must be JSON objects")))?;

    let mut columns = Vec::with_capacity(collection.indexes().len());
    let mut values = Vec::with_capacity(collection.indexes().len());
    for def in collection.indexes() {
        columns.push(def.column);
        values.push(index_value_to_sql(def, obj.get(def.name).unwrap_or(&Value::Null))?);
    }

    let key = match obj.get("id") {
        None | Some(Value::Null) if collection.auto_increment() => None,
        Some(k) => Some(key_to_sql(collection, k)?),
        None => {
            return Err(StoreError::Schema(format!(
                "{collection} records need an 'id'"
            )))
        }
    };

    let table = collection.table();
    let updates = columns
        .iter()
        .map(|c| format!("{c} = excluded.{c}"))
        .chain(std::iter::once("body = excluded.body".to_string()))
        .collect::<Vec<_>>()
        .join(", ");
    let body = serde_json::to_string(&record).map_err(|e| StoreError::Corrupt {
        collection: collection.name().to_string(),
        message: e.to_string(),
    })?;

    match key {
        Some(key) => {
            let placeholders = (1..=columns.len() + 2)
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "INSERT INTO {table} (id, {}, body) VALUES ({placeholders})
                 ON CONFLICT(id) DO UPDATE SET {updates}",
                columns.join(", ")
            );
            let mut bound = Vec::with_capacity(values.len() + 2);
            bound.push(key);
            bound.extend(values);
            bound.push(SqlValue::Text(body));
            tx.execute(&sql, params_from_iter(bound))?;
        }
        None => {
            let placeholders = (1..=columns.len() + 1)
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "INSERT INTO {table} ({}, body) VALUES ({placeholders})",
                columns.join(", ")
            );
            let mut bound = values;
            bound.push(SqlValue::Text(body));
            tx.execute(&sql, params_from_iter(bound))?;

            let id = tx.last_insert_rowid();
            if let Some(obj) = record.as_object_mut() {
                obj.insert("id".to_string(), Value::from(id));
            }
            let body = serde_json::to_string(&record).map_err(|e| StoreError::Corrupt {
                collection: collection.name().to_string(),
                message: e.to_string(),
            })?;
            tx.execute(
                &format!("UPDATE {table} SET body = ?1 WHERE id = ?2"),
                params![body, id],
            )?;
        }
    }

    Ok(record)
}

/// Where a lazily opened store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    Memory,
}

/// Lazily opened store shared by everything that needs one.
///
/// Concurrent callers of [`StoreCell::get`] all receive the same handle; the
/// store is opened and migrated exactly once.
#[derive(Debug)]
pub struct StoreCell {
    location: StoreLocation,
    cell: OnceCell<LocalStore>,
}

impl StoreCell {
    pub fn new(location: StoreLocation) -> Self {
        Self {
            location,
            cell: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<LocalStore, StoreError> {
        let store = self
            .cell
            .get_or_try_init(|| async {
                let location = self.location.clone();
                tokio::task::spawn_blocking(move || match location {
                    StoreLocation::File(path) => LocalStore::open(&path),
                    StoreLocation::Memory => LocalStore::open_in_memory(),
                })
                .await?
            })
            .await?;
        Ok(store.clone())
    }
}
