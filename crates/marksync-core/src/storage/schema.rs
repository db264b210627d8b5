//! Named record collections and their secondary indexes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use crate::error::StoreError;

/// How an indexed JSON field is stored in its column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Text,
    Bool,
    /// RFC 3339 string in the document, microseconds since epoch in the
    /// column so ordering is numeric.
    Timestamp,
}

/// A secondary index: JSON field name → SQL column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDef {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: IndexKind,
}

const fn index(name: &'static str, column: &'static str, kind: IndexKind) -> IndexDef {
    IndexDef { name, column, kind }
}

const MARKS_INDEXES: &[IndexDef] = &[
    index("studentId", "student_id", IndexKind::Text),
    index("subjectId", "subject_id", IndexKind::Text),
    index("academicYearId", "academic_year_id", IndexKind::Text),
    index("termId", "term_id", IndexKind::Text),
    index("classId", "class_id", IndexKind::Text),
    index("synced", "synced", IndexKind::Bool),
];

const SYNC_QUEUE_INDEXES: &[IndexDef] = &[
    index("status", "status", IndexKind::Text),
    index("timestamp", "timestamp", IndexKind::Timestamp),
    index("markId", "mark_id", IndexKind::Text),
];

const STUDENTS_INDEXES: &[IndexDef] = &[index("classId", "class_id", IndexKind::Text)];

const CLASSES_INDEXES: &[IndexDef] = &[index("academicYearId", "academic_year_id", IndexKind::Text)];

const SUBJECTS_INDEXES: &[IndexDef] = &[index("tier", "tier", IndexKind::Text)];

/// The fixed set of collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Marks,
    SyncQueue,
    Students,
    Classes,
    Subjects,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Marks,
        Collection::SyncQueue,
        Collection::Students,
        Collection::Classes,
        Collection::Subjects,
    ];

    /// Public collection name.
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Marks => "marks",
            Collection::SyncQueue => "syncQueue",
            Collection::Students => "students",
            Collection::Classes => "classes",
            Collection::Subjects => "subjects",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Collection::Marks => "marks",
            Collection::SyncQueue => "sync_queue",
            Collection::Students => "students",
            Collection::Classes => "classes",
            Collection::Subjects => "subjects",
        }
    }

    pub fn indexes(&self) -> &'static [IndexDef] {
        match self {
            Collection::Marks => MARKS_INDEXES,
            Collection::SyncQueue => SYNC_QUEUE_INDEXES,
            Collection::Students => STUDENTS_INDEXES,
            Collection::Classes => CLASSES_INDEXES,
            Collection::Subjects => SUBJECTS_INDEXES,
        }
    }

    /// Whether the store assigns the primary key on insert.
    pub fn auto_increment(&self) -> bool {
        matches!(self, Collection::SyncQueue)
    }

    pub fn index(&self, name: &str) -> Result<&'static IndexDef, StoreError> {
        self.indexes()
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| StoreError::unknown_index(self.name(), name))
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collection {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| StoreError::unknown_collection(s))
    }
}

/// Convert a primary key from its JSON form.
pub(crate) fn key_to_sql(collection: Collection, key: &Value) -> Result<SqlValue, StoreError> {
    match (collection.auto_increment(), key) {
        (true, Value::Number(n)) => n
            .as_i64()
            .map(SqlValue::Integer)
            .ok_or_else(|| StoreError::Schema(format!("non-integer key {n} for {collection}"))),
        (false, Value::String(s)) if !s.is_empty() => Ok(SqlValue::Text(s.clone())),
        _ => Err(StoreError::Schema(format!(
            "invalid primary key {key} for {collection}"
        ))),
    }
}

/// Convert an indexed JSON value to its column representation.
pub(crate) fn index_value_to_sql(def: &IndexDef, value: &Value) -> Result<SqlValue, StoreError> {
    let converted = match (def.kind, value) {
        (_, Value::Null) => SqlValue::Null,
        (IndexKind::Bool, Value::Bool(b)) => SqlValue::Integer(i64::from(*b)),
        (IndexKind::Timestamp, Value::String(s)) => {
            let ts: DateTime<Utc> = DateTime::parse_from_rfc3339(s)
                .map_err(|e| StoreError::Schema(format!("index '{}': {e}", def.name)))?
                .with_timezone(&Utc);
            SqlValue::Integer(ts.timestamp_micros())
        }
        (IndexKind::Text, Value::String(s)) => SqlValue::Text(s.clone()),
        (IndexKind::Text, Value::Number(n)) => SqlValue::Text(n.to_string()),
        (_, other) => {
            return Err(StoreError::Schema(format!(
                "index '{}' cannot hold {other}",
                def.name
            )))
        }
    };
    Ok(converted)
}
