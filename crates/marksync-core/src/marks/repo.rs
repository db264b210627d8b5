//! Typed access to the `marks` and reference-data collections.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::StoreError;
use crate::grading::Tier;
use crate::marks::types::{MarkFilter, MarkKey, MarkRecord, SchoolClass, Student, Subject};
use crate::storage::LocalStore;

const MARKS: &str = "marks";

/// Marks persisted in the local store.
#[derive(Debug, Clone)]
pub struct MarkRepo {
    store: LocalStore,
}

impl MarkRepo {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: &str) -> Result<Option<MarkRecord>, StoreError> {
        self.store
            .get(MARKS, json!(id))
            .await?
            .map(|v| decode(MARKS, v))
            .transpose()
    }

    pub async fn put(&self, mark: &MarkRecord) -> Result<(), StoreError> {
        self.store.put(MARKS, encode(MARKS, mark)?).await?;
        Ok(())
    }

    /// Apply `f` to the stored mark `id` atomically. `f` returns false to
    /// leave the record untouched. Returns the record as written.
    pub async fn update<F>(&self, id: &str, f: F) -> Result<Option<MarkRecord>, StoreError>
    where
        F: FnOnce(&mut MarkRecord) -> bool + Send + 'static,
    {
        let written = self
            .store
            .update(MARKS, json!(id), move |current| {
                let Some(current) = current else {
                    return Ok(None);
                };
                let mut mark: MarkRecord = decode(MARKS, current)?;
                if !f(&mut mark) {
                    return Ok(None);
                }
                encode(MARKS, &mark).map(Some)
            })
            .await?;
        written.map(|v| decode(MARKS, v)).transpose()
    }

    /// Store a local edit. A server id the stored record has learned in the
    /// meantime is carried over.
    pub async fn put_edit(&self, mark: &MarkRecord) -> Result<MarkRecord, StoreError> {
        let mut edit = mark.clone();
        let written = self
            .store
            .update(MARKS, json!(mark.id), move |current| {
                if let Some(current) = current {
                    let stored: MarkRecord = decode(MARKS, current)?;
                    if edit.remote_id.is_none() {
                        edit.remote_id = stored.remote_id;
                    }
                }
                encode(MARKS, &edit).map(Some)
            })
            .await?;
        match written {
            Some(value) => decode(MARKS, value),
            None => Ok(mark.clone()),
        }
    }

    /// Marks matching `filter`, narrowed through an index when one applies.
    pub async fn list(&self, filter: &MarkFilter) -> Result<Vec<MarkRecord>, StoreError> {
        let rows = match filter.index_hint() {
            Some((index, value)) => self.store.get_by_index(MARKS, index, json!(value)).await?,
            None => self.store.get_all(MARKS).await?,
        };
        let mut marks = Vec::with_capacity(rows.len());
        for row in rows {
            let mark: MarkRecord = decode(MARKS, row)?;
            if filter.matches(&mark) {
                marks.push(mark);
            }
        }
        Ok(marks)
    }

    /// The stored mark for `key`, if any. Local edits are preferred over a
    /// cached server copy of the same key.
    pub async fn find_by_key(&self, key: &MarkKey) -> Result<Option<MarkRecord>, StoreError> {
        let rows = self
            .store
            .get_by_index(MARKS, "studentId", json!(key.student_id))
            .await?;
        let mut found: Option<MarkRecord> = None;
        for row in rows {
            let mark: MarkRecord = decode(MARKS, row)?;
            if mark.key() != *key {
                continue;
            }
            if found.as_ref().map_or(true, |f| !f.is_local() && mark.is_local()) {
                found = Some(mark);
            }
        }
        Ok(found)
    }

    pub async fn unsynced(&self) -> Result<Vec<MarkRecord>, StoreError> {
        self.store
            .get_by_index(MARKS, "synced", json!(false))
            .await?
            .into_iter()
            .map(|v| decode(MARKS, v))
            .collect()
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        self.store.count(MARKS).await
    }

    pub async fn count_synced(&self) -> Result<usize, StoreError> {
        self.store.count_by_index(MARKS, "synced", json!(true)).await
    }
}

/// Read-through cache of students, classes and subjects.
#[derive(Debug, Clone)]
pub struct ReferenceCache {
    store: LocalStore,
}

impl ReferenceCache {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    pub async fn put_students(&self, students: &[Student]) -> Result<usize, StoreError> {
        self.put_all("students", students).await
    }

    pub async fn put_classes(&self, classes: &[SchoolClass]) -> Result<usize, StoreError> {
        self.put_all("classes", classes).await
    }

    pub async fn put_subjects(&self, subjects: &[Subject]) -> Result<usize, StoreError> {
        self.put_all("subjects", subjects).await
    }

    pub async fn class(&self, id: &str) -> Result<Option<SchoolClass>, StoreError> {
        self.get_one("classes", id).await
    }

    pub async fn subject(&self, id: &str) -> Result<Option<Subject>, StoreError> {
        self.get_one("subjects", id).await
    }

    pub async fn students_in_class(&self, class_id: &str) -> Result<Vec<Student>, StoreError> {
        self.by_index("students", "classId", class_id).await
    }

    pub async fn classes_in_year(&self, academic_year_id: &str) -> Result<Vec<SchoolClass>, StoreError> {
        self.by_index("classes", "academicYearId", academic_year_id).await
    }

    pub async fn subjects_for_tier(&self, tier: Tier) -> Result<Vec<Subject>, StoreError> {
        self.by_index("subjects", "tier", tier.as_str()).await
    }

    async fn put_all<T: Serialize>(&self, collection: &str, items: &[T]) -> Result<usize, StoreError> {
        for item in items {
            let mut doc = encode(collection, item)?;
            if let Some(obj) = doc.as_object_mut() {
                obj.insert("synced".into(), Value::Bool(true));
            }
            self.store.put(collection, doc).await?;
        }
        tracing::debug!(collection, count = items.len(), "cached reference data");
        Ok(items.len())
    }

    async fn get_one<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>, StoreError> {
        self.store
            .get(collection, json!(id))
            .await?
            .map(|v| decode(collection, v))
            .transpose()
    }

    async fn by_index<T: DeserializeOwned>(
        &self,
        collection: &str,
        index: &str,
        value: &str,
    ) -> Result<Vec<T>, StoreError> {
        self.store
            .get_by_index(collection, index, json!(value))
            .await?
            .into_iter()
            .map(|v| decode(collection, v))
            .collect()
    }
}

fn encode<T: Serialize>(collection: &str, value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Corrupt {
        collection: collection.to_string(),
        message: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(collection: &str, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Corrupt {
        collection: collection.to_string(),
        message: e.to_string(),
    })
}
