//! Durable FIFO queue of local mutations awaiting sync.

use chrono::{Duration, Utc};
use serde_json::{json, Value};

use crate::error::StoreError;
use crate::storage::{Collection, LocalStore};
use crate::sync::types::{NewQueueItem, QueueCounts, QueueStatus, SyncError, SyncQueueItem};

const QUEUE: &str = "syncQueue";

/// Sync queue persisted in the `syncQueue` collection.
#[derive(Debug, Clone)]
pub struct SyncQueue {
    store: LocalStore,
}

impl SyncQueue {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Append an item with status=pending, attempts=0, timestamp=now.
    /// Returns the assigned queue id.
    pub async fn enqueue(&self, item: NewQueueItem) -> Result<i64, StoreError> {
        let entry = SyncQueueItem {
            id: 0,
            item_type: item.item_type,
            action: item.action,
            mark_id: item.payload.id.clone(),
            payload: item.payload,
            status: QueueStatus::Pending,
            timestamp: Utc::now(),
            attempts: 0,
            last_attempt: None,
            error: None,
            retryable: true,
        };
        let mut doc = encode(&entry)?;
        if let Some(obj) = doc.as_object_mut() {
            obj.remove("id");
        }
        let stored = self.store.put(QUEUE, doc).await?;
        let id = stored
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| corrupt("enqueue did not assign an id"))?;
        tracing::debug!(id, mark_id = %entry.mark_id, action = ?entry.action, "enqueued");
        Ok(id)
    }

    pub async fn get(&self, id: i64) -> Result<Option<SyncQueueItem>, StoreError> {
        self.store
            .get(QUEUE, json!(id))
            .await?
            .map(decode)
            .transpose()
    }

    /// Pending items, oldest first.
    pub async fn get_pending(&self) -> Result<Vec<SyncQueueItem>, StoreError> {
        let mut items = self.by_status(QueueStatus::Pending).await?;
        sort_fifo(&mut items);
        Ok(items)
    }

    /// Items a sync pass should attempt: pending items plus retryable error
    /// items with fewer than `max_attempts` attempts, oldest first.
    pub async fn get_eligible(&self, max_attempts: u32) -> Result<Vec<SyncQueueItem>, StoreError> {
        let mut items = self.by_status(QueueStatus::Pending).await?;
        items.extend(
            self.by_status(QueueStatus::Error)
                .await?
                .into_iter()
                .filter(|i| i.retryable && i.attempts < max_attempts),
        );
        sort_fifo(&mut items);
        Ok(items)
    }

    /// Transition an item's status and count the attempt. A synced item has
    /// its error cleared.
    pub async fn update_status(
        &self,
        id: i64,
        status: QueueStatus,
        error: Option<String>,
    ) -> Result<SyncQueueItem, StoreError> {
        self.transition(id, status, error, true).await
    }

    /// Record a failed push. Items the remote rejected outright stop being
    /// eligible for automatic retry.
    pub async fn record_failure(&self, id: i64, err: &SyncError) -> Result<SyncQueueItem, StoreError> {
        self.transition(
            id,
            QueueStatus::Error,
            Some(err.to_string()),
            err.keeps_item_eligible(),
        )
        .await
    }

    async fn transition(
        &self,
        id: i64,
        status: QueueStatus,
        error: Option<String>,
        retryable: bool,
    ) -> Result<SyncQueueItem, StoreError> {
        let mut item = self
            .get(id)
            .await?
            .ok_or_else(|| corrupt(&format!("queue item {id} not found")))?;
        item.status = status;
        item.attempts += 1;
        item.last_attempt = Some(Utc::now());
        item.retryable = retryable;
        item.error = match status {
            QueueStatus::Synced => None,
            _ => error,
        };
        self.store.put(QUEUE, encode(&item)?).await?;
        Ok(item)
    }

    pub async fn counts(&self) -> Result<QueueCounts, StoreError> {
        let count = |status: QueueStatus| {
            self.store
                .count_by_index(QUEUE, "status", json!(status.as_str()))
        };
        Ok(QueueCounts {
            pending: count(QueueStatus::Pending).await?,
            synced: count(QueueStatus::Synced).await?,
            error: count(QueueStatus::Error).await?,
        })
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        self.store.count(QUEUE).await
    }

    /// True when `mark_id` has an entry that a future pass will still push.
    pub async fn has_open_entry_for(&self, mark_id: &str) -> Result<bool, StoreError> {
        let entries = self.store.get_by_index(QUEUE, "markId", json!(mark_id)).await?;
        for entry in entries {
            let item = decode(entry)?;
            let open = match item.status {
                QueueStatus::Pending => true,
                QueueStatus::Error => item.retryable,
                QueueStatus::Synced => false,
            };
            if open {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Move synced items whose last attempt is older than `retention` into
    /// the archive. Pending and error items are never touched.
    pub async fn compact(&self, retention: Duration) -> Result<usize, StoreError> {
        let cutoff = Utc::now() - retention;
        let ids: Vec<i64> = self
            .by_status(QueueStatus::Synced)
            .await?
            .into_iter()
            .filter(|i| i.last_attempt.unwrap_or(i.timestamp) < cutoff)
            .map(|i| i.id)
            .collect();
        let moved = self.store.archive_queue_items(ids).await?;
        if moved > 0 {
            tracing::info!(moved, "compacted sync queue");
        }
        Ok(moved)
    }

    async fn by_status(&self, status: QueueStatus) -> Result<Vec<SyncQueueItem>, StoreError> {
        self.store
            .get_by_index(QUEUE, "status", json!(status.as_str()))
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }
}

fn sort_fifo(items: &mut [SyncQueueItem]) {
    items.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
}

fn encode(item: &SyncQueueItem) -> Result<Value, StoreError> {
    serde_json::to_value(item).map_err(|e| corrupt(&e.to_string()))
}

fn decode(value: Value) -> Result<SyncQueueItem, StoreError> {
    serde_json::from_value(value).map_err(|e| corrupt(&e.to_string()))
}

fn corrupt(message: &str) -> StoreError {
    StoreError::Corrupt {
        collection: Collection::SyncQueue.name().to_string(),
        message: message.to_string(),
    }
}
