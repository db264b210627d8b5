//! Core types for mark synchronization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::marks::MarkRecord;

/// Lifecycle of a queue item. Only the sync engine moves items out of
/// `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Synced,
    Error,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Synced => "synced",
            QueueStatus::Error => "error",
        }
    }
}

/// Kind of entity a queue item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemType {
    Mark,
}

/// Intent recorded at enqueue time. The engine re-derives create vs. update
/// from the payload id when the item is pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueAction {
    Create,
    Update,
}

/// A pending local mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    #[serde(default)]
    pub id: i64,
    #[serde(rename = "type")]
    pub item_type: QueueItemType,
    pub action: QueueAction,
    pub payload: MarkRecord,
    /// Copy of `payload.id`, indexed for recovery lookups.
    pub mark_id: String,
    pub status: QueueStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_attempt: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
    /// False once the remote has rejected the item outright.
    #[serde(default = "default_true")]
    pub retryable: bool,
}

fn default_true() -> bool {
    true
}

/// Input to [`crate::sync::SyncQueue::enqueue`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewQueueItem {
    pub item_type: QueueItemType,
    pub action: QueueAction,
    pub payload: MarkRecord,
}

impl NewQueueItem {
    pub fn mark(action: QueueAction, payload: MarkRecord) -> Self {
        Self {
            item_type: QueueItemType::Mark,
            action,
            payload,
        }
    }
}

/// Per-status queue totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub synced: usize,
    pub error: usize,
}

/// Why a sync pass did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Offline,
    InProgress,
}

/// Outcome of one sync trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
    pub synced: usize,
    pub failed: usize,
    /// Items still awaiting a successful push after this pass.
    pub pending: usize,
    /// Items retired without a push because a newer edit already synced.
    #[serde(default)]
    pub superseded: usize,
    /// Set when any item came back 401.
    #[serde(default)]
    pub auth_required: bool,
}

impl SyncReport {
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            success: false,
            reason: Some(reason),
            ..Default::default()
        }
    }
}

/// Honest status view for UI collaborators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub online: bool,
    pub pending_count: usize,
    pub error_count: usize,
    pub total_marks: usize,
    pub synced_count: usize,
    pub unsynced_count: usize,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub in_progress: bool,
}

/// Sync error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// No connectivity at sync time. Deferred, never fatal.
    #[error("No network connectivity")]
    Offline,

    #[error("Authentication required (401)")]
    Unauthorized,

    /// 4xx other than 401. Surfaced, not retried.
    #[error("Remote rejected request ({status}): {message}")]
    RemoteRejection { status: u16, message: String },

    /// 5xx, timeout or connection failure. Retried with backoff.
    #[error("Remote unavailable{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    RemoteUnavailable { status: Option<u16>, message: String },

    #[error("Invalid remote response: {0}")]
    InvalidResponse(String),

    #[error("Invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Local store error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Whether the request layer should retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::RemoteUnavailable { .. })
    }

    /// Whether the next pass may pick the item up again.
    pub fn keeps_item_eligible(&self) -> bool {
        !matches!(
            self,
            SyncError::RemoteRejection { .. } | SyncError::InvalidResponse(_)
        )
    }
}
