//! Mark synchronization layer.
//!
//! Local writes land in a durable [`SyncQueue`]; the [`SyncEngine`] drains it
//! FIFO to the remote marks API whenever the device is online.

pub mod merge;
pub mod remote;
pub mod retry;
pub mod sync_engine;
pub mod sync_queue;
pub mod types;

#[cfg(test)]
mod sync_engine_tests;

pub use merge::{merge_marks, resolve_conflict, MergeDecision};
pub use remote::{HttpMarksApi, MarkPayload, MarksApi, RemoteMark};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use sync_engine::{queue_action_for, SyncEngine};
pub use sync_queue::SyncQueue;
pub use types::{
    NewQueueItem, QueueAction, QueueCounts, QueueItemType, QueueStatus, SkipReason, SyncError,
    SyncQueueItem, SyncReport, SyncStatus,
};
