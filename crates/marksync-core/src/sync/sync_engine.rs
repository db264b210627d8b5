//! Sync engine: drains the queue to the remote marks API.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::marks::{MarkRecord, MarkRepo};
use crate::network::NetworkMonitor;
use crate::storage::LocalStore;
use crate::sync::remote::{MarkPayload, MarksApi, RemoteMark};
use crate::sync::sync_queue::SyncQueue;
use crate::sync::types::{
    NewQueueItem, QueueAction, QueueStatus, SkipReason, SyncError, SyncQueueItem, SyncReport,
};

/// Pushes queued mark writes to the server, one pass at a time.
pub struct SyncEngine {
    queue: SyncQueue,
    marks: MarkRepo,
    api: Arc<dyn MarksApi>,
    monitor: Arc<NetworkMonitor>,
    max_attempts: u32,
    in_flight: tokio::sync::Mutex<()>,
    last_sync_at: Mutex<Option<DateTime<Utc>>>,
}

impl SyncEngine {
    pub fn new(
        store: LocalStore,
        api: Arc<dyn MarksApi>,
        monitor: Arc<NetworkMonitor>,
        max_attempts: u32,
    ) -> Self {
        Self {
            queue: SyncQueue::new(store.clone()),
            marks: MarkRepo::new(store),
            api,
            monitor,
            max_attempts,
            in_flight: tokio::sync::Mutex::new(()),
            last_sync_at: Mutex::new(None),
        }
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    pub fn is_syncing(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// When the last pass finished.
    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        match self.last_sync_at.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Run one sync pass.
    ///
    /// Offline, or with a pass already running, this returns at once without
    /// touching any queue item. Remote failures are recorded per item and
    /// never abort the pass; only local store failures are returned as errors.
    pub async fn sync_pending(&self) -> Result<SyncReport, StoreError> {
        if !self.monitor.is_online() {
            tracing::debug!("sync skipped: offline");
            return Ok(SyncReport::skipped(SkipReason::Offline));
        }
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::debug!("sync skipped: pass already in flight");
            return Ok(SyncReport::skipped(SkipReason::InProgress));
        };

        let items = self.queue.get_eligible(self.max_attempts).await?;
        tracing::info!(items = items.len(), "sync pass started");

        let mut report = SyncReport {
            success: true,
            ..Default::default()
        };
        // marks whose earlier edit failed this pass; later edits wait behind it
        let mut held: HashSet<String> = HashSet::new();
        for item in items {
            if held.contains(&item.mark_id) {
                tracing::debug!(queue_id = item.id, mark_id = %item.mark_id, "held behind a failed edit");
                continue;
            }
            let stored = self.marks.get(&item.payload.id).await?;
            if stored
                .as_ref()
                .is_some_and(|m| m.synced && m.timestamp > item.payload.timestamp)
            {
                tracing::debug!(queue_id = item.id, mark_id = %item.mark_id, "superseded by a newer synced edit");
                self.queue.update_status(item.id, QueueStatus::Synced, None).await?;
                report.superseded += 1;
                continue;
            }
            let learned = stored.and_then(|m| m.remote_id);
            match self.push(&item, learned.as_deref()).await {
                Ok(remote) => {
                    self.queue.update_status(item.id, QueueStatus::Synced, None).await?;
                    self.mark_synced(&item, remote).await?;
                    report.synced += 1;
                }
                Err(SyncError::Store(err)) => return Err(err),
                Err(err) => {
                    tracing::warn!(queue_id = item.id, mark_id = %item.mark_id, error = %err, "sync item failed");
                    if matches!(err, SyncError::Unauthorized) {
                        report.auth_required = true;
                    }
                    self.queue.record_failure(item.id, &err).await?;
                    held.insert(item.mark_id.clone());
                    report.failed += 1;
                }
            }
        }

        report.pending = self.queue.get_eligible(self.max_attempts).await?.len();
        report.success = report.failed == 0;
        self.set_last_sync_at(Utc::now());
        tracing::info!(
            synced = report.synced,
            failed = report.failed,
            pending = report.pending,
            "sync pass finished"
        );
        Ok(report)
    }

    /// Push one item. A payload without a server id of its own is sent as
    /// an update against `learned`, the id its stored record already holds.
    async fn push(&self, item: &SyncQueueItem, learned: Option<&str>) -> Result<RemoteMark, SyncError> {
        let payload = MarkPayload::from(&item.payload);
        match item.payload.remote_target().or(learned) {
            Some(remote_id) => {
                tracing::debug!(queue_id = item.id, remote_id, "updating remote mark");
                self.api.update_mark(remote_id, &payload).await
            }
            None => {
                tracing::debug!(queue_id = item.id, "creating remote mark");
                self.api.create_mark(&payload).await
            }
        }
    }

    /// Record the server acknowledgement on the stored mark in one store
    /// transaction. The synced flag only flips when the stored record is not
    /// newer than what was sent.
    async fn mark_synced(&self, item: &SyncQueueItem, remote: RemoteMark) -> Result<(), StoreError> {
        let sent_at = item.payload.timestamp;
        let remote_id = remote.id;
        self.marks
            .update(&item.payload.id, move |stored| {
                let mut changed = false;
                if stored.is_local() && stored.remote_id.is_none() {
                    stored.remote_id = Some(remote_id);
                    changed = true;
                }
                if stored.timestamp <= sent_at {
                    stored.synced = true;
                    stored.synced_at = Some(Utc::now());
                    changed = true;
                }
                changed
            })
            .await?;
        Ok(())
    }

    /// Re-enqueue unsynced marks that have no open queue entry, e.g. after a
    /// crash between the mark write and its enqueue. Returns how many.
    pub async fn recover_orphans(&self) -> Result<usize, StoreError> {
        let mut recovered = 0;
        for mark in self.marks.unsynced().await? {
            if self.queue.has_open_entry_for(&mark.id).await? {
                continue;
            }
            let action = queue_action_for(&mark);
            self.queue.enqueue(NewQueueItem::mark(action, mark)).await?;
            recovered += 1;
        }
        if recovered > 0 {
            tracing::info!(recovered, "re-enqueued unsynced marks");
        }
        Ok(recovered)
    }

    #[cfg(test)]
    pub(crate) async fn hold_for_test(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.in_flight.lock().await
    }

    fn set_last_sync_at(&self, at: DateTime<Utc>) {
        match self.last_sync_at.lock() {
            Ok(mut guard) => *guard = Some(at),
            Err(poisoned) => *poisoned.into_inner() = Some(at),
        }
    }
}

/// Create for marks the server has never seen, update otherwise.
pub fn queue_action_for(mark: &MarkRecord) -> QueueAction {
    if mark.remote_target().is_some() {
        QueueAction::Update
    } else {
        QueueAction::Create
    }
}
