//! Tests for sync_engine module.

#[cfg(test)]
mod tests {
    use super::super::sync_engine::*;
    use crate::grading::Grade;
    use crate::marks::{new_local_id, MarkFilter, MarkRecord, MarkRepo};
    use crate::network::NetworkMonitor;
    use crate::storage::LocalStore;
    use crate::sync::remote::{MarkPayload, MarksApi, RemoteMark};
    use crate::sync::types::{NewQueueItem, QueueStatus, SkipReason, SyncError};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Create(f64),
        Update(String, f64),
    }

    /// In-memory server. Responses can be scripted per call.
    #[derive(Default)]
    struct FakeApi {
        calls: Mutex<Vec<Call>>,
        failures: Mutex<VecDeque<Option<SyncError>>>,
        next_id: Mutex<u32>,
        /// A local edit written while the next create is in flight.
        edit_during_create: Mutex<Option<(MarkRepo, MarkRecord)>>,
    }

    impl FakeApi {
        fn script(&self, outcomes: Vec<Option<SyncError>>) {
            self.failures.lock().unwrap().extend(outcomes);
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn respond(&self, id: String, payload: &MarkPayload) -> Result<RemoteMark, SyncError> {
            if let Some(Some(err)) = self.failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            Ok(RemoteMark {
                id,
                student_id: payload.student_id.clone(),
                subject_id: payload.subject_id.clone(),
                exam_id: payload.exam_id.clone(),
                academic_year_id: payload.academic_year_id.clone(),
                term_id: payload.term_id.clone(),
                class_id: payload.class_id.clone(),
                marks_obtained: payload.marks_obtained,
                grade: payload.grade,
                points: payload.points,
                updated_at: None,
            })
        }
    }

    #[async_trait]
    impl MarksApi for FakeApi {
        async fn create_mark(&self, payload: &MarkPayload) -> Result<RemoteMark, SyncError> {
            self.calls.lock().unwrap().push(Call::Create(payload.marks_obtained));
            let edit = self.edit_during_create.lock().unwrap().take();
            if let Some((repo, mark)) = edit {
                repo.put_edit(&mark).await.unwrap();
            }
            let id = {
                let mut next = self.next_id.lock().unwrap();
                *next += 1;
                format!("srv-{next}")
            };
            self.respond(id, payload)
        }

        async fn update_mark(&self, id: &str, payload: &MarkPayload) -> Result<RemoteMark, SyncError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Update(id.to_string(), payload.marks_obtained));
            self.respond(id.to_string(), payload)
        }

        async fn fetch_marks(&self, _filter: &MarkFilter) -> Result<Vec<RemoteMark>, SyncError> {
            Ok(Vec::new())
        }
    }

    struct Harness {
        engine: SyncEngine,
        api: Arc<FakeApi>,
        monitor: Arc<NetworkMonitor>,
        marks: MarkRepo,
    }

    fn harness(online: bool) -> Harness {
        let store = LocalStore::open_in_memory().unwrap();
        let api = Arc::new(FakeApi::default());
        let monitor = Arc::new(NetworkMonitor::new(online));
        let engine = SyncEngine::new(store.clone(), api.clone(), monitor.clone(), 5);
        Harness {
            engine,
            api,
            monitor,
            marks: MarkRepo::new(store),
        }
    }

    fn mark(id: &str, subject: &str, value: f64) -> MarkRecord {
        MarkRecord {
            id: id.to_string(),
            student_id: "st-1".into(),
            subject_id: subject.into(),
            exam_id: "mid".into(),
            academic_year_id: "2026".into(),
            term_id: "t1".into(),
            class_id: "s2".into(),
            marks_obtained: value,
            grade: Grade::B,
            points: 2,
            timestamp: Utc::now(),
            synced: false,
            synced_at: None,
            remote_id: None,
        }
    }

    /// Write the mark and queue it, as the capture service does.
    async fn record(h: &Harness, mark: MarkRecord) {
        h.marks.put(&mark).await.unwrap();
        h.engine
            .queue()
            .enqueue(NewQueueItem::mark(queue_action_for(&mark), mark))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_offline_pass_touches_nothing() {
        let h = harness(false);
        record(&h, mark(&new_local_id(), "math", 70.0)).await;

        let report = h.engine.sync_pending().await.unwrap();
        assert!(!report.success);
        assert_eq!(report.reason, Some(SkipReason::Offline));
        assert!(h.api.calls().is_empty());

        let pending = h.engine.queue().get_pending().await.unwrap();
        assert_eq!(pending[0].attempts, 0);
        assert!(pending[0].last_attempt.is_none());
    }

    #[tokio::test]
    async fn test_pass_syncs_and_flips_flags() {
        let h = harness(true);
        let id = new_local_id();
        record(&h, mark(&id, "math", 70.0)).await;

        let report = h.engine.sync_pending().await.unwrap();
        assert!(report.success);
        assert_eq!((report.synced, report.failed, report.pending), (1, 0, 0));
        assert!(h.engine.last_sync_at().is_some());

        let stored = h.marks.get(&id).await.unwrap().unwrap();
        assert!(stored.synced);
        assert!(stored.synced_at.is_some());
        assert_eq!(stored.remote_id.as_deref(), Some("srv-1"));
        assert_eq!(h.engine.queue().counts().await.unwrap().synced, 1);
    }

    #[tokio::test]
    async fn test_second_pass_is_idempotent() {
        let h = harness(true);
        record(&h, mark(&new_local_id(), "math", 70.0)).await;
        h.engine.sync_pending().await.unwrap();

        let again = h.engine.sync_pending().await.unwrap();
        assert_eq!(again.synced, 0);
        assert_eq!(h.api.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_two_edits_create_once_then_update() {
        let h = harness(true);
        let id = new_local_id();
        let first = mark(&id, "math", 60.0);
        let mut second = first.clone();
        second.marks_obtained = 65.0;
        second.timestamp = first.timestamp + Duration::milliseconds(1);
        record(&h, first).await;
        record(&h, second).await;

        let report = h.engine.sync_pending().await.unwrap();
        assert_eq!(report.synced, 2);
        assert_eq!(
            h.api.calls(),
            vec![Call::Create(60.0), Call::Update("srv-1".into(), 65.0)]
        );
        let stored = h.marks.get(&id).await.unwrap().unwrap();
        assert!(stored.synced);
        assert_eq!(stored.marks_obtained, 65.0);
    }

    #[tokio::test]
    async fn test_newer_unsent_edit_keeps_record_unsynced() {
        let h = harness(true);
        let id = new_local_id();
        let sent = mark(&id, "math", 60.0);
        record(&h, sent.clone()).await;

        // An edit lands locally after the queued item was captured.
        let mut newer = sent;
        newer.marks_obtained = 90.0;
        newer.timestamp += Duration::seconds(1);
        h.marks.put(&newer).await.unwrap();

        h.engine.sync_pending().await.unwrap();
        let stored = h.marks.get(&id).await.unwrap().unwrap();
        assert!(!stored.synced);
        assert_eq!(stored.remote_id.as_deref(), Some("srv-1"));
    }

    #[tokio::test]
    async fn test_failed_edit_holds_later_edits_of_same_mark() {
        let h = harness(true);
        let id = new_local_id();
        let first = mark(&id, "math", 60.0);
        let mut second = first.clone();
        second.marks_obtained = 65.0;
        second.timestamp = first.timestamp + Duration::milliseconds(1);
        record(&h, first).await;
        record(&h, second).await;
        h.api.script(vec![Some(SyncError::RemoteUnavailable {
            status: Some(503),
            message: "busy".into(),
        })]);

        let report = h.engine.sync_pending().await.unwrap();
        assert_eq!((report.synced, report.failed, report.pending), (0, 1, 2));
        assert_eq!(h.api.calls(), vec![Call::Create(60.0)]);

        let report = h.engine.sync_pending().await.unwrap();
        assert_eq!((report.synced, report.failed, report.pending), (2, 0, 0));
        // one record on the server, ending on the later edit
        assert_eq!(
            h.api.calls(),
            vec![
                Call::Create(60.0),
                Call::Create(60.0),
                Call::Update("srv-2".into(), 65.0)
            ]
        );
        let stored = h.marks.get(&id).await.unwrap().unwrap();
        assert!(stored.synced);
        assert_eq!(stored.marks_obtained, 65.0);
        assert_eq!(stored.remote_id.as_deref(), Some("srv-2"));
    }

    #[tokio::test]
    async fn test_stale_item_is_superseded_without_push() {
        let h = harness(true);
        let id = new_local_id();
        let stale = mark(&id, "math", 60.0);
        record(&h, stale.clone()).await;

        let mut newer = stale;
        newer.marks_obtained = 65.0;
        newer.timestamp += Duration::seconds(1);
        newer.synced = true;
        newer.synced_at = Some(Utc::now());
        newer.remote_id = Some("srv-7".into());
        h.marks.put(&newer).await.unwrap();

        let report = h.engine.sync_pending().await.unwrap();
        assert!(h.api.calls().is_empty());
        assert_eq!((report.synced, report.superseded, report.pending), (0, 1, 0));
        assert_eq!(h.engine.queue().counts().await.unwrap().synced, 1);
        let stored = h.marks.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.marks_obtained, 65.0);
        assert!(stored.synced);
    }

    #[tokio::test]
    async fn test_edit_during_push_survives_acknowledgement() {
        let h = harness(true);
        let id = new_local_id();
        let first = mark(&id, "math", 60.0);
        let mut edit = first.clone();
        edit.marks_obtained = 65.0;
        edit.timestamp = first.timestamp + Duration::seconds(1);
        record(&h, first).await;
        *h.api.edit_during_create.lock().unwrap() = Some((h.marks.clone(), edit.clone()));

        h.engine.sync_pending().await.unwrap();
        let stored = h.marks.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.marks_obtained, 65.0);
        assert!(!stored.synced);
        assert_eq!(stored.remote_id.as_deref(), Some("srv-1"));

        // the edit's own queue entry follows as an update, never a second create
        h.engine
            .queue()
            .enqueue(NewQueueItem::mark(queue_action_for(&edit), edit))
            .await
            .unwrap();
        h.engine.sync_pending().await.unwrap();
        assert_eq!(
            h.api.calls(),
            vec![Call::Create(60.0), Call::Update("srv-1".into(), 65.0)]
        );
        let stored = h.marks.get(&id).await.unwrap().unwrap();
        assert!(stored.synced);
        assert_eq!(stored.marks_obtained, 65.0);
    }

    #[tokio::test]
    async fn test_item_failure_does_not_abort_batch() {
        let h = harness(true);
        let failing = new_local_id();
        record(&h, mark(&failing, "math", 50.0)).await;
        record(&h, mark(&new_local_id(), "chem", 55.0)).await;
        h.api.script(vec![Some(SyncError::RemoteUnavailable {
            status: Some(500),
            message: "boom".into(),
        })]);

        let report = h.engine.sync_pending().await.unwrap();
        assert!(!report.success);
        assert_eq!((report.synced, report.failed, report.pending), (1, 1, 1));

        let items = h.engine.queue().get_eligible(5).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, QueueStatus::Error);
        assert_eq!(items[0].attempts, 1);
        assert!(items[0].error.as_deref().unwrap().contains("boom"));
        assert!(!h.marks.get(&failing).await.unwrap().unwrap().synced);

        // The next pass picks the failed item up again.
        let retry = h.engine.sync_pending().await.unwrap();
        assert_eq!(retry.synced, 1);
        assert!(h.marks.get(&failing).await.unwrap().unwrap().synced);
    }

    #[tokio::test]
    async fn test_unauthorized_is_flagged() {
        let h = harness(true);
        record(&h, mark(&new_local_id(), "math", 50.0)).await;
        h.api.script(vec![Some(SyncError::Unauthorized)]);

        let report = h.engine.sync_pending().await.unwrap();
        assert!(report.auth_required);
        assert_eq!(report.pending, 1);
    }

    #[tokio::test]
    async fn test_rejected_item_is_not_retried() {
        let h = harness(true);
        record(&h, mark(&new_local_id(), "math", 50.0)).await;
        h.api.script(vec![Some(SyncError::RemoteRejection {
            status: 409,
            message: "duplicate".into(),
        })]);

        let report = h.engine.sync_pending().await.unwrap();
        assert_eq!((report.failed, report.pending), (1, 0));
        let again = h.engine.sync_pending().await.unwrap();
        assert_eq!((again.synced, again.failed), (0, 0));
        assert_eq!(h.api.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_server_ids_are_updated() {
        let h = harness(true);
        record(&h, mark("4711", "math", 50.0)).await;
        h.engine.sync_pending().await.unwrap();
        assert_eq!(h.api.calls(), vec![Call::Update("4711".into(), 50.0)]);
    }

    #[tokio::test]
    async fn test_recover_orphans() {
        let h = harness(false);
        let orphan = mark(&new_local_id(), "math", 50.0);
        h.marks.put(&orphan).await.unwrap();
        record(&h, mark(&new_local_id(), "chem", 55.0)).await;

        assert_eq!(h.engine.recover_orphans().await.unwrap(), 1);
        assert_eq!(h.engine.recover_orphans().await.unwrap(), 0);
        assert_eq!(h.engine.queue().get_pending().await.unwrap().len(), 2);

        h.monitor.set_online(true);
        assert_eq!(h.engine.sync_pending().await.unwrap().synced, 2);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_coalesce() {
        let h = harness(true);
        for i in 0..3 {
            record(&h, mark(&new_local_id(), &format!("subj-{i}"), 50.0)).await;
        }

        let (a, b) = tokio::join!(h.engine.sync_pending(), h.engine.sync_pending());
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.synced + b.synced, 3);
        // no item is pushed twice however the passes interleave
        assert_eq!(h.api.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_busy_engine_reports_in_progress() {
        let h = harness(true);
        assert!(!h.engine.is_syncing());
        let report = {
            let _held = h.engine.hold_for_test().await;
            assert!(h.engine.is_syncing());
            h.engine.sync_pending().await.unwrap()
        };
        assert_eq!(report.reason, Some(SkipReason::InProgress));
        assert!(!h.engine.is_syncing());
    }
}
