//! Mark capture service: the single entry point UI collaborators use.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::error::{Result, ValidationError};
use crate::grading::{
    calculate_grade, compute_division, DivisionSummary, SubjectResult, Tier, WeightClass,
};
use crate::marks::repo::{MarkRepo, ReferenceCache};
use crate::marks::types::{
    new_local_id, ExamContext, MarkFilter, MarkKey, MarkRecord, SchoolClass, Student, Subject,
};
use crate::network::NetworkMonitor;
use crate::storage::{Config, LocalStore};
use crate::sync::{
    merge_marks, queue_action_for, MarksApi, NewQueueItem, RemoteMark, SyncEngine, SyncReport,
    SyncStatus,
};

/// Records marks offline-first and keeps them flowing to the server.
pub struct MarkService {
    marks: MarkRepo,
    cache: ReferenceCache,
    engine: Arc<SyncEngine>,
    monitor: Arc<NetworkMonitor>,
    api: Arc<dyn MarksApi>,
    default_tier: Tier,
    retention: Duration,
    auto_sync: bool,
}

impl MarkService {
    pub fn new(
        store: LocalStore,
        api: Arc<dyn MarksApi>,
        monitor: Arc<NetworkMonitor>,
        config: &Config,
    ) -> Self {
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            Arc::clone(&api),
            Arc::clone(&monitor),
            config.sync.max_attempts,
        ));
        Self {
            marks: MarkRepo::new(store.clone()),
            cache: ReferenceCache::new(store),
            engine,
            monitor,
            api,
            default_tier: config.grading.default_tier,
            retention: Duration::days(i64::from(config.sync.retention_days)),
            auto_sync: config.sync.auto_sync,
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn monitor(&self) -> &Arc<NetworkMonitor> {
        &self.monitor
    }

    /// Recover orphaned marks and wire connectivity transitions to
    /// background sync passes. Call once, from inside the runtime.
    /// Returns how many marks were re-enqueued.
    pub async fn start(&self) -> Result<usize> {
        let recovered = self.engine.recover_orphans().await?;

        let engine = Arc::clone(&self.engine);
        let handle = tokio::runtime::Handle::current();
        self.monitor.register_listeners(
            move || {
                let engine = Arc::clone(&engine);
                handle.spawn(run_background_sync(engine));
            },
            || tracing::info!("offline: marks will be queued locally"),
        );

        if self.monitor.is_online() {
            self.spawn_sync();
        }
        Ok(recovered)
    }

    /// Grade and store a mark, then queue it for sync.
    ///
    /// Recording the same (student, subject, exam) again edits the existing
    /// record in place.
    pub async fn record_mark(
        &self,
        student_id: &str,
        subject_id: &str,
        ctx: &ExamContext,
        value: f64,
    ) -> Result<MarkRecord> {
        require("studentId", student_id)?;
        require("subjectId", subject_id)?;
        require("examId", &ctx.exam_id)?;
        require("academicYearId", &ctx.academic_year_id)?;
        require("termId", &ctx.term_id)?;
        require("classId", &ctx.class_id)?;

        let (tier, weight) = self.grading_inputs(subject_id, &ctx.class_id).await?;
        let graded = calculate_grade(value, tier, weight)?;

        let now = Utc::now();
        let existing = self
            .marks
            .find_by_key(&MarkKey::new(student_id, subject_id, ctx))
            .await?;
        let (id, remote_id, timestamp) = match existing {
            // keep timestamps strictly increasing per record
            Some(prev) if now <= prev.timestamp => {
                (prev.id, prev.remote_id, prev.timestamp + Duration::microseconds(1))
            }
            Some(prev) => (prev.id, prev.remote_id, now),
            None => (new_local_id(), None, now),
        };

        let mark = MarkRecord {
            id,
            student_id: student_id.to_string(),
            subject_id: subject_id.to_string(),
            exam_id: ctx.exam_id.clone(),
            academic_year_id: ctx.academic_year_id.clone(),
            term_id: ctx.term_id.clone(),
            class_id: ctx.class_id.clone(),
            marks_obtained: value,
            grade: graded.grade,
            points: graded.points,
            timestamp,
            synced: false,
            synced_at: None,
            remote_id,
        };

        let mark = self.marks.put_edit(&mark).await?;
        self.engine
            .queue()
            .enqueue(NewQueueItem::mark(queue_action_for(&mark), mark.clone()))
            .await?;
        tracing::info!(mark_id = %mark.id, grade = %mark.grade, points = mark.points, "mark recorded");

        if self.auto_sync && self.monitor.is_online() {
            self.spawn_sync();
        }
        Ok(mark)
    }

    /// Marks matching `filter`: server data merged with unsynced local edits
    /// when online, the local store alone otherwise or when the fetch fails.
    pub async fn list_marks(&self, filter: &MarkFilter) -> Result<Vec<MarkRecord>> {
        let local = self.marks.list(filter).await?;
        if !self.monitor.is_online() {
            return Ok(local);
        }

        match self.api.fetch_marks(filter).await {
            Ok(remote) => {
                let server: Vec<MarkRecord> =
                    remote.into_iter().map(RemoteMark::into_record).collect();
                self.refresh_from_server(&server).await?;
                Ok(merge_marks(server, local))
            }
            Err(err) => {
                tracing::warn!(error = %err, "remote listing failed, serving local marks");
                Ok(local)
            }
        }
    }

    /// Local marks only.
    pub async fn local_marks(&self, filter: &MarkFilter) -> Result<Vec<MarkRecord>> {
        Ok(self.marks.list(filter).await?)
    }

    pub async fn get_sync_status(&self) -> Result<SyncStatus> {
        let counts = self.engine.queue().counts().await?;
        let total_marks = self.marks.count().await?;
        let synced_count = self.marks.count_synced().await?;
        Ok(SyncStatus {
            online: self.monitor.is_online(),
            pending_count: counts.pending,
            error_count: counts.error,
            total_marks,
            synced_count,
            unsynced_count: total_marks.saturating_sub(synced_count),
            last_sync_at: self.engine.last_sync_at(),
            in_progress: self.engine.is_syncing(),
        })
    }

    pub async fn trigger_sync(&self) -> Result<SyncReport> {
        Ok(self.engine.sync_pending().await?)
    }

    /// Archive synced queue entries older than the retention window.
    pub async fn compact_queue(&self) -> Result<usize> {
        Ok(self.engine.queue().compact(self.retention).await?)
    }

    /// Division for one student's upper-tier results in an exam.
    pub async fn division_for(&self, student_id: &str, ctx: &ExamContext) -> Result<DivisionSummary> {
        require("studentId", student_id)?;
        let tier = match self.cache.class(&ctx.class_id).await? {
            Some(class) => class.tier,
            None => self.default_tier,
        };
        if tier != Tier::Upper {
            return Err(ValidationError::InvalidValue {
                field: "classId".into(),
                message: format!("divisions apply to upper-tier classes, '{}' is {}", ctx.class_id, tier.as_str()),
            }
            .into());
        }

        let mut results = Vec::new();
        for mark in self.list_marks(&MarkFilter::for_student(student_id, ctx)).await? {
            let weight = self.weight_class(&mark.subject_id).await?;
            results.push(SubjectResult {
                result: calculate_grade(mark.marks_obtained, Tier::Upper, weight)?,
                subject_id: mark.subject_id,
                weight_class: weight,
            });
        }
        Ok(compute_division(&results)?)
    }

    pub async fn cache_students(&self, students: &[Student]) -> Result<usize> {
        Ok(self.cache.put_students(students).await?)
    }

    pub async fn cache_classes(&self, classes: &[SchoolClass]) -> Result<usize> {
        Ok(self.cache.put_classes(classes).await?)
    }

    pub async fn cache_subjects(&self, subjects: &[Subject]) -> Result<usize> {
        Ok(self.cache.put_subjects(subjects).await?)
    }

    pub async fn students_in_class(&self, class_id: &str) -> Result<Vec<Student>> {
        Ok(self.cache.students_in_class(class_id).await?)
    }

    pub async fn classes_in_year(&self, academic_year_id: &str) -> Result<Vec<SchoolClass>> {
        Ok(self.cache.classes_in_year(academic_year_id).await?)
    }

    pub async fn subjects_for_tier(&self, tier: Tier) -> Result<Vec<Subject>> {
        Ok(self.cache.subjects_for_tier(tier).await?)
    }

    async fn grading_inputs(&self, subject_id: &str, class_id: &str) -> Result<(Tier, WeightClass)> {
        let tier = match self.cache.class(class_id).await? {
            Some(class) => class.tier,
            None => self.default_tier,
        };
        Ok((tier, self.weight_class(subject_id).await?))
    }

    async fn weight_class(&self, subject_id: &str) -> Result<WeightClass> {
        Ok(self
            .cache
            .subject(subject_id)
            .await?
            .map(|s| s.weight_class)
            .unwrap_or_default())
    }

    /// Keep server marks available offline. Unsynced local edits are left
    /// alone; acknowledged local records take the server's values.
    async fn refresh_from_server(&self, server: &[MarkRecord]) -> Result<()> {
        for remote in server {
            match self.marks.find_by_key(&remote.key()).await? {
                None => self.marks.put(remote).await?,
                Some(local) if !local.synced => {}
                Some(local) => {
                    let remote = remote.clone();
                    // an edit recorded since the lookup keeps its values
                    self.marks
                        .update(&local.id, move |stored| {
                            if !stored.synced {
                                return false;
                            }
                            stored.marks_obtained = remote.marks_obtained;
                            stored.grade = remote.grade;
                            stored.points = remote.points;
                            if stored.is_local() && stored.remote_id.is_none() {
                                stored.remote_id = Some(remote.id);
                            }
                            true
                        })
                        .await?;
                }
            }
        }
        Ok(())
    }

    fn spawn_sync(&self) {
        tokio::spawn(run_background_sync(Arc::clone(&self.engine)));
    }
}

async fn run_background_sync(engine: Arc<SyncEngine>) {
    match engine.sync_pending().await {
        Ok(report) => tracing::debug!(?report, "background sync finished"),
        Err(err) => tracing::warn!(error = %err, "background sync failed"),
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}
