//! Mark records and cached reference data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::grading::{Grade, Tier, WeightClass};

/// Prefix carried by every locally generated mark id.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Generate a fresh local mark id (`local-<uuid>`).
pub fn new_local_id() -> String {
    format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4())
}

/// True for ids minted on this device, false for server-assigned ids.
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// The exam a mark belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamContext {
    pub exam_id: String,
    pub academic_year_id: String,
    pub term_id: String,
    pub class_id: String,
}

/// Identity of a mark independent of its id: one student, one subject, one exam.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkKey {
    pub student_id: String,
    pub subject_id: String,
    pub exam_id: String,
    pub academic_year_id: String,
    pub term_id: String,
    pub class_id: String,
}

impl MarkKey {
    pub fn new(student_id: &str, subject_id: &str, ctx: &ExamContext) -> Self {
        Self {
            student_id: student_id.to_string(),
            subject_id: subject_id.to_string(),
            exam_id: ctx.exam_id.clone(),
            academic_year_id: ctx.academic_year_id.clone(),
            term_id: ctx.term_id.clone(),
            class_id: ctx.class_id.clone(),
        }
    }
}

/// A captured mark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRecord {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub exam_id: String,
    pub academic_year_id: String,
    pub term_id: String,
    pub class_id: String,
    pub marks_obtained: f64,
    pub grade: Grade,
    pub points: u8,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub synced: bool,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
    /// Server id learned after the first successful create of a local record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

impl MarkRecord {
    pub fn is_local(&self) -> bool {
        is_local_id(&self.id)
    }

    pub fn key(&self) -> MarkKey {
        MarkKey {
            student_id: self.student_id.clone(),
            subject_id: self.subject_id.clone(),
            exam_id: self.exam_id.clone(),
            academic_year_id: self.academic_year_id.clone(),
            term_id: self.term_id.clone(),
            class_id: self.class_id.clone(),
        }
    }

    pub fn context(&self) -> ExamContext {
        ExamContext {
            exam_id: self.exam_id.clone(),
            academic_year_id: self.academic_year_id.clone(),
            term_id: self.term_id.clone(),
            class_id: self.class_id.clone(),
        }
    }

    /// The server id to update, or `None` when the record must be created.
    pub fn remote_target(&self) -> Option<&str> {
        if self.is_local() {
            self.remote_id.as_deref()
        } else {
            Some(&self.id)
        }
    }
}

/// Optional equality filters over mark fields. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub academic_year_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
}

impl MarkFilter {
    /// Filter selecting one student's marks within an exam.
    pub fn for_student(student_id: &str, ctx: &ExamContext) -> Self {
        Self {
            student_id: Some(student_id.to_string()),
            exam_id: Some(ctx.exam_id.clone()),
            academic_year_id: Some(ctx.academic_year_id.clone()),
            term_id: Some(ctx.term_id.clone()),
            class_id: Some(ctx.class_id.clone()),
            subject_id: None,
        }
    }

    /// Populated fields as (camelCase name, value), in a fixed order.
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("studentId", &self.student_id),
            ("subjectId", &self.subject_id),
            ("examId", &self.exam_id),
            ("academicYearId", &self.academic_year_id),
            ("termId", &self.term_id),
            ("classId", &self.class_id),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
        .collect()
    }

    /// The most selective indexed field set on this filter, if any.
    /// `examId` is not indexed locally.
    pub fn index_hint(&self) -> Option<(&'static str, &str)> {
        self.pairs().into_iter().find(|(name, _)| *name != "examId")
    }

    pub fn matches(&self, mark: &MarkRecord) -> bool {
        fn eq(filter: &Option<String>, value: &str) -> bool {
            filter.as_deref().map_or(true, |f| f == value)
        }
        eq(&self.student_id, &mark.student_id)
            && eq(&self.subject_id, &mark.subject_id)
            && eq(&self.exam_id, &mark.exam_id)
            && eq(&self.academic_year_id, &mark.academic_year_id)
            && eq(&self.term_id, &mark.term_id)
            && eq(&self.class_id, &mark.class_id)
    }
}

/// Cached student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub admission_no: Option<String>,
    pub class_id: String,
    #[serde(default = "synced_default")]
    pub synced: bool,
}

/// Cached class. Its tier selects the grading scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolClass {
    pub id: String,
    pub name: String,
    pub academic_year_id: String,
    pub tier: Tier,
    #[serde(default = "synced_default")]
    pub synced: bool,
}

/// Cached subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    pub tier: Tier,
    #[serde(default)]
    pub weight_class: WeightClass,
    #[serde(default = "synced_default")]
    pub synced: bool,
}

fn synced_default() -> bool {
    true
}
