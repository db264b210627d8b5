//! Combining server and local marks into one read view.

use std::collections::HashMap;

use crate::marks::{MarkKey, MarkRecord};

/// Which side wins for a key present on both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    UseLocal,
    UseRemote,
}

/// Local wins only while it holds an edit the server has not acknowledged.
pub fn resolve_conflict(local: &MarkRecord, _remote: &MarkRecord) -> MergeDecision {
    if local.synced {
        MergeDecision::UseRemote
    } else {
        MergeDecision::UseLocal
    }
}

/// Merge `server` marks with `local` marks by [`MarkKey`].
///
/// Server order is preserved. Unsynced local records replace the server
/// record for their key, or are appended when the server has none. Synced
/// local records never appear on their own: once acknowledged, the server
/// copy is authoritative.
pub fn merge_marks(server: Vec<MarkRecord>, local: Vec<MarkRecord>) -> Vec<MarkRecord> {
    let mut merged = server;
    let mut by_key: HashMap<MarkKey, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, m)| (m.key(), i))
        .collect();

    for mark in local {
        match by_key.get(&mark.key()) {
            Some(&i) => {
                if resolve_conflict(&mark, &merged[i]) == MergeDecision::UseLocal {
                    merged[i] = mark;
                }
            }
            None if !mark.synced => {
                by_key.insert(mark.key(), merged.len());
                merged.push(mark);
            }
            None => {}
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::Grade;
    use chrono::Utc;

    fn mark(id: &str, subject: &str, value: f64, synced: bool) -> MarkRecord {
        MarkRecord {
            id: id.into(),
            student_id: "st-1".into(),
            subject_id: subject.into(),
            exam_id: "mid".into(),
            academic_year_id: "2026".into(),
            term_id: "t1".into(),
            class_id: "s5".into(),
            marks_obtained: value,
            grade: Grade::B,
            points: 2,
            timestamp: Utc::now(),
            synced,
            synced_at: None,
            remote_id: None,
        }
    }

    #[test]
    fn test_unsynced_local_overrides_server() {
        let merged = merge_marks(
            vec![mark("10", "math", 70.0, true)],
            vec![mark("local-1", "math", 75.0, false)],
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].marks_obtained, 75.0);
        assert_eq!(merged[0].id, "local-1");
    }

    #[test]
    fn test_synced_local_never_overrides() {
        let merged = merge_marks(
            vec![mark("10", "math", 70.0, true)],
            vec![mark("local-1", "math", 75.0, true)],
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].marks_obtained, 70.0);
    }

    #[test]
    fn test_local_only_keys() {
        let merged = merge_marks(
            vec![mark("10", "math", 70.0, true)],
            vec![
                mark("local-1", "chem", 55.0, false),
                mark("local-2", "bio", 60.0, true),
            ],
        );
        let subjects: Vec<&str> = merged.iter().map(|m| m.subject_id.as_str()).collect();
        assert_eq!(subjects, vec!["math", "chem"]);
    }

    #[test]
    fn test_resolve_conflict() {
        let remote = mark("10", "math", 70.0, true);
        assert_eq!(
            resolve_conflict(&mark("local-1", "math", 1.0, false), &remote),
            MergeDecision::UseLocal
        );
        assert_eq!(
            resolve_conflict(&mark("local-1", "math", 1.0, true), &remote),
            MergeDecision::UseRemote
        );
    }
}
