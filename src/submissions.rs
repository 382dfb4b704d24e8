use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::{as_list, ApiClient, ApiError};
use crate::resolve::{resolve_first, Outcome, Resolved, Strategy};

/// Backend-derived keys recomputed locally when a submission is enriched.
const DERIVED_KEYS: [&str; 4] = ["is_graded", "violations_count", "violation_count", "violations"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    #[serde(alias = "submission_id")]
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<i64>,
    pub student_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    #[serde(default)]
    pub grade: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<String>,
    /// Violations the backend embedded in the submission payload, undecoded.
    #[serde(default, skip_serializing)]
    pub violations: Vec<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Submission {
    pub fn is_graded(&self) -> bool {
        self.grade.is_some()
    }

    /// Pass-through fields with the locally recomputed ones removed.
    pub fn passthrough(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut extra = self.extra.clone();
        for k in DERIVED_KEYS {
            extra.remove(k);
        }
        extra
    }
}

pub fn decode_submissions(items: Vec<serde_json::Value>) -> Vec<Submission> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Submission>(item) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(error = %e, "skipping malformed submission entry");
                None
            }
        })
        .collect()
}

fn fetch_list(api: &ApiClient, path: &str) -> Outcome<Vec<Submission>> {
    match api.get_value(path) {
        Ok(v) => match as_list(v, &["submissions", "items"]) {
            Some(items) => Outcome::Hit(decode_submissions(items)),
            None => Outcome::Fault(ApiError::Decode(format!("{path}: expected a list"))),
        },
        Err(e) => Outcome::from(Err::<Vec<Submission>, _>(e)),
    }
}

/// Submissions for an assignment, at most one per student.
pub fn fetch_submissions(api: &ApiClient, assignment_id: i64) -> Resolved<Vec<Submission>> {
    let primary = format!("/assignments/{assignment_id}/submissions");
    let combined = format!("/assignments/{assignment_id}/submissions-with-violations");
    let mut resolved = resolve_first(
        "submissions",
        vec![
            Strategy::new("assignment_submissions", || fetch_list(api, &primary)),
            Strategy::new("submissions_with_violations", || fetch_list(api, &combined)),
        ],
    );
    if let Some(subs) = resolved.value.as_mut() {
        let mut seen = std::collections::HashSet::new();
        subs.retain(|s| seen.insert(s.student_id));
    }
    resolved
}

pub fn grade_submission(
    api: &ApiClient,
    submission_id: i64,
    grade: f64,
    feedback: Option<&str>,
) -> Result<serde_json::Value, ApiError> {
    if !(0.0..=100.0).contains(&grade) {
        return Err(ApiError::Validation(
            "Grade must be between 0 and 100".into(),
        ));
    }
    api.patch_json(
        &format!("/submissions/{submission_id}/grade"),
        serde_json::json!({ "grade": grade, "feedback": feedback }),
    )
}
