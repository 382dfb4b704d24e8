use rusqlite::Connection;
use serde::Serialize;
use std::thread;
use tracing::{debug, info};

use super::aggregator::{aggregate_violations, embedded_violations, SourceReport};
use super::model::{decode_violations, Violation};
use super::set::ViolationSet;
use crate::api::{as_list, ApiClient, ApiError};
use crate::submissions::Submission;

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionWithViolations {
    pub id: i64,
    pub assignment_id: i64,
    pub student_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    pub grade: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_spent_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<String>,
    pub is_graded: bool,
    pub violations_count: usize,
    pub violations: Vec<Violation>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichedSubmissions {
    pub assignment_id: i64,
    pub submissions: Vec<SubmissionWithViolations>,
    pub sources: Vec<SourceReport>,
    #[serde(skip)]
    pub unauthorized: bool,
}

fn submission_violations(api: &ApiClient, submission_id: i64) -> Result<Vec<Violation>, ApiError> {
    let path = format!("/submissions/{submission_id}/violations");
    let v = api.get_value(&path)?;
    let items = as_list(v, &["violations", "items"])
        .ok_or_else(|| ApiError::Decode(format!("{path}: expected a list")))?;
    Ok(decode_violations(items, &path))
}

/// Submission-scoped violations for every submission, at most `limit`
/// requests in flight. Results come back in submission order.
fn fan_out(api: &ApiClient, subs: &[Submission], limit: usize) -> Vec<Vec<Violation>> {
    let mut out = Vec::with_capacity(subs.len());
    for chunk in subs.chunks(limit.max(1)) {
        let batch: Vec<Vec<Violation>> = thread::scope(|scope| {
            let handles: Vec<_> = chunk
                .iter()
                .map(|s| {
                    let id = s.id;
                    scope.spawn(move || match submission_violations(api, id) {
                        Ok(list) => list,
                        Err(e) => {
                            debug!(submission_id = id, error = %e, "submission violations unavailable");
                            Vec::new()
                        }
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_default())
                .collect()
        });
        out.extend(batch);
    }
    out
}

/// Pairs each submission for `assignment_id` with its violations: the
/// assignment-level aggregate for that student united with the
/// submission-scoped list.
pub fn submissions_with_violations(
    api: &ApiClient,
    store: Option<&Connection>,
    assignment_id: i64,
    fanout_limit: usize,
) -> EnrichedSubmissions {
    let agg = aggregate_violations(api, store, assignment_id);
    let sources = agg.sources.clone();
    let mut unauthorized = agg.unauthorized;
    let subs = agg.submissions.clone().unwrap_or_default();

    let scoped = if unauthorized {
        vec![Vec::new(); subs.len()]
    } else {
        fan_out(api, &subs, fanout_limit)
    };
    unauthorized |= api.saw_unauthorized();

    let submissions: Vec<SubmissionWithViolations> = subs
        .into_iter()
        .zip(scoped)
        .map(|(sub, scoped)| {
            let mut set = ViolationSet::new();
            set.extend(
                agg.violations
                    .iter()
                    .filter(|v| v.student_id == sub.student_id)
                    .cloned(),
            );
            set.extend(embedded_violations(&sub, assignment_id));
            set.extend(
                scoped
                    .into_iter()
                    .filter(|v| v.student_id == sub.student_id && v.assignment_id == assignment_id),
            );
            let violations = set.into_vec();
            SubmissionWithViolations {
                id: sub.id,
                assignment_id: sub.assignment_id.unwrap_or(assignment_id),
                student_id: sub.student_id,
                student_name: sub.student_name.clone(),
                grade: sub.grade,
                time_spent_minutes: sub.time_spent_minutes,
                submitted_at: sub.submitted_at.clone(),
                is_graded: sub.is_graded(),
                violations_count: violations.len(),
                violations,
                extra: sub.passthrough(),
            }
        })
        .collect();

    info!(
        assignment_id,
        submissions = submissions.len(),
        "submissions enriched with violations"
    );

    EnrichedSubmissions {
        assignment_id,
        submissions,
        sources,
        unauthorized,
    }
}
