use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use super::model::{decode_violations, Violation};
use super::set::ViolationSet;
use crate::api::{as_list, ApiClient, ApiError};
use crate::outbox;
use crate::resolve::{resolve_first, Attempt, AttemptStatus, Outcome, Resolved, Strategy};
use crate::submissions::{fetch_submissions, Submission};

/// How one read path fared, so an empty result can be told apart from an
/// unreachable backend.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: &'static str,
    pub status: AttemptStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<&'static str>,
    pub count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<Attempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceReport {
    fn from_resolved<T>(source: &'static str, r: &Resolved<T>, count: usize) -> Self {
        Self {
            source,
            status: r.status(),
            strategy: r.winner(),
            count,
            attempts: r.attempts.clone(),
            error: r.last_error().map(|s| s.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Aggregation {
    pub assignment_id: i64,
    /// Merge order: assignment endpoint, embedded submission payloads, outbox.
    pub violations: Vec<Violation>,
    pub sources: Vec<SourceReport>,
    #[serde(skip)]
    pub unauthorized: bool,
    /// Submissions fetched along the way, reused by the enricher.
    #[serde(skip)]
    pub submissions: Option<Vec<Submission>>,
}

impl Aggregation {
    /// True when no source faulted.
    pub fn is_complete(&self) -> bool {
        self.sources.iter().all(|s| s.status != AttemptStatus::Fault)
    }
}

fn fetch_violations(
    api: &ApiClient,
    path: &str,
    keep: impl Fn(&Violation) -> bool,
) -> Outcome<Vec<Violation>> {
    match api.get_value(path) {
        Ok(v) => match as_list(v, &["violations", "items"]) {
            Some(items) => {
                Outcome::Hit(decode_violations(items, path).into_iter().filter(keep).collect())
            }
            None => Outcome::Fault(ApiError::Decode(format!("{path}: expected a list"))),
        },
        Err(e) => Outcome::from(Err::<Vec<Violation>, _>(e)),
    }
}

/// Backend-side violations for an assignment, trying the scoped endpoint,
/// then the enriched one, then the unscoped list filtered locally.
pub fn fetch_assignment_violations(api: &ApiClient, assignment_id: i64) -> Resolved<Vec<Violation>> {
    let scoped = format!("/assignments/{assignment_id}/violations");
    let enriched = format!("/assignments/{assignment_id}/violations/enriched");
    let unscoped = "/violations/?skip=0&limit=1000".to_string();
    resolve_first(
        "assignment_violations",
        vec![
            Strategy::new("assignment_violations", || {
                fetch_violations(api, &scoped, |_| true)
            }),
            Strategy::new("enriched_violations", || {
                fetch_violations(api, &enriched, |_| true)
            }),
            Strategy::new("all_violations_filtered", || {
                fetch_violations(api, &unscoped, |v| v.assignment_id == assignment_id)
            }),
        ],
    )
}

/// Decodes violations embedded in a submission, filling in the ids the
/// payload may leave implicit.
pub fn embedded_violations(sub: &Submission, assignment_id: i64) -> Vec<Violation> {
    let items = sub
        .violations
        .iter()
        .cloned()
        .map(|mut item| {
            if let Some(obj) = item.as_object_mut() {
                obj.entry("assignment_id")
                    .or_insert_with(|| serde_json::json!(assignment_id));
                obj.entry("student_id")
                    .or_insert_with(|| serde_json::json!(sub.student_id));
            }
            item
        })
        .collect();
    decode_violations(items, "submission_payload")
        .into_iter()
        .filter(|v| v.assignment_id == assignment_id)
        .collect()
}

/// Deduplicated union of every violation known for `assignment_id`.
/// Never fails; per-source outcomes are in `sources`.
pub fn aggregate_violations(
    api: &ApiClient,
    store: Option<&Connection>,
    assignment_id: i64,
) -> Aggregation {
    let mut set = ViolationSet::new();
    let mut sources = Vec::with_capacity(3);

    let backend = fetch_assignment_violations(api, assignment_id);
    let mut unauthorized = backend.unauthorized;
    let added = set.extend(backend.value.clone().unwrap_or_default());
    sources.push(SourceReport::from_resolved("assignment_endpoint", &backend, added));

    let subs = if unauthorized {
        None
    } else {
        let subs = fetch_submissions(api, assignment_id);
        unauthorized |= subs.unauthorized;
        let embedded: Vec<Violation> = subs
            .value
            .iter()
            .flatten()
            .flat_map(|s| embedded_violations(s, assignment_id))
            .collect();
        let added = set.extend(embedded);
        sources.push(SourceReport::from_resolved("submission_payloads", &subs, added));
        subs.value
    };

    match store {
        Some(conn) => match outbox::backups_for_assignment(conn, assignment_id) {
            Ok(local) => {
                let added = set.extend(local);
                sources.push(SourceReport {
                    source: "outbox",
                    status: AttemptStatus::Hit,
                    strategy: None,
                    count: added,
                    attempts: Vec::new(),
                    error: None,
                });
            }
            Err(e) => {
                warn!(assignment_id, "failed to read outbox: {e:#}");
                sources.push(SourceReport {
                    source: "outbox",
                    status: AttemptStatus::Fault,
                    strategy: None,
                    count: 0,
                    attempts: Vec::new(),
                    error: Some(format!("{e:#}")),
                });
            }
        },
        None => sources.push(SourceReport {
            source: "outbox",
            status: AttemptStatus::Miss,
            strategy: None,
            count: 0,
            attempts: Vec::new(),
            error: None,
        }),
    }

    info!(assignment_id, total = set.len(), "violations aggregated");

    Aggregation {
        assignment_id,
        violations: set.into_vec(),
        sources,
        unauthorized,
        submissions: subs,
    }
}
