use rusqlite::Connection;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

use super::aggregator::aggregate_violations;
use super::model::{Severity, Violation};
use crate::api::{as_list, ApiClient, ApiError};
use crate::submissions::Submission;

const RECENT_LIMIT: usize = 5;

/// Counts keyed by violation type, in order of first occurrence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeCounts(pub Vec<(String, usize)>);

impl TypeCounts {
    fn bump(&mut self, key: &str) {
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some((_, n)) => *n += 1,
            None => self.0.push((key.to_string(), 1)),
        }
    }

    pub fn get(&self, key: &str) -> usize {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

impl Serialize for TypeCounts {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(self.0.len()))?;
        for (k, n) in &self.0 {
            map.serialize_entry(k, n)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TypeCounts {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        struct OrderedCounts;

        impl<'de> Visitor<'de> for OrderedCounts {
            type Value = TypeCounts;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of violation type to count")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<TypeCounts, A::Error> {
                let mut out = Vec::new();
                while let Some((k, n)) = access.next_entry::<String, usize>()? {
                    out.push((k, n));
                }
                Ok(TypeCounts(out))
            }
        }

        d.deserialize_map(OrderedCounts)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    #[serde(default)]
    pub low: usize,
    #[serde(default)]
    pub medium: usize,
    #[serde(default)]
    pub high: usize,
}

impl SeverityCounts {
    pub fn total(&self) -> usize {
        self.low + self.medium + self.high
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarySource {
    Backend,
    Computed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViolationSummary {
    pub assignment_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    pub total_violations: usize,
    pub violations_by_type: TypeCounts,
    pub violations_by_severity: SeverityCounts,
    pub average_time_away_seconds: f64,
    pub students_with_violations: usize,
    pub total_students: usize,
    /// Set when the roster could not be read and `total_students` is the
    /// 2x-violators placeholder.
    pub total_students_estimated: bool,
    pub recent_violations: Vec<Violation>,
    pub source: SummarySource,
    #[serde(skip)]
    pub unauthorized: bool,
}

#[derive(Debug, Deserialize)]
struct BackendSummary {
    #[serde(default)]
    assignment_name: Option<String>,
    #[serde(default)]
    class_name: Option<String>,
    total_violations: usize,
    #[serde(default)]
    violations_by_type: TypeCounts,
    #[serde(default)]
    violations_by_severity: SeverityCounts,
    #[serde(default)]
    average_time_away_seconds: f64,
    #[serde(default)]
    students_with_violations: usize,
    #[serde(default)]
    total_students: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterSize {
    Known(usize),
    Unknown,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Statistics over an already-aggregated set.
pub fn compute_summary(assignment_id: i64, violations: &[Violation], roster: RosterSize) -> ViolationSummary {
    let mut by_type = TypeCounts::default();
    let mut by_severity = SeverityCounts::default();
    let mut students = HashSet::new();
    let mut time_away: i64 = 0;

    for v in violations {
        by_type.bump(v.violation_type.as_str());
        match v.severity {
            Severity::Low => by_severity.low += 1,
            Severity::Medium => by_severity.medium += 1,
            Severity::High => by_severity.high += 1,
        }
        students.insert(v.student_id);
        time_away += v.time_away_seconds;
    }

    let average = if violations.is_empty() {
        0.0
    } else {
        round2(time_away as f64 / violations.len() as f64)
    };

    let (total_students, estimated) = match roster {
        RosterSize::Known(n) => (n.max(students.len()), false),
        RosterSize::Unknown => (students.len() * 2, true),
    };

    let recent = most_recent(violations);

    ViolationSummary {
        assignment_id,
        assignment_name: violations.iter().find_map(|v| v.assignment_name.clone()),
        class_name: violations.iter().find_map(|v| v.class_name.clone()),
        total_violations: violations.len(),
        violations_by_type: by_type,
        violations_by_severity: by_severity,
        average_time_away_seconds: average,
        students_with_violations: students.len(),
        total_students,
        total_students_estimated: estimated,
        recent_violations: recent,
        source: SummarySource::Computed,
        unauthorized: false,
    }
}

/// Newest first, capped at `RECENT_LIMIT`.
fn most_recent(violations: &[Violation]) -> Vec<Violation> {
    let mut recent = violations.to_vec();
    recent.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
    recent.truncate(RECENT_LIMIT);
    recent
}

struct AssignmentMeta {
    name: Option<String>,
    class_id: Option<i64>,
}

fn assignment_meta(api: &ApiClient, assignment_id: i64) -> Option<AssignmentMeta> {
    let v = api.get_value(&format!("/assignments/{assignment_id}")).ok()?;
    Some(AssignmentMeta {
        name: v.get("name").and_then(|x| x.as_str()).map(|s| s.to_string()),
        class_id: v.get("class_id").and_then(|x| x.as_i64()),
    })
}

fn roster_len(api: &ApiClient, class_id: i64) -> Result<usize, ApiError> {
    let v = api.get_value(&format!("/teachers/me/classes/{class_id}/roster"))?;
    as_list(v, &["students", "roster"])
        .map(|l| l.len())
        .ok_or_else(|| ApiError::Decode("roster: expected a list".into()))
}

/// Prefers the backend's own summary, then computes one from the aggregated set.
/// The backend summary carries no records, so its recent list always comes
/// from the aggregated set.
pub fn summarize_violations(
    api: &ApiClient,
    store: Option<&Connection>,
    assignment_id: i64,
) -> ViolationSummary {
    match api.get::<BackendSummary>(&format!("/assignments/{assignment_id}/violations/summary")) {
        Ok(b) => {
            debug!(assignment_id, "using backend summary");
            let agg = aggregate_violations(api, store, assignment_id);
            return ViolationSummary {
                assignment_id,
                assignment_name: b.assignment_name,
                class_name: b.class_name,
                total_violations: b.total_violations,
                violations_by_type: b.violations_by_type,
                violations_by_severity: b.violations_by_severity,
                average_time_away_seconds: b.average_time_away_seconds,
                students_with_violations: b.students_with_violations,
                total_students: b.total_students,
                total_students_estimated: false,
                recent_violations: most_recent(&agg.violations),
                source: SummarySource::Backend,
                unauthorized: agg.unauthorized,
            };
        }
        Err(ApiError::Unauthorized(_)) => {
            let mut s = compute_summary(assignment_id, &[], RosterSize::Unknown);
            s.unauthorized = true;
            return s;
        }
        Err(e) => debug!(assignment_id, error = %e, "backend summary unavailable"),
    }

    let agg = aggregate_violations(api, store, assignment_id);
    if agg.unauthorized {
        let mut s = compute_summary(assignment_id, &agg.violations, RosterSize::Unknown);
        s.unauthorized = true;
        return s;
    }

    let meta = assignment_meta(api, assignment_id);
    let roster = meta
        .as_ref()
        .and_then(|m| m.class_id)
        .and_then(|cid| roster_len(api, cid).ok())
        .or_else(|| agg.submissions.as_ref().map(Vec::<Submission>::len))
        .map(RosterSize::Known)
        .unwrap_or(RosterSize::Unknown);

    let mut summary = compute_summary(assignment_id, &agg.violations, roster);
    if let Some(m) = meta {
        if summary.assignment_name.is_none() {
            summary.assignment_name = m.name;
        }
        if summary.class_name.is_none() {
            if let Some(cid) = m.class_id {
                summary.class_name = api
                    .get_value(&format!("/classes/{cid}"))
                    .ok()
                    .and_then(|c| c.get("name").and_then(|x| x.as_str()).map(|s| s.to_string()));
            }
        }
    }
    info!(
        assignment_id,
        total = summary.total_violations,
        estimated = summary.total_students_estimated,
        "summary computed locally"
    );
    summary
}
