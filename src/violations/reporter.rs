use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{error, info, warn};

use super::model::{NewViolation, Violation};
use crate::api::{ApiClient, ApiError};
use crate::outbox;
use crate::resolve::{resolve_first, Attempt, Outcome, Strategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Persisted {
    Server,
    Outbox,
    /// Neither the backend nor a local store accepted it; the caller holds
    /// the only copy.
    Unsaved,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reported {
    pub violation: Violation,
    pub persisted: Persisted,
    pub attempts: Vec<Attempt>,
    #[serde(skip)]
    pub unauthorized: bool,
}

/// Write endpoints tried in order before falling back to the outbox.
pub fn report_paths(assignment_id: i64) -> [(&'static str, String); 3] {
    [
        ("violations", "/violations/".to_string()),
        (
            "assignment_violations",
            format!("/assignments/{assignment_id}/violations"),
        ),
        ("student_violations", "/students/me/violations".to_string()),
    ]
}

/// Records one integrity event. Only invalid input is an error: every
/// network failure downgrades to the local outbox and still yields a record.
pub fn report_violation(
    api: &ApiClient,
    store: Option<&Connection>,
    details: NewViolation,
) -> Result<Reported, ApiError> {
    details.validate()?;

    let body = serde_json::to_value(&details)
        .map_err(|e| ApiError::Decode(format!("failed to encode violation: {e}")))?;

    let paths = report_paths(details.assignment_id);
    let strategies: Vec<Strategy<'_, Violation>> = paths
        .iter()
        .map(|(name, path)| {
            let body = body.clone();
            let details = &details;
            Strategy::new(*name, move || {
                Outcome::from(
                    api.post_json(path, body.clone())
                        .map(|resp| accepted_record(resp, details)),
                )
            })
        })
        .collect();
    let resolved = resolve_first("report", strategies);
    let unauthorized = resolved.unauthorized;

    if let Some(violation) = resolved.value {
        info!(
            assignment_id = details.assignment_id,
            student_id = details.student_id,
            violation_type = %details.violation_type,
            "violation recorded"
        );
        return Ok(Reported {
            violation,
            persisted: Persisted::Server,
            attempts: resolved.attempts,
            unauthorized,
        });
    }

    let assignment_id = details.assignment_id;
    let violation = details.into_local(Utc::now());
    let persisted = match store {
        Some(conn) => match outbox::append(conn, &violation) {
            Ok(local_id) => {
                warn!(
                    assignment_id,
                    %local_id,
                    reason = resolved.last_error().unwrap_or("no endpoint accepted the report"),
                    "backend unavailable, violation kept in outbox"
                );
                Persisted::Outbox
            }
            Err(e) => {
                error!(assignment_id, "failed to write outbox entry: {e:#}");
                Persisted::Unsaved
            }
        },
        None => {
            warn!(assignment_id, "no workspace selected, violation not persisted");
            Persisted::Unsaved
        }
    };

    Ok(Reported {
        violation,
        persisted,
        attempts: resolved.attempts,
        unauthorized,
    })
}

/// The backend echoes the stored record; older deployments answer with just
/// an id or a message, in which case the submitted details stand in.
fn accepted_record(resp: serde_json::Value, details: &NewViolation) -> Violation {
    if let Ok(v) = serde_json::from_value::<Violation>(resp.clone()) {
        return v;
    }
    let mut v = details.clone().into_local(Utc::now());
    v.id = resp.get("id").and_then(|x| x.as_i64());
    if v.id.is_some() {
        v.local_id = None;
    }
    v
}
