use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use super::model::{NewViolation, Violation};
use super::timestamp;
use crate::api::{ApiClient, ApiError};
use crate::outbox;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub pushed: usize,
    pub rejected: usize,
    /// Pending entries left after this pass.
    pub remaining: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_on: Option<String>,
    #[serde(skip)]
    pub unauthorized: bool,
}

fn upload_body(v: &Violation) -> serde_json::Value {
    let details = NewViolation {
        student_id: v.student_id,
        assignment_id: v.assignment_id,
        violation_type: v.violation_type.clone(),
        description: v.description.clone(),
        time_away_seconds: v.time_away_seconds,
        severity: v.severity,
        content_added_during_absence: v.content_added_during_absence,
        ai_similarity_score: v.ai_similarity_score,
        paste_content_length: v.paste_content_length,
    };
    let mut body = serde_json::to_value(details).unwrap_or_default();
    if let Some(obj) = body.as_object_mut() {
        obj.insert(
            "detected_at".into(),
            serde_json::json!(timestamp::format(&v.detected_at)),
        );
    }
    body
}

/// Pushes pending outbox entries to the backend, oldest first.
///
/// An accepted entry is marked synced and drops out of reads, so the
/// server copy supersedes the local one. A validation refusal parks the
/// entry as rejected. Any other failure ends the pass.
pub fn sync_outbox(api: &ApiClient, conn: &Connection) -> anyhow::Result<SyncReport> {
    let mut report = SyncReport::default();
    let pending = outbox::pending(conn)?;

    for entry in &pending {
        let Some(v) = entry.violation.as_ref() else {
            continue;
        };
        match api.post_json("/violations/", upload_body(v)) {
            Ok(resp) => {
                let server_id = resp.get("id").and_then(|x| x.as_i64());
                outbox::mark_synced(conn, entry.local_id, server_id)?;
                report.pushed += 1;
            }
            Err(ApiError::Validation(msg)) => {
                warn!(local_id = %entry.local_id, %msg, "backend rejected outbox entry");
                outbox::mark_rejected(conn, entry.local_id, &msg)?;
                report.rejected += 1;
            }
            Err(e) => {
                outbox::record_failed_attempt(conn, entry.local_id, &e.to_string())?;
                report.unauthorized = e.is_unauthorized();
                report.stopped_on = Some(e.to_string());
                break;
            }
        }
    }

    report.remaining = outbox::pending(conn)?.len();
    if report.pushed > 0 || report.rejected > 0 {
        info!(
            pushed = report.pushed,
            rejected = report.rejected,
            remaining = report.remaining,
            "outbox sync pass finished"
        );
    }
    Ok(report)
}

/// Admin-only delete. Failure propagates; on success the local copies of
/// the same event are pruned from the outbox.
pub fn delete_violation(
    api: &ApiClient,
    store: Option<&Connection>,
    violation_id: i64,
) -> Result<usize, ApiError> {
    let known: Option<Violation> = api.get(&format!("/violations/{violation_id}")).ok();
    api.delete(&format!("/violations/{violation_id}"))?;
    info!(violation_id, "violation deleted");

    let Some(conn) = store else {
        return Ok(0);
    };
    match outbox::prune_deleted(conn, violation_id, known.as_ref()) {
        Ok(n) => Ok(n),
        Err(e) => {
            warn!(violation_id, "failed to prune outbox after delete: {e:#}");
            Ok(0)
        }
    }
}
