use crate::api::ApiError;
use crate::auth::Role;
use crate::ipc::error::{api_err, err, ok};
use crate::ipc::helpers::{params_as, required_i64};
use crate::ipc::types::{AppState, Request};
use crate::violations::{
    aggregate_violations, delete_violation, report_violation, summarize_violations, sync_outbox,
    NewViolation, Persisted,
};
use serde_json::json;
use tracing::warn;

fn handle_report(state: &mut AppState, req: &Request) -> serde_json::Value {
    let details: NewViolation = match params_as(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let (resp, unauthorized) = {
        let api = state.api();
        let resp = match report_violation(&api, state.db.as_ref(), details) {
            Ok(reported) => {
                let mut result = match serde_json::to_value(&reported) {
                    Ok(v) => v,
                    Err(e) => return err(&req.id, "internal", e.to_string(), None),
                };
                // The backend is reachable again; drain what piled up offline.
                if reported.persisted == Persisted::Server {
                    if let Some(conn) = state.db.as_ref() {
                        match sync_outbox(&api, conn) {
                            Ok(sync) if sync.pushed > 0 || sync.rejected > 0 => {
                                result["sync"] = json!(sync);
                            }
                            Ok(_) => {}
                            Err(e) => warn!("outbox sync after report failed: {e:#}"),
                        }
                    }
                }
                ok(&req.id, result)
            }
            Err(e) => api_err(&req.id, &e),
        };
        (resp, api.saw_unauthorized())
    };
    state.note_unauthorized(unauthorized);
    resp
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let assignment_id = match required_i64(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let agg = {
        let api = state.api();
        aggregate_violations(&api, state.db.as_ref(), assignment_id)
    };
    state.note_unauthorized(agg.unauthorized);
    if agg.unauthorized {
        return api_err(&req.id, &ApiError::session_expired());
    }
    ok(
        &req.id,
        json!({
            "assignmentId": assignment_id,
            "violations": agg.violations,
            "sources": agg.sources,
            "complete": agg.is_complete(),
        }),
    )
}

fn handle_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let assignment_id = match required_i64(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let summary = {
        let api = state.api();
        summarize_violations(&api, state.db.as_ref(), assignment_id)
    };
    state.note_unauthorized(summary.unauthorized);
    if summary.unauthorized {
        return api_err(&req.id, &ApiError::session_expired());
    }
    match serde_json::to_value(&summary) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "internal", e.to_string(), None),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let violation_id = match required_i64(req, "violationId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if state.session.role() != Some(Role::Admin) {
        return err(
            &req.id,
            "forbidden",
            "only administrators can delete violations",
            None,
        );
    }
    let (resp, unauthorized) = {
        let api = state.api();
        let resp = match delete_violation(&api, state.db.as_ref(), violation_id) {
            Ok(pruned) => ok(
                &req.id,
                json!({ "violationId": violation_id, "deleted": true, "prunedLocal": pruned }),
            ),
            Err(e) => api_err(&req.id, &e),
        };
        (resp, api.saw_unauthorized())
    };
    state.note_unauthorized(unauthorized);
    resp
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "violations.report" => Some(handle_report(state, req)),
        "violations.list" => Some(handle_list(state, req)),
        "violations.summary" => Some(handle_summary(state, req)),
        "violations.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
