use crate::api::ApiError;
use crate::ipc::error::{api_err, err, ok};
use crate::ipc::helpers::required_i64;
use crate::ipc::types::{AppState, Request};
use crate::submissions::grade_submission;
use crate::violations::submissions_with_violations;
use serde_json::json;

fn handle_with_violations(state: &mut AppState, req: &Request) -> serde_json::Value {
    let assignment_id = match required_i64(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let enriched = {
        let api = state.api();
        submissions_with_violations(
            &api,
            state.db.as_ref(),
            assignment_id,
            state.config.fanout_limit,
        )
    };
    state.note_unauthorized(enriched.unauthorized);
    if enriched.unauthorized {
        return api_err(&req.id, &ApiError::session_expired());
    }
    match serde_json::to_value(&enriched) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "internal", e.to_string(), None),
    }
}

fn handle_grade(state: &mut AppState, req: &Request) -> serde_json::Value {
    let submission_id = match required_i64(req, "submissionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(grade) = req.params.get("grade").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "missing params.grade", None);
    };
    let feedback = req.params.get("feedback").and_then(|v| v.as_str());

    let (resp, unauthorized) = {
        let api = state.api();
        let resp = match grade_submission(&api, submission_id, grade, feedback) {
            Ok(v) => ok(&req.id, json!({ "submissionId": submission_id, "submission": v })),
            Err(e) => api_err(&req.id, &e),
        };
        (resp, api.saw_unauthorized())
    };
    state.note_unauthorized(unauthorized);
    resp
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "submissions.withViolations" => Some(handle_with_violations(state, req)),
        "submissions.grade" => Some(handle_grade(state, req)),
        _ => None,
    }
}
