use crate::api::ApiError;
use crate::classes::{create_class, delete_class, list_classes, update_class, ClassInput};
use crate::ipc::error::{api_err, err, ok};
use crate::ipc::helpers::{params_as, require_session, required_i64};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(role) = state.session.role() else {
        return err(
            &req.id,
            "unauthorized",
            "sign in first",
            Some(json!({ "redirect": "/login" })),
        );
    };
    let list = {
        let api = state.api();
        list_classes(&api, role)
    };
    state.note_unauthorized(list.unauthorized);
    if list.unauthorized {
        return api_err(&req.id, &ApiError::session_expired());
    }
    ok(
        &req.id,
        json!({ "role": role, "classes": list.classes, "strategy": list.strategy }),
    )
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let input: ClassInput = match params_as(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (resp, unauthorized) = {
        let api = state.api();
        let resp = match create_class(&api, &input) {
            Ok(c) => ok(&req.id, json!({ "class": c })),
            Err(e) => api_err(&req.id, &e),
        };
        (resp, api.saw_unauthorized())
    };
    state.note_unauthorized(unauthorized);
    resp
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let class_id = match required_i64(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let patch = req.params.get("patch").cloned().unwrap_or_else(|| json!({}));
    let input: ClassInput = match serde_json::from_value(patch) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    let (resp, unauthorized) = {
        let api = state.api();
        let resp = match update_class(&api, class_id, &input) {
            Ok(c) => ok(&req.id, json!({ "class": c })),
            Err(e) => api_err(&req.id, &e),
        };
        (resp, api.saw_unauthorized())
    };
    state.note_unauthorized(unauthorized);
    resp
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let class_id = match required_i64(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (resp, unauthorized) = {
        let api = state.api();
        let resp = match delete_class(&api, class_id) {
            Ok(()) => ok(&req.id, json!({ "classId": class_id, "deleted": true })),
            Err(e) => api_err(&req.id, &e),
        };
        (resp, api.saw_unauthorized())
    };
    state.note_unauthorized(unauthorized);
    resp
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_list(state, req)),
        "classes.create" => Some(handle_create(state, req)),
        "classes.update" => Some(handle_update(state, req)),
        "classes.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
