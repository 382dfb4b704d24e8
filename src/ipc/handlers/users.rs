use crate::api::ApiError;
use crate::auth::Role;
use crate::ipc::error::{api_err, err, ok};
use crate::ipc::helpers::{params_as, required_i64};
use crate::ipc::types::{AppState, Request};
use crate::users::{create_user, delete_user, list_users, update_user, UserInput};
use serde_json::json;

fn require_admin(state: &AppState, req: &Request) -> Result<(), serde_json::Value> {
    match state.session.role() {
        Some(Role::Admin) => Ok(()),
        Some(_) => Err(err(&req.id, "forbidden", "administrators only", None)),
        None => Err(err(
            &req.id,
            "unauthorized",
            "sign in first",
            Some(json!({ "redirect": "/login" })),
        )),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_admin(state, req) {
        return e;
    }
    let (users, unauthorized) = {
        let api = state.api();
        let users = list_users(&api);
        (users, api.saw_unauthorized())
    };
    state.note_unauthorized(unauthorized);
    if unauthorized {
        return api_err(&req.id, &ApiError::session_expired());
    }
    ok(&req.id, json!({ "users": users }))
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_admin(state, req) {
        return e;
    }
    let input: UserInput = match params_as(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (resp, unauthorized) = {
        let api = state.api();
        let resp = match create_user(&api, &input) {
            Ok(u) => ok(&req.id, json!({ "user": u })),
            Err(e) => api_err(&req.id, &e),
        };
        (resp, api.saw_unauthorized())
    };
    state.note_unauthorized(unauthorized);
    resp
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_admin(state, req) {
        return e;
    }
    let user_id = match required_i64(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let patch = req.params.get("patch").cloned().unwrap_or_else(|| json!({}));
    let input: UserInput = match serde_json::from_value(patch) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    let (resp, unauthorized) = {
        let api = state.api();
        let resp = match update_user(&api, user_id, &input) {
            Ok(u) => ok(&req.id, json!({ "user": u })),
            Err(e) => api_err(&req.id, &e),
        };
        (resp, api.saw_unauthorized())
    };
    state.note_unauthorized(unauthorized);
    resp
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_admin(state, req) {
        return e;
    }
    let user_id = match required_i64(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (resp, unauthorized) = {
        let api = state.api();
        let resp = match delete_user(&api, user_id) {
            Ok(()) => ok(&req.id, json!({ "userId": user_id, "deleted": true })),
            Err(e) => api_err(&req.id, &e),
        };
        (resp, api.saw_unauthorized())
    };
    state.note_unauthorized(unauthorized);
    resp
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.list" => Some(handle_list(state, req)),
        "users.create" => Some(handle_create(state, req)),
        "users.update" => Some(handle_update(state, req)),
        "users.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
