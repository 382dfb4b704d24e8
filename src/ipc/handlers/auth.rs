use crate::api::ApiError;
use crate::auth::{self, CurrentUser, Session};
use crate::ipc::error::{api_err, err, ok};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use tracing::warn;

fn user_json(user: &CurrentUser) -> serde_json::Value {
    json!({
        "user": user,
        "displayName": user.display_name(),
        "role": user.role,
    })
}

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let username = match required_str(req, "username") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(password) = req.params.get("password").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing params.password", None);
    };

    let session = match auth::login(
        state.transport.as_ref(),
        &state.config.api_base_url,
        username,
        password,
    ) {
        Ok(s) => s,
        Err(e) => return api_err(&req.id, &e),
    };

    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = auth::persist(conn, &session) {
            warn!("session not persisted: {e:#}");
        }
    }
    let result = match session.user.as_ref() {
        Some(u) => user_json(u),
        None => json!({}),
    };
    state.session = session;
    ok(&req.id, result)
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.session = Session::default();
    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = auth::evict(conn) {
            return err(&req.id, "db_update_failed", format!("{e:#}"), None);
        }
    }
    ok(&req.id, json!({ "signedIn": false }))
}

/// Fresh profile from the backend; falls back to the cached one while the
/// backend is unreachable.
fn handle_me(state: &mut AppState, req: &Request) -> serde_json::Value {
    if !state.session.is_signed_in() {
        return err(
            &req.id,
            "unauthorized",
            "sign in first",
            Some(json!({ "redirect": "/login" })),
        );
    }
    let fetched: Result<CurrentUser, ApiError> = state.api().get("/users/me");
    match fetched {
        Ok(user) => {
            let result = user_json(&user);
            state.session.user = Some(user);
            if let Some(conn) = state.db.as_ref() {
                if let Err(e) = auth::persist(conn, &state.session) {
                    warn!("session not persisted: {e:#}");
                }
            }
            ok(&req.id, result)
        }
        Err(ApiError::Network(msg)) => match state.session.user.as_ref() {
            Some(u) => {
                let mut result = user_json(u);
                result["cached"] = json!(true);
                ok(&req.id, result)
            }
            None => api_err(&req.id, &ApiError::Network(msg)),
        },
        Err(e) => {
            state.note_unauthorized(e.is_unauthorized());
            api_err(&req.id, &e)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(handle_login(state, req)),
        "auth.logout" => Some(handle_logout(state, req)),
        "auth.me" => Some(handle_me(state, req)),
        _ => None,
    }
}
