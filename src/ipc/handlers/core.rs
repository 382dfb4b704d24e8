use crate::api::HttpTransport;
use crate::auth;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "apiBaseUrl": state.config.api_base_url,
            "signedIn": state.session.is_signed_in(),
            "user": state.session.user,
        }),
    )
}

/// Opens (or creates) the workspace store and applies its config overrides.
/// A live session is carried into the workspace; otherwise the stored one
/// is restored.
pub fn open_workspace(state: &mut AppState, path: PathBuf) -> anyhow::Result<()> {
    let conn = db::open_db(&path)?;
    let before = state.config.timeout;
    state.config.apply_stored(&conn);
    if state.config.timeout != before {
        state.transport = Box::new(HttpTransport::new(state.config.timeout));
    }
    if state.session.is_signed_in() {
        if let Err(e) = auth::persist(&conn, &state.session) {
            warn!("session not persisted: {e:#}");
        }
    } else {
        match auth::restore(&conn) {
            Ok(session) => state.session = session,
            Err(e) => warn!("ignoring stored session: {e:#}"),
        }
    }
    info!(workspace = %path.display(), "workspace opened");
    state.workspace = Some(path);
    state.db = Some(conn);
    Ok(())
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match open_workspace(state, path.clone()) {
        Ok(()) => ok(
            &req.id,
            json!({
                "workspacePath": path.to_string_lossy(),
                "signedIn": state.session.is_signed_in(),
            }),
        ),
        Err(e) => err(&req.id, "db_open_failed", format!("{e:#}"), None),
    }
}

fn handle_session_configure(state: &mut AppState, req: &Request) -> serde_json::Value {
    if !req.params.is_object() {
        return err(&req.id, "bad_params", "params must be an object", None);
    }
    let before = state.config.timeout;
    state.config.apply_json(&req.params);
    if state.config.timeout != before {
        state.transport = Box::new(HttpTransport::new(state.config.timeout));
    }
    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = state.config.store_overrides(conn) {
            return err(&req.id, "db_update_failed", format!("{e:#}"), None);
        }
    }
    ok(
        &req.id,
        json!({
            "apiBaseUrl": state.config.api_base_url,
            "timeoutMs": state.config.timeout.as_millis() as u64,
            "fanoutLimit": state.config.fanout_limit,
            "persisted": state.db.is_some(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "session.configure" => Some(handle_session_configure(state, req)),
        _ => None,
    }
}
