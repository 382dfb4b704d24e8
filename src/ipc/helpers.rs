use rusqlite::Connection;
use serde::de::DeserializeOwned;

use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};

pub fn required_i64(req: &Request, key: &str) -> Result<i64, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing params.{key}"), None))
}

pub fn optional_i64(req: &Request, key: &str) -> Option<i64> {
    req.params.get(key).and_then(|v| v.as_i64())
}

pub fn required_str<'r>(req: &'r Request, key: &str) -> Result<&'r str, serde_json::Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim()),
        _ => Err(err(&req.id, "bad_params", format!("missing params.{key}"), None)),
    }
}

/// Deserializes the whole params object into `T`.
pub fn params_as<T: DeserializeOwned>(req: &Request) -> Result<T, serde_json::Value> {
    serde_json::from_value(req.params.clone())
        .map_err(|e| err(&req.id, "bad_params", e.to_string(), None))
}

pub fn require_db<'s>(state: &'s AppState, req: &Request) -> Result<&'s Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn require_session(state: &AppState, req: &Request) -> Result<(), serde_json::Value> {
    if state.session.is_signed_in() {
        Ok(())
    } else {
        Err(err(
            &req.id,
            "unauthorized",
            "sign in first",
            Some(serde_json::json!({ "redirect": "/login" })),
        ))
    }
}
