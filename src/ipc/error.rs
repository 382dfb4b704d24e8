use serde_json::json;

use crate::api::ApiError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Maps a backend failure onto the envelope. A rejected token tells the UI
/// where to send the user.
pub fn api_err(id: &str, e: &ApiError) -> serde_json::Value {
    let details = match e {
        ApiError::Unauthorized(_) => Some(json!({ "redirect": "/login" })),
        ApiError::Server { status, .. } => Some(json!({ "status": status })),
        _ => None,
    };
    err(id, e.code(), e.to_string(), details)
}

pub fn internal_err(id: &str, e: anyhow::Error) -> serde_json::Value {
    err(id, "internal", format!("{e:#}"), None)
}
