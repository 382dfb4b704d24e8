use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    /// Carries the backend's detail when it sent one.
    #[error("{0}")]
    Unauthorized(String),

    #[error("not permitted for this role: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

const SESSION_EXPIRED: &str = "session expired, please sign in again";

impl ApiError {
    /// A rejected session with no backend detail.
    pub fn session_expired() -> Self {
        ApiError::Unauthorized(SESSION_EXPIRED.into())
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    /// Stable IPC error code for this failure class.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Network(_) => "network_error",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Validation(_) => "validation_failed",
            ApiError::Server { .. } => "server_error",
            ApiError::Decode(_) => "bad_response",
        }
    }

    /// Builds the error for a non-2xx response from its status and raw body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = extract_detail(body);
        match status {
            401 => ApiError::Unauthorized(detail.unwrap_or_else(|| SESSION_EXPIRED.into())),
            403 => ApiError::Forbidden(detail.unwrap_or_else(|| "forbidden".into())),
            404 => ApiError::NotFound(detail.unwrap_or_else(|| "not found".into())),
            400 | 422 => ApiError::Validation(detail.unwrap_or_else(|| "invalid request".into())),
            _ => ApiError::Server {
                status,
                message: detail.unwrap_or_else(|| format!("HTTP {status}")),
            },
        }
    }

    /// Absent endpoints and role-gated endpoints degrade to the next source.
    pub fn is_miss(&self) -> bool {
        matches!(self, ApiError::NotFound(_) | ApiError::Forbidden(_))
    }
}

/// Pulls a human-readable message out of a backend error body.
///
/// Handles `{"detail": "..."}` and the field-error form
/// `{"detail": [{"loc": [...], "msg": "..."}]}`, which is flattened to
/// `"loc: msg; loc: msg"`.
pub fn extract_detail(body: &str) -> Option<String> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    let detail = v.get("detail").or_else(|| v.get("message"))?;
    match detail {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|item| {
                    let msg = item.get("msg").and_then(|m| m.as_str())?;
                    let loc = item
                        .get("loc")
                        .and_then(|l| l.as_array())
                        .map(|l| {
                            l.iter()
                                .filter(|p| p.as_str() != Some("body"))
                                .map(|p| match p {
                                    serde_json::Value::String(s) => s.clone(),
                                    other => other.to_string(),
                                })
                                .collect::<Vec<_>>()
                                .join(".")
                        })
                        .unwrap_or_default();
                    if loc.is_empty() {
                        Some(msg.to_string())
                    } else {
                        Some(format!("{loc}: {msg}"))
                    }
                })
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("; "))
            }
        }
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_are_flattened() {
        let body = r#"{"detail":[
            {"loc":["body","username"],"msg":"Username must be at least 3 characters long"},
            {"loc":["body","password"],"msg":"Password must be at least 6 characters long"}
        ]}"#;
        assert_eq!(
            extract_detail(body).as_deref(),
            Some(
                "username: Username must be at least 3 characters long; \
                 password: Password must be at least 6 characters long"
            )
        );
    }

    #[test]
    fn status_classes_map_to_variants() {
        assert_eq!(ApiError::from_status(401, ""), ApiError::session_expired());
        assert_eq!(
            ApiError::from_status(401, r#"{"detail":"Incorrect username or password"}"#),
            ApiError::Unauthorized("Incorrect username or password".into())
        );
        assert!(ApiError::from_status(403, "").is_miss());
        assert!(ApiError::from_status(404, r#"{"detail":"Assignment not found"}"#).is_miss());
        assert_eq!(
            ApiError::from_status(400, r#"{"detail":"Incorrect username or password"}"#),
            ApiError::Validation("Incorrect username or password".into())
        );
        assert_eq!(
            ApiError::from_status(502, "<html>bad gateway</html>").code(),
            "server_error"
        );
    }
}
