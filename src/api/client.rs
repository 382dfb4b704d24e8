use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::error::ApiError;
use super::transport::{Body, HttpRequest, Method, Transport};

/// Authenticated handle on the backend, passed explicitly to every call site.
pub struct ApiClient<'a> {
    transport: &'a dyn Transport,
    base_url: String,
    token: Option<String>,
    saw_unauthorized: AtomicBool,
}

impl<'a> ApiClient<'a> {
    pub fn new(transport: &'a dyn Transport, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            token: None,
            saw_unauthorized: AtomicBool::new(false),
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// True once any request on this client came back 401.
    pub fn saw_unauthorized(&self) -> bool {
        self.saw_unauthorized.load(Ordering::Relaxed)
    }

    pub fn get_value(&self, path: &str) -> Result<serde_json::Value, ApiError> {
        self.send(Method::Get, path, Body::Empty)
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let v = self.get_value(path)?;
        serde_json::from_value(v).map_err(|e| ApiError::Decode(format!("{path}: {e}")))
    }

    pub fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, ApiError> {
        self.send(Method::Post, path, Body::Json(body))
    }

    pub fn patch_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, ApiError> {
        self.send(Method::Patch, path, Body::Json(body))
    }

    pub fn post_form(
        &self,
        path: &str,
        fields: Vec<(String, String)>,
    ) -> Result<serde_json::Value, ApiError> {
        self.send(Method::Post, path, Body::Form(fields))
    }

    pub fn delete(&self, path: &str) -> Result<serde_json::Value, ApiError> {
        self.send(Method::Delete, path, Body::Empty)
    }

    fn send(&self, method: Method, path: &str, body: Body) -> Result<serde_json::Value, ApiError> {
        let req = HttpRequest {
            method,
            path: path.to_string(),
            body,
            bearer: self.token.clone(),
        };
        let resp = match self.transport.send(&self.base_url, &req) {
            Ok(r) => r,
            Err(e) => {
                debug!(method = method.as_str(), path, error = %e, "request did not complete");
                return Err(ApiError::Network(e));
            }
        };
        debug!(method = method.as_str(), path, status = resp.status, "response");

        if !resp.is_success() {
            let err = ApiError::from_status(resp.status, &resp.body);
            if err.is_unauthorized() {
                warn!(path, "backend rejected the session token");
                self.saw_unauthorized.store(true, Ordering::Relaxed);
            }
            return Err(err);
        }

        if resp.body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&resp.body).map_err(|e| ApiError::Decode(format!("{path}: {e}")))
    }
}

/// Accepts a bare JSON array or an object wrapping one under any of `keys`.
pub fn as_list(value: serde_json::Value, keys: &[&str]) -> Option<Vec<serde_json::Value>> {
    match value {
        serde_json::Value::Array(items) => Some(items),
        serde_json::Value::Object(mut map) => keys.iter().find_map(|k| match map.remove(*k) {
            Some(serde_json::Value::Array(items)) => Some(items),
            _ => None,
        }),
        _ => None,
    }
}
