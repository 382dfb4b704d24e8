use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Path plus optional query string, relative to the API base URL.
    pub path: String,
    pub body: Body,
    pub bearer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Everything that leaves the process over HTTP goes through here.
///
/// `Err` means no response arrived at all (connect refused, DNS, timeout);
/// any HTTP status, including errors, comes back as `Ok`.
pub trait Transport: Send + Sync {
    fn send(&self, base_url: &str, req: &HttpRequest) -> Result<HttpResponse, String>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn send(&self, base_url: &str, req: &HttpRequest) -> Result<HttpResponse, String> {
        let url = join_url(base_url, &req.path);
        let mut builder = match req.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Patch => self.client.patch(&url),
            Method::Delete => self.client.delete(&url),
        };
        builder = builder.header(ACCEPT, "application/json");
        if let Some(token) = req.bearer.as_deref() {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder = match &req.body {
            Body::Empty => builder,
            Body::Json(v) => builder.json(v),
            Body::Form(fields) => builder.form(fields),
        };

        let resp = builder.send().map_err(|e| e.to_string())?;
        let status = resp.status().as_u16();
        let body = resp.text().map_err(|e| e.to_string())?;
        Ok(HttpResponse { status, body })
    }
}

pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::join_url;

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(
            join_url("http://api.local/", "/violations/"),
            "http://api.local/violations/"
        );
        assert_eq!(
            join_url("http://api.local", "users/me"),
            "http://api.local/users/me"
        );
    }
}
