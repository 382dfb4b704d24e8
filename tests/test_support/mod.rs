#![allow(dead_code)]

use classroomd::api::{Body, HttpRequest, HttpResponse, Method, Transport};
use serde_json::json;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

/// Sidecar pointed at a port nothing listens on, so every backend call fails fast.
pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_classroomd");
    let mut child = Command::new(exe)
        .env("CLASSROOMD_API_URL", "http://127.0.0.1:9")
        .env("CLASSROOMD_TIMEOUT_MS", "2000")
        .env_remove("CLASSROOMD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn classroomd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub body: Body,
    pub bearer: Option<String>,
}

#[derive(Default)]
struct Inner {
    routes: HashMap<(Method, String), (u16, String)>,
    calls: Vec<Call>,
    offline: bool,
}

/// In-process stand-in for the classroom backend. Unrouted paths answer 404,
/// or fail to connect once `offline` is set.
#[derive(Clone, Default)]
pub struct FakeBackend {
    inner: Arc<Mutex<Inner>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offline() -> Self {
        let fake = Self::default();
        fake.inner.lock().expect("fake lock").offline = true;
        fake
    }

    pub fn route(&self, method: Method, path: &str, status: u16, body: serde_json::Value) -> &Self {
        let text = if body.is_null() {
            String::new()
        } else {
            body.to_string()
        };
        self.inner
            .lock()
            .expect("fake lock")
            .routes
            .insert((method, path.to_string()), (status, text));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().expect("fake lock").calls.clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    pub fn boxed(&self) -> Box<dyn Transport> {
        Box::new(self.clone())
    }
}

impl Transport for FakeBackend {
    fn send(&self, _base_url: &str, req: &HttpRequest) -> Result<HttpResponse, String> {
        let mut inner = self.inner.lock().map_err(|e| e.to_string())?;
        inner.calls.push(Call {
            method: req.method,
            path: req.path.clone(),
            body: req.body.clone(),
            bearer: req.bearer.clone(),
        });
        match inner.routes.get(&(req.method, req.path.clone())) {
            Some((status, body)) => Ok(HttpResponse {
                status: *status,
                body: body.clone(),
            }),
            None if inner.offline => Err("connection refused".into()),
            None => Ok(HttpResponse {
                status: 404,
                body: json!({ "detail": "Not Found" }).to_string(),
            }),
        }
    }
}

pub fn violation_json(id: i64, student_id: i64, assignment_id: i64, kind: &str, at: &str) -> serde_json::Value {
    json!({
        "id": id,
        "student_id": student_id,
        "assignment_id": assignment_id,
        "violation_type": kind,
        "description": format!("{kind} observed"),
        "detected_at": at,
        "time_away_seconds": 30,
        "severity": "medium"
    })
}
