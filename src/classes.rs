use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::{as_list, ApiClient, ApiError};
use crate::auth::Role;
use crate::resolve::{resolve_first, Outcome, Strategy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub teacher_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_count: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassList {
    pub classes: Vec<ClassRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<&'static str>,
    #[serde(skip)]
    pub unauthorized: bool,
}

/// Endpoints that list the classes visible to `role`, in priority order.
/// Admins see every class; teachers the ones assigned to them; students the
/// ones they are enrolled in. `/classes/student/` lists every class in the
/// system and is never a student source.
pub fn class_paths(role: Role) -> Vec<(&'static str, &'static str)> {
    match role {
        Role::Admin => vec![("all_classes", "/classes/")],
        Role::Teacher => vec![("teacher_classes", "/teachers/me/classes")],
        Role::Student => vec![("student_classes", "/students/me/classes")],
    }
}

fn fetch_classes(api: &ApiClient, path: &str) -> Outcome<Vec<ClassRecord>> {
    match api.get_value(path) {
        Ok(v) => match as_list(v, &["classes", "items"]) {
            Some(items) => Outcome::Hit(
                items
                    .into_iter()
                    .filter_map(|item| match serde_json::from_value(item) {
                        Ok(c) => Some(c),
                        Err(e) => {
                            warn!(path, error = %e, "skipping malformed class entry");
                            None
                        }
                    })
                    .collect(),
            ),
            None => Outcome::Fault(ApiError::Decode(format!("{path}: expected a list"))),
        },
        Err(e) => Outcome::from(Err::<Vec<ClassRecord>, _>(e)),
    }
}

/// Read path: failures degrade to an empty list.
pub fn list_classes(api: &ApiClient, role: Role) -> ClassList {
    let strategies = class_paths(role)
        .into_iter()
        .map(|(name, path)| Strategy::new(name, move || fetch_classes(api, path)))
        .collect();
    let r = resolve_first("classes", strategies);
    ClassList {
        strategy: r.winner(),
        unauthorized: r.unauthorized,
        classes: r.value.unwrap_or_default(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassInput {
    pub name: Option<String>,
    pub code: Option<String>,
    #[serde(rename = "teacherId")]
    pub teacher_id: Option<i64>,
    pub description: Option<String>,
}

impl ClassInput {
    fn body(&self) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        if let Some(n) = self.name.as_deref() {
            body.insert("name".into(), serde_json::json!(n.trim()));
        }
        if let Some(c) = self.code.as_deref() {
            body.insert("code".into(), serde_json::json!(c.trim()));
        }
        if let Some(t) = self.teacher_id {
            body.insert("teacher_id".into(), serde_json::json!(t));
        }
        if let Some(d) = self.description.as_deref() {
            body.insert("description".into(), serde_json::json!(d));
        }
        serde_json::Value::Object(body)
    }
}

fn non_empty(field: &str, v: Option<&str>) -> Result<(), ApiError> {
    match v {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(ApiError::Validation(format!("{field} must not be empty"))),
    }
}

pub fn create_class(api: &ApiClient, input: &ClassInput) -> Result<ClassRecord, ApiError> {
    non_empty("name", input.name.as_deref())?;
    non_empty("code", input.code.as_deref())?;
    let v = api.post_json("/classes/", input.body())?;
    serde_json::from_value(v).map_err(|e| ApiError::Decode(format!("/classes/: {e}")))
}

pub fn update_class(api: &ApiClient, class_id: i64, input: &ClassInput) -> Result<ClassRecord, ApiError> {
    if input.name.is_some() {
        non_empty("name", input.name.as_deref())?;
    }
    if input.code.is_some() {
        non_empty("code", input.code.as_deref())?;
    }
    let path = format!("/classes/{class_id}");
    let v = api.patch_json(&path, input.body())?;
    serde_json::from_value(v).map_err(|e| ApiError::Decode(format!("{path}: {e}")))
}

pub fn delete_class(api: &ApiClient, class_id: i64) -> Result<(), ApiError> {
    api.delete(&format!("/classes/{class_id}"))?;
    Ok(())
}
