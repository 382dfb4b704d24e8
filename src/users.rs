use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::{as_list, ApiClient, ApiError};
use crate::auth::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserInput {
    pub username: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
}

impl UserInput {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(u) = self.username.as_deref() {
            if u.trim().chars().count() < 3 {
                return Err(ApiError::Validation(
                    "Username must be at least 3 characters long".into(),
                ));
            }
        }
        if let Some(p) = self.password.as_deref() {
            if p.chars().count() < 6 {
                return Err(ApiError::Validation(
                    "Password must be at least 6 characters long".into(),
                ));
            }
        }
        Ok(())
    }

    fn body(&self) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        if let Some(u) = self.username.as_deref() {
            body.insert("username".into(), serde_json::json!(u.trim()));
        }
        if let Some(p) = self.password.as_deref() {
            body.insert("password".into(), serde_json::json!(p));
        }
        if let Some(r) = self.role {
            body.insert("role".into(), serde_json::json!(r));
        }
        serde_json::Value::Object(body)
    }
}

/// Read path: any failure yields an empty list.
pub fn list_users(api: &ApiClient) -> Vec<UserRecord> {
    api.get_value("/users/")
        .ok()
        .and_then(|v| as_list(v, &["users", "items"]))
        .map(|items| {
            items
                .into_iter()
                .filter_map(|item| match serde_json::from_value(item) {
                    Ok(u) => Some(u),
                    Err(e) => {
                        warn!(error = %e, "skipping malformed user entry");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn create_user(api: &ApiClient, input: &UserInput) -> Result<UserRecord, ApiError> {
    if input.username.is_none() || input.password.is_none() || input.role.is_none() {
        return Err(ApiError::Validation(
            "username, password and role are required".into(),
        ));
    }
    input.validate()?;
    let v = api.post_json("/users/", input.body())?;
    serde_json::from_value(v).map_err(|e| ApiError::Decode(format!("/users/: {e}")))
}

pub fn update_user(api: &ApiClient, user_id: i64, input: &UserInput) -> Result<UserRecord, ApiError> {
    input.validate()?;
    let path = format!("/users/{user_id}");
    let v = api.patch_json(&path, input.body())?;
    serde_json::from_value(v).map_err(|e| ApiError::Decode(format!("{path}: {e}")))
}

pub fn delete_user(api: &ApiClient, user_id: i64) -> Result<(), ApiError> {
    api.delete(&format!("/users/{user_id}"))?;
    Ok(())
}
