use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{ApiClient, ApiError, Transport};
use crate::db;

const TOKEN_KEY: &str = "auth.token";
const USER_KEY: &str = "auth.user";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl CurrentUser {
    pub fn display_name(&self) -> String {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(f), Some(l)) if !f.is_empty() && !l.is_empty() => format!("{f} {l}"),
            (Some(f), _) if !f.is_empty() => f.to_string(),
            (_, Some(l)) if !l.is_empty() => l.to_string(),
            _ => self.username.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<CurrentUser>,
}

impl Session {
    pub fn is_signed_in(&self) -> bool {
        self.token.is_some()
    }

    pub fn role(&self) -> Option<Role> {
        self.user.as_ref().map(|u| u.role)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// OAuth2 password grant against `POST /token`, then `GET /users/me`.
pub fn login(
    transport: &dyn Transport,
    base_url: &str,
    username: &str,
    password: &str,
) -> Result<Session, ApiError> {
    if username.trim().is_empty() || password.is_empty() {
        return Err(ApiError::Validation(
            "username and password are required".into(),
        ));
    }

    let anon = ApiClient::new(transport, base_url);
    let resp = anon.post_form(
        "/token",
        vec![
            ("grant_type".into(), "password".into()),
            ("username".into(), username.trim().to_string()),
            ("password".into(), password.to_string()),
        ],
    )?;
    let token: TokenResponse =
        serde_json::from_value(resp).map_err(|e| ApiError::Decode(format!("/token: {e}")))?;

    let api = ApiClient::new(transport, base_url).with_token(Some(token.access_token.clone()));
    let user: CurrentUser = api.get("/users/me")?;
    info!(user_id = user.id, role = ?user.role, "signed in");

    Ok(Session {
        token: Some(token.access_token),
        user: Some(user),
    })
}

pub fn persist(conn: &Connection, session: &Session) -> anyhow::Result<()> {
    match session.token.as_deref() {
        Some(t) => db::settings_set_json(conn, TOKEN_KEY, &serde_json::json!(t))?,
        None => db::settings_delete(conn, TOKEN_KEY)?,
    }
    match session.user.as_ref() {
        Some(u) => db::settings_set_json(conn, USER_KEY, &serde_json::to_value(u)?)?,
        None => db::settings_delete(conn, USER_KEY)?,
    }
    Ok(())
}

pub fn restore(conn: &Connection) -> anyhow::Result<Session> {
    let token = db::settings_get_json(conn, TOKEN_KEY)?
        .and_then(|v| v.as_str().map(|s| s.to_string()));
    let user = match db::settings_get_json(conn, USER_KEY)? {
        Some(v) => serde_json::from_value(v).ok(),
        None => None,
    };
    Ok(Session { token, user })
}

pub fn evict(conn: &Connection) -> anyhow::Result<()> {
    db::settings_delete(conn, TOKEN_KEY)?;
    db::settings_delete(conn, USER_KEY)?;
    Ok(())
}
