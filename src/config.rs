use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use rusqlite::Connection;
use tracing::{info, warn};

use crate::db;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
const SETTINGS_KEY: &str = "config.overrides";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_base_url: String,
    pub timeout: Duration,
    /// Upper bound on concurrent per-submission requests.
    pub fanout_limit: usize,
    pub workspace: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_millis(10_000),
            fanout_limit: 8,
            workspace: None,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let defaults = Config::default();
        let fanout: usize = try_load("CLASSROOMD_FANOUT", defaults.fanout_limit);
        Self {
            api_base_url: try_load("CLASSROOMD_API_URL", defaults.api_base_url),
            timeout: Duration::from_millis(try_load("CLASSROOMD_TIMEOUT_MS", 10_000u64)),
            fanout_limit: fanout.max(1),
            workspace: env::var("CLASSROOMD_WORKSPACE").ok().map(PathBuf::from),
        }
    }

    /// Applies overrides persisted by `session.configure`.
    pub fn apply_stored(&mut self, conn: &Connection) {
        match db::settings_get_json(conn, SETTINGS_KEY) {
            Ok(Some(v)) => self.apply_json(&v),
            Ok(None) => {}
            Err(e) => warn!("Ignoring stored config overrides: {e}"),
        }
    }

    pub fn apply_json(&mut self, v: &serde_json::Value) {
        if let Some(url) = v.get("apiBaseUrl").and_then(|x| x.as_str()) {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().to_string();
            }
        }
        if let Some(ms) = v.get("timeoutMs").and_then(|x| x.as_u64()) {
            self.timeout = Duration::from_millis(ms.max(1));
        }
        if let Some(n) = v.get("fanoutLimit").and_then(|x| x.as_u64()) {
            self.fanout_limit = (n as usize).max(1);
        }
    }

    pub fn store_overrides(&self, conn: &Connection) -> anyhow::Result<()> {
        db::settings_set_json(
            conn,
            SETTINGS_KEY,
            &serde_json::json!({
                "apiBaseUrl": self.api_base_url,
                "timeoutMs": self.timeout.as_millis() as u64,
                "fanoutLimit": self.fanout_limit,
            }),
        )
    }
}

fn try_load<T: FromStr>(key: &str, default: T) -> T
where
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value: {e}, using default");
            default
        }),
        Err(_) => {
            info!("{key} not set, using default");
            default
        }
    }
}
