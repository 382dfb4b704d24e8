use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;
use tracing::{info, warn};

use crate::api::{ApiClient, HttpTransport, Transport};
use crate::auth::{self, Session};
use crate::config::Config;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: Config,
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: Session,
    pub transport: Box<dyn Transport>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let transport = Box::new(HttpTransport::new(config.timeout));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: Config, transport: Box<dyn Transport>) -> Self {
        Self {
            config,
            workspace: None,
            db: None,
            session: Session::default(),
            transport,
        }
    }

    /// Client for the current session; carries the bearer token when signed in.
    pub fn api(&self) -> ApiClient<'_> {
        ApiClient::new(self.transport.as_ref(), self.config.api_base_url.clone())
            .with_token(self.session.token.clone())
    }

    /// Drops the session after the backend refused its token.
    pub fn note_unauthorized(&mut self, unauthorized: bool) {
        if !unauthorized || !self.session.is_signed_in() {
            return;
        }
        info!("session token rejected; signing out");
        self.session = Session::default();
        if let Some(conn) = self.db.as_ref() {
            if let Err(e) = auth::evict(conn) {
                warn!("failed to clear stored session: {e:#}");
            }
        }
    }
}
