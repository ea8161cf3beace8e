pub mod access;
pub mod auth;
pub mod error;
pub mod menu_items;
pub mod menus;
pub mod ncdb;
pub mod notify;
pub mod responses;
pub mod restaurants;
pub mod session;
pub mod types;
pub mod uploads;

use ncdb::{NcdbClient, NcdbConfig};
use notify::Notifier;
use session::AuthConfig;
use std::sync::Arc;

/// Shared application state, built once at process start.
pub struct AppState {
    pub ncdb: NcdbClient,
    pub auth: AuthConfig,
    pub notifier: Option<Notifier>,
}

impl AppState {
    pub fn new(ncdb: NcdbClient, auth: AuthConfig, notifier: Option<Notifier>) -> Arc<Self> {
        Arc::new(Self {
            ncdb,
            auth,
            notifier,
        })
    }

    /// Build state from the environment. Secrets are read exactly once here;
    /// nothing else in the tree touches the environment for configuration.
    pub fn from_env() -> anyhow::Result<Arc<Self>> {
        let session_secret = std::env::var("ALLERQ_SESSION_SECRET")
            .map_err(|_| anyhow::anyhow!("ALLERQ_SESSION_SECRET must be set"))?;
        let cookie_name = std::env::var("ALLERQ_COOKIE_NAME")
            .unwrap_or_else(|_| "allerq_session".to_string());
        let session_ttl_seconds = std::env::var("ALLERQ_SESSION_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(86_400);
        let auth = AuthConfig::new(session_secret, cookie_name, session_ttl_seconds);

        let ncdb = NcdbClient::new(NcdbConfig {
            base_url: std::env::var("NCDB_BASE_URL")
                .unwrap_or_else(|_| "https://api.nocodebackend.com".to_string()),
            instance: std::env::var("NCDB_INSTANCE")
                .map_err(|_| anyhow::anyhow!("NCDB_INSTANCE must be set"))?,
            secret_key: std::env::var("NCDB_SECRET_KEY")
                .map_err(|_| anyhow::anyhow!("NCDB_SECRET_KEY must be set"))?,
        });

        let notifier = std::env::var("OPS_WEBHOOK_URL").ok().map(Notifier::new);

        Ok(Self::new(ncdb, auth, notifier))
    }
}
