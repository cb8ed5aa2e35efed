//! Application state shared across handlers.

use crate::config::ServerConfig;
use crate::database::DatabaseManager;
use hk_core::{HkError, ObjectStore, Result};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseManager>,
    /// Gzipped executables, redirected to by `GET /{cmd}.gz`
    pub dist_store: Arc<dyn ObjectStore>,
    /// hkdiff files, redirected to by `GET .../next/{plat}.hkdiff`
    pub patch_store: Arc<dyn ObjectStore>,
    /// Client for identity API calls
    pub http: reqwest::Client,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseManager>,
        dist_store: Arc<dyn ObjectStore>,
        patch_store: Arc<dyn ObjectStore>,
        config: ServerConfig,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.auth_timeout_seconds))
            .build()
            .map_err(|e| HkError::config(format!("http client: {}", e)))?;

        Ok(Self {
            db,
            dist_store,
            patch_store,
            http,
            config: Arc::new(config),
        })
    }
}
