//! Configuration management for hkdist.
//!
//! Settings come from an optional TOML file (`HKDIST_CONFIG`, else
//! `hkdist.toml` in the working directory) and are then overridden by the
//! environment variables the deployment sets.

use crate::database::DatabaseConfig;
use hk_core::{HkError, Result, StorageConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete hkdist configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Gzipped executables
    pub dist_store: StorageConfig,
    /// hkdiff files keyed by SHA-1
    pub patch_store: StorageConfig,
    #[serde(rename = "gen")]
    pub generator: GenConfig,
    pub build: BuildConfig,
}

/// `hkdist web` settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Reject plain-http requests forwarded by the router
    pub https_only: bool,
    /// Base URL of the identity API used to authenticate uploads
    pub identity_url: String,
    /// Only accounts whose email ends with this may upload
    pub staff_domain: String,
    /// Timeout for identity API calls
    pub auth_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            https_only: false,
            identity_url: "https://api.heroku.com".to_string(),
            staff_domain: "@heroku.com".to_string(),
            auth_timeout_seconds: 10,
        }
    }
}

/// `hkdist gen` settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenConfig {
    /// Number of diff workers
    pub workers: usize,
    /// Pause between generation passes
    pub interval_seconds: u64,
    /// How long to wait for dispatched patches to show up in the database
    pub deadline_seconds: u64,
    /// Poll period of the completion check
    pub poll_seconds: u64,
}

impl Default for GenConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            interval_seconds: 60,
            deadline_seconds: 600,
            poll_seconds: 5,
        }
    }
}

impl GenConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_seconds)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_secs(self.poll_seconds.max(1))
    }
}

/// `hkdist build` settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// hkdist server the build registers with, may carry user info
    pub dist_url: String,
    /// Command name of the artifact
    pub name: String,
    pub branch: String,
    pub repo: String,
    /// Checkout directory, removed before every build
    pub work_dir: PathBuf,
    /// Build command run inside the checkout
    pub command: Vec<String>,
    /// Produced binary, relative to the checkout
    pub binary_path: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            dist_url: String::new(),
            name: String::new(),
            branch: String::new(),
            repo: "https://github.com/heroku/hk.git".to_string(),
            work_dir: PathBuf::from("hk"),
            command: vec![
                "cargo".to_string(),
                "build".to_string(),
                "--release".to_string(),
            ],
            binary_path: PathBuf::from("target/release/hk"),
        }
    }
}

impl DistConfig {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| HkError::config(format!("{}: {}", path.display(), e)))
    }

    /// Load configuration with the following precedence:
    /// 1. Environment variables
    /// 2. Configuration file
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let path = std::env::var("HKDIST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("hkdist.toml"));

        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Override settings from environment-style lookups
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| var(name).filter(|v| !v.is_empty());

        if let Some(url) = get("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(port) = get("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| HkError::config(format!("bad PORT {:?}", port)))?;
        }
        if let Some(https_only) = get("HTTPSONLY") {
            self.server.https_only = matches!(https_only.as_str(), "1" | "true" | "yes");
        }
        if let Some(url) = get("IDENTITY_URL") {
            self.server.identity_url = url;
        }
        if let Some(url) = get("DISTURL") {
            self.build.dist_url = url;
        }
        if let Some(location) = get("S3DISTURL") {
            self.dist_store.location = location;
        }
        if let Some(location) = get("S3PATCHURL") {
            self.patch_store.location = location;
        }
        if let Some(name) = get("BUILDNAME") {
            self.build.name = name;
        }
        if let Some(branch) = get("BUILDBRANCH") {
            self.build.branch = branch;
        }
        if let (Some(key), Some(secret)) = (get("S3_ACCESS_KEY"), get("S3_SECRET_KEY")) {
            for store in [&mut self.dist_store, &mut self.patch_store] {
                store.access_key_id = Some(key.clone());
                store.secret_access_key = Some(secret.clone());
            }
        }
        if let Some(workers) = get("GEN_WORKERS") {
            self.generator.workers = workers
                .parse()
                .map_err(|_| HkError::config(format!("bad GEN_WORKERS {:?}", workers)))?;
        }
        Ok(())
    }

    /// Fail unless every named setting is present
    pub fn require(&self, settings: &[&str]) -> Result<()> {
        for setting in settings {
            let present = match *setting {
                "DATABASE_URL" => !self.database.url.is_empty(),
                "DISTURL" => !self.build.dist_url.is_empty(),
                "S3DISTURL" => !self.dist_store.location.is_empty(),
                "S3PATCHURL" => !self.patch_store.location.is_empty(),
                "BUILDNAME" => !self.build.name.is_empty(),
                "BUILDBRANCH" => !self.build.branch.is_empty(),
                other => return Err(HkError::internal(format!("unknown setting {}", other))),
            };
            if !present {
                return Err(HkError::config(format!("need env: {}", setting)));
            }
        }
        Ok(())
    }
}
