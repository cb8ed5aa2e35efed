//! Configuration management for the hk CLI.
//!
//! Settings come from `~/.hk/config.toml` (or the `--config` path) and are
//! then overridden by environment variables.

use anyhow::Context;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where releases are looked up and downloaded
    #[serde(default)]
    pub dist: DistSettings,

    /// Self-update behaviour
    #[serde(default)]
    pub update: UpdateSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistSettings {
    /// hkdist API
    #[serde(default = "default_dist_url")]
    pub url: String,

    /// Public base URL of the gzipped executables
    #[serde(default = "default_bin_url")]
    pub bin_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for DistSettings {
    fn default() -> Self {
        Self {
            url: default_dist_url(),
            bin_url: default_bin_url(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl DistSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_dist_url() -> String {
    "https://hk.heroku.com".to_string()
}

fn default_bin_url() -> String {
    "https://hkdist.s3.amazonaws.com".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSettings {
    /// Holds the `cktime` file
    #[serde(default = "default_update_dir")]
    pub dir: PathBuf,

    /// Look for updates in the background after commands
    #[serde(default = "default_background_check")]
    pub background_check: bool,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            dir: default_update_dir(),
            background_check: default_background_check(),
        }
    }
}

fn default_update_dir() -> PathBuf {
    hk_home().join("update")
}

fn default_background_check() -> bool {
    true
}

/// `~/.hk`, or `.hk` when there is no home directory
pub fn hk_home() -> PathBuf {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".hk"))
        .unwrap_or_else(|| PathBuf::from(".hk"))
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration with the following precedence:
    /// 1. Environment variables
    /// 2. Configuration file (`path`, else `~/.hk/config.toml` if present)
    /// 3. Default values
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = hk_home().join("config.toml");
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Override settings from environment-style lookups
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| var(name).filter(|v| !v.is_empty());

        if let Some(url) = get("HKDIST_URL") {
            self.dist.url = url;
        }
        if let Some(url) = get("HKBIN_URL") {
            self.dist.bin_url = url;
        }
        if let Some(dir) = get("HK_UPDATE_DIR") {
            self.update.dir = PathBuf::from(dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.dist.url, "https://hk.heroku.com");
        assert_eq!(config.dist.bin_url, "https://hkdist.s3.amazonaws.com");
        assert_eq!(config.dist.timeout(), Duration::from_secs(30));
        assert!(config.update.dir.ends_with(".hk/update"));
        assert!(config.update.background_check);
    }

    #[test]
    fn test_config_from_file() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.toml");

        let config_content = r#"
[dist]
url = "https://hkdist.example.com"
timeout_seconds = 5

[update]
dir = "/tmp/hk-update"
background_check = false
"#;

        let mut file = std::fs::File::create(&config_path)?;
        file.write_all(config_content.as_bytes())?;

        let config = Config::from_file(&config_path)?;
        assert_eq!(config.dist.url, "https://hkdist.example.com");
        assert_eq!(config.dist.bin_url, "https://hkdist.s3.amazonaws.com");
        assert_eq!(config.dist.timeout_seconds, 5);
        assert_eq!(config.update.dir, PathBuf::from("/tmp/hk-update"));
        assert!(!config.update.background_check);
        Ok(())
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(|name| match name {
            "HKDIST_URL" => Some("http://localhost:5000".to_string()),
            "HK_UPDATE_DIR" => Some("/var/tmp/hk".to_string()),
            "HKBIN_URL" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.dist.url, "http://localhost:5000");
        assert_eq!(config.update.dir, PathBuf::from("/var/tmp/hk"));
        assert_eq!(config.dist.bin_url, "https://hkdist.s3.amazonaws.com");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Config::load(Some(&temp_dir.path().join("nope.toml"))).is_err());
    }
}
