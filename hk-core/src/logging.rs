//! Logging setup shared by `hk` and `hkdist`.
//!
//! Both binaries log through `tracing` to stderr. `hk` stays quiet unless
//! asked (`--verbose` or `HK_LOG`), `hkdist` logs at info with optional JSON
//! lines (`LOG_FORMAT=json`) for the log router.

use crate::{HkError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt as tfmt, prelude::*};

/// Targets that always follow the configured level, even when RUST_LOG is narrower
const OWN_TARGETS: &[&str] = &["hk", "hk_core", "hk_dist", "hkdist"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    pub format: LogFormat,
    /// Source file and line of each event
    pub location: bool,
    pub thread_ids: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Text,
    Json,
    /// Single-line events without targets, for the CLI
    Compact,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            location: false,
            thread_ids: false,
        }
    }
}

impl LogConfig {
    /// Settings for `hk`; `HK_LOG` overrides the level
    pub fn cli<F>(verbose: bool, var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let fallback = if verbose { "debug" } else { "warn" };
        Self {
            level: var("HK_LOG").unwrap_or_else(|| fallback.to_string()),
            format: LogFormat::Compact,
            location: false,
            thread_ids: false,
        }
    }

    /// Settings for `hkdist`; `HKDIST_LOG` and `LOG_FORMAT` apply
    pub fn server<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let format = match var("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };
        Self {
            level: var("HKDIST_LOG").unwrap_or_else(|| "info".to_string()),
            format,
            location: true,
            thread_ids: true,
        }
    }

    fn level(&self) -> Result<Level> {
        Level::from_str(&self.level)
            .map_err(|_| HkError::validation(format!("Invalid log level: {:?}", self.level)))
    }

    fn filter(&self) -> Result<EnvFilter> {
        let level = self.level()?.to_string().to_lowercase();
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));
        for target in OWN_TARGETS {
            let directive = format!("{}={}", target, level)
                .parse()
                .map_err(|e| HkError::config(format!("Bad log directive: {}", e)))?;
            filter = filter.add_directive(directive);
        }
        Ok(filter)
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let base = tfmt::layer()
            .with_writer(io::stderr)
            .with_file(self.location)
            .with_line_number(self.location)
            .with_thread_ids(self.thread_ids);
        match self.format {
            LogFormat::Text => base.boxed(),
            LogFormat::Json => base.json().boxed(),
            LogFormat::Compact => base.compact().with_target(false).boxed(),
        }
    }
}

/// Install the global subscriber
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = config.filter()?;
    tracing_subscriber::registry()
        .with(config.layer())
        .with(filter)
        .try_init()
        .map_err(|e| HkError::config(format!("Failed to initialize logging: {}", e)))?;

    tracing::debug!(level = %config.level, format = ?config.format, "Logging initialized");
    Ok(())
}

pub fn init_cli_logging(verbose: bool) -> Result<()> {
    init_logging(&LogConfig::cli(verbose, |name| std::env::var(name).ok()))
}

pub fn init_server_logging() -> Result<()> {
    init_logging(&LogConfig::server(|name| std::env::var(name).ok()))
}

/// Identifier tying together the events of one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Named operation whose messages share a span
pub struct LogContext {
    span: tracing::Span,
    id: CorrelationId,
}

impl LogContext {
    pub fn new(operation: &str, component: &str) -> Self {
        let id = CorrelationId::new();
        let span = tracing::info_span!("op", %operation, %component, id = %id);
        Self { span, id }
    }

    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub fn info(&self, message: &str) {
        self.span.in_scope(|| tracing::info!("{}", message));
    }

    pub fn warn(&self, message: &str) {
        self.span.in_scope(|| tracing::warn!("{}", message));
    }

    pub fn error(&self, message: &str) {
        self.span.in_scope(|| tracing::error!("{}", message));
    }

    pub fn debug(&self, message: &str) {
        self.span.in_scope(|| tracing::debug!("{}", message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_cli_levels() {
        assert_eq!(LogConfig::cli(false, env(&[])).level, "warn");
        assert_eq!(LogConfig::cli(true, env(&[])).level, "debug");
        assert_eq!(LogConfig::cli(false, env(&[("HK_LOG", "trace")])).level, "trace");
        assert_eq!(LogConfig::cli(false, env(&[])).format, LogFormat::Compact);
    }

    #[test]
    fn test_server_format() {
        let config = LogConfig::server(env(&[("LOG_FORMAT", "json"), ("HKDIST_LOG", "debug")]));
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "debug");
        assert_eq!(LogConfig::server(env(&[])).format, LogFormat::Text);
    }

    #[test]
    fn test_level_validation() {
        let mut config = LogConfig::default();
        assert_eq!(config.level().unwrap(), Level::INFO);
        config.level = "DEBUG".to_string();
        assert_eq!(config.level().unwrap(), Level::DEBUG);
        config.level = "loud".to_string();
        assert!(config.level().is_err());
        assert!(init_logging(&config).is_err());
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let a = CorrelationId::new();
        let b = CorrelationId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert_eq!(CorrelationId::from("gen-1".to_string()).to_string(), "gen-1");
    }

    #[test]
    fn test_log_context_ids_differ() {
        let a = LogContext::new("gen", "hkdist");
        let b = LogContext::new("gen", "hkdist");
        assert_ne!(a.id(), b.id());
    }
}
