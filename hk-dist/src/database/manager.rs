//! Database manager and coordination layer

use crate::database::{
    config::DatabaseConfig,
    connection::{DatabaseConnection, DatabasePool},
    current::CurrentService,
    error::DbResult,
    modtime::ModService,
    patch::{ConvergeStats, PatchEdge, PatchService},
    release::ReleaseService,
};
use chrono::{DateTime, Utc};
use hk_core::{CurrentInfo, NextPatch, Platform, Release};

/// Database manager for high-level coordination
///
/// Delegates to the service modules, which hold the SQL. The only logic here
/// is bumping the catalogue modification time after a successful change.
pub struct DatabaseManager {
    connection: DatabaseConnection,
}

impl DatabaseManager {
    /// Create a new database manager
    pub async fn new(config: &DatabaseConfig) -> DbResult<Self> {
        let connection = DatabaseConnection::new(config).await?;
        Ok(Self { connection })
    }

    /// Create a manager whose pool connects on first use
    pub fn lazy(config: &DatabaseConfig) -> DbResult<Self> {
        let connection = DatabaseConnection::lazy(config)?;
        Ok(Self { connection })
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &DatabasePool {
        self.connection.pool()
    }

    /// Create missing tables
    pub async fn ensure_schema(&self) -> DbResult<()> {
        self.connection.ensure_schema().await
    }

    /// Check database health
    pub async fn health_check(&self) -> bool {
        self.connection.health_check().await
    }

    // Release operations

    /// Register a new release and bump the modification time
    pub async fn register_release(&self, release: &Release) -> DbResult<()> {
        ReleaseService::create(self.pool(), release).await?;
        ModService::touch(self.pool()).await
    }

    pub async fn release_hash(&self, plat: &Platform, cmd: &str, ver: &str) -> DbResult<Option<Vec<u8>>> {
        ReleaseService::get_hash(self.pool(), plat, cmd, ver).await
    }

    pub async fn list_releases(&self) -> DbResult<Vec<Release>> {
        ReleaseService::list(self.pool()).await
    }

    pub async fn last_modified(&self) -> DbResult<DateTime<Utc>> {
        ModService::last_modified(self.pool()).await
    }

    // Current version operations

    /// Set the current version and bump the modification time
    pub async fn set_current(&self, plat: &Platform, cmd: &str, ver: &str) -> DbResult<()> {
        CurrentService::set(self.pool(), plat, cmd, ver).await?;
        ModService::touch(self.pool()).await
    }

    pub async fn current_info(&self, plat: &Platform, cmd: &str) -> DbResult<Option<CurrentInfo>> {
        CurrentService::get_info(self.pool(), plat, cmd).await
    }

    // Patch operations

    pub async fn pending_edges(&self) -> DbResult<Vec<PatchEdge>> {
        PatchService::pending_edges(self.pool()).await
    }

    pub async fn create_patch(&self, edge: &PatchEdge, sha1: &str) -> DbResult<()> {
        PatchService::create(self.pool(), edge, sha1).await
    }

    pub async fn patch_exists(&self, edge: &PatchEdge) -> DbResult<bool> {
        PatchService::exists(self.pool(), edge).await
    }

    pub async fn converge(&self) -> DbResult<ConvergeStats> {
        PatchService::converge(self.pool()).await
    }

    pub async fn next_patch(&self, plat: &Platform, cmd: &str, oldver: &str) -> DbResult<Option<NextPatch>> {
        PatchService::next_for(self.pool(), plat, cmd, oldver).await
    }
}
