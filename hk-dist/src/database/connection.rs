//! Database connection pool management

use crate::database::{config::DatabaseConfig, error::{DatabaseError, DbResult}};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;
use tracing::{error, info};

/// Connection pool shared by every service
pub type DatabasePool = PgPool;

/// Tables are created if missing; there is no migration history
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS release (
        plat text NOT NULL,
        cmd text NOT NULL,
        ver text NOT NULL,
        sha256 bytea NOT NULL,
        PRIMARY KEY (plat, cmd, ver)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cur (
        plat text NOT NULL,
        cmd text NOT NULL,
        curver text NOT NULL,
        FOREIGN KEY (plat, cmd, curver) REFERENCES release (plat, cmd, ver),
        PRIMARY KEY (plat, cmd)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS patch (
        plat text NOT NULL,
        cmd text NOT NULL,
        oldver text NOT NULL,
        newver text NOT NULL,
        sha1 text NOT NULL,
        FOREIGN KEY (plat, cmd, oldver) REFERENCES release (plat, cmd, ver),
        FOREIGN KEY (plat, cmd, newver) REFERENCES release (plat, cmd, ver),
        PRIMARY KEY (plat, cmd, oldver, newver)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS next (
        plat text NOT NULL,
        cmd text NOT NULL,
        oldver text NOT NULL,
        newver text NOT NULL,
        FOREIGN KEY (plat, cmd, oldver) REFERENCES release (plat, cmd, ver),
        FOREIGN KEY (plat, cmd, newver) REFERENCES release (plat, cmd, ver),
        FOREIGN KEY (plat, cmd, oldver, newver) REFERENCES patch (plat, cmd, oldver, newver),
        PRIMARY KEY (plat, cmd, oldver)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS mod (
        t timestamptz NOT NULL
    )
    "#,
    r#"
    INSERT INTO mod (t)
    SELECT now()
    WHERE NOT EXISTS (SELECT 1 FROM mod)
    "#,
];

pub struct DatabaseConnection {
    pool: DatabasePool,
    config: DatabaseConfig,
}

impl DatabaseConnection {
    fn options(config: &DatabaseConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.timeout_seconds))
    }

    /// Connect now, failing if PostgreSQL is unreachable
    pub async fn new(config: &DatabaseConfig) -> DbResult<Self> {
        let pool = Self::options(config)
            .connect(&config.url)
            .await
            .map_err(|e| DatabaseError::Connection {
                message: format!("connecting to PostgreSQL: {}", e),
            })?;

        info!(max_connections = config.max_connections, "PostgreSQL pool ready");
        Ok(Self {
            pool,
            config: config.clone(),
        })
    }

    /// Pool that connects on first use
    pub fn lazy(config: &DatabaseConfig) -> DbResult<Self> {
        let pool = Self::options(config)
            .connect_lazy(&config.url)
            .map_err(|e| DatabaseError::Connection {
                message: format!("bad PostgreSQL url: {}", e),
            })?;

        Ok(Self {
            pool,
            config: config.clone(),
        })
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Get database configuration
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Create any missing tables and seed the modification time
    pub async fn ensure_schema(&self) -> DbResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| DatabaseError::Schema {
                    message: e.to_string(),
                })?;
        }
        info!("Database schema ready");
        Ok(())
    }

    /// Whether a trivial query succeeds
    pub async fn health_check(&self) -> bool {
        let result = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&self.pool).await;
        if let Err(e) = &result {
            error!(error = %e, "PostgreSQL health check failed");
        }
        result.is_ok()
    }
}
