//! Registered releases

use crate::database::{
    connection::DatabasePool,
    error::{DatabaseError, DbResult},
};
use hk_core::{Platform, Release};
use sqlx::Row;

/// Release service for database operations
pub struct ReleaseService;

impl ReleaseService {
    /// Insert a release; an existing `(plat, cmd, ver)` is a duplicate
    pub async fn create(pool: &DatabasePool, release: &Release) -> DbResult<()> {
        let query = r#"
            INSERT INTO release (plat, cmd, ver, sha256)
            VALUES ($1, $2, $3, $4)
        "#;

        sqlx::query(query)
            .bind(release.plat.to_string())
            .bind(&release.cmd)
            .bind(&release.ver)
            .bind(&release.sha256)
            .execute(pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx(e, "release", &release.name()))?;

        tracing::info!(release = %release.name(), "Registered release");
        Ok(())
    }

    /// SHA-256 registered for a release
    pub async fn get_hash(
        pool: &DatabasePool,
        plat: &Platform,
        cmd: &str,
        ver: &str,
    ) -> DbResult<Option<Vec<u8>>> {
        let query = "SELECT sha256 FROM release WHERE plat = $1 AND cmd = $2 AND ver = $3";

        let row = sqlx::query(query)
            .bind(plat.to_string())
            .bind(cmd)
            .bind(ver)
            .fetch_optional(pool)
            .await?;

        Ok(row.map(|row| row.get("sha256")))
    }

    /// Every registered release
    pub async fn list(pool: &DatabasePool) -> DbResult<Vec<Release>> {
        let query = "SELECT plat, cmd, ver, sha256 FROM release ORDER BY plat, cmd, ver";

        let rows = sqlx::query(query).fetch_all(pool).await?;

        let mut releases = Vec::with_capacity(rows.len());
        for row in rows {
            match Self::row_to_release(&row) {
                Ok(release) => releases.push(release),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable release row"),
            }
        }
        Ok(releases)
    }

    fn row_to_release(row: &sqlx::postgres::PgRow) -> DbResult<Release> {
        let plat: Platform = row.try_get::<String, _>("plat")?.parse()?;
        Ok(Release::new(
            plat,
            row.try_get::<String, _>("cmd")?,
            row.try_get::<String, _>("ver")?,
            row.try_get::<Vec<u8>, _>("sha256")?,
        )?)
    }
}
