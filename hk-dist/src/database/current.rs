//! Current version per command and platform

use crate::database::{
    connection::DatabasePool,
    error::{DatabaseError, DbResult},
};
use hk_core::{CurrentInfo, Platform};
use sqlx::Row;

/// Current-version service for database operations
pub struct CurrentService;

impl CurrentService {
    /// Point `(plat, cmd)` at `ver`; the release must already exist
    pub async fn set(pool: &DatabasePool, plat: &Platform, cmd: &str, ver: &str) -> DbResult<()> {
        let key = format!("{}/{}/{}", cmd, ver, plat);
        let mut tx = pool.begin().await?;

        sqlx::query("UPDATE cur SET curver = $1 WHERE plat = $2 AND cmd = $3")
            .bind(ver)
            .bind(plat.to_string())
            .bind(cmd)
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::from_sqlx(e, "cur", &key))?;

        sqlx::query(
            r#"
            INSERT INTO cur (plat, cmd, curver)
            SELECT $1, $2, $3
            WHERE NOT EXISTS (SELECT 1 FROM cur WHERE plat = $1 AND cmd = $2)
            "#,
        )
        .bind(plat.to_string())
        .bind(cmd)
        .bind(ver)
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::from_sqlx(e, "cur", &key))?;

        tx.commit().await?;

        tracing::info!(cmd, plat = %plat, ver, "Set current version");
        Ok(())
    }

    /// Current version and its hash
    pub async fn get_info(pool: &DatabasePool, plat: &Platform, cmd: &str) -> DbResult<Option<CurrentInfo>> {
        let query = r#"
            SELECT c.curver, r.sha256
            FROM cur c
            JOIN release r ON (c.plat = r.plat AND c.cmd = r.cmd AND c.curver = r.ver)
            WHERE c.plat = $1 AND c.cmd = $2
        "#;

        let row = sqlx::query(query)
            .bind(plat.to_string())
            .bind(cmd)
            .fetch_optional(pool)
            .await?;

        Ok(row.map(|row| CurrentInfo {
            version: row.get("curver"),
            sha256: row.get("sha256"),
        }))
    }
}
