//! Last modification time of the release catalogue

use crate::database::{connection::DatabasePool, error::{DatabaseError, DbResult}};
use chrono::{DateTime, Utc};
use sqlx::Row;

pub struct ModService;

impl ModService {
    /// Record that the catalogue changed now
    pub async fn touch(pool: &DatabasePool) -> DbResult<()> {
        sqlx::query("UPDATE mod SET t = now()").execute(pool).await?;
        Ok(())
    }

    pub async fn last_modified(pool: &DatabasePool) -> DbResult<DateTime<Utc>> {
        let row = sqlx::query("SELECT t FROM mod LIMIT 1")
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("mod", "t"))?;
        Ok(row.get("t"))
    }
}
