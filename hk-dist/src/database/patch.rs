//! Generated patches and the `next` best-path table

use crate::database::{
    connection::DatabasePool,
    error::{DatabaseError, DbResult},
};
use hk_core::{NextPatch, Platform};
use sqlx::Row;
use std::fmt;

/// A pair of releases that needs (or has) a patch
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatchEdge {
    pub plat: Platform,
    pub cmd: String,
    pub oldver: String,
    pub newver: String,
}

impl fmt::Display for PatchEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}->{}", self.cmd, self.plat, self.oldver, self.newver)
    }
}

/// Row counts touched by one convergence pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvergeStats {
    pub deleted: u64,
    pub inserted: u64,
    pub updated: u64,
}

/// Patch service for database operations
pub struct PatchService;

impl PatchService {
    /// Releases that have no patch yet to the current version of their command
    pub async fn pending_edges(pool: &DatabasePool) -> DbResult<Vec<PatchEdge>> {
        let query = r#"
            SELECT f.plat, f.cmd, f.ver AS oldver, c.curver AS newver
            FROM release f
            JOIN cur c ON (f.plat = c.plat AND f.cmd = c.cmd AND f.ver != c.curver)
            WHERE NOT EXISTS (
                SELECT 1 FROM patch p
                WHERE p.plat = f.plat AND p.cmd = f.cmd
                    AND p.oldver = f.ver AND p.newver = c.curver
            )
            ORDER BY f.plat, f.cmd, f.ver
        "#;

        let rows = sqlx::query(query).fetch_all(pool).await?;

        let mut edges = Vec::with_capacity(rows.len());
        for row in rows {
            let plat: String = row.get("plat");
            match plat.parse::<Platform>() {
                Ok(plat) => edges.push(PatchEdge {
                    plat,
                    cmd: row.get("cmd"),
                    oldver: row.get("oldver"),
                    newver: row.get("newver"),
                }),
                Err(e) => tracing::warn!(error = %e, "Skipping release with bad platform"),
            }
        }
        Ok(edges)
    }

    /// Record a stored patch under its content address
    pub async fn create(pool: &DatabasePool, edge: &PatchEdge, sha1: &str) -> DbResult<()> {
        let query = r#"
            INSERT INTO patch (plat, cmd, oldver, newver, sha1)
            VALUES ($1, $2, $3, $4, $5)
        "#;

        sqlx::query(query)
            .bind(edge.plat.to_string())
            .bind(&edge.cmd)
            .bind(&edge.oldver)
            .bind(&edge.newver)
            .bind(sha1)
            .execute(pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx(e, "patch", &edge.to_string()))?;

        tracing::debug!(edge = %edge, sha1, "Recorded patch");
        Ok(())
    }

    pub async fn exists(pool: &DatabasePool, edge: &PatchEdge) -> DbResult<bool> {
        let query = r#"
            SELECT 1 AS one FROM patch
            WHERE plat = $1 AND cmd = $2 AND oldver = $3 AND newver = $4
        "#;

        let row = sqlx::query(query)
            .bind(edge.plat.to_string())
            .bind(&edge.cmd)
            .bind(&edge.oldver)
            .bind(&edge.newver)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    /// Point every `next` row at the patch leading to the current version
    pub async fn converge(pool: &DatabasePool) -> DbResult<ConvergeStats> {
        let mut tx = pool.begin().await?;

        let deleted = sqlx::query(
            r#"
            DELETE FROM next n
            WHERE EXISTS (
                SELECT 1 FROM cur c
                WHERE n.plat = c.plat AND n.cmd = c.cmd AND n.oldver = c.curver
            )
            "#,
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let inserted = sqlx::query(
            r#"
            INSERT INTO next (plat, cmd, oldver, newver)
            SELECT p.plat, p.cmd, p.oldver, p.newver
            FROM patch p
            JOIN cur c ON (p.plat = c.plat AND p.cmd = c.cmd AND p.newver = c.curver)
            WHERE NOT EXISTS (
                SELECT 1 FROM next n
                WHERE n.plat = p.plat AND n.cmd = p.cmd AND n.oldver = p.oldver
            )
            "#,
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let updated = sqlx::query(
            r#"
            UPDATE next n
            SET newver = p.newver
            FROM patch p
            JOIN cur c ON (p.plat = c.plat AND p.cmd = c.cmd AND p.newver = c.curver)
            WHERE n.plat = p.plat AND n.cmd = p.cmd AND n.oldver = p.oldver
                AND n.newver != p.newver
            "#,
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        Ok(ConvergeStats {
            deleted,
            inserted,
            updated,
        })
    }

    /// The patch a client on `oldver` should apply next
    pub async fn next_for(
        pool: &DatabasePool,
        plat: &Platform,
        cmd: &str,
        oldver: &str,
    ) -> DbResult<Option<NextPatch>> {
        let query = r#"
            SELECT n.newver, p.sha1
            FROM next n
            JOIN patch p ON (n.plat = p.plat AND n.cmd = p.cmd
                AND n.oldver = p.oldver AND n.newver = p.newver)
            WHERE n.plat = $1 AND n.cmd = $2 AND n.oldver = $3
        "#;

        let row = sqlx::query(query)
            .bind(plat.to_string())
            .bind(cmd)
            .bind(oldver)
            .fetch_optional(pool)
            .await?;

        Ok(row.map(|row| NextPatch {
            version: row.get("newver"),
            sha1: row.get("sha1"),
        }))
    }
}
