//! `hkdist gen`: patch generation and `next` convergence.
//!
//! Each pass loads the release pairs that still lack a patch to their
//! command's current version, diffs them on a fixed pool of workers and then
//! repoints the `next` table at the patches that lead to the current version.

use crate::config::{DistConfig, GenConfig};
use crate::database::{ConvergeStats, DatabaseManager, PatchEdge};
use hk_core::{DiffEngine, DiffResult, HkError, LogContext, ObjectStore, Result, gunzip, gz_key, open_store};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Outcome of one generation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenStats {
    pub dispatched: usize,
    pub created: usize,
    /// Patch row already written by another generator
    pub existing: usize,
    pub failed: usize,
    /// Edges still without a patch row at the deadline
    pub unconfirmed: usize,
}

impl GenStats {
    fn add(&mut self, other: GenStats) {
        self.created += other.created;
        self.existing += other.existing;
        self.failed += other.failed;
    }
}

enum Outcome {
    Created,
    Existing,
}

type EdgeQueue = Arc<Mutex<mpsc::Receiver<PatchEdge>>>;

/// Patch generator over the dist and patch stores
#[derive(Clone)]
pub struct Generator {
    db: Arc<DatabaseManager>,
    dist_store: Arc<dyn ObjectStore>,
    patch_store: Arc<dyn ObjectStore>,
    config: GenConfig,
}

impl Generator {
    pub fn new(
        db: Arc<DatabaseManager>,
        dist_store: Arc<dyn ObjectStore>,
        patch_store: Arc<dyn ObjectStore>,
        config: GenConfig,
    ) -> Self {
        Self {
            db,
            dist_store,
            patch_store,
            config,
        }
    }

    /// Run passes forever, sleeping for the configured interval between them
    pub async fn run(&self) {
        loop {
            if let Err(e) = self.pass().await {
                error!(error = %e, "Generation pass failed");
            }
            tokio::time::sleep(self.config.interval()).await;
        }
    }

    /// Generate missing patches, then converge the `next` table
    pub async fn pass(&self) -> Result<(GenStats, ConvergeStats)> {
        let stats = self.generate_patches().await?;
        let converged = self.db.converge().await?;
        info!(
            created = stats.created,
            failed = stats.failed,
            unconfirmed = stats.unconfirmed,
            next_deleted = converged.deleted,
            next_inserted = converged.inserted,
            next_updated = converged.updated,
            "Generation pass complete"
        );
        Ok((stats, converged))
    }

    /// Diff every pending edge on the worker pool and wait for their rows
    pub async fn generate_patches(&self) -> Result<GenStats> {
        let edges = self.db.pending_edges().await?;
        let mut stats = GenStats {
            dispatched: edges.len(),
            ..GenStats::default()
        };
        if edges.is_empty() {
            return Ok(stats);
        }

        let workers = self.config.workers.max(1);
        let (tx, rx) = mpsc::channel(workers * 2);
        let queue: EdgeQueue = Arc::new(Mutex::new(rx));

        let mut pool = JoinSet::new();
        for _ in 0..workers {
            pool.spawn(self.clone().worker(queue.clone()));
        }

        for edge in &edges {
            if tx.send(edge.clone()).await.is_err() {
                warn!("All diff workers exited early");
                break;
            }
        }
        drop(tx);

        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(worker_stats) => stats.add(worker_stats),
                Err(e) => error!(error = %e, "Diff worker panicked"),
            }
        }

        stats.unconfirmed = self.confirm(&edges).await?;
        Ok(stats)
    }

    async fn worker(self, queue: EdgeQueue) -> GenStats {
        let mut stats = GenStats::default();
        loop {
            let next = queue.lock().await.recv().await;
            let Some(edge) = next else {
                return stats;
            };

            info!(state = "start", plat = %edge.plat, cmd = %edge.cmd, oldver = %edge.oldver, newver = %edge.newver, "gen");
            match self.make_patch(&edge).await {
                Ok(Outcome::Created) => {
                    stats.created += 1;
                    info!(state = "finish", plat = %edge.plat, cmd = %edge.cmd, oldver = %edge.oldver, newver = %edge.newver, "gen");
                }
                Ok(Outcome::Existing) => {
                    stats.existing += 1;
                    info!(state = "finish", existing = true, plat = %edge.plat, cmd = %edge.cmd, oldver = %edge.oldver, newver = %edge.newver, "gen");
                }
                Err(e) => {
                    stats.failed += 1;
                    error!(state = "failed", error = %e, plat = %edge.plat, cmd = %edge.cmd, oldver = %edge.oldver, newver = %edge.newver, "gen");
                }
            }
        }
    }

    async fn make_patch(&self, edge: &PatchEdge) -> Result<Outcome> {
        let old_gz = self
            .dist_store
            .get(&gz_key(&edge.cmd, &edge.oldver, &edge.plat))
            .await?;
        let new_gz = self
            .dist_store
            .get(&gz_key(&edge.cmd, &edge.newver, &edge.plat))
            .await?;

        let diff = tokio::task::spawn_blocking(move || diff_artifacts(&old_gz, &new_gz))
            .await
            .map_err(|e| HkError::internal(format!("diff task: {}", e)))??;

        let sha1 = diff.sha1_hex();
        tracing::debug!(edge = %edge, sha1 = %sha1, summary = %diff.summary(), "Computed patch");
        self.patch_store.put(&sha1, diff.data).await?;

        match self.db.create_patch(edge, &sha1).await {
            Ok(()) => Ok(Outcome::Created),
            Err(e) if e.is_duplicate() => Ok(Outcome::Existing),
            Err(e) => Err(e.into()),
        }
    }

    /// Poll until every edge has a patch row or the deadline passes
    async fn confirm(&self, edges: &[PatchEdge]) -> Result<usize> {
        let deadline = Instant::now() + self.config.deadline();
        let mut missing: Vec<&PatchEdge> = edges.iter().collect();

        loop {
            let mut still_missing = Vec::new();
            for edge in missing {
                if !self.db.patch_exists(edge).await? {
                    still_missing.push(edge);
                }
            }
            missing = still_missing;

            if missing.is_empty() {
                return Ok(0);
            }
            if Instant::now() >= deadline {
                for edge in &missing {
                    error!(state = "failed", reason = "deadline", plat = %edge.plat, cmd = %edge.cmd, oldver = %edge.oldver, newver = %edge.newver, "gen");
                }
                return Ok(missing.len());
            }
            tokio::time::sleep(self.config.poll()).await;
        }
    }
}

/// Gunzip two stored executables and diff them
pub fn diff_artifacts(old_gz: &[u8], new_gz: &[u8]) -> Result<DiffResult> {
    let old = gunzip(old_gz)?;
    let new = gunzip(new_gz)?;
    DiffEngine::new().create_patch(&old, &new)
}

/// Entry point of `hkdist gen`
pub async fn run(config: DistConfig) -> anyhow::Result<()> {
    let context = LogContext::new("gen", "hkdist");
    config.require(&["DATABASE_URL", "S3DISTURL", "S3PATCHURL"])?;

    let db = DatabaseManager::new(&config.database).await?;
    db.ensure_schema().await?;
    let dist_store = open_store(&config.dist_store).await?;
    let patch_store = open_store(&config.patch_store).await?;

    context.info(&format!(
        "generating with {} workers every {}s",
        config.generator.workers, config.generator.interval_seconds
    ));
    Generator::new(Arc::new(db), dist_store, patch_store, config.generator)
        .run()
        .await;
    Ok(())
}
