//! Age-based eviction of abandoned uploads.
//!
//! Idle sessions are dropped together with their chunk artifacts. A sweep of
//! the chunk area then removes old artifacts that no live session accounts
//! for, such as chunks written by a session replaced in a staleness reset.

use crate::metrics::{ORPHANED_CHUNKS_REMOVED, UPLOAD_SESSIONS_REAPED};
use crate::registry::SessionRegistry;
use chunkyard_core::FileName;
use chunkyard_storage::{ChunkArtifact, ChunkStore};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Counts from one reaper pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReapStats {
    /// Idle sessions removed from the registry.
    pub sessions: usize,
    /// Chunk artifacts belonging to those sessions.
    pub session_chunks: usize,
    /// Chunk artifacts not accounted for by any live session.
    pub orphaned_chunks: usize,
}

pub struct Reaper {
    registry: Arc<SessionRegistry>,
    store: ChunkStore,
    ttl: time::Duration,
}

impl Reaper {
    pub fn new(registry: Arc<SessionRegistry>, store: ChunkStore, ttl: Duration) -> Self {
        Self {
            registry,
            store,
            ttl: time::Duration::try_from(ttl).unwrap_or(time::Duration::MAX),
        }
    }

    /// Run one eviction pass. Storage failures are logged, never returned.
    pub async fn run_once(&self) -> ReapStats {
        let mut stats = ReapStats::default();

        let reaped = self.registry.reap_idle(self.ttl).await;
        for session in &reaped {
            stats.session_chunks += self
                .store
                .remove_chunks(
                    session.filename(),
                    session.generation(),
                    session.total_chunks(),
                )
                .await;
            tracing::info!(
                filename = %session.filename(),
                total_chunks = session.total_chunks(),
                "Reaped idle upload session"
            );
        }
        stats.sessions = reaped.len();
        UPLOAD_SESSIONS_REAPED.inc_by(stats.sessions as u64);

        stats.orphaned_chunks = self.sweep_orphans().await;
        ORPHANED_CHUNKS_REMOVED.inc_by(stats.orphaned_chunks as u64);

        stats
    }

    async fn sweep_orphans(&self) -> usize {
        let artifacts = match self.store.list_chunk_artifacts().await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list chunk area");
                return 0;
            }
        };

        let Some(cutoff) = OffsetDateTime::now_utc().checked_sub(self.ttl) else {
            return 0;
        };
        let mut removed = 0;
        for artifact in artifacts {
            // Without a modification time the age is unknown; keep it
            let Some(last_modified) = artifact.last_modified else {
                continue;
            };
            if last_modified >= cutoff || !self.is_orphaned(&artifact).await {
                continue;
            }

            match self.store.delete_artifact(&artifact).await {
                Ok(true) => {
                    tracing::debug!(key = %artifact.key, "Removed orphaned chunk artifact");
                    removed += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(key = %artifact.key, error = %e, "Failed to remove orphaned chunk artifact");
                }
            }
        }
        removed
    }

    async fn is_orphaned(&self, artifact: &ChunkArtifact) -> bool {
        let Ok(filename) = FileName::parse(&artifact.filename) else {
            return true;
        };
        match self.registry.get(&filename).await {
            Some(session) if session.generation() == artifact.generation => {
                !session.is_acknowledged(artifact.index).await
            }
            _ => true,
        }
    }
}

/// Spawn the periodic reaper task.
pub fn spawn_reaper_task(reaper: Reaper, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let stats = reaper.run_once().await;
            if stats != ReapStats::default() {
                let active_sessions = reaper.registry.len().await;
                tracing::info!(
                    active_sessions,
                    sessions = stats.sessions,
                    session_chunks = stats.session_chunks,
                    orphaned_chunks = stats.orphaned_chunks,
                    "Reaper pass removed abandoned uploads"
                );
            }
        }
    })
}
