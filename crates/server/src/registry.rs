//! In-memory registry of upload sessions.
//!
//! Two independent lock domains: the registry map is guarded by one mutex
//! (structure: lookup, insert, remove) and each session guards its own
//! progress. When both are held the registry lock is always taken first.
//!
//! Every session carries a generation number that is unique within the
//! process and names its chunk artifacts, so a session replaced by a
//! staleness reset can never read, overwrite or delete the artifacts of its
//! successor. A replaced or reaped session is retired: it refuses further
//! acknowledgements and can no longer publish an assembled file.

use crate::metrics::{ACTIVE_UPLOAD_SESSIONS, UPLOAD_SESSIONS_CREATED, UPLOAD_SESSIONS_RESET};
use chunkyard_core::{FileIdentity, FileName};
use chunkyard_storage::{StagedFile, StorageResult};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;
use tokio::sync::Mutex;

/// How [`SessionRegistry::get_or_create`] obtained its session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionOrigin {
    /// A matching session already existed.
    Existing,
    /// No session existed for the filename.
    Created,
    /// A session existed for a different version of the file and was replaced.
    Reset,
}

/// Outcome of acknowledging a chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acknowledgement {
    /// Chunks are still missing.
    Pending { acked: usize },
    /// This acknowledgement completed the set. The caller owns assembly.
    Complete,
    /// The set was already complete and another caller is assembling.
    AlreadyAssembling,
    /// The session was replaced or reaped; nothing was recorded.
    Retired,
}

#[derive(Debug)]
struct SessionProgress {
    acked: BTreeSet<u32>,
    assembling: bool,
    retired: bool,
    last_activity: OffsetDateTime,
}

/// Progress of one file's chunked upload.
#[derive(Debug)]
pub struct UploadSession {
    identity: FileIdentity,
    generation: u64,
    total_chunks: u32,
    progress: Mutex<SessionProgress>,
}

impl UploadSession {
    fn new(identity: FileIdentity, generation: u64, total_chunks: u32) -> Self {
        Self {
            identity,
            generation,
            total_chunks,
            progress: Mutex::new(SessionProgress {
                acked: BTreeSet::new(),
                assembling: false,
                retired: false,
                last_activity: OffsetDateTime::now_utc(),
            }),
        }
    }

    pub fn filename(&self) -> &FileName {
        &self.identity.filename
    }

    /// Number naming this session's chunk artifacts.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    /// Record chunk `index` as durably written.
    ///
    /// Re-acknowledging an index is a no-op for the set. Exactly one caller
    /// ever observes [`Acknowledgement::Complete`] until
    /// [`Self::assembly_failed`] re-arms the session.
    pub async fn acknowledge(&self, index: u32) -> Acknowledgement {
        debug_assert!(index < self.total_chunks);

        let mut progress = self.progress.lock().await;
        if progress.retired {
            return Acknowledgement::Retired;
        }
        progress.acked.insert(index);
        progress.last_activity = OffsetDateTime::now_utc();

        if progress.acked.len() < self.total_chunks as usize {
            return Acknowledgement::Pending {
                acked: progress.acked.len(),
            };
        }

        if progress.assembling {
            Acknowledgement::AlreadyAssembling
        } else {
            progress.assembling = true;
            Acknowledgement::Complete
        }
    }

    /// Re-arm completion after a failed assembly so the next acknowledgement
    /// triggers another attempt.
    pub async fn assembly_failed(&self) {
        let mut progress = self.progress.lock().await;
        progress.assembling = false;
        progress.last_activity = OffsetDateTime::now_utc();
    }

    /// Publish `staged` unless this session has been retired.
    ///
    /// Returns `Ok(None)` and discards the file if it was. The progress lock
    /// is held across the commit, so a reset that retires this session waits
    /// for the commit and the successor's file always lands last.
    pub async fn commit_assembly(&self, staged: StagedFile) -> StorageResult<Option<u64>> {
        let progress = self.progress.lock().await;
        if progress.retired {
            drop(progress);
            staged.discard().await?;
            return Ok(None);
        }
        let bytes = staged.commit().await?;
        Ok(Some(bytes))
    }

    /// Acknowledged indices (ascending).
    pub async fn acknowledged(&self) -> Vec<u32> {
        self.progress.lock().await.acked.iter().copied().collect()
    }

    pub async fn is_acknowledged(&self, index: u32) -> bool {
        self.progress.lock().await.acked.contains(&index)
    }

    async fn touch(&self) {
        self.progress.lock().await.last_activity = OffsetDateTime::now_utc();
    }

    async fn retire(&self) {
        self.progress.lock().await.retired = true;
    }
}

/// Process-wide table of in-progress uploads keyed by filename.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<FileName, Arc<UploadSession>>>,
    last_generation: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the session for `identity.filename`, creating it if absent.
    ///
    /// A session recorded for a different size or modification time is
    /// retired and replaced with an empty one. Its chunk artifacts are left
    /// in place. A differing `total_chunks` alone does not replace a session.
    pub async fn get_or_create(
        &self,
        identity: FileIdentity,
        total_chunks: u32,
    ) -> (Arc<UploadSession>, SessionOrigin) {
        let mut sessions = self.sessions.lock().await;

        let origin = match sessions.get(&identity.filename) {
            Some(existing) if existing.identity.same_version(&identity) => {
                existing.touch().await;
                return (existing.clone(), SessionOrigin::Existing);
            }
            Some(stale) => {
                tracing::info!(
                    filename = %identity.filename,
                    old_size = stale.identity.file_size,
                    new_size = identity.file_size,
                    old_last_modified = stale.identity.last_modified,
                    new_last_modified = identity.last_modified,
                    "File changed, discarding upload progress"
                );
                stale.retire().await;
                UPLOAD_SESSIONS_RESET.inc();
                SessionOrigin::Reset
            }
            None => {
                ACTIVE_UPLOAD_SESSIONS.inc();
                SessionOrigin::Created
            }
        };

        UPLOAD_SESSIONS_CREATED.inc();
        let generation = self.last_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let session = Arc::new(UploadSession::new(identity, generation, total_chunks));
        sessions.insert(session.identity.filename.clone(), session.clone());
        (session, origin)
    }

    pub async fn get(&self, filename: &FileName) -> Option<Arc<UploadSession>> {
        self.sessions.lock().await.get(filename).cloned()
    }

    /// Remove `session` only if it is still the registered session for its
    /// filename. Returns false if it was already removed or replaced.
    pub async fn remove_session(&self, session: &Arc<UploadSession>) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(session.filename()) {
            Some(current) if Arc::ptr_eq(current, session) => {
                sessions.remove(session.filename());
                ACTIVE_UPLOAD_SESSIONS.dec();
                true
            }
            _ => false,
        }
    }

    /// Retire, remove and return sessions with no activity for longer than
    /// `ttl`. Sessions that are assembling are kept.
    pub async fn reap_idle(&self, ttl: time::Duration) -> Vec<Arc<UploadSession>> {
        let Some(cutoff) = OffsetDateTime::now_utc().checked_sub(ttl) else {
            return Vec::new();
        };
        let mut sessions = self.sessions.lock().await;

        let mut expired = Vec::new();
        for (filename, session) in sessions.iter() {
            let mut progress = session.progress.lock().await;
            if !progress.assembling && progress.last_activity < cutoff {
                progress.retired = true;
                expired.push(filename.clone());
            }
        }

        let reaped: Vec<Arc<UploadSession>> = expired
            .iter()
            .filter_map(|filename| sessions.remove(filename))
            .collect();
        ACTIVE_UPLOAD_SESSIONS.sub(reaped.len() as i64);
        reaped
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
