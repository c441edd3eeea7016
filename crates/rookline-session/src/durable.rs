//! Durable session records.
//!
//! The durable store is the truth for recoverable and finished sessions.
//! It only ever sees whole [`GameSession`] records: a checkpoint overwrites
//! the previous one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::BoxFuture;
use rookline_protocol::SessionId;
use tokio::fs;

use crate::{GameSession, StoreError};

/// Where checkpoints go.
///
/// Methods return boxed futures so the store can sit behind
/// `Arc<dyn DurableStore>` and be awaited from spawned tasks.
pub trait DurableStore: Send + Sync + 'static {
    /// Writes (or overwrites) the record for `session.id`.
    ///
    /// Last write wins; [`SessionStore`](crate::SessionStore) orders the
    /// writes for each session.
    fn save<'a>(&'a self, session: &'a GameSession) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Reads the last record for `id`.
    fn load(&self, id: SessionId) -> BoxFuture<'_, Result<Option<GameSession>, StoreError>>;

    /// Every stored record. Used once at startup to find open sessions.
    fn list(&self) -> BoxFuture<'_, Result<Vec<GameSession>, StoreError>>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Keeps records in a map. Survives a [`SessionStore`](crate::SessionStore)
/// being dropped and rebuilt, which is how tests simulate a restart.
#[derive(Default)]
pub struct MemoryDurableStore {
    records: Mutex<HashMap<SessionId, GameSession>>,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the stored record, without going through the trait.
    pub fn record(&self, id: SessionId) -> Option<GameSession> {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&id)
            .cloned()
    }

    /// Overwrites a record directly.
    pub fn insert(&self, session: GameSession) {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(session.id, session);
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DurableStore for MemoryDurableStore {
    fn save<'a>(&'a self, session: &'a GameSession) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.insert(session.clone());
            Ok(())
        })
    }

    fn load(&self, id: SessionId) -> BoxFuture<'_, Result<Option<GameSession>, StoreError>> {
        Box::pin(async move { Ok(self.record(id)) })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<GameSession>, StoreError>> {
        Box::pin(async move {
            let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
            Ok(records.values().cloned().collect())
        })
    }
}

// ---------------------------------------------------------------------------
// JSON files
// ---------------------------------------------------------------------------

/// One pretty-printed JSON document per session under a directory.
///
/// Writes go to a temporary file that is then renamed over the record,
/// so a reader never sees a half-written checkpoint. Every write gets its
/// own temporary file.
#[derive(Debug, Clone)]
pub struct JsonFileDurableStore {
    dir: PathBuf,
}

static NEXT_TMP: AtomicU64 = AtomicU64::new(0);

impl JsonFileDurableStore {
    /// Uses `dir`, creating it if needed.
    ///
    /// # Errors
    /// [`StoreError::Io`] if the directory cannot be created.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        tracing::info!(dir = %dir.display(), "json durable store opened");
        Ok(Self { dir })
    }

    fn path(&self, id: SessionId) -> PathBuf {
        self.dir.join(format!("session-{}.json", id.0))
    }

    fn tmp_path(&self, id: SessionId) -> PathBuf {
        let n = NEXT_TMP.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!("session-{}.{n}.tmp", id.0))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DurableStore for JsonFileDurableStore {
    fn save<'a>(&'a self, session: &'a GameSession) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let path = self.path(session.id);
            let tmp = self.tmp_path(session.id);
            let bytes = serde_json::to_vec_pretty(session)?;
            fs::write(&tmp, bytes).await?;
            fs::rename(&tmp, &path).await?;
            tracing::trace!(session_id = %session.id, path = %path.display(), "record written");
            Ok(())
        })
    }

    fn load(&self, id: SessionId) -> BoxFuture<'_, Result<Option<GameSession>, StoreError>> {
        Box::pin(async move {
            match fs::read(self.path(id)).await {
                Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<GameSession>, StoreError>> {
        Box::pin(async move {
            let mut out = Vec::new();
            let mut entries = fs::read_dir(&self.dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().is_none_or(|ext| ext != "json") {
                    continue;
                }
                let bytes = fs::read(&path).await?;
                match serde_json::from_slice::<GameSession>(&bytes) {
                    Ok(session) => out.push(session),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record");
                    }
                }
            }
            Ok(out)
        })
    }
}
