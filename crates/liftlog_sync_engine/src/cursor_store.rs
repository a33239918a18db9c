//! Durable per-kind sync cursors.

use crate::error::SyncResult;
use liftlog_domain::EntityKind;
use liftlog_sync_protocol::SyncCursor;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Storage for the last fully applied pull position of each entity kind.
///
/// A saved cursor means every record at or before it has been applied
/// locally; loading `None` means the kind has never completed a page.
pub trait CursorStore: Send + Sync {
    /// Loads the cursor for a kind, `None` when absent.
    fn load(&self, kind: EntityKind) -> SyncResult<Option<SyncCursor>>;

    /// Persists the cursor for a kind.
    fn save(&self, kind: EntityKind, cursor: SyncCursor) -> SyncResult<()>;
}

/// In-memory cursor store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryCursorStore {
    cursors: Mutex<HashMap<EntityKind, SyncCursor>>,
}

impl MemoryCursorStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CursorStore for MemoryCursorStore {
    fn load(&self, kind: EntityKind) -> SyncResult<Option<SyncCursor>> {
        Ok(self.cursors.lock().get(&kind).copied())
    }

    fn save(&self, kind: EntityKind, cursor: SyncCursor) -> SyncResult<()> {
        self.cursors.lock().insert(kind, cursor);
        Ok(())
    }
}

/// Cursor store keeping one JSON file per entity kind in a directory.
///
/// An unreadable or malformed file loads as `None`; the worst case is a
/// re-pull from the start, which the idempotent apply path absorbs.
pub struct FileCursorStore {
    dir: PathBuf,
}

impl FileCursorStore {
    /// Creates a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> SyncResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, kind: EntityKind) -> PathBuf {
        self.dir.join(format!("{}.cursor.json", kind.route_segment()))
    }
}

impl CursorStore for FileCursorStore {
    fn load(&self, kind: EntityKind) -> SyncResult<Option<SyncCursor>> {
        let path = self.path_for(kind);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&raw) {
            Ok(cursor) => Ok(Some(cursor)),
            Err(e) => {
                tracing::warn!(kind = %kind, path = %path.display(), error = %e,
                    "malformed cursor file, falling back to full pull");
                Ok(None)
            }
        }
    }

    fn save(&self, kind: EntityKind, cursor: SyncCursor) -> SyncResult<()> {
        let path = self.path_for(kind);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string(&cursor)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}
