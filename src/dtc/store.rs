//! Persistent deduplication of DTCs. A fault that stays active across many frames is reported once.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use tracing::{debug, info};

use crate::dtc::error::Error;

type Result<T> = std::result::Result<T, Error>;

static ACTIVE_DTCS_TREE: &str = "active_dtcs";
static SEEN: &[u8] = &[1];

/// Key-value contract of the deduplication store, keyed by `(code, fmi)`.
/// Implementations guarantee the read-then-write in [`DtcStore::is_new`] is atomic.
pub trait DtcStore: Send + Sync {
    /// Returns true and records the key on first sighting, false on every later sighting.
    fn is_new(&self, code_id: u32, fmi: u8) -> Result<bool>;
    fn remove(&self, code_id: u32, fmi: u8) -> Result<()>;
    fn clear_all(&self) -> Result<()>;
}

fn dedup_key(code_id: u32, fmi: u8) -> String {
    format!("{}:{}", code_id, fmi)
}

/// [`DtcStore`] backed by a sled database. Every write is flushed before returning.
pub struct SledStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path.as_ref())?;
        let tree = db.open_tree(ACTIVE_DTCS_TREE)?;
        info!(
            "Opened DTC store at {} with {} known codes",
            path.as_ref().display(),
            tree.len()
        );
        Ok(Self { db, tree })
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

impl DtcStore for SledStore {
    fn is_new(&self, code_id: u32, fmi: u8) -> Result<bool> {
        let key = dedup_key(code_id, fmi);
        let swapped = self.tree.compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(SEEN))?;

        match swapped {
            Ok(()) => {
                self.tree.flush()?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    fn remove(&self, code_id: u32, fmi: u8) -> Result<()> {
        let key = dedup_key(code_id, fmi);
        self.tree.remove(key.as_bytes())?;
        self.tree.flush()?;
        debug!("Removed DTC {} from store", key);
        Ok(())
    }

    fn clear_all(&self) -> Result<()> {
        self.tree.clear()?;
        self.db.flush()?;
        info!("Cleared DTC store");
        Ok(())
    }
}

/// Non-persistent [`DtcStore`] with the same semantics. Used when no store path is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    seen: Mutex<HashSet<(u32, u8)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DtcStore for MemoryStore {
    fn is_new(&self, code_id: u32, fmi: u8) -> Result<bool> {
        let mut seen = self.seen.lock().map_err(|_| Error::Poisoned)?;
        Ok(seen.insert((code_id, fmi)))
    }

    fn remove(&self, code_id: u32, fmi: u8) -> Result<()> {
        let mut seen = self.seen.lock().map_err(|_| Error::Poisoned)?;
        seen.remove(&(code_id, fmi));
        Ok(())
    }

    fn clear_all(&self) -> Result<()> {
        self.seen.lock().map_err(|_| Error::Poisoned)?.clear();
        Ok(())
    }
}
