//! Storage backends for the virtual filesystem.
//!
//! The VFS keeps its whole tree as a flat `path -> FileEntry` mapping behind
//! the [`StorageBackend`] trait. The in-memory backend is the default;
//! remote backends can implement the same trait and plug into an unchanged
//! VFS.

use std::collections::{BTreeMap, HashMap};
use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use super::path;

/// Default mode bits for regular files.
pub const DEFAULT_FILE_MODE: u32 = 0o644;
/// Default mode bits for directories.
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Errors surfaced by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not encode or decode its keyspace.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Backend-specific failure (remote backends).
    #[error("storage error: {0}")]
    Backend(String),
}

/// The single node type stored in the VFS.
///
/// Identity is the normalized absolute `path`; there is no separate inode.
/// Directories always have empty content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    /// Leaf name (`/` for the root).
    pub name: String,
    /// Full normalized absolute path.
    pub path: String,
    /// Discriminator between files and directories.
    pub is_directory: bool,
    /// Raw content bytes; empty for directories.
    #[serde(default)]
    pub content: Vec<u8>,
    /// Creation time.
    pub created_at: SystemTime,
    /// Last modification time.
    pub modified_at: SystemTime,
    /// Unix-style permission bits.
    pub mode: u32,
}

impl FileEntry {
    /// Create a regular file entry at a normalized path.
    pub fn file(p: &str, content: Vec<u8>) -> Self {
        let now = SystemTime::now();
        Self {
            name: path::name(p),
            path: path::normalize(p),
            is_directory: false,
            content,
            created_at: now,
            modified_at: now,
            mode: DEFAULT_FILE_MODE,
        }
    }

    /// Create a directory entry at a normalized path.
    pub fn directory(p: &str) -> Self {
        let now = SystemTime::now();
        Self {
            name: path::name(p),
            path: path::normalize(p),
            is_directory: true,
            content: Vec::new(),
            created_at: now,
            modified_at: now,
            mode: DEFAULT_DIR_MODE,
        }
    }

    /// Content length in bytes; always zero for directories.
    pub fn size(&self) -> u64 {
        if self.is_directory {
            0
        } else {
            self.content.len() as u64
        }
    }
}

/// Concurrent `path -> FileEntry` mapping underlying a VFS.
///
/// Each listed operation is individually atomic; the VFS layers its own
/// mutex on top for multi-operation transactions. `serialize` and
/// `deserialize` have generic JSON implementations over `all_pairs`, which
/// backends with a native encoding may override.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Fetch the entry at `path`, if any.
    async fn get(&self, path: &str) -> Option<FileEntry>;

    /// Insert or replace the entry at `path`.
    async fn set(&self, path: &str, entry: FileEntry);

    /// Remove the entry at `path`, returning whether it existed.
    async fn delete(&self, path: &str) -> bool;

    /// Whether an entry exists at `path`.
    async fn exists(&self, path: &str) -> bool;

    /// Every key in the store.
    async fn all_paths(&self) -> Vec<String>;

    /// Every key starting with `prefix`.
    async fn paths_by_prefix(&self, prefix: &str) -> Vec<String>;

    /// Immediate child keys of the directory `dir`, excluding `dir` itself.
    async fn children(&self, dir: &str) -> Vec<String>;

    /// Drop every entry.
    async fn clear(&self);

    /// Number of entries.
    async fn count(&self) -> usize;

    /// Every `(path, entry)` pair in the store.
    async fn all_pairs(&self) -> Vec<(String, FileEntry)>;

    /// Bulk insert, replacing any colliding keys.
    async fn set_many(&self, entries: Vec<(String, FileEntry)>);

    /// Encode the full keyspace to bytes. Round-trips through
    /// [`StorageBackend::deserialize`] byte-for-byte on the keyspace.
    async fn serialize(&self) -> Result<Vec<u8>, StorageError> {
        let pairs: BTreeMap<String, FileEntry> = self.all_pairs().await.into_iter().collect();
        serde_json::to_vec(&pairs).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Replace the keyspace with a previously serialized one.
    async fn deserialize(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let pairs: BTreeMap<String, FileEntry> =
            serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.clear().await;
        self.set_many(pairs.into_iter().collect()).await;
        Ok(())
    }
}

/// In-memory storage backend.
pub struct InMemoryStorage {
    entries: RwLock<HashMap<String, FileEntry>>,
}

impl std::fmt::Debug for InMemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStorage").finish_non_exhaustive()
    }
}

impl InMemoryStorage {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn get(&self, path: &str) -> Option<FileEntry> {
        self.entries.read().await.get(path).cloned()
    }

    async fn set(&self, path: &str, entry: FileEntry) {
        self.entries.write().await.insert(path.to_string(), entry);
    }

    async fn delete(&self, path: &str) -> bool {
        self.entries.write().await.remove(path).is_some()
    }

    async fn exists(&self, path: &str) -> bool {
        self.entries.read().await.contains_key(path)
    }

    async fn all_paths(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    async fn paths_by_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    async fn children(&self, dir: &str) -> Vec<String> {
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{}/", dir)
        };
        self.entries
            .read()
            .await
            .keys()
            .filter(|k| {
                k.as_str() != dir
                    && k.starts_with(&prefix)
                    && !k[prefix.len()..].contains('/')
            })
            .cloned()
            .collect()
    }

    async fn clear(&self) {
        self.entries.write().await.clear();
    }

    async fn count(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn all_pairs(&self) -> Vec<(String, FileEntry)> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    async fn set_many(&self, new_entries: Vec<(String, FileEntry)>) {
        let mut entries = self.entries.write().await;
        for (path, entry) in new_entries {
            entries.insert(path, entry);
        }
    }

    // Swaps the whole map under one write lock so readers see either the
    // old keyspace or the new one, never an empty in-between state.
    async fn deserialize(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let pairs: HashMap<String, FileEntry> =
            serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
        *self.entries.write().await = pairs;
        Ok(())
    }
}
