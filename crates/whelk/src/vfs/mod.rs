//! In-memory virtual filesystem with POSIX-like semantics.
//!
//! The [`Vfs`] stores its entire tree as a flat `path -> FileEntry` mapping
//! in a pluggable [`StorageBackend`]. Single-key reads go straight to the
//! backend; every multi-step operation (recursive mkdir, copy, move,
//! recursive delete, snapshot restore) runs under one VFS-level mutex so
//! concurrent callers observe it atomically.

pub mod path;
pub mod storage;

use std::sync::Arc;
use std::time::SystemTime;

use thiserror::Error;
use tokio::sync::Mutex;

pub use storage::{FileEntry, InMemoryStorage, StorageBackend, StorageError};

/// Errors that can occur during filesystem operations.
#[derive(Debug, Error)]
pub enum VfsError {
    /// File or directory not found.
    #[error("no such file or directory: {0}")]
    NotFound(String),
    /// Path exists but is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),
    /// Path exists but is a directory.
    #[error("is a directory: {0}")]
    IsADirectory(String),
    /// Destination already exists and overwrite was not requested.
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// Non-recursive delete of a non-empty directory.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),
    /// The root directory cannot be deleted.
    #[error("the root directory cannot be removed")]
    RootForbidden,
    /// Invalid path for the requested operation.
    #[error("invalid path: {0}")]
    InvalidPath(String),
    /// File content is not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(String),
    /// Error from the storage backend.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result alias for filesystem operations.
pub type VfsResult<T> = Result<T, VfsError>;

/// Virtual filesystem over a storage backend.
pub struct Vfs {
    storage: Arc<dyn StorageBackend>,
    /// Serializes multi-operation transactions. Single-key reads bypass it.
    lock: Mutex<()>,
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs").finish_non_exhaustive()
    }
}

impl Vfs {
    /// Create a VFS over the given backend, seeding the root directory if
    /// the backend does not already hold one.
    pub async fn new(storage: Arc<dyn StorageBackend>) -> Self {
        if !storage.exists("/").await {
            storage.set("/", FileEntry::directory("/")).await;
        }
        Self {
            storage,
            lock: Mutex::new(()),
        }
    }

    /// Create a VFS over a fresh in-memory backend.
    pub async fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStorage::new())).await
    }

    /// The underlying storage backend.
    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    // ==================== Predicates ====================

    /// Whether anything exists at `p`.
    pub async fn exists(&self, p: &str) -> bool {
        self.storage.exists(&path::normalize(p)).await
    }

    /// Whether `p` is an existing regular file.
    pub async fn is_file(&self, p: &str) -> bool {
        matches!(self.get_entry(p).await, Some(e) if !e.is_directory)
    }

    /// Whether `p` is an existing directory.
    pub async fn is_directory(&self, p: &str) -> bool {
        matches!(self.get_entry(p).await, Some(e) if e.is_directory)
    }

    /// Fetch the entry at `p`, if any.
    pub async fn get_entry(&self, p: &str) -> Option<FileEntry> {
        self.storage.get(&path::normalize(p)).await
    }

    // ==================== Directories ====================

    /// Create a directory, recursively creating missing parents.
    ///
    /// A no-op if the directory already exists; fails if any component of
    /// the path is an existing file.
    pub async fn create_directory(&self, p: &str) -> VfsResult<()> {
        let p = path::normalize(p);
        let _guard = self.lock.lock().await;
        self.ensure_directory(&p).await
    }

    /// Recursively materialize `p` and its ancestors as directories.
    /// Caller must hold the VFS lock.
    async fn ensure_directory(&self, p: &str) -> VfsResult<()> {
        if p == "/" {
            return Ok(());
        }
        // Walk ancestors top-down so every parent exists before its child.
        let mut ancestors = vec![p.to_string()];
        let mut cursor = path::parent(p);
        while cursor != "/" {
            ancestors.push(cursor.clone());
            cursor = path::parent(&cursor);
        }
        for dir in ancestors.into_iter().rev() {
            match self.storage.get(&dir).await {
                Some(entry) if entry.is_directory => {}
                Some(_) => return Err(VfsError::NotADirectory(dir)),
                None => {
                    self.storage.set(&dir, FileEntry::directory(&dir)).await;
                }
            }
        }
        Ok(())
    }

    /// Child names of a directory in ascending lexicographic order.
    pub async fn list_directory(&self, p: &str) -> VfsResult<Vec<String>> {
        let p = path::normalize(p);
        let entry = self
            .storage
            .get(&p)
            .await
            .ok_or_else(|| VfsError::NotFound(p.clone()))?;
        if !entry.is_directory {
            return Err(VfsError::NotADirectory(p));
        }
        let mut names: Vec<String> = self
            .storage
            .children(&p)
            .await
            .into_iter()
            .map(|child| path::name(&child))
            .collect();
        names.sort();
        Ok(names)
    }

    // ==================== Files ====================

    /// Raw bytes of a file.
    pub async fn read_file(&self, p: &str) -> VfsResult<Vec<u8>> {
        let p = path::normalize(p);
        let entry = self
            .storage
            .get(&p)
            .await
            .ok_or_else(|| VfsError::NotFound(p.clone()))?;
        if entry.is_directory {
            return Err(VfsError::IsADirectory(p));
        }
        Ok(entry.content)
    }

    /// File content decoded as UTF-8.
    pub async fn read_file_to_string(&self, p: &str) -> VfsResult<String> {
        let bytes = self.read_file(p).await?;
        String::from_utf8(bytes).map_err(|_| VfsError::InvalidUtf8(path::normalize(p)))
    }

    /// File content split on `\n`.
    pub async fn read_lines(&self, p: &str) -> VfsResult<Vec<String>> {
        let text = self.read_file_to_string(p).await?;
        Ok(text.split('\n').map(str::to_string).collect())
    }

    /// Write `content` to a file, creating missing parent directories.
    ///
    /// Replaces the content of an existing file (bumping `modified_at`);
    /// fails if the target is a directory.
    pub async fn write_file(&self, p: &str, content: &[u8]) -> VfsResult<()> {
        let p = path::normalize(p);
        let _guard = self.lock.lock().await;
        self.write_file_locked(&p, content).await
    }

    async fn write_file_locked(&self, p: &str, content: &[u8]) -> VfsResult<()> {
        if p == "/" {
            return Err(VfsError::IsADirectory(p.to_string()));
        }
        match self.storage.get(p).await {
            Some(entry) if entry.is_directory => Err(VfsError::IsADirectory(p.to_string())),
            Some(mut entry) => {
                entry.content = content.to_vec();
                entry.modified_at = SystemTime::now();
                self.storage.set(p, entry).await;
                Ok(())
            }
            None => {
                self.ensure_directory(&path::parent(p)).await?;
                self.storage.set(p, FileEntry::file(p, content.to_vec())).await;
                Ok(())
            }
        }
    }

    /// Bump `modified_at` on an existing entry.
    pub async fn touch(&self, p: &str) -> VfsResult<()> {
        let p = path::normalize(p);
        let _guard = self.lock.lock().await;
        let mut entry = self
            .storage
            .get(&p)
            .await
            .ok_or_else(|| VfsError::NotFound(p.clone()))?;
        entry.modified_at = SystemTime::now();
        self.storage.set(&p, entry).await;
        Ok(())
    }

    /// Append bytes to a file, creating it if missing.
    pub async fn append_to_file(&self, p: &str, content: &[u8]) -> VfsResult<()> {
        let p = path::normalize(p);
        let _guard = self.lock.lock().await;
        match self.storage.get(&p).await {
            Some(entry) if entry.is_directory => Err(VfsError::IsADirectory(p)),
            Some(mut entry) => {
                entry.content.extend_from_slice(content);
                entry.modified_at = SystemTime::now();
                self.storage.set(&p, entry).await;
                Ok(())
            }
            None => self.write_file_locked(&p, content).await,
        }
    }

    // ==================== Deletion ====================

    /// Delete a regular file.
    pub async fn delete_file(&self, p: &str) -> VfsResult<()> {
        let p = path::normalize(p);
        let _guard = self.lock.lock().await;
        let entry = self
            .storage
            .get(&p)
            .await
            .ok_or_else(|| VfsError::NotFound(p.clone()))?;
        if entry.is_directory {
            return Err(VfsError::IsADirectory(p));
        }
        self.storage.delete(&p).await;
        Ok(())
    }

    /// Delete a directory. Non-recursive deletes fail on non-empty
    /// directories; the root can never be deleted.
    pub async fn delete_directory(&self, p: &str, recursive: bool) -> VfsResult<()> {
        let p = path::normalize(p);
        if p == "/" {
            return Err(VfsError::RootForbidden);
        }
        let _guard = self.lock.lock().await;
        let entry = self
            .storage
            .get(&p)
            .await
            .ok_or_else(|| VfsError::NotFound(p.clone()))?;
        if !entry.is_directory {
            return Err(VfsError::NotADirectory(p));
        }
        let descendants = self.storage.paths_by_prefix(&format!("{}/", p)).await;
        if !descendants.is_empty() && !recursive {
            return Err(VfsError::DirectoryNotEmpty(p));
        }
        for descendant in descendants {
            self.storage.delete(&descendant).await;
        }
        self.storage.delete(&p).await;
        Ok(())
    }

    /// Delete a path of either kind.
    pub async fn delete(&self, p: &str, recursive: bool) -> VfsResult<()> {
        match self.get_entry(p).await {
            Some(entry) if entry.is_directory => self.delete_directory(p, recursive).await,
            Some(_) => self.delete_file(p).await,
            None => Err(VfsError::NotFound(path::normalize(p))),
        }
    }

    // ==================== Copy / move ====================

    /// Copy a file or directory tree from `src` to `dst`.
    pub async fn copy(&self, src: &str, dst: &str, overwrite: bool) -> VfsResult<()> {
        let src = path::normalize(src);
        let dst = path::normalize(dst);
        let _guard = self.lock.lock().await;
        self.copy_locked(&src, &dst, overwrite).await
    }

    async fn copy_locked(&self, src: &str, dst: &str, overwrite: bool) -> VfsResult<()> {
        let src_entry = self
            .storage
            .get(src)
            .await
            .ok_or_else(|| VfsError::NotFound(src.to_string()))?;
        if src == dst || path::is_child_of(dst, src) {
            return Err(VfsError::InvalidPath(format!(
                "cannot copy {} into itself",
                src
            )));
        }
        if self.storage.exists(dst).await && !overwrite {
            return Err(VfsError::AlreadyExists(dst.to_string()));
        }

        self.ensure_directory(&path::parent(dst)).await?;

        if src_entry.is_directory {
            // Flat keyspace: remap src-prefixed keys onto dst.
            let mut copied = FileEntry::directory(dst);
            copied.mode = src_entry.mode;
            self.storage.set(dst, copied).await;

            let descendants = self.storage.paths_by_prefix(&format!("{}/", src)).await;
            for from in descendants {
                let to = format!("{}{}", dst, &from[src.len()..]);
                if let Some(entry) = self.storage.get(&from).await {
                    let mut copied = if entry.is_directory {
                        FileEntry::directory(&to)
                    } else {
                        FileEntry::file(&to, entry.content.clone())
                    };
                    copied.mode = entry.mode;
                    self.storage.set(&to, copied).await;
                }
            }
        } else {
            let mut copied = FileEntry::file(dst, src_entry.content.clone());
            copied.mode = src_entry.mode;
            self.storage.set(dst, copied).await;
        }
        Ok(())
    }

    /// Move a file or directory tree: copy, then delete the source, both
    /// under a single lock acquisition.
    pub async fn rename(&self, src: &str, dst: &str, overwrite: bool) -> VfsResult<()> {
        let src = path::normalize(src);
        let dst = path::normalize(dst);
        if src == "/" {
            return Err(VfsError::RootForbidden);
        }
        let _guard = self.lock.lock().await;
        self.copy_locked(&src, &dst, overwrite).await?;
        let descendants = self.storage.paths_by_prefix(&format!("{}/", src)).await;
        for descendant in descendants {
            self.storage.delete(&descendant).await;
        }
        self.storage.delete(&src).await;
        Ok(())
    }

    // ==================== Snapshots ====================

    /// Serialize the full storage keyspace to an opaque blob.
    pub async fn create_snapshot(&self) -> VfsResult<Vec<u8>> {
        let _guard = self.lock.lock().await;
        Ok(self.storage.serialize().await?)
    }

    /// Replace the full storage keyspace with a previously serialized blob.
    pub async fn restore_snapshot(&self, bytes: &[u8]) -> VfsResult<()> {
        let _guard = self.lock.lock().await;
        self.storage.deserialize(bytes).await?;
        if !self.storage.exists("/").await {
            self.storage.set("/", FileEntry::directory("/")).await;
        }
        Ok(())
    }

    // ==================== Statistics ====================

    /// Sum of file content lengths.
    pub async fn total_size(&self) -> u64 {
        self.storage
            .all_pairs()
            .await
            .iter()
            .map(|(_, entry)| entry.size())
            .sum()
    }

    /// Number of regular files.
    pub async fn file_count(&self) -> usize {
        self.storage
            .all_pairs()
            .await
            .iter()
            .filter(|(_, entry)| !entry.is_directory)
            .count()
    }

    /// Number of directories, the root included.
    pub async fn directory_count(&self) -> usize {
        self.storage
            .all_pairs()
            .await
            .iter()
            .filter(|(_, entry)| entry.is_directory)
            .count()
    }

    /// Total number of nodes.
    pub async fn node_count(&self) -> usize {
        self.storage.count().await
    }
}
