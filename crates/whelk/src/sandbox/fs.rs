//! Quota-enforcing filesystem wrapper.
//!
//! [`SandboxFs`] is the sandbox's only mutation path into its VFS: the
//! shell, the extension commands, and the direct file API all write through
//! it. It enforces the sandbox limits before any bytes land in storage,
//! emits [`FileChanged`](crate::observer::SandboxEvent::FileChanged) events
//! for successful mutations, and delegates reads untouched. The bare
//! [`Vfs`] stays quota-free so snapshot restore can never be rejected.

use std::sync::Arc;

use crate::limits::SandboxLimits;
use crate::observer::{FileChangeKind, ObserverFanout, SandboxEvent};
use crate::vfs::{path, Vfs, VfsError};

use super::SandboxError;

/// The sandbox's quota-aware view of its VFS.
pub struct SandboxFs {
    sandbox_id: String,
    vfs: Arc<Vfs>,
    limits: SandboxLimits,
    fanout: Arc<ObserverFanout>,
}

impl std::fmt::Debug for SandboxFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxFs")
            .field("sandbox_id", &self.sandbox_id)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl SandboxFs {
    pub(crate) fn new(
        sandbox_id: String,
        vfs: Arc<Vfs>,
        limits: SandboxLimits,
        fanout: Arc<ObserverFanout>,
    ) -> Self {
        Self {
            sandbox_id,
            vfs,
            limits,
            fanout,
        }
    }

    /// The wrapped, quota-free VFS.
    pub fn vfs(&self) -> &Arc<Vfs> {
        &self.vfs
    }

    /// The limits this wrapper enforces.
    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    fn emit_change(&self, path: &str, kind: FileChangeKind) {
        self.fanout.emit(&SandboxEvent::FileChanged {
            sandbox_id: self.sandbox_id.clone(),
            path: path.to_string(),
            kind,
        });
    }

    /// Number of nodes a write to `p` would add: the target itself plus
    /// every missing ancestor directory.
    async fn nodes_added_by(&self, p: &str) -> usize {
        if self.vfs.exists(p).await {
            return 0;
        }
        let mut added = 1;
        let mut cursor = path::parent(p);
        while cursor != "/" && !self.vfs.exists(&cursor).await {
            added += 1;
            cursor = path::parent(&cursor);
        }
        added
    }

    async fn check_node_budget(&self, new_nodes: usize) -> Result<(), SandboxError> {
        if new_nodes == 0 {
            return Ok(());
        }
        let count = self.vfs.node_count().await;
        if count + new_nodes > self.limits.max_node_count {
            return Err(SandboxError::QuotaExceeded(format!(
                "creating {} node(s) would exceed the node limit of {}",
                new_nodes, self.limits.max_node_count
            )));
        }
        Ok(())
    }

    async fn check_size_budget(&self, new_file_size: u64, delta: i64) -> Result<(), SandboxError> {
        if new_file_size > self.limits.max_file_size {
            return Err(SandboxError::QuotaExceeded(format!(
                "file of {} bytes would exceed the maximum file size of {} bytes",
                new_file_size, self.limits.max_file_size
            )));
        }
        if delta > 0 {
            let total = self.vfs.total_size().await;
            if total + delta as u64 > self.limits.max_total_size {
                return Err(SandboxError::QuotaExceeded(format!(
                    "write of {} additional byte(s) would exceed the total size limit of {} bytes",
                    delta, self.limits.max_total_size
                )));
            }
        }
        Ok(())
    }

    // ==================== Mutations (quota-checked) ====================

    /// Write a file, enforcing file-size, total-size, and node-count quotas.
    /// On a quota violation the VFS is left untouched.
    pub async fn write_file(&self, p: &str, content: &[u8]) -> Result<(), SandboxError> {
        let p = path::normalize(p);
        let existing = match self.vfs.get_entry(&p).await {
            Some(entry) if entry.is_directory => {
                return Err(SandboxError::Vfs(VfsError::IsADirectory(p)));
            }
            Some(entry) => Some(entry.size()),
            None => None,
        };

        let delta = content.len() as i64 - existing.unwrap_or(0) as i64;
        self.check_size_budget(content.len() as u64, delta).await?;
        self.check_node_budget(self.nodes_added_by(&p).await).await?;

        self.vfs.write_file(&p, content).await?;
        self.emit_change(&p, FileChangeKind::Wrote);
        Ok(())
    }

    /// Append to a file (creating it if missing), under the same quotas as
    /// [`SandboxFs::write_file`].
    pub async fn append_to_file(&self, p: &str, content: &[u8]) -> Result<(), SandboxError> {
        let p = path::normalize(p);
        let existing = match self.vfs.get_entry(&p).await {
            Some(entry) if entry.is_directory => {
                return Err(SandboxError::Vfs(VfsError::IsADirectory(p)));
            }
            Some(entry) => entry.size(),
            None => 0,
        };

        let new_size = existing + content.len() as u64;
        self.check_size_budget(new_size, content.len() as i64).await?;
        self.check_node_budget(self.nodes_added_by(&p).await).await?;

        self.vfs.append_to_file(&p, content).await?;
        self.emit_change(&p, FileChangeKind::Appended);
        Ok(())
    }

    /// Create a directory tree under the node-count quota.
    pub async fn create_directory(&self, p: &str) -> Result<(), SandboxError> {
        let p = path::normalize(p);
        let new_nodes = self.nodes_added_by(&p).await;
        self.check_node_budget(new_nodes).await?;

        self.vfs.create_directory(&p).await?;
        if new_nodes > 0 {
            self.emit_change(&p, FileChangeKind::Created);
        }
        Ok(())
    }

    /// Create an empty file, or bump `modified_at` if the path exists.
    pub async fn touch(&self, p: &str) -> Result<(), SandboxError> {
        let p = path::normalize(p);
        if self.vfs.exists(&p).await {
            self.vfs.touch(&p).await?;
            return Ok(());
        }
        self.check_node_budget(self.nodes_added_by(&p).await).await?;
        self.vfs.write_file(&p, &[]).await?;
        self.emit_change(&p, FileChangeKind::Created);
        Ok(())
    }

    /// Delete a path; directories require `recursive`.
    pub async fn delete(&self, p: &str, recursive: bool) -> Result<(), SandboxError> {
        let p = path::normalize(p);
        self.vfs.delete(&p, recursive).await?;
        self.emit_change(&p, FileChangeKind::Deleted);
        Ok(())
    }

    /// Copy a file or tree, charging the copied bytes and nodes against the
    /// quotas before anything is duplicated.
    pub async fn copy(&self, src: &str, dst: &str, overwrite: bool) -> Result<(), SandboxError> {
        let src = path::normalize(src);
        let dst = path::normalize(dst);

        let (added_nodes, added_bytes, largest) = self.copy_cost(&src, &dst).await?;
        self.check_size_budget(largest, added_bytes).await?;
        self.check_node_budget(added_nodes).await?;

        self.vfs.copy(&src, &dst, overwrite).await?;
        self.emit_change(&dst, FileChangeKind::Copied);
        Ok(())
    }

    /// Move a file or tree. A move never grows content, so only the VFS
    /// semantics apply.
    pub async fn rename(&self, src: &str, dst: &str, overwrite: bool) -> Result<(), SandboxError> {
        let src = path::normalize(src);
        let dst = path::normalize(dst);
        self.vfs.rename(&src, &dst, overwrite).await?;
        self.emit_change(&dst, FileChangeKind::Moved);
        Ok(())
    }

    /// Nodes, bytes, and largest single file a copy would add.
    async fn copy_cost(&self, src: &str, dst: &str) -> Result<(usize, i64, u64), SandboxError> {
        let src_entry = self
            .vfs
            .get_entry(src)
            .await
            .ok_or_else(|| SandboxError::Vfs(VfsError::NotFound(src.to_string())))?;

        let mut nodes = self.nodes_added_by(dst).await;
        let mut bytes = 0i64;
        let mut largest = 0u64;

        if src_entry.is_directory {
            let descendants = self
                .vfs
                .storage()
                .paths_by_prefix(&format!("{}/", src))
                .await;
            for from in descendants {
                let to = format!("{}{}", dst, &from[src.len()..]);
                if let Some(entry) = self.vfs.get_entry(&from).await {
                    if !self.vfs.exists(&to).await {
                        nodes += 1;
                    }
                    bytes += entry.size() as i64;
                    largest = largest.max(entry.size());
                }
            }
        } else {
            bytes = src_entry.size() as i64;
            largest = src_entry.size();
        }
        Ok((nodes, bytes, largest))
    }

    // ==================== Reads (delegated) ====================

    pub async fn exists(&self, p: &str) -> bool {
        self.vfs.exists(p).await
    }

    pub async fn is_file(&self, p: &str) -> bool {
        self.vfs.is_file(p).await
    }

    pub async fn is_directory(&self, p: &str) -> bool {
        self.vfs.is_directory(p).await
    }

    pub async fn get_entry(&self, p: &str) -> Option<crate::vfs::FileEntry> {
        self.vfs.get_entry(p).await
    }

    pub async fn list_directory(&self, p: &str) -> Result<Vec<String>, SandboxError> {
        Ok(self.vfs.list_directory(p).await?)
    }

    pub async fn read_file(&self, p: &str) -> Result<Vec<u8>, SandboxError> {
        Ok(self.vfs.read_file(p).await?)
    }

    pub async fn read_file_to_string(&self, p: &str) -> Result<String, SandboxError> {
        Ok(self.vfs.read_file_to_string(p).await?)
    }

    pub async fn read_lines(&self, p: &str) -> Result<Vec<String>, SandboxError> {
        Ok(self.vfs.read_lines(p).await?)
    }

    pub async fn total_size(&self) -> u64 {
        self.vfs.total_size().await
    }

    pub async fn node_count(&self) -> usize {
        self.vfs.node_count().await
    }
}
