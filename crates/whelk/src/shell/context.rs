//! The narrow execution context handed to every command handler.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::sandbox::fs::SandboxFs;
use crate::vfs::path;

/// Per-shell mutable state plus the filesystem handle.
///
/// All filesystem access from command handlers goes through `fs`, which is
/// the sandbox's quota-enforcing wrapper, so a handler can never bypass the
/// sandbox limits or touch the host.
pub struct ShellContext {
    /// Quota-aware filesystem.
    pub fs: Arc<SandboxFs>,
    /// Current working directory, always normalized.
    pub current_directory: String,
    /// Shell environment variables.
    pub environment: BTreeMap<String, String>,
    /// Deadline source for extensions doing external work.
    pub command_timeout: Duration,
    /// `(name, description)` of every registered command, for `help`.
    pub(crate) command_summaries: Vec<(String, String)>,
}

impl std::fmt::Debug for ShellContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellContext")
            .field("current_directory", &self.current_directory)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

impl ShellContext {
    pub(crate) fn new(
        fs: Arc<SandboxFs>,
        environment: BTreeMap<String, String>,
        command_timeout: Duration,
    ) -> Self {
        let mut environment = environment;
        environment
            .entry("HOME".to_string())
            .or_insert_with(|| "/".to_string());
        environment.insert("PWD".to_string(), "/".to_string());
        Self {
            fs,
            current_directory: "/".to_string(),
            environment,
            command_timeout,
            command_summaries: Vec::new(),
        }
    }

    /// Resolve a possibly relative path against the working directory.
    pub fn resolve_path(&self, p: &str) -> String {
        if p.starts_with('/') || p.starts_with('\\') {
            path::normalize(p)
        } else {
            path::normalize(&format!("{}/{}", self.current_directory, p))
        }
    }

    /// Change the working directory, keeping `$PWD` in sync.
    pub fn set_current_directory(&mut self, dir: impl Into<String>) {
        let dir = path::normalize(&dir.into());
        self.environment.insert("PWD".to_string(), dir.clone());
        self.current_directory = dir;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::SandboxLimits;
    use crate::observer::ObserverFanout;
    use crate::vfs::Vfs;

    async fn ctx() -> ShellContext {
        let vfs = Arc::new(Vfs::in_memory().await);
        let fs = Arc::new(SandboxFs::new(
            "test".to_string(),
            vfs,
            SandboxLimits::default(),
            Arc::new(ObserverFanout::new()),
        ));
        ShellContext::new(fs, BTreeMap::new(), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_resolve_relative_and_absolute() {
        let mut ctx = ctx().await;
        ctx.set_current_directory("/work");

        assert_eq!(ctx.resolve_path("notes.txt"), "/work/notes.txt");
        assert_eq!(ctx.resolve_path("../up"), "/up");
        assert_eq!(ctx.resolve_path("/abs"), "/abs");
        assert_eq!(ctx.resolve_path("\\win\\style"), "/win/style");
    }

    #[tokio::test]
    async fn test_preseeded_environment() {
        let ctx = ctx().await;
        assert_eq!(ctx.environment.get("HOME").map(String::as_str), Some("/"));
        assert_eq!(ctx.environment.get("PWD").map(String::as_str), Some("/"));
        assert!(!ctx.environment.contains_key("PATH"));
    }

    #[tokio::test]
    async fn test_cd_updates_pwd() {
        let mut ctx = ctx().await;
        ctx.set_current_directory("/a/b/");
        assert_eq!(ctx.current_directory, "/a/b");
        assert_eq!(ctx.environment.get("PWD").map(String::as_str), Some("/a/b"));
    }
}
