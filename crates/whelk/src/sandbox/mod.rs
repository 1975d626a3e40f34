//! A sandbox: one VFS, one shell, and the session state around them.
//!
//! The sandbox is the unit of isolation. It owns its filesystem and shell,
//! enforces quotas through [`fs::SandboxFs`], records command history,
//! produces and restores snapshots, and fans events out to observers.
//! `execute` itself only fails when the sandbox has been disposed; every
//! other failure is an ordinary non-zero [`ShellResult`].

pub mod fs;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::limits::SandboxOptions;
use crate::observer::{LifecycleKind, ObserverFanout, SandboxEvent, SandboxObserver, Subscription};
use crate::shell::{Shell, ShellResult};
use crate::vfs::{Vfs, VfsError};

use fs::SandboxFs;

/// Longest stdout/stderr copy carried inside a `CommandExecuted` event.
const EVENT_OUTPUT_CAP: usize = 4096;

/// Errors surfaced by the sandbox API.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Operation on a sandbox that has been disposed.
    #[error("sandbox {0} is disposed")]
    Disposed(String),
    /// A write was rejected by the sandbox limits.
    #[error("{0}")]
    QuotaExceeded(String),
    /// Error from the underlying filesystem.
    #[error(transparent)]
    Vfs(#[from] VfsError),
}

/// Point-in-time statistics about a sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxStats {
    pub id: String,
    pub node_count: usize,
    pub total_size: u64,
    pub command_count: usize,
    pub current_directory: String,
    pub created_at: SystemTime,
    pub last_activity_at: SystemTime,
}

/// A self-contained, restorable capture of a sandbox's filesystem, working
/// directory, and environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    /// Opaque blob produced by the storage backend's serializer.
    pub file_system: Vec<u8>,
    pub current_directory: String,
    pub environment: BTreeMap<String, String>,
    pub created_at: SystemTime,
}

struct SandboxState {
    last_activity_at: SystemTime,
    history: Vec<ShellResult>,
    disposed: bool,
}

type DisposeHook = Box<dyn Fn(&str) + Send + Sync>;

/// An isolated execution environment for one agent.
pub struct Sandbox {
    id: String,
    options: SandboxOptions,
    created_at: SystemTime,
    vfs: Arc<Vfs>,
    fs: Arc<SandboxFs>,
    fanout: Arc<ObserverFanout>,
    shell: tokio::sync::Mutex<Shell>,
    state: Mutex<SandboxState>,
    on_dispose: Mutex<Option<DisposeHook>>,
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Synthesize a short opaque sandbox id: 12 lowercase hex chars.
pub(crate) fn generate_id() -> String {
    format!("{:012x}", rand::random::<u64>() & 0xffff_ffff_ffff)
}

fn truncate_output(s: &str, cap: usize) -> String {
    if s.len() <= cap {
        return s.to_string();
    }
    let mut end = cap;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// Shell-quote an exported value when dispatching `export K=V` lines.
fn export_line(key: &str, value: &str) -> String {
    if value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '"' || c == '$' || c == '>')
    {
        format!("export {}='{}'", key, value)
    } else {
        format!("export {}={}", key, value)
    }
}

impl Sandbox {
    /// Build a sandbox from options, seeding the environment and working
    /// directory through the shell and registering extension commands.
    pub async fn new(id: Option<String>, options: SandboxOptions) -> Arc<Self> {
        let id = id.unwrap_or_else(generate_id);
        let now = SystemTime::now();

        let vfs = Arc::new(Vfs::in_memory().await);
        let fanout = Arc::new(ObserverFanout::new());
        let sandbox_fs = Arc::new(SandboxFs::new(
            id.clone(),
            Arc::clone(&vfs),
            options.limits.clone(),
            Arc::clone(&fanout),
        ));

        let mut shell = Shell::new(
            Arc::clone(&sandbox_fs),
            BTreeMap::new(),
            options.limits.command_timeout,
        );

        for (key, value) in &options.environment {
            if value.contains('\'') {
                // Our lexer has no escape for a quote inside single quotes;
                // seed such values directly.
                shell
                    .context_mut()
                    .environment
                    .insert(key.clone(), value.clone());
            } else {
                shell.execute(&export_line(key, value)).await;
            }
        }

        if options.working_directory != "/" && !options.working_directory.is_empty() {
            let dir = options.working_directory.clone();
            if sandbox_fs.create_directory(&dir).await.is_ok() {
                shell.execute(&format!("cd {}", dir)).await;
            }
        }

        for extension in &options.extensions {
            shell.register_extension(Arc::clone(extension));
        }

        let sandbox = Arc::new(Self {
            id: id.clone(),
            options,
            created_at: now,
            vfs,
            fs: sandbox_fs,
            fanout,
            shell: tokio::sync::Mutex::new(shell),
            state: Mutex::new(SandboxState {
                last_activity_at: now,
                history: Vec::new(),
                disposed: false,
            }),
            on_dispose: Mutex::new(None),
        });

        sandbox.emit_lifecycle(LifecycleKind::Created);
        sandbox
    }

    /// Build a sandbox with default options.
    pub async fn with_defaults() -> Arc<Self> {
        Self::new(None, SandboxOptions::new()).await
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> &SandboxOptions {
        &self.options
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn last_activity_at(&self) -> SystemTime {
        self.lock_state().last_activity_at
    }

    /// The sandbox's quota-aware filesystem.
    pub fn fs(&self) -> &Arc<SandboxFs> {
        &self.fs
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SandboxState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn emit_lifecycle(&self, kind: LifecycleKind) {
        self.fanout.emit(&SandboxEvent::Lifecycle {
            sandbox_id: self.id.clone(),
            kind,
        });
    }

    /// Refuse further work once disposed; otherwise note the activity.
    fn touch_activity(&self) -> Result<(), SandboxError> {
        let mut state = self.lock_state();
        if state.disposed {
            return Err(SandboxError::Disposed(self.id.clone()));
        }
        state.last_activity_at = SystemTime::now();
        Ok(())
    }

    /// Register an observer for this sandbox's events.
    pub fn subscribe(&self, observer: Arc<dyn SandboxObserver>) -> Subscription {
        Arc::clone(&self.fanout).subscribe(observer)
    }

    /// Register an extension command after construction.
    pub async fn register_extension(&self, command: Arc<dyn crate::shell::ShellCommand>) {
        self.shell.lock().await.register_extension(command);
    }

    // ==================== Command execution ====================

    /// Execute one command line through the shell.
    ///
    /// Commands within a sandbox are serialized; only disposal makes this
    /// return an error.
    pub async fn execute(&self, line: &str) -> Result<ShellResult, SandboxError> {
        self.touch_activity()?;

        let (result, working_directory) = {
            let mut shell = self.shell.lock().await;
            let result = shell.execute(line).await;
            (result, shell.context().current_directory.clone())
        };

        self.lock_state().history.push(result.clone());

        let command_name = line.split_whitespace().next().unwrap_or_default().to_string();
        self.fanout.emit(&SandboxEvent::CommandExecuted {
            sandbox_id: self.id.clone(),
            command_name,
            command: result.command.clone(),
            exit_code: result.exit_code,
            duration: result.duration,
            working_directory,
            stdout: truncate_output(&result.stdout, EVENT_OUTPUT_CAP),
            stderr: truncate_output(&result.stderr, EVENT_OUTPUT_CAP),
        });

        Ok(result)
    }

    /// All results recorded so far, oldest first.
    pub fn history(&self) -> Vec<ShellResult> {
        self.lock_state().history.clone()
    }

    // ==================== Direct file API ====================

    /// Write a file under the sandbox quotas.
    pub async fn write_file(&self, p: &str, content: &[u8]) -> Result<(), SandboxError> {
        self.touch_activity()?;
        self.fs.write_file(p, content).await
    }

    /// Read a file's raw bytes.
    pub async fn read_file(&self, p: &str) -> Result<Vec<u8>, SandboxError> {
        self.touch_activity()?;
        self.fs.read_file(p).await
    }

    /// Read a file as UTF-8.
    pub async fn read_file_to_string(&self, p: &str) -> Result<String, SandboxError> {
        self.touch_activity()?;
        self.fs.read_file_to_string(p).await
    }

    /// Child names of a directory.
    pub async fn list_directory(&self, p: &str) -> Result<Vec<String>, SandboxError> {
        self.touch_activity()?;
        self.fs.list_directory(p).await
    }

    /// Delete a path.
    pub async fn delete(&self, p: &str, recursive: bool) -> Result<(), SandboxError> {
        self.touch_activity()?;
        self.fs.delete(p, recursive).await
    }

    // ==================== Snapshots ====================

    /// Capture the filesystem, working directory, and environment.
    pub async fn create_snapshot(&self) -> Result<Snapshot, SandboxError> {
        self.touch_activity()?;

        let (current_directory, environment) = {
            let shell = self.shell.lock().await;
            (
                shell.context().current_directory.clone(),
                shell.context().environment.clone(),
            )
        };
        let file_system = self.vfs.create_snapshot().await?;

        self.emit_lifecycle(LifecycleKind::SnapshotCreated);
        Ok(Snapshot {
            id: self.id.clone(),
            file_system,
            current_directory,
            environment,
            created_at: SystemTime::now(),
        })
    }

    /// Restore a snapshot: filesystem first, then `cd` and `export` replay
    /// through the shell. Quota checks are not re-applied to restored state.
    pub async fn restore_snapshot(&self, snapshot: &Snapshot) -> Result<(), SandboxError> {
        self.touch_activity()?;

        let mut shell = self.shell.lock().await;
        self.vfs.restore_snapshot(&snapshot.file_system).await?;

        shell
            .execute(&format!("cd {}", snapshot.current_directory))
            .await;
        for (key, value) in &snapshot.environment {
            if key == "PWD" {
                continue;
            }
            if value.contains('\'') {
                shell
                    .context_mut()
                    .environment
                    .insert(key.clone(), value.clone());
            } else {
                shell.execute(&export_line(key, value)).await;
            }
        }
        drop(shell);

        self.emit_lifecycle(LifecycleKind::SnapshotRestored);
        Ok(())
    }

    // ==================== Stats and disposal ====================

    /// Current statistics for this sandbox.
    pub async fn stats(&self) -> SandboxStats {
        let (command_count, last_activity_at) = {
            let state = self.lock_state();
            (state.history.len(), state.last_activity_at)
        };
        let current_directory = self.shell.lock().await.context().current_directory.clone();

        SandboxStats {
            id: self.id.clone(),
            node_count: self.vfs.node_count().await,
            total_size: self.vfs.total_size().await,
            command_count,
            current_directory,
            created_at: self.created_at,
            last_activity_at,
        }
    }

    /// Whether this sandbox has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.lock_state().disposed
    }

    /// Hook invoked with the sandbox id when the sandbox is disposed,
    /// letting the owning registry drop its entry.
    pub(crate) fn set_dispose_hook(&self, hook: DisposeHook) {
        if let Ok(mut slot) = self.on_dispose.lock() {
            *slot = Some(hook);
        }
    }

    /// Dispose the sandbox: idempotent; clears history and notifies the
    /// owning session manager.
    pub fn dispose(&self) {
        {
            let mut state = self.lock_state();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.history.clear();
        }
        self.emit_lifecycle(LifecycleKind::Disposed);

        let hook = self.on_dispose.lock().ok().and_then(|mut slot| slot.take());
        if let Some(hook) = hook {
            hook(&self.id);
        }
    }

    #[cfg(test)]
    pub(crate) fn rewind_last_activity(&self, by: std::time::Duration) {
        let mut state = self.lock_state();
        if let Some(earlier) = state.last_activity_at.checked_sub(by) {
            state.last_activity_at = earlier;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::limits::SandboxLimits;

    #[tokio::test]
    async fn test_generated_id_shape() {
        let id = generate_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_constructor_seeds_env_and_cwd() {
        let options = SandboxOptions::new()
            .env("TASK", "review")
            .env("SPACED", "two words")
            .working_directory("/agent/work");
        let sandbox = Sandbox::new(Some("fixed-id-0001".to_string()), options).await;

        assert_eq!(sandbox.id(), "fixed-id-0001");
        let result = sandbox.execute("pwd").await.unwrap();
        assert_eq!(result.stdout, "/agent/work");

        let result = sandbox.execute("echo $TASK").await.unwrap();
        assert_eq!(result.stdout, "review");
        let result = sandbox.execute("echo $SPACED").await.unwrap();
        assert_eq!(result.stdout, "two words");
    }

    #[tokio::test]
    async fn test_execute_records_history() {
        let sandbox = Sandbox::with_defaults().await;
        sandbox.execute("echo one").await.unwrap();
        sandbox.execute("bogus").await.unwrap();

        let history = sandbox.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].command, "echo one");
        assert!(!history[1].success);
    }

    #[tokio::test]
    async fn test_disposed_refuses_execute() {
        let sandbox = Sandbox::with_defaults().await;
        sandbox.dispose();

        let err = sandbox.execute("pwd").await.unwrap_err();
        assert!(matches!(err, SandboxError::Disposed(_)));
        assert!(sandbox.history().is_empty(), "history cleared on dispose");
    }

    #[tokio::test]
    async fn test_dispose_idempotent_and_hooked() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let sandbox = Sandbox::with_defaults().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        sandbox.set_dispose_hook(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        sandbox.dispose();
        sandbox.dispose();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_quota_applies_to_direct_writes() {
        let options = SandboxOptions::new().limits(SandboxLimits {
            max_file_size: 4,
            ..SandboxLimits::default()
        });
        let sandbox = Sandbox::new(None, options).await;

        let err = sandbox.write_file("/big", b"12345").await.unwrap_err();
        assert!(matches!(err, SandboxError::QuotaExceeded(_)));
        sandbox.write_file("/ok", b"1234").await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_rollback() {
        let sandbox = Sandbox::with_defaults().await;
        sandbox.write_file("/file.txt", b"original").await.unwrap();

        let snapshot = sandbox.create_snapshot().await.unwrap();
        sandbox.write_file("/file.txt", b"modified").await.unwrap();
        assert_eq!(
            sandbox.read_file_to_string("/file.txt").await.unwrap(),
            "modified"
        );

        sandbox.restore_snapshot(&snapshot).await.unwrap();
        assert_eq!(
            sandbox.read_file_to_string("/file.txt").await.unwrap(),
            "original"
        );
    }

    #[tokio::test]
    async fn test_snapshot_restores_cwd_and_env() {
        let sandbox = Sandbox::with_defaults().await;
        sandbox.execute("mkdir -p /deep/dir").await.unwrap();
        sandbox.execute("cd /deep/dir").await.unwrap();
        sandbox.execute("export MARK=kept").await.unwrap();

        let snapshot = sandbox.create_snapshot().await.unwrap();

        sandbox.execute("cd /").await.unwrap();
        sandbox.execute("export MARK=lost").await.unwrap();
        sandbox.restore_snapshot(&snapshot).await.unwrap();

        assert_eq!(sandbox.execute("pwd").await.unwrap().stdout, "/deep/dir");
        assert_eq!(sandbox.execute("echo $MARK").await.unwrap().stdout, "kept");
    }

    #[tokio::test]
    async fn test_snapshot_serde_round_trip() {
        let sandbox = Sandbox::with_defaults().await;
        sandbox.write_file("/f", b"x").await.unwrap();

        let snapshot = sandbox.create_snapshot().await.unwrap();
        let json = serde_json::to_vec(&snapshot).unwrap();
        let back: Snapshot = serde_json::from_slice(&json).unwrap();
        assert_eq!(back.file_system, snapshot.file_system);
        assert_eq!(back.current_directory, snapshot.current_directory);
    }

    #[tokio::test]
    async fn test_stats() {
        let sandbox = Sandbox::with_defaults().await;
        sandbox.execute("mkdir -p /data").await.unwrap();
        sandbox.execute("echo four > /data/f").await.unwrap();

        let stats = sandbox.stats().await;
        assert_eq!(stats.id, sandbox.id());
        assert_eq!(stats.node_count, 3); // "/", "/data", "/data/f"
        assert_eq!(stats.total_size, 4);
        assert_eq!(stats.command_count, 2);
        assert_eq!(stats.current_directory, "/");
    }

    #[tokio::test]
    async fn test_command_executed_event() {
        use std::sync::Mutex as StdMutex;

        struct Capture(StdMutex<Vec<(String, i32)>>);
        impl SandboxObserver for Capture {
            fn on_event(
                &self,
                event: &SandboxEvent,
            ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
                if let SandboxEvent::CommandExecuted {
                    command_name,
                    exit_code,
                    ..
                } = event
                {
                    self.0
                        .lock()
                        .unwrap()
                        .push((command_name.clone(), *exit_code));
                }
                Ok(())
            }
        }

        let sandbox = Sandbox::with_defaults().await;
        let capture = Arc::new(Capture(StdMutex::new(Vec::new())));
        let _sub = sandbox.subscribe(capture.clone());

        sandbox.execute("echo hello").await.unwrap();
        sandbox.execute("missing-cmd").await.unwrap();

        let seen = capture.0.lock().unwrap().clone();
        assert_eq!(seen, vec![("echo".to_string(), 0), ("missing-cmd".to_string(), 127)]);
    }

    #[tokio::test]
    async fn test_event_output_truncated() {
        use std::sync::Mutex as StdMutex;

        struct Capture(StdMutex<usize>);
        impl SandboxObserver for Capture {
            fn on_event(
                &self,
                event: &SandboxEvent,
            ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
                if let SandboxEvent::CommandExecuted { stdout, .. } = event {
                    *self.0.lock().unwrap() = stdout.len();
                }
                Ok(())
            }
        }

        let sandbox = Sandbox::with_defaults().await;
        let capture = Arc::new(Capture(StdMutex::new(0)));
        let _sub = sandbox.subscribe(capture.clone());

        let long = "x".repeat(EVENT_OUTPUT_CAP * 2);
        sandbox.execute(&format!("echo {}", long)).await.unwrap();

        assert_eq!(*capture.0.lock().unwrap(), EVENT_OUTPUT_CAP);
    }
}
