//! Whelk: an in-process sandbox for AI agents.
//!
//! Each sandbox binds an in-memory virtual filesystem with POSIX-like
//! semantics to a small shell interpreter, and a [`SessionManager`]
//! multiplexes many sandboxes inside one host process. Agents interact
//! through a string-in / structured-result-out interface; nothing in the
//! sandbox can reach the host filesystem or network except explicitly
//! registered extension commands.
//!
//! ```rust,ignore
//! use whelk::{SandboxOptions, SessionManager};
//!
//! let manager = SessionManager::new();
//! let sandbox = manager.create(None, SandboxOptions::new()).await?;
//!
//! sandbox.execute("mkdir -p /work").await?;
//! sandbox.execute("echo hi > /work/f").await?;
//! let result = sandbox.execute("cat /work/f").await?;
//! assert_eq!(result.stdout, "hi");
//! ```

pub mod extensions;
pub mod limits;
pub mod observer;
pub mod sandbox;
pub mod session;
pub mod shell;
pub mod vfs;

pub use extensions::HttpCommand;
pub use limits::{SandboxLimits, SandboxOptions};
pub use observer::{
    FileChangeKind, LifecycleKind, ObserverFanout, SandboxEvent, SandboxObserver, Subscription,
};
pub use sandbox::{Sandbox, SandboxError, SandboxStats, Snapshot};
pub use session::{SessionError, SessionManager};
pub use shell::{CommandOutput, Shell, ShellCommand, ShellContext, ShellResult};
pub use vfs::{FileEntry, InMemoryStorage, StorageBackend, Vfs, VfsError};
