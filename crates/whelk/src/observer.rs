//! Event observers and the per-sandbox fanout.
//!
//! A sandbox emits [`SandboxEvent`]s for executed commands, file mutations,
//! and lifecycle transitions. Dispatch is synchronous, in subscription
//! order; a failing observer is logged and skipped so it can never break
//! another observer or the command that triggered the event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// What happened to a path inside the sandbox filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    Wrote,
    Appended,
    Created,
    Deleted,
    Copied,
    Moved,
}

/// Lifecycle transitions of a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleKind {
    Created,
    Disposed,
    SnapshotCreated,
    SnapshotRestored,
}

/// Events fanned out to sandbox observers.
#[derive(Debug, Clone)]
pub enum SandboxEvent {
    /// A shell command finished. `stdout`/`stderr` are truncated copies.
    CommandExecuted {
        sandbox_id: String,
        command_name: String,
        command: String,
        exit_code: i32,
        duration: Duration,
        working_directory: String,
        stdout: String,
        stderr: String,
    },
    /// A path was mutated through the sandbox's quota-aware filesystem.
    FileChanged {
        sandbox_id: String,
        path: String,
        kind: FileChangeKind,
    },
    /// An extension command reported a skill invocation.
    SkillInvoked { sandbox_id: String, name: String },
    /// The sandbox changed lifecycle state.
    Lifecycle {
        sandbox_id: String,
        kind: LifecycleKind,
    },
    /// A non-fatal error worth surfacing to observers.
    Error { sandbox_id: String, message: String },
}

/// A sink for sandbox events.
///
/// Returning an error never affects the sandbox: the fanout logs it and
/// moves on to the next observer.
pub trait SandboxObserver: Send + Sync {
    fn on_event(&self, event: &SandboxEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

struct Registered {
    id: u64,
    observer: Arc<dyn SandboxObserver>,
}

/// Ordered observer registry for one sandbox.
pub struct ObserverFanout {
    observers: Mutex<Vec<Registered>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for ObserverFanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverFanout").finish_non_exhaustive()
    }
}

impl Default for ObserverFanout {
    fn default() -> Self {
        Self::new()
    }
}

impl ObserverFanout {
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register an observer. The returned [`Subscription`] removes it again
    /// when dropped.
    pub fn subscribe(self: Arc<Self>, observer: Arc<dyn SandboxObserver>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut observers) = self.observers.lock() {
            observers.push(Registered { id, observer });
        }
        Subscription {
            id,
            fanout: Arc::downgrade(&self),
        }
    }

    /// Dispatch an event to every observer, in subscription order.
    pub fn emit(&self, event: &SandboxEvent) {
        let observers: Vec<Arc<dyn SandboxObserver>> = match self.observers.lock() {
            Ok(observers) => observers.iter().map(|r| Arc::clone(&r.observer)).collect(),
            Err(_) => return,
        };
        for observer in observers {
            if let Err(e) = observer.on_event(event) {
                tracing::warn!("sandbox observer failed: {}", e);
            }
        }
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.observers.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: u64) {
        if let Ok(mut observers) = self.observers.lock() {
            observers.retain(|r| r.id != id);
        }
    }
}

/// Scoped observer registration; dropping it unsubscribes.
#[must_use = "dropping the subscription immediately unsubscribes the observer"]
pub struct Subscription {
    id: u64,
    fanout: Weak<ObserverFanout>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(fanout) = self.fanout.upgrade() {
            fanout.remove(self.id);
        }
    }
}
