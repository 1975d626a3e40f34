//! Session manager: a concurrent registry of live sandboxes.
//!
//! The manager is the only state shared across sandboxes. It owns them by
//! id, reaps inactive ones, and wires each sandbox's disposal back to the
//! registry so a directly disposed sandbox removes itself.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use thiserror::Error;

use crate::limits::SandboxOptions;
use crate::sandbox::{Sandbox, SandboxStats};

/// Default inactivity window before a sandbox is reaped.
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Errors surfaced by the session manager.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A sandbox with the requested id already exists.
    #[error("sandbox id {0} already exists")]
    Conflict(String),
}

type Registry = Arc<RwLock<HashMap<String, Arc<Sandbox>>>>;

/// Concurrent `id -> Sandbox` registry with lifecycle management.
#[derive(Clone)]
pub struct SessionManager {
    sandboxes: Registry,
    inactivity_timeout: Duration,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sandboxes", &self.len())
            .field("inactivity_timeout", &self.inactivity_timeout)
            .finish()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    /// Manager with the default one-hour inactivity timeout.
    pub fn new() -> Self {
        Self::with_inactivity_timeout(DEFAULT_INACTIVITY_TIMEOUT)
    }

    /// Manager with a custom inactivity timeout.
    pub fn with_inactivity_timeout(inactivity_timeout: Duration) -> Self {
        Self {
            sandboxes: Arc::new(RwLock::new(HashMap::new())),
            inactivity_timeout,
        }
    }

    fn read_registry(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Sandbox>>> {
        self.sandboxes
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_registry(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Sandbox>>> {
        self.sandboxes
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Wire a sandbox's disposal back to this registry. The hook removes
    /// the entry only if it still points at the same sandbox, so a losing
    /// duplicate can never evict the sandbox that beat it.
    fn install_dispose_hook(&self, sandbox: &Arc<Sandbox>) {
        let registry = Arc::downgrade(&self.sandboxes);
        let me = Arc::downgrade(sandbox);
        sandbox.set_dispose_hook(Box::new(move |id: &str| {
            let (Some(registry), Some(me)) = (registry.upgrade(), me.upgrade()) else {
                return;
            };
            let mut map = registry
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if map.get(id).is_some_and(|entry| Arc::ptr_eq(entry, &me)) {
                map.remove(id);
            }
        }));
    }

    /// Create a sandbox, synthesizing an id when none is given. Fails with
    /// [`SessionError::Conflict`] on a duplicate id; the losing sandbox is
    /// disposed.
    pub async fn create(
        &self,
        id: Option<String>,
        options: SandboxOptions,
    ) -> Result<Arc<Sandbox>, SessionError> {
        let sandbox = Sandbox::new(id, options).await;
        self.install_dispose_hook(&sandbox);

        {
            let mut map = self.write_registry();
            if map.contains_key(sandbox.id()) {
                drop(map);
                let id = sandbox.id().to_string();
                sandbox.dispose();
                return Err(SessionError::Conflict(id));
            }
            map.insert(sandbox.id().to_string(), Arc::clone(&sandbox));
        }

        tracing::debug!("created sandbox {}", sandbox.id());
        Ok(sandbox)
    }

    /// Look up a sandbox by id.
    pub fn get(&self, id: &str) -> Option<Arc<Sandbox>> {
        self.read_registry().get(id).cloned()
    }

    /// Fetch the sandbox with `id`, creating it if absent. A concurrent
    /// winner is returned as-is; the freshly built loser is disposed.
    pub async fn get_or_create(&self, id: &str, options: SandboxOptions) -> Arc<Sandbox> {
        if let Some(existing) = self.get(id) {
            return existing;
        }

        let sandbox = Sandbox::new(Some(id.to_string()), options).await;
        self.install_dispose_hook(&sandbox);

        let winner = {
            let mut map = self.write_registry();
            match map.get(id) {
                Some(existing) => Some(Arc::clone(existing)),
                None => {
                    map.insert(id.to_string(), Arc::clone(&sandbox));
                    None
                }
            }
        };

        match winner {
            Some(existing) => {
                sandbox.dispose();
                existing
            }
            None => sandbox,
        }
    }

    /// Remove and dispose a sandbox; returns whether it existed.
    pub fn destroy(&self, id: &str) -> bool {
        let removed = self.write_registry().remove(id);
        match removed {
            Some(sandbox) => {
                sandbox.dispose();
                tracing::debug!("destroyed sandbox {}", id);
                true
            }
            None => false,
        }
    }

    /// Ids of all live sandboxes.
    pub fn list(&self) -> Vec<String> {
        self.read_registry().keys().cloned().collect()
    }

    /// Number of live sandboxes.
    pub fn len(&self) -> usize {
        self.read_registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Statistics for every live sandbox.
    pub async fn all_stats(&self) -> Vec<SandboxStats> {
        let sandboxes: Vec<Arc<Sandbox>> = self.read_registry().values().cloned().collect();
        let mut stats = Vec::with_capacity(sandboxes.len());
        for sandbox in sandboxes {
            stats.push(sandbox.stats().await);
        }
        stats
    }

    /// Remove every sandbox idle past the inactivity timeout. Returns the
    /// number removed.
    pub fn cleanup_inactive(&self) -> usize {
        let Some(cutoff) = SystemTime::now().checked_sub(self.inactivity_timeout) else {
            return 0;
        };

        let expired: Vec<Arc<Sandbox>> = {
            let mut map = self.write_registry();
            let ids: Vec<String> = map
                .iter()
                .filter(|(_, sandbox)| sandbox.last_activity_at() < cutoff)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| map.remove(id)).collect()
        };

        let removed = expired.len();
        for sandbox in expired {
            tracing::debug!("reaping inactive sandbox {}", sandbox.id());
            sandbox.dispose();
        }
        removed
    }
}
