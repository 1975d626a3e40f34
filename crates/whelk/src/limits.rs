//! Resource limits and construction options for a sandbox.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shell::command::ShellCommand;

/// Per-sandbox resource limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxLimits {
    /// Maximum sum of file content lengths across the filesystem.
    pub max_total_size: u64,
    /// Maximum size of any single file.
    pub max_file_size: u64,
    /// Maximum number of filesystem nodes (files + directories).
    pub max_node_count: usize,
    /// Deadline extensions should honor for external work.
    #[serde(with = "duration_ms")]
    pub command_timeout: Duration,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_total_size: 100 * 1024 * 1024, // 100 MiB
            max_file_size: 10 * 1024 * 1024,   // 10 MiB
            max_node_count: 10_000,
            command_timeout: Duration::from_secs(30),
        }
    }
}

/// Options for constructing a sandbox.
#[derive(Clone)]
pub struct SandboxOptions {
    /// Resource limits enforced by the sandbox's filesystem wrapper.
    pub limits: SandboxLimits,
    /// Environment variables exported before the first command runs.
    pub environment: BTreeMap<String, String>,
    /// Initial working directory; created on demand when not `/`.
    pub working_directory: String,
    /// Extension commands registered alongside the builtins.
    pub extensions: Vec<Arc<dyn ShellCommand>>,
}

impl std::fmt::Debug for SandboxOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxOptions")
            .field("limits", &self.limits)
            .field("environment", &self.environment)
            .field("working_directory", &self.working_directory)
            .field("extensions", &self.extensions.len())
            .finish()
    }
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxOptions {
    /// Options with default limits, empty environment, and `/` as cwd.
    pub fn new() -> Self {
        Self {
            limits: SandboxLimits::default(),
            environment: BTreeMap::new(),
            working_directory: "/".to_string(),
            extensions: Vec::new(),
        }
    }

    /// Replace the limits.
    pub fn limits(mut self, limits: SandboxLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Set the initial working directory.
    pub fn working_directory(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = dir.into();
        self
    }

    /// Register an extension command.
    pub fn extension(mut self, command: Arc<dyn ShellCommand>) -> Self {
        self.extensions.push(command);
        self
    }
}

/// Serialize a `Duration` as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = SandboxLimits::default();
        assert_eq!(limits.max_total_size, 100 * 1024 * 1024);
        assert_eq!(limits.max_file_size, 10 * 1024 * 1024);
        assert_eq!(limits.max_node_count, 10_000);
        assert_eq!(limits.command_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_limits_serialize_timeout_as_ms() {
        let limits = SandboxLimits {
            command_timeout: Duration::from_secs(5),
            ..SandboxLimits::default()
        };
        let json = serde_json::to_string(&limits).unwrap();
        assert!(json.contains("\"command_timeout\":5000"));

        let back: SandboxLimits = serde_json::from_str(&json).unwrap();
        assert_eq!(back.command_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_options_builder() {
        let opts = SandboxOptions::new()
            .env("TASK", "demo")
            .working_directory("/work");
        assert_eq!(opts.environment.get("TASK").map(String::as_str), Some("demo"));
        assert_eq!(opts.working_directory, "/work");
    }
}
