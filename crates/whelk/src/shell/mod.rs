//! Shell interpreter: tokenizer, command dispatch, and I/O redirection.
//!
//! The shell resolves `argv[0]` against the builtin table first and the
//! registered extension commands second, runs the handler against the
//! [`ShellContext`], applies any stdout redirection through the sandbox's
//! quota-aware filesystem, and wraps everything in a [`ShellResult`].

pub mod builtins;
pub mod command;
pub mod context;
pub mod lexer;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::limits::duration_ms;
use crate::sandbox::fs::SandboxFs;

pub use command::{CommandOutput, ShellCommand};
pub use context::ShellContext;
pub use lexer::{ParseError, RedirectKind};

/// Exit code for an unresolvable command name.
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;

/// Result of executing one command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellResult {
    /// The full original command line.
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    #[serde(rename = "exitCode")]
    pub exit_code: i32,
    pub success: bool,
    #[serde(rename = "durationMs", with = "duration_ms")]
    pub duration: Duration,
}

impl ShellResult {
    fn new(command: &str, output: CommandOutput, started: Instant) -> Self {
        Self {
            command: command.to_string(),
            success: output.success(),
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            duration: started.elapsed(),
        }
    }
}

/// A stateful shell over a sandbox filesystem.
pub struct Shell {
    builtins: Vec<Arc<dyn ShellCommand>>,
    extensions: Vec<Arc<dyn ShellCommand>>,
    ctx: ShellContext,
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("builtins", &self.builtins.len())
            .field("extensions", &self.extensions.len())
            .field("ctx", &self.ctx)
            .finish()
    }
}

impl Shell {
    /// Create a shell over the given filesystem with an initial environment.
    pub fn new(
        fs: Arc<SandboxFs>,
        environment: BTreeMap<String, String>,
        command_timeout: Duration,
    ) -> Self {
        let builtins = builtins::default_builtins();
        let mut ctx = ShellContext::new(fs, environment, command_timeout);
        ctx.command_summaries = builtins
            .iter()
            .map(|b| (b.name().to_string(), b.description().to_string()))
            .collect();
        Self {
            builtins,
            extensions: Vec::new(),
            ctx,
        }
    }

    /// Register an extension command.
    ///
    /// Extensions share the builtin handler contract but never shadow a
    /// builtin: name collisions resolve in favor of the builtin table.
    pub fn register_extension(&mut self, command: Arc<dyn ShellCommand>) {
        let name = command.name().to_string();
        if !self
            .ctx
            .command_summaries
            .iter()
            .any(|(existing, _)| existing == &name)
        {
            self.ctx
                .command_summaries
                .push((name, command.description().to_string()));
        }
        self.extensions.push(command);
    }

    /// The shell's execution context.
    pub fn context(&self) -> &ShellContext {
        &self.ctx
    }

    /// Mutable access to the execution context.
    pub fn context_mut(&mut self) -> &mut ShellContext {
        &mut self.ctx
    }

    fn resolve(&self, name: &str) -> Option<Arc<dyn ShellCommand>> {
        if let Some(builtin) = self.builtins.iter().find(|b| b.name() == name) {
            return Some(Arc::clone(builtin));
        }
        self.extensions
            .iter()
            .find(|e| e.name() == name || e.aliases().contains(&name))
            .map(Arc::clone)
    }

    /// Execute one command line.
    pub async fn execute(&mut self, line: &str) -> ShellResult {
        let started = Instant::now();

        let parsed = match lexer::parse(line, &self.ctx.environment) {
            Ok(parsed) => parsed,
            Err(e) => {
                let output = CommandOutput::fail_with_code(2, format!("whelk: {}", e));
                return ShellResult::new(line, output, started);
            }
        };
        if parsed.is_empty() {
            return ShellResult::new(line, CommandOutput::empty(), started);
        }

        let name = parsed.argv[0].clone();
        let args = &parsed.argv[1..];

        let mut output = match self.resolve(&name) {
            Some(handler) => handler.execute(args, &mut self.ctx).await,
            None => CommandOutput::fail_with_code(
                EXIT_COMMAND_NOT_FOUND,
                format!("{}: command not found", name),
            ),
        };

        if let Some(redirect) = parsed.redirect {
            output = self.apply_redirect(&redirect, output).await;
        }

        ShellResult::new(line, output, started)
    }

    /// Route captured stdout into the redirect target via the quota-aware
    /// filesystem. A rejected write turns the whole command into a failure
    /// with an empty stdout.
    async fn apply_redirect(
        &mut self,
        redirect: &lexer::Redirect,
        output: CommandOutput,
    ) -> CommandOutput {
        let target = self.ctx.resolve_path(&redirect.target);
        let result = match redirect.kind {
            RedirectKind::Overwrite => {
                self.ctx.fs.write_file(&target, output.stdout.as_bytes()).await
            }
            RedirectKind::Append => {
                self.ctx
                    .fs
                    .append_to_file(&target, output.stdout.as_bytes())
                    .await
            }
        };

        match result {
            Ok(()) => CommandOutput {
                stdout: String::new(),
                stderr: output.stderr,
                exit_code: output.exit_code,
            },
            Err(e) => {
                let mut stderr = output.stderr;
                if !stderr.is_empty() {
                    stderr.push('\n');
                }
                stderr.push_str(&format!("whelk: {}: {}", redirect.target, e));
                CommandOutput {
                    stdout: String::new(),
                    stderr,
                    exit_code: 1,
                }
            }
        }
    }
}
