//! Built-in shell commands.
//!
//! Every builtin operates purely through the [`ShellContext`]: the
//! quota-aware filesystem, the working directory, and the environment.
//! Error lines follow the POSIX phrasing (`cd: /x: No such file or
//! directory`) so agent-facing output reads like a real shell.

mod cat;
mod find;
mod fsops;
mod grep;
mod head;
mod ls;
mod tail;
mod wc;

use std::sync::Arc;

use async_trait::async_trait;

use crate::sandbox::SandboxError;
use crate::vfs::VfsError;

use super::command::{CommandOutput, ShellCommand};
use super::context::ShellContext;

/// The full builtin set, in registration order.
pub(crate) fn default_builtins() -> Vec<Arc<dyn ShellCommand>> {
    vec![
        Arc::new(PwdCommand),
        Arc::new(CdCommand),
        Arc::new(ls::LsCommand),
        Arc::new(cat::CatCommand),
        Arc::new(EchoCommand),
        Arc::new(fsops::MkdirCommand),
        Arc::new(fsops::RmCommand),
        Arc::new(fsops::CpCommand),
        Arc::new(fsops::MvCommand),
        Arc::new(fsops::TouchCommand),
        Arc::new(head::HeadCommand),
        Arc::new(tail::TailCommand),
        Arc::new(wc::WcCommand),
        Arc::new(grep::GrepCommand),
        Arc::new(find::FindCommand),
        Arc::new(EnvCommand),
        Arc::new(ExportCommand),
        Arc::new(ClearCommand),
        Arc::new(HelpCommand),
    ]
}

/// POSIX-style reason text for a failed filesystem operation.
pub(crate) fn errno_text(err: &SandboxError) -> String {
    match err {
        SandboxError::Vfs(VfsError::NotFound(_)) => "No such file or directory".to_string(),
        SandboxError::Vfs(VfsError::NotADirectory(_)) => "Not a directory".to_string(),
        SandboxError::Vfs(VfsError::IsADirectory(_)) => "Is a directory".to_string(),
        SandboxError::Vfs(VfsError::AlreadyExists(_)) => "File exists".to_string(),
        SandboxError::Vfs(VfsError::DirectoryNotEmpty(_)) => "Directory not empty".to_string(),
        SandboxError::Vfs(VfsError::InvalidUtf8(_)) => "Invalid or incomplete data".to_string(),
        other => other.to_string(),
    }
}

// ==================== pwd ====================

pub(crate) struct PwdCommand;

#[async_trait]
impl ShellCommand for PwdCommand {
    fn name(&self) -> &str {
        "pwd"
    }

    fn description(&self) -> &str {
        "print the current working directory"
    }

    fn usage(&self) -> &str {
        "pwd"
    }

    async fn execute(&self, _args: &[String], ctx: &mut ShellContext) -> CommandOutput {
        CommandOutput::ok(ctx.current_directory.clone())
    }
}

// ==================== cd ====================

pub(crate) struct CdCommand;

#[async_trait]
impl ShellCommand for CdCommand {
    fn name(&self) -> &str {
        "cd"
    }

    fn description(&self) -> &str {
        "change the working directory"
    }

    fn usage(&self) -> &str {
        "cd [DIR]"
    }

    async fn execute(&self, args: &[String], ctx: &mut ShellContext) -> CommandOutput {
        let target = match args.first() {
            Some(dir) => ctx.resolve_path(dir),
            // Bare `cd` goes home, and home is the root here.
            None => ctx
                .environment
                .get("HOME")
                .cloned()
                .unwrap_or_else(|| "/".to_string()),
        };

        if !ctx.fs.is_directory(&target).await {
            let shown = args.first().map(String::as_str).unwrap_or(&target);
            return CommandOutput::fail(format!("cd: {}: No such file or directory", shown));
        }
        ctx.set_current_directory(target);
        CommandOutput::empty()
    }
}

// ==================== echo ====================

pub(crate) struct EchoCommand;

#[async_trait]
impl ShellCommand for EchoCommand {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "print arguments to standard output"
    }

    fn usage(&self) -> &str {
        "echo [ARG]..."
    }

    async fn execute(&self, args: &[String], _ctx: &mut ShellContext) -> CommandOutput {
        // Variable expansion already happened in the tokenizer.
        CommandOutput::ok(args.join(" "))
    }
}

// ==================== env ====================

pub(crate) struct EnvCommand;

#[async_trait]
impl ShellCommand for EnvCommand {
    fn name(&self) -> &str {
        "env"
    }

    fn description(&self) -> &str {
        "print the environment, sorted by key"
    }

    fn usage(&self) -> &str {
        "env"
    }

    async fn execute(&self, _args: &[String], ctx: &mut ShellContext) -> CommandOutput {
        let lines: Vec<String> = ctx
            .environment
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        CommandOutput::ok(lines.join("\n"))
    }
}

// ==================== export ====================

pub(crate) struct ExportCommand;

#[async_trait]
impl ShellCommand for ExportCommand {
    fn name(&self) -> &str {
        "export"
    }

    fn description(&self) -> &str {
        "set an environment variable"
    }

    fn usage(&self) -> &str {
        "export KEY=VALUE"
    }

    async fn execute(&self, args: &[String], ctx: &mut ShellContext) -> CommandOutput {
        for arg in args {
            let Some((key, value)) = arg.split_once('=') else {
                continue; // malformed assignments are a no-op
            };
            if !is_valid_var_name(key) {
                continue;
            }
            ctx.environment.insert(key.to_string(), value.to_string());
        }
        CommandOutput::empty()
    }
}

fn is_valid_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ==================== clear ====================

pub(crate) struct ClearCommand;

#[async_trait]
impl ShellCommand for ClearCommand {
    fn name(&self) -> &str {
        "clear"
    }

    fn description(&self) -> &str {
        "clear the terminal"
    }

    fn usage(&self) -> &str {
        "clear"
    }

    async fn execute(&self, _args: &[String], _ctx: &mut ShellContext) -> CommandOutput {
        CommandOutput::empty()
    }
}

// ==================== help ====================

pub(crate) struct HelpCommand;

#[async_trait]
impl ShellCommand for HelpCommand {
    fn name(&self) -> &str {
        "help"
    }

    fn description(&self) -> &str {
        "list available commands"
    }

    fn usage(&self) -> &str {
        "help"
    }

    async fn execute(&self, _args: &[String], ctx: &mut ShellContext) -> CommandOutput {
        let mut entries = ctx.command_summaries.clone();
        entries.sort();
        let lines: Vec<String> = entries
            .iter()
            .map(|(name, description)| format!("{:<10} {}", name, description))
            .collect();
        CommandOutput::ok(lines.join("\n"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::limits::SandboxLimits;
    use crate::observer::ObserverFanout;
    use crate::sandbox::fs::SandboxFs;
    use crate::shell::context::ShellContext;
    use crate::vfs::Vfs;

    /// Fresh context over an empty in-memory filesystem.
    pub(crate) async fn test_context() -> ShellContext {
        let vfs = Arc::new(Vfs::in_memory().await);
        let fs = Arc::new(SandboxFs::new(
            "test".to_string(),
            vfs,
            SandboxLimits::default(),
            Arc::new(ObserverFanout::new()),
        ));
        ShellContext::new(fs, BTreeMap::new(), Duration::from_secs(30))
    }

    pub(crate) fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::test_support::{args, test_context};
    use super::*;

    #[tokio::test]
    async fn test_pwd_and_cd() {
        let mut ctx = test_context().await;
        ctx.fs.create_directory("/work").await.unwrap();

        let out = CdCommand.execute(&args(&["/work"]), &mut ctx).await;
        assert!(out.success());
        assert_eq!(PwdCommand.execute(&[], &mut ctx).await.stdout, "/work");
        assert_eq!(ctx.environment.get("PWD").map(String::as_str), Some("/work"));
    }

    #[tokio::test]
    async fn test_cd_missing_directory() {
        let mut ctx = test_context().await;
        let out = CdCommand.execute(&args(&["/missing"]), &mut ctx).await;
        assert_eq!(out.exit_code, 1);
        assert_eq!(out.stderr, "cd: /missing: No such file or directory");
        assert_eq!(ctx.current_directory, "/");
    }

    #[tokio::test]
    async fn test_cd_to_file_fails() {
        let mut ctx = test_context().await;
        ctx.fs.write_file("/f", b"").await.unwrap();
        let out = CdCommand.execute(&args(&["/f"]), &mut ctx).await;
        assert_eq!(out.exit_code, 1);
    }

    #[tokio::test]
    async fn test_cd_bare_goes_home() {
        let mut ctx = test_context().await;
        ctx.fs.create_directory("/work").await.unwrap();
        CdCommand.execute(&args(&["/work"]), &mut ctx).await;
        CdCommand.execute(&[], &mut ctx).await;
        assert_eq!(ctx.current_directory, "/");
    }

    #[tokio::test]
    async fn test_echo_joins_without_newline() {
        let mut ctx = test_context().await;
        let out = EchoCommand.execute(&args(&["Hello", "World"]), &mut ctx).await;
        assert_eq!(out.stdout, "Hello World");
        assert!(!out.stdout.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_env_sorted() {
        let mut ctx = test_context().await;
        ctx.environment.insert("ZED".to_string(), "1".to_string());
        ctx.environment.insert("ABC".to_string(), "2".to_string());

        let out = EnvCommand.execute(&[], &mut ctx).await;
        let lines: Vec<&str> = out.stdout.lines().collect();
        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(lines, sorted);
        assert!(out.stdout.contains("ABC=2"));
    }

    #[tokio::test]
    async fn test_export_and_malformed() {
        let mut ctx = test_context().await;

        let out = ExportCommand.execute(&args(&["NAME=World"]), &mut ctx).await;
        assert!(out.success());
        assert_eq!(ctx.environment.get("NAME").map(String::as_str), Some("World"));

        // Malformed assignments are silently ignored.
        let out = ExportCommand.execute(&args(&["no-equals", "9BAD=x"]), &mut ctx).await;
        assert!(out.success());
        assert!(!ctx.environment.contains_key("no-equals"));
        assert!(!ctx.environment.contains_key("9BAD"));
    }

    #[tokio::test]
    async fn test_export_value_may_contain_equals() {
        let mut ctx = test_context().await;
        ExportCommand.execute(&args(&["EXPR=a=b"]), &mut ctx).await;
        assert_eq!(ctx.environment.get("EXPR").map(String::as_str), Some("a=b"));
    }

    #[tokio::test]
    async fn test_clear_silent() {
        let mut ctx = test_context().await;
        let out = ClearCommand.execute(&[], &mut ctx).await;
        assert!(out.success());
        assert!(out.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_help_lists_commands() {
        let mut ctx = test_context().await;
        ctx.command_summaries = vec![
            ("pwd".to_string(), "print the current working directory".to_string()),
            ("cd".to_string(), "change the working directory".to_string()),
        ];
        let out = HelpCommand.execute(&[], &mut ctx).await;
        assert!(out.stdout.contains("pwd"));
        assert!(out.stdout.contains("cd"));
    }
}
