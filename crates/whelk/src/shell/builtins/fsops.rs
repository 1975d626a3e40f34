//! File-manipulation builtins: mkdir, rm, cp, mv, touch.

use async_trait::async_trait;

use crate::shell::command::{CommandOutput, ShellCommand};
use crate::shell::context::ShellContext;
use crate::vfs::path;

use super::errno_text;

// ==================== mkdir ====================

pub(crate) struct MkdirCommand;

#[async_trait]
impl ShellCommand for MkdirCommand {
    fn name(&self) -> &str {
        "mkdir"
    }

    fn description(&self) -> &str {
        "create directories"
    }

    fn usage(&self) -> &str {
        "mkdir [-p] DIR..."
    }

    async fn execute(&self, args: &[String], ctx: &mut ShellContext) -> CommandOutput {
        let mut parents = false;
        let mut dirs = Vec::new();
        for arg in args {
            match arg.as_str() {
                "-p" => parents = true,
                flag if flag.starts_with('-') => {
                    return CommandOutput::fail(format!("mkdir: invalid option: {}", flag));
                }
                dir => dirs.push(dir.to_string()),
            }
        }
        if dirs.is_empty() {
            return CommandOutput::fail(format!("usage: {}", self.usage()));
        }

        let mut stderr_lines = Vec::new();
        for dir in &dirs {
            let target = ctx.resolve_path(dir);
            if !parents {
                if ctx.fs.exists(&target).await {
                    stderr_lines.push(format!("mkdir: {}: File exists", dir));
                    continue;
                }
                let parent = path::parent(&target);
                if !ctx.fs.is_directory(&parent).await {
                    stderr_lines.push(format!("mkdir: {}: No such file or directory", dir));
                    continue;
                }
            }
            if let Err(e) = ctx.fs.create_directory(&target).await {
                stderr_lines.push(format!("mkdir: {}: {}", dir, errno_text(&e)));
            }
        }

        if stderr_lines.is_empty() {
            CommandOutput::empty()
        } else {
            CommandOutput::fail(stderr_lines.join("\n"))
        }
    }
}

// ==================== rm ====================

pub(crate) struct RmCommand;

#[async_trait]
impl ShellCommand for RmCommand {
    fn name(&self) -> &str {
        "rm"
    }

    fn description(&self) -> &str {
        "remove files or directories"
    }

    fn usage(&self) -> &str {
        "rm [-rf] PATH..."
    }

    async fn execute(&self, args: &[String], ctx: &mut ShellContext) -> CommandOutput {
        let mut recursive = false;
        let mut force = false;
        let mut targets = Vec::new();

        for arg in args {
            if let Some(flags) = arg.strip_prefix('-') {
                if arg.len() == 1 {
                    targets.push(arg.to_string());
                    continue;
                }
                for flag in flags.chars() {
                    match flag {
                        'r' | 'R' => recursive = true,
                        'f' => force = true,
                        other => {
                            return CommandOutput::fail(format!("rm: invalid option: -{}", other));
                        }
                    }
                }
            } else {
                targets.push(arg.to_string());
            }
        }
        if targets.is_empty() {
            return CommandOutput::fail(format!("usage: {}", self.usage()));
        }

        let mut stderr_lines = Vec::new();
        for target in &targets {
            let resolved = ctx.resolve_path(target);
            if !ctx.fs.exists(&resolved).await {
                if !force {
                    stderr_lines.push(format!("rm: {}: No such file or directory", target));
                }
                continue;
            }
            if ctx.fs.is_directory(&resolved).await && !recursive {
                stderr_lines.push(format!("rm: {}: Is a directory", target));
                continue;
            }
            if let Err(e) = ctx.fs.delete(&resolved, recursive).await {
                stderr_lines.push(format!("rm: {}: {}", target, errno_text(&e)));
            }
        }

        if stderr_lines.is_empty() {
            CommandOutput::empty()
        } else {
            CommandOutput::fail(stderr_lines.join("\n"))
        }
    }
}

// ==================== cp ====================

pub(crate) struct CpCommand;

#[async_trait]
impl ShellCommand for CpCommand {
    fn name(&self) -> &str {
        "cp"
    }

    fn description(&self) -> &str {
        "copy files or directories"
    }

    fn usage(&self) -> &str {
        "cp [-r] SRC DST"
    }

    async fn execute(&self, args: &[String], ctx: &mut ShellContext) -> CommandOutput {
        let mut recursive = false;
        let mut paths = Vec::new();
        for arg in args {
            match arg.as_str() {
                "-r" | "-R" => recursive = true,
                flag if flag.starts_with('-') && flag.len() > 1 => {
                    return CommandOutput::fail(format!("cp: invalid option: {}", flag));
                }
                p => paths.push(p.to_string()),
            }
        }
        let [src, dst] = paths.as_slice() else {
            return CommandOutput::fail(format!("usage: {}", self.usage()));
        };

        let src_path = ctx.resolve_path(src);
        let dst_path = ctx.resolve_path(dst);

        if ctx.fs.is_directory(&src_path).await && !recursive {
            return CommandOutput::fail(format!(
                "cp: -r not specified; omitting directory '{}'",
                src
            ));
        }

        match ctx.fs.copy(&src_path, &dst_path, true).await {
            Ok(()) => CommandOutput::empty(),
            Err(e) => CommandOutput::fail(format!("cp: {}: {}", src, errno_text(&e))),
        }
    }
}

// ==================== mv ====================

pub(crate) struct MvCommand;

#[async_trait]
impl ShellCommand for MvCommand {
    fn name(&self) -> &str {
        "mv"
    }

    fn description(&self) -> &str {
        "move or rename files and directories"
    }

    fn usage(&self) -> &str {
        "mv SRC DST"
    }

    async fn execute(&self, args: &[String], ctx: &mut ShellContext) -> CommandOutput {
        let [src, dst] = args else {
            return CommandOutput::fail(format!("usage: {}", self.usage()));
        };

        let src_path = ctx.resolve_path(src);
        let dst_path = ctx.resolve_path(dst);

        match ctx.fs.rename(&src_path, &dst_path, true).await {
            Ok(()) => CommandOutput::empty(),
            Err(e) => CommandOutput::fail(format!("mv: {}: {}", src, errno_text(&e))),
        }
    }
}

// ==================== touch ====================

pub(crate) struct TouchCommand;

#[async_trait]
impl ShellCommand for TouchCommand {
    fn name(&self) -> &str {
        "touch"
    }

    fn description(&self) -> &str {
        "create empty files or update timestamps"
    }

    fn usage(&self) -> &str {
        "touch FILE..."
    }

    async fn execute(&self, args: &[String], ctx: &mut ShellContext) -> CommandOutput {
        if args.is_empty() {
            return CommandOutput::fail(format!("usage: {}", self.usage()));
        }

        let mut stderr_lines = Vec::new();
        for file in args {
            let target = ctx.resolve_path(file);
            if let Err(e) = ctx.fs.touch(&target).await {
                stderr_lines.push(format!("touch: {}: {}", file, errno_text(&e)));
            }
        }

        if stderr_lines.is_empty() {
            CommandOutput::empty()
        } else {
            CommandOutput::fail(stderr_lines.join("\n"))
        }
    }
}
