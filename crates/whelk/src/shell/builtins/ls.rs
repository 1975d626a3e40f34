//! ls builtin - list directory contents.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::shell::command::{CommandOutput, ShellCommand};
use crate::shell::context::ShellContext;
use crate::vfs::FileEntry;

use super::errno_text;

pub(crate) struct LsCommand;

#[async_trait]
impl ShellCommand for LsCommand {
    fn name(&self) -> &str {
        "ls"
    }

    fn description(&self) -> &str {
        "list directory contents"
    }

    fn usage(&self) -> &str {
        "ls [-l] [PATH]"
    }

    async fn execute(&self, args: &[String], ctx: &mut ShellContext) -> CommandOutput {
        let mut long = false;
        let mut target = None;

        for arg in args {
            match arg.as_str() {
                "-l" => long = true,
                flag if flag.starts_with('-') => {
                    return CommandOutput::fail(format!("ls: invalid option: {}", flag));
                }
                path => target = Some(path.to_string()),
            }
        }

        let dir = match &target {
            Some(p) => ctx.resolve_path(p),
            None => ctx.current_directory.clone(),
        };
        let shown = target.as_deref().unwrap_or(&dir);

        let names = match ctx.fs.list_directory(&dir).await {
            Ok(names) => names,
            Err(e) => return CommandOutput::fail(format!("ls: {}: {}", shown, errno_text(&e))),
        };

        if !long {
            return CommandOutput::ok(names.join("\n"));
        }

        let mut lines = Vec::with_capacity(names.len());
        for name in names {
            let child = if dir == "/" {
                format!("/{}", name)
            } else {
                format!("{}/{}", dir, name)
            };
            if let Some(entry) = ctx.fs.get_entry(&child).await {
                lines.push(long_line(&entry));
            }
        }
        CommandOutput::ok(lines.join("\n"))
    }
}

fn long_line(entry: &FileEntry) -> String {
    let modified: DateTime<Utc> = entry.modified_at.into();
    format!(
        "{} {:>8} {} {}",
        mode_string(entry.mode, entry.is_directory),
        entry.size(),
        modified.to_rfc3339_opts(SecondsFormat::Secs, true),
        entry.name
    )
}

/// Render permission bits the way `ls -l` does, e.g. `drwxr-xr-x`.
fn mode_string(mode: u32, is_directory: bool) -> String {
    let mut out = String::with_capacity(10);
    out.push(if is_directory { 'd' } else { '-' });
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}
