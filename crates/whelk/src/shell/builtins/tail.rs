//! tail builtin - output the last lines of a file.

use async_trait::async_trait;

use crate::shell::command::{CommandOutput, ShellCommand};
use crate::shell::context::ShellContext;

use super::errno_text;
use super::head::parse_line_count;

pub(crate) struct TailCommand;

#[async_trait]
impl ShellCommand for TailCommand {
    fn name(&self) -> &str {
        "tail"
    }

    fn description(&self) -> &str {
        "output the last lines of a file"
    }

    fn usage(&self) -> &str {
        "tail [-n N] FILE"
    }

    async fn execute(&self, args: &[String], ctx: &mut ShellContext) -> CommandOutput {
        let (count, file) = match parse_line_count(args) {
            Ok(parsed) => parsed,
            Err(e) => return CommandOutput::fail(format!("tail: {}", e)),
        };
        let Some(file) = file else {
            return CommandOutput::fail(format!("usage: {}", self.usage()));
        };

        let path = ctx.resolve_path(&file);
        match ctx.fs.read_lines(&path).await {
            Ok(lines) => {
                let skip = lines.len().saturating_sub(count);
                let taken: Vec<String> = lines.into_iter().skip(skip).collect();
                CommandOutput::ok(taken.join("\n"))
            }
            Err(e) => CommandOutput::fail(format!("tail: {}: {}", file, errno_text(&e))),
        }
    }
}
