//! head builtin - output the first lines of a file.

use async_trait::async_trait;

use crate::shell::command::{CommandOutput, ShellCommand};
use crate::shell::context::ShellContext;

use super::errno_text;

pub(crate) struct HeadCommand;

#[async_trait]
impl ShellCommand for HeadCommand {
    fn name(&self) -> &str {
        "head"
    }

    fn description(&self) -> &str {
        "output the first lines of a file"
    }

    fn usage(&self) -> &str {
        "head [-n N] FILE"
    }

    async fn execute(&self, args: &[String], ctx: &mut ShellContext) -> CommandOutput {
        let (count, file) = match parse_line_count(args) {
            Ok(parsed) => parsed,
            Err(e) => return CommandOutput::fail(format!("head: {}", e)),
        };
        let Some(file) = file else {
            return CommandOutput::fail(format!("usage: {}", self.usage()));
        };

        let path = ctx.resolve_path(&file);
        match ctx.fs.read_lines(&path).await {
            Ok(lines) => {
                let taken: Vec<String> = lines.into_iter().take(count).collect();
                CommandOutput::ok(taken.join("\n"))
            }
            Err(e) => CommandOutput::fail(format!("head: {}: {}", file, errno_text(&e))),
        }
    }
}

/// Parse `[-n N] FILE` or the `-N` shorthand. Shared with `tail`.
pub(super) fn parse_line_count(args: &[String]) -> Result<(usize, Option<String>), String> {
    let mut count = 10usize;
    let mut file = None;

    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        if arg == "-n" {
            let value = iter
                .next()
                .ok_or_else(|| "option requires an argument -- 'n'".to_string())?;
            count = value
                .parse()
                .map_err(|_| format!("invalid number of lines: '{}'", value))?;
        } else if let Some(value) = arg.strip_prefix("-n") {
            count = value
                .parse()
                .map_err(|_| format!("invalid number of lines: '{}'", value))?;
        } else if let Some(value) = arg.strip_prefix('-') {
            count = value
                .parse()
                .map_err(|_| format!("invalid option: -{}", value))?;
        } else {
            file = Some(arg.clone());
        }
    }
    Ok((count, file))
}
