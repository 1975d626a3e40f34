//! wc builtin - count lines, words, and bytes.

use async_trait::async_trait;

use crate::shell::command::{CommandOutput, ShellCommand};
use crate::shell::context::ShellContext;

use super::errno_text;

pub(crate) struct WcCommand;

#[async_trait]
impl ShellCommand for WcCommand {
    fn name(&self) -> &str {
        "wc"
    }

    fn description(&self) -> &str {
        "count lines, words, and bytes"
    }

    fn usage(&self) -> &str {
        "wc [-l|-w|-c] FILE"
    }

    async fn execute(&self, args: &[String], ctx: &mut ShellContext) -> CommandOutput {
        let mut mode = None;
        let mut file = None;

        for arg in args {
            match arg.as_str() {
                "-l" => mode = Some(Mode::Lines),
                "-w" => mode = Some(Mode::Words),
                "-c" => mode = Some(Mode::Bytes),
                flag if flag.starts_with('-') && flag.len() > 1 => {
                    return CommandOutput::fail(format!("wc: invalid option: {}", flag));
                }
                path => file = Some(path.to_string()),
            }
        }
        let Some(file) = file else {
            return CommandOutput::fail(format!("usage: {}", self.usage()));
        };

        let path = ctx.resolve_path(&file);
        let content = match ctx.fs.read_file(&path).await {
            Ok(content) => content,
            Err(e) => return CommandOutput::fail(format!("wc: {}: {}", file, errno_text(&e))),
        };

        let bytes = content.len();
        let text = String::from_utf8_lossy(&content);
        let lines = text.matches('\n').count();
        let words = text.split_whitespace().count();

        let stdout = match mode {
            Some(Mode::Lines) => format!("{} {}", lines, file),
            Some(Mode::Words) => format!("{} {}", words, file),
            Some(Mode::Bytes) => format!("{} {}", bytes, file),
            None => format!("{:>7} {:>7} {:>7} {}", lines, words, bytes, file),
        };
        CommandOutput::ok(stdout)
    }
}

enum Mode {
    Lines,
    Words,
    Bytes,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::test_support::{args, test_context};
    use super::*;

    #[tokio::test]
    async fn test_wc_all_counts() {
        let mut ctx = test_context().await;
        ctx.fs.write_file("/f", b"one two\nthree\n").await.unwrap();

        let out = WcCommand.execute(&args(&["/f"]), &mut ctx).await;
        assert!(out.success());
        let fields: Vec<&str> = out.stdout.split_whitespace().collect();
        assert_eq!(fields, vec!["2", "3", "14", "/f"]);
    }

    #[tokio::test]
    async fn test_wc_lines_counts_newlines() {
        let mut ctx = test_context().await;
        ctx.fs.write_file("/f", b"a\nb").await.unwrap();

        let out = WcCommand.execute(&args(&["-l", "/f"]), &mut ctx).await;
        assert_eq!(out.stdout, "1 /f");
    }

    #[tokio::test]
    async fn test_wc_words_and_bytes() {
        let mut ctx = test_context().await;
        ctx.fs.write_file("/f", b"alpha  beta\tgamma").await.unwrap();

        let out = WcCommand.execute(&args(&["-w", "/f"]), &mut ctx).await;
        assert_eq!(out.stdout, "3 /f");

        let out = WcCommand.execute(&args(&["-c", "/f"]), &mut ctx).await;
        assert_eq!(out.stdout, "17 /f");
    }

    #[tokio::test]
    async fn test_wc_missing_file() {
        let mut ctx = test_context().await;
        let out = WcCommand.execute(&args(&["/nope"]), &mut ctx).await;
        assert_eq!(out.exit_code, 1);
        assert_eq!(out.stderr, "wc: /nope: No such file or directory");
    }
}
