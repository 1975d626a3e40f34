//! cat builtin - concatenate file contents.

use async_trait::async_trait;

use crate::shell::command::{CommandOutput, ShellCommand};
use crate::shell::context::ShellContext;

use super::errno_text;

pub(crate) struct CatCommand;

#[async_trait]
impl ShellCommand for CatCommand {
    fn name(&self) -> &str {
        "cat"
    }

    fn description(&self) -> &str {
        "concatenate files to standard output"
    }

    fn usage(&self) -> &str {
        "cat FILE..."
    }

    async fn execute(&self, args: &[String], ctx: &mut ShellContext) -> CommandOutput {
        if args.is_empty() {
            return CommandOutput::fail(format!("usage: {}", self.usage()));
        }

        let mut stdout = String::new();
        let mut stderr_lines = Vec::new();
        let mut exit_code = 0;

        for file in args {
            let path = ctx.resolve_path(file);
            match ctx.fs.read_file_to_string(&path).await {
                Ok(text) => stdout.push_str(&text),
                Err(e) => {
                    stderr_lines.push(format!("cat: {}: {}", file, errno_text(&e)));
                    exit_code = 1;
                }
            }
        }

        CommandOutput {
            stdout,
            stderr: stderr_lines.join("\n"),
            exit_code,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::test_support::{args, test_context};
    use super::*;

    #[tokio::test]
    async fn test_cat_single() {
        let mut ctx = test_context().await;
        ctx.fs.write_file("/f", b"hello").await.unwrap();

        let out = CatCommand.execute(&args(&["/f"]), &mut ctx).await;
        assert_eq!(out.stdout, "hello");
        assert!(out.success());
    }

    #[tokio::test]
    async fn test_cat_concatenates() {
        let mut ctx = test_context().await;
        ctx.fs.write_file("/a", b"one\n").await.unwrap();
        ctx.fs.write_file("/b", b"two").await.unwrap();

        let out = CatCommand.execute(&args(&["/a", "/b"]), &mut ctx).await;
        assert_eq!(out.stdout, "one\ntwo");
    }

    #[tokio::test]
    async fn test_cat_missing_continues() {
        let mut ctx = test_context().await;
        ctx.fs.write_file("/a", b"one").await.unwrap();

        let out = CatCommand.execute(&args(&["/missing", "/a"]), &mut ctx).await;
        assert_eq!(out.exit_code, 1);
        assert_eq!(out.stdout, "one");
        assert_eq!(out.stderr, "cat: /missing: No such file or directory");
    }

    #[tokio::test]
    async fn test_cat_directory() {
        let mut ctx = test_context().await;
        ctx.fs.create_directory("/d").await.unwrap();

        let out = CatCommand.execute(&args(&["/d"]), &mut ctx).await;
        assert_eq!(out.exit_code, 1);
        assert_eq!(out.stderr, "cat: /d: Is a directory");
    }

    #[tokio::test]
    async fn test_cat_relative_path() {
        let mut ctx = test_context().await;
        ctx.fs.write_file("/work/n.txt", b"note").await.unwrap();
        ctx.set_current_directory("/work");

        let out = CatCommand.execute(&args(&["n.txt"]), &mut ctx).await;
        assert_eq!(out.stdout, "note");
    }
}
