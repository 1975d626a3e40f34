//! grep builtin - print lines matching a pattern.
//!
//! Matching is plain substring containment, optionally case-insensitive
//! with `-i`. Exit code 1 means no line matched anywhere.

use async_trait::async_trait;

use crate::shell::command::{CommandOutput, ShellCommand};
use crate::shell::context::ShellContext;

use super::errno_text;

pub(crate) struct GrepCommand;

#[async_trait]
impl ShellCommand for GrepCommand {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "print lines matching a pattern"
    }

    fn usage(&self) -> &str {
        "grep [-i] PATTERN FILE..."
    }

    async fn execute(&self, args: &[String], ctx: &mut ShellContext) -> CommandOutput {
        let mut ignore_case = false;
        let mut positional = Vec::new();

        for arg in args {
            match arg.as_str() {
                "-i" => ignore_case = true,
                flag if flag.starts_with('-') && flag.len() > 1 => {
                    return CommandOutput::fail_with_code(
                        2,
                        format!("grep: invalid option: {}", flag),
                    );
                }
                other => positional.push(other.to_string()),
            }
        }
        if positional.len() < 2 {
            return CommandOutput::fail_with_code(2, format!("usage: {}", self.usage()));
        }
        let pattern = positional.remove(0);
        let files = positional;
        let needle = if ignore_case {
            pattern.to_lowercase()
        } else {
            pattern.clone()
        };

        let show_filename = files.len() > 1;
        let mut stdout_lines = Vec::new();
        let mut stderr_lines = Vec::new();
        let mut matched = false;
        let mut had_error = false;

        for file in &files {
            let path = ctx.resolve_path(file);
            let text = match ctx.fs.read_file_to_string(&path).await {
                Ok(text) => text,
                Err(e) => {
                    stderr_lines.push(format!("grep: {}: {}", file, errno_text(&e)));
                    had_error = true;
                    continue;
                }
            };

            for line in text.split('\n') {
                let haystack = if ignore_case {
                    line.to_lowercase()
                } else {
                    line.to_string()
                };
                if haystack.contains(&needle) {
                    matched = true;
                    if show_filename {
                        stdout_lines.push(format!("{}:{}", file, line));
                    } else {
                        stdout_lines.push(line.to_string());
                    }
                }
            }
        }

        let exit_code = if had_error {
            2
        } else if matched {
            0
        } else {
            1
        };
        CommandOutput {
            stdout: stdout_lines.join("\n"),
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
    async fn test_grep_substring_match() {
        let mut ctx = test_context().await;
        ctx.fs
            .write_file("/f", b"alpha\nbeta match here\ngamma")
            .await
            .unwrap();

        let out = GrepCommand.execute(&args(&["match", "/f"]), &mut ctx).await;
        assert!(out.success());
        assert_eq!(out.stdout, "beta match here");
    }

    #[tokio::test]
    async fn test_grep_no_match_exit_one() {
        let mut ctx = test_context().await;
        ctx.fs.write_file("/f", b"nothing here").await.unwrap();

        let out = GrepCommand.execute(&args(&["absent", "/f"]), &mut ctx).await;
        assert_eq!(out.exit_code, 1);
        assert!(out.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_grep_case_insensitive() {
        let mut ctx = test_context().await;
        ctx.fs.write_file("/f", b"Hello World").await.unwrap();

        let out = GrepCommand.execute(&args(&["hello", "/f"]), &mut ctx).await;
        assert_eq!(out.exit_code, 1);

        let out = GrepCommand
            .execute(&args(&["-i", "hello", "/f"]), &mut ctx)
            .await;
        assert!(out.success());
        assert_eq!(out.stdout, "Hello World");
    }

    #[tokio::test]
    async fn test_grep_multiple_files_prefixed() {
        let mut ctx = test_context().await;
        ctx.fs.write_file("/a", b"needle in a").await.unwrap();
        ctx.fs.write_file("/b", b"nothing").await.unwrap();

        let out = GrepCommand
            .execute(&args(&["needle", "/a", "/b"]), &mut ctx)
            .await;
        assert!(out.success());
        assert_eq!(out.stdout, "/a:needle in a");
    }

    #[tokio::test]
    async fn test_grep_missing_file() {
        let mut ctx = test_context().await;
        let out = GrepCommand.execute(&args(&["x", "/nope"]), &mut ctx).await;
        assert_eq!(out.exit_code, 2);
        assert_eq!(out.stderr, "grep: /nope: No such file or directory");
    }

    #[tokio::test]
    async fn test_grep_usage_error() {
        let mut ctx = test_context().await;
        let out = GrepCommand.execute(&args(&["lonely"]), &mut ctx).await;
        assert_eq!(out.exit_code, 2);
    }
}
