//! find builtin - walk a directory tree.

use async_trait::async_trait;

use crate::shell::command::{CommandOutput, ShellCommand};
use crate::shell::context::ShellContext;
use crate::vfs::path;

pub(crate) struct FindCommand;

#[async_trait]
impl ShellCommand for FindCommand {
    fn name(&self) -> &str {
        "find"
    }

    fn description(&self) -> &str {
        "walk a directory tree, optionally filtering by name"
    }

    fn usage(&self) -> &str {
        "find ROOT [-name PATTERN]"
    }

    async fn execute(&self, args: &[String], ctx: &mut ShellContext) -> CommandOutput {
        let mut root = None;
        let mut pattern = None;

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-name" => {
                    let Some(value) = iter.next() else {
                        return CommandOutput::fail("find: -name requires an argument");
                    };
                    pattern = Some(value.clone());
                }
                flag if flag.starts_with('-') && flag.len() > 1 => {
                    return CommandOutput::fail(format!("find: unknown predicate: {}", flag));
                }
                p => root = Some(p.to_string()),
            }
        }
        let Some(root) = root else {
            return CommandOutput::fail(format!("usage: {}", self.usage()));
        };

        let glob = match pattern.as_deref().map(glob::Pattern::new) {
            Some(Ok(glob)) => Some(glob),
            Some(Err(e)) => {
                return CommandOutput::fail(format!("find: invalid pattern: {}", e));
            }
            None => None,
        };

        let start = ctx.resolve_path(&root);
        if !ctx.fs.exists(&start).await {
            return CommandOutput::fail(format!("find: {}: No such file or directory", root));
        }

        // Pre-order walk: each directory before its children, children in
        // name order.
        let mut matches = Vec::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            let leaf = path::name(&current);
            let matched = match &glob {
                Some(glob) => glob.matches(&leaf),
                None => true,
            };
            if matched {
                matches.push(current.clone());
            }

            if ctx.fs.is_directory(&current).await {
                if let Ok(names) = ctx.fs.list_directory(&current).await {
                    for name in names.into_iter().rev() {
                        if current == "/" {
                            stack.push(format!("/{}", name));
                        } else {
                            stack.push(format!("{}/{}", current, name));
                        }
                    }
                }
            }
        }

        CommandOutput::ok(matches.join("\n"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::test_support::{args, test_context};
    use super::*;

    async fn seeded() -> ShellContext {
        let ctx = test_context().await;
        ctx.fs.write_file("/proj/src/main.rs", b"").await.unwrap();
        ctx.fs.write_file("/proj/src/lib.rs", b"").await.unwrap();
        ctx.fs.write_file("/proj/readme.md", b"").await.unwrap();
        ctx.fs.write_file("/proj/tests/it.rs", b"").await.unwrap();
        ctx
    }

    #[tokio::test]
    async fn test_find_all_preorder() {
        let mut ctx = seeded().await;
        let out = FindCommand.execute(&args(&["/proj"]), &mut ctx).await;
        assert_eq!(
            out.stdout,
            "/proj\n/proj/readme.md\n/proj/src\n/proj/src/lib.rs\n/proj/src/main.rs\n/proj/tests\n/proj/tests/it.rs"
        );
    }

    #[tokio::test]
    async fn test_find_name_glob() {
        let mut ctx = seeded().await;
        let out = FindCommand
            .execute(&args(&["/proj", "-name", "*.rs"]), &mut ctx)
            .await;
        assert_eq!(
            out.stdout,
            "/proj/src/lib.rs\n/proj/src/main.rs\n/proj/tests/it.rs"
        );
    }

    #[tokio::test]
    async fn test_find_question_mark_glob() {
        let mut ctx = test_context().await;
        ctx.fs.write_file("/d/a1", b"").await.unwrap();
        ctx.fs.write_file("/d/a22", b"").await.unwrap();

        let out = FindCommand
            .execute(&args(&["/d", "-name", "a?"]), &mut ctx)
            .await;
        assert_eq!(out.stdout, "/d/a1");
    }

    #[tokio::test]
    async fn test_find_missing_root() {
        let mut ctx = test_context().await;
        let out = FindCommand.execute(&args(&["/nope"]), &mut ctx).await;
        assert_eq!(out.exit_code, 1);
        assert_eq!(out.stderr, "find: /nope: No such file or directory");
    }

    #[tokio::test]
    async fn test_find_from_root() {
        let mut ctx = test_context().await;
        ctx.fs.write_file("/top.txt", b"").await.unwrap();
        let out = FindCommand
            .execute(&args(&["/", "-name", "top.txt"]), &mut ctx)
            .await;
        assert_eq!(out.stdout, "/top.txt");
    }
}
