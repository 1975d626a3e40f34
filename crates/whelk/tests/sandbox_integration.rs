//! End-to-end scenarios for the sandbox: quota enforcement through the
//! shell, snapshot rollback, environment expansion, concurrent execution,
//! and session reaping.

use std::sync::Arc;
use std::time::Duration;

use whelk::{Sandbox, SandboxLimits, SandboxOptions, SessionManager};

fn tiny_file_limit() -> SandboxOptions {
    SandboxOptions::new().limits(SandboxLimits {
        max_file_size: 10,
        ..SandboxLimits::default()
    })
}

// =============================================================================
// Shell-driven quota enforcement
// =============================================================================

#[tokio::test]
async fn quota_failure_via_shell_redirect() {
    let sandbox = Sandbox::new(None, tiny_file_limit()).await;

    let result = sandbox
        .execute("echo 'xxxxxxxxxxxxxxxxxxxx' > /large.txt")
        .await
        .expect("execute");

    assert!(!result.success);
    assert!(
        result.stderr.contains("exceed"),
        "stderr should mention the quota: {}",
        result.stderr
    );
    assert!(result.stdout.is_empty());
    assert!(!sandbox.fs().exists("/large.txt").await);
}

// =============================================================================
// Snapshot rollback
// =============================================================================

#[tokio::test]
async fn snapshot_rollback_restores_content() {
    let sandbox = Sandbox::with_defaults().await;
    sandbox.write_file("/file.txt", b"original").await.expect("write");

    let snapshot = sandbox.create_snapshot().await.expect("snapshot");

    sandbox.write_file("/file.txt", b"modified").await.expect("write");
    assert_eq!(
        sandbox.read_file_to_string("/file.txt").await.expect("read"),
        "modified"
    );

    sandbox.restore_snapshot(&snapshot).await.expect("restore");
    assert_eq!(
        sandbox.read_file_to_string("/file.txt").await.expect("read"),
        "original"
    );
}

// =============================================================================
// Recursive mkdir
// =============================================================================

#[tokio::test]
async fn recursive_mkdir_creates_chain() {
    let sandbox = Sandbox::with_defaults().await;

    let result = sandbox.execute("mkdir -p /a/b/c").await.expect("execute");
    assert!(result.success, "stderr: {}", result.stderr);

    for dir in ["/a", "/a/b", "/a/b/c"] {
        assert!(sandbox.fs().is_directory(dir).await, "{} missing", dir);
    }
}

// =============================================================================
// Environment expansion
// =============================================================================

#[tokio::test]
async fn export_then_expand() {
    let sandbox = Sandbox::with_defaults().await;

    sandbox.execute("export NAME=World").await.expect("export");
    let result = sandbox.execute("echo Hello $NAME").await.expect("echo");

    assert_eq!(result.stdout, "Hello World");
}

// =============================================================================
// Redirect append semantics
// =============================================================================

#[tokio::test]
async fn redirect_append_concatenates_bytes() {
    let sandbox = Sandbox::with_defaults().await;

    sandbox.execute("echo a > /x").await.expect("overwrite");
    sandbox.execute("echo b >> /x").await.expect("append");

    // echo emits no trailing newline, and redirection writes the captured
    // bytes verbatim.
    assert_eq!(
        sandbox.read_file_to_string("/x").await.expect("read"),
        "ab"
    );
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_touch_storm() {
    let sandbox = Sandbox::with_defaults().await;

    let mut handles = Vec::new();
    for i in 0..100 {
        let sandbox = Arc::clone(&sandbox);
        handles.push(tokio::spawn(async move {
            sandbox.execute(&format!("touch /f{}", i)).await
        }));
    }
    for handle in handles {
        let result = handle.await.expect("task").expect("execute");
        assert!(result.success, "stderr: {}", result.stderr);
    }

    let names = sandbox.list_directory("/").await.expect("ls");
    assert_eq!(names.len(), 100);
    for i in 0..100 {
        assert!(names.contains(&format!("f{}", i)), "missing f{}", i);
    }

    let stats = sandbox.stats().await;
    assert_eq!(stats.node_count, 101); // root + 100 files
    assert_eq!(stats.command_count, 100);
}

// =============================================================================
// Session reaping
// =============================================================================

#[tokio::test]
async fn inactive_sandboxes_are_reaped() {
    let manager = SessionManager::with_inactivity_timeout(Duration::from_millis(200));

    manager
        .create(Some("idle".to_string()), SandboxOptions::new())
        .await
        .expect("create");
    tokio::time::sleep(Duration::from_millis(300)).await;

    let young = manager
        .create(Some("busy".to_string()), SandboxOptions::new())
        .await
        .expect("create");
    young.execute("pwd").await.expect("refresh activity");

    assert_eq!(manager.cleanup_inactive(), 1);
    assert!(manager.get("idle").is_none());
    assert!(manager.get("busy").is_some());
}

// =============================================================================
// Full agent-style session
// =============================================================================

#[tokio::test]
async fn agent_session_walkthrough() {
    let manager = SessionManager::new();
    let sandbox = manager
        .create(None, SandboxOptions::new().working_directory("/workspace"))
        .await
        .expect("create");

    sandbox.execute("echo 'fn main() {}' > main.rs").await.expect("write");
    sandbox.execute("mkdir -p src/nested").await.expect("mkdir");
    sandbox.execute("cp main.rs src/nested/copy.rs").await.expect("cp");

    let result = sandbox.execute("find / -name '*.rs'").await.expect("find");
    assert_eq!(
        result.stdout,
        "/workspace/main.rs\n/workspace/src/nested/copy.rs"
    );

    let result = sandbox
        .execute("grep -i FN src/nested/copy.rs")
        .await
        .expect("grep");
    assert!(result.success);
    assert_eq!(result.stdout, "fn main() {}");

    let result = sandbox.execute("wc -c main.rs").await.expect("wc");
    assert_eq!(result.stdout, "12 main.rs");

    let history = sandbox.history();
    assert_eq!(history.len(), 6);
    assert!(history.iter().all(|r| r.success));

    assert!(manager.destroy(sandbox.id()));
    assert!(sandbox.execute("pwd").await.is_err());
}
