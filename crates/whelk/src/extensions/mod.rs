//! Extension commands.
//!
//! An extension is any [`ShellCommand`](crate::shell::ShellCommand)
//! registered through [`SandboxOptions::extension`](crate::SandboxOptions)
//! or [`Shell::register_extension`](crate::shell::Shell). Extensions share
//! the builtin contract and see the same shell context, so all their
//! filesystem I/O is confined to the sandbox and subject to its quotas. A
//! builtin always wins a name collision.
//!
//! Extensions that perform external work (like the HTTP client here)
//! should derive a deadline from `ShellContext::command_timeout` and report
//! overruns as a failed command output rather than blocking indefinitely.

mod http;

pub use http::HttpCommand;
