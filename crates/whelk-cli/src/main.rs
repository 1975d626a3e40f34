//! Whelk playground - an interactive REPL over a single sandbox.
//!
//! Every line is dispatched through `Sandbox::execute`; `exit` leaves the
//! loop. After each command the running sandbox statistics are printed.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use whelk::{HttpCommand, Sandbox, SandboxLimits, SandboxOptions};

/// Interactive playground for the whelk agent sandbox
#[derive(Parser, Debug)]
#[command(name = "whelk")]
#[command(about = "Interactive playground for the whelk agent sandbox")]
struct Args {
    /// Initial working directory inside the sandbox
    #[arg(long, default_value = "/")]
    working_dir: String,

    /// Maximum single-file size in bytes
    #[arg(long, default_value_t = SandboxLimits::default().max_file_size)]
    max_file_size: u64,

    /// Maximum total filesystem size in bytes
    #[arg(long, default_value_t = SandboxLimits::default().max_total_size)]
    max_total_size: u64,

    /// Maximum number of filesystem nodes
    #[arg(long, default_value_t = SandboxLimits::default().max_node_count)]
    max_node_count: usize,

    /// Register the HTTP client extension
    #[arg(long)]
    with_http: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut options = SandboxOptions::new()
        .limits(SandboxLimits {
            max_file_size: args.max_file_size,
            max_total_size: args.max_total_size,
            max_node_count: args.max_node_count,
            ..SandboxLimits::default()
        })
        .working_directory(args.working_dir);
    if args.with_http {
        options = options.extension(Arc::new(HttpCommand::new()));
    }

    let sandbox = Sandbox::new(None, options).await;
    println!("whelk sandbox {} (type 'exit' to quit, 'help' for commands)", sandbox.id());

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        let stats = sandbox.stats().await;
        print!("whelk:{}$ ", stats.current_directory);
        let _ = io::stdout().flush();

        let Some(Ok(line)) = lines.next() else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" {
            break;
        }

        match sandbox.execute(line).await {
            Ok(result) => {
                if !result.stdout.is_empty() {
                    println!("{}", result.stdout);
                }
                if !result.stderr.is_empty() {
                    eprintln!("{}", result.stderr);
                }
                let stats = sandbox.stats().await;
                println!(
                    "[exit {} | {} nodes, {} bytes, {} commands, {}ms]",
                    result.exit_code,
                    stats.node_count,
                    stats.total_size,
                    stats.command_count,
                    result.duration.as_millis()
                );
            }
            Err(e) => {
                eprintln!("whelk: {}", e);
                break;
            }
        }
    }

    sandbox.dispose();
}
