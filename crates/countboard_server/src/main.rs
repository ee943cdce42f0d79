//! Countboard gateway binary.
//!
//! Backend selection comes from the environment:
//!
//! - `KV_REST_API_URL` and `KV_REST_API_TOKEN` - managed store, clients poll
//! - `REDIS_URL` - Redis store with pub/sub push
//! - neither - no backend, clients keep their own copy
//!
//! `--in-memory` overrides the environment with an in-process store.

use clap::Parser;
use countboard_server::{BackendConfig, CounterServer, ServerConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Shared counter board sync gateway.
#[derive(Parser)]
#[command(name = "countboard-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Keep counters in this process instead of an external store
    #[arg(long)]
    in_memory: bool,

    /// Seconds between keepalive comments on event streams
    #[arg(long, default_value = "30")]
    keepalive_secs: u64,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let backend = if cli.in_memory {
        BackendConfig::InProcess
    } else {
        BackendConfig::from_env()
    };

    let config = ServerConfig::new(cli.bind)
        .with_keepalive_interval(Duration::from_secs(cli.keepalive_secs.max(1)))
        .with_backend(backend);

    CounterServer::new(config)?.run().await?;
    Ok(())
}
