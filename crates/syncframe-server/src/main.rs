//! Syncframe server binary.
//!
//! Serves the route files of a directory. Routes without a registered module
//! render statically; applications embedding their own modules build a
//! [`syncframe_server::Server`] from the library instead.
//!
//! # Usage
//!
//! ```bash
//! syncframe-server --bind 127.0.0.1:3000 --routes ./routes
//! ```

use std::path::PathBuf;

use clap::Parser;
use syncframe_server::{ModuleRegistry, Server, ServerRuntimeConfig, StoreConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Syncframe page server
#[derive(Parser, Debug)]
#[command(name = "syncframe-server")]
#[command(about = "Server-driven reactive page server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    bind: String,

    /// Directory holding the route files
    #[arg(short, long, default_value = "routes")]
    routes: PathBuf,

    /// Page loads kept waiting for their socket
    #[arg(long, default_value = "1024")]
    max_pending_mounts: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Syncframe server starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        routes_dir: args.routes,
        store: StoreConfig { max_pending_mounts: args.max_pending_mounts },
    };

    let server = Server::bind(config, ModuleRegistry::new()).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
