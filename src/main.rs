//! swapfarmd — process entry point.
//!
//! Account lifecycle (connecting, logging in, IPC) is an out-of-scope collaborator (spec §1,
//! §9): this binary builds the process-wide singletons — rate limiter, inventory semaphore,
//! directory client — and is the composition root that the connection manager wires each
//! account's [`swapfarm_core::web::WebClient`], [`swapfarm_core::announce::AnnouncementEngine`],
//! and [`swapfarm_core::matcher::ActiveMatcher`] into as accounts come online.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use tokio::sync::Semaphore;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use swapfarm_core::cancellation::new_pair;
use swapfarm_core::config::GlobalConfig;
use swapfarm_core::directory::DirectoryClient;
use swapfarm_core::rate_limiter::RateLimiterRegistry;

#[derive(Debug, Parser)]
#[command(name = "swapfarmd", about = "Card-trading automation daemon")]
struct Args {
    /// Base URL of the matching directory server (spec §6).
    #[arg(long, env = "DirectoryUrl", default_value = "https://directory.swapfarm.example")]
    directory_url: String,

    /// Maximum concurrent connections per known host (spec §4.5).
    #[arg(long, env = "MaxConnections", default_value_t = 4)]
    max_connections: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let args = Args::parse();
    let config = GlobalConfig::from_env();

    info!("swapfarmd starting up");
    info!(directory_url = %args.directory_url, "directory client configured");

    let rate_limiter = Arc::new(RateLimiterRegistry::new(
        args.max_connections,
        config.web_limiter_delay,
    ));
    let inventory_semaphore = Arc::new(Semaphore::new(1));
    let directory = Arc::new(DirectoryClient::new(args.directory_url.clone()));

    // Cancellation source for every per-account announcement/matcher loop the connection manager
    // spawns (spec §5, §9); fired once on shutdown so all loops stop promptly.
    let (cancel_source, _cancel_token) = new_pair();

    // Accounts are registered by the out-of-scope connection manager, which builds a
    // `WebClient` + `AnnouncementEngine` + `ActiveMatcher` per account from these shared
    // singletons, cloning `_cancel_token` into each loop it spawns. This process just keeps the
    // singletons alive and waits for shutdown.
    let _ = (&rate_limiter, &inventory_semaphore, &directory, &config);

    info!("swapfarmd ready, waiting for accounts to connect");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, cancelling outstanding loops");
    cancel_source.cancel();

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "swapfarmd=info,swapfarm_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    let _ = dotenv();
}
