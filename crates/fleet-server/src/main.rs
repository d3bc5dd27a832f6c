use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use application::LivenessPolicy;

// Use modules from the library
use fleet_server::{api, state::AppState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// API Port
    #[arg(long, default_value = "4000")]
    api_port: u16,

    /// SQLite connection string; omit for a volatile in-memory fleet
    #[arg(long)]
    database_url: Option<String>,

    /// Expected heartbeat interval in seconds (also the check-in hint)
    #[arg(long, default_value = "60")]
    heartbeat_interval_secs: u64,

    /// Missed intervals before a device is swept Offline
    #[arg(long, default_value = "3")]
    offline_multiplier: u32,

    /// Grace period in seconds for registered-but-silent devices
    #[arg(long, default_value = "300")]
    registration_grace_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new("info,fleet_server=debug"))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenv::dotenv().ok();
    let args = Args::parse();
    info!("🏢 Fleet Control Server Starting...");

    let policy = LivenessPolicy {
        heartbeat_interval: Duration::from_secs(args.heartbeat_interval_secs),
        offline_multiplier: args.offline_multiplier,
        registration_grace: Duration::from_secs(args.registration_grace_secs),
    };

    // 1. Initialize State (stores + services)
    let database_url = args
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok());
    let state = match &database_url {
        Some(url) => {
            info!("Connecting to database...");
            let state = AppState::with_sqlite(url, policy).await?;
            info!("✅ SQLite store ready at {}", url);
            state
        }
        None => {
            info!("No DATABASE_URL set, using in-memory store");
            AppState::in_memory(policy)
        }
    };
    let state = Arc::new(state);

    // 2. Start Liveness Sweeper
    let cancel = CancellationToken::new();
    let sweeper = tokio::spawn(state.monitor.clone().run_sweeper(cancel.clone()));

    // 3. Start API Server
    let app = api::create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], args.api_port));
    info!("🚀 API Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let the sweeper finish its current pass before exiting
    cancel.cancel();
    let _ = sweeper.await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
