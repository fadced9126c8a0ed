//! Admin gateway server binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use admin_gateway::config::load_config;
use admin_gateway::lifecycle::{signals, startup, Shutdown};
use admin_gateway::observability::{logging, metrics};
use admin_gateway::GatewayServer;

#[derive(Parser)]
#[command(name = "admin-gateway")]
#[command(about = "Authenticating gateway for the admin API", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Loader warnings are emitted before the configured subscriber exists.
    let bootstrap = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .finish();
    let config = tracing::subscriber::with_default(bootstrap, || {
        load_config(args.config.as_deref())
    })?;
    logging::init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = config.mode.as_str(),
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        "admin-gateway starting"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();
    let bind_address = config.listener.bind_address.clone();
    let state = startup::build_state(config, &shutdown).await?;

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    signals::spawn_signal_handler(shutdown.clone());

    GatewayServer::new(state).run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
