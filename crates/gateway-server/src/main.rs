//! Binary running the progressive migration gateway.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod error;

use error::Result;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use kgv_migration_gateway::{GatewayConfig, GatewayServer, MigrationGateway};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the gateway configuration file
    #[arg(long, env = "KGV_GATEWAY_CONFIG", default_value = "/etc/kgv/gateway.json")]
    config: PathBuf,

    /// Overrides the listen address from the configuration file
    #[arg(long, env = "KGV_GATEWAY_LISTEN_ADDR")]
    listen_addr: Option<SocketAddr>,

    /// Maximum log level
    #[arg(long, default_value_t = Level::INFO)]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_max_level(args.log_level)
            .finish(),
    )?;

    info!("loading configuration from: {:?}", args.config);
    let mut config = GatewayConfig::from_file(&args.config)?;
    if let Some(listen_addr) = args.listen_addr {
        config.listen_addr = listen_addr;
    }

    let gateway = Arc::new(MigrationGateway::from_config(&config).await?);
    let server = GatewayServer::new(gateway, config.listen_addr);
    let addr = server.start().await?;

    info!(
        %addr,
        legacy = %config.backends.legacy,
        new = %config.backends.new,
        routes = config.routes.len(),
        "gateway started"
    );

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|e| error::Error::Io(format!("failed to listen for shutdown signal: {e}")))?;
            info!("shutdown signal received");
        }
        () = server.wait() => {}
    }

    server.shutdown().await;

    Ok(())
}
