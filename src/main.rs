//! `stompframe` broker binary.
//!
//! Serves STOMP over WebSocket with a [`RelayDispatcher`], so every SEND is
//! delivered to the destination's subscribers. Stops on Ctrl-C.

mod cli;

use std::{sync::Arc, time::Duration};

use clap::Parser;
use stompframe::{
    config::{EngineConfig, ServerConfig},
    registry::ChannelRegistry,
    relay::RelayDispatcher,
    server::StompServer,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = cli::Cli::parse();

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&cli.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    #[cfg(feature = "metrics")]
    if let Some(addr) = cli.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        log::info!("metrics exporter listening: addr={addr}");
    }

    let engine = EngineConfig::default()
        .with_low_capacity(cli.queue_capacity)
        .with_heartbeat_tolerance(Duration::from_millis(cli.heartbeat_tolerance_ms));
    let config = ServerConfig::default()
        .with_bind(cli.bind)
        .with_path(cli.path)
        .with_engine(engine);

    let registry = Arc::new(ChannelRegistry::new());
    let server = StompServer::new(Arc::new(RelayDispatcher::new(Arc::clone(&registry))))
        .with_registry(registry)
        .with_config(config);

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("shutdown requested");
        }
        shutdown.cancel();
    });

    server.serve().await?;
    Ok(())
}
