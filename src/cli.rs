//! Command line interface for the `stompframe` broker binary.

use std::net::SocketAddr;

use clap::Parser;

/// Command line arguments for the `stompframe` binary.
#[derive(Debug, Parser)]
#[command(
    name = "stompframe",
    version,
    about = "In-memory STOMP 1.2 broker over WebSocket"
)]
pub struct Cli {
    /// Address to listen on.
    #[arg(short, long, default_value = "127.0.0.1:61614")]
    pub bind: SocketAddr,

    /// HTTP path upgraded to STOMP-over-WebSocket.
    #[arg(short, long, default_value = "/stomp")]
    pub path: String,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Extra milliseconds of client silence tolerated past the negotiated
    /// heart-beat interval.
    #[arg(long, default_value_t = 0)]
    pub heartbeat_tolerance_ms: u64,

    /// Capacity of each connection's MESSAGE queue.
    #[arg(long, default_value_t = 1024)]
    pub queue_capacity: usize,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}
