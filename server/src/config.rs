//! Server configuration parsed from the command line.

use clap::Parser;
use shared::{DEFAULT_PATH, DEFAULT_PORT};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Command line arguments of the relay server binary
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Path the WebSocket endpoint is mounted on
    #[arg(long, default_value = DEFAULT_PATH)]
    pub path: String,

    /// Maximum number of concurrent connections
    #[arg(short, long, default_value = "64")]
    pub max_clients: usize,

    /// Seconds without any inbound frame before a connection is dropped (0 disables)
    #[arg(long, default_value = "0")]
    pub idle_timeout: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// `host:port` to bind the TCP listener to
    pub bind_address: String,
    /// Request path accepted for the WebSocket upgrade, always with a leading `/`
    pub path: String,
    pub max_clients: usize,
    /// `None` keeps silent connections until the transport closes
    pub idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("127.0.0.1:{}", DEFAULT_PORT),
            path: DEFAULT_PATH.to_string(),
            max_clients: 64,
            idle_timeout: None,
        }
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            bind_address: SocketAddr::new(args.host, args.port).to_string(),
            path: normalize_path(&args.path),
            max_clients: args.max_clients,
            idle_timeout: match args.idle_timeout {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
