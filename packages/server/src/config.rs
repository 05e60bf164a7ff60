//! Command-line and environment configuration.

use std::time::Duration;

use clap::Parser;

use crate::ws::handler::ConnectionSettings;

/// Pair anonymous websocket clients into two-player sessions and relay their moves
#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Address to bind the HTTP server to
    #[arg(long, env = "PAIRPLAY_BIND_ADDR", default_value = "0.0.0.0")]
    pub addr: String,

    /// Port to listen on
    #[arg(short, long, env = "PAIRPLAY_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Number of Actix worker threads (defaults to the number of physical cores)
    #[arg(long, env = "PAIRPLAY_ACTIX_WORKERS")]
    pub workers: Option<usize>,

    /// Seconds between heartbeat pings sent to each client
    #[arg(long, env = "PAIRPLAY_HEARTBEAT_INTERVAL_SECS", default_value_t = 5)]
    pub heartbeat_interval_secs: u64,

    /// Seconds without any client traffic before the connection is dropped
    #[arg(long, env = "PAIRPLAY_CLIENT_TIMEOUT_SECS", default_value_t = 10)]
    pub client_timeout_secs: u64,

    /// Milliseconds a single write may take before the client is treated as dead
    #[arg(long, env = "PAIRPLAY_WRITE_TIMEOUT_MS", default_value_t = 1000)]
    pub write_timeout_ms: u64,

    /// Frames buffered per connection before writes start waiting on the client
    #[arg(long, env = "PAIRPLAY_OUTBOUND_BUFFER", default_value_t = 64)]
    pub outbound_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0".into(),
            port: 8000,
            workers: None,
            heartbeat_interval_secs: 5,
            client_timeout_secs: 10,
            write_timeout_ms: 1000,
            outbound_buffer: 64,
        }
    }
}

impl Config {
    #[must_use]
    pub const fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    #[must_use]
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
            client_timeout: Duration::from_secs(self.client_timeout_secs),
            write_timeout: self.write_timeout(),
            outbound_buffer: self.outbound_buffer.max(1),
        }
    }
}
