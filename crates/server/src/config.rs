//! Server configuration, layered CLI flags over environment variables.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "durable-streams-server", about = "Durable streams reference server")]
pub struct ServerOptions {
    /// Address to bind.
    #[arg(long, env = "DS_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind.
    #[arg(long, env = "DS_PORT", default_value_t = 8080)]
    pub port: u16,

    /// How long a long-poll/SSE read waits for new data before returning
    /// up-to-date with no new records.
    #[arg(long, env = "DS_LONG_POLL_TIMEOUT_MS", default_value_t = 30_000)]
    pub long_poll_timeout_ms: u64,

    /// SSE keep-alive interval.
    #[arg(long, env = "DS_SSE_HEARTBEAT_MS", default_value_t = 15_000)]
    pub sse_heartbeat_ms: u64,

    /// Width of the coarse time bucket used to derive `stream-cursor`
    /// values, so that repeated long-poll requests within the same
    /// bucket collapse to the same cursor.
    #[arg(long, env = "DS_CURSOR_INTERVAL_SECS", default_value_t = 5)]
    pub cursor_interval_secs: u64,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            long_poll_timeout_ms: 30_000,
            sse_heartbeat_ms: 15_000,
            cursor_interval_secs: 5,
        }
    }
}
