use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Webhook capture server: receive, record and stream inbound HTTP requests.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Address the HTTP server listens on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    /// Public base URL replayed requests are sent to
    #[arg(long, env = "DOMAIN", default_value = "http://localhost:3000")]
    pub domain: String,

    /// Directory holding webhooks.json and captured requests; memory only when unset
    #[arg(long, env = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Pending events buffered per live-stream subscriber before drops begin
    #[arg(long, env = "STREAM_BUFFER", default_value_t = 16)]
    pub stream_buffer: usize,

    /// Largest inbound body captured, in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_body_bytes: usize,

    /// Timeout for the outbound replay call, in seconds
    #[arg(long, env = "REPLAY_TIMEOUT_SECS", default_value_t = 10)]
    pub replay_timeout_secs: u64,

    /// Interval between live-stream heartbeat comments, in seconds
    #[arg(long, env = "KEEP_ALIVE_SECS", default_value_t = 15)]
    pub keep_alive_secs: u64,

    /// Captured requests kept per webhook; the oldest are evicted first
    #[arg(long, env = "MAX_REQUESTS_PER_WEBHOOK", default_value_t = 1000)]
    pub max_requests_per_webhook: usize,
}

impl Config {
    pub fn replay_timeout(&self) -> Duration {
        Duration::from_secs(self.replay_timeout_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            domain: "http://localhost:3000".to_string(),
            data_dir: None,
            stream_buffer: 16,
            max_body_bytes: 10 * 1024 * 1024,
            replay_timeout_secs: 10,
            keep_alive_secs: 15,
            max_requests_per_webhook: 1000,
        }
    }
}
