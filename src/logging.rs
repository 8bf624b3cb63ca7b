//! Structured logging setup.
//!
//! Logs go to stderr through `tracing-subscriber`. `RUST_LOG` wins when set;
//! otherwise production logs at `info` and development at `debug`.

use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

fn default_directive(server: &ServerConfig) -> &'static str {
    if server.is_production() {
        "info"
    } else {
        "debug"
    }
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(server)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
