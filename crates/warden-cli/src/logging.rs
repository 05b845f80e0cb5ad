//! Log subscriber setup

use tracing_subscriber::EnvFilter;
use warden_core::config::{LogFormat, LoggingConfig};

/// Install the global subscriber, writing to stderr
///
/// `RUST_LOG` wins over the configured level; `--verbose` raises the fallback to debug.
pub fn init(config: &LoggingConfig, verbose: bool) {
    let fallback = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
    if let Err(e) = result {
        eprintln!("Logging already initialized: {}", e);
    }
}
