use std::str::FromStr;

use anyhow::anyhow;
use tracing::Level;
use tracing_subscriber::fmt::Subscriber;

/// Installs the global subscriber. `LOG_LEVEL` wins over `fallback`, which wins over INFO.
pub fn init_tracing(fallback: Option<&str>) {
    let log_level = std::env::var("LOG_LEVEL")
        .map_err(|e| anyhow!("LOG_LEVEL environment variable is not set: {}", e))
        .or_else(|e| fallback.map(str::to_string).ok_or(e))
        .and_then(|l| Level::from_str(l.trim()).map_err(|e| anyhow!("Invalid log level: {}", e)))
        .unwrap_or(Level::INFO);

    let subscriber = Subscriber::builder().with_max_level(log_level).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("tracing subscriber already installed");
    }
}
