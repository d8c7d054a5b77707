use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Installs the global fmt subscriber. `RUST_LOG` overrides the configured
/// level. Calling it again is a no-op.
pub fn init(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
