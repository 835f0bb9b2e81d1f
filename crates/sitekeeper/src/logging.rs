//! Tracing subscriber setup.
//!
//! `log::*` calls from the storage layer are bridged into tracing through
//! `tracing_log::LogTracer`, so span context (job id, step) is kept on them.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};

/// Environment variable that overrides the configured filter.
pub const LOG_ENV: &str = "SITEKEEPER_LOG";

/// Filter from `SITEKEEPER_LOG` when set and valid, else the configured level.
pub fn build_env_filter(level: &str) -> EnvFilter {
    if let Ok(directives) = std::env::var(LOG_ENV) {
        match EnvFilter::try_new(&directives) {
            Ok(filter) => return filter,
            Err(e) => eprintln!("Ignoring invalid {}='{}': {}", LOG_ENV, directives, e),
        }
    }
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. Returns `false` when one was already
/// installed, which makes repeated calls harmless.
pub fn init(config: &LoggingConfig) -> bool {
    tracing_log::LogTracer::init().ok();

    let layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
            .with_filter(build_env_filter(&config.level))
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(build_env_filter(&config.level))
            .boxed(),
    };

    tracing_subscriber::registry().with(layer).try_init().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_override_wins() {
        std::env::set_var(LOG_ENV, "sitekeeper=trace");
        let filter = build_env_filter("warn");
        std::env::remove_var(LOG_ENV);
        assert!(filter.to_string().contains("sitekeeper=trace"));
    }

    #[test]
    #[serial]
    fn test_invalid_level_falls_back_to_info() {
        std::env::remove_var(LOG_ENV);
        let filter = build_env_filter("sitekeeper=loud");
        assert_eq!(filter.to_string(), "info");
    }

    #[test]
    #[serial]
    fn test_init_twice_is_harmless() {
        std::env::remove_var(LOG_ENV);
        let config = LoggingConfig::default();
        init(&config);
        assert!(!init(&config));
    }
}
