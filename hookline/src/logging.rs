use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const DEFAULT_LEVEL: &str = "info";

/// Installs the global subscriber. When a Sentry DSN is configured, events
/// are also forwarded to Sentry; keep the returned guard alive until exit so
/// queued events are flushed.
pub fn init(config: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let level = config.map_or(DEFAULT_LEVEL, |c| c.level.as_str());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    match config.and_then(|c| c.sentry_dsn.as_deref()) {
        Some(dsn) => {
            let guard = sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    ..Default::default()
                },
            ));
            registry.with(sentry::integrations::tracing::layer()).init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}
