//! Structured logging.
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies to this
//! crate and to `tower_http`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LoadError, ObservabilityConfig, ProxyConfig};

/// Install the global tracing subscriber.
pub fn init_logging(config: &ObservabilityConfig) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config).into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Logging settings for startup.
///
/// A config that failed to load still gets a subscriber, at the default
/// level, so the load error itself is logged.
pub fn logging_config(loaded: &Result<ProxyConfig, LoadError>) -> ObservabilityConfig {
    match loaded {
        Ok(config) => config.observability.clone(),
        Err(_) => ObservabilityConfig::default(),
    }
}

fn default_filter(config: &ObservabilityConfig) -> String {
    format!(
        "auth_header_proxy={level},tower_http={level}",
        level = config.log_level
    )
}
