//! Logging setup for recall binaries and tests.
//!
//! Libraries in this workspace only emit `tracing` events; installing a
//! subscriber is left to the process entry point through [`init_tracing`].

#![warn(missing_docs, clippy::pedantic)]

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor the configuration supplies one.
pub const DEFAULT_FILTER: &str = "info";

/// Subscriber options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive applied when `RUST_LOG` is unset.
    pub filter: String,
    /// Print the event target (module path).
    pub with_target: bool,
    /// Use the compact single-line formatter.
    pub compact: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_owned(),
            with_target: false,
            compact: false,
        }
    }
}

impl TelemetryConfig {
    /// Config with the given fallback filter directive.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Toggles target output.
    #[must_use]
    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    /// Toggles the compact formatter.
    #[must_use]
    pub fn compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    /// Resolves the effective filter: `RUST_LOG` first, then the configured
    /// directive, then [`DEFAULT_FILTER`] when the directive does not parse.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.filter))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Installs a global fmt subscriber.
///
/// Returns `false` when a global subscriber was already installed, which
/// makes repeated calls (e.g. from several tests) harmless.
pub fn init_tracing(config: &TelemetryConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_target(config.with_target)
        .with_level(true);

    let installed = if config.compact {
        builder.compact().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };
    if installed {
        tracing::debug!(filter = %config.filter, "tracing initialised");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_log_at_info() {
        let config = TelemetryConfig::default();
        assert_eq!(config.filter, "info");
        assert!(!config.with_target);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: TelemetryConfig = serde_json::from_str(r#"{ "compact": true }"#).unwrap();
        assert!(config.compact);
        assert_eq!(config.filter, DEFAULT_FILTER);
    }

    #[test]
    fn second_initialisation_is_a_no_op() {
        let config = TelemetryConfig::default().with_filter("recall_store=debug");
        let _ = init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
