use crate::presentation::config::{Environment, LoggingSettings};

pub const DEFAULT_LOG_FILTER: &str = "info,soutien=debug,tower_http=debug";

/// Configuration for tracing initialization.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub environment: String,
    pub json_format: bool,
    pub default_filter: String,
}

impl TracingConfig {
    pub fn from_settings(environment: Environment, logging: &LoggingSettings) -> Self {
        let filter = logging.filter.trim();
        Self {
            environment: environment.to_string(),
            json_format: logging.json_format,
            default_filter: if filter.is_empty() {
                DEFAULT_LOG_FILTER.to_string()
            } else {
                filter.to_string()
            },
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Local.to_string(),
            json_format: false,
            default_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}
