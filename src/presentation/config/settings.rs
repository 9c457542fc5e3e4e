use std::time::Duration;

use config::{Config, ConfigError, File};
use serde::Deserialize;

use crate::application::services::{ChatTurnConfig, ListingConfig, RunPollPolicy};

use super::Environment;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub assistant: AssistantSettings,
    pub classifier: ClassifierSettings,
    pub chat: ChatSettings,
    pub classification: ClassificationSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Empty selects the in-memory store.
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantSettings {
    pub api_key: String,
    pub assistant_id: String,
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub poll_max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatSettings {
    pub max_message_length: usize,
    pub title_max_chars: usize,
    pub preview_chars: usize,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationSettings {
    pub queue_capacity: usize,
    pub timeout_ms: u64,
    pub backfill_on_startup: bool,
    pub backfill_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    pub json_format: bool,
    pub filter: String,
}

impl Settings {
    /// Defaults, then `appsettings.toml`, then `appsettings.<env>.toml`, then
    /// `APP_`-prefixed variables with `__` between nested keys.
    pub fn load(environment: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000_i64)?
            .set_default("database.url", "")?
            .set_default("database.max_connections", 10_i64)?
            .set_default("assistant.api_key", "")?
            .set_default("assistant.assistant_id", "")?
            .set_default("assistant.base_url", "https://api.openai.com/v1")?
            .set_default("assistant.request_timeout_secs", 30_i64)?
            .set_default("assistant.poll_interval_ms", 250_i64)?
            .set_default("assistant.poll_max_attempts", 30_i64)?
            .set_default("classifier.api_key", "")?
            .set_default("classifier.base_url", "https://api.openai.com/v1")?
            .set_default("classifier.model", "gpt-4o-mini")?
            .set_default("classifier.temperature", 0.0_f64)?
            .set_default("classifier.max_tokens", 150_i64)?
            .set_default("classifier.request_timeout_secs", 15_i64)?
            .set_default("chat.max_message_length", 2000_i64)?
            .set_default("chat.title_max_chars", 50_i64)?
            .set_default("chat.preview_chars", 50_i64)?
            .set_default("chat.default_page_size", 10_i64)?
            .set_default("chat.max_page_size", 50_i64)?
            .set_default("classification.queue_capacity", 256_i64)?
            .set_default("classification.timeout_ms", 15_000_i64)?
            .set_default("classification.backfill_on_startup", true)?
            .set_default("classification.backfill_limit", 200_i64)?
            .set_default("logging.json_format", false)?
            .set_default("logging.filter", "")?
            .add_source(File::with_name("appsettings").required(false))
            .add_source(
                File::with_name(&format!("appsettings.{}", environment.as_str())).required(false),
            )
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn chat_turn_config(&self) -> ChatTurnConfig {
        ChatTurnConfig {
            max_message_length: self.chat.max_message_length,
            title_max_chars: self.chat.title_max_chars,
            poll_policy: RunPollPolicy {
                interval: Duration::from_millis(self.assistant.poll_interval_ms),
                max_attempts: self.assistant.poll_max_attempts,
            },
        }
    }

    pub fn listing_config(&self) -> ListingConfig {
        ListingConfig {
            preview_chars: self.chat.preview_chars,
            default_page_size: self.chat.default_page_size,
            max_page_size: self.chat.max_page_size,
        }
    }

    pub fn classification_timeout(&self) -> Duration {
        Duration::from_millis(self.classification.timeout_ms)
    }
}
