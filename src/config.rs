use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::retry::{RetryConfig, RetryPolicy};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    #[serde(default = "default_rabbitmq_host")]
    pub rabbitmq_host: String,
    #[serde(default = "default_rabbitmq_port")]
    pub rabbitmq_port: u16,
    #[serde(default = "default_guest")]
    pub rabbitmq_user: String,
    #[serde(default = "default_guest")]
    pub rabbitmq_password: String,
    #[serde(default = "default_vhost")]
    pub rabbitmq_vhost: String,
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,

    #[serde(default = "default_events_exchange")]
    pub events_exchange: String,
    #[serde(default = "default_dead_letter_exchange")]
    pub dead_letter_exchange: String,
    #[serde(default = "default_event_source")]
    pub event_source: String,

    #[serde(default = "default_publish_max_attempts")]
    pub publish_max_attempts: u32,
    #[serde(default = "default_publish_retry_delay_ms")]
    pub publish_retry_delay_ms: u64,

    #[serde(default = "default_max_delivery_retries")]
    pub max_delivery_retries: u32,
    #[serde(default = "default_delivery_timeout_seconds")]
    pub delivery_timeout_seconds: u64,

    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default)]
    pub smtp_use_tls: bool,
    #[serde(default = "default_from_address")]
    pub email_from_address: String,
    #[serde(default = "default_from_name")]
    pub email_from_name: String,

    #[serde(default = "default_server_port")]
    pub server_port: u16,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;

        if config.prefetch_count == 0 {
            return Err(anyhow!("PREFETCH_COUNT must be at least 1"));
        }
        if config.publish_max_attempts == 0 {
            return Err(anyhow!("PUBLISH_MAX_ATTEMPTS must be at least 1"));
        }

        Ok(config)
    }

    /// AMQP URI assembled from host, port, credentials and virtual host.
    pub fn amqp_uri(&self) -> String {
        let vhost = self.rabbitmq_vhost.replace('%', "%25").replace('/', "%2f");
        format!(
            "amqp://{}:{}@{}:{}/{}",
            self.rabbitmq_user,
            self.rabbitmq_password,
            self.rabbitmq_host,
            self.rabbitmq_port,
            vhost
        )
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.publish_max_attempts,
            delay_unit_ms: self.publish_retry_delay_ms,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_delivery_retries,
        }
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_seconds)
    }
}

fn default_rabbitmq_host() -> String {
    "localhost".to_string()
}

fn default_rabbitmq_port() -> u16 {
    5672
}

fn default_guest() -> String {
    "guest".to_string()
}

fn default_vhost() -> String {
    "/".to_string()
}

fn default_prefetch_count() -> u16 {
    10
}

fn default_events_exchange() -> String {
    "events".to_string()
}

fn default_dead_letter_exchange() -> String {
    "events.dlx".to_string()
}

fn default_event_source() -> String {
    "notification-pipeline".to_string()
}

fn default_publish_max_attempts() -> u32 {
    3
}

fn default_publish_retry_delay_ms() -> u64 {
    1000
}

fn default_max_delivery_retries() -> u32 {
    3
}

fn default_delivery_timeout_seconds() -> u64 {
    30
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    1025
}

fn default_from_address() -> String {
    "noreply@localhost".to_string()
}

fn default_from_name() -> String {
    "Notifications".to_string()
}

fn default_server_port() -> u16 {
    8080
}
