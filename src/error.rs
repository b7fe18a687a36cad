use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Broker connection failed: {0}")]
    Connection(String),

    #[error("Publish to '{exchange}' with key '{routing_key}' failed: {reason}")]
    Publish {
        exchange: String,
        routing_key: String,
        reason: String,
    },

    #[error("Publish failed after {attempts} attempts: {source}")]
    PublishExhausted {
        attempts: u32,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("Failed to serialize {event_type}: {source}")]
    Serialization {
        event_type: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed message body: {0}")]
    Deserialization(String),

    #[error("Invalid notification: {0}")]
    InvalidNotification(String),

    #[error("Delivery via {channel} failed: {reason}")]
    Delivery {
        channel: &'static str,
        reason: String,
    },

    #[error("Delivery via {channel} timed out after {timeout:?}")]
    DeliveryTimeout {
        channel: &'static str,
        timeout: Duration,
    },

    #[error("Broker operation failed: {0}")]
    Broker(#[from] lapin::Error),

    #[error("Event {event_id} was published but its notification was not: {source}")]
    DerivedNotification {
        event_id: Uuid,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Messages failing with these errors can never succeed on redelivery.
    pub fn is_poison(&self) -> bool {
        matches!(
            self,
            PipelineError::Deserialization(_) | PipelineError::InvalidNotification(_)
        )
    }

    pub fn delivery(channel: &'static str, reason: impl Into<String>) -> Self {
        PipelineError::Delivery {
            channel,
            reason: reason.into(),
        }
    }
}
