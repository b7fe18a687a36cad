//! Stamps, serializes and routes events onto the primary exchange.
//!
//! Domain events that concern a customer also fan out a derived email. The
//! two publishes are independent: a failed email does not retract the event.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    clients::rbmq::MessagePublisher,
    error::{PipelineError, PipelineResult},
    models::{
        event::{DomainEvent, Envelope, Event, EventMessage},
        notification::Notification,
        retry::RetryConfig,
    },
};

/// Ids of the messages a single publish call put on the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub event_id: Uuid,
    pub notification_id: Option<Uuid>,
}

pub struct EventPublisher<P: MessagePublisher> {
    broker: Arc<P>,
    exchange: String,
    source: String,
    retry_config: RetryConfig,
}

impl<P: MessagePublisher> EventPublisher<P> {
    pub fn new(
        broker: Arc<P>,
        exchange: impl Into<String>,
        source: impl Into<String>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            broker,
            exchange: exchange.into(),
            source: source.into(),
            retry_config,
        }
    }

    /// Publishes `event` and, when it carries one, its derived email.
    pub async fn publish_domain_event<E: DomainEvent>(
        &self,
        event: &E,
    ) -> PipelineResult<PublishReceipt> {
        let event_id = self.publish(event).await?;

        let Some(email) = event.derived_email() else {
            return Ok(PublishReceipt {
                event_id,
                notification_id: None,
            });
        };

        match self.publish_notification(&email).await {
            Ok(notification_id) => Ok(PublishReceipt {
                event_id,
                notification_id: Some(notification_id),
            }),
            Err(e) => {
                error!(
                    %event_id,
                    event_type = E::EVENT_TYPE,
                    error = %e,
                    "Derived notification was not published"
                );
                Err(PipelineError::DerivedNotification {
                    event_id,
                    source: Box::new(e),
                })
            }
        }
    }

    /// Validates and publishes a notification under its channel routing key.
    pub async fn publish_notification<N: Notification>(
        &self,
        notification: &N,
    ) -> PipelineResult<Uuid> {
        notification.validate()?;
        self.publish(notification).await
    }

    /// Stamps a fresh envelope and publishes under `E::ROUTING_KEY`.
    pub async fn publish<E: Event>(&self, event: &E) -> PipelineResult<Uuid> {
        let message = EventMessage {
            envelope: Envelope::stamp(E::EVENT_TYPE, &self.source),
            data: event,
        };
        let event_id = message.envelope.id();
        let body = encode(&message, E::EVENT_TYPE)?;

        self.broker
            .publish_with_retry(
                &self.exchange,
                E::ROUTING_KEY,
                &body,
                event_id,
                &self.retry_config,
            )
            .await?;

        info!(
            %event_id,
            event_type = E::EVENT_TYPE,
            routing_key = E::ROUTING_KEY,
            "Event published"
        );

        Ok(event_id)
    }
}

fn encode<T: Serialize>(message: &T, event_type: &'static str) -> PipelineResult<Vec<u8>> {
    serde_json::to_vec(message)
        .map_err(|source| PipelineError::Serialization { event_type, source })
}
