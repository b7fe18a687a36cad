use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::info;

use crate::{
    clients::{email::EmailTransport, rbmq::queues, template::TemplateRenderer},
    error::{PipelineError, PipelineResult},
    models::{
        event::EventMessage,
        notification::{EmailNotification, Notification, PushNotification, SmsNotification},
    },
};

/// Delivers one message body for a single channel.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    /// Channel label used in logs and errors.
    fn channel(&self) -> &'static str;

    /// Queue this handler consumes from.
    fn queue(&self) -> &'static str;

    async fn handle(&self, payload: &[u8]) -> PipelineResult<()>;
}

/// Decodes and validates a notification body. Both failures are poison.
pub fn decode<N: Notification>(payload: &[u8]) -> PipelineResult<EventMessage<N>> {
    let message: EventMessage<N> = serde_json::from_slice(payload)
        .map_err(|e| PipelineError::Deserialization(e.to_string()))?;
    message.data.validate()?;
    Ok(message)
}

pub struct EmailHandler {
    transport: Arc<dyn EmailTransport>,
    renderer: Arc<TemplateRenderer>,
    delivery_timeout: Duration,
}

impl EmailHandler {
    pub fn new(
        transport: Arc<dyn EmailTransport>,
        renderer: Arc<TemplateRenderer>,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            renderer,
            delivery_timeout,
        }
    }

    /// Subject and body to send; the renderer owns content for templated mail.
    pub fn compose(&self, email: &EmailNotification) -> (String, String) {
        match email.template.as_deref() {
            Some(template) if email.uses_template() => {
                let rendered = self.renderer.render(template, &email.template_data);
                let subject = if email.subject.is_empty() {
                    rendered.subject
                } else {
                    email.subject.clone()
                };
                (subject, rendered.body)
            }
            _ => (email.subject.clone(), email.body.clone()),
        }
    }
}

#[async_trait]
impl DeliveryHandler for EmailHandler {
    fn channel(&self) -> &'static str {
        "email"
    }

    fn queue(&self) -> &'static str {
        queues::EMAIL
    }

    async fn handle(&self, payload: &[u8]) -> PipelineResult<()> {
        let message = decode::<EmailNotification>(payload)?;
        let email = &message.data;
        let (subject, body) = self.compose(email);

        info!(
            event_id = %message.envelope.id(),
            to = %email.to,
            template = email.template.as_deref().unwrap_or("-"),
            priority = ?email.priority,
            "Sending email notification"
        );

        timeout(
            self.delivery_timeout,
            self.transport.send(&email.to, &subject, &body),
        )
        .await
        .map_err(|_| PipelineError::DeliveryTimeout {
            channel: self.channel(),
            timeout: self.delivery_timeout,
        })??;

        info!(event_id = %message.envelope.id(), to = %email.to, "Email delivered");
        Ok(())
    }
}

/// Accepts SMS requests; no carrier integration yet, so delivery is a log line.
pub struct SmsHandler;

#[async_trait]
impl DeliveryHandler for SmsHandler {
    fn channel(&self) -> &'static str {
        "sms"
    }

    fn queue(&self) -> &'static str {
        queues::SMS
    }

    async fn handle(&self, payload: &[u8]) -> PipelineResult<()> {
        let message = decode::<SmsNotification>(payload)?;

        info!(
            event_id = %message.envelope.id(),
            to = %message.data.to,
            priority = ?message.data.priority,
            length = message.data.message.len(),
            "SMS notification accepted"
        );

        Ok(())
    }
}

/// Accepts push requests; delivery is a log line until a push provider is wired.
pub struct PushHandler;

#[async_trait]
impl DeliveryHandler for PushHandler {
    fn channel(&self) -> &'static str {
        "push"
    }

    fn queue(&self) -> &'static str {
        queues::PUSH
    }

    async fn handle(&self, payload: &[u8]) -> PipelineResult<()> {
        let message = decode::<PushNotification>(payload)?;

        info!(
            event_id = %message.envelope.id(),
            user_id = %message.data.user_id,
            title = %message.data.title,
            priority = ?message.data.priority,
            "Push notification accepted"
        );

        Ok(())
    }
}
