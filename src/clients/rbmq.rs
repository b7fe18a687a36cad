use async_trait::async_trait;
use chrono::Utc;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    config::Config,
    error::{PipelineError, PipelineResult},
    models::retry::RetryConfig,
    utils::retry_with_backoff,
};

pub const RETRY_COUNT_HEADER: &str = "x-retry-count";
pub const DEAD_LETTER_EXCHANGE_ARG: &str = "x-dead-letter-exchange";
pub const CONTENT_TYPE_JSON: &str = "application/json";

pub mod queues {
    pub const EMAIL: &str = "notifications.email";
    pub const SMS: &str = "notifications.sms";
    pub const PUSH: &str = "notifications.push";
    pub const QUEUE_STATUS: &str = "events.queue-status";
    pub const SERVICE_STATUS: &str = "events.service-status";
    pub const APPROVAL: &str = "events.approval";
    pub const PAYMENTS: &str = "payments.process";
    pub const AUDIT: &str = "audit.log";
    pub const DEAD_LETTER: &str = "dead-letter-queue";
}

/// Queues bound to the primary exchange, with their binding patterns.
pub const PRIMARY_BINDINGS: &[(&str, &str)] = &[
    (queues::EMAIL, "notification.email"),
    (queues::SMS, "notification.sms"),
    (queues::PUSH, "notification.push"),
    (queues::QUEUE_STATUS, "event.queue.*"),
    (queues::SERVICE_STATUS, "event.service.*"),
    (queues::APPROVAL, "event.approval.*"),
    (queues::PAYMENTS, "payment.*"),
    (queues::AUDIT, "audit.*"),
];

pub const DEAD_LETTER_PATTERN: &str = "#";

/// Publishing seam shared by the broker client and test doubles.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Sends one persistent JSON message whose AMQP `message_id` is `message_id`.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        message_id: Uuid,
    ) -> PipelineResult<()>;

    /// Blocks the caller across `config.max_attempts` tries with linear backoff.
    async fn publish_with_retry(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        message_id: Uuid,
        config: &RetryConfig,
    ) -> PipelineResult<()> {
        retry_with_backoff(config, || {
            self.publish(exchange, routing_key, body, message_id)
        })
            .await
            .map_err(|exhausted| {
                error!(
                    exchange,
                    routing_key,
                    attempts = exhausted.attempts,
                    error = %exhausted.last_error,
                    "Publish attempts exhausted"
                );
                PipelineError::PublishExhausted {
                    attempts: exhausted.attempts,
                    source: Box::new(exhausted.last_error),
                }
            })
    }
}

/// Owns the process-wide broker connection and its single channel.
pub struct RabbitMqClient {
    connection: Connection,
    channel: Channel,
    events_exchange: String,
    dead_letter_exchange: String,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> PipelineResult<Self> {
        info!(
            host = %config.rabbitmq_host,
            port = config.rabbitmq_port,
            vhost = %config.rabbitmq_vhost,
            "Connecting to RabbitMQ"
        );

        let connection = Connection::connect(&config.amqp_uri(), ConnectionProperties::default())
            .await
            .map_err(|e| PipelineError::Connection(e.to_string()))?;

        info!("RabbitMQ connection established");

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| PipelineError::Connection(format!("Channel creation failed: {}", e)))?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| PipelineError::Connection(format!("Failed to set QoS: {}", e)))?;

        info!(prefetch_count = config.prefetch_count, "RabbitMQ channel ready");

        Ok(Self {
            connection,
            channel,
            events_exchange: config.events_exchange.clone(),
            dead_letter_exchange: config.dead_letter_exchange.clone(),
        })
    }

    pub fn events_exchange(&self) -> &str {
        &self.events_exchange
    }

    pub fn dead_letter_exchange(&self) -> &str {
        &self.dead_letter_exchange
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    pub async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> PipelineResult<()> {
        self.channel
            .exchange_declare(
                name,
                kind,
                ExchangeDeclareOptions {
                    durable,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        debug!(exchange = name, durable, "Exchange declared");
        Ok(())
    }

    /// An empty `dead_letter_exchange` declares the queue without one.
    pub async fn declare_queue(
        &self,
        name: &str,
        durable: bool,
        dead_letter_exchange: &str,
    ) -> PipelineResult<()> {
        let mut arguments = FieldTable::default();
        if !dead_letter_exchange.is_empty() {
            arguments.insert(
                DEAD_LETTER_EXCHANGE_ARG.into(),
                AMQPValue::LongString(dead_letter_exchange.into()),
            );
        }

        self.channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable,
                    ..Default::default()
                },
                arguments,
            )
            .await?;

        debug!(queue = name, durable, dead_letter_exchange, "Queue declared");
        Ok(())
    }

    pub async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> PipelineResult<()> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        debug!(queue, exchange, routing_key, "Queue bound");
        Ok(())
    }

    /// Declares the full topology. Redeclaring identical definitions is a
    /// no-op on the broker, so this runs on every start.
    pub async fn setup_infrastructure(&self) -> PipelineResult<()> {
        self.declare_exchange(&self.events_exchange, ExchangeKind::Topic, true)
            .await?;
        self.declare_exchange(&self.dead_letter_exchange, ExchangeKind::Topic, true)
            .await?;

        for (queue, pattern) in PRIMARY_BINDINGS {
            self.declare_queue(queue, true, &self.dead_letter_exchange)
                .await?;
            self.bind_queue(queue, &self.events_exchange, pattern).await?;
        }

        self.declare_queue(queues::DEAD_LETTER, true, "").await?;
        self.bind_queue(
            queues::DEAD_LETTER,
            &self.dead_letter_exchange,
            DEAD_LETTER_PATTERN,
        )
        .await?;

        info!(
            events_exchange = %self.events_exchange,
            dead_letter_exchange = %self.dead_letter_exchange,
            queue_count = PRIMARY_BINDINGS.len() + 1,
            "Broker topology declared"
        );

        Ok(())
    }

    /// Manual-ack stream of deliveries for `queue`.
    pub async fn consume(&self, queue: &str, consumer_tag: &str) -> PipelineResult<Consumer> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(queue, consumer_tag, "Consumer created for queue");

        Ok(consumer)
    }

    pub async fn acknowledge(&self, delivery_tag: u64) -> PipelineResult<()> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await?;

        Ok(())
    }

    pub async fn reject(&self, delivery_tag: u64, requeue: bool) -> PipelineResult<()> {
        self.channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await?;

        Ok(())
    }

    /// Puts a copy of a delivery back on `queue` through the default exchange,
    /// carrying `retry_count` in its headers.
    pub async fn republish_with_retry_count(
        &self,
        queue: &str,
        body: &[u8],
        properties: &BasicProperties,
        retry_count: u32,
    ) -> PipelineResult<()> {
        let properties = with_retry_count(properties, retry_count);

        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                body,
                properties,
            )
            .await
            .map_err(|e| PipelineError::Publish {
                exchange: String::new(),
                routing_key: queue.to_string(),
                reason: e.to_string(),
            })?;

        Ok(())
    }

    /// Closes the channel and then the connection.
    pub async fn close(&self) -> PipelineResult<()> {
        if let Err(e) = self.channel.close(200, "worker shutdown").await {
            warn!(error = %e, "Failed to close RabbitMQ channel cleanly");
        }

        self.connection.close(200, "worker shutdown").await?;

        info!("RabbitMQ connection closed");
        Ok(())
    }
}

#[async_trait]
impl MessagePublisher for RabbitMqClient {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        message_id: Uuid,
    ) -> PipelineResult<()> {
        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                persistent_json_properties(message_id),
            )
            .await
            .map_err(|e| PipelineError::Publish {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                reason: e.to_string(),
            })?;

        debug!(
            exchange,
            routing_key,
            %message_id,
            bytes = body.len(),
            "Message published"
        );
        Ok(())
    }
}

/// Survives broker restart; stamped with the capture time and the envelope id.
pub fn persistent_json_properties(message_id: Uuid) -> BasicProperties {
    BasicProperties::default()
        .with_delivery_mode(2)
        .with_content_type(CONTENT_TYPE_JSON.into())
        .with_message_id(message_id.to_string().into())
        .with_timestamp(Utc::now().timestamp().max(0) as u64)
}

/// Retry count carried by a delivery; absent or unreadable means zero.
pub fn retry_count(properties: &BasicProperties) -> u32 {
    let Some(headers) = properties.headers().as_ref() else {
        return 0;
    };

    headers
        .inner()
        .iter()
        .find(|(key, _)| key.as_str() == RETRY_COUNT_HEADER)
        .and_then(|(_, value)| match value {
            AMQPValue::ShortShortUInt(v) => Some(u32::from(*v)),
            AMQPValue::ShortUInt(v) => Some(u32::from(*v)),
            AMQPValue::LongUInt(v) => Some(*v),
            AMQPValue::ShortShortInt(v) => u32::try_from(*v).ok(),
            AMQPValue::ShortInt(v) => u32::try_from(*v).ok(),
            AMQPValue::LongInt(v) => u32::try_from(*v).ok(),
            AMQPValue::LongLongInt(v) => u32::try_from(*v).ok(),
            _ => None,
        })
        .unwrap_or(0)
}

/// Copy of `properties` whose retry header is set to `retry_count`.
pub fn with_retry_count(properties: &BasicProperties, retry_count: u32) -> BasicProperties {
    let mut headers = properties.headers().clone().unwrap_or_default();
    headers.insert(
        RETRY_COUNT_HEADER.into(),
        AMQPValue::LongLongInt(i64::from(retry_count)),
    );

    properties.clone().with_headers(headers)
}
