//! Per-channel consumer loop.
//!
//! Every delivery is settled exactly once: acknowledged, requeued with an
//! incremented retry count, or rejected to the dead-letter exchange.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{BasicProperties, message::Delivery};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{
    clients::rbmq::{RabbitMqClient, retry_count},
    error::{PipelineError, PipelineResult},
    handlers::DeliveryHandler,
    models::{retry::RetryPolicy, status::Disposition},
};

/// Settlement outcome for a delivery given how many times it was already requeued.
pub fn decide(
    outcome: &PipelineResult<()>,
    retry_count: u32,
    policy: &RetryPolicy,
) -> Disposition {
    match outcome {
        Ok(()) => Disposition::Ack,
        Err(e) if e.is_poison() => Disposition::DeadLetter,
        Err(_) if retry_count < policy.max_retries => Disposition::Requeue {
            retry_count: retry_count + 1,
        },
        Err(_) => Disposition::DeadLetter,
    }
}

/// Broker-side settlement of one delivery.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> PipelineResult<()>;

    async fn requeue(&self, retry_count: u32) -> PipelineResult<()>;

    async fn dead_letter(&self) -> PipelineResult<()>;
}

/// Handles `payload` and applies exactly one settlement through `acker`.
pub async fn process_delivery<H, A>(
    handler: &H,
    payload: &[u8],
    retry_count: u32,
    policy: &RetryPolicy,
    acker: &A,
) -> Disposition
where
    H: DeliveryHandler + ?Sized,
    A: Acknowledger + ?Sized,
{
    let outcome = handler.handle(payload).await;
    let disposition = decide(&outcome, retry_count, policy);

    if let Err(e) = &outcome {
        match disposition {
            Disposition::Requeue { retry_count } => warn!(
                channel = handler.channel(),
                retry_count,
                max_retries = policy.max_retries,
                error = %e,
                "Delivery failed, requeueing"
            ),
            _ => error!(
                channel = handler.channel(),
                retry_count,
                poison = e.is_poison(),
                error = %e,
                "Delivery failed, dead-lettering"
            ),
        }
    }

    let settled = match disposition {
        Disposition::Ack => acker.ack().await,
        Disposition::Requeue { retry_count } => acker.requeue(retry_count).await,
        Disposition::DeadLetter => acker.dead_letter().await,
    };

    if let Err(e) = settled {
        error!(
            channel = handler.channel(),
            %disposition,
            error = %e,
            "Failed to settle delivery"
        );
    }

    disposition
}

/// Settles a lapin delivery on the shared channel.
pub struct DeliveryAcker<'a> {
    client: &'a RabbitMqClient,
    queue: &'a str,
    delivery_tag: u64,
    body: &'a [u8],
    properties: &'a BasicProperties,
}

impl<'a> DeliveryAcker<'a> {
    pub fn new(client: &'a RabbitMqClient, queue: &'a str, delivery: &'a Delivery) -> Self {
        Self {
            client,
            queue,
            delivery_tag: delivery.delivery_tag,
            body: &delivery.data,
            properties: &delivery.properties,
        }
    }
}

#[async_trait]
impl Acknowledger for DeliveryAcker<'_> {
    async fn ack(&self) -> PipelineResult<()> {
        self.client.acknowledge(self.delivery_tag).await
    }

    /// Republishes a copy with the new count, then acks the original. If the
    /// copy cannot be published the original is requeued with its old count.
    async fn requeue(&self, retry_count: u32) -> PipelineResult<()> {
        match self
            .client
            .republish_with_retry_count(self.queue, self.body, self.properties, retry_count)
            .await
        {
            Ok(()) => self.client.acknowledge(self.delivery_tag).await,
            Err(e) => {
                warn!(
                    queue = self.queue,
                    delivery_tag = self.delivery_tag,
                    error = %e,
                    "Republish failed, requeueing without incrementing retry count"
                );
                self.client.reject(self.delivery_tag, true).await
            }
        }
    }

    async fn dead_letter(&self) -> PipelineResult<()> {
        self.client.reject(self.delivery_tag, false).await
    }
}

/// Consumes the handler's queue until `shutdown` flips or the stream ends.
/// The message in hand is always settled before the loop checks for shutdown.
pub async fn run_consumer(
    client: Arc<RabbitMqClient>,
    handler: Arc<dyn DeliveryHandler>,
    policy: RetryPolicy,
    mut shutdown: watch::Receiver<bool>,
) -> PipelineResult<()> {
    let queue = handler.queue();
    let consumer_tag = format!("{}-worker", handler.channel());
    let mut consumer = client.consume(queue, &consumer_tag).await?;

    info!(channel = handler.channel(), queue, "Worker started");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!(channel = handler.channel(), "Shutdown signal received");
                    break;
                }
            }
            next = consumer.next() => match next {
                Some(Ok(delivery)) => {
                    let retry_count = retry_count(&delivery.properties);
                    let acker = DeliveryAcker::new(&client, queue, &delivery);

                    let disposition = process_delivery(
                        handler.as_ref(),
                        &delivery.data,
                        retry_count,
                        &policy,
                        &acker,
                    )
                    .await;

                    info!(
                        channel = handler.channel(),
                        delivery_tag = delivery.delivery_tag,
                        retry_count,
                        %disposition,
                        "Delivery settled"
                    );
                }
                Some(Err(e)) => {
                    error!(channel = handler.channel(), error = %e, "Consumer stream error");
                    return Err(PipelineError::Broker(e));
                }
                None => {
                    warn!(channel = handler.channel(), "Consumer stream closed");
                    break;
                }
            }
        }
    }

    info!(channel = handler.channel(), "Worker stopped");
    Ok(())
}
