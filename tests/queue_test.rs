use std::time::Duration;

use anyhow::{Result, anyhow};
use futures_util::StreamExt;
use lapin::{Consumer, message::Delivery};
use notification_pipeline::{
    clients::rbmq::{
        MessagePublisher, RabbitMqClient, persistent_json_properties, queues, retry_count,
    },
    config::Config,
    models::event::routing_keys,
};
use serde_json::json;
use tokio::time::timeout;
use uuid::Uuid;

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

async fn connect() -> Result<RabbitMqClient> {
    let config = Config::load()?;
    let client = RabbitMqClient::connect(&config).await?;
    client.setup_infrastructure().await?;
    Ok(client)
}

fn tagged_payload(marker: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": Uuid::new_v4(),
        "type": "notification.email",
        "timestamp": chrono::Utc::now(),
        "source": "queue-test",
        "data": {
            "to": "a@b.com",
            "subject": marker,
            "body": "Broker round trip",
        },
    }))
    .expect("serializable payload")
}

/// Pulls deliveries until one carries `marker`, handing unrelated ones back.
async fn receive_marked(
    client: &RabbitMqClient,
    consumer: &mut Consumer,
    marker: &str,
) -> Result<Delivery> {
    loop {
        let next = timeout(RECEIVE_TIMEOUT, consumer.next())
            .await
            .map_err(|_| anyhow!("No delivery carrying {} within timeout", marker))?;

        let delivery = next.ok_or_else(|| anyhow!("Consumer stream closed"))??;
        let body = serde_json::from_slice::<serde_json::Value>(&delivery.data).ok();

        if body.is_some_and(|b| b["data"]["subject"] == marker) {
            return Ok(delivery);
        }
        client.reject(delivery.delivery_tag, true).await?;
    }
}

/// Test: Topology declaration is idempotent
#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn test_setup_infrastructure_is_idempotent() -> Result<()> {
    let client = connect().await?;

    client.setup_infrastructure().await?;
    assert!(client.is_connected());

    client.close().await?;
    Ok(())
}

/// Test: Email notifications published on the events exchange reach the email queue
#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn test_email_routing_reaches_email_queue() -> Result<()> {
    let client = connect().await?;
    let marker = format!("routing-{}", Uuid::new_v4());
    let message_id = Uuid::new_v4();

    let mut consumer = client.consume(queues::EMAIL, "queue-test-email").await?;
    client
        .publish(
            client.events_exchange(),
            routing_keys::EMAIL,
            &tagged_payload(&marker),
            message_id,
        )
        .await?;

    let delivery = receive_marked(&client, &mut consumer, &marker).await?;
    assert_eq!(retry_count(&delivery.properties), 0);
    assert_eq!(
        delivery.properties.message_id().as_ref().map(|id| id.as_str()),
        Some(message_id.to_string().as_str())
    );
    client.acknowledge(delivery.delivery_tag).await?;

    client.close().await?;
    Ok(())
}

/// Test: Rejected messages without requeue land in the dead letter queue
#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn test_rejected_messages_route_to_dead_letter_queue() -> Result<()> {
    let client = connect().await?;
    let marker = format!("dead-letter-{}", Uuid::new_v4());
    let message_id = Uuid::new_v4();

    let mut consumer = client.consume(queues::EMAIL, "queue-test-reject").await?;
    client
        .publish(
            client.events_exchange(),
            routing_keys::EMAIL,
            &tagged_payload(&marker),
            message_id,
        )
        .await?;

    let delivery = receive_marked(&client, &mut consumer, &marker).await?;
    client.reject(delivery.delivery_tag, false).await?;

    let mut dead_letters = client
        .consume(queues::DEAD_LETTER, "queue-test-dead-letter")
        .await?;
    let dead = receive_marked(&client, &mut dead_letters, &marker).await?;
    client.acknowledge(dead.delivery_tag).await?;

    client.close().await?;
    Ok(())
}

/// Test: Republished deliveries carry the incremented retry count
#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn test_republish_carries_retry_count() -> Result<()> {
    let client = connect().await?;
    let marker = format!("retry-{}", Uuid::new_v4());

    let mut consumer = client.consume(queues::EMAIL, "queue-test-retry").await?;
    client
        .republish_with_retry_count(
            queues::EMAIL,
            &tagged_payload(&marker),
            &persistent_json_properties(Uuid::new_v4()),
            2,
        )
        .await?;

    let delivery = receive_marked(&client, &mut consumer, &marker).await?;
    assert_eq!(retry_count(&delivery.properties), 2);
    client.acknowledge(delivery.delivery_tag).await?;

    client.close().await?;
    Ok(())
}
