#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use notification_pipeline::{
    clients::{email::EmailTransport, rbmq::MessagePublisher},
    error::{PipelineError, PipelineResult},
    models::event::{Customer, QueueAssigned, Vehicle},
    worker::Acknowledger,
};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub message_id: Uuid,
}

impl PublishedMessage {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("published body is JSON")
    }
}

/// Records publishes; can fail every call or only calls for one routing key.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<PublishedMessage>>,
    calls: AtomicU32,
    fail_all: bool,
    fail_routing_key: Option<String>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    pub fn failing_on(routing_key: &str) -> Self {
        Self {
            fail_routing_key: Some(routing_key.to_string()),
            ..Self::default()
        }
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().await.clone()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        message_id: Uuid,
    ) -> PipelineResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let should_fail =
            self.fail_all || self.fail_routing_key.as_deref() == Some(routing_key);
        if should_fail {
            return Err(PipelineError::Publish {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                reason: "channel closed".to_string(),
            });
        }

        self.published.lock().await.push(PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body: body.to_vec(),
            message_id,
        });
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Ack,
    Requeue(u32),
    DeadLetter,
}

#[derive(Default)]
pub struct RecordingAcker {
    settlements: Mutex<Vec<Settlement>>,
}

impl RecordingAcker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn settlements(&self) -> Vec<Settlement> {
        self.settlements.lock().await.clone()
    }
}

#[async_trait]
impl Acknowledger for RecordingAcker {
    async fn ack(&self) -> PipelineResult<()> {
        self.settlements.lock().await.push(Settlement::Ack);
        Ok(())
    }

    async fn requeue(&self, retry_count: u32) -> PipelineResult<()> {
        self.settlements
            .lock()
            .await
            .push(Settlement::Requeue(retry_count));
        Ok(())
    }

    async fn dead_letter(&self) -> PipelineResult<()> {
        self.settlements.lock().await.push(Settlement::DeadLetter);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Captures sent mail; can fail or stall every send.
#[derive(Default)]
pub struct MockEmailTransport {
    sent: Mutex<Vec<SentEmail>>,
    attempts: AtomicU32,
    should_fail: bool,
    delay: Option<Duration>,
}

impl MockEmailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub async fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().await.clone()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmailTransport for MockEmailTransport {
    async fn send(&self, to: &str, subject: &str, body: &str) -> PipelineResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.should_fail {
            return Err(PipelineError::delivery("email", "connection refused"));
        }

        self.sent.lock().await.push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn health_check(&self) -> PipelineResult<()> {
        Ok(())
    }
}

pub fn customer(email: &str) -> Customer {
    Customer {
        customer_id: Uuid::new_v4(),
        name: "Ada Lovelace".to_string(),
        email: email.to_string(),
        phone: "+44 20 7946 0958".to_string(),
    }
}

pub fn vehicle() -> Vehicle {
    Vehicle {
        brand: "Toyota".to_string(),
        model: "Corolla".to_string(),
        license_plate: "B 1234 XYZ".to_string(),
    }
}

pub fn queue_assigned(email: &str, queue_number: u32) -> QueueAssigned {
    QueueAssigned {
        waiting_list_id: Uuid::new_v4(),
        customer: customer(email),
        queue_number,
        service_type: "Oil change".to_string(),
        service_date: Utc
            .with_ymd_and_hms(2025, 3, 4, 14, 30, 0)
            .single()
            .expect("valid date"),
        vehicle: vehicle(),
        estimated_wait_minutes: Some(45),
    }
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
