mod common;

use std::{collections::HashSet, sync::Arc};

use anyhow::Result;
use chrono::{DateTime, Utc};
use common::{RecordingPublisher, customer, queue_assigned, shared, vehicle};
use notification_pipeline::{
    error::PipelineError,
    models::{
        event::{
            ApprovalNeeded, EventMessage, IssueDiscovered, Priority, ServiceCompleted,
            ServiceStarted, event_types, routing_keys,
        },
        notification::{EmailNotification, SmsNotification},
        retry::RetryConfig,
        template::TemplateValue,
    },
    publisher::EventPublisher,
};
use uuid::Uuid;

const EXCHANGE: &str = "events";
const SOURCE: &str = "waiting-list-service";

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        delay_unit_ms: 1,
    }
}

fn publisher_with(broker: &Arc<RecordingPublisher>) -> EventPublisher<RecordingPublisher> {
    EventPublisher::new(broker.clone(), EXCHANGE, SOURCE, fast_retry())
}

fn issue(requires_approval: bool) -> IssueDiscovered {
    IssueDiscovered {
        waiting_list_id: Uuid::new_v4(),
        customer: customer("driver@example.com"),
        vehicle: vehicle(),
        issue_description: "Worn front brake pads".to_string(),
        estimated_cost: 1250.5,
        requires_approval,
        priority: Priority::High,
    }
}

/// Test: Envelope is stamped by the publisher with id, type, time and source
#[tokio::test]
async fn test_envelope_is_stamped_on_publish() -> Result<()> {
    let broker = shared(RecordingPublisher::new());
    let publisher = publisher_with(&broker);

    let before = Utc::now();
    let receipt = publisher
        .publish_domain_event(&queue_assigned("a@b.com", 5))
        .await?;

    let published = broker.published().await;
    let message: EventMessage<serde_json::Value> = serde_json::from_slice(&published[0].body)?;

    assert!(!message.envelope.id().is_nil());
    assert_eq!(message.envelope.id(), receipt.event_id);
    assert_eq!(message.envelope.event_type(), event_types::QUEUE_ASSIGNED);
    assert_eq!(message.envelope.source(), SOURCE);
    assert!(message.envelope.timestamp() >= before);

    for published in &published {
        let body_id: Uuid = published.json()["id"]
            .as_str()
            .unwrap_or_default()
            .parse()?;
        assert_eq!(published.message_id, body_id, "AMQP message_id is the envelope id");
    }

    Ok(())
}

/// Test: Every published message gets its own id
#[tokio::test]
async fn test_envelope_ids_are_unique() -> Result<()> {
    let broker = shared(RecordingPublisher::new());
    let publisher = publisher_with(&broker);

    for number in 1..=5 {
        publisher
            .publish_domain_event(&queue_assigned("a@b.com", number))
            .await?;
    }

    let ids: HashSet<String> = broker
        .published()
        .await
        .iter()
        .map(|m| m.json()["id"].as_str().unwrap_or_default().to_string())
        .collect();

    assert_eq!(ids.len(), 10, "5 events plus 5 derived emails, all distinct");

    Ok(())
}

/// Test: QueueAssigned fans out into the domain event and a templated email
#[tokio::test]
async fn test_queue_assigned_publishes_event_and_email() -> Result<()> {
    let broker = shared(RecordingPublisher::new());
    let publisher = publisher_with(&broker);

    let receipt = publisher
        .publish_domain_event(&queue_assigned("a@b.com", 5))
        .await?;

    let published = broker.published().await;
    assert_eq!(published.len(), 2);
    assert!(receipt.notification_id.is_some());

    assert_eq!(published[0].exchange, EXCHANGE);
    assert_eq!(published[0].routing_key, routing_keys::QUEUE_ASSIGNED);
    assert_eq!(published[1].routing_key, routing_keys::EMAIL);

    let email: EventMessage<EmailNotification> = serde_json::from_slice(&published[1].body)?;
    assert_eq!(email.envelope.event_type(), event_types::EMAIL_NOTIFICATION);
    assert_eq!(email.data.to, "a@b.com");
    assert!(email.data.body.is_empty());
    assert_eq!(email.data.template.as_deref(), Some("queue_assigned"));
    assert_eq!(
        email.data.template_data.get("queue_number"),
        Some(&TemplateValue::Number(5.0))
    );
    assert_eq!(
        email.data.template_data.get("service_date"),
        Some(&TemplateValue::Text(
            "Tuesday, March 4, 2025 at 2:30 PM".to_string()
        ))
    );
    assert_eq!(
        email.data.template_data.get("license_plate"),
        Some(&TemplateValue::Text("B 1234 XYZ".to_string()))
    );

    Ok(())
}

/// Test: Domain event payload survives the wire unchanged
#[tokio::test]
async fn test_domain_event_payload_round_trips() -> Result<()> {
    let broker = shared(RecordingPublisher::new());
    let publisher = publisher_with(&broker);
    let event = queue_assigned("a@b.com", 12);

    publisher.publish(&event).await?;

    let published = broker.published().await;
    assert_eq!(published.len(), 1, "publish() never derives notifications");

    let message = published[0].json();
    assert_eq!(message["type"], event_types::QUEUE_ASSIGNED);
    assert_eq!(message["data"]["queue_number"], 12);
    assert_eq!(message["data"]["customer"]["email"], "a@b.com");
    assert!(message["timestamp"].as_str().is_some());

    Ok(())
}

/// Test: ServiceStarted and ServiceCompleted each derive one email
#[tokio::test]
async fn test_service_lifecycle_events_derive_emails() -> Result<()> {
    let broker = shared(RecordingPublisher::new());
    let publisher = publisher_with(&broker);

    publisher
        .publish_domain_event(&ServiceStarted {
            waiting_list_id: Uuid::new_v4(),
            customer: customer("a@b.com"),
            service_type: "Brake inspection".to_string(),
            vehicle: vehicle(),
            mechanic_name: "Grace".to_string(),
            started_at: Utc::now(),
        })
        .await?;

    publisher
        .publish_domain_event(&ServiceCompleted {
            waiting_list_id: Uuid::new_v4(),
            customer: customer("a@b.com"),
            service_type: "Brake inspection".to_string(),
            vehicle: vehicle(),
            total_cost: 300.0,
            completed_at: Utc::now(),
        })
        .await?;

    let published = broker.published().await;
    let keys: Vec<&str> = published.iter().map(|m| m.routing_key.as_str()).collect();
    assert_eq!(
        keys,
        vec![
            routing_keys::SERVICE_STARTED,
            routing_keys::EMAIL,
            routing_keys::SERVICE_COMPLETED,
            routing_keys::EMAIL,
        ]
    );

    let completed: EventMessage<EmailNotification> = serde_json::from_slice(&published[3].body)?;
    assert_eq!(completed.data.template.as_deref(), Some("service_completed"));
    assert_eq!(
        completed.data.template_data.get("total_cost"),
        Some(&TemplateValue::Text("300.00".to_string()))
    );

    Ok(())
}

/// Test: IssueDiscovered notifies only when approval is required
#[tokio::test]
async fn test_issue_discovered_notifies_only_when_approval_required() -> Result<()> {
    let broker = shared(RecordingPublisher::new());
    let publisher = publisher_with(&broker);

    let receipt = publisher.publish_domain_event(&issue(false)).await?;
    assert!(receipt.notification_id.is_none());
    assert_eq!(broker.published().await.len(), 1);

    let receipt = publisher.publish_domain_event(&issue(true)).await?;
    assert!(receipt.notification_id.is_some());

    let published = broker.published().await;
    assert_eq!(published.len(), 3);
    assert_eq!(published[1].routing_key, routing_keys::ISSUE_DISCOVERED);
    assert_eq!(published[2].routing_key, routing_keys::EMAIL);

    let email: EventMessage<EmailNotification> = serde_json::from_slice(&published[2].body)?;
    assert_eq!(email.data.template.as_deref(), Some("approval_needed"));
    assert_eq!(email.data.priority, Priority::High);
    assert_eq!(
        email.data.template_data.get("estimated_cost"),
        Some(&TemplateValue::Text("1250.50".to_string()))
    );

    Ok(())
}

/// Test: ApprovalNeeded is routed to the approval queue without an email
#[tokio::test]
async fn test_approval_needed_publishes_single_message() -> Result<()> {
    let broker = shared(RecordingPublisher::new());
    let publisher = publisher_with(&broker);

    let deadline: DateTime<Utc> = Utc::now();
    let receipt = publisher
        .publish_domain_event(&ApprovalNeeded {
            waiting_list_id: Uuid::new_v4(),
            customer: customer("a@b.com"),
            issue_description: "Timing belt replacement".to_string(),
            estimated_cost: 899.99,
            approval_deadline: Some(deadline),
            priority: Priority::Urgent,
        })
        .await?;

    let published = broker.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].routing_key, routing_keys::APPROVAL_NEEDED);
    assert!(receipt.notification_id.is_none());

    Ok(())
}

/// Test: A failed derived email does not roll back the domain event
#[tokio::test]
async fn test_derived_email_failure_keeps_domain_event() -> Result<()> {
    let broker = shared(RecordingPublisher::failing_on(routing_keys::EMAIL));
    let publisher = publisher_with(&broker);

    let result = publisher
        .publish_domain_event(&queue_assigned("a@b.com", 5))
        .await;

    let published = broker.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].routing_key, routing_keys::QUEUE_ASSIGNED);
    assert_eq!(broker.calls(), 4, "1 event publish + 3 email attempts");

    let event_id: Uuid = published[0].json()["id"]
        .as_str()
        .unwrap_or_default()
        .parse()?;

    match result {
        Err(PipelineError::DerivedNotification {
            event_id: reported,
            source,
        }) => {
            assert_eq!(reported, event_id);
            assert!(matches!(
                *source,
                PipelineError::PublishExhausted { attempts: 3, .. }
            ));
        }
        other => panic!("Expected DerivedNotification, got {:?}", other),
    }

    Ok(())
}

/// Test: A failing broker surfaces PublishExhausted and skips the email
#[tokio::test]
async fn test_domain_event_publish_exhaustion() -> Result<()> {
    let broker = shared(RecordingPublisher::failing());
    let publisher = publisher_with(&broker);

    let result = publisher
        .publish_domain_event(&queue_assigned("a@b.com", 5))
        .await;

    assert!(matches!(
        result,
        Err(PipelineError::PublishExhausted { attempts: 3, .. })
    ));
    assert_eq!(broker.calls(), 3, "Email must not be attempted");

    Ok(())
}

/// Test: Notifications mixing a literal body and a template are refused
#[tokio::test]
async fn test_mixed_body_and_template_is_rejected() -> Result<()> {
    let broker = shared(RecordingPublisher::new());
    let publisher = publisher_with(&broker);

    let mut email = EmailNotification::literal("a@b.com", "Hi", "Literal body", Priority::Normal);
    email.template = Some("queue_assigned".to_string());

    let result = publisher.publish_notification(&email).await;

    assert!(matches!(result, Err(PipelineError::InvalidNotification(_))));
    assert_eq!(broker.calls(), 0);

    Ok(())
}

/// Test: Direct notifications route by channel
#[tokio::test]
async fn test_direct_notifications_route_by_channel() -> Result<()> {
    let broker = shared(RecordingPublisher::new());
    let publisher = publisher_with(&broker);

    publisher
        .publish_notification(&EmailNotification::literal(
            "a@b.com",
            "Reminder",
            "Your car is due for service.",
            Priority::Low,
        ))
        .await?;
    publisher
        .publish_notification(&SmsNotification {
            to: "+15551234567".to_string(),
            message: "Your car is ready".to_string(),
            priority: Priority::Normal,
        })
        .await?;

    let keys: Vec<String> = broker
        .published()
        .await
        .into_iter()
        .map(|m| m.routing_key)
        .collect();
    assert_eq!(keys, vec![routing_keys::EMAIL, routing_keys::SMS]);

    Ok(())
}
