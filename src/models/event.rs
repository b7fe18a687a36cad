use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{
    models::{notification::EmailNotification, template::TemplateData},
    utils::{format_currency, format_long_date},
};

pub mod event_types {
    pub const QUEUE_ASSIGNED: &str = "queue.assigned";
    pub const SERVICE_STARTED: &str = "service.started";
    pub const ISSUE_DISCOVERED: &str = "issue.discovered";
    pub const APPROVAL_NEEDED: &str = "approval.needed";
    pub const SERVICE_COMPLETED: &str = "service.completed";
    pub const EMAIL_NOTIFICATION: &str = "notification.email";
    pub const SMS_NOTIFICATION: &str = "notification.sms";
    pub const PUSH_NOTIFICATION: &str = "notification.push";
}

pub mod routing_keys {
    pub const QUEUE_ASSIGNED: &str = "event.queue.assigned";
    pub const SERVICE_STARTED: &str = "event.service.started";
    pub const ISSUE_DISCOVERED: &str = "event.service.issue_discovered";
    pub const SERVICE_COMPLETED: &str = "event.service.completed";
    pub const APPROVAL_NEEDED: &str = "event.approval.needed";
    pub const EMAIL: &str = "notification.email";
    pub const SMS: &str = "notification.sms";
    pub const PUSH: &str = "notification.push";
}

pub mod templates {
    pub const QUEUE_ASSIGNED: &str = "queue_assigned";
    pub const SERVICE_STARTED: &str = "service_started";
    pub const ISSUE_DISCOVERED: &str = "issue_discovered";
    pub const APPROVAL_NEEDED: &str = "approval_needed";
    pub const SERVICE_COMPLETED: &str = "service_completed";
}

/// Identifying fields stamped on every published event.
///
/// Only the publisher creates envelopes; fields are read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    id: Uuid,
    #[serde(rename = "type")]
    event_type: String,
    timestamp: DateTime<Utc>,
    source: String,
}

impl Envelope {
    pub(crate) fn stamp(event_type: &str, source: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            timestamp: Utc::now(),
            source: source.to_string(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Wire shape of every message body: envelope fields beside `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage<T> {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub data: T,
}

/// Anything that can be published to the primary exchange.
pub trait Event: Serialize + DeserializeOwned + Send + Sync {
    const EVENT_TYPE: &'static str;
    const ROUTING_KEY: &'static str;
}

/// A business fact that may also warrant a customer email.
pub trait DomainEvent: Event {
    fn derived_email(&self) -> Option<EmailNotification> {
        None
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub brand: String,
    pub model: String,
    pub license_plate: String,
}

impl Vehicle {
    fn describe_into(&self, data: &mut TemplateData) {
        data.insert("vehicle_brand".to_string(), self.brand.clone().into());
        data.insert("vehicle_model".to_string(), self.model.clone().into());
        data.insert("license_plate".to_string(), self.license_plate.clone().into());
    }
}

fn customer_data(customer: &Customer, waiting_list_id: Uuid) -> TemplateData {
    let mut data = TemplateData::new();
    data.insert("customer_name".to_string(), customer.name.clone().into());
    data.insert("waiting_list_id".to_string(), waiting_list_id.to_string().into());
    data
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueAssigned {
    pub waiting_list_id: Uuid,
    pub customer: Customer,
    pub queue_number: u32,
    pub service_type: String,
    pub service_date: DateTime<Utc>,
    pub vehicle: Vehicle,
    #[serde(default)]
    pub estimated_wait_minutes: Option<u32>,
}

impl Event for QueueAssigned {
    const EVENT_TYPE: &'static str = event_types::QUEUE_ASSIGNED;
    const ROUTING_KEY: &'static str = routing_keys::QUEUE_ASSIGNED;
}

impl DomainEvent for QueueAssigned {
    fn derived_email(&self) -> Option<EmailNotification> {
        let mut data = customer_data(&self.customer, self.waiting_list_id);
        data.insert("queue_number".to_string(), self.queue_number.into());
        data.insert("service_type".to_string(), self.service_type.clone().into());
        data.insert(
            "service_date".to_string(),
            format_long_date(&self.service_date).into(),
        );
        if let Some(minutes) = self.estimated_wait_minutes {
            data.insert("estimated_wait_minutes".to_string(), minutes.into());
        }
        self.vehicle.describe_into(&mut data);

        Some(EmailNotification::templated(
            &self.customer.email,
            templates::QUEUE_ASSIGNED,
            data,
            Priority::Normal,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStarted {
    pub waiting_list_id: Uuid,
    pub customer: Customer,
    pub service_type: String,
    pub vehicle: Vehicle,
    pub mechanic_name: String,
    pub started_at: DateTime<Utc>,
}

impl Event for ServiceStarted {
    const EVENT_TYPE: &'static str = event_types::SERVICE_STARTED;
    const ROUTING_KEY: &'static str = routing_keys::SERVICE_STARTED;
}

impl DomainEvent for ServiceStarted {
    fn derived_email(&self) -> Option<EmailNotification> {
        let mut data = customer_data(&self.customer, self.waiting_list_id);
        data.insert("service_type".to_string(), self.service_type.clone().into());
        data.insert("mechanic_name".to_string(), self.mechanic_name.clone().into());
        data.insert(
            "started_at".to_string(),
            format_long_date(&self.started_at).into(),
        );
        self.vehicle.describe_into(&mut data);

        Some(EmailNotification::templated(
            &self.customer.email,
            templates::SERVICE_STARTED,
            data,
            Priority::Normal,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueDiscovered {
    pub waiting_list_id: Uuid,
    pub customer: Customer,
    pub vehicle: Vehicle,
    pub issue_description: String,
    pub estimated_cost: f64,
    pub requires_approval: bool,
    #[serde(default)]
    pub priority: Priority,
}

impl Event for IssueDiscovered {
    const EVENT_TYPE: &'static str = event_types::ISSUE_DISCOVERED;
    const ROUTING_KEY: &'static str = routing_keys::ISSUE_DISCOVERED;
}

impl DomainEvent for IssueDiscovered {
    fn derived_email(&self) -> Option<EmailNotification> {
        if !self.requires_approval {
            return None;
        }

        let mut data = customer_data(&self.customer, self.waiting_list_id);
        data.insert(
            "issue_description".to_string(),
            self.issue_description.clone().into(),
        );
        data.insert(
            "estimated_cost".to_string(),
            format_currency(self.estimated_cost).into(),
        );
        self.vehicle.describe_into(&mut data);

        Some(EmailNotification::templated(
            &self.customer.email,
            templates::APPROVAL_NEEDED,
            data,
            self.priority,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalNeeded {
    pub waiting_list_id: Uuid,
    pub customer: Customer,
    pub issue_description: String,
    pub estimated_cost: f64,
    #[serde(default)]
    pub approval_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Priority,
}

impl Event for ApprovalNeeded {
    const EVENT_TYPE: &'static str = event_types::APPROVAL_NEEDED;
    const ROUTING_KEY: &'static str = routing_keys::APPROVAL_NEEDED;
}

impl DomainEvent for ApprovalNeeded {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCompleted {
    pub waiting_list_id: Uuid,
    pub customer: Customer,
    pub service_type: String,
    pub vehicle: Vehicle,
    pub total_cost: f64,
    pub completed_at: DateTime<Utc>,
}

impl Event for ServiceCompleted {
    const EVENT_TYPE: &'static str = event_types::SERVICE_COMPLETED;
    const ROUTING_KEY: &'static str = routing_keys::SERVICE_COMPLETED;
}

impl DomainEvent for ServiceCompleted {
    fn derived_email(&self) -> Option<EmailNotification> {
        let mut data = customer_data(&self.customer, self.waiting_list_id);
        data.insert("service_type".to_string(), self.service_type.clone().into());
        data.insert(
            "total_cost".to_string(),
            format_currency(self.total_cost).into(),
        );
        data.insert(
            "completed_at".to_string(),
            format_long_date(&self.completed_at).into(),
        );
        self.vehicle.describe_into(&mut data);

        Some(EmailNotification::templated(
            &self.customer.email,
            templates::SERVICE_COMPLETED,
            data,
            Priority::Normal,
        ))
    }
}
