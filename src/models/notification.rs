use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    clients::template::TemplateRenderer,
    error::{PipelineError, PipelineResult},
    models::{
        event::{Event, Priority, event_types, routing_keys},
        template::TemplateData,
        validation::{validate_body_source, validate_email_address, validate_phone_number},
    },
};

/// Email request. Exactly one of `body` or `template` must be set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailNotification {
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default)]
    pub template_data: TemplateData,
    #[serde(default)]
    pub priority: Priority,
}

impl EmailNotification {
    pub fn literal(
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            template: None,
            template_data: TemplateData::new(),
            priority,
        }
    }

    pub fn templated(
        to: impl Into<String>,
        template: impl Into<String>,
        template_data: TemplateData,
        priority: Priority,
    ) -> Self {
        Self {
            to: to.into(),
            subject: String::new(),
            body: String::new(),
            template: Some(template.into()),
            template_data,
            priority,
        }
    }

    /// True when the renderer supplies the content: a template is named and
    /// the literal body is blank.
    pub fn uses_template(&self) -> bool {
        self.body.trim().is_empty() && self.template.as_deref().is_some_and(has_text)
    }
}

impl Event for EmailNotification {
    const EVENT_TYPE: &'static str = event_types::EMAIL_NOTIFICATION;
    const ROUTING_KEY: &'static str = routing_keys::EMAIL;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmsNotification {
    pub to: String,
    pub message: String,
    #[serde(default)]
    pub priority: Priority,
}

impl SmsNotification {
    pub fn from_template(
        to: impl Into<String>,
        renderer: &TemplateRenderer,
        template: &str,
        data: &TemplateData,
        priority: Priority,
    ) -> Self {
        Self {
            to: to.into(),
            message: renderer.render_short(template, data),
            priority,
        }
    }
}

impl Event for SmsNotification {
    const EVENT_TYPE: &'static str = event_types::SMS_NOTIFICATION;
    const ROUTING_KEY: &'static str = routing_keys::SMS;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushNotification {
    pub user_id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: HashMap<String, String>,
    #[serde(default)]
    pub priority: Priority,
}

impl PushNotification {
    pub fn from_template(
        user_id: impl Into<String>,
        renderer: &TemplateRenderer,
        template: &str,
        data: &TemplateData,
        priority: Priority,
    ) -> Self {
        let rendered = renderer.render(template, data);
        Self {
            user_id: user_id.into(),
            title: rendered.subject,
            body: renderer.render_short(template, data),
            data: HashMap::new(),
            priority,
        }
    }
}

impl Event for PushNotification {
    const EVENT_TYPE: &'static str = event_types::PUSH_NOTIFICATION;
    const ROUTING_KEY: &'static str = routing_keys::PUSH;
}

/// Validation shared by every notification channel.
pub trait Notification: Event {
    fn validate(&self) -> PipelineResult<()>;
}

impl Notification for EmailNotification {
    fn validate(&self) -> PipelineResult<()> {
        validate_email_address(&self.to)?;
        validate_body_source(&self.body, self.template.as_deref())
    }
}

impl Notification for SmsNotification {
    fn validate(&self) -> PipelineResult<()> {
        validate_phone_number(&self.to)?;
        validate_body_source(&self.message, None)
    }
}

impl Notification for PushNotification {
    fn validate(&self) -> PipelineResult<()> {
        if self.user_id.trim().is_empty() {
            return Err(PipelineError::InvalidNotification(
                "Push notification requires a user_id".to_string(),
            ));
        }
        validate_body_source(&self.body, None)
    }
}

fn has_text(value: &str) -> bool {
    !value.trim().is_empty()
}
