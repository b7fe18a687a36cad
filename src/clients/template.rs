use std::collections::HashMap;

use tracing::{debug, warn};

use crate::models::{
    event::templates,
    template::{RenderedMessage, TemplateData},
};

pub const NO_TEMPLATE_PLACEHOLDER: &str = "no template specified";

const DEFAULT_SUBJECT: &str = "Notification";

struct Template {
    subject: &'static str,
    body: &'static str,
    short: &'static str,
}

static REGISTRY: &[(&str, Template)] = &[
    (
        templates::QUEUE_ASSIGNED,
        Template {
            subject: "Queue number {{queue_number}} confirmed",
            body: "Hello {{customer_name}},\n\n\
                   You have been assigned queue number {{queue_number}} for {{service_type}} \
                   on {{service_date}}.\n\n\
                   Vehicle: {{vehicle_brand}} {{vehicle_model}} ({{license_plate}})\n\n\
                   Please arrive a few minutes before your turn.\n",
            short: "Queue #{{queue_number}} for {{service_type}} on {{service_date}}.",
        },
    ),
    (
        templates::SERVICE_STARTED,
        Template {
            subject: "Work has started on your {{vehicle_brand}} {{vehicle_model}}",
            body: "Hello {{customer_name}},\n\n\
                   {{mechanic_name}} started {{service_type}} on your {{vehicle_brand}} \
                   {{vehicle_model}} ({{license_plate}}) on {{started_at}}.\n\n\
                   We will let you know as soon as it is finished.\n",
            short: "{{service_type}} started on {{license_plate}}.",
        },
    ),
    (
        templates::ISSUE_DISCOVERED,
        Template {
            subject: "Issue found on your {{vehicle_brand}} {{vehicle_model}}",
            body: "Hello {{customer_name}},\n\n\
                   During service of {{license_plate}} we found the following issue:\n\n\
                   {{issue_description}}\n\n\
                   Estimated repair cost: {{estimated_cost}}\n",
            short: "Issue found on {{license_plate}}: {{issue_description}}.",
        },
    ),
    (
        templates::APPROVAL_NEEDED,
        Template {
            subject: "Your approval is needed for {{license_plate}}",
            body: "Hello {{customer_name}},\n\n\
                   We need your approval before continuing work on your {{vehicle_brand}} \
                   {{vehicle_model}} ({{license_plate}}).\n\n\
                   Issue: {{issue_description}}\n\
                   Estimated cost: {{estimated_cost}}\n\n\
                   Please contact us to approve or decline the additional work.\n",
            short: "Approval needed for {{license_plate}}: {{issue_description}} ({{estimated_cost}}).",
        },
    ),
    (
        templates::SERVICE_COMPLETED,
        Template {
            subject: "Your {{vehicle_brand}} {{vehicle_model}} is ready",
            body: "Hello {{customer_name}},\n\n\
                   {{service_type}} on {{license_plate}} was completed on {{completed_at}}.\n\n\
                   Total cost: {{total_cost}}\n\n\
                   Your vehicle is ready for pickup.\n",
            short: "{{license_plate}} is ready. Total: {{total_cost}}.",
        },
    ),
];

/// Fixed registry of named message layouts.
pub struct TemplateRenderer {
    templates: HashMap<&'static str, &'static Template>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let templates = REGISTRY.iter().map(|(name, t)| (*name, t)).collect();
        Self { templates }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.templates.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Subject and body for `name`. Unknown templates yield the placeholder body.
    pub fn render(&self, name: &str, data: &TemplateData) -> RenderedMessage {
        let Some(template) = self.templates.get(name) else {
            warn!(template = name, "Unknown template, using placeholder");
            return RenderedMessage {
                subject: DEFAULT_SUBJECT.to_string(),
                body: NO_TEMPLATE_PLACEHOLDER.to_string(),
            };
        };

        debug!(
            template = name,
            variable_count = data.len(),
            "Rendering template"
        );

        RenderedMessage {
            subject: Self::replace_variables(template.subject, data),
            body: Self::replace_variables(template.body, data),
        }
    }

    /// One-line form for SMS and push.
    pub fn render_short(&self, name: &str, data: &TemplateData) -> String {
        match self.templates.get(name) {
            Some(template) => Self::replace_variables(template.short, data),
            None => {
                warn!(template = name, "Unknown template, using placeholder");
                NO_TEMPLATE_PLACEHOLDER.to_string()
            }
        }
    }

    /// Replaces `{{key}}` slots. Keys absent from `data` become empty.
    fn replace_variables(template: &str, data: &TemplateData) -> String {
        let mut result = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            result.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];

            match after_open.find("}}") {
                Some(end) => {
                    let key = after_open[..end].trim();
                    if let Some(value) = data.get(key) {
                        result.push_str(&value.to_string());
                    } else {
                        debug!(missing_variable = key, "Template slot left empty");
                    }
                    rest = &after_open[end + 2..];
                }
                None => {
                    result.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }

        result.push_str(rest);
        result
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}
