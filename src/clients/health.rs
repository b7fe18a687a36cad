use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    clients::{email::EmailTransport, rbmq::RabbitMqClient},
    models::health::{HealthCheckResponse, HealthStatus, ServiceHealth},
};

pub struct HealthChecker {
    rabbitmq: Arc<RabbitMqClient>,
    email_transport: Arc<dyn EmailTransport>,
}

impl HealthChecker {
    pub fn new(rabbitmq: Arc<RabbitMqClient>, email_transport: Arc<dyn EmailTransport>) -> Self {
        Self {
            rabbitmq,
            email_transport,
        }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        checks.insert("message_broker".to_string(), self.check_rabbitmq());
        checks.insert("email_transport".to_string(), self.check_email().await);

        HealthCheckResponse {
            status: determine_overall_status(&checks),
            timestamp: Utc::now(),
            checks,
        }
    }

    fn check_rabbitmq(&self) -> ServiceHealth {
        if self.rabbitmq.is_connected() {
            ServiceHealth::healthy(0)
        } else {
            warn!("RabbitMQ connection is down");
            ServiceHealth::unhealthy("Connection is not open".to_string())
        }
    }

    async fn check_email(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.email_transport.health_check().await {
            Ok(()) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Email transport health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Email transport health check failed");
                ServiceHealth::degraded(e.to_string())
            }
        }
    }
}

/// The broker is the only hard dependency; a failing transport only degrades.
pub fn determine_overall_status(checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
    if checks
        .values()
        .any(|check| check.status == HealthStatus::Unhealthy)
    {
        HealthStatus::Unhealthy
    } else if checks
        .values()
        .any(|check| check.status == HealthStatus::Degraded)
    {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}
