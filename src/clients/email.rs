use anyhow::{Context, anyhow};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::{debug, info};

use crate::{
    config::Config,
    error::{PipelineError, PipelineResult},
};

const CHANNEL: &str = "email";

/// Outbound email delivery.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> PipelineResult<()>;

    async fn health_check(&self) -> PipelineResult<()>;
}

pub struct SmtpEmailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailTransport {
    /// Startup wiring; a bad relay host or sender mailbox is a configuration error.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let builder = if config.smtp_use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
                .with_context(|| format!("Invalid SMTP relay host '{}'", config.smtp_host))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };

        let builder = builder.port(config.smtp_port);
        let builder = if config.smtp_username.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ))
        };

        let from: Mailbox = format!("{} <{}>", config.email_from_name, config.email_from_address)
            .parse()
            .map_err(|e| anyhow!("Invalid EMAIL_FROM_ADDRESS or EMAIL_FROM_NAME: {}", e))?;

        info!(
            host = %config.smtp_host,
            port = config.smtp_port,
            tls = config.smtp_use_tls,
            "SMTP transport initialized"
        );

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> PipelineResult<Message> {
        let to: Mailbox = to.parse().map_err(|e| {
            PipelineError::InvalidNotification(format!("Invalid recipient address: {}", e))
        })?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| {
                PipelineError::delivery(CHANNEL, format!("Failed to build message: {}", e))
            })
    }
}

#[async_trait]
impl EmailTransport for SmtpEmailTransport {
    async fn send(&self, to: &str, subject: &str, body: &str) -> PipelineResult<()> {
        let message = self.build_message(to, subject, body)?;

        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| PipelineError::delivery(CHANNEL, e.to_string()))?;

        debug!(to, code = %response.code(), "SMTP server accepted message");
        Ok(())
    }

    async fn health_check(&self) -> PipelineResult<()> {
        let reachable = self
            .transport
            .test_connection()
            .await
            .map_err(|e| PipelineError::delivery(CHANNEL, e.to_string()))?;

        if reachable {
            Ok(())
        } else {
            Err(PipelineError::delivery(CHANNEL, "SMTP server not reachable"))
        }
    }
}
