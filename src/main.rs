use std::sync::Arc;

use anyhow::{Error, Result};
use notification_pipeline::{
    api::run_api_server,
    clients::{
        email::{EmailTransport, SmtpEmailTransport},
        health::HealthChecker,
        rbmq::RabbitMqClient,
        template::TemplateRenderer,
    },
    config::Config,
    handlers::{DeliveryHandler, EmailHandler, PushHandler, SmsHandler},
    worker::run_consumer,
};
use tokio::{signal, sync::watch, task::JoinSet};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .init();

    let config = Config::load()?;

    let rabbitmq = Arc::new(RabbitMqClient::connect(&config).await?);
    rabbitmq.setup_infrastructure().await?;

    let email_transport: Arc<dyn EmailTransport> = Arc::new(SmtpEmailTransport::new(&config)?);
    let renderer = Arc::new(TemplateRenderer::new());

    let handlers: Vec<Arc<dyn DeliveryHandler>> = vec![
        Arc::new(EmailHandler::new(
            Arc::clone(&email_transport),
            renderer,
            config.delivery_timeout(),
        )),
        Arc::new(SmsHandler),
        Arc::new(PushHandler),
    ];

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = JoinSet::new();

    for handler in handlers {
        workers.spawn(run_consumer(
            Arc::clone(&rabbitmq),
            handler,
            config.retry_policy(),
            shutdown_rx.clone(),
        ));
    }

    let health_checker = HealthChecker::new(Arc::clone(&rabbitmq), email_transport);
    let api = tokio::spawn(run_api_server(
        config.server_port,
        health_checker,
        shutdown_rx.clone(),
    ));

    info!(worker_count = workers.len(), "Notification workers running");

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Worker exited with error"),
            Err(e) => error!(error = %e, "Worker task panicked"),
        }
    }

    if let Ok(Err(e)) = api.await {
        error!(error = %e, "Health check server failed");
    }

    rabbitmq.close().await?;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, starting graceful shutdown"),
    }
}
