//! MessageRequest Kubernetes Operator
//!
//! Main entry point for the operator. Parses configuration, sets up the
//! Kubernetes client, registers the controller, and runs the reconciliation
//! loop until a shutdown signal arrives and in-flight reconciles drain.

use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use message_request_operator::{
    config::{LogFormat, OperatorConfig},
    controllers::{self, Context},
    metrics,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = OperatorConfig::parse();
    config.validate()?;

    init_tracing(config.log_format);

    info!("Starting MessageRequest Operator");

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    // Cancelled on SIGINT/SIGTERM. The controller stops taking new work and
    // in-flight reconciles stop issuing store calls.
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            info!("Received shutdown signal, stopping operator");
            shutdown.cancel();
        }
    });

    let metrics_port = config.metrics_port;
    let context = Arc::new(Context::new(client.clone(), config, shutdown.clone()));

    // Start metrics server
    let metrics_handle = tokio::spawn(metrics::serve(metrics_port));
    info!("Metrics server starting on port {}", metrics_port);

    let controller = controllers::run_message_request_controller(client, context);
    tokio::pin!(controller);

    let metrics_exited = tokio::select! {
        _ = &mut controller => false,
        _ = metrics_handle => true,
    };

    if metrics_exited {
        error!("Metrics server exited unexpectedly");
        shutdown.cancel();
        controller.await;
    } else if !shutdown.is_cancelled() {
        error!("MessageRequest controller exited unexpectedly");
    }

    shutdown.cancel();
    metrics::OPERATOR_HEALTH.set(0.0);

    info!("MessageRequest Operator stopped");
    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,hyper=warn"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for CTRL+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
