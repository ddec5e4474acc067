//! 17TRACK alert webhook server.
//!
//! This binary:
//! - Receives 17TRACK push notifications
//! - Verifies the `sign` header
//! - Emails an alert for shipment failures
//! - Always acknowledges authenticated pushes with 200 OK

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use trackalert::{build_router, AppState, Config, SmtpNotifier};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration; missing values stop the process here
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        port = config.port,
        smtp_host = %config.smtp_host,
        smtp_port = config.smtp_port,
        recipients = config.alert_to.len(),
        alert_policy = %config.alert_policy,
        "config_loaded"
    );

    let notifier = SmtpNotifier::from_config(&config).context("Failed to set up SMTP notifier")?;
    info!("smtp_notifier_created");

    let port = config.port;
    let state = AppState::new(config, Arc::new(notifier));
    let app = build_router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
///
/// axum stops accepting connections at that point and lets in-flight webhook
/// requests finish, including any alert still being sent over SMTP.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
