//! Thin synchronous-style entry points: start everything, block on OS signals, tear
//! everything down in order. The lifecycle methods remain independently callable for
//! callers that need finer control.

use crate::application::Application;
use crate::updater::{PollingOptions, WebhookOptions};
use anyhow::Result;
use tracing::info;

/// Runs the application with a long-polling update source until SIGINT/SIGTERM.
pub async fn run_polling(application: &Application, options: PollingOptions) -> Result<()> {
    application.initialize().await?;
    let updater = application
        .updater()
        .ok_or_else(|| anyhow::anyhow!("application was built without an updater"))?;

    updater.start_polling(options).await?;
    application.start().await?;

    wait_for_shutdown_signal().await?;
    info!("Shutdown signal received");

    updater.stop().await?;
    application.stop().await?;
    application.shutdown().await?;
    Ok(())
}

/// Runs the application with a webhook update source until SIGINT/SIGTERM.
pub async fn run_webhook(application: &Application, options: WebhookOptions) -> Result<()> {
    application.initialize().await?;
    let updater = application
        .updater()
        .ok_or_else(|| anyhow::anyhow!("application was built without an updater"))?;

    let addr = updater.start_webhook(options).await?;
    info!(addr = %addr, "Webhook listener bound");
    application.start().await?;

    wait_for_shutdown_signal().await?;
    info!("Shutdown signal received");

    updater.stop().await?;
    application.stop().await?;
    application.shutdown().await?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
