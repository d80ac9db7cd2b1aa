//! # Dashboard Chat
//!
//! Headless chat client for the task dashboard.
//!
//! This is the application entry point that initializes:
//! - Tracing/logging subsystem
//! - Configuration loading
//! - The session, connection manager and history client
//! - The chat client, which runs until Ctrl-C

use anyhow::Result;
use tracing::info;

use dashboard_chat::config::Settings;
use dashboard_chat::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for structured logging
    dashboard_chat::telemetry::init_tracing();

    info!("Starting Dashboard Chat...");

    // Load configuration from environment and config files
    let settings = Settings::load()?;
    info!(
        realtime_url = %settings.realtime.url,
        api_url = %settings.api.base_url,
        environment = %settings.environment,
        "Configuration loaded"
    );

    let application = Application::build(settings).await?;

    info!("Chat client ready");
    application.run_until_stopped().await?;

    Ok(())
}
