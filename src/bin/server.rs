//! # User Manager Server
//!
//! Runs the REST API together with the event publisher and consumer workers.
//!
//! ## Usage
//!
//! ```bash
//! RABBITMQ_USER=guest RABBITMQ_PASSWORD=guest RABBITMQ_HOST=localhost RABBITMQ_AMQP_PORT=5672 \
//!     cargo run --bin usermanager-server
//! ```
//!
//! Stops gracefully on SIGINT, SIGTERM or SIGUSR1.

use anyhow::Context;
use tracing::info;

use usermanager::config::ConfigManager;
use usermanager::logging;
use usermanager::orchestration::bootstrap;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_manager = ConfigManager::load().context("failed to load configuration")?;
    logging::init_structured_logging();

    info!("Starting User Manager Server...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        "   Build Mode: {}",
        if cfg!(debug_assertions) {
            "Debug"
        } else {
            "Release"
        }
    );
    info!("   Environment: {}", config_manager.environment());

    let config = config_manager.into_config();
    let app = bootstrap(&config)
        .await
        .context("failed to bootstrap application")?;

    info!("User Manager Server started on {}", app.local_addr());
    info!("   Send SIGINT, SIGTERM or SIGUSR1 to shut down gracefully");

    app.run().await.context("application stopped with an error")?;

    info!("User Manager Server shutdown complete");
    Ok(())
}
