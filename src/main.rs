//! CallHub Server: call signaling relay
//!
//! Main entry point: loads configuration, sets up logging and runs the
//! HTTP/WebSocket server until shutdown.

use tracing_subscriber::{EnvFilter, fmt};

use callhub_core::config::{AppConfig, LoggingConfig};
use callhub_core::error::AppError;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config.logging);

    tracing::info!("Starting CallHub v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = callhub_api::run_server(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("CallHub server shut down gracefully");
}

/// Load configuration from `config/default`, the environment overlay, and
/// `CALLHUB__*` variables.
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("CALLHUB_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}
