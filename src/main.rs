use std::sync::Arc;

use tracing::{error, info};

use hoard::{Config, TenantService, TokioScheduler};

#[tokio::main]
async fn main() {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    // Load configuration
    let config = match Config::load_with_env(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {path}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = hoard::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        hoard::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    info!("hoard - tenant storage and credential lifecycle");

    let scheduler = Arc::new(TokioScheduler::new());
    let service = match TenantService::from_config(&config, scheduler).await {
        Ok(service) => service,
        Err(e) => {
            error!("Failed to start: {}", e);
            std::process::exit(1);
        }
    };

    match service.hydrate().await {
        Ok(count) => info!("Serving {} tenant(s) from {}", count, config.storage.data_root),
        Err(e) => {
            error!("Failed to load tenants: {}", e);
            std::process::exit(1);
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    info!("Shutting down");
    service.stop_all().await;
    service.database().close().await;
}
