use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use eventhub::{
    config::HubConfig,
    hub::{Broadcaster, EventHub},
    logging::{init_tracing, LogStream},
    services::{HealthService, LogService, StatsService, SystemService},
    shared::AppState,
    websockets::router,
};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize tracing; the log stream feeds the logs service
    let log_stream = LogStream::default();
    init_tracing(&log_stream);

    info!("Starting event hub");

    let config = Arc::new(HubConfig::from_env());
    let hub = Arc::new(EventHub::new(&config));
    let broadcaster: Arc<dyn Broadcaster> = hub.clone();

    // Reactive services
    Arc::new(HealthService::new(Arc::clone(&broadcaster)))
        .register(hub.as_ref())
        .await;
    Arc::new(SystemService::new(Arc::clone(&broadcaster)))
        .register(hub.as_ref())
        .await;

    // Streaming services
    let stats = StatsService::new(Arc::clone(&broadcaster));
    let logs = LogService::new(Arc::clone(&broadcaster), log_stream);
    if config.stats_enabled {
        stats.run(config.stats_interval);
    }
    if config.logs_enabled {
        logs.run();
    }

    let app = router(AppState::new(Arc::clone(&hub), Arc::clone(&config)));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(bind_addr = %config.bind_addr, "Server running");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    stats.stop();
    logs.stop();
    hub.shutdown().await;
    info!("Event hub stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
