//! Tab Rotate - A kiosk tab rotation engine
//! 
//! This is the main entry point for the tab-rotate daemon.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use tab_rotate::{
    api::{create_router, ApiState},
    config::Config,
    engine::{Engine, Hosts},
    host::{FileStorage, LocalAlarms, LocalBrowser, StorageBackend},
    tasks::alarm_dispatcher_task,
    utils::shutdown_signal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("tab_rotate={},tower_http=info", config.log_level()))
        .init();

    info!("Starting tab-rotate server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: host={}, port={}, data={}",
          config.host, config.port, config.data_dir.display());

    // No state file yet means a fresh install
    let first_run = !config.state_file().exists();
    let storage: Arc<dyn StorageBackend> = Arc::new(FileStorage::open(config.state_file()).await?);
    let alarms = Arc::new(LocalAlarms::restore(Arc::clone(&storage)).await);
    let browser = Arc::new(LocalBrowser::new());

    let engine = Engine::new(Hosts {
        tabs: browser.clone(),
        action: browser.clone(),
        overlay: browser.clone(),
        alarms: alarms.clone(),
        storage,
    });
    if first_run {
        engine.on_installed().await;
    }
    engine.on_startup().await;

    // Start the alarm dispatcher background task
    let dispatcher_engine = engine.clone();
    let poll = config.alarm_poll();
    tokio::spawn(async move {
        alarm_dispatcher_task(dispatcher_engine, alarms, poll).await;
    });

    // Create HTTP router with all endpoints
    let app = create_router(Arc::new(ApiState {
        engine: engine.clone(),
        browser,
        port: config.port,
        host: config.host.clone(),
    }));

    // Bind to the specified address
    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  POST   /command              - Command protocol");
    info!("  POST   /indicator            - Indicator button presses");
    info!("  POST   /activity             - Page activity (idle-pause)");
    info!("  POST   /shortcut/:name       - Keyboard shortcuts");
    info!("  PUT    /tabs                 - Tab opened or changed");
    info!("  DELETE /tabs/:id             - Tab closed");
    info!("  POST   /tabs/:id/activated   - Tab foregrounded");
    info!("  GET    /events               - Host action stream (SSE)");
    info!("  GET    /status               - Rotation status");
    info!("  GET    /health               - Health check");

    // Setup graceful shutdown
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        result = shutdown_signal() => {
            if let Err(e) = result {
                tracing::error!("Signal handler error: {}", e);
            }
            info!("Shutdown signal received");
        }
    }

    engine.on_shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}
