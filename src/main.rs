mod backup;
mod config;
mod database;
mod error;
mod log;
mod upload;
mod web;

use config::AppConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use web::AppState;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    log::init();

    info!("Parish backup service starting...");

    let config = Arc::new(AppConfig::from_env());
    let state = AppState::new(config.clone());

    if let Some(handle) = backup::start_backup_scheduler(config.clone(), state.clone()) {
        *state.scheduler_handle.lock().await = Some(handle);
    }

    if config.web.enabled {
        tokio::spawn(web::start_server(state.clone(), config.web.port));
    } else {
        info!("Admin API disabled (set BACKUP_WEB_ENABLED=true to enable)");
    }

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let presses = Arc::new(AtomicUsize::new(0));

    ctrlc::set_handler(move || {
        if presses.fetch_add(1, Ordering::SeqCst) == 0 {
            eprintln!("\nShutdown signal received. Press Ctrl+C again to force exit...");
            let _ = shutdown_tx.send(true);
        } else {
            eprintln!("\nForce exiting...");
            std::process::exit(130);
        }
    })
    .expect("Error setting Ctrl-C handler");

    let _ = shutdown_rx.changed().await;

    if let Some(handle) = state.scheduler_handle.lock().await.take() {
        backup::stop_backup_scheduler(handle).await;
    }
    info!("Shutdown complete");
}
