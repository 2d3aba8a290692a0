use std::sync::Arc;

use adaptive_review::adaptive::config::AdaptiveConfig;
use adaptive_review::config::Config;
use adaptive_review::logging::{init_tracing, LogConfig};
use adaptive_review::services::material_search::HttpMaterialSearch;
use adaptive_review::store::Store;
use adaptive_review::workers::WorkerManager;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() {
    let config = Config::load();

    init_tracing(&LogConfig::from(&config));
    tracing::info!("Starting adaptive-review worker");

    // 进程只跑后台 worker，不持有引擎；这里仅在启动时校验引擎参数，尽早暴露错误配置。
    if let Err(e) = AdaptiveConfig::from_env(&config.adaptive).validate() {
        tracing::error!(error = %e, "Invalid adaptive configuration");
        std::process::exit(1);
    }
    if let Err(e) = HttpMaterialSearch::validate_config(&config.material_search) {
        tracing::error!(error = %e, "Invalid material search configuration");
        std::process::exit(1);
    }

    let store = match Store::open_and_migrate(&config.sled_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(error = %e, path = %config.sled_path, "Failed to open store");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let worker_manager = WorkerManager::new(store.clone(), shutdown_tx.subscribe(), &config.worker);
    let worker_handle = tokio::spawn(async move {
        if let Err(e) = worker_manager.start().await {
            tracing::error!(error = %e, "Worker manager failed");
        }
    });

    shutdown_signal(shutdown_tx).await;

    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "Worker task panicked");
    }

    tracing::info!("Flushing store before exit");
    if let Err(e) = store.flush() {
        tracing::error!(error = %e, "Failed to flush store before exit");
    }
    tracing::info!("Shutdown complete");
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
