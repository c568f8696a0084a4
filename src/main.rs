use anyhow::Result;
use cvl_optimizer::config::Config;
use cvl_optimizer::controller::CvlController;
use cvl_optimizer::dbus::DbusService;
use cvl_optimizer::exports::register_service_paths;
use cvl_optimizer::logging::init_logging;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "CVL optimizer {} starting (device instance {})",
        env!("APP_VERSION"),
        config.device_instance
    );

    let mut service = DbusService::new(&config)?;
    service.start().await?;
    register_service_paths(&mut service, &config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut controller = CvlController::new(config, service);
    let result = controller.run(shutdown_rx).await;

    let mut service = controller.into_gateway();
    if let Err(e) = service.stop().await {
        warn!("D-Bus shutdown failed: {}", e);
    }
    match result {
        Ok(()) => {
            info!("CVL optimizer shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Controller failed with error: {}", e);
            Err(anyhow::anyhow!("Controller error: {}", e))
        }
    }
}

/// Resolves on SIGINT or SIGTERM
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
