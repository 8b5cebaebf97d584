use anyhow::Result;
use helios::actuator::HueSocketClient;
use helios::config::ConfigStore;
use helios::controller::{Controller, ShutdownHandle, shutdown};
use helios::power::SolarEdgeClient;
use helios::recorder::CsvRecorder;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Resolve on Ctrl-C or, on Unix, SIGTERM
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn spawn_signal_handler(handle: ShutdownHandle) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Termination requested, finishing current cycle");
        handle.trigger();
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let explicit = std::env::args().nth(1).map(PathBuf::from);
    let store = ConfigStore::open(explicit)
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    let config = store.get().await;

    helios::logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    info!(
        "Helios {} starting (config: {})",
        env!("APP_VERSION"),
        store
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "defaults".to_string())
    );

    let recorder = Arc::new(CsvRecorder::new(&config.logging.csv_log_file));
    if let Err(e) = recorder.ensure_header() {
        error!("Error initializing CSV: {}", e);
    }

    let mut controller = Controller::new(
        store.clone(),
        Arc::new(SolarEdgeClient::new(store.clone())),
        Arc::new(HueSocketClient::new(store.clone())),
        recorder.clone(),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to create controller: {}", e))?;

    let (shutdown_handle, shutdown_signal) = shutdown::channel();
    spawn_signal_handler(shutdown_handle);

    #[cfg(feature = "web")]
    let web_task = {
        let state = helios::web::AppState {
            store: store.clone(),
            controller: controller.handle(),
            recorder: recorder.clone(),
        };
        let signal = shutdown_signal.clone();
        let (host, port) = (config.web.host.clone(), config.web.port);
        tokio::spawn(async move {
            if let Err(e) = helios::web::serve(state, &host, port, signal).await {
                error!("Web server error: {}", e);
            }
        })
    };

    let result = controller.run(shutdown_signal).await;

    #[cfg(feature = "web")]
    web_task.abort();

    match result {
        Ok(()) => {
            info!("Program terminated");
            Ok(())
        }
        Err(e) => {
            error!("Controller failed with error: {}", e);
            Err(anyhow::anyhow!("Controller error: {}", e))
        }
    }
}
