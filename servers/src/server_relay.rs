use anyhow::Result;
use tokio::signal;

use servers::relay_logic::{config, downstream, logger, state, upstream};

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up RELAY_* variables from a local .env before clap reads them.
    dotenvy::dotenv().ok();

    let config = config::load_config();
    logger::setup_logging(&config.log_dir, &config.log_level)?;

    log::info!("Source backend: {}", config.source_url);
    log::info!("Poll interval: {}ms", config.poll_interval_ms);
    if config.api_key == config::DEFAULT_API_KEY {
        log::warn!("API key is the built-in placeholder; set RELAY_API_KEY before exposing this relay.");
    }

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let app_state = state::AppState::new(&config);

    let upstream_handle = tokio::spawn(upstream::run(
        config.clone(),
        app_state.clone(),
        shutdown_tx.subscribe(),
    ));

    let downstream_handle = tokio::spawn(downstream::run(
        config.clone(),
        app_state.clone(),
        shutdown_tx.subscribe(),
    ));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut term_signal = signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("failed to install signal handler");
                term_signal.recv().await;
                log::info!("SIGTERM received, initiating shutdown.");
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    // Wait for components to shut down
    let _ = tokio::try_join!(upstream_handle, downstream_handle);

    log::info!("Shutdown complete.");
    Ok(())
}
