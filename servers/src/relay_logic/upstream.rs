use crate::relay_logic::broadcast;
use crate::relay_logic::config::Config;
use crate::relay_logic::error::FetchError;
use crate::relay_logic::model::{PushPayload, Snapshot};
use crate::relay_logic::state::AppState;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;
use tokio::time::{self, MissedTickBehavior};

/// Poll loop: fetch from the source backend on a fixed period, cache the
/// snapshot, and kick off a broadcast when receivers are registered.
///
/// Fetch failures and empty cycles are logged and skipped; the cached
/// snapshot only ever moves forward. The loop stops when the process-wide
/// shutdown signal fires.
pub async fn run(config: Config, app_state: AppState, mut shutdown: Receiver<()>) {
    let mut tick = time::interval(Duration::from_millis(config.poll_interval_ms));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Poll loop shutting down.");
                break;
            }
            _ = tick.tick() => {
                poll_once(&config, &app_state).await;
            }
        }
    }
}

async fn poll_once(config: &Config, app_state: &AppState) {
    match fetch_snapshot(&app_state.http, &config.source_url).await {
        Ok(Some(snapshot)) => {
            let stamped = app_state.replace_snapshot(snapshot.clone()).await;
            log::info!("[{}] Data fetched from source: {:?}", stamped.to_rfc3339(), snapshot);

            if app_state.receiver_count().await > 0 {
                // Fire-and-forget: a slow receiver must not delay the next tick.
                let state = app_state.clone();
                let payload = PushPayload { data: snapshot, timestamp: stamped };
                tokio::spawn(async move {
                    let receivers = state.receiver_list().await;
                    let report = broadcast::fan_out(&state.http, &payload, &receivers).await;
                    log::info!(
                        "Broadcast to {} receivers: {} sent, {} failed",
                        receivers.len(),
                        report.sent,
                        report.failed
                    );
                });
            }
        }
        Ok(None) => {
            log::debug!("Source has no data yet; skipping this cycle.");
        }
        Err(e) => {
            log::error!("Error polling source backend: {}", e);
        }
    }
}

/// One fetch against the source backend.
///
/// `Ok(None)` means the response parsed but carried no nested `data` payload,
/// so there is nothing to apply this cycle. All transport, status, and parse
/// failures come back as `FetchError` and leave the store untouched.
pub async fn fetch_snapshot(
    client: &reqwest::Client,
    source_url: &str,
) -> Result<Option<Snapshot>, FetchError> {
    let response = client.get(source_url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }

    let body: Value = response.json().await.map_err(FetchError::Malformed)?;

    Ok(body
        .get("data")
        .filter(|data| !data.is_null())
        .map(Snapshot::from_source))
}
