use futures_util::future;
use serde::Serialize;

/// Outcome of one fan-out pass. Every registered receiver is accounted for in
/// exactly one of the two tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOutReport {
    pub sent: usize,
    pub failed: usize,
}

/// Pushes one payload to every receiver, all attempts in flight at once.
///
/// A failed receiver (timeout, refused connection, non-2xx) is logged and
/// counted; it never blocks or cancels delivery to the others, and it is not
/// retried within this pass — the receiver simply gets the next broadcast.
pub async fn fan_out<T>(
    client: &reqwest::Client,
    payload: &T,
    receivers: &[String],
) -> FanOutReport
where
    T: Serialize + Sync,
{
    let attempts = receivers.iter().map(|url| async move {
        match push_to(client, url, payload).await {
            Ok(()) => {
                log::info!("Data sent to: {}", url);
                true
            }
            Err(e) => {
                log::error!("Failed to send to {}: {}", url, e);
                false
            }
        }
    });

    let outcomes = future::join_all(attempts).await;
    let sent = outcomes.iter().filter(|delivered| **delivered).count();

    FanOutReport {
        sent,
        failed: outcomes.len() - sent,
    }
}

async fn push_to<T>(client: &reqwest::Client, url: &str, payload: &T) -> Result<(), reqwest::Error>
where
    T: Serialize + Sync,
{
    // .json() also sets the Content-Type: application/json header.
    client
        .post(url)
        .json(payload)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::sync::mpsc;

    // Mock receiver that forwards every POSTed body to the test.
    async fn spawn_receiver(
        status: StatusCode,
        seen: mpsc::UnboundedSender<Value>,
    ) -> SocketAddr {
        let app = Router::new().route(
            "/data",
            post(move |Json(body): Json<Value>| {
                let seen = seen.clone();
                async move {
                    let _ = seen.send(body);
                    status
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn test_client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn empty_receiver_set_reports_zero_zero() {
        let report = fan_out(&test_client(), &json!({"x": 1}), &[]).await;
        assert_eq!(report, FanOutReport { sent: 0, failed: 0 });
    }

    #[tokio::test]
    async fn one_dead_receiver_never_blocks_the_live_one() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let live = spawn_receiver(StatusCode::OK, tx).await;

        // A bound-then-dropped listener yields a refusing port.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = listener.local_addr().unwrap();
        drop(listener);

        let receivers = vec![
            format!("http://{}/data", dead),
            format!("http://{}/data", live),
        ];
        let payload = json!({"temperature": 36.6, "distress": true});

        let report = fan_out(&test_client(), &payload, &receivers).await;

        assert_eq!(report, FanOutReport { sent: 1, failed: 1 });
        assert_eq!(rx.recv().await, Some(payload));
    }

    #[tokio::test]
    async fn non_2xx_receiver_counts_as_failed() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let addr = spawn_receiver(StatusCode::INTERNAL_SERVER_ERROR, tx).await;

        let receivers = vec![format!("http://{}/data", addr)];
        let report = fan_out(&test_client(), &json!({}), &receivers).await;

        assert_eq!(report, FanOutReport { sent: 0, failed: 1 });
    }

    #[tokio::test]
    async fn every_live_receiver_gets_the_same_payload() {
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = spawn_receiver(StatusCode::OK, tx_a).await;
        let b = spawn_receiver(StatusCode::OK, tx_b).await;

        let receivers = vec![format!("http://{}/data", a), format!("http://{}/data", b)];
        let payload = json!({"pulseRate": 72.0});

        let report = fan_out(&test_client(), &payload, &receivers).await;

        assert_eq!(report, FanOutReport { sent: 2, failed: 0 });
        assert_eq!(rx_a.recv().await, Some(payload.clone()));
        assert_eq!(rx_b.recv().await, Some(payload));
    }
}
