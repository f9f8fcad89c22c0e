use crate::relay_logic::config::Config;
use crate::relay_logic::error::RelayError;
use crate::relay_logic::model::Snapshot;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Default)]
struct LatestReading {
    data: Snapshot,
    updated_at: Option<DateTime<Utc>>,
}

/// Shared relay state: the cached snapshot, the receiver set, and the
/// outbound HTTP client.
///
/// Locks guard only in-memory copies and replacements; they are never held
/// across network I/O. Cloning the state clones handles, not data.
#[derive(Clone)]
pub struct AppState {
    api_key: Arc<String>,
    latest: Arc<RwLock<LatestReading>>,
    receivers: Arc<RwLock<Vec<String>>>,
    started_at: Instant,
    /// Shared client for source polls and receiver pushes. Carries the
    /// configured timeout so no outbound call can hang past it.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent("SensorRelay/1.0")
            .build()
            .unwrap_or_default(); // Fall back to a default client if the builder fails.

        Self {
            api_key: Arc::new(config.api_key.clone()),
            latest: Arc::new(RwLock::new(LatestReading::default())),
            receivers: Arc::new(RwLock::new(Vec::new())),
            started_at: Instant::now(),
            http,
        }
    }

    /// Atomically overwrites the stored snapshot/timestamp pair and returns
    /// the timestamp it was stored under.
    pub async fn replace_snapshot(&self, snapshot: Snapshot) -> DateTime<Utc> {
        let stamped = Utc::now();
        let mut latest = self.latest.write().await;
        latest.data = snapshot;
        latest.updated_at = Some(stamped);
        stamped
    }

    /// Returns the current pair. Before the first successful poll this is the
    /// all-default snapshot with no timestamp.
    pub async fn latest_snapshot(&self) -> (Snapshot, Option<DateTime<Utc>>) {
        let latest = self.latest.read().await;
        (latest.data.clone(), latest.updated_at)
    }

    pub async fn last_update(&self) -> Option<DateTime<Utc>> {
        self.latest.read().await.updated_at
    }

    /// Checks the shared secret. An absent key counts as a mismatch.
    pub fn authorize(&self, supplied: Option<&str>) -> Result<(), RelayError> {
        if supplied == Some(self.api_key.as_str()) {
            Ok(())
        } else {
            Err(RelayError::Unauthorized)
        }
    }

    /// Registers a receiver endpoint and returns the new total count.
    ///
    /// Re-registering a known URL is a no-op that still succeeds. URLs are
    /// compared by exact string equality, no normalization; two spellings of
    /// the same host count as two receivers.
    pub async fn register_receiver(
        &self,
        api_key: Option<&str>,
        esp_url: Option<String>,
    ) -> Result<usize, RelayError> {
        self.authorize(api_key)?;
        let esp_url = esp_url
            .filter(|url| !url.is_empty())
            .ok_or(RelayError::MissingField("espUrl"))?;

        let mut receivers = self.receivers.write().await;
        if !receivers.contains(&esp_url) {
            log::info!("ESP receiver registered: {}", esp_url);
            receivers.push(esp_url);
        }
        Ok(receivers.len())
    }

    /// Independent copy of the receiver set, in registration order. Safe to
    /// iterate while other tasks register; registrations that land after the
    /// copy show up in the next one.
    pub async fn receiver_list(&self) -> Vec<String> {
        self.receivers.read().await.clone()
    }

    pub async fn receiver_count(&self) -> usize {
        self.receivers.read().await.len()
    }

    pub fn uptime_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AppState {
        AppState::new(&Config {
            port: 0,
            log_dir: "./logs".into(),
            log_level: "info".to_string(),
            api_key: "secret".to_string(),
            source_url: "http://127.0.0.1:9/api/latest-data".to_string(),
            poll_interval_ms: 2000,
            request_timeout_secs: 5,
        })
    }

    #[tokio::test]
    async fn registering_same_url_twice_counts_once() {
        let state = test_state();
        let url = "http://192.168.1.50/data".to_string();

        let first = state
            .register_receiver(Some("secret"), Some(url.clone()))
            .await
            .unwrap();
        let second = state
            .register_receiver(Some("secret"), Some(url))
            .await
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 1);
        assert_eq!(state.receiver_count().await, 1);
    }

    #[tokio::test]
    async fn wrong_key_never_mutates_the_receiver_set() {
        let state = test_state();
        let result = state
            .register_receiver(Some("nope"), Some("http://192.168.1.50/data".to_string()))
            .await;

        assert!(matches!(result, Err(RelayError::Unauthorized)));
        assert_eq!(state.receiver_count().await, 0);
    }

    #[tokio::test]
    async fn missing_key_is_a_mismatch() {
        let state = test_state();
        assert!(matches!(
            state.authorize(None),
            Err(RelayError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn empty_url_is_rejected_as_missing() {
        let state = test_state();
        let result = state
            .register_receiver(Some("secret"), Some(String::new()))
            .await;
        assert!(matches!(result, Err(RelayError::MissingField("espUrl"))));
        assert_eq!(state.receiver_count().await, 0);
    }

    #[tokio::test]
    async fn syntactically_distinct_urls_are_distinct_receivers() {
        let state = test_state();
        state
            .register_receiver(Some("secret"), Some("http://host/data".to_string()))
            .await
            .unwrap();
        let count = state
            .register_receiver(Some("secret"), Some("http://host/data/".to_string()))
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn receiver_list_is_an_independent_copy() {
        let state = test_state();
        state
            .register_receiver(Some("secret"), Some("http://a/data".to_string()))
            .await
            .unwrap();

        let copy = state.receiver_list().await;
        state
            .register_receiver(Some("secret"), Some("http://b/data".to_string()))
            .await
            .unwrap();

        assert_eq!(copy, vec!["http://a/data".to_string()]);
        assert_eq!(state.receiver_count().await, 2);
    }

    #[tokio::test]
    async fn store_is_default_before_first_poll_and_pairs_after() {
        let state = test_state();

        let (snapshot, timestamp) = state.latest_snapshot().await;
        assert_eq!(snapshot, Snapshot::default());
        assert!(timestamp.is_none());

        let reading = Snapshot {
            temperature: 36.6,
            pulse_rate: 72.0,
            distress: true,
            ..Snapshot::default()
        };
        let stamped = state.replace_snapshot(reading.clone()).await;

        let (stored, timestamp) = state.latest_snapshot().await;
        assert_eq!(stored, reading);
        assert_eq!(timestamp, Some(stamped));
    }
}
