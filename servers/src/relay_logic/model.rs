use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Accepted source keys for the pulse rate field, first-present-wins.
/// The source backend has shipped both spellings at different times.
pub const PULSE_RATE_KEYS: [&str; 2] = ["pulseRate", "pulse_rate"];

/// One normalized sensor reading as cached and pushed by the relay.
///
/// Every field has a defined default; a partially-malformed source payload
/// coerces to those defaults rather than carrying nulls downstream.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub temperature: f64,
    pub pulse_rate: f64,
    pub distress: bool,
    pub rfid: bool,
    pub ir: bool,
}

impl Snapshot {
    /// Normalizes the nested `data` object of a source response.
    ///
    /// Missing keys and values of the wrong JSON type both fall back to the
    /// field default (0 for numbers, false for flags).
    pub fn from_source(data: &Value) -> Self {
        Self {
            temperature: number_field(data, &["temperature"]),
            pulse_rate: number_field(data, &PULSE_RATE_KEYS),
            distress: flag_field(data, "distress"),
            rfid: flag_field(data, "rfid"),
            ir: flag_field(data, "ir"),
        }
    }
}

fn number_field(data: &Value, keys: &[&str]) -> f64 {
    keys.iter()
        .find_map(|key| data.get(*key).and_then(Value::as_f64))
        .unwrap_or(0.0)
}

fn flag_field(data: &Value, key: &str) -> bool {
    data.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Wire form of a periodic push to a receiver: the snapshot fields flattened
/// next to the timestamp the pair was stored under.
#[derive(Debug, Clone, Serialize)]
pub struct PushPayload {
    #[serde(flatten)]
    pub data: Snapshot,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub api_key: Option<String>,
    pub esp_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendDataRequest {
    pub api_key: Option<String>,
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestDataResponse {
    pub status: String,
    pub message: String,
    pub data: Snapshot,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub status: String,
    pub message: String,
    #[serde(rename = "registeredESPs")]
    pub registered_esps: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendDataResponse {
    pub status: String,
    pub message: String,
    pub sent: usize,
    pub failed: usize,
    #[serde(rename = "totalESPs")]
    pub total_esps: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    /// Seconds since the relay process started.
    pub uptime: f64,
    #[serde(rename = "registeredESPs")]
    pub registered_esps: usize,
    pub last_data_update: Option<DateTime<Utc>>,
}
