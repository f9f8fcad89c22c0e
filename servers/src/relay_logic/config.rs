use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Built-in API key. Usable for local experiments only; `main` logs a warning
/// for as long as the relay runs with it.
pub const DEFAULT_API_KEY: &str = "your-secret-api-key-12345";

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_SOURCE_URL: &str = "https://test-fpbw.onrender.com/api/latest-data";
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;
const DEFAULT_CONFIG_FILE: &str = "server_relay.conf";

/// Partial configuration as read from one source (defaults, config file,
/// environment, CLI). Sources are merged in that order, later wins.
#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "IoT sensor data relay", version)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigOverrides {
    #[clap(long, env = "RELAY_PORT", help = "Port to listen on for API requests.")]
    pub port: Option<u16>,

    #[clap(long, env = "RELAY_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "RELAY_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "RELAY_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "RELAY_API_KEY", help = "Shared secret required to register receivers and trigger broadcasts.")]
    pub api_key: Option<String>,

    #[clap(long, env = "RELAY_SOURCE_URL", help = "Source backend endpoint to poll for sensor data.")]
    pub source_url: Option<String>,

    #[clap(long, env = "RELAY_POLL_INTERVAL_MS", help = "Poll period in milliseconds.")]
    pub poll_interval_ms: Option<u64>,

    #[clap(long, env = "RELAY_REQUEST_TIMEOUT_SECS", help = "Timeout in seconds for outbound fetch and push requests.")]
    pub request_timeout_secs: Option<u64>,
}

impl ConfigOverrides {
    // Merge two override sets, where 'other' wins for Some values
    fn merge(self, other: ConfigOverrides) -> ConfigOverrides {
        ConfigOverrides {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            api_key: other.api_key.or(self.api_key),
            source_url: other.source_url.or(self.source_url),
            poll_interval_ms: other.poll_interval_ms.or(self.poll_interval_ms),
            request_timeout_secs: other.request_timeout_secs.or(self.request_timeout_secs),
        }
    }

    fn resolve(self) -> Config {
        Config {
            port: self.port.unwrap_or(DEFAULT_PORT),
            log_dir: self.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: self.log_level.unwrap_or_else(|| "info".to_string()),
            api_key: self.api_key.unwrap_or_else(|| DEFAULT_API_KEY.to_string()),
            source_url: self.source_url.unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            request_timeout_secs: self
                .request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Fully-resolved runtime configuration. Every field has a default, so the
/// relay starts with no config file, env vars, or flags at all.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub api_key: String,
    pub source_url: String,
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
}

pub fn load_config() -> Config {
    // 1. Parse CLI arguments (clap also pulls in RELAY_* env vars), mainly to
    //    learn whether the config file path was overridden.
    let cli_args = ConfigOverrides::parse();

    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    // 2. Load from the config file if present.
    let mut current = ConfigOverrides::default();

    if config_file_path.exists() {
        if let Ok(config_str) = fs::read_to_string(&config_file_path) {
            if let Ok(file_config) = serde_json::from_str::<ConfigOverrides>(&config_str) {
                current = current.merge(file_config);
            } else {
                eprintln!(
                    "Failed to parse config file: {}. Falling back to other sources.",
                    config_file_path.display()
                );
            }
        } else {
            eprintln!(
                "Failed to read config file: {}. Falling back to other sources.",
                config_file_path.display()
            );
        }
    }

    // 3. Environment variables and CLI arguments override the file.
    current = current.merge(cli_args);

    // 4. Fill the remaining holes with compiled-in defaults.
    current.resolve()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_fills_every_default() {
        let config = ConfigOverrides::default().resolve();
        assert_eq!(config.port, 3001);
        assert_eq!(config.api_key, DEFAULT_API_KEY);
        assert_eq!(config.poll_interval_ms, 2000);
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn later_source_wins_in_merge() {
        let file = ConfigOverrides {
            port: Some(4000),
            api_key: Some("from-file".to_string()),
            ..ConfigOverrides::default()
        };
        let cli = ConfigOverrides {
            api_key: Some("from-cli".to_string()),
            ..ConfigOverrides::default()
        };

        let config = file.merge(cli).resolve();
        assert_eq!(config.port, 4000);
        assert_eq!(config.api_key, "from-cli");
    }

    #[test]
    fn config_file_fields_are_camel_case() {
        let parsed: ConfigOverrides =
            serde_json::from_str(r#"{"pollIntervalMs": 500, "sourceUrl": "http://localhost:9/x"}"#)
                .unwrap();
        let config = parsed.resolve();
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.source_url, "http://localhost:9/x");
    }
}
