//! Pipeline configuration
//!
//! Loaded once at startup from environment variables (with `.env` support)
//! and immutable for the process lifetime.

use anyhow::Result;

use crate::mqtt::MqttConfig;
use crate::sftp::SftpConfig;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default SFTP port.
pub const DEFAULT_SFTP_PORT: u16 = 22;

/// Default remote directory holding transaction uploads.
pub const DEFAULT_SFTP_PATH: &str = "/DiskC/Datatransfers/Upload/Data";

/// Default SFTP connect timeout in seconds.
pub const DEFAULT_SFTP_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default per-operation SFTP timeout in seconds.
pub const DEFAULT_SFTP_OPERATION_TIMEOUT_SECS: u64 = 60;

/// Default MQTT broker host (the supervisor-provided broker).
pub const DEFAULT_MQTT_HOST: &str = "core-mosquitto";

/// Default MQTT broker port.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default topic prefix for all published payloads.
pub const DEFAULT_MQTT_TOPIC_PREFIX: &str = "tank_data";

/// Default polling interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Default ledger location.
pub const DEFAULT_LEDGER_PATH: &str = "/data/tank_data/ledger.json";

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Remote source connection parameters
    pub sftp: SftpConfig,
    /// Remote directory to poll
    pub remote_path: String,
    /// Event bus connection parameters
    pub mqtt: MqttConfig,
    /// Whether bus publication is enabled at all
    pub mqtt_enabled: bool,
    /// Seconds between scheduled sync cycles
    pub poll_interval_secs: u64,
    /// Where the durable file ledger lives
    pub ledger_path: String,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            sftp: SftpConfig {
                host: env_or("SFTP_HOST", "localhost"),
                port: env_parse("SFTP_PORT", DEFAULT_SFTP_PORT),
                username: env_or("SFTP_USERNAME", "tankdata"),
                password: env_or("SFTP_PASSWORD", ""),
                connect_timeout_secs: env_parse(
                    "SFTP_CONNECT_TIMEOUT",
                    DEFAULT_SFTP_CONNECT_TIMEOUT_SECS,
                ),
                operation_timeout_secs: env_parse(
                    "SFTP_OPERATION_TIMEOUT",
                    DEFAULT_SFTP_OPERATION_TIMEOUT_SECS,
                ),
            },
            remote_path: env_or("SFTP_PATH", DEFAULT_SFTP_PATH),
            mqtt: MqttConfig {
                host: env_or("MQTT_HOST", DEFAULT_MQTT_HOST),
                port: env_parse("MQTT_PORT", DEFAULT_MQTT_PORT),
                username: env_or("MQTT_USERNAME", ""),
                password: env_or("MQTT_PASSWORD", ""),
                client_id: env_or("MQTT_CLIENT_ID", "tankflow"),
                topic_prefix: env_or("MQTT_TOPIC_PREFIX", DEFAULT_MQTT_TOPIC_PREFIX),
            },
            mqtt_enabled: env_parse("MQTT_ENABLED", true),
            poll_interval_secs: env_parse("UPDATE_INTERVAL", DEFAULT_POLL_INTERVAL_SECS),
            ledger_path: env_or("LEDGER_PATH", DEFAULT_LEDGER_PATH),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.sftp.host.is_empty() {
            anyhow::bail!("SFTP host must not be empty");
        }

        if self.sftp.port == 0 {
            anyhow::bail!("SFTP port must be greater than 0");
        }

        if self.remote_path.is_empty() {
            anyhow::bail!("SFTP path must not be empty");
        }

        if self.poll_interval_secs == 0 {
            anyhow::bail!("Polling interval must be greater than 0");
        }

        if self.mqtt_enabled {
            if self.mqtt.host.is_empty() {
                anyhow::bail!("MQTT host must not be empty when MQTT is enabled");
            }
            if self.mqtt.topic_prefix.is_empty() || self.mqtt.topic_prefix.contains('#') {
                anyhow::bail!("MQTT topic prefix must be a non-empty literal topic");
            }
        }

        if self.ledger_path.is_empty() {
            anyhow::bail!("Ledger path must not be empty");
        }

        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
