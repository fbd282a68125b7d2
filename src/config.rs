// Configuration module for the proximity scanner

use std::path::Path;
use std::time::Duration;

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capture::AddressPolicy;
use crate::error::ConfigError;

const DEFAULT_CONFIG_FILE: &str = "proxscan";
const ENV_PREFIX: &str = "PROXSCAN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub bluetooth: BluetoothConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default = "default_snap_len")]
    pub snap_len: i32,
    #[serde(default)]
    pub promiscuous: bool,
    /// Read timeout handed to the capture source. Zero blocks until a frame arrives.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default)]
    pub address_policy: AddressPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BluetoothConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Adapter name such as `hci0`. The system default adapter is used when unset.
    #[serde(default)]
    pub adapter: Option<String>,
    #[serde(default = "default_quiescence_secs")]
    pub quiescence_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_dwell_secs")]
    pub dwell_secs: u64,
    #[serde(default = "default_preferred_mtu")]
    pub preferred_mtu: u16,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub allow_duplicates: bool,
    #[serde(default)]
    pub service_filter: Vec<Uuid>,
    /// Actively cancel a connection attempt whose done signal timed out.
    #[serde(default)]
    pub cancel_on_timeout: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub mqtt: Option<MqttConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            interface: default_interface(),
            snap_len: default_snap_len(),
            promiscuous: false,
            read_timeout_ms: default_read_timeout_ms(),
            window_secs: default_window_secs(),
            address_policy: AddressPolicy::default(),
        }
    }
}

impl CaptureConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        BluetoothConfig {
            enabled: false,
            adapter: None,
            quiescence_secs: default_quiescence_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            dwell_secs: default_dwell_secs(),
            preferred_mtu: default_preferred_mtu(),
            queue_capacity: default_queue_capacity(),
            allow_duplicates: false,
            service_filter: Vec::new(),
            cancel_on_timeout: false,
        }
    }
}

impl BluetoothConfig {
    pub fn quiescence(&self) -> Duration {
        Duration::from_secs(self.quiescence_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn dwell(&self) -> Duration {
        Duration::from_secs(self.dwell_secs)
    }
}

fn default_interface() -> String {
    "mon0".to_string()
}

fn default_snap_len() -> i32 {
    2048
}

fn default_read_timeout_ms() -> u64 {
    500
}

fn default_window_secs() -> u64 {
    30
}

fn default_quiescence_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    3
}

fn default_dwell_secs() -> u64 {
    5
}

fn default_preferred_mtu() -> u16 {
    500
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_port() -> u16 {
    1883
}

fn default_topic_prefix() -> String {
    "proxscan".to_string()
}

/// Load configuration from an optional file and `PROXSCAN__*` environment variables.
///
/// Without an explicit path, `proxscan.{toml,json,yaml}` in the working
/// directory is used if present.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };
    let builder = config::Config::builder().add_source(file).add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );
    finish(builder)
}

fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Config, ConfigError> {
    let config: Config = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.interface.is_empty() {
            return Err(ConfigError::Invalid("capture.interface is empty".into()));
        }
        if self.capture.window_secs == 0 {
            return Err(ConfigError::Invalid("capture.window_secs must be positive".into()));
        }
        if self.bluetooth.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "bluetooth.connect_timeout_secs must be positive".into(),
            ));
        }
        if self.bluetooth.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "bluetooth.queue_capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use config::FileFormat;

    use super::*;

    fn parse_config(text: &str, format: FileFormat) -> Result<Config, ConfigError> {
        finish(config::Config::builder().add_source(File::from_str(text, format)))
    }

    #[test]
    fn empty_document_yields_defaults() {
        let config = parse_config("", FileFormat::Toml).unwrap();
        assert_eq!(config.capture.interface, "mon0");
        assert_eq!(config.capture.snap_len, 2048);
        assert_eq!(config.capture.window(), Duration::from_secs(30));
        assert_eq!(config.capture.read_timeout(), Some(Duration::from_millis(500)));
        assert_eq!(config.capture.address_policy, AddressPolicy::Broadcast);
        assert!(!config.bluetooth.enabled);
        assert_eq!(config.bluetooth.quiescence(), Duration::from_secs(30));
        assert_eq!(config.bluetooth.connect_timeout(), Duration::from_secs(3));
        assert_eq!(config.bluetooth.dwell(), Duration::from_secs(5));
        assert_eq!(config.bluetooth.queue_capacity, 1024);
        assert!(config.output.mqtt.is_none());
    }

    #[test]
    fn sections_override_defaults() {
        let text = r#"
            [capture]
            interface = "wlan1mon"
            window_secs = 10
            read_timeout_ms = 0
            address_policy = "all_transmitters"

            [bluetooth]
            enabled = true
            adapter = "hci1"
            service_filter = ["0000180f-0000-1000-8000-00805f9b34fb"]

            [output.mqtt]
            host = "broker.local"
        "#;
        let config = parse_config(text, FileFormat::Toml).unwrap();
        assert_eq!(config.capture.interface, "wlan1mon");
        assert_eq!(config.capture.read_timeout(), None);
        assert_eq!(config.capture.address_policy, AddressPolicy::AllTransmitters);
        assert!(config.bluetooth.enabled);
        assert_eq!(config.bluetooth.adapter.as_deref(), Some("hci1"));
        assert_eq!(config.bluetooth.service_filter.len(), 1);
        let mqtt = config.output.mqtt.unwrap();
        assert_eq!(mqtt.port, 1883);
        assert_eq!(mqtt.topic_prefix, "proxscan");
    }

    #[test]
    fn zero_window_is_rejected() {
        let err = parse_config("[capture]\nwindow_secs = 0\n", FileFormat::Toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        let err =
            parse_config("[bluetooth]\nqueue_capacity = 0\n", FileFormat::Toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
