// Command-line overrides for the configuration file

use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;
use crate::error::ConfigError;

#[derive(Debug, Parser)]
#[command(name = "proxscan", version, about = "Dual-radio BLE and Wi-Fi proximity scanner")]
pub struct Cli {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Monitor-mode interface to capture on
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Enable BLE scanning and inspection
    #[arg(short, long)]
    pub bluetooth: bool,

    /// Length of the Wi-Fi capture window in seconds
    #[arg(long)]
    pub window_secs: Option<u64>,
}

impl Cli {
    pub fn apply(&self, config: &mut Config) -> Result<(), ConfigError> {
        if let Some(interface) = &self.interface {
            config.capture.interface = interface.clone();
        }
        if self.bluetooth {
            config.bluetooth.enabled = true;
        }
        if let Some(window_secs) = self.window_secs {
            config.capture.window_secs = window_secs;
        }
        config.validate()
    }
}
