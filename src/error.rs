// Error types for the scanner subsystems

use thiserror::Error;

/// Errors raised by the BLE adapter and peripheral collaborators.
#[derive(Debug, Clone, Error)]
pub enum BleError {
    /// The adapter could not be opened or powered. Fatal for the BLE subsystem.
    #[error("adapter initialization failed: {0}")]
    Init(String),

    #[error("scan control failed: {0}")]
    Scan(String),

    #[error("connection to {peripheral} failed: {reason}")]
    Connect { peripheral: String, reason: String },

    #[error("service discovery on {peripheral} failed: {reason}")]
    Services { peripheral: String, reason: String },

    #[error("characteristic discovery for service {service} failed: {reason}")]
    Characteristics { service: String, reason: String },

    #[error("MTU request failed: {0}")]
    Mtu(String),

    /// Adapter event stream was not set up with `initialize` first.
    #[error("adapter is not initialized")]
    NotInitialized,

    #[error("adapter event stream closed")]
    EventsClosed,
}

impl From<bluer::Error> for BleError {
    fn from(err: bluer::Error) -> Self {
        BleError::Init(err.to_string())
    }
}

/// Errors raised by the monitor-mode capture source.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open capture on {interface}: {reason}")]
    Open { interface: String, reason: String },

    #[error("capture read failed: {0}")]
    Read(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to publish record: {0}")]
    Publish(String),
}
