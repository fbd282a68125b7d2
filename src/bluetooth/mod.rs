// Bluetooth Low Energy discovery and inspection

pub mod bluez;
pub mod done;
pub mod orchestrator;
pub mod queue;
pub mod report;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::BleError;

pub use self::bluez::BluezAdapter;
pub use self::orchestrator::{Orchestrator, OrchestratorOptions, ScanState};
pub use self::report::{CharacteristicInfo, CharacteristicProperties, InspectionReport, ServiceInfo};

/// Power/operational state reported by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdapterState::Unknown => "Unknown",
            AdapterState::Resetting => "Resetting",
            AdapterState::Unsupported => "Unsupported",
            AdapterState::Unauthorized => "Unauthorized",
            AdapterState::PoweredOff => "PoweredOff",
            AdapterState::PoweredOn => "PoweredOn",
        };
        f.write_str(name)
    }
}

/// One advertisement seen while scanning.
#[derive(Debug, Clone)]
pub struct DiscoveredPeripheral<P> {
    pub peripheral: P,
    pub rssi: Option<i16>,
    pub discovered_at: DateTime<Utc>,
}

impl<P> DiscoveredPeripheral<P> {
    pub fn new(peripheral: P, rssi: Option<i16>) -> Self {
        DiscoveredPeripheral {
            peripheral,
            rssi,
            discovered_at: Utc::now(),
        }
    }
}

/// Events delivered by the adapter's driver.
#[derive(Debug)]
pub enum AdapterEvent<P> {
    StateChanged(AdapterState),
    Discovered(DiscoveredPeripheral<P>),
    /// Outcome of a connection attempt started with [`Adapter::connect`].
    Connected(P, Result<(), BleError>),
    Disconnected(P),
}

/// A remote device that can be connected to and inspected.
#[async_trait]
pub trait Peripheral: Clone + Send + Sync + 'static {
    type Service: Send + Sync;

    fn identifier(&self) -> String;

    async fn set_mtu(&self, mtu: u16) -> Result<(), BleError>;

    /// Discover primary services. An empty filter returns all of them.
    async fn discover_services(
        &self,
        filter: &[Uuid],
    ) -> Result<Vec<(ServiceInfo, Self::Service)>, BleError>;

    async fn discover_characteristics(
        &self,
        filter: &[Uuid],
        service: &Self::Service,
    ) -> Result<Vec<CharacteristicInfo>, BleError>;
}

/// The local radio.
///
/// All operations may be called concurrently from the event pump, connection
/// tasks and the drain loop.
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    type Peripheral: Peripheral;

    /// Open the adapter and return its event stream. The current state is
    /// delivered as the first event.
    async fn initialize(&self) -> Result<mpsc::Receiver<AdapterEvent<Self::Peripheral>>, BleError>;

    async fn scan(&self, filter: &[Uuid], allow_duplicates: bool) -> Result<(), BleError>;

    async fn stop_scan(&self) -> Result<(), BleError>;

    /// Start connecting. Completion is reported with [`AdapterEvent::Connected`].
    async fn connect(&self, peripheral: &Self::Peripheral) -> Result<(), BleError>;

    async fn cancel_connection(&self, peripheral: &Self::Peripheral) -> Result<(), BleError>;
}
