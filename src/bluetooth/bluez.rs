// Bluetooth Low Energy backend using the bluer crate

use std::time::Duration;

use async_trait::async_trait;
use bluer::gatt::remote::Service;
use bluer::{
    AdapterEvent as BluezEvent, AdapterProperty, Device, DeviceEvent, DeviceProperty,
    DiscoveryFilter, DiscoveryTransport,
};
use futures::{pin_mut, StreamExt};
use log::{debug, info};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{
    Adapter, AdapterEvent, AdapterState, CharacteristicInfo, CharacteristicProperties,
    DiscoveredPeripheral, Peripheral, ServiceInfo,
};
use crate::error::BleError;

const EVENT_BUFFER: usize = 256;
const SERVICES_RESOLVE_POLL: Duration = Duration::from_millis(100);
const SERVICES_RESOLVE_ATTEMPTS: usize = 30;
const ATT_MTU_MIN: u16 = 23;
const ATT_MTU_MAX: u16 = 517;

type EventSender = mpsc::Sender<AdapterEvent<BluezPeripheral>>;

pub struct BluezAdapter {
    adapter: bluer::Adapter,
    name: String,
    events: Mutex<Option<EventSender>>,
    discovery: Mutex<Option<JoinHandle<()>>>,
}

impl BluezAdapter {
    /// Open the named adapter, or the system default one.
    pub async fn new(adapter_name: Option<&str>) -> Result<Self, BleError> {
        let session = bluer::Session::new().await?;
        let adapter = match adapter_name {
            Some(name) => session.adapter(name)?,
            None => session.default_adapter().await?,
        };
        let name = adapter.name().to_string();

        info!("Using Bluetooth adapter: {}", name);

        Ok(BluezAdapter {
            adapter,
            name,
            events: Mutex::new(None),
            discovery: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn sender(&self) -> Result<EventSender, BleError> {
        self.events.lock().clone().ok_or(BleError::NotInitialized)
    }
}

fn powered_state(powered: bool) -> AdapterState {
    if powered {
        AdapterState::PoweredOn
    } else {
        AdapterState::PoweredOff
    }
}

#[async_trait]
impl Adapter for BluezAdapter {
    type Peripheral = BluezPeripheral;

    async fn initialize(&self) -> Result<mpsc::Receiver<AdapterEvent<BluezPeripheral>>, BleError> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        // Ensure adapter is powered on
        self.adapter.set_powered(true).await?;
        let powered = self.adapter.is_powered().await?;
        debug!("Adapter {} powered: {}", self.name, powered);

        let changes = self.adapter.events().await?;
        // The receiver is not handed out yet, so the buffer has room.
        let _ = tx.try_send(AdapterEvent::StateChanged(powered_state(powered)));

        let state_tx = tx.clone();
        tokio::spawn(async move {
            pin_mut!(changes);
            while let Some(event) = changes.next().await {
                if let BluezEvent::PropertyChanged(AdapterProperty::Powered(on)) = event {
                    let state = AdapterEvent::StateChanged(powered_state(on));
                    if state_tx.send(state).await.is_err() {
                        break;
                    }
                }
            }
            debug!("Adapter property stream ended");
        });

        *self.events.lock() = Some(tx);
        Ok(rx)
    }

    async fn scan(&self, filter: &[Uuid], allow_duplicates: bool) -> Result<(), BleError> {
        if self
            .discovery
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
        {
            return Ok(());
        }
        let tx = self.sender()?;
        let scan_error = |e: bluer::Error| BleError::Scan(e.to_string());

        let mut discovery_filter = DiscoveryFilter::default();
        discovery_filter.transport = DiscoveryTransport::Le;
        discovery_filter.uuids = filter.iter().copied().collect();
        discovery_filter.duplicate_data = allow_duplicates;
        self.adapter
            .set_discovery_filter(discovery_filter)
            .await
            .map_err(scan_error)?;

        let devices = self.adapter.discover_devices().await.map_err(scan_error)?;
        let adapter = self.adapter.clone();
        let task = tokio::spawn(async move {
            pin_mut!(devices);
            while let Some(event) = devices.next().await {
                let BluezEvent::DeviceAdded(address) = event else {
                    continue;
                };
                let device = match adapter.device(address) {
                    Ok(device) => device,
                    Err(e) => {
                        debug!("Skipping {}: {}", address, e);
                        continue;
                    }
                };
                let rssi = device.rssi().await.unwrap_or(None);
                let discovered = DiscoveredPeripheral::new(BluezPeripheral { device }, rssi);
                if tx.send(AdapterEvent::Discovered(discovered)).await.is_err() {
                    break;
                }
            }
        });

        *self.discovery.lock() = Some(task);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), BleError> {
        // Dropping the discovery stream ends the BlueZ discovery session.
        if let Some(task) = self.discovery.lock().take() {
            task.abort();
        }
        Ok(())
    }

    async fn connect(&self, peripheral: &BluezPeripheral) -> Result<(), BleError> {
        let tx = self.sender()?;
        let peripheral = peripheral.clone();
        let connect_error = |id: String, e: bluer::Error| BleError::Connect {
            peripheral: id,
            reason: e.to_string(),
        };

        // Subscribe first so a quick disconnect is not missed.
        let changes = peripheral
            .device
            .events()
            .await
            .map_err(|e| connect_error(peripheral.identifier(), e))?;

        tokio::spawn(async move {
            let result = peripheral
                .device
                .connect()
                .await
                .map_err(|e| connect_error(peripheral.identifier(), e));
            let connected = result.is_ok();
            if tx
                .send(AdapterEvent::Connected(peripheral.clone(), result))
                .await
                .is_err()
                || !connected
            {
                return;
            }

            pin_mut!(changes);
            while let Some(DeviceEvent::PropertyChanged(property)) = changes.next().await {
                if let DeviceProperty::Connected(false) = property {
                    let _ = tx.send(AdapterEvent::Disconnected(peripheral)).await;
                    break;
                }
            }
        });
        Ok(())
    }

    async fn cancel_connection(&self, peripheral: &BluezPeripheral) -> Result<(), BleError> {
        peripheral
            .device
            .disconnect()
            .await
            .map_err(|e| BleError::Connect {
                peripheral: peripheral.identifier(),
                reason: e.to_string(),
            })
    }
}

#[derive(Debug, Clone)]
pub struct BluezPeripheral {
    device: Device,
}

impl BluezPeripheral {
    async fn wait_for_services(&self) -> Result<(), bluer::Error> {
        for _ in 0..SERVICES_RESOLVE_ATTEMPTS {
            if self.device.is_services_resolved().await? {
                return Ok(());
            }
            tokio::time::sleep(SERVICES_RESOLVE_POLL).await;
        }
        debug!("{}: services not resolved, reading what is known", self.identifier());
        Ok(())
    }
}

fn check_mtu(mtu: u16) -> Result<(), BleError> {
    if (ATT_MTU_MIN..=ATT_MTU_MAX).contains(&mtu) {
        Ok(())
    } else {
        Err(BleError::Mtu(format!(
            "{} outside {}..={}",
            mtu, ATT_MTU_MIN, ATT_MTU_MAX
        )))
    }
}

fn matches_filter(filter: &[Uuid], uuid: &Uuid) -> bool {
    filter.is_empty() || filter.contains(uuid)
}

fn properties(flags: &bluer::gatt::CharacteristicFlags) -> CharacteristicProperties {
    CharacteristicProperties {
        broadcast: flags.broadcast,
        read: flags.read,
        write_without_response: flags.write_without_response,
        write: flags.write,
        notify: flags.notify,
        indicate: flags.indicate,
        authenticated_signed_writes: flags.authenticated_signed_writes,
        extended_properties: flags.extended_properties,
    }
}

#[async_trait]
impl Peripheral for BluezPeripheral {
    type Service = Service;

    fn identifier(&self) -> String {
        self.device.address().to_string()
    }

    async fn set_mtu(&self, mtu: u16) -> Result<(), BleError> {
        check_mtu(mtu)?;
        // BlueZ negotiates the ATT MTU itself during connection.
        debug!("{}: preferred MTU {} left to BlueZ", self.identifier(), mtu);
        Ok(())
    }

    async fn discover_services(
        &self,
        filter: &[Uuid],
    ) -> Result<Vec<(ServiceInfo, Service)>, BleError> {
        let services_error = |e: bluer::Error| BleError::Services {
            peripheral: self.identifier(),
            reason: e.to_string(),
        };

        self.wait_for_services().await.map_err(services_error)?;
        let mut discovered = Vec::new();
        for service in self.device.services().await.map_err(services_error)? {
            let uuid = service.uuid().await.map_err(services_error)?;
            if !matches_filter(filter, &uuid) {
                continue;
            }
            let name = bluer::id::Service::try_from(uuid)
                .ok()
                .map(|id| format!("{id:?}"));
            discovered.push((ServiceInfo { uuid, name }, service));
        }
        Ok(discovered)
    }

    async fn discover_characteristics(
        &self,
        filter: &[Uuid],
        service: &Service,
    ) -> Result<Vec<CharacteristicInfo>, BleError> {
        let characteristics_error = |e: bluer::Error| BleError::Characteristics {
            service: service.id().to_string(),
            reason: e.to_string(),
        };

        let mut discovered = Vec::new();
        for characteristic in service.characteristics().await.map_err(characteristics_error)? {
            let uuid = characteristic.uuid().await.map_err(characteristics_error)?;
            if !matches_filter(filter, &uuid) {
                continue;
            }
            let flags = characteristic.flags().await.map_err(characteristics_error)?;
            let name = bluer::id::Characteristic::try_from(uuid)
                .ok()
                .map(|id| format!("{id:?}"));
            discovered.push(CharacteristicInfo {
                uuid,
                name,
                properties: properties(&flags),
            });
        }
        Ok(discovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mtu_outside_att_range_is_rejected() {
        assert!(check_mtu(23).is_ok());
        assert!(check_mtu(500).is_ok());
        assert!(check_mtu(517).is_ok());
        assert!(matches!(check_mtu(22), Err(BleError::Mtu(_))));
        assert!(matches!(check_mtu(1024), Err(BleError::Mtu(_))));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let battery = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);
        let other = Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);
        assert!(matches_filter(&[], &battery));
        assert!(matches_filter(&[battery], &battery));
        assert!(!matches_filter(&[battery], &other));
    }
}
