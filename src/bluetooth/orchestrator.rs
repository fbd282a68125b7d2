// Scan, drain, inspect and rescan cycle for BLE peripherals

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::done::DoneSignals;
use super::queue::{peripheral_queue, PeripheralQueue, QueueProducer};
use super::report::{InspectionReport, ServiceReport};
use super::{Adapter, AdapterEvent, AdapterState, DiscoveredPeripheral, Peripheral};
use crate::config::BluetoothConfig;
use crate::error::BleError;
use crate::sink::ObservationSink;

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// How long advertisements accumulate before each drain.
    pub quiescence: Duration,
    pub connect_timeout: Duration,
    /// How long an inspected connection is held before it is released.
    pub dwell: Duration,
    pub preferred_mtu: u16,
    pub queue_capacity: usize,
    pub service_filter: Vec<Uuid>,
    pub allow_duplicates: bool,
    pub cancel_on_timeout: bool,
}

impl From<&BluetoothConfig> for OrchestratorOptions {
    fn from(config: &BluetoothConfig) -> Self {
        OrchestratorOptions {
            quiescence: config.quiescence(),
            connect_timeout: config.connect_timeout(),
            dwell: config.dwell(),
            preferred_mtu: config.preferred_mtu,
            queue_capacity: config.queue_capacity,
            service_filter: config.service_filter.clone(),
            allow_duplicates: config.allow_duplicates,
            cancel_on_timeout: config.cancel_on_timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Unknown,
    Scanning,
    /// Scanning paused while the queue is drained.
    Draining,
    /// Scanning stopped because the adapter left the powered-on state.
    Idle,
}

#[derive(Debug, Clone, Copy)]
struct Status {
    adapter: AdapterState,
    scan: ScanState,
}

struct Shared<A: Adapter> {
    adapter: A,
    options: OrchestratorOptions,
    producer: QueueProducer<A::Peripheral>,
    done: DoneSignals,
    status: Mutex<Status>,
    sink: Arc<dyn ObservationSink>,
}

/// Adapter events are pumped on their own task. The drain loop runs on the
/// caller's task and waits for each attempt's done signal, bounded by the
/// connect timeout.
pub struct Orchestrator<A: Adapter> {
    shared: Arc<Shared<A>>,
    queue: PeripheralQueue<A::Peripheral>,
}

impl<A: Adapter> Orchestrator<A> {
    pub fn new(adapter: A, options: OrchestratorOptions, sink: Arc<dyn ObservationSink>) -> Self {
        let (producer, queue) = peripheral_queue(options.queue_capacity);
        Orchestrator {
            shared: Arc::new(Shared {
                adapter,
                options,
                producer,
                done: DoneSignals::default(),
                status: Mutex::new(Status {
                    adapter: AdapterState::Unknown,
                    scan: ScanState::Unknown,
                }),
                sink,
            }),
            queue,
        }
    }

    pub fn scan_state(&self) -> ScanState {
        self.shared.status.lock().scan
    }

    pub fn adapter_state(&self) -> AdapterState {
        self.shared.status.lock().adapter
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Open the adapter and start dispatching its events.
    ///
    /// Failure here is fatal for the BLE subsystem.
    pub async fn initialize(&self) -> Result<JoinHandle<()>, BleError> {
        let events = self.shared.adapter.initialize().await?;
        Ok(tokio::spawn(self.shared.clone().pump(events)))
    }

    /// Initialize, then repeat the scan cycle until the adapter goes away.
    pub async fn run(mut self) -> Result<(), BleError> {
        let pump = self.initialize().await?;
        loop {
            let attempts = self.run_cycle().await;
            debug!(
                "Cycle finished: {} attempts, adapter {}, {:?}, {} queued",
                attempts,
                self.adapter_state(),
                self.scan_state(),
                self.queued()
            );
            if pump.is_finished() {
                error!("Adapter event stream closed");
                return Err(BleError::EventsClosed);
            }
        }
    }

    /// One cycle: accumulate, stop scanning, drain the queue, resume scanning.
    ///
    /// Returns the number of connection attempts made.
    pub async fn run_cycle(&mut self) -> usize {
        tokio::time::sleep(self.shared.options.quiescence).await;
        self.shared.stop_scanning(ScanState::Draining).await;
        let attempts = self.drain().await;
        self.shared.resume_scanning().await;
        attempts
    }

    /// Attempt one connection per queued discovery until the queue is empty.
    pub async fn drain(&mut self) -> usize {
        if self.queue.is_empty() {
            debug!("Nothing queued to drain");
            return 0;
        }
        let shared = &self.shared;
        let mut attempts = 0;

        while let Some(DiscoveredPeripheral {
            peripheral,
            rssi,
            discovered_at,
        }) = self.queue.try_pop()
        {
            attempts += 1;
            let id = peripheral.identifier();
            info!(
                "try connecting to {} (rssi {:?}, seen {}, {} queued)",
                id,
                rssi,
                discovered_at.format("%H:%M:%S"),
                self.queue.len()
            );

            let done = shared.done.arm(&id);
            if let Err(e) = shared.adapter.connect(&peripheral).await {
                warn!("Failed to start connection to {}: {}", id, e);
                shared.done.disarm(&id);
                continue;
            }

            match tokio::time::timeout(shared.options.connect_timeout, done).await {
                Ok(_) => debug!("done: {}", id),
                Err(_) => {
                    info!("timeout for: {}", id);
                    shared.done.disarm(&id);
                    if shared.options.cancel_on_timeout {
                        if let Err(e) = shared.adapter.cancel_connection(&peripheral).await {
                            warn!("Failed to cancel connection to {}: {}", id, e);
                        }
                    }
                }
            }
        }

        if self.queue.dropped() > 0 {
            warn!("{} discoveries dropped on a full queue so far", self.queue.dropped());
        }
        debug!(
            "Drain finished after {} attempts, {} signals outstanding",
            attempts,
            shared.done.pending()
        );
        attempts
    }
}

impl<A: Adapter> Shared<A> {
    async fn pump(self: Arc<Self>, mut events: mpsc::Receiver<AdapterEvent<A::Peripheral>>) {
        while let Some(event) = events.recv().await {
            match event {
                AdapterEvent::StateChanged(state) => self.on_state_changed(state).await,
                AdapterEvent::Discovered(discovered) => self.on_discovered(discovered),
                AdapterEvent::Connected(peripheral, result) => {
                    // Inspection holds the connection for the dwell period.
                    let shared = self.clone();
                    tokio::spawn(async move { shared.on_connected(peripheral, result).await });
                }
                AdapterEvent::Disconnected(peripheral) => self.on_disconnected(&peripheral),
            }
        }
        debug!("Adapter event pump stopped");
    }

    async fn on_state_changed(&self, state: AdapterState) {
        info!("State: {}", state);
        self.status.lock().adapter = state;
        if state == AdapterState::PoweredOn {
            self.start_scanning().await;
        } else {
            self.stop_scanning(ScanState::Idle).await;
        }
    }

    fn on_discovered(&self, discovered: DiscoveredPeripheral<A::Peripheral>) {
        let id = discovered.peripheral.identifier();
        debug!("found p: {} (rssi {:?})", id, discovered.rssi);
        if !self.producer.offer(discovered) {
            warn!("Peripheral queue full, dropping {}", id);
        }
    }

    /// Handle the outcome of a connection attempt. The connection is always
    /// released before this returns.
    async fn on_connected(&self, peripheral: A::Peripheral, result: Result<(), BleError>) {
        let id = peripheral.identifier();
        match result {
            Ok(()) => {
                info!("Connected: {}", id);
                match self.inspect(&peripheral).await {
                    Ok(report) => {
                        info!("{}", report);
                        if let Err(e) = self.sink.inspection(&report) {
                            warn!("Failed to emit inspection of {}: {}", id, e);
                        }
                        tokio::time::sleep(self.options.dwell).await;
                    }
                    Err(e) => warn!("Inspection of {} aborted: {}", id, e),
                }
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", id, e);
                // No disconnection follows a failed connection.
                self.done.signal(&id);
            }
        }

        if let Err(e) = self.adapter.cancel_connection(&peripheral).await {
            warn!("Failed to release connection to {}: {}", id, e);
        }
    }

    fn on_disconnected(&self, peripheral: &A::Peripheral) {
        let id = peripheral.identifier();
        info!("Disconnected {}", id);
        if !self.done.signal(&id) {
            debug!("Nobody waiting on {}", id);
        }
    }

    async fn inspect(&self, peripheral: &A::Peripheral) -> Result<InspectionReport, BleError> {
        let id = peripheral.identifier();
        let filter = &self.options.service_filter;

        if let Err(e) = peripheral.set_mtu(self.options.preferred_mtu).await {
            warn!("Failed to set MTU on {}: {}", id, e);
        }

        let services = peripheral.discover_services(filter).await?;
        debug!("discovered services # {}", services.len());

        let mut report = InspectionReport::new(id);
        for (service, handle) in services {
            let (characteristics, error) =
                match peripheral.discover_characteristics(&[], &handle).await {
                    Ok(characteristics) => (characteristics, None),
                    Err(e) => {
                        warn!("Failed to discover characteristics: {}", e);
                        (Vec::new(), Some(e.to_string()))
                    }
                };
            report.services.push(ServiceReport {
                service,
                characteristics,
                error,
            });
        }
        debug!(
            "Inspected {}: {} services, {} characteristics",
            report.peripheral,
            report.services.len(),
            report.characteristic_count()
        );
        Ok(report)
    }

    async fn start_scanning(&self) {
        match self
            .adapter
            .scan(&self.options.service_filter, self.options.allow_duplicates)
            .await
        {
            Ok(()) => {
                info!("scanning...");
                self.status.lock().scan = ScanState::Scanning;
            }
            Err(e) => warn!("Failed to start scanning: {}", e),
        }
    }

    async fn stop_scanning(&self, next: ScanState) {
        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop scanning: {}", e);
        }
        self.status.lock().scan = next;
    }

    /// Scanning only resumes while the adapter is powered on.
    async fn resume_scanning(&self) {
        let powered = self.status.lock().adapter == AdapterState::PoweredOn;
        if powered {
            self.start_scanning().await;
        } else {
            self.status.lock().scan = ScanState::Idle;
        }
    }
}
