// Monitor-mode frame capture and signal extraction

pub mod dot11;
pub mod frame;
pub mod pcap_source;
pub mod radiotap;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::observation::SignalObservation;
use crate::sink::ObservationSink;

use self::dot11::{Dot11Header, MacAddr};
use self::frame::{Frame, RawFrame};

pub use self::pcap_source::PcapBackend;

/// Pause after a failed read so a persistent fault does not spin.
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(5);

/// Which frames count as observations of their transmitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressPolicy {
    /// Only frames addressed to the broadcast receiver (probe requests, beacons).
    #[default]
    Broadcast,
    /// Every frame that names a transmitter.
    AllTransmitters,
}

impl AddressPolicy {
    pub fn qualify(&self, header: &Dot11Header) -> Option<MacAddr> {
        let transmitter = header.transmitter?;
        match self {
            AddressPolicy::Broadcast if !header.receiver.is_broadcast() => None,
            _ => Some(transmitter),
        }
    }
}

/// Parameters for opening a live capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveOptions {
    pub interface: String,
    pub snap_len: i32,
    pub promiscuous: bool,
    /// `None` blocks until a frame arrives.
    pub read_timeout: Option<Duration>,
}

impl From<&CaptureConfig> for LiveOptions {
    fn from(config: &CaptureConfig) -> Self {
        LiveOptions {
            interface: config.interface.clone(),
            snap_len: config.snap_len,
            promiscuous: config.promiscuous,
            read_timeout: config.read_timeout(),
        }
    }
}

pub enum FrameEvent {
    Frame(RawFrame),
    /// The read timeout elapsed without a frame.
    Idle,
    /// The source has no more frames.
    Closed,
}

/// An opened capture. Reads are blocking.
pub trait CaptureSource: Send {
    fn next_frame(&mut self) -> Result<FrameEvent, CaptureError>;

    /// Release the source. Calling it more than once is a no-op.
    fn close(&mut self);
}

pub trait CaptureBackend {
    type Source: CaptureSource;

    fn open_live(&self, options: &LiveOptions) -> Result<Self::Source, CaptureError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    fn wall(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    pub frames: u64,
    pub observations: u64,
    /// Frames without a qualifying address or signal.
    pub discarded: u64,
    /// Frames that failed to decode.
    pub anomalies: u64,
    pub deadline_reached: bool,
}

/// Closes the wrapped source on every exit path.
struct Closing<'a, S: CaptureSource>(&'a mut S);

impl<S: CaptureSource> Drop for Closing<'_, S> {
    fn drop(&mut self) {
        self.0.close();
    }
}

pub struct CaptureFilter {
    limit: Duration,
    policy: AddressPolicy,
    sink: Arc<dyn ObservationSink>,
    shutdown: Arc<AtomicBool>,
}

impl CaptureFilter {
    pub fn new(limit: Duration, policy: AddressPolicy, sink: Arc<dyn ObservationSink>) -> Self {
        CaptureFilter {
            limit,
            policy,
            sink,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting the returned flag stops the window at the next frame or idle tick.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Open a live source and run one capture window over it.
    pub fn run<B: CaptureBackend>(
        &self,
        backend: &B,
        options: &LiveOptions,
    ) -> Result<CaptureSummary, CaptureError> {
        let mut source = backend.open_live(options)?;
        info!(
            "Capturing on {} for {}s ({:?} policy)",
            options.interface,
            self.limit.as_secs(),
            self.policy
        );
        Ok(self.capture_window(&mut source, &SystemClock))
    }

    /// Consume frames until the window closes, the source ends or shutdown is requested.
    ///
    /// The deadline is checked after every read and before the frame is
    /// processed, so nothing received past the deadline is emitted. Read
    /// errors are counted as anomalies and the window carries on.
    pub fn capture_window<S: CaptureSource, C: Clock>(
        &self,
        source: &mut S,
        clock: &C,
    ) -> CaptureSummary {
        let mut source = Closing(source);
        let start = clock.now();
        let mut summary = CaptureSummary::default();

        loop {
            let event = source.0.next_frame();
            if clock.now().duration_since(start) > self.limit {
                summary.deadline_reached = true;
                break;
            }
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }
            let raw = match event {
                Ok(FrameEvent::Frame(raw)) => raw,
                Ok(FrameEvent::Idle) => continue,
                Ok(FrameEvent::Closed) => break,
                Err(e) => {
                    warn!("Capture read failed: {}", e);
                    summary.anomalies += 1;
                    thread::sleep(READ_ERROR_BACKOFF);
                    continue;
                }
            };
            summary.frames += 1;

            let frame = match Frame::decode(&raw) {
                Ok(frame) => frame,
                Err(e) => {
                    debug!("Skipping undecodable frame: {}", e);
                    summary.anomalies += 1;
                    continue;
                }
            };
            match self.observe(&frame, clock) {
                Some(observation) => {
                    summary.observations += 1;
                    if let Err(e) = self.sink.observation(&observation) {
                        warn!("Failed to emit observation for {}: {}", observation.mac, e);
                    }
                }
                None => summary.discarded += 1,
            }
        }

        info!(
            "Capture window closed: {} frames, {} observations",
            summary.frames, summary.observations
        );
        summary
    }

    fn observe<C: Clock>(&self, frame: &Frame, clock: &C) -> Option<SignalObservation> {
        let header = frame.dot11.as_ref()?;
        let address = self.policy.qualify(header)?;
        let rssi = frame.signal_dbm();
        if rssi == 0 {
            return None;
        }
        debug!(
            "{:?}/{} {} -> {}: {}",
            header.frame_type, header.subtype, address, header.receiver, rssi
        );
        Some(SignalObservation::new(address.to_string(), rssi, clock.wall()))
    }
}
