// Live capture through libpcap

use log::debug;
use pcap::{Active, Capture};

use super::frame::{LinkType, RawFrame};
use super::{CaptureBackend, CaptureSource, FrameEvent, LiveOptions};
use crate::error::CaptureError;

#[derive(Debug, Default, Clone, Copy)]
pub struct PcapBackend;

impl CaptureBackend for PcapBackend {
    type Source = PcapSource;

    fn open_live(&self, options: &LiveOptions) -> Result<PcapSource, CaptureError> {
        let open_error = |e: pcap::Error| CaptureError::Open {
            interface: options.interface.clone(),
            reason: e.to_string(),
        };

        let mut inactive = Capture::from_device(options.interface.as_str())
            .map_err(open_error)?
            .snaplen(options.snap_len)
            .promisc(options.promiscuous)
            .immediate_mode(true);
        if let Some(timeout) = options.read_timeout {
            inactive = inactive.timeout(timeout.as_millis().try_into().unwrap_or(i32::MAX));
        }
        let capture = inactive.open().map_err(open_error)?;

        let link = LinkType::from_dlt(capture.get_datalink().0);
        debug!("Opened {} with link type {:?}", options.interface, link);
        Ok(PcapSource {
            capture: Some(capture),
            link,
        })
    }
}

pub struct PcapSource {
    capture: Option<Capture<Active>>,
    link: LinkType,
}

impl CaptureSource for PcapSource {
    fn next_frame(&mut self) -> Result<FrameEvent, CaptureError> {
        let Some(capture) = self.capture.as_mut() else {
            return Ok(FrameEvent::Closed);
        };
        match capture.next_packet() {
            Ok(packet) => Ok(FrameEvent::Frame(RawFrame {
                link: self.link,
                data: packet.data.to_vec(),
            })),
            Err(pcap::Error::TimeoutExpired) => Ok(FrameEvent::Idle),
            Err(pcap::Error::NoMorePackets) => Ok(FrameEvent::Closed),
            Err(e) => Err(CaptureError::Read(e.to_string())),
        }
    }

    fn close(&mut self) {
        if self.capture.take().is_some() {
            debug!("Capture handle closed");
        }
    }
}
