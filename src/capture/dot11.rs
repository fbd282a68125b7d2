// IEEE 802.11 MAC header decoding

use std::fmt;

use thiserror::Error;

const FRAME_CONTROL_LEN: usize = 2;
const DURATION_LEN: usize = 2;
const ADDR_LEN: usize = 6;
const ADDR1_OFFSET: usize = FRAME_CONTROL_LEN + DURATION_LEN;
const ADDR2_OFFSET: usize = ADDR1_OFFSET + ADDR_LEN;

const CONTROL_SUBTYPE_CTS: u8 = 0x0c;
const CONTROL_SUBTYPE_ACK: u8 = 0x0d;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Dot11Error {
    #[error("802.11 header truncated: {len} bytes")]
    Truncated { len: usize },

    #[error("unsupported 802.11 protocol version {0}")]
    Version(u8),
}

/// A 48-bit IEEE MAC address.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    fn read(bytes: &[u8], offset: usize) -> Option<Self> {
        let slice = bytes.get(offset..offset + ADDR_LEN)?;
        let mut addr = [0u8; 6];
        addr.copy_from_slice(slice);
        Some(MacAddr(addr))
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddr({self})")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Management,
    Control,
    Data,
    Extension,
}

impl FrameType {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => FrameType::Management,
            1 => FrameType::Control,
            2 => FrameType::Data,
            _ => FrameType::Extension,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dot11Header {
    pub frame_type: FrameType,
    pub subtype: u8,
    pub receiver: MacAddr,
    pub transmitter: Option<MacAddr>,
}

impl Dot11Header {
    /// Address 1 is the receiver and Address 2 the transmitter. CTS and ACK
    /// carry a single address and so have no transmitter.
    pub fn parse(bytes: &[u8]) -> Result<Self, Dot11Error> {
        let frame_control = *bytes.first().ok_or(Dot11Error::Truncated { len: 0 })?;
        let version = frame_control & 0x03;
        if version != 0 {
            return Err(Dot11Error::Version(version));
        }
        let frame_type = FrameType::from_bits(frame_control >> 2);
        let subtype = frame_control >> 4;

        let receiver =
            MacAddr::read(bytes, ADDR1_OFFSET).ok_or(Dot11Error::Truncated { len: bytes.len() })?;

        let transmitter = match frame_type {
            FrameType::Control if matches!(subtype, CONTROL_SUBTYPE_CTS | CONTROL_SUBTYPE_ACK) => {
                None
            }
            FrameType::Extension => None,
            FrameType::Control => MacAddr::read(bytes, ADDR2_OFFSET),
            FrameType::Management | FrameType::Data => Some(
                MacAddr::read(bytes, ADDR2_OFFSET)
                    .ok_or(Dot11Error::Truncated { len: bytes.len() })?,
            ),
        };

        Ok(Dot11Header {
            frame_type,
            subtype,
            receiver,
            transmitter,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Management probe request from `tx` to the broadcast address.
    pub(crate) fn probe_request(tx: [u8; 6]) -> Vec<u8> {
        let mut frame = vec![0x40, 0x00, 0x00, 0x00];
        frame.extend_from_slice(&[0xff; 6]);
        frame.extend_from_slice(&tx);
        frame.extend_from_slice(&[0xff; 6]);
        frame.extend_from_slice(&[0x10, 0x00]);
        frame
    }

    /// Data frame from `tx` to `rx`.
    pub(crate) fn data_frame(tx: [u8; 6], rx: [u8; 6]) -> Vec<u8> {
        let mut frame = vec![0x08, 0x01, 0x00, 0x00];
        frame.extend_from_slice(&rx);
        frame.extend_from_slice(&tx);
        frame.extend_from_slice(&rx);
        frame.extend_from_slice(&[0x20, 0x00]);
        frame
    }

    #[test]
    fn mac_display() {
        let mac = MacAddr([0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]);
        assert_eq!(mac.to_string(), "00:1a:2b:3c:4d:5e");
        assert!(MacAddr::BROADCAST.is_broadcast());
        assert!(!mac.is_broadcast());
    }

    #[test]
    fn probe_request_addresses() {
        let tx = [0x02, 0x11, 0x22, 0x33, 0x44, 0x55];
        let header = Dot11Header::parse(&probe_request(tx)).unwrap();
        assert_eq!(header.frame_type, FrameType::Management);
        assert_eq!(header.subtype, 0x04);
        assert!(header.receiver.is_broadcast());
        assert_eq!(header.transmitter, Some(MacAddr(tx)));
    }

    #[test]
    fn data_frame_addresses() {
        let tx = [0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f];
        let rx = [0x10, 0x20, 0x30, 0x40, 0x50, 0x60];
        let header = Dot11Header::parse(&data_frame(tx, rx)).unwrap();
        assert_eq!(header.frame_type, FrameType::Data);
        assert_eq!(header.receiver, MacAddr(rx));
        assert_eq!(header.transmitter, Some(MacAddr(tx)));
    }

    #[test]
    fn ack_has_no_transmitter() {
        let mut frame = vec![0xd4, 0x00, 0x00, 0x00];
        frame.extend_from_slice(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        let header = Dot11Header::parse(&frame).unwrap();
        assert_eq!(header.frame_type, FrameType::Control);
        assert_eq!(header.transmitter, None);
    }

    #[test]
    fn rts_carries_transmitter() {
        let mut frame = vec![0xb4, 0x00, 0x00, 0x00];
        frame.extend_from_slice(&[0x01; 6]);
        frame.extend_from_slice(&[0x02; 6]);
        let header = Dot11Header::parse(&frame).unwrap();
        assert_eq!(header.transmitter, Some(MacAddr([0x02; 6])));
    }

    #[test]
    fn truncated_headers_are_rejected() {
        assert_eq!(Dot11Header::parse(&[]), Err(Dot11Error::Truncated { len: 0 }));
        assert!(matches!(
            Dot11Header::parse(&[0x40, 0x00, 0x00, 0x00, 0xff, 0xff]),
            Err(Dot11Error::Truncated { .. })
        ));
        let mut short = probe_request([0x01; 6]);
        short.truncate(12);
        assert!(matches!(Dot11Header::parse(&short), Err(Dot11Error::Truncated { .. })));
    }

    #[test]
    fn nonzero_version_is_rejected() {
        let mut frame = probe_request([0x01; 6]);
        frame[0] |= 0x01;
        assert_eq!(Dot11Header::parse(&frame), Err(Dot11Error::Version(1)));
    }
}
