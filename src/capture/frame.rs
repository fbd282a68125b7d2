// Layer decomposition of captured frames

use thiserror::Error;

use super::dot11::{Dot11Error, Dot11Header};
use super::radiotap::{Radiotap, RadiotapError};

/// libpcap DLT values for the link types we understand.
const DLT_IEEE802_11: i32 = 105;
const DLT_IEEE802_11_RADIO: i32 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// Radiotap header followed by an 802.11 frame.
    Radiotap,
    /// Bare 802.11 frame.
    Ieee80211,
    Other(i32),
}

impl LinkType {
    pub fn from_dlt(dlt: i32) -> Self {
        match dlt {
            DLT_IEEE802_11_RADIO => LinkType::Radiotap,
            DLT_IEEE802_11 => LinkType::Ieee80211,
            other => LinkType::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub link: LinkType,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error(transparent)]
    Radiotap(#[from] RadiotapError),

    #[error(transparent)]
    Dot11(#[from] Dot11Error),
}

/// The layers recognized in one frame. Either may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Frame {
    pub radio: Option<Radiotap>,
    pub dot11: Option<Dot11Header>,
}

impl Frame {
    pub fn decode(raw: &RawFrame) -> Result<Self, FrameError> {
        match raw.link {
            LinkType::Radiotap => {
                let radio = Radiotap::parse(&raw.data)?;
                // A frame whose checksum failed still yields the radio layer.
                let dot11 = if radio.bad_fcs() {
                    None
                } else {
                    Some(Dot11Header::parse(&raw.data[radio.length..])?)
                };
                Ok(Frame {
                    radio: Some(radio),
                    dot11,
                })
            }
            LinkType::Ieee80211 => Ok(Frame {
                radio: None,
                dot11: Some(Dot11Header::parse(&raw.data)?),
            }),
            LinkType::Other(_) => Ok(Frame::default()),
        }
    }

    /// Antenna signal in dBm, zero when the frame carries none.
    pub fn signal_dbm(&self) -> i32 {
        self.radio
            .and_then(|r| r.antenna_signal_dbm)
            .map(i32::from)
            .unwrap_or(0)
    }
}
