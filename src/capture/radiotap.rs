// Radiotap capture header parsing

use thiserror::Error;

const FIXED_HEADER_LEN: usize = 8;
const PRESENCE_WORD_LEN: usize = 4;
const PRESENCE_EXT: u32 = 1 << 31;

const FIELD_FLAGS: u32 = 1;
const FIELD_DBM_ANTSIGNAL: u32 = 5;

pub const FLAG_BAD_FCS: u8 = 0x40;

/// (alignment, size) of presence bits 0..=5: TSFT, flags, rate, channel, FHSS, antenna signal.
const FIELD_LAYOUT: [(usize, usize); 6] = [(8, 8), (1, 1), (1, 1), (2, 4), (2, 2), (1, 1)];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RadiotapError {
    #[error("radiotap header truncated")]
    Truncated,

    #[error("unsupported radiotap version {0}")]
    Version(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Radiotap {
    /// Total header length; the 802.11 frame starts at this offset.
    pub length: usize,
    pub flags: Option<u8>,
    pub antenna_signal_dbm: Option<i8>,
}

impl Radiotap {
    /// Fields are aligned to their natural size relative to the start of the
    /// header. The data area begins after the last presence word.
    pub fn parse(bytes: &[u8]) -> Result<Self, RadiotapError> {
        if bytes.len() < FIXED_HEADER_LEN {
            return Err(RadiotapError::Truncated);
        }
        if bytes[0] != 0 {
            return Err(RadiotapError::Version(bytes[0]));
        }
        let length = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
        if length < FIXED_HEADER_LEN || bytes.len() < length {
            return Err(RadiotapError::Truncated);
        }
        let header = &bytes[..length];

        let present = read_u32(header, 4)?;
        let mut offset = FIXED_HEADER_LEN;
        let mut word = present;
        while word & PRESENCE_EXT != 0 {
            word = read_u32(header, offset)?;
            offset += PRESENCE_WORD_LEN;
        }

        let mut radiotap = Radiotap {
            length,
            ..Radiotap::default()
        };
        for (bit, &(align, size)) in FIELD_LAYOUT.iter().enumerate() {
            if present & (1 << bit) == 0 {
                continue;
            }
            offset = offset.next_multiple_of(align);
            let field = header
                .get(offset..offset + size)
                .ok_or(RadiotapError::Truncated)?;
            match bit as u32 {
                FIELD_FLAGS => radiotap.flags = Some(field[0]),
                FIELD_DBM_ANTSIGNAL => radiotap.antenna_signal_dbm = Some(field[0] as i8),
                _ => {}
            }
            offset += size;
        }
        Ok(radiotap)
    }

    pub fn bad_fcs(&self) -> bool {
        self.flags.is_some_and(|f| f & FLAG_BAD_FCS != 0)
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, RadiotapError> {
    let word = bytes
        .get(offset..offset + 4)
        .ok_or(RadiotapError::Truncated)?;
    Ok(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Header with flags, rate, channel and antenna signal present.
    pub(crate) fn header_with_signal(dbm: i8) -> Vec<u8> {
        let present: u32 = (1 << 1) | (1 << 2) | (1 << 3) | (1 << 5);
        let mut h = vec![0x00, 0x00, 0x00, 0x00];
        h.extend_from_slice(&present.to_le_bytes());
        h.push(0x00); // flags
        h.push(0x02); // rate
        h.extend_from_slice(&2412u16.to_le_bytes());
        h.extend_from_slice(&0x00a0u16.to_le_bytes());
        h.push(dbm as u8);
        let len = h.len() as u16;
        h[2..4].copy_from_slice(&len.to_le_bytes());
        h
    }

    #[test]
    fn reads_antenna_signal() {
        let bytes = header_with_signal(-60);
        let rt = Radiotap::parse(&bytes).unwrap();
        assert_eq!(rt.length, bytes.len());
        assert_eq!(rt.antenna_signal_dbm, Some(-60));
        assert_eq!(rt.flags, Some(0));
        assert!(!rt.bad_fcs());
    }

    #[test]
    fn tsft_forces_eight_byte_alignment() {
        // TSFT + antenna signal; TSFT starts at offset 8 which is already aligned.
        let present: u32 = 1 | (1 << 5);
        let mut h = vec![0x00, 0x00, 0x00, 0x00];
        h.extend_from_slice(&present.to_le_bytes());
        h.extend_from_slice(&0x0102030405060708u64.to_le_bytes());
        h.push((-42i8) as u8);
        let len = h.len() as u16;
        h[2..4].copy_from_slice(&len.to_le_bytes());
        assert_eq!(Radiotap::parse(&h).unwrap().antenna_signal_dbm, Some(-42));
    }

    #[test]
    fn extended_presence_words_are_skipped() {
        // Two presence words, then TSFT aligned to 16, then the signal.
        let present: u32 = PRESENCE_EXT | 1 | (1 << 5);
        let mut h = vec![0x00, 0x00, 0x00, 0x00];
        h.extend_from_slice(&present.to_le_bytes());
        h.extend_from_slice(&0u32.to_le_bytes());
        h.extend_from_slice(&[0u8; 4]); // alignment padding
        h.extend_from_slice(&7u64.to_le_bytes());
        h.push((-75i8) as u8);
        let len = h.len() as u16;
        h[2..4].copy_from_slice(&len.to_le_bytes());
        assert_eq!(Radiotap::parse(&h).unwrap().antenna_signal_dbm, Some(-75));
    }

    #[test]
    fn missing_signal_is_none() {
        let present: u32 = 1 << 1;
        let mut h = vec![0x00, 0x00, 0x09, 0x00];
        h.extend_from_slice(&present.to_le_bytes());
        h.push(FLAG_BAD_FCS);
        let rt = Radiotap::parse(&h).unwrap();
        assert_eq!(rt.antenna_signal_dbm, None);
        assert!(rt.bad_fcs());
    }

    #[test]
    fn rejects_malformed_headers() {
        assert_eq!(Radiotap::parse(&[0x00, 0x00]), Err(RadiotapError::Truncated));
        let mut bytes = header_with_signal(-60);
        bytes[0] = 1;
        assert_eq!(Radiotap::parse(&bytes), Err(RadiotapError::Version(1)));
        let bytes = header_with_signal(-60);
        assert_eq!(
            Radiotap::parse(&bytes[..bytes.len() - 1]),
            Err(RadiotapError::Truncated)
        );
    }
}
