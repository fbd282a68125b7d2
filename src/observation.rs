// Signal observations emitted by the capture filter

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One qualifying frame: who transmitted it and how loud it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalObservation {
    /// Transmitter address, `aa:bb:cc:dd:ee:ff`.
    pub mac: String,
    /// Antenna signal in dBm.
    pub rssi: i32,
    pub timestamp: DateTime<Utc>,
}

impl SignalObservation {
    pub fn new(mac: impl Into<String>, rssi: i32, timestamp: DateTime<Utc>) -> Self {
        SignalObservation {
            mac: mac.into(),
            rssi,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_reference_field_names() {
        let ts = DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let obs = SignalObservation::new("aa:bb:cc:dd:ee:ff", -60, ts);
        let value = serde_json::to_value(&obs).unwrap();
        assert_eq!(value["mac"], "aa:bb:cc:dd:ee:ff");
        assert_eq!(value["rssi"], -60);
        assert_eq!(value["timestamp"], "2024-03-01T12:00:00Z");
    }
}
