// Output surface for observations and inspection reports

use log::info;

use crate::bluetooth::InspectionReport;
use crate::error::SinkError;
use crate::observation::SignalObservation;

/// Destination for everything the scanner observes.
///
/// Both subsystems call into the sink from their own threads, and the capture
/// filter calls it from a blocking thread, so implementations must not await.
pub trait ObservationSink: Send + Sync {
    fn observation(&self, observation: &SignalObservation) -> Result<(), SinkError>;

    fn inspection(&self, report: &InspectionReport) -> Result<(), SinkError>;
}

/// Writes each record as a JSON line through the logger.
#[derive(Debug, Default)]
pub struct LogSink;

impl ObservationSink for LogSink {
    fn observation(&self, observation: &SignalObservation) -> Result<(), SinkError> {
        info!(target: "proxscan::wifi", "{}", serde_json::to_string(observation)?);
        Ok(())
    }

    fn inspection(&self, report: &InspectionReport) -> Result<(), SinkError> {
        info!(target: "proxscan::ble", "{}", serde_json::to_string(report)?);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use parking_lot::Mutex;

    use super::*;

    /// Keeps every record in memory for assertions.
    #[derive(Default)]
    pub struct MemorySink {
        pub observations: Mutex<Vec<SignalObservation>>,
        pub reports: Mutex<Vec<InspectionReport>>,
    }

    impl ObservationSink for MemorySink {
        fn observation(&self, observation: &SignalObservation) -> Result<(), SinkError> {
            self.observations.lock().push(observation.clone());
            Ok(())
        }

        fn inspection(&self, report: &InspectionReport) -> Result<(), SinkError> {
            self.reports.lock().push(report.clone());
            Ok(())
        }
    }
}
