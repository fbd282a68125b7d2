// MQTT output sink using rumqttc

use std::time::Duration;

use log::{debug, info, warn};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};

use crate::bluetooth::InspectionReport;
use crate::config::MqttConfig;
use crate::error::SinkError;
use crate::observation::SignalObservation;
use crate::sink::ObservationSink;

const CLIENT_ID: &str = "proxscan";
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

pub struct MqttSink {
    client: AsyncClient,
    config: MqttConfig,
}

impl MqttSink {
    /// Connect to the broker. Must be called from within a tokio runtime.
    pub fn new(config: MqttConfig) -> Self {
        let mut mqttoptions = MqttOptions::new(CLIENT_ID, &config.host, config.port);
        mqttoptions.set_keep_alive(Duration::from_secs(30));

        if let Some(username) = &config.username {
            mqttoptions.set_credentials(username, config.password.as_deref().unwrap_or(""));
        }

        info!("Connecting to MQTT broker: {}:{}", config.host, config.port);
        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 256);

        // The event loop drives the connection; polling again after an error reconnects.
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        info!("MQTT Connected");
                    }
                    Ok(notification) => {
                        debug!("MQTT event: {:?}", notification);
                    }
                    Err(e) => {
                        warn!("MQTT event loop error: {:?}", e);
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        });

        MqttSink { client, config }
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    fn topic(&self, medium: &str, id: &str) -> String {
        format!("{}/{}/{}", self.config.topic_prefix, medium, id.replace(':', ""))
    }

    fn publish(&self, topic: String, payload: Vec<u8>) -> Result<(), SinkError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| SinkError::Publish(e.to_string()))
    }
}

impl ObservationSink for MqttSink {
    fn observation(&self, observation: &SignalObservation) -> Result<(), SinkError> {
        let payload = serde_json::to_vec(observation)?;
        self.publish(self.topic("wifi", &observation.mac), payload)
    }

    fn inspection(&self, report: &InspectionReport) -> Result<(), SinkError> {
        let payload = serde_json::to_vec(report)?;
        self.publish(self.topic("ble", &report.peripheral), payload)
    }
}
