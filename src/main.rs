// Dual-radio proximity scanner
// Reports Wi-Fi transmitters and inspects nearby BLE peripherals

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};
use tokio::signal;

mod bluetooth;
mod capture;
mod cli;
mod config;
mod error;
mod mqtt;
mod observation;
mod sink;

use crate::bluetooth::{BluezAdapter, Orchestrator, OrchestratorOptions};
use crate::capture::{CaptureFilter, LiveOptions, PcapBackend};
use crate::cli::Cli;
use crate::config::{load_config, BluetoothConfig};
use crate::mqtt::MqttSink;
use crate::sink::{LogSink, ObservationSink};

async fn run_bluetooth(
    config: BluetoothConfig,
    sink: Arc<dyn ObservationSink>,
) -> anyhow::Result<()> {
    let adapter = BluezAdapter::new(config.adapter.as_deref())
        .await
        .context("Failed to open BLE adapter")?;

    info!("BLE adapter initialized: {}", adapter.name());

    Orchestrator::new(adapter, OrchestratorOptions::from(&config), sink)
        .run()
        .await
        .context("BLE orchestrator stopped")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    info!("Starting proximity scanner");

    let cli = Cli::parse();
    let mut config =
        load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply(&mut config).context("Invalid command-line override")?;

    info!("Configuration loaded successfully");

    let sink: Arc<dyn ObservationSink> = match config.output.mqtt.clone() {
        Some(settings) => {
            let mqtt_sink = MqttSink::new(settings);
            info!("Publishing to MQTT broker at {}", mqtt_sink.host());
            Arc::new(mqtt_sink)
        }
        None => Arc::new(LogSink),
    };

    let filter = CaptureFilter::new(
        config.capture.window(),
        config.capture.address_policy,
        sink.clone(),
    );
    let shutdown = filter.shutdown_handle();
    let options = LiveOptions::from(&config.capture);
    let capture = tokio::task::spawn_blocking(move || filter.run(&PcapBackend, &options));

    let ble = config.bluetooth.enabled.then(|| {
        let bluetooth = config.bluetooth.clone();
        tokio::spawn(run_bluetooth(bluetooth, sink.clone()))
    });

    let supervise = async {
        match capture.await {
            Ok(Ok(summary)) => info!(
                "Capture window {}: {} frames, {} observations, {} discarded, {} anomalies",
                if summary.deadline_reached { "expired" } else { "ended early" },
                summary.frames,
                summary.observations,
                summary.discarded,
                summary.anomalies
            ),
            Ok(Err(e)) => error!("Capture failed: {}", e),
            Err(e) => error!("Capture task panicked: {}", e),
        }

        // Wi-Fi capture is a single window, BLE keeps cycling until stopped.
        if let Some(ble) = ble {
            match ble.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("{:#}", e),
                Err(e) => error!("BLE task panicked: {}", e),
            }
        }
    };

    tokio::select! {
        _ = supervise => {}
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down...");
        }
    }
    shutdown.store(true, Ordering::Relaxed);

    Ok(())
}
