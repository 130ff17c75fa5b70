use std::{path::Path, process, sync::Arc};

use thermobee::{
    config::Config,
    core::{
        device::DeviceReader,
        gate::StateGate,
        reading::device_topic,
        scheduler::{ScheduleSettings, Scheduler},
        shutdown::{wait_for_signal, ShutdownCoordinator},
        w1::{self, W1Thermometer},
    },
    logger::LoggerManager,
    print_error,
};
use thermobee_mqtt::MqttManager;
use tracing::{debug, error, info};

fn log_devices_table(devices: &[W1Thermometer], base_topic: &str) {
    let id_width = devices
        .iter()
        .map(|d| d.id().len())
        .max()
        .unwrap_or(10)
        .max("Device".len());
    let address_width = devices
        .iter()
        .map(|d| d.address().len())
        .max()
        .unwrap_or(16)
        .max("Address".len());

    info!(
        "{:<iw$} | {:<aw$} | Topic",
        "Device",
        "Address",
        iw = id_width,
        aw = address_width
    );
    info!(
        "{}-+-{}-+-{}",
        "-".repeat(id_width),
        "-".repeat(address_width),
        "-".repeat(24)
    );

    for device in devices {
        info!(
            "{:<iw$} | {:<aw$} | {}",
            device.id(),
            device.address(),
            device_topic(base_topic, device.address(), devices.len()),
            iw = id_width,
            aw = address_width
        );
    }
}

#[tokio::main]
async fn main() {
    let cfg = Config::new().unwrap_or_else(|e| {
        print_error!("{}", e);
        process::exit(1);
    });

    let logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });
    info!("Starting thermobee version {}...", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", cfg.logger.effective_level());
    debug!("{:#?}", cfg.sensors);

    let devices = w1::discover_configured(
        Path::new(&cfg.sensors.w1_devices_path),
        &cfg.sensors.devices,
    )
    .await
    .unwrap_or_else(|e| {
        error!(error = %e, "Device discovery failed");
        process::exit(1);
    });
    log_devices_table(&devices, &cfg.sensors.topic);

    info!("Starting MQTT client...");
    let (instance, mut kernel) = MqttManager::from_config(cfg.transport.clone())
        .and_then(MqttManager::build_and_start)
        .unwrap_or_else(|e| {
            error!(error = %e, "Failed to build and start MQTT connection");
            process::exit(1);
        });

    let shutdown = ShutdownCoordinator::new();
    let scheduler = Scheduler::new(
        Arc::new(StateGate::new(instance.state_receiver())),
        Arc::new(instance.clone()),
        devices
            .into_iter()
            .map(|d| Arc::new(d) as Arc<dyn DeviceReader>)
            .collect(),
        ScheduleSettings::from(&cfg.sensors),
        shutdown.clone(),
    );
    let scheduler_handle = tokio::spawn(async move { scheduler.run().await });

    let mut kernel_result = None;
    tokio::select! {
        signal = wait_for_signal() => {
            info!(signal, "Received signal, initiating graceful shutdown...");
        }
        result = &mut kernel => {
            error!("MQTT connection kernel stopped unexpectedly");
            kernel_result = Some(result);
        }
    }

    if let Err(e) = shutdown.shutdown(scheduler_handle).await {
        error!(error = %e, "Scheduler task failed");
    }

    instance.shutdown();
    let kernel_result = match kernel_result {
        Some(result) => result,
        None => kernel.await,
    };

    info!("Shutdown complete");
    match kernel_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(error = %e, "MQTT connection failed");
            process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "MQTT connection task panicked");
            process::exit(1);
        }
    }
}
