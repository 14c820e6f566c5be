//! Demonstration of recording and classifying synthetic motion events.
//!
//! This example shows how to:
//! 1. Build a session controller over the default sensors
//! 2. Record events into local dataset files
//! 3. Classify the same events with an in-process model
//! 4. Read the status text and session statistics
//!
//! Run with: cargo run --example replay_demo

use std::sync::Arc;
use std::time::Duration;

use motion_sensor_agent::{
    core::{CollectorSettings, RecordingLabels, SessionController},
    device::{generate_subject_id, DeviceTags},
    model::{ModelCatalog, ModelSpec},
    sensor::{Sample, SensorBus, SensorRegistry, DEVICE_MOTION, DEVICE_ORIENTATION},
    service::{FileCollectorService, LocalPredictionService},
};
use serde_json::json;

const TILT_MODEL: &str = r#"{
    "inputs": ["beta_mean", "gamma_std"],
    "window": 2000,
    "classes": ["flat", "tilted"],
    "scale": {"mean": [0.0, 0.0], "scale": [45.0, 10.0]},
    "linear": {
        "coefficients": [[-2.0, -1.0], [2.0, 1.0]],
        "intercepts": [1.0, -1.0]
    }
}"#;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Motion Sensor Agent - Replay Demo");
    println!("=================================");
    println!();

    let export_dir = std::env::temp_dir().join("motion-sensor-demo");
    let mut models = ModelCatalog::new();
    models.insert(DEVICE_ORIENTATION, ModelSpec::from_json(DEVICE_ORIENTATION, TILT_MODEL)?);

    let device = DeviceTags::from_user_agent(
        "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36",
    );
    println!("Device tags: {:?}", device.to_metadata());

    let bus = SensorBus::new();
    let mut controller = SessionController::new(
        bus.clone(),
        Arc::new(SensorRegistry::device_defaults()),
        Arc::new(FileCollectorService::new(&export_dir)),
        CollectorSettings {
            device,
            ..Default::default()
        },
    )
    .with_predictions(Arc::new(LocalPredictionService::new()), models)
    .with_prediction_interval(Duration::from_millis(250));

    let subject = generate_subject_id();
    println!("Participant: {subject}");
    controller
        .start_recording(RecordingLabels::new(subject, "tilting"))
        .await?;
    controller.start_classifying().await?;
    println!("Status: {}", controller.status().get());
    println!();

    // Simulate one second of events at ~60Hz, tilting the device forward
    let origin = chrono::Utc::now().timestamp_millis() as f64;
    for i in 0..60 {
        let t = origin + i as f64 * 16.7;
        let beta = i as f64 * 1.5;
        bus.publish(Sample::new(
            DEVICE_ORIENTATION,
            t,
            json!({"alpha": 180.0, "beta": beta, "gamma": (i % 7) as f64}),
        ));
        bus.publish(Sample::new(
            DEVICE_MOTION,
            t,
            json!({
                "acceleration": {"x": 0.0, "y": 0.1, "z": null},
                "accelerationIncludingGravity": {"x": 0.0, "y": 9.8, "z": 0.2},
                "rotationRate": {"alpha": 0.0, "beta": 1.5, "gamma": 0.0},
            }),
        ));
        tokio::time::sleep(Duration::from_millis(16)).await;
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    println!("Latest prediction:");
    println!("{}", controller.status().get());
    println!();

    controller.shutdown().await?;
    println!("Datasets written to {}", export_dir.display());
    println!();
    println!("{}", controller.stats().summary());

    Ok(())
}
