//! Motion Sensor Agent - record and classify device motion and orientation.
//!
//! This library takes raw `deviceorientation` and `devicemotion` events from
//! a device page, records selected fields into labeled datasets, and runs
//! periodic activity classification over the same stream.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Motion Sensor Agent                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌──────────────────────┐    │
//! │  │   Events    │──▶│  SensorBus  │──▶│ Selector + Router    │    │
//! │  │ (HTTP/JSON) │   │ (per sensor)│   │ (present fields only)│    │
//! │  └─────────────┘   └─────────────┘   └──────────────────────┘    │
//! │                                          │            │          │
//! │                                          ▼            ▼          │
//! │                                   ┌────────────┐ ┌────────────┐  │
//! │                                   │ Collectors │ │Classifiers │  │
//! │                                   │ (datasets) │ │ (periodic) │  │
//! │                                   └────────────┘ └────────────┘  │
//! │                                                        │         │
//! │  ┌─────────────┐                                       ▼         │
//! │  │   Session   │                                ┌────────────┐   │
//! │  │    Stats    │                                │   Status   │   │
//! │  └─────────────┘                                └────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use motion_sensor_agent::{
//!     core::{CollectorSettings, RecordingLabels, SessionController},
//!     sensor::{Sample, SensorBus, SensorRegistry},
//!     service::FileCollectorService,
//! };
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = SensorBus::new();
//! let mut controller = SessionController::new(
//!     bus.clone(),
//!     Arc::new(SensorRegistry::device_defaults()),
//!     Arc::new(FileCollectorService::new("datasets")),
//!     CollectorSettings::default(),
//! );
//!
//! controller.start_recording(RecordingLabels::new("1a2b3", "walking")).await?;
//! bus.publish(Sample::new(
//!     "deviceorientation",
//!     1_700_000_000_000.0,
//!     serde_json::json!({"alpha": 10.0, "beta": 2.0, "gamma": -1.0}),
//! ));
//! controller.stop_recording().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod device;
pub mod model;
pub mod sensor;
pub mod service;
pub mod stats;
pub mod status;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{Config, SensorSelection};
pub use core::{RecordingLabels, SessionController, SessionError};
pub use device::{generate_subject_id, DeviceTags};
pub use model::{ModelCatalog, ModelSpec};
pub use sensor::{Sample, SensorBus, SensorRegistry};
pub use service::{Prediction, ServiceError};
pub use stats::{SessionStats, SharedStats};
pub use status::StatusBoard;

#[cfg(feature = "remote")]
pub use service::RemoteCollectorService;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
