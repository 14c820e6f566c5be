//! Static per-sensor configuration.
//!
//! Each supported sensor is described once at startup: which selectors
//! are read from its events and whether it takes part in recording,
//! classification, or both.

use crate::config::SensorSelection;

/// Sensor name for orientation events (compass heading and tilt).
pub const DEVICE_ORIENTATION: &str = "deviceorientation";

/// Sensor name for motion events (accelerometer and gyroscope).
pub const DEVICE_MOTION: &str = "devicemotion";

const ORIENTATION_SELECTORS: &[&str] = &["alpha", "beta", "gamma"];

const MOTION_SELECTORS: &[&str] = &[
    "acceleration.x",
    "acceleration.y",
    "acceleration.z",
    "accelerationIncludingGravity.x",
    "accelerationIncludingGravity.y",
    "accelerationIncludingGravity.z",
    "rotationRate.alpha",
    "rotationRate.beta",
    "rotationRate.gamma",
];

/// What a sensor participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub record: bool,
    pub classify: bool,
}

impl Capabilities {
    pub const RECORD_ONLY: Self = Self {
        record: true,
        classify: false,
    };

    pub const RECORD_AND_CLASSIFY: Self = Self {
        record: true,
        classify: true,
    };
}

/// Immutable description of one sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorDescriptor {
    name: String,
    selectors: Vec<String>,
    capabilities: Capabilities,
}

impl SensorDescriptor {
    pub fn new<I, S>(name: impl Into<String>, selectors: I, capabilities: Capabilities) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            selectors: selectors.into_iter().map(Into::into).collect(),
            capabilities,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn selectors(&self) -> &[String] {
        &self.selectors
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn can_record(&self) -> bool {
        self.capabilities.record
    }

    pub fn can_classify(&self) -> bool {
        self.capabilities.classify
    }
}

/// The set of sensors known to the agent, in a fixed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorRegistry {
    sensors: Vec<SensorDescriptor>,
}

impl SensorRegistry {
    /// Build a registry from descriptors. Later duplicates of a name are ignored.
    pub fn new(descriptors: Vec<SensorDescriptor>) -> Self {
        let mut sensors: Vec<SensorDescriptor> = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if sensors.iter().all(|s| s.name != descriptor.name) {
                sensors.push(descriptor);
            }
        }
        Self { sensors }
    }

    /// Orientation (record + classify) and motion (record only).
    pub fn device_defaults() -> Self {
        Self::new(vec![
            SensorDescriptor::new(
                DEVICE_ORIENTATION,
                ORIENTATION_SELECTORS.iter().copied(),
                Capabilities::RECORD_AND_CLASSIFY,
            ),
            SensorDescriptor::new(
                DEVICE_MOTION,
                MOTION_SELECTORS.iter().copied(),
                Capabilities::RECORD_ONLY,
            ),
        ])
    }

    /// Keep only the sensors enabled in the selection.
    pub fn filtered(&self, selection: &SensorSelection) -> Self {
        Self {
            sensors: self
                .sensors
                .iter()
                .filter(|s| selection.includes(&s.name))
                .cloned()
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SensorDescriptor> {
        self.sensors.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SensorDescriptor> {
        self.sensors.iter()
    }

    pub fn recordable(&self) -> impl Iterator<Item = &SensorDescriptor> {
        self.sensors.iter().filter(|s| s.can_record())
    }

    pub fn classifiable(&self) -> impl Iterator<Item = &SensorDescriptor> {
        self.sensors.iter().filter(|s| s.can_classify())
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

impl Default for SensorRegistry {
    fn default() -> Self {
        Self::device_defaults()
    }
}
