//! Sensor events: the raw sample type, the static sensor registry and
//! the in-process event bus that sessions subscribe to.

pub mod bus;
pub mod registry;
pub mod types;

// Re-export commonly used types
pub use bus::{SensorBus, Subscription, SubscriptionId};
pub use registry::{Capabilities, SensorDescriptor, SensorRegistry, DEVICE_MOTION, DEVICE_ORIENTATION};
pub use types::{Sample, SampleError};
