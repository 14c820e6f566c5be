//! Core functionality for the Motion Sensor Agent.
//!
//! This module contains:
//! - Selector resolution over nested sensor records
//! - Routing of resolved fields into collectors and classifiers
//! - Sliding windows and window features for classification
//! - The session controller that ties sensors, services and timers together

pub mod features;
pub mod router;
pub mod selector;
pub mod session;
pub mod window;

// Re-export commonly used types
pub use features::{InputFeature, Statistic};
pub use router::{route_fields, route_sample, truncate_timestamp, FieldFailure, RouteReport};
pub use selector::{lookup, resolve, ResolvedFields, PATH_DELIMITER};
pub use session::{
    CollectorSettings, RecordingLabels, SessionController, SessionError, SessionKind,
    DEFAULT_PREDICTION_INTERVAL,
};
pub use window::SlidingWindow;
