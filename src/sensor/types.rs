//! Raw sensor sample types.
//!
//! A sample is whatever the device reported for one event, kept as a
//! structured JSON record so selectors can address nested fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event delivered by the platform's sensor subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Sensor (event type) name, e.g. `devicemotion`
    pub sensor: String,
    /// Absolute event time in milliseconds since the Unix epoch
    pub timestamp: f64,
    /// The event record itself
    pub data: Value,
}

impl Sample {
    /// Create a sample from its parts.
    pub fn new(sensor: impl Into<String>, timestamp: f64, data: Value) -> Self {
        Self {
            sensor: sensor.into(),
            timestamp,
            data,
        }
    }

    /// Build a sample from a browser-style event object.
    ///
    /// The event must carry a `type` string and a numeric `timeStamp`
    /// (milliseconds relative to `timeOrigin`). `timeOrigin` is optional
    /// and defaults to zero, in which case `timeStamp` is taken as absolute.
    pub fn from_event(event: Value) -> Result<Self, SampleError> {
        let fields = event.as_object().ok_or(SampleError::NotAnObject)?;

        let sensor = fields
            .get("type")
            .and_then(Value::as_str)
            .ok_or(SampleError::MissingType)?
            .to_string();

        let time_stamp = fields
            .get("timeStamp")
            .and_then(Value::as_f64)
            .ok_or(SampleError::MissingTimestamp)?;
        let time_origin = match fields.get("timeOrigin") {
            None | Some(Value::Null) => 0.0,
            Some(v) => v.as_f64().ok_or(SampleError::InvalidTimeOrigin)?,
        };

        let timestamp = time_stamp + time_origin;
        if !timestamp.is_finite() {
            return Err(SampleError::InvalidTimestamp(timestamp));
        }

        Ok(Self {
            sensor,
            timestamp,
            data: event,
        })
    }
}

/// Errors raised while decoding a raw event.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleError {
    NotAnObject,
    MissingType,
    MissingTimestamp,
    InvalidTimeOrigin,
    InvalidTimestamp(f64),
}

impl std::fmt::Display for SampleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleError::NotAnObject => write!(f, "Event is not a JSON object"),
            SampleError::MissingType => write!(f, "Event has no 'type' string"),
            SampleError::MissingTimestamp => write!(f, "Event has no numeric 'timeStamp'"),
            SampleError::InvalidTimeOrigin => write!(f, "Event 'timeOrigin' is not a number"),
            SampleError::InvalidTimestamp(ts) => write!(f, "Event timestamp is not finite: {ts}"),
        }
    }
}

impl std::error::Error for SampleError {}
