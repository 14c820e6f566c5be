//! Seams to the dataset collection and prediction services.
//!
//! Sessions only talk to these traits. A collection service opens one
//! [`DatasetCollector`] per sensor; a prediction service opens one
//! [`Classifier`] per classify-capable sensor. Both handles ingest
//! `(timestamp, field, value)` triples through [`DataSink`].

pub mod file;
pub mod predictor;
#[cfg(feature = "remote")]
pub mod remote;

use crate::config::Config;
use crate::model::ModelSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

pub use file::FileCollectorService;
pub use predictor::{LocalPredictionService, WindowedClassifier};
#[cfg(feature = "remote")]
pub use remote::{RemoteCollector, RemoteCollectorService};

/// Pick the collection service for a run.
///
/// Datasets go to the configured backend when `remote` is set, and to
/// JSON files under the export directory otherwise.
pub fn collector_service(
    config: &Config,
    remote: bool,
) -> Result<Arc<dyn CollectorService>, ServiceError> {
    if !remote {
        return Ok(Arc::new(FileCollectorService::new(config.export_path.clone())));
    }

    #[cfg(feature = "remote")]
    {
        Ok(Arc::new(RemoteCollectorService::new()?))
    }
    #[cfg(not(feature = "remote"))]
    {
        Err(ServiceError::Unavailable(
            "remote collection requires the remote feature".to_string(),
        ))
    }
}

/// Anything that accepts timestamped field values.
#[async_trait]
pub trait DataSink: Send + Sync {
    /// Ingest one value. `timestamp` is milliseconds since the Unix epoch.
    async fn add_data_point(
        &self,
        timestamp: i64,
        field: &str,
        value: &Value,
    ) -> Result<(), ServiceError>;
}

/// Handle that persists values into a named dataset.
#[async_trait]
pub trait DatasetCollector: DataSink {
    /// Flush buffered values and close the dataset.
    async fn on_complete(&self) -> Result<(), ServiceError>;
}

/// Handle that classifies the values it has been fed.
#[async_trait]
pub trait Classifier: DataSink {
    /// Score the current window.
    async fn predict(&self) -> Result<Prediction, ServiceError>;
}

/// Opens dataset collectors.
#[async_trait]
pub trait CollectorService: Send + Sync {
    async fn open_collector(
        &self,
        spec: &CollectorSpec,
    ) -> Result<Arc<dyn DatasetCollector>, ServiceError>;
}

/// Opens classifiers from a loaded model.
#[async_trait]
pub trait PredictionService: Send + Sync {
    async fn open_classifier(
        &self,
        model: Arc<ModelSpec>,
    ) -> Result<Arc<dyn Classifier>, ServiceError>;
}

/// Everything needed to open a collector for one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorSpec {
    /// Backend base URL
    pub backend_url: String,
    /// Device API key
    pub api_key: String,
    /// Dataset name (the sensor name)
    pub dataset: String,
    /// Timestamps come from the device events rather than the backend
    pub external_timestamps: bool,
    /// Time series names (the sensor's selectors)
    pub fields: Vec<String>,
    /// Free-form metadata tags
    pub metadata: BTreeMap<String, String>,
    /// Dataset label, e.g. `activity_walking`
    pub label: String,
}

impl CollectorSpec {
    /// Split the dataset label into labeling name and label name.
    ///
    /// `activity_walking` becomes `("activity", "walking")`; a label
    /// without an underscore is its own labeling with an empty label.
    pub fn labeling(&self) -> (&str, &str) {
        self.label.split_once('_').unwrap_or((self.label.as_str(), ""))
    }
}

/// One class and its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScore {
    pub class: String,
    pub score: f64,
}

/// Output of a classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Highest scoring class
    pub prediction: String,
    /// Every class with its score, in model order
    pub scores: Vec<ClassScore>,
    /// Timestamp of the newest value in the scored window
    pub timestamp: i64,
}

impl Prediction {
    /// Render for the status display.
    pub fn render(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.prediction.clone())
    }
}

/// Service error types.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// The service could not be reached or refused to open a handle
    Unavailable(String),
    /// Network/HTTP error
    Network(String),
    /// Server returned an error response
    Server { status: u16, message: String },
    /// A value was refused
    Rejected { field: String, reason: String },
    /// The handle was already completed
    Closed,
    /// Not enough data to predict
    InsufficientData(String),
    /// Serialization error
    Serialization(String),
    /// Local IO error
    Io(String),
    /// Points were dropped after repeated failed uploads
    Incomplete { lost: usize, cause: String },
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Unavailable(msg) => write!(f, "Service unavailable: {msg}"),
            ServiceError::Network(msg) => write!(f, "Service network error: {msg}"),
            ServiceError::Server { status, message } => {
                write!(f, "Service server error ({status}): {message}")
            }
            ServiceError::Rejected { field, reason } => {
                write!(f, "Value for '{field}' rejected: {reason}")
            }
            ServiceError::Closed => write!(f, "Handle is already closed"),
            ServiceError::InsufficientData(msg) => write!(f, "Insufficient data: {msg}"),
            ServiceError::Serialization(msg) => write!(f, "Service serialization error: {msg}"),
            ServiceError::Io(msg) => write!(f, "Service IO error: {msg}"),
            ServiceError::Incomplete { lost, cause } => {
                write!(f, "Dataset incomplete, {lost} points dropped: {cause}")
            }
        }
    }
}

impl std::error::Error for ServiceError {}
