//! HTTP dataset collector for an edge-ml style backend.
//!
//! Opening a collector registers an incremental dataset and returns its
//! key. Data points are buffered and uploaded in batches once the buffer
//! reaches the upload threshold, and whatever is left is uploaded when the
//! collector completes.
//!
//! A failed batch stays buffered and is retried once another threshold's
//! worth of points has arrived, so an unreachable backend costs one request
//! per batch rather than one per point. The buffer holds at most
//! [`MAX_PENDING_BATCHES`] batches; older points beyond that are dropped and
//! the loss is reported when the collector completes.

use crate::service::{CollectorService, CollectorSpec, DataSink, DatasetCollector, ServiceError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Points buffered before an upload is triggered.
pub const DEFAULT_UPLOAD_THRESHOLD: usize = 1000;

/// Batches kept while the backend keeps failing.
pub const MAX_PENDING_BATCHES: usize = 10;

const INIT_PATH: &str = "/api/deviceapi/initDatasetIncrement";
const BATCH_PATH: &str = "/api/deviceapi/addDatasetIncrementBatch";

/// Request body that opens an incremental dataset.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitRequest<'a> {
    device_api_key: &'a str,
    name: &'a str,
    use_device_time: bool,
    time_series: &'a [String],
    meta_data: &'a BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitResponse {
    dataset_key: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Labeling {
    labeling_name: String,
    label_name: String,
}

#[derive(Debug, Clone, Serialize)]
struct SeriesBatch {
    name: String,
    data: Vec<(i64, f64)>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchRequest<'a> {
    dataset_key: &'a str,
    data: Vec<SeriesBatch>,
    labeling: &'a Labeling,
}

/// Opens [`RemoteCollector`]s against the backend named in each spec.
#[derive(Clone)]
pub struct RemoteCollectorService {
    client: reqwest::Client,
    upload_threshold: usize,
}

impl RemoteCollectorService {
    pub fn new() -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ServiceError::Unavailable(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            upload_threshold: DEFAULT_UPLOAD_THRESHOLD,
        })
    }

    /// Upload after this many buffered points.
    pub fn with_upload_threshold(mut self, threshold: usize) -> Self {
        self.upload_threshold = threshold.max(1);
        self
    }
}

#[async_trait]
impl CollectorService for RemoteCollectorService {
    async fn open_collector(
        &self,
        spec: &CollectorSpec,
    ) -> Result<Arc<dyn DatasetCollector>, ServiceError> {
        let collector = RemoteCollector::open(self.client.clone(), spec, self.upload_threshold).await?;
        Ok(Arc::new(collector))
    }
}

#[derive(Default)]
struct Buffer {
    points: VecDeque<(i64, String, f64)>,
    /// Points added since the last upload attempt
    since_attempt: usize,
    /// Points dropped because the buffer was full
    lost: usize,
    last_error: Option<ServiceError>,
    closed: bool,
}

/// Collector bound to one remote dataset.
pub struct RemoteCollector {
    client: reqwest::Client,
    base_url: String,
    dataset_key: String,
    labeling: Labeling,
    upload_threshold: usize,
    buffer: Mutex<Buffer>,
}

impl RemoteCollector {
    /// Register the dataset with the backend.
    pub async fn open(
        client: reqwest::Client,
        spec: &CollectorSpec,
        upload_threshold: usize,
    ) -> Result<Self, ServiceError> {
        let base_url = spec.backend_url.trim_end_matches('/').to_string();
        let body = InitRequest {
            device_api_key: &spec.api_key,
            name: &spec.dataset,
            use_device_time: !spec.external_timestamps,
            time_series: &spec.fields,
            meta_data: &spec.metadata,
        };

        let response = client
            .post(format!("{base_url}{INIT_PATH}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ServiceError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let init: InitResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Serialization(e.to_string()))?;

        let (labeling_name, label_name) = spec.labeling();
        tracing::debug!(dataset = %spec.dataset, key = %init.dataset_key, "remote dataset opened");

        Ok(Self {
            client,
            base_url,
            dataset_key: init.dataset_key,
            labeling: Labeling {
                labeling_name: labeling_name.to_string(),
                label_name: label_name.to_string(),
            },
            upload_threshold: upload_threshold.max(1),
            buffer: Mutex::new(Buffer::default()),
        })
    }

    pub fn dataset_key(&self) -> &str {
        &self.dataset_key
    }

    /// Upload `points` as one batch, grouped by series.
    async fn upload(&self, points: &[(i64, String, f64)]) -> Result<(), ServiceError> {
        if points.is_empty() {
            return Ok(());
        }

        let mut grouped: BTreeMap<String, Vec<(i64, f64)>> = BTreeMap::new();
        for (timestamp, field, value) in points {
            grouped
                .entry(field.clone())
                .or_default()
                .push((*timestamp, *value));
        }
        let data = grouped
            .into_iter()
            .map(|(name, data)| SeriesBatch { name, data })
            .collect();

        let body = BatchRequest {
            dataset_key: &self.dataset_key,
            data,
            labeling: &self.labeling,
        };

        let response = self
            .client
            .post(format!("{}{BATCH_PATH}", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ServiceError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DataSink for RemoteCollector {
    /// Buffer one point. Upload failures never reject the point; they are
    /// reported by [`DatasetCollector::on_complete`].
    async fn add_data_point(
        &self,
        timestamp: i64,
        field: &str,
        value: &Value,
    ) -> Result<(), ServiceError> {
        let number = value.as_f64().ok_or_else(|| ServiceError::Rejected {
            field: field.to_string(),
            reason: format!("expected a number, got {value}"),
        })?;

        let mut buffer = self.buffer.lock().await;
        if buffer.closed {
            return Err(ServiceError::Closed);
        }
        if buffer.points.len() >= self.upload_threshold * MAX_PENDING_BATCHES {
            buffer.points.pop_front();
            buffer.lost += 1;
        }
        buffer.points.push_back((timestamp, field.to_string(), number));
        buffer.since_attempt += 1;

        if buffer.since_attempt < self.upload_threshold {
            return Ok(());
        }
        buffer.since_attempt = 0;

        // Lock is held across the upload so batches leave in order.
        let result = self.upload(buffer.points.make_contiguous()).await;
        match result {
            Ok(()) => buffer.points.clear(),
            Err(e) => {
                tracing::warn!(
                    key = %self.dataset_key,
                    pending = buffer.points.len(),
                    "batch upload failed: {e}"
                );
                buffer.last_error = Some(e);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DatasetCollector for RemoteCollector {
    async fn on_complete(&self) -> Result<(), ServiceError> {
        let mut buffer = self.buffer.lock().await;
        if buffer.closed {
            return Err(ServiceError::Closed);
        }
        buffer.closed = true;

        let mut points = std::mem::take(&mut buffer.points);
        self.upload(points.make_contiguous()).await?;

        if buffer.lost > 0 {
            let cause = buffer
                .last_error
                .take()
                .map(|e| e.to_string())
                .unwrap_or_default();
            return Err(ServiceError::Incomplete {
                lost: buffer.lost,
                cause,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_request_shape() {
        let fields = vec!["alpha".to_string()];
        let mut metadata = BTreeMap::new();
        metadata.insert("browser".to_string(), "Safari".to_string());

        let body = InitRequest {
            device_api_key: "key",
            name: "deviceorientation",
            use_device_time: false,
            time_series: &fields,
            meta_data: &metadata,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["deviceApiKey"], "key");
        assert_eq!(json["useDeviceTime"], false);
        assert_eq!(json["timeSeries"][0], "alpha");
        assert_eq!(json["metaData"]["browser"], "Safari");
    }

    #[test]
    fn test_batch_request_shape() {
        let labeling = Labeling {
            labeling_name: "activity".to_string(),
            label_name: "walking".to_string(),
        };
        let body = BatchRequest {
            dataset_key: "abc",
            data: vec![SeriesBatch {
                name: "alpha".to_string(),
                data: vec![(10, 1.5)],
            }],
            labeling: &labeling,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["datasetKey"], "abc");
        assert_eq!(json["data"][0]["data"][0][0], 10);
        assert_eq!(json["labeling"]["labelingName"], "activity");
        assert_eq!(json["labeling"]["labelName"], "walking");
    }
}
