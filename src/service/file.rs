//! Local dataset collector.
//!
//! Buffers every data point in memory and writes one JSON file per
//! dataset when the collector is completed.

use crate::service::{CollectorService, CollectorSpec, DataSink, DatasetCollector, ServiceError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Writes completed datasets under a directory.
#[derive(Debug, Clone)]
pub struct FileCollectorService {
    export_dir: PathBuf,
}

impl FileCollectorService {
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
        }
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }
}

#[async_trait]
impl CollectorService for FileCollectorService {
    async fn open_collector(
        &self,
        spec: &CollectorSpec,
    ) -> Result<Arc<dyn DatasetCollector>, ServiceError> {
        tokio::fs::create_dir_all(&self.export_dir)
            .await
            .map_err(|e| ServiceError::Unavailable(format!("{}: {e}", self.export_dir.display())))?;

        let started_at = Utc::now();
        let file_name = format!(
            "{}_{}_{}_{}.json",
            sanitize(&spec.dataset),
            sanitize(&spec.label),
            started_at.format("%Y%m%d_%H%M%S"),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );

        Ok(Arc::new(FileCollector {
            path: self.export_dir.join(file_name),
            spec: spec.clone(),
            started_at,
            points: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Keep file names portable.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect()
}

/// Collector that writes its dataset on completion.
pub struct FileCollector {
    path: PathBuf,
    spec: CollectorSpec,
    started_at: DateTime<Utc>,
    points: Mutex<Vec<(i64, String, Value)>>,
    closed: AtomicBool,
}

impl FileCollector {
    /// Where the dataset will be written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn build_file(&self) -> DatasetFile {
        let points = self.points.lock().unwrap_or_else(|p| p.into_inner());

        let mut series: BTreeMap<String, Vec<(i64, Value)>> = self
            .spec
            .fields
            .iter()
            .map(|f| (f.clone(), Vec::new()))
            .collect();
        for (timestamp, field, value) in points.iter() {
            series
                .entry(field.clone())
                .or_default()
                .push((*timestamp, value.clone()));
        }

        let (labeling, label) = self.spec.labeling();
        DatasetFile {
            dataset: self.spec.dataset.clone(),
            labeling: labeling.to_string(),
            label: label.to_string(),
            metadata: self.spec.metadata.clone(),
            external_timestamps: self.spec.external_timestamps,
            recorded_on: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            started_at: self.started_at,
            completed_at: Utc::now(),
            point_count: points.len(),
            series,
        }
    }
}

#[async_trait]
impl DataSink for FileCollector {
    async fn add_data_point(
        &self,
        timestamp: i64,
        field: &str,
        value: &Value,
    ) -> Result<(), ServiceError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ServiceError::Closed);
        }
        self.points
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((timestamp, field.to_string(), value.clone()));
        Ok(())
    }
}

#[async_trait]
impl DatasetCollector for FileCollector {
    async fn on_complete(&self) -> Result<(), ServiceError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::Closed);
        }

        let file = self.build_file();
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| ServiceError::Serialization(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| ServiceError::Io(format!("{}: {e}", self.path.display())))?;

        tracing::info!(
            dataset = %file.dataset,
            points = file.point_count,
            path = %self.path.display(),
            "dataset written"
        );
        Ok(())
    }
}

/// On-disk dataset format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetFile {
    pub dataset: String,
    pub labeling: String,
    pub label: String,
    pub metadata: BTreeMap<String, String>,
    pub external_timestamps: bool,
    pub recorded_on: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub point_count: usize,
    /// `(timestamp, value)` pairs per time series
    pub series: BTreeMap<String, Vec<(i64, Value)>>,
}
