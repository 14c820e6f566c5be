//! Session statistics.
//!
//! Counts what flowed through the sessions without keeping any sensor
//! values, so the numbers can be shown and persisted freely.

use crate::core::router::RouteReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Running counters for the current process.
#[derive(Debug)]
pub struct SessionStats {
    /// Samples routed into a collector or classifier
    samples_routed: AtomicU64,
    /// Fields accepted by a sink
    fields_forwarded: AtomicU64,
    /// Absent fields skipped
    fields_dropped: AtomicU64,
    /// Fields a sink rejected
    ingest_failures: AtomicU64,
    /// Predictions that completed
    predictions: AtomicU64,
    /// Predictions that failed
    prediction_failures: AtomicU64,
    /// Datasets finalized
    datasets_completed: AtomicU64,
    /// Process start time
    started_at: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            samples_routed: AtomicU64::new(0),
            fields_forwarded: AtomicU64::new(0),
            fields_dropped: AtomicU64::new(0),
            ingest_failures: AtomicU64::new(0),
            predictions: AtomicU64::new(0),
            prediction_failures: AtomicU64::new(0),
            datasets_completed: AtomicU64::new(0),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// Create stats that continue from, and save to, a file.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!("Could not load previous session stats: {e}");
        }

        stats
    }

    /// Record the outcome of routing one sample.
    pub fn record_route(&self, report: &RouteReport) {
        self.samples_routed.fetch_add(1, Ordering::Relaxed);
        self.fields_forwarded
            .fetch_add(report.forwarded as u64, Ordering::Relaxed);
        self.fields_dropped
            .fetch_add(report.dropped as u64, Ordering::Relaxed);
        self.ingest_failures
            .fetch_add(report.failures.len() as u64, Ordering::Relaxed);
    }

    pub fn record_prediction(&self) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prediction_failure(&self) {
        self.prediction_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dataset_completed(&self) {
        self.datasets_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_routed: self.samples_routed.load(Ordering::Relaxed),
            fields_forwarded: self.fields_forwarded.load(Ordering::Relaxed),
            fields_dropped: self.fields_dropped.load(Ordering::Relaxed),
            ingest_failures: self.ingest_failures.load(Ordering::Relaxed),
            predictions: self.predictions.load(Ordering::Relaxed),
            prediction_failures: self.prediction_failures.load(Ordering::Relaxed),
            datasets_completed: self.datasets_completed.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Session Statistics:\n\
             - Samples routed: {}\n\
             - Fields forwarded: {}\n\
             - Absent fields dropped: {}\n\
             - Rejected fields: {}\n\
             - Predictions: {} ({} failed)\n\
             - Datasets completed: {}\n\
             - Uptime: {} seconds",
            stats.samples_routed,
            stats.fields_forwarded,
            stats.fields_dropped,
            stats.ingest_failures,
            stats.predictions,
            stats.prediction_failures,
            stats.datasets_completed,
            stats.uptime_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.snapshot();
            let persisted = PersistedStats {
                samples_routed: stats.samples_routed,
                fields_forwarded: stats.fields_forwarded,
                fields_dropped: stats.fields_dropped,
                ingest_failures: stats.ingest_failures,
                predictions: stats.predictions,
                prediction_failures: stats.prediction_failures,
                datasets_completed: stats.datasets_completed,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.samples_routed
                    .store(persisted.samples_routed, Ordering::Relaxed);
                self.fields_forwarded
                    .store(persisted.fields_forwarded, Ordering::Relaxed);
                self.fields_dropped
                    .store(persisted.fields_dropped, Ordering::Relaxed);
                self.ingest_failures
                    .store(persisted.ingest_failures, Ordering::Relaxed);
                self.predictions
                    .store(persisted.predictions, Ordering::Relaxed);
                self.prediction_failures
                    .store(persisted.prediction_failures, Ordering::Relaxed);
                self.datasets_completed
                    .store(persisted.datasets_completed, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of session statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub samples_routed: u64,
    pub fields_forwarded: u64,
    pub fields_dropped: u64,
    pub ingest_failures: u64,
    pub predictions: u64,
    pub prediction_failures: u64,
    pub datasets_completed: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    samples_routed: u64,
    fields_forwarded: u64,
    fields_dropped: u64,
    ingest_failures: u64,
    predictions: u64,
    prediction_failures: u64,
    datasets_completed: u64,
    last_updated: DateTime<Utc>,
}

/// Shared session statistics.
pub type SharedStats = Arc<SessionStats>;

pub fn create_shared_stats() -> SharedStats {
    Arc::new(SessionStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedStats {
    Arc::new(SessionStats::with_persistence(path))
}
