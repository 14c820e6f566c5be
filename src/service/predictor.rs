//! In-process prediction service.
//!
//! Each classifier keeps one sliding window per field its model reads.
//! A prediction summarises every window into the model's input features,
//! scales them and scores them.

use crate::core::features::InputFeature;
use crate::core::window::SlidingWindow;
use crate::model::ModelSpec;
use crate::service::{ClassScore, Classifier, DataSink, Prediction, PredictionService, ServiceError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Opens [`WindowedClassifier`]s.
#[derive(Debug, Clone, Default)]
pub struct LocalPredictionService;

impl LocalPredictionService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PredictionService for LocalPredictionService {
    async fn open_classifier(
        &self,
        model: Arc<ModelSpec>,
    ) -> Result<Arc<dyn Classifier>, ServiceError> {
        Ok(Arc::new(WindowedClassifier::new(model)))
    }
}

/// Classifier over sliding windows of the model's input fields.
pub struct WindowedClassifier {
    model: Arc<ModelSpec>,
    features: Vec<InputFeature>,
    windows: Mutex<HashMap<String, SlidingWindow>>,
}

impl WindowedClassifier {
    pub fn new(model: Arc<ModelSpec>) -> Self {
        let features: Vec<InputFeature> =
            model.inputs().iter().map(|i| InputFeature::parse(i)).collect();

        let windows = features
            .iter()
            .map(|f| (f.field.clone(), SlidingWindow::new(model.window_ms())))
            .collect();

        Self {
            model,
            features,
            windows: Mutex::new(windows),
        }
    }

    pub fn model(&self) -> &ModelSpec {
        &self.model
    }

    /// Fields this classifier consumes.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.field.as_str())
    }

    /// Score the current windows synchronously.
    pub fn predict_now(&self) -> Result<Prediction, ServiceError> {
        let (raw, latest) = {
            let windows = self.windows.lock().unwrap_or_else(|p| p.into_inner());

            let mut raw = Vec::with_capacity(self.features.len());
            let mut latest: Option<i64> = None;
            for feature in &self.features {
                let window = windows.get(&feature.field);
                let values = window.map(SlidingWindow::values).unwrap_or_default();
                let value = feature.statistic.compute(&values).ok_or_else(|| {
                    ServiceError::InsufficientData(format!("no values for '{}'", feature.field))
                })?;
                raw.push(value);
                latest = latest.max(window.and_then(SlidingWindow::latest));
            }
            (raw, latest.unwrap_or_default())
        };

        let scores = self
            .model
            .score(&raw)
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;

        let scores: Vec<ClassScore> = self
            .model
            .classes()
            .iter()
            .zip(scores)
            .map(|(class, score)| ClassScore {
                class: class.clone(),
                score,
            })
            .collect();

        let prediction = scores
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .map(|s| s.class.clone())
            .unwrap_or_default();

        Ok(Prediction {
            prediction,
            scores,
            timestamp: latest,
        })
    }
}

#[async_trait]
impl DataSink for WindowedClassifier {
    async fn add_data_point(
        &self,
        timestamp: i64,
        field: &str,
        value: &Value,
    ) -> Result<(), ServiceError> {
        let mut windows = self.windows.lock().unwrap_or_else(|p| p.into_inner());

        // Fields the model does not read are accepted and ignored
        let Some(window) = windows.get_mut(field) else {
            return Ok(());
        };

        let number = value.as_f64().ok_or_else(|| ServiceError::Rejected {
            field: field.to_string(),
            reason: format!("expected a number, got {value}"),
        })?;

        window.push(timestamp, number);
        Ok(())
    }
}

#[async_trait]
impl Classifier for WindowedClassifier {
    async fn predict(&self) -> Result<Prediction, ServiceError> {
        self.predict_now()
    }
}
