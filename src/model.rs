//! Classification models.
//!
//! A model is a fixed contract: the input feature names it expects, the
//! time window those features are computed over, the class labels it
//! scores, the scaling applied to features, and a scoring function. Models
//! are read from JSON files at startup; the scoring function of a model
//! file is a linear layer followed by softmax. Any other [`Scorer`] can be
//! plugged in through [`ModelSpec::new`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Scoring function: scaled feature vector in, one score per class out.
pub trait Scorer: Send + Sync {
    fn score(&self, features: &[f64]) -> Vec<f64>;
}

impl<F> Scorer for F
where
    F: Fn(&[f64]) -> Vec<f64> + Send + Sync,
{
    fn score(&self, features: &[f64]) -> Vec<f64> {
        self(features)
    }
}

/// Standard-score scaling parameters, one entry per input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Scale {
    /// Scaling that leaves `n` features unchanged.
    pub fn identity(n: usize) -> Self {
        Self {
            mean: vec![0.0; n],
            scale: vec![1.0; n],
        }
    }

    /// Scale features in place. A zero scale only centers the feature.
    pub fn apply(&self, features: &mut [f64]) {
        for ((x, mean), scale) in features.iter_mut().zip(&self.mean).zip(&self.scale) {
            let divisor = if *scale == 0.0 { 1.0 } else { *scale };
            *x = (*x - mean) / divisor;
        }
    }
}

/// Linear layer with softmax output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearScorer {
    /// One row of weights per class
    pub coefficients: Vec<Vec<f64>>,
    /// One bias per class
    pub intercepts: Vec<f64>,
}

impl Scorer for LinearScorer {
    fn score(&self, features: &[f64]) -> Vec<f64> {
        let logits: Vec<f64> = self
            .coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(row, bias)| row.iter().zip(features).map(|(w, x)| w * x).sum::<f64>() + bias)
            .collect();
        softmax(&logits)
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    if total == 0.0 || !total.is_finite() {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|e| e / total).collect()
}

/// A loaded model.
#[derive(Clone)]
pub struct ModelSpec {
    name: String,
    inputs: Vec<String>,
    window_ms: u64,
    classes: Vec<String>,
    scale: Scale,
    scorer: Arc<dyn Scorer>,
}

impl std::fmt::Debug for ModelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSpec")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("window_ms", &self.window_ms)
            .field("classes", &self.classes)
            .finish_non_exhaustive()
    }
}

impl ModelSpec {
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<String>,
        window_ms: u64,
        classes: Vec<String>,
        scale: Scale,
        scorer: Arc<dyn Scorer>,
    ) -> Result<Self, ModelError> {
        if inputs.is_empty() {
            return Err(ModelError::Invalid("model has no inputs".to_string()));
        }
        if classes.is_empty() {
            return Err(ModelError::Invalid("model has no classes".to_string()));
        }
        if window_ms == 0 {
            return Err(ModelError::Invalid("window must be greater than zero".to_string()));
        }
        if scale.mean.len() != inputs.len() || scale.scale.len() != inputs.len() {
            return Err(ModelError::Invalid(format!(
                "scale has {}/{} entries for {} inputs",
                scale.mean.len(),
                scale.scale.len(),
                inputs.len()
            )));
        }

        Ok(Self {
            name: name.into(),
            inputs,
            window_ms,
            classes,
            scale,
            scorer,
        })
    }

    /// Parse a model file.
    pub fn from_json(name: &str, json: &str) -> Result<Self, ModelError> {
        let file: ModelFile =
            serde_json::from_str(json).map_err(|e| ModelError::ParseError(e.to_string()))?;
        file.into_spec(name)
    }

    /// Read and parse a model file.
    pub fn load(name: &str, path: &Path) -> Result<Self, ModelError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ModelError::IoError(format!("{}: {e}", path.display())))?;
        Self::from_json(name, &json)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn scale(&self) -> &Scale {
        &self.scale
    }

    /// Scale the raw features and score them.
    pub fn score(&self, raw_features: &[f64]) -> Result<Vec<f64>, ModelError> {
        if raw_features.len() != self.inputs.len() {
            return Err(ModelError::Invalid(format!(
                "expected {} features, got {}",
                self.inputs.len(),
                raw_features.len()
            )));
        }

        let mut features = raw_features.to_vec();
        self.scale.apply(&mut features);

        let scores = self.scorer.score(&features);
        if scores.len() != self.classes.len() {
            return Err(ModelError::Invalid(format!(
                "scorer returned {} scores for {} classes",
                scores.len(),
                self.classes.len()
            )));
        }
        Ok(scores)
    }
}

/// On-disk model format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFile {
    pub inputs: Vec<String>,
    /// Window length in milliseconds
    pub window: u64,
    pub classes: Vec<String>,
    #[serde(default)]
    pub scale: Option<Scale>,
    pub linear: LinearScorer,
}

impl ModelFile {
    pub fn into_spec(self, name: &str) -> Result<ModelSpec, ModelError> {
        let n_inputs = self.inputs.len();
        if self.linear.coefficients.len() != self.classes.len()
            || self.linear.intercepts.len() != self.classes.len()
        {
            return Err(ModelError::Invalid(format!(
                "linear layer does not have one row per class ({} classes)",
                self.classes.len()
            )));
        }
        if self.linear.coefficients.iter().any(|row| row.len() != n_inputs) {
            return Err(ModelError::Invalid(format!(
                "every coefficient row needs {n_inputs} weights"
            )));
        }

        ModelSpec::new(
            name,
            self.inputs,
            self.window,
            self.classes,
            self.scale.unwrap_or_else(|| Scale::identity(n_inputs)),
            Arc::new(self.linear),
        )
    }
}

/// Models available per sensor.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: HashMap<String, Arc<ModelSpec>>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every configured model file.
    ///
    /// Failures are logged and returned; the affected sensor simply has no
    /// model, so classification for it cannot start.
    pub fn load(models: &BTreeMap<String, PathBuf>) -> (Self, Vec<(String, ModelError)>) {
        let mut catalog = Self::new();
        let mut failures = Vec::new();

        for (sensor, path) in models {
            match ModelSpec::load(sensor, path) {
                Ok(model) => {
                    tracing::info!(sensor, path = %path.display(), "loaded model");
                    catalog.insert(sensor, model);
                }
                Err(e) => {
                    tracing::error!(sensor, path = %path.display(), error = %e, "failed to load model");
                    failures.push((sensor.clone(), e));
                }
            }
        }

        (catalog, failures)
    }

    pub fn insert(&mut self, sensor: &str, model: ModelSpec) {
        self.models.insert(sensor.to_string(), Arc::new(model));
    }

    pub fn get(&self, sensor: &str) -> Option<Arc<ModelSpec>> {
        self.models.get(sensor).cloned()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Model errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    IoError(String),
    ParseError(String),
    Invalid(String),
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::IoError(e) => write!(f, "Model IO error: {e}"),
            ModelError::ParseError(e) => write!(f, "Model parse error: {e}"),
            ModelError::Invalid(e) => write!(f, "Invalid model: {e}"),
        }
    }
}

impl std::error::Error for ModelError {}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL_JSON: &str = r#"{
        "inputs": ["alpha_mean", "beta_std"],
        "window": 1000,
        "classes": ["still", "moving"],
        "scale": {"mean": [0.0, 1.0], "scale": [10.0, 2.0]},
        "linear": {
            "coefficients": [[-1.0, -1.0], [1.0, 1.0]],
            "intercepts": [0.0, 0.0]
        }
    }"#;

    #[test]
    fn test_parse_model_file() {
        let model = ModelSpec::from_json("deviceorientation", MODEL_JSON).unwrap();
        assert_eq!(model.name(), "deviceorientation");
        assert_eq!(model.inputs(), ["alpha_mean", "beta_std"]);
        assert_eq!(model.window_ms(), 1000);
        assert_eq!(model.classes(), ["still", "moving"]);
    }

    #[test]
    fn test_score_applies_scale() {
        let model = ModelSpec::from_json("m", MODEL_JSON).unwrap();
        // scaled features: (20 - 0) / 10 = 2, (5 - 1) / 2 = 2
        let scores = model.score(&[20.0, 5.0]).unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores[1] > scores[0]);
        assert!((scores.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_rejects_wrong_arity() {
        let model = ModelSpec::from_json("m", MODEL_JSON).unwrap();
        assert!(matches!(model.score(&[1.0]), Err(ModelError::Invalid(_))));
    }

    #[test]
    fn test_closure_scorer() {
        let model = ModelSpec::new(
            "m",
            vec!["alpha".to_string()],
            500,
            vec!["a".to_string(), "b".to_string()],
            Scale::identity(1),
            Arc::new(|features: &[f64]| vec![features[0], 1.0 - features[0]]),
        )
        .unwrap();
        assert_eq!(model.score(&[0.25]).unwrap(), vec![0.25, 0.75]);
    }

    #[test]
    fn test_scorer_output_mismatch() {
        let model = ModelSpec::new(
            "m",
            vec!["alpha".to_string()],
            500,
            vec!["a".to_string(), "b".to_string()],
            Scale::identity(1),
            Arc::new(|_: &[f64]| vec![1.0]),
        )
        .unwrap();
        assert!(model.score(&[0.0]).is_err());
    }

    #[test]
    fn test_invalid_model_files() {
        let bad_rows = MODEL_JSON.replace("[[-1.0, -1.0], [1.0, 1.0]]", "[[-1.0], [1.0, 1.0]]");
        assert!(matches!(
            ModelSpec::from_json("m", &bad_rows),
            Err(ModelError::Invalid(_))
        ));

        let zero_window = MODEL_JSON.replace("\"window\": 1000", "\"window\": 0");
        assert!(matches!(
            ModelSpec::from_json("m", &zero_window),
            Err(ModelError::Invalid(_))
        ));

        assert!(matches!(
            ModelSpec::from_json("m", "window.deviceorientation_model = {}"),
            Err(ModelError::ParseError(_))
        ));
    }

    #[test]
    fn test_softmax() {
        let probs = softmax(&[1.0, 1.0]);
        assert_eq!(probs, vec![0.5, 0.5]);
        assert!(softmax(&[1000.0, 0.0])[0] > 0.99);
    }

    #[test]
    fn test_catalog_load_reports_failures() {
        let dir = std::env::temp_dir().join(format!("motion-sensor-models-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let good = dir.join("orientation.json");
        std::fs::write(&good, MODEL_JSON).unwrap();

        let mut paths = BTreeMap::new();
        paths.insert("deviceorientation".to_string(), good);
        paths.insert("devicemotion".to_string(), dir.join("missing.json"));

        let (catalog, failures) = ModelCatalog::load(&paths);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("deviceorientation").is_some());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "devicemotion");
        assert!(matches!(failures[0].1, ModelError::IoError(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
