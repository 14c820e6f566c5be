//! Recording and classifying sessions.
//!
//! The controller owns at most one recording session and one classifying
//! session. Each session holds one routing task per sensor: the task
//! drains the sensor's bus subscription and routes every sample into the
//! sensor's collector or classifier. A classifying session additionally
//! runs one periodic prediction task shared by all its classifiers.
//!
//! Teardown always runs in the same order: unsubscribe every route, wait
//! for the routing tasks to drain what was already queued, then finalize
//! (collectors) or cancel the prediction task (classifiers).

use crate::config::Config;
use crate::core::router::route_sample;
use crate::device::DeviceTags;
use crate::model::ModelCatalog;
use crate::sensor::{SensorBus, SensorDescriptor, SensorRegistry, SubscriptionId};
use crate::service::{
    Classifier, CollectorService, CollectorSpec, DataSink, DatasetCollector, LocalPredictionService,
    PredictionService, ServiceError,
};
use crate::stats::{create_shared_stats, SharedStats};
use crate::status::{StatusBoard, STATUS_NOT_RECORDING, STATUS_RECORDING};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Metadata key for the participant ID.
pub const PARTICIPANT_TAG: &str = "participantId";
/// Metadata key for the activity label.
pub const ACTIVITY_TAG: &str = "activity";
/// Labeling name prefixed to every dataset label.
pub const ACTIVITY_LABELING: &str = "activity";

/// Default period between predictions.
pub const DEFAULT_PREDICTION_INTERVAL: Duration = Duration::from_millis(1000);

/// Backend settings shared by every collector a recording opens.
#[derive(Debug, Clone, Default)]
pub struct CollectorSettings {
    pub backend_url: String,
    pub api_key: String,
    pub device: DeviceTags,
}

impl CollectorSettings {
    pub fn from_config(config: &Config, device: DeviceTags) -> Self {
        Self {
            backend_url: config.backend_url.clone(),
            api_key: config.api_key.clone(),
            device,
        }
    }
}

/// Labels attached to a recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingLabels {
    pub subject_id: String,
    pub activity: String,
}

impl RecordingLabels {
    pub fn new(subject_id: impl Into<String>, activity: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            activity: activity.into(),
        }
    }
}

/// The two kinds of session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Recording,
    Classifying,
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionKind::Recording => write!(f, "recording"),
            SessionKind::Classifying => write!(f, "classifying"),
        }
    }
}

/// One sensor wired into a handle.
struct Route<H: ?Sized> {
    sensor: String,
    subscription: SubscriptionId,
    task: JoinHandle<()>,
    handle: Arc<H>,
}

impl<H> Route<H>
where
    H: DataSink + ?Sized + 'static,
{
    /// Subscribe to the sensor and start routing its samples into `handle`.
    fn spawn(bus: &SensorBus, descriptor: &SensorDescriptor, handle: Arc<H>, stats: SharedStats) -> Self {
        let mut subscription = bus.subscribe(descriptor.name());
        let id = subscription.id();
        let selectors = descriptor.selectors().to_vec();
        let sink = Arc::clone(&handle);

        let task = tokio::spawn(async move {
            while let Some(sample) = subscription.recv().await {
                let report = route_sample(sink.as_ref(), &selectors, &sample).await;
                stats.record_route(&report);
            }
        });

        Self {
            sensor: descriptor.name().to_string(),
            subscription: id,
            task,
            handle,
        }
    }
}

/// Unsubscribe every route, then wait for each routing task to finish.
async fn unsubscribe_and_drain<H: ?Sized>(bus: &SensorBus, routes: &mut [Route<H>]) {
    for route in routes.iter() {
        bus.unsubscribe(route.subscription);
    }
    for route in routes.iter_mut() {
        if let Err(e) = (&mut route.task).await {
            tracing::warn!(sensor = %route.sensor, "routing task ended abnormally: {e}");
        }
    }
}

/// Finalize every collector, keeping going past failures.
async fn finalize(
    routes: &[Route<dyn DatasetCollector>],
    stats: &SharedStats,
) -> Vec<(String, ServiceError)> {
    let mut failures = Vec::new();
    for route in routes {
        match route.handle.on_complete().await {
            Ok(()) => {
                stats.record_dataset_completed();
                tracing::info!(sensor = %route.sensor, "dataset completed");
            }
            Err(e) => {
                tracing::error!(sensor = %route.sensor, error = %e, "failed to complete dataset");
                failures.push((route.sensor.clone(), e));
            }
        }
    }
    failures
}

struct RecordingSession {
    labels: RecordingLabels,
    routes: Vec<Route<dyn DatasetCollector>>,
}

struct ClassifyingSession {
    routes: Vec<Route<dyn Classifier>>,
    timer: JoinHandle<()>,
}

/// Ask every classifier for a prediction once per period.
///
/// Each tick spawns its predictions into a task set so a slow prediction
/// never delays the next tick. Completed predictions overwrite the status
/// text in completion order. Dropping this future (by aborting its task)
/// aborts every prediction still in flight.
async fn run_predictions(
    classifiers: Vec<(String, Arc<dyn Classifier>)>,
    period: Duration,
    status: StatusBoard,
    stats: SharedStats,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for (sensor, classifier) in &classifiers {
                    let sensor = sensor.clone();
                    let classifier = Arc::clone(classifier);
                    in_flight.spawn(async move {
                        let result = classifier.predict().await;
                        (sensor, result)
                    });
                }
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                match joined {
                    Ok((sensor, Ok(prediction))) => {
                        stats.record_prediction();
                        tracing::debug!(sensor = %sensor, prediction = %prediction.prediction, "prediction");
                        status.set(prediction.render());
                    }
                    Ok((sensor, Err(error))) => {
                        stats.record_prediction_failure();
                        tracing::warn!(sensor = %sensor, %error, "prediction failed");
                    }
                    Err(e) => {
                        stats.record_prediction_failure();
                        tracing::warn!("prediction task ended abnormally: {e}");
                    }
                }
            }
        }
    }
}

/// Starts and stops the recording and classifying sessions.
pub struct SessionController {
    bus: SensorBus,
    registry: Arc<SensorRegistry>,
    collectors: Arc<dyn CollectorService>,
    predictions: Option<Arc<dyn PredictionService>>,
    models: ModelCatalog,
    settings: CollectorSettings,
    status: StatusBoard,
    stats: SharedStats,
    prediction_interval: Duration,
    recording: Option<RecordingSession>,
    classifying: Option<ClassifyingSession>,
}

impl SessionController {
    pub fn new(
        bus: SensorBus,
        registry: Arc<SensorRegistry>,
        collectors: Arc<dyn CollectorService>,
        settings: CollectorSettings,
    ) -> Self {
        Self {
            bus,
            registry,
            collectors,
            predictions: None,
            models: ModelCatalog::new(),
            settings,
            status: StatusBoard::new(),
            stats: create_shared_stats(),
            prediction_interval: DEFAULT_PREDICTION_INTERVAL,
            recording: None,
            classifying: None,
        }
    }

    /// Controller for the configured sensors, classifying in process with
    /// the configured models.
    pub fn from_config(
        config: &Config,
        bus: SensorBus,
        collectors: Arc<dyn CollectorService>,
        device: DeviceTags,
    ) -> Self {
        let registry = SensorRegistry::device_defaults().filtered(&config.sensors);
        let (models, _failures) = ModelCatalog::load(&config.models);

        Self::new(
            bus,
            Arc::new(registry),
            collectors,
            CollectorSettings::from_config(config, device),
        )
        .with_predictions(Arc::new(LocalPredictionService::new()), models)
        .with_prediction_interval(config.prediction_interval)
    }

    /// Enable classification with a prediction service and the loaded models.
    pub fn with_predictions(mut self, service: Arc<dyn PredictionService>, models: ModelCatalog) -> Self {
        self.predictions = Some(service);
        self.models = models;
        self
    }

    pub fn with_status(mut self, status: StatusBoard) -> Self {
        self.status = status;
        self
    }

    pub fn with_stats(mut self, stats: SharedStats) -> Self {
        self.stats = stats;
        self
    }

    /// Period between predictions. Clamped to at least one millisecond.
    pub fn with_prediction_interval(mut self, interval: Duration) -> Self {
        self.prediction_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn bus(&self) -> &SensorBus {
        &self.bus
    }

    pub fn registry(&self) -> &SensorRegistry {
        &self.registry
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    pub fn stats(&self) -> &SharedStats {
        &self.stats
    }

    /// Replace the device tags used by the next recording.
    pub fn set_device(&mut self, device: DeviceTags) {
        self.settings.device = device;
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn is_classifying(&self) -> bool {
        self.classifying.is_some()
    }

    /// Labels of the active recording.
    pub fn recording_labels(&self) -> Option<&RecordingLabels> {
        self.recording.as_ref().map(|r| &r.labels)
    }

    fn collector_spec(&self, descriptor: &SensorDescriptor, labels: &RecordingLabels) -> CollectorSpec {
        let mut metadata = BTreeMap::new();
        metadata.insert(PARTICIPANT_TAG.to_string(), labels.subject_id.clone());
        metadata.insert(ACTIVITY_TAG.to_string(), labels.activity.clone());
        metadata.extend(self.settings.device.to_metadata());

        CollectorSpec {
            backend_url: self.settings.backend_url.clone(),
            api_key: self.settings.api_key.clone(),
            dataset: descriptor.name().to_string(),
            external_timestamps: true,
            fields: descriptor.selectors().to_vec(),
            metadata,
            label: format!("{ACTIVITY_LABELING}_{}", labels.activity),
        }
    }

    /// Open a collector for every record-capable sensor and start routing.
    ///
    /// If any collector fails to open, everything opened so far is torn
    /// down and completed again and the recording stays stopped.
    pub async fn start_recording(&mut self, labels: RecordingLabels) -> Result<(), SessionError> {
        if self.recording.is_some() {
            return Err(SessionError::AlreadyActive(SessionKind::Recording));
        }

        let registry = Arc::clone(&self.registry);
        let mut routes: Vec<Route<dyn DatasetCollector>> = Vec::new();

        for descriptor in registry.recordable() {
            let spec = self.collector_spec(descriptor, &labels);
            let collector = match self.collectors.open_collector(&spec).await {
                Ok(collector) => collector,
                Err(source) => {
                    tracing::error!(sensor = descriptor.name(), error = %source, "failed to open collector");
                    unsubscribe_and_drain(&self.bus, &mut routes).await;
                    finalize(&routes, &self.stats).await;
                    return Err(SessionError::CollectorUnavailable {
                        sensor: descriptor.name().to_string(),
                        source,
                    });
                }
            };
            routes.push(Route::spawn(&self.bus, descriptor, collector, Arc::clone(&self.stats)));
        }

        tracing::info!(
            subject = %labels.subject_id,
            activity = %labels.activity,
            sensors = routes.len(),
            "recording started"
        );
        self.recording = Some(RecordingSession { labels, routes });
        self.status.set(STATUS_RECORDING);
        Ok(())
    }

    /// Stop recording and complete every dataset.
    ///
    /// Stopping a recording that is not running does nothing. Otherwise the
    /// recording always ends up stopped; completion failures are returned
    /// together.
    pub async fn stop_recording(&mut self) -> Result<(), SessionError> {
        let Some(mut session) = self.recording.take() else {
            return Ok(());
        };

        unsubscribe_and_drain(&self.bus, &mut session.routes).await;
        let failures = finalize(&session.routes, &self.stats).await;

        tracing::info!(sensors = session.routes.len(), "recording stopped");
        self.status.set(STATUS_NOT_RECORDING);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(SessionError::FinalizeFailed(failures))
        }
    }

    /// Open a classifier for every classify-capable sensor and start the
    /// prediction timer.
    pub async fn start_classifying(&mut self) -> Result<(), SessionError> {
        if self.classifying.is_some() {
            return Err(SessionError::AlreadyActive(SessionKind::Classifying));
        }
        let Some(service) = self.predictions.clone() else {
            return Err(SessionError::PredictionUnavailable);
        };

        let registry = Arc::clone(&self.registry);
        let mut routes: Vec<Route<dyn Classifier>> = Vec::new();

        for descriptor in registry.classifiable() {
            let opened = match self.models.get(descriptor.name()) {
                Some(model) => service.open_classifier(model).await.map_err(|source| {
                    SessionError::ClassifierUnavailable {
                        sensor: descriptor.name().to_string(),
                        source,
                    }
                }),
                None => Err(SessionError::ModelUnavailable(descriptor.name().to_string())),
            };

            let classifier = match opened {
                Ok(classifier) => classifier,
                Err(e) => {
                    tracing::error!(sensor = descriptor.name(), "cannot start classifying: {e}");
                    unsubscribe_and_drain(&self.bus, &mut routes).await;
                    return Err(e);
                }
            };
            routes.push(Route::spawn(&self.bus, descriptor, classifier, Arc::clone(&self.stats)));
        }

        if routes.is_empty() {
            tracing::warn!("no classify-capable sensors are enabled");
        }

        let classifiers = routes
            .iter()
            .map(|r| (r.sensor.clone(), Arc::clone(&r.handle)))
            .collect();
        let timer = tokio::spawn(run_predictions(
            classifiers,
            self.prediction_interval,
            self.status.clone(),
            Arc::clone(&self.stats),
        ));

        tracing::info!(
            sensors = routes.len(),
            interval_ms = self.prediction_interval.as_millis() as u64,
            "classifying started"
        );
        self.classifying = Some(ClassifyingSession { routes, timer });
        self.status.set(STATUS_RECORDING);
        Ok(())
    }

    /// Stop classifying. Does nothing if classification is not running.
    pub async fn stop_classifying(&mut self) {
        let Some(mut session) = self.classifying.take() else {
            return;
        };

        unsubscribe_and_drain(&self.bus, &mut session.routes).await;

        session.timer.abort();
        if let Err(e) = session.timer.await {
            if !e.is_cancelled() {
                tracing::warn!("prediction timer ended abnormally: {e}");
            }
        }

        tracing::info!(sensors = session.routes.len(), "classifying stopped");
        self.status.set(STATUS_NOT_RECORDING);
    }

    /// Stop both sessions.
    pub async fn shutdown(&mut self) -> Result<(), SessionError> {
        self.stop_classifying().await;
        self.stop_recording().await
    }
}

/// Session errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// The session is already running
    AlreadyActive(SessionKind),
    /// A collector could not be opened
    CollectorUnavailable { sensor: String, source: ServiceError },
    /// A classifier could not be opened
    ClassifierUnavailable { sensor: String, source: ServiceError },
    /// No model is loaded for the sensor
    ModelUnavailable(String),
    /// No prediction service is configured
    PredictionUnavailable,
    /// One or more datasets could not be completed
    FinalizeFailed(Vec<(String, ServiceError)>),
}

impl SessionError {
    /// Short machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::AlreadyActive(_) => "ALREADY_ACTIVE",
            SessionError::CollectorUnavailable { .. } => "COLLECTOR_UNAVAILABLE",
            SessionError::ClassifierUnavailable { .. } => "CLASSIFIER_UNAVAILABLE",
            SessionError::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
            SessionError::PredictionUnavailable => "PREDICTION_UNAVAILABLE",
            SessionError::FinalizeFailed(_) => "FINALIZE_FAILED",
        }
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::AlreadyActive(kind) => write!(f, "Session already {kind}"),
            SessionError::CollectorUnavailable { sensor, source } => {
                write!(f, "Could not open collector for {sensor}: {source}")
            }
            SessionError::ClassifierUnavailable { sensor, source } => {
                write!(f, "Could not open classifier for {sensor}: {source}")
            }
            SessionError::ModelUnavailable(sensor) => write!(f, "No model loaded for {sensor}"),
            SessionError::PredictionUnavailable => write!(f, "No prediction service configured"),
            SessionError::FinalizeFailed(failures) => {
                write!(f, "Failed to complete {} dataset(s):", failures.len())?;
                for (sensor, e) in failures {
                    write!(f, " {sensor}: {e};")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for SessionError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelSpec, Scale};
    use crate::sensor::{Sample, DEVICE_MOTION, DEVICE_ORIENTATION};
    use crate::service::Prediction;
    use crate::status::STATUS_INITIALIZED;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Journal {
        specs: Vec<CollectorSpec>,
        points: Vec<(String, i64, String, Value)>,
        completed: Vec<String>,
    }

    #[derive(Default)]
    struct MockCollectors {
        journal: Arc<Mutex<Journal>>,
        fail_open: Option<&'static str>,
        fail_complete: Option<&'static str>,
    }

    struct MockCollector {
        dataset: String,
        journal: Arc<Mutex<Journal>>,
        fail_complete: bool,
    }

    #[async_trait]
    impl CollectorService for MockCollectors {
        async fn open_collector(
            &self,
            spec: &CollectorSpec,
        ) -> Result<Arc<dyn DatasetCollector>, ServiceError> {
            if self.fail_open == Some(spec.dataset.as_str()) {
                return Err(ServiceError::Unavailable("offline".to_string()));
            }
            self.journal.lock().unwrap().specs.push(spec.clone());
            Ok(Arc::new(MockCollector {
                dataset: spec.dataset.clone(),
                journal: Arc::clone(&self.journal),
                fail_complete: self.fail_complete == Some(spec.dataset.as_str()),
            }))
        }
    }

    #[async_trait]
    impl DataSink for MockCollector {
        async fn add_data_point(
            &self,
            timestamp: i64,
            field: &str,
            value: &Value,
        ) -> Result<(), ServiceError> {
            self.journal.lock().unwrap().points.push((
                self.dataset.clone(),
                timestamp,
                field.to_string(),
                value.clone(),
            ));
            Ok(())
        }
    }

    #[async_trait]
    impl DatasetCollector for MockCollector {
        async fn on_complete(&self) -> Result<(), ServiceError> {
            if self.fail_complete {
                return Err(ServiceError::Io("disk full".to_string()));
            }
            self.journal.lock().unwrap().completed.push(self.dataset.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockPredictions {
        predictions: Arc<AtomicUsize>,
        opened: Arc<AtomicUsize>,
        failing: bool,
    }

    struct MockClassifier {
        predictions: Arc<AtomicUsize>,
        failing: bool,
    }

    #[async_trait]
    impl PredictionService for MockPredictions {
        async fn open_classifier(
            &self,
            _model: Arc<ModelSpec>,
        ) -> Result<Arc<dyn Classifier>, ServiceError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MockClassifier {
                predictions: Arc::clone(&self.predictions),
                failing: self.failing,
            }))
        }
    }

    #[async_trait]
    impl DataSink for MockClassifier {
        async fn add_data_point(&self, _: i64, _: &str, _: &Value) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    #[async_trait]
    impl Classifier for MockClassifier {
        async fn predict(&self) -> Result<Prediction, ServiceError> {
            let n = self.predictions.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing {
                return Err(ServiceError::InsufficientData("empty window".to_string()));
            }
            Ok(Prediction {
                prediction: format!("class-{n}"),
                scores: Vec::new(),
                timestamp: n as i64,
            })
        }
    }

    fn settings() -> CollectorSettings {
        CollectorSettings {
            backend_url: "http://backend".to_string(),
            api_key: "secret".to_string(),
            device: DeviceTags {
                mobile: Some("Pixel".to_string()),
                browser: Some("Chrome".to_string()),
            },
        }
    }

    fn controller(collectors: MockCollectors) -> SessionController {
        SessionController::new(
            SensorBus::new(),
            Arc::new(SensorRegistry::device_defaults()),
            Arc::new(collectors),
            settings(),
        )
    }

    fn orientation_model() -> ModelCatalog {
        let mut models = ModelCatalog::new();
        let model = ModelSpec::new(
            DEVICE_ORIENTATION,
            vec!["alpha".to_string()],
            1000,
            vec!["still".to_string()],
            Scale::identity(1),
            Arc::new(|_: &[f64]| vec![1.0]),
        )
        .unwrap();
        models.insert(DEVICE_ORIENTATION, model);
        models
    }

    fn labels() -> RecordingLabels {
        RecordingLabels::new("1a2b3", "walking")
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let collectors = MockCollectors::default();
        let journal = Arc::clone(&collectors.journal);
        let mut controller = controller(collectors);

        controller.stop_recording().await.unwrap();
        controller.stop_classifying().await;

        assert!(journal.lock().unwrap().completed.is_empty());
        assert_eq!(controller.status().get(), STATUS_INITIALIZED);
    }

    #[tokio::test]
    async fn test_start_stop_without_events_completes_each_collector() {
        let collectors = MockCollectors::default();
        let journal = Arc::clone(&collectors.journal);
        let mut controller = controller(collectors);

        controller.start_recording(labels()).await.unwrap();
        assert!(controller.is_recording());
        assert_eq!(controller.bus().total_subscriptions(), 2);
        assert_eq!(controller.status().get(), STATUS_RECORDING);

        controller.stop_recording().await.unwrap();
        assert!(!controller.is_recording());
        assert_eq!(controller.bus().total_subscriptions(), 0);
        assert_eq!(controller.status().get(), STATUS_NOT_RECORDING);

        let journal = journal.lock().unwrap();
        assert_eq!(journal.completed, [DEVICE_ORIENTATION, DEVICE_MOTION]);
        assert!(journal.points.is_empty());
    }

    #[tokio::test]
    async fn test_collector_spec_contents() {
        let collectors = MockCollectors::default();
        let journal = Arc::clone(&collectors.journal);
        let mut controller = controller(collectors);

        controller.start_recording(labels()).await.unwrap();
        controller.stop_recording().await.unwrap();

        let journal = journal.lock().unwrap();
        let spec = &journal.specs[0];
        assert_eq!(spec.dataset, DEVICE_ORIENTATION);
        assert_eq!(spec.backend_url, "http://backend");
        assert_eq!(spec.api_key, "secret");
        assert!(spec.external_timestamps);
        assert_eq!(spec.fields, ["alpha", "beta", "gamma"]);
        assert_eq!(spec.label, "activity_walking");
        assert_eq!(spec.metadata[PARTICIPANT_TAG], "1a2b3");
        assert_eq!(spec.metadata[ACTIVITY_TAG], "walking");
        assert_eq!(spec.metadata["mobile"], "Pixel");
        assert_eq!(spec.metadata["browser"], "Chrome");
        assert_eq!(journal.specs[1].fields.len(), 9);
    }

    #[tokio::test]
    async fn test_samples_routed_before_completion() {
        let collectors = MockCollectors::default();
        let journal = Arc::clone(&collectors.journal);
        let mut controller = controller(collectors);

        controller.start_recording(labels()).await.unwrap();
        let bus = controller.bus().clone();
        bus.publish(Sample::new(
            DEVICE_ORIENTATION,
            1500.75,
            json!({"alpha": 10.0, "beta": null, "gamma": -3.5}),
        ));
        bus.publish(Sample::new(
            DEVICE_MOTION,
            1600.2,
            json!({"acceleration": {"x": 0.1}, "rotationRate": null}),
        ));
        controller.stop_recording().await.unwrap();

        // Samples published after stop reach nobody
        assert_eq!(bus.publish(Sample::new(DEVICE_ORIENTATION, 1.0, json!({"alpha": 1}))), 0);

        let journal = journal.lock().unwrap();
        let mut points: Vec<(String, i64, String)> = journal
            .points
            .iter()
            .map(|(d, t, f, _)| (d.clone(), *t, f.clone()))
            .collect();
        points.sort();
        assert_eq!(
            points,
            vec![
                (DEVICE_MOTION.to_string(), 1600, "acceleration.x".to_string()),
                (DEVICE_ORIENTATION.to_string(), 1500, "alpha".to_string()),
                (DEVICE_ORIENTATION.to_string(), 1500, "gamma".to_string()),
            ]
        );

        let snapshot = controller.stats().snapshot();
        assert_eq!(snapshot.samples_routed, 2);
        assert_eq!(snapshot.fields_forwarded, 3);
        assert_eq!(snapshot.fields_dropped, 9);
        assert_eq!(snapshot.datasets_completed, 2);
    }

    #[tokio::test]
    async fn test_double_start_recording_is_rejected() {
        let collectors = MockCollectors::default();
        let journal = Arc::clone(&collectors.journal);
        let mut controller = controller(collectors);

        controller.start_recording(labels()).await.unwrap();
        let err = controller
            .start_recording(RecordingLabels::new("other", "running"))
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::AlreadyActive(SessionKind::Recording));
        assert_eq!(controller.bus().total_subscriptions(), 2);
        assert_eq!(journal.lock().unwrap().specs.len(), 2);
        assert_eq!(controller.recording_labels(), Some(&labels()));

        controller.stop_recording().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_open_rolls_back() {
        let collectors = MockCollectors {
            fail_open: Some(DEVICE_MOTION),
            ..Default::default()
        };
        let journal = Arc::clone(&collectors.journal);
        let mut controller = controller(collectors);

        let err = controller.start_recording(labels()).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::CollectorUnavailable { ref sensor, .. } if sensor == DEVICE_MOTION
        ));
        assert!(!controller.is_recording());
        assert_eq!(controller.bus().total_subscriptions(), 0);
        assert_eq!(journal.lock().unwrap().completed, [DEVICE_ORIENTATION]);
        assert_eq!(controller.status().get(), STATUS_INITIALIZED);
    }

    #[tokio::test]
    async fn test_finalize_failures_are_collected() {
        let collectors = MockCollectors {
            fail_complete: Some(DEVICE_ORIENTATION),
            ..Default::default()
        };
        let journal = Arc::clone(&collectors.journal);
        let mut controller = controller(collectors);

        controller.start_recording(labels()).await.unwrap();
        let err = controller.stop_recording().await.unwrap_err();

        match err {
            SessionError::FinalizeFailed(failures) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].0, DEVICE_ORIENTATION);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!controller.is_recording());
        assert_eq!(journal.lock().unwrap().completed, [DEVICE_MOTION]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_classifying_predicts_on_each_tick() {
        let service = MockPredictions::default();
        let predictions = Arc::clone(&service.predictions);
        let opened = Arc::clone(&service.opened);
        let mut controller = controller(MockCollectors::default())
            .with_predictions(Arc::new(service), orientation_model())
            .with_prediction_interval(Duration::from_millis(1000));

        controller.start_classifying().await.unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(controller.bus().subscriber_count(DEVICE_ORIENTATION), 1);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(predictions.load(Ordering::SeqCst), 3);
        assert!(controller.status().get().contains("class-3"));
        assert_eq!(controller.stats().snapshot().predictions, 3);

        controller.stop_classifying().await;
        assert_eq!(controller.bus().total_subscriptions(), 0);
        assert_eq!(controller.status().get(), STATUS_NOT_RECORDING);

        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(predictions.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_classifying_keeps_one_timer() {
        let service = MockPredictions::default();
        let predictions = Arc::clone(&service.predictions);
        let mut controller = controller(MockCollectors::default())
            .with_predictions(Arc::new(service), orientation_model());

        controller.start_classifying().await.unwrap();
        assert_eq!(
            controller.start_classifying().await.unwrap_err(),
            SessionError::AlreadyActive(SessionKind::Classifying)
        );

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(predictions.load(Ordering::SeqCst), 2);
        assert_eq!(controller.bus().total_subscriptions(), 1);

        controller.stop_classifying().await;
        controller.stop_classifying().await;
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(predictions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prediction_failures_are_not_escalated() {
        let service = MockPredictions {
            failing: true,
            ..Default::default()
        };
        let mut controller = controller(MockCollectors::default())
            .with_predictions(Arc::new(service), orientation_model());

        controller.start_classifying().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert!(controller.is_classifying());
        let snapshot = controller.stats().snapshot();
        assert_eq!(snapshot.prediction_failures, 2);
        assert_eq!(snapshot.predictions, 0);
        assert_eq!(controller.status().get(), STATUS_RECORDING);

        controller.stop_classifying().await;
    }

    #[tokio::test]
    async fn test_missing_model_fails_start() {
        let mut controller = controller(MockCollectors::default())
            .with_predictions(Arc::new(MockPredictions::default()), ModelCatalog::new());

        assert_eq!(
            controller.start_classifying().await.unwrap_err(),
            SessionError::ModelUnavailable(DEVICE_ORIENTATION.to_string())
        );
        assert!(!controller.is_classifying());
        assert_eq!(controller.bus().total_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_classifying_without_service() {
        let mut controller = controller(MockCollectors::default());
        assert_eq!(
            controller.start_classifying().await.unwrap_err(),
            SessionError::PredictionUnavailable
        );
    }

    #[tokio::test]
    async fn test_shutdown_stops_both() {
        let collectors = MockCollectors::default();
        let journal = Arc::clone(&collectors.journal);
        let mut controller = controller(collectors)
            .with_predictions(Arc::new(MockPredictions::default()), orientation_model());

        controller.start_recording(labels()).await.unwrap();
        controller.start_classifying().await.unwrap();
        assert_eq!(controller.bus().subscriber_count(DEVICE_ORIENTATION), 2);

        controller.shutdown().await.unwrap();
        assert!(!controller.is_recording());
        assert!(!controller.is_classifying());
        assert_eq!(controller.bus().total_subscriptions(), 0);
        assert_eq!(journal.lock().unwrap().completed.len(), 2);
    }
}
