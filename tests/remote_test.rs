//! Integration tests for the remote dataset collector against a local fake backend

#[cfg(feature = "server")]
mod remote_tests {
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use motion_sensor_agent::service::{
        CollectorService, CollectorSpec, RemoteCollectorService, ServiceError,
    };
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct Backend {
        inits: Mutex<Vec<Value>>,
        batches: Mutex<Vec<Value>>,
        reject_init: bool,
        /// Batch requests still to be answered with a server error
        failing_batches: AtomicUsize,
    }

    async fn init(
        State(backend): State<Arc<Backend>>,
        Json(body): Json<Value>,
    ) -> Result<Json<Value>, StatusCode> {
        if backend.reject_init {
            return Err(StatusCode::UNAUTHORIZED);
        }
        backend.inits.lock().unwrap().push(body);
        Ok(Json(json!({"datasetKey": "dataset-1"})))
    }

    async fn batch(State(backend): State<Arc<Backend>>, Json(body): Json<Value>) -> StatusCode {
        let failing = backend
            .failing_batches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
        backend.batches.lock().unwrap().push(body);
        StatusCode::OK
    }

    async fn start_backend(backend: Arc<Backend>) -> SocketAddr {
        let app = Router::new()
            .route("/api/deviceapi/initDatasetIncrement", post(init))
            .route("/api/deviceapi/addDatasetIncrementBatch", post(batch))
            .with_state(backend);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        addr
    }

    fn spec(addr: SocketAddr) -> CollectorSpec {
        let mut metadata = BTreeMap::new();
        metadata.insert("participantId".to_string(), "1a2b3".to_string());
        CollectorSpec {
            backend_url: format!("http://{addr}/"),
            api_key: "device-key".to_string(),
            dataset: "deviceorientation".to_string(),
            external_timestamps: true,
            fields: vec!["alpha".to_string(), "beta".to_string()],
            metadata,
            label: "activity_walking".to_string(),
        }
    }

    #[tokio::test]
    async fn test_batches_uploaded_at_threshold_and_completion() {
        let backend = Arc::new(Backend::default());
        let addr = start_backend(Arc::clone(&backend)).await;

        let service = RemoteCollectorService::new().unwrap().with_upload_threshold(2);
        let collector = service.open_collector(&spec(addr)).await.unwrap();

        {
            let inits = backend.inits.lock().unwrap();
            assert_eq!(inits.len(), 1);
            assert_eq!(inits[0]["deviceApiKey"], "device-key");
            assert_eq!(inits[0]["name"], "deviceorientation");
            assert_eq!(inits[0]["useDeviceTime"], false);
            assert_eq!(inits[0]["metaData"]["participantId"], "1a2b3");
        }

        collector.add_data_point(10, "alpha", &json!(1.0)).await.unwrap();
        assert!(backend.batches.lock().unwrap().is_empty());
        collector.add_data_point(10, "beta", &json!(2.0)).await.unwrap();
        assert_eq!(backend.batches.lock().unwrap().len(), 1);

        collector.add_data_point(20, "alpha", &json!(3.0)).await.unwrap();
        collector.on_complete().await.unwrap();

        let batches = backend.batches.lock().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0]["datasetKey"], "dataset-1");
        assert_eq!(batches[0]["labeling"]["labelName"], "walking");
        assert_eq!(batches[1]["data"][0]["name"], "alpha");
        assert_eq!(batches[1]["data"][0]["data"][0][0], 20);
    }

    #[tokio::test]
    async fn test_failed_batch_keeps_points_and_retries() {
        let backend = Arc::new(Backend {
            failing_batches: AtomicUsize::new(1),
            ..Default::default()
        });
        let addr = start_backend(Arc::clone(&backend)).await;

        let service = RemoteCollectorService::new().unwrap().with_upload_threshold(1);
        let collector = service.open_collector(&spec(addr)).await.unwrap();

        // The backend refuses the first batch, yet the point is accepted
        assert_eq!(collector.add_data_point(10, "alpha", &json!(1.0)).await, Ok(()));
        assert!(backend.batches.lock().unwrap().is_empty());

        assert_eq!(collector.add_data_point(10, "beta", &json!(2.0)).await, Ok(()));
        {
            let batches = backend.batches.lock().unwrap();
            assert_eq!(batches.len(), 1);
            assert_eq!(batches[0]["data"][0]["name"], "alpha");
            assert_eq!(batches[0]["data"][0]["data"][0][0], 10);
            assert_eq!(batches[0]["data"][1]["name"], "beta");
        }

        assert_eq!(collector.on_complete().await, Ok(()));
        assert_eq!(backend.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_outage_drops_oldest_points_and_reports_at_completion() {
        let backend = Arc::new(Backend {
            failing_batches: AtomicUsize::new(12),
            ..Default::default()
        });
        let addr = start_backend(Arc::clone(&backend)).await;

        let service = RemoteCollectorService::new().unwrap().with_upload_threshold(1);
        let collector = service.open_collector(&spec(addr)).await.unwrap();

        for i in 0..12 {
            assert_eq!(collector.add_data_point(i, "alpha", &json!(i as f64)).await, Ok(()));
        }

        let err = collector.on_complete().await.unwrap_err();
        assert!(matches!(err, ServiceError::Incomplete { lost: 2, .. }), "got {err}");

        let batches = backend.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let series = batches[0]["data"][0]["data"].as_array().unwrap();
        assert_eq!(series.len(), 10);
        assert_eq!(series[0][0], 2);
    }

    #[tokio::test]
    async fn test_non_numeric_value_rejected() {
        let backend = Arc::new(Backend::default());
        let addr = start_backend(Arc::clone(&backend)).await;

        let service = RemoteCollectorService::new().unwrap();
        let collector = service.open_collector(&spec(addr)).await.unwrap();

        let err = collector
            .add_data_point(1, "alpha", &json!("north"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Rejected { .. }));

        collector.on_complete().await.unwrap();
        assert_eq!(collector.on_complete().await, Err(ServiceError::Closed));
    }

    #[tokio::test]
    async fn test_open_fails_on_server_error() {
        let backend = Arc::new(Backend {
            reject_init: true,
            ..Default::default()
        });
        let addr = start_backend(backend).await;

        let service = RemoteCollectorService::new().unwrap();
        let err = service.open_collector(&spec(addr)).await.err().unwrap();
        assert!(matches!(err, ServiceError::Server { status: 401, .. }));
    }
}
