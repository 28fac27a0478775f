//! End-to-end evaluation runs against an in-process stand-in for the MLflow
//! tracking server.

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use oenoflow_eval::{ErrorKind, EvaluationConfig, Evaluator, MetricSet, TrackingAuth};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Debug, Clone)]
struct Recorded {
    route: String,
    auth: Option<String>,
    body: Value,
}

#[derive(Clone, Default)]
struct MockServer {
    requests: Arc<Mutex<Vec<Recorded>>>,
    experiments: Arc<Mutex<HashMap<String, String>>>,
    fail_log_batch: bool,
}

impl MockServer {
    fn record(&self, route: impl Into<String>, headers: &HeaderMap, body: Value) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.requests.lock().unwrap().push(Recorded {
            route: route.into(),
            auth,
            body,
        });
    }

    fn routes(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.route.clone())
            .collect()
    }

    fn find(&self, route: &str) -> Vec<Recorded> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.route == route)
            .cloned()
            .collect()
    }
}

async fn get_by_name(
    State(mock): State<MockServer>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let name = q.get("experiment_name").cloned().unwrap_or_default();
    mock.record("GET get-by-name", &headers, json!({ "experiment_name": name }));
    match mock.experiments.lock().unwrap().get(&name) {
        Some(id) => (
            StatusCode::OK,
            Json(json!({ "experiment": { "experiment_id": id, "name": name } })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error_code": "RESOURCE_DOES_NOT_EXIST" })),
        ),
    }
}

async fn create_experiment(
    State(mock): State<MockServer>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    mock.record("POST experiments/create", &headers, body.clone());
    let name = body["name"].as_str().unwrap_or_default().to_string();
    mock.experiments
        .lock()
        .unwrap()
        .insert(name, "11".to_string());
    Json(json!({ "experiment_id": "11" }))
}

async fn create_run(
    State(mock): State<MockServer>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    mock.record("POST runs/create", &headers, body.clone());
    let exp = body["experiment_id"].as_str().unwrap_or("0").to_string();
    Json(json!({
        "run": {
            "info": {
                "run_id": "r-42",
                "experiment_id": exp,
                "artifact_uri": format!("mlflow-artifacts:/{exp}/r-42/artifacts"),
                "status": "RUNNING"
            },
            "data": {}
        }
    }))
}

async fn log_batch(
    State(mock): State<MockServer>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    mock.record("POST runs/log-batch", &headers, body);
    if mock.fail_log_batch {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error_code": "INTERNAL_ERROR" })),
        );
    }
    (StatusCode::OK, Json(json!({})))
}

async fn update_run(
    State(mock): State<MockServer>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    mock.record("POST runs/update", &headers, body);
    Json(json!({ "run_info": {} }))
}

async fn upload(
    State(mock): State<MockServer>,
    headers: HeaderMap,
    UrlPath(path): UrlPath<String>,
    body: Bytes,
) -> Json<Value> {
    let content: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    mock.record(format!("PUT {path}"), &headers, content);
    Json(json!({}))
}

async fn spawn(mock: MockServer) -> String {
    let app = Router::new()
        .route("/api/2.0/mlflow/experiments/get-by-name", get(get_by_name))
        .route("/api/2.0/mlflow/experiments/create", post(create_experiment))
        .route("/api/2.0/mlflow/runs/create", post(create_run))
        .route("/api/2.0/mlflow/runs/log-batch", post(log_batch))
        .route("/api/2.0/mlflow/runs/update", post(update_run))
        .route("/api/2.0/mlflow-artifacts/artifacts/{*path}", put(upload))
        .with_state(mock);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Wine-style test data: quality = 0.5 * alcohol, model predicts 0.5 * alcohol + 0.25.
fn write_inputs(dir: &Path) -> (PathBuf, PathBuf) {
    let data = dir.join("data").join("test.csv");
    std::fs::create_dir_all(data.parent().unwrap()).unwrap();
    std::fs::write(&data, "alcohol,pH,quality\n10,3.1,5\n12,3.3,6\n14,3.0,7\n").unwrap();

    let model = dir.join("model").join("model.json");
    std::fs::create_dir_all(model.parent().unwrap()).unwrap();
    std::fs::write(
        &model,
        serde_json::to_string(&json!({
            "kind": "linear",
            "feature_names": ["alcohol", "pH"],
            "coefficients": [0.5, 0.0],
            "intercept": 0.25,
            "params": { "alpha": 0.2, "l1_ratio": 0.1 }
        }))
        .unwrap(),
    )
    .unwrap();
    (data, model)
}

fn config(dir: &Path, tracking_uri: &str) -> EvaluationConfig {
    let (data, model) = write_inputs(dir);
    EvaluationConfig::new(
        data,
        model,
        "quality",
        dir.join("artifacts").join("model_evaluation").join("metrics.json"),
        tracking_uri,
    )
    .with_hyper_parameter("alpha", 0.2)
    .with_hyper_parameter("l1_ratio", 0.1)
    .with_artifact_copy_path(dir.join("models").join("model.json"))
}

#[tokio::test]
async fn test_full_run_is_recorded() {
    let dir = TempDir::new().unwrap();
    let mock = MockServer::default();
    mock.experiments
        .lock()
        .unwrap()
        .insert("wine-quality".into(), "3".into());
    let uri = spawn(mock.clone()).await;

    let cfg = config(dir.path(), &uri)
        .with_experiment_name("wine-quality")
        .with_credentials(TrackingAuth::Basic {
            username: "wine".into(),
            password: "secret".into(),
        });
    let metrics = Evaluator::new(cfg.clone()).unwrap().evaluate().await.unwrap();

    assert!((metrics.rmse - 0.25).abs() < 1e-12);
    assert!((metrics.mae - 0.25).abs() < 1e-12);

    assert_eq!(
        mock.routes(),
        vec![
            "GET get-by-name",
            "POST runs/create",
            "POST runs/log-batch",
            "POST runs/log-batch",
            "PUT 3/r-42/artifacts/model.json",
            "POST runs/update",
        ]
    );

    for req in mock.requests.lock().unwrap().iter() {
        assert_eq!(req.auth.as_deref(), Some("Basic d2luZTpzZWNyZXQ="), "{}", req.route);
    }

    let create = &mock.find("POST runs/create")[0];
    assert_eq!(create.body["experiment_id"], "3");
    let tags = create.body["tags"].as_array().unwrap();
    assert!(tags.iter().any(|t| t["key"] == "mlflow.source.name"));

    let batches = mock.find("POST runs/log-batch");
    assert_eq!(
        batches[0].body["params"],
        json!([
            { "key": "alpha", "value": "0.2" },
            { "key": "l1_ratio", "value": "0.1" }
        ])
    );
    let metric_keys: Vec<&str> = batches[1].body["metrics"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["key"].as_str().unwrap())
        .collect();
    assert_eq!(metric_keys, vec!["rmse", "mae", "r2"]);

    let uploaded = &mock.find("PUT 3/r-42/artifacts/model.json")[0];
    assert_eq!(uploaded.body["kind"], "linear");

    let update = &mock.find("POST runs/update")[0];
    assert_eq!(update.body["status"], "FINISHED");
    assert_eq!(update.body["run_id"], "r-42");

    let saved: MetricSet = serde_json::from_str(
        &std::fs::read_to_string(&cfg.metric_file_path).unwrap(),
    )
    .unwrap();
    assert_eq!(saved, metrics);
}

#[tokio::test]
async fn test_unknown_experiment_is_created() {
    let dir = TempDir::new().unwrap();
    let mock = MockServer::default();
    let uri = spawn(mock.clone()).await;

    let cfg = config(dir.path(), &uri).with_experiment_name("fresh");
    Evaluator::new(cfg).unwrap().evaluate().await.unwrap();

    let routes = mock.routes();
    assert_eq!(routes[0], "GET get-by-name");
    assert_eq!(routes[1], "POST experiments/create");
    assert_eq!(mock.find("POST runs/create")[0].body["experiment_id"], "11");
    assert!(routes.contains(&"PUT 11/r-42/artifacts/model.json".to_string()));
}

#[tokio::test]
async fn test_default_experiment_without_name() {
    let dir = TempDir::new().unwrap();
    let mock = MockServer::default();
    let uri = spawn(mock.clone()).await;

    Evaluator::new(config(dir.path(), &uri))
        .unwrap()
        .evaluate()
        .await
        .unwrap();

    assert!(mock.find("GET get-by-name").is_empty());
    assert_eq!(mock.find("POST runs/create")[0].body["experiment_id"], "0");
    assert!(mock.requests.lock().unwrap().iter().all(|r| r.auth.is_none()));
}

#[tokio::test]
async fn test_params_are_batched() {
    let dir = TempDir::new().unwrap();
    let mock = MockServer::default();
    let uri = spawn(mock.clone()).await;

    let mut cfg = config(dir.path(), &uri);
    for i in 0..150 {
        cfg.hyper_parameters.insert(format!("p{i:03}"), json!(i));
    }
    Evaluator::new(cfg).unwrap().evaluate().await.unwrap();

    let batches = mock.find("POST runs/log-batch");
    // two param batches (100 + 52) then the metrics batch
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0].body["params"].as_array().unwrap().len(), 100);
    assert_eq!(batches[1].body["params"].as_array().unwrap().len(), 52);
    assert_eq!(batches[2].body["metrics"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_rejected_logging_marks_run_failed() {
    let dir = TempDir::new().unwrap();
    let mock = MockServer {
        fail_log_batch: true,
        ..Default::default()
    };
    let uri = spawn(mock.clone()).await;

    let cfg = config(dir.path(), &uri);
    let err = Evaluator::new(cfg.clone())
        .unwrap()
        .evaluate()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RemoteService);
    assert!(err.to_string().contains("500"));
    assert!(cfg.metric_file_path.exists());
    assert_eq!(mock.find("POST runs/update")[0].body["status"], "FAILED");
    assert!(!mock.routes().iter().any(|r| r.starts_with("PUT ")));
}

#[tokio::test]
async fn test_unreachable_tracking_service_keeps_local_metrics() {
    let dir = TempDir::new().unwrap();
    // Bind then drop to obtain a port nothing is listening on.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let cfg = config(dir.path(), &format!("http://127.0.0.1:{port}"));
    let err = Evaluator::new(cfg.clone())
        .unwrap()
        .evaluate()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RemoteService);
    let saved: MetricSet = serde_json::from_str(
        &std::fs::read_to_string(&cfg.metric_file_path).unwrap(),
    )
    .unwrap();
    assert!((saved.mae - 0.25).abs() < 1e-12);
    assert!(!cfg.artifact_copy_path.exists());
}

#[tokio::test]
async fn test_missing_target_column_never_contacts_service() {
    let dir = TempDir::new().unwrap();
    let mock = MockServer::default();
    let uri = spawn(mock.clone()).await;

    let mut cfg = config(dir.path(), &uri);
    cfg.target_column = "sweetness".into();
    let err = Evaluator::new(cfg.clone())
        .unwrap()
        .evaluate()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Input);
    assert!(err.to_string().contains("sweetness"));
    assert!(mock.routes().is_empty());
    assert!(!cfg.metric_file_path.exists());
}
