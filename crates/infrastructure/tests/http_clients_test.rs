use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use jobcore_core::config::models::JobServiceConfig;
use jobcore_core::models::{JobAction, JobData, JobMetadata};
use jobcore_core::traits::JobServiceClient;
use jobcore_core::ErrorKind;
use jobcore_domain::ports::WebhookSender;
use jobcore_domain::webhook::HookTarget;
use jobcore_infrastructure::{HttpJobServiceClient, HttpWebhookSender, MetricsCollector};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct Recorded {
    requests: Arc<Mutex<Vec<(String, Value)>>>,
    auth: Arc<Mutex<Option<String>>>,
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn fake_jobservice(recorded: Recorded) -> Router {
    Router::new()
        .route(
            "/api/v1/jobs",
            post(|State(r): State<Recorded>, Json(body): Json<Value>| async move {
                let name = body["name"].as_str().unwrap_or_default().to_string();
                r.requests.lock().unwrap().push(("submit".to_string(), body));
                if name == "BROKEN" {
                    return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"err": "boom"})));
                }
                (StatusCode::ACCEPTED, Json(json!({"job": {"id": "uuid-1", "status": "Pending"}})))
            }),
        )
        .route(
            "/api/v1/jobs/{id}",
            post(
                |State(r): State<Recorded>, Path(id): Path<String>, Json(body): Json<Value>| async move {
                    r.requests.lock().unwrap().push((id.clone(), body));
                    if id == "gone" {
                        StatusCode::NOT_FOUND
                    } else {
                        StatusCode::NO_CONTENT
                    }
                },
            ),
        )
        .route("/api/v1/jobs/{id}/log", get(|| async { "line1\nline2" }))
        .route(
            "/api/v1/jobs/periodic",
            get(|| async {
                Json(json!([{
                    "id": "p-1",
                    "job_name": "SCHEDULER",
                    "cron_spec": "0 0 0 * * *",
                    "job_params": {"schedule_id": 42}
                }]))
            }),
        )
        .with_state(recorded)
}

fn client(url: String) -> HttpJobServiceClient {
    HttpJobServiceClient::new(
        &JobServiceConfig {
            url,
            request_timeout_seconds: 5,
        },
        Arc::new(MetricsCollector::new()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_submit_and_actions() {
    let recorded = Recorded::default();
    let client = client(serve(fake_jobservice(recorded.clone())).await);

    let job = JobData::new("RETENTION", serde_json::Map::new(), JobMetadata::generic());
    assert_eq!(client.submit_job(&job).await.unwrap(), "uuid-1");

    client.post_action("uuid-1", JobAction::Stop).await.unwrap();
    // 作业已不存在视为成功
    client.post_action("gone", JobAction::Stop).await.unwrap();

    let requests = recorded.requests.lock().unwrap().clone();
    assert_eq!(requests[0].1["metadata"]["job_kind"], json!("Generic"));
    assert_eq!(requests[1], ("uuid-1".to_string(), json!({"action": "stop"})));

    let log = client.get_job_log("uuid-1").await.unwrap();
    assert_eq!(log, b"line1\nline2".to_vec());

    let periodic = client.list_periodic_jobs().await.unwrap();
    assert_eq!(periodic.len(), 1);
    assert_eq!(periodic[0].job_params["schedule_id"], json!(42));
}

#[tokio::test]
async fn test_non_success_is_structured_error() {
    let client = client(serve(fake_jobservice(Recorded::default())).await);
    let job = JobData::new("BROKEN", serde_json::Map::new(), JobMetadata::generic());
    let err = client.submit_job(&job).await.unwrap_err();
    match &err {
        jobcore_core::CoreError::JobService { code, .. } => assert_eq!(*code, 500),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::Unavailable);
}

#[tokio::test]
async fn test_unreachable_worker_pool_is_unavailable() {
    let client = client("http://127.0.0.1:1".to_string());
    let job = JobData::new("RETENTION", serde_json::Map::new(), JobMetadata::generic());
    let err = client.submit_job(&job).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
}

#[tokio::test]
async fn test_webhook_sender_sets_authorization() {
    let recorded = Recorded::default();
    let router = Router::new()
        .route(
            "/hook",
            post(|State(r): State<Recorded>, headers: HeaderMap, Json(body): Json<Value>| async move {
                *r.auth.lock().unwrap() = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                r.requests.lock().unwrap().push(("hook".to_string(), body));
                StatusCode::OK
            }),
        )
        .with_state(recorded.clone());
    let base = serve(router).await;

    let sender = HttpWebhookSender::new(Duration::from_secs(5)).unwrap();
    let mut target = HookTarget::http(format!("{base}/hook"));
    target.auth_header = "secret-token".to_string();

    let response = sender.send(&target, br#"{"type":"pushImage"}"#).await.unwrap();
    assert!(response.is_success());
    assert_eq!(recorded.auth.lock().unwrap().as_deref(), Some("secret-token"));
    assert_eq!(
        recorded.requests.lock().unwrap()[0].1,
        json!({"type": "pushImage"})
    );

    let missing = HookTarget::http(format!("{base}/missing"));
    assert_eq!(sender.send(&missing, b"{}").await.unwrap().status, 404);
}
