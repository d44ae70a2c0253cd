//! 通过完整装配的组件验证调度、保留、回调与 webhook 投递的端到端流程

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use jobcore::app::Components;
use jobcore_api::create_app;
use jobcore_core::config::models::WebhookConfig;
use jobcore_core::models::{
    vendor, ExecutionStatus, JobData, PeriodicJob, ScheduleQuery, TaskStatus, Trigger,
};
use jobcore_core::traits::SchedulerService;
use jobcore_core::{AppConfig, ErrorKind};
use jobcore_domain::events::{topic, ArtifactRef, Event, ImageEvent, ProjectRef};
use jobcore_domain::immutable::{ImmutableRule, RuleMetadata};
use jobcore_domain::retention::template::{LATEST_PUSHED_K, NOTHING};
use jobcore_domain::selectors::SelectorSpec;
use jobcore_domain::webhook::EventType;
use jobcore_infrastructure::MetricsCollector;
use jobcore_testing_utils::{
    retention_rule, CandidateBuilder, InMemoryArtifactSource, MockJobServiceClient,
    RecordingDeleter, RecordingWebhookSender, RetentionPolicyBuilder, TestDatabase,
    WebhookPolicyBuilder,
};
use jobcore_worker::{JobRegistry, RecordingContext, RetentionJob, WebhookDeliveryJob};

struct Harness {
    db: TestDatabase,
    jobservice: MockJobServiceClient,
    artifacts: InMemoryArtifactSource,
    deleter: RecordingDeleter,
    sender: RecordingWebhookSender,
    components: Components,
    app: Router,
}

impl Harness {
    async fn new() -> Self {
        let db = TestDatabase::new().await;
        let jobservice = MockJobServiceClient::new();
        let artifacts = InMemoryArtifactSource::new();
        let sender = RecordingWebhookSender::new();
        let components = Components::wire(
            &AppConfig::default(),
            db.pool.clone(),
            Arc::new(MetricsCollector::new()),
            Arc::new(jobservice.clone()),
            Arc::new(artifacts.clone()),
            Arc::new(sender.clone()),
        )
        .unwrap();
        let app = create_app(components.hooks.clone());
        Self {
            db,
            jobservice,
            artifacts,
            deleter: RecordingDeleter::new(),
            sender,
            components,
            app,
        }
    }

    /// worker 端的作业注册表，与核心共用同一组测试替身
    fn worker(&self) -> JobRegistry {
        let config = WebhookConfig {
            retry_backoff_millis: 1,
            ..Default::default()
        };
        let mut registry = JobRegistry::new();
        registry
            .register(Arc::new(RetentionJob::new(Arc::new(self.deleter.clone()))))
            .unwrap();
        registry
            .register(Arc::new(WebhookDeliveryJob::new(Arc::new(self.sender.clone()), &config)))
            .unwrap();
        registry
    }

    async fn post(&self, uri: &str, body: Value) -> StatusCode {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.app.clone().oneshot(request).await.unwrap().status()
    }

    /// 模拟 worker pool 执行一个保留作业并逐步回调
    async fn run_retention_task(&self, task_id: i64, job_id: &str, job: &JobData) -> Value {
        let uri = format!("/service/notifications/tasks/{task_id}");
        let status = self
            .post(&uri, json!({"job_id": job_id, "status": "Running", "revision": 1}))
            .await;
        assert_eq!(status, StatusCode::OK);

        let ctx = RecordingContext::new();
        let output = self.worker().run(job, &ctx).await.unwrap();

        for check_in in ctx.check_ins() {
            let status = self
                .post(
                    &uri,
                    json!({"job_id": job_id, "status": "Running", "check_in": check_in, "revision": 1}),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
        }

        let status = self
            .post(&uri, json!({"job_id": job_id, "status": "Success", "revision": 1}))
            .await;
        assert_eq!(status, StatusCode::OK);
        output
    }
}

fn release_candidates(artifacts: &InMemoryArtifactSource) {
    for (tag, hours) in [("release-1.0", 3), ("release-1.1", 2), ("dev-1", 1)] {
        artifacts.add(
            CandidateBuilder::image(1, "library", "redis")
                .tag(tag)
                .pushed_hours_ago(hours)
                .build(),
        );
    }
}

fn push_event(project_id: i64) -> Event {
    Event::Image(ImageEvent {
        event_type: EventType::PushImage,
        project: ProjectRef {
            id: project_id,
            name: "library".to_string(),
            public: false,
        },
        repository: "redis".to_string(),
        repo_created_at: 0,
        artifacts: vec![ArtifactRef {
            tag: "7.0".to_string(),
            digest: Some("sha256:abc".to_string()),
        }],
        operator: "admin".to_string(),
        occur_at: Utc::now(),
    })
}

#[tokio::test]
async fn test_scheduled_retention_runs_to_success() {
    let h = Harness::new().await;
    release_candidates(&h.artifacts);

    let policy = RetentionPolicyBuilder::new(1)
        .rule(retention_rule(LATEST_PUSHED_K, 10, "**", "release-*"))
        .disabled_rule(retention_rule(NOTHING, 0, "**", "**"))
        .scheduled("0 0 0 * * *")
        .build();
    let policy_id = h.components.retention.create_retention(&policy).await.unwrap();

    let schedules = h
        .components
        .scheduler
        .list_schedules(&ScheduleQuery::by_vendor(vendor::RETENTION, policy_id))
        .await
        .unwrap();
    assert_eq!(schedules.len(), 1);
    let schedule = &schedules[0];

    // worker pool 触发周期作业
    let status = h
        .post(
            &format!("/service/notifications/schedules/{}", schedule.id),
            json!({"job_id": schedule.job_id.clone().unwrap_or_default(), "status": "Running", "revision": 1}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let execs = h
        .components
        .retention
        .list_retention_execs(policy_id, None)
        .await
        .unwrap();
    assert_eq!(execs.len(), 1);
    assert_eq!(execs[0].trigger, Trigger::Scheduled);
    assert_eq!(execs[0].status, ExecutionStatus::Running);
    assert!(!execs[0].dry_run);

    let tasks = h
        .components
        .retention
        .list_retention_exec_tasks(execs[0].id, None)
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].repository, "library/redis");

    let submitted = h.jobservice.submitted_named(vendor::RETENTION);
    assert_eq!(submitted.len(), 1);
    let (job_id, job) = &submitted[0];
    assert_eq!(tasks[0].job_id.as_deref(), Some(job_id.as_str()));

    let output = h.run_retention_task(tasks[0].id, job_id, job).await;
    assert_eq!(output, json!([]));
    assert!(h.deleter.deleted().is_empty());

    let task = h
        .components
        .retention
        .get_retention_exec_task(tasks[0].id)
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Success);
    assert_eq!(task.total, 3);
    assert_eq!(task.retained, 3);

    let exec = h.components.retention.get_retention_exec(execs[0].id).await.unwrap();
    assert_eq!(exec.status, ExecutionStatus::Success);
    assert!(exec.end_time.is_some());

    // 终态任务在同一版本下不再变化
    let status = h
        .post(
            &format!("/service/notifications/tasks/{}", tasks[0].id),
            json!({"job_id": job_id, "status": "Error", "revision": 1}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let task = h
        .components
        .retention
        .get_retention_exec_task(tasks[0].id)
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Success);
}

#[tokio::test]
async fn test_immutable_tags_survive_retention() {
    let h = Harness::new().await;
    release_candidates(&h.artifacts);
    h.db.immutable_rules
        .create(&ImmutableRule::new(
            1,
            RuleMetadata::new(
                SelectorSpec::doublestar("repoMatches", "redis"),
                SelectorSpec::doublestar("matches", "release-**"),
            ),
        ))
        .await
        .unwrap();

    let policy = RetentionPolicyBuilder::new(1)
        .rule(retention_rule(NOTHING, 0, "**", "**"))
        .build();
    let policy_id = h.components.retention.create_retention(&policy).await.unwrap();
    let execution_id = h
        .components
        .retention
        .trigger_retention_exec(policy_id, Trigger::Manual, false)
        .await
        .unwrap();

    let tasks = h
        .components
        .retention
        .list_retention_exec_tasks(execution_id, None)
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    let (job_id, job) = &h.jobservice.submitted_named(vendor::RETENTION)[0];

    let output = h.run_retention_task(tasks[0].id, job_id, job).await;

    let deleted: Vec<Vec<String>> = h.deleter.deleted().into_iter().map(|c| c.tags).collect();
    assert_eq!(deleted, vec![vec!["dev-1".to_string()]]);

    let results = output.as_array().unwrap();
    assert_eq!(results.len(), 3);
    let protected: Vec<&Value> = results.iter().filter(|r| r["immutable"] == true).collect();
    assert_eq!(protected.len(), 2);
    assert!(protected.iter().all(|r| r["error"].is_string()));

    let exec = h.components.retention.get_retention_exec(execution_id).await.unwrap();
    assert_eq!(exec.status, ExecutionStatus::Success);
}

#[tokio::test]
async fn test_push_event_fans_out_and_delivers() {
    let h = Harness::new().await;
    h.components
        .webhook_policies
        .create(
            &WebhookPolicyBuilder::new(1, "p1")
                .target("http://a.local/hook")
                .event(EventType::PushImage)
                .build(),
        )
        .await
        .unwrap();
    h.components
        .webhook_policies
        .create(
            &WebhookPolicyBuilder::new(1, "p2")
                .target("http://b.local/hook")
                .target("http://c.local/hook")
                .event(EventType::PushImage)
                .build(),
        )
        .await
        .unwrap();

    h.components
        .bus
        .publish(topic::PUSH_ARTIFACT, push_event(1))
        .await
        .unwrap();

    let jobs = h.db.webhook_jobs.list(&Default::default()).await.unwrap();
    assert_eq!(jobs.len(), 3);
    let submitted = h.jobservice.submitted_named(vendor::WEBHOOK);
    assert_eq!(submitted.len(), 3);

    let worker = h.worker();
    for (_, job) in &submitted {
        let output = worker.run(job, &RecordingContext::new()).await.unwrap();
        assert_eq!(output["status"], 200);
    }
    let mut addresses: Vec<String> = h.sender.sent().into_iter().map(|(t, _)| t.address).collect();
    addresses.sort();
    assert_eq!(
        addresses,
        vec!["http://a.local/hook", "http://b.local/hook", "http://c.local/hook"]
    );

    let job = &jobs[0];
    let status = h
        .post(
            &format!("/service/notifications/jobs/webhook/{}", job.id),
            json!({"job_id": job.uuid.clone().unwrap_or_default(), "status": "Success"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let job = h.db.webhook_jobs.get(job.id).await.unwrap();
    assert_eq!(job.status, TaskStatus::Success);
}

#[tokio::test]
async fn test_notifications_disabled_at_runtime() {
    let h = Harness::new().await;
    h.components
        .webhook_policies
        .create(
            &WebhookPolicyBuilder::new(1, "p1")
                .target("http://a.local/hook")
                .event(EventType::PushImage)
                .build(),
        )
        .await
        .unwrap();

    h.components.settings.set_notification_enabled(false).unwrap();
    h.components
        .bus
        .publish(topic::PUSH_ARTIFACT, push_event(1))
        .await
        .unwrap();

    assert!(h.db.webhook_jobs.list(&Default::default()).await.unwrap().is_empty());
    assert!(h.jobservice.submitted_named(vendor::WEBHOOK).is_empty());
}

#[tokio::test]
async fn test_sync_restores_lost_schedule_and_clears_orphan() {
    let h = Harness::new().await;
    let policy = RetentionPolicyBuilder::new(1)
        .rule(retention_rule(LATEST_PUSHED_K, 10, "**", "**"))
        .scheduled("0 0 0 * * *")
        .build();
    let policy_id = h.components.retention.create_retention(&policy).await.unwrap();

    h.jobservice.clear_periodic_jobs();
    h.jobservice.add_periodic_job(PeriodicJob {
        id: "orphan-1".to_string(),
        job_name: vendor::SCHEDULER.to_string(),
        cron_spec: "0 0 0 * * *".to_string(),
        job_params: Default::default(),
        status_hook: String::new(),
    });

    let report = h.components.sync_worker.sync_once(1).await.unwrap();
    assert_eq!((report.restored, report.cleared), (1, 1));

    let schedule = h
        .components
        .scheduler
        .list_schedules(&ScheduleQuery::by_vendor(vendor::RETENTION, policy_id))
        .await
        .unwrap()
        .remove(0);
    let live: Vec<String> = h.jobservice.periodic_jobs().into_iter().map(|j| j.id).collect();
    assert_eq!(live, vec![schedule.job_id.unwrap()]);
}

#[tokio::test]
async fn test_policy_test_does_not_persist() {
    let h = Harness::new().await;
    h.sender.fail_next(1);

    let policy = WebhookPolicyBuilder::new(1, "delivery-check")
        .target("https://example.invalid/hook")
        .event(EventType::PushImage)
        .build();
    let err = h
        .components
        .webhook_policies
        .test(&policy, "admin")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);

    assert!(h.db.webhook_jobs.list(&Default::default()).await.unwrap().is_empty());
    assert!(h.jobservice.submitted_jobs().is_empty());
}
